//! Persistence layer for the Lumio webhook delivery engine.
//!
//! Owns the `webhook_subscriptions` registry table and the
//! `webhook_deliveries` ledger table, exposed as typed models with
//! runtime-checked `PostgreSQL` queries, plus pool and migration helpers.

pub mod error;
pub mod migrations;
pub mod models;
pub mod pool;

pub use error::DbError;
pub use migrations::run_migrations;
pub use pool::connect;
