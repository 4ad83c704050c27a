//! Webhook delivery engine for Lumio platform events.
//!
//! Turns in-process domain events into signed, reliably delivered HTTP
//! notifications: event fan-out, HMAC-SHA256 payload signing, bounded
//! retries with exponential backoff, and a durable delivery ledger.
//! Publishing an event never blocks or fails the producing operation.

pub mod config;
pub mod crypto;
pub mod error;
pub mod handlers;
pub mod models;
pub mod rate_limiter;
pub mod router;
pub mod services;
pub mod validation;
pub mod worker;

pub use config::WebhooksConfig;
pub use error::WebhookError;
pub use models::WebhookEventType;
pub use rate_limiter::{RateLimitConfig, RateLimitResult, RateLimiter, RateLimiterRegistry};
pub use router::{webhooks_router, WebhooksState};
pub use services::delivery_service::{DeliveryOutcome, DeliveryService};
pub use services::event_publisher::{EventPublisher, WebhookEvent};
pub use services::sweep_service::{SweepService, SweepStats};
pub use worker::WebhookWorker;
