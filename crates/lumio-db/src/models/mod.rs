//! Database entity models.
//!
//! Each model wraps one table with typed, runtime-checked queries.

pub mod webhook_delivery;
pub mod webhook_subscription;

pub use webhook_delivery::{CreateWebhookDelivery, DeliveryStatus, WebhookDelivery};
pub use webhook_subscription::{CreateWebhookSubscription, WebhookSubscription};
