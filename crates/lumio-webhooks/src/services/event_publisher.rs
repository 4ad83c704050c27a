//! Fire-and-forget event publishing over a tokio broadcast channel.
//!
//! `publish` is the single entry point the rest of the platform calls.
//! It is synchronous, returns immediately, and never surfaces an error
//! into the caller: delivery health is invisible to the producer.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::WebhookEventType;

/// A domain event published for webhook fan-out.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WebhookEvent {
    /// Identity of this event occurrence; re-publishing the same
    /// `event_id` creates no duplicate deliveries.
    pub event_id: Uuid,
    pub event_type: String,
    pub timestamp: DateTime<Utc>,
    /// Business payload, frozen here and carried verbatim to subscribers.
    pub data: serde_json::Value,
}

impl WebhookEvent {
    /// Build a new event occurrence with a fresh id.
    #[must_use]
    pub fn new(event_type: WebhookEventType, data: serde_json::Value) -> Self {
        Self {
            event_id: Uuid::new_v4(),
            event_type: event_type.as_str().to_string(),
            timestamp: Utc::now(),
            data,
        }
    }
}

/// Publisher side of the event channel.
#[derive(Clone)]
pub struct EventPublisher {
    sender: tokio::sync::broadcast::Sender<WebhookEvent>,
}

impl EventPublisher {
    /// Create a publisher and the first consumer handle.
    #[must_use]
    pub fn new(capacity: usize) -> (Self, tokio::sync::broadcast::Receiver<WebhookEvent>) {
        let (sender, receiver) = tokio::sync::broadcast::channel(capacity);
        (Self { sender }, receiver)
    }

    /// Publish an event. Never blocks, never fails the caller.
    ///
    /// A send with no live worker only means the event is dropped; that
    /// is logged, not raised.
    pub fn publish(&self, event: WebhookEvent) {
        if self.sender.send(event).is_err() {
            tracing::warn!(
                target: "webhook_delivery",
                "No delivery worker is listening; event dropped"
            );
        }
    }

    /// Get an additional consumer handle.
    #[must_use]
    pub fn subscribe(&self) -> tokio::sync::broadcast::Receiver<WebhookEvent> {
        self.sender.subscribe()
    }
}
