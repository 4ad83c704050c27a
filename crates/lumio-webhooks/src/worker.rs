//! Background worker bridging published events to the delivery engine.
//!
//! Consumes the broadcast channel fed by [`EventPublisher`] and hands
//! each event to the delivery service on its own task, so a slow
//! fan-out never backs up the channel. The producer side has already
//! returned by the time any of this runs.
//!
//! [`EventPublisher`]: crate::services::event_publisher::EventPublisher

use std::sync::Arc;

use tokio::sync::broadcast;
use tokio::sync::Notify;

use crate::services::delivery_service::DeliveryService;
use crate::services::event_publisher::WebhookEvent;

/// Worker task consuming published events.
pub struct WebhookWorker {
    delivery_service: DeliveryService,
    receiver: broadcast::Receiver<WebhookEvent>,
    shutdown: Arc<Notify>,
}

impl WebhookWorker {
    #[must_use]
    pub fn new(
        delivery_service: DeliveryService,
        receiver: broadcast::Receiver<WebhookEvent>,
    ) -> Self {
        Self {
            delivery_service,
            receiver,
            shutdown: Arc::new(Notify::new()),
        }
    }

    /// Handle to request a graceful stop from another task.
    #[must_use]
    pub fn shutdown_handle(&self) -> Arc<Notify> {
        self.shutdown.clone()
    }

    /// Run until the publisher is dropped or shutdown is requested.
    pub async fn run(mut self) {
        tracing::info!(target: "webhook_delivery", "Webhook worker started");

        loop {
            tokio::select! {
                () = self.shutdown.notified() => {
                    tracing::info!(target: "webhook_delivery", "Webhook worker shutdown requested");
                    break;
                }
                received = self.receiver.recv() => match received {
                    Ok(event) => {
                        let service = self.delivery_service.clone();
                        tokio::spawn(async move {
                            service.deliver_event(&event).await;
                        });
                    }
                    Err(broadcast::error::RecvError::Lagged(missed)) => {
                        tracing::warn!(
                            target: "webhook_delivery",
                            missed,
                            "Event consumer lagged; events were dropped"
                        );
                    }
                    Err(broadcast::error::RecvError::Closed) => {
                        tracing::info!(
                            target: "webhook_delivery",
                            "Event channel closed; webhook worker stopping"
                        );
                        break;
                    }
                }
            }
        }
    }
}
