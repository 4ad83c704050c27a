//! Periodic retry sweep over the delivery ledger.
//!
//! Invoked by an external scheduler through the trigger endpoint. The
//! sweep selects overdue retryable rows, claims each with an optimistic
//! conditional update, and re-runs the executor under a concurrency cap.
//! Overlapping sweeps are safe: a row claimed by one sweep matches zero
//! rows in the other's claim and is simply skipped.
//!
//! Per-row attempt ordering is preserved end to end: a row only becomes
//! claimable again after the previous attempt's outcome is persisted,
//! and the claim lease covers the in-flight window.

use std::sync::Arc;

use chrono::{Duration, Utc};
use serde::Serialize;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use utoipa::ToSchema;

use crate::services::delivery_service::{DeliveryOutcome, DeliveryService};
use lumio_db::models::WebhookDelivery;

/// Default number of due rows fetched per sweep.
pub const DEFAULT_SWEEP_BATCH_SIZE: i64 = 100;

/// Default number of concurrent retry attempts per sweep.
pub const DEFAULT_SWEEP_CONCURRENCY: usize = 8;

/// How long a claim shields a row from other sweeps. Longer than the
/// attempt timeout, so a crashed worker's claim expires on its own.
const CLAIM_LEASE_SECS: i64 = 120;

/// Result counters for one sweep run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, ToSchema)]
pub struct SweepStats {
    /// Rows claimed and re-attempted.
    pub attempted: u32,
    /// Attempts acknowledged with a 2xx.
    pub succeeded: u32,
    /// Attempts that failed (rescheduled or dead-lettered).
    pub failed: u32,
}

/// Service running the retry sweep.
#[derive(Clone)]
pub struct SweepService {
    delivery_service: DeliveryService,
    batch_size: i64,
    concurrency: usize,
}

impl SweepService {
    #[must_use]
    pub fn new(delivery_service: DeliveryService) -> Self {
        Self {
            delivery_service,
            batch_size: DEFAULT_SWEEP_BATCH_SIZE,
            concurrency: DEFAULT_SWEEP_CONCURRENCY,
        }
    }

    /// Set the per-sweep batch size.
    #[must_use]
    pub fn with_batch_size(mut self, batch_size: i64) -> Self {
        self.batch_size = batch_size;
        self
    }

    /// Set the number of concurrent retry attempts.
    #[must_use]
    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency.max(1);
        self
    }

    /// Run one sweep: claim overdue retryable deliveries and re-attempt
    /// them. Idempotent under concurrent invocation.
    pub async fn sweep(&self) -> SweepStats {
        let now = Utc::now();
        let pool = self.delivery_service.pool();

        let due = match WebhookDelivery::find_due_retries(pool, now, self.batch_size).await {
            Ok(rows) => rows,
            Err(e) => {
                tracing::error!(
                    target: "webhook_delivery",
                    error = %e,
                    "Retry sweep failed to query due deliveries"
                );
                return SweepStats::default();
            }
        };

        if due.is_empty() {
            tracing::debug!(target: "webhook_delivery", "Retry sweep found nothing due");
            return SweepStats::default();
        }

        let lease_until = now + Duration::seconds(CLAIM_LEASE_SECS);
        let semaphore = Arc::new(Semaphore::new(self.concurrency));
        let mut attempts: JoinSet<DeliveryOutcome> = JoinSet::new();

        for delivery in due {
            match WebhookDelivery::claim(pool, delivery.id, delivery.attempt_count, now, lease_until)
                .await
            {
                Ok(true) => {}
                Ok(false) => {
                    tracing::debug!(
                        target: "webhook_delivery",
                        delivery_id = %delivery.id,
                        "Delivery already claimed by a concurrent sweep"
                    );
                    continue;
                }
                Err(e) => {
                    tracing::error!(
                        target: "webhook_delivery",
                        delivery_id = %delivery.id,
                        error = %e,
                        "Failed to claim delivery for retry"
                    );
                    continue;
                }
            }

            let Ok(permit) = semaphore.clone().acquire_owned().await else {
                break;
            };
            let service = self.delivery_service.clone();
            attempts.spawn(async move {
                let _permit = permit;
                service.process_retry(&delivery).await
            });
        }

        let mut stats = SweepStats::default();
        while let Some(joined) = attempts.join_next().await {
            match joined {
                Ok(DeliveryOutcome::Delivered) => {
                    stats.attempted += 1;
                    stats.succeeded += 1;
                }
                Ok(DeliveryOutcome::Scheduled | DeliveryOutcome::DeadLettered) => {
                    stats.attempted += 1;
                    stats.failed += 1;
                }
                Ok(DeliveryOutcome::Skipped) => {}
                Err(e) => {
                    tracing::error!(
                        target: "webhook_delivery",
                        error = %e,
                        "Retry attempt task failed"
                    );
                }
            }
        }

        tracing::info!(
            target: "webhook_delivery",
            attempted = stats.attempted,
            succeeded = stats.succeeded,
            failed = stats.failed,
            "Retry sweep complete"
        );

        stats
    }
}
