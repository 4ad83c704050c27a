//! Webhook delivery execution service.
//!
//! Covers two roles around the delivery ledger:
//!
//! - **fan-out**: resolve the active subscriptions matching an event,
//!   create one pending ledger row each, and fire one independent task
//!   per subscription for the first attempt;
//! - **execution**: perform a single signed HTTP POST, classify the
//!   outcome, and record it on the row.
//!
//! Every failure path ends in the ledger; nothing escapes to the event
//! producer.

use std::sync::Arc;
use std::time::Instant;

use chrono::{DateTime, Duration, Utc};
use rand::Rng;
use reqwest::Client;
use sqlx::PgPool;

use crate::crypto;
use crate::error::WebhookError;
use crate::models::DeliveryEnvelope;
use crate::rate_limiter::RateLimiterRegistry;
use crate::services::event_publisher::WebhookEvent;
use crate::validation;
use lumio_db::models::{CreateWebhookDelivery, WebhookDelivery, WebhookSubscription};

/// Default maximum delivery attempts per row (initial + 4 retries).
pub const DEFAULT_MAX_ATTEMPTS: i32 = 5;

/// Per-attempt HTTP timeout.
const ATTEMPT_TIMEOUT_SECS: u64 = 10;

/// First retry delay; doubles per failed attempt.
const BACKOFF_BASE_SECS: i64 = 60;

/// Backoff ceiling (1 hour).
const BACKOFF_CEILING_SECS: i64 = 3600;

/// Random jitter added on top of the delay, as a fraction of it.
/// Kept below the doubling factor so delays stay non-decreasing.
const BACKOFF_JITTER_FRACTION: f64 = 0.10;

/// Classified result of one delivery attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeliveryOutcome {
    /// 2xx acknowledged; the row is terminally successful.
    Delivered,
    /// Failed with attempts left; a retry is scheduled.
    Scheduled,
    /// Failed with the attempt cap exhausted; the row is a dead letter.
    DeadLettered,
    /// Not attempted (subscription revoked or deleted mid-flight).
    Skipped,
}

/// Service for webhook delivery operations.
#[derive(Clone)]
pub struct DeliveryService {
    pool: PgPool,
    http_client: Client,
    encryption_key: Vec<u8>,
    max_attempts: i32,
    allow_http: bool,
    /// Per-destination throttling; process-local state.
    rate_limiter: Option<Arc<RateLimiterRegistry>>,
}

impl DeliveryService {
    /// Create a new delivery service with a shared HTTP client.
    ///
    /// # Errors
    ///
    /// Returns `WebhookError::Internal` if the HTTP client cannot be built.
    pub fn new(pool: PgPool, encryption_key: Vec<u8>) -> Result<Self, WebhookError> {
        let http_client = Client::builder()
            .timeout(std::time::Duration::from_secs(ATTEMPT_TIMEOUT_SECS))
            .user_agent("lumio-webhooks/0.3")
            .redirect(reqwest::redirect::Policy::none())
            .build()
            .map_err(|e| WebhookError::Internal(format!("Failed to build HTTP client: {e}")))?;

        Ok(Self {
            pool,
            http_client,
            encryption_key,
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            allow_http: false,
            rate_limiter: None,
        })
    }

    /// Set the maximum delivery attempts.
    #[must_use]
    pub fn with_max_attempts(mut self, max: i32) -> Self {
        self.max_attempts = max;
        self
    }

    /// Allow plain HTTP destinations (development/testing).
    #[must_use]
    pub fn with_allow_http(mut self, allow: bool) -> Self {
        self.allow_http = allow;
        self
    }

    /// Set the rate limiter registry for per-destination throttling.
    #[must_use]
    pub fn with_rate_limiter(mut self, registry: Arc<RateLimiterRegistry>) -> Self {
        self.rate_limiter = Some(registry);
        self
    }

    /// Fan an event out to all matching active subscriptions.
    ///
    /// Creates one ledger row per subscription and spawns one task per
    /// first attempt, so subscribers fail or succeed independently.
    /// Returns once the fan-out is scheduled; all errors are logged and
    /// swallowed.
    pub async fn deliver_event(&self, event: &WebhookEvent) {
        let subscriptions =
            match WebhookSubscription::find_active_by_event_type(&self.pool, &event.event_type)
                .await
            {
                Ok(subs) => subs,
                Err(e) => {
                    tracing::error!(
                        target: "webhook_delivery",
                        event_id = %event.event_id,
                        event_type = %event.event_type,
                        error = %e,
                        "Failed to query matching subscriptions"
                    );
                    return;
                }
            };

        if subscriptions.is_empty() {
            tracing::debug!(
                target: "webhook_delivery",
                event_id = %event.event_id,
                event_type = %event.event_type,
                "No active subscriptions match event type"
            );
            return;
        }

        tracing::info!(
            target: "webhook_delivery",
            event_id = %event.event_id,
            event_type = %event.event_type,
            subscription_count = subscriptions.len(),
            "Fanning event out to matching subscriptions"
        );

        for subscription in subscriptions {
            let service = self.clone();
            let event = event.clone();
            tokio::spawn(async move {
                service.dispatch_to_subscription(&subscription, &event).await;
            });
        }
    }

    /// Create a ledger row for one subscription and run the first attempt.
    pub async fn dispatch_to_subscription(
        &self,
        subscription: &WebhookSubscription,
        event: &WebhookEvent,
    ) -> Option<DeliveryOutcome> {
        let delivery = match WebhookDelivery::create(
            &self.pool,
            CreateWebhookDelivery {
                subscription_id: subscription.id,
                event_id: event.event_id,
                event_type: event.event_type.clone(),
                payload: event.data.clone(),
                max_attempts: self.max_attempts,
            },
        )
        .await
        {
            Ok(Some(d)) => d,
            Ok(None) => {
                tracing::debug!(
                    target: "webhook_delivery",
                    subscription_id = %subscription.id,
                    event_id = %event.event_id,
                    "Delivery already exists for this event; skipping re-dispatch"
                );
                return None;
            }
            Err(e) => {
                tracing::error!(
                    target: "webhook_delivery",
                    subscription_id = %subscription.id,
                    event_id = %event.event_id,
                    error = %e,
                    "Failed to create delivery record"
                );
                return None;
            }
        };

        Some(self.execute_delivery(&delivery, subscription).await)
    }

    /// Execute a single delivery attempt against the subscription's URL.
    ///
    /// Side effects are confined to this delivery's row. Configuration
    /// problems (bad URL, unusable secret) are classified exactly like
    /// transport failures.
    pub async fn execute_delivery(
        &self,
        delivery: &WebhookDelivery,
        subscription: &WebhookSubscription,
    ) -> DeliveryOutcome {
        if let Some(ref registry) = self.rate_limiter {
            let waited = registry.acquire(subscription.id).await;
            if !waited.is_zero() {
                tracing::debug!(
                    target: "webhook_delivery",
                    delivery_id = %delivery.id,
                    subscription_id = %subscription.id,
                    wait_ms = waited.as_millis() as u64,
                    "Rate limited; waited before delivery"
                );
            }
        }

        if let Err(e) = validation::validate_webhook_url(&subscription.url, self.allow_http) {
            return self
                .handle_failure(delivery, subscription, &e.to_string(), None, None)
                .await;
        }

        let timestamp_ms = Utc::now().timestamp_millis();
        let timestamp = timestamp_ms.to_string();
        let envelope = DeliveryEnvelope {
            event: delivery.event_type.clone(),
            data: delivery.payload.clone(),
            delivery_id: delivery.id,
            timestamp: timestamp_ms,
        };
        let body = match serde_json::to_vec(&envelope) {
            Ok(b) => b,
            Err(e) => {
                return self
                    .handle_failure(
                        delivery,
                        subscription,
                        &format!("Failed to serialize payload: {e}"),
                        None,
                        None,
                    )
                    .await;
            }
        };

        let secret = match subscription.secret_encrypted {
            Some(ref sealed) => match crypto::decrypt_secret(sealed, &self.encryption_key) {
                Ok(secret) => secret,
                Err(e) => {
                    return self
                        .handle_failure(
                            delivery,
                            subscription,
                            &format!("Signing secret unusable: {e}"),
                            None,
                            None,
                        )
                        .await;
                }
            },
            None => {
                return self
                    .handle_failure(
                        delivery,
                        subscription,
                        "No signing secret configured",
                        None,
                        None,
                    )
                    .await;
            }
        };

        let signature = crypto::sign_payload(&secret, &timestamp, &body);

        // Header values are fixed strings, hex digests and formatted
        // UUIDs; these parses cannot fail.
        let mut headers = reqwest::header::HeaderMap::new();
        if let Ok(v) = "application/json".parse() {
            headers.insert("Content-Type", v);
        }
        if let Ok(v) = signature.parse() {
            headers.insert("X-Webhook-Signature", v);
        }
        if let Ok(v) = timestamp.parse() {
            headers.insert("X-Webhook-Timestamp", v);
        }
        if let Ok(v) = delivery.id.to_string().parse() {
            headers.insert("X-Webhook-Delivery", v);
        }

        let start = Instant::now();
        let result = self
            .http_client
            .post(&subscription.url)
            .headers(headers)
            .body(body)
            .send()
            .await;
        let latency_ms = start.elapsed().as_millis() as i32;

        match result {
            Ok(response) => {
                let status_code = response.status().as_u16();
                if (200..300).contains(&status_code) {
                    self.handle_success(delivery, subscription, status_code as i16, latency_ms)
                        .await
                } else {
                    self.handle_failure(
                        delivery,
                        subscription,
                        &format!("HTTP {status_code}"),
                        Some(status_code as i16),
                        Some(latency_ms),
                    )
                    .await
                }
            }
            Err(e) => {
                let error_msg = if e.is_timeout() {
                    format!("Request timed out after {ATTEMPT_TIMEOUT_SECS}s")
                } else if e.is_connect() {
                    format!("Connection failed: {e}")
                } else {
                    format!("Request error: {e}")
                };

                self.handle_failure(delivery, subscription, &error_msg, None, Some(latency_ms))
                    .await
            }
        }
    }

    /// Re-attempt a claimed delivery from the retry sweep.
    ///
    /// Skips without touching the row if the subscription was revoked or
    /// deleted since the sweep selected it.
    pub async fn process_retry(&self, delivery: &WebhookDelivery) -> DeliveryOutcome {
        let subscription =
            match WebhookSubscription::find_by_id(&self.pool, delivery.subscription_id).await {
                Ok(Some(sub)) if sub.enabled => sub,
                Ok(_) => {
                    tracing::debug!(
                        target: "webhook_delivery",
                        delivery_id = %delivery.id,
                        subscription_id = %delivery.subscription_id,
                        "Skipping retry; subscription revoked or deleted"
                    );
                    return DeliveryOutcome::Skipped;
                }
                Err(e) => {
                    tracing::error!(
                        target: "webhook_delivery",
                        delivery_id = %delivery.id,
                        error = %e,
                        "Failed to load subscription for retry"
                    );
                    return DeliveryOutcome::Skipped;
                }
            };

        self.execute_delivery(delivery, &subscription).await
    }

    /// Record a successful delivery.
    async fn handle_success(
        &self,
        delivery: &WebhookDelivery,
        subscription: &WebhookSubscription,
        response_code: i16,
        latency_ms: i32,
    ) -> DeliveryOutcome {
        tracing::info!(
            target: "webhook_delivery",
            delivery_id = %delivery.id,
            subscription_id = %subscription.id,
            event_id = %delivery.event_id,
            event_type = %delivery.event_type,
            response_code,
            latency_ms,
            attempt_count = delivery.attempt_count,
            "Webhook delivery succeeded"
        );

        if let Err(e) =
            WebhookDelivery::mark_success(&self.pool, delivery.id, response_code, latency_ms).await
        {
            tracing::error!(
                target: "webhook_delivery",
                delivery_id = %delivery.id,
                error = %e,
                "Failed to record delivery success"
            );
        }

        DeliveryOutcome::Delivered
    }

    /// Record a failed attempt: schedule a retry or dead-letter the row.
    async fn handle_failure(
        &self,
        delivery: &WebhookDelivery,
        subscription: &WebhookSubscription,
        error_message: &str,
        response_code: Option<i16>,
        latency_ms: Option<i32>,
    ) -> DeliveryOutcome {
        let attempt_count = delivery.attempt_count + 1;
        let next_retry_at = calculate_next_retry_at(attempt_count, delivery.max_attempts);
        let dead_lettered = next_retry_at.is_none();

        tracing::warn!(
            target: "webhook_delivery",
            delivery_id = %delivery.id,
            subscription_id = %subscription.id,
            event_id = %delivery.event_id,
            event_type = %delivery.event_type,
            error = %error_message,
            attempt_count,
            dead_lettered,
            "Webhook delivery failed"
        );

        if let Err(e) = WebhookDelivery::mark_failure(
            &self.pool,
            delivery.id,
            attempt_count,
            error_message,
            response_code,
            latency_ms,
            next_retry_at,
        )
        .await
        {
            tracing::error!(
                target: "webhook_delivery",
                delivery_id = %delivery.id,
                error = %e,
                "Failed to record delivery failure"
            );
        }

        if dead_lettered {
            DeliveryOutcome::DeadLettered
        } else {
            DeliveryOutcome::Scheduled
        }
    }

    /// Reference to the connection pool (for the sweep and handlers).
    #[must_use]
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

/// Deterministic part of the backoff: `60s * 2^(k-1)`, capped at the
/// ceiling. Non-decreasing in `k`.
fn base_backoff_secs(attempt_count: i32) -> i64 {
    let exp = (attempt_count - 1).clamp(0, 30) as u32;
    BACKOFF_BASE_SECS
        .saturating_mul(1i64 << exp)
        .min(BACKOFF_CEILING_SECS)
}

/// Backoff delay for a given failed-attempt count, with jitter.
///
/// The jitter desynchronizes retries of deliveries that failed together,
/// so an endpoint coming back up is not hit by a retry storm.
#[must_use]
pub fn backoff_delay(attempt_count: i32) -> Duration {
    let base = base_backoff_secs(attempt_count);
    let jitter_ceiling = (base as f64 * BACKOFF_JITTER_FRACTION) as i64;
    let jitter = if jitter_ceiling > 0 {
        rand::thread_rng().gen_range(0..=jitter_ceiling)
    } else {
        0
    };
    Duration::seconds(base + jitter)
}

/// When the next retry for a delivery should run.
///
/// Returns `None` once the attempt cap is reached: the delivery is a
/// dead letter.
#[must_use]
pub fn calculate_next_retry_at(attempt_count: i32, max_attempts: i32) -> Option<DateTime<Utc>> {
    if attempt_count >= max_attempts {
        return None;
    }
    Some(Utc::now() + backoff_delay(attempt_count))
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
