//! Axum router for the webhook engine's operational endpoints.
//!
//! Subscription CRUD lives in the administrative API; this router only
//! carries the delivery-engine surface: the sweep trigger, the manual
//! test dispatch, and the delivery/dead-letter query endpoints.

use std::sync::Arc;

use axum::{
    routing::{get, post},
    Router,
};
use sqlx::PgPool;

use crate::config::WebhooksConfig;
use crate::error::WebhookError;
use crate::handlers::{deliveries, sweep, test_dispatch};
use crate::rate_limiter::{RateLimitConfig, RateLimiterRegistry};
use crate::services::delivery_service::DeliveryService;
use crate::services::sweep_service::SweepService;

/// Shared state for the webhook handlers.
#[derive(Clone)]
pub struct WebhooksState {
    pub delivery_service: DeliveryService,
    pub sweep_service: SweepService,
    pool: PgPool,
    sweep_secret: Arc<str>,
}

impl WebhooksState {
    /// Build the service graph from a pool and config.
    ///
    /// # Errors
    ///
    /// Returns `WebhookError::Internal` if the delivery HTTP client
    /// cannot be built.
    pub fn new(pool: PgPool, config: &WebhooksConfig) -> Result<Self, WebhookError> {
        let delivery_service = DeliveryService::new(pool.clone(), config.encryption_key.clone())?
            .with_max_attempts(config.max_attempts)
            .with_allow_http(config.allow_http)
            .with_rate_limiter(Arc::new(RateLimiterRegistry::new(RateLimitConfig::default())));

        let sweep_service = SweepService::new(delivery_service.clone())
            .with_batch_size(config.sweep_batch_size)
            .with_concurrency(config.sweep_concurrency);

        Ok(Self {
            delivery_service,
            sweep_service,
            pool,
            sweep_secret: config.sweep_secret.as_str().into(),
        })
    }

    /// Reference to the database pool.
    #[must_use]
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Shared secret guarding the sweep trigger.
    #[must_use]
    pub fn sweep_secret(&self) -> &str {
        &self.sweep_secret
    }
}

/// Creates the webhook router with all routes.
pub fn webhooks_router(state: WebhooksState) -> Router {
    Router::new()
        // Retry sweep trigger (external cron). GET is accepted as an
        // operational convenience for simple schedulers.
        .route(
            "/webhooks/sweep",
            post(sweep::run_sweep_handler).get(sweep::run_sweep_handler),
        )
        // Manual test dispatch to a single webhook
        .route(
            "/webhooks/subscriptions/:id/test",
            post(test_dispatch::test_dispatch_handler),
        )
        // Delivery audit trail
        .route(
            "/webhooks/subscriptions/:id/deliveries",
            get(deliveries::list_deliveries_handler),
        )
        .route(
            "/webhooks/subscriptions/:id/deliveries/:delivery_id",
            get(deliveries::get_delivery_handler),
        )
        // Dead-letter query surface
        .route("/webhooks/dead-letters", get(deliveries::list_dead_letters_handler))
        .with_state(state)
}
