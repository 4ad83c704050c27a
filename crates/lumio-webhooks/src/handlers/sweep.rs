//! Retry sweep trigger endpoint.
//!
//! Called periodically by an external scheduler. Guarded by a shared
//! bearer secret compared in constant time.

use axum::extract::State;
use axum::http::{header, HeaderMap};
use axum::Json;

use crate::error::{ApiResult, WebhookError};
use crate::router::WebhooksState;
use crate::services::sweep_service::SweepStats;

/// Run one retry sweep and report its counters.
#[utoipa::path(
    post,
    path = "/webhooks/sweep",
    tag = "Webhooks",
    responses(
        (status = 200, description = "Sweep result counters", body = SweepStats),
        (status = 401, description = "Missing or wrong bearer secret"),
    ),
    security(("bearer_auth" = []))
)]
pub async fn run_sweep_handler(
    State(state): State<WebhooksState>,
    headers: HeaderMap,
) -> ApiResult<Json<SweepStats>> {
    authorize_sweep(&headers, state.sweep_secret())?;

    let stats = state.sweep_service.sweep().await;
    Ok(Json(stats))
}

/// Check the bearer token against the shared sweep secret.
fn authorize_sweep(headers: &HeaderMap, secret: &str) -> Result<(), WebhookError> {
    let token = headers
        .get(header::AUTHORIZATION)
        .and_then(|h| h.to_str().ok())
        .and_then(|h| h.strip_prefix("Bearer "))
        .ok_or(WebhookError::Unauthorized)?;

    // An empty configured secret must never authorize anything.
    if secret.is_empty() {
        return Err(WebhookError::Unauthorized);
    }

    use subtle::ConstantTimeEq;
    if bool::from(token.as_bytes().ct_eq(secret.as_bytes())) {
        Ok(())
    } else {
        Err(WebhookError::Unauthorized)
    }
}
