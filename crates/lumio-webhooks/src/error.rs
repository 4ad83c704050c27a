//! Error types for the webhook delivery engine.
//!
//! None of these ever reach the event producer: dispatch is
//! fire-and-forget and the executor captures its own failures into the
//! ledger. They surface only through the operational HTTP endpoints.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::Serialize;
use utoipa::ToSchema;

/// Webhook engine error variants.
#[derive(Debug, thiserror::Error)]
pub enum WebhookError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Invalid URL: {0}")]
    InvalidUrl(String),

    #[error("Subscription not found")]
    SubscriptionNotFound,

    #[error("Delivery not found")]
    DeliveryNotFound,

    #[error("Encryption failed: {0}")]
    EncryptionFailed(String),

    #[error("Unauthorized")]
    Unauthorized,

    #[error("Invalid request: {0}")]
    Validation(String),

    #[error("Invalid configuration: {0}")]
    Config(String),

    #[error("Internal server error: {0}")]
    Internal(String),
}

/// JSON error envelope returned by the operational endpoints.
#[derive(Debug, Serialize, ToSchema)]
pub struct ErrorResponse {
    pub error: String,
    pub message: String,
    pub status: u16,
}

impl IntoResponse for WebhookError {
    fn into_response(self) -> Response {
        let (status, error_type) = match &self {
            WebhookError::Database(_) => (StatusCode::INTERNAL_SERVER_ERROR, "database_error"),
            WebhookError::InvalidUrl(_) => (StatusCode::BAD_REQUEST, "invalid_url"),
            WebhookError::SubscriptionNotFound => {
                (StatusCode::NOT_FOUND, "subscription_not_found")
            }
            WebhookError::DeliveryNotFound => (StatusCode::NOT_FOUND, "delivery_not_found"),
            WebhookError::EncryptionFailed(_) => {
                (StatusCode::INTERNAL_SERVER_ERROR, "encryption_error")
            }
            WebhookError::Unauthorized => (StatusCode::UNAUTHORIZED, "unauthorized"),
            WebhookError::Validation(_) => (StatusCode::BAD_REQUEST, "validation_error"),
            WebhookError::Config(_) => (StatusCode::INTERNAL_SERVER_ERROR, "configuration_error"),
            WebhookError::Internal(_) => (StatusCode::INTERNAL_SERVER_ERROR, "internal_error"),
        };

        let body = ErrorResponse {
            error: error_type.to_string(),
            message: self.to_string(),
            status: status.as_u16(),
        };

        (status, axum::Json(body)).into_response()
    }
}

pub type ApiResult<T> = Result<T, WebhookError>;
