//! Event types, the outbound delivery envelope, and API DTOs.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::{IntoParams, ToSchema};
use uuid::Uuid;

// ---------------------------------------------------------------------------
// Event types
// ---------------------------------------------------------------------------

/// Domain events the platform can notify subscribers about.
///
/// Wire format is SCREAMING_SNAKE_CASE, e.g. `USER_CREATED`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum WebhookEventType {
    UserCreated,
    UserUpdated,
    UserDeleted,
    CoursePublished,
    CourseUnpublished,
    EnrollmentCreated,
    EnrollmentCancelled,
    CertificateIssued,
}

impl WebhookEventType {
    /// Every event type subscribers may register for.
    pub const ALL: [WebhookEventType; 8] = [
        WebhookEventType::UserCreated,
        WebhookEventType::UserUpdated,
        WebhookEventType::UserDeleted,
        WebhookEventType::CoursePublished,
        WebhookEventType::CourseUnpublished,
        WebhookEventType::EnrollmentCreated,
        WebhookEventType::EnrollmentCancelled,
        WebhookEventType::CertificateIssued,
    ];

    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            WebhookEventType::UserCreated => "USER_CREATED",
            WebhookEventType::UserUpdated => "USER_UPDATED",
            WebhookEventType::UserDeleted => "USER_DELETED",
            WebhookEventType::CoursePublished => "COURSE_PUBLISHED",
            WebhookEventType::CourseUnpublished => "COURSE_UNPUBLISHED",
            WebhookEventType::EnrollmentCreated => "ENROLLMENT_CREATED",
            WebhookEventType::EnrollmentCancelled => "ENROLLMENT_CANCELLED",
            WebhookEventType::CertificateIssued => "CERTIFICATE_ISSUED",
        }
    }
}

impl std::fmt::Display for WebhookEventType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for WebhookEventType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .iter()
            .find(|t| t.as_str() == s)
            .copied()
            .ok_or_else(|| format!("Unknown event type: {s}"))
    }
}

// ---------------------------------------------------------------------------
// Outbound envelope
// ---------------------------------------------------------------------------

/// JSON body POSTed to the subscriber URL.
///
/// `timestamp` is unix milliseconds and matches the
/// `X-Webhook-Timestamp` header the signature is computed over; it is
/// fresh per attempt while `data` stays frozen at dispatch time.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeliveryEnvelope {
    pub event: String,
    pub data: serde_json::Value,
    pub delivery_id: Uuid,
    pub timestamp: i64,
}

// ---------------------------------------------------------------------------
// API DTOs
// ---------------------------------------------------------------------------

/// Delivery record as returned by the query endpoints.
#[derive(Debug, Serialize, ToSchema)]
pub struct WebhookDeliveryResponse {
    pub id: Uuid,
    pub subscription_id: Uuid,
    pub event_id: Uuid,
    pub event_type: String,
    pub status: String,
    pub attempt_count: i32,
    pub max_attempts: i32,
    pub last_error: Option<String>,
    pub response_code: Option<i16>,
    pub latency_ms: Option<i32>,
    pub next_retry_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub delivered_at: Option<DateTime<Utc>>,
}

/// Paginated delivery list.
#[derive(Debug, Serialize, ToSchema)]
pub struct WebhookDeliveryListResponse {
    pub items: Vec<WebhookDeliveryResponse>,
    pub total: i64,
    pub limit: i64,
    pub offset: i64,
}

/// Query parameters for delivery history listings.
#[derive(Debug, Deserialize, IntoParams)]
pub struct ListDeliveriesQuery {
    #[serde(default = "default_limit")]
    pub limit: i64,
    #[serde(default)]
    pub offset: i64,
    /// Optional status filter (`pending`, `success`, `retrying`, `failed`).
    pub status: Option<String>,
}

/// Query parameters for paginated listings without a status filter.
#[derive(Debug, Deserialize, IntoParams)]
pub struct PageQuery {
    #[serde(default = "default_limit")]
    pub limit: i64,
    #[serde(default)]
    pub offset: i64,
}

fn default_limit() -> i64 {
    50
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
