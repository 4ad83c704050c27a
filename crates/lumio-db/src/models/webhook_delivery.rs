//! Webhook delivery ledger model.
//!
//! One row per (event occurrence, subscribed webhook). The dispatcher
//! creates rows, the executor mutates them, the retry sweep claims them.
//! Rows are never deleted by the engine; the ledger is the audit trail.
//!
//! Status transitions are one-directional and enforced in SQL:
//! `pending -> {success, retrying}`, `retrying -> {success, retrying,
//! failed}`; `success` and `failed` are terminal.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, PgPool};
use uuid::Uuid;

/// Lifecycle state of a delivery.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeliveryStatus {
    /// Created, first attempt not yet classified.
    Pending,
    /// Acknowledged with a 2xx response. Terminal.
    Success,
    /// Failed at least once, another attempt is scheduled.
    Retrying,
    /// Attempt cap exhausted without success (dead letter). Terminal.
    Failed,
}

impl DeliveryStatus {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            DeliveryStatus::Pending => "pending",
            DeliveryStatus::Success => "success",
            DeliveryStatus::Retrying => "retrying",
            DeliveryStatus::Failed => "failed",
        }
    }

    /// Terminal states accept no further transitions.
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        matches!(self, DeliveryStatus::Success | DeliveryStatus::Failed)
    }
}

impl fmt::Display for DeliveryStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DeliveryStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(DeliveryStatus::Pending),
            "success" => Ok(DeliveryStatus::Success),
            "retrying" => Ok(DeliveryStatus::Retrying),
            "failed" => Ok(DeliveryStatus::Failed),
            other => Err(format!("Unknown delivery status: {other}")),
        }
    }
}

/// One attempted-or-completed notification of a single event to a single
/// webhook.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct WebhookDelivery {
    pub id: Uuid,
    pub subscription_id: Uuid,
    /// Identity of the event occurrence; together with `subscription_id`
    /// it makes re-dispatch of the same event a no-op.
    pub event_id: Uuid,
    pub event_type: String,
    /// Business payload captured at dispatch time. Never recomputed from
    /// current domain state.
    pub payload: serde_json::Value,
    pub status: String,
    /// Number of failed attempts so far. Incremented on failure only,
    /// capped at `max_attempts`.
    pub attempt_count: i32,
    pub max_attempts: i32,
    pub last_error: Option<String>,
    pub response_code: Option<i16>,
    pub latency_ms: Option<i32>,
    /// Set iff `status = 'retrying'`.
    pub next_retry_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub delivered_at: Option<DateTime<Utc>>,
}

/// Input for creating a delivery row.
#[derive(Debug, Clone)]
pub struct CreateWebhookDelivery {
    pub subscription_id: Uuid,
    pub event_id: Uuid,
    pub event_type: String,
    pub payload: serde_json::Value,
    pub max_attempts: i32,
}

impl WebhookDelivery {
    /// Insert a new pending delivery.
    ///
    /// Returns `None` if a delivery for this (subscription, event) pair
    /// already exists; the dispatcher treats that as an idempotent no-op.
    pub async fn create(
        pool: &PgPool,
        input: CreateWebhookDelivery,
    ) -> Result<Option<Self>, sqlx::Error> {
        sqlx::query_as(
            r#"
            INSERT INTO webhook_deliveries
                (subscription_id, event_id, event_type, payload, status, attempt_count, max_attempts)
            VALUES ($1, $2, $3, $4, 'pending', 0, $5)
            ON CONFLICT (subscription_id, event_id) DO NOTHING
            RETURNING *
            "#,
        )
        .bind(input.subscription_id)
        .bind(input.event_id)
        .bind(input.event_type)
        .bind(input.payload)
        .bind(input.max_attempts)
        .fetch_optional(pool)
        .await
    }

    /// Fetch one delivery scoped to its subscription.
    pub async fn find_by_id(
        pool: &PgPool,
        subscription_id: Uuid,
        id: Uuid,
    ) -> Result<Option<Self>, sqlx::Error> {
        sqlx::query_as(
            r#"
            SELECT * FROM webhook_deliveries
            WHERE subscription_id = $1 AND id = $2
            "#,
        )
        .bind(subscription_id)
        .bind(id)
        .fetch_optional(pool)
        .await
    }

    /// Record a successful delivery. Terminal.
    ///
    /// The status guard keeps terminal rows immutable; returns false if
    /// the row was not in a state that allows the transition.
    pub async fn mark_success(
        pool: &PgPool,
        id: Uuid,
        response_code: i16,
        latency_ms: i32,
    ) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            r#"
            UPDATE webhook_deliveries
            SET status = 'success',
                delivered_at = NOW(),
                response_code = $2,
                latency_ms = $3,
                last_error = NULL,
                next_retry_at = NULL
            WHERE id = $1 AND status IN ('pending', 'retrying')
            "#,
        )
        .bind(id)
        .bind(response_code)
        .bind(latency_ms)
        .execute(pool)
        .await?;

        Ok(result.rows_affected() == 1)
    }

    /// Record a failed attempt.
    ///
    /// `attempt_count` is the new count (previous + 1); the guard
    /// `attempt_count = $3 - 1` keeps the counter strictly monotonic even
    /// under races. A `Some` `next_retry_at` schedules a retry, `None`
    /// dead-letters the row.
    pub async fn mark_failure(
        pool: &PgPool,
        id: Uuid,
        attempt_count: i32,
        error_message: &str,
        response_code: Option<i16>,
        latency_ms: Option<i32>,
        next_retry_at: Option<DateTime<Utc>>,
    ) -> Result<bool, sqlx::Error> {
        let status = if next_retry_at.is_some() {
            DeliveryStatus::Retrying
        } else {
            DeliveryStatus::Failed
        };

        let result = sqlx::query(
            r#"
            UPDATE webhook_deliveries
            SET status = $2,
                attempt_count = $3,
                last_error = $4,
                response_code = $5,
                latency_ms = $6,
                next_retry_at = $7
            WHERE id = $1
              AND status IN ('pending', 'retrying')
              AND attempt_count = $3 - 1
            "#,
        )
        .bind(id)
        .bind(status.as_str())
        .bind(attempt_count)
        .bind(error_message)
        .bind(response_code)
        .bind(latency_ms)
        .bind(next_retry_at)
        .execute(pool)
        .await?;

        Ok(result.rows_affected() == 1)
    }

    /// Retryable deliveries that are due, oldest first.
    ///
    /// Joins on the registry so deliveries of revoked subscriptions are
    /// never selected.
    pub async fn find_due_retries(
        pool: &PgPool,
        now: DateTime<Utc>,
        limit: i64,
    ) -> Result<Vec<Self>, sqlx::Error> {
        sqlx::query_as(
            r#"
            SELECT d.*
            FROM webhook_deliveries d
            JOIN webhook_subscriptions s ON s.id = d.subscription_id
            WHERE d.status = 'retrying'
              AND d.next_retry_at <= $1
              AND d.attempt_count < d.max_attempts
              AND s.enabled
            ORDER BY d.next_retry_at ASC
            LIMIT $2
            "#,
        )
        .bind(now)
        .bind(limit)
        .fetch_all(pool)
        .await
    }

    /// Claim a due delivery for one retry attempt.
    ///
    /// Optimistic conditional update: the claim only succeeds if the row
    /// is still retryable with the expected attempt count and a due
    /// `next_retry_at`. The winner pushes `next_retry_at` to
    /// `lease_until`, so a concurrent sweep's claim matches zero rows and
    /// a crashed worker's claim expires on its own.
    pub async fn claim(
        pool: &PgPool,
        id: Uuid,
        expected_attempt_count: i32,
        now: DateTime<Utc>,
        lease_until: DateTime<Utc>,
    ) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            r#"
            UPDATE webhook_deliveries
            SET next_retry_at = $2
            WHERE id = $1
              AND status = 'retrying'
              AND attempt_count = $3
              AND next_retry_at <= $4
            "#,
        )
        .bind(id)
        .bind(lease_until)
        .bind(expected_attempt_count)
        .bind(now)
        .execute(pool)
        .await?;

        Ok(result.rows_affected() == 1)
    }

    /// Delivery history for one subscription, newest first.
    pub async fn list_by_subscription(
        pool: &PgPool,
        subscription_id: Uuid,
        limit: i64,
        offset: i64,
        status: Option<&str>,
    ) -> Result<Vec<Self>, sqlx::Error> {
        sqlx::query_as(
            r#"
            SELECT * FROM webhook_deliveries
            WHERE subscription_id = $1
              AND ($4::TEXT IS NULL OR status = $4)
            ORDER BY created_at DESC
            LIMIT $2 OFFSET $3
            "#,
        )
        .bind(subscription_id)
        .bind(limit)
        .bind(offset)
        .bind(status)
        .fetch_all(pool)
        .await
    }

    /// Count of delivery rows for one subscription.
    pub async fn count_by_subscription(
        pool: &PgPool,
        subscription_id: Uuid,
        status: Option<&str>,
    ) -> Result<i64, sqlx::Error> {
        sqlx::query_scalar(
            r#"
            SELECT COUNT(*) FROM webhook_deliveries
            WHERE subscription_id = $1
              AND ($2::TEXT IS NULL OR status = $2)
            "#,
        )
        .bind(subscription_id)
        .bind(status)
        .fetch_one(pool)
        .await
    }

    /// Dead letters across all subscriptions, newest first.
    pub async fn list_dead_letters(
        pool: &PgPool,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<Self>, sqlx::Error> {
        sqlx::query_as(
            r#"
            SELECT * FROM webhook_deliveries
            WHERE status = 'failed'
            ORDER BY created_at DESC
            LIMIT $1 OFFSET $2
            "#,
        )
        .bind(limit)
        .bind(offset)
        .fetch_all(pool)
        .await
    }

    /// Total number of dead letters.
    pub async fn count_dead_letters(pool: &PgPool) -> Result<i64, sqlx::Error> {
        sqlx::query_scalar(
            r#"
            SELECT COUNT(*) FROM webhook_deliveries
            WHERE status = 'failed'
            "#,
        )
        .fetch_one(pool)
        .await
    }
}
