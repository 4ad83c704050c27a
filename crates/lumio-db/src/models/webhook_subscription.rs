//! Webhook subscription model (the subscriber registry).
//!
//! Subscriptions are created, updated and revoked by the administrative
//! API; the delivery engine consumes them read-only through
//! [`WebhookSubscription::find_active_by_event_type`] and
//! [`WebhookSubscription::is_active`].

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, PgPool};
use uuid::Uuid;

/// A registered webhook subscription.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct WebhookSubscription {
    pub id: Uuid,
    pub name: String,
    pub url: String,
    /// Signing secret, AES-256-GCM encrypted and base64 encoded.
    /// Never exposed in plaintext after creation.
    pub secret_encrypted: Option<String>,
    pub event_types: Vec<String>,
    pub enabled: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Input for creating a webhook subscription.
#[derive(Debug, Clone)]
pub struct CreateWebhookSubscription {
    pub name: String,
    pub url: String,
    pub secret_encrypted: Option<String>,
    pub event_types: Vec<String>,
}

impl WebhookSubscription {
    /// Insert a new subscription.
    pub async fn create(
        pool: &PgPool,
        input: CreateWebhookSubscription,
    ) -> Result<Self, sqlx::Error> {
        sqlx::query_as(
            r#"
            INSERT INTO webhook_subscriptions (name, url, secret_encrypted, event_types)
            VALUES ($1, $2, $3, $4)
            RETURNING *
            "#,
        )
        .bind(input.name)
        .bind(input.url)
        .bind(input.secret_encrypted)
        .bind(input.event_types)
        .fetch_one(pool)
        .await
    }

    /// Fetch a subscription by id.
    pub async fn find_by_id(pool: &PgPool, id: Uuid) -> Result<Option<Self>, sqlx::Error> {
        sqlx::query_as(
            r#"
            SELECT * FROM webhook_subscriptions
            WHERE id = $1
            "#,
        )
        .bind(id)
        .fetch_optional(pool)
        .await
    }

    /// All enabled subscriptions whose event types include `event_type`.
    ///
    /// This is the fan-out query the event dispatcher runs per event.
    pub async fn find_active_by_event_type(
        pool: &PgPool,
        event_type: &str,
    ) -> Result<Vec<Self>, sqlx::Error> {
        sqlx::query_as(
            r#"
            SELECT * FROM webhook_subscriptions
            WHERE enabled AND $1 = ANY(event_types)
            ORDER BY created_at ASC
            "#,
        )
        .bind(event_type)
        .fetch_all(pool)
        .await
    }

    /// Whether a subscription exists and is enabled.
    pub async fn is_active(pool: &PgPool, id: Uuid) -> Result<bool, sqlx::Error> {
        let enabled: Option<bool> = sqlx::query_scalar(
            r#"
            SELECT enabled FROM webhook_subscriptions
            WHERE id = $1
            "#,
        )
        .bind(id)
        .fetch_optional(pool)
        .await?;

        Ok(enabled.unwrap_or(false))
    }

    /// List subscriptions with pagination, optionally filtered by enabled state.
    pub async fn list(
        pool: &PgPool,
        limit: i64,
        offset: i64,
        enabled: Option<bool>,
    ) -> Result<Vec<Self>, sqlx::Error> {
        sqlx::query_as(
            r#"
            SELECT * FROM webhook_subscriptions
            WHERE ($3::BOOLEAN IS NULL OR enabled = $3)
            ORDER BY created_at DESC
            LIMIT $1 OFFSET $2
            "#,
        )
        .bind(limit)
        .bind(offset)
        .bind(enabled)
        .fetch_all(pool)
        .await
    }

    /// Enable or disable (revoke) a subscription.
    ///
    /// Returns false if the subscription does not exist. Disabling stops
    /// future sweeps from selecting its deliveries; in-flight attempts
    /// are allowed to complete.
    pub async fn set_enabled(pool: &PgPool, id: Uuid, enabled: bool) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            r#"
            UPDATE webhook_subscriptions
            SET enabled = $2, updated_at = NOW()
            WHERE id = $1
            "#,
        )
        .bind(id)
        .bind(enabled)
        .execute(pool)
        .await?;

        Ok(result.rows_affected() == 1)
    }
}
