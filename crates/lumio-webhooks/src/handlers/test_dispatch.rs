//! Manual test-delivery endpoint.
//!
//! Lets an administrator send one synthetic event to a single webhook,
//! using its first subscribed event type. The attempt goes through the
//! regular executor and ledger, but no other subscriber ever sees it.

use axum::{
    extract::{Path, State},
    Json,
};
use chrono::Utc;
use uuid::Uuid;

use crate::error::{ApiResult, WebhookError};
use crate::handlers::deliveries::delivery_to_response;
use crate::models::WebhookDeliveryResponse;
use crate::router::WebhooksState;
use crate::services::event_publisher::WebhookEvent;
use lumio_db::models::{CreateWebhookDelivery, WebhookDelivery, WebhookSubscription};

/// Dispatch a synthetic test event to one webhook and report the result.
#[utoipa::path(
    post,
    path = "/webhooks/subscriptions/{id}/test",
    tag = "Webhooks",
    params(("id" = Uuid, Path, description = "Subscription ID")),
    responses(
        (status = 200, description = "Delivery record after the test attempt", body = WebhookDeliveryResponse),
        (status = 400, description = "Subscription disabled or has no event types"),
        (status = 404, description = "Subscription not found"),
    )
)]
pub async fn test_dispatch_handler(
    State(state): State<WebhooksState>,
    Path(subscription_id): Path<Uuid>,
) -> ApiResult<Json<WebhookDeliveryResponse>> {
    let subscription = WebhookSubscription::find_by_id(state.pool(), subscription_id)
        .await?
        .ok_or(WebhookError::SubscriptionNotFound)?;

    if !subscription.enabled {
        return Err(WebhookError::Validation(
            "Subscription is disabled".to_string(),
        ));
    }

    let event_type = subscription.event_types.first().cloned().ok_or_else(|| {
        WebhookError::Validation("Subscription has no subscribed event types".to_string())
    })?;

    let event = WebhookEvent {
        event_id: Uuid::new_v4(),
        event_type,
        timestamp: Utc::now(),
        data: serde_json::json!({
            "test": true,
            "subscriptionId": subscription.id,
            "triggeredAt": Utc::now(),
        }),
    };

    tracing::info!(
        target: "webhook_delivery",
        subscription_id = %subscription.id,
        event_type = %event.event_type,
        "Dispatching manual test event"
    );

    // Create the ledger row here so the attempt's recorded state can be
    // re-read by id; the attempt itself runs inline through the regular
    // executor so the caller sees a settled outcome.
    let delivery = WebhookDelivery::create(
        state.pool(),
        CreateWebhookDelivery {
            subscription_id: subscription.id,
            event_id: event.event_id,
            event_type: event.event_type.clone(),
            payload: event.data.clone(),
            max_attempts: 1,
        },
    )
    .await?
    .ok_or_else(|| WebhookError::Internal("Failed to create test delivery record".to_string()))?;

    let outcome = state
        .delivery_service
        .execute_delivery(&delivery, &subscription)
        .await;

    tracing::debug!(
        target: "webhook_delivery",
        subscription_id = %subscription.id,
        delivery_id = %delivery.id,
        outcome = ?outcome,
        "Manual test delivery finished"
    );

    let settled = WebhookDelivery::find_by_id(state.pool(), subscription.id, delivery.id)
        .await?
        .ok_or(WebhookError::DeliveryNotFound)?;

    Ok(Json(delivery_to_response(settled)))
}
