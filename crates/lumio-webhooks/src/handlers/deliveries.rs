//! Delivery history and dead-letter query handlers.
//!
//! Read-only surface over the ledger. Dead letters (terminal `failed`
//! rows) have no automatic escalation; this is how an administrator
//! finds them for a manual re-test.

use axum::{
    extract::{Path, Query, State},
    Json,
};
use uuid::Uuid;

use crate::error::{ApiResult, WebhookError};
use crate::models::{
    ListDeliveriesQuery, PageQuery, WebhookDeliveryListResponse, WebhookDeliveryResponse,
};
use crate::router::WebhooksState;
use lumio_db::models::{DeliveryStatus, WebhookDelivery, WebhookSubscription};

/// List delivery attempts for a subscription.
#[utoipa::path(
    get,
    path = "/webhooks/subscriptions/{id}/deliveries",
    tag = "Webhooks",
    params(
        ("id" = Uuid, Path, description = "Subscription ID"),
        ListDeliveriesQuery,
    ),
    responses(
        (status = 200, description = "Paginated delivery list", body = WebhookDeliveryListResponse),
        (status = 400, description = "Invalid status filter"),
        (status = 404, description = "Subscription not found"),
    )
)]
pub async fn list_deliveries_handler(
    State(state): State<WebhooksState>,
    Path(subscription_id): Path<Uuid>,
    Query(query): Query<ListDeliveriesQuery>,
) -> ApiResult<Json<WebhookDeliveryListResponse>> {
    WebhookSubscription::find_by_id(state.pool(), subscription_id)
        .await?
        .ok_or(WebhookError::SubscriptionNotFound)?;

    if let Some(ref status) = query.status {
        status
            .parse::<DeliveryStatus>()
            .map_err(WebhookError::Validation)?;
    }

    let limit = query.limit.clamp(1, 100);
    let offset = query.offset.max(0);
    let status = query.status.as_deref();

    let deliveries = WebhookDelivery::list_by_subscription(
        state.pool(),
        subscription_id,
        limit,
        offset,
        status,
    )
    .await?;

    let total = WebhookDelivery::count_by_subscription(state.pool(), subscription_id, status).await?;

    Ok(Json(WebhookDeliveryListResponse {
        items: deliveries.into_iter().map(delivery_to_response).collect(),
        total,
        limit,
        offset,
    }))
}

/// Get one delivery record.
#[utoipa::path(
    get,
    path = "/webhooks/subscriptions/{id}/deliveries/{delivery_id}",
    tag = "Webhooks",
    params(
        ("id" = Uuid, Path, description = "Subscription ID"),
        ("delivery_id" = Uuid, Path, description = "Delivery ID"),
    ),
    responses(
        (status = 200, description = "Delivery details", body = WebhookDeliveryResponse),
        (status = 404, description = "Delivery or subscription not found"),
    )
)]
pub async fn get_delivery_handler(
    State(state): State<WebhooksState>,
    Path((subscription_id, delivery_id)): Path<(Uuid, Uuid)>,
) -> ApiResult<Json<WebhookDeliveryResponse>> {
    WebhookSubscription::find_by_id(state.pool(), subscription_id)
        .await?
        .ok_or(WebhookError::SubscriptionNotFound)?;

    let delivery = WebhookDelivery::find_by_id(state.pool(), subscription_id, delivery_id)
        .await?
        .ok_or(WebhookError::DeliveryNotFound)?;

    Ok(Json(delivery_to_response(delivery)))
}

/// List dead letters across all subscriptions, newest first.
#[utoipa::path(
    get,
    path = "/webhooks/dead-letters",
    tag = "Webhooks",
    params(PageQuery),
    responses(
        (status = 200, description = "Paginated dead-letter list", body = WebhookDeliveryListResponse),
    )
)]
pub async fn list_dead_letters_handler(
    State(state): State<WebhooksState>,
    Query(query): Query<PageQuery>,
) -> ApiResult<Json<WebhookDeliveryListResponse>> {
    let limit = query.limit.clamp(1, 100);
    let offset = query.offset.max(0);

    let dead_letters = WebhookDelivery::list_dead_letters(state.pool(), limit, offset).await?;
    let total = WebhookDelivery::count_dead_letters(state.pool()).await?;

    Ok(Json(WebhookDeliveryListResponse {
        items: dead_letters.into_iter().map(delivery_to_response).collect(),
        total,
        limit,
        offset,
    }))
}

/// Convert a ledger row to its API representation.
pub(crate) fn delivery_to_response(d: WebhookDelivery) -> WebhookDeliveryResponse {
    WebhookDeliveryResponse {
        id: d.id,
        subscription_id: d.subscription_id,
        event_id: d.event_id,
        event_type: d.event_type,
        status: d.status,
        attempt_count: d.attempt_count,
        max_attempts: d.max_attempts,
        last_error: d.last_error,
        response_code: d.response_code,
        latency_ms: d.latency_ms,
        next_retry_at: d.next_retry_at,
        created_at: d.created_at,
        delivered_at: d.delivered_at,
    }
}
