//! Tests for the fire-and-forget dispatch boundary.
//!
//! The producer call path must return immediately and never observe an
//! error, whatever the state of the delivery subsystem. These tests run
//! the engine against an unreachable database: every ledger write fails,
//! and the producer-facing surface still never raises.

mod common;

use std::time::Duration;

use common::*;
use lumio_webhooks::{
    DeliveryOutcome, EventPublisher, WebhookEvent, WebhookEventType, WebhookWorker,
};

#[tokio::test]
async fn publish_returns_immediately_without_worker() {
    let (publisher, receiver) = EventPublisher::new(16);
    drop(receiver);

    let start = std::time::Instant::now();
    publisher.publish(WebhookEvent::new(
        WebhookEventType::UserCreated,
        user_created_data(),
    ));
    assert!(
        start.elapsed() < Duration::from_millis(50),
        "publish must not block the producer"
    );
}

#[tokio::test]
async fn deliver_event_swallows_ledger_failures() {
    // The registry query fails (no database); the dispatcher logs and
    // returns instead of propagating.
    let service = test_delivery_service();
    let event = WebhookEvent::new(WebhookEventType::CoursePublished, user_created_data());

    service.deliver_event(&event).await;
}

#[tokio::test]
async fn worker_consumes_events_and_shuts_down() {
    let (publisher, receiver) = EventPublisher::new(16);
    let worker = WebhookWorker::new(test_delivery_service(), receiver);
    let shutdown = worker.shutdown_handle();

    let handle = tokio::spawn(worker.run());

    publisher.publish(WebhookEvent::new(
        WebhookEventType::EnrollmentCreated,
        serde_json::json!({"enrollmentId": "e9"}),
    ));

    // Give the worker a beat to pick the event up, then stop it.
    tokio::time::sleep(Duration::from_millis(50)).await;
    shutdown.notify_one();

    tokio::time::timeout(Duration::from_secs(2), handle)
        .await
        .expect("worker must honor shutdown")
        .expect("worker task must not panic");
}

#[tokio::test]
async fn worker_stops_when_publisher_is_dropped() {
    let (publisher, receiver) = EventPublisher::new(16);
    let worker = WebhookWorker::new(test_delivery_service(), receiver);

    let handle = tokio::spawn(worker.run());
    drop(publisher);

    tokio::time::timeout(Duration::from_secs(2), handle)
        .await
        .expect("worker must stop on channel close")
        .expect("worker task must not panic");
}

#[tokio::test]
async fn retry_with_unreachable_registry_is_skipped() {
    // The sweep path re-checks the subscription before re-attempting; if
    // that lookup fails the row is left untouched.
    let service = test_delivery_service();
    let delivery = make_delivery(
        uuid::Uuid::new_v4(),
        "USER_CREATED",
        user_created_data(),
        1,
        5,
    );

    assert_eq!(
        service.process_retry(&delivery).await,
        DeliveryOutcome::Skipped
    );
}

#[tokio::test]
async fn malformed_url_is_classified_as_attempt_failure() {
    // Configuration errors fail the attempt, not the dispatch: the
    // outcome is a scheduled retry like any transient failure.
    let service = test_delivery_service();
    let subscription = make_subscription("ftp://invalid.example.com/hook", Some(SECRET_1));
    let delivery = make_delivery(subscription.id, "USER_CREATED", user_created_data(), 0, 5);

    assert_eq!(
        service.execute_delivery(&delivery, &subscription).await,
        DeliveryOutcome::Scheduled
    );
}

#[tokio::test]
async fn malformed_url_on_final_attempt_dead_letters() {
    let service = test_delivery_service();
    let subscription = make_subscription("not a url at all", Some(SECRET_1));
    let delivery = make_delivery(subscription.id, "USER_CREATED", user_created_data(), 4, 5);

    assert_eq!(
        service.execute_delivery(&delivery, &subscription).await,
        DeliveryOutcome::DeadLettered
    );
}

#[tokio::test]
async fn missing_signing_secret_is_classified_as_attempt_failure() {
    let service = test_delivery_service();
    let subscription = make_subscription("https://hooks.example.com/lumio", None);
    let delivery = make_delivery(subscription.id, "USER_CREATED", user_created_data(), 0, 5);

    assert_eq!(
        service.execute_delivery(&delivery, &subscription).await,
        DeliveryOutcome::Scheduled
    );
}
