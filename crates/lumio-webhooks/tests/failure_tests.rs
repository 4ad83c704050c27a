//! Tests for failure classification: transport errors and configuration
//! errors all land in the same retry/dead-letter path, and none of them
//! escape the executor.

#![cfg(feature = "integration")]

mod common;

use common::*;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer};

use lumio_webhooks::DeliveryOutcome;

/// A connection failure (nothing listening) is a transient failure.
#[tokio::test]
async fn connection_failure_schedules_a_retry() {
    let service = test_delivery_service();
    // Reserved port with no listener; connect is refused immediately.
    let subscription = make_subscription("http://127.0.0.1:9/hook", Some(SECRET_1));
    let delivery = make_delivery(subscription.id, "USER_CREATED", user_created_data(), 0, 5);

    let outcome = service.execute_delivery(&delivery, &subscription).await;

    assert_eq!(outcome, DeliveryOutcome::Scheduled);
}

/// A connection failure on the final attempt dead-letters.
#[tokio::test]
async fn connection_failure_on_final_attempt_dead_letters() {
    let service = test_delivery_service();
    let subscription = make_subscription("http://127.0.0.1:9/hook", Some(SECRET_1));
    let delivery = make_delivery(subscription.id, "USER_CREATED", user_created_data(), 4, 5);

    let outcome = service.execute_delivery(&delivery, &subscription).await;

    assert_eq!(outcome, DeliveryOutcome::DeadLettered);
}

/// An undecryptable signing secret fails the attempt without the
/// endpoint ever being contacted.
#[tokio::test]
async fn corrupt_secret_fails_before_sending() {
    let mock_server = MockServer::start().await;
    let counter = CountingResponder::new();

    Mock::given(method("POST"))
        .and(path("/hook"))
        .respond_with(counter.clone())
        .mount(&mock_server)
        .await;

    let service = test_delivery_service();
    let mut subscription =
        make_subscription(&format!("{}/hook", mock_server.uri()), Some(SECRET_1));
    subscription.secret_encrypted = Some("bm90LXJlYWwtY2lwaGVydGV4dA==".to_string());
    let delivery = make_delivery(subscription.id, "USER_CREATED", user_created_data(), 0, 5);

    let outcome = service.execute_delivery(&delivery, &subscription).await;

    assert_eq!(outcome, DeliveryOutcome::Scheduled);
    assert_eq!(counter.count(), 0, "no request without a usable secret");
}

/// A missing signing secret is a configuration error, classified like
/// any transient failure.
#[tokio::test]
async fn missing_secret_fails_before_sending() {
    let mock_server = MockServer::start().await;
    let counter = CountingResponder::new();

    Mock::given(method("POST"))
        .and(path("/hook"))
        .respond_with(counter.clone())
        .mount(&mock_server)
        .await;

    let service = test_delivery_service();
    let subscription = make_subscription(&format!("{}/hook", mock_server.uri()), None);
    let delivery = make_delivery(subscription.id, "USER_CREATED", user_created_data(), 0, 5);

    let outcome = service.execute_delivery(&delivery, &subscription).await;

    assert_eq!(outcome, DeliveryOutcome::Scheduled);
    assert_eq!(counter.count(), 0);
}

/// A malformed destination URL never reaches the network layer.
#[tokio::test]
async fn malformed_url_fails_before_sending() {
    let service = test_delivery_service();

    for bad_url in ["", "not a url", "ftp://example.com/hook", "https://"] {
        let subscription = make_subscription(bad_url, Some(SECRET_1));
        let delivery = make_delivery(subscription.id, "USER_CREATED", user_created_data(), 0, 5);

        assert_eq!(
            service.execute_delivery(&delivery, &subscription).await,
            DeliveryOutcome::Scheduled,
            "URL {bad_url:?} should fail into the retry path"
        );
    }
}

/// HTTPS enforcement applies when plain HTTP is not opted into.
#[tokio::test]
async fn plain_http_rejected_without_opt_in() {
    let mock_server = MockServer::start().await;
    let counter = CountingResponder::new();

    Mock::given(method("POST"))
        .and(path("/hook"))
        .respond_with(counter.clone())
        .mount(&mock_server)
        .await;

    // Service without the HTTP opt-in used elsewhere in the suites.
    let service = lumio_webhooks::DeliveryService::new(lazy_pool(), TEST_KEY.to_vec()).unwrap();
    let subscription = make_subscription(&format!("{}/hook", mock_server.uri()), Some(SECRET_1));
    let delivery = make_delivery(subscription.id, "USER_CREATED", user_created_data(), 0, 5);

    let outcome = service.execute_delivery(&delivery, &subscription).await;

    assert_eq!(outcome, DeliveryOutcome::Scheduled);
    assert_eq!(counter.count(), 0, "plain HTTP must not be attempted");
}

/// 4xx client errors are retried like every other non-2xx response.
#[tokio::test]
async fn client_errors_are_retried() {
    for status in [400u16, 401, 403, 404, 410, 422] {
        let mock_server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/hook"))
            .respond_with(CountingResponder::with_status(status))
            .mount(&mock_server)
            .await;

        let service = test_delivery_service();
        let subscription =
            make_subscription(&format!("{}/hook", mock_server.uri()), Some(SECRET_1));
        let delivery = make_delivery(subscription.id, "USER_CREATED", user_created_data(), 0, 5);

        assert_eq!(
            service.execute_delivery(&delivery, &subscription).await,
            DeliveryOutcome::Scheduled,
            "HTTP {status} should be retried"
        );
    }
}
