//! Common test utilities for integration tests.
//!
//! Fixtures for the payment backend's responses and stream payloads, a
//! session factory wired to the mock HTTP client, and a polling helper for
//! waiting on background tasks.

#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use paywatch::adapters::mock::{MockHttpClient, MockResponse};
use paywatch::config::ClientConfig;
use paywatch::session::PaymentSession;
use paywatch::traits::Response;

pub const BASE_URL: &str = "http://localhost:8080";
pub const INITIALIZE_URL: &str = "http://localhost:8080/api/payment/initialize";

/// Retry delay short enough to keep reconnect tests fast.
pub const TEST_RETRY_DELAY: Duration = Duration::from_millis(30);

/// Teardown grace short enough to keep completion tests fast.
pub const TEST_GRACE: Duration = Duration::from_millis(20);

/// Response of a successful order creation.
pub fn order_created(order_id: &str) -> MockResponse {
    MockResponse::Success(Response::json_body(
        200,
        &serde_json::json!({
            "orderId": order_id,
            "amount": 1000,
            "status": "PENDING",
            "paymentUrl": format!("/third-party-payment.html?orderId={}&amount=1000", order_id),
        }),
    ))
}

/// `PAYMENT_STATUS` payload as the backend sends it.
pub fn status_payload(order_id: &str, status: &str, message: &str) -> String {
    serde_json::json!({
        "eventType": "PAYMENT_STATUS",
        "orderId": order_id,
        "status": status,
        "message": message,
        "timestamp": 1736956800000i64,
    })
    .to_string()
}

/// Heartbeat payload as the backend sends it.
pub fn heartbeat_payload() -> String {
    serde_json::json!({
        "eventType": "HEARTBEAT",
        "orderId": null,
        "status": null,
        "message": "heartbeat",
        "timestamp": 1736956800000i64,
    })
    .to_string()
}

/// Config with short delays and tracing on.
pub fn test_config() -> ClientConfig {
    ClientConfig::default()
        .with_base_url(BASE_URL)
        .with_max_reconnect_attempts(3)
        .with_retry_delay(TEST_RETRY_DELAY)
        .with_teardown_grace(TEST_GRACE)
        .with_trace_enabled(true)
}

/// Mock backend that creates `order_id` on initialize.
pub fn mock_backend(order_id: &str) -> MockHttpClient {
    let http = MockHttpClient::new();
    http.set_response(INITIALIZE_URL, order_created(order_id));
    http
}

pub fn session_with(http: &MockHttpClient, config: ClientConfig) -> PaymentSession {
    PaymentSession::new(Arc::new(http.clone()), config)
}

/// Poll `cond` until it holds or `timeout` passes. Returns whether it held.
pub async fn wait_until(mut cond: impl FnMut() -> bool, timeout: Duration) -> bool {
    let deadline = tokio::time::Instant::now() + timeout;
    loop {
        if cond() {
            return true;
        }
        if tokio::time::Instant::now() >= deadline {
            return false;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
}

/// `wait_until` with a generous default timeout, panicking on failure.
pub async fn eventually(what: &str, cond: impl FnMut() -> bool) {
    assert!(
        wait_until(cond, Duration::from_secs(3)).await,
        "timed out waiting for {}",
        what
    );
}
