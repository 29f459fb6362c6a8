//! Integration tests for the API server.

use std::sync::{Arc, OnceLock};
use std::time::Duration;

use api::config::Config;
use api::notifications::{NOTIFICATIONS_QUEUE, NotificationForwarder};
use api::rate_limit::{RateLimitConfig, RateLimiter};
use axum::body::Body;
use axum::http::{Request, StatusCode, header};
use common::{AggregateId, BackoffPolicy, Retryable, ShutdownSignal};
use metrics_exporter_prometheus::PrometheusHandle;
use outbox::OutboxEvent;
use queue::{
    Broker, HandlerError, InMemoryBroker, MessageHandler, QueueMessage, QueueWorker, WorkerConfig,
};
use tower::ServiceExt;
use webhook::{DispatcherConfig, WebhookDispatcher, midtrans_signature};
use wiremock::matchers::{header_exists, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

static METRICS_HANDLE: OnceLock<PrometheusHandle> = OnceLock::new();

fn get_metrics_handle() -> PrometheusHandle {
    METRICS_HANDLE
        .get_or_init(|| {
            let builder = metrics_exporter_prometheus::PrometheusBuilder::new();
            builder
                .install_recorder()
                .expect("failed to install Prometheus recorder")
        })
        .clone()
}

fn setup_with_limits(rate_limit: RateLimitConfig) -> axum::Router {
    let config = Config::default();
    let services = api::create_default_state(&config);
    api::create_app(
        services.state,
        RateLimiter::new(rate_limit),
        get_metrics_handle(),
    )
}

fn setup() -> axum::Router {
    setup_with_limits(RateLimitConfig {
        enabled: false,
        ..RateLimitConfig::default()
    })
}

fn booking_body() -> String {
    serde_json::json!({
        "hotel_id": "H-1",
        "room_type": "deluxe",
        "check_in": "2026-11-01",
        "check_out": "2026-11-03",
        "guest_name": "Dewi",
        "guest_email": "dewi@example.com",
        "amount_cents": 240_000_000,
        "currency": "IDR"
    })
    .to_string()
}

fn create_request(idempotency_key: Option<&str>, body: String) -> Request<Body> {
    let mut builder = Request::builder()
        .method("POST")
        .uri("/bookings")
        .header(header::CONTENT_TYPE, "application/json");
    if let Some(key) = idempotency_key {
        builder = builder.header("Idempotency-Key", key);
    }
    builder.body(Body::from(body)).unwrap()
}

async fn json_body(response: axum::response::Response) -> serde_json::Value {
    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    serde_json::from_slice(&body).unwrap()
}

fn payment_notification(order_id: &str, status: &str, server_key: &str) -> String {
    serde_json::json!({
        "order_id": order_id,
        "transaction_id": "tx-9",
        "transaction_status": status,
        "status_code": "200",
        "gross_amount": "2400000.00",
        "signature_key": midtrans_signature(order_id, "200", "2400000.00", server_key),
    })
    .to_string()
}

fn webhook_request(body: String) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri("/webhooks/payments")
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(body))
        .unwrap()
}

#[tokio::test]
async fn test_health_check() {
    let app = setup();

    let response = app
        .oneshot(
            Request::builder()
                .uri("/health")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let json = json_body(response).await;
    assert_eq!(json["status"], "ok");
    assert_eq!(json["providers"][0]["name"], "alpha");
    assert_eq!(json["providers"][1]["name"], "beta");
}

#[tokio::test]
async fn test_metrics_endpoint() {
    let app = setup();

    let response = app
        .oneshot(
            Request::builder()
                .uri("/metrics")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let content_type = response.headers()[header::CONTENT_TYPE].to_str().unwrap();
    assert!(content_type.starts_with("text/plain"));
}

#[tokio::test]
async fn test_create_booking() {
    let app = setup();

    let response = app
        .oneshot(create_request(Some("key-1"), booking_body()))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::CREATED);
    let receipt = json_body(response).await;
    assert_eq!(receipt["provider_code"], "alpha");
    assert_eq!(receipt["status"], "confirmed");
    assert_eq!(receipt["payment_status"], "success");
    assert!(receipt["booking_id"].as_str().is_some());
}

#[tokio::test]
async fn test_create_booking_requires_idempotency_key() {
    let app = setup();

    let response = app
        .oneshot(create_request(None, booking_body()))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let json = json_body(response).await;
    assert!(json["error"].as_str().unwrap().contains("Idempotency-Key"));
}

#[tokio::test]
async fn test_create_booking_rejects_invalid_stay() {
    let app = setup();
    let body = serde_json::json!({
        "hotel_id": "H-1",
        "room_type": "deluxe",
        "check_in": "2026-11-03",
        "check_out": "2026-11-01",
        "guest_name": "Dewi",
        "guest_email": "dewi@example.com",
        "amount_cents": 1000,
        "currency": "IDR"
    })
    .to_string();

    let response = app
        .oneshot(create_request(Some("key-1"), body))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_replayed_key_returns_same_booking() {
    let app = setup();

    let first = json_body(
        app.clone()
            .oneshot(create_request(Some("key-1"), booking_body()))
            .await
            .unwrap(),
    )
    .await;
    let second = json_body(
        app.oneshot(create_request(Some("key-1"), booking_body()))
            .await
            .unwrap(),
    )
    .await;

    assert_eq!(first["booking_id"], second["booking_id"]);
    assert_eq!(first["payment_id"], second["payment_id"]);
}

#[tokio::test]
async fn test_create_and_get_booking() {
    let app = setup();

    let receipt = json_body(
        app.clone()
            .oneshot(create_request(Some("key-1"), booking_body()))
            .await
            .unwrap(),
    )
    .await;
    let booking_id = receipt["booking_id"].as_str().unwrap();

    let response = app
        .oneshot(
            Request::builder()
                .uri(format!("/bookings/{booking_id}"))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let booking = json_body(response).await;
    assert_eq!(booking["id"], booking_id);
    assert_eq!(booking["amount_cents"], 240_000_000);
    assert_eq!(booking["provider_reference"], receipt["provider_reference"]);
}

#[tokio::test]
async fn test_get_nonexistent_booking() {
    let app = setup();

    let response = app
        .oneshot(
            Request::builder()
                .uri(format!("/bookings/{}", AggregateId::new()))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_get_booking_with_invalid_id() {
    let app = setup();

    let response = app
        .oneshot(
            Request::builder()
                .uri("/bookings/not-a-uuid")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_payment_webhook_replay_is_ignored() {
    let app = setup();
    let server_key = Config::default().payment_server_key;

    let receipt = json_body(
        app.clone()
            .oneshot(create_request(Some("key-1"), booking_body()))
            .await
            .unwrap(),
    )
    .await;
    let booking_id = receipt["booking_id"].as_str().unwrap();

    let response = app
        .oneshot(webhook_request(payment_notification(
            booking_id,
            "settlement",
            &server_key,
        )))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let outcome = json_body(response).await;
    assert_eq!(outcome["outcome"], "ignored");
    assert_eq!(outcome["current"], "success");
}

#[tokio::test]
async fn test_payment_webhook_bad_signature() {
    let app = setup();

    let response = app
        .oneshot(webhook_request(payment_notification(
            &AggregateId::new().to_string(),
            "settlement",
            "wrong-server-key",
        )))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_payment_webhook_unknown_booking() {
    let app = setup();
    let server_key = Config::default().payment_server_key;

    let response = app
        .oneshot(webhook_request(payment_notification(
            &AggregateId::new().to_string(),
            "settlement",
            &server_key,
        )))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_rate_limit_rejects_burst_overflow() {
    let app = setup_with_limits(RateLimitConfig {
        requests_per_second: 1,
        burst: 2,
        ..RateLimitConfig::default()
    });
    let lookup = || {
        Request::builder()
            .uri(format!("/bookings/{}", AggregateId::new()))
            .header("X-Client-Id", "partner-1")
            .body(Body::empty())
            .unwrap()
    };

    for _ in 0..2 {
        let response = app.clone().oneshot(lookup()).await.unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }
    let limited = app.clone().oneshot(lookup()).await.unwrap();
    assert_eq!(limited.status(), StatusCode::TOO_MANY_REQUESTS);
    assert!(limited.headers().contains_key(header::RETRY_AFTER));

    // Health is not rate limited.
    let health = app
        .oneshot(
            Request::builder()
                .uri("/health")
                .header("X-Client-Id", "partner-1")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(health.status(), StatusCode::OK);
}

fn forwarder(server: &MockServer) -> NotificationForwarder {
    let dispatcher = WebhookDispatcher::new(
        b"notify-secret".to_vec(),
        DispatcherConfig::default().with_backoff(
            BackoffPolicy::default()
                .with_initial_delay(Duration::from_millis(10))
                .with_max_delay(Duration::from_millis(50)),
        ),
    )
    .unwrap();
    NotificationForwarder::new(
        dispatcher,
        format!("{}/hooks/bookings", server.uri()),
        ShutdownSignal::never(),
    )
}

fn notification_message() -> (OutboxEvent, QueueMessage) {
    let event = OutboxEvent::builder()
        .aggregate_type("booking")
        .aggregate_id(AggregateId::new())
        .event_type("booking.confirmed")
        .payload_raw(serde_json::json!({ "provider_reference": "ALPHA-0001" }))
        .build()
        .unwrap();
    let message = QueueMessage::new(
        event.event_type.clone(),
        serde_json::to_value(&event).unwrap(),
    );
    (event, message)
}

#[tokio::test]
async fn test_notification_forwarded_as_signed_webhook() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/hooks/bookings"))
        .and(header_exists("X-Webhook-Signature"))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&server)
        .await;
    let (event, message) = notification_message();

    forwarder(&server).handle(message).await.unwrap();

    let requests = server.received_requests().await.unwrap();
    assert_eq!(
        requests[0].headers["X-Webhook-Id"].to_str().unwrap(),
        event.id.to_string()
    );
    let body: serde_json::Value = serde_json::from_slice(&requests[0].body).unwrap();
    assert_eq!(body["event_type"], "booking.confirmed");
    assert_eq!(body["data"]["provider_reference"], "ALPHA-0001");
}

#[tokio::test]
async fn test_notification_requeued_when_receiver_stays_down() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(503))
        .mount(&server)
        .await;
    let (_, message) = notification_message();

    let result = forwarder(&server).handle(message).await;

    assert!(result.is_err());
}

#[tokio::test]
async fn test_notification_dropped_on_permanent_rejection() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(410))
        .expect(1)
        .mount(&server)
        .await;
    let (_, message) = notification_message();

    assert!(forwarder(&server).handle(message).await.is_ok());
}

#[tokio::test]
async fn test_log_only_forwarder_acks() {
    let (_, message) = notification_message();
    let forwarder = NotificationForwarder::log_only(ShutdownSignal::never());

    assert!(forwarder.handle(message).await.is_ok());
    assert_eq!(NOTIFICATIONS_QUEUE, "booking.notifications");
}

#[tokio::test]
async fn test_malformed_notification_is_rejected_permanently() {
    let forwarder = NotificationForwarder::log_only(ShutdownSignal::never());
    let message = QueueMessage::new("booking.confirmed", serde_json::json!({ "nope": true }));

    let err = forwarder.handle(message).await.unwrap_err();
    assert!(matches!(err, HandlerError::Malformed(_)));
    assert!(!err.is_retryable());
}

#[tokio::test(start_paused = true)]
async fn test_worker_drops_notification_that_is_not_an_outbox_event() {
    let broker = InMemoryBroker::new();
    broker.declare_queue(NOTIFICATIONS_QUEUE).await.unwrap();
    let body = QueueMessage::new("booking.confirmed", serde_json::json!({ "nope": true }))
        .to_bytes()
        .unwrap();
    broker.publish(NOTIFICATIONS_QUEUE, body).await.unwrap();

    let mut worker = QueueWorker::new(Arc::new(broker.clone()), WorkerConfig::default());
    worker.register_handler(
        NOTIFICATIONS_QUEUE,
        Arc::new(NotificationForwarder::log_only(ShutdownSignal::never())),
    );
    worker.start(ShutdownSignal::never()).unwrap();

    tokio::time::sleep(Duration::from_millis(50)).await;
    worker.stop().await;

    assert_eq!(broker.dropped().len(), 1);
    assert_eq!(broker.depth(NOTIFICATIONS_QUEUE), 0);
    assert_eq!(broker.acked_count(), 0);
}
