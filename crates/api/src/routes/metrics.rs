//! Prometheus metrics endpoint.

use axum::extract::State;
use axum::http::{StatusCode, header};
use axum::response::IntoResponse;
use metrics::{describe_counter, describe_histogram};
use metrics_exporter_prometheus::PrometheusHandle;

const CONTENT_TYPE: &str = "text/plain; version=0.0.4; charset=utf-8";

/// Registers help text for the counters the coordination layer emits.
pub fn describe() {
    describe_counter!("saga_executions_total", "Saga runs started");
    describe_counter!("saga_completed", "Sagas that ran every step");
    describe_counter!("saga_failed", "Sagas rolled back after a step failed");
    describe_counter!(
        "saga_compensation_failed",
        "Sagas whose rollback failed and need manual intervention"
    );
    describe_histogram!("saga_duration_seconds", "Saga run time");
    describe_counter!("idempotency_hits_total", "Requests answered from the idempotency cache");
    describe_counter!("idempotency_misses_total", "Requests that executed their operation");
    describe_counter!("outbox_events_published_total", "Outbox events handed to the publisher");
    describe_counter!("outbox_publish_failures_total", "Outbox publish attempts that failed");
    describe_counter!("queue_messages_acked_total", "Queue messages handled and acknowledged");
    describe_counter!("queue_messages_requeued_total", "Queue messages returned for redelivery");
    describe_counter!("queue_messages_dropped_total", "Malformed queue messages discarded");
    describe_counter!("webhook_deliveries_total", "Webhook posts answered with 2xx");
    describe_counter!("webhook_delivery_failures_total", "Webhook posts that failed");
    describe_counter!("provider_booking_failures_total", "Supplier booking attempts that failed");
    describe_counter!("rate_limit_rejections_total", "Requests rejected by the rate limiter");
}

/// GET /metrics: returns Prometheus-formatted metrics.
pub async fn get(State(handle): State<PrometheusHandle>) -> impl IntoResponse {
    (
        StatusCode::OK,
        [(header::CONTENT_TYPE, CONTENT_TYPE)],
        handle.render(),
    )
}
