//! HTTP API server for the booking coordination layer.
//!
//! Exposes booking creation (behind an `Idempotency-Key`), booking lookup
//! and the payment gateway's notification webhook, with structured logging
//! (tracing), Prometheus metrics and per-client rate limiting.

pub mod config;
pub mod error;
pub mod notifications;
pub mod rate_limit;
pub mod routes;

use std::sync::Arc;

use axum::Router;
use axum::middleware;
use axum::routing::{get, post};
use domain::{HotelOffer, InMemoryBookingRepository, Money};
use idempotency::IdempotencyConfig;
use metrics_exporter_prometheus::PrometheusHandle;
use outbox::Outbox;
use providers::{InMemoryProvider, ProviderRegistry};
use saga::{BookingConfig, BookingCoordinator, InMemoryPaymentGateway, PaymentWebhookService};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use config::Config;
use rate_limit::RateLimiter;

/// Shared application state accessible from all handlers.
pub struct AppState {
    pub bookings: Arc<BookingCoordinator>,
    pub payments: Arc<PaymentWebhookService>,
    pub registry: Arc<ProviderRegistry>,
}

/// Creates the Axum application router with all routes and shared state.
///
/// Booking and webhook routes are rate limited; health and metrics are not.
pub fn create_app(
    state: Arc<AppState>,
    rate_limiter: RateLimiter,
    metrics_handle: PrometheusHandle,
) -> Router {
    let metrics_router = Router::new()
        .route("/metrics", get(routes::metrics::get))
        .with_state(metrics_handle);

    let limited = Router::new()
        .route("/bookings", post(routes::bookings::create))
        .route("/bookings/{id}", get(routes::bookings::get))
        .route("/webhooks/payments", post(routes::webhooks::payment))
        .route_layer(middleware::from_fn_with_state(
            rate_limiter,
            rate_limit::rate_limit_middleware,
        ))
        .with_state(Arc::clone(&state));

    Router::new()
        .route("/health", get(routes::health::check))
        .with_state(state)
        .merge(limited)
        .merge(metrics_router)
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .layer(TraceLayer::new_for_http())
}

/// In-memory wiring behind the API.
pub struct Services {
    pub state: Arc<AppState>,
    pub outbox: Outbox,
}

/// Creates the default application state with in-memory suppliers, payment
/// gateway and booking store.
pub fn create_default_state(config: &Config) -> Services {
    let mut registry = ProviderRegistry::default();
    for (name, priority) in [("alpha", 1), ("beta", 2)] {
        let provider = InMemoryProvider::new(name).with_offer(HotelOffer {
            provider_code: name.to_string(),
            hotel_id: "H-1".to_string(),
            name: "Harbour View".to_string(),
            room_type: "deluxe".to_string(),
            price: Money::from_units(1_200_000),
            currency: "IDR".to_string(),
            available_rooms: 5,
        });
        registry.register(Arc::new(provider), priority);
    }
    let registry = Arc::new(registry);

    let bookings = Arc::new(InMemoryBookingRepository::new());
    let outbox = Outbox::new();

    let idempotency = IdempotencyConfig::default();
    let horizon = idempotency.horizon.max(config.idempotency_ttl);
    let coordinator = BookingCoordinator::new(
        Arc::clone(&registry),
        Arc::new(InMemoryPaymentGateway::new()),
        bookings.clone(),
        outbox.clone(),
        BookingConfig::default()
            .with_request_ttl(config.idempotency_ttl)
            .with_idempotency(idempotency.with_horizon(horizon)),
    );
    let payments = PaymentWebhookService::new(bookings, outbox.clone(), &config.payment_server_key)
        .with_registry(Arc::clone(&registry));

    Services {
        state: Arc::new(AppState {
            bookings: Arc::new(coordinator),
            payments: Arc::new(payments),
            registry,
        }),
        outbox,
    }
}
