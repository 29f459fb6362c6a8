//! API server entry point.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use api::config::Config;
use api::notifications::{NOTIFICATIONS_QUEUE, NotificationForwarder};
use api::rate_limit::RateLimiter;
use common::Shutdown;
use outbox::{OutboxRelay, RelayConfig};
use queue::{Broker, BrokerPublisher, InMemoryBroker, QueueWorker, WorkerConfig};
use tokio::signal;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use webhook::{DispatcherConfig, WebhookDispatcher};

/// Waits for a shutdown signal (SIGINT or SIGTERM).
async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("failed to install SIGINT handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {
            tracing::info!("received SIGINT, starting graceful shutdown");
        }
        () = terminate => {
            tracing::info!("received SIGTERM, starting graceful shutdown");
        }
    }
}

/// Picks the broker behind the notification queue.
fn notification_broker(config: &Config) -> Arc<dyn Broker> {
    match &config.kafka_brokers {
        #[cfg(feature = "kafka")]
        Some(brokers) => {
            let kafka = queue::KafkaConfig::new(brokers.clone()).with_group_id(&config.kafka_group_id);
            let broker = queue::KafkaBroker::new(kafka).expect("failed to configure Kafka broker");
            Arc::new(broker)
        }
        #[cfg(not(feature = "kafka"))]
        Some(_) => {
            tracing::warn!("KAFKA_BROKERS is set but the kafka feature is not enabled, using the in-process queue");
            Arc::new(InMemoryBroker::new())
        }
        None => Arc::new(InMemoryBroker::new()),
    }
}

#[tokio::main]
async fn main() {
    let config = Config::from_env();

    // 1. Initialize tracing
    tracing_subscriber::registry()
        .with(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(config.log_level.as_str())),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // 2. Install Prometheus metrics recorder
    let prometheus_builder = metrics_exporter_prometheus::PrometheusBuilder::new();
    let metrics_handle = prometheus_builder
        .install_recorder()
        .expect("failed to install Prometheus recorder");
    api::routes::metrics::describe();

    // 3. Create application state
    let services = api::create_default_state(&config);
    let rate_limiter = RateLimiter::new(config.rate_limit.clone());
    let shutdown = Shutdown::new();

    // 4. Outbox relay onto the notification queue
    let broker = notification_broker(&config);
    let publisher = BrokerPublisher::new(Arc::clone(&broker), NOTIFICATIONS_QUEUE);
    let relay = OutboxRelay::new(
        services.outbox.clone(),
        Arc::new(publisher),
        RelayConfig::default().with_interval(config.outbox_sweep_interval),
    )
    .spawn(shutdown.signal());

    // 5. Background sweeps
    let mut background = services.state.bookings.spawn_sweepers(shutdown.signal());
    background.push(rate_limiter.spawn_sweeper(shutdown.signal()));

    // 6. Queue worker delivering booking notifications
    let forwarder = match &config.notification_webhook_url {
        Some(url) => {
            let dispatcher = WebhookDispatcher::new(
                config.webhook_secret.as_bytes().to_vec(),
                DispatcherConfig::default(),
            )
            .expect("failed to build webhook dispatcher");
            tracing::info!(%url, "delivering booking notifications");
            NotificationForwarder::new(dispatcher, url.clone(), shutdown.signal())
        }
        None => {
            tracing::info!("NOTIFICATION_WEBHOOK_URL not set, booking notifications are logged only");
            NotificationForwarder::log_only(shutdown.signal())
        }
    };
    let mut worker = QueueWorker::new(
        broker,
        WorkerConfig::default().with_handler_timeout(Duration::from_secs(120)),
    );
    worker.register_handler(NOTIFICATIONS_QUEUE, Arc::new(forwarder));
    worker
        .start(shutdown.signal())
        .expect("failed to start queue worker");

    // 7. Build the application
    let app = api::create_app(services.state, rate_limiter, metrics_handle);

    // 8. Start server
    let addr = config.addr();
    tracing::info!(%addr, "starting API server");

    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .expect("failed to bind address");
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await
    .expect("server error");

    // 9. Drain background work
    shutdown.trigger();
    if let Err(e) = relay.await {
        tracing::warn!(error = %e, "outbox relay task failed");
    }
    worker.stop().await;
    for handle in background {
        let _ = handle.await;
    }

    tracing::info!("server shut down gracefully");
}
