//! Application configuration loaded from environment variables.

use std::time::Duration;

use crate::rate_limit::RateLimitConfig;

/// Server configuration with sensible defaults.
///
/// Reads from environment variables:
/// - `HOST`: bind address (default: `"0.0.0.0"`)
/// - `PORT`: listen port (default: `3000`)
/// - `RUST_LOG`: tracing filter directive (default: `"info"`)
/// - `WEBHOOK_SECRET`: HMAC key for outbound notification webhooks
/// - `PAYMENT_SERVER_KEY`: key the payment gateway signs notifications with
/// - `NOTIFICATION_WEBHOOK_URL`: where booking notifications are delivered (unset: log only)
/// - `OUTBOX_SWEEP_INTERVAL_MS`: outbox relay interval (default: `1000`)
/// - `IDEMPOTENCY_TTL_SECS`: how long a client idempotency key replays (default: `86400`)
/// - `RATE_LIMIT_PER_SECOND` / `RATE_LIMIT_BURST`: per-client quota (default: `10` / `20`)
/// - `KAFKA_BROKERS`: Kafka bootstrap servers for the notification queue (unset: in-process queue)
/// - `KAFKA_GROUP_ID`: consumer group (default: `"booking-coordination"`)
#[derive(Debug, Clone)]
pub struct Config {
    pub host: String,
    pub port: u16,
    pub log_level: String,
    pub webhook_secret: String,
    pub payment_server_key: String,
    pub notification_webhook_url: Option<String>,
    pub outbox_sweep_interval: Duration,
    pub idempotency_ttl: Duration,
    pub rate_limit: RateLimitConfig,
    pub kafka_brokers: Option<String>,
    pub kafka_group_id: String,
}

impl Config {
    /// Loads configuration from environment variables, falling back to defaults.
    pub fn from_env() -> Self {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Self::default();
        let parsed = |name: &str| lookup(name).and_then(|v| v.parse::<u64>().ok());

        Self {
            host: lookup("HOST").unwrap_or(defaults.host),
            port: lookup("PORT")
                .and_then(|p| p.parse().ok())
                .unwrap_or(defaults.port),
            log_level: lookup("RUST_LOG").unwrap_or(defaults.log_level),
            webhook_secret: lookup("WEBHOOK_SECRET").unwrap_or(defaults.webhook_secret),
            payment_server_key: lookup("PAYMENT_SERVER_KEY")
                .unwrap_or(defaults.payment_server_key),
            notification_webhook_url: lookup("NOTIFICATION_WEBHOOK_URL")
                .filter(|url| !url.trim().is_empty()),
            outbox_sweep_interval: parsed("OUTBOX_SWEEP_INTERVAL_MS")
                .map(Duration::from_millis)
                .unwrap_or(defaults.outbox_sweep_interval),
            idempotency_ttl: parsed("IDEMPOTENCY_TTL_SECS")
                .map(Duration::from_secs)
                .unwrap_or(defaults.idempotency_ttl),
            rate_limit: RateLimitConfig {
                requests_per_second: parsed("RATE_LIMIT_PER_SECOND")
                    .map_or(defaults.rate_limit.requests_per_second, |v| v as u32),
                burst: parsed("RATE_LIMIT_BURST")
                    .map_or(defaults.rate_limit.burst, |v| v as u32),
                ..defaults.rate_limit
            },
            kafka_brokers: lookup("KAFKA_BROKERS").filter(|b| !b.trim().is_empty()),
            kafka_group_id: lookup("KAFKA_GROUP_ID").unwrap_or(defaults.kafka_group_id),
        }
    }

    /// Returns the `"host:port"` bind address string.
    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 3000,
            log_level: "info".to_string(),
            webhook_secret: "dev-webhook-secret".to_string(),
            payment_server_key: "dev-payment-server-key".to_string(),
            notification_webhook_url: None,
            outbox_sweep_interval: Duration::from_millis(1000),
            idempotency_ttl: Duration::from_secs(24 * 60 * 60),
            rate_limit: RateLimitConfig::default(),
            kafka_brokers: None,
            kafka_group_id: "booking-coordination".to_string(),
        }
    }
}
