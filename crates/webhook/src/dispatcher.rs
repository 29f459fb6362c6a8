//! Signed outbound webhook delivery.

use std::time::Duration;

use chrono::{DateTime, Utc};
use common::{BackoffPolicy, RetryOutcome, ShutdownSignal, retry};
use serde::{Deserialize, Serialize};

use crate::error::{Result, WebhookError};
use crate::signature::sign;

pub const SIGNATURE_HEADER: &str = "X-Webhook-Signature";
pub const ID_HEADER: &str = "X-Webhook-Id";
pub const TIMESTAMP_HEADER: &str = "X-Webhook-Timestamp";
pub const EVENT_HEADER: &str = "X-Webhook-Event";

/// Body of an outbound webhook.
///
/// `id` is stable across retries so receivers can deduplicate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WebhookEvent {
    pub id: String,
    pub event_type: String,
    pub data: serde_json::Value,
    pub occurred_at: DateTime<Utc>,
}

impl WebhookEvent {
    pub fn new(event_type: impl Into<String>, data: serde_json::Value) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            event_type: event_type.into(),
            data,
            occurred_at: Utc::now(),
        }
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = id.into();
        self
    }
}

/// Result of a successful delivery.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeliveryReceipt {
    pub status: u16,
    pub attempts: u32,
}

#[derive(Debug, Clone)]
pub struct DispatcherConfig {
    /// Per-request timeout.
    pub request_timeout: Duration,
    /// Backoff between retries; `max_attempts` is overridden per call.
    pub backoff: BackoffPolicy,
}

impl Default for DispatcherConfig {
    fn default() -> Self {
        Self {
            request_timeout: Duration::from_secs(10),
            backoff: BackoffPolicy::default()
                .with_initial_delay(Duration::from_secs(1))
                .with_multiplier(2)
                .with_max_delay(Duration::from_secs(60)),
        }
    }
}

impl DispatcherConfig {
    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    pub fn with_backoff(mut self, backoff: BackoffPolicy) -> Self {
        self.backoff = backoff;
        self
    }
}

/// Posts signed JSON webhooks.
#[derive(Debug, Clone)]
pub struct WebhookDispatcher {
    client: reqwest::Client,
    secret: Vec<u8>,
    config: DispatcherConfig,
}

impl WebhookDispatcher {
    pub fn new(secret: impl Into<Vec<u8>>, config: DispatcherConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(config.request_timeout)
            .build()?;
        Ok(Self {
            client,
            secret: secret.into(),
            config,
        })
    }

    /// Sends `event` once. Any non-2xx response is an error.
    #[tracing::instrument(skip(self, event), fields(event_id = %event.id, event_type = %event.event_type))]
    pub async fn send_webhook(&self, url: &str, event: &WebhookEvent) -> Result<DeliveryReceipt> {
        let body = serde_json::to_vec(event)?;
        let status = self.post(url, event, body).await?;
        Ok(DeliveryReceipt {
            status,
            attempts: 1,
        })
    }

    /// Sends `event`, retrying transient failures (transport errors, 5xx,
    /// 429) with exponential backoff for at most `max_attempts` tries.
    /// Other 4xx responses fail immediately. Returns
    /// [`WebhookError::Cancelled`] if `signal` fires first.
    #[tracing::instrument(skip(self, event, signal), fields(event_id = %event.id, event_type = %event.event_type))]
    pub async fn retry_webhook(
        &self,
        url: &str,
        event: &WebhookEvent,
        max_attempts: u32,
        signal: &ShutdownSignal,
    ) -> Result<DeliveryReceipt> {
        let body = serde_json::to_vec(event)?;
        let policy = self.config.backoff.with_max_attempts(max_attempts);

        let outcome = retry(&policy, signal, |attempt| {
            let body = body.clone();
            async move {
                tracing::debug!(attempt, "delivering webhook");
                self.post(url, event, body).await
            }
        })
        .await;

        match outcome {
            RetryOutcome::Succeeded { value, attempts } => Ok(DeliveryReceipt {
                status: value,
                attempts,
            }),
            RetryOutcome::Rejected { error, attempts } => {
                tracing::warn!(attempts, error = %error, "webhook rejected, not retrying");
                Err(error)
            }
            RetryOutcome::Exhausted {
                attempts,
                last_error,
            } => {
                tracing::error!(attempts, error = %last_error, "webhook delivery exhausted retries");
                Err(WebhookError::Exhausted {
                    attempts,
                    last_error: Box::new(last_error),
                })
            }
            RetryOutcome::Cancelled { attempts } => {
                tracing::info!(attempts, "webhook delivery cancelled");
                Err(WebhookError::Cancelled { attempts })
            }
        }
    }

    async fn post(&self, url: &str, event: &WebhookEvent, body: Vec<u8>) -> Result<u16> {
        let signature = sign(&self.secret, &body)?;
        let timestamp = Utc::now().timestamp().to_string();

        let result = self
            .client
            .post(url)
            .header(reqwest::header::CONTENT_TYPE, "application/json")
            .header(SIGNATURE_HEADER, signature)
            .header(ID_HEADER, event.id.as_str())
            .header(TIMESTAMP_HEADER, timestamp)
            .header(EVENT_HEADER, event.event_type.as_str())
            .body(body)
            .send()
            .await;

        let response = match result {
            Ok(response) => response,
            Err(e) => {
                metrics::counter!("webhook_delivery_failures_total").increment(1);
                return Err(e.into());
            }
        };

        let status = response.status();
        if status.is_success() {
            metrics::counter!("webhook_deliveries_total").increment(1);
            return Ok(status.as_u16());
        }

        metrics::counter!("webhook_delivery_failures_total").increment(1);
        let body = response.text().await.unwrap_or_default();
        Err(WebhookError::Status {
            status: status.as_u16(),
            body,
        })
    }
}
