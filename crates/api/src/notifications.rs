//! Forwards booking notifications from the queue to a partner webhook.

use async_trait::async_trait;
use common::{Retryable, ShutdownSignal};
use outbox::OutboxEvent;
use queue::{HandlerError, MessageHandler, QueueMessage};
use webhook::{WebhookDispatcher, WebhookError, WebhookEvent};

/// Queue the outbox relay publishes every booking event to.
pub const NOTIFICATIONS_QUEUE: &str = "booking.notifications";

const DELIVERY_ATTEMPTS: u32 = 5;

struct Target {
    dispatcher: WebhookDispatcher,
    url: String,
}

/// Handler for [`NOTIFICATIONS_QUEUE`].
///
/// Without a target URL events are only logged. Deliveries that run out of
/// attempts or are interrupted by shutdown are requeued; a permanent 4xx
/// from the receiver is logged and acknowledged. A payload that is not an
/// outbox event is rejected as malformed so the worker drops it.
pub struct NotificationForwarder {
    target: Option<Target>,
    signal: ShutdownSignal,
}

impl NotificationForwarder {
    pub fn log_only(signal: ShutdownSignal) -> Self {
        Self {
            target: None,
            signal,
        }
    }

    pub fn new(dispatcher: WebhookDispatcher, url: impl Into<String>, signal: ShutdownSignal) -> Self {
        Self {
            target: Some(Target {
                dispatcher,
                url: url.into(),
            }),
            signal,
        }
    }
}

#[async_trait]
impl MessageHandler for NotificationForwarder {
    async fn handle(&self, message: QueueMessage) -> Result<(), HandlerError> {
        let event: OutboxEvent = serde_json::from_value(message.payload)
            .map_err(|e| HandlerError::malformed(format!("not an outbox event: {e}")))?;

        let Some(target) = &self.target else {
            tracing::info!(
                event_id = %event.id,
                event_type = %event.event_type,
                aggregate_id = %event.aggregate_id,
                "booking notification"
            );
            return Ok(());
        };

        // The outbox id doubles as the webhook id so receivers can dedupe redeliveries.
        let webhook = WebhookEvent::new(event.event_type.clone(), event.payload)
            .with_id(event.id.to_string());
        match target
            .dispatcher
            .retry_webhook(&target.url, &webhook, DELIVERY_ATTEMPTS, &self.signal)
            .await
        {
            Ok(receipt) => {
                tracing::info!(
                    event_id = %event.id,
                    status = receipt.status,
                    attempts = receipt.attempts,
                    "notification delivered"
                );
                Ok(())
            }
            Err(e @ (WebhookError::Exhausted { .. } | WebhookError::Cancelled { .. })) => {
                Err(HandlerError::new(e.to_string()))
            }
            Err(e) if e.is_retryable() => Err(HandlerError::new(e.to_string())),
            Err(e) => {
                tracing::error!(
                    event_id = %event.id,
                    event_type = %event.event_type,
                    error = %e,
                    "notification rejected by receiver, dropping"
                );
                Ok(())
            }
        }
    }
}
