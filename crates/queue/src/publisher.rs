//! Outbox publisher that forwards staged events onto broker queues.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use outbox::{OutboxEvent, PublishError, Publisher};

use crate::broker::Broker;
use crate::message::QueueMessage;

/// Routes outbox events to queues by event type.
///
/// Events without a route go to the default queue. The envelope payload is
/// the whole [`OutboxEvent`], so consumers can deduplicate on its id.
pub struct BrokerPublisher {
    broker: Arc<dyn Broker>,
    routes: HashMap<String, String>,
    default_queue: String,
}

impl BrokerPublisher {
    pub fn new(broker: Arc<dyn Broker>, default_queue: impl Into<String>) -> Self {
        Self {
            broker,
            routes: HashMap::new(),
            default_queue: default_queue.into(),
        }
    }

    pub fn with_route(mut self, event_type: impl Into<String>, queue: impl Into<String>) -> Self {
        self.routes.insert(event_type.into(), queue.into());
        self
    }

    /// Queue an event of `event_type` is published to.
    pub fn route(&self, event_type: &str) -> &str {
        self.routes
            .get(event_type)
            .map_or(self.default_queue.as_str(), String::as_str)
    }

    /// Every queue this publisher can write to.
    pub fn queues(&self) -> Vec<&str> {
        let mut queues: Vec<&str> = self.routes.values().map(String::as_str).collect();
        queues.push(&self.default_queue);
        queues.sort_unstable();
        queues.dedup();
        queues
    }
}

#[async_trait]
impl Publisher for BrokerPublisher {
    async fn publish(&self, event: &OutboxEvent) -> Result<(), PublishError> {
        let queue = self.route(&event.event_type);
        let payload =
            serde_json::to_value(event).map_err(|e| PublishError::new(e.to_string()))?;
        let body = QueueMessage::new(event.event_type.clone(), payload)
            .to_bytes()
            .map_err(|e| PublishError::new(e.to_string()))?;

        self.broker
            .publish(queue, body)
            .await
            .map_err(|e| PublishError::new(e.to_string()))?;

        tracing::debug!(event_id = %event.id, queue = %queue, "event forwarded to queue");
        Ok(())
    }
}
