use chrono::{DateTime, Utc};
use common::EventId;
use serde::{Deserialize, Serialize};

use crate::error::{OutboxError, Result};

/// A domain event staged for asynchronous publication.
///
/// Immutable once staged except for the `published` flag, which the sweep
/// sets after a successful publish.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutboxEvent {
    /// Unique identifier for this event, usable as a consumer-side dedup key.
    pub id: EventId,

    /// The type of aggregate (e.g., "booking", "payment").
    pub aggregate_type: String,

    /// The aggregate this event belongs to.
    pub aggregate_id: String,

    /// The type of the event (e.g., "booking.confirmed").
    pub event_type: String,

    /// The event payload as JSON.
    pub payload: serde_json::Value,

    /// When the event was staged.
    pub created_at: DateTime<Utc>,

    /// Set once a publish call for this event returned success.
    pub published: bool,
}

impl OutboxEvent {
    /// Creates a new outbox event builder.
    pub fn builder() -> OutboxEventBuilder {
        OutboxEventBuilder::default()
    }
}

/// Builder for constructing outbox events.
#[derive(Debug, Default)]
pub struct OutboxEventBuilder {
    id: Option<EventId>,
    aggregate_type: Option<String>,
    aggregate_id: Option<String>,
    event_type: Option<String>,
    payload: Option<serde_json::Value>,
    created_at: Option<DateTime<Utc>>,
}

impl OutboxEventBuilder {
    /// Sets the event ID. If not set, a new ID will be generated.
    pub fn id(mut self, id: EventId) -> Self {
        self.id = Some(id);
        self
    }

    pub fn aggregate_type(mut self, aggregate_type: impl Into<String>) -> Self {
        self.aggregate_type = Some(aggregate_type.into());
        self
    }

    pub fn aggregate_id(mut self, aggregate_id: impl ToString) -> Self {
        self.aggregate_id = Some(aggregate_id.to_string());
        self
    }

    pub fn event_type(mut self, event_type: impl Into<String>) -> Self {
        self.event_type = Some(event_type.into());
        self
    }

    /// Sets the payload from a serializable value.
    pub fn payload<T: Serialize>(mut self, payload: &T) -> Result<Self> {
        self.payload = Some(serde_json::to_value(payload)?);
        Ok(self)
    }

    /// Sets the payload from a raw JSON value.
    pub fn payload_raw(mut self, payload: serde_json::Value) -> Self {
        self.payload = Some(payload);
        self
    }

    /// Sets the creation time. If not set, the current time will be used.
    pub fn created_at(mut self, created_at: DateTime<Utc>) -> Self {
        self.created_at = Some(created_at);
        self
    }

    pub fn build(self) -> Result<OutboxEvent> {
        Ok(OutboxEvent {
            id: self.id.unwrap_or_default(),
            aggregate_type: self
                .aggregate_type
                .ok_or(OutboxError::MissingField("aggregate_type"))?,
            aggregate_id: self
                .aggregate_id
                .ok_or(OutboxError::MissingField("aggregate_id"))?,
            event_type: self.event_type.ok_or(OutboxError::MissingField("event_type"))?,
            payload: self.payload.unwrap_or(serde_json::Value::Null),
            created_at: self.created_at.unwrap_or_else(Utc::now),
            published: false,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builder_fills_defaults() {
        let event = OutboxEvent::builder()
            .aggregate_type("booking")
            .aggregate_id("b-1")
            .event_type("booking.confirmed")
            .payload_raw(serde_json::json!({"rooms": 1}))
            .build()
            .unwrap();

        assert_eq!(event.aggregate_id, "b-1");
        assert_eq!(event.payload["rooms"], 1);
        assert!(!event.published);
    }

    #[test]
    fn test_builder_requires_event_type() {
        let result = OutboxEvent::builder()
            .aggregate_type("booking")
            .aggregate_id("b-1")
            .build();
        assert!(matches!(result, Err(OutboxError::MissingField("event_type"))));
    }
}
