use std::collections::HashSet;
use std::sync::Arc;

use common::EventId;
use serde::Serialize;
use tokio::sync::Mutex;

use crate::error::Result;
use crate::event::OutboxEvent;
use crate::publisher::Publisher;

/// Outcome of one publish sweep.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PublishReport {
    /// Events whose publish call succeeded and that were removed.
    pub published: usize,
    /// Events that failed and remain staged for the next sweep.
    pub failed: Vec<EventId>,
}

/// Staging area for domain events awaiting publication.
///
/// Cheap to clone; clones share the same staged set.
#[derive(Clone, Default)]
pub struct Outbox {
    events: Arc<Mutex<Vec<OutboxEvent>>>,
    sweep: Arc<Mutex<()>>,
}

impl Outbox {
    pub fn new() -> Self {
        Self::default()
    }

    /// Stages an event built from its parts.
    pub async fn add<T: Serialize>(
        &self,
        aggregate_type: &str,
        aggregate_id: impl ToString,
        event_type: &str,
        payload: &T,
    ) -> Result<EventId> {
        let event = OutboxEvent::builder()
            .aggregate_type(aggregate_type)
            .aggregate_id(aggregate_id)
            .event_type(event_type)
            .payload(payload)?
            .build()?;
        Ok(self.add_event(event).await)
    }

    /// Stages a prebuilt event.
    pub async fn add_event(&self, event: OutboxEvent) -> EventId {
        let id = event.id;
        tracing::debug!(
            event_id = %id,
            event_type = %event.event_type,
            aggregate_id = %event.aggregate_id,
            "event staged"
        );
        self.events.lock().await.push(event);
        id
    }

    /// Unpublished events in staging order.
    pub async fn pending(&self) -> Vec<OutboxEvent> {
        self.events
            .lock()
            .await
            .iter()
            .filter(|e| !e.published)
            .cloned()
            .collect()
    }

    pub async fn len(&self) -> usize {
        self.events.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.events.lock().await.is_empty()
    }

    /// Publishes every unpublished event.
    ///
    /// Each success is marked as soon as its publish call returns; a failure
    /// is logged and the sweep moves on to the next event. Published events
    /// are removed at the end. The staging lock is never held across a
    /// publish call, and sweeps are serialized.
    #[tracing::instrument(skip(self, publisher))]
    pub async fn publish(&self, publisher: &dyn Publisher) -> PublishReport {
        let _sweep = self.sweep.lock().await;
        let pending = self.pending().await;
        let mut report = PublishReport::default();
        if pending.is_empty() {
            return report;
        }

        let mut published = HashSet::new();
        for event in &pending {
            match publisher.publish(event).await {
                Ok(()) => {
                    self.mark_published(event.id).await;
                    published.insert(event.id);
                    metrics::counter!("outbox_events_published_total").increment(1);
                }
                Err(e) => {
                    tracing::warn!(
                        event_id = %event.id,
                        event_type = %event.event_type,
                        error = %e,
                        "outbox publish failed, event stays staged"
                    );
                    metrics::counter!("outbox_publish_failures_total").increment(1);
                    report.failed.push(event.id);
                }
            }
        }

        self.events
            .lock()
            .await
            .retain(|e| !(e.published && published.contains(&e.id)));
        report.published = published.len();

        tracing::info!(
            published = report.published,
            failed = report.failed.len(),
            "outbox sweep complete"
        );
        report
    }

    async fn mark_published(&self, id: EventId) {
        if let Some(event) = self.events.lock().await.iter_mut().find(|e| e.id == id) {
            event.published = true;
        }
    }
}
