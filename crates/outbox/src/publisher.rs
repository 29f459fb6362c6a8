//! Publisher port used by the outbox sweep.

use std::collections::HashSet;
use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;

use crate::error::PublishError;
use crate::event::OutboxEvent;

/// Delivers a staged event to the message bus.
#[async_trait]
pub trait Publisher: Send + Sync {
    async fn publish(&self, event: &OutboxEvent) -> Result<(), PublishError>;
}

#[derive(Debug, Default)]
struct RecordingState {
    published: Vec<OutboxEvent>,
    failing_event_types: HashSet<String>,
    fail_all: bool,
    attempts: usize,
}

/// Publisher that records what it was given, with switchable failures.
#[derive(Debug, Clone, Default)]
pub struct RecordingPublisher {
    state: Arc<Mutex<RecordingState>>,
}

impl RecordingPublisher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes every publish of `event_type` fail until cleared.
    pub fn fail_event_type(&self, event_type: impl Into<String>) {
        self.state().failing_event_types.insert(event_type.into());
    }

    pub fn set_fail_all(&self, fail: bool) {
        self.state().fail_all = fail;
    }

    pub fn clear_failures(&self) {
        let mut state = self.state();
        state.failing_event_types.clear();
        state.fail_all = false;
    }

    /// Events successfully published, in publish order.
    pub fn published(&self) -> Vec<OutboxEvent> {
        self.state().published.clone()
    }

    /// Total publish calls, successful or not.
    pub fn attempts(&self) -> usize {
        self.state().attempts
    }

    fn state(&self) -> MutexGuard<'_, RecordingState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[async_trait]
impl Publisher for RecordingPublisher {
    async fn publish(&self, event: &OutboxEvent) -> Result<(), PublishError> {
        let mut state = self.state();
        state.attempts += 1;
        if state.fail_all || state.failing_event_types.contains(&event.event_type) {
            return Err(PublishError::new(format!(
                "broker refused {}",
                event.event_type
            )));
        }
        state.published.push(event.clone());
        Ok(())
    }
}
