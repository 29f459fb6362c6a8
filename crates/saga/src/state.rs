//! Saga state machine.

use serde::{Deserialize, Serialize};

/// The state of a saga in its lifecycle.
///
/// State transitions:
/// ```text
/// NotStarted ──► Running(0) ──► Running(n) ──┬──► Completed
///                                            └──► Compensating(n) ──► Failed
/// ```
///
/// The index is the position of the step being executed, or of the step
/// whose failure triggered compensation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(tag = "state", content = "step")]
pub enum SagaState {
    /// Saga has not started yet.
    #[default]
    NotStarted,

    /// The step at this index is executing.
    Running(usize),

    /// The step at this index failed and earlier steps are being compensated.
    Compensating(usize),

    /// All steps completed successfully (terminal state).
    Completed,

    /// Compensation finished after a failure (terminal state).
    Failed,
}

impl SagaState {
    /// Returns true if this is a terminal state.
    pub fn is_terminal(&self) -> bool {
        matches!(self, SagaState::Completed | SagaState::Failed)
    }

    /// Index of the current (or failed) step, if any.
    pub fn step_index(&self) -> Option<usize> {
        match self {
            SagaState::Running(i) | SagaState::Compensating(i) => Some(*i),
            _ => None,
        }
    }

    /// Returns the state name as a string.
    pub fn as_str(&self) -> &'static str {
        match self {
            SagaState::NotStarted => "NotStarted",
            SagaState::Running(_) => "Running",
            SagaState::Compensating(_) => "Compensating",
            SagaState::Completed => "Completed",
            SagaState::Failed => "Failed",
        }
    }
}

impl std::fmt::Display for SagaState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.step_index() {
            Some(i) => write!(f, "{}({i})", self.as_str()),
            None => write!(f, "{}", self.as_str()),
        }
    }
}
