//! Saga error types.

use thiserror::Error;

use crate::step::StepError;

/// Errors returned by [`crate::Saga::execute`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SagaError {
    /// A step failed and every previously completed step was compensated.
    #[error("Saga step '{step}' failed: {error}")]
    StepFailed {
        step: String,
        #[source]
        error: StepError,
        /// Compensated steps, in the order compensation ran.
        compensated: Vec<String>,
    },

    /// A compensation failed after a step failure. Compensation stopped at
    /// that point and the saga needs manual intervention.
    #[error(
        "Compensation step '{step}' failed: {reason} (after step '{failed_step}' failed: {failed_reason})"
    )]
    CompensationFailed {
        step: String,
        reason: String,
        failed_step: String,
        failed_reason: String,
        compensated: Vec<String>,
    },

    /// The saga has no steps.
    #[error("Saga '{0}' has no steps")]
    Empty(String),
}

impl SagaError {
    /// Returns true if the saga left external state that needs an operator.
    pub fn requires_manual_intervention(&self) -> bool {
        matches!(self, SagaError::CompensationFailed { .. })
    }
}

/// Convenience type alias for saga results.
pub type Result<T> = std::result::Result<T, SagaError>;
