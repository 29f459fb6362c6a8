use common::{AggregateId, Retryable};
use providers::{ProviderFailure, RegistryError};
use thiserror::Error;

use crate::booking::steps::RESERVE_ROOM;
use crate::error::SagaError;

/// What a booking caller sees. Never a half-committed booking: either a
/// receipt, or one of these after every completed step was undone (or
/// escalated when undoing failed).
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BookingError {
    #[error("Invalid booking request: {0}")]
    Invalid(String),

    #[error("No provider could fulfil this request: {reason}")]
    NoProviderAvailable {
        reason: String,
        failures: Vec<ProviderFailure>,
    },

    #[error("Booking rolled back after step '{step}' failed: {reason}")]
    RolledBack { step: String, reason: String },

    #[error("Booking {booking_id} needs manual intervention: {reason}")]
    CompensationFailed {
        booking_id: AggregateId,
        reason: String,
    },

    #[error("Booking not found: {0}")]
    NotFound(AggregateId),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl BookingError {
    /// Maps a saga failure onto the caller-facing error. A reservation that
    /// failed because no provider could take it is told apart from other
    /// rollbacks by the registry error the step carried.
    pub(crate) fn from_saga(error: SagaError, booking_id: AggregateId) -> Self {
        match error {
            SagaError::StepFailed { step, error, .. } if step == RESERVE_ROOM => {
                match error.downcast_ref::<RegistryError>() {
                    Some(RegistryError::NoProviderAvailable { attempts }) => {
                        BookingError::NoProviderAvailable {
                            reason: error.to_string(),
                            failures: attempts.clone(),
                        }
                    }
                    Some(RegistryError::NoHealthyProviders) => BookingError::NoProviderAvailable {
                        reason: error.to_string(),
                        failures: Vec::new(),
                    },
                    _ => BookingError::RolledBack {
                        step,
                        reason: error.to_string(),
                    },
                }
            }
            SagaError::StepFailed { step, error, .. } => BookingError::RolledBack {
                step,
                reason: error.to_string(),
            },
            error @ SagaError::CompensationFailed { .. } => BookingError::CompensationFailed {
                booking_id,
                reason: error.to_string(),
            },
            SagaError::Empty(saga) => BookingError::Internal(format!("saga '{saga}' has no steps")),
        }
    }
}

impl Retryable for BookingError {
    fn is_retryable(&self) -> bool {
        matches!(
            self,
            BookingError::NoProviderAvailable { .. } | BookingError::Internal(_)
        )
    }
}
