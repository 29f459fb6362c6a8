//! Domain error types.

use common::AggregateId;
use thiserror::Error;

/// Errors that can occur during domain operations.
#[derive(Debug, Error)]
pub enum DomainError {
    /// Booking row not found.
    #[error("Booking not found: {0}")]
    BookingNotFound(AggregateId),

    /// A booking with this id was already persisted.
    #[error("Booking already exists: {0}")]
    BookingAlreadyExists(AggregateId),

    /// Request failed validation before reaching any external party.
    #[error("Validation failed: {0}")]
    Validation(String),

    /// Serialization error.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}
