//! Provider and registry error types.

use std::time::Duration;

use common::Retryable;
use thiserror::Error;

use crate::registry::ProviderFailure;

/// Errors a single supplier can return.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProviderError {
    /// Network failure or 5xx from the supplier.
    #[error("provider unavailable: {0}")]
    Unavailable(String),

    /// The call did not complete within the supplier's timeout.
    #[error("provider timed out after {0:?}")]
    Timeout(Duration),

    /// The supplier refused the request (sold out, invalid dates, ...).
    #[error("provider rejected request: {0}")]
    Rejected(String),

    /// Unknown hotel or booking reference.
    #[error("not found at provider: {0}")]
    NotFound(String),

    /// The supplier may have taken the hold but its acknowledgement was lost.
    #[error("provider acknowledgement lost (reference: {reference:?}): {reason}")]
    AcknowledgementLost {
        reference: Option<String>,
        reason: String,
    },

    /// Health check failed.
    #[error("provider unhealthy: {0}")]
    Unhealthy(String),
}

impl ProviderError {
    /// Returns true if a `create_booking` call that failed this way may still
    /// have produced a hold at the supplier.
    pub fn is_hold_ambiguous(&self) -> bool {
        matches!(
            self,
            ProviderError::Timeout(_) | ProviderError::AcknowledgementLost { .. }
        )
    }

    /// Supplier reference carried by an ambiguous failure, if any.
    pub fn reference(&self) -> Option<&str> {
        match self {
            ProviderError::AcknowledgementLost { reference, .. } => reference.as_deref(),
            _ => None,
        }
    }
}

impl Retryable for ProviderError {
    fn is_retryable(&self) -> bool {
        matches!(
            self,
            ProviderError::Unavailable(_) | ProviderError::Timeout(_) | ProviderError::Unhealthy(_)
        )
    }
}

/// Errors surfaced by the registry to the orchestration layer.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RegistryError {
    /// Every registered supplier failed its health check.
    #[error("no healthy providers")]
    NoHealthyProviders,

    /// Every healthy supplier failed the request.
    #[error("no provider could fulfil this request ({} attempted)", attempts.len())]
    NoProviderAvailable { attempts: Vec<ProviderFailure> },

    /// A supplier may hold a room for this request; failover stopped so the
    /// caller can cancel instead of double booking.
    #[error("hold at provider '{provider}' is uncertain: {reason}")]
    HoldUncertain {
        provider: String,
        reference: Option<String>,
        reason: String,
    },

    /// No supplier registered under this code.
    #[error("unknown provider: {0}")]
    UnknownProvider(String),

    /// A call routed to a specific supplier failed.
    #[error("provider '{provider}' failed: {source}")]
    Provider {
        provider: String,
        #[source]
        source: ProviderError,
    },
}

impl Retryable for RegistryError {
    fn is_retryable(&self) -> bool {
        match self {
            RegistryError::NoHealthyProviders | RegistryError::NoProviderAvailable { .. } => true,
            RegistryError::HoldUncertain { .. } | RegistryError::UnknownProvider(_) => false,
            RegistryError::Provider { source, .. } => source.is_retryable(),
        }
    }
}
