use common::Retryable;
use thiserror::Error;

/// Errors returned by a [`crate::Broker`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BrokerError {
    /// The broker connection is down; callers back off and retry.
    #[error("Broker connection lost: {0}")]
    ConnectionLost(String),

    #[error("Unknown queue: {0}")]
    UnknownQueue(String),

    /// The delivery tag is not outstanding (already settled, or the
    /// connection dropped and the message went back to its queue).
    #[error("Unknown delivery tag: {0}")]
    UnknownDelivery(u64),
}

impl Retryable for BrokerError {
    fn is_retryable(&self) -> bool {
        matches!(self, Self::ConnectionLost(_))
    }
}

/// Error returned by a message handler.
///
/// A failed handler requeues the message. A malformed payload can never
/// succeed, so it is dropped instead.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum HandlerError {
    #[error("Handler failed: {0}")]
    Failed(String),

    #[error("Malformed payload: {0}")]
    Malformed(String),
}

impl HandlerError {
    pub fn new(reason: impl Into<String>) -> Self {
        Self::Failed(reason.into())
    }

    pub fn malformed(reason: impl Into<String>) -> Self {
        Self::Malformed(reason.into())
    }
}

impl Retryable for HandlerError {
    fn is_retryable(&self) -> bool {
        matches!(self, Self::Failed(_))
    }
}

/// Errors raised when starting the worker.
#[derive(Debug, Error)]
pub enum WorkerError {
    #[error("Queue worker is already running")]
    AlreadyRunning,

    #[error("No handlers registered")]
    NoHandlers,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_only_malformed_handler_errors_are_permanent() {
        assert!(HandlerError::new("receiver down").is_retryable());
        assert!(!HandlerError::malformed("missing id").is_retryable());
        assert!(BrokerError::ConnectionLost("reset".into()).is_retryable());
        assert!(!BrokerError::UnknownQueue("q".into()).is_retryable());
    }
}
