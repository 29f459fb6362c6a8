use thiserror::Error;

/// Errors raised while staging events.
#[derive(Debug, Error)]
pub enum OutboxError {
    /// The event payload could not be serialized.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// A required builder field was not set.
    #[error("Missing outbox event field: {0}")]
    MissingField(&'static str),
}

/// Error returned by a [`crate::Publisher`]; the event stays staged.
#[derive(Debug, Clone, Error)]
#[error("Publish failed: {0}")]
pub struct PublishError(pub String);

impl PublishError {
    pub fn new(reason: impl Into<String>) -> Self {
        Self(reason.into())
    }
}

/// Result type for outbox operations.
pub type Result<T> = std::result::Result<T, OutboxError>;
