use common::Retryable;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum WebhookError {
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Connection, TLS or timeout failure before a response arrived.
    #[error("Webhook transport error: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("Webhook endpoint returned {status}")]
    Status { status: u16, body: String },

    #[error("Invalid signing key")]
    InvalidKey,

    #[error("Webhook delivery cancelled after {attempts} attempt(s)")]
    Cancelled { attempts: u32 },

    #[error("Webhook delivery failed after {attempts} attempt(s): {last_error}")]
    Exhausted {
        attempts: u32,
        #[source]
        last_error: Box<WebhookError>,
    },
}

impl Retryable for WebhookError {
    fn is_retryable(&self) -> bool {
        match self {
            Self::Transport(_) => true,
            Self::Status { status, .. } => *status >= 500 || *status == 429,
            _ => false,
        }
    }
}

pub type Result<T> = std::result::Result<T, WebhookError>;
