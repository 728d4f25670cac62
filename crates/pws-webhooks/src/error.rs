use thiserror::Error;

use crate::queue::QueueError;

/// Result type for webhook dispatch operations.
pub type WebhookResult<T> = Result<T, WebhookError>;

#[derive(Debug, Error)]
pub enum WebhookError {
    #[error("Signing failed for app {app_key}: {reason}")]
    Signing { app_key: String, reason: String },

    #[error("Payload serialization failed: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Queue error: {0}")]
    Queue(#[from] QueueError),

    #[error("Transport error: {0}")]
    Transport(String),
}

impl From<reqwest::Error> for WebhookError {
    fn from(e: reqwest::Error) -> Self {
        Self::Transport(e.to_string())
    }
}
