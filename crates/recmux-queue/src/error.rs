//! Queue error types.

use recmux_models::IntentError;
use thiserror::Error;

pub type QueueResult<T> = Result<T, QueueError>;

#[derive(Debug, Error)]
pub enum QueueError {
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    #[error("Duplicate job: {0}")]
    Duplicate(String),

    #[error("Task status conflict for {key}: {message}")]
    StatusConflict { key: String, message: String },

    #[error("Invalid task status value: {0}")]
    InvalidStatus(String),

    #[error("Invalid intent: {0}")]
    Intent(#[from] IntentError),

    #[error("Redis error: {0}")]
    Redis(#[from] redis::RedisError),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl QueueError {
    pub fn connection_failed(msg: impl Into<String>) -> Self {
        Self::ConnectionFailed(msg.into())
    }

    pub fn status_conflict(key: impl Into<String>, msg: impl Into<String>) -> Self {
        Self::StatusConflict {
            key: key.into(),
            message: msg.into(),
        }
    }
}
