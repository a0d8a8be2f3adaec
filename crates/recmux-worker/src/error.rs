//! Worker error types.

use thiserror::Error;

pub type WorkerResult<T> = Result<T, WorkerError>;

#[derive(Debug, Error)]
pub enum WorkerError {
    /// Recording refused by policy, e.g. too large to transcode.
    #[error("{0}")]
    PolicyRejected(String),

    /// Input from upstream of the pipeline is unusable.
    #[error("Upstream data error: {0}")]
    UpstreamData(String),

    #[error("Task skipped: {0}")]
    Skipped(String),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Notifier error: {0}")]
    Notifier(String),

    #[error("Job failed: {0}")]
    JobFailed(String),

    #[error("Storage error: {0}")]
    Storage(#[from] recmux_storage::StorageError),

    #[error("Media error: {0}")]
    Media(#[from] recmux_media::MediaError),

    #[error("Queue error: {0}")]
    Queue(#[from] recmux_queue::QueueError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),
}

impl WorkerError {
    pub fn policy_rejected(msg: impl Into<String>) -> Self {
        Self::PolicyRejected(msg.into())
    }

    pub fn upstream_data(msg: impl Into<String>) -> Self {
        Self::UpstreamData(msg.into())
    }

    pub fn config_error(msg: impl Into<String>) -> Self {
        Self::ConfigError(msg.into())
    }

    pub fn job_failed(msg: impl Into<String>) -> Self {
        Self::JobFailed(msg.into())
    }

    /// Check if error is retryable.
    ///
    /// Only infrastructure faults qualify; everything about the recording
    /// itself fails the same way on every attempt.
    pub fn is_retryable(&self) -> bool {
        match self {
            WorkerError::Storage(e) => e.is_transient(),
            WorkerError::Queue(_) | WorkerError::Io(_) => true,
            _ => false,
        }
    }

    /// Check if this is a permanent failure that should NOT be retried.
    pub fn is_permanent_failure(&self) -> bool {
        match self {
            WorkerError::PolicyRejected(_)
            | WorkerError::UpstreamData(_)
            | WorkerError::Skipped(_)
            | WorkerError::ConfigError(_) => true,
            WorkerError::Media(e) => {
                e.is_upstream_data()
                    || matches!(
                        e,
                        recmux_media::MediaError::FfmpegFailed { .. }
                            | recmux_media::MediaError::FfmpegNotFound
                            | recmux_media::MediaError::Timeout(_)
                    )
            }
            WorkerError::Storage(e) => !e.is_transient(),
            _ => false,
        }
    }
}
