//! Storage error types.

use thiserror::Error;

/// Result type for storage operations.
pub type StorageResult<T> = Result<T, StorageError>;

/// Errors that can occur during storage operations.
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Failed to configure storage backend: {0}")]
    ConfigError(String),

    #[error("Unknown storage backend: {0}")]
    UnknownBackend(String),

    #[error("Object not found: {0}")]
    NotFound(String),

    #[error("Upload failed: {0}")]
    UploadFailed(String),

    #[error("Download failed after {attempts} attempts: {key}: {message}")]
    DownloadFailed {
        key: String,
        attempts: u32,
        message: String,
    },

    #[error("Read timeout exceeded after {elapsed_secs:.1}s ({bytes} bytes): {key}")]
    ReadTimeout {
        key: String,
        elapsed_secs: f64,
        bytes: u64,
    },

    #[error("Delete failed: {0}")]
    DeleteFailed(String),

    #[error("List failed: {0}")]
    ListFailed(String),

    #[error("Not a regular file: {0}")]
    NotAFile(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Backend config error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("AWS SDK error: {0}")]
    AwsSdk(String),
}

impl StorageError {
    pub fn config_error(msg: impl Into<String>) -> Self {
        Self::ConfigError(msg.into())
    }

    pub fn not_found(key: impl Into<String>) -> Self {
        Self::NotFound(key.into())
    }

    pub fn upload_failed(msg: impl Into<String>) -> Self {
        Self::UploadFailed(msg.into())
    }

    pub fn delete_failed(msg: impl Into<String>) -> Self {
        Self::DeleteFailed(msg.into())
    }

    pub fn download_failed(key: impl Into<String>, attempts: u32, msg: impl Into<String>) -> Self {
        Self::DownloadFailed {
            key: key.into(),
            attempts,
            message: msg.into(),
        }
    }

    /// Network-level failures that a later retry of the whole job may fix.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            StorageError::DownloadFailed { .. }
                | StorageError::ReadTimeout { .. }
                | StorageError::DeleteFailed(_)
                | StorageError::ListFailed(_)
                | StorageError::UploadFailed(_)
                | StorageError::AwsSdk(_)
        )
    }
}
