//! Error types for media operations.

use std::path::PathBuf;
use thiserror::Error;

use recmux_models::SegmentNameError;

/// Result type for media operations.
pub type MediaResult<T> = Result<T, MediaError>;

/// Errors that can occur while reconciling segments.
#[derive(Debug, Error)]
pub enum MediaError {
    #[error("FFmpeg not found in PATH")]
    FfmpegNotFound,

    #[error("FFmpeg command failed: {message}")]
    FfmpegFailed {
        message: String,
        stderr: Option<String>,
        exit_code: Option<i32>,
    },

    #[error("Operation timed out after {0} seconds")]
    Timeout(u64),

    #[error("Source directory does not exist: {0}")]
    SourceMissing(PathBuf),

    #[error("Source directory is empty: {0}")]
    SourceEmpty(PathBuf),

    #[error("Unexpected file extension (want .{expected}): {path}")]
    InvalidExtension { path: PathBuf, expected: &'static str },

    #[error("Invalid segment name: {0}")]
    InvalidSegmentName(#[from] SegmentNameError),

    #[error("Invalid segment sorted order: {0}")]
    InvalidSortOrder(String),

    #[error("No segments")]
    NoSegments,

    #[error("Archive error in {path}: {message}")]
    Archive { path: PathBuf, message: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl MediaError {
    pub fn ffmpeg_failed(
        message: impl Into<String>,
        stderr: Option<String>,
        exit_code: Option<i32>,
    ) -> Self {
        Self::FfmpegFailed {
            message: message.into(),
            stderr,
            exit_code,
        }
    }

    pub fn archive(path: impl Into<PathBuf>, message: impl Into<String>) -> Self {
        Self::Archive {
            path: path.into(),
            message: message.into(),
        }
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal(message.into())
    }

    /// Failures caused by malformed input from upstream of the pipeline.
    pub fn is_upstream_data(&self) -> bool {
        matches!(
            self,
            MediaError::SourceMissing(_)
                | MediaError::SourceEmpty(_)
                | MediaError::InvalidExtension { .. }
                | MediaError::InvalidSegmentName(_)
                | MediaError::InvalidSortOrder(_)
                | MediaError::NoSegments
                | MediaError::Archive { .. }
        )
    }
}
