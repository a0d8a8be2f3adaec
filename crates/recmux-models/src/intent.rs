//! Completion intents emitted by recording nodes.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

use crate::recording::{Platform, RecordingKey};

/// Final state reported by the recorder.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum RecordingStatus {
    /// Recording finished; segments should be reconciled into one file.
    Complete,
    /// Recording was abandoned; segments should be discarded.
    Canceled,
}

impl RecordingStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            RecordingStatus::Complete => "complete",
            RecordingStatus::Canceled => "canceled",
        }
    }
}

impl fmt::Display for RecordingStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Errors raised while decoding or validating an intent.
#[derive(Debug, Error)]
pub enum IntentError {
    #[error("Field {0} must not be empty")]
    EmptyField(&'static str),

    #[error("Field {field} is not a valid path component: {value}")]
    InvalidPathComponent { field: &'static str, value: String },

    #[error("Malformed intent: {0}")]
    Malformed(#[from] serde_json::Error),
}

/// A completion signal for one recording.
///
/// Serialized as camelCase JSON:
/// `{"status", "platform", "uid", "videoName", "fsName", "conditionallyArchive", "shouldArchive"}`.
/// Consumed exactly once, either by the transcode path (`complete`) or the
/// clear path (`canceled`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct RecordingIntent {
    pub status: RecordingStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub platform: Option<Platform>,
    /// Channel identifier on the platform
    pub uid: String,
    pub video_name: String,
    /// Name of the storage backend holding the segments
    pub fs_name: String,
    /// Archive the raw bundles if any segment turns out to be missing
    #[serde(default, alias = "condArchive")]
    pub conditionally_archive: bool,
    /// Always archive the raw bundles
    #[serde(default)]
    pub should_archive: bool,
}

impl RecordingIntent {
    /// Create a completion intent with archiving disabled.
    pub fn complete(
        platform: Option<Platform>,
        uid: impl Into<String>,
        video_name: impl Into<String>,
        fs_name: impl Into<String>,
    ) -> Self {
        Self {
            status: RecordingStatus::Complete,
            platform,
            uid: uid.into(),
            video_name: video_name.into(),
            fs_name: fs_name.into(),
            conditionally_archive: false,
            should_archive: false,
        }
    }

    /// Create a cancellation intent.
    pub fn canceled(
        platform: Option<Platform>,
        uid: impl Into<String>,
        video_name: impl Into<String>,
        fs_name: impl Into<String>,
    ) -> Self {
        Self {
            status: RecordingStatus::Canceled,
            ..Self::complete(platform, uid, video_name, fs_name)
        }
    }

    /// Decode and validate an intent from JSON.
    pub fn from_json(payload: &str) -> Result<Self, IntentError> {
        let intent: Self = serde_json::from_str(payload)?;
        intent.validate()?;
        Ok(intent)
    }

    pub fn to_json(&self) -> Result<String, IntentError> {
        Ok(serde_json::to_string(self)?)
    }

    pub fn validate(&self) -> Result<(), IntentError> {
        if self.fs_name.is_empty() {
            return Err(IntentError::EmptyField("fsName"));
        }
        self.key().validate()
    }

    /// The recording this intent refers to.
    pub fn key(&self) -> RecordingKey {
        RecordingKey::new(self.platform, &self.uid, &self.video_name)
    }

    pub fn is_complete(&self) -> bool {
        self.status == RecordingStatus::Complete
    }
}
