//! Shared data models for the recording reconciliation pipeline.
//!
//! This crate provides Serde-serializable types for:
//! - Recording identity and storage layout
//! - Completion intents as they arrive on the wire
//! - Segment files, duplicate mismatches and gap reports
//! - Transcode results and task status

pub mod intent;
pub mod job;
pub mod recording;
pub mod report;
pub mod result;
pub mod segment;

// Re-export common types
pub use intent::{IntentError, RecordingIntent, RecordingStatus};
pub use job::{JobId, TaskStatus};
pub use recording::{
    Platform, PlatformParseError, RecordingKey, COMPLETE_DIR_NAME, INCOMPLETE_DIR_NAME,
    STAGING_DIR_NAME,
};
pub use report::{GapReport, MismatchReport};
pub use result::TranscodeResult;
pub use segment::{
    is_sentinel, sequence_number, MismatchInfo, SegmentFile, SegmentNameError, ARCHIVE_EXTENSION,
    SEGMENT_EXTENSION,
};
