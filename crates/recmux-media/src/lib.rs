//! Segment reconciliation stages.
//!
//! This crate provides:
//! - Bundle validation and extraction
//! - Deduplication, numeric ordering and gap detection
//! - Streaming merge and the FFmpeg remux runner
//! - Two-phase publishing into the complete tree

pub mod bundle;
pub mod command;
pub mod error;
pub mod fs_utils;
pub mod merge;
pub mod publish;
pub mod segments;

pub use bundle::{extract_tars, validate_tars_dir};
pub use command::{check_ffmpeg, FfmpegCommand, FfmpegRemuxer, FfmpegRunner, Remuxer};
pub use error::{MediaError, MediaResult};
pub use merge::merge_segments;
pub use publish::StagedPublisher;
pub use segments::{
    check_gap_paths, check_gaps, dedupe, dedupe_segments, flatten_segments, sorted_segment_paths,
    DedupeOutcome, MAX_GAP_SPAN,
};
