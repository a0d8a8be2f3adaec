//! Uniform access to one recording's source segments.

use std::fmt;
use std::path::Path;

use async_trait::async_trait;
use recmux_models::RecordingKey;

use crate::error::StorageResult;
use crate::transfer::CopyStats;

/// Backend variant behind a [`SegmentAccessor`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackendKind {
    Local,
    ObjectStore,
}

impl fmt::Display for BackendKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BackendKind::Local => write!(f, "local"),
            BackendKind::ObjectStore => write!(f, "s3"),
        }
    }
}

/// Lists, sizes, fetches and deletes the segment files of one recording
/// under its `incomplete` area.
///
/// Identifiers are absolute paths for the local variant and object keys
/// for the object-store variant. A missing recording is an empty result,
/// never an error, on every read operation.
#[async_trait]
pub trait SegmentAccessor: Send + Sync {
    fn backend(&self) -> BackendKind;

    /// Every segment or bundle identifier of the recording, unordered.
    async fn get_paths(&self, key: &RecordingKey) -> StorageResult<Vec<String>>;

    /// Total size in bytes of the recording's current identifiers.
    async fn get_size_sum(&self, key: &RecordingKey) -> StorageResult<u64>;

    /// Fetch every identifier into `dest_dir` under its base file name.
    ///
    /// Creates `dest_dir` if needed. Any single failure fails the whole copy.
    async fn copy(&self, paths: &[String], dest_dir: &Path) -> StorageResult<CopyStats>;

    /// Delete everything under the recording. Idempotent.
    async fn clear_by_key(&self, key: &RecordingKey) -> StorageResult<()>;

    /// Delete the given identifiers. Absent identifiers are skipped.
    async fn clear_by_paths(&self, paths: &[String]) -> StorageResult<()>;
}

/// Final path component of an identifier (`a/b/00001.tar` -> `00001.tar`).
pub fn base_name(identifier: &str) -> &str {
    identifier
        .rsplit(['/', '\\'])
        .next()
        .unwrap_or(identifier)
}
