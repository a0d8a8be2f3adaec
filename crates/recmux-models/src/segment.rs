//! Segment files and their sequence numbers.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Extension of a single media segment.
pub const SEGMENT_EXTENSION: &str = "ts";

/// Extension of a segment bundle.
pub const ARCHIVE_EXTENSION: &str = "tar";

#[derive(Debug, Error)]
pub enum SegmentNameError {
    #[error("Segment path has no file stem: {0}")]
    MissingStem(PathBuf),

    #[error("Segment stem is not a sequence number: {0}")]
    NotANumber(PathBuf),
}

/// Parse the sequence number from a segment's file stem (`00042.ts` -> 42).
pub fn sequence_number(path: &Path) -> Result<i64, SegmentNameError> {
    let stem = path
        .file_stem()
        .and_then(|s| s.to_str())
        .ok_or_else(|| SegmentNameError::MissingStem(path.to_path_buf()))?;
    stem.parse::<i64>()
        .map_err(|_| SegmentNameError::NotANumber(path.to_path_buf()))
}

/// One physical segment on local disk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SegmentFile {
    pub path: PathBuf,
    pub sequence_number: i64,
    pub size_bytes: u64,
}

impl SegmentFile {
    pub fn new(path: impl Into<PathBuf>, size_bytes: u64) -> Result<Self, SegmentNameError> {
        let path = path.into();
        let sequence_number = sequence_number(&path)?;
        Ok(Self {
            path,
            sequence_number,
            size_bytes,
        })
    }

    /// `0` and `-1` mark an init segment that is not part of gap arithmetic.
    pub fn is_sentinel(&self) -> bool {
        is_sentinel(self.sequence_number)
    }
}

pub fn is_sentinel(seq: i64) -> bool {
    seq == 0 || seq == -1
}

/// Two same-numbered segments whose sizes disagree.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct MismatchInfo {
    pub seq: i64,
    /// First-seen (kept) copy
    pub path_a: String,
    pub path_b: String,
    pub size_a: u64,
    pub size_b: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sequence_number() {
        assert_eq!(sequence_number(Path::new("/x/00042.ts")).unwrap(), 42);
        assert_eq!(sequence_number(Path::new("-1.ts")).unwrap(), -1);
        assert!(sequence_number(Path::new("/x/init.ts")).is_err());
    }

    #[test]
    fn test_sentinel() {
        assert!(SegmentFile::new("0.ts", 1).unwrap().is_sentinel());
        assert!(SegmentFile::new("-1.ts", 1).unwrap().is_sentinel());
        assert!(!SegmentFile::new("1.ts", 1).unwrap().is_sentinel());
    }

    #[test]
    fn test_mismatch_field_names() {
        let info = MismatchInfo {
            seq: 3,
            path_a: "a/3.ts".into(),
            path_b: "b/3.ts".into(),
            size_a: 10,
            size_b: 11,
        };
        let json = serde_json::to_value(&info).unwrap();
        assert_eq!(json["pathA"], "a/3.ts");
        assert_eq!(json["sizeB"], 11);
    }
}
