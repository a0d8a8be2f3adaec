//! Byte-level concatenation of ordered segments.

use std::path::{Path, PathBuf};

use tokio::fs::File;
use tokio::io::AsyncWriteExt;
use tracing::debug;

use crate::error::MediaResult;

/// Append every segment to `merged_path` in the given order, deleting each
/// segment once it has been appended. Returns the merged size in bytes.
pub async fn merge_segments(sorted_paths: &[PathBuf], merged_path: &Path) -> MediaResult<u64> {
    if let Some(parent) = merged_path.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }

    let mut out = File::create(merged_path).await?;
    let mut total = 0u64;
    for path in sorted_paths {
        let mut segment = File::open(path).await?;
        total += tokio::io::copy(&mut segment, &mut out).await?;
        drop(segment);
        tokio::fs::remove_file(path).await?;
    }
    out.flush().await?;
    out.sync_all().await?;

    debug!(
        segments = sorted_paths.len(),
        bytes = total,
        merged = %merged_path.display(),
        "Merged segments"
    );
    Ok(total)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::segments::sorted_segment_paths;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_merge_in_sequence_order() {
        let tmp = TempDir::new().unwrap();
        let dir = tmp.path().join("segments");
        tokio::fs::create_dir_all(&dir).await.unwrap();
        // Written out of order on purpose
        for (name, data) in [("3.ts", "ccc"), ("1.ts", "a"), ("10.ts", "J"), ("2.ts", "bb")] {
            tokio::fs::write(dir.join(name), data).await.unwrap();
        }

        let sorted = sorted_segment_paths(&dir).await.unwrap();
        let merged = tmp.path().join("v1.ts");
        let bytes = merge_segments(&sorted, &merged).await.unwrap();

        assert_eq!(bytes, 7);
        assert_eq!(tokio::fs::read_to_string(&merged).await.unwrap(), "abbcccJ");
        for path in sorted {
            assert!(!path.exists());
        }
    }
}
