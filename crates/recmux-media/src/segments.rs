//! Deduplication, ordering and gap detection over numbered segments.

use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};

use recmux_models::{is_sentinel, sequence_number, GapReport, MismatchInfo, SegmentFile, SEGMENT_EXTENSION};
use tracing::warn;

use crate::error::{MediaError, MediaResult};
use crate::fs_utils::move_file;

/// Segments kept after deduplication plus any size disagreements found.
#[derive(Debug, Default)]
pub struct DedupeOutcome {
    pub kept: Vec<SegmentFile>,
    pub mismatches: Vec<MismatchInfo>,
}

/// Collapse segments sharing a sequence number, keeping the first seen.
///
/// Later copies with the same size are dropped silently; a later copy with
/// a different size is dropped and recorded as a [`MismatchInfo`].
pub fn dedupe_segments(files: Vec<SegmentFile>) -> DedupeOutcome {
    let mut index: HashMap<i64, usize> = HashMap::new();
    let mut outcome = DedupeOutcome::default();

    for file in files {
        match index.get(&file.sequence_number) {
            Some(&i) => {
                let first = &outcome.kept[i];
                if first.size_bytes != file.size_bytes {
                    outcome.mismatches.push(MismatchInfo {
                        seq: file.sequence_number,
                        path_a: first.path.display().to_string(),
                        path_b: file.path.display().to_string(),
                        size_a: first.size_bytes,
                        size_b: file.size_bytes,
                    });
                }
            }
            None => {
                index.insert(file.sequence_number, outcome.kept.len());
                outcome.kept.push(file);
            }
        }
    }

    outcome
}

/// Stat each path and deduplicate in the given order.
pub async fn dedupe(paths: &[PathBuf]) -> MediaResult<DedupeOutcome> {
    let mut files = Vec::with_capacity(paths.len());
    for path in paths {
        let size = tokio::fs::metadata(path).await?.len();
        files.push(SegmentFile::new(path, size)?);
    }
    let outcome = dedupe_segments(files);
    for m in &outcome.mismatches {
        warn!(
            seq = m.seq,
            path_a = %m.path_a,
            path_b = %m.path_b,
            size_a = m.size_a,
            size_b = m.size_b,
            "Segment size mismatch"
        );
    }
    Ok(outcome)
}

/// Move the kept segments into the flat `segments_dir`.
pub async fn flatten_segments(kept: &[SegmentFile], segments_dir: &Path) -> MediaResult<()> {
    tokio::fs::create_dir_all(segments_dir).await?;
    for segment in kept {
        let name = segment
            .path
            .file_name()
            .ok_or_else(|| MediaError::internal(format!("No file name: {}", segment.path.display())))?;
        move_file(&segment.path, segments_dir.join(name)).await?;
    }
    Ok(())
}

/// Segment files in `dir` ordered by sequence number.
///
/// Non-segment files are ignored. An empty result is [`MediaError::NoSegments`].
pub async fn sorted_segment_paths(dir: &Path) -> MediaResult<Vec<PathBuf>> {
    let mut entries = tokio::fs::read_dir(dir).await?;
    let mut numbered = Vec::new();
    while let Some(entry) = entries.next_entry().await? {
        let path = entry.path();
        if path.extension().and_then(|e| e.to_str()) != Some(SEGMENT_EXTENSION) {
            continue;
        }
        numbered.push((sequence_number(&path)?, path));
    }

    if numbered.is_empty() {
        return Err(MediaError::NoSegments);
    }
    numbered.sort_by_key(|(seq, _)| *seq);
    Ok(numbered.into_iter().map(|(_, p)| p).collect())
}

/// Widest sequence range a single recording may cover (about 23 days of
/// 2-second segments); anything wider comes from a corrupt segment name.
pub const MAX_GAP_SPAN: i64 = 1_000_000;

/// Missing sequence numbers over `[start, end]` of already sorted numbers.
///
/// `start` is the first number, or the second one when the first is the
/// `0`/`-1` init sentinel. `-1` anywhere but first means the enumeration is
/// corrupt.
pub fn check_gaps(sorted_seqs: &[i64]) -> MediaResult<GapReport> {
    let (first, last) = match (sorted_seqs.first(), sorted_seqs.last()) {
        (Some(&f), Some(&l)) => (f, l),
        _ => return Err(MediaError::NoSegments),
    };

    if first != -1 && sorted_seqs.contains(&-1) {
        return Err(MediaError::InvalidSortOrder(format!(
            "sentinel -1 is not first: {:?}",
            &sorted_seqs[..sorted_seqs.len().min(3)]
        )));
    }

    let start = if is_sentinel(first) {
        match sorted_seqs.get(1) {
            Some(&second) => second,
            None => return Ok(GapReport::default()),
        }
    } else {
        first
    };

    let span = last.saturating_sub(start);
    if span > MAX_GAP_SPAN {
        return Err(MediaError::InvalidSortOrder(format!(
            "sequence range {}..={} spans more than {} segments",
            start, last, MAX_GAP_SPAN
        )));
    }

    let present: HashSet<i64> = sorted_seqs.iter().copied().collect();
    let missing = (start..=last).filter(|n| !present.contains(n)).collect();
    Ok(GapReport::new(missing))
}

/// [`check_gaps`] over sorted segment paths.
pub fn check_gap_paths(sorted_paths: &[PathBuf]) -> MediaResult<GapReport> {
    let seqs = sorted_paths
        .iter()
        .map(|p| sequence_number(p))
        .collect::<Result<Vec<_>, _>>()?;
    check_gaps(&seqs)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn seg(path: &str, size: u64) -> SegmentFile {
        SegmentFile::new(path, size).unwrap()
    }

    #[test]
    fn test_dedupe_equal_sizes_is_fixed_point() {
        let files = vec![
            seg("a/1.ts", 10),
            seg("a/2.ts", 10),
            seg("b/1.ts", 10),
            seg("b/2.ts", 10),
            seg("b/3.ts", 10),
        ];

        let first = dedupe_segments(files);
        assert_eq!(first.kept.len(), 3);
        assert!(first.mismatches.is_empty());

        let second = dedupe_segments(first.kept.clone());
        assert_eq!(second.kept, first.kept);
        assert!(second.mismatches.is_empty());
    }

    #[test]
    fn test_dedupe_reports_size_mismatch_keeps_first() {
        let outcome = dedupe_segments(vec![seg("a/7.ts", 100), seg("b/7.ts", 90)]);

        assert_eq!(outcome.kept, vec![seg("a/7.ts", 100)]);
        assert_eq!(outcome.mismatches.len(), 1);
        let m = &outcome.mismatches[0];
        assert_eq!(m.seq, 7);
        assert_eq!(m.path_a, "a/7.ts");
        assert_eq!(m.size_b, 90);
    }

    #[test]
    fn test_gaps_skip_zero_sentinel() {
        let report = check_gaps(&[0, 1, 2, 4, 5, 7]).unwrap();
        assert_eq!(report.missing_segments, vec![3, 6]);
    }

    #[test]
    fn test_gaps_without_sentinel() {
        assert_eq!(check_gaps(&[5, 6, 8]).unwrap().missing_segments, vec![7]);
    }

    #[test]
    fn test_single_segment_has_no_gaps() {
        assert!(!check_gaps(&[42]).unwrap().has_gaps());
        assert!(!check_gaps(&[0]).unwrap().has_gaps());
        assert!(!check_gaps(&[-1]).unwrap().has_gaps());
    }

    #[test]
    fn test_misplaced_minus_one_fails() {
        assert!(matches!(
            check_gaps(&[-2, -1, 3]),
            Err(MediaError::InvalidSortOrder(_))
        ));
        assert_eq!(check_gaps(&[-1, 1, 3]).unwrap().missing_segments, vec![2]);
    }

    #[test]
    fn test_corrupt_sequence_number_is_rejected_not_expanded() {
        assert!(matches!(
            check_gaps(&[1, 2, 4_000_000_000]),
            Err(MediaError::InvalidSortOrder(_))
        ));
        assert!(matches!(
            check_gaps(&[0, 1, i64::MAX]),
            Err(MediaError::InvalidSortOrder(_))
        ));

        let wide = check_gaps(&[1, MAX_GAP_SPAN + 1]).unwrap();
        assert_eq!(wide.missing_segments.len() as i64, MAX_GAP_SPAN - 1);
    }

    #[test]
    fn test_empty_is_no_segments() {
        assert!(matches!(check_gaps(&[]), Err(MediaError::NoSegments)));
    }

    #[tokio::test]
    async fn test_sorted_paths_numeric_order() {
        let tmp = TempDir::new().unwrap();
        for name in ["10.ts", "9.ts", "100.ts", "0.ts", "skip.yaml"] {
            tokio::fs::write(tmp.path().join(name), b"x").await.unwrap();
        }

        let sorted = sorted_segment_paths(tmp.path()).await.unwrap();
        let names: Vec<_> = sorted
            .iter()
            .map(|p| p.file_name().unwrap().to_string_lossy().into_owned())
            .collect();
        assert_eq!(names, vec!["0.ts", "9.ts", "10.ts", "100.ts"]);
        assert_eq!(check_gap_paths(&sorted).unwrap().missing_segments.len(), 89);
    }

    #[tokio::test]
    async fn test_sorted_paths_empty_dir() {
        let tmp = TempDir::new().unwrap();
        assert!(matches!(
            sorted_segment_paths(tmp.path()).await,
            Err(MediaError::NoSegments)
        ));
    }

    #[tokio::test]
    async fn test_dedupe_and_flatten_on_disk() {
        let tmp = TempDir::new().unwrap();
        let a = tmp.path().join("ex/a");
        let b = tmp.path().join("ex/b");
        tokio::fs::create_dir_all(&a).await.unwrap();
        tokio::fs::create_dir_all(&b).await.unwrap();
        tokio::fs::write(a.join("1.ts"), b"11").await.unwrap();
        tokio::fs::write(b.join("1.ts"), b"111").await.unwrap();
        tokio::fs::write(b.join("2.ts"), b"22").await.unwrap();

        let paths = vec![a.join("1.ts"), b.join("1.ts"), b.join("2.ts")];
        let outcome = dedupe(&paths).await.unwrap();
        assert_eq!(outcome.kept.len(), 2);
        assert_eq!(outcome.mismatches.len(), 1);

        let flat = tmp.path().join("segments");
        flatten_segments(&outcome.kept, &flat).await.unwrap();
        assert_eq!(tokio::fs::read(flat.join("1.ts")).await.unwrap(), b"11");
        assert!(flat.join("2.ts").exists());
    }
}
