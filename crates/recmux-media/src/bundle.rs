//! Validation and extraction of segment bundles (`.tar`).

use std::fs::File;
use std::path::{Path, PathBuf};

use recmux_models::{ARCHIVE_EXTENSION, SEGMENT_EXTENSION};
use tracing::debug;
use walkdir::WalkDir;

use crate::error::{MediaError, MediaResult};

fn has_extension(path: &Path, ext: &str) -> bool {
    path.extension().and_then(|e| e.to_str()) == Some(ext)
}

/// Check that `tars_dir` exists, is non-empty and holds only bundles.
///
/// Returns the bundle paths sorted by file name.
pub async fn validate_tars_dir(tars_dir: &Path) -> MediaResult<Vec<PathBuf>> {
    if !tokio::fs::try_exists(tars_dir).await? {
        return Err(MediaError::SourceMissing(tars_dir.to_path_buf()));
    }

    let mut entries = tokio::fs::read_dir(tars_dir).await?;
    let mut tars = Vec::new();
    while let Some(entry) = entries.next_entry().await? {
        let path = entry.path();
        if !has_extension(&path, ARCHIVE_EXTENSION) {
            return Err(MediaError::InvalidExtension {
                path,
                expected: ARCHIVE_EXTENSION,
            });
        }
        tars.push(path);
    }

    if tars.is_empty() {
        return Err(MediaError::SourceEmpty(tars_dir.to_path_buf()));
    }
    tars.sort();
    Ok(tars)
}

/// Extract every bundle in `tars_dir` into `out_dir/{bundle stem}/`.
///
/// Returns every extracted file in directory-walk order (bundles by name,
/// then entries by name). Any extracted file that is not a segment fails
/// the whole extraction.
pub async fn extract_tars(tars_dir: &Path, out_dir: &Path) -> MediaResult<Vec<PathBuf>> {
    let tars = validate_tars_dir(tars_dir).await?;
    let out_dir = out_dir.to_path_buf();

    tokio::task::spawn_blocking(move || extract_blocking(&tars, &out_dir))
        .await
        .map_err(|e| MediaError::internal(format!("Extraction task failed: {}", e)))?
}

fn extract_blocking(tars: &[PathBuf], out_dir: &Path) -> MediaResult<Vec<PathBuf>> {
    std::fs::create_dir_all(out_dir)?;

    for tar_path in tars {
        let stem = tar_path
            .file_stem()
            .ok_or_else(|| MediaError::archive(tar_path, "bundle has no file stem"))?;
        let sub_dir = out_dir.join(stem);
        std::fs::create_dir_all(&sub_dir)?;

        let file = File::open(tar_path)?;
        let mut archive = tar::Archive::new(file);
        archive
            .unpack(&sub_dir)
            .map_err(|e| MediaError::archive(tar_path, e.to_string()))?;
        debug!(bundle = %tar_path.display(), "Extracted bundle");
    }

    let mut files = Vec::new();
    for entry in WalkDir::new(out_dir).sort_by_file_name() {
        let entry = entry.map_err(|e| MediaError::archive(out_dir, e.to_string()))?;
        if !entry.file_type().is_file() {
            continue;
        }
        let path = entry.into_path();
        if !has_extension(&path, SEGMENT_EXTENSION) {
            return Err(MediaError::InvalidExtension {
                path,
                expected: SEGMENT_EXTENSION,
            });
        }
        files.push(path);
    }
    Ok(files)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    /// Write a bundle containing `entries` (name, bytes).
    fn write_tar(path: &Path, entries: &[(&str, &[u8])]) {
        let file = File::create(path).unwrap();
        let mut builder = tar::Builder::new(file);
        for (name, data) in entries {
            let mut header = tar::Header::new_gnu();
            header.set_size(data.len() as u64);
            header.set_mode(0o644);
            header.set_cksum();
            builder.append_data(&mut header, name, *data).unwrap();
        }
        builder.finish().unwrap();
    }

    #[tokio::test]
    async fn test_validate_missing_and_empty() {
        let tmp = TempDir::new().unwrap();
        let missing = tmp.path().join("nope");
        assert!(matches!(
            validate_tars_dir(&missing).await,
            Err(MediaError::SourceMissing(_))
        ));

        let empty = tmp.path().join("tars");
        std::fs::create_dir_all(&empty).unwrap();
        assert!(matches!(
            validate_tars_dir(&empty).await,
            Err(MediaError::SourceEmpty(_))
        ));
    }

    #[tokio::test]
    async fn test_validate_rejects_foreign_files() {
        let tmp = TempDir::new().unwrap();
        let dir = tmp.path().join("tars");
        std::fs::create_dir_all(&dir).unwrap();
        write_tar(&dir.join("1.tar"), &[("1.ts", b"a")]);
        std::fs::write(dir.join("notes.txt"), b"x").unwrap();

        let err = validate_tars_dir(&dir).await.unwrap_err();
        assert!(err.is_upstream_data());
    }

    #[tokio::test]
    async fn test_extract_into_stem_dirs() {
        let tmp = TempDir::new().unwrap();
        let dir = tmp.path().join("tars");
        let out = tmp.path().join("extracted");
        std::fs::create_dir_all(&dir).unwrap();
        write_tar(&dir.join("a_1_3.tar"), &[("1.ts", b"1"), ("2.ts", b"22")]);
        write_tar(&dir.join("a_3_4.tar"), &[("3.ts", b"333")]);

        let files = extract_tars(&dir, &out).await.unwrap();

        assert_eq!(
            files,
            vec![
                out.join("a_1_3/1.ts"),
                out.join("a_1_3/2.ts"),
                out.join("a_3_4/3.ts"),
            ]
        );
    }

    #[tokio::test]
    async fn test_extract_rejects_non_segment_entries() {
        let tmp = TempDir::new().unwrap();
        let dir = tmp.path().join("tars");
        std::fs::create_dir_all(&dir).unwrap();
        write_tar(&dir.join("1.tar"), &[("1.ts", b"1"), ("readme.md", b"hi")]);

        let err = extract_tars(&dir, &tmp.path().join("out")).await.unwrap_err();
        assert!(matches!(err, MediaError::InvalidExtension { expected: "ts", .. }));
    }
}
