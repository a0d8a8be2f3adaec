//! Filesystem helpers for moving artifacts between trees.
//!
//! The working directory and the published tree may live on different
//! filesystems, so moves fall back to copy-then-rename on EXDEV. A file
//! only ever appears at its destination through a single rename.

use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::{debug, warn};

pub use recmux_storage::fs_utils::{prune_empty_dirs, remove_dir_if_empty, remove_tree_if_exists};

use crate::error::{MediaError, MediaResult};

/// Move a file from `src` to `dst`, creating `dst`'s parent and replacing
/// any existing file.
pub async fn move_file(src: impl AsRef<Path>, dst: impl AsRef<Path>) -> MediaResult<()> {
    let src = src.as_ref();
    let dst = dst.as_ref();

    if let Some(parent) = dst.parent() {
        fs::create_dir_all(parent).await?;
    }

    match fs::rename(src, dst).await {
        Ok(()) => Ok(()),
        Err(e) if is_cross_device_error(&e) => {
            debug!(
                "Cross-device rename, copying instead: {} -> {}",
                src.display(),
                dst.display()
            );
            copy_then_rename(src, dst).await
        }
        Err(e) => Err(MediaError::from(e)),
    }
}

/// EXDEV is error code 18 on Linux and macOS.
fn is_cross_device_error(e: &std::io::Error) -> bool {
    e.raw_os_error() == Some(18)
}

/// Sibling of `dst` that is never a published name.
fn partial_path(dst: &Path) -> PathBuf {
    let name = dst
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    dst.with_file_name(format!(".{}.partial", name))
}

async fn copy_then_rename(src: &Path, dst: &Path) -> MediaResult<()> {
    let tmp_dst = partial_path(dst);

    if let Err(e) = fs::copy(src, &tmp_dst).await {
        let _ = fs::remove_file(&tmp_dst).await;
        return Err(e.into());
    }

    if let Err(e) = fs::rename(&tmp_dst, dst).await {
        let _ = fs::remove_file(&tmp_dst).await;
        return Err(e.into());
    }

    if let Err(e) = fs::remove_file(src).await {
        warn!(
            "Failed to remove source after cross-device move: {}: {}",
            src.display(),
            e
        );
    }
    Ok(())
}

/// Move every regular file directly inside `src_dir` into `dst_dir`, then
/// remove `src_dir`. Returns the number of files moved.
pub async fn move_dir_files(src_dir: &Path, dst_dir: &Path) -> MediaResult<usize> {
    fs::create_dir_all(dst_dir).await?;

    let mut entries = fs::read_dir(src_dir).await?;
    let mut moved = 0;
    while let Some(entry) = entries.next_entry().await? {
        if !entry.file_type().await?.is_file() {
            return Err(MediaError::internal(format!(
                "Unexpected non-file entry: {}",
                entry.path().display()
            )));
        }
        move_file(entry.path(), dst_dir.join(entry.file_name())).await?;
        moved += 1;
    }

    remove_dir_if_empty(src_dir).await?;
    Ok(moved)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_move_file_creates_parent_and_overwrites() {
        let dir = TempDir::new().unwrap();
        let src = dir.path().join("a.mp4");
        let dst = dir.path().join("x/y/a.mp4");

        fs::create_dir_all(dst.parent().unwrap()).await.unwrap();
        fs::write(&dst, b"old").await.unwrap();
        fs::write(&src, b"new").await.unwrap();

        move_file(&src, &dst).await.unwrap();

        assert!(!src.exists());
        assert_eq!(fs::read(&dst).await.unwrap(), b"new");
    }

    #[test]
    fn test_partial_path_is_hidden_sibling() {
        let p = partial_path(Path::new("/c/chzzk/c1/v1.mp4"));
        assert_eq!(p, PathBuf::from("/c/chzzk/c1/.v1.mp4.partial"));
    }

    #[test]
    fn test_is_cross_device_error() {
        assert!(is_cross_device_error(&std::io::Error::from_raw_os_error(18)));
        assert!(!is_cross_device_error(&std::io::Error::from_raw_os_error(2)));
    }

    #[tokio::test]
    async fn test_move_dir_files() {
        let dir = TempDir::new().unwrap();
        let src = dir.path().join("tars");
        let dst = dir.path().join("archive/v1");
        fs::create_dir_all(&src).await.unwrap();
        fs::write(src.join("1.tar"), b"a").await.unwrap();
        fs::write(src.join("2.tar"), b"b").await.unwrap();

        assert_eq!(move_dir_files(&src, &dst).await.unwrap(), 2);
        assert!(!src.exists());
        assert!(dst.join("2.tar").exists());
    }
}
