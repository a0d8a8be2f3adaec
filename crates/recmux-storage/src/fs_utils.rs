//! Directory pruning shared by the local accessor and the working trees.
//!
//! Removal races with concurrent writers are expected: a directory that
//! disappears or gains entries between the check and the removal is left
//! alone, never reported as an error.

use std::io::{self, ErrorKind};
use std::path::{Path, PathBuf};

use tokio::fs;

/// Remove `dir` if it exists and is empty.
///
/// Returns `true` if removed.
pub async fn remove_dir_if_empty(dir: &Path) -> io::Result<bool> {
    if !dir_is_empty(dir).await? {
        return Ok(false);
    }
    match fs::remove_dir(dir).await {
        Ok(()) => Ok(true),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(false),
        Err(e) => {
            if dir_is_empty(dir).await? {
                Err(e)
            } else {
                Ok(false)
            }
        }
    }
}

/// `false` for missing directories.
async fn dir_is_empty(dir: &Path) -> io::Result<bool> {
    match fs::read_dir(dir).await {
        Ok(mut entries) => Ok(entries.next_entry().await?.is_none()),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(false),
        Err(e) => Err(e),
    }
}

/// Remove each directory in order while it is empty; stop at the first
/// one that is not. Missing directories are skipped.
pub async fn prune_empty_dirs(dirs: &[PathBuf]) -> io::Result<()> {
    for dir in dirs {
        if !dir.exists() {
            continue;
        }
        if !remove_dir_if_empty(dir).await? {
            break;
        }
    }
    Ok(())
}

/// Recursively remove `dir`; absence is success.
pub async fn remove_tree_if_exists(dir: &Path) -> io::Result<()> {
    match fs::remove_dir_all(dir).await {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_remove_dir_if_empty() {
        let dir = TempDir::new().unwrap();
        let empty = dir.path().join("empty");
        let full = dir.path().join("full");
        fs::create_dir_all(&empty).await.unwrap();
        fs::create_dir_all(&full).await.unwrap();
        fs::write(full.join("f"), b"x").await.unwrap();

        assert!(remove_dir_if_empty(&empty).await.unwrap());
        assert!(!remove_dir_if_empty(&empty).await.unwrap());
        assert!(!remove_dir_if_empty(&full).await.unwrap());
        assert!(full.exists());
    }

    #[tokio::test]
    async fn test_prune_stops_at_non_empty() {
        let dir = TempDir::new().unwrap();
        let video = dir.path().join("p/c/v");
        fs::create_dir_all(&video).await.unwrap();
        fs::write(dir.path().join("p/keep"), b"x").await.unwrap();

        let dirs = vec![video.clone(), dir.path().join("p/c"), dir.path().join("p")];
        prune_empty_dirs(&dirs).await.unwrap();

        assert!(!video.exists());
        assert!(!dir.path().join("p/c").exists());
        assert!(dir.path().join("p").exists());
    }

    #[tokio::test]
    async fn test_remove_tree_if_exists() {
        let dir = TempDir::new().unwrap();
        let tree = dir.path().join("t/a/b");
        fs::create_dir_all(&tree).await.unwrap();

        remove_tree_if_exists(&dir.path().join("t")).await.unwrap();
        remove_tree_if_exists(&dir.path().join("t")).await.unwrap();
        assert!(!dir.path().join("t").exists());
    }
}
