//! Local-directory segment accessor.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use recmux_models::RecordingKey;
use tracing::debug;

use crate::accessor::{base_name, BackendKind, SegmentAccessor};
use crate::error::{StorageError, StorageResult};
use crate::fs_utils::remove_dir_if_empty;
use crate::transfer::{CopyStats, DownloadStats};

/// Segments stored under `{incomplete_dir}/{platform}/{channel}/{video}/`.
#[derive(Debug, Clone)]
pub struct LocalSegmentAccessor {
    incomplete_dir: PathBuf,
}

impl LocalSegmentAccessor {
    pub fn new(incomplete_dir: impl Into<PathBuf>) -> Self {
        Self {
            incomplete_dir: incomplete_dir.into(),
        }
    }

    pub fn incomplete_dir(&self) -> &Path {
        &self.incomplete_dir
    }

    async fn list_files(&self, key: &RecordingKey) -> StorageResult<Vec<(PathBuf, u64)>> {
        let dir = key.video_dir_in(&self.incomplete_dir);
        let mut entries = match tokio::fs::read_dir(&dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        let mut files = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            let metadata = entry.metadata().await?;
            if !metadata.is_file() {
                return Err(StorageError::NotAFile(entry.path().display().to_string()));
            }
            files.push((entry.path(), metadata.len()));
        }
        files.sort();
        Ok(files)
    }

    /// Remove `dir` and its ancestors while they are empty, stopping at the
    /// incomplete root.
    async fn prune_empty_ancestors(&self, mut dir: PathBuf) -> StorageResult<()> {
        while dir.starts_with(&self.incomplete_dir) && dir != self.incomplete_dir {
            if !remove_dir_if_empty(&dir).await? {
                break;
            }
            debug!(dir = %dir.display(), "Removed empty directory");
            match dir.parent() {
                Some(parent) => dir = parent.to_path_buf(),
                None => break,
            }
        }
        Ok(())
    }
}

#[async_trait]
impl SegmentAccessor for LocalSegmentAccessor {
    fn backend(&self) -> BackendKind {
        BackendKind::Local
    }

    async fn get_paths(&self, key: &RecordingKey) -> StorageResult<Vec<String>> {
        Ok(self
            .list_files(key)
            .await?
            .into_iter()
            .map(|(path, _)| path.display().to_string())
            .collect())
    }

    async fn get_size_sum(&self, key: &RecordingKey) -> StorageResult<u64> {
        Ok(self.list_files(key).await?.iter().map(|(_, size)| size).sum())
    }

    async fn copy(&self, paths: &[String], dest_dir: &Path) -> StorageResult<CopyStats> {
        tokio::fs::create_dir_all(dest_dir).await?;

        let mut stats = CopyStats::default();
        for src in paths {
            let metadata = tokio::fs::metadata(src).await?;
            if !metadata.is_file() {
                return Err(StorageError::NotAFile(src.clone()));
            }
            let dst = dest_dir.join(base_name(src));
            let bytes = tokio::fs::copy(src, &dst).await?;
            stats.record(&DownloadStats {
                bytes,
                ..Default::default()
            });
        }
        Ok(stats)
    }

    async fn clear_by_key(&self, key: &RecordingKey) -> StorageResult<()> {
        let video_dir = key.video_dir_in(&self.incomplete_dir);
        match tokio::fs::remove_dir_all(&video_dir).await {
            Ok(()) => {}
            Err(e) if e.kind() == ErrorKind::NotFound => {}
            Err(e) => return Err(e.into()),
        }
        if let Some(channel_dir) = video_dir.parent() {
            self.prune_empty_ancestors(channel_dir.to_path_buf()).await?;
        }
        Ok(())
    }

    async fn clear_by_paths(&self, paths: &[String]) -> StorageResult<()> {
        let mut parents: Vec<PathBuf> = Vec::new();
        for path in paths {
            let path = Path::new(path);
            match tokio::fs::remove_file(path).await {
                Ok(()) => {}
                Err(e) if e.kind() == ErrorKind::NotFound => {}
                Err(e) => return Err(e.into()),
            }
            if let Some(parent) = path.parent() {
                if !parents.iter().any(|p| p == parent) {
                    parents.push(parent.to_path_buf());
                }
            }
        }
        for parent in parents {
            self.prune_empty_ancestors(parent).await?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use recmux_models::Platform;
    use tempfile::TempDir;

    fn key() -> RecordingKey {
        RecordingKey::new(Some(Platform::Chzzk), "c1", "v1")
    }

    async fn seed(root: &Path, key: &RecordingKey, files: &[(&str, &[u8])]) {
        let dir = key.video_dir_in(root);
        tokio::fs::create_dir_all(&dir).await.unwrap();
        for (name, data) in files {
            tokio::fs::write(dir.join(name), data).await.unwrap();
        }
    }

    #[tokio::test]
    async fn test_missing_recording_is_empty() {
        let tmp = TempDir::new().unwrap();
        let accessor = LocalSegmentAccessor::new(tmp.path());

        assert!(accessor.get_paths(&key()).await.unwrap().is_empty());
        assert_eq!(accessor.get_size_sum(&key()).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_paths_size_and_copy() {
        let tmp = TempDir::new().unwrap();
        let root = tmp.path().join("incomplete");
        seed(&root, &key(), &[("1.tar", b"aaa"), ("2.tar", b"bbbbb")]).await;
        let accessor = LocalSegmentAccessor::new(&root);

        let paths = accessor.get_paths(&key()).await.unwrap();
        assert_eq!(paths.len(), 2);
        assert_eq!(accessor.get_size_sum(&key()).await.unwrap(), 8);

        let dest = tmp.path().join("work/tars");
        let stats = accessor.copy(&paths, &dest).await.unwrap();
        assert_eq!(stats.files, 2);
        assert_eq!(stats.bytes, 8);
        assert_eq!(tokio::fs::read(dest.join("2.tar")).await.unwrap(), b"bbbbb");
    }

    #[tokio::test]
    async fn test_clear_by_key_twice_prunes_dirs() {
        let tmp = TempDir::new().unwrap();
        let root = tmp.path().join("incomplete");
        seed(&root, &key(), &[("1.tar", b"a")]).await;
        let accessor = LocalSegmentAccessor::new(&root);

        accessor.clear_by_key(&key()).await.unwrap();
        accessor.clear_by_key(&key()).await.unwrap();

        assert!(!root.join("chzzk").exists());
        assert!(root.exists());
    }

    #[tokio::test]
    async fn test_clear_keeps_sibling_channels() {
        let tmp = TempDir::new().unwrap();
        let root = tmp.path().join("incomplete");
        let other = RecordingKey::new(Some(Platform::Chzzk), "c2", "v9");
        seed(&root, &key(), &[("1.tar", b"a")]).await;
        seed(&root, &other, &[("1.tar", b"a")]).await;
        let accessor = LocalSegmentAccessor::new(&root);

        accessor.clear_by_key(&key()).await.unwrap();

        assert!(!root.join("chzzk/c1").exists());
        assert!(other.video_dir_in(&root).join("1.tar").exists());
    }

    #[tokio::test]
    async fn test_clear_by_paths_skips_absent() {
        let tmp = TempDir::new().unwrap();
        let root = tmp.path().join("incomplete");
        seed(&root, &key(), &[("1.tar", b"a"), ("2.tar", b"b")]).await;
        let accessor = LocalSegmentAccessor::new(&root);

        let mut paths = accessor.get_paths(&key()).await.unwrap();
        paths.push(key().video_dir_in(&root).join("9.tar").display().to_string());
        accessor.clear_by_paths(&paths).await.unwrap();
        accessor.clear_by_paths(&paths).await.unwrap();

        assert!(accessor.get_paths(&key()).await.unwrap().is_empty());
        assert!(!key().video_dir_in(&root).exists());
    }
}
