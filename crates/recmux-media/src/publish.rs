//! Two-phase publish into the complete tree.
//!
//! Artifacts are first moved into a per-recording directory of the staging
//! tree, then renamed into their final location. The staging tree shares the
//! complete tree's filesystem, so the second move is a single rename and a
//! reader of the complete tree never observes a partially written file.

use std::path::{Path, PathBuf};

use recmux_models::RecordingKey;
use tracing::{debug, warn};

use crate::error::{MediaError, MediaResult};
use crate::fs_utils::{move_dir_files, move_file, prune_empty_dirs};

#[derive(Debug, Clone)]
pub struct StagedPublisher {
    complete_dir: PathBuf,
    staging_dir: PathBuf,
}

impl StagedPublisher {
    pub fn new(complete_dir: impl Into<PathBuf>, staging_dir: impl Into<PathBuf>) -> Self {
        Self {
            complete_dir: complete_dir.into(),
            staging_dir: staging_dir.into(),
        }
    }

    pub fn complete_dir(&self) -> &Path {
        &self.complete_dir
    }

    pub fn staging_dir(&self) -> &Path {
        &self.staging_dir
    }

    /// `{staging}/{platform}/{channel}/{video}`
    pub fn staging_video_dir(&self, key: &RecordingKey) -> PathBuf {
        key.video_dir_in(&self.staging_dir)
    }

    /// `{complete}/{platform}/{channel}/{file_name}`
    pub fn final_path(&self, key: &RecordingKey, file_name: &str) -> PathBuf {
        key.channel_dir_in(&self.complete_dir).join(file_name)
    }

    /// `{complete}/{platform}/{channel}/{video}/`, where archived bundles land.
    pub fn archive_dir(&self, key: &RecordingKey) -> PathBuf {
        key.video_dir_in(&self.complete_dir)
    }

    /// Phase one: move `src` into the recording's staging directory.
    pub async fn stage(&self, key: &RecordingKey, src: &Path) -> MediaResult<PathBuf> {
        let name = src
            .file_name()
            .ok_or_else(|| MediaError::internal(format!("No file name: {}", src.display())))?;
        let staged = self.staging_video_dir(key).join(name);
        move_file(src, &staged).await?;
        debug!(staged = %staged.display(), "Staged artifact");
        Ok(staged)
    }

    /// Phase two: rename a staged file to its final path.
    pub async fn promote(&self, key: &RecordingKey, staged: &Path) -> MediaResult<PathBuf> {
        let name = staged
            .file_name()
            .and_then(|n| n.to_str())
            .ok_or_else(|| MediaError::internal(format!("No file name: {}", staged.display())))?;
        let dst = self.final_path(key, name);
        move_file(staged, &dst).await?;
        debug!(published = %dst.display(), "Published artifact");
        Ok(dst)
    }

    /// Stage then promote one file.
    pub async fn publish_file(&self, key: &RecordingKey, src: &Path) -> MediaResult<PathBuf> {
        let staged = self.stage(key, src).await?;
        self.promote(key, &staged).await
    }

    /// Move the files of `src_dir` into `{staging video dir}/{name}/`.
    pub async fn stage_dir(&self, key: &RecordingKey, src_dir: &Path, name: &str) -> MediaResult<PathBuf> {
        let staged = self.staging_video_dir(key).join(name);
        move_dir_files(src_dir, &staged).await?;
        Ok(staged)
    }

    /// Move a staged directory's files into the recording's archive directory.
    pub async fn promote_dir(&self, key: &RecordingKey, staged_dir: &Path) -> MediaResult<PathBuf> {
        let dst = self.archive_dir(key);
        let moved = move_dir_files(staged_dir, &dst).await?;
        debug!(archive = %dst.display(), files = moved, "Published archive");
        Ok(dst)
    }

    /// Remove the recording's staging directories while empty.
    ///
    /// Never fails; a directory that is non-empty or already gone is left
    /// as is.
    pub async fn cleanup_staging(&self, key: &RecordingKey) {
        if let Err(e) = prune_empty_dirs(&key.ancestor_dirs_in(&self.staging_dir)).await {
            warn!(key = %key, error = %e, "Failed to clean staging directories");
        }
        let video_dir = self.staging_video_dir(key);
        if video_dir.exists() {
            warn!(dir = %video_dir.display(), "Staging directory not empty after publish");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use recmux_models::Platform;
    use tempfile::TempDir;

    fn setup() -> (TempDir, StagedPublisher, RecordingKey) {
        let tmp = TempDir::new().unwrap();
        let publisher = StagedPublisher::new(tmp.path().join("complete"), tmp.path().join("_tmp"));
        let key = RecordingKey::new(Some(Platform::Chzzk), "c1", "v1");
        (tmp, publisher, key)
    }

    #[tokio::test]
    async fn test_publish_file_layout() {
        let (tmp, publisher, key) = setup();
        let src = tmp.path().join("work/v1.mp4");
        tokio::fs::create_dir_all(src.parent().unwrap()).await.unwrap();
        tokio::fs::write(&src, b"movie").await.unwrap();

        let dst = publisher.publish_file(&key, &src).await.unwrap();
        publisher.cleanup_staging(&key).await;

        assert_eq!(dst, tmp.path().join("complete/chzzk/c1/v1.mp4"));
        assert_eq!(tokio::fs::read(&dst).await.unwrap(), b"movie");
        assert!(!tmp.path().join("_tmp/chzzk").exists());
    }

    #[tokio::test]
    async fn test_interrupted_publish_leaves_final_path_absent() {
        let (tmp, publisher, key) = setup();
        let src = tmp.path().join("v1.mp4");
        tokio::fs::write(&src, vec![7u8; 4096]).await.unwrap();

        let staged = publisher.stage(&key, &src).await.unwrap();
        // Fault between the two phases: nothing visible yet.
        let final_path = publisher.final_path(&key, "v1.mp4");
        assert!(!final_path.exists());
        assert!(staged.starts_with(publisher.staging_dir()));

        // A retry completes the move with the whole file.
        publisher.promote(&key, &staged).await.unwrap();
        assert_eq!(tokio::fs::read(&final_path).await.unwrap().len(), 4096);
    }

    #[tokio::test]
    async fn test_archive_dir_publish() {
        let (tmp, publisher, key) = setup();
        let tars = tmp.path().join("work/tars");
        tokio::fs::create_dir_all(&tars).await.unwrap();
        tokio::fs::write(tars.join("1.tar"), b"t").await.unwrap();

        let staged = publisher.stage_dir(&key, &tars, "tars").await.unwrap();
        assert!(!tars.exists());
        let archive = publisher.promote_dir(&key, &staged).await.unwrap();
        publisher.cleanup_staging(&key).await;

        assert_eq!(archive, tmp.path().join("complete/chzzk/c1/v1"));
        assert!(archive.join("1.tar").exists());
        assert!(!tmp.path().join("_tmp/chzzk").exists());
    }
}
