//! Object-store segment accessor.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use futures::stream::{self, StreamExt, TryStreamExt};
use recmux_models::RecordingKey;
use tracing::{debug, info};

use crate::accessor::{base_name, BackendKind, SegmentAccessor};
use crate::client::ObjectStoreClient;
use crate::error::StorageResult;
use crate::transfer::{CopyStats, DownloadStats};

/// Segments stored under `incomplete/{platform}/{channel}/{video}/` in a bucket.
#[derive(Clone)]
pub struct S3SegmentAccessor {
    client: ObjectStoreClient,
    delete_batch_size: usize,
    download_parallelism: usize,
}

impl S3SegmentAccessor {
    pub fn new(client: ObjectStoreClient, delete_batch_size: usize, download_parallelism: usize) -> Self {
        Self {
            client,
            delete_batch_size,
            download_parallelism: download_parallelism.max(1),
        }
    }

    pub fn client(&self) -> &ObjectStoreClient {
        &self.client
    }
}

#[async_trait]
impl SegmentAccessor for S3SegmentAccessor {
    fn backend(&self) -> BackendKind {
        BackendKind::ObjectStore
    }

    async fn get_paths(&self, key: &RecordingKey) -> StorageResult<Vec<String>> {
        let objects = self.client.list_objects(&key.incomplete_prefix()).await?;
        Ok(objects.into_iter().map(|o| o.key).collect())
    }

    async fn get_size_sum(&self, key: &RecordingKey) -> StorageResult<u64> {
        let objects = self.client.list_objects(&key.incomplete_prefix()).await?;
        Ok(objects.iter().map(|o| o.size).sum())
    }

    async fn copy(&self, paths: &[String], dest_dir: &Path) -> StorageResult<CopyStats> {
        tokio::fs::create_dir_all(dest_dir).await?;

        let downloads: Vec<(String, PathBuf)> = paths
            .iter()
            .map(|key| (key.clone(), dest_dir.join(base_name(key))))
            .collect();

        let results: Vec<DownloadStats> = stream::iter(downloads.into_iter().map(|(key, dest)| {
            let client = self.client.clone();
            async move { client.download_to_file(&key, &dest).await }
        }))
        .buffer_unordered(self.download_parallelism)
        .try_collect()
        .await?;

        let mut stats = CopyStats::default();
        for download in &results {
            stats.record(download);
        }

        metrics::counter!("recmux_download_retries_total").increment(stats.retry_count as u64);
        info!(
            files = stats.files,
            bytes = stats.bytes,
            retry_count = stats.retry_count,
            wasted_bytes_mb = stats.wasted_mb(),
            small_chunk_count_avg = stats.small_chunk_count_avg(),
            small_chunk_count_max = stats.small_chunk_count_max,
            "Downloaded objects"
        );
        Ok(stats)
    }

    async fn clear_by_key(&self, key: &RecordingKey) -> StorageResult<()> {
        let keys = self.get_paths(key).await?;
        debug!(prefix = %key.incomplete_prefix(), count = keys.len(), "Clearing recording");
        self.clear_by_paths(&keys).await
    }

    async fn clear_by_paths(&self, paths: &[String]) -> StorageResult<()> {
        self.client
            .delete_objects(paths, self.delete_batch_size)
            .await
            .map(|_| ())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::S3Config;
    use crate::transfer::TransferConfig;
    use std::sync::Arc;
    use tempfile::TempDir;

    fn accessor() -> S3SegmentAccessor {
        let config = S3Config {
            endpoint_url: "http://localhost:9000".into(),
            access_key: "a".into(),
            secret_key: "b".into(),
            bucket_name: "recordings".into(),
            region: "us-east-1".into(),
            verify: true,
        };
        let client = ObjectStoreClient::new(config, TransferConfig::default()).unwrap();
        S3SegmentAccessor::new(client, 500, 4)
    }

    #[tokio::test]
    async fn test_copy_without_keys_creates_dest_dir() {
        let tmp = TempDir::new().unwrap();
        let dest = tmp.path().join("tars");
        let accessor: Arc<dyn SegmentAccessor> = Arc::new(accessor());

        let stats = accessor.copy(&[], &dest).await.unwrap();

        assert_eq!(stats.files, 0);
        assert!(dest.is_dir());
    }

    #[tokio::test]
    async fn test_copy_runs_on_spawned_task() {
        let tmp = TempDir::new().unwrap();
        let dest = tmp.path().join("tars");
        let accessor = accessor();

        let handle = tokio::spawn(async move { accessor.copy(&[], &dest).await.map(|s| s.files) });
        assert_eq!(handle.await.unwrap().unwrap(), 0);
    }
}
