//! S3-compatible object store client.

use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant, UNIX_EPOCH};

use aws_config::BehaviorVersion;
use aws_credential_types::Credentials;
use aws_sdk_s3::config::{Builder, Region};
use aws_sdk_s3::primitives::ByteStream;
use aws_sdk_s3::types::{Delete, ObjectIdentifier};
use aws_sdk_s3::Client;
use serde::{Deserialize, Serialize};
use tokio::io::{AsyncWriteExt, BufWriter};
use tracing::{debug, error, info, warn};

use crate::error::{StorageError, StorageResult};
use crate::retry::retry_async;
use crate::transfer::{BandwidthLimiter, DownloadStats, TransferConfig};

/// Maximum keys accepted by one DeleteObjects request.
pub const MAX_DELETE_BATCH: usize = 1000;

/// Connection parameters of one S3-compatible bucket.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct S3Config {
    pub endpoint_url: String,
    pub access_key: String,
    pub secret_key: String,
    pub bucket_name: String,
    #[serde(default = "default_region")]
    pub region: String,
    #[serde(default = "default_verify")]
    pub verify: bool,
}

fn default_region() -> String {
    "us-east-1".to_string()
}

fn default_verify() -> bool {
    true
}

/// Information about a stored object.
#[derive(Debug, Clone)]
pub struct ObjectInfo {
    pub key: String,
    pub size: u64,
    /// Milliseconds since epoch
    pub last_modified: Option<u64>,
}

/// Object store client with throttled, retried downloads.
#[derive(Clone)]
pub struct ObjectStoreClient {
    client: Client,
    bucket: String,
    transfer: TransferConfig,
    limiter: Option<Arc<BandwidthLimiter>>,
}

impl ObjectStoreClient {
    pub fn new(config: S3Config, transfer: TransferConfig) -> StorageResult<Self> {
        if config.bucket_name.is_empty() {
            return Err(StorageError::config_error("bucketName must not be empty"));
        }
        if !config.verify {
            warn!(
                endpoint = %config.endpoint_url,
                "TLS verification cannot be disabled for object store clients; ignoring verify=false"
            );
        }

        let credentials = Credentials::new(
            &config.access_key,
            &config.secret_key,
            None,
            None,
            "recmux",
        );

        let sdk_config = Builder::new()
            .behavior_version(BehaviorVersion::latest())
            .endpoint_url(&config.endpoint_url)
            .region(Region::new(config.region))
            .credentials_provider(credentials)
            .force_path_style(true)
            .build();

        let limiter = BandwidthLimiter::new(transfer.network_mbit).map(Arc::new);

        Ok(Self {
            client: Client::from_conf(sdk_config),
            bucket: config.bucket_name,
            transfer,
            limiter,
        })
    }

    pub fn transfer_config(&self) -> &TransferConfig {
        &self.transfer
    }

    /// List every object under `prefix`, following continuation tokens.
    pub async fn list_objects(&self, prefix: &str) -> StorageResult<Vec<ObjectInfo>> {
        debug!("Listing objects with prefix: {}", prefix);

        let mut objects = Vec::new();
        let mut continuation_token: Option<String> = None;

        loop {
            let mut request = self
                .client
                .list_objects_v2()
                .bucket(&self.bucket)
                .prefix(prefix);

            if let Some(token) = continuation_token {
                request = request.continuation_token(token);
            }

            let response = request
                .send()
                .await
                .map_err(|e| StorageError::ListFailed(e.to_string()))?;

            if let Some(ref contents) = response.contents {
                for obj in contents {
                    objects.push(ObjectInfo {
                        key: obj.key.clone().unwrap_or_default(),
                        size: obj.size.unwrap_or(0).max(0) as u64,
                        last_modified: obj
                            .last_modified
                            .as_ref()
                            .and_then(|t| t.to_millis().ok())
                            .and_then(|ms| u64::try_from(ms).ok()),
                    });
                }
            }

            if response.is_truncated() == Some(true) {
                continuation_token = response.next_continuation_token;
            } else {
                break;
            }
        }

        Ok(objects)
    }

    /// Object metadata, or `None` if the key does not exist.
    pub async fn head(&self, key: &str) -> StorageResult<Option<ObjectInfo>> {
        match self
            .client
            .head_object()
            .bucket(&self.bucket)
            .key(key)
            .send()
            .await
        {
            Ok(output) => Ok(Some(ObjectInfo {
                key: key.to_string(),
                size: output.content_length().unwrap_or(0).max(0) as u64,
                last_modified: output
                    .last_modified()
                    .and_then(|t| t.to_millis().ok())
                    .and_then(|ms| u64::try_from(ms).ok()),
            })),
            Err(e) => match e.as_service_error() {
                Some(service) if service.is_not_found() => Ok(None),
                _ => Err(StorageError::AwsSdk(e.to_string())),
            },
        }
    }

    /// Stream an object to `path`, throttled and retried.
    ///
    /// A partially written file is removed before each retry and after the
    /// final failure. On success the file's mtime is set to the object's
    /// `Last-Modified`.
    pub async fn download_to_file(&self, key: &str, path: &Path) -> StorageResult<DownloadStats> {
        let wasted = AtomicU64::new(0);
        let retry = self.transfer.retry_config("download_object");

        let result = retry_async(&retry, || async {
            let written = AtomicU64::new(0);
            match self.download_attempt(key, path, &written).await {
                Ok(small_chunk_count) => Ok((written.load(Ordering::Relaxed), small_chunk_count)),
                Err(e) => {
                    wasted.fetch_add(written.load(Ordering::Relaxed), Ordering::Relaxed);
                    remove_partial(path).await;
                    Err(e)
                }
            }
        })
        .await;

        let ((bytes, small_chunk_count), retry_count) =
            result.into_result(|e, attempts| {
                error!(key = %key, attempts = attempts, error = %e, "Download retry limit exceeded");
                match e {
                    StorageError::NotFound(_) => e,
                    other => StorageError::download_failed(key, attempts, other.to_string()),
                }
            })?;

        Ok(DownloadStats {
            bytes,
            retry_count,
            wasted_bytes: wasted.load(Ordering::Relaxed),
            small_chunk_count,
        })
    }

    async fn download_attempt(
        &self,
        key: &str,
        path: &Path,
        written: &AtomicU64,
    ) -> StorageResult<u64> {
        let response = self
            .client
            .get_object()
            .bucket(&self.bucket)
            .key(key)
            .send()
            .await
            .map_err(|e| match e.as_service_error() {
                Some(service) if service.is_no_such_key() => StorageError::not_found(key),
                _ => StorageError::AwsSdk(e.to_string()),
            })?;

        let content_length = response.content_length().unwrap_or(0).max(0) as u64;
        let last_modified = response
            .last_modified()
            .and_then(|t| t.to_millis().ok())
            .and_then(|ms| u64::try_from(ms).ok());
        let read_timeout = self.transfer.read_timeout(content_length);

        let started = Instant::now();
        let small_chunk_count = match tokio::time::timeout(
            read_timeout,
            self.write_body(response.body, path, written),
        )
        .await
        {
            Ok(result) => result?,
            Err(_) => {
                return Err(StorageError::ReadTimeout {
                    key: key.to_string(),
                    elapsed_secs: started.elapsed().as_secs_f64(),
                    bytes: written.load(Ordering::Relaxed),
                })
            }
        };

        if let Some(ms) = last_modified {
            let file = std::fs::OpenOptions::new().write(true).open(path)?;
            file.set_modified(UNIX_EPOCH + Duration::from_millis(ms))?;
        }

        Ok(small_chunk_count)
    }

    /// Write `body` to `path` in pieces of at most `buf_size` bytes, each
    /// metered by the bandwidth limiter. Returns the number of small network
    /// chunks seen.
    async fn write_body(
        &self,
        mut body: ByteStream,
        path: &Path,
        written: &AtomicU64,
    ) -> StorageResult<u64> {
        let buf_size = self.transfer.buf_size.max(1);
        let file = tokio::fs::File::create(path).await?;
        let mut writer = BufWriter::with_capacity(buf_size, file);
        let mut small_chunk_count = 0u64;

        while let Some(chunk) = body
            .try_next()
            .await
            .map_err(|e| StorageError::AwsSdk(e.to_string()))?
        {
            if self.transfer.is_small_chunk(chunk.len()) {
                small_chunk_count += 1;
            }
            for piece in chunk.chunks(buf_size) {
                if let Some(limiter) = &self.limiter {
                    limiter.consume(piece.len()).await;
                }
                writer.write_all(piece).await?;
                written.fetch_add(piece.len() as u64, Ordering::Relaxed);
            }
        }
        writer.flush().await?;
        Ok(small_chunk_count)
    }

    /// Delete keys in batches of at most `batch_size` (capped at 1000).
    ///
    /// Absent keys are not an error. Each batch is retried independently.
    pub async fn delete_objects(&self, keys: &[String], batch_size: usize) -> StorageResult<usize> {
        if keys.is_empty() {
            return Ok(0);
        }

        let batch_size = batch_size.clamp(1, MAX_DELETE_BATCH);
        let retry = self.transfer.retry_config("delete_objects");

        for batch in keys.chunks(batch_size) {
            retry_async(&retry, || self.delete_batch(batch))
                .await
                .into_result(|e, attempts| {
                    error!(
                        batch_len = batch.len(),
                        attempts = attempts,
                        error = %e,
                        "Delete retry limit exceeded"
                    );
                    e
                })?;
        }

        info!("Deleted {} objects", keys.len());
        Ok(keys.len())
    }

    async fn delete_batch(&self, keys: &[String]) -> StorageResult<()> {
        let objects = keys
            .iter()
            .map(|k| {
                ObjectIdentifier::builder()
                    .key(k)
                    .build()
                    .map_err(|e| StorageError::delete_failed(e.to_string()))
            })
            .collect::<StorageResult<Vec<_>>>()?;

        let delete = Delete::builder()
            .set_objects(Some(objects))
            .quiet(true)
            .build()
            .map_err(|e| StorageError::delete_failed(e.to_string()))?;

        let response = self
            .client
            .delete_objects()
            .bucket(&self.bucket)
            .delete(delete)
            .send()
            .await
            .map_err(|e| StorageError::delete_failed(e.to_string()))?;

        if let Some(errors) = response.errors.as_ref().filter(|errs| !errs.is_empty()) {
            let first = &errors[0];
            return Err(StorageError::delete_failed(format!(
                "{} keys failed, first {}: {}",
                errors.len(),
                first.key().unwrap_or("?"),
                first.message().unwrap_or("unknown error")
            )));
        }

        Ok(())
    }

    /// Upload a local file.
    pub async fn upload_file(&self, path: &Path, key: &str) -> StorageResult<()> {
        let body = ByteStream::from_path(path)
            .await
            .map_err(|e| StorageError::upload_failed(e.to_string()))?;

        self.client
            .put_object()
            .bucket(&self.bucket)
            .key(key)
            .body(body)
            .send()
            .await
            .map_err(|e| StorageError::upload_failed(e.to_string()))?;

        debug!("Uploaded {} to {}", path.display(), key);
        Ok(())
    }

    /// Check connectivity by performing a head bucket operation.
    pub async fn check_connectivity(&self) -> StorageResult<()> {
        self.client
            .head_bucket()
            .bucket(&self.bucket)
            .send()
            .await
            .map_err(|e| StorageError::AwsSdk(format!("Object store connectivity check failed: {}", e)))?;
        Ok(())
    }
}

async fn remove_partial(path: &Path) {
    match tokio::fs::remove_file(path).await {
        Ok(()) => {}
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => warn!(path = %path.display(), error = %e, "Failed to remove partial download"),
    }
}
