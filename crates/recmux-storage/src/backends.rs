//! Storage backend declarations and accessor construction.
//!
//! Backends are declared in a YAML file:
//!
//! ```yaml
//! configs:
//!   - name: local
//!     type: local
//!   - name: minio
//!     type: s3
//!     s3:
//!       endpointUrl: http://minio:9000
//!       accessKey: minio
//!       secretKey: minio123
//!       bucketName: recordings
//!       verify: false
//! ```

use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::accessor::SegmentAccessor;
use crate::client::{ObjectStoreClient, S3Config};
use crate::error::{StorageError, StorageResult};
use crate::local::LocalSegmentAccessor;
use crate::s3::S3SegmentAccessor;
use crate::transfer::TransferConfig;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendType {
    Local,
    S3,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BackendConfig {
    pub name: String,
    #[serde(rename = "type")]
    pub backend_type: BackendType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub s3: Option<S3Config>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BackendsFile {
    #[serde(default)]
    pub configs: Vec<BackendConfig>,
}

impl BackendsFile {
    pub fn from_yaml(yaml: &str) -> StorageResult<Self> {
        Ok(serde_yaml::from_str(yaml)?)
    }

    pub async fn load(path: &Path) -> StorageResult<Self> {
        let yaml = tokio::fs::read_to_string(path).await.map_err(|e| {
            StorageError::config_error(format!("Failed to read {}: {}", path.display(), e))
        })?;
        Self::from_yaml(&yaml)
    }

    /// A file declaring only the local backend.
    pub fn local_only() -> Self {
        Self {
            configs: vec![BackendConfig {
                name: "local".to_string(),
                backend_type: BackendType::Local,
                s3: None,
            }],
        }
    }

    pub fn find(&self, name: &str) -> Option<&BackendConfig> {
        self.configs.iter().find(|c| c.name == name)
    }
}

/// Settings shared by every accessor a worker creates.
#[derive(Debug, Clone)]
pub struct AccessorSettings {
    /// `{base}/incomplete` for the local backend.
    pub local_incomplete_dir: PathBuf,
    pub transfer: TransferConfig,
    pub delete_batch_size: usize,
    pub download_parallelism: usize,
}

/// Resolve an intent's `fsName` to a concrete accessor.
pub fn create_accessor(
    fs_name: &str,
    backends: &BackendsFile,
    settings: &AccessorSettings,
) -> StorageResult<Arc<dyn SegmentAccessor>> {
    let config = backends
        .find(fs_name)
        .ok_or_else(|| StorageError::UnknownBackend(fs_name.to_string()))?;

    match config.backend_type {
        BackendType::Local => Ok(Arc::new(LocalSegmentAccessor::new(
            &settings.local_incomplete_dir,
        ))),
        BackendType::S3 => {
            let s3 = config.s3.clone().ok_or_else(|| {
                StorageError::config_error(format!("Backend {} has type s3 but no s3 section", fs_name))
            })?;
            let client = ObjectStoreClient::new(s3, settings.transfer.clone())?;
            Ok(Arc::new(S3SegmentAccessor::new(
                client,
                settings.delete_batch_size,
                settings.download_parallelism,
            )))
        }
    }
}
