//! Worker configuration.

use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use recmux_models::{COMPLETE_DIR_NAME, INCOMPLETE_DIR_NAME, STAGING_DIR_NAME};
use recmux_storage::{AccessorSettings, TransferConfig};

use crate::size_guard::SizeEstimate;

fn env_or<T: FromStr>(name: &str, default: T) -> T {
    std::env::var(name)
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or(default)
}

fn env_string(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|s| !s.is_empty())
}

/// Alerting endpoint settings.
#[derive(Debug, Clone, Default)]
pub struct NotifierConfig {
    pub endpoint: Option<String>,
    pub api_key: Option<String>,
    pub topic: String,
}

/// Worker configuration.
#[derive(Debug, Clone)]
pub struct WorkerConfig {
    /// Root holding `incomplete/`, `complete/` and the staging tree
    pub base_dir: PathBuf,
    /// Per-recording working directories live under here
    pub tmp_dir: PathBuf,
    /// Archive the raw bundles of every recording
    pub is_archive: bool,
    pub video_size_limit_gb: u64,
    pub size_estimate: SizeEstimate,
    /// YAML file declaring storage backends; local-only when unset
    pub backends_path: Option<PathBuf>,
    pub delete_batch_size: usize,
    pub transfer: TransferConfig,
    pub worker_name: String,
    /// Queues this worker consumes
    pub queues: Vec<String>,
    /// Maximum concurrent jobs
    pub max_concurrent_jobs: usize,
    /// Maximum concurrent downloads per job
    pub max_download_parallel: usize,
    pub remux_timeout: Option<Duration>,
    /// Deployment environment; `prod` enables the webhook notifier
    pub app_env: String,
    pub notifier: NotifierConfig,
    pub metrics_port: Option<u16>,
    /// How often the worker should scan for orphaned pending jobs
    pub claim_interval: Duration,
    /// Graceful shutdown timeout
    pub shutdown_timeout: Duration,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            base_dir: PathBuf::from("/data/recmux"),
            tmp_dir: PathBuf::from("/tmp/recmux"),
            is_archive: false,
            video_size_limit_gb: 20,
            size_estimate: SizeEstimate::Count,
            backends_path: None,
            delete_batch_size: 500,
            transfer: TransferConfig::default(),
            worker_name: "recmux-worker".to_string(),
            queues: vec![recmux_queue::DEFAULT_QUEUE.to_string()],
            max_concurrent_jobs: 1,
            max_download_parallel: 4,
            remux_timeout: None,
            app_env: "dev".to_string(),
            notifier: NotifierConfig {
                topic: "recmux".to_string(),
                ..Default::default()
            },
            metrics_port: None,
            claim_interval: Duration::from_secs(30),
            shutdown_timeout: Duration::from_secs(60),
        }
    }
}

impl WorkerConfig {
    /// Create config from environment variables.
    pub fn from_env() -> Self {
        let d = Self::default();
        let dt = &d.transfer;

        let transfer = TransferConfig {
            network_mbit: env_or("NETWORK_MBIT", dt.network_mbit),
            buf_size: env_or("NETWORK_BUF_SIZE", dt.buf_size),
            retry_limit: env_or("NETWORK_RETRY_LIMIT", dt.retry_limit),
            min_read_timeout: Duration::from_secs_f64(env_or(
                "MIN_READ_TIMEOUT_SEC",
                dt.min_read_timeout.as_secs_f64(),
            )),
            read_timeout_threshold: env_or("READ_TIMEOUT_THRESHOLD", dt.read_timeout_threshold),
            ..dt.clone()
        };

        let queues = env_string("WORKER_QUEUES")
            .map(|s| parse_queues(&s))
            .filter(|q| !q.is_empty())
            .unwrap_or(d.queues);

        Self {
            base_dir: env_string("RECMUX_BASE_DIR").map(PathBuf::from).unwrap_or(d.base_dir),
            tmp_dir: env_string("RECMUX_TMP_DIR").map(PathBuf::from).unwrap_or(d.tmp_dir),
            is_archive: env_string("RECMUX_IS_ARCHIVE")
                .map(|v| v.eq_ignore_ascii_case("true"))
                .unwrap_or(d.is_archive),
            video_size_limit_gb: env_or("RECMUX_VIDEO_SIZE_LIMIT_GB", d.video_size_limit_gb),
            size_estimate: env_or("RECMUX_SIZE_ESTIMATE", d.size_estimate),
            backends_path: env_string("RECMUX_BACKENDS_PATH").map(PathBuf::from),
            delete_batch_size: env_or("RECMUX_DELETE_BATCH_SIZE", d.delete_batch_size),
            transfer,
            worker_name: env_string("WORKER_NAME").unwrap_or(d.worker_name),
            queues,
            max_concurrent_jobs: env_or("WORKER_MAX_JOBS", d.max_concurrent_jobs).max(1),
            max_download_parallel: env_or("WORKER_MAX_DOWNLOAD_PARALLEL", d.max_download_parallel)
                .max(1),
            remux_timeout: env_string("REMUX_TIMEOUT_SECS")
                .and_then(|s| s.parse().ok())
                .map(Duration::from_secs),
            app_env: env_string("APP_ENV").unwrap_or(d.app_env),
            notifier: NotifierConfig {
                endpoint: env_string("NOTIFIER_ENDPOINT"),
                api_key: env_string("NOTIFIER_API_KEY"),
                topic: env_string("NOTIFIER_TOPIC").unwrap_or(d.notifier.topic),
            },
            metrics_port: env_string("METRICS_PORT").and_then(|s| s.parse().ok()),
            claim_interval: Duration::from_secs(env_or(
                "WORKER_CLAIM_INTERVAL_SECS",
                d.claim_interval.as_secs(),
            )),
            shutdown_timeout: Duration::from_secs(env_or(
                "WORKER_SHUTDOWN_TIMEOUT",
                d.shutdown_timeout.as_secs(),
            )),
        }
    }

    pub fn is_prod(&self) -> bool {
        self.app_env == "prod"
    }

    pub fn incomplete_dir(&self) -> PathBuf {
        self.base_dir.join(INCOMPLETE_DIR_NAME)
    }

    pub fn complete_dir(&self) -> PathBuf {
        self.base_dir.join(COMPLETE_DIR_NAME)
    }

    pub fn staging_dir(&self) -> PathBuf {
        self.base_dir.join(STAGING_DIR_NAME)
    }

    pub fn tmp_dir(&self) -> &Path {
        &self.tmp_dir
    }

    pub fn accessor_settings(&self) -> AccessorSettings {
        AccessorSettings {
            local_incomplete_dir: self.incomplete_dir(),
            transfer: self.transfer.clone(),
            delete_batch_size: self.delete_batch_size,
            download_parallelism: self.max_download_parallel,
        }
    }
}

/// Split a comma separated queue list.
pub fn parse_queues(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|q| !q.is_empty())
        .map(String::from)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_layout_dirs() {
        let config = WorkerConfig {
            base_dir: PathBuf::from("/srv/rec"),
            ..Default::default()
        };
        assert_eq!(config.incomplete_dir(), PathBuf::from("/srv/rec/incomplete"));
        assert_eq!(config.complete_dir(), PathBuf::from("/srv/rec/complete"));
        assert_eq!(config.staging_dir(), PathBuf::from("/srv/rec/_tmp"));
        assert_eq!(
            config.accessor_settings().local_incomplete_dir,
            PathBuf::from("/srv/rec/incomplete")
        );
    }

    #[test]
    fn test_parse_queues() {
        assert_eq!(parse_queues("io_lfs, io_net,,"), vec!["io_lfs", "io_net"]);
        assert!(parse_queues(" , ").is_empty());
    }
}
