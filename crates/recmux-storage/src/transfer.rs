//! Transfer tuning, bandwidth limiting and per-download statistics.

use std::num::NonZeroU32;
use std::time::Duration;

use governor::{DefaultDirectRateLimiter, Quota, RateLimiter};
use tracing::warn;

use crate::retry::RetryConfig;

/// Tuning for object-store downloads and deletes.
#[derive(Debug, Clone)]
pub struct TransferConfig {
    /// Bandwidth cap in megabits per second; `0` disables throttling.
    pub network_mbit: f64,
    /// Read buffer size in bytes.
    pub buf_size: usize,
    /// Retries after the first attempt.
    pub retry_limit: u32,
    pub min_read_timeout: Duration,
    /// Multiplier applied to the expected transfer time.
    pub read_timeout_threshold: f64,
    /// Chunks below `buf_size * small_chunk_ratio` count as small.
    pub small_chunk_ratio: f64,
    pub retry_base_delay: Duration,
}

impl Default for TransferConfig {
    fn default() -> Self {
        Self {
            network_mbit: 100.0,
            buf_size: 8192,
            retry_limit: 8,
            min_read_timeout: Duration::from_secs(10),
            read_timeout_threshold: 1.5,
            small_chunk_ratio: 0.9,
            retry_base_delay: Duration::from_millis(200),
        }
    }
}

impl TransferConfig {
    /// Bytes per second at the configured cap.
    pub fn bytes_per_sec(&self) -> f64 {
        self.network_mbit * 1024.0 * 1024.0 / 8.0
    }

    /// Time budget for one download attempt of `content_length` bytes.
    pub fn read_timeout(&self, content_length: u64) -> Duration {
        if self.network_mbit <= 0.0 {
            return self.min_read_timeout;
        }
        let expected = content_length as f64 / self.bytes_per_sec();
        let scaled = Duration::from_secs_f64(expected * self.read_timeout_threshold);
        scaled.max(self.min_read_timeout)
    }

    pub fn is_small_chunk(&self, len: usize) -> bool {
        (len as f64) < self.buf_size as f64 * self.small_chunk_ratio
    }

    pub fn retry_config(&self, operation: &str) -> RetryConfig {
        RetryConfig::new(operation)
            .with_max_retries(self.retry_limit)
            .with_base_delay(self.retry_base_delay)
    }
}

/// Shared token bucket metering downloaded bytes in KiB units.
pub struct BandwidthLimiter {
    limiter: DefaultDirectRateLimiter,
    burst_kib: u32,
}

impl BandwidthLimiter {
    /// `None` when `mbit` is too small to express (or disabled).
    pub fn new(mbit: f64) -> Option<Self> {
        let kib_per_sec = (mbit * 128.0).floor();
        if !kib_per_sec.is_finite() || kib_per_sec < 1.0 {
            return None;
        }
        let kib_per_sec = NonZeroU32::new(kib_per_sec.min(u32::MAX as f64) as u32)?;
        Some(Self {
            limiter: RateLimiter::direct(Quota::per_second(kib_per_sec)),
            burst_kib: kib_per_sec.get(),
        })
    }

    /// Wait until `bytes` may pass.
    pub async fn consume(&self, bytes: usize) {
        let mut remaining = u32::try_from(bytes.div_ceil(1024)).unwrap_or(u32::MAX);
        while remaining > 0 {
            let n = remaining.min(self.burst_kib);
            if let Some(cells) = NonZeroU32::new(n) {
                if let Err(e) = self.limiter.until_n_ready(cells).await {
                    warn!(error = %e, "Bandwidth limiter rejected chunk");
                    return;
                }
            }
            remaining -= n;
        }
    }
}

/// Outcome of one object download.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DownloadStats {
    pub bytes: u64,
    pub retry_count: u32,
    /// Bytes written by failed attempts and then discarded.
    pub wasted_bytes: u64,
    /// Small chunks observed by the successful attempt.
    pub small_chunk_count: u64,
}

/// Aggregate over every download of one copy call.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CopyStats {
    pub files: usize,
    pub bytes: u64,
    pub retry_count: u32,
    pub wasted_bytes: u64,
    pub small_chunk_count_max: u64,
    small_chunk_count_sum: u64,
}

impl CopyStats {
    pub fn record(&mut self, stats: &DownloadStats) {
        self.files += 1;
        self.bytes += stats.bytes;
        self.retry_count += stats.retry_count;
        self.wasted_bytes += stats.wasted_bytes;
        self.small_chunk_count_sum += stats.small_chunk_count;
        self.small_chunk_count_max = self.small_chunk_count_max.max(stats.small_chunk_count);
    }

    pub fn small_chunk_count_avg(&self) -> f64 {
        if self.files == 0 {
            0.0
        } else {
            self.small_chunk_count_sum as f64 / self.files as f64
        }
    }

    pub fn wasted_mb(&self) -> f64 {
        self.wasted_bytes as f64 / 1024.0 / 1024.0
    }
}
