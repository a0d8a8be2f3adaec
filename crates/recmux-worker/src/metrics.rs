//! Prometheus metrics for the worker.

use std::net::SocketAddr;

use metrics::{counter, gauge, histogram};
use metrics_exporter_prometheus::PrometheusBuilder;

use crate::error::{WorkerError, WorkerResult};

/// Serve `/metrics` on `0.0.0.0:{port}`.
pub fn init_metrics(port: u16) -> WorkerResult<()> {
    PrometheusBuilder::new()
        .with_http_listener(SocketAddr::from(([0, 0, 0, 0], port)))
        .install()
        .map_err(|e| WorkerError::config_error(format!("Failed to install Prometheus exporter: {e}")))
}

/// Metric names as constants for consistency.
pub mod names {
    pub const TRANSCODES_TOTAL: &str = "recmux_transcodes_total";
    pub const TRANSCODE_DURATION_SECONDS: &str = "recmux_transcode_duration_seconds";
    pub const SEGMENT_MISMATCHES_TOTAL: &str = "recmux_segment_mismatches_total";
    pub const MISSING_SEGMENTS_TOTAL: &str = "recmux_missing_segments_total";
    pub const CLEARS_TOTAL: &str = "recmux_clears_total";

    pub const JOBS_COMPLETED_TOTAL: &str = "recmux_jobs_completed_total";
    pub const JOBS_FAILED_TOTAL: &str = "recmux_jobs_failed_total";
    pub const JOBS_DEAD_LETTERED_TOTAL: &str = "recmux_jobs_dead_lettered_total";
    pub const JOBS_SKIPPED_TOTAL: &str = "recmux_jobs_skipped_total";
    pub const JOBS_IN_FLIGHT: &str = "recmux_jobs_in_flight";
}

pub fn record_transcode(outcome: &str, duration_secs: f64) {
    let labels = [("outcome", outcome.to_string())];
    counter!(names::TRANSCODES_TOTAL, &labels).increment(1);
    histogram!(names::TRANSCODE_DURATION_SECONDS, &labels).record(duration_secs);
}

pub fn record_mismatches(count: usize) {
    counter!(names::SEGMENT_MISMATCHES_TOTAL).increment(count as u64);
}

pub fn record_missing_segments(count: usize) {
    counter!(names::MISSING_SEGMENTS_TOTAL).increment(count as u64);
}

pub fn record_clear() {
    counter!(names::CLEARS_TOTAL).increment(1);
}

pub fn record_job_completed(kind: &str) {
    let labels = [("type", kind.to_string())];
    counter!(names::JOBS_COMPLETED_TOTAL, &labels).increment(1);
}

pub fn record_job_failed(kind: &str) {
    let labels = [("type", kind.to_string())];
    counter!(names::JOBS_FAILED_TOTAL, &labels).increment(1);
}

pub fn record_job_dead_lettered(kind: &str) {
    let labels = [("type", kind.to_string())];
    counter!(names::JOBS_DEAD_LETTERED_TOTAL, &labels).increment(1);
}

pub fn record_job_skipped(kind: &str) {
    let labels = [("type", kind.to_string())];
    counter!(names::JOBS_SKIPPED_TOTAL, &labels).increment(1);
}

pub fn set_jobs_in_flight(count: usize) {
    gauge!(names::JOBS_IN_FLIGHT).set(count as f64);
}
