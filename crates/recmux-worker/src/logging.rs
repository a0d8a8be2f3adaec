//! Structured job logging utilities.
//!
//! Every line carries the recording's identity so one recording can be
//! followed across the stages of a transcode.

use recmux_models::RecordingKey;
use tracing::{error, info, warn, Span};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Install the global subscriber: JSON when `LOG_FORMAT=json`, colored
/// text otherwise. `RUST_LOG` overrides the default `recmux=info`.
pub fn init_tracing() {
    let use_json = std::env::var("LOG_FORMAT")
        .map(|v| v.eq_ignore_ascii_case("json"))
        .unwrap_or(false);

    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("recmux=info"));

    if use_json {
        tracing_subscriber::registry()
            .with(fmt::layer().json())
            .with(env_filter)
            .init();
    } else {
        tracing_subscriber::registry()
            .with(
                fmt::layer()
                    .with_ansi(true)
                    .with_target(true)
                    .with_thread_ids(false)
                    .with_file(false)
                    .with_line_number(false),
            )
            .with(env_filter)
            .init();
    }
}

/// Job logger for structured logging with consistent formatting.
#[derive(Debug, Clone)]
pub struct JobLogger {
    platform: String,
    channel_id: String,
    video_name: String,
    operation: String,
}

impl JobLogger {
    /// Create a new job logger for a recording and operation
    /// (`transcode`, `clear`).
    pub fn new(key: &RecordingKey, operation: &str) -> Self {
        Self {
            platform: key.platform_name().unwrap_or("-").to_string(),
            channel_id: key.channel_id.clone(),
            video_name: key.video_name.clone(),
            operation: operation.to_string(),
        }
    }

    pub fn log_start(&self, message: &str) {
        info!(
            platform = %self.platform,
            channel_id = %self.channel_id,
            video_name = %self.video_name,
            operation = %self.operation,
            "Job started: {}", message
        );
    }

    /// Log a finished stage with its duration.
    pub fn log_progress(&self, stage: &str, duration_secs: f64) {
        info!(
            platform = %self.platform,
            channel_id = %self.channel_id,
            video_name = %self.video_name,
            operation = %self.operation,
            stage = stage,
            duration_secs = duration_secs,
            "Job progress: {}", stage
        );
    }

    pub fn log_warning(&self, message: &str) {
        warn!(
            platform = %self.platform,
            channel_id = %self.channel_id,
            video_name = %self.video_name,
            operation = %self.operation,
            "Job warning: {}", message
        );
    }

    pub fn log_error(&self, message: &str, duration_secs: f64) {
        error!(
            platform = %self.platform,
            channel_id = %self.channel_id,
            video_name = %self.video_name,
            operation = %self.operation,
            duration_secs = duration_secs,
            "Job error: {}", message
        );
    }

    pub fn log_completion(&self, message: &str, duration_secs: f64) {
        info!(
            platform = %self.platform,
            channel_id = %self.channel_id,
            video_name = %self.video_name,
            operation = %self.operation,
            duration_secs = duration_secs,
            "Job completed: {}", message
        );
    }

    pub fn operation(&self) -> &str {
        &self.operation
    }

    /// Create a tracing span for this job.
    pub fn create_span(&self) -> Span {
        tracing::info_span!(
            "job",
            platform = %self.platform,
            channel_id = %self.channel_id,
            video_name = %self.video_name,
            operation = %self.operation
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use recmux_models::Platform;

    #[test]
    fn test_job_logger_fields() {
        let logger = JobLogger::new(&RecordingKey::new(Some(Platform::Twitch), "c1", "v1"), "transcode");
        assert_eq!(logger.platform, "twitch");
        assert_eq!(logger.operation(), "transcode");

        let bare = JobLogger::new(&RecordingKey::new(None, "c1", "v1"), "clear");
        assert_eq!(bare.platform, "-");
    }
}
