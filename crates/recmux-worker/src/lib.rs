//! Recording reconciliation worker.
//!
//! This crate provides:
//! - The transcoder that turns a recording's segment bundles into one MP4
//! - Size guard and operator notifications
//! - Job executor with status tracking, retry and DLQ handling
//! - Graceful shutdown

pub mod config;
pub mod error;
pub mod executor;
pub mod logging;
pub mod metrics;
pub mod notifier;
pub mod size_guard;
pub mod transcoder;

pub use config::{NotifierConfig, WorkerConfig};
pub use error::{WorkerError, WorkerResult};
pub use executor::{JobExecutor, WorkerContext};
pub use logging::{init_tracing, JobLogger};
pub use notifier::{create_notifier, notify_best_effort, LogNotifier, Notifier, WebhookNotifier};
pub use size_guard::{SizeCheck, SizeEstimate};
pub use transcoder::{Stage, Transcoder, TranscoderSettings};
