//! Redis-backed job plumbing for recording reconciliation.
//!
//! This crate provides:
//! - One Redis Stream per destination queue with retry, claim and DLQ
//! - A buffer of completion intents and the dispatcher that drains it
//! - The per-recording task status repository

pub mod dispatch;
pub mod error;
pub mod intake;
pub mod job;
pub mod queue;
pub mod status;

pub use dispatch::{admit, route, DispatchOutcome, Dispatcher, LOCAL_FS_NAME};
pub use error::{QueueError, QueueResult};
pub use intake::IntentBuffer;
pub use job::{QueueJob, RecordingJob};
pub use queue::{Delivery, JobQueue, QueueConfig, DEFAULT_QUEUE, IO_LFS_QUEUE, IO_NET_QUEUE};
pub use status::{InMemoryStatusStore, RedisStatusRepository, TaskStatusStore};
