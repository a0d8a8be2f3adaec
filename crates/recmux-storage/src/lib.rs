//! Segment storage for the recording reconciliation pipeline.
//!
//! This crate provides:
//! - The [`SegmentAccessor`] interface over a recording's source segments
//! - Local-directory and S3-compatible implementations
//! - Throttled, retried object downloads with transfer statistics
//! - Backend declarations loaded from YAML

pub mod accessor;
pub mod backends;
pub mod client;
pub mod error;
pub mod fs_utils;
pub mod local;
pub mod retry;
pub mod s3;
pub mod transfer;

pub use accessor::{base_name, BackendKind, SegmentAccessor};
pub use backends::{create_accessor, AccessorSettings, BackendConfig, BackendType, BackendsFile};
pub use client::{ObjectInfo, ObjectStoreClient, S3Config, MAX_DELETE_BATCH};
pub use error::{StorageError, StorageResult};
pub use local::LocalSegmentAccessor;
pub use retry::{retry_async, FailureTracker, RetryConfig, RetryResult};
pub use s3::S3SegmentAccessor;
pub use transfer::{BandwidthLimiter, CopyStats, DownloadStats, TransferConfig};
