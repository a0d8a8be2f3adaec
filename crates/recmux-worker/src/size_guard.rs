//! Pre-flight size estimate of a recording.
//!
//! Source identifiers are counted, not fetched: a bundle stands for
//! [`TAR_SIZE_MB`] and a loose segment for [`SEG_SIZE_MB`].

use std::str::FromStr;

use recmux_storage::base_name;

use crate::error::{WorkerError, WorkerResult};

/// Nominal size of one segment bundle.
pub const TAR_SIZE_MB: u64 = 18;
/// Nominal size of one loose segment.
pub const SEG_SIZE_MB: u64 = 2;

const MIB: u64 = 1024 * 1024;
const GIB: u64 = 1024 * MIB;

/// How the size of a recording is estimated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SizeEstimate {
    /// Every identifier is a bundle
    #[default]
    Count,
    /// Bundle or loose segment, by the shape of the identifier's stem
    Name,
    /// Sum of the backend's reported object sizes
    Actual,
}

impl FromStr for SizeEstimate {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "count" => Ok(SizeEstimate::Count),
            "name" => Ok(SizeEstimate::Name),
            "actual" => Ok(SizeEstimate::Actual),
            other => Err(format!("Unknown size estimate mode: {other}")),
        }
    }
}

/// Estimated size and whether it exceeds the limit.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SizeCheck {
    pub bytes: u64,
    /// Rounded to two decimals
    pub gb: f64,
    pub too_large: bool,
}

impl SizeCheck {
    /// Compare `bytes` to `limit_gb`; equal to the limit still fits.
    pub fn new(bytes: u64, limit_gb: u64) -> Self {
        let gb = (bytes as f64 / GIB as f64 * 100.0).round() / 100.0;
        Self {
            bytes,
            gb,
            too_large: bytes > limit_gb.saturating_mul(GIB),
        }
    }
}

/// Size with every identifier counted as a bundle.
pub fn estimate_by_count(paths: &[String]) -> u64 {
    paths.len() as u64 * TAR_SIZE_MB * MIB
}

/// Size from identifier stems: `a_b_c` is a bundle, `a_b` a loose segment.
pub fn estimate_by_name(paths: &[String]) -> WorkerResult<u64> {
    let mut mb = 0;
    for path in paths {
        let name = base_name(path);
        let stem = name.rsplit_once('.').map_or(name, |(stem, _)| stem);
        mb += match stem.split('_').count() {
            3 => TAR_SIZE_MB,
            2 => SEG_SIZE_MB,
            _ => {
                return Err(WorkerError::upstream_data(format!("Invalid tar name: {stem}")));
            }
        };
    }
    Ok(mb * MIB)
}
