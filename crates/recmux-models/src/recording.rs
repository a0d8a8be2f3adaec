//! Recording identity and the storage layout derived from it.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use thiserror::Error;

use crate::intent::IntentError;

/// Directory (or key prefix) holding segments still owned by recorders.
pub const INCOMPLETE_DIR_NAME: &str = "incomplete";

/// Directory holding published recordings.
pub const COMPLETE_DIR_NAME: &str = "complete";

/// Out-of-band staging tree, sibling of the complete tree.
pub const STAGING_DIR_NAME: &str = "_tmp";

/// Streaming platform a recording was captured from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum Platform {
    Chzzk,
    Soop,
    Twitch,
}

impl Platform {
    pub fn as_str(&self) -> &'static str {
        match self {
            Platform::Chzzk => "chzzk",
            Platform::Soop => "soop",
            Platform::Twitch => "twitch",
        }
    }
}

impl fmt::Display for Platform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for Platform {
    type Err = PlatformParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "chzzk" => Ok(Platform::Chzzk),
            "soop" => Ok(Platform::Soop),
            "twitch" => Ok(Platform::Twitch),
            _ => Err(PlatformParseError(s.to_string())),
        }
    }
}

#[derive(Debug, Error)]
#[error("Unknown platform: {0}")]
pub struct PlatformParseError(String);

/// Identifies one recording.
///
/// Every storage path used by the pipeline is derived from this key:
/// `incomplete/{platform}/{channel}/{video}/...` for sources and
/// `complete/{platform}/{channel}/{video}.mp4` for the result. The platform
/// level is omitted in single-platform deployments.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct RecordingKey {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub platform: Option<Platform>,
    pub channel_id: String,
    pub video_name: String,
}

impl RecordingKey {
    pub fn new(
        platform: Option<Platform>,
        channel_id: impl Into<String>,
        video_name: impl Into<String>,
    ) -> Self {
        Self {
            platform,
            channel_id: channel_id.into(),
            video_name: video_name.into(),
        }
    }

    /// Reject keys whose components would escape their directory.
    pub fn validate(&self) -> Result<(), IntentError> {
        validate_component("uid", &self.channel_id)?;
        validate_component("videoName", &self.video_name)?;
        Ok(())
    }

    /// Platform name, or `None` in single-platform deployments.
    pub fn platform_name(&self) -> Option<&'static str> {
        self.platform.map(|p| p.as_str())
    }

    /// `{platform}/{channel}` relative to a tree root.
    pub fn channel_rel_dir(&self) -> PathBuf {
        let mut path = PathBuf::new();
        if let Some(platform) = self.platform_name() {
            path.push(platform);
        }
        path.push(&self.channel_id);
        path
    }

    /// `{platform}/{channel}/{video}` relative to a tree root.
    pub fn video_rel_dir(&self) -> PathBuf {
        self.channel_rel_dir().join(&self.video_name)
    }

    /// `{base}/{platform}/{channel}/{video}`.
    pub fn video_dir_in(&self, base: &Path) -> PathBuf {
        base.join(self.video_rel_dir())
    }

    /// `{base}/{platform}/{channel}`.
    pub fn channel_dir_in(&self, base: &Path) -> PathBuf {
        base.join(self.channel_rel_dir())
    }

    /// `{base}/{platform}`, if the key carries a platform.
    pub fn platform_dir_in(&self, base: &Path) -> Option<PathBuf> {
        self.platform_name().map(|p| base.join(p))
    }

    /// Directories from the video level up to (excluding) `base`,
    /// deepest first.
    pub fn ancestor_dirs_in(&self, base: &Path) -> Vec<PathBuf> {
        let mut dirs = vec![self.video_dir_in(base), self.channel_dir_in(base)];
        if let Some(platform_dir) = self.platform_dir_in(base) {
            dirs.push(platform_dir);
        }
        dirs
    }

    /// Object-store prefix of the recording's source segments.
    ///
    /// Always ends with `/` so that `v1` never matches `v10`.
    pub fn incomplete_prefix(&self) -> String {
        let mut parts = vec![INCOMPLETE_DIR_NAME];
        if let Some(platform) = self.platform_name() {
            parts.push(platform);
        }
        parts.push(&self.channel_id);
        parts.push(&self.video_name);
        format!("{}/", parts.join("/"))
    }

    /// Key used by the task status repository: `{platform}:{uid}:{videoName}`.
    pub fn task_key(&self) -> String {
        format!(
            "{}:{}:{}",
            self.platform_name().unwrap_or("_"),
            self.channel_id,
            self.video_name
        )
    }
}

impl fmt::Display for RecordingKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "platform={}, channel_id={}, video_name={}",
            self.platform_name().unwrap_or("-"),
            self.channel_id,
            self.video_name
        )
    }
}

fn validate_component(field: &'static str, value: &str) -> Result<(), IntentError> {
    if value.is_empty() {
        return Err(IntentError::EmptyField(field));
    }
    if value == "." || value == ".." || value.contains('/') || value.contains('\\') {
        return Err(IntentError::InvalidPathComponent {
            field,
            value: value.to_string(),
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key() -> RecordingKey {
        RecordingKey::new(Some(Platform::Chzzk), "c1", "v1")
    }

    #[test]
    fn test_paths_with_platform() {
        let key = key();
        let base = Path::new("/data/complete");

        assert_eq!(key.video_dir_in(base), PathBuf::from("/data/complete/chzzk/c1/v1"));
        assert_eq!(key.channel_dir_in(base), PathBuf::from("/data/complete/chzzk/c1"));
        assert_eq!(key.incomplete_prefix(), "incomplete/chzzk/c1/v1/");
        assert_eq!(key.task_key(), "chzzk:c1:v1");
        assert_eq!(key.ancestor_dirs_in(base).len(), 3);
    }

    #[test]
    fn test_paths_without_platform() {
        let key = RecordingKey::new(None, "c1", "v1");
        let base = Path::new("/data");

        assert_eq!(key.video_dir_in(base), PathBuf::from("/data/c1/v1"));
        assert_eq!(key.platform_dir_in(base), None);
        assert_eq!(key.incomplete_prefix(), "incomplete/c1/v1/");
        assert_eq!(key.ancestor_dirs_in(base).len(), 2);
    }

    #[test]
    fn test_validate_rejects_traversal() {
        assert!(key().validate().is_ok());
        assert!(RecordingKey::new(None, "..", "v1").validate().is_err());
        assert!(RecordingKey::new(None, "c1", "a/b").validate().is_err());
        assert!(RecordingKey::new(None, "", "v1").validate().is_err());
    }

    #[test]
    fn test_platform_parse() {
        assert_eq!("CHZZK".parse::<Platform>().unwrap(), Platform::Chzzk);
        assert!("youtube".parse::<Platform>().is_err());
    }
}
