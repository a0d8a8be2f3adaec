//! Terminal outcome of one transcode or clear invocation.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Serialized as `{"status": "SUCCESS", "message": "..."}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(tag = "status", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TranscodeResult {
    Success { message: String },
    Failure { message: String },
}

impl TranscodeResult {
    pub fn success(message: impl Into<String>) -> Self {
        TranscodeResult::Success {
            message: message.into(),
        }
    }

    pub fn failure(message: impl Into<String>) -> Self {
        TranscodeResult::Failure {
            message: message.into(),
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, TranscodeResult::Success { .. })
    }

    pub fn message(&self) -> &str {
        match self {
            TranscodeResult::Success { message } | TranscodeResult::Failure { message } => message,
        }
    }
}

impl fmt::Display for TranscodeResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let status = if self.is_success() { "SUCCESS" } else { "FAILURE" };
        write!(f, "{}: {}", status, self.message())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_wire_shape() {
        let json = serde_json::to_value(TranscodeResult::success("done")).unwrap();
        assert_eq!(json["status"], "SUCCESS");
        assert_eq!(json["message"], "done");

        let back: TranscodeResult =
            serde_json::from_str(r#"{"status":"FAILURE","message":"no segments"}"#).unwrap();
        assert!(!back.is_success());
        assert_eq!(back.message(), "no segments");
    }
}
