//! Sidecar reports published next to a recording.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::segment::MismatchInfo;

/// Sequence numbers absent from an otherwise contiguous recording.
///
/// Written as `{video}.yaml`. An empty list is omitted, so a recording
/// with no gaps yields `{}`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct GapReport {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub missing_segments: Vec<i64>,
}

impl GapReport {
    pub fn new(missing_segments: Vec<i64>) -> Self {
        Self { missing_segments }
    }

    pub fn has_gaps(&self) -> bool {
        !self.missing_segments.is_empty()
    }

    pub fn to_yaml(&self) -> Result<String, serde_yaml::Error> {
        serde_yaml::to_string(self)
    }

    pub fn from_yaml(yaml: &str) -> Result<Self, serde_yaml::Error> {
        serde_yaml::from_str(yaml)
    }
}

/// Duplicates whose sizes disagreed, written as `{video}_mismatch.yaml`
/// (a bare YAML list).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(transparent)]
pub struct MismatchReport {
    pub mismatches: Vec<MismatchInfo>,
}

impl MismatchReport {
    pub fn new(mismatches: Vec<MismatchInfo>) -> Self {
        Self { mismatches }
    }

    pub fn is_empty(&self) -> bool {
        self.mismatches.is_empty()
    }

    pub fn to_yaml(&self) -> Result<String, serde_yaml::Error> {
        serde_yaml::to_string(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_gap_report_yaml() {
        let yaml = GapReport::new(vec![4, 7]).to_yaml().unwrap();
        assert!(yaml.contains("missingSegments"));
        assert_eq!(GapReport::from_yaml(&yaml).unwrap().missing_segments, vec![4, 7]);
    }

    #[test]
    fn test_empty_gap_report_omits_list() {
        let yaml = GapReport::default().to_yaml().unwrap();
        assert!(!yaml.contains("missingSegments"));
        assert!(!GapReport::from_yaml(&yaml).unwrap().has_gaps());
    }

    #[test]
    fn test_mismatch_report_yaml() {
        let report = MismatchReport::new(vec![MismatchInfo {
            seq: 2,
            path_a: "x/2.ts".into(),
            path_b: "y/2.ts".into(),
            size_a: 5,
            size_b: 6,
        }]);
        let yaml = report.to_yaml().unwrap();
        assert!(yaml.starts_with("- seq: 2"));
        assert!(yaml.contains("pathA"));
        assert!(yaml.contains("sizeB: 6"));
    }
}
