//! Build status: what the cluster observed.

use std::collections::BTreeMap;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::phase::BuildPhase;
use super::spec::ObjectReference;
use crate::codec::Timestamp;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BuildStatus {
    pub phase: BuildPhase,

    /// Machine-readable reason. Not cross-checked against `phase`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start_timestamp: Option<Timestamp>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completion_timestamp: Option<Timestamp>,

    /// Elapsed time in nanoseconds.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration: Option<u64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output_docker_image_reference: Option<String>,

    /// Owning BuildConfig.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub config: Option<ObjectReference>,

    #[serde(flatten)]
    pub extra: BTreeMap<String, Value>,
}

impl BuildStatus {
    pub fn new(phase: BuildPhase) -> Self {
        Self {
            phase,
            reason: None,
            message: None,
            start_timestamp: None,
            completion_timestamp: None,
            duration: None,
            output_docker_image_reference: None,
            config: None,
            extra: BTreeMap::new(),
        }
    }

    /// Recorded duration.
    pub fn duration(&self) -> Option<Duration> {
        self.duration.map(Duration::from_nanos)
    }

    /// `completion - start`, when both are set and ordered.
    pub fn elapsed(&self) -> Option<Duration> {
        let start = self.start_timestamp.as_ref()?.at();
        let end = self.completion_timestamp.as_ref()?.at();
        (end - start).to_std().ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn duration_is_nanoseconds() {
        let status: BuildStatus = serde_json::from_value(json!({
            "phase": "Complete",
            "startTimestamp": "2019-10-11T15:23:50Z",
            "completionTimestamp": "2019-10-11T15:40:12Z",
            "duration": 982000000000u64
        }))
        .unwrap();
        assert_eq!(status.duration(), Some(Duration::from_secs(982)));
        assert_eq!(status.elapsed(), status.duration());
    }

    #[test]
    fn elapsed_is_none_when_out_of_order() {
        let status: BuildStatus = serde_json::from_value(json!({
            "phase": "Complete",
            "startTimestamp": "2019-10-11T15:40:12Z",
            "completionTimestamp": "2019-10-11T15:23:50Z"
        }))
        .unwrap();
        assert_eq!(status.elapsed(), None);
    }

    #[test]
    fn phase_and_reason_are_independent() {
        let raw = json!({"phase": "Complete", "reason": "GenericBuildFailed"});
        let status: BuildStatus = serde_json::from_value(raw.clone()).unwrap();
        assert_eq!(status.phase, BuildPhase::Complete);
        assert_eq!(status.reason.as_deref(), Some("GenericBuildFailed"));
        assert_eq!(serde_json::to_value(&status).unwrap(), raw);
    }
}
