//! Build spec: the declarative intent of one build.
//!
//! Open-ended fields (`resources`, `postCommit`, trigger causes) stay
//! `serde_json::Value` so records from newer clusters still round-trip.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::strategy::BuildStrategy;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BuildSpec {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub service_account: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<BuildSource>,

    pub strategy: BuildStrategy,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output: Option<BuildOutput>,

    /// Resource requests; `{}` stays `{}`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resources: Option<Map<String, Value>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub post_commit: Option<Map<String, Value>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub node_selector: Option<BTreeMap<String, String>>,

    /// Per-build time budget in seconds.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completion_deadline_seconds: Option<u64>,

    /// `None`: key absent. `Some(None)`: explicit `null`.
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        with = "serde_with::rust::double_option"
    )]
    pub triggered_by: Option<Option<Vec<Value>>>,

    #[serde(flatten)]
    pub extra: BTreeMap<String, Value>,
}

impl BuildSpec {
    pub fn new(strategy: BuildStrategy) -> Self {
        Self {
            service_account: None,
            source: None,
            strategy,
            output: None,
            resources: None,
            post_commit: None,
            node_selector: None,
            completion_deadline_seconds: None,
            triggered_by: None,
            extra: BTreeMap::new(),
        }
    }

    /// Name of the image the build pushes to.
    pub fn output_image(&self) -> Option<&str> {
        self.output.as_ref()?.to.as_ref().map(|to| to.name.as_str())
    }

    pub fn git(&self) -> Option<&GitBuildSource> {
        self.source.as_ref()?.git.as_ref()
    }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BuildSource {
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub source_type: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub git: Option<GitBuildSource>,

    #[serde(flatten)]
    pub extra: BTreeMap<String, Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GitBuildSource {
    pub uri: String,

    #[serde(rename = "ref", default, skip_serializing_if = "Option::is_none")]
    pub git_ref: Option<String>,

    #[serde(flatten)]
    pub extra: BTreeMap<String, Value>,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BuildOutput {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub to: Option<ObjectReference>,

    /// Credentials used to push `to`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub push_secret: Option<LocalObjectReference>,

    #[serde(flatten)]
    pub extra: BTreeMap<String, Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ObjectReference {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,

    pub name: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub namespace: Option<String>,

    #[serde(flatten)]
    pub extra: BTreeMap<String, Value>,
}

impl ObjectReference {
    pub fn new(kind: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            kind: Some(kind.into()),
            name: name.into(),
            namespace: None,
            extra: BTreeMap::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LocalObjectReference {
    pub name: String,

    #[serde(flatten)]
    pub extra: BTreeMap<String, Value>,
}

impl LocalObjectReference {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            extra: BTreeMap::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn spec_json(extra: Value) -> Value {
        let mut base = json!({"strategy": {"type": "Custom"}});
        base.as_object_mut()
            .unwrap()
            .extend(extra.as_object().unwrap().clone());
        base
    }

    #[test]
    fn explicit_null_trigger_differs_from_absent() {
        let with_null: BuildSpec = serde_json::from_value(spec_json(json!({"triggeredBy": null}))).unwrap();
        let absent: BuildSpec = serde_json::from_value(spec_json(json!({}))).unwrap();

        assert_eq!(with_null.triggered_by, Some(None));
        assert_eq!(absent.triggered_by, None);

        let back = serde_json::to_value(&with_null).unwrap();
        assert!(back.get("triggeredBy").is_some_and(Value::is_null));
        let back = serde_json::to_value(&absent).unwrap();
        assert!(back.get("triggeredBy").is_none());
    }

    #[test]
    fn trigger_causes_are_kept() {
        let raw = spec_json(json!({"triggeredBy": [{"message": "Manually triggered"}]}));
        let spec: BuildSpec = serde_json::from_value(raw.clone()).unwrap();
        assert_eq!(spec.triggered_by.as_ref().unwrap().as_ref().unwrap().len(), 1);
        assert_eq!(serde_json::to_value(&spec).unwrap(), raw);
    }

    #[test]
    fn empty_objects_stay_empty_objects() {
        let raw = spec_json(json!({"nodeSelector": {}, "resources": {}, "postCommit": {}}));
        let spec: BuildSpec = serde_json::from_value(raw.clone()).unwrap();
        assert_eq!(spec.node_selector, Some(BTreeMap::new()));
        assert_eq!(serde_json::to_value(&spec).unwrap(), raw);
    }

    #[test]
    fn output_image_and_git_accessors() {
        let raw = spec_json(json!({
            "output": {"to": {"kind": "DockerImage", "name": "user/app:tag"}},
            "source": {"type": "Git", "git": {"uri": "https://example.com/app.git", "ref": "abc"}}
        }));
        let spec: BuildSpec = serde_json::from_value(raw).unwrap();
        assert_eq!(spec.output_image(), Some("user/app:tag"));
        assert_eq!(spec.git().unwrap().git_ref.as_deref(), Some("abc"));
    }
}
