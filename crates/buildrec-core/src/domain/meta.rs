//! Object metadata (identity, labels, annotations).

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::codec::{self, CodecError, NestedStyle, Timestamp};

/// Annotation holding the serialized reference to the source image.
pub const ANNOTATION_FROM: &str = "from";

/// Annotation naming the pod the build ran in.
pub const ANNOTATION_POD_NAME: &str = "openshift.io/build.pod-name";

pub const LABEL_GIT_REPO_NAME: &str = "git-repo-name";
pub const LABEL_GIT_BRANCH: &str = "git-branch";

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ObjectMeta {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub namespace: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub uid: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub creation_timestamp: Option<Timestamp>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub labels: Option<BTreeMap<String, String>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub annotations: Option<BTreeMap<String, String>>,

    /// Keys this model does not name (resourceVersion, selfLink, ...).
    #[serde(flatten)]
    pub extra: BTreeMap<String, Value>,
}

impl ObjectMeta {
    pub fn label(&self, key: &str) -> Option<&str> {
        self.labels.as_ref()?.get(key).map(String::as_str)
    }

    pub fn annotation(&self, key: &str) -> Option<&str> {
        self.annotations.as_ref()?.get(key).map(String::as_str)
    }

    pub fn set_annotation(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.annotations
            .get_or_insert_with(BTreeMap::new)
            .insert(key.into(), value.into());
    }

    /// Decode the `from` annotation, if present.
    pub fn source_image(&self) -> Result<Option<SourceImageRef>, CodecError> {
        self.annotation(ANNOTATION_FROM)
            .map(|raw| codec::decode_nested(raw).map_err(|e| e.in_field("metadata.annotations.from")))
            .transpose()
    }

    /// Write the `from` annotation in the cluster's compact layout.
    pub fn set_source_image(&mut self, source: &SourceImageRef) -> Result<(), CodecError> {
        let raw = codec::encode_nested(source, NestedStyle::Compact)?;
        self.set_annotation(ANNOTATION_FROM, raw);
        Ok(())
    }

    pub fn pod_name(&self) -> Option<&str> {
        self.annotation(ANNOTATION_POD_NAME)
    }
}

/// Payload of the `from` annotation: the image the build started from.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourceImageRef {
    pub kind: String,
    pub name: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub namespace: Option<String>,

    #[serde(flatten)]
    pub extra: BTreeMap<String, Value>,
}

impl SourceImageRef {
    pub fn docker_image(name: impl Into<String>) -> Self {
        Self {
            kind: "DockerImage".to_string(),
            name: name.into(),
            namespace: None,
            extra: BTreeMap::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn unknown_metadata_keys_are_kept() {
        let raw = json!({
            "name": "b-1",
            "resourceVersion": "42",
            "ownerReferences": [{"kind": "BuildConfig", "name": "bc"}]
        });
        let meta: ObjectMeta = serde_json::from_value(raw.clone()).unwrap();
        assert_eq!(meta.extra.len(), 2);
        assert_eq!(serde_json::to_value(&meta).unwrap(), raw);
    }

    #[test]
    fn source_image_annotation_round_trips_compactly() {
        let mut meta = ObjectMeta::default();
        meta.set_source_image(&SourceImageRef::docker_image("buildroot:latest")).unwrap();
        assert_eq!(
            meta.annotation(ANNOTATION_FROM),
            Some(r#"{"kind":"DockerImage","name":"buildroot:latest"}"#)
        );
        let decoded = meta.source_image().unwrap().unwrap();
        assert_eq!(decoded.name, "buildroot:latest");
    }

    #[test]
    fn missing_annotation_is_none_not_an_error() {
        assert!(ObjectMeta::default().source_image().unwrap().is_none());
    }

    #[test]
    fn broken_annotation_names_the_field() {
        let mut meta = ObjectMeta::default();
        meta.set_annotation(ANNOTATION_FROM, "{oops");
        let err = meta.source_image().unwrap_err();
        assert!(err.to_string().contains("metadata.annotations.from"));
    }
}
