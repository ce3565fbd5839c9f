//! Typed `USER_PARAMS` payloads.
//!
//! # Points
//! - `kind` picks the variant; a payload without one is an image build
//! - loading drops keys no variant names
//! - emission keeps truthy values only, so defaults never leak into the env

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::build_id::validate_build_id;
use super::{
    ARRANGEMENT_VERSION, DEFAULT_CUSTOMIZE_CONF, DEFAULT_GIT_REF, KIND_IMAGE_BUILDS, KIND_KEY,
    KIND_SOURCE_CONTAINER_BUILDS, ParamsError,
};
use crate::codec::{NestedStyle, encode_nested};

pub type NodeSelector = BTreeMap<String, String>;

/// Params shared by every kind.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CommonParams {
    pub arrangement_version: Option<u32>,
    /// Full buildroot reference including its source type prefix.
    pub build_from: Option<String>,
    pub build_image: Option<String>,
    pub buildroot_is_imagestream: bool,
    pub build_json_dir: Option<String>,
    pub component: Option<String>,
    pub image_tag: Option<String>,
    pub koji_target: Option<String>,
    pub koji_task_id: Option<u64>,
    pub platform: Option<String>,
    pub orchestrator_deadline: Option<u32>,
    pub reactor_config_map: Option<String>,
    pub reactor_config_override: Option<Value>,
    pub scratch: Option<bool>,
    pub signing_intent: Option<String>,
    pub user: Option<String>,
    pub worker_deadline: Option<u32>,
}

impl Default for CommonParams {
    fn default() -> Self {
        Self {
            arrangement_version: Some(ARRANGEMENT_VERSION),
            build_from: None,
            build_image: None,
            buildroot_is_imagestream: false,
            build_json_dir: None,
            component: None,
            image_tag: None,
            koji_target: None,
            koji_task_id: None,
            platform: None,
            orchestrator_deadline: None,
            reactor_config_map: None,
            reactor_config_override: None,
            scratch: None,
            signing_intent: None,
            user: None,
            worker_deadline: None,
        }
    }
}

impl CommonParams {
    fn missing(&self) -> Vec<&'static str> {
        let mut missing = Vec::new();
        if self.build_json_dir.is_none() {
            missing.push("build_json_dir");
        }
        if self.user.is_none() {
            missing.push("user");
        }
        missing
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BuildType {
    Orchestrator,
    Worker,
}

impl BuildType {
    pub fn as_str(&self) -> &'static str {
        match self {
            BuildType::Orchestrator => "orchestrator",
            BuildType::Worker => "worker",
        }
    }
}

impl fmt::Display for BuildType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Params of an image build (`build_user_params`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BuildUserParams {
    #[serde(flatten)]
    pub common: CommonParams,

    pub additional_tags: Option<Vec<String>>,
    pub base_image: Option<String>,
    pub build_type: Option<BuildType>,
    pub compose_ids: Option<Vec<u64>>,
    pub customize_conf: Option<String>,
    pub dependency_replacements: Option<Vec<String>>,
    pub filesystem_koji_task_id: Option<u64>,
    pub flatpak: bool,
    pub git_branch: Option<String>,
    pub git_commit_depth: Option<u32>,
    pub git_ref: Option<String>,
    pub git_uri: Option<String>,
    pub imagestream_name: Option<String>,
    pub include_koji_repo: bool,
    pub is_auto: Option<bool>,
    pub isolated: Option<bool>,
    pub koji_parent_build: Option<String>,
    pub koji_upload_dir: Option<String>,
    /// Build ID; see `validate_build_id`.
    pub name: Option<String>,
    pub operator_bundle_replacement_pullspecs: Option<BTreeMap<String, String>>,
    pub operator_csv_modifications_url: Option<String>,
    pub operator_manifests_extract_platform: Option<String>,
    pub parent_images_digests: Option<Value>,
    pub platforms: Option<Vec<String>>,
    pub release: Option<String>,
    pub remote_sources: Option<Vec<Value>>,
    pub skip_build: Option<bool>,
    pub tags_from_yaml: Option<bool>,
    pub trigger_imagestreamtag: Option<String>,
    pub triggered_after_koji_task: Option<u64>,
    pub yum_repourls: Option<Vec<String>>,

    // Read from build settings, never written back to USER_PARAMS.
    #[serde(skip_serializing)]
    pub auto_build_node_selector: Option<NodeSelector>,
    #[serde(skip_serializing)]
    pub explicit_build_node_selector: Option<NodeSelector>,
    #[serde(skip_serializing)]
    pub isolated_build_node_selector: Option<NodeSelector>,
    #[serde(skip_serializing)]
    pub platform_node_selector: Option<NodeSelector>,
    #[serde(skip_serializing)]
    pub scratch_build_node_selector: Option<NodeSelector>,
}

impl Default for BuildUserParams {
    fn default() -> Self {
        Self {
            common: CommonParams::default(),
            additional_tags: None,
            base_image: None,
            build_type: None,
            compose_ids: None,
            customize_conf: Some(DEFAULT_CUSTOMIZE_CONF.to_string()),
            dependency_replacements: None,
            filesystem_koji_task_id: None,
            flatpak: false,
            git_branch: None,
            git_commit_depth: None,
            git_ref: Some(DEFAULT_GIT_REF.to_string()),
            git_uri: None,
            imagestream_name: None,
            include_koji_repo: false,
            is_auto: None,
            isolated: None,
            koji_parent_build: None,
            koji_upload_dir: None,
            name: None,
            operator_bundle_replacement_pullspecs: None,
            operator_csv_modifications_url: None,
            operator_manifests_extract_platform: None,
            parent_images_digests: None,
            platforms: None,
            release: None,
            remote_sources: None,
            skip_build: None,
            tags_from_yaml: None,
            trigger_imagestreamtag: None,
            triggered_after_koji_task: None,
            yum_repourls: None,
            auto_build_node_selector: None,
            explicit_build_node_selector: None,
            isolated_build_node_selector: None,
            platform_node_selector: None,
            scratch_build_node_selector: None,
        }
    }
}

impl BuildUserParams {
    /// Set the parent image; rebuild triggers follow it.
    pub fn set_base_image(&mut self, base_image: impl Into<String>) {
        let base_image = base_image.into();
        self.trigger_imagestreamtag = Some(base_image.clone());
        self.base_image = Some(base_image);
    }

    /// Set the build ID, truncating and validating it.
    pub fn set_name(&mut self, name: &str) -> Result<(), ParamsError> {
        self.name = Some(validate_build_id(name)?);
        Ok(())
    }

    pub fn is_orchestrator(&self) -> bool {
        self.build_type == Some(BuildType::Orchestrator)
    }

    /// Fail with every missing required param listed.
    pub fn validate(&self) -> Result<(), ParamsError> {
        require_all(KIND_IMAGE_BUILDS, self.missing())
    }

    fn missing(&self) -> Vec<&'static str> {
        let mut missing = self.common.missing();
        if self.build_type.is_none() {
            missing.push("build_type");
        }
        if self.git_ref.is_none() {
            missing.push("git_ref");
        }
        if self.git_uri.is_none() {
            missing.push("git_uri");
        }
        missing
    }
}

/// Params of a source container build (`source_containers_user_params`).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SourceContainerUserParams {
    #[serde(flatten)]
    pub common: CommonParams,

    pub sources_for_koji_build_nvr: Option<String>,
    pub sources_for_koji_build_id: Option<u64>,
}

impl SourceContainerUserParams {
    pub fn validate(&self) -> Result<(), ParamsError> {
        require_all(KIND_SOURCE_CONTAINER_BUILDS, self.common.missing())
    }
}

/// A decoded `USER_PARAMS` payload.
#[derive(Debug, Clone, PartialEq)]
pub enum UserParams {
    Image(BuildUserParams),
    SourceContainer(SourceContainerUserParams),
}

impl UserParams {
    /// Load a payload; `kind` selects the variant and defaults to image
    /// builds. Unknown keys are dropped.
    pub fn from_json(raw: &str) -> Result<Self, ParamsError> {
        if raw.trim().is_empty() {
            return Ok(UserParams::Image(BuildUserParams::default()));
        }
        let value: Value = serde_json::from_str(raw).map_err(|err| {
            tracing::debug!("failed to convert {raw}");
            err
        })?;
        let Value::Object(mut object) = value else {
            return Err(ParamsError::NotAnObject);
        };

        let kind = match object.remove(KIND_KEY) {
            None => KIND_IMAGE_BUILDS.to_string(),
            Some(Value::String(kind)) => kind,
            Some(other) => return Err(ParamsError::UnknownKind(other.to_string())),
        };
        let object = Value::Object(object);
        match kind.as_str() {
            KIND_IMAGE_BUILDS => {
                let mut params: BuildUserParams = serde_json::from_value(object)?;
                if let Some(name) = params.name.take() {
                    params.set_name(&name)?;
                }
                Ok(UserParams::Image(params))
            }
            KIND_SOURCE_CONTAINER_BUILDS => Ok(UserParams::SourceContainer(serde_json::from_value(object)?)),
            _ => Err(ParamsError::UnknownKind(kind)),
        }
    }

    /// Serialize the way the build client does: truthy values only, `kind`
    /// added, sorted keys, Python separators.
    pub fn to_json(&self) -> Result<String, ParamsError> {
        let value = match self {
            UserParams::Image(params) => serde_json::to_value(params)?,
            UserParams::SourceContainer(params) => serde_json::to_value(params)?,
        };
        let mut object: Map<String, Value> = match value {
            Value::Object(object) => object.into_iter().filter(|(_, v)| is_truthy(v)).collect(),
            _ => return Err(ParamsError::NotAnObject),
        };
        object.insert(KIND_KEY.to_string(), Value::String(self.kind().to_string()));
        Ok(encode_nested(&Value::Object(object), NestedStyle::Python)?)
    }

    pub fn kind(&self) -> &'static str {
        match self {
            UserParams::Image(_) => KIND_IMAGE_BUILDS,
            UserParams::SourceContainer(_) => KIND_SOURCE_CONTAINER_BUILDS,
        }
    }

    pub fn common(&self) -> &CommonParams {
        match self {
            UserParams::Image(params) => &params.common,
            UserParams::SourceContainer(params) => &params.common,
        }
    }

    pub fn common_mut(&mut self) -> &mut CommonParams {
        match self {
            UserParams::Image(params) => &mut params.common,
            UserParams::SourceContainer(params) => &mut params.common,
        }
    }

    /// Fail with every missing required param listed.
    pub fn validate(&self) -> Result<(), ParamsError> {
        match self {
            UserParams::Image(params) => params.validate(),
            UserParams::SourceContainer(params) => params.validate(),
        }
    }
}

fn require_all(kind: &str, mut missing: Vec<&'static str>) -> Result<(), ParamsError> {
    tracing::info!(kind, "validating user params");
    if missing.is_empty() {
        return Ok(());
    }
    missing.sort_unstable();
    Err(ParamsError::Missing(missing))
}

/// Python truthiness of a JSON value.
pub(crate) fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().is_some_and(|f| f != 0.0),
        Value::String(s) => !s.is_empty(),
        Value::Array(items) => !items.is_empty(),
        Value::Object(map) => !map.is_empty(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;
    use serde_json::json;

    const FIXTURE_PARAMS: &str = r#"{"arrangement_version": 6, "base_image": "fedora:30", "build_from": "image:buildroot:latest", "build_image": "buildroot:latest", "build_json_dir": "/usr/share/osbs/", "build_type": "worker", "component": "chromium", "customize_conf": "worker_customize.json", "git_branch": "master", "git_ref": "3f8c2a1e9b7d4c6a5e0f1b2c3d4e5f6a7b8c9d0e", "git_uri": "https://src.fedoraproject.org/rpms/chromium.git", "image_tag": "mlangsdo/chromium:none-38385-20191011152344-x86_64", "imagestream_name": "chromium", "kind": "build_user_params", "name": "chromium-master-96e72", "platform": "x86_64", "reactor_config_map": "reactor-config-map", "scratch": true, "trigger_imagestreamtag": "fedora:30", "user": "mlangsdo", "worker_deadline": 3}"#;

    #[test]
    fn loads_image_build_params() {
        let params = UserParams::from_json(FIXTURE_PARAMS).unwrap();
        let UserParams::Image(image) = &params else {
            panic!("expected image build params");
        };
        assert_eq!(image.common.arrangement_version, Some(6));
        assert_eq!(image.common.scratch, Some(true));
        assert_eq!(image.build_type, Some(BuildType::Worker));
        assert_eq!(image.name.as_deref(), Some("chromium-master-96e72"));
        assert!(params.validate().is_ok());
    }

    #[test]
    fn emission_reproduces_client_layout() {
        let params = UserParams::from_json(FIXTURE_PARAMS).unwrap();
        assert_eq!(params.to_json().unwrap(), FIXTURE_PARAMS);
    }

    #[test]
    fn defaults_apply_when_keys_are_absent() {
        let params = UserParams::from_json(r#"{"user": "me"}"#).unwrap();
        let UserParams::Image(image) = params else {
            panic!("expected image build params");
        };
        assert_eq!(image.common.arrangement_version, Some(ARRANGEMENT_VERSION));
        assert_eq!(image.customize_conf.as_deref(), Some(DEFAULT_CUSTOMIZE_CONF));
        assert_eq!(image.git_ref.as_deref(), Some(DEFAULT_GIT_REF));
        assert!(!image.flatpak);
    }

    #[test]
    fn unknown_keys_are_dropped() {
        let params = UserParams::from_json(r#"{"user": "me", "deprecated_thing": 1}"#).unwrap();
        assert!(!params.to_json().unwrap().contains("deprecated_thing"));
    }

    #[test]
    fn falsy_values_are_not_emitted() {
        let mut image = BuildUserParams::default();
        image.common.user = Some("me".into());
        image.common.scratch = Some(false);
        image.compose_ids = Some(vec![]);
        image.release = Some(String::new());
        image.koji_parent_build = None;
        let json = UserParams::Image(image).to_json().unwrap();
        assert_eq!(
            json,
            r#"{"arrangement_version": 6, "customize_conf": "prod_customize.json", "git_ref": "master", "kind": "build_user_params", "user": "me"}"#
        );
    }

    #[test]
    fn node_selectors_load_but_are_never_emitted() {
        let params =
            UserParams::from_json(r#"{"user": "me", "platform_node_selector": {"arch": "amd64"}}"#).unwrap();
        let UserParams::Image(image) = &params else {
            panic!("expected image build params");
        };
        assert_eq!(
            image.platform_node_selector.as_ref().and_then(|s| s.get("arch")).map(String::as_str),
            Some("amd64")
        );
        assert!(!params.to_json().unwrap().contains("node_selector"));
    }

    #[test]
    fn source_container_kind() {
        let raw = json!({
            "kind": "source_containers_user_params",
            "user": "me",
            "build_json_dir": "/usr/share/osbs/",
            "sources_for_koji_build_nvr": "app-1.0-1"
        })
        .to_string();
        let params = UserParams::from_json(&raw).unwrap();
        assert_eq!(params.kind(), KIND_SOURCE_CONTAINER_BUILDS);
        assert!(params.validate().is_ok());
        assert!(params.to_json().unwrap().contains(r#""kind": "source_containers_user_params""#));
    }

    #[rstest]
    #[case(r#"{"kind": "nope"}"#)]
    #[case(r#"{"kind": 3}"#)]
    fn unknown_kind_is_an_error(#[case] raw: &str) {
        assert!(matches!(UserParams::from_json(raw), Err(ParamsError::UnknownKind(_))));
    }

    #[test]
    fn non_object_payload_is_rejected() {
        assert!(matches!(UserParams::from_json("[1, 2]"), Err(ParamsError::NotAnObject)));
    }

    #[test]
    fn empty_payload_is_default_image_params() {
        assert_eq!(
            UserParams::from_json("").unwrap(),
            UserParams::Image(BuildUserParams::default())
        );
    }

    #[test]
    fn validate_lists_every_missing_param() {
        let mut image = BuildUserParams::default();
        image.git_ref = None;
        let err = UserParams::Image(image).validate().unwrap_err();
        assert_eq!(
            err.to_string(),
            "Missing required params: 'build_json_dir', 'build_type', 'git_ref', 'git_uri', 'user'"
        );
    }

    #[test]
    fn invalid_name_is_rejected_on_load() {
        let err = UserParams::from_json(r#"{"name": "-bad-"}"#).unwrap_err();
        assert!(matches!(err, ParamsError::InvalidBuildId { .. }));
    }

    #[test]
    fn set_base_image_updates_trigger() {
        let mut image = BuildUserParams::default();
        image.set_base_image("fedora:31");
        assert_eq!(image.trigger_imagestreamtag.as_deref(), Some("fedora:31"));
    }
}
