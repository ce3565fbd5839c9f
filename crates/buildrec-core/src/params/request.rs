//! Building typed params from a build request.

use std::collections::BTreeMap;

use rand::Rng;
use serde::Deserialize;
use serde_json::Value;

use super::image_tag::make_image_tag;
use super::naming::make_name_from_git;
use super::user_params::{BuildType, BuildUserParams, CommonParams, NodeSelector, SourceContainerUserParams};
use super::{ORCHESTRATOR_MAX_RUNTIME, ParamsError, WORKER_MAX_RUNTIME};
use crate::ports::Clock;

/// Cluster-side build configuration consulted while making params.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct BuildSettings {
    /// Used when the request has no `build_from`.
    pub build_from: Option<String>,
    /// Hours.
    pub orchestrator_deadline: Option<u32>,
    /// Hours.
    pub worker_deadline: Option<u32>,
    pub reactor_config_map: Option<String>,
    /// Used when the request leaves `scratch` unset.
    pub scratch: Option<bool>,
    pub auto_build_node_selector: NodeSelector,
    pub explicit_build_node_selector: NodeSelector,
    pub isolated_build_node_selector: NodeSelector,
    pub scratch_build_node_selector: NodeSelector,
    /// Per platform.
    pub platform_node_selectors: BTreeMap<String, NodeSelector>,
}

/// Request fields shared by every kind.
#[derive(Debug, Clone, Default)]
pub struct CommonRequest {
    pub arrangement_version: Option<u32>,
    pub build_from: Option<String>,
    pub build_json_dir: Option<String>,
    pub component: Option<String>,
    pub koji_target: Option<String>,
    pub koji_task_id: Option<u64>,
    pub platform: Option<String>,
    pub reactor_config_override: Option<Value>,
    pub scratch: Option<bool>,
    pub signing_intent: Option<String>,
    pub user: Option<String>,
}

#[derive(Debug, Clone, Default)]
pub struct ImageBuildRequest {
    pub common: CommonRequest,
    pub additional_tags: Vec<String>,
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
    pub include_koji_repo: bool,
    pub is_auto: Option<bool>,
    pub isolated: Option<bool>,
    pub koji_parent_build: Option<String>,
    pub koji_upload_dir: Option<String>,
    /// `name` label of the Dockerfile; becomes the imagestream name.
    pub name_label: Option<String>,
    pub operator_bundle_replacement_pullspecs: Option<BTreeMap<String, String>>,
    pub operator_csv_modifications_url: Option<String>,
    pub operator_manifests_extract_platform: Option<String>,
    pub parent_images_digests: Option<Value>,
    pub platforms: Option<Vec<String>>,
    pub release: Option<String>,
    pub remote_sources: Option<Vec<Value>>,
    pub skip_build: Option<bool>,
    pub tags_from_yaml: Option<bool>,
    pub triggered_after_koji_task: Option<u64>,
    pub yum_repourls: Option<Vec<String>>,
}

#[derive(Debug, Clone, Default)]
pub struct SourceBuildRequest {
    pub common: CommonRequest,
    pub sources_for_koji_build_nvr: Option<String>,
    pub sources_for_koji_build_id: Option<u64>,
}

impl CommonParams {
    /// Resolve the common part of a request against the build settings and
    /// stamp a fresh image tag.
    pub fn make<R: Rng + ?Sized>(
        request: CommonRequest,
        settings: &BuildSettings,
        clock: &dyn Clock,
        rng: &mut R,
    ) -> Result<Self, ParamsError> {
        let build_from = request
            .build_from
            .or_else(|| settings.build_from.clone())
            .ok_or_else(|| ParamsError::Invalid("build_from must be defined".into()))?;
        let Some((source_type, source_value)) = build_from.split_once(':') else {
            return Err(ParamsError::Invalid(
                r#"build_from must be "source_type:source_value""#.into(),
            ));
        };
        if !matches!(source_type, "image" | "imagestream") {
            return Err(ParamsError::Invalid(
                "first part in build_from, may be only image or imagestream".into(),
            ));
        }

        let build_image = source_value.to_string();
        let buildroot_is_imagestream = source_type == "imagestream";

        let defaults = CommonParams::default();
        let mut params = CommonParams {
            arrangement_version: request.arrangement_version.or(defaults.arrangement_version),
            build_image: Some(build_image),
            buildroot_is_imagestream,
            build_json_dir: request.build_json_dir,
            component: request.component,
            image_tag: None,
            koji_target: request.koji_target,
            koji_task_id: request.koji_task_id,
            platform: request.platform,
            orchestrator_deadline: Some(settings.orchestrator_deadline.unwrap_or(ORCHESTRATOR_MAX_RUNTIME)),
            reactor_config_map: settings.reactor_config_map.clone(),
            reactor_config_override: request.reactor_config_override,
            scratch: request.scratch.or(settings.scratch),
            signing_intent: request.signing_intent,
            user: request.user,
            worker_deadline: Some(settings.worker_deadline.unwrap_or(WORKER_MAX_RUNTIME)),
            build_from: Some(build_from),
        };
        params.image_tag = Some(make_image_tag(&params, clock.now(), rng));
        tracing::debug!(image_tag = ?params.image_tag, "user params made");
        Ok(params)
    }
}

impl BuildUserParams {
    /// Params for an image build.
    ///
    /// # Details
    /// - the build config name comes from the git repo and branch
    /// - `scratch`, `is_auto` and `isolated` exclude each other, as do
    ///   `signing_intent` and `compose_ids`
    /// - the image tag is stamped from `clock` with digits drawn from `rng`
    pub fn make<R: Rng + ?Sized>(
        request: ImageBuildRequest,
        settings: &BuildSettings,
        clock: &dyn Clock,
        rng: &mut R,
    ) -> Result<Self, ParamsError> {
        let git_uri = request
            .git_uri
            .ok_or_else(|| ParamsError::Invalid("git_uri must be provided".into()))?;
        // Flatpaks pick their base image up later.
        if request.base_image.is_none() && !request.flatpak {
            return Err(ParamsError::Invalid("base_image must be provided".into()));
        }
        let name_label = request
            .name_label
            .ok_or_else(|| ParamsError::Invalid("name_label must be provided".into()))?;
        if request.common.signing_intent.is_some()
            && request.compose_ids.as_ref().is_some_and(|ids| !ids.is_empty())
        {
            return Err(ParamsError::Invalid(
                "Please only define signing_intent -OR- compose_ids, not both".into(),
            ));
        }

        let platform_node_selector = request
            .common
            .platform
            .as_ref()
            .and_then(|platform| settings.platform_node_selectors.get(platform))
            .cloned()
            .unwrap_or_default();
        let name = make_name_from_git(&git_uri, request.git_branch.as_deref());
        let common = CommonParams::make(request.common, settings, clock, rng)?;

        let mut params = BuildUserParams {
            common,
            additional_tags: Some(request.additional_tags),
            build_type: request.build_type,
            compose_ids: Some(request.compose_ids.unwrap_or_default()),
            dependency_replacements: Some(request.dependency_replacements.unwrap_or_default()),
            filesystem_koji_task_id: request.filesystem_koji_task_id,
            flatpak: request.flatpak,
            git_branch: request.git_branch,
            git_commit_depth: request.git_commit_depth,
            git_uri: Some(git_uri),
            imagestream_name: Some(name_label),
            include_koji_repo: request.include_koji_repo,
            is_auto: request.is_auto,
            isolated: request.isolated,
            koji_parent_build: request.koji_parent_build,
            koji_upload_dir: request.koji_upload_dir,
            operator_bundle_replacement_pullspecs: request.operator_bundle_replacement_pullspecs,
            operator_csv_modifications_url: request.operator_csv_modifications_url,
            operator_manifests_extract_platform: request.operator_manifests_extract_platform,
            parent_images_digests: request.parent_images_digests,
            platforms: request.platforms,
            release: request.release,
            remote_sources: request.remote_sources,
            skip_build: request.skip_build,
            tags_from_yaml: request.tags_from_yaml,
            triggered_after_koji_task: request.triggered_after_koji_task,
            yum_repourls: Some(request.yum_repourls.unwrap_or_default()),
            auto_build_node_selector: Some(settings.auto_build_node_selector.clone()),
            explicit_build_node_selector: Some(settings.explicit_build_node_selector.clone()),
            isolated_build_node_selector: Some(settings.isolated_build_node_selector.clone()),
            platform_node_selector: Some(platform_node_selector),
            scratch_build_node_selector: Some(settings.scratch_build_node_selector.clone()),
            ..BuildUserParams::default()
        };
        if let Some(conf) = request.customize_conf {
            params.customize_conf = Some(conf);
        }
        if let Some(git_ref) = request.git_ref {
            params.git_ref = Some(git_ref);
        }
        if let Some(base_image) = request.base_image {
            params.set_base_image(base_image);
        }
        params.set_name(&name)?;

        let variations = [params.common.scratch, params.is_auto, params.isolated]
            .iter()
            .filter(|flag| **flag == Some(true))
            .count();
        if variations > 1 {
            return Err(ParamsError::Invalid(
                "Build variations are mutually exclusive. Must set either scratch, is_auto, isolated, or none.".into(),
            ));
        }
        Ok(params)
    }
}

impl SourceContainerUserParams {
    /// Params for a source container build; needs an NVR or a build ID.
    pub fn make<R: Rng + ?Sized>(
        request: SourceBuildRequest,
        settings: &BuildSettings,
        clock: &dyn Clock,
        rng: &mut R,
    ) -> Result<Self, ParamsError> {
        if request.sources_for_koji_build_nvr.is_none() && request.sources_for_koji_build_id.is_none() {
            return Err(ParamsError::Invalid(
                "At least one param from 'sources_for_koji_build_id' or 'sources_for_koji_build_nvr' must be specified".into(),
            ));
        }
        Ok(SourceContainerUserParams {
            common: CommonParams::make(request.common, settings, clock, rng)?,
            sources_for_koji_build_nvr: request.sources_for_koji_build_nvr,
            sources_for_koji_build_id: request.sources_for_koji_build_id,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::params::UserParams;
    use crate::ports::FixedClock;
    use chrono::{TimeZone, Utc};
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    fn clock() -> FixedClock {
        FixedClock(Utc.with_ymd_and_hms(2019, 10, 11, 15, 23, 44).unwrap())
    }

    fn common() -> CommonRequest {
        CommonRequest {
            build_from: Some("image:buildroot:latest".into()),
            build_json_dir: Some("/usr/share/osbs/".into()),
            component: Some("chromium".into()),
            platform: Some("x86_64".into()),
            user: Some("mlangsdo".into()),
            ..CommonRequest::default()
        }
    }

    fn image_request() -> ImageBuildRequest {
        ImageBuildRequest {
            common: common(),
            base_image: Some("fedora:30".into()),
            build_type: Some(BuildType::Worker),
            git_branch: Some("master".into()),
            git_uri: Some("https://src.fedoraproject.org/rpms/chromium.git".into()),
            name_label: Some("chromium".into()),
            ..ImageBuildRequest::default()
        }
    }

    fn make_image(request: ImageBuildRequest, settings: &BuildSettings) -> Result<BuildUserParams, ParamsError> {
        BuildUserParams::make(request, settings, &clock(), &mut StdRng::seed_from_u64(1))
    }

    #[test]
    fn image_params_from_request() {
        let mut settings = BuildSettings {
            reactor_config_map: Some("reactor-config-map".into()),
            ..BuildSettings::default()
        };
        settings
            .platform_node_selectors
            .insert("x86_64".into(), NodeSelector::from([("arch".into(), "amd64".into())]));

        let params = make_image(image_request(), &settings).unwrap();
        assert_eq!(params.name.as_deref(), Some("chromium-master-96e72"));
        assert_eq!(params.imagestream_name.as_deref(), Some("chromium"));
        assert_eq!(params.trigger_imagestreamtag.as_deref(), Some("fedora:30"));
        assert_eq!(params.common.build_image.as_deref(), Some("buildroot:latest"));
        assert!(!params.common.buildroot_is_imagestream);
        assert_eq!(params.common.orchestrator_deadline, Some(4));
        assert_eq!(params.common.worker_deadline, Some(3));
        assert_eq!(params.git_ref.as_deref(), Some("master"));
        assert_eq!(params.compose_ids, Some(vec![]));
        assert_eq!(
            params.platform_node_selector.as_ref().and_then(|s| s.get("arch")).map(String::as_str),
            Some("amd64")
        );
        let tag = params.common.image_tag.clone().unwrap();
        assert!(tag.starts_with("mlangsdo/chromium:none-"));
        assert!(tag.ends_with("-20191011152344-x86_64"));

        let user_params = UserParams::Image(params);
        assert!(user_params.validate().is_ok());
        let json = user_params.to_json().unwrap();
        assert!(json.contains(r#""reactor_config_map": "reactor-config-map""#));
        assert!(!json.contains("compose_ids"));
        assert!(!json.contains("node_selector"));
    }

    #[test]
    fn imagestream_buildroot() {
        let mut request = image_request();
        request.common.build_from = Some("imagestream:buildroot-stream:latest".into());
        let params = make_image(request, &BuildSettings::default()).unwrap();
        assert!(params.common.buildroot_is_imagestream);
        assert_eq!(params.common.build_image.as_deref(), Some("buildroot-stream:latest"));
    }

    #[test]
    fn settings_fill_build_from_and_deadlines() {
        let mut request = image_request();
        request.common.build_from = None;
        let settings = BuildSettings {
            build_from: Some("image:fallback:1".into()),
            orchestrator_deadline: Some(6),
            scratch: Some(true),
            ..BuildSettings::default()
        };
        let params = make_image(request, &settings).unwrap();
        assert_eq!(params.common.build_from.as_deref(), Some("image:fallback:1"));
        assert_eq!(params.common.orchestrator_deadline, Some(6));
        assert_eq!(params.common.scratch, Some(true));
    }

    #[rstest::rstest]
    #[case::no_build_from(None, "build_from must be defined")]
    #[case::no_prefix(Some("buildroot"), "source_type:source_value")]
    #[case::bad_prefix(Some("docker:buildroot"), "may be only image or imagestream")]
    fn build_from_rules(#[case] build_from: Option<&str>, #[case] message: &str) {
        let mut request = image_request();
        request.common.build_from = build_from.map(str::to_string);
        let err = make_image(request, &BuildSettings::default()).unwrap_err();
        assert!(err.to_string().contains(message), "{err}");
    }

    #[test]
    fn image_request_rules() {
        let mut request = image_request();
        request.base_image = None;
        assert!(make_image(request.clone(), &BuildSettings::default()).is_err());
        request.flatpak = true;
        assert!(make_image(request, &BuildSettings::default()).is_ok());

        let mut request = image_request();
        request.name_label = None;
        let err = make_image(request, &BuildSettings::default()).unwrap_err();
        assert!(err.to_string().contains("name_label"));

        let mut request = image_request();
        request.common.signing_intent = Some("release".into());
        request.compose_ids = Some(vec![1]);
        let err = make_image(request, &BuildSettings::default()).unwrap_err();
        assert!(err.to_string().contains("signing_intent -OR- compose_ids"));
    }

    #[test]
    fn build_variations_are_exclusive() {
        let mut request = image_request();
        request.common.scratch = Some(true);
        request.isolated = Some(true);
        let err = make_image(request, &BuildSettings::default()).unwrap_err();
        assert!(err.to_string().contains("mutually exclusive"));
    }

    #[test]
    fn source_container_params_need_a_build() {
        let request = SourceBuildRequest {
            common: common(),
            ..SourceBuildRequest::default()
        };
        let err = SourceContainerUserParams::make(
            request.clone(),
            &BuildSettings::default(),
            &clock(),
            &mut StdRng::seed_from_u64(1),
        )
        .unwrap_err();
        assert!(err.to_string().contains("sources_for_koji_build_nvr"));

        let request = SourceBuildRequest {
            sources_for_koji_build_id: Some(12345),
            ..request
        };
        let params =
            SourceContainerUserParams::make(request, &BuildSettings::default(), &clock(), &mut StdRng::seed_from_u64(1))
                .unwrap();
        assert_eq!(params.sources_for_koji_build_id, Some(12345));
        assert!(params.common.image_tag.is_some());
    }
}
