//! Plugin configuration rendering from user params.
//!
//! # Points
//! - one `PluginsConfiguration` per build kind, both behind the same trait
//! - `render` validates the params before it touches the template
//! - every `render_*` step is a no-op when its plugin is not in the template

use std::path::{Path, PathBuf};

use serde_json::{Map, Value, json};

use super::PluginError;
use super::template::{BUILDSTEP_PLUGINS, EXIT_PLUGINS, POSTBUILD_PLUGINS, PREBUILD_PLUGINS, PluginsTemplate};
use crate::params::user_params::is_truthy;
use crate::params::{ARRANGEMENT_VERSION, BuildType, BuildUserParams, SourceContainerUserParams, UserParams};

/// Params forwarded to worker builds by `orchestrate_build`.
const WORKER_PARAMS: &[&str] = &[
    "component",
    "git_branch",
    "git_ref",
    "git_uri",
    "koji_task_id",
    "filesystem_koji_task_id",
    "scratch",
    "koji_target",
    "user",
    "yum_repourls",
    "arrangement_version",
    "koji_parent_build",
    "isolated",
    "reactor_config_map",
    "reactor_config_override",
    "git_commit_depth",
];

/// Renders a plugin template for one kind of build.
///
/// # Example
/// ```ignore
/// let config = ImagePluginsConfiguration::load(&params, Path::new("/usr/share/osbs"))?;
/// let rendered = config.render()?;
/// ```
pub trait PluginsConfiguration {
    /// Template file name relative to the build JSON dir.
    fn template_path(&self) -> String;

    /// Validate the params, apply customizations and every plugin rule,
    /// then serialize.
    fn render(self) -> Result<String, PluginError>;
}

/// Validate `params` and render the matching configuration.
///
/// `build_json_dir` overrides the directory named in the params.
pub fn render_plugins(params: &UserParams, build_json_dir: Option<&Path>) -> Result<String, PluginError> {
    params.validate()?;
    let dir = match build_json_dir {
        Some(dir) => dir.to_path_buf(),
        None => params
            .common()
            .build_json_dir
            .as_deref()
            .map(PathBuf::from)
            .ok_or(PluginError::NoBuildJsonDir)?,
    };
    match params {
        UserParams::Image(image) => ImagePluginsConfiguration::load(image, &dir)?.render(),
        UserParams::SourceContainer(source) => SourcePluginsConfiguration::load(source, &dir)?.render(),
    }
}

fn arrangement(version: Option<u32>) -> u32 {
    version.unwrap_or(ARRANGEMENT_VERSION)
}

fn render_koji(pt: &mut PluginsTemplate, koji_target: Option<&str>) -> Result<(), PluginError> {
    if pt.has_plugin_conf(PREBUILD_PLUGINS, "koji") {
        pt.set_plugin_arg_valid(PREBUILD_PLUGINS, "koji", "target", koji_target)?;
    }
    Ok(())
}

fn render_koji_tag_build(pt: &mut PluginsTemplate, koji_target: Option<&str>) -> Result<(), PluginError> {
    if pt.has_plugin_conf(EXIT_PLUGINS, "koji_tag_build") {
        pt.set_plugin_arg_valid(EXIT_PLUGINS, "koji_tag_build", "target", koji_target)?;
    }
    Ok(())
}

fn non_empty(value: &Option<String>) -> Option<&str> {
    value.as_deref().filter(|s| !s.is_empty())
}

/// Plugin configuration of an image build.
pub struct ImagePluginsConfiguration<'a> {
    params: &'a BuildUserParams,
    pt: PluginsTemplate,
}

impl<'a> ImagePluginsConfiguration<'a> {
    pub fn new(params: &'a BuildUserParams, pt: PluginsTemplate) -> Self {
        Self { params, pt }
    }

    /// Load `<build_type>_inner:<arrangement_version>.json` from `build_json_dir`.
    pub fn load(params: &'a BuildUserParams, build_json_dir: &Path) -> Result<Self, PluginError> {
        let path = image_template_path(params);
        let pt = PluginsTemplate::load(build_json_dir, &path, params.customize_conf.as_deref())?;
        Ok(Self::new(params, pt))
    }

    fn render_add_filesystem(&mut self) -> Result<(), PluginError> {
        let (phase, plugin) = (PREBUILD_PLUGINS, "add_filesystem");
        if self.pt.has_plugin_conf(phase, plugin) {
            let p = self.params;
            self.pt.set_plugin_arg_valid(phase, plugin, "repos", p.yum_repourls.as_ref())?;
            self.pt
                .set_plugin_arg_valid(phase, plugin, "from_task_id", p.filesystem_koji_task_id)?;
            self.pt
                .set_plugin_arg_valid(phase, plugin, "architecture", p.common.platform.as_ref())?;
            self.pt
                .set_plugin_arg_valid(phase, plugin, "koji_target", p.common.koji_target.as_ref())?;
        }
        Ok(())
    }

    fn render_add_image_content_manifest(&mut self) -> Result<(), PluginError> {
        let (phase, plugin) = (PREBUILD_PLUGINS, "add_image_content_manifest");
        if self.pt.has_plugin_conf(phase, plugin) {
            self.pt
                .set_plugin_arg_valid(phase, plugin, "remote_sources", self.params.remote_sources.as_ref())?;
        }
        Ok(())
    }

    fn render_add_labels_in_dockerfile(&mut self) -> Result<(), PluginError> {
        let (phase, plugin) = (PREBUILD_PLUGINS, "add_labels_in_dockerfile");
        if self.pt.has_plugin_conf(phase, plugin) {
            if let Some(release) = non_empty(&self.params.release) {
                self.pt
                    .set_plugin_arg(phase, plugin, "labels", &json!({"release": release}))?;
            }
        }
        Ok(())
    }

    fn render_add_yum_repo_by_url(&mut self) -> Result<(), PluginError> {
        let (phase, plugin) = (PREBUILD_PLUGINS, "add_yum_repo_by_url");
        if self.pt.has_plugin_conf(phase, plugin) {
            self.pt
                .set_plugin_arg_valid(phase, plugin, "repourls", self.params.yum_repourls.as_ref())?;
        }
        Ok(())
    }

    fn render_bump_release(&mut self) -> Result<(), PluginError> {
        let (phase, plugin) = (PREBUILD_PLUGINS, "bump_release");
        // Flatpak NVRs need a unique `.<n>` suffix.
        if self.pt.has_plugin_conf(phase, plugin) && self.params.flatpak {
            self.pt.set_plugin_arg(phase, plugin, "append", &true)?;
        }
        Ok(())
    }

    fn render_check_and_set_platforms(&mut self) -> Result<(), PluginError> {
        let (phase, plugin) = (PREBUILD_PLUGINS, "check_and_set_platforms");
        if self.pt.has_plugin_conf(phase, plugin) {
            if let Some(target) = non_empty(&self.params.common.koji_target) {
                self.pt.set_plugin_arg(phase, plugin, "koji_target", target)?;
            }
        }
        Ok(())
    }

    fn render_check_user_settings(&mut self) -> Result<(), PluginError> {
        let (phase, plugin) = (PREBUILD_PLUGINS, "check_user_settings");
        if self.pt.has_plugin_conf(phase, plugin) {
            self.pt
                .set_plugin_arg_valid(phase, plugin, "flatpak", Some(self.params.flatpak))?;
        }
        Ok(())
    }

    fn render_flatpak_update_dockerfile(&mut self) -> Result<(), PluginError> {
        let (phase, plugin) = (PREBUILD_PLUGINS, "flatpak_update_dockerfile");
        if self.pt.has_plugin_conf(phase, plugin) {
            self.pt
                .set_plugin_arg_valid(phase, plugin, "compose_ids", self.params.compose_ids.as_ref())?;
        }
        Ok(())
    }

    fn render_import_image(&mut self) -> Result<(), PluginError> {
        let (phase, plugin) = (EXIT_PLUGINS, "import_image");
        if self.pt.has_plugin_conf(phase, plugin) {
            self.pt
                .set_plugin_arg(phase, plugin, "imagestream", &self.params.imagestream_name)?;
        }
        Ok(())
    }

    fn render_inject_parent_image(&mut self) -> Result<(), PluginError> {
        let (phase, plugin) = (PREBUILD_PLUGINS, "inject_parent_image");
        if self.pt.has_plugin_conf(phase, plugin) {
            self.pt.set_plugin_arg_valid(
                phase,
                plugin,
                "koji_parent_build",
                self.params.koji_parent_build.as_ref(),
            )?;
        }
        Ok(())
    }

    fn render_koji_upload(&mut self) -> Result<(), PluginError> {
        let (phase, plugin) = (POSTBUILD_PLUGINS, "koji_upload");
        if !self.pt.has_plugin_conf(phase, plugin) {
            return Ok(());
        }
        self.pt
            .set_plugin_arg(phase, plugin, "koji_upload_dir", &self.params.koji_upload_dir)?;
        self.pt
            .set_plugin_arg(phase, plugin, "platform", &self.params.common.platform)?;
        self.pt.set_plugin_arg(phase, plugin, "report_multiple_digests", &true)
    }

    fn render_pin_operator_digest(&mut self) -> Result<(), PluginError> {
        let (phase, plugin) = (PREBUILD_PLUGINS, "pin_operator_digest");
        if !self.pt.has_plugin_conf(phase, plugin) {
            return Ok(());
        }
        if let Some(pullspecs) = self
            .params
            .operator_bundle_replacement_pullspecs
            .as_ref()
            .filter(|m| !m.is_empty())
        {
            self.pt
                .set_plugin_arg(phase, plugin, "replacement_pullspecs", pullspecs)?;
        }
        if let Some(url) = non_empty(&self.params.operator_csv_modifications_url) {
            self.pt
                .set_plugin_arg(phase, plugin, "operator_csv_modifications_url", url)?;
        }
        Ok(())
    }

    fn render_export_operator_manifests(&mut self) -> Result<(), PluginError> {
        let (phase, plugin) = (POSTBUILD_PLUGINS, "export_operator_manifests");
        if !self.pt.has_plugin_conf(phase, plugin) {
            return Ok(());
        }
        self.pt
            .set_plugin_arg(phase, plugin, "platform", &self.params.common.platform)?;
        if let Some(platform) = non_empty(&self.params.operator_manifests_extract_platform) {
            self.pt
                .set_plugin_arg(phase, plugin, "operator_manifests_extract_platform", platform)?;
        }
        Ok(())
    }

    fn render_orchestrate_build(&mut self) -> Result<(), PluginError> {
        let (phase, plugin) = (BUILDSTEP_PLUGINS, "orchestrate_build");
        if !self.pt.has_plugin_conf(phase, plugin) {
            return Ok(());
        }

        let mut build_kwargs = Map::new();
        if let Value::Object(all) = serde_json::to_value(self.params)? {
            for key in WORKER_PARAMS {
                if let Some(value) = all.get(*key).filter(|v| is_truthy(v)) {
                    build_kwargs.insert(key.to_string(), value.clone());
                }
            }
        }
        // Workers take the koji target as `target`.
        let target = build_kwargs.remove("koji_target").unwrap_or(Value::Null);
        build_kwargs.insert("target".to_string(), target);
        if self.params.flatpak {
            build_kwargs.insert("flatpak".to_string(), Value::Bool(true));
        }

        self.pt
            .set_plugin_arg_valid(phase, plugin, "platforms", self.params.platforms.as_ref())?;
        self.pt.set_plugin_arg(phase, plugin, "build_kwargs", &build_kwargs)?;

        let mut config_kwargs = Map::new();
        if !self.params.common.buildroot_is_imagestream {
            if let Some(image) = &self.params.common.build_image {
                config_kwargs.insert("build_from".to_string(), Value::String(format!("image:{image}")));
            }
        }
        self.pt.set_plugin_arg(phase, plugin, "config_kwargs", &config_kwargs)
    }

    fn render_pull_base_image(&mut self) -> Result<(), PluginError> {
        if let Some(digests) = self.params.parent_images_digests.as_ref().filter(|v| is_truthy(v)) {
            self.pt
                .set_plugin_arg(PREBUILD_PLUGINS, "pull_base_image", "parent_images_digests", digests)?;
        }
        Ok(())
    }

    fn render_resolve_composes(&mut self) -> Result<(), PluginError> {
        let (phase, plugin) = (PREBUILD_PLUGINS, "resolve_composes");
        if !self.pt.has_plugin_conf(phase, plugin) {
            return Ok(());
        }
        let p = self.params;
        self.pt
            .set_plugin_arg_valid(phase, plugin, "compose_ids", p.compose_ids.as_ref())?;
        self.pt
            .set_plugin_arg_valid(phase, plugin, "signing_intent", p.common.signing_intent.as_ref())?;
        self.pt
            .set_plugin_arg_valid(phase, plugin, "koji_target", p.common.koji_target.as_ref())?;
        self.pt
            .set_plugin_arg_valid(phase, plugin, "repourls", p.yum_repourls.as_ref())?;
        Ok(())
    }

    fn render_tag_from_config(&mut self) -> Result<(), PluginError> {
        let (phase, plugin) = (POSTBUILD_PLUGINS, "tag_from_config");
        if !self.pt.has_plugin_conf(phase, plugin) {
            return Ok(());
        }
        let p = self.params;
        let image_tag = p.common.image_tag.as_deref().unwrap_or_default();
        let unique = image_tag.rsplit(':').next().unwrap_or(image_tag);

        let mut primary: Vec<String> = Vec::new();
        let mut floating: Vec<String> = Vec::new();
        if p.build_type == Some(BuildType::Orchestrator) && p.common.scratch != Some(true) {
            primary.push("{version}-{release}".into());
            if p.isolated != Some(true) {
                if p.tags_from_yaml != Some(true) {
                    floating.extend(["latest".to_string(), "{version}".to_string()]);
                }
                floating.extend(p.additional_tags.iter().flatten().cloned());
            }
        }

        let suffixes = json!({"unique": [unique], "primary": primary, "floating": floating});
        self.pt.set_plugin_arg(phase, plugin, "tag_suffixes", &suffixes)
    }

    fn render_koji_delegate(&mut self) -> Result<(), PluginError> {
        let (phase, plugin) = (PREBUILD_PLUGINS, "koji_delegate");
        if self.pt.has_plugin_conf(phase, plugin) {
            if let Some(task) = self.params.triggered_after_koji_task.filter(|t| *t != 0) {
                self.pt
                    .set_plugin_arg(phase, plugin, "triggered_after_koji_task", &task)?;
            }
        }
        Ok(())
    }

    fn render_download_remote_source(&mut self) -> Result<(), PluginError> {
        let (phase, plugin) = (PREBUILD_PLUGINS, "download_remote_source");
        if self.pt.has_plugin_conf(phase, plugin) {
            self.pt
                .set_plugin_arg(phase, plugin, "remote_sources", &self.params.remote_sources)?;
        }
        Ok(())
    }

    fn render_resolve_remote_source(&mut self) -> Result<(), PluginError> {
        let (phase, plugin) = (PREBUILD_PLUGINS, "resolve_remote_source");
        if self.pt.has_plugin_conf(phase, plugin) {
            self.pt.set_plugin_arg_valid(
                phase,
                plugin,
                "dependency_replacements",
                self.params.dependency_replacements.as_ref(),
            )?;
        }
        Ok(())
    }
}

fn image_template_path(params: &BuildUserParams) -> String {
    let build_type = params.build_type.map_or("unknown", |t| t.as_str());
    format!(
        "{build_type}_inner:{}.json",
        arrangement(params.common.arrangement_version)
    )
}

impl PluginsConfiguration for ImagePluginsConfiguration<'_> {
    fn template_path(&self) -> String {
        image_template_path(self.params)
    }

    fn render(mut self) -> Result<String, PluginError> {
        self.params.validate()?;
        self.pt.apply_customizations();

        self.render_add_filesystem()?;
        self.render_add_labels_in_dockerfile()?;
        self.render_add_yum_repo_by_url()?;
        self.render_bump_release()?;
        self.render_check_and_set_platforms()?;
        self.render_check_user_settings()?;
        self.render_flatpak_update_dockerfile()?;
        self.render_import_image()?;
        self.render_inject_parent_image()?;
        render_koji(&mut self.pt, self.params.common.koji_target.as_deref())?;
        render_koji_tag_build(&mut self.pt, self.params.common.koji_target.as_deref())?;
        self.render_koji_upload()?;
        self.render_pin_operator_digest()?;
        self.render_export_operator_manifests()?;
        self.render_orchestrate_build()?;
        self.render_pull_base_image()?;
        self.render_resolve_composes()?;
        self.render_tag_from_config()?;
        self.render_koji_delegate()?;
        self.render_download_remote_source()?;
        self.render_resolve_remote_source()?;
        self.render_add_image_content_manifest()?;
        self.pt.to_json()
    }
}

/// Plugin configuration of a source container build.
pub struct SourcePluginsConfiguration<'a> {
    params: &'a SourceContainerUserParams,
    pt: PluginsTemplate,
}

impl<'a> SourcePluginsConfiguration<'a> {
    pub fn new(params: &'a SourceContainerUserParams, pt: PluginsTemplate) -> Self {
        Self { params, pt }
    }

    /// Load `orchestrator_sources_inner:<arrangement_version>.json`.
    pub fn load(params: &'a SourceContainerUserParams, build_json_dir: &Path) -> Result<Self, PluginError> {
        let path = source_template_path(params);
        let pt = PluginsTemplate::load(build_json_dir, &path, None)?;
        Ok(Self::new(params, pt))
    }

    fn render_fetch_sources(&mut self) -> Result<(), PluginError> {
        let (phase, plugin) = (PREBUILD_PLUGINS, "fetch_sources");
        if !self.pt.has_plugin_conf(phase, plugin) {
            return Ok(());
        }
        let p = self.params;
        if let Some(nvr) = non_empty(&p.sources_for_koji_build_nvr) {
            self.pt.set_plugin_arg(phase, plugin, "koji_build_nvr", nvr)?;
        }
        if let Some(id) = p.sources_for_koji_build_id.filter(|id| *id != 0) {
            self.pt.set_plugin_arg(phase, plugin, "koji_build_id", &id)?;
        }
        if let Some(intent) = non_empty(&p.common.signing_intent) {
            self.pt.set_plugin_arg(phase, plugin, "signing_intent", intent)?;
        }
        Ok(())
    }

    fn render_tag_and_push(&mut self) -> Result<(), PluginError> {
        let (phase, plugin) = (POSTBUILD_PLUGINS, "tag_and_push");
        if self.pt.has_plugin_conf(phase, plugin) {
            if let Some(target) = non_empty(&self.params.common.koji_target) {
                self.pt.set_plugin_arg(phase, plugin, "koji_target", target)?;
            }
        }
        Ok(())
    }
}

fn source_template_path(params: &SourceContainerUserParams) -> String {
    format!(
        "orchestrator_sources_inner:{}.json",
        arrangement(params.common.arrangement_version)
    )
}

impl PluginsConfiguration for SourcePluginsConfiguration<'_> {
    fn template_path(&self) -> String {
        source_template_path(self.params)
    }

    fn render(mut self) -> Result<String, PluginError> {
        self.params.validate()?;
        self.pt.apply_customizations();

        self.render_fetch_sources()?;
        render_koji(&mut self.pt, self.params.common.koji_target.as_deref())?;
        render_koji_tag_build(&mut self.pt, self.params.common.koji_target.as_deref())?;
        self.render_tag_and_push()?;
        self.pt.to_json()
    }
}
