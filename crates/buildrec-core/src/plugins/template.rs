//! Plugin templates: per-phase plugin lists loaded from the build JSON dir.

use std::fs;
use std::path::{Path, PathBuf};

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::PluginError;
use crate::codec::to_python_string_in_order;

pub const PREBUILD_PLUGINS: &str = "prebuild_plugins";
pub const BUILDSTEP_PLUGINS: &str = "buildstep_plugins";
pub const POSTBUILD_PLUGINS: &str = "postbuild_plugins";
pub const EXIT_PLUGINS: &str = "exit_plugins";

/// One plugin entry of a phase.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PluginConf {
    pub name: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub args: Option<Map<String, Value>>,

    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl PluginConf {
    pub fn new(name: impl Into<String>, args: Map<String, Value>) -> Self {
        Self {
            name: name.into(),
            args: Some(args),
            extra: Map::new(),
        }
    }

    pub fn arg(&self, key: &str) -> Option<&Value> {
        self.args.as_ref()?.get(key)
    }
}

/// Site customizations applied before rendering.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct CustomizeConf {
    pub disable_plugins: Vec<Value>,
    pub enable_plugins: Vec<Value>,
}

#[derive(Debug, Deserialize)]
struct DisablePlugin {
    plugin_type: String,
    plugin_name: String,
}

#[derive(Debug, Deserialize)]
struct EnablePlugin {
    plugin_type: String,
    plugin_name: String,
    plugin_args: Map<String, Value>,
}

/// Plugin lists keyed by phase, in template order.
#[derive(Debug, Clone, PartialEq)]
pub struct PluginsTemplate {
    phases: IndexMap<String, Vec<PluginConf>>,
    customize_conf: CustomizeConf,
}

impl PluginsTemplate {
    /// Load `<build_json_dir>/<template_path>` and, if given, the customize
    /// conf next to it. A customize conf that cannot be read counts as empty.
    pub fn load(
        build_json_dir: &Path,
        template_path: &str,
        customize_conf_path: Option<&str>,
    ) -> Result<Self, PluginError> {
        let path = build_json_dir.join(template_path);
        tracing::debug!(path = %path.display(), "loading template");
        let text = fs::read_to_string(&path).map_err(|source| PluginError::Io {
            path: path.clone(),
            source,
        })?;
        let phases = serde_json::from_str(&text).map_err(|source| PluginError::Json { path, source })?;

        let customize_conf = match customize_conf_path {
            Some(conf) => load_customize_conf(build_json_dir.join(conf))?,
            None => CustomizeConf::default(),
        };
        Ok(Self { phases, customize_conf })
    }

    pub fn from_phases(phases: IndexMap<String, Vec<PluginConf>>, customize_conf: CustomizeConf) -> Self {
        Self { phases, customize_conf }
    }

    pub fn customize_conf(&self) -> &CustomizeConf {
        &self.customize_conf
    }

    pub fn phase(&self, phase: &str) -> Option<&[PluginConf]> {
        self.phases.get(phase).map(Vec::as_slice)
    }

    fn phase_mut(&mut self, phase: &str) -> Result<&mut Vec<PluginConf>, PluginError> {
        self.phases
            .get_mut(phase)
            .ok_or_else(|| PluginError::MissingPhase(phase.to_string()))
    }

    /// Drop the first plugin called `name` from `phase`, if any.
    pub fn remove_plugin(&mut self, phase: &str, name: &str, reason: Option<&str>) -> Result<(), PluginError> {
        let plugins = self.phase_mut(phase)?;
        if let Some(at) = plugins.iter().position(|p| p.name == name) {
            plugins.remove(at);
            if let Some(reason) = reason {
                tracing::info!("Removing {phase}:{name}, {reason}");
            }
        }
        Ok(())
    }

    /// Override the args of every plugin called `name`, or append it.
    pub fn add_plugin(
        &mut self,
        phase: &str,
        name: &str,
        args: Map<String, Value>,
        reason: Option<&str>,
    ) -> Result<(), PluginError> {
        let plugins = self.phase_mut(phase)?;
        let mut modified = false;
        for plugin in plugins.iter_mut().filter(|p| p.name == name) {
            plugin.args = Some(args.clone());
            modified = true;
        }
        if !modified {
            if let Some(reason) = reason {
                let shown = Value::Object(args.clone());
                tracing::info!("{phase}:{name} with args {shown}, {reason}");
            }
            plugins.push(PluginConf::new(name, args));
        }
        Ok(())
    }

    pub fn get_plugin_conf(&self, phase: &str, name: &str) -> Result<&PluginConf, PluginError> {
        self.phases
            .get(phase)
            .ok_or_else(|| PluginError::MissingPhase(phase.to_string()))?
            .iter()
            .find(|p| p.name == name)
            .ok_or_else(|| PluginError::MissingPlugin(name.to_string()))
    }

    pub fn has_plugin_conf(&self, phase: &str, name: &str) -> bool {
        self.get_plugin_conf(phase, name).is_ok()
    }

    pub fn set_plugin_arg<T: Serialize + ?Sized>(
        &mut self,
        phase: &str,
        name: &str,
        key: &str,
        value: &T,
    ) -> Result<(), PluginError> {
        let value = serde_json::to_value(value)?;
        let plugin = self
            .phase_mut(phase)?
            .iter_mut()
            .find(|p| p.name == name)
            .ok_or_else(|| PluginError::MissingPlugin(name.to_string()))?;
        plugin.args.get_or_insert_with(Map::new).insert(key.to_string(), value);
        Ok(())
    }

    /// `set_plugin_arg` unless `value` is `None`; reports whether it set.
    pub fn set_plugin_arg_valid<T: Serialize>(
        &mut self,
        phase: &str,
        name: &str,
        key: &str,
        value: Option<T>,
    ) -> Result<bool, PluginError> {
        match value {
            Some(value) => {
                self.set_plugin_arg(phase, name, key, &value)?;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    /// Apply the customize conf: disable first, then enable.
    ///
    /// Malformed entries are skipped.
    pub fn apply_customizations(&mut self) {
        let conf = self.customize_conf.clone();

        if conf.disable_plugins.is_empty() {
            tracing::debug!("No site-user specified plugins to disable");
        }
        for entry in conf.disable_plugins {
            let applied = serde_json::from_value::<DisablePlugin>(entry).ok().and_then(|p| {
                self.remove_plugin(&p.plugin_type, &p.plugin_name, Some("disabled at user request"))
                    .ok()
            });
            if applied.is_none() {
                tracing::info!("Invalid custom configuration found for disable_plugins");
            }
        }

        if conf.enable_plugins.is_empty() {
            tracing::debug!("No site-user specified plugins to enable");
        }
        for entry in conf.enable_plugins {
            let applied = serde_json::from_value::<EnablePlugin>(entry).ok().and_then(|p| {
                self.add_plugin(
                    &p.plugin_type,
                    &p.plugin_name,
                    p.plugin_args,
                    Some("enabled at user request"),
                )
                .ok()
            });
            if applied.is_none() {
                tracing::info!("Invalid custom configuration found for enable_plugins");
            }
        }
    }

    /// Serialize in template order with Python separators.
    pub fn to_json(&self) -> Result<String, PluginError> {
        Ok(to_python_string_in_order(&self.phases)?)
    }
}

fn load_customize_conf(path: PathBuf) -> Result<CustomizeConf, PluginError> {
    tracing::info!(path = %path.display(), "loading customize conf");
    match fs::read_to_string(&path) {
        Ok(text) => serde_json::from_str(&text).map_err(|source| PluginError::Json { path, source }),
        Err(_) => {
            tracing::info!(path = %path.display(), "failed to find customize conf");
            Ok(CustomizeConf::default())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::fs;

    const TEMPLATE: &str = r#"{
        "prebuild_plugins": [
            {"name": "koji", "args": {"target": "placeholder"}},
            {"name": "bump_release"},
            {"name": "add_filesystem", "required": false}
        ],
        "exit_plugins": [{"name": "koji_tag_build"}]
    }"#;

    fn write_dir(customize: Option<&str>) -> tempfile::TempDir {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("worker_inner:6.json"), TEMPLATE).unwrap();
        if let Some(customize) = customize {
            fs::write(dir.path().join("customize.json"), customize).unwrap();
        }
        dir
    }

    fn load(dir: &tempfile::TempDir, customize: Option<&str>) -> PluginsTemplate {
        PluginsTemplate::load(dir.path(), "worker_inner:6.json", customize).unwrap()
    }

    fn args(value: Value) -> Map<String, Value> {
        match value {
            Value::Object(map) => map,
            _ => unreachable!(),
        }
    }

    #[test]
    fn missing_template_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = PluginsTemplate::load(dir.path(), "nope.json", None).unwrap_err();
        assert!(matches!(err, PluginError::Io { .. }));
        assert!(err.to_string().contains("nope.json"));
    }

    #[test]
    fn missing_customize_conf_is_empty() {
        let dir = write_dir(None);
        let pt = load(&dir, Some("customize.json"));
        assert_eq!(pt.customize_conf(), &CustomizeConf::default());
    }

    #[test]
    fn unknown_entry_keys_survive() {
        let dir = write_dir(None);
        let pt = load(&dir, None);
        let conf = pt.get_plugin_conf(PREBUILD_PLUGINS, "add_filesystem").unwrap();
        assert_eq!(conf.extra.get("required"), Some(&json!(false)));
        assert!(pt.to_json().unwrap().contains(r#""required": false"#));
    }

    #[test]
    fn to_json_keeps_template_order() {
        let dir = write_dir(None);
        let mut pt = load(&dir, None);
        pt.set_plugin_arg(PREBUILD_PLUGINS, "koji", "hub", "https://koji").unwrap();
        assert_eq!(
            pt.to_json().unwrap(),
            concat!(
                r#"{"prebuild_plugins": [{"name": "koji", "args": {"target": "placeholder", "hub": "https://koji"}}, "#,
                r#"{"name": "bump_release"}, {"name": "add_filesystem", "required": false}], "#,
                r#""exit_plugins": [{"name": "koji_tag_build"}]}"#
            )
        );
    }

    #[test]
    fn lookup_errors() {
        let dir = write_dir(None);
        let pt = load(&dir, None);
        assert!(pt.has_plugin_conf(PREBUILD_PLUGINS, "koji"));
        assert!(!pt.has_plugin_conf(PREBUILD_PLUGINS, "nope"));
        assert!(!pt.has_plugin_conf(POSTBUILD_PLUGINS, "koji"));
        assert!(matches!(
            pt.get_plugin_conf(POSTBUILD_PLUGINS, "koji"),
            Err(PluginError::MissingPhase(_))
        ));
        assert!(matches!(
            pt.get_plugin_conf(PREBUILD_PLUGINS, "nope"),
            Err(PluginError::MissingPlugin(_))
        ));
    }

    #[test]
    fn set_args() {
        let dir = write_dir(None);
        let mut pt = load(&dir, None);
        pt.set_plugin_arg(PREBUILD_PLUGINS, "bump_release", "append", &true).unwrap();
        assert_eq!(
            pt.get_plugin_conf(PREBUILD_PLUGINS, "bump_release").unwrap().arg("append"),
            Some(&json!(true))
        );

        assert!(!pt.set_plugin_arg_valid::<String>(PREBUILD_PLUGINS, "koji", "target", None).unwrap());
        assert!(pt.set_plugin_arg_valid(PREBUILD_PLUGINS, "koji", "target", Some("f30")).unwrap());
        assert_eq!(
            pt.get_plugin_conf(PREBUILD_PLUGINS, "koji").unwrap().arg("target"),
            Some(&json!("f30"))
        );

        let err = pt.set_plugin_arg(PREBUILD_PLUGINS, "nope", "x", &1).unwrap_err();
        assert_eq!(err.to_string(), r#"no such plugin in template: "nope""#);
    }

    #[test]
    fn add_overrides_or_appends() {
        let dir = write_dir(None);
        let mut pt = load(&dir, None);
        pt.add_plugin(PREBUILD_PLUGINS, "koji", args(json!({"target": "x"})), None).unwrap();
        pt.add_plugin(PREBUILD_PLUGINS, "new_one", args(json!({})), Some("because")).unwrap();

        let names: Vec<_> = pt.phase(PREBUILD_PLUGINS).unwrap().iter().map(|p| p.name.as_str()).collect();
        assert_eq!(names, ["koji", "bump_release", "add_filesystem", "new_one"]);
        assert_eq!(
            pt.get_plugin_conf(PREBUILD_PLUGINS, "koji").unwrap().arg("target"),
            Some(&json!("x"))
        );
    }

    #[test]
    fn customizations_disable_and_enable() {
        let customize = json!({
            "disable_plugins": [
                {"plugin_type": "prebuild_plugins", "plugin_name": "bump_release"},
                {"plugin_type": "prebuild_plugins"},
                {"plugin_type": "no_such_phase", "plugin_name": "koji"}
            ],
            "enable_plugins": [
                {"plugin_type": "exit_plugins", "plugin_name": "sendmail", "plugin_args": {"to": "me"}},
                {"plugin_type": "exit_plugins", "plugin_name": "broken"}
            ]
        })
        .to_string();
        let dir = write_dir(Some(&customize));
        let mut pt = load(&dir, Some("customize.json"));
        pt.apply_customizations();

        assert!(!pt.has_plugin_conf(PREBUILD_PLUGINS, "bump_release"));
        assert!(pt.has_plugin_conf(PREBUILD_PLUGINS, "koji"));
        assert_eq!(
            pt.get_plugin_conf(EXIT_PLUGINS, "sendmail").unwrap().arg("to"),
            Some(&json!("me"))
        );
        assert!(!pt.has_plugin_conf(EXIT_PLUGINS, "broken"));
    }
}
