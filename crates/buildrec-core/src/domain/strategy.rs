//! Build strategy. Only the custom strategy is modelled in detail; the
//! docker/source variants are carried through untouched.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::spec::{LocalObjectReference, ObjectReference};

/// Env var carrying the serialized user params.
pub const ENV_USER_PARAMS: &str = "USER_PARAMS";

pub const STRATEGY_CUSTOM: &str = "Custom";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BuildStrategy {
    #[serde(rename = "type")]
    pub strategy_type: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub custom_strategy: Option<CustomBuildStrategy>,

    #[serde(flatten)]
    pub extra: BTreeMap<String, Value>,
}

impl BuildStrategy {
    pub fn custom(strategy: CustomBuildStrategy) -> Self {
        Self {
            strategy_type: STRATEGY_CUSTOM.to_string(),
            custom_strategy: Some(strategy),
            extra: BTreeMap::new(),
        }
    }
}

/// Build runs inside a builder image (`from`) with the given env and secrets.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CustomBuildStrategy {
    pub from: ObjectReference,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub env: Option<Vec<EnvVar>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expose_docker_socket: Option<bool>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub secrets: Option<Vec<SecretSpec>>,

    #[serde(flatten)]
    pub extra: BTreeMap<String, Value>,
}

impl CustomBuildStrategy {
    pub fn new(from: ObjectReference) -> Self {
        Self {
            from,
            env: None,
            expose_docker_socket: None,
            secrets: None,
            extra: BTreeMap::new(),
        }
    }

    /// Literal value of the first env var called `name`.
    pub fn env_value(&self, name: &str) -> Option<&str> {
        self.env
            .as_ref()?
            .iter()
            .find(|var| var.name == name)
            .and_then(|var| var.value.as_deref())
    }

    /// Set (or add) a literal env var, keeping the position of an existing one.
    pub fn set_env(&mut self, name: &str, value: impl Into<String>) {
        let env = self.env.get_or_insert_with(Vec::new);
        match env.iter_mut().find(|var| var.name == name) {
            Some(var) => {
                var.value = Some(value.into());
                var.value_from = None;
            }
            None => env.push(EnvVar::literal(name, value)),
        }
    }

    pub fn add_secret(&mut self, mount_path: impl Into<String>, secret_name: impl Into<String>) {
        self.secrets.get_or_insert_with(Vec::new).push(SecretSpec {
            mount_path: mount_path.into(),
            secret_source: LocalObjectReference::new(secret_name),
            extra: BTreeMap::new(),
        });
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EnvVar {
    pub name: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<String>,

    /// Reference form (configMapKeyRef, secretKeyRef, ...).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value_from: Option<Value>,

    #[serde(flatten)]
    pub extra: BTreeMap<String, Value>,
}

impl EnvVar {
    pub fn literal(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: Some(value.into()),
            value_from: None,
            extra: BTreeMap::new(),
        }
    }
}

/// A named secret mounted into the build at `mount_path`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SecretSpec {
    pub mount_path: String,
    pub secret_source: LocalObjectReference,

    #[serde(flatten)]
    pub extra: BTreeMap<String, Value>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn strategy() -> CustomBuildStrategy {
        serde_json::from_value(json!({
            "from": {"kind": "DockerImage", "name": "buildroot:latest"},
            "env": [
                {"name": "USER_PARAMS", "value": "{}"},
                {"name": "REACTOR_CONFIG", "valueFrom": {"configMapKeyRef": {"key": "config.yaml", "name": "rcm"}}}
            ],
            "exposeDockerSocket": true,
            "secrets": [{"mountPath": "/var/run/secrets/x", "secretSource": {"name": "x"}}]
        }))
        .unwrap()
    }

    #[test]
    fn env_value_only_sees_literal_values() {
        let s = strategy();
        assert_eq!(s.env_value(ENV_USER_PARAMS), Some("{}"));
        assert_eq!(s.env_value("REACTOR_CONFIG"), None);
        assert_eq!(s.env_value("MISSING"), None);
    }

    #[test]
    fn set_env_replaces_in_place() {
        let mut s = strategy();
        s.set_env(ENV_USER_PARAMS, r#"{"a": 1}"#);
        let env = s.env.as_ref().unwrap();
        assert_eq!(env.len(), 2);
        assert_eq!(env[0].name, ENV_USER_PARAMS);
        assert_eq!(s.env_value(ENV_USER_PARAMS), Some(r#"{"a": 1}"#));

        s.set_env("NEW", "v");
        assert_eq!(s.env.as_ref().unwrap().last().unwrap().name, "NEW");
    }

    #[test]
    fn secrets_keep_their_order() {
        let mut s = strategy();
        s.add_secret("/var/run/secrets/y", "y");
        let names: Vec<_> = s
            .secrets
            .as_ref()
            .unwrap()
            .iter()
            .map(|secret| secret.secret_source.name.as_str())
            .collect();
        assert_eq!(names, ["x", "y"]);
    }

    #[test]
    fn other_strategies_pass_through() {
        let raw = json!({"type": "Docker", "dockerStrategy": {"noCache": true}});
        let strategy: BuildStrategy = serde_json::from_value(raw.clone()).unwrap();
        assert!(strategy.custom_strategy.is_none());
        assert_eq!(serde_json::to_value(&strategy).unwrap(), raw);
    }
}
