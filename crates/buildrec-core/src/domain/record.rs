//! Build record: metadata + spec + status.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

use super::meta::{LABEL_GIT_BRANCH, LABEL_GIT_REPO_NAME, ObjectMeta};
use super::phase::BuildPhase;
use super::spec::BuildSpec;
use super::status::BuildStatus;
use super::strategy::ENV_USER_PARAMS;
use crate::codec::{NestedStyle, Timestamp};
use crate::params::{ParamsError, UserParams};

pub const API_VERSION: &str = "build.openshift.io/v1";
pub const KIND_BUILD: &str = "Build";

/// One build, as the cluster reports it.
///
/// Design:
/// - The record is a snapshot; field values are never cross-validated on decode.
/// - Phase changes go through `transition`, which freezes terminal records.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BuildRecord {
    pub api_version: String,
    pub kind: String,
    pub metadata: ObjectMeta,
    pub spec: BuildSpec,
    pub status: BuildStatus,

    #[serde(flatten)]
    pub extra: BTreeMap<String, Value>,

    /// JSON pointers of keys that were `null` on input and that the typed
    /// fields cannot express. Encoding writes them back.
    #[serde(skip)]
    pub(crate) dropped_nulls: BTreeSet<String>,
}

/// Store key of a record.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BuildKey {
    pub namespace: String,
    pub name: String,
}

impl fmt::Display for BuildKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.namespace, self.name)
    }
}

#[derive(Debug, Error, PartialEq)]
pub enum TransitionError {
    #[error("build {name} is {phase} and can no longer change")]
    Frozen { name: String, phase: BuildPhase },

    #[error("build {name} cannot move from {from} to {to}")]
    Invalid {
        name: String,
        from: BuildPhase,
        to: BuildPhase,
    },
}

impl BuildRecord {
    /// A freshly triggered build in phase `New`.
    pub fn new(
        name: impl Into<String>,
        namespace: impl Into<String>,
        spec: BuildSpec,
        created_at: DateTime<Utc>,
    ) -> Self {
        let metadata = ObjectMeta {
            name: Some(name.into()),
            namespace: Some(namespace.into()),
            creation_timestamp: Some(created_at.into()),
            ..ObjectMeta::default()
        };
        Self {
            api_version: API_VERSION.to_string(),
            kind: KIND_BUILD.to_string(),
            metadata,
            spec,
            status: BuildStatus::new(BuildPhase::New),
            extra: BTreeMap::new(),
            dropped_nulls: BTreeSet::new(),
        }
    }

    pub fn name(&self) -> Option<&str> {
        self.metadata.name.as_deref()
    }

    /// `namespace/name`; the namespace defaults to empty.
    pub fn key(&self) -> Option<BuildKey> {
        Some(BuildKey {
            namespace: self.metadata.namespace.clone().unwrap_or_default(),
            name: self.metadata.name.clone()?,
        })
    }

    pub fn phase(&self) -> &BuildPhase {
        &self.status.phase
    }

    pub fn is_finished(&self) -> bool {
        self.status.phase.is_terminal()
    }

    pub fn is_succeeded(&self) -> bool {
        self.status.phase == BuildPhase::Complete
    }

    pub fn is_failed(&self) -> bool {
        self.status.phase.is_failed()
    }

    pub fn is_running(&self) -> bool {
        self.status.phase == BuildPhase::Running
    }

    pub fn is_pending(&self) -> bool {
        matches!(self.status.phase, BuildPhase::New | BuildPhase::Pending)
    }

    pub fn repo_name(&self) -> Option<&str> {
        self.metadata.label(LABEL_GIT_REPO_NAME)
    }

    pub fn branch(&self) -> Option<&str> {
        self.metadata.label(LABEL_GIT_BRANCH)
    }

    /// Raw `USER_PARAMS` string of the custom strategy.
    pub fn user_params_raw(&self) -> Option<&str> {
        self.spec
            .strategy
            .custom_strategy
            .as_ref()?
            .env_value(ENV_USER_PARAMS)
    }

    /// Decode `USER_PARAMS` into typed params.
    pub fn user_params(&self) -> Result<Option<UserParams>, ParamsError> {
        self.user_params_raw().map(UserParams::from_json).transpose()
    }

    /// Write `USER_PARAMS` back in the build client's layout.
    ///
    /// Fails for non-custom strategies.
    pub fn set_user_params(&mut self, params: &UserParams) -> Result<(), ParamsError> {
        let raw = params.to_json()?;
        let strategy = self
            .spec
            .strategy
            .custom_strategy
            .as_mut()
            .ok_or(ParamsError::NotCustomStrategy)?;
        strategy.set_env(ENV_USER_PARAMS, raw);
        Ok(())
    }

    /// Image tag the build client chose (`user/component:tag`).
    pub fn image_tag(&self) -> Result<Option<String>, ParamsError> {
        Ok(self
            .user_params()?
            .and_then(|params| params.common().image_tag.clone()))
    }

    /// Move the record to `to`, stamping start/completion times.
    pub fn transition(&mut self, to: BuildPhase, at: DateTime<Utc>) -> Result<(), TransitionError> {
        let name = self.name().unwrap_or_default().to_string();
        let from = self.status.phase.clone();
        if from.is_terminal() {
            return Err(TransitionError::Frozen { name, phase: from });
        }
        if !from.can_transition_to(&to) {
            return Err(TransitionError::Invalid { name, from, to });
        }

        let at = Timestamp::from(at);
        if to == BuildPhase::Running && self.status.start_timestamp.is_none() {
            self.status.start_timestamp = Some(at.clone());
        }
        if to.is_terminal() {
            self.status.duration = self
                .status
                .start_timestamp
                .as_ref()
                .and_then(|start| (at.at() - start.at()).num_nanoseconds())
                .and_then(|nanos| u64::try_from(nanos).ok());
            self.status.completion_timestamp = Some(at);
        }
        tracing::debug!(build = %name, %from, %to, "build phase transition");
        self.status.phase = to;
        Ok(())
    }

    /// Terminal transition that also records why.
    pub fn finish_with_reason(
        &mut self,
        to: BuildPhase,
        reason: impl Into<String>,
        message: Option<String>,
        at: DateTime<Utc>,
    ) -> Result<(), TransitionError> {
        self.transition(to, at)?;
        self.status.reason = Some(reason.into());
        self.status.message = message;
        Ok(())
    }

    /// Re-encode `USER_PARAMS` without changing its content; useful after a
    /// producer wrote it in a different layout.
    pub fn normalize_user_params(&mut self, style: NestedStyle) -> Result<bool, ParamsError> {
        let Some(raw) = self.user_params_raw() else {
            return Ok(false);
        };
        let value: Value = crate::codec::decode_nested(raw).map_err(|e| e.in_field(ENV_USER_PARAMS))?;
        let normalized = crate::codec::encode_nested(&value, style)?;
        if normalized == raw {
            return Ok(false);
        }
        if let Some(strategy) = self.spec.strategy.custom_strategy.as_mut() {
            strategy.set_env(ENV_USER_PARAMS, normalized);
        }
        Ok(true)
    }
}
