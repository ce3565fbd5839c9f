//! Build parameters carried in `USER_PARAMS`.
//!
//! The build client serializes these into the custom strategy env. Two kinds
//! exist (image builds and source container builds); a payload without
//! `kind` is an image build.

mod build_id;
mod image_tag;
mod naming;
mod request;
pub(crate) mod user_params;

pub use build_id::{BUILD_ID_MAX_LEN, validate_build_id};
pub use image_tag::make_image_tag;
pub use naming::{LABEL_MAX_CHARS, git_repo_humanish_part, make_name_from_git, sanitize_for_openshift};
pub use request::{BuildSettings, CommonRequest, ImageBuildRequest, SourceBuildRequest};
pub use user_params::{
    BuildType, BuildUserParams, CommonParams, NodeSelector, SourceContainerUserParams, UserParams,
};

use thiserror::Error;

use crate::codec::CodecError;

/// Arrangement version written when none is requested.
pub const ARRANGEMENT_VERSION: u32 = 6;
pub const DEFAULT_GIT_REF: &str = "master";
pub const DEFAULT_CUSTOMIZE_CONF: &str = "prod_customize.json";
/// Digits of the random segment of an image tag.
pub const RAND_DIGITS: u32 = 5;
/// Hours.
pub const WORKER_MAX_RUNTIME: u32 = 3;
/// Hours.
pub const ORCHESTRATOR_MAX_RUNTIME: u32 = 4;

pub const KIND_KEY: &str = "kind";
pub const KIND_IMAGE_BUILDS: &str = "build_user_params";
pub const KIND_SOURCE_CONTAINER_BUILDS: &str = "source_containers_user_params";

#[derive(Debug, Error)]
pub enum ParamsError {
    #[error(transparent)]
    Codec(#[from] CodecError),

    #[error("user params must be a JSON object")]
    NotAnObject,

    #[error("unknown user params kind '{0}'")]
    UnknownKind(String),

    #[error("Missing required params: {}", .0.iter().map(|p| format!("'{p}'")).collect::<Vec<_>>().join(", "))]
    Missing(Vec<&'static str>),

    #[error("Build ID '{value}' doesn't match regex '{pattern}'")]
    InvalidBuildId { value: String, pattern: &'static str },

    #[error("{0}")]
    Invalid(String),

    #[error("record does not use the custom strategy")]
    NotCustomStrategy,
}

impl From<serde_json::Error> for ParamsError {
    fn from(err: serde_json::Error) -> Self {
        ParamsError::Codec(CodecError::Json(err))
    }
}
