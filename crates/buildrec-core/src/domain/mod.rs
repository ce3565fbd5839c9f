//! Domain model (metadata, spec, strategy, status, record).

pub mod consistency;
pub mod meta;
pub mod phase;
pub mod record;
pub mod spec;
pub mod status;
pub mod strategy;

pub use consistency::{Anomaly, check};
pub use meta::{ObjectMeta, SourceImageRef};
pub use phase::BuildPhase;
pub use record::{BuildKey, BuildRecord, TransitionError};
pub use spec::{BuildOutput, BuildSource, BuildSpec, GitBuildSource, LocalObjectReference, ObjectReference};
pub use status::BuildStatus;
pub use strategy::{BuildStrategy, CustomBuildStrategy, EnvVar, SecretSpec};
