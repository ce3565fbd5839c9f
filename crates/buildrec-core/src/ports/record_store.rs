//! RecordStore port.
//!
//! # Points
//! - records are keyed by `namespace/name`
//! - phase changes go through the record's own `transition`, so terminal
//!   records stay frozen in every implementation

use std::collections::BTreeMap;

use async_trait::async_trait;
use thiserror::Error;

use crate::domain::{BuildKey, BuildPhase, BuildRecord, TransitionError};

#[derive(Debug, Error, PartialEq)]
pub enum StoreError {
    #[error("build {0} already exists")]
    AlreadyExists(BuildKey),

    #[error("build {0} not found")]
    NotFound(BuildKey),

    #[error("record has no metadata.name")]
    Unnamed,

    #[error(transparent)]
    Transition(#[from] TransitionError),
}

/// Number of records per phase, keyed by phase name.
pub type PhaseCounts = BTreeMap<String, usize>;

/// Collection of build records keyed by `namespace/name`.
///
/// # Rules
/// - `create` never overwrites; a second record with the same key is refused.
/// - `transition` follows the record lifecycle; terminal records are frozen.
#[async_trait]
pub trait RecordStore: Send + Sync {
    async fn create(&self, record: BuildRecord) -> Result<BuildKey, StoreError>;

    async fn get(&self, key: &BuildKey) -> Result<Option<BuildRecord>, StoreError>;

    /// Move a stored record to `to`; returns the updated record.
    async fn transition(&self, key: &BuildKey, to: BuildPhase) -> Result<BuildRecord, StoreError>;

    /// Records of one namespace (or all when `None`), ordered by key.
    async fn list(&self, namespace: Option<&str>) -> Result<Vec<BuildRecord>, StoreError>;

    async fn counts_by_phase(&self) -> Result<PhaseCounts, StoreError>;
}
