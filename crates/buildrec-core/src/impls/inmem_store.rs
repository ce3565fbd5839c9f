//! InMemoryRecordStore: record collection for tools and tests.

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::Mutex;

use crate::domain::{BuildKey, BuildPhase, BuildRecord};
use crate::ports::{Clock, PhaseCounts, RecordStore, StoreError, SystemClock};

/// Records behind a tokio mutex.
///
/// # Details
/// - `BTreeMap<BuildKey, BuildRecord>` so listings come out ordered by key
/// - transition timestamps come from the injected `Clock`
pub struct InMemoryRecordStore {
    records: Mutex<BTreeMap<BuildKey, BuildRecord>>,
    clock: Arc<dyn Clock>,
}

impl InMemoryRecordStore {
    pub fn new() -> Self {
        Self::with_clock(Arc::new(SystemClock))
    }

    pub fn with_clock(clock: Arc<dyn Clock>) -> Self {
        Self {
            records: Mutex::new(BTreeMap::new()),
            clock,
        }
    }
}

impl Default for InMemoryRecordStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl RecordStore for InMemoryRecordStore {
    async fn create(&self, record: BuildRecord) -> Result<BuildKey, StoreError> {
        let key = record.key().ok_or(StoreError::Unnamed)?;
        let mut records = self.records.lock().await;
        if records.contains_key(&key) {
            return Err(StoreError::AlreadyExists(key));
        }
        tracing::debug!(build = %key, phase = %record.phase(), "record stored");
        records.insert(key.clone(), record);
        Ok(key)
    }

    async fn get(&self, key: &BuildKey) -> Result<Option<BuildRecord>, StoreError> {
        Ok(self.records.lock().await.get(key).cloned())
    }

    async fn transition(&self, key: &BuildKey, to: BuildPhase) -> Result<BuildRecord, StoreError> {
        let mut records = self.records.lock().await;
        let record = records
            .get_mut(key)
            .ok_or_else(|| StoreError::NotFound(key.clone()))?;
        record.transition(to, self.clock.now())?;
        Ok(record.clone())
    }

    async fn list(&self, namespace: Option<&str>) -> Result<Vec<BuildRecord>, StoreError> {
        let records = self.records.lock().await;
        Ok(records
            .iter()
            .filter(|(key, _)| namespace.is_none_or(|ns| key.namespace == ns))
            .map(|(_, record)| record.clone())
            .collect())
    }

    async fn counts_by_phase(&self) -> Result<PhaseCounts, StoreError> {
        let records = self.records.lock().await;
        let mut counts = PhaseCounts::new();
        for record in records.values() {
            *counts.entry(record.phase().to_string()).or_default() += 1;
        }
        Ok(counts)
    }
}
