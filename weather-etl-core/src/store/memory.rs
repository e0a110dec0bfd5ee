use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::{
    collections::BTreeMap,
    sync::{Arc, Mutex, MutexGuard},
};

use crate::{error::LoadError, model::ObservationRecord};

use super::{ObservationStore, StoreTransaction};

type Key = (String, DateTime<Utc>);

#[derive(Debug, Default)]
struct Inner {
    rows: BTreeMap<Key, ObservationRecord>,
    batch_sizes: Vec<usize>,
    fail_on_batch: Option<usize>,
}

/// Process-local store with the same ignore-on-conflict semantics as the
/// Postgres table. Backs `--dry-run` and the pipeline tests.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    inner: Arc<Mutex<Inner>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make the `n`-th write call (1-based, counted across transactions) fail.
    pub fn fail_on_batch(self, n: usize) -> Self {
        self.lock().fail_on_batch = Some(n);
        self
    }

    pub fn rows(&self) -> Vec<ObservationRecord> {
        self.lock().rows.values().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.lock().rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().rows.is_empty()
    }

    /// Size of every write call issued so far, committed or not.
    pub fn batch_sizes(&self) -> Vec<usize> {
        self.lock().batch_sizes.clone()
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[async_trait]
impl ObservationStore for MemoryStore {
    async fn begin(&self) -> Result<Box<dyn StoreTransaction>, LoadError> {
        Ok(Box::new(MemoryTransaction {
            store: self.clone(),
            staged: BTreeMap::new(),
        }))
    }
}

struct MemoryTransaction {
    store: MemoryStore,
    staged: BTreeMap<Key, ObservationRecord>,
}

#[async_trait]
impl StoreTransaction for MemoryTransaction {
    async fn insert_batch(&mut self, rows: &[ObservationRecord]) -> Result<u64, LoadError> {
        let mut inner = self.store.lock();
        inner.batch_sizes.push(rows.len());

        let batch = inner.batch_sizes.len();
        if inner.fail_on_batch == Some(batch) {
            return Err(LoadError::Rejected {
                batch,
                reason: "injected failure".to_string(),
            });
        }

        let mut inserted = 0;
        for row in rows {
            let key = (row.station_id.clone(), row.observation_timestamp);
            if inner.rows.contains_key(&key) || self.staged.contains_key(&key) {
                continue;
            }
            self.staged.insert(key, row.clone());
            inserted += 1;
        }

        Ok(inserted)
    }

    async fn commit(&mut self) -> Result<(), LoadError> {
        let staged = std::mem::take(&mut self.staged);
        let mut inner = self.store.lock();
        for (key, row) in staged {
            inner.rows.entry(key).or_insert(row);
        }
        Ok(())
    }

    async fn rollback(&mut self) -> Result<(), LoadError> {
        self.staged.clear();
        Ok(())
    }
}
