//! Durable-store boundary.
//!
//! The pipeline needs two things from storage: the latest timestamp already
//! on record for a provider pair (the dedup boundary), and an atomic insert of
//! one whole table. Schema and connection management belong to the
//! implementation.
//!
//! Only the sink task calls [`ResultStore::insert`], so writes are never
//! concurrent. [`ResultStore::latest_timestamp`] is called from every worker.

use crate::error::StoreError;
use crate::job::{zero_timestamp, DedupKey, Timestamp};
use crate::output::ResultTable;
use std::collections::HashMap;
use std::future::Future;
use std::sync::{Mutex, MutexGuard};

pub trait ResultStore: Send + Sync + 'static {
    /// Latest stored timestamp for `key`, or [`zero_timestamp`] when nothing
    /// is on record.
    fn latest_timestamp(
        &self,
        key: &DedupKey,
    ) -> impl Future<Output = Result<Timestamp, StoreError>> + Send;

    /// Commit every row of `table` or none of them.
    fn insert(&self, table: &ResultTable) -> impl Future<Output = Result<(), StoreError>> + Send;
}

/// In-process store keeping every inserted table.
#[derive(Debug, Default)]
pub struct MemoryStore {
    tables: Mutex<HashMap<DedupKey, Vec<ResultTable>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record `timestamp` as already stored for `key`, without rows.
    pub fn seed(&self, key: DedupKey, timestamp: Timestamp) -> Result<(), StoreError> {
        let table = ResultTable {
            net_provider: key.net_provider.clone(),
            provider: key.provider.clone(),
            timestamp,
            generator_version: None,
            rows: Vec::new(),
        };
        self.lock()?.entry(key).or_default().push(table);
        Ok(())
    }

    /// Every table stored for `key`, in insertion order.
    pub fn tables(&self, key: &DedupKey) -> Result<Vec<ResultTable>, StoreError> {
        Ok(self.lock()?.get(key).cloned().unwrap_or_default())
    }

    /// Number of tables across all keys.
    pub fn len(&self) -> Result<usize, StoreError> {
        Ok(self.lock()?.values().map(Vec::len).sum())
    }

    pub fn is_empty(&self) -> Result<bool, StoreError> {
        Ok(self.len()? == 0)
    }

    fn lock(&self) -> Result<MutexGuard<'_, HashMap<DedupKey, Vec<ResultTable>>>, StoreError> {
        self.tables
            .lock()
            .map_err(|_| StoreError::Backend("memory store lock poisoned".into()))
    }
}

impl ResultStore for MemoryStore {
    async fn latest_timestamp(&self, key: &DedupKey) -> Result<Timestamp, StoreError> {
        let guard = self.lock()?;
        Ok(guard
            .get(key)
            .and_then(|tables| tables.iter().map(|t| t.timestamp).max())
            .unwrap_or_else(zero_timestamp))
    }

    async fn insert(&self, table: &ResultTable) -> Result<(), StoreError> {
        // A single push under the lock: readers see all rows or none.
        self.lock()?
            .entry(table.key())
            .or_default()
            .push(table.clone());
        Ok(())
    }
}
