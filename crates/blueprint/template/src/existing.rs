//! Store of components that already exist outside the template

use async_trait::async_trait;
use blueprint_types::StoreError;
use dashmap::DashMap;
use serde_json::Value;
use std::sync::atomic::{AtomicUsize, Ordering};

/// Source of existing component records, keyed by component id.
#[async_trait]
pub trait ComponentStore: Send + Sync {
    /// Fetch every key in one call. The result is positional; a missing
    /// record is `None`.
    async fn fetch_many(&self, keys: &[String]) -> Result<Vec<Option<Value>>, StoreError>;
}

/// In-memory implementation for development and tests
pub struct InMemoryComponentStore {
    records: DashMap<String, Value>,
    fetches: AtomicUsize,
}

impl InMemoryComponentStore {
    /// Create an empty store
    pub fn new() -> Self {
        Self {
            records: DashMap::new(),
            fetches: AtomicUsize::new(0),
        }
    }

    /// Add or replace a record
    pub fn insert(&self, key: impl Into<String>, record: Value) {
        self.records.insert(key.into(), record);
    }

    /// Number of `fetch_many` calls served
    pub fn fetch_count(&self) -> usize {
        self.fetches.load(Ordering::SeqCst)
    }
}

impl Default for InMemoryComponentStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ComponentStore for InMemoryComponentStore {
    async fn fetch_many(&self, keys: &[String]) -> Result<Vec<Option<Value>>, StoreError> {
        self.fetches.fetch_add(1, Ordering::SeqCst);
        Ok(keys
            .iter()
            .map(|key| self.records.get(key).map(|r| r.value().clone()))
            .collect())
    }
}
