//! Progress and credential persistence

use async_trait::async_trait;
use blueprint_types::{DebugRecord, ProgressRecord, ProgressUpdate, RefId, StoreError, TxId};
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Externally visible progress of build runs.
#[async_trait]
pub trait ProgressStore: Send + Sync {
    /// Persist a new record and return the URL pollers use to follow it.
    async fn create(&self, record: ProgressRecord) -> Result<String, StoreError>;

    /// Apply a partial update.
    async fn update(&self, tx_id: &TxId, update: ProgressUpdate) -> Result<(), StoreError>;

    async fn get(&self, tx_id: &TxId) -> Result<Option<ProgressRecord>, StoreError>;

    /// Persist the end-of-run debug record.
    async fn save_debug(&self, record: DebugRecord) -> Result<(), StoreError>;
}

/// In-memory implementation for development
pub struct InMemoryProgressStore {
    base_url: String,
    records: DashMap<TxId, ProgressRecord>,
    history: DashMap<TxId, Vec<ProgressUpdate>>,
    debug: DashMap<TxId, DebugRecord>,
}

impl InMemoryProgressStore {
    /// Create a store whose poll URLs start with `base_url`
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            records: DashMap::new(),
            history: DashMap::new(),
            debug: DashMap::new(),
        }
    }

    /// Every update applied to a run, in order
    pub fn history(&self, tx_id: &TxId) -> Vec<ProgressUpdate> {
        self.history
            .get(tx_id)
            .map(|h| h.clone())
            .unwrap_or_default()
    }

    /// Messages of every update applied to a run, in order
    pub fn messages(&self, tx_id: &TxId) -> Vec<String> {
        self.history(tx_id)
            .into_iter()
            .filter_map(|update| update.message)
            .collect()
    }

    pub fn debug_record(&self, tx_id: &TxId) -> Option<DebugRecord> {
        self.debug.get(tx_id).map(|r| r.clone())
    }
}

impl Default for InMemoryProgressStore {
    fn default() -> Self {
        Self::new("memory://progress")
    }
}

#[async_trait]
impl ProgressStore for InMemoryProgressStore {
    async fn create(&self, record: ProgressRecord) -> Result<String, StoreError> {
        let tx_id = record.tx_id;
        self.records.insert(tx_id, record);
        Ok(format!("{}/{}", self.base_url.trim_end_matches('/'), tx_id))
    }

    async fn update(&self, tx_id: &TxId, update: ProgressUpdate) -> Result<(), StoreError> {
        let mut record = self
            .records
            .get_mut(tx_id)
            .ok_or_else(|| StoreError::NotFound(tx_id.to_string()))?;
        record.apply(update.clone());
        self.history.entry(*tx_id).or_default().push(update);
        Ok(())
    }

    async fn get(&self, tx_id: &TxId) -> Result<Option<ProgressRecord>, StoreError> {
        Ok(self.records.get(tx_id).map(|r| r.clone()))
    }

    async fn save_debug(&self, record: DebugRecord) -> Result<(), StoreError> {
        self.debug.insert(record.tx_id, record);
        Ok(())
    }
}

/// Certificate material of an enrolled identity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CredentialRecord {
    pub tx_id: TxId,
    pub ref_id: RefId,
    pub display_name: String,
    pub enroll_id: String,
    pub ca_url: String,
    pub cert: String,
    pub private_key: String,
    pub root_certs: Vec<String>,
    pub created_at: DateTime<Utc>,
}

/// Wallet of enrolled identities.
#[async_trait]
pub trait CredentialStore: Send + Sync {
    /// Persist a credential and return its document id.
    async fn save(&self, record: CredentialRecord) -> Result<String, StoreError>;
}

/// In-memory implementation for development
pub struct InMemoryCredentialStore {
    records: DashMap<String, CredentialRecord>,
}

impl InMemoryCredentialStore {
    pub fn new() -> Self {
        Self {
            records: DashMap::new(),
        }
    }

    pub fn get(&self, doc_id: &str) -> Option<CredentialRecord> {
        self.records.get(doc_id).map(|r| r.clone())
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

impl Default for InMemoryCredentialStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl CredentialStore for InMemoryCredentialStore {
    async fn save(&self, record: CredentialRecord) -> Result<String, StoreError> {
        let doc_id = Uuid::new_v4().to_string();
        self.records.insert(doc_id.clone(), record);
        Ok(doc_id)
    }
}
