//! Existing-component records kept in a JSON file

use async_trait::async_trait;
use blueprint_template::ComponentStore;
use blueprint_types::StoreError;
use serde_json::{Map, Value};
use std::path::{Path, PathBuf};
use tokio::sync::Mutex;
use tracing::debug;

/// [`ComponentStore`] backed by one JSON object mapping component ids to
/// records. A missing file is an empty store.
pub struct FileComponentStore {
    path: PathBuf,
    write_lock: Mutex<()>,
}

impl FileComponentStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            write_lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Every record in the file.
    pub async fn load(&self) -> Result<Map<String, Value>, StoreError> {
        let raw = match tokio::fs::read(&self.path).await {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Map::new()),
            Err(e) => return Err(StoreError::Storage(e.to_string())),
        };
        match serde_json::from_slice(&raw) {
            Ok(Value::Object(records)) => Ok(records),
            Ok(_) => Err(StoreError::Storage(format!(
                "{} does not hold a JSON object",
                self.path.display()
            ))),
            Err(e) => Err(StoreError::Storage(e.to_string())),
        }
    }

    /// Add or replace a record. The file is rewritten through a sibling
    /// `.tmp` file and renamed into place, so readers never see a partial
    /// write.
    pub async fn save(&self, key: &str, record: Value) -> Result<(), StoreError> {
        let _guard = self.write_lock.lock().await;
        let mut records = self.load().await?;
        records.insert(key.to_string(), record);

        if let Some(parent) = self.path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| StoreError::Storage(e.to_string()))?;
        }
        let raw = serde_json::to_vec_pretty(&Value::Object(records))
            .map_err(|e| StoreError::Storage(e.to_string()))?;
        let tmp_path = self.path.with_extension("tmp");
        tokio::fs::write(&tmp_path, raw)
            .await
            .map_err(|e| StoreError::Storage(e.to_string()))?;
        tokio::fs::rename(&tmp_path, &self.path)
            .await
            .map_err(|e| StoreError::Storage(e.to_string()))
    }
}

#[async_trait]
impl ComponentStore for FileComponentStore {
    async fn fetch_many(&self, keys: &[String]) -> Result<Vec<Option<Value>>, StoreError> {
        let records = self.load().await?;
        debug!(path = %self.path.display(), keys = keys.len(), "Loaded existing components");
        Ok(keys.iter().map(|key| records.get(key).cloned()).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn test_missing_file_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileComponentStore::new(dir.path().join("components.json"));
        let records = store.fetch_many(&["org1-ca".into()]).await.unwrap();
        assert_eq!(records, vec![None]);
    }

    #[tokio::test]
    async fn test_saved_records_are_fetched_positionally() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("components.json");
        {
            let store = FileComponentStore::new(path.clone());
            store
                .save("org1-ca", json!({"type": "CA", "api_url": "https://org1-ca:7054"}))
                .await
                .unwrap();
            store
                .save("org1-msp", json!({"type": "MSP", "msp_id": "Org1MSP"}))
                .await
                .unwrap();
        }

        let store = FileComponentStore::new(path);
        let records = store
            .fetch_many(&["org1-msp".into(), "gone".into(), "org1-ca".into()])
            .await
            .unwrap();
        assert_eq!(records[0].as_ref().unwrap()["msp_id"], json!("Org1MSP"));
        assert_eq!(records[1], None);
        assert_eq!(records[2].as_ref().unwrap()["api_url"], json!("https://org1-ca:7054"));
    }

    #[tokio::test]
    async fn test_save_replaces_file_through_temp_sibling() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("components.json");
        let tmp_path = dir.path().join("components.tmp");
        tokio::fs::write(&path, br#"{"org1-ca": {"type": "CA"}}"#).await.unwrap();
        // Left behind by an interrupted write.
        tokio::fs::write(&tmp_path, br#"{"org1-"#).await.unwrap();

        let store = FileComponentStore::new(path.clone());
        assert_eq!(store.load().await.unwrap().len(), 1);
        store.save("org1-msp", json!({"type": "MSP"})).await.unwrap();

        assert!(!tmp_path.exists());
        let records = store.load().await.unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records["org1-ca"]["type"], json!("CA"));
    }

    #[tokio::test]
    async fn test_non_object_file_is_a_storage_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("components.json");
        tokio::fs::write(&path, b"[1, 2, 3]").await.unwrap();

        let err = FileComponentStore::new(path)
            .fetch_many(&["x".into()])
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::Storage(_)));
    }
}
