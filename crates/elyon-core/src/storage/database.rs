use async_trait::async_trait;
use serde_json::Value;

use super::{ArtifactStore, StorageBackend, StoreError};

/// Sentinel key for payloads kept in the artifact row
pub const DB_STORAGE_KEY: &str = "db";

/// In-row store: the service writes the payload column itself.
#[derive(Debug, Default, Clone, Copy)]
pub struct DatabaseStore;

#[async_trait]
impl ArtifactStore for DatabaseStore {
    fn backend(&self) -> StorageBackend {
        StorageBackend::Db
    }

    async fn save(
        &self,
        _artifact_id: &str,
        _content: &Value,
        _token: Option<&str>,
    ) -> Result<String, StoreError> {
        Ok(DB_STORAGE_KEY.to_string())
    }

    async fn load(
        &self,
        _artifact_id: &str,
        _storage_key: &str,
        _token: Option<&str>,
    ) -> Result<Option<Value>, StoreError> {
        Ok(None)
    }
}
