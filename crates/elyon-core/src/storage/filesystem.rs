use async_trait::async_trait;
use serde_json::Value;
use std::path::{Path, PathBuf};

use super::{check_artifact_id, ArtifactStore, StorageBackend, StoreError};

/// Stores each payload as `<base>/<artifact_id>.json`
#[derive(Debug, Clone)]
pub struct FilesystemStore {
    base_path: PathBuf,
}

impl FilesystemStore {
    pub fn new(base_path: PathBuf) -> Result<Self, StoreError> {
        std::fs::create_dir_all(&base_path)?;
        Ok(Self { base_path })
    }

    pub fn base_path(&self) -> &Path {
        &self.base_path
    }

    /// The id must stay a single file name under the base directory
    fn path_for(&self, artifact_id: &str) -> Result<PathBuf, StoreError> {
        check_artifact_id(artifact_id)?;
        Ok(self.base_path.join(format!("{}.json", artifact_id)))
    }
}

#[async_trait]
impl ArtifactStore for FilesystemStore {
    fn backend(&self) -> StorageBackend {
        StorageBackend::File
    }

    async fn save(
        &self,
        artifact_id: &str,
        content: &Value,
        _token: Option<&str>,
    ) -> Result<String, StoreError> {
        let path = self.path_for(artifact_id)?;
        let body = serde_json::to_string_pretty(content)?;
        tokio::fs::write(&path, body).await?;
        Ok(path.to_string_lossy().into_owned())
    }

    async fn load(
        &self,
        artifact_id: &str,
        storage_key: &str,
        _token: Option<&str>,
    ) -> Result<Option<Value>, StoreError> {
        let mut path = PathBuf::from(storage_key);
        if !tokio::fs::try_exists(&path).await.unwrap_or(false) {
            // The key may have been written relative to another working dir
            path = self.path_for(artifact_id)?;
            if !tokio::fs::try_exists(&path).await.unwrap_or(false) {
                return Ok(None);
            }
        }

        let content = tokio::fs::read_to_string(&path).await?;
        Ok(Some(serde_json::from_str(&content)?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn test_save_writes_pretty_json_under_base() {
        let dir = tempfile::tempdir().unwrap();
        let store = FilesystemStore::new(dir.path().join("nested")).unwrap();

        let key = store
            .save("A_CODE_1", &json!({"source": "print(1)"}), None)
            .await
            .unwrap();

        assert!(key.ends_with("A_CODE_1.json"));
        let raw = std::fs::read_to_string(&key).unwrap();
        assert!(raw.contains("\n  \"source\""));
        let loaded = store.load("A_CODE_1", &key, None).await.unwrap();
        assert_eq!(loaded, Some(json!({"source": "print(1)"})));
    }

    #[tokio::test]
    async fn test_load_falls_back_to_base_path() {
        let dir = tempfile::tempdir().unwrap();
        let store = FilesystemStore::new(dir.path().to_path_buf()).unwrap();
        store.save("A2", &json!([1, 2]), None).await.unwrap();

        let loaded = store
            .load("A2", "/moved/elsewhere/A2.json", None)
            .await
            .unwrap();
        assert_eq!(loaded, Some(json!([1, 2])));
    }

    #[tokio::test]
    async fn test_save_rejects_ids_outside_base() {
        let dir = tempfile::tempdir().unwrap();
        let store = FilesystemStore::new(dir.path().join("artifacts")).unwrap();

        for id in ["../escaped", "/tmp/absolute", "a/b", ".."] {
            let err = store.save(id, &json!({}), None).await.unwrap_err();
            assert!(matches!(err, StoreError::InvalidId(_)), "{id}");
        }
        assert!(!dir.path().join("escaped.json").exists());
    }

    #[tokio::test]
    async fn test_load_missing_returns_none() {
        let dir = tempfile::tempdir().unwrap();
        let store = FilesystemStore::new(dir.path().to_path_buf()).unwrap();
        assert!(store.load("nope", "nope.json", None).await.unwrap().is_none());
    }
}
