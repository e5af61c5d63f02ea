//! Artifact payload storage
//!
//! Payloads either live in the artifact row or are written through one of
//! the external stores. The store is chosen once from configuration and the
//! handle is shared for the life of the process.

mod database;
mod filesystem;
mod http;
mod object;

pub use database::{DatabaseStore, DB_STORAGE_KEY};
pub use filesystem::FilesystemStore;
pub use http::HttpStore;
pub use object::ObjectStore;

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::Value;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use thiserror::Error;

/// Storage backend tag, recorded on every artifact row
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageBackend {
    #[default]
    Db,
    File,
    Gcs,
    Http,
}

impl StorageBackend {
    pub fn as_str(&self) -> &'static str {
        match self {
            StorageBackend::Db => "db",
            StorageBackend::File => "file",
            StorageBackend::Gcs => "gcs",
            StorageBackend::Http => "http",
        }
    }

    /// Parse a configured backend name, falling back to the database
    pub fn from_config(value: &str) -> Self {
        value.parse().unwrap_or_else(|_| {
            tracing::warn!("Unknown artifact storage backend '{}', using db", value);
            StorageBackend::Db
        })
    }
}

impl std::fmt::Display for StorageBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for StorageBackend {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "db" | "database" => Ok(StorageBackend::Db),
            "file" | "filesystem" => Ok(StorageBackend::File),
            "gcs" => Ok(StorageBackend::Gcs),
            "http" => Ok(StorageBackend::Http),
            _ => Err(format!("Unknown storage backend: {}", s)),
        }
    }
}

/// Settings for building the active store
#[derive(Debug, Clone)]
pub struct StorageSettings {
    pub backend: StorageBackend,
    pub path: PathBuf,
    pub gcs_bucket: Option<String>,
    pub gcs_endpoint: String,
    pub gcs_token: Option<String>,
    pub http_url: Option<String>,
}

impl Default for StorageSettings {
    fn default() -> Self {
        Self {
            backend: StorageBackend::Db,
            path: PathBuf::from("./artifacts"),
            gcs_bucket: None,
            gcs_endpoint: "https://storage.googleapis.com".to_string(),
            gcs_token: None,
            http_url: None,
        }
    }
}

/// Store errors
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("{0} is not configured")]
    NotConfigured(&'static str),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Remote store returned {status}: {body}")]
    Status { status: u16, body: String },

    #[error("Invalid artifact id: {0:?}")]
    InvalidId(String),
}

/// Whether `id` can name a stored payload: one plain path segment with no
/// separators, control characters or dot segments.
pub fn is_valid_artifact_id(id: &str) -> bool {
    !id.is_empty()
        && id != "."
        && id != ".."
        && !id.chars().any(|c| c == '/' || c == '\\' || c.is_control())
        && Path::new(id).components().count() == 1
}

pub(crate) fn check_artifact_id(id: &str) -> Result<(), StoreError> {
    if is_valid_artifact_id(id) {
        Ok(())
    } else {
        Err(StoreError::InvalidId(id.to_string()))
    }
}

/// Payload store capability
#[async_trait]
pub trait ArtifactStore: Send + Sync {
    /// Backend tag recorded alongside the storage key
    fn backend(&self) -> StorageBackend;

    /// Persist `content` and return the key it can be loaded from
    async fn save(
        &self,
        artifact_id: &str,
        content: &Value,
        token: Option<&str>,
    ) -> Result<String, StoreError>;

    /// Load previously saved content; `None` when there is nothing to load
    async fn load(
        &self,
        artifact_id: &str,
        storage_key: &str,
        token: Option<&str>,
    ) -> Result<Option<Value>, StoreError>;
}

/// Build the configured store
pub fn build_store(settings: &StorageSettings) -> Result<Arc<dyn ArtifactStore>, StoreError> {
    let store: Arc<dyn ArtifactStore> = match settings.backend {
        StorageBackend::Db => Arc::new(DatabaseStore),
        StorageBackend::File => Arc::new(FilesystemStore::new(settings.path.clone())?),
        StorageBackend::Gcs => Arc::new(ObjectStore::new(
            settings.gcs_endpoint.clone(),
            settings.gcs_bucket.clone(),
            settings.gcs_token.clone(),
        )),
        StorageBackend::Http => Arc::new(HttpStore::new(settings.http_url.clone())),
    };
    tracing::info!("Artifact storage backend: {}", store.backend());
    Ok(store)
}

pub(crate) fn http_client() -> reqwest::Client {
    reqwest::Client::builder()
        .timeout(std::time::Duration::from_secs(30))
        .build()
        .unwrap_or_default()
}

pub(crate) async fn check_status(
    response: reqwest::Response,
) -> Result<reqwest::Response, StoreError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    Err(StoreError::Status {
        status: status.as_u16(),
        body,
    })
}
