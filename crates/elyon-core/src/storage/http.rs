use async_trait::async_trait;
use serde_json::Value;

use super::{check_status, http_client, ArtifactStore, StorageBackend, StoreError};

/// Delegates payloads to a remote artifact service.
///
/// `save` POSTs to `<base>/artifacts/<id>` and the resulting URL is the key.
/// The caller's bearer token is forwarded on both calls.
#[derive(Debug, Clone)]
pub struct HttpStore {
    base_url: Option<String>,
    client: reqwest::Client,
}

impl HttpStore {
    pub fn new(base_url: Option<String>) -> Self {
        Self {
            base_url: base_url.map(|url| url.trim_end_matches('/').to_string()),
            client: http_client(),
        }
    }

    fn authorize(
        request: reqwest::RequestBuilder,
        token: Option<&str>,
    ) -> reqwest::RequestBuilder {
        match token {
            Some(token) => request.bearer_auth(token),
            None => request,
        }
    }
}

#[async_trait]
impl ArtifactStore for HttpStore {
    fn backend(&self) -> StorageBackend {
        StorageBackend::Http
    }

    async fn save(
        &self,
        artifact_id: &str,
        content: &Value,
        token: Option<&str>,
    ) -> Result<String, StoreError> {
        let base = self
            .base_url
            .as_deref()
            .ok_or(StoreError::NotConfigured("ARTIFACT_HTTP_URL"))?;
        let url = format!("{}/artifacts/{}", base, urlencoding::encode(artifact_id));

        let request = Self::authorize(self.client.post(&url).json(content), token);
        check_status(request.send().await?).await?;
        Ok(url)
    }

    async fn load(
        &self,
        _artifact_id: &str,
        storage_key: &str,
        token: Option<&str>,
    ) -> Result<Option<Value>, StoreError> {
        let request = Self::authorize(self.client.get(storage_key), token);
        let response = check_status(request.send().await?).await?;
        Ok(Some(response.json().await?))
    }
}
