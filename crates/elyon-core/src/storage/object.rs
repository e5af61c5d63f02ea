use async_trait::async_trait;
use serde_json::Value;

use super::{check_artifact_id, check_status, http_client, ArtifactStore, StorageBackend, StoreError};

/// Google Cloud Storage via its JSON API.
///
/// Objects are named `artifacts/<artifact_id>.json` and keyed as
/// `gs://<bucket>/artifacts/<artifact_id>.json`.
#[derive(Debug, Clone)]
pub struct ObjectStore {
    endpoint: String,
    bucket: Option<String>,
    token: Option<String>,
    client: reqwest::Client,
}

impl ObjectStore {
    pub fn new(endpoint: String, bucket: Option<String>, token: Option<String>) -> Self {
        if bucket.is_none() {
            tracing::warn!("ARTIFACT_GCS_BUCKET is not set; object storage calls will fail");
        }
        Self {
            endpoint: endpoint.trim_end_matches('/').to_string(),
            bucket,
            token,
            client: http_client(),
        }
    }

    fn bucket(&self) -> Result<&str, StoreError> {
        self.bucket
            .as_deref()
            .ok_or(StoreError::NotConfigured("ARTIFACT_GCS_BUCKET"))
    }

    fn object_name(artifact_id: &str) -> String {
        format!("artifacts/{}.json", artifact_id)
    }

    /// Accepts either a `gs://bucket/...` key or a bare object name
    fn object_from_key<'a>(bucket: &str, storage_key: &'a str) -> &'a str {
        storage_key
            .strip_prefix("gs://")
            .and_then(|rest| rest.strip_prefix(bucket))
            .map(|rest| rest.trim_start_matches('/'))
            .unwrap_or(storage_key)
    }

    fn authorize(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.token {
            Some(token) => request.bearer_auth(token),
            None => request,
        }
    }
}

#[async_trait]
impl ArtifactStore for ObjectStore {
    fn backend(&self) -> StorageBackend {
        StorageBackend::Gcs
    }

    async fn save(
        &self,
        artifact_id: &str,
        content: &Value,
        _token: Option<&str>,
    ) -> Result<String, StoreError> {
        check_artifact_id(artifact_id)?;
        let bucket = self.bucket()?;
        let name = Self::object_name(artifact_id);
        let url = format!("{}/upload/storage/v1/b/{}/o", self.endpoint, bucket);

        let request = self
            .client
            .post(&url)
            .query(&[("uploadType", "media"), ("name", name.as_str())])
            .header(reqwest::header::CONTENT_TYPE, "application/json")
            .body(serde_json::to_vec(content)?);
        check_status(self.authorize(request).send().await?).await?;

        Ok(format!("gs://{}/{}", bucket, name))
    }

    async fn load(
        &self,
        _artifact_id: &str,
        storage_key: &str,
        _token: Option<&str>,
    ) -> Result<Option<Value>, StoreError> {
        let bucket = self.bucket()?;
        let object = Self::object_from_key(bucket, storage_key);
        let url = format!(
            "{}/storage/v1/b/{}/o/{}",
            self.endpoint,
            bucket,
            urlencoding::encode(object)
        );

        let request = self.client.get(&url).query(&[("alt", "media")]);
        let response = check_status(self.authorize(request).send().await?).await?;
        let text = response.text().await?;
        Ok(Some(serde_json::from_str(&text)?))
    }
}
