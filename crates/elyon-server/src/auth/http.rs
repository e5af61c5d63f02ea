//! Auth delegated to a remote HTTP service
//!
//! - `POST {url}/login` with `{username, password}` and bearer `AUTH_API_KEY`
//! - `GET {url}/validate` with the session token as bearer
//! - `POST {url}/logout` with the session token as bearer

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use elyon_core::models::UserIdentity;
use reqwest::StatusCode;
use serde::Deserialize;
use serde_json::{json, Map, Value};
use std::time::Duration;

use super::{require_username, AuthError, AuthOutcome, AuthProvider};

/// Identity payload returned by `/login` and `/validate`
#[derive(Debug, Deserialize)]
struct RemoteIdentity {
    #[serde(default)]
    user_id: Option<String>,
    #[serde(default)]
    profile: Map<String, Value>,
    #[serde(default = "default_enabled")]
    enabled: bool,
    #[serde(default, alias = "access_token")]
    session_token: Option<String>,
    #[serde(default)]
    session_expires_at: Option<DateTime<Utc>>,
}

fn default_enabled() -> bool {
    true
}

impl RemoteIdentity {
    fn into_identity(self, fallback_user_id: &str) -> UserIdentity {
        UserIdentity {
            user_id: self
                .user_id
                .filter(|id| !id.is_empty())
                .unwrap_or_else(|| fallback_user_id.to_string()),
            profile: self.profile,
            enabled: self.enabled,
        }
    }
}

pub struct HttpAuthProvider {
    client: reqwest::Client,
    base_url: String,
    api_key: Option<String>,
}

impl HttpAuthProvider {
    pub fn new(base_url: &str, api_key: Option<String>) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(10))
            .build()?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key: api_key.filter(|k| !k.is_empty()),
        })
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path)
    }
}

#[async_trait]
impl AuthProvider for HttpAuthProvider {
    fn name(&self) -> &'static str {
        "http"
    }

    async fn authenticate(
        &self,
        username: &str,
        password: Option<&str>,
    ) -> Result<AuthOutcome, AuthError> {
        let username = require_username(username)?;
        let mut builder = self
            .client
            .post(self.endpoint("login"))
            .json(&json!({"username": username, "password": password}));
        if let Some(key) = &self.api_key {
            builder = builder.bearer_auth(key);
        }

        let response = builder.send().await?;
        match response.status() {
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
                return Err(AuthError::InvalidCredentials("Invalid credentials".into()));
            }
            status if !status.is_success() => {
                let body = response.text().await.unwrap_or_default();
                tracing::warn!(%status, "Auth service rejected login: {}", body);
                return Err(AuthError::Upstream(format!("status {}", status.as_u16())));
            }
            _ => {}
        }

        let mut remote: RemoteIdentity = response.json().await?;
        let session_token = remote
            .session_token
            .take()
            .filter(|t| !t.is_empty())
            .ok_or_else(|| AuthError::Upstream("no session token in login response".into()))?;
        let session_expires_at = remote.session_expires_at.take();

        Ok(AuthOutcome {
            identity: remote.into_identity(username),
            session_token,
            session_expires_at,
        })
    }

    async fn validate_token(&self, token: &str) -> Option<UserIdentity> {
        let response = match self
            .client
            .get(self.endpoint("validate"))
            .bearer_auth(token)
            .send()
            .await
        {
            Ok(response) => response,
            Err(e) => {
                tracing::warn!("Auth service unreachable: {}", e);
                return None;
            }
        };

        if !response.status().is_success() {
            return None;
        }

        let remote: RemoteIdentity = response.json().await.ok()?;
        let user_id = remote.user_id.clone().filter(|id| !id.is_empty())?;
        Some(remote.into_identity(&user_id))
    }

    async fn logout(&self, token: &str) -> Result<(), AuthError> {
        let response = self
            .client
            .post(self.endpoint("logout"))
            .bearer_auth(token)
            .json(&json!({"session_token": token}))
            .send()
            .await?;
        if !response.status().is_success() {
            tracing::warn!(status = %response.status(), "Auth service logout failed");
        }
        Ok(())
    }
}
