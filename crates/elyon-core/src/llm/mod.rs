//! LLM provider abstraction
//!
//! Providers turn a chat request into a stream of [`LlmEvent`]s: text deltas
//! interleaved with artifacts whose JSON payload arrives in chunks.

mod http;
mod mock;

pub use http::HttpProvider;
pub use mock::MockProvider;

use async_trait::async_trait;
use futures::stream::BoxStream;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::sync::Arc;
use thiserror::Error;

use crate::error::ElyonError;
use crate::models::Artifact;

/// Default endpoint of the HTTP provider
pub const DEFAULT_LLM_SERVICE_URL: &str = "http://localhost:8001/generate";

/// Streamed generation event
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum LlmEvent {
    TextDelta {
        content: String,
    },
    ArtifactStart {
        artifact_id: String,
        artifact_type: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        artifact_metadata: Option<Map<String, Value>>,
    },
    ArtifactChunk {
        artifact_id: String,
        chunk: String,
    },
    ArtifactEnd {
        artifact_id: String,
    },
}

/// One conversation turn handed to the provider
#[derive(Debug, Clone, Serialize)]
pub struct LlmMessage {
    pub role: String,
    pub content: String,
    pub artifacts: Vec<Artifact>,
}

/// Generation request
#[derive(Debug, Clone, Serialize)]
pub struct LlmRequest {
    pub session_id: String,
    pub messages: Vec<LlmMessage>,
    pub context_artifacts: Vec<Artifact>,
}

/// Provider errors
#[derive(Debug, Error)]
pub enum LlmError {
    #[error("LLM request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("LLM service returned {status}: {body}")]
    Status { status: u16, body: String },
}

impl From<LlmError> for ElyonError {
    fn from(err: LlmError) -> Self {
        ElyonError::Upstream(err.to_string())
    }
}

/// Streaming text and artifact generator
#[async_trait]
pub trait LlmProvider: Send + Sync {
    fn name(&self) -> &'static str;

    /// Start generating; the returned stream ends when generation is done
    async fn generate_stream(
        &self,
        request: LlmRequest,
    ) -> Result<BoxStream<'static, LlmEvent>, LlmError>;
}

/// Which provider serves chat requests
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LlmProviderKind {
    #[default]
    Mock,
    Http,
}

impl LlmProviderKind {
    /// `http` selects the remote provider; anything else is the mock
    pub fn from_config(value: &str) -> Self {
        if value.trim().eq_ignore_ascii_case("http") {
            LlmProviderKind::Http
        } else {
            LlmProviderKind::Mock
        }
    }
}

/// Provider settings
#[derive(Debug, Clone)]
pub struct LlmSettings {
    pub provider: LlmProviderKind,
    pub service_url: String,
    pub api_key: Option<String>,
}

impl Default for LlmSettings {
    fn default() -> Self {
        Self {
            provider: LlmProviderKind::Mock,
            service_url: DEFAULT_LLM_SERVICE_URL.to_string(),
            api_key: None,
        }
    }
}

/// Build the configured provider
pub fn build_provider(settings: &LlmSettings) -> Arc<dyn LlmProvider> {
    let provider: Arc<dyn LlmProvider> = match settings.provider {
        LlmProviderKind::Mock => Arc::new(MockProvider::new()),
        LlmProviderKind::Http => Arc::new(HttpProvider::new(
            settings.service_url.clone(),
            settings.api_key.clone(),
        )),
    };
    tracing::info!("LLM provider: {}", provider.name());
    provider
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_event_wire_format() {
        let event = LlmEvent::ArtifactStart {
            artifact_id: "A1".into(),
            artifact_type: "visual".into(),
            artifact_metadata: None,
        };
        assert_eq!(
            serde_json::to_value(&event).unwrap(),
            json!({"type": "artifact_start", "artifact_id": "A1", "artifact_type": "visual"})
        );

        let parsed: LlmEvent =
            serde_json::from_str(r#"{"type":"text_delta","content":"hi"}"#).unwrap();
        assert_eq!(parsed, LlmEvent::TextDelta { content: "hi".into() });
    }

    #[test]
    fn test_provider_selection() {
        assert_eq!(LlmProviderKind::from_config("HTTP"), LlmProviderKind::Http);
        assert_eq!(LlmProviderKind::from_config("openai"), LlmProviderKind::Mock);

        let provider = build_provider(&LlmSettings {
            provider: LlmProviderKind::Http,
            ..Default::default()
        });
        assert_eq!(provider.name(), "http");
        assert_eq!(build_provider(&LlmSettings::default()).name(), "mock");
    }
}
