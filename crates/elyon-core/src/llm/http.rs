//! Remote provider speaking newline-delimited JSON

use async_trait::async_trait;
use futures::stream::{BoxStream, StreamExt};
use std::time::Duration;

use super::{LlmError, LlmEvent, LlmProvider, LlmRequest};

/// Provider that POSTs the request and reads one event per response line
pub struct HttpProvider {
    client: reqwest::Client,
    url: String,
    api_key: Option<String>,
}

impl HttpProvider {
    pub fn new(url: String, api_key: Option<String>) -> Self {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(60))
            .build()
            .unwrap_or_default();
        Self {
            client,
            url,
            api_key: api_key.filter(|k| !k.is_empty()),
        }
    }
}

/// Blank lines and lines that are not a known event are skipped
fn parse_line(line: &[u8]) -> Option<LlmEvent> {
    let line = std::str::from_utf8(line).ok()?.trim();
    if line.is_empty() {
        return None;
    }
    match serde_json::from_str(line) {
        Ok(event) => Some(event),
        Err(e) => {
            tracing::debug!("Skipping undecodable LLM line: {}", e);
            None
        }
    }
}

#[async_trait]
impl LlmProvider for HttpProvider {
    fn name(&self) -> &'static str {
        "http"
    }

    async fn generate_stream(
        &self,
        request: LlmRequest,
    ) -> Result<BoxStream<'static, LlmEvent>, LlmError> {
        let mut builder = self.client.post(&self.url).json(&request);
        if let Some(key) = &self.api_key {
            builder = builder.bearer_auth(key);
        }

        let response = builder.send().await?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(LlmError::Status {
                status: status.as_u16(),
                body,
            });
        }

        let mut body = Box::pin(response.bytes_stream());
        let stream = async_stream::stream! {
            let mut buffer: Vec<u8> = Vec::new();
            while let Some(chunk) = body.next().await {
                match chunk {
                    Ok(bytes) => buffer.extend_from_slice(&bytes),
                    Err(e) => {
                        tracing::warn!("LLM stream interrupted: {}", e);
                        break;
                    }
                }
                while let Some(pos) = buffer.iter().position(|b| *b == b'\n') {
                    let line: Vec<u8> = buffer.drain(..=pos).collect();
                    if let Some(event) = parse_line(&line) {
                        yield event;
                    }
                }
            }
            if let Some(event) = parse_line(&buffer) {
                yield event;
            }
        };

        Ok(stream.boxed())
    }
}
