//! Canned provider for development and tests

use async_trait::async_trait;
use futures::stream::{self, BoxStream, StreamExt};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde_json::{json, Map, Value};
use std::sync::Mutex;

use super::{LlmError, LlmEvent, LlmProvider, LlmRequest};

const PHRASES: [&str; 4] = [
    "I've analyzed the referenced artifacts.",
    " Based on the context you provided,",
    " I recommend looking at these data points.",
    " Could you clarify which part of the artifact you're most interested in?",
];

const CHUNK_SIZE: usize = 10;

/// Mock provider with random phrase selection and an occasional plot
pub struct MockProvider {
    rng: Mutex<StdRng>,
    phrase_probability: f64,
    plot_probability: f64,
}

impl MockProvider {
    pub fn new() -> Self {
        Self::from_rng(StdRng::from_entropy())
    }

    /// Deterministic output for a given seed
    pub fn seeded(seed: u64) -> Self {
        Self::from_rng(StdRng::seed_from_u64(seed))
    }

    fn from_rng(rng: StdRng) -> Self {
        Self {
            rng: Mutex::new(rng),
            phrase_probability: 0.5,
            plot_probability: 0.3,
        }
    }

    /// Override the chance of each optional phrase and of the plot
    pub fn with_probabilities(mut self, phrase: f64, plot: f64) -> Self {
        self.phrase_probability = phrase;
        self.plot_probability = plot;
        self
    }

    fn script(&self, request: &LlmRequest) -> Vec<LlmEvent> {
        let mut rng = self.rng.lock().unwrap_or_else(|e| e.into_inner());
        let mut events = Vec::new();

        if !request.context_artifacts.is_empty() {
            let refs = request
                .context_artifacts
                .iter()
                .map(|a| format!("@[{}]", a.id))
                .collect::<Vec<_>>()
                .join(", ");
            events.push(LlmEvent::TextDelta {
                content: format!("**Context Received**: I'm now processing {}. \n\n", refs),
            });
        }

        events.push(LlmEvent::TextDelta {
            content: PHRASES[0].to_string(),
        });
        for phrase in &PHRASES[1..] {
            if rng.gen::<f64>() < self.phrase_probability {
                events.push(LlmEvent::TextDelta {
                    content: phrase.to_string(),
                });
            }
        }

        if rng.gen::<f64>() < self.plot_probability {
            let artifact_id = format!("A_PLOT_{}", rng.gen_range(1000..=9999));
            let mut metadata = Map::new();
            metadata.insert("alt".to_string(), Value::String("Plot".to_string()));
            events.push(LlmEvent::ArtifactStart {
                artifact_id: artifact_id.clone(),
                artifact_type: "visual".to_string(),
                artifact_metadata: Some(metadata),
            });

            let payload = json!({
                "format": "svg",
                "url": format!("data:image/svg+xml,<svg>Mock plot {}</svg>", artifact_id),
                "alt": "Plot",
            })
            .to_string();
            let chars: Vec<char> = payload.chars().collect();
            for chunk in chars.chunks(CHUNK_SIZE) {
                events.push(LlmEvent::ArtifactChunk {
                    artifact_id: artifact_id.clone(),
                    chunk: chunk.iter().collect(),
                });
            }
            events.push(LlmEvent::ArtifactEnd { artifact_id });
        }

        events
    }
}

impl Default for MockProvider {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl LlmProvider for MockProvider {
    fn name(&self) -> &'static str {
        "mock"
    }

    async fn generate_stream(
        &self,
        request: LlmRequest,
    ) -> Result<BoxStream<'static, LlmEvent>, LlmError> {
        Ok(stream::iter(self.script(&request)).boxed())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Artifact;

    fn request(context: Vec<Artifact>) -> LlmRequest {
        LlmRequest {
            session_id: "S1".into(),
            messages: Vec::new(),
            context_artifacts: context,
        }
    }

    fn artifact(id: &str) -> Artifact {
        Artifact {
            id: id.into(),
            artifact_type: "code".into(),
            name: String::new(),
            payload: None,
            metadata: Map::new(),
            session_id: None,
            workspace_id: None,
            storage_backend: "db".into(),
            storage_key: None,
            created_at: chrono::Utc::now(),
            mutations: Vec::new(),
        }
    }

    #[tokio::test]
    async fn test_minimal_output() {
        let provider = MockProvider::seeded(7).with_probabilities(0.0, 0.0);
        let events: Vec<_> = provider
            .generate_stream(request(Vec::new()))
            .await
            .unwrap()
            .collect()
            .await;
        assert_eq!(
            events,
            vec![LlmEvent::TextDelta {
                content: PHRASES[0].into()
            }]
        );
    }

    #[tokio::test]
    async fn test_context_and_plot() {
        let provider = MockProvider::seeded(7).with_probabilities(1.0, 1.0);
        let events: Vec<_> = provider
            .generate_stream(request(vec![artifact("A1"), artifact("A2")]))
            .await
            .unwrap()
            .collect()
            .await;

        assert_eq!(
            events[0],
            LlmEvent::TextDelta {
                content: "**Context Received**: I'm now processing @[A1], @[A2]. \n\n".into()
            }
        );
        // context + 4 phrases, then the plot
        let LlmEvent::ArtifactStart { artifact_id, .. } = &events[5] else {
            panic!("expected artifact_start, got {:?}", events[5]);
        };
        assert!(artifact_id.starts_with("A_PLOT_"));

        let payload: String = events
            .iter()
            .filter_map(|e| match e {
                LlmEvent::ArtifactChunk { chunk, .. } => {
                    assert!(chunk.chars().count() <= CHUNK_SIZE);
                    Some(chunk.as_str())
                }
                _ => None,
            })
            .collect();
        let payload: Value = serde_json::from_str(&payload).unwrap();
        assert_eq!(payload["format"], "svg");
        assert!(matches!(events.last(), Some(LlmEvent::ArtifactEnd { .. })));
    }

    #[tokio::test]
    async fn test_same_seed_same_output() {
        let a = MockProvider::seeded(42);
        let b = MockProvider::seeded(42);
        let first: Vec<_> = a.generate_stream(request(Vec::new())).await.unwrap().collect().await;
        let second: Vec<_> = b.generate_stream(request(Vec::new())).await.unwrap().collect().await;
        assert_eq!(first, second);
    }
}
