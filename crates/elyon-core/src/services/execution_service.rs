//! Execution service - chat turns and slash commands
//!
//! A chat turn saves the user message, streams the LLM provider, persists any
//! artifacts it produced and saves the assistant reply. Commands are mocked
//! and produce canned artifacts.

use futures::stream::{BoxStream, StreamExt};
use rand::Rng;
use serde::Serialize;
use serde_json::{json, Map, Value};
use sqlx::SqlitePool;
use std::sync::Arc;

use super::artifact_service::{ArtifactService, GeneratedArtifact};
use super::session_service::{SessionService, DEFAULT_WORKSPACE_ID};
use crate::error::ElyonResult;
use crate::llm::{LlmEvent, LlmMessage, LlmProvider, LlmRequest};
use crate::models::{
    Artifact, ChatMessage, ExecutionKind, ExecutionRequest, ExecutionResponse, ExecutionResult,
    ExecutionStatus, MutationOrigin, MutationStatus,
};

/// Event emitted by a streaming chat turn
#[derive(Debug, Clone, Serialize)]
#[serde(untagged)]
pub enum ChatStreamEvent {
    Llm(LlmEvent),
    Complete(MessageComplete),
    Failed(StreamFailure),
}

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename = "message_complete")]
pub struct MessageComplete {
    pub message: ChatMessage,
}

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename = "error")]
pub struct StreamFailure {
    pub message: String,
}

/// Artifact being assembled from streamed chunks
struct PendingArtifact {
    id: String,
    artifact_type: String,
    metadata: Map<String, Value>,
    chunks: Vec<String>,
}

impl PendingArtifact {
    /// Concatenated chunks as JSON, or the raw text under `raw_content`
    fn payload(&self) -> Value {
        let raw = self.chunks.concat();
        serde_json::from_str(&raw).unwrap_or_else(|_| json!({ "raw_content": raw }))
    }
}

/// Accumulates a provider's output
#[derive(Default)]
struct TurnCollector {
    text: String,
    artifacts: Vec<PendingArtifact>,
}

impl TurnCollector {
    fn push(&mut self, event: &LlmEvent) {
        match event {
            LlmEvent::TextDelta { content } => self.text.push_str(content),
            LlmEvent::ArtifactStart {
                artifact_id,
                artifact_type,
                artifact_metadata,
            } => {
                self.artifacts.retain(|a| &a.id != artifact_id);
                self.artifacts.push(PendingArtifact {
                    id: artifact_id.clone(),
                    artifact_type: artifact_type.clone(),
                    metadata: artifact_metadata.clone().unwrap_or_default(),
                    chunks: Vec::new(),
                });
            }
            LlmEvent::ArtifactChunk { artifact_id, chunk } => {
                if let Some(pending) = self.artifacts.iter_mut().find(|a| &a.id == artifact_id) {
                    pending.chunks.push(chunk.clone());
                }
            }
            LlmEvent::ArtifactEnd { .. } => {}
        }
    }
}

/// Execution service
#[derive(Clone)]
pub struct ExecutionService {
    artifacts: ArtifactService,
    sessions: SessionService,
    llm: Arc<dyn LlmProvider>,
}

impl ExecutionService {
    pub fn new(artifacts: ArtifactService, sessions: SessionService, llm: Arc<dyn LlmProvider>) -> Self {
        Self {
            artifacts,
            sessions,
            llm,
        }
    }

    /// Run a chat turn or a command
    pub async fn execute(
        &self,
        pool: &SqlitePool,
        request: &ExecutionRequest,
        token: Option<&str>,
    ) -> ElyonResult<ExecutionResponse> {
        let result = match request.kind() {
            ExecutionKind::Chat => self.execute_chat(pool, request, token).await?,
            ExecutionKind::Command => self.execute_command(pool, request).await?,
            ExecutionKind::Unsupported => {
                return Ok(ExecutionResponse {
                    success: false,
                    message: Some("Unsupported execution type".to_string()),
                    result: None,
                });
            }
        };

        Ok(ExecutionResponse {
            success: true,
            message: None,
            result: Some(result),
        })
    }

    async fn ensure_session(&self, pool: &SqlitePool, session_id: &str, prefix: &str) -> ElyonResult<()> {
        if self.sessions.find_session(pool, session_id, None).await?.is_none() {
            let short: String = session_id.chars().take(8).collect();
            self.sessions
                .create_session(pool, session_id, &format!("{} {}", prefix, short), DEFAULT_WORKSPACE_ID)
                .await?;
        }
        Ok(())
    }

    /// Everything up to the provider call: session, context, user message
    async fn begin_chat(
        &self,
        pool: &SqlitePool,
        request: &ExecutionRequest,
        token: Option<&str>,
    ) -> ElyonResult<LlmRequest> {
        self.ensure_session(pool, &request.session_id, "Chat").await?;

        let context = if request.referenced_artifact_ids.is_empty() {
            Vec::new()
        } else {
            self.artifacts
                .get_many(pool, &request.referenced_artifact_ids, token)
                .await?
        };

        let action = request.action.clone().unwrap_or_default();
        self.sessions
            .save_message(pool, &request.session_id, "user", &action, &context)
            .await?;

        Ok(LlmRequest {
            session_id: request.session_id.clone(),
            messages: vec![LlmMessage {
                role: "user".to_string(),
                content: action,
                artifacts: context.clone(),
            }],
            context_artifacts: context,
        })
    }

    /// Persist generated artifacts and the assistant reply
    async fn finish_chat(
        &self,
        pool: &SqlitePool,
        request: &ExecutionRequest,
        collected: TurnCollector,
    ) -> ElyonResult<ChatMessage> {
        let origin = MutationOrigin::ChatInference {
            session_id: Some(request.session_id.clone()),
            prompt: request.action.clone(),
            triggering_command: Some("chat".to_string()),
        };

        let mut created = Vec::with_capacity(collected.artifacts.len());
        for pending in &collected.artifacts {
            let generated = GeneratedArtifact {
                id: pending.id.clone(),
                artifact_type: pending.artifact_type.clone(),
                payload: pending.payload(),
                metadata: pending.metadata.clone(),
                session_id: request.session_id.clone(),
                workspace_id: None,
            };
            let artifact = self
                .artifacts
                .create_generated(pool, &generated, &origin, "Generated by LLM", MutationStatus::Committed)
                .await?;
            created.push(artifact);
        }

        self.sessions
            .save_message(pool, &request.session_id, "assistant", &collected.text, &created)
            .await
    }

    async fn execute_chat(
        &self,
        pool: &SqlitePool,
        request: &ExecutionRequest,
        token: Option<&str>,
    ) -> ElyonResult<ExecutionResult> {
        let llm_request = self.begin_chat(pool, request, token).await?;

        let mut events = self.llm.generate_stream(llm_request).await?;
        let mut collected = TurnCollector::default();
        while let Some(event) = events.next().await {
            collected.push(&event);
        }

        let message = self.finish_chat(pool, request, collected).await?;
        tracing::info!(session_id = %request.session_id, "Chat turn completed");

        Ok(ExecutionResult {
            output_message: Some(message),
            new_artifacts: None,
            status: ExecutionStatus::Success,
            metadata: Some(json!({ "session_id": request.session_id })),
        })
    }

    /// Chat turn whose provider events are forwarded as they arrive.
    ///
    /// The stream ends with `message_complete` carrying the assistant reply,
    /// or with an `error` event when the turn fails.
    pub fn execute_chat_stream(
        &self,
        pool: SqlitePool,
        request: ExecutionRequest,
        token: Option<String>,
    ) -> BoxStream<'static, ChatStreamEvent> {
        let service = self.clone();
        let stream = async_stream::stream! {
            let llm_request = match service.begin_chat(&pool, &request, token.as_deref()).await {
                Ok(r) => r,
                Err(e) => {
                    tracing::error!("Failed to start chat turn: {}", e);
                    yield ChatStreamEvent::Failed(StreamFailure { message: e.to_string() });
                    return;
                }
            };

            let mut events = match service.llm.generate_stream(llm_request).await {
                Ok(events) => events,
                Err(e) => {
                    tracing::error!("LLM provider failed: {}", e);
                    yield ChatStreamEvent::Failed(StreamFailure { message: e.to_string() });
                    return;
                }
            };

            let mut collected = TurnCollector::default();
            while let Some(event) = events.next().await {
                collected.push(&event);
                yield ChatStreamEvent::Llm(event);
            }

            match service.finish_chat(&pool, &request, collected).await {
                Ok(message) => yield ChatStreamEvent::Complete(MessageComplete { message }),
                Err(e) => {
                    tracing::error!("Failed to persist chat turn: {}", e);
                    yield ChatStreamEvent::Failed(StreamFailure { message: e.to_string() });
                }
            }
        };
        stream.boxed()
    }

    async fn execute_command(
        &self,
        pool: &SqlitePool,
        request: &ExecutionRequest,
    ) -> ElyonResult<ExecutionResult> {
        self.ensure_session(pool, &request.session_id, "Cmd").await?;

        let command_name = request.command_name.clone().unwrap_or_default();
        let command = command_name.to_lowercase();
        let suffix = rand::thread_rng().gen_range(1000..=9999);

        let generated = match command.as_str() {
            "plot" => Some((
                format!("A_PLOT_{}", suffix),
                "visual",
                json!({
                    "format": "svg",
                    "url": "data:image/svg+xml,<svg>Mock plot</svg>",
                    "alt": "Plot",
                }),
            )),
            "run" => {
                let action: String = request
                    .action
                    .as_deref()
                    .unwrap_or_default()
                    .chars()
                    .take(50)
                    .collect();
                Some((
                    format!("A_CODE_{}", suffix),
                    "code",
                    json!({
                        "language": "python",
                        "source": format!("Executed code: {}...", action),
                    }),
                ))
            }
            "optimize" => Some((
                format!("A_OPT_{}", suffix),
                "code",
                json!({
                    "language": "python",
                    "source": "# Optimized Code\nprint('Hello Optimized World')",
                }),
            )),
            _ => None,
        };

        let (status, text) = if generated.is_some() {
            (ExecutionStatus::Success, format!("Command {} executed successfully.", command))
        } else {
            (ExecutionStatus::Error, format!("Unknown command: {}", command))
        };

        let mut created: Vec<Artifact> = Vec::new();
        if let Some((id, artifact_type, payload)) = generated {
            let origin = MutationOrigin::AdhocCommand {
                session_id: Some(request.session_id.clone()),
                prompt: request.action.clone(),
                triggering_command: Some(format!("/{}", command_name)),
            };
            // optimize proposes its result as a preview
            let mutation_status = if command == "optimize" {
                MutationStatus::Ghost
            } else {
                MutationStatus::Committed
            };
            let artifact = self
                .artifacts
                .create_generated(
                    pool,
                    &GeneratedArtifact {
                        id,
                        artifact_type: artifact_type.to_string(),
                        payload,
                        metadata: Map::new(),
                        session_id: request.session_id.clone(),
                        workspace_id: None,
                    },
                    &origin,
                    "Initial creation",
                    mutation_status,
                )
                .await?;
            created.push(artifact);
        }

        let role = if status == ExecutionStatus::Success {
            "assistant"
        } else {
            "system"
        };
        let message = self
            .sessions
            .save_message(pool, &request.session_id, role, &text, &created)
            .await?;

        tracing::info!(session_id = %request.session_id, command = %command, status = ?status, "Command executed");

        Ok(ExecutionResult {
            new_artifacts: Some(message.artifacts.clone()),
            output_message: Some(message),
            status,
            metadata: Some(json!({ "session_id": request.session_id })),
        })
    }
}
