//! Session service - chat sessions stored as `chat` artifacts
//!
//! The message list is the chat artifact's payload. Every appended message
//! becomes a new committed version in the artifact's mutation chain.

use serde_json::{json, Map, Value};
use sqlx::SqlitePool;
use std::collections::HashMap;
use uuid::Uuid;

use super::artifact_service::{
    insert_artifact, insert_mutation, latest_version_id, next_version_id, ArtifactService,
    NewArtifact, NewMutation,
};
use crate::error::{ElyonError, ElyonResult};
use crate::models::{
    Artifact, ChatMessage, ChatSession, MutationOrigin, MutationStatus, StoredMessage,
};
use crate::storage::{StorageBackend, DB_STORAGE_KEY};
use crate::{now_rfc3339, parse_rfc3339};

/// Workspace sessions land in when none is given
pub const DEFAULT_WORKSPACE_ID: &str = "default_workspace";

/// Artifact type backing a chat session
pub const CHAT_ARTIFACT_TYPE: &str = "chat";

/// Session service
#[derive(Clone)]
pub struct SessionService {
    artifacts: ArtifactService,
}

impl SessionService {
    pub fn new(artifacts: ArtifactService) -> Self {
        Self { artifacts }
    }

    /// Sessions of a workspace; child artifacts are not resolved
    pub async fn get_sessions(
        &self,
        pool: &SqlitePool,
        workspace_id: &str,
    ) -> ElyonResult<Vec<ChatSession>> {
        let ids: Vec<(String,)> = sqlx::query_as(
            "SELECT id FROM artifacts WHERE workspace_id = ? AND type = ? ORDER BY created_at ASC",
        )
        .bind(workspace_id)
        .bind(CHAT_ARTIFACT_TYPE)
        .fetch_all(pool)
        .await?;

        let mut sessions = Vec::with_capacity(ids.len());
        for (id,) in ids {
            if let Some(artifact) = self.artifacts.find_artifact(pool, &id, None).await? {
                sessions.push(map_artifact_to_session(&artifact, None));
            }
        }
        Ok(sessions)
    }

    /// A session with each message's artifacts resolved
    pub async fn find_session(
        &self,
        pool: &SqlitePool,
        session_id: &str,
        token: Option<&str>,
    ) -> ElyonResult<Option<ChatSession>> {
        let Some(artifact) = self.find_chat_artifact(pool, session_id, token).await? else {
            return Ok(None);
        };

        let children: HashMap<String, Artifact> = self
            .artifacts
            .list_session_artifacts(pool, session_id, token)
            .await?
            .into_iter()
            .map(|a| (a.id.clone(), a))
            .collect();

        Ok(Some(map_artifact_to_session(&artifact, Some(&children))))
    }

    pub async fn get_session(
        &self,
        pool: &SqlitePool,
        session_id: &str,
        token: Option<&str>,
    ) -> ElyonResult<ChatSession> {
        self.find_session(pool, session_id, token)
            .await?
            .ok_or_else(|| ElyonError::SessionNotFound(session_id.to_string()))
    }

    async fn find_chat_artifact(
        &self,
        pool: &SqlitePool,
        session_id: &str,
        token: Option<&str>,
    ) -> ElyonResult<Option<Artifact>> {
        Ok(self
            .artifacts
            .find_artifact(pool, session_id, token)
            .await?
            .filter(|a| a.artifact_type == CHAT_ARTIFACT_TYPE))
    }

    /// Create an empty chat session with its `v1` mutation
    pub async fn create_session(
        &self,
        pool: &SqlitePool,
        session_id: &str,
        name: &str,
        workspace_id: &str,
    ) -> ElyonResult<ChatSession> {
        let mut metadata = Map::new();
        metadata.insert("name".to_string(), json!(name));
        metadata.insert("is_active".to_string(), json!(true));
        let payload = json!([]);
        let origin = MutationOrigin::Creation {
            session_id: Some(session_id.to_string()),
        };

        let mut tx = pool.begin().await?;
        insert_artifact(
            &mut tx,
            &NewArtifact {
                id: session_id,
                artifact_type: CHAT_ARTIFACT_TYPE,
                metadata: &metadata,
                payload: Some(&payload),
                // Root chats are not owned by another session
                session_id: None,
                workspace_id: Some(workspace_id),
                storage_backend: StorageBackend::Db,
                storage_key: Some(DB_STORAGE_KEY),
            },
        )
        .await?;
        insert_mutation(
            &mut tx,
            &NewMutation {
                artifact_id: session_id,
                version_id: "v1",
                parent_id: None,
                origin: &origin,
                change_summary: "Chat created",
                payload: &payload,
                status: MutationStatus::Committed,
            },
        )
        .await?;
        tx.commit().await?;

        tracing::info!(session_id = %session_id, workspace_id = %workspace_id, "Chat session created");
        self.get_session(pool, session_id, None).await
    }

    /// Append a message to a session's transcript
    pub async fn save_message(
        &self,
        pool: &SqlitePool,
        session_id: &str,
        role: &str,
        content: &str,
        artifacts: &[Artifact],
    ) -> ElyonResult<ChatMessage> {
        let chat = self
            .find_chat_artifact(pool, session_id, None)
            .await?
            .ok_or_else(|| ElyonError::SessionNotFound(session_id.to_string()))?;

        let mut messages = match chat.payload {
            Some(Value::Array(items)) => items,
            _ => Vec::new(),
        };

        let created_at = now_rfc3339();
        let stored = StoredMessage {
            id: Uuid::new_v4().to_string(),
            role: role.to_string(),
            content: content.to_string(),
            created_at: created_at.clone(),
            artifact_ids: artifacts.iter().map(|a| a.id.clone()).collect(),
        };
        messages.push(serde_json::to_value(&stored)?);
        let payload = Value::Array(messages);
        let origin = MutationOrigin::ChatMessage {
            session_id: Some(session_id.to_string()),
            role: role.to_string(),
        };

        let mut tx = pool.begin().await?;
        let parent_id = latest_version_id(&mut tx, session_id).await?;
        let version_id = next_version_id(parent_id.as_deref());

        // Transcripts always live in the row
        sqlx::query(
            "UPDATE artifacts SET payload_json = ?, storage_backend = ?, storage_key = ? WHERE id = ?",
        )
        .bind(payload.to_string())
        .bind(StorageBackend::Db.as_str())
        .bind(DB_STORAGE_KEY)
        .bind(session_id)
        .execute(&mut *tx)
        .await?;

        insert_mutation(
            &mut tx,
            &NewMutation {
                artifact_id: session_id,
                version_id: &version_id,
                parent_id: parent_id.as_deref(),
                origin: &origin,
                change_summary: &format!("Message from {}", role),
                payload: &payload,
                status: MutationStatus::Committed,
            },
        )
        .await?;
        tx.commit().await?;

        Ok(ChatMessage {
            id: stored.id,
            session_id: session_id.to_string(),
            role: stored.role,
            content: stored.content,
            created_at: parse_rfc3339(&created_at),
            artifacts: artifacts
                .iter()
                .cloned()
                .map(|mut a| {
                    a.mutations.clear();
                    a
                })
                .collect(),
        })
    }

    /// Rename or (de)activate a session; metadata is updated in place
    pub async fn update_session(
        &self,
        pool: &SqlitePool,
        session_id: &str,
        name: Option<String>,
        is_active: Option<bool>,
    ) -> ElyonResult<ChatSession> {
        let chat = self
            .find_chat_artifact(pool, session_id, None)
            .await?
            .ok_or_else(|| ElyonError::SessionNotFound(session_id.to_string()))?;

        let mut metadata = chat.metadata;
        if let Some(name) = name {
            metadata.insert("name".to_string(), Value::String(name));
        }
        if let Some(is_active) = is_active {
            metadata.insert("is_active".to_string(), Value::Bool(is_active));
        }

        sqlx::query("UPDATE artifacts SET metadata_json = ? WHERE id = ?")
            .bind(Value::Object(metadata).to_string())
            .bind(session_id)
            .execute(pool)
            .await?;

        self.get_session(pool, session_id, None).await
    }
}

/// Build the session view of a chat artifact.
///
/// With `children`, each message's `artifact_ids` are resolved against it;
/// unknown ids are dropped.
pub fn map_artifact_to_session(
    artifact: &Artifact,
    children: Option<&HashMap<String, Artifact>>,
) -> ChatSession {
    let raw_messages = match &artifact.payload {
        Some(Value::Array(items)) => items.as_slice(),
        _ => &[],
    };

    let messages = raw_messages
        .iter()
        .map(|m| {
            let artifacts = match (children, m.get("artifact_ids").and_then(Value::as_array)) {
                (Some(children), Some(ids)) => ids
                    .iter()
                    .filter_map(Value::as_str)
                    .filter_map(|id| children.get(id).cloned())
                    .collect(),
                _ => Vec::new(),
            };

            ChatMessage {
                id: m
                    .get("id")
                    .and_then(Value::as_str)
                    .map(str::to_string)
                    .unwrap_or_else(|| Uuid::new_v4().to_string()),
                session_id: artifact.id.clone(),
                role: m
                    .get("role")
                    .and_then(Value::as_str)
                    .unwrap_or("unknown")
                    .to_string(),
                content: m
                    .get("content")
                    .and_then(Value::as_str)
                    .unwrap_or_default()
                    .to_string(),
                created_at: m
                    .get("created_at")
                    .and_then(Value::as_str)
                    .and_then(parse_rfc3339),
                artifacts,
            }
        })
        .collect();

    ChatSession {
        id: artifact.id.clone(),
        name: artifact
            .metadata
            .get("name")
            .and_then(Value::as_str)
            .unwrap_or("Untitled Chat")
            .to_string(),
        workspace_id: artifact
            .workspace_id
            .clone()
            .unwrap_or_else(|| "unknown".to_string()),
        is_active: artifact
            .metadata
            .get("is_active")
            .and_then(Value::as_bool)
            .unwrap_or(true),
        created_at: artifact.created_at,
        messages,
    }
}
