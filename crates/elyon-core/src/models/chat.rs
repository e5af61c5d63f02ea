//! Chat session and execution models

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::Artifact;

/// Chat message as exposed to clients
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    pub id: String,
    pub session_id: String,
    pub role: String,
    pub content: String,
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub artifacts: Vec<Artifact>,
}

/// Message as stored inside a chat artifact payload
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoredMessage {
    pub id: String,
    pub role: String,
    pub content: String,
    pub created_at: String,
    #[serde(default)]
    pub artifact_ids: Vec<String>,
}

/// Chat session view of a `chat` artifact
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatSession {
    pub id: String,
    pub name: String,
    pub workspace_id: String,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub messages: Vec<ChatMessage>,
}

/// Update session request
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ChatSessionUpdate {
    pub name: Option<String>,
    pub is_active: Option<bool>,
}

/// Execution kind
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExecutionKind {
    Chat,
    Command,
    Unsupported,
}

impl From<&str> for ExecutionKind {
    fn from(s: &str) -> Self {
        match s.to_lowercase().as_str() {
            "chat" => ExecutionKind::Chat,
            "command" => ExecutionKind::Command,
            _ => ExecutionKind::Unsupported,
        }
    }
}

/// Chat or command execution request
#[derive(Debug, Clone, Deserialize)]
pub struct ExecutionRequest {
    #[serde(rename = "type")]
    pub kind: String,
    pub session_id: String,
    #[serde(default)]
    pub command_name: Option<String>,
    #[serde(default)]
    pub args: Option<Vec<String>>,
    #[serde(default)]
    pub action: Option<String>,
    #[serde(default)]
    pub referenced_artifact_ids: Vec<String>,
    #[serde(default)]
    pub stream: bool,
}

impl ExecutionRequest {
    pub fn kind(&self) -> ExecutionKind {
        ExecutionKind::from(self.kind.as_str())
    }
}

/// Execution status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExecutionStatus {
    #[default]
    Success,
    Error,
    Warning,
}

/// Execution outcome
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionResult {
    pub output_message: Option<ChatMessage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub new_artifacts: Option<Vec<Artifact>>,
    pub status: ExecutionStatus,
    pub metadata: Option<Value>,
}

/// Execution response envelope
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionResponse {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    pub result: Option<ExecutionResult>,
}
