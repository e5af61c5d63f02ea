//! Artifact and mutation record models

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Where a mutation came from.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case", rename_all_fields = "camelCase")]
pub enum MutationOrigin {
    ManualEdit {
        #[serde(default)]
        session_id: Option<String>,
    },
    ChatInference {
        #[serde(default)]
        session_id: Option<String>,
        #[serde(default)]
        prompt: Option<String>,
        #[serde(default)]
        triggering_command: Option<String>,
    },
    AdhocCommand {
        #[serde(default)]
        session_id: Option<String>,
        #[serde(default)]
        prompt: Option<String>,
        #[serde(default)]
        triggering_command: Option<String>,
    },
    ChatMessage {
        #[serde(default)]
        session_id: Option<String>,
        role: String,
    },
    Creation {
        #[serde(default)]
        session_id: Option<String>,
    },
}

impl MutationOrigin {
    pub fn manual_edit(session_id: Option<&str>) -> Self {
        MutationOrigin::ManualEdit {
            session_id: session_id.map(str::to_string),
        }
    }

    pub fn session_id(&self) -> Option<&str> {
        match self {
            MutationOrigin::ManualEdit { session_id }
            | MutationOrigin::ChatInference { session_id, .. }
            | MutationOrigin::AdhocCommand { session_id, .. }
            | MutationOrigin::ChatMessage { session_id, .. }
            | MutationOrigin::Creation { session_id } => session_id.as_deref(),
        }
    }
}

/// Mutation status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MutationStatus {
    #[default]
    Committed,
    /// Speculative preview edit that has not been applied to the artifact
    Ghost,
}

impl std::fmt::Display for MutationStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MutationStatus::Committed => write!(f, "committed"),
            MutationStatus::Ghost => write!(f, "ghost"),
        }
    }
}

impl std::str::FromStr for MutationStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "committed" => Ok(MutationStatus::Committed),
            "ghost" => Ok(MutationStatus::Ghost),
            _ => Err(format!("Invalid mutation status: {}", s)),
        }
    }
}

/// Immutable entry in an artifact's version chain
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MutationRecord {
    pub id: i64,
    pub artifact_id: String,
    pub version_id: String,
    pub parent_id: Option<String>,
    pub timestamp: DateTime<Utc>,
    pub origin: MutationOrigin,
    pub change_summary: Option<String>,
    pub payload: Value,
    pub checksum: Option<String>,
    pub status: MutationStatus,
}

/// Artifact entity
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Artifact {
    pub id: String,
    #[serde(rename = "type")]
    pub artifact_type: String,
    pub name: String,
    pub payload: Option<Value>,
    pub metadata: Map<String, Value>,
    pub session_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub workspace_id: Option<String>,
    pub storage_backend: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub storage_key: Option<String>,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub mutations: Vec<MutationRecord>,
}

impl Artifact {
    /// Display name carried in metadata
    pub fn name_from_metadata(metadata: &Map<String, Value>) -> String {
        metadata
            .get("name")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string()
    }

    pub fn latest_mutation(&self) -> Option<&MutationRecord> {
        self.mutations.last()
    }
}

/// Create (or upsert) an artifact
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ArtifactCreate {
    pub id: Option<String>,
    #[serde(rename = "type")]
    pub artifact_type: String,
    pub name: String,
    #[serde(default)]
    pub payload: Option<Value>,
    #[serde(default, alias = "artifact_metadata")]
    pub metadata: Option<Map<String, Value>>,
    #[serde(default)]
    pub session_id: Option<String>,
    #[serde(default)]
    pub workspace_id: Option<String>,
}

/// Partial artifact update
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ArtifactUpdate {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub payload: Option<Value>,
    #[serde(default, alias = "artifact_metadata")]
    pub metadata: Option<Map<String, Value>>,
}

/// Speculative mutation proposed by a caller
#[derive(Debug, Clone, Deserialize)]
pub struct GhostMutationCreate {
    pub version_id: String,
    #[serde(default)]
    pub parent_id: Option<String>,
    pub payload: Value,
    pub origin: MutationOrigin,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_origin_wire_format() {
        let origin = MutationOrigin::ChatInference {
            session_id: Some("S1".into()),
            prompt: Some("draw".into()),
            triggering_command: Some("chat".into()),
        };
        let value = serde_json::to_value(&origin).unwrap();
        assert_eq!(
            value,
            json!({
                "type": "chat_inference",
                "sessionId": "S1",
                "prompt": "draw",
                "triggeringCommand": "chat"
            })
        );

        let parsed: MutationOrigin =
            serde_json::from_value(json!({"type": "manual_edit"})).unwrap();
        assert_eq!(parsed, MutationOrigin::ManualEdit { session_id: None });
    }

    #[test]
    fn test_create_accepts_metadata_alias() {
        let req: ArtifactCreate = serde_json::from_value(json!({
            "type": "code",
            "name": "main.py",
            "artifact_metadata": {"lang": "python"}
        }))
        .unwrap();
        assert_eq!(req.metadata.unwrap()["lang"], "python");
        assert!(req.id.is_none());
    }

    #[test]
    fn test_status_parse() {
        assert_eq!("GHOST".parse::<MutationStatus>().unwrap(), MutationStatus::Ghost);
        assert!("draft".parse::<MutationStatus>().is_err());
    }
}
