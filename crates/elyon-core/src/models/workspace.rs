//! Workspace model

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

/// Layout state stored for a fresh workspace
pub fn default_workspace_state() -> Value {
    json!({"panes": [], "visibleIds": []})
}

/// Workspace entity
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Workspace {
    pub id: String,
    pub name: String,
    pub state: Value,
    pub is_archived: bool,
    pub updated_at: DateTime<Utc>,
}

/// Create workspace request
#[derive(Debug, Clone, Deserialize)]
pub struct WorkspaceCreate {
    pub name: String,
    #[serde(default = "default_workspace_state")]
    pub state: Value,
    #[serde(default)]
    pub is_archived: bool,
}

/// Update workspace request; absent fields are left untouched
#[derive(Debug, Clone, Default, Deserialize)]
pub struct WorkspaceUpdate {
    pub name: Option<String>,
    pub state: Option<Value>,
    pub is_archived: Option<bool>,
}

/// Pane snapshot removed from a workspace layout
#[derive(Debug, Clone, Serialize)]
pub struct ArchivedPane {
    pub id: String,
    pub workspace_id: String,
    pub user_id: Option<i64>,
    pub pane_data: Value,
    pub archived_at: DateTime<Utc>,
}

/// Response for workspace deletion
#[derive(Debug, Serialize)]
pub struct DeleteWorkspaceResponse {
    pub status: String,
}
