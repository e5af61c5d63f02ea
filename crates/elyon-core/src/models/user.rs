//! User and workspace membership models

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Workspace member role
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum MemberRole {
    Owner,
    Editor,
    #[default]
    Viewer,
}

impl std::fmt::Display for MemberRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MemberRole::Owner => write!(f, "OWNER"),
            MemberRole::Editor => write!(f, "EDITOR"),
            MemberRole::Viewer => write!(f, "VIEWER"),
        }
    }
}

impl std::str::FromStr for MemberRole {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_uppercase().as_str() {
            "OWNER" => Ok(MemberRole::Owner),
            "EDITOR" => Ok(MemberRole::Editor),
            "VIEWER" => Ok(MemberRole::Viewer),
            _ => Err(format!("Invalid member role: {}", s)),
        }
    }
}

/// Workspace membership
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkspaceMember {
    pub workspace_id: String,
    pub user_id: i64,
    pub role: MemberRole,
}

/// Local user record
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    pub id: i64,
    pub user_id: String,
    pub profile: Map<String, Value>,
    pub enabled: bool,
    pub active_workspace_id: Option<String>,
    #[serde(default)]
    pub memberships: Vec<WorkspaceMember>,
}

/// Identity reported by an auth provider, before it is synced locally
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserIdentity {
    pub user_id: String,
    #[serde(default)]
    pub profile: Map<String, Value>,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
}

fn default_enabled() -> bool {
    true
}

impl UserIdentity {
    pub fn new(user_id: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
            profile: Map::new(),
            enabled: true,
        }
    }

    pub fn with_name(mut self, name: &str) -> Self {
        self.profile
            .insert("name".to_string(), Value::String(name.to_string()));
        self
    }
}
