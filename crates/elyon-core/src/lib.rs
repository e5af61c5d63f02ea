//! Elyon core module
//!
//! Workspaces, chat sessions and artifacts for the Elyon authoring backend.
//!
//! # Features
//! - Workspace management with per-user memberships
//! - Chat sessions stored as `chat` artifacts
//! - Artifact versioning with an append-only mutation log
//! - Pluggable payload storage (database, filesystem, object storage, remote HTTP)
//! - Mock and HTTP-backed LLM providers for chat execution

pub mod error;
pub mod llm;
pub mod migrations;
pub mod models;
pub mod routes;
pub mod services;
pub mod storage;

pub use error::{ElyonError, ElyonResult};
pub use storage::{build_store, ArtifactStore, StorageBackend, StorageSettings};

/// Authenticated user from auth middleware
#[derive(Clone, Debug)]
pub struct AuthenticatedUser {
    /// Database row id
    pub id: i64,
    /// External user identifier (login name)
    pub user_id: String,
    /// Bearer token the request was authenticated with
    pub token: String,
}

impl AuthenticatedUser {
    pub fn token(&self) -> Option<&str> {
        if self.token.is_empty() {
            None
        } else {
            Some(&self.token)
        }
    }
}

/// Current time in the format persisted to TEXT columns.
pub(crate) fn now_rfc3339() -> String {
    chrono::Utc::now().to_rfc3339_opts(chrono::SecondsFormat::Micros, true)
}

pub(crate) fn parse_rfc3339(value: &str) -> Option<chrono::DateTime<chrono::Utc>> {
    chrono::DateTime::parse_from_rfc3339(value)
        .map(|dt| dt.with_timezone(&chrono::Utc))
        .ok()
}
