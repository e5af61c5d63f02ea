//! Routes module - HTTP API endpoints

pub mod artifacts;
pub mod events;
pub mod sessions;
pub mod workspaces;

use axum::Router;
use sqlx::SqlitePool;
use std::sync::Arc;
use std::time::Duration;

use crate::llm::LlmProvider;
use crate::services::{ArtifactService, ExecutionService, SessionService};
use crate::storage::ArtifactStore;
use crate::AuthenticatedUser;

/// Default interval between `/events/stream` heartbeats
pub const DEFAULT_HEARTBEAT_INTERVAL: Duration = Duration::from_secs(10);

/// Shared state for core routes
#[derive(Clone)]
pub struct CoreState {
    pub pool: Arc<SqlitePool>,
    pub artifacts: ArtifactService,
    pub sessions: SessionService,
    pub execution: ExecutionService,
    pub heartbeat_interval: Duration,
}

impl CoreState {
    pub fn new(
        pool: Arc<SqlitePool>,
        store: Arc<dyn ArtifactStore>,
        llm: Arc<dyn LlmProvider>,
    ) -> Self {
        let artifacts = ArtifactService::new(store);
        let sessions = SessionService::new(artifacts.clone());
        let execution = ExecutionService::new(artifacts.clone(), sessions.clone(), llm);
        Self {
            pool,
            artifacts,
            sessions,
            execution,
            heartbeat_interval: DEFAULT_HEARTBEAT_INTERVAL,
        }
    }

    pub fn with_heartbeat_interval(mut self, interval: Duration) -> Self {
        self.heartbeat_interval = interval;
        self
    }
}

/// Bearer token of the caller, forwarded to external artifact stores
pub(crate) fn caller_token(user: &Option<axum::Extension<AuthenticatedUser>>) -> Option<&str> {
    user.as_ref().and_then(|u| u.0.token())
}

/// Configure all core routes (unprefixed)
pub fn configure_routes(state: CoreState) -> Router {
    Router::new()
        .merge(workspaces::routes(state.clone()))
        .merge(sessions::routes(state.clone()))
        .merge(artifacts::routes(state.clone()))
        .merge(events::routes(state))
}
