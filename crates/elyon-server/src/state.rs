//! Application state

use elyon_core::routes::CoreState;
use elyon_core::services::UserService;
use sqlx::SqlitePool;
use std::sync::Arc;

use crate::auth::AuthProvider;
use crate::config::Config;

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    /// Database connection pool
    pub pool: Arc<SqlitePool>,

    /// Server configuration
    pub config: Config,

    /// Services behind the workspace, session and artifact routes
    pub core: CoreState,

    pub users: UserService,

    /// Auth strategy selected at startup
    pub auth: Arc<dyn AuthProvider>,
}

impl AppState {
    pub fn new(config: Config, core: CoreState, auth: Arc<dyn AuthProvider>) -> Self {
        Self {
            pool: core.pool.clone(),
            users: UserService::new(core.sessions.clone()),
            config,
            core,
            auth,
        }
    }
}
