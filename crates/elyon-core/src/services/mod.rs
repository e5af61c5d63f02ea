//! Services module - business logic layer

pub mod artifact_service;
pub mod execution_service;
pub mod session_service;
pub mod user_service;
pub mod workspace_service;

pub use artifact_service::{ArtifactService, GeneratedArtifact, DEFAULT_SESSION_ID};
pub use execution_service::{ChatStreamEvent, ExecutionService};
pub use session_service::{SessionService, DEFAULT_WORKSPACE_ID};
pub use user_service::{UserService, ADMIN_USER_ID};
pub use workspace_service::WorkspaceService;
