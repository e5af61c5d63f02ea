//! Error types for the core module

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::Serialize;
use thiserror::Error;

use crate::storage::StoreError;

/// Result type alias for core operations
pub type ElyonResult<T> = Result<T, ElyonError>;

/// Core error types
#[derive(Debug, Error)]
pub enum ElyonError {
    #[error("Workspace not found: {0}")]
    WorkspaceNotFound(String),

    #[error("Session not found: {0}")]
    SessionNotFound(String),

    #[error("Artifact not found: {0}")]
    ArtifactNotFound(String),

    #[error("Version not found: {artifact_id} {version_id}")]
    VersionNotFound {
        artifact_id: String,
        version_id: String,
    },

    #[error("User not found: {0}")]
    UserNotFound(String),

    #[error("Permission denied: {action}")]
    PermissionDenied { action: String },

    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Upstream service error: {0}")]
    Upstream(String),

    #[error("Database error: {0}")]
    Database(String),

    #[error("IO error: {0}")]
    Io(String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl From<sqlx::Error> for ElyonError {
    fn from(err: sqlx::Error) -> Self {
        ElyonError::Database(err.to_string())
    }
}

impl From<std::io::Error> for ElyonError {
    fn from(err: std::io::Error) -> Self {
        ElyonError::Io(err.to_string())
    }
}

impl From<serde_json::Error> for ElyonError {
    fn from(err: serde_json::Error) -> Self {
        ElyonError::Serialization(err.to_string())
    }
}

impl From<StoreError> for ElyonError {
    fn from(err: StoreError) -> Self {
        ElyonError::Storage(err.to_string())
    }
}

/// API error response
#[derive(Debug, Serialize)]
pub struct ApiError {
    pub code: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
}

impl ElyonError {
    /// Convert to API error code
    pub fn code(&self) -> &'static str {
        match self {
            ElyonError::WorkspaceNotFound(_) => "WORKSPACE_NOT_FOUND",
            ElyonError::SessionNotFound(_) => "SESSION_NOT_FOUND",
            ElyonError::ArtifactNotFound(_) => "ARTIFACT_NOT_FOUND",
            ElyonError::VersionNotFound { .. } => "VERSION_NOT_FOUND",
            ElyonError::UserNotFound(_) => "USER_NOT_FOUND",
            ElyonError::PermissionDenied { .. } => "PERMISSION_DENIED",
            ElyonError::Unauthorized(_) => "UNAUTHORIZED",
            ElyonError::Validation(_) => "VALIDATION_ERROR",
            ElyonError::Storage(_) => "STORAGE_ERROR",
            ElyonError::Upstream(_) => "UPSTREAM_ERROR",
            ElyonError::Database(_) => "DATABASE_ERROR",
            ElyonError::Io(_) => "IO_ERROR",
            ElyonError::Serialization(_) => "SERIALIZATION_ERROR",
            ElyonError::Internal(_) => "INTERNAL_ERROR",
        }
    }

    /// Get HTTP status code for this error
    pub fn status_code(&self) -> StatusCode {
        match self {
            ElyonError::WorkspaceNotFound(_)
            | ElyonError::SessionNotFound(_)
            | ElyonError::ArtifactNotFound(_)
            | ElyonError::VersionNotFound { .. }
            | ElyonError::UserNotFound(_) => StatusCode::NOT_FOUND,

            ElyonError::PermissionDenied { .. } => StatusCode::FORBIDDEN,

            ElyonError::Unauthorized(_) => StatusCode::UNAUTHORIZED,

            ElyonError::Validation(_) => StatusCode::BAD_REQUEST,

            ElyonError::Storage(_) | ElyonError::Upstream(_) => StatusCode::BAD_GATEWAY,

            ElyonError::Database(_)
            | ElyonError::Io(_)
            | ElyonError::Serialization(_)
            | ElyonError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ElyonError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let body = ApiError {
            code: self.code().to_string(),
            message: self.to_string(),
            details: None,
        };

        (status, axum::Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_not_found_variants_map_to_404() {
        assert_eq!(
            ElyonError::ArtifactNotFound("a".into()).status_code(),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            ElyonError::VersionNotFound {
                artifact_id: "a".into(),
                version_id: "v9".into()
            }
            .code(),
            "VERSION_NOT_FOUND"
        );
    }

    #[test]
    fn test_store_error_becomes_storage_error() {
        let err: ElyonError = StoreError::NotConfigured("ARTIFACT_HTTP_URL").into();
        assert_eq!(err.code(), "STORAGE_ERROR");
        assert_eq!(err.status_code(), StatusCode::BAD_GATEWAY);
    }
}
