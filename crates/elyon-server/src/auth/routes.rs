//! Authentication API routes

use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Extension, Form, Json, Router,
};
use chrono::{DateTime, Utc};
use elyon_core::models::{User, UserIdentity};
use elyon_core::{AuthenticatedUser, ElyonError};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::sync::Arc;

use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct LoginForm {
    pub username: String,
    #[serde(default)]
    pub password: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct TokenResponse {
    pub access_token: String,
    pub token_type: &'static str,
    pub user: User,
    pub session_expires_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Deserialize)]
pub struct LogoutRequest {
    pub session_token: String,
}

#[derive(Debug, Deserialize)]
pub struct SyncRequest {
    pub user_id: String,
}

#[derive(Debug, Deserialize)]
pub struct UpdateActiveWorkspaceRequest {
    pub user_id: String,
    pub workspace_id: String,
}

fn error_response(status: StatusCode, message: impl Into<String>) -> Response {
    (status, Json(json!({ "error": message.into() }))).into_response()
}

fn internal_error(err: ElyonError) -> Response {
    tracing::error!("Auth route failed: {}", err);
    error_response(err.status_code(), err.to_string())
}

/// Routes reachable without a token
pub fn public_router() -> Router<Arc<AppState>> {
    Router::new().route("/auth/login", post(login))
}

/// Routes behind the auth middleware
pub fn protected_router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/auth/logout", post(logout))
        .route("/auth/sync", post(sync))
        .route("/auth/update-active-workspace", post(update_active_workspace))
        .route("/auth/me", get(get_current_user))
}

/// Authenticate, sync the local user and make sure it has a workspace
async fn login(State(state): State<Arc<AppState>>, Form(form): Form<LoginForm>) -> Response {
    let outcome = match state
        .auth
        .authenticate(&form.username, form.password.as_deref())
        .await
    {
        Ok(outcome) => outcome,
        Err(e) => {
            tracing::info!(username = %form.username, "Login failed: {}", e);
            let message = e.to_string();
            return error_response(
                StatusCode::UNAUTHORIZED,
                if message.is_empty() {
                    "Authentication failed".to_string()
                } else {
                    message
                },
            );
        }
    };

    if !outcome.identity.enabled {
        return error_response(StatusCode::FORBIDDEN, "User account disabled");
    }

    let user = match state.users.sync_user(&state.pool, &outcome.identity).await {
        Ok(user) => user,
        Err(e) => return internal_error(e),
    };
    let user = match state.users.ensure_personal_workspace(&state.pool, user).await {
        Ok(user) => user,
        Err(e) => return internal_error(e),
    };

    tracing::info!(user_id = %user.user_id, "User logged in");
    Json(TokenResponse {
        access_token: outcome.session_token,
        token_type: "bearer",
        user,
        session_expires_at: outcome.session_expires_at,
    })
    .into_response()
}

async fn logout(State(state): State<Arc<AppState>>, Json(req): Json<LogoutRequest>) -> Response {
    match state.auth.logout(&req.session_token).await {
        Ok(()) => Json(json!({ "message": "Logged out successfully" })).into_response(),
        Err(e) => error_response(StatusCode::BAD_GATEWAY, e.to_string()),
    }
}

/// Create the user if needed and ensure an active workspace
async fn sync(State(state): State<Arc<AppState>>, Json(req): Json<SyncRequest>) -> Response {
    let user = match state.users.get_by_user_id(&state.pool, &req.user_id).await {
        Ok(Some(user)) => user,
        Ok(None) => match state
            .users
            .create_user(&state.pool, &UserIdentity::new(req.user_id.as_str()))
            .await
        {
            Ok(user) => user,
            Err(e) => return internal_error(e),
        },
        Err(e) => return internal_error(e),
    };

    match state.users.ensure_personal_workspace(&state.pool, user).await {
        Ok(user) => Json(user).into_response(),
        Err(e) => internal_error(e),
    }
}

async fn update_active_workspace(
    State(state): State<Arc<AppState>>,
    Extension(current): Extension<AuthenticatedUser>,
    Json(req): Json<UpdateActiveWorkspaceRequest>,
) -> Response {
    if req.user_id != current.user_id {
        return error_response(StatusCode::FORBIDDEN, "Cannot update another user's workspace");
    }

    match state
        .users
        .update_active_workspace(&state.pool, &req.user_id, &req.workspace_id)
        .await
    {
        Ok(user) => Json(user).into_response(),
        Err(ElyonError::UserNotFound(_)) => error_response(StatusCode::NOT_FOUND, "User not found"),
        Err(e) => internal_error(e),
    }
}

async fn get_current_user(
    State(state): State<Arc<AppState>>,
    Extension(current): Extension<AuthenticatedUser>,
) -> Response {
    match state.users.get_by_id(&state.pool, current.id).await {
        Ok(user) => Json(user).into_response(),
        Err(ElyonError::UserNotFound(_)) => error_response(StatusCode::NOT_FOUND, "User not found"),
        Err(e) => internal_error(e),
    }
}
