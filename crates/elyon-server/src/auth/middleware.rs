//! Authentication middleware

use axum::{
    body::Body,
    extract::State,
    http::{header, Request, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
    Json,
};
use elyon_core::AuthenticatedUser;
use std::sync::Arc;

use crate::state::AppState;

fn bearer_token(request: &Request<Body>) -> Option<String> {
    request
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.strip_prefix("Bearer "))
        .map(|token| token.trim().to_string())
        .filter(|token| !token.is_empty())
}

fn unauthorized(message: &str) -> Response {
    (
        StatusCode::UNAUTHORIZED,
        [(header::WWW_AUTHENTICATE, "Bearer")],
        Json(serde_json::json!({ "error": message })),
    )
        .into_response()
}

/// Resolve the bearer token to a local user
pub async fn auth_middleware(
    State(state): State<Arc<AppState>>,
    mut request: Request<Body>,
    next: Next,
) -> Response {
    let Some(token) = bearer_token(&request) else {
        return unauthorized("Missing bearer token");
    };

    let Some(identity) = state.auth.validate_token(&token).await else {
        return unauthorized("Could not validate credentials");
    };

    let user = match state.users.sync_user(&state.pool, &identity).await {
        Ok(user) => user,
        Err(e) => {
            tracing::error!(user_id = %identity.user_id, "User sync failed: {}", e);
            return (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(serde_json::json!({ "error": "User sync failed" })),
            )
                .into_response();
        }
    };

    if !user.enabled {
        return (
            StatusCode::FORBIDDEN,
            Json(serde_json::json!({ "error": "User account disabled" })),
        )
            .into_response();
    }

    request.extensions_mut().insert(AuthenticatedUser {
        id: user.id,
        user_id: user.user_id,
        token,
    });
    next.run(request).await
}
