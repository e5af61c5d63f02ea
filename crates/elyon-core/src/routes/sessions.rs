//! Session HTTP routes

use axum::{
    extract::{Path, State},
    response::{
        sse::{Event, KeepAlive, Sse},
        IntoResponse, Response,
    },
    routing::{get, post},
    Extension, Json, Router,
};
use futures::stream::StreamExt;
use serde::Deserialize;
use std::convert::Infallible;
use std::time::Duration;

use super::{caller_token, CoreState};
use crate::error::ElyonError;
use crate::models::{ChatSession, ChatSessionUpdate, ExecutionKind, ExecutionRequest};
use crate::AuthenticatedUser;

/// Body of `POST /sessions/chat`
#[derive(Debug, Deserialize)]
pub struct ChatRequest {
    pub session_id: String,
    #[serde(default)]
    pub action: Option<String>,
    #[serde(default)]
    pub referenced_artifact_ids: Vec<String>,
    #[serde(default = "default_stream")]
    pub stream: bool,
}

fn default_stream() -> bool {
    true
}

impl From<ChatRequest> for ExecutionRequest {
    fn from(req: ChatRequest) -> Self {
        ExecutionRequest {
            kind: "chat".to_string(),
            session_id: req.session_id,
            command_name: None,
            args: None,
            action: req.action,
            referenced_artifact_ids: req.referenced_artifact_ids,
            stream: req.stream,
        }
    }
}

/// Configure session routes
pub fn routes(state: CoreState) -> Router {
    Router::new()
        .route("/sessions/workspace/{workspace_id}", get(list_sessions))
        .route("/sessions/execute", post(execute))
        .route("/sessions/chat", post(chat))
        .route("/sessions/{id}", get(get_session).patch(update_session))
        .with_state(state)
}

async fn list_sessions(
    State(state): State<CoreState>,
    Path(workspace_id): Path<String>,
) -> Result<Json<Vec<ChatSession>>, ElyonError> {
    let sessions = state.sessions.get_sessions(&state.pool, &workspace_id).await?;
    Ok(Json(sessions))
}

async fn get_session(
    State(state): State<CoreState>,
    user: Option<Extension<AuthenticatedUser>>,
    Path(id): Path<String>,
) -> Result<Json<ChatSession>, ElyonError> {
    let session = state
        .sessions
        .get_session(&state.pool, &id, caller_token(&user))
        .await?;
    Ok(Json(session))
}

async fn update_session(
    State(state): State<CoreState>,
    Path(id): Path<String>,
    Json(req): Json<ChatSessionUpdate>,
) -> Result<Json<ChatSession>, ElyonError> {
    let session = state
        .sessions
        .update_session(&state.pool, &id, req.name, req.is_active)
        .await?;
    Ok(Json(session))
}

async fn execute(
    State(state): State<CoreState>,
    user: Option<Extension<AuthenticatedUser>>,
    Json(req): Json<ExecutionRequest>,
) -> Result<Response, ElyonError> {
    run(state, user, req).await
}

async fn chat(
    State(state): State<CoreState>,
    user: Option<Extension<AuthenticatedUser>>,
    Json(req): Json<ChatRequest>,
) -> Result<Response, ElyonError> {
    run(state, user, req.into()).await
}

async fn run(
    state: CoreState,
    user: Option<Extension<AuthenticatedUser>>,
    req: ExecutionRequest,
) -> Result<Response, ElyonError> {
    if req.stream && req.kind() == ExecutionKind::Chat {
        let token = caller_token(&user).map(str::to_string);
        let events = state
            .execution
            .execute_chat_stream(state.pool.as_ref().clone(), req, token)
            .map(|event| {
                let data = serde_json::to_string(&event).unwrap_or_default();
                Ok::<_, Infallible>(Event::default().data(data))
            });

        return Ok(Sse::new(events)
            .keep_alive(
                KeepAlive::new()
                    .interval(Duration::from_secs(15))
                    .text("ping"),
            )
            .into_response());
    }

    let response = state
        .execution
        .execute(&state.pool, &req, caller_token(&user))
        .await?;
    if !response.success {
        return Err(ElyonError::Validation(
            response
                .message
                .unwrap_or_else(|| "Execution failed".to_string()),
        ));
    }
    Ok(Json(response).into_response())
}

#[cfg(test)]
mod tests {
    use super::super::test_support::{send, state};
    use super::*;
    use crate::llm::MockProvider;
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use serde_json::json;
    use tower::ServiceExt;

    #[tokio::test]
    async fn test_execute_command_then_read_session() {
        let router = routes(state(MockProvider::seeded(1)).await);

        let (status, body) = send(
            router.clone(),
            "POST",
            "/sessions/execute",
            Some(json!({"type": "command", "session_id": "S1", "command_name": "plot"})),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["success"], true);
        assert_eq!(body["result"]["status"], "success");
        assert_eq!(body["result"]["metadata"]["session_id"], "S1");
        let plot_id = body["result"]["new_artifacts"][0]["id"].as_str().unwrap().to_string();

        let (status, session) = send(router.clone(), "GET", "/sessions/S1", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(session["name"], "Cmd S1");
        assert_eq!(session["messages"][0]["artifacts"][0]["id"], plot_id);

        let (_, listed) = send(router.clone(), "GET", "/sessions/workspace/default_workspace", None).await;
        assert_eq!(listed.as_array().unwrap().len(), 1);

        let (status, renamed) = send(
            router,
            "PATCH",
            "/sessions/S1",
            Some(json!({"name": "Plots"})),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(renamed["name"], "Plots");
    }

    #[tokio::test]
    async fn test_unsupported_type_is_400() {
        let router = routes(state(MockProvider::seeded(1)).await);
        let (status, body) = send(
            router,
            "POST",
            "/sessions/execute",
            Some(json!({"type": "render", "session_id": "S1"})),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["message"], "Validation error: Unsupported execution type");
    }

    #[tokio::test]
    async fn test_missing_session_is_404() {
        let router = routes(state(MockProvider::seeded(1)).await);
        let (status, body) = send(router, "GET", "/sessions/missing", None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["code"], "SESSION_NOT_FOUND");
    }

    #[tokio::test]
    async fn test_streaming_chat_is_sse() {
        let router = routes(state(MockProvider::seeded(1).with_probabilities(0.0, 0.0)).await);
        let request = Request::builder()
            .method("POST")
            .uri("/sessions/chat")
            .header("content-type", "application/json")
            .body(Body::from(json!({"session_id": "S1", "action": "hi"}).to_string()))
            .unwrap();

        let response = router.oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            response.headers()["content-type"],
            "text/event-stream"
        );
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let text = String::from_utf8(bytes.to_vec()).unwrap();
        assert!(text.contains("\"type\":\"text_delta\""));
        assert!(text.contains("\"type\":\"message_complete\""));
    }
}
