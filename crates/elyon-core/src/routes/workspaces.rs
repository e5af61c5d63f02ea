//! Workspace HTTP routes

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    routing::{get, post},
    Extension, Json, Router,
};
use serde::Deserialize;
use serde_json::{json, Value};

use super::CoreState;
use crate::error::ElyonError;
use crate::models::{ArchivedPane, DeleteWorkspaceResponse, Workspace, WorkspaceCreate, WorkspaceUpdate};
use crate::services::WorkspaceService;
use crate::AuthenticatedUser;

/// Query params for listing workspaces
#[derive(Deserialize)]
pub struct ListWorkspacesParams {
    #[serde(default)]
    pub archived: bool,
}

/// Configure workspace routes
pub fn routes(state: CoreState) -> Router {
    Router::new()
        .route("/workspaces", get(list_workspaces).post(create_workspace))
        .route(
            "/workspaces/{id}",
            get(get_workspace)
                .patch(update_workspace)
                .delete(delete_workspace),
        )
        .route("/workspaces/{id}/archive-pane", post(archive_pane))
        .route("/workspaces/{id}/archived-panes", get(list_archived_panes))
        .with_state(state)
}

async fn list_workspaces(
    State(state): State<CoreState>,
    Query(params): Query<ListWorkspacesParams>,
) -> Result<Json<Vec<Workspace>>, ElyonError> {
    let workspaces = WorkspaceService::new()
        .list_workspaces(&state.pool, params.archived)
        .await?;
    Ok(Json(workspaces))
}

async fn create_workspace(
    State(state): State<CoreState>,
    user: Option<Extension<AuthenticatedUser>>,
    Json(req): Json<WorkspaceCreate>,
) -> Result<(StatusCode, Json<Workspace>), ElyonError> {
    let owner = user.as_ref().map(|u| u.0.id);
    let workspace = WorkspaceService::new()
        .create_workspace(&state.pool, req, owner)
        .await?;
    Ok((StatusCode::CREATED, Json(workspace)))
}

async fn get_workspace(
    State(state): State<CoreState>,
    Path(id): Path<String>,
) -> Result<Json<Workspace>, ElyonError> {
    let workspace = WorkspaceService::new().get_workspace(&state.pool, &id).await?;
    Ok(Json(workspace))
}

async fn update_workspace(
    State(state): State<CoreState>,
    Path(id): Path<String>,
    Json(req): Json<WorkspaceUpdate>,
) -> Result<Json<Workspace>, ElyonError> {
    let workspace = WorkspaceService::new()
        .update_workspace(&state.pool, &id, req)
        .await?;
    Ok(Json(workspace))
}

async fn delete_workspace(
    State(state): State<CoreState>,
    Path(id): Path<String>,
) -> Result<Json<DeleteWorkspaceResponse>, ElyonError> {
    WorkspaceService::new().delete_workspace(&state.pool, &id).await?;
    Ok(Json(DeleteWorkspaceResponse {
        status: "archived".to_string(),
    }))
}

async fn archive_pane(
    State(state): State<CoreState>,
    user: Option<Extension<AuthenticatedUser>>,
    Path(id): Path<String>,
    Json(pane): Json<Value>,
) -> Result<Json<Value>, ElyonError> {
    if !pane.is_object() {
        return Err(ElyonError::Validation("Pane data must be a JSON object".into()));
    }
    let archived = WorkspaceService::new()
        .archive_pane(&state.pool, &id, pane, user.as_ref().map(|u| u.0.id))
        .await?;
    Ok(Json(json!({"status": "success", "id": archived.id})))
}

async fn list_archived_panes(
    State(state): State<CoreState>,
    Path(id): Path<String>,
) -> Result<Json<Vec<ArchivedPane>>, ElyonError> {
    let service = WorkspaceService::new();
    service.get_workspace(&state.pool, &id).await?;
    let panes = service.list_archived_panes(&state.pool, &id).await?;
    Ok(Json(panes))
}

#[cfg(test)]
mod tests {
    use super::super::test_support::{send, state};
    use super::*;
    use crate::llm::MockProvider;

    #[tokio::test]
    async fn test_workspace_lifecycle() {
        let router = routes(state(MockProvider::seeded(1)).await);

        let (status, created) = send(
            router.clone(),
            "POST",
            "/workspaces",
            Some(json!({"name": "Lab"})),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(created["state"], json!({"panes": [], "visibleIds": []}));
        let id = created["id"].as_str().unwrap().to_string();

        let (status, updated) = send(
            router.clone(),
            "PATCH",
            &format!("/workspaces/{}", id),
            Some(json!({"state": {"panes": {"P1": {}}}})),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(updated["name"], "Lab");
        assert_eq!(updated["state"]["panes"]["P1"], json!({}));

        let (status, body) = send(
            router.clone(),
            "POST",
            &format!("/workspaces/{}/archive-pane", id),
            Some(json!({"id": "P1", "type": "chat"})),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "success");

        let (_, panes) = send(
            router.clone(),
            "GET",
            &format!("/workspaces/{}/archived-panes", id),
            None,
        )
        .await;
        assert_eq!(panes.as_array().unwrap().len(), 1);

        let (status, body) =
            send(router.clone(), "DELETE", &format!("/workspaces/{}", id), None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, json!({"status": "archived"}));

        let (_, active) = send(router.clone(), "GET", "/workspaces", None).await;
        assert!(active.as_array().unwrap().is_empty());
        let (_, archived) = send(router, "GET", "/workspaces?archived=true", None).await;
        assert_eq!(archived.as_array().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_missing_workspace_is_404() {
        let router = routes(state(MockProvider::seeded(1)).await);
        let (status, body) = send(router.clone(), "GET", "/workspaces/nope", None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["code"], "WORKSPACE_NOT_FOUND");

        let (status, _) = send(router, "DELETE", "/workspaces/nope", None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }
}
