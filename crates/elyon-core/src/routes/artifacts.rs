//! Artifact HTTP routes

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    routing::get,
    Extension, Json, Router,
};
use serde::Deserialize;

use super::{caller_token, CoreState};
use crate::error::ElyonError;
use crate::models::{Artifact, ArtifactCreate, ArtifactUpdate, GhostMutationCreate, MutationRecord};
use crate::AuthenticatedUser;

/// Query params for listing artifacts
#[derive(Deserialize)]
pub struct ListArtifactsParams {
    pub session_id: Option<String>,
}

/// Configure artifact routes
pub fn routes(state: CoreState) -> Router {
    Router::new()
        .route("/artifacts", get(list_artifacts).post(create_artifact))
        .route("/artifacts/{id}", get(get_artifact).patch(update_artifact))
        .route(
            "/artifacts/{id}/mutations",
            get(list_mutations).post(create_ghost_mutation),
        )
        .route("/artifacts/{id}/versions/{version_id}", get(get_version))
        .with_state(state)
}

async fn list_artifacts(
    State(state): State<CoreState>,
    user: Option<Extension<AuthenticatedUser>>,
    Query(params): Query<ListArtifactsParams>,
) -> Result<Json<Vec<Artifact>>, ElyonError> {
    let session_id = params
        .session_id
        .filter(|s| !s.is_empty())
        .ok_or_else(|| ElyonError::Validation("session_id is required".into()))?;
    let artifacts = state
        .artifacts
        .list_session_artifacts(&state.pool, &session_id, caller_token(&user))
        .await?;
    Ok(Json(artifacts))
}

async fn create_artifact(
    State(state): State<CoreState>,
    user: Option<Extension<AuthenticatedUser>>,
    Json(req): Json<ArtifactCreate>,
) -> Result<Json<Artifact>, ElyonError> {
    let artifact = state
        .artifacts
        .create_or_update_artifact(&state.pool, req, caller_token(&user))
        .await?;
    Ok(Json(artifact))
}

async fn get_artifact(
    State(state): State<CoreState>,
    user: Option<Extension<AuthenticatedUser>>,
    Path(id): Path<String>,
) -> Result<Json<Artifact>, ElyonError> {
    let artifact = state
        .artifacts
        .get_artifact(&state.pool, &id, caller_token(&user))
        .await?;
    Ok(Json(artifact))
}

async fn update_artifact(
    State(state): State<CoreState>,
    user: Option<Extension<AuthenticatedUser>>,
    Path(id): Path<String>,
    Json(req): Json<ArtifactUpdate>,
) -> Result<Json<Artifact>, ElyonError> {
    let artifact = state
        .artifacts
        .update_artifact(&state.pool, &id, req, caller_token(&user))
        .await?;
    Ok(Json(artifact))
}

async fn list_mutations(
    State(state): State<CoreState>,
    Path(id): Path<String>,
) -> Result<Json<Vec<MutationRecord>>, ElyonError> {
    if !state.artifacts.artifact_exists(&state.pool, &id).await? {
        return Err(ElyonError::ArtifactNotFound(id));
    }
    let mutations = state.artifacts.list_mutations(&state.pool, &id).await?;
    Ok(Json(mutations))
}

async fn create_ghost_mutation(
    State(state): State<CoreState>,
    Path(id): Path<String>,
    Json(req): Json<GhostMutationCreate>,
) -> Result<(StatusCode, Json<MutationRecord>), ElyonError> {
    let mutation = state
        .artifacts
        .create_adhoc_mutation(
            &state.pool,
            &id,
            req.payload,
            req.origin,
            &req.version_id,
            req.parent_id.as_deref(),
        )
        .await?;
    Ok((StatusCode::CREATED, Json(mutation)))
}

async fn get_version(
    State(state): State<CoreState>,
    Path((id, version_id)): Path<(String, String)>,
) -> Result<Json<MutationRecord>, ElyonError> {
    let mutation = state
        .artifacts
        .get_version(&state.pool, &id, &version_id)
        .await?;
    Ok(Json(mutation))
}

#[cfg(test)]
mod tests {
    use super::super::test_support::{send, state};
    use super::*;
    use crate::llm::MockProvider;
    use serde_json::json;

    #[tokio::test]
    async fn test_create_patch_and_versions() {
        let router = routes(state(MockProvider::seeded(1)).await);

        let (status, created) = send(
            router.clone(),
            "POST",
            "/artifacts",
            Some(json!({
                "id": "A1",
                "type": "code",
                "name": "main.py",
                "payload": {"source": "print(1)"},
                "session_id": "S1"
            })),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(created["mutations"][0]["version_id"], "v1");

        let (status, patched) = send(
            router.clone(),
            "PATCH",
            "/artifacts/A1",
            Some(json!({"payload": {"source": "print(2)"}})),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(patched["payload"]["source"], "print(2)");
        assert_eq!(patched["mutations"][1]["parent_id"], "v1");

        let (status, v1) = send(router.clone(), "GET", "/artifacts/A1/versions/v1", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(v1["payload"]["source"], "print(1)");

        let (status, ghost) = send(
            router.clone(),
            "POST",
            "/artifacts/A1/mutations",
            Some(json!({
                "version_id": "v3",
                "parent_id": "v2",
                "payload": {"source": "print(3)"},
                "origin": {"type": "adhoc_command", "triggeringCommand": "/optimize"}
            })),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(ghost["status"], "ghost");

        let (_, head) = send(router.clone(), "GET", "/artifacts/A1", None).await;
        assert_eq!(head["payload"]["source"], "print(2)");

        let (_, mutations) = send(router.clone(), "GET", "/artifacts/A1/mutations", None).await;
        assert_eq!(mutations.as_array().unwrap().len(), 3);

        let (_, listed) = send(router, "GET", "/artifacts?session_id=S1", None).await;
        assert_eq!(listed[0]["id"], "A1");
    }

    #[tokio::test]
    async fn test_not_found_and_validation() {
        let router = routes(state(MockProvider::seeded(1)).await);

        let (status, body) = send(router.clone(), "GET", "/artifacts/none", None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["code"], "ARTIFACT_NOT_FOUND");

        let (status, _) = send(router.clone(), "PATCH", "/artifacts/none", Some(json!({}))).await;
        assert_eq!(status, StatusCode::NOT_FOUND);

        let (status, body) = send(router.clone(), "GET", "/artifacts/none/mutations", None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["code"], "ARTIFACT_NOT_FOUND");

        let (status, _) = send(router.clone(), "GET", "/artifacts", None).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        send(
            router.clone(),
            "POST",
            "/artifacts",
            Some(json!({"id": "A1", "type": "code", "name": "x"})),
        )
        .await;
        let (status, body) = send(router, "GET", "/artifacts/A1/versions/v9", None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["code"], "VERSION_NOT_FOUND");
    }
}
