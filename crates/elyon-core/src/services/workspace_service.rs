//! Workspace service - business logic for workspace operations

use chrono::Utc;
use serde_json::{json, Value};
use sqlx::SqlitePool;
use uuid::Uuid;

use super::artifact_service::DEFAULT_SESSION_ID;
use super::session_service::{SessionService, DEFAULT_WORKSPACE_ID};
use crate::error::{ElyonError, ElyonResult};
use crate::models::{ArchivedPane, MemberRole, Workspace, WorkspaceCreate, WorkspaceUpdate};
use crate::{now_rfc3339, parse_rfc3339};

type WorkspaceRow = (String, String, String, i32, String);

fn workspace_from_row(row: WorkspaceRow) -> Workspace {
    Workspace {
        id: row.0,
        name: row.1,
        state: serde_json::from_str(&row.2).unwrap_or_else(|_| crate::models::default_workspace_state()),
        is_archived: row.3 != 0,
        updated_at: parse_rfc3339(&row.4).unwrap_or_else(Utc::now),
    }
}

/// Layout holding a single chat pane bound to `session_id`
fn single_chat_layout(pane_id: &str, session_id: &str, title: &str, sticky: bool) -> Value {
    json!({
        "panes": {
            pane_id: {
                "id": pane_id,
                "type": "chat",
                "artifactId": session_id,
                "title": title,
                "isSticky": sticky,
                "lineage": {
                    "parentIds": [],
                    "command": "init",
                    "timestamp": Utc::now().timestamp_millis().to_string(),
                },
            }
        },
        "artifacts": {
            session_id: {
                "id": session_id,
                "type": "chat",
                "payload": [],
                "session_id": session_id,
                "mutations": [],
                "metadata": {"name": title},
            }
        },
        "activeLayout": [pane_id],
        "archive": [],
        "focusedPaneId": pane_id,
    })
}

/// Workspace service
pub struct WorkspaceService;

impl WorkspaceService {
    /// Create a new workspace service
    pub fn new() -> Self {
        Self
    }

    /// List workspaces by archived flag
    pub async fn list_workspaces(
        &self,
        pool: &SqlitePool,
        archived: bool,
    ) -> ElyonResult<Vec<Workspace>> {
        let rows = sqlx::query_as::<_, WorkspaceRow>(
            r#"
            SELECT id, name, state_json, is_archived, updated_at
            FROM workspaces
            WHERE is_archived = ?
            ORDER BY created_at ASC
            "#,
        )
        .bind(archived)
        .fetch_all(pool)
        .await?;

        Ok(rows.into_iter().map(workspace_from_row).collect())
    }

    /// Get a workspace by ID
    pub async fn get_workspace(&self, pool: &SqlitePool, workspace_id: &str) -> ElyonResult<Workspace> {
        self.find_workspace(pool, workspace_id)
            .await?
            .ok_or_else(|| ElyonError::WorkspaceNotFound(workspace_id.to_string()))
    }

    async fn find_workspace(
        &self,
        pool: &SqlitePool,
        workspace_id: &str,
    ) -> ElyonResult<Option<Workspace>> {
        let row = sqlx::query_as::<_, WorkspaceRow>(
            "SELECT id, name, state_json, is_archived, updated_at FROM workspaces WHERE id = ?",
        )
        .bind(workspace_id)
        .fetch_optional(pool)
        .await?;

        Ok(row.map(workspace_from_row))
    }

    /// Create a workspace; the creator, when known, becomes its owner
    pub async fn create_workspace(
        &self,
        pool: &SqlitePool,
        request: WorkspaceCreate,
        owner_id: Option<i64>,
    ) -> ElyonResult<Workspace> {
        if request.name.trim().is_empty() {
            return Err(ElyonError::Validation("Workspace name must not be empty".into()));
        }

        let id = Uuid::new_v4().to_string();
        let now = now_rfc3339();

        let mut tx = pool.begin().await?;
        sqlx::query(
            r#"
            INSERT INTO workspaces (id, name, state_json, is_archived, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&id)
        .bind(&request.name)
        .bind(request.state.to_string())
        .bind(request.is_archived)
        .bind(&now)
        .bind(&now)
        .execute(&mut *tx)
        .await?;

        if let Some(owner_id) = owner_id {
            sqlx::query("INSERT INTO workspace_members (workspace_id, user_id, role) VALUES (?, ?, ?)")
                .bind(&id)
                .bind(owner_id)
                .bind(MemberRole::Owner.to_string())
                .execute(&mut *tx)
                .await?;
        }
        tx.commit().await?;

        self.get_workspace(pool, &id).await
    }

    /// Update only the supplied fields
    pub async fn update_workspace(
        &self,
        pool: &SqlitePool,
        workspace_id: &str,
        request: WorkspaceUpdate,
    ) -> ElyonResult<Workspace> {
        let existing = self.get_workspace(pool, workspace_id).await?;

        let name = request.name.unwrap_or(existing.name);
        let state = request.state.unwrap_or(existing.state);
        let is_archived = request.is_archived.unwrap_or(existing.is_archived);

        sqlx::query(
            "UPDATE workspaces SET name = ?, state_json = ?, is_archived = ?, updated_at = ? WHERE id = ?",
        )
        .bind(&name)
        .bind(state.to_string())
        .bind(is_archived)
        .bind(now_rfc3339())
        .bind(workspace_id)
        .execute(pool)
        .await?;

        self.get_workspace(pool, workspace_id).await
    }

    /// Delete is a soft archive
    pub async fn delete_workspace(&self, pool: &SqlitePool, workspace_id: &str) -> ElyonResult<()> {
        let result = sqlx::query("UPDATE workspaces SET is_archived = 1, updated_at = ? WHERE id = ?")
            .bind(now_rfc3339())
            .bind(workspace_id)
            .execute(pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(ElyonError::WorkspaceNotFound(workspace_id.to_string()));
        }
        tracing::info!(workspace_id = %workspace_id, "Workspace archived");
        Ok(())
    }

    /// Store a snapshot of a pane removed from the layout
    pub async fn archive_pane(
        &self,
        pool: &SqlitePool,
        workspace_id: &str,
        pane_data: Value,
        user_id: Option<i64>,
    ) -> ElyonResult<ArchivedPane> {
        self.get_workspace(pool, workspace_id).await?;

        let id = Uuid::new_v4().to_string();
        let archived_at = now_rfc3339();
        sqlx::query(
            "INSERT INTO archived_panes (id, workspace_id, user_id, pane_json, archived_at) VALUES (?, ?, ?, ?, ?)",
        )
        .bind(&id)
        .bind(workspace_id)
        .bind(user_id)
        .bind(pane_data.to_string())
        .bind(&archived_at)
        .execute(pool)
        .await?;

        Ok(ArchivedPane {
            id,
            workspace_id: workspace_id.to_string(),
            user_id,
            pane_data,
            archived_at: parse_rfc3339(&archived_at).unwrap_or_else(Utc::now),
        })
    }

    /// Archived panes of a workspace, newest first
    pub async fn list_archived_panes(
        &self,
        pool: &SqlitePool,
        workspace_id: &str,
    ) -> ElyonResult<Vec<ArchivedPane>> {
        let rows = sqlx::query_as::<_, (String, String, Option<i64>, String, String)>(
            r#"
            SELECT id, workspace_id, user_id, pane_json, archived_at
            FROM archived_panes
            WHERE workspace_id = ?
            ORDER BY archived_at DESC
            "#,
        )
        .bind(workspace_id)
        .fetch_all(pool)
        .await?;

        Ok(rows
            .into_iter()
            .map(|row| ArchivedPane {
                id: row.0,
                workspace_id: row.1,
                user_id: row.2,
                pane_data: serde_json::from_str(&row.3).unwrap_or(Value::Null),
                archived_at: parse_rfc3339(&row.4).unwrap_or_else(Utc::now),
            })
            .collect())
    }

    /// Create a personal workspace with one empty chat for a new user.
    ///
    /// Returns the workspace id.
    pub async fn initialize_personal_workspace(
        &self,
        pool: &SqlitePool,
        sessions: &SessionService,
        user_id: &str,
        user_db_id: i64,
    ) -> ElyonResult<String> {
        let workspace_id = Uuid::new_v4().to_string();
        let session_id = Uuid::new_v4().to_string();
        let state = single_chat_layout("P1", &session_id, "Chat", false);
        let now = now_rfc3339();

        let mut tx = pool.begin().await?;
        sqlx::query(
            r#"
            INSERT INTO workspaces (id, name, state_json, is_archived, created_at, updated_at)
            VALUES (?, ?, ?, 0, ?, ?)
            "#,
        )
        .bind(&workspace_id)
        .bind(format!("{}'s Workspace", user_id))
        .bind(state.to_string())
        .bind(&now)
        .bind(&now)
        .execute(&mut *tx)
        .await?;

        sqlx::query("INSERT INTO workspace_members (workspace_id, user_id, role) VALUES (?, ?, ?)")
            .bind(&workspace_id)
            .bind(user_db_id)
            .bind(MemberRole::Owner.to_string())
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;

        sessions
            .create_session(pool, &session_id, "Chat", &workspace_id)
            .await?;

        tracing::info!(user_id = %user_id, workspace_id = %workspace_id, "Personal workspace created");
        Ok(workspace_id)
    }

    /// Make sure `default_workspace` and its `default_session` exist and the
    /// admin owns the workspace.
    pub async fn ensure_default_workspace(
        &self,
        pool: &SqlitePool,
        sessions: &SessionService,
        admin_db_id: i64,
    ) -> ElyonResult<()> {
        if self.find_workspace(pool, DEFAULT_WORKSPACE_ID).await?.is_none() {
            let state = single_chat_layout(DEFAULT_SESSION_ID, DEFAULT_SESSION_ID, "General", true);
            let now = now_rfc3339();
            sqlx::query(
                r#"
                INSERT INTO workspaces (id, name, state_json, is_archived, created_at, updated_at)
                VALUES (?, 'Default Workspace', ?, 0, ?, ?)
                "#,
            )
            .bind(DEFAULT_WORKSPACE_ID)
            .bind(state.to_string())
            .bind(&now)
            .bind(&now)
            .execute(pool)
            .await?;
            tracing::info!("Created default workspace");
        }

        sqlx::query(
            "INSERT OR IGNORE INTO workspace_members (workspace_id, user_id, role) VALUES (?, ?, ?)",
        )
        .bind(DEFAULT_WORKSPACE_ID)
        .bind(admin_db_id)
        .bind(MemberRole::Owner.to_string())
        .execute(pool)
        .await?;

        if sessions
            .find_session(pool, DEFAULT_SESSION_ID, None)
            .await?
            .is_none()
        {
            sessions
                .create_session(pool, DEFAULT_SESSION_ID, "General", DEFAULT_WORKSPACE_ID)
                .await?;
            tracing::info!("Created default chat session");
        }

        Ok(())
    }
}

impl Default for WorkspaceService {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::ArtifactService;
    use crate::storage::DatabaseStore;
    use crate::test_support::memory_pool;
    use std::sync::Arc;

    fn sessions() -> SessionService {
        SessionService::new(ArtifactService::new(Arc::new(DatabaseStore)))
    }

    async fn insert_user(pool: &SqlitePool, user_id: &str) -> i64 {
        sqlx::query("INSERT INTO users (user_id) VALUES (?)")
            .bind(user_id)
            .execute(pool)
            .await
            .unwrap()
            .last_insert_rowid()
    }

    #[tokio::test]
    async fn test_create_update_archive() {
        let pool = memory_pool().await;
        let service = WorkspaceService::new();
        let owner = insert_user(&pool, "ada").await;

        let created = service
            .create_workspace(
                &pool,
                WorkspaceCreate {
                    name: "Research".into(),
                    state: crate::models::default_workspace_state(),
                    is_archived: false,
                },
                Some(owner),
            )
            .await
            .unwrap();
        assert_eq!(created.state, json!({"panes": [], "visibleIds": []}));

        let role: (String,) = sqlx::query_as(
            "SELECT role FROM workspace_members WHERE workspace_id = ? AND user_id = ?",
        )
        .bind(&created.id)
        .bind(owner)
        .fetch_one(&pool)
        .await
        .unwrap();
        assert_eq!(role.0, "OWNER");

        let updated = service
            .update_workspace(
                &pool,
                &created.id,
                WorkspaceUpdate {
                    name: Some("Renamed".into()),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        assert_eq!(updated.name, "Renamed");
        assert_eq!(updated.state, created.state);
        assert!(updated.updated_at >= created.updated_at);

        service.delete_workspace(&pool, &created.id).await.unwrap();
        assert!(service.list_workspaces(&pool, false).await.unwrap().is_empty());
        let archived = service.list_workspaces(&pool, true).await.unwrap();
        assert_eq!(archived.len(), 1);
        assert!(archived[0].is_archived);
    }

    #[tokio::test]
    async fn test_delete_unknown_workspace() {
        let pool = memory_pool().await;
        let err = WorkspaceService::new()
            .delete_workspace(&pool, "nope")
            .await
            .unwrap_err();
        assert!(matches!(err, ElyonError::WorkspaceNotFound(_)));
    }

    #[tokio::test]
    async fn test_archive_pane_round_trip() {
        let pool = memory_pool().await;
        let service = WorkspaceService::new();
        let ws = service
            .create_workspace(
                &pool,
                WorkspaceCreate {
                    name: "W".into(),
                    state: json!({}),
                    is_archived: false,
                },
                None,
            )
            .await
            .unwrap();

        service
            .archive_pane(&pool, &ws.id, json!({"id": "P2", "type": "code"}), None)
            .await
            .unwrap();

        let panes = service.list_archived_panes(&pool, &ws.id).await.unwrap();
        assert_eq!(panes.len(), 1);
        assert_eq!(panes[0].pane_data["id"], "P2");
    }

    #[tokio::test]
    async fn test_personal_workspace_has_chat_pane() {
        let pool = memory_pool().await;
        let service = WorkspaceService::new();
        let sessions = sessions();
        let user = insert_user(&pool, "grace").await;

        let ws_id = service
            .initialize_personal_workspace(&pool, &sessions, "grace", user)
            .await
            .unwrap();

        let ws = service.get_workspace(&pool, &ws_id).await.unwrap();
        assert_eq!(ws.name, "grace's Workspace");
        assert_eq!(ws.state["focusedPaneId"], "P1");
        let session_id = ws.state["panes"]["P1"]["artifactId"].as_str().unwrap();

        let listed = sessions.get_sessions(&pool, &ws_id).await.unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].id, session_id);
    }

    #[tokio::test]
    async fn test_default_workspace_is_idempotent() {
        let pool = memory_pool().await;
        let service = WorkspaceService::new();
        let sessions = sessions();
        let admin = insert_user(&pool, "admin").await;

        service.ensure_default_workspace(&pool, &sessions, admin).await.unwrap();
        service.ensure_default_workspace(&pool, &sessions, admin).await.unwrap();

        let ws = service.get_workspace(&pool, DEFAULT_WORKSPACE_ID).await.unwrap();
        assert_eq!(ws.name, "Default Workspace");
        let session = sessions.get_session(&pool, DEFAULT_SESSION_ID, None).await.unwrap();
        assert_eq!(session.name, "General");
        assert_eq!(session.workspace_id, DEFAULT_WORKSPACE_ID);

        let members: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM workspace_members")
            .fetch_one(&pool)
            .await
            .unwrap();
        assert_eq!(members.0, 1);
    }
}
