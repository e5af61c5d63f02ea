//! User service - local user records and workspace membership

use serde_json::{Map, Value};
use sqlx::SqlitePool;

use super::session_service::SessionService;
use super::workspace_service::WorkspaceService;
use crate::error::{ElyonError, ElyonResult};
use crate::models::{User, UserIdentity, WorkspaceMember};
use crate::now_rfc3339;

/// Login name of the bootstrap administrator
pub const ADMIN_USER_ID: &str = "admin";

type UserRow = (i64, String, String, i32, Option<String>);

/// User service
#[derive(Clone)]
pub struct UserService {
    sessions: SessionService,
}

impl UserService {
    pub fn new(sessions: SessionService) -> Self {
        Self { sessions }
    }

    /// Look up a user by login name, memberships included
    pub async fn get_by_user_id(&self, pool: &SqlitePool, user_id: &str) -> ElyonResult<Option<User>> {
        let row = sqlx::query_as::<_, UserRow>(
            "SELECT id, user_id, profile_json, enabled, active_workspace_id FROM users WHERE user_id = ?",
        )
        .bind(user_id)
        .fetch_optional(pool)
        .await?;

        match row {
            Some(row) => Ok(Some(self.with_memberships(pool, row).await?)),
            None => Ok(None),
        }
    }

    /// Look up a user by row id
    pub async fn get_by_id(&self, pool: &SqlitePool, id: i64) -> ElyonResult<User> {
        let row = sqlx::query_as::<_, UserRow>(
            "SELECT id, user_id, profile_json, enabled, active_workspace_id FROM users WHERE id = ?",
        )
        .bind(id)
        .fetch_optional(pool)
        .await?
        .ok_or_else(|| ElyonError::UserNotFound(id.to_string()))?;

        self.with_memberships(pool, row).await
    }

    async fn with_memberships(&self, pool: &SqlitePool, row: UserRow) -> ElyonResult<User> {
        let members = sqlx::query_as::<_, (String, i64, String)>(
            "SELECT workspace_id, user_id, role FROM workspace_members WHERE user_id = ? ORDER BY id ASC",
        )
        .bind(row.0)
        .fetch_all(pool)
        .await?;

        Ok(User {
            id: row.0,
            user_id: row.1,
            profile: serde_json::from_str::<Map<String, Value>>(&row.2).unwrap_or_default(),
            enabled: row.3 != 0,
            active_workspace_id: row.4,
            memberships: members
                .into_iter()
                .map(|(workspace_id, user_id, role)| WorkspaceMember {
                    workspace_id,
                    user_id,
                    role: role.parse().unwrap_or_default(),
                })
                .collect(),
        })
    }

    /// Insert a new user
    pub async fn create_user(&self, pool: &SqlitePool, identity: &UserIdentity) -> ElyonResult<User> {
        if identity.user_id.trim().is_empty() {
            return Err(ElyonError::Validation("user_id must not be empty".into()));
        }

        let id = sqlx::query(
            "INSERT INTO users (user_id, profile_json, enabled, created_at) VALUES (?, ?, ?, ?)",
        )
        .bind(&identity.user_id)
        .bind(Value::Object(identity.profile.clone()).to_string())
        .bind(identity.enabled)
        .bind(now_rfc3339())
        .execute(pool)
        .await?
        .last_insert_rowid();

        tracing::info!(user_id = %identity.user_id, "User created");
        self.get_by_id(pool, id).await
    }

    /// Create the user, or refresh the enabled flag and (when given) the profile
    pub async fn sync_user(&self, pool: &SqlitePool, identity: &UserIdentity) -> ElyonResult<User> {
        let Some(existing) = self.get_by_user_id(pool, &identity.user_id).await? else {
            return self.create_user(pool, identity).await;
        };

        let profile = if identity.profile.is_empty() {
            existing.profile
        } else {
            identity.profile.clone()
        };

        sqlx::query("UPDATE users SET profile_json = ?, enabled = ? WHERE id = ?")
            .bind(Value::Object(profile).to_string())
            .bind(identity.enabled)
            .bind(existing.id)
            .execute(pool)
            .await?;

        self.get_by_id(pool, existing.id).await
    }

    /// Give the user an active workspace.
    ///
    /// Members of any workspace default to their first membership; a user
    /// without memberships gets a fresh personal workspace.
    pub async fn ensure_personal_workspace(&self, pool: &SqlitePool, user: User) -> ElyonResult<User> {
        if let Some(first) = user.memberships.first() {
            if user.active_workspace_id.is_none() {
                self.set_active_workspace(pool, user.id, &first.workspace_id).await?;
                return self.get_by_id(pool, user.id).await;
            }
            return Ok(user);
        }

        let workspace_id = WorkspaceService::new()
            .initialize_personal_workspace(pool, &self.sessions, &user.user_id, user.id)
            .await?;
        self.set_active_workspace(pool, user.id, &workspace_id).await?;
        self.get_by_id(pool, user.id).await
    }

    /// Switch the user's active workspace
    pub async fn update_active_workspace(
        &self,
        pool: &SqlitePool,
        user_id: &str,
        workspace_id: &str,
    ) -> ElyonResult<User> {
        let user = self
            .get_by_user_id(pool, user_id)
            .await?
            .ok_or_else(|| ElyonError::UserNotFound(user_id.to_string()))?;

        self.set_active_workspace(pool, user.id, workspace_id).await?;
        self.get_by_id(pool, user.id).await
    }

    async fn set_active_workspace(&self, pool: &SqlitePool, id: i64, workspace_id: &str) -> ElyonResult<()> {
        sqlx::query("UPDATE users SET active_workspace_id = ? WHERE id = ?")
            .bind(workspace_id)
            .bind(id)
            .execute(pool)
            .await?;
        Ok(())
    }

    /// Startup bootstrap: admin user plus the default workspace
    pub async fn initialize_defaults(&self, pool: &SqlitePool) -> ElyonResult<User> {
        let admin = match self.get_by_user_id(pool, ADMIN_USER_ID).await? {
            Some(admin) => admin,
            None => {
                let admin = self
                    .create_user(pool, &UserIdentity::new(ADMIN_USER_ID).with_name("Administrator"))
                    .await?;
                tracing::info!("Created default admin user");
                admin
            }
        };

        WorkspaceService::new()
            .ensure_default_workspace(pool, &self.sessions, admin.id)
            .await?;

        self.get_by_id(pool, admin.id).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::MemberRole;
    use crate::services::{ArtifactService, DEFAULT_WORKSPACE_ID};
    use crate::storage::DatabaseStore;
    use crate::test_support::memory_pool;
    use std::sync::Arc;

    fn service() -> UserService {
        UserService::new(SessionService::new(ArtifactService::new(Arc::new(DatabaseStore))))
    }

    #[tokio::test]
    async fn test_sync_creates_then_refreshes() {
        let pool = memory_pool().await;
        let users = service();

        let created = users
            .sync_user(&pool, &UserIdentity::new("ada").with_name("Ada"))
            .await
            .unwrap();
        assert_eq!(created.profile["name"], "Ada");
        assert!(created.enabled);

        let mut disabled = UserIdentity::new("ada").with_name("Ada L.");
        disabled.enabled = false;
        let synced = users.sync_user(&pool, &disabled).await.unwrap();
        assert_eq!(synced.id, created.id);
        assert_eq!(synced.profile["name"], "Ada L.");
        assert!(!synced.enabled);
    }

    #[tokio::test]
    async fn test_ensure_personal_workspace_creates_one() {
        let pool = memory_pool().await;
        let users = service();
        let user = users.create_user(&pool, &UserIdentity::new("grace")).await.unwrap();

        let user = users.ensure_personal_workspace(&pool, user).await.unwrap();
        let active = user.active_workspace_id.clone().unwrap();
        assert_eq!(user.memberships.len(), 1);
        assert_eq!(user.memberships[0].workspace_id, active);
        assert_eq!(user.memberships[0].role, MemberRole::Owner);

        // Second call keeps the same workspace
        let again = users.ensure_personal_workspace(&pool, user).await.unwrap();
        assert_eq!(again.active_workspace_id.as_deref(), Some(active.as_str()));
        assert_eq!(again.memberships.len(), 1);
    }

    #[tokio::test]
    async fn test_initialize_defaults() {
        let pool = memory_pool().await;
        let users = service();

        let admin = users.initialize_defaults(&pool).await.unwrap();
        assert_eq!(admin.user_id, ADMIN_USER_ID);
        assert_eq!(admin.profile["name"], "Administrator");
        assert_eq!(admin.memberships[0].workspace_id, DEFAULT_WORKSPACE_ID);

        let admin = users.initialize_defaults(&pool).await.unwrap();
        assert_eq!(admin.memberships.len(), 1);

        let admin = users.ensure_personal_workspace(&pool, admin).await.unwrap();
        assert_eq!(admin.active_workspace_id.as_deref(), Some(DEFAULT_WORKSPACE_ID));
    }

    #[tokio::test]
    async fn test_update_active_workspace_unknown_user() {
        let pool = memory_pool().await;
        let err = service()
            .update_active_workspace(&pool, "ghost", "W1")
            .await
            .unwrap_err();
        assert!(matches!(err, ElyonError::UserNotFound(_)));
    }
}
