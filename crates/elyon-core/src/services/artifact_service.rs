//! Artifact service - versioned artifact persistence
//!
//! Every payload change appends a row to `mutation_records`. Version ids are
//! `v<n>` strings chained through `parent_id`; payloads are written through
//! the active [`ArtifactStore`] and rehydrated on read.

use rand::Rng;
use serde_json::{Map, Value};
use sha2::{Digest, Sha256};
use sqlx::{SqliteConnection, SqlitePool};
use std::sync::Arc;
use uuid::Uuid;

use crate::error::{ElyonError, ElyonResult};
use crate::models::{
    Artifact, ArtifactCreate, ArtifactUpdate, MutationOrigin, MutationRecord, MutationStatus,
};
use crate::storage::{is_valid_artifact_id, ArtifactStore, StorageBackend};
use crate::{now_rfc3339, parse_rfc3339};

/// Session id assigned to artifacts created without one
pub const DEFAULT_SESSION_ID: &str = "default_session";

/// Fresh ids tried when a generated artifact id is already taken
const GENERATED_ID_ATTEMPTS: usize = 5;

type ArtifactRow = (
    String,
    String,
    String,
    Option<String>,
    Option<String>,
    String,
    Option<String>,
    Option<String>,
    String,
);

type MutationRow = (
    i64,
    String,
    String,
    Option<String>,
    String,
    String,
    Option<String>,
    Option<String>,
    Option<String>,
    String,
);

const ARTIFACT_COLUMNS: &str = "id, type, storage_backend, storage_key, payload_json, metadata_json, session_id, workspace_id, created_at";

const MUTATION_COLUMNS: &str = "id, artifact_id, version_id, parent_id, timestamp, origin_json, change_summary, payload_json, checksum, status";

/// Compute the version following `latest`.
///
/// Unparsable version ids fall back to a random `v2..=v999`; the result can
/// collide with a version already in the chain.
pub fn next_version_id(latest: Option<&str>) -> String {
    let Some(latest) = latest else {
        return "v1".to_string();
    };

    match latest
        .replace('v', "")
        .trim()
        .parse::<i64>()
        .ok()
        .and_then(|n| n.checked_add(1))
    {
        Some(next) => format!("v{}", next),
        None => format!("v{}", rand::thread_rng().gen_range(2..=999)),
    }
}

/// SHA-256 of the payload's JSON encoding
pub fn payload_checksum(payload: &Value) -> String {
    let mut hasher = Sha256::new();
    hasher.update(payload.to_string().as_bytes());
    hex::encode(hasher.finalize())
}

fn is_unique_violation(err: &sqlx::Error) -> bool {
    matches!(err, sqlx::Error::Database(db) if db.is_unique_violation())
}

fn parse_json_or<T: serde::de::DeserializeOwned>(raw: Option<&str>, fallback: T) -> T {
    raw.and_then(|s| serde_json::from_str(s).ok())
        .unwrap_or(fallback)
}

fn artifact_from_row(row: ArtifactRow) -> Artifact {
    let metadata: Map<String, Value> = parse_json_or(Some(row.5.as_str()), Map::new());
    Artifact {
        id: row.0,
        artifact_type: row.1,
        name: Artifact::name_from_metadata(&metadata),
        storage_backend: row.2,
        storage_key: row.3,
        payload: row
            .4
            .as_deref()
            .and_then(|s| serde_json::from_str::<Value>(s).ok())
            .filter(|v| !v.is_null()),
        metadata,
        session_id: row.6,
        workspace_id: row.7,
        created_at: parse_rfc3339(&row.8).unwrap_or_else(chrono::Utc::now),
        mutations: Vec::new(),
    }
}

fn mutation_from_row(row: MutationRow) -> MutationRecord {
    MutationRecord {
        id: row.0,
        artifact_id: row.1,
        version_id: row.2,
        parent_id: row.3,
        timestamp: parse_rfc3339(&row.4).unwrap_or_else(chrono::Utc::now),
        origin: parse_json_or(
            Some(row.5.as_str()),
            MutationOrigin::ManualEdit { session_id: None },
        ),
        change_summary: row.6,
        payload: parse_json_or(row.7.as_deref(), Value::Null),
        checksum: row.8,
        status: row.9.parse().unwrap_or_default(),
    }
}

/// Row to insert into `artifacts`
pub(crate) struct NewArtifact<'a> {
    pub id: &'a str,
    pub artifact_type: &'a str,
    pub metadata: &'a Map<String, Value>,
    pub payload: Option<&'a Value>,
    pub session_id: Option<&'a str>,
    pub workspace_id: Option<&'a str>,
    pub storage_backend: StorageBackend,
    pub storage_key: Option<&'a str>,
}

/// Row to append to `mutation_records`
pub(crate) struct NewMutation<'a> {
    pub artifact_id: &'a str,
    pub version_id: &'a str,
    pub parent_id: Option<&'a str>,
    pub origin: &'a MutationOrigin,
    pub change_summary: &'a str,
    pub payload: &'a Value,
    pub status: MutationStatus,
}

pub(crate) async fn insert_artifact(
    conn: &mut SqliteConnection,
    artifact: &NewArtifact<'_>,
) -> Result<(), sqlx::Error> {
    let metadata_json = Value::Object(artifact.metadata.clone()).to_string();
    sqlx::query(
        r#"
        INSERT INTO artifacts (id, type, storage_backend, storage_key, payload_json, metadata_json, session_id, workspace_id, created_at)
        VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(artifact.id)
    .bind(artifact.artifact_type)
    .bind(artifact.storage_backend.as_str())
    .bind(artifact.storage_key)
    .bind(artifact.payload.map(Value::to_string))
    .bind(metadata_json)
    .bind(artifact.session_id)
    .bind(artifact.workspace_id)
    .bind(now_rfc3339())
    .execute(&mut *conn)
    .await?;
    Ok(())
}

pub(crate) async fn insert_mutation(
    conn: &mut SqliteConnection,
    mutation: &NewMutation<'_>,
) -> ElyonResult<i64> {
    let origin_json = serde_json::to_string(mutation.origin)?;
    let result = sqlx::query(
        r#"
        INSERT INTO mutation_records (artifact_id, version_id, parent_id, timestamp, origin_json, change_summary, payload_json, checksum, status)
        VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(mutation.artifact_id)
    .bind(mutation.version_id)
    .bind(mutation.parent_id)
    .bind(now_rfc3339())
    .bind(origin_json)
    .bind(mutation.change_summary)
    .bind(mutation.payload.to_string())
    .bind(payload_checksum(mutation.payload))
    .bind(mutation.status.to_string())
    .execute(&mut *conn)
    .await?;
    Ok(result.last_insert_rowid())
}

/// Latest version id of an artifact, committed or ghost
pub(crate) async fn latest_version_id(
    conn: &mut SqliteConnection,
    artifact_id: &str,
) -> Result<Option<String>, sqlx::Error> {
    let row: Option<(String,)> = sqlx::query_as(
        "SELECT version_id FROM mutation_records WHERE artifact_id = ? ORDER BY timestamp DESC, id DESC LIMIT 1",
    )
    .bind(artifact_id)
    .fetch_optional(&mut *conn)
    .await?;
    Ok(row.map(|r| r.0))
}

/// Fields an update may touch
#[derive(Debug, Default)]
struct ArtifactChanges {
    name: Option<String>,
    payload: Option<Value>,
    metadata: Option<Map<String, Value>>,
    artifact_type: Option<String>,
    session_id: Option<String>,
    workspace_id: Option<String>,
}

impl From<ArtifactUpdate> for ArtifactChanges {
    fn from(update: ArtifactUpdate) -> Self {
        Self {
            name: update.name,
            payload: update.payload,
            metadata: update.metadata,
            ..Default::default()
        }
    }
}

impl From<ArtifactCreate> for ArtifactChanges {
    fn from(create: ArtifactCreate) -> Self {
        Self {
            name: Some(create.name),
            payload: create.payload,
            metadata: create.metadata,
            artifact_type: Some(create.artifact_type),
            session_id: create.session_id,
            workspace_id: create.workspace_id,
        }
    }
}

/// Artifact produced by execution (LLM output or a command)
#[derive(Debug, Clone)]
pub struct GeneratedArtifact {
    pub id: String,
    pub artifact_type: String,
    pub payload: Value,
    pub metadata: Map<String, Value>,
    pub session_id: String,
    pub workspace_id: Option<String>,
}

/// Artifact service
#[derive(Clone)]
pub struct ArtifactService {
    store: Arc<dyn ArtifactStore>,
}

impl ArtifactService {
    /// Create a new artifact service over the active store
    pub fn new(store: Arc<dyn ArtifactStore>) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &Arc<dyn ArtifactStore> {
        &self.store
    }

    /// Get an artifact with its mutations and rehydrated payload
    pub async fn get_artifact(
        &self,
        pool: &SqlitePool,
        artifact_id: &str,
        token: Option<&str>,
    ) -> ElyonResult<Artifact> {
        self.find_artifact(pool, artifact_id, token)
            .await?
            .ok_or_else(|| ElyonError::ArtifactNotFound(artifact_id.to_string()))
    }

    /// Cheap existence check without loading mutations or payload
    pub async fn artifact_exists(&self, pool: &SqlitePool, artifact_id: &str) -> ElyonResult<bool> {
        let row: Option<(String,)> = sqlx::query_as("SELECT id FROM artifacts WHERE id = ?")
            .bind(artifact_id)
            .fetch_optional(pool)
            .await?;
        Ok(row.is_some())
    }

    /// Like [`Self::get_artifact`] but `None` when the artifact is unknown
    pub async fn find_artifact(
        &self,
        pool: &SqlitePool,
        artifact_id: &str,
        token: Option<&str>,
    ) -> ElyonResult<Option<Artifact>> {
        let row = sqlx::query_as::<_, ArtifactRow>(&format!(
            "SELECT {} FROM artifacts WHERE id = ?",
            ARTIFACT_COLUMNS
        ))
        .bind(artifact_id)
        .fetch_optional(pool)
        .await?;

        let Some(row) = row else {
            return Ok(None);
        };

        let mut artifact = artifact_from_row(row);
        artifact.mutations = self.list_mutations(pool, artifact_id).await?;
        self.rehydrate(&mut artifact, token).await;
        Ok(Some(artifact))
    }

    /// Load an externally stored payload into `artifact.payload`.
    ///
    /// Store failures are logged and leave the payload empty.
    async fn rehydrate(&self, artifact: &mut Artifact, token: Option<&str>) {
        if artifact.storage_backend == StorageBackend::Db.as_str() {
            return;
        }
        let Some(key) = artifact.storage_key.as_deref() else {
            return;
        };

        match self.store.load(&artifact.id, key, token).await {
            Ok(content) => artifact.payload = content,
            Err(e) => {
                tracing::warn!(
                    artifact_id = %artifact.id,
                    storage_key = %key,
                    "Failed to load artifact payload: {}",
                    e
                );
            }
        }
    }

    /// All mutations of an artifact, oldest first
    pub async fn list_mutations(
        &self,
        pool: &SqlitePool,
        artifact_id: &str,
    ) -> ElyonResult<Vec<MutationRecord>> {
        let rows = sqlx::query_as::<_, MutationRow>(&format!(
            "SELECT {} FROM mutation_records WHERE artifact_id = ? ORDER BY timestamp ASC, id ASC",
            MUTATION_COLUMNS
        ))
        .bind(artifact_id)
        .fetch_all(pool)
        .await?;

        Ok(rows.into_iter().map(mutation_from_row).collect())
    }

    /// One version of an artifact
    pub async fn get_version(
        &self,
        pool: &SqlitePool,
        artifact_id: &str,
        version_id: &str,
    ) -> ElyonResult<MutationRecord> {
        let row = sqlx::query_as::<_, MutationRow>(&format!(
            "SELECT {} FROM mutation_records WHERE artifact_id = ? AND version_id = ? ORDER BY timestamp DESC, id DESC LIMIT 1",
            MUTATION_COLUMNS
        ))
        .bind(artifact_id)
        .bind(version_id)
        .fetch_optional(pool)
        .await?
        .ok_or_else(|| ElyonError::VersionNotFound {
            artifact_id: artifact_id.to_string(),
            version_id: version_id.to_string(),
        })?;

        Ok(mutation_from_row(row))
    }

    /// Artifacts owned by a session, oldest first
    pub async fn list_session_artifacts(
        &self,
        pool: &SqlitePool,
        session_id: &str,
        token: Option<&str>,
    ) -> ElyonResult<Vec<Artifact>> {
        let rows = sqlx::query_as::<_, ArtifactRow>(&format!(
            "SELECT {} FROM artifacts WHERE session_id = ? ORDER BY created_at ASC",
            ARTIFACT_COLUMNS
        ))
        .bind(session_id)
        .fetch_all(pool)
        .await?;

        let mut artifacts = Vec::with_capacity(rows.len());
        for row in rows {
            let mut artifact = artifact_from_row(row);
            self.rehydrate(&mut artifact, token).await;
            artifacts.push(artifact);
        }
        Ok(artifacts)
    }

    /// Artifacts by id, in request order; unknown ids are skipped
    pub async fn get_many(
        &self,
        pool: &SqlitePool,
        artifact_ids: &[String],
        token: Option<&str>,
    ) -> ElyonResult<Vec<Artifact>> {
        let mut artifacts = Vec::with_capacity(artifact_ids.len());
        for id in artifact_ids {
            if let Some(artifact) = self.find_artifact(pool, id, token).await? {
                artifacts.push(artifact);
            }
        }
        Ok(artifacts)
    }

    /// Create an artifact, or update it when the id already exists
    pub async fn create_or_update_artifact(
        &self,
        pool: &SqlitePool,
        request: ArtifactCreate,
        token: Option<&str>,
    ) -> ElyonResult<Artifact> {
        if let Some(id) = request.id.as_deref() {
            if !is_valid_artifact_id(id) {
                return Err(ElyonError::Validation(format!("Invalid artifact id: {:?}", id)));
            }
            if let Some(existing) = self.find_artifact(pool, id, token).await? {
                return self
                    .apply_update(pool, existing, request.into(), token)
                    .await;
            }
        }

        self.create_artifact(pool, request, token).await
    }

    /// Insert a new artifact with its `v1` mutation.
    ///
    /// A concurrent insert of the same id surfaces as a uniqueness violation;
    /// the request is then applied as an update of the winner's row.
    pub(crate) async fn create_artifact(
        &self,
        pool: &SqlitePool,
        request: ArtifactCreate,
        token: Option<&str>,
    ) -> ElyonResult<Artifact> {
        let id = request
            .id
            .clone()
            .unwrap_or_else(|| Uuid::new_v4().to_string());

        let mut metadata = request.metadata.clone().unwrap_or_default();
        metadata.insert("name".to_string(), Value::String(request.name.clone()));

        let payload = request.payload.clone().unwrap_or(Value::Null);
        let storage_key = self.store.save(&id, &payload, token).await?;
        let backend = self.store.backend();
        let origin = MutationOrigin::manual_edit(request.session_id.as_deref());

        let mut tx = pool.begin().await?;
        let inserted = insert_artifact(
            &mut tx,
            &NewArtifact {
                id: &id,
                artifact_type: &request.artifact_type,
                metadata: &metadata,
                payload: (backend == StorageBackend::Db).then_some(&payload),
                session_id: Some(request.session_id.as_deref().unwrap_or(DEFAULT_SESSION_ID)),
                workspace_id: request.workspace_id.as_deref(),
                storage_backend: backend,
                storage_key: Some(&storage_key),
            },
        )
        .await;

        if let Err(e) = inserted {
            drop(tx);
            if is_unique_violation(&e) && request.id.is_some() {
                tracing::info!(artifact_id = %id, "Artifact created concurrently, applying as update");
                if let Some(existing) = self.find_artifact(pool, &id, token).await? {
                    return self
                        .apply_update(pool, existing, request.into(), token)
                        .await;
                }
            }
            return Err(e.into());
        }

        insert_mutation(
            &mut tx,
            &NewMutation {
                artifact_id: &id,
                version_id: "v1",
                parent_id: None,
                origin: &origin,
                change_summary: "Initial upload/creation",
                payload: &payload,
                status: MutationStatus::Committed,
            },
        )
        .await?;
        tx.commit().await?;

        tracing::debug!(artifact_id = %id, backend = %backend, "Artifact created");

        let mut artifact = self.get_artifact(pool, &id, token).await?;
        if artifact.payload.is_none() && !payload.is_null() {
            artifact.payload = Some(payload);
        }
        Ok(artifact)
    }

    /// Apply a partial update to an existing artifact
    pub async fn update_artifact(
        &self,
        pool: &SqlitePool,
        artifact_id: &str,
        update: ArtifactUpdate,
        token: Option<&str>,
    ) -> ElyonResult<Artifact> {
        let existing = self.get_artifact(pool, artifact_id, token).await?;
        self.apply_update(pool, existing, update.into(), token).await
    }

    async fn apply_update(
        &self,
        pool: &SqlitePool,
        existing: Artifact,
        changes: ArtifactChanges,
        token: Option<&str>,
    ) -> ElyonResult<Artifact> {
        let mut metadata = existing.metadata.clone();
        if let Some(incoming) = changes.metadata {
            metadata.extend(incoming);
        }
        if let Some(name) = changes.name.filter(|n| !n.is_empty()) {
            metadata.insert("name".to_string(), Value::String(name));
        }

        // Only write through the store when the payload changed
        let stored = match &changes.payload {
            Some(payload) => Some(self.store.save(&existing.id, payload, token).await?),
            None => None,
        };
        let backend = self.store.backend();

        let mut tx = pool.begin().await?;
        let parent_id = latest_version_id(&mut tx, &existing.id).await?;
        let version_id = next_version_id(parent_id.as_deref());

        if let (Some(payload), Some(key)) = (&changes.payload, &stored) {
            let in_row = (backend == StorageBackend::Db).then(|| payload.to_string());
            sqlx::query(
                "UPDATE artifacts SET storage_backend = ?, storage_key = ?, payload_json = ? WHERE id = ?",
            )
            .bind(backend.as_str())
            .bind(key)
            .bind(in_row)
            .bind(&existing.id)
            .execute(&mut *tx)
            .await?;
        }

        let session_id = changes
            .session_id
            .filter(|s| !s.is_empty())
            .or(existing.session_id.clone());
        sqlx::query(
            r#"
            UPDATE artifacts
            SET type = ?, metadata_json = ?, session_id = ?, workspace_id = ?
            WHERE id = ?
            "#,
        )
        .bind(
            changes
                .artifact_type
                .as_deref()
                .filter(|t| !t.is_empty())
                .unwrap_or(&existing.artifact_type),
        )
        .bind(Value::Object(metadata).to_string())
        .bind(&session_id)
        .bind(changes.workspace_id.as_ref().or(existing.workspace_id.as_ref()))
        .bind(&existing.id)
        .execute(&mut *tx)
        .await?;

        if let Some(payload) = &changes.payload {
            insert_mutation(
                &mut tx,
                &NewMutation {
                    artifact_id: &existing.id,
                    version_id: &version_id,
                    parent_id: parent_id.as_deref(),
                    origin: &MutationOrigin::manual_edit(session_id.as_deref()),
                    change_summary: "Update via manual edit or sync",
                    payload,
                    status: MutationStatus::Committed,
                },
            )
            .await?;
        }
        tx.commit().await?;

        tracing::debug!(
            artifact_id = %existing.id,
            version_id = %version_id,
            payload_changed = changes.payload.is_some(),
            "Artifact updated"
        );

        let mut artifact = self.get_artifact(pool, &existing.id, token).await?;
        if artifact.payload.is_none() {
            artifact.payload = changes.payload.or(existing.payload);
        }
        Ok(artifact)
    }

    /// Record a speculative (ghost) mutation without touching the artifact head
    pub async fn create_adhoc_mutation(
        &self,
        pool: &SqlitePool,
        artifact_id: &str,
        payload: Value,
        origin: MutationOrigin,
        version_id: &str,
        parent_id: Option<&str>,
    ) -> ElyonResult<MutationRecord> {
        if !self.artifact_exists(pool, artifact_id).await? {
            return Err(ElyonError::ArtifactNotFound(artifact_id.to_string()));
        }
        if version_id.trim().is_empty() {
            return Err(ElyonError::Validation("version_id must not be empty".into()));
        }

        let mut conn = pool.acquire().await?;
        let id = insert_mutation(
            &mut conn,
            &NewMutation {
                artifact_id,
                version_id,
                parent_id,
                origin: &origin,
                change_summary: "AI Optimization (Ghost Preview)",
                payload: &payload,
                status: MutationStatus::Ghost,
            },
        )
        .await?;
        drop(conn);

        let row = sqlx::query_as::<_, MutationRow>(&format!(
            "SELECT {} FROM mutation_records WHERE id = ?",
            MUTATION_COLUMNS
        ))
        .bind(id)
        .fetch_one(pool)
        .await?;
        Ok(mutation_from_row(row))
    }

    /// Persist an execution result as a new artifact with a `v1` mutation.
    ///
    /// Generated ids never overwrite an existing artifact: a taken id is
    /// replaced by `<id>_<8 hex>`, an unusable one by a uuid. The returned
    /// artifact carries the id actually stored.
    pub async fn create_generated(
        &self,
        pool: &SqlitePool,
        generated: &GeneratedArtifact,
        origin: &MutationOrigin,
        change_summary: &str,
        status: MutationStatus,
    ) -> ElyonResult<Artifact> {
        let base = if is_valid_artifact_id(&generated.id) {
            generated.id.clone()
        } else {
            tracing::warn!(artifact_id = %generated.id, "Generated artifact id is not usable, replacing it");
            Uuid::new_v4().to_string()
        };
        let mut id = base.clone();

        for _ in 0..GENERATED_ID_ATTEMPTS {
            if !self.artifact_exists(pool, &id).await? {
                let inserted = self
                    .insert_generated(pool, &id, generated, origin, change_summary, status)
                    .await?;
                if inserted {
                    let mut artifact = self.get_artifact(pool, &id, None).await?;
                    if artifact.payload.is_none() {
                        artifact.payload = Some(generated.payload.clone());
                    }
                    return Ok(artifact);
                }
            }

            let suffix: String = Uuid::new_v4().simple().to_string().chars().take(8).collect();
            let next = format!("{}_{}", base, suffix);
            tracing::info!(artifact_id = %id, replacement = %next, "Generated artifact id taken");
            id = next;
        }

        Err(ElyonError::Internal(format!(
            "Could not allocate an id for generated artifact {}",
            generated.id
        )))
    }

    /// Write the payload and insert row + `v1` mutation under `id`.
    ///
    /// Returns `false` when another writer claimed the id first.
    async fn insert_generated(
        &self,
        pool: &SqlitePool,
        id: &str,
        generated: &GeneratedArtifact,
        origin: &MutationOrigin,
        change_summary: &str,
        status: MutationStatus,
    ) -> ElyonResult<bool> {
        let storage_key = self.store.save(id, &generated.payload, None).await?;
        let backend = self.store.backend();

        let mut tx = pool.begin().await?;
        let inserted = insert_artifact(
            &mut tx,
            &NewArtifact {
                id,
                artifact_type: &generated.artifact_type,
                metadata: &generated.metadata,
                payload: (backend == StorageBackend::Db).then_some(&generated.payload),
                session_id: Some(&generated.session_id),
                workspace_id: generated.workspace_id.as_deref(),
                storage_backend: backend,
                storage_key: Some(&storage_key),
            },
        )
        .await;
        match inserted {
            Ok(_) => {}
            Err(e) if is_unique_violation(&e) => return Ok(false),
            Err(e) => return Err(e.into()),
        }

        insert_mutation(
            &mut tx,
            &NewMutation {
                artifact_id: id,
                version_id: "v1",
                parent_id: None,
                origin,
                change_summary,
                payload: &generated.payload,
                status,
            },
        )
        .await?;
        tx.commit().await?;
        Ok(true)
    }
}
