//! Database migrations for core tables

/// Migration SQL for core tables
pub const MIGRATION_SQL: &str = r#"
-- users: local mirror of authenticated identities
CREATE TABLE IF NOT EXISTS users (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    user_id TEXT UNIQUE NOT NULL,
    profile_json TEXT NOT NULL DEFAULT '{}',
    enabled INTEGER NOT NULL DEFAULT 1,
    active_workspace_id TEXT,
    created_at TEXT NOT NULL DEFAULT (datetime('now'))
);
CREATE INDEX IF NOT EXISTS idx_users_user_id ON users(user_id);

-- workspaces
CREATE TABLE IF NOT EXISTS workspaces (
    id TEXT PRIMARY KEY,
    name TEXT NOT NULL,
    state_json TEXT NOT NULL DEFAULT '{"panes":[],"visibleIds":[]}',
    is_archived INTEGER NOT NULL DEFAULT 0,
    created_at TEXT NOT NULL DEFAULT (datetime('now')),
    updated_at TEXT NOT NULL DEFAULT (datetime('now'))
);
CREATE INDEX IF NOT EXISTS idx_workspaces_archived ON workspaces(is_archived);

-- workspace_members
CREATE TABLE IF NOT EXISTS workspace_members (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    workspace_id TEXT NOT NULL REFERENCES workspaces(id) ON DELETE CASCADE,
    user_id INTEGER NOT NULL REFERENCES users(id) ON DELETE CASCADE,
    role TEXT NOT NULL DEFAULT 'VIEWER',
    UNIQUE(workspace_id, user_id)
);
CREATE INDEX IF NOT EXISTS idx_members_user ON workspace_members(user_id);

-- artifacts: current head of every artifact
CREATE TABLE IF NOT EXISTS artifacts (
    id TEXT PRIMARY KEY,
    type TEXT NOT NULL,
    storage_backend TEXT NOT NULL DEFAULT 'db',
    storage_key TEXT,
    payload_json TEXT,
    metadata_json TEXT NOT NULL DEFAULT '{}',
    session_id TEXT,
    workspace_id TEXT,
    created_at TEXT NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_artifacts_session ON artifacts(session_id);
CREATE INDEX IF NOT EXISTS idx_artifacts_workspace_type ON artifacts(workspace_id, type);

-- mutation_records: append-only version log
CREATE TABLE IF NOT EXISTS mutation_records (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    artifact_id TEXT NOT NULL REFERENCES artifacts(id) ON DELETE CASCADE,
    version_id TEXT NOT NULL,
    parent_id TEXT,
    timestamp TEXT NOT NULL,
    origin_json TEXT NOT NULL,
    change_summary TEXT,
    payload_json TEXT,
    checksum TEXT,
    status TEXT NOT NULL DEFAULT 'committed'
);
CREATE INDEX IF NOT EXISTS idx_mutations_artifact ON mutation_records(artifact_id, timestamp);

-- archived_panes: pane snapshots removed from a workspace layout
CREATE TABLE IF NOT EXISTS archived_panes (
    id TEXT PRIMARY KEY,
    workspace_id TEXT NOT NULL REFERENCES workspaces(id) ON DELETE CASCADE,
    user_id INTEGER REFERENCES users(id) ON DELETE SET NULL,
    pane_json TEXT NOT NULL,
    archived_at TEXT NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_archived_panes_workspace ON archived_panes(workspace_id)
"#;

/// Run core migration
pub async fn run_migration(pool: &sqlx::SqlitePool) -> Result<(), sqlx::Error> {
    for statement in MIGRATION_SQL.split(';') {
        let statement = statement.trim();
        if statement.is_empty() {
            continue;
        }
        let result = sqlx::query(statement).execute(pool).await;
        if let Err(ref e) = result {
            // Ignore duplicate table/index errors
            if !e.to_string().contains("already exists") {
                result?;
            }
        }
    }

    tracing::info!("Core database migration completed");
    Ok(())
}
