//! Versioned ledger schema.

use rusqlite::Connection;

use crate::error::StorageError;
use crate::Result;

/// Current schema version.
pub const SCHEMA_VERSION: i32 = 1;

/// Apply pending migrations.
///
/// # Errors
///
/// Returns an error if a migration fails.
pub fn migrate(conn: &Connection) -> Result<()> {
    conn.execute(
        "CREATE TABLE IF NOT EXISTS schema_migrations (
            version INTEGER PRIMARY KEY,
            applied_at INTEGER NOT NULL
        )",
        [],
    )
    .map_err(|e| StorageError::Migration(format!("failed to create migrations table: {e}")))?;

    let current = current_version(conn)?;
    tracing::debug!(current, target = SCHEMA_VERSION, "Checking ledger migrations");

    if current < 1 {
        migrate_v1(conn)?;
    }

    Ok(())
}

fn current_version(conn: &Connection) -> Result<i32> {
    conn.query_row(
        "SELECT COALESCE(MAX(version), 0) FROM schema_migrations",
        [],
        |row| row.get(0),
    )
    .map_err(|e| StorageError::Migration(format!("failed to read schema version: {e}")).into())
}

fn migrate_v1(conn: &Connection) -> Result<()> {
    tracing::info!("Applying ledger migration v1");

    conn.execute_batch(
        r"
        CREATE TABLE IF NOT EXISTS runs (
            id TEXT PRIMARY KEY,
            document_id TEXT NOT NULL,
            model TEXT,
            state TEXT NOT NULL,
            coverage TEXT,
            error TEXT,
            chars INTEGER NOT NULL DEFAULT 0,
            auto_triggered INTEGER NOT NULL DEFAULT 0,
            started_at INTEGER NOT NULL,
            finished_at INTEGER NOT NULL
        );

        CREATE INDEX IF NOT EXISTS idx_runs_document ON runs(document_id);
        CREATE INDEX IF NOT EXISTS idx_runs_finished_at ON runs(finished_at);
        ",
    )
    .map_err(|e| StorageError::Migration(format!("v1 migration failed: {e}")))?;

    conn.execute(
        "INSERT INTO schema_migrations (version, applied_at) VALUES (1, ?)",
        [chrono::Utc::now().timestamp()],
    )
    .map_err(|e| StorageError::Migration(format!("failed to record migration: {e}")))?;

    Ok(())
}
