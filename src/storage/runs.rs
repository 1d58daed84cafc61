//! Run ledger operations.

use rusqlite::{params, Connection, Row};
use serde::Serialize;

use crate::error::StorageError;
use crate::Result;

/// One finished analysis run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RunRecord {
    pub id: String,
    pub document_id: String,
    pub model: Option<String>,
    /// Terminal state label, e.g. `done` or `failed_generation`.
    pub state: String,
    pub coverage: Option<String>,
    pub error: Option<String>,
    /// Characters generated.
    pub chars: i64,
    pub auto_triggered: bool,
    /// Unix seconds.
    pub started_at: i64,
    /// Unix seconds.
    pub finished_at: i64,
}

impl RunRecord {
    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            document_id: row.get(1)?,
            model: row.get(2)?,
            state: row.get(3)?,
            coverage: row.get(4)?,
            error: row.get(5)?,
            chars: row.get(6)?,
            auto_triggered: row.get(7)?,
            started_at: row.get(8)?,
            finished_at: row.get(9)?,
        })
    }
}

const COLUMNS: &str =
    "id, document_id, model, state, coverage, error, chars, auto_triggered, started_at, finished_at";

/// Store a finished run.
///
/// # Errors
///
/// Returns an error if the insert fails.
pub fn record_run(conn: &Connection, run: &RunRecord) -> Result<()> {
    conn.execute(
        &format!("INSERT INTO runs ({COLUMNS}) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)"),
        params![
            run.id,
            run.document_id,
            run.model,
            run.state,
            run.coverage,
            run.error,
            run.chars,
            run.auto_triggered,
            run.started_at,
            run.finished_at,
        ],
    )
    .map_err(|e| StorageError::Database(format!("failed to record run: {e}")))?;

    tracing::trace!(id = %run.id, document = %run.document_id, state = %run.state, "Recorded run");
    Ok(())
}

/// Most recent runs first.
///
/// # Errors
///
/// Returns an error if the query fails.
pub fn list_recent_runs(conn: &Connection, limit: usize) -> Result<Vec<RunRecord>> {
    let limit = i64::try_from(limit).unwrap_or(i64::MAX);
    let mut stmt = conn
        .prepare(&format!(
            "SELECT {COLUMNS} FROM runs ORDER BY finished_at DESC, rowid DESC LIMIT ?"
        ))
        .map_err(|e| StorageError::Database(e.to_string()))?;

    let runs = stmt
        .query_map([limit], RunRecord::from_row)
        .map_err(|e| StorageError::Database(e.to_string()))?
        .collect::<std::result::Result<Vec<_>, _>>()
        .map_err(|e| StorageError::Database(format!("failed to read runs: {e}")))?;

    Ok(runs)
}

/// Whether `document_id` has a successful run on record.
///
/// # Errors
///
/// Returns an error if the query fails.
pub fn has_completed(conn: &Connection, document_id: &str) -> Result<bool> {
    conn.query_row(
        "SELECT EXISTS(SELECT 1 FROM runs WHERE document_id = ? AND state = 'done')",
        [document_id],
        |row| row.get(0),
    )
    .map_err(|e| StorageError::Database(e.to_string()).into())
}

/// Total runs recorded.
///
/// # Errors
///
/// Returns an error if the query fails.
pub fn count_runs(conn: &Connection) -> Result<i64> {
    conn.query_row("SELECT COUNT(*) FROM runs", [], |row| row.get(0))
        .map_err(|e| StorageError::Database(e.to_string()).into())
}
