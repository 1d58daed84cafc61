//! `SQLite` connection for the run ledger.
//!
//! One connection behind a `parking_lot::Mutex`, in WAL mode.

use parking_lot::Mutex;
use rusqlite::{Connection, OpenFlags};
use std::path::Path;
use std::sync::Arc;

use crate::error::StorageError;
use crate::Result;

/// Shared ledger connection. Cloning shares the same connection.
#[derive(Clone)]
pub struct Database {
    conn: Arc<Mutex<Connection>>,
    path: String,
}

impl Database {
    /// Open (or create) the ledger at `path`, creating parent directories.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be created, opened or configured.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let conn = Connection::open_with_flags(
            path,
            OpenFlags::SQLITE_OPEN_READ_WRITE
                | OpenFlags::SQLITE_OPEN_CREATE
                | OpenFlags::SQLITE_OPEN_NO_MUTEX,
        )
        .map_err(|e| StorageError::Database(format!("failed to open {}: {e}", path.display())))?;

        Self::wrap(conn, path.to_string_lossy().into_owned())
    }

    /// Open a throwaway in-memory ledger.
    ///
    /// # Errors
    ///
    /// Returns an error if `SQLite` cannot allocate the database.
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()
            .map_err(|e| StorageError::Database(format!("failed to open in-memory database: {e}")))?;
        Self::wrap(conn, ":memory:".to_string())
    }

    fn wrap(conn: Connection, path: String) -> Result<Self> {
        conn.execute_batch(
            "
            PRAGMA journal_mode = WAL;
            PRAGMA synchronous = NORMAL;
            PRAGMA busy_timeout = 5000;
            ",
        )
        .map_err(|e| StorageError::Database(format!("failed to configure database: {e}")))?;

        tracing::debug!(%path, "Run ledger opened");
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
            path,
        })
    }

    /// Run `f` with exclusive access to the connection.
    ///
    /// # Errors
    ///
    /// Whatever `f` returns.
    pub fn with_conn<F, T>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&Connection) -> Result<T>,
    {
        let conn = self.conn.lock();
        f(&conn)
    }

    #[must_use]
    pub fn path(&self) -> &str {
        &self.path
    }

    /// Cheap liveness query.
    ///
    /// # Errors
    ///
    /// Returns an error if the connection is unusable.
    pub fn health_check(&self) -> Result<()> {
        self.with_conn(|conn| {
            conn.query_row("SELECT 1", [], |_| Ok(()))
                .map_err(|e| StorageError::Database(format!("health check failed: {e}")).into())
        })
    }
}

impl std::fmt::Debug for Database {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Database")
            .field("path", &self.path)
            .finish_non_exhaustive()
    }
}
