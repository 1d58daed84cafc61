//! `SQLite` run ledger.
//!
//! Every finished analysis run is recorded so that batch runs can skip
//! documents already analysed and the operator can review history.

mod connection;
mod runs;
mod schema;

pub use connection::Database;
pub use runs::{count_runs, has_completed, list_recent_runs, record_run, RunRecord};
pub use schema::{migrate, SCHEMA_VERSION};

/// Open the ledger schema, applying migrations.
///
/// # Errors
///
/// Returns an error if migrations fail.
pub fn init_storage(db: &Database) -> crate::Result<()> {
    db.with_conn(|conn| {
        migrate(conn)?;
        tracing::info!(path = %db.path(), "Run ledger ready, schema version {SCHEMA_VERSION}");
        Ok(())
    })
}
