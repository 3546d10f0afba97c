//! SQLite connection wrapper and schema bootstrap.

use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};
use parking_lot::{Mutex, MutexGuard};
use rusqlite::Connection;

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS queries (
    id              TEXT PRIMARY KEY,
    query_text      TEXT NOT NULL,
    status          TEXT NOT NULL DEFAULT 'pending',
    status_message  TEXT,
    error_message   TEXT,
    created_at      TEXT NOT NULL,
    completed_at    TEXT
);
CREATE INDEX IF NOT EXISTS idx_queries_status ON queries(status);

CREATE TABLE IF NOT EXISTS documents (
    id          TEXT PRIMARY KEY,
    title       TEXT,
    file_path   TEXT NOT NULL,
    created_at  TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS document_sections (
    id              TEXT PRIMARY KEY,
    document_id     TEXT NOT NULL REFERENCES documents(id) ON DELETE CASCADE,
    section_title   TEXT,
    content         TEXT NOT NULL,
    section_order   INTEGER NOT NULL DEFAULT 0,
    embedding_id    TEXT
);
CREATE INDEX IF NOT EXISTS idx_sections_document ON document_sections(document_id);

CREATE TABLE IF NOT EXISTS section_dependencies (
    id                  TEXT PRIMARY KEY,
    source_section_id   TEXT NOT NULL REFERENCES document_sections(id) ON DELETE CASCADE,
    target_section_id   TEXT NOT NULL REFERENCES document_sections(id) ON DELETE CASCADE,
    dependency_type     TEXT NOT NULL,
    UNIQUE(source_section_id, target_section_id, dependency_type)
);

CREATE TABLE IF NOT EXISTS edit_suggestions (
    id              TEXT PRIMARY KEY,
    query_id        TEXT NOT NULL REFERENCES queries(id) ON DELETE CASCADE,
    document_id     TEXT,
    section_id      TEXT NOT NULL,
    original_text   TEXT NOT NULL,
    suggested_text  TEXT NOT NULL,
    reasoning       TEXT NOT NULL,
    confidence      REAL NOT NULL,
    status          TEXT NOT NULL DEFAULT 'pending',
    created_at      TEXT NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_suggestions_query ON edit_suggestions(query_id);

CREATE TABLE IF NOT EXISTS run_events (
    id          INTEGER PRIMARY KEY AUTOINCREMENT,
    run_id      TEXT NOT NULL,
    event       TEXT NOT NULL,
    created_at  INTEGER NOT NULL,
    expires_at  INTEGER
);
CREATE INDEX IF NOT EXISTS idx_run_events_run ON run_events(run_id, id);
";

/// Shared handle to the SQLite database.
///
/// Cheap to clone; all clones share one connection behind a mutex. Every
/// statement the core runs is short, so contention stays negligible.
#[derive(Clone)]
pub struct Database {
    conn: Arc<Mutex<Connection>>,
}

impl Database {
    pub fn open(path: &Path) -> Result<Self> {
        let conn = Connection::open(path)
            .with_context(|| format!("failed to open database at {}", path.display()))?;
        Self::configure(&conn)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// In-memory database, mainly for tests.
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory().context("failed to open in-memory database")?;
        Self::configure(&conn)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    fn configure(conn: &Connection) -> Result<()> {
        conn.execute_batch(
            "PRAGMA journal_mode = WAL;
             PRAGMA foreign_keys = ON;
             PRAGMA busy_timeout = 5000;",
        )
        .context("failed to configure database")?;
        conn.execute_batch(SCHEMA)
            .context("failed to initialize database schema")?;
        Ok(())
    }

    pub(crate) fn conn(&self) -> MutexGuard<'_, Connection> {
        self.conn.lock()
    }

    /// Connectivity probe used by the health check.
    pub fn ping(&self) -> Result<()> {
        let value: i64 = self.conn().query_row("SELECT 1", [], |row| row.get(0))?;
        anyhow::ensure!(value == 1, "unexpected ping result");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn schema_bootstraps_and_pings() {
        let db = Database::open_in_memory().unwrap();
        db.ping().unwrap();

        // Re-running the bootstrap is harmless.
        db.conn().execute_batch(SCHEMA).unwrap();
    }

    #[test]
    fn opens_on_disk() {
        let dir = tempfile::tempdir().unwrap();
        let db = Database::open(&dir.path().join("docscribe.db")).unwrap();
        db.ping().unwrap();
    }
}
