//! Run record CRUD and the status state machine.

use anyhow::Result;
use chrono::{DateTime, Utc};
use rusqlite::{params, OptionalExtension, Row};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::database::Database;

/// Persisted run status.
///
/// Transitions are monotonic: Pending -> Processing -> Completed | Failed.
/// Terminal statuses are never left; retrying means creating a new run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RunStatus {
    Pending,
    Processing,
    Completed,
    Failed,
}

impl RunStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            RunStatus::Pending => "pending",
            RunStatus::Processing => "processing",
            RunStatus::Completed => "completed",
            RunStatus::Failed => "failed",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "pending" => Some(RunStatus::Pending),
            "processing" => Some(RunStatus::Processing),
            "completed" => Some(RunStatus::Completed),
            "failed" => Some(RunStatus::Failed),
            _ => None,
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, RunStatus::Completed | RunStatus::Failed)
    }
}

/// One documentation update request and its processing state.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunRecord {
    pub id: Uuid,
    pub query_text: String,
    pub status: RunStatus,
    pub status_message: Option<String>,
    pub error_message: Option<String>,
    pub created_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}

/// Run persistence over the `queries` table.
#[derive(Clone)]
pub struct RunStore {
    db: Database,
}

impl RunStore {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    pub fn create_run(&self, query_text: &str) -> Result<RunRecord> {
        let id = Uuid::new_v4();
        let now = Utc::now();
        self.db.conn().execute(
            "INSERT INTO queries (id, query_text, status, created_at)
             VALUES (?1, ?2, ?3, ?4)",
            params![
                id.to_string(),
                query_text,
                RunStatus::Pending.as_str(),
                now.to_rfc3339()
            ],
        )?;
        Ok(RunRecord {
            id,
            query_text: query_text.to_string(),
            status: RunStatus::Pending,
            status_message: None,
            error_message: None,
            created_at: now,
            completed_at: None,
        })
    }

    pub fn load_run(&self, id: Uuid) -> Result<Option<RunRecord>> {
        let record = self
            .db
            .conn()
            .query_row(
                "SELECT id, query_text, status, status_message, error_message,
                        created_at, completed_at
                 FROM queries WHERE id = ?1",
                [id.to_string()],
                Self::map_row,
            )
            .optional()?;
        Ok(record)
    }

    /// Persist a status transition.
    ///
    /// `message`, `error` and `completed_at` overwrite their columns only
    /// when supplied; passing `None` leaves the stored value untouched.
    pub fn update_status(
        &self,
        id: Uuid,
        status: RunStatus,
        message: Option<&str>,
        error: Option<&str>,
        completed_at: Option<DateTime<Utc>>,
    ) -> Result<()> {
        let changed = self.db.conn().execute(
            "UPDATE queries SET
                status = ?2,
                status_message = COALESCE(?3, status_message),
                error_message = COALESCE(?4, error_message),
                completed_at = COALESCE(?5, completed_at)
             WHERE id = ?1",
            params![
                id.to_string(),
                status.as_str(),
                message,
                error,
                completed_at.map(|t| t.to_rfc3339()),
            ],
        )?;
        anyhow::ensure!(changed == 1, "run {id} not found");
        Ok(())
    }

    /// Defensive failure write used by the worker's safety net.
    ///
    /// Only ever moves a non-terminal run to Failed; a run the orchestrator
    /// already finished is left alone. Returns whether a write happened.
    pub fn mark_failed(&self, id: Uuid, error: &str) -> Result<bool> {
        let changed = self.db.conn().execute(
            "UPDATE queries SET status = ?2, error_message = ?3
             WHERE id = ?1 AND status NOT IN ('completed', 'failed')",
            params![id.to_string(), RunStatus::Failed.as_str(), error],
        )?;
        Ok(changed == 1)
    }

    /// Oldest run still waiting to be picked up.
    pub fn oldest_pending(&self) -> Result<Option<RunRecord>> {
        let record = self
            .db
            .conn()
            .query_row(
                "SELECT id, query_text, status, status_message, error_message,
                        created_at, completed_at
                 FROM queries WHERE status = 'pending'
                 ORDER BY created_at ASC LIMIT 1",
                [],
                Self::map_row,
            )
            .optional()?;
        Ok(record)
    }

    /// Delete terminal runs older than the cutoff. Suggestions cascade.
    pub fn delete_terminal_older_than(&self, cutoff: DateTime<Utc>) -> Result<usize> {
        let deleted = self.db.conn().execute(
            "DELETE FROM queries
             WHERE status IN ('completed', 'failed') AND created_at < ?1",
            [cutoff.to_rfc3339()],
        )?;
        Ok(deleted)
    }

    fn map_row(row: &Row<'_>) -> rusqlite::Result<RunRecord> {
        let id: String = row.get(0)?;
        let status: String = row.get(2)?;
        let created_at: String = row.get(5)?;
        let completed_at: Option<String> = row.get(6)?;
        Ok(RunRecord {
            id: Uuid::parse_str(&id).unwrap_or_default(),
            query_text: row.get(1)?,
            status: RunStatus::parse(&status).unwrap_or(RunStatus::Failed),
            status_message: row.get(3)?,
            error_message: row.get(4)?,
            created_at: parse_timestamp(&created_at),
            completed_at: completed_at.as_deref().map(parse_timestamp),
        })
    }
}

fn parse_timestamp(raw: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(raw)
        .map(|t| t.with_timezone(&Utc))
        .unwrap_or_else(|_| Utc::now())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn store() -> RunStore {
        RunStore::new(Database::open_in_memory().unwrap())
    }

    #[test]
    fn create_and_load_round_trip() {
        let runs = store();
        let run = runs.create_run("update auth docs").unwrap();
        let loaded = runs.load_run(run.id).unwrap().unwrap();
        assert_eq!(loaded.query_text, "update auth docs");
        assert_eq!(loaded.status, RunStatus::Pending);
        assert!(loaded.completed_at.is_none());
    }

    #[test]
    fn load_missing_run_is_none() {
        let runs = store();
        assert!(runs.load_run(Uuid::new_v4()).unwrap().is_none());
    }

    #[test]
    fn status_transition_preserves_unset_columns() {
        let runs = store();
        let run = runs.create_run("q").unwrap();

        runs.update_status(
            run.id,
            RunStatus::Processing,
            Some("Starting analysis..."),
            None,
            None,
        )
        .unwrap();
        runs.update_status(run.id, RunStatus::Completed, None, None, Some(Utc::now()))
            .unwrap();

        let loaded = runs.load_run(run.id).unwrap().unwrap();
        assert_eq!(loaded.status, RunStatus::Completed);
        // The processing message survives the completion write.
        assert_eq!(loaded.status_message.as_deref(), Some("Starting analysis..."));
        assert!(loaded.completed_at.is_some());
    }

    #[test]
    fn mark_failed_skips_terminal_runs() {
        let runs = store();
        let run = runs.create_run("q").unwrap();
        runs.update_status(run.id, RunStatus::Completed, Some("done"), None, Some(Utc::now()))
            .unwrap();

        assert!(!runs.mark_failed(run.id, "worker died").unwrap());
        let loaded = runs.load_run(run.id).unwrap().unwrap();
        assert_eq!(loaded.status, RunStatus::Completed);

        let stuck = runs.create_run("q2").unwrap();
        runs.update_status(stuck.id, RunStatus::Processing, None, None, None)
            .unwrap();
        assert!(runs.mark_failed(stuck.id, "worker died").unwrap());
        let loaded = runs.load_run(stuck.id).unwrap().unwrap();
        assert_eq!(loaded.status, RunStatus::Failed);
        assert_eq!(loaded.error_message.as_deref(), Some("worker died"));
    }

    #[test]
    fn cleanup_deletes_only_old_terminal_runs() {
        let runs = store();
        let old_done = runs.create_run("old").unwrap();
        runs.update_status(old_done.id, RunStatus::Completed, None, None, Some(Utc::now()))
            .unwrap();
        let old_pending = runs.create_run("still pending").unwrap();

        let cutoff = Utc::now() + Duration::days(1);
        let deleted = runs.delete_terminal_older_than(cutoff).unwrap();
        assert_eq!(deleted, 1);
        assert!(runs.load_run(old_done.id).unwrap().is_none());
        assert!(runs.load_run(old_pending.id).unwrap().is_some());
    }

    #[test]
    fn oldest_pending_orders_by_creation() {
        let runs = store();
        let first = runs.create_run("first").unwrap();
        let _second = runs.create_run("second").unwrap();
        runs.update_status(first.id, RunStatus::Processing, None, None, None)
            .unwrap();

        let next = runs.oldest_pending().unwrap().unwrap();
        assert_eq!(next.query_text, "second");
    }
}
