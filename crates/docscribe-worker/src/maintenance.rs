//! Scheduled maintenance jobs.
//!
//! Each job is idempotent and safe to re-run on overlap; the scheduler
//! fires them on a fixed interval.

use anyhow::Result;
use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use uuid::Uuid;

use docscribe_core::deps::{rebuild_dependency_graph, RebuildReport};
use docscribe_core::events::durable::{purge_expired, DurableEventLog, DurableEventStream};
use docscribe_core::events::{EventKind, EventPublisher, EventStream, QueryEvent};
use docscribe_core::search::SearchIndex;
use docscribe_core::storage::{Database, RunStore, SqliteRepository};

/// Ids reported per integrity check, to bound report size.
const MISSING_IDS_CAP: usize = 100;

#[derive(Debug, Clone, Serialize)]
pub struct CleanupReport {
    pub deleted_count: usize,
    pub cutoff: DateTime<Utc>,
}

/// Delete terminal runs older than the retention window. Their
/// suggestions cascade with them.
pub fn cleanup_old_runs(runs: &RunStore, retention_days: i64) -> Result<CleanupReport> {
    let cutoff = Utc::now() - Duration::days(retention_days);
    let deleted_count = runs.delete_terminal_older_than(cutoff)?;
    tracing::info!(deleted_count, %cutoff, "cleaned up old runs");
    Ok(CleanupReport {
        deleted_count,
        cutoff,
    })
}

#[derive(Debug, Clone, Serialize)]
pub struct IntegrityReport {
    pub total_sections: usize,
    pub indexed_count: usize,
    pub missing_count: usize,
    /// Section ids lacking an embedding, capped at 100.
    pub missing_ids: Vec<String>,
    pub index_initialized: bool,
}

/// Cross-check stored sections against the semantic index.
pub async fn verify_index_integrity(
    repo: &SqliteRepository,
    search: &dyn SearchIndex,
) -> Result<IntegrityReport> {
    let sections = repo.all_sections()?;
    let stats = search.stats().await?;

    let mut missing_ids: Vec<String> = sections
        .iter()
        .filter(|s| s.embedding_id.is_none())
        .map(|s| s.id.to_string())
        .collect();
    let missing_count = missing_ids.len();
    missing_ids.truncate(MISSING_IDS_CAP);

    if missing_count > 0 {
        tracing::warn!(missing_count, "sections missing embeddings");
    }

    Ok(IntegrityReport {
        total_sections: sections.len(),
        indexed_count: stats.count,
        missing_count,
        missing_ids,
        index_initialized: stats.initialized,
    })
}

/// Re-derive the section dependency graph from scratch.
pub fn rebuild_dependencies(repo: &SqliteRepository) -> Result<RebuildReport> {
    rebuild_dependency_graph(repo)
}

/// Drop expired durable event log entries.
pub fn purge_expired_events(db: &Database) -> Result<usize> {
    let purged = purge_expired(db)?;
    if purged > 0 {
        tracing::info!(purged, "purged expired event log entries");
    }
    Ok(purged)
}

#[derive(Debug, Clone, Copy, Serialize)]
pub struct HealthReport {
    pub healthy: bool,
    pub database: bool,
    pub search_index: bool,
    pub event_bus: bool,
}

/// Probe each dependency independently; one failure never masks another.
pub async fn health_check(db: &Database, search: &dyn SearchIndex) -> HealthReport {
    let database = match db.ping() {
        Ok(()) => true,
        Err(e) => {
            tracing::error!("database health check failed: {e:#}");
            false
        }
    };

    let search_index = match search.stats().await {
        Ok(stats) => stats.initialized,
        Err(e) => {
            tracing::error!("search index health check failed: {e:#}");
            false
        }
    };

    let event_bus = match probe_event_bus(db).await {
        Ok(ok) => ok,
        Err(e) => {
            tracing::error!("event bus health check failed: {e:#}");
            false
        }
    };

    HealthReport {
        healthy: database && search_index && event_bus,
        database,
        search_index,
        event_bus,
    }
}

/// Round-trip one event through the durable log. The probe's entries get
/// a TTL at close and age out with the regular purge.
async fn probe_event_bus(db: &Database) -> Result<bool> {
    let probe_id = format!("health-probe-{}", Uuid::new_v4());
    let log = DurableEventLog::new(db.clone(), probe_id.clone());
    log.publish(QueryEvent::new(
        EventKind::Status,
        serde_json::json!({ "status": "probe" }),
        probe_id.clone(),
    ))
    .await?;
    log.close().await?;

    let mut stream = DurableEventStream::new(db.clone(), probe_id)
        .with_poll_interval(std::time::Duration::from_millis(10))
        .with_timeout(std::time::Duration::from_secs(5));
    let Some(event) = stream.next_event().await else {
        return Ok(false);
    };
    Ok(event.event == EventKind::Status)
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::Result;
    use async_trait::async_trait;

    use docscribe_core::search::{IndexStats, SearchHit};
    use docscribe_core::storage::RunStatus;

    struct StubIndex {
        count: usize,
        initialized: bool,
    }

    #[async_trait]
    impl SearchIndex for StubIndex {
        async fn search(
            &self,
            _query: &str,
            _max_results: usize,
            _filter: Option<&str>,
        ) -> Result<Vec<SearchHit>> {
            Ok(vec![])
        }

        async fn search_by_path(&self, _pattern: &str, _max: usize) -> Result<Vec<SearchHit>> {
            Ok(vec![])
        }

        async fn stats(&self) -> Result<IndexStats> {
            Ok(IndexStats {
                count: self.count,
                initialized: self.initialized,
            })
        }
    }

    #[test]
    fn cleanup_honors_the_retention_window() {
        let db = Database::open_in_memory().unwrap();
        let runs = RunStore::new(db);
        let done = runs.create_run("old").unwrap();
        runs.update_status(done.id, RunStatus::Completed, None, None, Some(Utc::now()))
            .unwrap();
        let pending = runs.create_run("new").unwrap();

        // 30 days of retention leaves a fresh run alone.
        let report = cleanup_old_runs(&runs, 30).unwrap();
        assert_eq!(report.deleted_count, 0);

        // Zero retention deletes terminal runs immediately, but never
        // touches non-terminal ones.
        let report = cleanup_old_runs(&runs, 0).unwrap();
        assert_eq!(report.deleted_count, 1);
        assert!(runs.load_run(pending.id).unwrap().is_some());
    }

    #[tokio::test]
    async fn integrity_report_counts_missing_embeddings() {
        let db = Database::open_in_memory().unwrap();
        let repo = SqliteRepository::new(db);
        let doc = repo.create_document(Some("Guide"), "docs/guide.md").unwrap();
        let indexed = repo.create_section(doc.id, Some("A"), "a", 0).unwrap();
        repo.set_embedding_id(indexed.id, Some("emb-1")).unwrap();
        let missing = repo.create_section(doc.id, Some("B"), "b", 1).unwrap();

        let index = StubIndex {
            count: 1,
            initialized: true,
        };
        let report = verify_index_integrity(&repo, &index).await.unwrap();
        assert_eq!(report.total_sections, 2);
        assert_eq!(report.indexed_count, 1);
        assert_eq!(report.missing_count, 1);
        assert_eq!(report.missing_ids, vec![missing.id.to_string()]);
        assert!(report.index_initialized);
    }

    #[tokio::test]
    async fn health_check_probes_independently() {
        let db = Database::open_in_memory().unwrap();

        let healthy = health_check(
            &db,
            &StubIndex {
                count: 0,
                initialized: true,
            },
        )
        .await;
        assert!(healthy.healthy);
        assert!(healthy.event_bus);

        // A dead index degrades that probe only.
        let degraded = health_check(
            &db,
            &StubIndex {
                count: 0,
                initialized: false,
            },
        )
        .await;
        assert!(!degraded.healthy);
        assert!(!degraded.search_index);
        assert!(degraded.database);
        assert!(degraded.event_bus);
    }

    #[tokio::test]
    async fn probe_entries_age_out_with_the_purge() {
        let db = Database::open_in_memory().unwrap();
        let report = health_check(
            &db,
            &StubIndex {
                count: 0,
                initialized: true,
            },
        )
        .await;
        assert!(report.healthy);

        // Probe rows carry a TTL; nothing is expired yet.
        assert_eq!(purge_expired_events(&db).unwrap(), 0);
    }
}
