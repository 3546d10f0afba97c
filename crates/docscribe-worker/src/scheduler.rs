//! The worker loop.
//!
//! Polls for pending runs and executes them one at a time, interleaved
//! with the periodic maintenance pass.

use std::sync::Arc;

use anyhow::Result;
use serde::Serialize;

use docscribe_core::agent::ProcessOutcome;
use docscribe_core::ai::CompletionClient;
use docscribe_core::deps::RebuildReport;
use docscribe_core::search::SearchIndex;
use docscribe_core::storage::{Database, RunStore, SqliteRepository};

use crate::config::WorkerConfig;
use crate::jobs::{process_query_job, JobContext};
use crate::maintenance::{
    cleanup_old_runs, health_check, purge_expired_events, rebuild_dependencies,
    verify_index_integrity, CleanupReport, HealthReport, IntegrityReport,
};

/// What one maintenance pass accomplished. Jobs that failed are `None`;
/// a failing job never stops the others.
#[derive(Debug, Clone, Serialize)]
pub struct MaintenanceSummary {
    pub cleanup: Option<CleanupReport>,
    pub integrity: Option<IntegrityReport>,
    pub dependency_rebuild: Option<RebuildReport>,
    pub purged_events: Option<usize>,
    pub health: HealthReport,
}

pub struct Worker {
    config: WorkerConfig,
    db: Database,
    repo: SqliteRepository,
    runs: RunStore,
    search: Arc<dyn SearchIndex>,
    ctx: JobContext,
}

impl Worker {
    pub fn new(
        db: Database,
        search: Arc<dyn SearchIndex>,
        completion: Arc<dyn CompletionClient>,
        config: WorkerConfig,
    ) -> Self {
        let repo = SqliteRepository::new(db.clone());
        let runs = RunStore::new(db.clone());
        let ctx = JobContext::new(
            db.clone(),
            Arc::new(repo.clone()),
            Arc::clone(&search),
            completion,
            &config,
        );
        Self {
            config,
            db,
            repo,
            runs,
            search,
            ctx,
        }
    }

    /// Run forever, until the process is stopped.
    pub async fn run(&self) {
        tracing::info!(
            poll_interval = ?self.config.poll_interval,
            maintenance_interval = ?self.config.maintenance_interval,
            "worker started"
        );
        let mut poll = tokio::time::interval(self.config.poll_interval);
        let mut maintenance = tokio::time::interval(self.config.maintenance_interval);

        loop {
            tokio::select! {
                _ = poll.tick() => {
                    if let Err(e) = self.tick().await {
                        tracing::error!("worker tick failed: {e:#}");
                    }
                }
                _ = maintenance.tick() => {
                    self.run_maintenance().await;
                }
            }
        }
    }

    /// Pick up and process the oldest pending run, if any.
    pub async fn tick(&self) -> Result<Option<ProcessOutcome>> {
        let Some(run) = self.runs.oldest_pending()? else {
            return Ok(None);
        };

        match process_query_job(&self.ctx, run.id).await {
            Ok(outcome) => Ok(Some(outcome)),
            Err(e) => {
                // The job already reconciled the run to a terminal status.
                tracing::error!(run_id = %run.id, "job failed: {e}");
                Ok(None)
            }
        }
    }

    /// One full maintenance pass.
    pub async fn run_maintenance(&self) -> MaintenanceSummary {
        tracing::info!("running maintenance pass");

        let cleanup = log_failure(
            "cleanup",
            cleanup_old_runs(&self.runs, self.config.retention_days),
        );
        let integrity = log_failure(
            "integrity check",
            verify_index_integrity(&self.repo, self.search.as_ref()).await,
        );
        let dependency_rebuild =
            log_failure("dependency rebuild", rebuild_dependencies(&self.repo));
        let purged_events = log_failure("event purge", purge_expired_events(&self.db));
        let health = health_check(&self.db, self.search.as_ref()).await;

        if !health.healthy {
            tracing::error!(?health, "system health degraded");
        }

        MaintenanceSummary {
            cleanup,
            integrity,
            dependency_rebuild,
            purged_events,
            health,
        }
    }
}

fn log_failure<T>(job: &str, result: Result<T>) -> Option<T> {
    match result {
        Ok(value) => Some(value),
        Err(e) => {
            tracing::error!(job, "maintenance job failed: {e:#}");
            None
        }
    }
}
