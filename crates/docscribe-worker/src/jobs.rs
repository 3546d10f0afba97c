//! The query processing job.
//!
//! Wraps one orchestrator run for background execution: durable event
//! publishing, a hard wall-clock limit, retry on transient failures, and
//! reconciliation so a run never stays stuck in a non-terminal status.

use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;
use uuid::Uuid;

use docscribe_core::agent::{ProcessOutcome, QueryOrchestrator};
use docscribe_core::ai::CompletionClient;
use docscribe_core::events::{DurableEventLog, EventEmitter};
use docscribe_core::search::SearchIndex;
use docscribe_core::storage::{Database, DocumentRepository, RunStore};

use crate::config::WorkerConfig;
use crate::retry::{with_retry, RetryConfig};

#[derive(Debug, Error)]
pub enum JobError {
    /// The run exceeded the hard time limit. Never retried.
    #[error("Job exceeded time limit of {}s", .0.as_secs())]
    Timeout(Duration),
    #[error(transparent)]
    Infrastructure(#[from] anyhow::Error),
}

/// Everything a job needs besides the run id.
pub struct JobContext {
    pub db: Database,
    pub repo: Arc<dyn DocumentRepository>,
    pub search: Arc<dyn SearchIndex>,
    pub completion: Arc<dyn CompletionClient>,
    pub time_limit: Duration,
    pub retry: RetryConfig,
}

impl JobContext {
    pub fn new(
        db: Database,
        repo: Arc<dyn DocumentRepository>,
        search: Arc<dyn SearchIndex>,
        completion: Arc<dyn CompletionClient>,
        config: &WorkerConfig,
    ) -> Self {
        Self {
            db,
            repo,
            search,
            completion,
            time_limit: config.job_time_limit,
            retry: RetryConfig {
                max_attempts: config.max_attempts,
                base_delay: config.retry_base_delay,
                ..RetryConfig::default()
            },
        }
    }
}

/// Execute one run to a terminal state.
///
/// A run that finishes in Failed status is a successful job: the outcome
/// is reported, not retried. The retry policy applies to infrastructure
/// errors only; the orchestrator absorbs its own failures into the
/// outcome, so the timeout is currently the sole error this job can
/// produce and it is never retried. The event stream is closed on every
/// path.
pub async fn process_query_job(
    ctx: &JobContext,
    run_id: Uuid,
) -> Result<ProcessOutcome, JobError> {
    tracing::info!(%run_id, "starting query processing job");

    let publisher = Arc::new(DurableEventLog::new(ctx.db.clone(), run_id.to_string()));
    let emitter = EventEmitter::new(publisher, run_id.to_string());
    let runs = RunStore::new(ctx.db.clone());
    let orchestrator = QueryOrchestrator::new(
        runs.clone(),
        Arc::clone(&ctx.repo),
        Arc::clone(&ctx.search),
        Arc::clone(&ctx.completion),
        emitter.clone(),
    );

    let result = with_retry(
        &ctx.retry,
        || async {
            match tokio::time::timeout(ctx.time_limit, orchestrator.process(run_id)).await {
                Ok(outcome) => Ok(outcome),
                Err(_) => Err(JobError::Timeout(ctx.time_limit)),
            }
        },
        |e| matches!(e, JobError::Infrastructure(_)),
    )
    .await;

    match &result {
        Ok(outcome) => {
            tracing::info!(
                %run_id,
                status = outcome.status.as_str(),
                suggestions = outcome.suggestions_created,
                "query processing job finished"
            );
        }
        Err(e) => {
            // Safety net: the orchestrator may have died mid-run; make sure
            // the run record reflects the failure.
            let error = e.to_string();
            tracing::error!(%run_id, "query processing job failed: {error}");
            match runs.mark_failed(run_id, &error) {
                Ok(true) => tracing::warn!(%run_id, "reconciled stuck run to failed"),
                Ok(false) => {}
                Err(write_err) => {
                    tracing::error!(%run_id, "failed to reconcile run: {write_err:#}");
                }
            }
            emitter.error(&error, None).await;
        }
    }

    emitter.close().await;
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::Result;
    use async_trait::async_trait;
    use parking_lot::Mutex;
    use std::collections::VecDeque;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use docscribe_core::ai::{AssistantTurn, ModelMessage};
    use docscribe_core::events::{DurableEventStream, EventKind, EventStream};
    use docscribe_core::search::{IndexStats, SearchHit};
    use docscribe_core::storage::{RunStatus, SqliteRepository};
    use docscribe_core::tools::ToolSpec;

    struct EmptyIndex;

    #[async_trait]
    impl SearchIndex for EmptyIndex {
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
                count: 0,
                initialized: true,
            })
        }
    }

    enum Script {
        Turns(Mutex<VecDeque<AssistantTurn>>),
        Fail,
        Hang,
    }

    struct ScriptedClient {
        script: Script,
        calls: AtomicUsize,
    }

    impl ScriptedClient {
        fn finishing() -> Self {
            Self {
                script: Script::Turns(Mutex::new(VecDeque::new())),
                calls: AtomicUsize::new(0),
            }
        }

        fn failing() -> Self {
            Self {
                script: Script::Fail,
                calls: AtomicUsize::new(0),
            }
        }

        fn hanging() -> Self {
            Self {
                script: Script::Hang,
                calls: AtomicUsize::new(0),
            }
        }
    }

    #[async_trait]
    impl CompletionClient for ScriptedClient {
        async fn complete(
            &self,
            _transcript: &[ModelMessage],
            _tools: &[ToolSpec],
        ) -> Result<AssistantTurn> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            match &self.script {
                Script::Turns(turns) => Ok(turns.lock().pop_front().unwrap_or(AssistantTurn {
                    content: Some("Done.".into()),
                    tool_calls: vec![],
                })),
                Script::Fail => anyhow::bail!("model unavailable"),
                Script::Hang => {
                    std::future::pending::<()>().await;
                    unreachable!()
                }
            }
        }
    }

    fn context(
        client: ScriptedClient,
        time_limit: Duration,
    ) -> (JobContext, RunStore, Uuid, Arc<ScriptedClient>) {
        let db = Database::open_in_memory().unwrap();
        let repo = SqliteRepository::new(db.clone());
        let runs = RunStore::new(db.clone());
        let run = runs.create_run("update auth docs").unwrap();

        let client = Arc::new(client);
        let ctx = JobContext {
            db,
            repo: Arc::new(repo),
            search: Arc::new(EmptyIndex),
            completion: client.clone(),
            time_limit,
            retry: RetryConfig {
                max_attempts: 3,
                base_delay: Duration::from_millis(1),
                max_delay: Duration::from_millis(10),
                jitter: false,
            },
        };
        (ctx, runs, run.id, client)
    }

    async fn drain_durable(db: Database, run_id: Uuid) -> Vec<EventKind> {
        let mut stream = DurableEventStream::new(db, run_id.to_string())
            .with_poll_interval(Duration::from_millis(5))
            .with_heartbeat_interval(Duration::from_secs(3600))
            .with_timeout(Duration::from_secs(7200));
        let mut kinds = Vec::new();
        while let Some(event) = stream.next_event().await {
            kinds.push(event.event);
        }
        kinds
    }

    #[tokio::test]
    async fn successful_job_closes_the_durable_stream() {
        let (ctx, runs, run_id, _client) =
            context(ScriptedClient::finishing(), Duration::from_secs(60));

        let outcome = process_query_job(&ctx, run_id).await.unwrap();
        assert_eq!(outcome.status, RunStatus::Completed);
        assert_eq!(
            runs.load_run(run_id).unwrap().unwrap().status,
            RunStatus::Completed
        );

        let kinds = drain_durable(ctx.db.clone(), run_id).await;
        assert_eq!(
            kinds,
            vec![EventKind::Status, EventKind::Status, EventKind::Completed]
        );
    }

    #[tokio::test]
    async fn failed_run_is_a_job_success_without_retries() {
        let (ctx, runs, run_id, client) =
            context(ScriptedClient::failing(), Duration::from_secs(60));

        let outcome = process_query_job(&ctx, run_id).await.unwrap();
        assert_eq!(outcome.status, RunStatus::Failed);
        assert_eq!(
            runs.load_run(run_id).unwrap().unwrap().status,
            RunStatus::Failed
        );

        // One model call: the domain failure was not retried.
        assert_eq!(client.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn timeout_reconciles_and_is_not_retried() {
        let (ctx, runs, run_id, _client) =
            context(ScriptedClient::hanging(), Duration::from_millis(50));

        let err = process_query_job(&ctx, run_id).await.unwrap_err();
        assert!(matches!(err, JobError::Timeout(_)));

        let run = runs.load_run(run_id).unwrap().unwrap();
        assert_eq!(run.status, RunStatus::Failed);
        assert!(run
            .error_message
            .unwrap()
            .contains("Job exceeded time limit"));

        let kinds = drain_durable(ctx.db.clone(), run_id).await;
        // Processing status from the first attempt, then the error.
        assert_eq!(kinds, vec![EventKind::Status, EventKind::Error]);
    }
}
