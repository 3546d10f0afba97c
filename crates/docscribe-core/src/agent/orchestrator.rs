//! The run orchestrator.
//!
//! Owns one run end to end: status transitions, the iteration loop, tool
//! dispatch, and the final summary. Tool failures stay inside the loop as
//! error-valued results; only infrastructure failures (model transport,
//! database) abort the run.

use std::sync::Arc;

use anyhow::Result;
use chrono::Utc;
use uuid::Uuid;

use super::prompts;
use super::state::AgentState;
use crate::ai::{CompletionClient, ModelMessage};
use crate::events::EventEmitter;
use crate::search::SearchIndex;
use crate::storage::{DocumentRepository, RunStatus, RunStore};
use crate::tools::{tool_specs, ToolExecutor};

/// Hard ceiling on model round-trips per run.
pub const MAX_ITERATIONS: usize = 15;

/// Final report for one processed run.
#[derive(Debug, Clone)]
pub struct ProcessOutcome {
    pub query_id: Uuid,
    pub status: RunStatus,
    pub searches_performed: usize,
    pub sections_analyzed: usize,
    pub suggestions_created: usize,
    pub error: Option<String>,
}

pub struct QueryOrchestrator {
    runs: RunStore,
    repo: Arc<dyn DocumentRepository>,
    search: Arc<dyn SearchIndex>,
    completion: Arc<dyn CompletionClient>,
    emitter: EventEmitter,
    max_iterations: usize,
}

impl QueryOrchestrator {
    pub fn new(
        runs: RunStore,
        repo: Arc<dyn DocumentRepository>,
        search: Arc<dyn SearchIndex>,
        completion: Arc<dyn CompletionClient>,
        emitter: EventEmitter,
    ) -> Self {
        Self {
            runs,
            repo,
            search,
            completion,
            emitter,
            max_iterations: MAX_ITERATIONS,
        }
    }

    pub fn with_max_iterations(mut self, max_iterations: usize) -> Self {
        self.max_iterations = max_iterations;
        self
    }

    /// Process one run to a terminal status.
    pub async fn process(&self, run_id: Uuid) -> ProcessOutcome {
        let run = match self.runs.load_run(run_id) {
            Ok(Some(run)) => run,
            Ok(None) => {
                tracing::error!(%run_id, "run not found");
                self.emitter.error("Query not found", None).await;
                return self.failed_outcome(run_id, "Query not found", None);
            }
            Err(e) => {
                tracing::error!(%run_id, "failed to load run: {e:#}");
                self.emitter.error("Query not found", Some(&e.to_string())).await;
                return self.failed_outcome(run_id, "Query not found", None);
            }
        };

        let mut state = AgentState::new(run_id, run.query_text);
        match self.run_loop(&mut state).await {
            Ok(()) => {
                let stats = state.stats();
                ProcessOutcome {
                    query_id: run_id,
                    status: RunStatus::Completed,
                    searches_performed: stats.searches_performed,
                    sections_analyzed: stats.sections_analyzed,
                    suggestions_created: stats.suggestions_created,
                    error: None,
                }
            }
            Err(e) => {
                let error = e.to_string();
                tracing::error!(%run_id, "run failed: {e:#}");
                if let Err(write_err) =
                    self.runs
                        .update_status(run_id, RunStatus::Failed, None, Some(&error), None)
                {
                    tracing::error!(%run_id, "failed to record failure: {write_err:#}");
                }
                self.emitter.error(&error, None).await;
                self.failed_outcome(run_id, &error, Some(&state))
            }
        }
    }

    async fn run_loop(&self, state: &mut AgentState) -> Result<()> {
        let run_id = state.run_id;
        self.runs.update_status(
            run_id,
            RunStatus::Processing,
            Some("Starting analysis..."),
            None,
            None,
        )?;
        self.emitter.status("processing", "Starting analysis...").await;

        state.transcript.push(ModelMessage::system(prompts::SYSTEM_PROMPT));
        state
            .transcript
            .push(ModelMessage::user(prompts::initial_user_message(
                &state.request_text,
            )));

        let specs = tool_specs();
        let executor = ToolExecutor::new(
            Arc::clone(&self.repo),
            Arc::clone(&self.search),
            self.emitter.clone(),
        );

        let mut finished = false;
        for iteration in 1..=self.max_iterations {
            tracing::debug!(%run_id, iteration, "agent iteration");

            let turn = self.completion.complete(&state.transcript, &specs).await?;
            let tool_calls = turn.tool_calls.clone();
            state.transcript.push(turn.into_message());

            if tool_calls.is_empty() {
                self.emitter
                    .status("finalizing", "Completing analysis...")
                    .await;
                finished = true;
                break;
            }

            for call in tool_calls {
                self.emitter.tool_call(&call.name, &call.arguments).await;
                let result = executor.execute(state, &call.name, &call.arguments).await;
                state
                    .transcript
                    .push(ModelMessage::tool_result(call.id, result.to_json_string()));
            }
        }

        if !finished {
            tracing::warn!(
                %run_id,
                max_iterations = self.max_iterations,
                "iteration ceiling reached before the agent finished"
            );
        }

        let stats = state.stats();
        let message = format!("Generated {} suggestions", stats.suggestions_created);
        self.runs.update_status(
            run_id,
            RunStatus::Completed,
            Some(&message),
            None,
            Some(Utc::now()),
        )?;
        self.emitter.completed(stats.suggestions_created).await;

        tracing::info!(
            %run_id,
            searches = stats.searches_performed,
            sections = stats.sections_analyzed,
            suggestions = stats.suggestions_created,
            "run completed"
        );
        Ok(())
    }

    fn failed_outcome(
        &self,
        run_id: Uuid,
        error: &str,
        state: Option<&AgentState>,
    ) -> ProcessOutcome {
        let stats = state.map(AgentState::stats);
        ProcessOutcome {
            query_id: run_id,
            status: RunStatus::Failed,
            searches_performed: stats.map_or(0, |s| s.searches_performed),
            sections_analyzed: stats.map_or(0, |s| s.sections_analyzed),
            suggestions_created: stats.map_or(0, |s| s.suggestions_created),
            error: Some(error.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use parking_lot::Mutex;
    use serde_json::json;
    use std::collections::VecDeque;

    use crate::ai::{AssistantTurn, Role, ToolCallRequest};
    use crate::events::{DirectEventBus, EventKind, EventStream, QueryEvent};
    use crate::search::{IndexStats, SearchHit};
    use crate::storage::{Database, SqliteRepository};
    use crate::tools::ToolSpec;

    struct ScriptedClient {
        turns: Mutex<VecDeque<AssistantTurn>>,
        transcripts: Mutex<Vec<Vec<ModelMessage>>>,
        error_on_empty: bool,
    }

    impl ScriptedClient {
        fn new(turns: Vec<AssistantTurn>) -> Self {
            Self {
                turns: Mutex::new(turns.into()),
                transcripts: Mutex::new(Vec::new()),
                error_on_empty: false,
            }
        }

        fn failing() -> Self {
            Self {
                turns: Mutex::new(VecDeque::new()),
                transcripts: Mutex::new(Vec::new()),
                error_on_empty: true,
            }
        }
    }

    #[async_trait]
    impl CompletionClient for ScriptedClient {
        async fn complete(
            &self,
            transcript: &[ModelMessage],
            _tools: &[ToolSpec],
        ) -> Result<AssistantTurn> {
            self.transcripts.lock().push(transcript.to_vec());
            match self.turns.lock().pop_front() {
                Some(turn) => Ok(turn),
                None if self.error_on_empty => anyhow::bail!("model unavailable"),
                None => Ok(AssistantTurn {
                    content: Some("All done.".into()),
                    tool_calls: vec![],
                }),
            }
        }
    }

    struct EmptyIndex;

    #[async_trait]
    impl crate::search::SearchIndex for EmptyIndex {
        async fn search(
            &self,
            _query: &str,
            _max_results: usize,
            _file_path_filter: Option<&str>,
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

    fn tool_turn(name: &str, args: serde_json::Value) -> AssistantTurn {
        AssistantTurn {
            content: None,
            tool_calls: vec![ToolCallRequest {
                id: format!("call-{}", Uuid::new_v4()),
                name: name.to_string(),
                arguments: args,
            }],
        }
    }

    struct Harness {
        orchestrator: QueryOrchestrator,
        runs: RunStore,
        stream: crate::events::bus::DirectEventStream,
        client: Arc<ScriptedClient>,
        run_id: Uuid,
    }

    fn harness(client: ScriptedClient) -> Harness {
        let db = Database::open_in_memory().unwrap();
        let repo = SqliteRepository::new(db.clone());
        let runs = RunStore::new(db);
        let run = runs.create_run("update auth docs").unwrap();

        let (bus, stream) = DirectEventBus::channel(run.id.to_string());
        let emitter = EventEmitter::new(Arc::new(bus), run.id.to_string());
        let client = Arc::new(client);
        let orchestrator = QueryOrchestrator::new(
            runs.clone(),
            Arc::new(repo),
            Arc::new(EmptyIndex),
            client.clone(),
            emitter,
        );

        Harness {
            orchestrator,
            runs,
            stream,
            client,
            run_id: run.id,
        }
    }

    async fn drain(mut stream: crate::events::bus::DirectEventStream) -> Vec<QueryEvent> {
        let mut events = Vec::new();
        while let Ok(Some(event)) =
            tokio::time::timeout(std::time::Duration::from_millis(50), stream.next_event()).await
        {
            events.push(event);
        }
        events
    }

    #[tokio::test]
    async fn run_completes_through_search_and_finalize() {
        let h = harness(ScriptedClient::new(vec![
            tool_turn("semantic_search", json!({ "query": "auth tokens" })),
            AssistantTurn {
                content: Some("No edits needed.".into()),
                tool_calls: vec![],
            },
        ]));

        let outcome = h.orchestrator.process(h.run_id).await;
        assert_eq!(outcome.status, RunStatus::Completed);
        assert_eq!(outcome.searches_performed, 1);
        assert_eq!(outcome.suggestions_created, 0);
        assert!(outcome.error.is_none());

        let run = h.runs.load_run(h.run_id).unwrap().unwrap();
        assert_eq!(run.status, RunStatus::Completed);
        assert_eq!(run.status_message.as_deref(), Some("Generated 0 suggestions"));
        assert!(run.completed_at.is_some());

        let kinds: Vec<EventKind> = drain(h.stream).await.iter().map(|e| e.event).collect();
        assert_eq!(
            kinds,
            vec![
                EventKind::Status,
                EventKind::ToolCall,
                EventKind::SearchComplete,
                EventKind::Status,
                EventKind::Completed,
            ]
        );
    }

    #[tokio::test]
    async fn model_failure_marks_run_failed() {
        let h = harness(ScriptedClient::failing());

        let outcome = h.orchestrator.process(h.run_id).await;
        assert_eq!(outcome.status, RunStatus::Failed);
        assert_eq!(outcome.error.as_deref(), Some("model unavailable"));

        let run = h.runs.load_run(h.run_id).unwrap().unwrap();
        assert_eq!(run.status, RunStatus::Failed);
        assert_eq!(run.error_message.as_deref(), Some("model unavailable"));
        assert!(run.completed_at.is_none());

        let events = drain(h.stream).await;
        assert!(events
            .iter()
            .any(|e| e.event == EventKind::Error && e.data["error"] == "model unavailable"));
    }

    #[tokio::test]
    async fn missing_run_fails_without_status_write() {
        let h = harness(ScriptedClient::new(vec![]));
        let missing = Uuid::new_v4();

        let outcome = h.orchestrator.process(missing).await;
        assert_eq!(outcome.status, RunStatus::Failed);
        assert_eq!(outcome.error.as_deref(), Some("Query not found"));
        assert!(h.runs.load_run(missing).unwrap().is_none());

        let events = drain(h.stream).await;
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].data["error"], "Query not found");
    }

    #[tokio::test]
    async fn iteration_ceiling_still_completes() {
        // The model never stops asking for searches.
        let turns: Vec<AssistantTurn> = (0..10)
            .map(|i| tool_turn("semantic_search", json!({ "query": format!("q{i}") })))
            .collect();
        let h = harness(ScriptedClient::new(turns));
        let orchestrator = h.orchestrator.with_max_iterations(3);

        let outcome = orchestrator.process(h.run_id).await;
        assert_eq!(outcome.status, RunStatus::Completed);
        assert_eq!(outcome.searches_performed, 3);

        let run = h.runs.load_run(h.run_id).unwrap().unwrap();
        assert_eq!(run.status, RunStatus::Completed);

        // The model is consulted exactly once per iteration.
        assert_eq!(h.client.transcripts.lock().len(), 3);
    }

    #[tokio::test]
    async fn every_tool_call_gets_a_correlated_reply() {
        let h = harness(ScriptedClient::new(vec![
            tool_turn("semantic_search", json!({ "query": "auth" })),
            tool_turn("no_such_tool", json!({})),
            AssistantTurn {
                content: Some("Done.".into()),
                tool_calls: vec![],
            },
        ]));

        let outcome = h.orchestrator.process(h.run_id).await;
        assert_eq!(outcome.status, RunStatus::Completed);

        // The final transcript seen by the model holds one tool reply per
        // request, each addressed to the request's id.
        let transcripts = h.client.transcripts.lock();
        let last = transcripts.last().unwrap();
        let requests: Vec<&ToolCallRequest> = last
            .iter()
            .filter(|m| m.role == Role::Assistant)
            .flat_map(|m| m.tool_calls.iter())
            .collect();
        let replies: Vec<&ModelMessage> =
            last.iter().filter(|m| m.role == Role::Tool).collect();
        assert_eq!(requests.len(), 2);
        assert_eq!(replies.len(), 2);
        for (request, reply) in requests.iter().zip(&replies) {
            assert_eq!(reply.tool_call_id.as_deref(), Some(request.id.as_str()));
        }

        // The unknown tool surfaced as an error value in the reply.
        assert!(replies[1]
            .content
            .as_deref()
            .unwrap()
            .contains("Unknown tool: no_such_tool"));
    }
}
