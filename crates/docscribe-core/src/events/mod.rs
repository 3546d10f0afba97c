//! Real-time progress events for query processing.
//!
//! `QueryEvent` is the single wire shape every consumer sees, regardless of
//! which bus carries it. Two interchangeable buses implement the
//! [`EventPublisher`] / [`EventStream`] pair:
//!
//! - [`bus::DirectEventBus`] - in-process queue, for runs executing inline
//!   in the serving process.
//! - [`durable::DurableEventLog`] / [`durable::DurableEventStream`] -
//!   capped, TTL'd append-log in SQLite, for runs executing in a separate
//!   worker process.
//!
//! A stream always terminates with a stream-end sentinel: a `completed`
//! event whose data carries `_stream_end: true`. Consumers treat it as
//! closure, never as content.

pub mod bus;
pub mod durable;

use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

pub use bus::DirectEventBus;
pub use durable::{DurableEventLog, DurableEventStream};

/// Kinds of events emitted during query processing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    /// Processing phase update.
    Status,
    /// The agent invoked a tool.
    ToolCall,
    /// Semantic search finished.
    SearchComplete,
    /// A new edit suggestion was persisted.
    Suggestion,
    /// Processing finished.
    Completed,
    /// Processing failed.
    Error,
    /// Keep-alive, synthesized by the durable reader on idle.
    Heartbeat,
}

/// One event in a run's stream.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueryEvent {
    pub event: EventKind,
    pub data: Value,
    pub query_id: String,
    pub timestamp: String,
}

impl QueryEvent {
    pub fn new(event: EventKind, data: Value, query_id: impl Into<String>) -> Self {
        Self {
            event,
            data,
            query_id: query_id.into(),
            timestamp: Utc::now().to_rfc3339(),
        }
    }

    /// The stream-end sentinel closing a run's event stream.
    pub fn stream_end(query_id: impl Into<String>) -> Self {
        Self::new(
            EventKind::Completed,
            json!({ "_stream_end": true }),
            query_id,
        )
    }

    pub fn is_stream_end(&self) -> bool {
        self.data
            .get("_stream_end")
            .and_then(Value::as_bool)
            .unwrap_or(false)
    }

    pub fn to_json(&self) -> anyhow::Result<String> {
        Ok(serde_json::to_string(self)?)
    }

    pub fn from_json(raw: &str) -> anyhow::Result<Self> {
        Ok(serde_json::from_str(raw)?)
    }
}

/// Publish side of the bus. Orchestrator and executor code only ever see
/// this trait; which mode is in effect is the caller's business.
#[async_trait]
pub trait EventPublisher: Send + Sync {
    async fn publish(&self, event: QueryEvent) -> anyhow::Result<()>;

    /// Signal end of stream. No events are delivered after this.
    async fn close(&self) -> anyhow::Result<()>;
}

/// Consume side of the bus. `next_event` returns `None` once the
/// stream-end sentinel has been observed.
#[async_trait]
pub trait EventStream: Send {
    async fn next_event(&mut self) -> Option<QueryEvent>;
}

/// Typed helper for emitting events without building `QueryEvent`s by hand.
///
/// Emission is best-effort: a publish failure is logged and swallowed so it
/// can never mask the result of the operation that triggered it.
#[derive(Clone)]
pub struct EventEmitter {
    query_id: String,
    publisher: Arc<dyn EventPublisher>,
}

impl EventEmitter {
    pub fn new(publisher: Arc<dyn EventPublisher>, query_id: impl Into<String>) -> Self {
        Self {
            query_id: query_id.into(),
            publisher,
        }
    }

    pub fn query_id(&self) -> &str {
        &self.query_id
    }

    async fn emit(&self, event: EventKind, data: Value) {
        let event = QueryEvent::new(event, data, self.query_id.clone());
        if let Err(e) = self.publisher.publish(event).await {
            tracing::warn!(query_id = %self.query_id, "failed to publish event: {e}");
        }
    }

    pub async fn status(&self, status: &str, message: &str) {
        self.emit(
            EventKind::Status,
            json!({ "status": status, "message": message }),
        )
        .await;
    }

    pub async fn tool_call(&self, tool: &str, args: &Value) {
        self.emit(EventKind::ToolCall, json!({ "tool": tool, "args": args }))
            .await;
    }

    pub async fn search_complete(&self, sections_found: usize, message: &str, tool_name: &str) {
        self.emit(
            EventKind::SearchComplete,
            json!({
                "sections_found": sections_found,
                "message": message,
                "tool_name": tool_name,
            }),
        )
        .await;
    }

    #[allow(clippy::too_many_arguments)]
    pub async fn suggestion(
        &self,
        suggestion_id: &str,
        document_id: &str,
        section_title: Option<&str>,
        file_path: &str,
        confidence: f64,
        preview: &str,
    ) {
        self.emit(
            EventKind::Suggestion,
            json!({
                "suggestion_id": suggestion_id,
                "document_id": document_id,
                "section_title": section_title,
                "file_path": file_path,
                "confidence": confidence,
                "preview": preview,
            }),
        )
        .await;
    }

    pub async fn completed(&self, total_suggestions: usize) {
        self.emit(
            EventKind::Completed,
            json!({
                "total_suggestions": total_suggestions,
                "query_id": self.query_id,
            }),
        )
        .await;
    }

    pub async fn error(&self, error: &str, details: Option<&str>) {
        self.emit(
            EventKind::Error,
            json!({ "error": error, "details": details }),
        )
        .await;
    }

    /// Close the underlying publisher, ending the stream.
    pub async fn close(&self) {
        if let Err(e) = self.publisher.close().await {
            tracing::warn!(query_id = %self.query_id, "failed to close event stream: {e}");
        }
    }
}
