//! In-process event bus.
//!
//! Single-producer/single-consumer queue scoped to one run, used when the
//! orchestrator executes inline in the serving process. `close()` pushes
//! the stream-end sentinel; the stream yields until it sees it.

use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use tokio::sync::mpsc;

use super::{EventPublisher, EventStream, QueryEvent};

pub struct DirectEventBus {
    query_id: String,
    tx: mpsc::UnboundedSender<QueryEvent>,
    closed: AtomicBool,
}

pub struct DirectEventStream {
    rx: mpsc::UnboundedReceiver<QueryEvent>,
    done: bool,
}

impl DirectEventBus {
    /// Create a bus for one run, returning the publish and consume halves.
    pub fn channel(query_id: impl Into<String>) -> (DirectEventBus, DirectEventStream) {
        let (tx, rx) = mpsc::unbounded_channel();
        (
            DirectEventBus {
                query_id: query_id.into(),
                tx,
                closed: AtomicBool::new(false),
            },
            DirectEventStream { rx, done: false },
        )
    }
}

#[async_trait]
impl EventPublisher for DirectEventBus {
    async fn publish(&self, event: QueryEvent) -> anyhow::Result<()> {
        if self.closed.load(Ordering::Acquire) {
            tracing::debug!(query_id = %self.query_id, "dropping event published after close");
            return Ok(());
        }
        // A dropped receiver just means nobody is listening anymore.
        let _ = self.tx.send(event);
        Ok(())
    }

    async fn close(&self) -> anyhow::Result<()> {
        if self.closed.swap(true, Ordering::AcqRel) {
            return Ok(());
        }
        let _ = self.tx.send(QueryEvent::stream_end(self.query_id.clone()));
        Ok(())
    }
}

#[async_trait]
impl EventStream for DirectEventStream {
    async fn next_event(&mut self) -> Option<QueryEvent> {
        if self.done {
            return None;
        }
        match self.rx.recv().await {
            Some(event) if event.is_stream_end() => {
                self.done = true;
                None
            }
            Some(event) => Some(event),
            None => {
                self.done = true;
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::EventKind;
    use serde_json::json;

    #[tokio::test]
    async fn events_flow_in_order_until_close() {
        let (bus, mut stream) = DirectEventBus::channel("run-1");

        for i in 0..3 {
            bus.publish(QueryEvent::new(
                EventKind::Status,
                json!({ "status": "processing", "message": format!("step {i}") }),
                "run-1",
            ))
            .await
            .unwrap();
        }
        bus.close().await.unwrap();

        let mut seen = Vec::new();
        while let Some(event) = stream.next_event().await {
            seen.push(event);
        }
        assert_eq!(seen.len(), 3);
        assert_eq!(seen[0].data["message"], "step 0");
        assert_eq!(seen[2].data["message"], "step 2");

        // Stream stays closed.
        assert!(stream.next_event().await.is_none());
    }

    #[tokio::test]
    async fn publish_after_close_is_dropped() {
        let (bus, mut stream) = DirectEventBus::channel("run-1");
        bus.close().await.unwrap();
        bus.publish(QueryEvent::new(EventKind::Status, json!({}), "run-1"))
            .await
            .unwrap();

        assert!(stream.next_event().await.is_none());
    }

    #[tokio::test]
    async fn double_close_sends_one_sentinel() {
        let (bus, mut stream) = DirectEventBus::channel("run-1");
        bus.close().await.unwrap();
        bus.close().await.unwrap();

        assert!(stream.next_event().await.is_none());
        assert!(stream.next_event().await.is_none());
    }
}
