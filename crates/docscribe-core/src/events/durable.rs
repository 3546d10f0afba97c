//! Durable event log backed by the `run_events` table.
//!
//! Used when the run executes in a separate worker process: the worker
//! appends, the serving process tails. The log is capped per run and gets
//! a TTL stamped at close so finished streams age out. Consumers that
//! subscribe after events were appended replay from the beginning.

use std::collections::VecDeque;
use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use chrono::Utc;
use rusqlite::params;
use serde_json::json;
use tokio::time::Instant;

use super::{EventKind, EventPublisher, EventStream, QueryEvent};
use crate::storage::Database;

/// Events retained per run; older entries are evicted on append.
pub const STREAM_MAX_LEN: usize = 1000;
/// Seconds a closed stream's events stay readable.
pub const STREAM_TTL_SECONDS: i64 = 3600;
/// Idle gap after which the reader synthesizes a heartbeat.
pub const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(15);
/// Wall-clock ceiling on a single subscription.
pub const STREAM_TIMEOUT: Duration = Duration::from_secs(300);

const POLL_INTERVAL: Duration = Duration::from_millis(500);
const FETCH_BATCH: usize = 10;

/// Append side of the durable bus.
pub struct DurableEventLog {
    db: Database,
    run_id: String,
    max_len: usize,
}

impl DurableEventLog {
    pub fn new(db: Database, run_id: impl Into<String>) -> Self {
        Self {
            db,
            run_id: run_id.into(),
            max_len: STREAM_MAX_LEN,
        }
    }

    #[cfg(test)]
    fn with_max_len(mut self, max_len: usize) -> Self {
        self.max_len = max_len;
        self
    }

    fn append(&self, event: &QueryEvent) -> Result<()> {
        let raw = event.to_json()?;
        let conn = self.db.conn();
        conn.execute(
            "INSERT INTO run_events (run_id, event, created_at) VALUES (?1, ?2, ?3)",
            params![self.run_id, raw, Utc::now().timestamp()],
        )?;
        // Keep only the newest `max_len` entries for this run.
        conn.execute(
            "DELETE FROM run_events
             WHERE run_id = ?1 AND id NOT IN (
                 SELECT id FROM run_events WHERE run_id = ?1
                 ORDER BY id DESC LIMIT ?2
             )",
            params![self.run_id, self.max_len],
        )?;
        Ok(())
    }
}

#[async_trait]
impl EventPublisher for DurableEventLog {
    async fn publish(&self, event: QueryEvent) -> Result<()> {
        self.append(&event)
    }

    async fn close(&self) -> Result<()> {
        self.append(&QueryEvent::stream_end(self.run_id.clone()))?;
        let expires_at = Utc::now().timestamp() + STREAM_TTL_SECONDS;
        self.db.conn().execute(
            "UPDATE run_events SET expires_at = ?2 WHERE run_id = ?1",
            params![self.run_id, expires_at],
        )?;
        Ok(())
    }
}

/// Polling reader over a run's event log.
///
/// Replays from the start of the log, then tails. Synthesizes heartbeats
/// while the log is idle and gives up with a single error event once the
/// wall-clock timeout is hit.
pub struct DurableEventStream {
    db: Database,
    run_id: String,
    cursor: i64,
    buffer: VecDeque<QueryEvent>,
    done: bool,
    /// First poll instant; the timeout spans the whole subscription.
    started: Option<Instant>,
    timeout: Duration,
    poll_interval: Duration,
    heartbeat_interval: Duration,
}

impl DurableEventStream {
    pub fn new(db: Database, run_id: impl Into<String>) -> Self {
        Self {
            db,
            run_id: run_id.into(),
            cursor: 0,
            buffer: VecDeque::new(),
            done: false,
            started: None,
            timeout: STREAM_TIMEOUT,
            poll_interval: POLL_INTERVAL,
            heartbeat_interval: HEARTBEAT_INTERVAL,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_poll_interval(mut self, poll_interval: Duration) -> Self {
        self.poll_interval = poll_interval;
        self
    }

    pub fn with_heartbeat_interval(mut self, heartbeat_interval: Duration) -> Self {
        self.heartbeat_interval = heartbeat_interval;
        self
    }

    /// Pull the next batch past the cursor into the buffer. The cursor
    /// advances over malformed rows too, so a bad entry is skipped once
    /// and never revisited.
    fn fill_buffer(&mut self) -> Result<()> {
        let rows = {
            let conn = self.db.conn();
            let mut stmt = conn.prepare(
                "SELECT id, event FROM run_events
                 WHERE run_id = ?1 AND id > ?2
                 ORDER BY id ASC LIMIT ?3",
            )?;
            let rows = stmt
                .query_map(
                    params![self.run_id, self.cursor, FETCH_BATCH],
                    |row| Ok((row.get::<_, i64>(0)?, row.get::<_, String>(1)?)),
                )?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            rows
        };

        for (id, raw) in rows {
            self.cursor = id;
            match QueryEvent::from_json(&raw) {
                Ok(event) => self.buffer.push_back(event),
                Err(e) => {
                    tracing::warn!(run_id = %self.run_id, entry = id, "skipping malformed event: {e}");
                }
            }
        }
        Ok(())
    }
}

#[async_trait]
impl EventStream for DurableEventStream {
    async fn next_event(&mut self) -> Option<QueryEvent> {
        if self.done {
            return None;
        }

        let started = *self.started.get_or_insert_with(Instant::now);
        // Idle time is measured from call entry; every return delivers
        // something, so this is the instant of the last delivery.
        let last_delivery = Instant::now();

        loop {
            if let Some(event) = self.buffer.pop_front() {
                if event.is_stream_end() {
                    self.done = true;
                    return None;
                }
                return Some(event);
            }

            if let Err(e) = self.fill_buffer() {
                tracing::warn!(run_id = %self.run_id, "event log read failed: {e}");
            }
            if !self.buffer.is_empty() {
                continue;
            }

            if started.elapsed() >= self.timeout {
                self.done = true;
                return Some(QueryEvent::new(
                    EventKind::Error,
                    json!({ "error": "Event stream timeout" }),
                    self.run_id.clone(),
                ));
            }

            if last_delivery.elapsed() >= self.heartbeat_interval {
                return Some(QueryEvent::new(
                    EventKind::Heartbeat,
                    json!({ "elapsed_seconds": started.elapsed().as_secs() }),
                    self.run_id.clone(),
                ));
            }

            tokio::time::sleep(self.poll_interval).await;
        }
    }
}

/// Drop log entries whose TTL has elapsed. Returns the number removed.
pub fn purge_expired(db: &Database) -> Result<usize> {
    let deleted = db.conn().execute(
        "DELETE FROM run_events WHERE expires_at IS NOT NULL AND expires_at <= ?1",
        [Utc::now().timestamp()],
    )?;
    Ok(deleted)
}
