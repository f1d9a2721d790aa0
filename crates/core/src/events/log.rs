// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Event log with checkpoints and compaction

use super::clock::CausalClock;
use super::record::{Checkpoint, Event, NewEvent};
use super::store::{EventConnection, EventStore, EventStoreError};
use crate::clock::{Clock, SystemClock};
use crate::config::EventLogConfig;
use crate::election::ContextId;
use crate::id::{IdGen, UuidIdGen};
use crate::notice::{Notice, NoticeBus};
use serde_json::{json, Value};
use std::future::Future;
use std::sync::{Arc, Mutex};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum EventLogError {
    #[error("event store still blocked after {attempts} attempts")]
    ConnectionBlocked { attempts: u32 },
    #[error("checkpoint at {sequence} is beyond the newest event ({max:?})")]
    InvalidCheckpoint { sequence: u64, max: Option<u64> },
    #[error(transparent)]
    Store(#[from] EventStoreError),
}

/// Outcome of one compaction check
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct CompactionReport {
    /// Sequence below which events were deleted, if compaction ran
    pub cutoff: Option<u64>,
    pub deleted: u64,
}

/// Append-only, causally annotated event log
pub struct EventLog<C: Clock = SystemClock, I: IdGen = UuidIdGen> {
    store: Arc<dyn EventStore>,
    config: EventLogConfig,
    clock: C,
    ids: I,
    notices: NoticeBus,
    connection: Mutex<Option<Arc<dyn EventConnection>>>,
}

impl EventLog {
    pub fn new(store: Arc<dyn EventStore>, config: EventLogConfig, notices: NoticeBus) -> Self {
        Self::with_deps(store, config, notices, SystemClock, UuidIdGen::with_prefix("evt"))
    }
}

impl<C: Clock, I: IdGen> EventLog<C, I> {
    pub fn with_deps(
        store: Arc<dyn EventStore>,
        config: EventLogConfig,
        notices: NoticeBus,
        clock: C,
        ids: I,
    ) -> Self {
        Self {
            store,
            config,
            clock,
            ids,
            notices,
            connection: Mutex::new(None),
        }
    }

    /// Append one event, assigning the next global sequence number
    ///
    /// A compaction check runs after the write; its failure is reported but
    /// the appended event stands.
    pub async fn append_event(
        &self,
        event_type: impl Into<String>,
        payload: Value,
        causal_clock: CausalClock,
        source_context: &ContextId,
    ) -> Result<Event, EventLogError> {
        let new_event = NewEvent {
            id: self.ids.next(),
            event_type: event_type.into(),
            payload,
            causal_clock,
            timestamp_ms: self.clock.now_ms(),
            source_context: source_context.clone(),
        };

        let event = self
            .run(|conn| {
                let new_event = new_event.clone();
                async move { conn.append(new_event).await }
            })
            .await?;
        tracing::debug!(
            sequence = event.sequence_number,
            event_type = %event.event_type,
            source = %event.source_context,
            "event appended"
        );

        let interval = self.config.checkpoint_interval;
        if interval > 0 && (event.sequence_number + 1) % interval == 0 {
            if let Err(e) = self
                .create_checkpoint(event.sequence_number, json!({ "auto": true }))
                .await
            {
                tracing::warn!(error = %e, sequence = event.sequence_number, "automatic checkpoint failed");
            }
        }

        if let Err(e) = self.compact_event_log().await {
            tracing::error!(error = %e, "event log compaction failed");
            self.notices.publish(Notice::CompactionFailed {
                error: e.to_string(),
            });
        }

        Ok(event)
    }

    /// Events with sequence greater than `after` (all when `None`), ascending
    pub async fn get_events(
        &self,
        after: Option<u64>,
        limit: usize,
    ) -> Result<Vec<Event>, EventLogError> {
        self.run(|conn| async move { conn.events_after(after, limit).await })
            .await
    }

    pub async fn get_events_by_type(
        &self,
        event_type: &str,
        limit: usize,
    ) -> Result<Vec<Event>, EventLogError> {
        let event_type = event_type.to_string();
        self.run(|conn| {
            let event_type = event_type.clone();
            async move { conn.events_by_type(&event_type, limit).await }
        })
        .await
    }

    pub async fn event_count(&self) -> Result<u64, EventLogError> {
        self.run(|conn| async move { conn.count().await }).await
    }

    /// Record a checkpoint at `sequence`, which must not exceed the newest event
    pub async fn create_checkpoint(
        &self,
        sequence: u64,
        metadata: Value,
    ) -> Result<Checkpoint, EventLogError> {
        let max = self
            .run(|conn| async move { conn.max_sequence().await })
            .await?;
        if max.map(|max| sequence > max).unwrap_or(true) {
            return Err(EventLogError::InvalidCheckpoint { sequence, max });
        }

        let checkpoint = Checkpoint {
            id: self.ids.next(),
            sequence_number: sequence,
            timestamp_ms: self.clock.now_ms(),
            metadata,
        };
        self.run(|conn| {
            let checkpoint = checkpoint.clone();
            async move { conn.put_checkpoint(checkpoint).await }
        })
        .await?;
        tracing::info!(sequence, "checkpoint created");
        Ok(checkpoint)
    }

    pub async fn get_latest_checkpoint(&self) -> Result<Option<Checkpoint>, EventLogError> {
        self.run(|conn| async move { conn.latest_checkpoint().await })
            .await
    }

    /// Delete history once the log outgrows `max_events`
    ///
    /// With a checkpoint, everything below it goes, except that the newest
    /// `min_events_after_checkpoint` events are always kept. Without one,
    /// only the newest `max_events` events are kept.
    pub async fn compact_event_log(&self) -> Result<CompactionReport, EventLogError> {
        let count = self.event_count().await?;
        if count <= self.config.max_events {
            return Ok(CompactionReport::default());
        }

        let Some(max) = self
            .run(|conn| async move { conn.max_sequence().await })
            .await?
        else {
            return Ok(CompactionReport::default());
        };
        let next = max + 1;

        let cutoff = match self.get_latest_checkpoint().await? {
            Some(checkpoint) => checkpoint
                .sequence_number
                .min(next.saturating_sub(self.config.min_events_after_checkpoint)),
            None => next.saturating_sub(self.config.max_events),
        };

        let deleted = self
            .run(|conn| async move { conn.delete_before(cutoff).await })
            .await?;
        if deleted > 0 {
            tracing::info!(cutoff, deleted, count, "event log compacted");
        }
        Ok(CompactionReport {
            cutoff: Some(cutoff),
            deleted,
        })
    }

    /// Run one store call, reopening once if the connection was invalidated
    async fn run<T, F, Fut>(&self, op: F) -> Result<T, EventLogError>
    where
        F: Fn(Arc<dyn EventConnection>) -> Fut,
        Fut: Future<Output = Result<T, EventStoreError>>,
    {
        let conn = self.connection().await?;
        match op(conn).await {
            Err(EventStoreError::Invalidated) => {
                self.drop_connection();
                let conn = self.connection().await?;
                Ok(op(conn).await?)
            }
            result => Ok(result?),
        }
    }

    fn drop_connection(&self) {
        tracing::info!("event store version changed, reopening connection");
        self.notices.publish(Notice::ConnectionInvalidated);
        *self.connection.lock().unwrap_or_else(|e| e.into_inner()) = None;
    }

    async fn connection(&self) -> Result<Arc<dyn EventConnection>, EventLogError> {
        let cached = self
            .connection
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone();
        if let Some(conn) = cached {
            if !conn.is_invalidated() {
                return Ok(conn);
            }
            self.drop_connection();
        }

        let max_attempts = self.config.max_connect_attempts;
        let mut attempt = 0;
        loop {
            attempt += 1;
            match self.store.connect().await {
                Ok(conn) => {
                    *self.connection.lock().unwrap_or_else(|e| e.into_inner()) =
                        Some(Arc::clone(&conn));
                    return Ok(conn);
                }
                Err(EventStoreError::Blocked) => {
                    let exhausted = attempt >= max_attempts;
                    let delay = self.config.connect_backoff * 2u32.saturating_pow(attempt - 1);
                    self.notices.publish(Notice::ConnectionBlocked {
                        attempt,
                        max_attempts,
                        retry_in_ms: if exhausted { 0 } else { delay.as_millis() as u64 },
                    });
                    if exhausted {
                        tracing::error!(attempt, "event store connection blocked, giving up");
                        return Err(EventLogError::ConnectionBlocked { attempts: attempt });
                    }
                    tracing::warn!(
                        attempt,
                        max_attempts,
                        retry_in_ms = delay.as_millis() as u64,
                        "event store connection blocked, retrying"
                    );
                    tokio::time::sleep(delay).await;
                }
                Err(e) => return Err(e.into()),
            }
        }
    }
}

#[cfg(test)]
#[path = "log_tests.rs"]
mod tests;
