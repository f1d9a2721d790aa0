// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Transactional event store seam

use super::record::{Checkpoint, Event, NewEvent};
use async_trait::async_trait;
use std::sync::Arc;
use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum EventStoreError {
    /// Another context holds the store open for an exclusive upgrade
    #[error("connection blocked by another context")]
    Blocked,
    /// The connection was closed by a version change in another context
    #[error("connection invalidated by a version change")]
    Invalidated,
    #[error("sequence {0} already exists")]
    DuplicateSequence(u64),
    #[error("event store error: {0}")]
    Backend(String),
}

/// Opens connections to the shared event store
#[async_trait]
pub trait EventStore: Send + Sync + 'static {
    async fn connect(&self) -> Result<Arc<dyn EventConnection>, EventStoreError>;
}

/// One open connection; every method is a single transaction
#[async_trait]
pub trait EventConnection: Send + Sync {
    /// True once another context has upgraded the store
    fn is_invalidated(&self) -> bool;

    /// Assign `max(sequence) + 1` (or 0) and insert, atomically
    async fn append(&self, event: NewEvent) -> Result<Event, EventStoreError>;

    /// Events with sequence strictly greater than `after`, ascending
    async fn events_after(&self, after: Option<u64>, limit: usize)
        -> Result<Vec<Event>, EventStoreError>;

    async fn events_by_type(&self, event_type: &str, limit: usize)
        -> Result<Vec<Event>, EventStoreError>;

    async fn count(&self) -> Result<u64, EventStoreError>;

    async fn max_sequence(&self) -> Result<Option<u64>, EventStoreError>;

    /// Delete events with sequence strictly below `cutoff`; returns how many
    async fn delete_before(&self, cutoff: u64) -> Result<u64, EventStoreError>;

    /// Insert or replace the checkpoint keyed by its sequence
    async fn put_checkpoint(&self, checkpoint: Checkpoint) -> Result<(), EventStoreError>;

    /// Checkpoint with the highest sequence
    async fn latest_checkpoint(&self) -> Result<Option<Checkpoint>, EventStoreError>;
}
