// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! In-process event store
//!
//! Tables are `BTreeMap`s keyed by sequence, guarded by one mutex that stands
//! in for a store transaction: sequence assignment reads the maximum and
//! inserts under the same guard. Every method yields first so that
//! concurrent callers interleave the way they would at real storage calls.

use super::record::{Checkpoint, Event, NewEvent};
use super::store::{EventConnection, EventStore, EventStoreError};
use async_trait::async_trait;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

#[derive(Default)]
struct Tables {
    events: BTreeMap<u64, Event>,
    checkpoints: BTreeMap<u64, Checkpoint>,
}

#[derive(Default)]
struct Inner {
    tables: Mutex<Tables>,
    version: AtomicU64,
    blocked_connects: AtomicU32,
    connects: AtomicU32,
    fail_deletes: AtomicBool,
}

/// Shared in-memory event store; clones share the same tables
#[derive(Clone, Default)]
pub struct MemoryEventStore {
    inner: Arc<Inner>,
}

impl MemoryEventStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make the next `n` connection attempts report `Blocked`
    pub fn block_next_connects(&self, n: u32) {
        self.inner.blocked_connects.store(n, Ordering::SeqCst);
    }

    /// Simulate another context upgrading the schema
    pub fn bump_version(&self) {
        self.inner.version.fetch_add(1, Ordering::SeqCst);
    }

    /// Make deletes fail, for exercising compaction error handling
    pub fn fail_deletes(&self, fail: bool) {
        self.inner.fail_deletes.store(fail, Ordering::SeqCst);
    }

    /// Successful connections opened so far
    pub fn connect_count(&self) -> u32 {
        self.inner.connects.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl EventStore for MemoryEventStore {
    async fn connect(&self) -> Result<Arc<dyn EventConnection>, EventStoreError> {
        tokio::task::yield_now().await;
        let blocked = self
            .inner
            .blocked_connects
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1));
        if blocked.is_ok() {
            return Err(EventStoreError::Blocked);
        }
        self.inner.connects.fetch_add(1, Ordering::SeqCst);
        Ok(Arc::new(MemoryConnection {
            inner: Arc::clone(&self.inner),
            version: self.inner.version.load(Ordering::SeqCst),
        }))
    }
}

struct MemoryConnection {
    inner: Arc<Inner>,
    version: u64,
}

impl MemoryConnection {
    async fn tables(&self) -> Result<std::sync::MutexGuard<'_, Tables>, EventStoreError> {
        tokio::task::yield_now().await;
        if self.is_invalidated() {
            return Err(EventStoreError::Invalidated);
        }
        Ok(self.inner.tables.lock().unwrap_or_else(|e| e.into_inner()))
    }
}

#[async_trait]
impl EventConnection for MemoryConnection {
    fn is_invalidated(&self) -> bool {
        self.inner.version.load(Ordering::SeqCst) != self.version
    }

    async fn append(&self, event: NewEvent) -> Result<Event, EventStoreError> {
        let mut tables = self.tables().await?;
        let sequence = tables
            .events
            .keys()
            .next_back()
            .map(|max| max + 1)
            .unwrap_or(0);
        if tables.events.contains_key(&sequence) {
            return Err(EventStoreError::DuplicateSequence(sequence));
        }
        let event = event.with_sequence(sequence);
        tables.events.insert(sequence, event.clone());
        Ok(event)
    }

    async fn events_after(
        &self,
        after: Option<u64>,
        limit: usize,
    ) -> Result<Vec<Event>, EventStoreError> {
        let tables = self.tables().await?;
        let events = match after {
            Some(after) => tables
                .events
                .range(after.saturating_add(1)..)
                .filter(|(seq, _)| **seq > after)
                .map(|(_, e)| e.clone())
                .take(limit)
                .collect(),
            None => tables.events.values().take(limit).cloned().collect(),
        };
        Ok(events)
    }

    async fn events_by_type(
        &self,
        event_type: &str,
        limit: usize,
    ) -> Result<Vec<Event>, EventStoreError> {
        let tables = self.tables().await?;
        Ok(tables
            .events
            .values()
            .filter(|e| e.event_type == event_type)
            .take(limit)
            .cloned()
            .collect())
    }

    async fn count(&self) -> Result<u64, EventStoreError> {
        Ok(self.tables().await?.events.len() as u64)
    }

    async fn max_sequence(&self) -> Result<Option<u64>, EventStoreError> {
        Ok(self.tables().await?.events.keys().next_back().copied())
    }

    async fn delete_before(&self, cutoff: u64) -> Result<u64, EventStoreError> {
        if self.inner.fail_deletes.load(Ordering::SeqCst) {
            return Err(EventStoreError::Backend("delete refused".to_string()));
        }
        let mut tables = self.tables().await?;
        let keep = tables.events.split_off(&cutoff);
        let removed = tables.events.len() as u64;
        tables.events = keep;
        Ok(removed)
    }

    async fn put_checkpoint(&self, checkpoint: Checkpoint) -> Result<(), EventStoreError> {
        let mut tables = self.tables().await?;
        tables
            .checkpoints
            .insert(checkpoint.sequence_number, checkpoint);
        Ok(())
    }

    async fn latest_checkpoint(&self) -> Result<Option<Checkpoint>, EventStoreError> {
        let tables = self.tables().await?;
        Ok(tables.checkpoints.values().next_back().cloned())
    }
}

#[cfg(test)]
#[path = "memory_tests.rs"]
mod tests;
