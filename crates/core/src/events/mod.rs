// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Causally-ordered event log
//!
//! This module provides:
//! - `EventLog` - append, scan, checkpoint, and compaction over a store
//! - `EventStore` / `EventConnection` - the transactional store seam
//! - `MemoryEventStore` - in-process store with version-change and
//!   blocked-connection simulation
//! - `CausalClock` - per-context counters for happened-before ordering
//!
//! The WAL durably queues mutations; this log records what happened and in
//! which causal order, for replay and debugging. Sequence numbers are
//! strictly increasing for a single writer. Restricting appends to the
//! primary context is the caller's responsibility.

mod clock;
mod log;
mod memory;
mod record;
mod store;

pub use clock::CausalClock;
pub use log::{CompactionReport, EventLog, EventLogError};
pub use memory::MemoryEventStore;
pub use record::{Checkpoint, Event, NewEvent};
pub use store::{EventConnection, EventStore, EventStoreError};
