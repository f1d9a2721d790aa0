// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! harbor-core: coordination primitives for contexts sharing one origin
//!
//! This crate provides:
//! - Leader election over a broadcast channel, with heartbeat liveness
//! - A write-ahead log that defers writes until the primary can apply them
//! - An append-only event log with checkpoints and compaction
//! - A bounded LRU cache whose entries can be pinned against eviction

pub mod clock;
pub mod id;
pub mod notice;

pub mod adapters;
pub mod cache;
pub mod config;
pub mod election;
pub mod events;
pub mod wal;

// Re-exports
pub use clock::{format_ms, Clock, FakeClock, SystemClock};
pub use id::{IdGen, SequentialIdGen, UuidIdGen};
pub use notice::{Notice, NoticeBus};

pub use cache::{CacheStats, EvictionError, PinnedLruCache};
pub use config::{CacheConfig, ConfigError, ElectionConfig, EventLogConfig, HarborConfig, WalConfig};
pub use election::{
    BroadcastChannel, ContextId, ElectionOutcome, Leader, LeaderElection, LocalBus,
};
pub use events::{CausalClock, EventLog, EventLogError, EventStore, MemoryEventStore};
pub use wal::{
    BlobError, BlobStore, MemoryBlobStore, Operation, OperationResult, Priority, WalError,
    WriteAheadLog,
};

// Re-export adapters
pub use adapters::{SecureContext, WriteError, WriteTarget};
#[cfg(any(test, feature = "test-support"))]
pub use adapters::{FakeSecureContext, FakeWriteTarget};
