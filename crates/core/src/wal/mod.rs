// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Write-ahead log for deferred writes
//!
//! This module provides:
//! - **Operation** - the write being deferred (create, upsert, delete, ...)
//! - **WalEntry** - an operation with priority, status and attempt count
//! - **WriteAheadLog** - queueing, primary-only processing, replay, cleanup
//! - **BlobStore** - the key/value persistence the log mirrors itself to
//!
//! ## Entry lifecycle
//!
//! ```text
//! PENDING ──► PROCESSING ──► COMMITTED
//!    ▲             │
//!    └── FAILED ◄──┘  (terminal once attempts reach max_attempts)
//! ```
//!
//! Entries interrupted in PROCESSING are reset to PENDING by replay, and
//! creates are rewritten as upserts so that re-applying them is harmless.

mod blob;
mod entry;
mod error;
mod log;
mod operation;
mod result;
mod state;

pub use blob::{BlobError, BlobStore, MemoryBlobStore};
pub use entry::{Priority, WalEntry, WalStatus};
pub use error::WalError;
pub use log::{PassReport, QueuedWrite, WalBackends, WriteAheadLog};
pub use operation::Operation;
pub use result::OperationResult;
pub use state::{CleanupReport, Stored, WalStats};
