// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Collaborator trait definitions

use crate::events::CausalClock;
use crate::wal::Operation;
use async_trait::async_trait;
use serde_json::Value;
use thiserror::Error;

// =============================================================================
// Write Target
// =============================================================================

/// Errors from applying an operation to the underlying store
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum WriteError {
    #[error("direct writes unavailable: {0}")]
    Unavailable(String),
    #[error("{collection}/{key} already exists")]
    AlreadyExists { collection: String, key: String },
    #[error("operation rejected: {0}")]
    Rejected(String),
}

/// The store that queued operations are eventually applied to
#[async_trait]
pub trait WriteTarget: Send + Sync + 'static {
    /// Whether an operation issued now would reach the store
    fn is_direct_write_available(&self) -> bool;

    /// Apply one operation, returning its result value
    async fn execute(&self, operation: &Operation) -> Result<Value, WriteError>;
}

// =============================================================================
// Secure Context
// =============================================================================

/// Whether encrypted storage is usable in this context
///
/// Direct writes are only attempted when this holds; otherwise every write
/// goes through the WAL.
pub trait SecureContext: Send + Sync + 'static {
    fn is_secure_context(&self) -> bool;
}

// =============================================================================
// Causal Clock Source
// =============================================================================

/// Supplies the vector clock recorded with each appended event
pub trait CausalClockSource: Send + Sync + 'static {
    fn causal_clock_snapshot(&self) -> CausalClock;
}
