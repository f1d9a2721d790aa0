// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::blob::BlobError;
use crate::adapters::WriteError;
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum WalError {
    /// A single entry larger than the whole log may ever be
    #[error("entry needs {bytes} bytes but the log is capped at {limit}")]
    EntryTooLarge { bytes: usize, limit: usize },
    #[error("entry {entry_id} was dropped to stay within storage limits")]
    Dropped { entry_id: String },
    #[error("entry {entry_id} expired before it could be applied")]
    Expired { entry_id: String },
    #[error("entry {entry_id} failed: {error}")]
    Failed { entry_id: String, error: String },
    #[error("no result for {entry_id} within {timeout:?}")]
    Timeout { entry_id: String, timeout: Duration },
    #[error(transparent)]
    Write(#[from] WriteError),
    #[error(transparent)]
    Blob(#[from] BlobError),
    #[error("malformed WAL document: {0}")]
    Malformed(String),
    #[error("write-ahead log is shut down")]
    ShutDown,
}
