// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Operator-facing notices
//!
//! Components publish structured warnings (quota pressure, blocked
//! connections, failed compactions) here so that a UI or supervisor can react
//! without scraping logs. Publishing never fails: with no subscribers a
//! notice is simply dropped.

use serde::Serialize;
use tokio::sync::broadcast;

const NOTICE_CAPACITY: usize = 256;

/// A structured warning from one of the components
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Notice {
    /// The WAL had to drop its oldest entries to stay within storage limits
    WalEntriesDropped {
        entry_ids: Vec<String>,
        serialized_bytes: usize,
        limit_bytes: usize,
    },
    /// Pending WAL entries outlived `max_age` and were abandoned
    WalEntriesExpired { entry_ids: Vec<String> },
    /// The event store refused a connection because another context holds it
    ConnectionBlocked {
        attempt: u32,
        max_attempts: u32,
        retry_in_ms: u64,
    },
    /// Another context upgraded the event store; the local handle was dropped
    ConnectionInvalidated,
    CompactionFailed { error: String },
    /// No broadcast channel; this context assumed primary on its own
    ElectionFailOpen { context_id: String },
    AuthorityChanged { context_id: String, is_primary: bool },
}

impl Notice {
    pub fn name(&self) -> &'static str {
        match self {
            Notice::WalEntriesDropped { .. } => "wal:entries:dropped",
            Notice::WalEntriesExpired { .. } => "wal:entries:expired",
            Notice::ConnectionBlocked { .. } => "events:connection:blocked",
            Notice::ConnectionInvalidated => "events:connection:invalidated",
            Notice::CompactionFailed { .. } => "events:compaction:failed",
            Notice::ElectionFailOpen { .. } => "election:fail-open",
            Notice::AuthorityChanged { .. } => "election:authority",
        }
    }
}

/// Fan-out of notices to any number of subscribers
#[derive(Clone)]
pub struct NoticeBus {
    tx: broadcast::Sender<Notice>,
}

impl NoticeBus {
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(NOTICE_CAPACITY);
        Self { tx }
    }

    pub fn publish(&self, notice: Notice) {
        tracing::debug!(notice = notice.name(), "publishing notice");
        let _ = self.tx.send(notice);
    }

    pub fn subscribe(&self) -> broadcast::Receiver<Notice> {
        self.tx.subscribe()
    }
}

impl Default for NoticeBus {
    fn default() -> Self {
        Self::new()
    }
}
