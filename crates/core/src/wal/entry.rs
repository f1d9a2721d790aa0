// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! WAL entry structure with checksum verification
//!
//! Entries are persisted as a JSON list. Each carries a CRC32 of its
//! operation so that a damaged record is skipped on load instead of being
//! executed.

use super::operation::Operation;
use serde::{Deserialize, Serialize};

/// Processing priority; lower rank drains first
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Priority {
    Critical,
    High,
    #[default]
    Normal,
    Low,
}

impl Priority {
    pub fn rank(self) -> u8 {
        match self {
            Priority::Critical => 0,
            Priority::High => 1,
            Priority::Normal => 2,
            Priority::Low => 3,
        }
    }
}

impl std::fmt::Display for Priority {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Priority::Critical => "critical",
            Priority::High => "high",
            Priority::Normal => "normal",
            Priority::Low => "low",
        };
        write!(f, "{}", s)
    }
}

impl std::str::FromStr for Priority {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "critical" => Ok(Priority::Critical),
            "high" => Ok(Priority::High),
            "normal" => Ok(Priority::Normal),
            "low" => Ok(Priority::Low),
            other => Err(format!("unknown priority: {}", other)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum WalStatus {
    Pending,
    Processing,
    Committed,
    Failed,
}

impl std::fmt::Display for WalStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            WalStatus::Pending => "pending",
            WalStatus::Processing => "processing",
            WalStatus::Committed => "committed",
            WalStatus::Failed => "failed",
        };
        write!(f, "{}", s)
    }
}

/// A single deferred write
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WalEntry {
    pub id: String,
    /// Strictly increasing within one process
    pub sequence: u64,
    pub operation: Operation,
    pub priority: Priority,
    pub status: WalStatus,
    /// Milliseconds since Unix epoch
    pub created_at_ms: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub processed_at_ms: Option<u64>,
    #[serde(default)]
    pub attempts: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Bumped on every change; the higher revision wins when contexts merge
    #[serde(default)]
    pub revision: u64,
    /// CRC32 of the serialized operation
    pub checksum: u32,
}

impl WalEntry {
    pub fn new(
        id: impl Into<String>,
        sequence: u64,
        operation: Operation,
        priority: Priority,
        created_at_ms: u64,
    ) -> Self {
        let checksum = Self::calculate_checksum(&operation);
        Self {
            id: id.into(),
            sequence,
            operation,
            priority,
            status: WalStatus::Pending,
            created_at_ms,
            processed_at_ms: None,
            attempts: 0,
            error: None,
            revision: 0,
            checksum,
        }
    }

    fn calculate_checksum(operation: &Operation) -> u32 {
        // Operation only holds strings and JSON values, which always serialize
        let json = serde_json::to_string(operation).unwrap_or_else(|_| String::new());
        crc32fast::hash(json.as_bytes())
    }

    /// Verify the checksum matches the operation
    pub fn verify(&self) -> bool {
        self.checksum == Self::calculate_checksum(&self.operation)
    }

    /// Whether a processing pass should pick this entry up
    pub fn is_eligible(&self, max_attempts: u32) -> bool {
        match self.status {
            WalStatus::Pending => true,
            WalStatus::Failed => self.attempts < max_attempts,
            WalStatus::Processing | WalStatus::Committed => false,
        }
    }

    /// Committed, or failed with no attempts left
    pub fn is_terminal(&self, max_attempts: u32) -> bool {
        match self.status {
            WalStatus::Committed => true,
            WalStatus::Failed => self.attempts >= max_attempts,
            WalStatus::Pending | WalStatus::Processing => false,
        }
    }

    /// Ordering key for processing passes
    pub fn order_key(&self) -> (u8, u64, u64) {
        (self.priority.rank(), self.sequence, self.created_at_ms)
    }

    pub fn mark_processing(&mut self) {
        self.status = WalStatus::Processing;
        self.revision += 1;
    }

    pub fn mark_committed(&mut self, now_ms: u64) {
        self.status = WalStatus::Committed;
        self.processed_at_ms = Some(now_ms);
        self.error = None;
        self.revision += 1;
    }

    pub fn mark_failed(&mut self, error: impl Into<String>, now_ms: u64) {
        self.status = WalStatus::Failed;
        self.processed_at_ms = Some(now_ms);
        self.error = Some(error.into());
        self.revision += 1;
    }

    /// Put an interrupted entry back in line and make it safe to repeat
    pub fn recover(&mut self) {
        if self.status == WalStatus::Processing {
            self.status = WalStatus::Pending;
        }
        self.operation = self.operation.clone().as_idempotent();
        self.checksum = Self::calculate_checksum(&self.operation);
        self.revision += 1;
    }

    /// Age reference for cleanup: last processing time, else creation
    pub fn last_touched_ms(&self) -> u64 {
        self.processed_at_ms.unwrap_or(self.created_at_ms)
    }

    pub fn serialized_len(&self) -> usize {
        serde_json::to_vec(self).map(|v| v.len()).unwrap_or(0)
    }
}

#[cfg(test)]
#[path = "entry_tests.rs"]
mod tests;
