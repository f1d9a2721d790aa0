// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Persisted outcome of a WAL entry
//!
//! Results outlive their entries for a retention window, so a caller that
//! lost its in-memory outcome (a reload, another context) can still recover
//! it by entry id.

use super::error::WalError;
use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OperationResult {
    pub entry_id: String,
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub trace: Option<String>,
    pub completed_at_ms: u64,
}

impl OperationResult {
    pub fn success(entry_id: impl Into<String>, result: Value, completed_at_ms: u64) -> Self {
        Self {
            entry_id: entry_id.into(),
            success: true,
            result: Some(result),
            error: None,
            trace: None,
            completed_at_ms,
        }
    }

    pub fn failure(
        entry_id: impl Into<String>,
        error: impl Into<String>,
        trace: impl Into<String>,
        completed_at_ms: u64,
    ) -> Self {
        Self {
            entry_id: entry_id.into(),
            success: false,
            result: None,
            error: Some(error.into()),
            trace: Some(trace.into()),
            completed_at_ms,
        }
    }

    /// The outcome a waiting caller should see
    pub fn outcome(&self) -> Result<Value, WalError> {
        if self.success {
            Ok(self.result.clone().unwrap_or(Value::Null))
        } else {
            Err(WalError::Failed {
                entry_id: self.entry_id.clone(),
                error: self.error.clone().unwrap_or_default(),
            })
        }
    }
}
