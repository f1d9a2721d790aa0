// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Stored event and checkpoint records

use super::clock::CausalClock;
use crate::election::ContextId;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// An event before the store has assigned its sequence number
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewEvent {
    pub id: String,
    pub event_type: String,
    pub payload: Value,
    pub causal_clock: CausalClock,
    /// Milliseconds since the Unix epoch
    pub timestamp_ms: u64,
    pub source_context: ContextId,
}

impl NewEvent {
    pub fn with_sequence(self, sequence_number: u64) -> Event {
        Event {
            id: self.id,
            event_type: self.event_type,
            payload: self.payload,
            causal_clock: self.causal_clock,
            timestamp_ms: self.timestamp_ms,
            sequence_number,
            source_context: self.source_context,
        }
    }
}

/// A logged event
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
    pub id: String,
    pub event_type: String,
    pub payload: Value,
    pub causal_clock: CausalClock,
    pub timestamp_ms: u64,
    /// Global position; unique and strictly increasing per writer
    pub sequence_number: u64,
    pub source_context: ContextId,
}

/// A safe point below which history may be discarded
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Checkpoint {
    pub id: String,
    pub sequence_number: u64,
    pub timestamp_ms: u64,
    pub metadata: Value,
}
