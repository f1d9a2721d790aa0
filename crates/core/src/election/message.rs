// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Election wire messages

use serde::{Deserialize, Serialize};

/// Identity of one execution context (a tab, worker, or process)
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ContextId(pub String);

impl ContextId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for ContextId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Messages exchanged over the broadcast channel
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ElectionMessage {
    Candidate { context_id: ContextId },
    ClaimPrimary { context_id: ContextId },
    ReleasePrimary { context_id: ContextId },
    Heartbeat { context_id: ContextId },
}

impl ElectionMessage {
    pub fn sender(&self) -> &ContextId {
        match self {
            ElectionMessage::Candidate { context_id }
            | ElectionMessage::ClaimPrimary { context_id }
            | ElectionMessage::ReleasePrimary { context_id }
            | ElectionMessage::Heartbeat { context_id } => context_id,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            ElectionMessage::Candidate { .. } => "CANDIDATE",
            ElectionMessage::ClaimPrimary { .. } => "CLAIM_PRIMARY",
            ElectionMessage::ReleasePrimary { .. } => "RELEASE_PRIMARY",
            ElectionMessage::Heartbeat { .. } => "HEARTBEAT",
        }
    }
}
