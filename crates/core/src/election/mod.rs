// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Leader election among same-origin execution contexts
//!
//! This module provides:
//! - **BroadcastChannel** - the publish/subscribe seam every context shares
//! - **LeaderElection** - candidacy window, claim, heartbeat liveness
//! - **Leader** - capability token required by primary-only operations
//!
//! ## Protocol
//!
//! ```text
//! CANDIDATE ──► collect for window ──► smallest id ──► CLAIM_PRIMARY
//!      ▲                                                   │
//!      └── re-election ◄── missed heartbeats / RELEASE ◄───┘
//! ```
//!
//! A claim observed during the window aborts the local candidacy: the first
//! claim seen wins. If two contexts end up primary (claims crossed on the
//! wire), the one with the lexicographically smaller id keeps authority.
//!
//! ## Limitations
//!
//! Without a broadcast channel a context assumes it is alone and becomes
//! primary. With several contexts and no channel this yields more than one
//! primary; single-writer guarantees then no longer hold.

mod calibrate;
mod channel;
mod leader;
mod message;

pub use calibrate::{calibrated_window, measure_workload, scale_window};
pub use channel::{BroadcastChannel, ChannelError, LocalBus};
pub use leader::{
    elect_winner, AuthorityCallback, ElectionError, ElectionOutcome, Leader, LeaderElection,
};
pub use message::{ContextId, ElectionMessage};
