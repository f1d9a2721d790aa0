// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Collaborators consumed by the WAL and event log

pub mod local;
pub mod traits;

#[cfg(any(test, feature = "test-support"))]
pub mod fake;

pub use local::{LocalClockSource, MemoryWriteTarget, StaticSecureContext};
pub use traits::{CausalClockSource, SecureContext, WriteError, WriteTarget};

#[cfg(any(test, feature = "test-support"))]
pub use fake::{FakeSecureContext, FakeWriteTarget, TargetCall};
