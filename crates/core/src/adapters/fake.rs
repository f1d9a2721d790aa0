// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Fake collaborators for testing

use super::local::MemoryWriteTarget;
use super::traits::*;
use crate::wal::Operation;
use async_trait::async_trait;
use serde_json::Value;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

/// Recorded call to the fake write target
#[derive(Debug, Clone, PartialEq)]
pub struct TargetCall {
    pub operation: Operation,
    pub succeeded: bool,
}

#[derive(Default)]
struct FakeState {
    calls: Vec<TargetCall>,
    // Scripted failures, consumed one per execute
    failures: VecDeque<String>,
    // Operation names that always fail
    poisoned: Vec<String>,
}

/// Memory-backed write target with call recording and scripted failures
#[derive(Clone, Default)]
pub struct FakeWriteTarget {
    store: MemoryWriteTarget,
    state: Arc<Mutex<FakeState>>,
}

impl FakeWriteTarget {
    pub fn new() -> Self {
        Self::default()
    }

    /// Backing store, for asserting on applied records
    pub fn store(&self) -> &MemoryWriteTarget {
        &self.store
    }

    pub fn set_available(&self, available: bool) {
        self.store.set_available(available);
    }

    /// Fail the next `n` executions with `error`
    pub fn fail_next(&self, n: usize, error: &str) {
        let mut state = self.lock();
        state.failures.extend(std::iter::repeat(error.to_string()).take(n));
    }

    /// Fail every execution of operations named `name`
    pub fn poison(&self, name: &str) {
        self.lock().poisoned.push(name.to_string());
    }

    pub fn calls(&self) -> Vec<TargetCall> {
        self.lock().calls.clone()
    }

    /// Names of operations that reached the store successfully, in order
    pub fn committed_names(&self) -> Vec<String> {
        self.lock()
            .calls
            .iter()
            .filter(|c| c.succeeded)
            .map(|c| c.operation.name().to_string())
            .collect()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, FakeState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }
}

#[async_trait]
impl WriteTarget for FakeWriteTarget {
    fn is_direct_write_available(&self) -> bool {
        self.store.is_direct_write_available()
    }

    async fn execute(&self, operation: &Operation) -> Result<Value, WriteError> {
        let scripted = {
            let mut state = self.lock();
            if state.poisoned.iter().any(|n| n == operation.name()) {
                Some(format!("{} is poisoned", operation.name()))
            } else {
                state.failures.pop_front()
            }
        };
        let result = match scripted {
            Some(error) => Err(WriteError::Rejected(error)),
            None => self.store.execute(operation).await,
        };
        self.lock().calls.push(TargetCall {
            operation: operation.clone(),
            succeeded: result.is_ok(),
        });
        result
    }
}

/// Secure-context answer that tests can flip
#[derive(Clone)]
pub struct FakeSecureContext {
    secure: Arc<AtomicBool>,
}

impl FakeSecureContext {
    pub fn new(secure: bool) -> Self {
        Self {
            secure: Arc::new(AtomicBool::new(secure)),
        }
    }

    pub fn set_secure(&self, secure: bool) {
        self.secure.store(secure, Ordering::SeqCst);
    }
}

impl SecureContext for FakeSecureContext {
    fn is_secure_context(&self) -> bool {
        self.secure.load(Ordering::SeqCst)
    }
}

#[cfg(test)]
#[path = "fake_tests.rs"]
mod tests;
