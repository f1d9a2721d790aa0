// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! In-process collaborator implementations

use super::traits::*;
use crate::election::ContextId;
use crate::events::CausalClock;
use crate::wal::Operation;
use async_trait::async_trait;
use serde_json::{json, Value};
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

type Collections = BTreeMap<String, BTreeMap<String, Value>>;

#[derive(Default)]
struct MemoryTargetState {
    collections: Collections,
    executed: Vec<Operation>,
}

/// Collections of JSON records held in memory
///
/// Availability is a switch so that callers can simulate the backing
/// store going away; executing while unavailable fails.
#[derive(Clone)]
pub struct MemoryWriteTarget {
    state: Arc<Mutex<MemoryTargetState>>,
    available: Arc<AtomicBool>,
}

impl Default for MemoryWriteTarget {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryWriteTarget {
    pub fn new() -> Self {
        Self {
            state: Arc::default(),
            available: Arc::new(AtomicBool::new(true)),
        }
    }

    pub fn set_available(&self, available: bool) {
        self.available.store(available, Ordering::SeqCst);
    }

    pub fn get(&self, collection: &str, key: &str) -> Option<Value> {
        self.lock()
            .collections
            .get(collection)
            .and_then(|records| records.get(key))
            .cloned()
    }

    pub fn len(&self, collection: &str) -> usize {
        self.lock()
            .collections
            .get(collection)
            .map(BTreeMap::len)
            .unwrap_or(0)
    }

    /// Operations applied so far, in execution order
    pub fn executed(&self) -> Vec<Operation> {
        self.lock().executed.clone()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, MemoryTargetState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn apply(state: &mut MemoryTargetState, operation: &Operation) -> Result<Value, WriteError> {
        let result = match operation {
            Operation::Create {
                collection,
                key,
                value,
            } => {
                let records = state.collections.entry(collection.clone()).or_default();
                if records.contains_key(key) {
                    return Err(WriteError::AlreadyExists {
                        collection: collection.clone(),
                        key: key.clone(),
                    });
                }
                records.insert(key.clone(), value.clone());
                value.clone()
            }
            Operation::Upsert {
                collection,
                key,
                value,
            } => {
                state
                    .collections
                    .entry(collection.clone())
                    .or_default()
                    .insert(key.clone(), value.clone());
                value.clone()
            }
            Operation::Delete { collection, key } => {
                let removed = state
                    .collections
                    .get_mut(collection)
                    .and_then(|records| records.remove(key))
                    .is_some();
                json!(removed)
            }
            Operation::Clear { collection } => {
                let removed = state
                    .collections
                    .remove(collection)
                    .map(|records| records.len())
                    .unwrap_or(0);
                json!(removed)
            }
            Operation::Custom { name, args } => json!({ "name": name, "args": args }),
        };
        state.executed.push(operation.clone());
        Ok(result)
    }
}

#[async_trait]
impl WriteTarget for MemoryWriteTarget {
    fn is_direct_write_available(&self) -> bool {
        self.available.load(Ordering::SeqCst)
    }

    async fn execute(&self, operation: &Operation) -> Result<Value, WriteError> {
        tokio::task::yield_now().await;
        if !self.is_direct_write_available() {
            return Err(WriteError::Unavailable(format!(
                "store offline for {}",
                operation.name()
            )));
        }
        Self::apply(&mut self.lock(), operation)
    }
}

/// Fixed answer to the secure-context question
#[derive(Debug, Clone, Copy)]
pub struct StaticSecureContext(pub bool);

impl SecureContext for StaticSecureContext {
    fn is_secure_context(&self) -> bool {
        self.0
    }
}

/// Vector clock owned by one context, ticked on every snapshot
#[derive(Clone)]
pub struct LocalClockSource {
    context_id: ContextId,
    clock: Arc<Mutex<CausalClock>>,
}

impl LocalClockSource {
    pub fn new(context_id: ContextId) -> Self {
        Self {
            context_id,
            clock: Arc::default(),
        }
    }

    /// Fold in a clock observed from another context
    pub fn observe(&self, other: &CausalClock) {
        self.clock
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .merge(other);
    }
}

impl CausalClockSource for LocalClockSource {
    fn causal_clock_snapshot(&self) -> CausalClock {
        let mut clock = self.clock.lock().unwrap_or_else(|e| e.into_inner());
        clock.tick(self.context_id.as_str());
        clock.clone()
    }
}

#[cfg(test)]
#[path = "local_tests.rs"]
mod tests;
