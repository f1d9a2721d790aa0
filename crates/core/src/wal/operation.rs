// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Deferred mutation types
//!
//! Every write the WAL can defer is a typed operation against a named
//! collection. Replay after a crash runs operations through
//! [`Operation::as_idempotent`], because an operation may have committed
//! before its WAL record was cleared.

use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Operation {
    /// Insert a record that must not already exist
    Create {
        collection: String,
        key: String,
        value: Value,
    },
    /// Insert or replace a record
    Upsert {
        collection: String,
        key: String,
        value: Value,
    },
    Delete {
        collection: String,
        key: String,
    },
    /// Remove every record in a collection
    Clear { collection: String },
    /// Application-defined operation, passed through to the write target
    Custom {
        name: String,
        #[serde(default)]
        args: Vec<Value>,
    },
}

impl Operation {
    pub fn create(collection: impl Into<String>, key: impl Into<String>, value: Value) -> Self {
        Operation::Create {
            collection: collection.into(),
            key: key.into(),
            value,
        }
    }

    pub fn upsert(collection: impl Into<String>, key: impl Into<String>, value: Value) -> Self {
        Operation::Upsert {
            collection: collection.into(),
            key: key.into(),
            value,
        }
    }

    pub fn delete(collection: impl Into<String>, key: impl Into<String>) -> Self {
        Operation::Delete {
            collection: collection.into(),
            key: key.into(),
        }
    }

    pub fn clear(collection: impl Into<String>) -> Self {
        Operation::Clear {
            collection: collection.into(),
        }
    }

    pub fn custom(name: impl Into<String>, args: Vec<Value>) -> Self {
        Operation::Custom {
            name: name.into(),
            args,
        }
    }

    /// Operation name as seen by the write target
    pub fn name(&self) -> &str {
        match self {
            Operation::Create { .. } => "create",
            Operation::Upsert { .. } => "upsert",
            Operation::Delete { .. } => "delete",
            Operation::Clear { .. } => "clear",
            Operation::Custom { name, .. } => name,
        }
    }

    /// Positional arguments, in the order the write target expects them
    pub fn args(&self) -> Vec<Value> {
        match self {
            Operation::Create {
                collection,
                key,
                value,
            }
            | Operation::Upsert {
                collection,
                key,
                value,
            } => vec![
                Value::from(collection.as_str()),
                Value::from(key.as_str()),
                value.clone(),
            ],
            Operation::Delete { collection, key } => {
                vec![Value::from(collection.as_str()), Value::from(key.as_str())]
            }
            Operation::Clear { collection } => vec![Value::from(collection.as_str())],
            Operation::Custom { args, .. } => args.clone(),
        }
    }

    /// Form of this operation that is safe to run more than once
    ///
    /// `Create` becomes `Upsert`; everything else is already safe to repeat
    /// or is left to the write target.
    pub fn as_idempotent(self) -> Self {
        match self {
            Operation::Create {
                collection,
                key,
                value,
            } => Operation::Upsert {
                collection,
                key,
                value,
            },
            other => other,
        }
    }

    pub fn is_idempotent(&self) -> bool {
        !matches!(self, Operation::Create { .. })
    }
}

#[cfg(test)]
#[path = "operation_tests.rs"]
mod tests;
