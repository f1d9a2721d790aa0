// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Persistent key-value blob storage shared by all contexts

use async_trait::async_trait;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BlobError {
    #[error("storage quota exceeded writing {key}: {bytes} bytes over a {quota} byte quota")]
    QuotaExceeded {
        key: String,
        bytes: usize,
        quota: usize,
    },
    #[error("corrupt blob at {key}: {reason}")]
    Corrupt { key: String, reason: String },
    #[error("io error: {0}")]
    Io(String),
}

impl From<std::io::Error> for BlobError {
    fn from(e: std::io::Error) -> Self {
        BlobError::Io(e.to_string())
    }
}

/// Durable JSON documents keyed by string
#[async_trait]
pub trait BlobStore: Send + Sync + 'static {
    async fn get(&self, key: &str) -> Result<Option<Value>, BlobError>;

    /// Replace the document at `key`; visible to every context once it returns
    async fn set(&self, key: &str, value: Value) -> Result<(), BlobError>;

    async fn remove(&self, key: &str) -> Result<(), BlobError>;
}

#[derive(Default)]
struct MemoryBlobs {
    docs: HashMap<String, Value>,
    writes: u64,
}

/// In-process blob store; clones share the same documents
///
/// An optional quota bounds the total serialized size of all documents,
/// like a browser origin's storage allowance.
#[derive(Clone, Default)]
pub struct MemoryBlobStore {
    blobs: Arc<Mutex<MemoryBlobs>>,
    quota: Option<usize>,
}

impl MemoryBlobStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_quota(quota: usize) -> Self {
        Self {
            blobs: Arc::default(),
            quota: Some(quota),
        }
    }

    /// Number of successful `set` calls, for asserting on persistence
    pub fn write_count(&self) -> u64 {
        self.blobs.lock().unwrap_or_else(|e| e.into_inner()).writes
    }

    /// Synchronous read, for tests that inspect persisted state
    pub fn snapshot(&self, key: &str) -> Option<Value> {
        self.blobs
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .docs
            .get(key)
            .cloned()
    }
}

fn doc_len(value: &Value) -> usize {
    serde_json::to_vec(value).map(|v| v.len()).unwrap_or(0)
}

#[async_trait]
impl BlobStore for MemoryBlobStore {
    async fn get(&self, key: &str) -> Result<Option<Value>, BlobError> {
        tokio::task::yield_now().await;
        Ok(self.snapshot(key))
    }

    async fn set(&self, key: &str, value: Value) -> Result<(), BlobError> {
        tokio::task::yield_now().await;
        let mut blobs = self.blobs.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(quota) = self.quota {
            let others: usize = blobs
                .docs
                .iter()
                .filter(|(k, _)| k.as_str() != key)
                .map(|(_, v)| doc_len(v))
                .sum();
            let bytes = others + doc_len(&value);
            if bytes > quota {
                return Err(BlobError::QuotaExceeded {
                    key: key.to_string(),
                    bytes,
                    quota,
                });
            }
        }
        blobs.docs.insert(key.to_string(), value);
        blobs.writes += 1;
        Ok(())
    }

    async fn remove(&self, key: &str) -> Result<(), BlobError> {
        tokio::task::yield_now().await;
        self.blobs
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .docs
            .remove(key);
        Ok(())
    }
}
