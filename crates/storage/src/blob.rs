// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! File-backed blob store
//!
//! One JSON file per key under the store directory. Each file holds an
//! envelope with the key, a CRC32 of the value and the value itself.
//!
//! Durability guarantees:
//! - A write lands in a temporary file that is fsync'd and then renamed
//!   over the previous document, so readers see the old or the new value
//! - A document that fails to decode or verify is moved aside as
//!   `<name>.corrupt` and reads as absent
//! - Leftover temporary files from an interrupted write are removed on open

use async_trait::async_trait;
use harbor_core::wal::{BlobError, BlobStore};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fs::{self, File};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

const DOC_EXT: &str = "json";
const TMP_EXT: &str = "json.tmp";
const CORRUPT_EXT: &str = "json.corrupt";

#[derive(Debug, Serialize, Deserialize)]
struct Envelope {
    key: String,
    checksum: u32,
    value: Value,
}

impl Envelope {
    fn new(key: &str, value: Value) -> Result<Self, BlobError> {
        Ok(Self {
            key: key.to_string(),
            checksum: checksum(&value)?,
            value,
        })
    }

    fn verify(&self, key: &str) -> Result<(), String> {
        if self.key != key {
            return Err(format!("envelope is for key {}", self.key));
        }
        let expected = checksum(&self.value).map_err(|e| e.to_string())?;
        if expected != self.checksum {
            return Err(format!(
                "checksum mismatch: stored {:08x}, computed {:08x}",
                self.checksum, expected
            ));
        }
        Ok(())
    }
}

fn checksum(value: &Value) -> Result<u32, BlobError> {
    let bytes = serde_json::to_vec(value).map_err(|e| BlobError::Io(e.to_string()))?;
    Ok(crc32fast::hash(&bytes))
}

/// File name for a key; bytes outside `[A-Za-z0-9._-]` are percent-encoded
fn file_stem(key: &str) -> String {
    let mut stem = String::with_capacity(key.len());
    for b in key.bytes() {
        match b {
            b'a'..=b'z' | b'A'..=b'Z' | b'0'..=b'9' | b'-' | b'_' | b'.' => stem.push(b as char),
            _ => stem.push_str(&format!("%{:02X}", b)),
        }
    }
    stem
}

fn key_from_stem(stem: &str) -> Option<String> {
    let mut bytes = Vec::with_capacity(stem.len());
    let mut rest = stem.as_bytes();
    while let Some((&b, tail)) = rest.split_first() {
        if b == b'%' {
            let hex = tail.get(..2)?;
            let hex = std::str::from_utf8(hex).ok()?;
            bytes.push(u8::from_str_radix(hex, 16).ok()?);
            rest = &tail[2..];
        } else {
            bytes.push(b);
            rest = tail;
        }
    }
    String::from_utf8(bytes).ok()
}

/// Durable [`BlobStore`] over a directory
///
/// Clones share the directory and serialize their writes.
#[derive(Clone)]
pub struct FileBlobStore {
    dir: PathBuf,
    quota: Option<usize>,
    writes: Arc<tokio::sync::Mutex<()>>,
}

impl FileBlobStore {
    /// Open (creating if needed) a store rooted at `dir`
    pub fn open(dir: impl Into<PathBuf>) -> Result<Self, BlobError> {
        let dir = dir.into();
        fs::create_dir_all(&dir)?;
        for entry in fs::read_dir(&dir)? {
            let path = entry?.path();
            if has_extension(&path, TMP_EXT) {
                tracing::debug!(path = %path.display(), "removing interrupted write");
                fs::remove_file(&path)?;
            }
        }
        Ok(Self {
            dir,
            quota: None,
            writes: Arc::new(tokio::sync::Mutex::new(())),
        })
    }

    /// Refuse writes that would take the directory past `bytes` on disk
    pub fn with_quota(mut self, bytes: usize) -> Self {
        self.quota = Some(bytes);
        self
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Keys of every stored document, sorted
    pub fn keys(&self) -> Result<Vec<String>, BlobError> {
        let mut keys = Vec::new();
        for entry in fs::read_dir(&self.dir)? {
            let path = entry?.path();
            if !has_extension(&path, DOC_EXT) {
                continue;
            }
            let stem = path
                .file_name()
                .and_then(|n| n.to_str())
                .and_then(|n| n.strip_suffix(".json"));
            match stem.and_then(key_from_stem) {
                Some(key) => keys.push(key),
                None => tracing::warn!(path = %path.display(), "unrecognized file in blob store"),
            }
        }
        keys.sort();
        Ok(keys)
    }

    fn path_for(&self, key: &str, ext: &str) -> PathBuf {
        self.dir.join(format!("{}.{}", file_stem(key), ext))
    }
}

fn has_extension(path: &Path, ext: &str) -> bool {
    path.file_name()
        .and_then(|n| n.to_str())
        .is_some_and(|n| n.ends_with(&format!(".{}", ext)))
}

async fn blocking<T: Send + 'static>(
    f: impl FnOnce() -> Result<T, BlobError> + Send + 'static,
) -> Result<T, BlobError> {
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| BlobError::Io(format!("blob store task failed: {}", e)))?
}

fn read_document(path: &Path, corrupt_path: &Path, key: &str) -> Result<Option<Value>, BlobError> {
    let bytes = match fs::read(path) {
        Ok(bytes) => bytes,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(e.into()),
    };
    let verified = serde_json::from_slice::<Envelope>(&bytes)
        .map_err(|e| e.to_string())
        .and_then(|envelope| envelope.verify(key).map(|()| envelope.value));
    match verified {
        Ok(value) => Ok(Some(value)),
        Err(reason) => {
            tracing::warn!(key, reason = %reason, "corrupt blob, moving aside");
            fs::rename(path, corrupt_path).map_err(|e| BlobError::Corrupt {
                key: key.to_string(),
                reason: format!("{} (could not move aside: {})", reason, e),
            })?;
            Ok(None)
        }
    }
}

/// On-disk bytes of every document except `skip`
fn stored_bytes(dir: &Path, skip: &Path) -> Result<usize, BlobError> {
    let mut total = 0usize;
    for entry in fs::read_dir(dir)? {
        let entry = entry?;
        let path = entry.path();
        if path == skip || !has_extension(&path, DOC_EXT) {
            continue;
        }
        total += entry.metadata()?.len() as usize;
    }
    Ok(total)
}

fn write_document(
    dir: &Path,
    path: &Path,
    tmp_path: &Path,
    key: &str,
    value: Value,
    quota: Option<usize>,
) -> Result<(), BlobError> {
    let envelope = Envelope::new(key, value)?;
    let bytes = serde_json::to_vec(&envelope).map_err(|e| BlobError::Io(e.to_string()))?;

    if let Some(quota) = quota {
        let total = stored_bytes(dir, path)? + bytes.len();
        if total > quota {
            return Err(BlobError::QuotaExceeded {
                key: key.to_string(),
                bytes: total,
                quota,
            });
        }
    }

    {
        let mut file = File::create(tmp_path)?;
        file.write_all(&bytes)?;
        file.sync_all()?;
    }
    // Atomic replace (rename is atomic on POSIX)
    fs::rename(tmp_path, path)?;
    // Persist the rename itself; not every platform can open a directory
    if let Ok(handle) = File::open(dir) {
        let _ = handle.sync_all();
    }
    Ok(())
}

#[async_trait]
impl BlobStore for FileBlobStore {
    async fn get(&self, key: &str) -> Result<Option<Value>, BlobError> {
        let path = self.path_for(key, DOC_EXT);
        let corrupt_path = self.path_for(key, CORRUPT_EXT);
        let key = key.to_string();
        blocking(move || read_document(&path, &corrupt_path, &key)).await
    }

    async fn set(&self, key: &str, value: Value) -> Result<(), BlobError> {
        let _writes = self.writes.lock().await;
        let dir = self.dir.clone();
        let path = self.path_for(key, DOC_EXT);
        let tmp_path = self.path_for(key, TMP_EXT);
        let quota = self.quota;
        let key = key.to_string();
        blocking(move || write_document(&dir, &path, &tmp_path, &key, value, quota)).await
    }

    async fn remove(&self, key: &str) -> Result<(), BlobError> {
        let _writes = self.writes.lock().await;
        let path = self.path_for(key, DOC_EXT);
        blocking(move || match fs::remove_file(&path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        })
        .await
    }
}

#[cfg(test)]
#[path = "blob_tests.rs"]
mod tests;
