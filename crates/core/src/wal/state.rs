// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! In-memory WAL contents and the rules applied to them
//!
//! Nothing here performs I/O. [`WalState`] holds the entry list, the
//! operation results and the sequence counter of one context, and knows how
//! to fold in what other contexts persisted, trim itself to the storage
//! limits, pick the next batch, and age out old records.

use super::entry::{WalEntry, WalStatus};
use super::error::WalError;
use super::operation::Operation;
use super::result::OperationResult;
use crate::config::WalConfig;
use serde::Serialize;
use serde_json::Value;
use std::collections::HashSet;

/// Documents read back from the blob store
#[derive(Debug, Default)]
pub struct Stored {
    pub entries: Vec<WalEntry>,
    pub results: Vec<OperationResult>,
    pub next_sequence: u64,
}

impl Stored {
    /// Parse persisted documents, skipping records that fail to decode or
    /// whose checksum does not match
    pub fn parse(entries: Option<Value>, results: Option<Value>, sequence: Option<Value>) -> Self {
        Self {
            entries: parse_list::<WalEntry>("entries", entries)
                .into_iter()
                .filter(|entry| {
                    let ok = entry.verify();
                    if !ok {
                        tracing::warn!(entry_id = %entry.id, "checksum mismatch, skipping WAL entry");
                    }
                    ok
                })
                .collect(),
            results: parse_list("results", results),
            next_sequence: sequence.and_then(|v| v.as_u64()).unwrap_or(0),
        }
    }

    pub fn stats(self, max_attempts: u32) -> WalStats {
        let mut state = WalState::default();
        state.merge(self);
        state.stats(max_attempts)
    }
}

fn parse_list<T: serde::de::DeserializeOwned>(what: &str, doc: Option<Value>) -> Vec<T> {
    match doc {
        None | Some(Value::Null) => Vec::new(),
        Some(Value::Array(items)) => items
            .into_iter()
            .filter_map(|item| match serde_json::from_value(item) {
                Ok(parsed) => Some(parsed),
                Err(e) => {
                    tracing::warn!(document = what, error = %e, "unreadable WAL record, skipping");
                    None
                }
            })
            .collect(),
        Some(_) => {
            tracing::warn!(document = what, "WAL document is not a list, ignoring");
            Vec::new()
        }
    }
}

/// Entries removed to satisfy the entry-count or byte ceiling
#[derive(Debug, Default)]
pub struct DropReport {
    pub entries: Vec<WalEntry>,
    /// Serialized size of the entry list before dropping
    pub bytes_before: usize,
}

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct CleanupReport {
    /// Committed or terminally failed entries past `cleanup_age`
    pub evicted: usize,
    /// Unfinished entries past `max_age`
    pub expired: Vec<String>,
    pub results_removed: usize,
}

impl CleanupReport {
    pub fn is_empty(&self) -> bool {
        self.evicted == 0 && self.expired.is_empty() && self.results_removed == 0
    }
}

#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize)]
pub struct WalStats {
    pub pending: usize,
    pub processing: usize,
    pub committed: usize,
    /// Failed entries that will be retried
    pub retrying: usize,
    /// Failed entries with no attempts left
    pub rejected: usize,
    pub results: usize,
    pub next_sequence: u64,
}

impl WalStats {
    pub fn total(&self) -> usize {
        self.pending + self.processing + self.committed + self.retrying + self.rejected
    }
}

/// Serialized length of a JSON array whose items have the given lengths
fn array_len(item_lens: &[usize]) -> usize {
    2 + item_lens.iter().sum::<usize>() + item_lens.len().saturating_sub(1)
}

#[derive(Debug, Default)]
pub struct WalState {
    entries: Vec<WalEntry>,
    results: Vec<OperationResult>,
    next_sequence: u64,
    // Ids removed locally since the last write, so a merge does not
    // resurrect them from the stale persisted copy
    retired: HashSet<String>,
    retired_results: HashSet<String>,
}

impl WalState {
    pub fn entries(&self) -> &[WalEntry] {
        &self.entries
    }

    #[cfg(test)]
    pub fn results(&self) -> &[OperationResult] {
        &self.results
    }

    pub fn entry(&self, id: &str) -> Option<&WalEntry> {
        self.entries.iter().find(|e| e.id == id)
    }

    pub fn entry_mut(&mut self, id: &str) -> Option<&mut WalEntry> {
        self.entries.iter_mut().find(|e| e.id == id)
    }

    pub fn result(&self, entry_id: &str) -> Option<&OperationResult> {
        self.results.iter().find(|r| r.entry_id == entry_id)
    }

    pub fn take_sequence(&mut self) -> u64 {
        let sequence = self.next_sequence;
        self.next_sequence += 1;
        sequence
    }

    pub fn push(&mut self, entry: WalEntry) {
        self.next_sequence = self.next_sequence.max(entry.sequence + 1);
        self.entries.push(entry);
    }

    /// Remove an entry for good
    pub fn remove(&mut self, id: &str) -> Option<WalEntry> {
        let index = self.entries.iter().position(|e| e.id == id)?;
        let entry = self.entries.remove(index);
        self.retired.insert(entry.id.clone());
        Some(entry)
    }

    pub fn record_result(&mut self, result: OperationResult) {
        self.retired_results.remove(&result.entry_id);
        match self
            .results
            .iter_mut()
            .find(|r| r.entry_id == result.entry_id)
        {
            Some(existing) => *existing = result,
            None => self.results.push(result),
        }
    }

    /// Fold in state persisted by this or another context
    ///
    /// For an entry known to both sides the higher revision wins. Unknown
    /// entries and results are adopted unless they were removed here since
    /// the last write.
    pub fn merge(&mut self, stored: Stored) {
        for theirs in stored.entries {
            if self.retired.contains(&theirs.id) {
                continue;
            }
            match self.entries.iter_mut().find(|e| e.id == theirs.id) {
                Some(ours) => {
                    if theirs.revision > ours.revision {
                        *ours = theirs;
                    }
                }
                None => self.entries.push(theirs),
            }
        }
        self.entries
            .sort_by(|a, b| (a.created_at_ms, a.sequence).cmp(&(b.created_at_ms, b.sequence)));

        for theirs in stored.results {
            if self.retired_results.contains(&theirs.entry_id)
                || self.results.iter().any(|r| r.entry_id == theirs.entry_id)
            {
                continue;
            }
            self.results.push(theirs);
        }

        let after_entries = self
            .entries
            .iter()
            .map(|e| e.sequence + 1)
            .max()
            .unwrap_or(0);
        self.next_sequence = self
            .next_sequence
            .max(stored.next_sequence)
            .max(after_entries);
    }

    /// Called once a write has landed; retired ids are no longer on disk
    pub fn clear_retired(&mut self) {
        self.retired.clear();
        self.retired_results.clear();
    }

    #[cfg(test)]
    pub fn serialized_size(&self) -> usize {
        let lens: Vec<usize> = self.entries.iter().map(WalEntry::serialized_len).collect();
        array_len(&lens)
    }

    /// Drop oldest entries until both ceilings hold
    ///
    /// The newest entry is never dropped here; an entry too large on its
    /// own is refused before it is queued.
    pub fn enforce_limits(&mut self, max_entries: usize, max_bytes: usize) -> DropReport {
        let mut lens: Vec<usize> = self.entries.iter().map(WalEntry::serialized_len).collect();
        let bytes_before = array_len(&lens);
        let mut report = DropReport {
            entries: Vec::new(),
            bytes_before,
        };

        let mut bytes = bytes_before;
        while self.entries.len() > 1 && (self.entries.len() > max_entries || bytes > max_bytes) {
            let entry = self.entries.remove(0);
            lens.remove(0);
            bytes = array_len(&lens);
            self.retired.insert(entry.id.clone());
            report.entries.push(entry);
        }
        report
    }

    /// Drop the single oldest entry, if more than one remains
    pub fn drop_oldest(&mut self) -> Option<WalEntry> {
        if self.entries.len() <= 1 {
            return None;
        }
        let entry = self.entries.remove(0);
        self.retired.insert(entry.id.clone());
        Some(entry)
    }

    /// Drop the result that completed first
    pub fn drop_oldest_result(&mut self) -> Option<OperationResult> {
        let index = self
            .results
            .iter()
            .enumerate()
            .min_by_key(|(_, r)| r.completed_at_ms)
            .map(|(i, _)| i)?;
        let result = self.results.remove(index);
        self.retired_results.insert(result.entry_id.clone());
        Some(result)
    }

    pub fn has_eligible(&self, max_attempts: u32) -> bool {
        self.entries.iter().any(|e| e.is_eligible(max_attempts))
    }

    /// Mark the next batch PROCESSING and return what to execute
    ///
    /// Order is priority rank, then sequence. Entries in `skip` were already
    /// attempted during this pass.
    pub fn select_batch(
        &mut self,
        max_attempts: u32,
        batch_size: usize,
        skip: &HashSet<String>,
    ) -> Vec<(String, Operation)> {
        let mut eligible: Vec<&mut WalEntry> = self
            .entries
            .iter_mut()
            .filter(|e| e.is_eligible(max_attempts) && !skip.contains(&e.id))
            .collect();
        eligible.sort_by(|a, b| {
            a.order_key()
                .cmp(&b.order_key())
                .then_with(|| a.id.cmp(&b.id))
        });
        eligible
            .into_iter()
            .take(batch_size.max(1))
            .map(|entry| {
                entry.mark_processing();
                (entry.id.clone(), entry.operation.clone())
            })
            .collect()
    }

    /// Return an entry picked for a batch that was never executed
    pub fn requeue(&mut self, id: &str) {
        if let Some(entry) = self.entry_mut(id) {
            if entry.status == WalStatus::Processing {
                entry.status = WalStatus::Pending;
                entry.revision += 1;
            }
        }
    }

    /// Interrupted entries go back to PENDING as idempotent writes; returns
    /// how many were reset
    pub fn reclaim_interrupted(&mut self) -> usize {
        let mut reclaimed = 0;
        for entry in &mut self.entries {
            if entry.status == WalStatus::Processing {
                entry.recover();
                reclaimed += 1;
            }
        }
        reclaimed
    }

    /// Startup recovery: interrupted entries go back to PENDING and every
    /// unfinished operation is made safe to repeat
    pub fn recover(&mut self, max_attempts: u32) -> usize {
        let mut recovered = 0;
        for entry in &mut self.entries {
            if entry.status == WalStatus::Processing || entry.is_eligible(max_attempts) {
                entry.recover();
                recovered += 1;
            }
        }
        recovered
    }

    /// Outcome for `id` if it is settled one way or the other
    pub fn settled(&self, id: &str, max_attempts: u32) -> Option<Result<Value, WalError>> {
        let entry = self.entry(id);
        if entry.is_some_and(|e| !e.is_terminal(max_attempts)) {
            return None;
        }
        if let Some(result) = self.result(id) {
            return Some(result.outcome());
        }
        entry.map(|e| match e.status {
            WalStatus::Committed => Ok(Value::Null),
            _ => Err(WalError::Failed {
                entry_id: e.id.clone(),
                error: e.error.clone().unwrap_or_default(),
            }),
        })
    }

    /// Age out old entries and results
    pub fn cleanup(&mut self, now_ms: u64, config: &WalConfig) -> CleanupReport {
        let cleanup_age = config.cleanup_age.as_millis() as u64;
        let max_age = config.max_age.as_millis() as u64;
        let retention = config.result_retention.as_millis() as u64;
        let mut report = CleanupReport::default();

        let mut kept = Vec::with_capacity(self.entries.len());
        for entry in std::mem::take(&mut self.entries) {
            if entry.is_terminal(config.max_attempts)
                && now_ms.saturating_sub(entry.last_touched_ms()) > cleanup_age
            {
                report.evicted += 1;
                self.retired.insert(entry.id);
            } else if entry.is_eligible(config.max_attempts)
                && now_ms.saturating_sub(entry.created_at_ms) > max_age
            {
                report.expired.push(entry.id.clone());
                self.retired.insert(entry.id);
            } else {
                kept.push(entry);
            }
        }
        self.entries = kept;

        let before = self.results.len();
        let retired_results = &mut self.retired_results;
        self.results.retain(|r| {
            let keep = now_ms.saturating_sub(r.completed_at_ms) <= retention;
            if !keep {
                retired_results.insert(r.entry_id.clone());
            }
            keep
        });
        report.results_removed = before - self.results.len();

        for id in &report.expired {
            self.record_result(OperationResult::failure(
                id.clone(),
                "expired before it could be applied",
                format!("pending longer than {:?}", config.max_age),
                now_ms,
            ));
        }
        report
    }

    pub fn stats(&self, max_attempts: u32) -> WalStats {
        let mut stats = WalStats {
            results: self.results.len(),
            next_sequence: self.next_sequence,
            ..WalStats::default()
        };
        for entry in &self.entries {
            match entry.status {
                WalStatus::Pending => stats.pending += 1,
                WalStatus::Processing => stats.processing += 1,
                WalStatus::Committed => stats.committed += 1,
                WalStatus::Failed if entry.attempts < max_attempts => stats.retrying += 1,
                WalStatus::Failed => stats.rejected += 1,
            }
        }
        stats
    }

    /// Persistable form: entry list, result list, next sequence
    pub fn documents(&self) -> Result<(Value, Value, Value), WalError> {
        let entries =
            serde_json::to_value(&self.entries).map_err(|e| WalError::Malformed(e.to_string()))?;
        let results =
            serde_json::to_value(&self.results).map_err(|e| WalError::Malformed(e.to_string()))?;
        Ok((entries, results, Value::from(self.next_sequence)))
    }
}

#[cfg(test)]
#[path = "state_tests.rs"]
mod tests;
