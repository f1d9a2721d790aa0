// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use crate::wal::Priority;
use serde_json::json;
use std::time::Duration;

const T0: u64 = 1_700_000_000_000;

fn entry(id: &str, sequence: u64, priority: Priority) -> WalEntry {
    WalEntry::new(
        id,
        sequence,
        Operation::upsert("notes", id, json!({ "id": id })),
        priority,
        T0,
    )
}

fn state_with(entries: Vec<WalEntry>) -> WalState {
    let mut state = WalState::default();
    for e in entries {
        state.push(e);
    }
    state
}

fn ids(batch: &[(String, Operation)]) -> Vec<&str> {
    batch.iter().map(|(id, _)| id.as_str()).collect()
}

#[test]
fn batch_orders_by_priority_then_sequence() {
    let mut state = state_with(vec![
        entry("high", 0, Priority::High),
        entry("low", 1, Priority::Low),
        entry("critical", 2, Priority::Critical),
        entry("high-2", 3, Priority::High),
    ]);

    let batch = state.select_batch(3, 10, &HashSet::new());

    assert_eq!(ids(&batch), vec!["critical", "high", "high-2", "low"]);
    assert!(state
        .entries()
        .iter()
        .all(|e| e.status == WalStatus::Processing));
}

#[test]
fn batch_respects_size_and_skip_list() {
    let mut state = state_with(vec![
        entry("a", 0, Priority::Normal),
        entry("b", 1, Priority::Normal),
        entry("c", 2, Priority::Normal),
    ]);
    let skip: HashSet<String> = ["a".to_string()].into_iter().collect();

    let batch = state.select_batch(3, 1, &skip);

    assert_eq!(ids(&batch), vec!["b"]);
    assert_eq!(state.entry("a").unwrap().status, WalStatus::Pending);
}

#[test]
fn exhausted_failures_are_not_selected() {
    let mut failed = entry("spent", 0, Priority::Critical);
    failed.status = WalStatus::Failed;
    failed.attempts = 3;
    let mut retry = entry("retry", 1, Priority::Low);
    retry.status = WalStatus::Failed;
    retry.attempts = 1;
    let mut state = state_with(vec![failed, retry]);

    let batch = state.select_batch(3, 10, &HashSet::new());

    assert_eq!(ids(&batch), vec!["retry"]);
}

#[test]
fn merge_adopts_unknown_entries_and_prefers_higher_revision() {
    let mut state = state_with(vec![entry("mine", 0, Priority::Normal)]);
    let mut advanced = entry("mine", 0, Priority::Normal);
    advanced.mark_processing();
    advanced.mark_committed(T0 + 5);

    state.merge(Stored {
        entries: vec![advanced, entry("theirs", 4, Priority::Normal)],
        results: vec![OperationResult::success("mine", json!(1), T0 + 5)],
        next_sequence: 9,
    });

    assert_eq!(state.entry("mine").unwrap().status, WalStatus::Committed);
    assert!(state.entry("theirs").is_some());
    assert!(state.result("mine").is_some());
    assert_eq!(state.take_sequence(), 9);
}

#[test]
fn merge_keeps_local_changes_over_stale_copy() {
    let mut state = state_with(vec![entry("a", 0, Priority::Normal)]);
    state.entry_mut("a").unwrap().mark_processing();

    state.merge(Stored {
        entries: vec![entry("a", 0, Priority::Normal)],
        ..Stored::default()
    });

    assert_eq!(state.entry("a").unwrap().status, WalStatus::Processing);
}

#[test]
fn merge_does_not_resurrect_removed_entries_until_written() {
    let mut state = state_with(vec![entry("a", 0, Priority::Normal)]);
    state.remove("a");

    state.merge(Stored {
        entries: vec![entry("a", 0, Priority::Normal)],
        ..Stored::default()
    });
    assert!(state.entry("a").is_none());

    state.clear_retired();
    state.merge(Stored {
        entries: vec![entry("a", 0, Priority::Normal)],
        ..Stored::default()
    });
    assert!(state.entry("a").is_some());
}

#[test]
fn enforce_limits_drops_oldest_by_count() {
    let mut state = state_with((0..5).map(|i| entry(&format!("e{}", i), i, Priority::Normal)).collect());

    let report = state.enforce_limits(3, usize::MAX);

    let dropped: Vec<&str> = report.entries.iter().map(|e| e.id.as_str()).collect();
    assert_eq!(dropped, vec!["e0", "e1"]);
    assert_eq!(state.entries().len(), 3);
}

#[test]
fn enforce_limits_drops_oldest_by_bytes() {
    let mut state = state_with((0..4).map(|i| entry(&format!("e{}", i), i, Priority::Normal)).collect());
    let one = state.entries()[0].serialized_len();
    // Room for two entries plus brackets and a comma
    let limit = 2 * one + 3;

    let report = state.enforce_limits(100, limit);

    assert_eq!(report.entries.len(), 2);
    assert!(report.bytes_before > limit);
    assert!(state.serialized_size() <= limit);
    assert_eq!(state.entries()[0].id, "e2");
}

#[test]
fn enforce_limits_never_drops_the_last_entry() {
    let mut state = state_with(vec![entry("only", 0, Priority::Normal)]);
    let report = state.enforce_limits(0, 1);
    assert!(report.entries.is_empty());
    assert_eq!(state.entries().len(), 1);
}

#[test]
fn recover_resets_processing_and_rewrites_creates() {
    let mut create = WalEntry::new(
        "c",
        0,
        Operation::create("notes", "k", json!(1)),
        Priority::Normal,
        T0,
    );
    create.mark_processing();
    let mut done = entry("done", 1, Priority::Normal);
    done.mark_committed(T0);
    let mut state = state_with(vec![create, done]);

    assert_eq!(state.recover(3), 1);

    let recovered = state.entry("c").unwrap();
    assert_eq!(recovered.status, WalStatus::Pending);
    assert_eq!(recovered.operation, Operation::upsert("notes", "k", json!(1)));
    assert_eq!(state.entry("done").unwrap().status, WalStatus::Committed);
}

#[test]
fn reclaim_resets_only_processing_entries() {
    let mut create = WalEntry::new(
        "c",
        0,
        Operation::create("notes", "k", json!(1)),
        Priority::Normal,
        T0,
    );
    create.mark_processing();
    let revision = create.revision;
    let pending = WalEntry::new(
        "p",
        1,
        Operation::create("notes", "p", json!(2)),
        Priority::Normal,
        T0,
    );
    let mut state = state_with(vec![create, pending]);

    assert_eq!(state.reclaim_interrupted(), 1);

    let reclaimed = state.entry("c").unwrap();
    assert_eq!(reclaimed.status, WalStatus::Pending);
    assert_eq!(reclaimed.operation, Operation::upsert("notes", "k", json!(1)));
    assert!(reclaimed.revision > revision);
    // Untouched entries keep their original operation
    assert_eq!(
        state.entry("p").unwrap().operation,
        Operation::create("notes", "p", json!(2))
    );
    assert_eq!(state.reclaim_interrupted(), 0);
}

#[test]
fn settled_reports_terminal_outcomes_only() {
    let mut state = state_with(vec![entry("pending", 0, Priority::Normal)]);
    assert_eq!(state.settled("pending", 3), None);
    assert_eq!(state.settled("unknown", 3), None);

    state.record_result(OperationResult::success("gone", json!("ok"), T0));
    assert_eq!(state.settled("gone", 3), Some(Ok(json!("ok"))));

    let e = state.entry_mut("pending").unwrap();
    e.attempts = 3;
    e.mark_failed("offline", T0);
    assert!(matches!(
        state.settled("pending", 3),
        Some(Err(WalError::Failed { ref error, .. })) if error == "offline"
    ));
}

#[test]
fn cleanup_evicts_old_finished_entries_and_expires_stale_pending() {
    let config = WalConfig {
        cleanup_age: Duration::from_secs(60),
        max_age: Duration::from_secs(600),
        result_retention: Duration::from_secs(30),
        ..WalConfig::default()
    };
    let mut old_done = entry("old-done", 0, Priority::Normal);
    old_done.mark_committed(T0);
    let mut fresh_done = entry("fresh-done", 1, Priority::Normal);
    fresh_done.mark_committed(T0 + 590_000);
    let stale = entry("stale", 2, Priority::Normal);
    let mut state = state_with(vec![old_done, fresh_done, stale]);
    state.record_result(OperationResult::success("old-done", json!(1), T0));

    let report = state.cleanup(T0 + 601_000, &config);

    assert_eq!(report.evicted, 1);
    assert_eq!(report.expired, vec!["stale".to_string()]);
    assert_eq!(report.results_removed, 1);
    let left: Vec<&str> = state.entries().iter().map(|e| e.id.as_str()).collect();
    assert_eq!(left, vec!["fresh-done"]);
    assert!(matches!(
        state.settled("stale", 3),
        Some(Err(WalError::Failed { .. }))
    ));
}

#[test]
fn stats_count_each_status() {
    let mut retrying = entry("r", 1, Priority::Normal);
    retrying.attempts = 1;
    retrying.mark_failed("x", T0);
    let mut rejected = entry("x", 2, Priority::Normal);
    rejected.attempts = 3;
    rejected.mark_failed("x", T0);
    let state = state_with(vec![entry("p", 0, Priority::Normal), retrying, rejected]);

    let stats = state.stats(3);
    assert_eq!(stats.pending, 1);
    assert_eq!(stats.retrying, 1);
    assert_eq!(stats.rejected, 1);
    assert_eq!(stats.total(), 3);
    assert_eq!(stats.next_sequence, 3);
}

#[test]
fn parse_skips_corrupt_records() {
    let good = entry("good", 0, Priority::Normal);
    let mut tampered = entry("tampered", 1, Priority::Normal);
    tampered.checksum ^= 1;
    let doc = json!([good, tampered, { "not": "an entry" }]);

    let stored = Stored::parse(Some(doc), Some(json!("garbage")), Some(json!(7)));

    assert_eq!(stored.entries.len(), 1);
    assert_eq!(stored.entries[0].id, "good");
    assert!(stored.results.is_empty());
    assert_eq!(stored.next_sequence, 7);
}

#[test]
fn documents_round_trip_through_parse() {
    let mut state = state_with(vec![entry("a", 0, Priority::High)]);
    state.record_result(OperationResult::success("z", json!(null), T0));

    let (entries, results, sequence) = state.documents().unwrap();
    let stored = Stored::parse(Some(entries), Some(results), Some(sequence));

    assert_eq!(stored.entries, state.entries());
    assert_eq!(stored.results, state.results());
    assert_eq!(stored.next_sequence, 1);
}

#[test]
fn stored_stats_count_persisted_entries() {
    let mut done = entry("done", 1, Priority::Normal);
    done.mark_committed(T0);
    let stored = Stored {
        entries: vec![entry("p", 0, Priority::Normal), done],
        results: vec![OperationResult::success("done", json!(1), T0)],
        next_sequence: 2,
    };

    let stats = stored.stats(3);

    assert_eq!((stats.pending, stats.committed, stats.results), (1, 1, 1));
    assert_eq!(stats.next_sequence, 2);
}
