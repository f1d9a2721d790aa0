// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use serde_json::json;
use yare::parameterized;

fn sample_entry() -> WalEntry {
    WalEntry::new(
        "wal-1",
        7,
        Operation::create("notes", "n-1", json!({ "body": "hello" })),
        Priority::High,
        1_700_000_000_000,
    )
}

#[test]
fn new_entry_is_pending_with_valid_checksum() {
    let entry = sample_entry();
    assert_eq!(entry.status, WalStatus::Pending);
    assert_eq!(entry.attempts, 0);
    assert!(entry.checksum > 0);
    assert!(entry.verify());
}

#[test]
fn tampered_operation_fails_verification() {
    let mut entry = sample_entry();
    entry.operation = Operation::delete("notes", "n-1");
    assert!(!entry.verify());
}

#[test]
fn persisted_form_uses_upper_case_enums() {
    let json = serde_json::to_string(&sample_entry()).unwrap();
    assert!(json.contains(r#""priority":"HIGH""#));
    assert!(json.contains(r#""status":"PENDING""#));
    assert!(!json.contains("processed_at_ms"));

    let parsed: WalEntry = serde_json::from_str(&json).unwrap();
    assert_eq!(parsed, sample_entry());
    assert!(parsed.verify());
}

#[parameterized(
    critical = { Priority::Critical, 0 },
    high = { Priority::High, 1 },
    normal = { Priority::Normal, 2 },
    low = { Priority::Low, 3 },
)]
fn priority_rank(priority: Priority, rank: u8) {
    assert_eq!(priority.rank(), rank);
    assert_eq!(priority.to_string().parse::<Priority>().unwrap(), priority);
}

#[test]
fn unknown_priority_is_rejected() {
    assert!("urgent".parse::<Priority>().is_err());
}

#[parameterized(
    pending = { WalStatus::Pending, 0, true, false },
    processing = { WalStatus::Processing, 1, false, false },
    failed_with_retries_left = { WalStatus::Failed, 2, true, false },
    failed_out_of_retries = { WalStatus::Failed, 3, false, true },
    committed = { WalStatus::Committed, 1, false, true },
)]
fn eligibility(status: WalStatus, attempts: u32, eligible: bool, terminal: bool) {
    let mut entry = sample_entry();
    entry.status = status;
    entry.attempts = attempts;
    assert_eq!(entry.is_eligible(3), eligible);
    assert_eq!(entry.is_terminal(3), terminal);
}

#[test]
fn recover_resets_processing_and_rewrites_create() {
    let mut entry = sample_entry();
    entry.mark_processing();
    let revision = entry.revision;

    entry.recover();

    assert_eq!(entry.status, WalStatus::Pending);
    assert_eq!(
        entry.operation,
        Operation::upsert("notes", "n-1", json!({ "body": "hello" }))
    );
    assert!(entry.verify());
    assert!(entry.revision > revision);
}

#[test]
fn transitions_bump_revision() {
    let mut entry = sample_entry();
    entry.mark_processing();
    entry.mark_failed("offline", 10);
    assert_eq!(entry.error.as_deref(), Some("offline"));
    entry.mark_processing();
    entry.mark_committed(20);

    assert_eq!(entry.revision, 4);
    assert_eq!(entry.error, None);
    assert_eq!(entry.last_touched_ms(), 20);
}
