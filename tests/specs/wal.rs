//! Write-ahead log over a durable file store shared by several contexts.

use crate::prelude::*;
use harbor_core::wal::{BlobStore, Stored};

#[tokio::test]
async fn primary_applies_every_context_s_writes_in_priority_order() {
    let dir = tempfile::tempdir().unwrap();
    let store = FileBlobStore::open(dir.path()).unwrap();
    let target = FakeWriteTarget::new();
    let bus = LocalBus::new();
    let elections = vec![participant("tab-a", &bus), participant("tab-b", &bus)];
    elect_all(&elections).await;
    let primary = wal_for(&elections[0], &store, &target);
    let secondary = wal_for(&elections[1], &store, &target);

    let low = secondary
        .queue_write(Operation::custom("low", vec![]), Priority::Low)
        .await
        .unwrap();
    let critical = secondary
        .queue_write(Operation::custom("critical", vec![]), Priority::Critical)
        .await
        .unwrap();
    primary
        .queue_write(Operation::custom("normal", vec![]), Priority::Normal)
        .await
        .unwrap();
    primary
        .queue_write(Operation::custom("high", vec![]), Priority::High)
        .await
        .unwrap();
    assert!(target.calls().is_empty());

    let leader = elections[0].leader().unwrap();
    let report = primary.process_wal(&leader).await.unwrap();

    assert_eq!(report.committed, 4);
    similar_asserts::assert_eq!(
        target.committed_names(),
        vec!["critical", "high", "normal", "low"]
    );

    // The secondary recovers outcomes from the shared store
    for (queued, name) in [(low, "low"), (critical, "critical")] {
        let id = queued.entry_id().unwrap().to_string();
        let result = secondary
            .wait_for_result(&id, Duration::from_secs(2))
            .await
            .unwrap();
        assert_eq!(result["name"], json!(name));
    }

    for election in &elections {
        election.shutdown().await;
    }
}

#[tokio::test]
async fn queued_writes_survive_restart_and_replay_once() {
    let dir = tempfile::tempdir().unwrap();
    {
        let store = FileBlobStore::open(dir.path()).unwrap();
        let election = lone_participant("tab-a");
        let wal = wal_for(&election, &store, &FakeWriteTarget::new());
        for key in ["first", "second"] {
            wal.queue_write(
                Operation::create("notes", key, json!({ "key": key })),
                Priority::Normal,
            )
            .await
            .unwrap();
        }
        wal.shutdown().await.unwrap();
    }

    let store = FileBlobStore::open(dir.path()).unwrap();
    let target = FakeWriteTarget::new();
    let election = lone_participant("tab-a");
    election.start().await.unwrap();
    let wal = wal_for(&election, &store, &target);
    let leader = election.leader().unwrap();

    let report = wal.replay_wal(&leader).await.unwrap();

    assert_eq!(report.committed, 2);
    assert_eq!(target.store().len("notes"), 2);
    assert!(target
        .store()
        .executed()
        .iter()
        .all(|op| matches!(op, Operation::Upsert { .. })));

    let again = wal.replay_wal(&leader).await.unwrap();
    assert_eq!(again.committed, 0);
    assert_eq!(target.calls().len(), 2);

    // Committed state is on disk for the next reader
    let ns = fast_wal_config().namespace;
    let stored = Stored::parse(
        store.get(&format!("{}:entries", ns)).await.unwrap(),
        store.get(&format!("{}:results", ns)).await.unwrap(),
        store.get(&format!("{}:sequence", ns)).await.unwrap(),
    );
    let stats = stored.stats(fast_wal_config().max_attempts);
    assert_eq!(stats.committed, 2);
    assert_eq!(stats.results, 2);
}

#[tokio::test]
async fn background_processing_drains_after_init() {
    let dir = tempfile::tempdir().unwrap();
    let store = FileBlobStore::open(dir.path()).unwrap();
    let target = FakeWriteTarget::new();
    let election = lone_participant("tab-a");
    election.start().await.unwrap();
    let wal = wal_for(&election, &store, &target);
    wal.init().await.unwrap();

    let queued = wal
        .queue_write(Operation::upsert("notes", "k", json!(1)), Priority::High)
        .await
        .unwrap();
    let value = tokio::time::timeout(Duration::from_secs(5), queued.outcome())
        .await
        .unwrap()
        .unwrap();

    assert_eq!(value, json!(1));
    assert_eq!(target.store().get("notes", "k"), Some(json!(1)));
    wal.shutdown().await.unwrap();
}
