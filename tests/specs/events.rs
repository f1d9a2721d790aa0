//! Event log shared by several contexts.

use crate::prelude::*;

fn log_over(store: &MemoryEventStore, config: EventLogConfig) -> EventLog {
    EventLog::new(Arc::new(store.clone()), config, NoticeBus::new())
}

#[tokio::test]
async fn contexts_append_into_one_ordered_log() {
    let store = MemoryEventStore::new();
    let a = ContextId::new("tab-a");
    let b = ContextId::new("tab-b");
    let log_a = log_over(&store, EventLogConfig::default());
    let log_b = log_over(&store, EventLogConfig::default());
    let clock_a = LocalClockSource::new(a.clone());
    let clock_b = LocalClockSource::new(b.clone());

    for n in 0..3 {
        log_a
            .append_event("note", json!({ "n": n }), clock_a.causal_clock_snapshot(), &a)
            .await
            .unwrap();
        log_b
            .append_event("note", json!({ "n": n }), clock_b.causal_clock_snapshot(), &b)
            .await
            .unwrap();
    }

    let events = log_b.get_events(None, 100).await.unwrap();
    assert_eq!(events.len(), 6);
    assert!(events
        .windows(2)
        .all(|w| w[0].sequence_number < w[1].sequence_number));
    let sources: Vec<_> = events.iter().map(|e| e.source_context.to_string()).collect();
    assert_eq!(sources, ["tab-a", "tab-b", "tab-a", "tab-b", "tab-a", "tab-b"]);

    let after = log_a
        .get_events(Some(events[3].sequence_number), 100)
        .await
        .unwrap();
    assert_eq!(after.len(), 2);
}

#[tokio::test]
async fn compaction_keeps_history_from_the_checkpoint() {
    let store = MemoryEventStore::new();
    let me = ContextId::new("tab-a");
    let log = log_over(
        &store,
        EventLogConfig {
            max_events: 5,
            checkpoint_interval: 0,
            min_events_after_checkpoint: 2,
            ..EventLogConfig::default()
        },
    );
    let clock = LocalClockSource::new(me.clone());

    let mut sequences = Vec::new();
    for n in 0..4 {
        let event = log
            .append_event("note", json!(n), clock.causal_clock_snapshot(), &me)
            .await
            .unwrap();
        sequences.push(event.sequence_number);
    }
    log.create_checkpoint(sequences[2], json!({ "reason": "snapshot" }))
        .await
        .unwrap();
    for n in 4..6 {
        let event = log
            .append_event("note", json!(n), clock.causal_clock_snapshot(), &me)
            .await
            .unwrap();
        sequences.push(event.sequence_number);
    }

    // The sixth append pushed the count past the limit
    let remaining = log.get_events(None, 100).await.unwrap();
    let kept: Vec<_> = remaining.iter().map(|e| e.sequence_number).collect();
    assert_eq!(kept, sequences[2..].to_vec());
    assert_eq!(
        log.get_latest_checkpoint()
            .await
            .unwrap()
            .map(|cp| cp.sequence_number),
        Some(sequences[2])
    );
}
