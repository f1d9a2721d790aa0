//! Shared wiring for multi-context specs.

#![allow(dead_code, unused_imports)]

pub use harbor_core::adapters::{CausalClockSource, FakeWriteTarget, LocalClockSource, StaticSecureContext};
pub use harbor_core::config::{ElectionConfig, EventLogConfig, WalConfig};
pub use harbor_core::election::{ContextId, ElectionOutcome, LeaderElection, LocalBus};
pub use harbor_core::events::{EventLog, MemoryEventStore};
pub use harbor_core::notice::NoticeBus;
pub use harbor_core::wal::{Operation, Priority, WalBackends, WriteAheadLog};
pub use harbor_storage::FileBlobStore;
pub use serde_json::json;
pub use std::sync::Arc;
pub use std::time::Duration;

pub const WINDOW: Duration = Duration::from_millis(100);

/// Participant on `bus` with a fixed candidacy window
pub fn participant(id: &str, bus: &LocalBus) -> LeaderElection {
    LeaderElection::with_window(
        ContextId::new(id),
        ElectionConfig::default(),
        Some(Arc::new(bus.clone())),
        NoticeBus::new(),
        WINDOW,
    )
}

/// Participant with no broadcast channel; fails open to primary
pub fn lone_participant(id: &str) -> LeaderElection {
    LeaderElection::with_window(
        ContextId::new(id),
        ElectionConfig::default(),
        None,
        NoticeBus::new(),
        WINDOW,
    )
}

/// Connect everyone first, then run the initial election concurrently
pub async fn elect_all(elections: &[LeaderElection]) -> Vec<ElectionOutcome> {
    for election in elections {
        election.connect().unwrap();
    }
    let rounds: Vec<_> = elections
        .iter()
        .cloned()
        .map(|e| tokio::spawn(async move { e.start().await.unwrap() }))
        .collect();
    let mut outcomes = Vec::new();
    for round in rounds {
        outcomes.push(round.await.unwrap());
    }
    outcomes
}

/// Poll `cond` every 10ms until it holds or `timeout` passes
pub async fn eventually(timeout: Duration, cond: impl Fn() -> bool) -> bool {
    let deadline = tokio::time::Instant::now() + timeout;
    while tokio::time::Instant::now() < deadline {
        if cond() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    cond()
}

pub fn fast_wal_config() -> WalConfig {
    WalConfig {
        replay_delay: Duration::from_millis(10),
        result_poll_interval: Duration::from_millis(10),
        ..WalConfig::default()
    }
}

/// WAL over a shared file store and write target
pub fn wal_for(
    election: &LeaderElection,
    store: &FileBlobStore,
    target: &FakeWriteTarget,
) -> WriteAheadLog {
    WriteAheadLog::new(
        fast_wal_config(),
        WalBackends {
            blobs: Arc::new(store.clone()),
            target: Arc::new(target.clone()),
            secure: Arc::new(StaticSecureContext(false)),
        },
        election.clone(),
        NoticeBus::new(),
    )
}
