// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! `harbor simulate` - several contexts sharing one bus and one store
//!
//! Every context queues its writes through its own write-ahead log; only the
//! elected primary applies them. With `--handoff` the first primary leaves
//! before any write is queued, so a successor has to take over.

use crate::output::{self, OutputFormat};
use anyhow::{Context, Result};
use clap::Args;
use harbor_core::adapters::{
    CausalClockSource, LocalClockSource, MemoryWriteTarget, StaticSecureContext,
};
use harbor_core::cache::PinnedLruCache;
use harbor_core::config::HarborConfig;
use harbor_core::election::{ContextId, LeaderElection, LocalBus};
use harbor_core::events::{EventLog, MemoryEventStore};
use harbor_core::notice::NoticeBus;
use harbor_core::wal::{Operation, Priority, WalBackends, WalStats, WriteAheadLog};
use harbor_storage::FileBlobStore;
use serde::Serialize;
use serde_json::{json, Value};
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinSet;

const PRIORITIES: [Priority; 4] = [
    Priority::Normal,
    Priority::High,
    Priority::Low,
    Priority::Critical,
];

#[derive(Args)]
pub struct SimulateArgs {
    /// Directory of the shared blob store
    #[arg(long)]
    pub store: PathBuf,

    /// Number of contexts to run
    #[arg(long, default_value_t = 3)]
    pub contexts: usize,

    /// Writes queued by each context
    #[arg(long, default_value_t = 2)]
    pub writes: usize,

    /// The first primary leaves before any write is queued
    #[arg(long)]
    pub handoff: bool,

    /// Seconds to wait for each write to settle
    #[arg(long, default_value_t = 30)]
    pub timeout: u64,
}

struct SimContext {
    id: ContextId,
    election: LeaderElection,
    wal: WriteAheadLog,
    events: EventLog,
    clock: LocalClockSource,
    // Values written but not yet confirmed stay pinned
    cache: PinnedLruCache<String, Value>,
}

#[derive(Debug, Serialize)]
pub struct SimulationReport {
    pub contexts: usize,
    pub primary: Option<String>,
    pub handoff_from: Option<String>,
    pub queued: usize,
    pub committed: usize,
    pub failed: usize,
    /// Records present in the target afterwards
    pub records: usize,
    pub events: u64,
    pub wal: WalStats,
}

impl fmt::Display for SimulationReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "contexts:   {}", self.contexts)?;
        writeln!(f, "primary:    {}", self.primary.as_deref().unwrap_or("-"))?;
        if let Some(from) = &self.handoff_from {
            writeln!(f, "handoff:    from {}", from)?;
        }
        writeln!(f, "queued:     {}", self.queued)?;
        writeln!(f, "committed:  {}", self.committed)?;
        writeln!(f, "failed:     {}", self.failed)?;
        writeln!(f, "records:    {}", self.records)?;
        writeln!(f, "events:     {}", self.events)?;
        writeln!(
            f,
            "wal:        {} committed, {} pending, {} retrying, {} rejected",
            self.wal.committed, self.wal.pending, self.wal.retrying, self.wal.rejected
        )
    }
}

pub async fn simulate(args: SimulateArgs, config: &HarborConfig, format: OutputFormat) -> Result<()> {
    if args.contexts == 0 {
        anyhow::bail!("--contexts must be at least 1");
    }
    if args.handoff && args.contexts < 2 {
        anyhow::bail!("--handoff needs at least 2 contexts");
    }

    let store = FileBlobStore::open(&args.store)
        .with_context(|| format!("opening store {}", args.store.display()))?;
    let bus = LocalBus::new();
    let target = MemoryWriteTarget::new();
    let event_store = MemoryEventStore::new();
    let notices = NoticeBus::new();

    let mut contexts: Vec<SimContext> = (1..=args.contexts)
        .map(|n| {
            let id = ContextId::new(format!("tab-{:03}", n));
            let election = LeaderElection::new(
                id.clone(),
                config.election.clone(),
                Some(Arc::new(bus.clone())),
                notices.clone(),
            );
            let backends = WalBackends {
                blobs: Arc::new(store.clone()),
                target: Arc::new(target.clone()),
                secure: Arc::new(StaticSecureContext(false)),
            };
            SimContext {
                wal: WriteAheadLog::new(config.wal.clone(), backends, election.clone(), notices.clone()),
                events: EventLog::new(
                    Arc::new(event_store.clone()),
                    config.events.clone(),
                    notices.clone(),
                ),
                clock: LocalClockSource::new(id.clone()),
                cache: PinnedLruCache::from_config(&config.cache),
                id,
                election,
            }
        })
        .collect();

    elect(&contexts).await?;
    for ctx in &contexts {
        ctx.wal.init().await?;
    }

    let mut handoff_from = None;
    if args.handoff {
        if let Some(index) = contexts.iter().position(|c| c.election.is_primary()) {
            let leaving = contexts.remove(index);
            tracing::info!(context = %leaving.id, "primary leaving");
            leaving.wal.shutdown().await?;
            leaving.election.shutdown().await;
            handoff_from = Some(leaving.id.to_string());
        }
    }

    let mut pending = Vec::new();
    for (index, ctx) in contexts.iter_mut().enumerate() {
        for n in 0..args.writes {
            let key = format!("{}-note-{}", ctx.id, n);
            let value = json!({ "author": ctx.id.as_str(), "n": n });
            ctx.cache.set(key.clone(), value.clone());
            ctx.cache.pin(&key);

            let priority = PRIORITIES[n % PRIORITIES.len()];
            let queued = ctx
                .wal
                .queue_write(Operation::upsert("notes", key.clone(), value), priority)
                .await?;
            ctx.events
                .append_event(
                    "write_queued",
                    json!({ "key": key, "priority": priority.to_string() }),
                    ctx.clock.causal_clock_snapshot(),
                    &ctx.id,
                )
                .await?;
            if let Some(entry_id) = queued.entry_id() {
                pending.push((index, entry_id.to_string(), key));
            }
        }
    }

    let timeout = Duration::from_secs(args.timeout);
    let (mut committed, mut failed) = (0, 0);
    for (index, entry_id, key) in &pending {
        let Some(ctx) = contexts.get_mut(*index) else {
            continue;
        };
        match ctx.wal.wait_for_result(entry_id, timeout).await {
            Ok(_) => committed += 1,
            Err(e) => {
                tracing::warn!(context = %ctx.id, entry_id = %entry_id, error = %e, "write did not commit");
                failed += 1;
            }
        }
        ctx.cache.unpin(key);
    }

    let primary = contexts.iter().find(|c| c.election.is_primary());
    let wal = primary.map(|c| c.wal.stats()).unwrap_or_default();
    let events = match contexts.first() {
        Some(ctx) => ctx.events.event_count().await?,
        None => 0,
    };
    let report = SimulationReport {
        contexts: args.contexts,
        primary: primary.map(|c| c.id.to_string()),
        handoff_from,
        queued: pending.len(),
        committed,
        failed,
        records: target.len("notes"),
        events,
        wal,
    };

    for ctx in &contexts {
        ctx.wal.shutdown().await?;
        ctx.election.shutdown().await;
    }

    output::print(&report, format);
    if failed > 0 {
        anyhow::bail!("{} of {} writes did not commit", failed, pending.len());
    }
    Ok(())
}

/// Connect every context first so no candidacy goes unheard, then elect
async fn elect(contexts: &[SimContext]) -> Result<()> {
    for ctx in contexts {
        ctx.election.connect()?;
    }
    let mut rounds = JoinSet::new();
    for ctx in contexts {
        let election = ctx.election.clone();
        rounds.spawn(async move {
            let outcome = election.start().await;
            (election.context_id().clone(), outcome)
        });
    }
    while let Some(joined) = rounds.join_next().await {
        let (id, outcome) = joined?;
        tracing::info!(context = %id, outcome = ?outcome?, "election finished");
    }
    Ok(())
}
