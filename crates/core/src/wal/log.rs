// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Durable, priority-ordered queue of deferred writes
//!
//! Every context can queue writes; only the primary applies them. The entry
//! list, results and sequence counter are mirrored to the blob store after
//! every change, and each write first folds in whatever other contexts
//! persisted, so the primary eventually picks up entries queued elsewhere.
//!
//! Background work runs on two tasks started by `init`: a processor that
//! drains the log when woken or when a retry comes due, and a cleanup timer.
//! Startup replay runs once, the first time this context holds authority.

use super::blob::{BlobError, BlobStore};
use super::entry::{Priority, WalEntry};
use super::error::WalError;
use super::operation::Operation;
use super::result::OperationResult;
use super::state::{CleanupReport, DropReport, Stored, WalState, WalStats};
use crate::adapters::{SecureContext, WriteError, WriteTarget};
use crate::clock::{Clock, SystemClock};
use crate::config::WalConfig;
use crate::election::{Leader, LeaderElection};
use crate::id::{IdGen, UuidIdGen};
use crate::notice::{Notice, NoticeBus};
use serde_json::Value;
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio::sync::{oneshot, watch, Notify};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::Instrument;

type Waiter = oneshot::Sender<Result<Value, WalError>>;

/// Stores and predicates the WAL writes through
#[derive(Clone)]
pub struct WalBackends {
    pub blobs: Arc<dyn BlobStore>,
    pub target: Arc<dyn WriteTarget>,
    pub secure: Arc<dyn SecureContext>,
}

/// Handle to a write accepted by `queue_write`
pub struct QueuedWrite {
    entry_id: Option<String>,
    receiver: oneshot::Receiver<Result<Value, WalError>>,
}

impl QueuedWrite {
    fn resolved(outcome: Result<Value, WalError>) -> Self {
        let (tx, rx) = oneshot::channel();
        let _ = tx.send(outcome);
        Self {
            entry_id: None,
            receiver: rx,
        }
    }

    /// WAL entry id, or `None` when the write went straight to the target
    pub fn entry_id(&self) -> Option<&str> {
        self.entry_id.as_deref()
    }

    /// Wait for the write to commit or be rejected
    pub async fn outcome(self) -> Result<Value, WalError> {
        self.receiver
            .await
            .unwrap_or_else(|_| Err(WalError::ShutDown))
    }
}

/// What one processing pass did
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct PassReport {
    pub committed: usize,
    /// Failed but will be retried
    pub failed: usize,
    /// Failed for the last time; caller rejected
    pub rejected: usize,
    /// Delay before the next pass, when work is left over
    pub retry_in: Option<Duration>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ReplayPhase {
    NotStarted,
    Running,
    Done,
}

#[derive(Default)]
struct Ledger {
    wal: WalState,
    waiters: HashMap<String, Waiter>,
    initialized: bool,
    shut_down: bool,
    replay_started: bool,
    process_requested: bool,
    next_pass_at: Option<Instant>,
    backoff_round: u32,
    // Leadership epoch whose interrupted entries were already reclaimed
    reclaimed_epoch: Option<u64>,
}

struct Keys {
    entries: String,
    sequence: String,
    results: String,
}

impl Keys {
    fn new(namespace: &str) -> Self {
        Self {
            entries: format!("{}:entries", namespace),
            sequence: format!("{}:sequence", namespace),
            results: format!("{}:results", namespace),
        }
    }
}

struct Inner<C, I> {
    config: WalConfig,
    keys: Keys,
    backends: WalBackends,
    election: LeaderElection,
    notices: NoticeBus,
    clock: C,
    ids: I,
    ledger: Mutex<Ledger>,
    // Serializes read-merge-write cycles against the blob store
    io: tokio::sync::Mutex<()>,
    // Held for the duration of a processing pass or replay
    pass: tokio::sync::Mutex<()>,
    replay: watch::Sender<ReplayPhase>,
    wake: Notify,
    tasks: Mutex<Vec<JoinHandle<()>>>,
}

pub struct WriteAheadLog<C: Clock = SystemClock, I: IdGen = UuidIdGen> {
    inner: Arc<Inner<C, I>>,
}

impl<C: Clock, I: IdGen> Clone for WriteAheadLog<C, I> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl WriteAheadLog {
    pub fn new(
        config: WalConfig,
        backends: WalBackends,
        election: LeaderElection,
        notices: NoticeBus,
    ) -> Self {
        Self::with_deps(
            config,
            backends,
            election,
            notices,
            SystemClock,
            UuidIdGen::with_prefix("wal"),
        )
    }
}

impl<C: Clock, I: IdGen> WriteAheadLog<C, I> {
    pub fn with_deps(
        config: WalConfig,
        backends: WalBackends,
        election: LeaderElection,
        notices: NoticeBus,
        clock: C,
        ids: I,
    ) -> Self {
        let (replay, _) = watch::channel(ReplayPhase::NotStarted);
        Self {
            inner: Arc::new(Inner {
                keys: Keys::new(&config.namespace),
                config,
                backends,
                election,
                notices,
                clock,
                ids,
                ledger: Mutex::new(Ledger::default()),
                io: tokio::sync::Mutex::new(()),
                pass: tokio::sync::Mutex::new(()),
                replay,
                wake: Notify::new(),
                tasks: Mutex::new(Vec::new()),
            }),
        }
    }

    /// Load persisted state and start background work
    ///
    /// Subscribes to authority changes so that gaining primary triggers
    /// replay (the first time) or a processing pass.
    pub async fn init(&self) -> Result<(), WalError> {
        {
            let mut ledger = self.ledger();
            if ledger.shut_down {
                return Err(WalError::ShutDown);
            }
            if ledger.initialized {
                return Ok(());
            }
            ledger.initialized = true;
        }
        if let Err(e) = self.sync().await {
            self.ledger().initialized = false;
            return Err(e);
        }

        let weak = Arc::downgrade(&self.inner);
        self.inner.election.on_authority_change(move |is_primary| {
            if let Some(inner) = weak.upgrade() {
                WriteAheadLog { inner }.authority_changed(is_primary);
            }
        });

        let processor = tokio::spawn(self.clone().process_loop());
        let cleanup = tokio::spawn(self.clone().cleanup_loop());
        self.track(processor);
        self.track(cleanup);

        if let Some(leader) = self.inner.election.leader() {
            self.spawn_replay(leader);
        }

        let stats = self.stats();
        tracing::info!(
            context = %self.inner.election.context_id(),
            pending = stats.pending,
            total = stats.total(),
            "write-ahead log initialized"
        );
        Ok(())
    }

    /// Stop background work and persist
    ///
    /// Waits for an in-flight pass to finish. Callers still waiting on an
    /// outcome are released with `ShutDown`; their entries stay persisted
    /// for whichever context processes next.
    pub async fn shutdown(&self) -> Result<(), WalError> {
        self.ledger().shut_down = true;
        let _pass = self.inner.pass.lock().await;

        let tasks: Vec<JoinHandle<()>> = self
            .inner
            .tasks
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .drain(..)
            .collect();
        for task in tasks {
            task.abort();
        }
        self.inner.replay.send_if_modified(|phase| {
            let running = *phase == ReplayPhase::Running;
            if running {
                *phase = ReplayPhase::Done;
            }
            running
        });

        let result = self.sync().await;
        let waiters: Vec<Waiter> = self.ledger().waiters.drain().map(|(_, w)| w).collect();
        for waiter in waiters {
            let _ = waiter.send(Err(WalError::ShutDown));
        }
        tracing::info!(context = %self.inner.election.context_id(), "write-ahead log shut down");
        result
    }

    pub fn stats(&self) -> WalStats {
        self.ledger().wal.stats(self.inner.config.max_attempts)
    }

    /// Snapshot of the in-memory entry list
    pub fn entries(&self) -> Vec<WalEntry> {
        self.ledger().wal.entries().to_vec()
    }

    /// Apply a write now if possible, otherwise queue it durably
    ///
    /// Fails with `EntryTooLarge` if the entry alone exceeds the byte
    /// ceiling, or with a storage error if it could not be persisted; in
    /// both cases nothing is queued.
    pub async fn queue_write(
        &self,
        operation: Operation,
        priority: Priority,
    ) -> Result<QueuedWrite, WalError> {
        if self.ledger().shut_down {
            return Err(WalError::ShutDown);
        }

        let backends = &self.inner.backends;
        if backends.secure.is_secure_context() && backends.target.is_direct_write_available() {
            tracing::debug!(operation = operation.name(), "writing directly");
            let outcome = backends
                .target
                .execute(&operation)
                .await
                .map_err(WalError::from);
            return Ok(QueuedWrite::resolved(outcome));
        }

        self.wait_for_replay().await;

        let config = &self.inner.config;
        let entry_id = self.inner.ids.next();
        let op_name = operation.name().to_string();
        let (tx, rx) = oneshot::channel();
        {
            let mut ledger = self.ledger();
            let sequence = ledger.wal.take_sequence();
            let entry = WalEntry::new(
                entry_id.clone(),
                sequence,
                operation,
                priority,
                self.inner.clock.now_ms(),
            );
            let bytes = entry.serialized_len() + 2;
            if bytes > config.max_size_bytes {
                tracing::error!(
                    operation = %op_name,
                    bytes,
                    limit = config.max_size_bytes,
                    "WAL entry can never fit in storage"
                );
                return Err(WalError::EntryTooLarge {
                    bytes,
                    limit: config.max_size_bytes,
                });
            }
            ledger.wal.push(entry);
            ledger.waiters.insert(entry_id.clone(), tx);
        }

        if let Err(e) = self.sync().await {
            let mut ledger = self.ledger();
            ledger.wal.remove(&entry_id);
            ledger.waiters.remove(&entry_id);
            tracing::error!(entry_id = %entry_id, error = %e, "failed to persist WAL entry");
            return Err(e);
        }

        tracing::info!(entry_id = %entry_id, operation = %op_name, %priority, "write queued");
        self.request_processing();
        Ok(QueuedWrite {
            entry_id: Some(entry_id),
            receiver: rx,
        })
    }

    /// Drain eligible entries; does nothing with a stale token
    pub async fn process_wal(&self, leader: &Leader) -> Result<PassReport, WalError> {
        if !leader.is_current() {
            tracing::debug!("not primary, skipping WAL processing");
            return Ok(PassReport::default());
        }
        let _pass = self.inner.pass.lock().await;
        self.run_pass(leader).await
    }

    /// One-time startup recovery, then a processing pass
    ///
    /// Waits `replay_delay` first so that contexts starting together do not
    /// collide. New writes are held back while replay runs.
    pub async fn replay_wal(&self, leader: &Leader) -> Result<PassReport, WalError> {
        if !leader.is_current() {
            tracing::debug!("not primary, skipping WAL replay");
            return Ok(PassReport::default());
        }
        {
            let mut ledger = self.ledger();
            if ledger.replay_started {
                return Ok(PassReport::default());
            }
            ledger.replay_started = true;
        }

        self.inner.replay.send_replace(ReplayPhase::Running);
        let result = self.replay_after_delay(leader).await;
        // A deferred replay clears `replay_started` and runs again later
        let phase = if self.ledger().replay_started {
            ReplayPhase::Done
        } else {
            ReplayPhase::NotStarted
        };
        self.inner.replay.send_replace(phase);

        match &result {
            Ok(report) if report.retry_in.is_none() => {
                let leftover = self
                    .ledger()
                    .wal
                    .has_eligible(self.inner.config.max_attempts);
                if leftover {
                    self.request_processing();
                }
            }
            Ok(_) => self.inner.wake.notify_one(),
            Err(e) => tracing::error!(error = %e, "WAL replay failed"),
        }
        result
    }

    /// Recover the outcome of an entry by id
    ///
    /// Checks persisted results, waits out an in-flight replay, checks
    /// again, then polls until `timeout`.
    pub async fn wait_for_result(
        &self,
        entry_id: &str,
        timeout: Duration,
    ) -> Result<Value, WalError> {
        let deadline = Instant::now() + timeout;
        if let Some(outcome) = self.lookup_result(entry_id).await? {
            return outcome;
        }

        let mut phase = self.inner.replay.subscribe();
        let _ = tokio::time::timeout_at(deadline, async {
            let _ = phase.wait_for(|p| *p != ReplayPhase::Running).await;
        })
        .await;

        loop {
            if let Some(outcome) = self.lookup_result(entry_id).await? {
                return outcome;
            }
            let now = Instant::now();
            if now >= deadline {
                return Err(WalError::Timeout {
                    entry_id: entry_id.to_string(),
                    timeout,
                });
            }
            tokio::time::sleep_until(deadline.min(now + self.inner.config.result_poll_interval))
                .await;
        }
    }

    /// Evict old finished entries and results, and expire stale pending ones
    pub async fn cleanup_wal(&self) -> Result<CleanupReport, WalError> {
        let now = self.inner.clock.now_ms();
        let report = {
            let mut ledger = self.ledger();
            let report = ledger.wal.cleanup(now, &self.inner.config);
            for id in &report.expired {
                if let Some(waiter) = ledger.waiters.remove(id) {
                    let _ = waiter.send(Err(WalError::Expired {
                        entry_id: id.clone(),
                    }));
                }
            }
            report
        };

        if !report.expired.is_empty() {
            tracing::warn!(
                count = report.expired.len(),
                max_age = ?self.inner.config.max_age,
                "expired WAL entries that were never applied"
            );
            self.inner.notices.publish(Notice::WalEntriesExpired {
                entry_ids: report.expired.clone(),
            });
        }
        self.sync().await?;
        if !report.is_empty() {
            tracing::info!(
                evicted = report.evicted,
                expired = report.expired.len(),
                results_removed = report.results_removed,
                "WAL cleanup"
            );
        }
        Ok(report)
    }

    fn ledger(&self) -> MutexGuard<'_, Ledger> {
        self.inner.ledger.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn track(&self, handle: JoinHandle<()>) {
        self.inner
            .tasks
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(handle);
    }

    fn request_processing(&self) {
        self.ledger().process_requested = true;
        self.inner.wake.notify_one();
    }

    fn authority_changed(&self, is_primary: bool) {
        let replay_started = {
            let ledger = self.ledger();
            if ledger.shut_down || !ledger.initialized {
                return;
            }
            ledger.replay_started
        };
        if !is_primary {
            tracing::debug!("lost authority, WAL processing paused");
            return;
        }
        let Some(leader) = self.inner.election.leader() else {
            return;
        };
        if replay_started {
            self.request_processing();
        } else {
            self.spawn_replay(leader);
        }
    }

    fn spawn_replay(&self, leader: Leader) {
        let wal = self.clone();
        let handle = tokio::spawn(async move {
            // Errors are logged by replay_wal
            let _ = wal.replay_wal(&leader).await;
        });
        self.track(handle);
    }

    async fn replay_after_delay(&self, leader: &Leader) -> Result<PassReport, WalError> {
        tokio::time::sleep(self.inner.config.replay_delay).await;
        if !leader.is_current() {
            tracing::debug!("lost authority before replay, deferring");
            self.ledger().replay_started = false;
            return Ok(PassReport::default());
        }

        let _pass = self.inner.pass.lock().await;
        self.sync().await?;
        let recovered = self.ledger().wal.recover(self.inner.config.max_attempts);
        tracing::info!(recovered, "replaying write-ahead log");
        self.sync().await?;
        self.run_pass(leader).await
    }

    async fn wait_for_replay(&self) {
        let mut phase = self.inner.replay.subscribe();
        let running = *phase.borrow() == ReplayPhase::Running;
        if !running {
            return;
        }
        tracing::debug!("write waiting for WAL replay");
        let finished = tokio::time::timeout(self.inner.config.replay_wait_timeout, async {
            let _ = phase.wait_for(|p| *p != ReplayPhase::Running).await;
        })
        .await;
        if finished.is_err() {
            tracing::warn!(
                timeout = ?self.inner.config.replay_wait_timeout,
                "WAL replay still running, queueing write anyway"
            );
        }
    }

    /// Caller must hold the pass lock
    async fn run_pass(&self, leader: &Leader) -> Result<PassReport, WalError> {
        let span = tracing::info_span!(
            "wal_pass",
            context = %leader.context_id(),
            epoch = leader.epoch()
        );
        async {
            let config = &self.inner.config;
            let mut report = PassReport::default();
            let mut attempted: HashSet<String> = HashSet::new();
            self.sync().await?;
            self.reclaim_interrupted(leader);

            loop {
                if !leader.is_current() {
                    tracing::info!("lost authority mid-pass, stopping");
                    break;
                }
                let batch = self.ledger().wal.select_batch(
                    config.max_attempts,
                    config.batch_size,
                    &attempted,
                );
                if batch.is_empty() {
                    break;
                }
                // PROCESSING must be durable before anything executes
                if let Err(e) = self.sync().await {
                    let mut ledger = self.ledger();
                    for (entry_id, _) in &batch {
                        ledger.wal.requeue(entry_id);
                    }
                    tracing::warn!(entries = batch.len(), error = %e, "could not persist batch, returned to pending");
                    return Err(e);
                }

                for (entry_id, operation) in batch {
                    attempted.insert(entry_id.clone());
                    if !leader.is_current() {
                        self.ledger().wal.requeue(&entry_id);
                        continue;
                    }
                    let outcome = self.inner.backends.target.execute(&operation).await;
                    self.finish(&entry_id, &operation, outcome, &mut report);
                }
                self.sync().await?;

                if !self.inner.backends.target.is_direct_write_available() {
                    tracing::info!("direct writes unavailable, deferring remaining entries");
                    break;
                }
            }

            let leftover = self.ledger().wal.has_eligible(config.max_attempts);
            report.retry_in = leftover.then(|| self.next_backoff());
            {
                let mut ledger = self.ledger();
                if !leftover {
                    ledger.backoff_round = 0;
                }
                ledger.next_pass_at = report.retry_in.map(|delay| Instant::now() + delay);
            }
            if report.retry_in.is_some() {
                // Let the processor pick up the new due time
                self.inner.wake.notify_one();
            }
            if report.committed + report.failed + report.rejected > 0 {
                tracing::info!(
                    committed = report.committed,
                    failed = report.failed,
                    rejected = report.rejected,
                    retry_in = ?report.retry_in,
                    "WAL pass complete"
                );
            }
            Ok(report)
        }
        .instrument(span)
        .await
    }

    /// Once per leadership term, return entries left PROCESSING by a pass
    /// that never finished (here or in another context) to PENDING
    ///
    /// Caller must hold the pass lock, so nothing in this process is
    /// executing.
    fn reclaim_interrupted(&self, leader: &Leader) {
        let reclaimed = {
            let mut ledger = self.ledger();
            if ledger.reclaimed_epoch == Some(leader.epoch()) {
                return;
            }
            ledger.reclaimed_epoch = Some(leader.epoch());
            ledger.wal.reclaim_interrupted()
        };
        if reclaimed > 0 {
            tracing::warn!(
                reclaimed,
                epoch = leader.epoch(),
                "reclaimed entries left PROCESSING by an interrupted pass"
            );
        }
    }

    fn finish(
        &self,
        entry_id: &str,
        operation: &Operation,
        outcome: Result<Value, WriteError>,
        report: &mut PassReport,
    ) {
        let max_attempts = self.inner.config.max_attempts;
        let now = self.inner.clock.now_ms();
        let mut ledger = self.ledger();
        let Some(entry) = ledger.wal.entry_mut(entry_id) else {
            // Dropped for space while executing
            return;
        };
        entry.attempts += 1;
        let attempts = entry.attempts;

        match outcome {
            Ok(value) => {
                entry.mark_committed(now);
                ledger
                    .wal
                    .record_result(OperationResult::success(entry_id, value.clone(), now));
                report.committed += 1;
                tracing::debug!(entry_id, operation = operation.name(), attempts, "entry committed");
                if let Some(waiter) = ledger.waiters.remove(entry_id) {
                    let _ = waiter.send(Ok(value));
                }
            }
            Err(e) => {
                let error = e.to_string();
                entry.mark_failed(error.clone(), now);
                if attempts < max_attempts {
                    report.failed += 1;
                    tracing::warn!(entry_id, attempts, max_attempts, error = %error, "entry failed, will retry");
                    return;
                }

                report.rejected += 1;
                tracing::error!(entry_id, attempts, error = %error, "entry rejected after final attempt");
                ledger.wal.record_result(OperationResult::failure(
                    entry_id,
                    error.clone(),
                    format!("{} failed after {} attempts", operation.name(), attempts),
                    now,
                ));
                if let Some(waiter) = ledger.waiters.remove(entry_id) {
                    let _ = waiter.send(Err(WalError::Failed {
                        entry_id: entry_id.to_string(),
                        error,
                    }));
                }
            }
        }
    }

    fn next_backoff(&self) -> Duration {
        let config = &self.inner.config;
        let mut ledger = self.ledger();
        let factor = 2u32.saturating_pow(ledger.backoff_round);
        ledger.backoff_round = ledger.backoff_round.saturating_add(1);
        config
            .retry_base_delay
            .saturating_mul(factor)
            .min(config.retry_max_delay)
    }

    async fn lookup_result(
        &self,
        entry_id: &str,
    ) -> Result<Option<Result<Value, WalError>>, WalError> {
        let local = self.ledger().wal.result(entry_id).map(OperationResult::outcome);
        if local.is_some() {
            return Ok(local);
        }
        let doc = self.inner.backends.blobs.get(&self.inner.keys.results).await?;
        let stored = Stored::parse(None, doc, None);
        Ok(stored
            .results
            .iter()
            .find(|r| r.entry_id == entry_id)
            .map(OperationResult::outcome))
    }

    async fn read_stored(&self) -> Result<Stored, WalError> {
        let blobs = &self.inner.backends.blobs;
        let keys = &self.inner.keys;
        let entries = blobs.get(&keys.entries).await?;
        let results = blobs.get(&keys.results).await?;
        let sequence = blobs.get(&keys.sequence).await?;
        Ok(Stored::parse(entries, results, sequence))
    }

    /// Merge persisted state in, enforce limits, settle waiters, write back
    async fn sync(&self) -> Result<(), WalError> {
        let _io = self.inner.io.lock().await;
        let stored = self.read_stored().await?;
        {
            let config = &self.inner.config;
            let mut ledger = self.ledger();
            ledger.wal.merge(stored);
            let report = ledger
                .wal
                .enforce_limits(config.max_entries, config.max_size_bytes);
            self.reject_dropped(&mut ledger, report);
            settle_waiters(&mut ledger, config.max_attempts);
        }
        self.write_documents().await
    }

    async fn write_documents(&self) -> Result<(), WalError> {
        let blobs = &self.inner.backends.blobs;
        let keys = &self.inner.keys;
        loop {
            let (entries, _, _) = self.ledger().wal.documents()?;
            match blobs.set(&keys.entries, entries).await {
                Ok(()) => break,
                Err(BlobError::QuotaExceeded { bytes, quota, .. }) => {
                    let mut ledger = self.ledger();
                    let Some(oldest) = ledger.wal.drop_oldest() else {
                        tracing::error!(bytes, quota, "storage quota exhausted by a single WAL entry");
                        return Err(WalError::Blob(BlobError::QuotaExceeded {
                            key: keys.entries.clone(),
                            bytes,
                            quota,
                        }));
                    };
                    self.reject_dropped(
                        &mut ledger,
                        DropReport {
                            entries: vec![oldest],
                            bytes_before: bytes,
                        },
                    );
                }
                Err(e) => return Err(e.into()),
            }
        }

        loop {
            let (_, results, _) = self.ledger().wal.documents()?;
            match blobs.set(&keys.results, results).await {
                Ok(()) => break,
                Err(BlobError::QuotaExceeded { bytes, quota, .. }) => {
                    let pruned = self.ledger().wal.drop_oldest_result();
                    match pruned {
                        Some(result) => tracing::warn!(
                            entry_id = %result.entry_id,
                            bytes,
                            quota,
                            "pruned oldest operation result under storage pressure"
                        ),
                        None => {
                            return Err(WalError::Blob(BlobError::QuotaExceeded {
                                key: keys.results.clone(),
                                bytes,
                                quota,
                            }))
                        }
                    }
                }
                Err(e) => return Err(e.into()),
            }
        }
        let (_, _, sequence) = self.ledger().wal.documents()?;
        blobs.set(&keys.sequence, sequence).await?;
        self.ledger().wal.clear_retired();
        Ok(())
    }

    fn reject_dropped(&self, ledger: &mut Ledger, report: DropReport) {
        if report.entries.is_empty() {
            return;
        }
        let now = self.inner.clock.now_ms();
        let limit = self.inner.config.max_size_bytes;
        let entry_ids: Vec<String> = report.entries.iter().map(|e| e.id.clone()).collect();
        tracing::warn!(
            count = entry_ids.len(),
            bytes = report.bytes_before,
            limit,
            "dropping oldest WAL entries to stay within storage limits"
        );
        for id in &entry_ids {
            ledger.wal.record_result(OperationResult::failure(
                id.clone(),
                "dropped to stay within storage limits",
                format!("log was {} bytes, limit {}", report.bytes_before, limit),
                now,
            ));
            if let Some(waiter) = ledger.waiters.remove(id) {
                let _ = waiter.send(Err(WalError::Dropped {
                    entry_id: id.clone(),
                }));
            }
        }
        self.inner.notices.publish(Notice::WalEntriesDropped {
            entry_ids,
            serialized_bytes: report.bytes_before,
            limit_bytes: limit,
        });
    }

    async fn process_loop(self) {
        loop {
            let due = self.ledger().next_pass_at;
            let timed_out = match due {
                Some(at) => {
                    tokio::select! {
                        _ = self.inner.wake.notified() => false,
                        _ = tokio::time::sleep_until(at) => true,
                    }
                }
                None => {
                    self.inner.wake.notified().await;
                    false
                }
            };
            let requested = std::mem::take(&mut self.ledger().process_requested);
            if !timed_out && !requested {
                continue;
            }
            if timed_out {
                self.ledger().next_pass_at = None;
            }

            let Some(leader) = self.inner.election.leader() else {
                continue;
            };
            // Replay drains the log itself once it finishes
            let replay_done = *self.inner.replay.borrow() == ReplayPhase::Done;
            if !replay_done {
                continue;
            }
            if let Err(e) = self.process_wal(&leader).await {
                tracing::error!(error = %e, "WAL processing pass failed");
                let delay = self.next_backoff();
                self.ledger().next_pass_at = Some(Instant::now() + delay);
            }
        }
    }

    async fn cleanup_loop(self) {
        let period = self.inner.config.cleanup_interval.max(Duration::from_millis(1));
        let mut ticker = tokio::time::interval_at(Instant::now() + period, period);
        loop {
            ticker.tick().await;
            if let Err(e) = self.cleanup_wal().await {
                tracing::warn!(error = %e, "WAL cleanup failed");
                continue;
            }
            let pending = self
                .ledger()
                .wal
                .has_eligible(self.inner.config.max_attempts);
            if pending && self.inner.election.is_primary() {
                self.request_processing();
            }
        }
    }
}

/// Resolve local callers whose entries were settled elsewhere
fn settle_waiters(ledger: &mut Ledger, max_attempts: u32) {
    let ids: Vec<String> = ledger.waiters.keys().cloned().collect();
    for id in ids {
        if let Some(outcome) = ledger.wal.settled(&id, max_attempts) {
            if let Some(waiter) = ledger.waiters.remove(&id) {
                let _ = waiter.send(outcome);
            }
        }
    }
}

#[cfg(test)]
#[path = "log_tests.rs"]
mod tests;
