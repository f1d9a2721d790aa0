// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Leader election state machine and background tasks

use super::calibrate::calibrated_window;
use super::channel::BroadcastChannel;
use super::message::{ContextId, ElectionMessage};
use crate::config::ElectionConfig;
use crate::notice::{Notice, NoticeBus};
use std::collections::BTreeSet;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use thiserror::Error;
use tokio::sync::{broadcast, Notify};
use tokio::task::JoinHandle;
use tokio::time::Instant;

/// Callback invoked synchronously whenever local primary status flips
pub type AuthorityCallback = Arc<dyn Fn(bool) + Send + Sync>;

#[derive(Debug, Error)]
pub enum ElectionError {
    #[error("election for {0} was already shut down")]
    ShutDown(ContextId),
}

/// How a single election round ended for this context
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ElectionOutcome {
    /// This context had the smallest id and claimed primary
    Won,
    /// Another candidate had a smaller id; it is expected to claim
    Lost { winner: ContextId },
    /// A claim from another context arrived before the window closed
    Yielded { claimant: ContextId },
    /// No usable channel; assumed primary as the only context
    FailOpen,
    /// A round was already running; this call did nothing
    AlreadyRunning,
}

/// Lexicographically smallest candidate
pub fn elect_winner<'a>(candidates: impl IntoIterator<Item = &'a ContextId>) -> Option<&'a ContextId> {
    candidates.into_iter().min()
}

/// Proof that the holder was primary when the token was minted
///
/// Only `LeaderElection::leader` creates tokens. A token goes stale as soon
/// as its context loses authority; primary-only operations check
/// `is_current` and do nothing with a stale token.
#[derive(Clone)]
pub struct Leader {
    context_id: ContextId,
    epoch: u64,
    shared: Arc<Shared>,
}

impl Leader {
    pub fn context_id(&self) -> &ContextId {
        &self.context_id
    }

    pub fn epoch(&self) -> u64 {
        self.epoch
    }

    /// True while the minting context is still primary in the same term
    pub fn is_current(&self) -> bool {
        let state = self.shared.lock_state();
        state.is_primary && state.epoch == self.epoch
    }
}

impl std::fmt::Debug for Leader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Leader")
            .field("context_id", &self.context_id)
            .field("epoch", &self.epoch)
            .finish()
    }
}

struct ElectionState {
    is_primary: bool,
    /// Incremented every time this context gains authority
    epoch: u64,
    electing: bool,
    candidates: BTreeSet<ContextId>,
    /// First claim observed during the running round
    claimed_by: Option<ContextId>,
    known_primary: Option<ContextId>,
    last_heartbeat: Instant,
    connected: bool,
    shut_down: bool,
}

struct Shared {
    context_id: ContextId,
    config: ElectionConfig,
    window: Duration,
    channel: Option<Arc<dyn BroadcastChannel>>,
    state: Mutex<ElectionState>,
    callbacks: Mutex<Vec<AuthorityCallback>>,
    claim_seen: Notify,
    notices: NoticeBus,
    tasks: Mutex<Vec<JoinHandle<()>>>,
}

impl Shared {
    fn lock_state(&self) -> std::sync::MutexGuard<'_, ElectionState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }
}

/// Per-context election participant
///
/// Cloning is cheap and every clone observes the same state.
#[derive(Clone)]
pub struct LeaderElection {
    shared: Arc<Shared>,
}

impl LeaderElection {
    /// Create a participant with a calibrated candidacy window
    ///
    /// `channel = None` means no broadcast primitive exists; `start` then
    /// fails open and assumes primary.
    pub fn new(
        context_id: ContextId,
        config: ElectionConfig,
        channel: Option<Arc<dyn BroadcastChannel>>,
        notices: NoticeBus,
    ) -> Self {
        let window = calibrated_window(&config);
        Self::with_window(context_id, config, channel, notices, window)
    }

    /// Create a participant with a fixed candidacy window
    pub fn with_window(
        context_id: ContextId,
        config: ElectionConfig,
        channel: Option<Arc<dyn BroadcastChannel>>,
        notices: NoticeBus,
        window: Duration,
    ) -> Self {
        Self {
            shared: Arc::new(Shared {
                context_id,
                config,
                window,
                channel,
                state: Mutex::new(ElectionState {
                    is_primary: false,
                    epoch: 0,
                    electing: false,
                    candidates: BTreeSet::new(),
                    claimed_by: None,
                    known_primary: None,
                    last_heartbeat: Instant::now(),
                    connected: false,
                    shut_down: false,
                }),
                callbacks: Mutex::new(Vec::new()),
                claim_seen: Notify::new(),
                notices,
                tasks: Mutex::new(Vec::new()),
            }),
        }
    }

    pub fn context_id(&self) -> &ContextId {
        &self.shared.context_id
    }

    pub fn window(&self) -> Duration {
        self.shared.window
    }

    pub fn is_primary(&self) -> bool {
        self.shared.lock_state().is_primary
    }

    /// Primary as last observed by this context (itself when primary)
    pub fn known_primary(&self) -> Option<ContextId> {
        let state = self.shared.lock_state();
        if state.is_primary {
            Some(self.shared.context_id.clone())
        } else {
            state.known_primary.clone()
        }
    }

    /// Capability token, available only while primary
    pub fn leader(&self) -> Option<Leader> {
        let state = self.shared.lock_state();
        state.is_primary.then(|| Leader {
            context_id: self.shared.context_id.clone(),
            epoch: state.epoch,
            shared: Arc::clone(&self.shared),
        })
    }

    /// Register a callback for primary status flips
    pub fn on_authority_change(&self, callback: impl Fn(bool) + Send + Sync + 'static) {
        self.shared
            .callbacks
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(Arc::new(callback));
    }

    /// Subscribe to the channel and spawn the listener and heartbeat tasks
    ///
    /// Returns false when the channel is missing or refuses a subscription,
    /// in which case this context has failed open to primary.
    pub fn connect(&self) -> Result<bool, ElectionError> {
        {
            let mut state = self.shared.lock_state();
            if state.shut_down {
                return Err(ElectionError::ShutDown(self.shared.context_id.clone()));
            }
            if state.connected {
                return Ok(true);
            }
            state.connected = true;
            state.last_heartbeat = Instant::now();
        }

        let Some(channel) = self.shared.channel.clone() else {
            self.fail_open("no broadcast channel");
            return Ok(false);
        };
        let rx = match channel.subscribe() {
            Ok(rx) => rx,
            Err(e) => {
                self.fail_open(&e.to_string());
                return Ok(false);
            }
        };

        let listener = tokio::spawn(self.clone().listen(rx));
        let heartbeat = tokio::spawn(self.clone().heartbeat_loop());
        self.shared
            .tasks
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .extend([listener, heartbeat]);
        Ok(true)
    }

    /// Connect and run the initial election
    pub async fn start(&self) -> Result<ElectionOutcome, ElectionError> {
        if !self.connect()? {
            return Ok(ElectionOutcome::FailOpen);
        }
        Ok(self.run_election(self.shared.window).await)
    }

    /// Run one candidacy round
    ///
    /// Always finishes after `window`, or earlier if another context's
    /// claim is observed.
    pub async fn run_election(&self, window: Duration) -> ElectionOutcome {
        let Some(channel) = self.shared.channel.clone() else {
            self.fail_open("no broadcast channel");
            return ElectionOutcome::FailOpen;
        };
        let me = self.shared.context_id.clone();

        // Created before the round opens so a claim racing the candidacy
        // post still wakes us.
        let claim_seen = self.shared.claim_seen.notified();
        tokio::pin!(claim_seen);

        {
            let mut state = self.shared.lock_state();
            if state.electing {
                return ElectionOutcome::AlreadyRunning;
            }
            state.electing = true;
            state.claimed_by = None;
            state.candidates.clear();
            state.candidates.insert(me.clone());
        }

        tracing::info!(context = %me, window_ms = window.as_millis() as u64, "starting election");
        if let Err(e) = channel.post(ElectionMessage::Candidate {
            context_id: me.clone(),
        }) {
            self.shared.lock_state().electing = false;
            self.fail_open(&e.to_string());
            return ElectionOutcome::FailOpen;
        }

        tokio::select! {
            _ = tokio::time::sleep(window) => {}
            _ = &mut claim_seen => {}
        }

        let (claimant, winner) = {
            let mut state = self.shared.lock_state();
            state.electing = false;
            state.last_heartbeat = Instant::now();
            let claimant = state.claimed_by.take();
            let winner = elect_winner(&state.candidates).cloned();
            (claimant, winner)
        };

        if let Some(claimant) = claimant {
            tracing::info!(context = %me, %claimant, "claim observed, withdrawing candidacy");
            self.set_primary(false);
            return ElectionOutcome::Yielded { claimant };
        }

        match winner {
            Some(winner) if winner != me => {
                tracing::info!(context = %me, %winner, "lost election");
                self.set_primary(false);
                ElectionOutcome::Lost { winner }
            }
            _ => {
                self.set_primary(true);
                self.post(ElectionMessage::ClaimPrimary { context_id: me });
                ElectionOutcome::Won
            }
        }
    }

    /// Release authority and stop background tasks
    pub async fn shutdown(&self) {
        let was_primary = {
            let mut state = self.shared.lock_state();
            state.shut_down = true;
            state.is_primary
        };
        if was_primary {
            self.post(ElectionMessage::ReleasePrimary {
                context_id: self.shared.context_id.clone(),
            });
            self.set_primary(false);
        }
        let tasks: Vec<_> = self
            .shared
            .tasks
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .drain(..)
            .collect();
        for task in tasks {
            task.abort();
        }
        tracing::info!(context = %self.shared.context_id, "election shut down");
    }

    fn fail_open(&self, reason: &str) {
        tracing::warn!(
            context = %self.shared.context_id,
            reason,
            "broadcast channel unavailable, assuming single context and taking primary"
        );
        self.shared.notices.publish(Notice::ElectionFailOpen {
            context_id: self.shared.context_id.0.clone(),
        });
        self.set_primary(true);
    }

    fn post(&self, message: ElectionMessage) {
        let Some(channel) = &self.shared.channel else {
            return;
        };
        if let Err(e) = channel.post(message) {
            tracing::warn!(context = %self.shared.context_id, error = %e, "broadcast failed");
        }
    }

    /// Flip local authority and notify callbacks synchronously
    fn set_primary(&self, is_primary: bool) {
        {
            let mut state = self.shared.lock_state();
            if state.is_primary == is_primary {
                return;
            }
            state.is_primary = is_primary;
            if is_primary {
                state.epoch += 1;
                state.known_primary = Some(self.shared.context_id.clone());
            }
        }

        tracing::info!(context = %self.shared.context_id, is_primary, "authority changed");
        self.shared.notices.publish(Notice::AuthorityChanged {
            context_id: self.shared.context_id.0.clone(),
            is_primary,
        });

        let callbacks: Vec<AuthorityCallback> = self
            .shared
            .callbacks
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone();
        for callback in callbacks {
            callback(is_primary);
        }
    }

    async fn listen(self, mut rx: broadcast::Receiver<ElectionMessage>) {
        loop {
            match rx.recv().await {
                Ok(message) => self.handle_message(message),
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    tracing::warn!(context = %self.shared.context_id, skipped, "election listener lagged");
                }
                Err(broadcast::error::RecvError::Closed) => break,
            }
        }
    }

    fn handle_message(&self, message: ElectionMessage) {
        if message.sender() == &self.shared.context_id {
            return;
        }
        tracing::debug!(
            context = %self.shared.context_id,
            kind = message.name(),
            from = %message.sender(),
            "election message"
        );

        match message {
            ElectionMessage::Candidate { context_id } => {
                let is_primary = {
                    let mut state = self.shared.lock_state();
                    if state.electing {
                        state.candidates.insert(context_id);
                    }
                    state.is_primary
                };
                // Let the newcomer know authority is already taken
                if is_primary {
                    self.post(ElectionMessage::ClaimPrimary {
                        context_id: self.shared.context_id.clone(),
                    });
                }
            }
            ElectionMessage::ClaimPrimary { context_id }
            | ElectionMessage::Heartbeat { context_id } => self.observe_primary(context_id),
            ElectionMessage::ReleasePrimary { context_id } => {
                let should_elect = {
                    let mut state = self.shared.lock_state();
                    if state.known_primary.as_ref() == Some(&context_id) {
                        state.known_primary = None;
                    }
                    !state.is_primary && !state.electing && !state.shut_down
                };
                if should_elect {
                    tracing::info!(context = %self.shared.context_id, released_by = %context_id, "primary released, re-electing");
                    let election = self.clone();
                    let window = self.shared.window;
                    tokio::spawn(async move {
                        election.run_election(window).await;
                    });
                }
            }
        }
    }

    fn observe_primary(&self, claimant: ContextId) {
        let me = &self.shared.context_id;
        let mut state = self.shared.lock_state();
        state.last_heartbeat = Instant::now();

        if state.is_primary {
            // Two primaries: the smaller id keeps authority
            if claimant < *me {
                state.known_primary = Some(claimant.clone());
                drop(state);
                tracing::warn!(context = %me, %claimant, "conflicting primary has precedence, stepping down");
                self.set_primary(false);
            } else {
                drop(state);
                tracing::warn!(context = %me, %claimant, "conflicting primary, reasserting claim");
                self.post(ElectionMessage::ClaimPrimary {
                    context_id: me.clone(),
                });
            }
            return;
        }

        state.known_primary = Some(claimant.clone());
        if state.electing && state.claimed_by.is_none() {
            state.claimed_by = Some(claimant);
            drop(state);
            self.shared.claim_seen.notify_waiters();
        }
    }

    async fn heartbeat_loop(self) {
        let interval = self.shared.config.heartbeat_interval;
        let timeout = self.shared.config.heartbeat_timeout();
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        ticker.tick().await;

        loop {
            ticker.tick().await;
            let (is_primary, electing, silent_for, shut_down) = {
                let state = self.shared.lock_state();
                (
                    state.is_primary,
                    state.electing,
                    state.last_heartbeat.elapsed(),
                    state.shut_down,
                )
            };
            if shut_down {
                break;
            }
            if is_primary {
                self.post(ElectionMessage::Heartbeat {
                    context_id: self.shared.context_id.clone(),
                });
            } else if !electing && silent_for > timeout {
                tracing::info!(
                    context = %self.shared.context_id,
                    silent_ms = silent_for.as_millis() as u64,
                    "primary heartbeat lost, re-electing"
                );
                self.run_election(self.shared.window).await;
            }
        }
    }
}

#[cfg(test)]
#[path = "leader_tests.rs"]
mod tests;
