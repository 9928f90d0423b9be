// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Single-flight token refresh.
//!
//! ## State machine
//!
//! ```text
//! Idle --first 401--> Refreshing { waiters } --leader settles--> Draining { outcome } --> Idle
//! ```
//!
//! - The caller that finds `Idle` becomes the leader and runs the refresh
//! - Callers that find `Refreshing` queue a oneshot and wait
//! - Callers that find `Draining` take the settled outcome directly
//! - The waiter list only exists inside `Refreshing`, so it is empty
//!   whenever the coordinator is `Idle`
//!
//! If the leader's future is dropped before it settles, every waiter is
//! released with a refresh error and the machine returns to `Idle`.

use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard};

use tokio::sync::oneshot;
use tracing::{debug, warn};

use crate::error::ClientError;

/// New access token on success.
pub type RefreshResult = Result<String, ClientError>;

/// Observable phase of the coordinator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefreshPhase {
    Idle,
    Refreshing,
    Draining,
}

enum State {
    Idle,
    Refreshing {
        episode: u64,
        waiters: Vec<oneshot::Sender<RefreshResult>>,
    },
    Draining {
        episode: u64,
        outcome: RefreshResult,
    },
}

enum Role {
    Leader(u64),
    Waiter(oneshot::Receiver<RefreshResult>),
}

/// Coordinates refresh episodes across every in-flight request.
pub struct RefreshCoordinator {
    state: Mutex<State>,
    episodes: AtomicU64,
}

impl Default for RefreshCoordinator {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for RefreshCoordinator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RefreshCoordinator")
            .field("phase", &self.state())
            .field("episodes", &self.episodes())
            .finish()
    }
}

impl RefreshCoordinator {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(State::Idle),
            episodes: AtomicU64::new(0),
        }
    }

    pub fn state(&self) -> RefreshPhase {
        match &*self.lock() {
            State::Idle => RefreshPhase::Idle,
            State::Refreshing { .. } => RefreshPhase::Refreshing,
            State::Draining { .. } => RefreshPhase::Draining,
        }
    }

    /// Number of refresh episodes started so far.
    pub fn episodes(&self) -> u64 {
        self.episodes.load(Ordering::SeqCst)
    }

    /// Number of callers queued behind the current leader.
    pub fn waiting(&self) -> usize {
        match &*self.lock() {
            State::Refreshing { waiters, .. } => waiters.len(),
            _ => 0,
        }
    }

    /// Join the current refresh episode, or start one.
    ///
    /// `perform` runs only when this caller becomes the leader.
    pub async fn refresh<F, Fut>(&self, perform: F) -> RefreshResult
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = RefreshResult>,
    {
        let role = {
            let mut state = self.lock();
            match &mut *state {
                State::Idle => {
                    let episode = self.episodes.fetch_add(1, Ordering::SeqCst) + 1;
                    *state = State::Refreshing {
                        episode,
                        waiters: Vec::new(),
                    };
                    Role::Leader(episode)
                }
                State::Refreshing { waiters, .. } => {
                    let (tx, rx) = oneshot::channel();
                    waiters.push(tx);
                    Role::Waiter(rx)
                }
                State::Draining { outcome, .. } => return outcome.clone(),
            }
        };

        match role {
            Role::Waiter(rx) => rx.await.unwrap_or_else(|_| Err(abandoned())),
            Role::Leader(episode) => {
                debug!(episode, "Token refresh started");
                let mut guard = EpisodeGuard {
                    coordinator: self,
                    episode,
                    settled: false,
                };
                let outcome = perform().await;
                guard.settle(outcome.clone());
                outcome
            }
        }
    }

    fn settle(&self, episode: u64, outcome: RefreshResult) {
        let waiters = {
            let mut state = self.lock();
            match std::mem::replace(&mut *state, State::Idle) {
                State::Refreshing {
                    episode: current,
                    waiters,
                } if current == episode => {
                    *state = State::Draining {
                        episode,
                        outcome: outcome.clone(),
                    };
                    waiters
                }
                other => {
                    *state = other;
                    return;
                }
            }
        };

        let released = waiters.len();
        for waiter in waiters {
            // A waiter whose request was cancelled has dropped its receiver.
            let _ = waiter.send(outcome.clone());
        }

        {
            let mut state = self.lock();
            if matches!(&*state, State::Draining { episode: current, .. } if *current == episode) {
                *state = State::Idle;
            }
        }

        debug!(
            episode,
            waiters = released,
            success = outcome.is_ok(),
            "Token refresh settled"
        );
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        match self.state.lock() {
            Ok(state) => state,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

/// Settles the episode even if the leader is cancelled mid-refresh.
struct EpisodeGuard<'a> {
    coordinator: &'a RefreshCoordinator,
    episode: u64,
    settled: bool,
}

impl EpisodeGuard<'_> {
    fn settle(&mut self, outcome: RefreshResult) {
        self.settled = true;
        self.coordinator.settle(self.episode, outcome);
    }
}

impl Drop for EpisodeGuard<'_> {
    fn drop(&mut self) {
        if !self.settled {
            warn!(episode = self.episode, "Token refresh abandoned by its leader");
            self.coordinator.settle(self.episode, Err(abandoned()));
        }
    }
}

fn abandoned() -> ClientError {
    ClientError::TokenRefresh("refresh abandoned".to_string())
}
