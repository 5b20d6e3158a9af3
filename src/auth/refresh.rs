//! Single-flight access-token refresh.
//!
//! Any number of requests may discover an expired token at the same time.
//! Exactly one refresh call runs; everyone else queues behind it and is
//! released, in arrival order, with the same outcome.
//!
//! ```text
//!  Idle ──refresh()──▶ Refreshing ──ok──▶ Idle
//!                          │
//!                          └──err──▶ LoggedOut ──reset()──▶ Idle
//! ```

use super::observer::AuthObserver;
use super::session::{SessionManager, TokenPair};
use crate::error_code::ErrorKind;
use crate::{Error, ErrorContext, Result};
use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use tokio::sync::oneshot;
use tracing::{debug, info, warn};

/// Exchanges a refresh token for a new token pair.
#[async_trait]
pub trait TokenRefresher: Send + Sync {
    async fn refresh(&self, refresh_token: &str) -> Result<TokenPair>;
}

/// Observable phase of the coordinator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefreshPhase {
    Idle,
    Refreshing,
    LoggedOut,
}

type Waiter = oneshot::Sender<Result<String>>;

enum State {
    Idle,
    Refreshing { waiters: VecDeque<Waiter> },
    LoggedOut,
}

struct Inner {
    session: Arc<SessionManager>,
    refresher: Arc<dyn TokenRefresher>,
    observer: Arc<dyn AuthObserver>,
    state: Mutex<State>,
    cycles: AtomicU64,
}

/// Coordinates token refreshes for one session.
///
/// Cheap to clone; clones share state.
#[derive(Clone)]
pub struct TokenRefreshCoordinator {
    inner: Arc<Inner>,
}

impl TokenRefreshCoordinator {
    pub fn new(
        session: Arc<SessionManager>,
        refresher: Arc<dyn TokenRefresher>,
        observer: Arc<dyn AuthObserver>,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                session,
                refresher,
                observer,
                state: Mutex::new(State::Idle),
                cycles: AtomicU64::new(0),
            }),
        }
    }

    pub fn phase(&self) -> RefreshPhase {
        match *self.inner.lock() {
            State::Idle => RefreshPhase::Idle,
            State::Refreshing { .. } => RefreshPhase::Refreshing,
            State::LoggedOut => RefreshPhase::LoggedOut,
        }
    }

    /// Number of refresh cycles started so far.
    pub fn refresh_count(&self) -> u64 {
        self.inner.cycles.load(Ordering::Relaxed)
    }

    /// Obtain a fresh access token after a `TokenExpired` response.
    ///
    /// Starts a refresh cycle if none is running, otherwise queues behind the
    /// current one. After the session has ended this fails immediately.
    pub async fn refresh(&self) -> Result<String> {
        let rx = {
            let mut state = self.inner.lock();
            let (tx, rx) = oneshot::channel();
            match &mut *state {
                State::LoggedOut => {
                    return Err(Error::authentication_failed("session has ended"));
                }
                State::Refreshing { waiters } => {
                    waiters.push_back(tx);
                    debug!(queued = waiters.len(), "queued behind token refresh");
                }
                State::Idle => {
                    *state = State::Refreshing {
                        waiters: VecDeque::from([tx]),
                    };
                    let cycle = self.inner.cycles.fetch_add(1, Ordering::Relaxed) + 1;
                    tokio::spawn(Arc::clone(&self.inner).run_cycle(cycle));
                }
            }
            rx
        };
        rx.await.unwrap_or_else(|_| {
            Err(Error::runtime_with_context(
                "token refresh task ended without a result",
                ErrorContext::new().with_source("token_refresh"),
            ))
        })
    }

    /// End the session after a non-recoverable auth error.
    ///
    /// Returns whether this call ended the session. While a refresh is in
    /// flight nothing changes; the refresh decides the session's fate.
    pub async fn terminate(&self, kind: ErrorKind) -> bool {
        let ended = {
            let mut state = self.inner.lock();
            match *state {
                State::Idle => {
                    *state = State::LoggedOut;
                    true
                }
                State::Refreshing { .. } | State::LoggedOut => false,
            }
        };
        if ended {
            warn!(kind = kind.name(), "session terminated");
            self.inner.session.clear().await;
            self.inner.observer.on_authentication_failed();
        }
        ended
    }

    /// Leave the logged-out state after a new login or explicit logout.
    pub fn reset(&self) {
        let mut state = self.inner.lock();
        if matches!(*state, State::LoggedOut) {
            *state = State::Idle;
        }
    }
}

impl Inner {
    fn lock(&self) -> std::sync::MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Replace the state and hand back whoever was waiting.
    fn settle(&self, next: State) -> VecDeque<Waiter> {
        match std::mem::replace(&mut *self.lock(), next) {
            State::Refreshing { waiters } => waiters,
            _ => VecDeque::new(),
        }
    }

    async fn run_cycle(self: Arc<Self>, cycle: u64) {
        info!(cycle, "access token refresh started");
        let outcome = match self.session.refresh_token() {
            Some(token) => self.refresher.refresh(&token).await,
            None => Err(Error::authentication_failed("no refresh token available")),
        };

        match outcome {
            Ok(pair) => {
                let session = self.session.replace_tokens(pair).await;
                let waiters = self.settle(State::Idle);
                info!(cycle, released = waiters.len(), "access token refreshed");
                self.observer.on_token_refreshed(&session.access_token);
                for waiter in waiters {
                    let _ = waiter.send(Ok(session.access_token.clone()));
                }
            }
            Err(err) => {
                self.session.clear().await;
                let waiters = self.settle(State::LoggedOut);
                warn!(cycle, released = waiters.len(), error = %err, "access token refresh failed");
                self.observer.on_authentication_failed();
                let failure = Error::authentication_failed(format!("token refresh failed: {}", err));
                for waiter in waiters {
                    let _ = waiter.send(Err(failure.clone()));
                }
            }
        }
    }
}
