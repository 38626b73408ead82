//! The per-connection attempts state machine.
//!
//! This is the central piece of the session layer. On every check it
//! decides whether to:
//! - trust the cached result (blind interval still running),
//! - probe the backend and maybe refresh a nearly expired ticket,
//! - retry a silent login with the stored credential,
//! - or give up for now because the last attempt failed too recently.
//!
//! # Concurrency note
//!
//! All state lives behind ONE `tokio::sync::Mutex` per connection, and
//! the lock is held across the performer's backend calls. That is the
//! point: concurrent callers on the same connection queue up behind a
//! single in-flight attempt and then see its result, instead of each
//! issuing its own login. Different connections have different machines
//! and never wait on each other.
//!
//! Listeners are notified after the lock is released.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use ticketgate_state::{ConnectionId, LoginFailure, LoginState, PerformerError};
use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::{debug, info};

use crate::{LoginConfig, LoginError, LoginPerformer, LoginStateListener, ReconnectBatch};

// ---------------------------------------------------------------------------
// Cached state
// ---------------------------------------------------------------------------

/// The mutable part of a state machine. Only touched under the mutex.
#[derive(Debug, Default)]
struct Attempts {
    /// The last failure was a connection problem, not a credentials one.
    connection_problem: bool,
    last_error: Option<String>,
    success: bool,
    /// `None` until the first decision is recorded.
    last_decision: Option<Instant>,
}

impl Attempts {
    /// A decision exists and it was a failure. The fresh, undecided state
    /// is NOT logged out; it is unknown.
    fn is_logged_out(&self) -> bool {
        self.last_decision.is_some() && !self.success
    }

    /// Records a probe/attempt result.
    ///
    /// An outcome identical to the cached one only moves the timestamp
    /// once the success blind interval has passed since the last move,
    /// so repeated identical failures don't keep extending their own
    /// blind window. Any change is recorded immediately.
    fn register(&mut self, state: &LoginState, config: &LoginConfig) {
        let now = Instant::now();
        let connection_problem = state.error_message().is_some();

        let unchanged = self.success == state.is_success()
            && self.last_error.as_deref() == state.error_message()
            && self.connection_problem == connection_problem;

        if unchanged {
            let stale = self.last_decision.is_none_or(|at| {
                now.saturating_duration_since(at) > config.success_blind_interval
            });
            if stale {
                self.last_decision = Some(now);
            }
            return;
        }

        self.success = state.is_success();
        self.last_error = state.error_message().map(str::to_owned);
        self.connection_problem = connection_problem;
        self.last_decision = Some(now);
    }
}

/// A read-only copy of a state machine's cached decision.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttemptsSnapshot {
    pub success: bool,
    pub connection_problem: bool,
    pub last_error: Option<String>,
    /// When the last decision was recorded; `None` if never.
    pub last_decision: Option<Instant>,
}

impl AttemptsSnapshot {
    /// Classifies the cached failure. `None` if logged in or undecided.
    pub fn failure(&self) -> Option<LoginFailure> {
        if self.success || self.last_decision.is_none() {
            return None;
        }
        LoginState::failed(self.last_error.clone()).failure()
    }
}

/// A decided state plus whether deciding it was a reconnection.
struct Outcome {
    state: LoginState,
    reconnected: bool,
}

/// An explicit login the caller asked for.
enum Attempt<'a> {
    Login { password: &'a str },
    ChangePassword { old: &'a str, new: &'a str },
}

impl fmt::Display for Attempt<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Login { .. } => f.write_str("login"),
            Self::ChangePassword { .. } => f.write_str("password change"),
        }
    }
}

// ---------------------------------------------------------------------------
// AttemptsStateMachine
// ---------------------------------------------------------------------------

/// Decides, per connection, when the backend really has to be asked.
///
/// ## Decision flow of [`ensure`](Self::ensure)
///
/// ```text
///  never decided ──→ probe ──ok──→ done
///                      │ error ──→ done (connection problem)
///                      └ logged out ──→ silent login
///
///  cached success ──in blind window──→ SUCCESS (no backend call)
///        └──→ probe ──ticket < time_to_relogin──→ silent login
///
///  cached failure ──→ probe ──ok──→ done
///        ├ credentials: unchanged & < credentials window → SUCCESS
///        │              otherwise → silent login
///        └ connection:  < network window → cached failure
///                       otherwise → silent login
/// ```
pub struct AttemptsStateMachine<P> {
    connection: ConnectionId,
    performer: P,
    config: LoginConfig,
    listener: Arc<dyn LoginStateListener>,
    attempts: Mutex<Attempts>,
}

impl<P: LoginPerformer> AttemptsStateMachine<P> {
    /// Creates an undecided state machine for `connection`.
    pub fn new(
        connection: ConnectionId,
        performer: P,
        config: LoginConfig,
        listener: Arc<dyn LoginStateListener>,
    ) -> Self {
        Self {
            connection,
            performer,
            config,
            listener,
            attempts: Mutex::new(Attempts::default()),
        }
    }

    pub fn connection(&self) -> &ConnectionId {
        &self.connection
    }

    pub fn performer(&self) -> &P {
        &self.performer
    }

    pub fn config(&self) -> &LoginConfig {
        &self.config
    }

    /// Decides whether this connection is logged in, asking the backend
    /// only when the timing policy says so.
    ///
    /// `ignore_delays` skips the success and credentials blind windows
    /// (the network window still applies).
    ///
    /// The listener only hears about a failure → success transition. The
    /// first decision on a fresh machine is never a reconnection, even
    /// when it only succeeded through the silent stored-password login.
    ///
    /// # Errors
    /// - [`LoginError::Cancelled`]: passed through from the performer;
    ///   the cached state is unchanged.
    /// - [`LoginError::Unexpected`]: any other performer error.
    pub async fn ensure(&self, ignore_delays: bool) -> Result<LoginState, LoginError> {
        let outcome = self.decide(ignore_delays).await?;
        Ok(self.deliver(outcome, None))
    }

    /// Same as [`ensure`](Self::ensure), but a reconnection is added to
    /// `batch` instead of notifying the listener right away.
    pub async fn ensure_batched(
        &self,
        ignore_delays: bool,
        batch: &ReconnectBatch,
    ) -> Result<LoginState, LoginError> {
        let outcome = self.decide(ignore_delays).await?;
        Ok(self.deliver(outcome, Some(batch)))
    }

    /// Logs in with `password`, whatever the cached state says.
    pub async fn login(&self, password: &str) -> Result<LoginState, LoginError> {
        let outcome = self.attempt(Attempt::Login { password }).await?;
        Ok(self.deliver(outcome, None))
    }

    /// Changes the password and records the resulting state.
    pub async fn change_password(
        &self,
        old_password: &str,
        new_password: &str,
    ) -> Result<LoginState, LoginError> {
        let outcome = self
            .attempt(Attempt::ChangePassword {
                old: old_password,
                new: new_password,
            })
            .await?;
        Ok(self.deliver(outcome, None))
    }

    /// Forces the cached state to "failed", stamped now.
    ///
    /// Used when something outside this machine noticed that the
    /// connection is not logged in.
    pub async fn failed(&self, connection_problem: bool, error: Option<String>) {
        let mut attempts = self.attempts.lock().await;
        debug!(
            connection = %self.connection,
            connection_problem,
            error = error.as_deref().unwrap_or(""),
            "login marked as failed"
        );
        attempts.success = false;
        attempts.connection_problem = connection_problem;
        attempts.last_error = error;
        attempts.last_decision = Some(Instant::now());
    }

    /// Returns a copy of the cached decision.
    ///
    /// Waits for any in-flight attempt on this connection to finish.
    pub async fn snapshot(&self) -> AttemptsSnapshot {
        let attempts = self.attempts.lock().await;
        AttemptsSnapshot {
            success: attempts.success,
            connection_problem: attempts.connection_problem,
            last_error: attempts.last_error.clone(),
            last_decision: attempts.last_decision,
        }
    }

    // -- Internals ---------------------------------------------------------

    async fn decide(&self, ignore_delays: bool) -> Result<Outcome, LoginError> {
        let mut attempts = self.attempts.lock().await;
        let was_logged_out = attempts.is_logged_out();
        let state = self.next_state(&mut attempts, ignore_delays).await?;
        Ok(Outcome {
            reconnected: was_logged_out && attempts.success,
            state,
        })
    }

    async fn attempt(&self, attempt: Attempt<'_>) -> Result<Outcome, LoginError> {
        let mut attempts = self.attempts.lock().await;
        let was_logged_out = attempts.is_logged_out();

        info!(connection = %self.connection, kind = %attempt, "explicit login attempt");
        let result = match attempt {
            Attempt::Login { password } => self.performer.login(password).await,
            Attempt::ChangePassword { old, new } => {
                self.performer.change_password(old, new).await
            }
        };
        let state = result.map_err(|e| self.lift(e))?;
        attempts.register(&state, &self.config);

        Ok(Outcome {
            reconnected: was_logged_out && attempts.success,
            state,
        })
    }

    /// The decision algorithm. Called with the lock held.
    ///
    /// Every state that came from the performer is registered; the
    /// synthetic short-circuit states are returned without touching the
    /// cache.
    async fn next_state(
        &self,
        attempts: &mut Attempts,
        ignore_delays: bool,
    ) -> Result<LoginState, LoginError> {
        let Some(last_decision) = attempts.last_decision else {
            let probe = self.probe().await?;
            if probe.is_success() || probe.error_message().is_some() {
                return Ok(self.register(attempts, probe));
            }
            let state = self.silent_login().await?;
            return Ok(self.register(attempts, state));
        };

        let elapsed = Instant::now().saturating_duration_since(last_decision);
        let in_success_window = !ignore_delays && elapsed < self.config.success_blind_interval;

        if attempts.success {
            if in_success_window {
                debug!(
                    connection = %self.connection,
                    elapsed_ms = elapsed.as_millis() as u64,
                    "trusting cached login"
                );
                return Ok(LoginState::SUCCESS);
            }
            let probe = self.probe().await?;
            if probe.is_success() && self.expires_soon(probe.time_left()) {
                debug!(
                    connection = %self.connection,
                    time_left_s = probe.time_left().map(|d| d.as_secs()),
                    "ticket about to expire, logging in again"
                );
                let state = self.silent_login().await?;
                return Ok(self.register(attempts, state));
            }
            return Ok(self.register(attempts, probe));
        }

        let probe = self.probe().await?;
        if probe.is_success() {
            return Ok(self.register(attempts, probe));
        }

        if !attempts.connection_problem {
            // Mirrors the long-standing behavior callers rely on: a retry
            // with unchanged credentials this soon is reported as success
            // and leaves the cached failure in place.
            if !ignore_delays
                && !self.performer.is_credentials_changed()
                && elapsed < self.config.credentials_blind_interval
            {
                debug!(
                    connection = %self.connection,
                    elapsed_ms = elapsed.as_millis() as u64,
                    "credentials unchanged, skipping retry"
                );
                return Ok(LoginState::SUCCESS);
            }
        } else if elapsed < self.config.network_blind_interval {
            debug!(
                connection = %self.connection,
                elapsed_ms = elapsed.as_millis() as u64,
                "recent connection failure, not retrying"
            );
            let error = probe
                .error_message()
                .map(str::to_owned)
                .or_else(|| attempts.last_error.clone());
            return Ok(LoginState::failed(error));
        }

        let state = self.silent_login().await?;
        Ok(self.register(attempts, state))
    }

    fn register(&self, attempts: &mut Attempts, state: LoginState) -> LoginState {
        attempts.register(&state, &self.config);
        state
    }

    fn expires_soon(&self, time_left: Option<Duration>) -> bool {
        time_left.is_some_and(|left| !left.is_zero() && left < self.config.time_to_relogin)
    }

    async fn probe(&self) -> Result<LoginState, LoginError> {
        let state = self.performer.login_state().await.map_err(|e| self.lift(e))?;
        debug!(connection = %self.connection, %state, "probed login state");
        Ok(state)
    }

    async fn silent_login(&self) -> Result<LoginState, LoginError> {
        let state = self
            .performer
            .login_with_stored_password()
            .await
            .map_err(|e| self.lift(e))?;
        debug!(connection = %self.connection, %state, "silent login finished");
        Ok(state)
    }

    fn lift(&self, error: PerformerError) -> LoginError {
        if !error.is_cancelled() {
            tracing::warn!(connection = %self.connection, error = %error, "login performer failed");
        }
        LoginError::from_performer(&self.connection, error)
    }

    fn deliver(&self, outcome: Outcome, batch: Option<&ReconnectBatch>) -> LoginState {
        if outcome.reconnected {
            info!(connection = %self.connection, "connection logged in again");
            match batch {
                Some(batch) => batch.push(self.connection.clone()),
                None => self
                    .listener
                    .reconnected(std::slice::from_ref(&self.connection)),
            }
        }
        outcome.state
    }
}

impl<P> fmt::Debug for AttemptsStateMachine<P> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AttemptsStateMachine")
            .field("connection", &self.connection)
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

// =========================================================================
// Tests
// =========================================================================
