//! `LoginManager` builder, connection registry, and the check operations.
//!
//! This is the entry point for everything login-related. It ties the
//! layers together: collaborators → coordinator → state machines.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use futures_util::future::join_all;
use ticketgate_session::{AttemptsStateMachine, LoginConfig, LoginStateListener, ReconnectBatch};
use ticketgate_state::ConnectionId;
use tokio::sync::Mutex;
use tracing::{debug, warn};

use crate::notifications::LoginNotifications;
use crate::{CheckError, DirtyScope, NoopDirtyScope, Notifier, PerformerFactory, Settings, SilentNotifier};

pub(crate) type Machine<F> = AttemptsStateMachine<<F as PerformerFactory>::Performer>;

/// Shared coordinator state. One per logical session.
pub(crate) struct Inner<F: PerformerFactory, S> {
    pub(crate) config: LoginConfig,
    factory: F,
    pub(crate) settings: S,
    pub(crate) notifications: Arc<LoginNotifications>,
    /// Connection → state machine. Only held to find or insert an entry,
    /// never while a state machine is working.
    machines: Mutex<HashMap<ConnectionId, Arc<Machine<F>>>>,
}

// ---------------------------------------------------------------------------
// Builder
// ---------------------------------------------------------------------------

/// Builder for a [`LoginManager`].
///
/// # Example
///
/// ```rust,ignore
/// let manager = LoginManagerBuilder::new()
///     .config(LoginConfig::default())
///     .notifier(Arc::new(my_banners))
///     .dirty_scope(Arc::new(my_views))
///     .build(my_factory, my_settings);
/// ```
pub struct LoginManagerBuilder {
    config: LoginConfig,
    notifier: Arc<dyn Notifier>,
    dirty_scope: Arc<dyn DirtyScope>,
}

impl LoginManagerBuilder {
    /// Creates a builder with default timing and no-op collaborators.
    pub fn new() -> Self {
        Self {
            config: LoginConfig::default(),
            notifier: Arc::new(SilentNotifier),
            dirty_scope: Arc::new(NoopDirtyScope),
        }
    }

    /// Sets the blind intervals and refresh schedule.
    pub fn config(mut self, config: LoginConfig) -> Self {
        self.config = config;
        self
    }

    pub fn notifier(mut self, notifier: Arc<dyn Notifier>) -> Self {
        self.notifier = notifier;
        self
    }

    pub fn dirty_scope(mut self, dirty_scope: Arc<dyn DirtyScope>) -> Self {
        self.dirty_scope = dirty_scope;
        self
    }

    /// Builds the manager. No connection is contacted yet.
    pub fn build<F: PerformerFactory, S: Settings>(self, factory: F, settings: S) -> LoginManager<F, S> {
        let notifications = Arc::new(LoginNotifications::new(self.notifier, self.dirty_scope));
        LoginManager {
            inner: Arc::new(Inner {
                config: self.config.validated(),
                factory,
                settings,
                notifications,
                machines: Mutex::new(HashMap::new()),
            }),
        }
    }
}

impl Default for LoginManagerBuilder {
    fn default() -> Self {
        Self::new()
    }
}

// ---------------------------------------------------------------------------
// LoginManager
// ---------------------------------------------------------------------------

/// Keeps a set of connections logged in.
///
/// Cheap to clone; clones share the same registry and listeners, so a
/// clone can be moved into a background task.
///
/// ## Per-connection lifecycle
///
/// ```text
/// UNKNOWN ──→ CHECKING ──→ LOGGED_IN ──(ticket expired)──→ CHECKING
///                │
///                ▼
///            LOGGED_OUT ──→ BLOCKED (blind window) ──→ CHECKING
/// ```
///
/// No failure is terminal: once its blind window passes (or a caller
/// ignores delays) the connection is checked again.
pub struct LoginManager<F: PerformerFactory, S: Settings> {
    pub(crate) inner: Arc<Inner<F, S>>,
}

impl<F: PerformerFactory, S: Settings> Clone for LoginManager<F, S> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<F: PerformerFactory, S: Settings> LoginManager<F, S> {
    pub fn config(&self) -> &LoginConfig {
        &self.inner.config
    }

    pub fn settings(&self) -> &S {
        &self.inner.settings
    }

    /// Returns the connection's state machine, creating it on first use.
    ///
    /// The performer is created without holding the registry lock; if two
    /// callers race on a new connection, the first insert wins.
    pub async fn state_machine(&self, connection: &ConnectionId) -> Arc<Machine<F>> {
        if let Some(machine) = self.inner.machines.lock().await.get(connection) {
            return Arc::clone(machine);
        }

        let listener: Arc<dyn LoginStateListener> = self.inner.notifications.clone();
        let created = Arc::new(AttemptsStateMachine::new(
            connection.clone(),
            self.inner.factory.create(connection),
            self.inner.config.clone(),
            listener,
        ));

        let mut machines = self.inner.machines.lock().await;
        let machine = machines.entry(connection.clone()).or_insert_with(|| {
            debug!(%connection, "creating login state machine");
            created
        });
        Arc::clone(machine)
    }

    /// Every connection seen so far, sorted.
    pub async fn connections(&self) -> Vec<ConnectionId> {
        let mut connections: Vec<_> = self.inner.machines.lock().await.keys().cloned().collect();
        connections.sort();
        connections
    }

    /// Forgets every connection's cached state (e.g. after a settings
    /// reset). Machines already handed out keep working but are no longer
    /// reachable through the manager.
    pub async fn clear(&self) {
        let dropped = {
            let mut machines = self.inner.machines.lock().await;
            let count = machines.len();
            machines.clear();
            count
        };
        debug!(dropped, "login state registry cleared");
    }

    /// Registers a callback run once per notification pass in which at
    /// least one connection logged in.
    pub fn add_successful_login_listener(&self, callback: impl Fn() + Send + Sync + 'static) {
        self.inner.notifications.add_callback(Arc::new(callback));
    }

    /// Checks a connection without any interaction.
    ///
    /// Returns `Ok(false)` when the connection is simply not logged in
    /// (or checking is disabled).
    ///
    /// # Errors
    /// - [`CheckError::Connection`] / [`CheckError::Credentials`]: the
    ///   backend reported an error; recoverable.
    /// - [`CheckError::Login`]: cancelled, or the performer failed.
    pub async fn silent_check(&self, connection: &ConnectionId) -> Result<bool, CheckError> {
        if let Some(decided) = self.policy_decision() {
            return Ok(decided);
        }
        let state = self.state_machine(connection).await.ensure(true).await?;
        match CheckError::from_state(connection, &state) {
            None => Ok(true),
            Some(CheckError::AuthenticationRequired(_)) => Ok(false),
            Some(err) => Err(err),
        }
    }

    /// Checks a connection for a blocking or background caller.
    ///
    /// `force_check` ignores the blind intervals that allow it.
    ///
    /// # Errors
    /// Any failure is an error here, including
    /// [`CheckError::AuthenticationRequired`] when the connection is
    /// simply not logged in or login checking is disabled.
    pub async fn check(&self, connection: &ConnectionId, force_check: bool) -> Result<bool, CheckError> {
        match self.policy_decision() {
            Some(true) => return Ok(true),
            Some(false) => return Err(CheckError::AuthenticationRequired(connection.clone())),
            None => {}
        }
        let state = self.state_machine(connection).await.ensure(force_check).await?;
        match CheckError::from_state(connection, &state) {
            None => Ok(true),
            Some(err) => Err(err),
        }
    }

    /// Re-checks every known connection, ignoring delays.
    ///
    /// Connections are checked concurrently inside one reconnect batch,
    /// so any number of reconnections produce at most one notification
    /// pass. Never fails: errors are logged, and connections still not
    /// logged in get the lazy banner.
    pub async fn refresh_login_state(&self) {
        if self.policy_decision().is_some() {
            debug!("login checking disabled, skipping refresh");
            return;
        }
        let machines: Vec<_> = self.inner.machines.lock().await.values().cloned().collect();

        let batch = ReconnectBatch::new();
        let results = join_all(machines.iter().map(|m| m.ensure_batched(true, &batch))).await;

        let notifier = self.inner.notifications.notifier();
        for (machine, result) in machines.iter().zip(results) {
            let connection = machine.connection();
            match result {
                Ok(state) if state.is_success() => {}
                Ok(state) => {
                    debug!(%connection, %state, "still not logged in");
                    notifier.ensure_notify(connection);
                }
                Err(e) if e.is_cancelled() => debug!(%connection, "refresh cancelled"),
                Err(e) => warn!(%connection, error = %e, "login refresh failed"),
            }
        }

        let reconnected = batch.flush(self.inner.notifications.as_ref());
        debug!(
            connections = machines.len(),
            reconnected = reconnected.len(),
            "login state refreshed"
        );
    }

    /// Records that something outside the coordinator saw this
    /// connection logged out.
    pub async fn not_logged(&self, connection: &ConnectionId) {
        self.state_machine(connection).await.failed(false, None).await;
        self.inner.notifications.notifier().ensure_notify(connection);
    }

    /// `Some(answer)` when the policy flags decide without the backend.
    pub(crate) fn policy_decision(&self) -> Option<bool> {
        if !self.inner.settings.enabled() {
            Some(false)
        } else if !self.inner.settings.use_login() {
            Some(true)
        } else {
            None
        }
    }
}

impl<F: PerformerFactory, S: Settings> fmt::Debug for LoginManager<F, S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LoginManager")
            .field("config", &self.inner.config)
            .finish_non_exhaustive()
    }
}
