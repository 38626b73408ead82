//! Integration tests for the attempts state machine.
//!
//! Uses `start_paused = true` so the blind intervals are driven with
//! `tokio::time::advance` instead of real sleeps. "Backend logins" below
//! means login attempts (`login`, `login_with_stored_password`,
//! `change_password`); status probes are counted separately.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use futures_util::future::join_all;
use ticketgate_session::{
    AttemptsStateMachine, LoginConfig, LoginError, LoginPerformer, LoginStateListener,
    ReconnectBatch,
};
use ticketgate_state::{ConnectionId, LoginState, PerformerError};

// =========================================================================
// Fake backend
// =========================================================================

const CONNECT_FAILED: &str = "Connect to server failed; check $P4PORT.";
const FRESH_TICKET: Duration = Duration::from_secs(12 * 3600);

/// An in-memory ticket server for one connection.
struct Backend {
    reachable: AtomicBool,
    logged_in: AtomicBool,
    password: Mutex<String>,
    stored: Mutex<Option<String>>,
    ticket_left: Mutex<Option<Duration>>,
    credentials_changed: AtomicBool,
    delay: Mutex<Duration>,
    cancel_next_probe: AtomicBool,
    break_next_probe: AtomicBool,
    probes: AtomicUsize,
    logins: AtomicUsize,
}

impl Backend {
    fn new() -> Arc<Self> {
        Arc::new(Self {
            reachable: AtomicBool::new(true),
            logged_in: AtomicBool::new(false),
            password: Mutex::new("secret".into()),
            stored: Mutex::new(Some("secret".into())),
            ticket_left: Mutex::new(Some(FRESH_TICKET)),
            credentials_changed: AtomicBool::new(false),
            delay: Mutex::new(Duration::ZERO),
            cancel_next_probe: AtomicBool::new(false),
            break_next_probe: AtomicBool::new(false),
            probes: AtomicUsize::new(0),
            logins: AtomicUsize::new(0),
        })
    }

    fn logged_in(self: Arc<Self>) -> Arc<Self> {
        self.logged_in.store(true, Ordering::SeqCst);
        self
    }

    fn probes(&self) -> usize {
        self.probes.load(Ordering::SeqCst)
    }

    fn logins(&self) -> usize {
        self.logins.load(Ordering::SeqCst)
    }

    fn set_ticket_left(&self, left: Option<Duration>) {
        *self.ticket_left.lock().unwrap() = left;
    }

    async fn pause(&self) {
        let delay = *self.delay.lock().unwrap();
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
    }

    async fn attempt(&self, password: Option<String>) -> LoginState {
        self.logins.fetch_add(1, Ordering::SeqCst);
        self.pause().await;
        if !self.reachable.load(Ordering::SeqCst) {
            return LoginState::error(CONNECT_FAILED);
        }
        let Some(password) = password else {
            return LoginState::logged_out();
        };
        if *self.password.lock().unwrap() == password {
            self.logged_in.store(true, Ordering::SeqCst);
            self.set_ticket_left(Some(FRESH_TICKET));
            LoginState::logged_in(Some(FRESH_TICKET))
        } else {
            LoginState::error("Password invalid.")
        }
    }
}

#[derive(Clone)]
struct FakePerformer(Arc<Backend>);

impl LoginPerformer for FakePerformer {
    async fn login_state(&self) -> Result<LoginState, PerformerError> {
        let backend = &self.0;
        backend.probes.fetch_add(1, Ordering::SeqCst);
        if backend.cancel_next_probe.swap(false, Ordering::SeqCst) {
            return Err(PerformerError::Cancelled);
        }
        if backend.break_next_probe.swap(false, Ordering::SeqCst) {
            return Err(PerformerError::backend("p4 exited with signal 9"));
        }
        backend.pause().await;
        if !backend.reachable.load(Ordering::SeqCst) {
            return Ok(LoginState::error(CONNECT_FAILED));
        }
        if backend.logged_in.load(Ordering::SeqCst) {
            let left = *backend.ticket_left.lock().unwrap();
            return Ok(LoginState::logged_in(left));
        }
        Ok(LoginState::logged_out())
    }

    async fn login(&self, password: &str) -> Result<LoginState, PerformerError> {
        Ok(self.0.attempt(Some(password.to_owned())).await)
    }

    async fn login_with_stored_password(&self) -> Result<LoginState, PerformerError> {
        let stored = self.0.stored.lock().unwrap().clone();
        Ok(self.0.attempt(stored).await)
    }

    fn is_credentials_changed(&self) -> bool {
        self.0.credentials_changed.load(Ordering::SeqCst)
    }

    async fn change_password(&self, old: &str, new: &str) -> Result<LoginState, PerformerError> {
        let state = self.0.attempt(Some(old.to_owned())).await;
        if state.is_success() {
            *self.0.password.lock().unwrap() = new.to_owned();
        }
        Ok(state)
    }
}

/// Records every reconnect notification.
#[derive(Default)]
struct Recorder {
    calls: Mutex<Vec<Vec<ConnectionId>>>,
}

impl Recorder {
    fn calls(&self) -> Vec<Vec<ConnectionId>> {
        self.calls.lock().unwrap().clone()
    }
}

impl LoginStateListener for Recorder {
    fn reconnected(&self, connections: &[ConnectionId]) {
        self.calls.lock().unwrap().push(connections.to_vec());
    }
}

// =========================================================================
// Helpers
// =========================================================================

fn machine(backend: &Arc<Backend>) -> (AttemptsStateMachine<FakePerformer>, Arc<Recorder>) {
    let recorder = Arc::new(Recorder::default());
    let machine = AttemptsStateMachine::new(
        ConnectionId::new("perforce:1666"),
        FakePerformer(Arc::clone(backend)),
        LoginConfig::default(),
        recorder.clone(),
    );
    (machine, recorder)
}

fn minutes(m: u64) -> Duration {
    Duration::from_secs(m * 60)
}

// =========================================================================
// First decision
// =========================================================================

#[tokio::test(start_paused = true)]
async fn test_first_ensure_logged_in_only_probes() {
    let backend = Backend::new().logged_in();
    let (machine, recorder) = machine(&backend);

    let state = machine.ensure(false).await.unwrap();

    assert!(state.is_success());
    assert_eq!(backend.probes(), 1);
    assert_eq!(backend.logins(), 0);
    assert!(recorder.calls().is_empty(), "first decision is not a reconnect");
}

#[tokio::test(start_paused = true)]
async fn test_first_ensure_logged_out_uses_stored_password() {
    let backend = Backend::new();
    let (machine, recorder) = machine(&backend);

    let state = machine.ensure(false).await.unwrap();

    assert!(state.is_success());
    assert_eq!(backend.logins(), 1);
    assert!(recorder.calls().is_empty());
    assert!(machine.snapshot().await.success);
}

#[tokio::test(start_paused = true)]
async fn test_first_ensure_probe_error_is_connection_problem() {
    let backend = Backend::new();
    backend.reachable.store(false, Ordering::SeqCst);
    let (machine, _) = machine(&backend);

    let state = machine.ensure(false).await.unwrap();

    assert_eq!(state, LoginState::error(CONNECT_FAILED));
    assert_eq!(backend.logins(), 0, "no login attempt against a dead server");
    let snapshot = machine.snapshot().await;
    assert!(snapshot.connection_problem);
    assert_eq!(snapshot.last_error.as_deref(), Some(CONNECT_FAILED));
}

#[tokio::test(start_paused = true)]
async fn test_first_ensure_without_stored_password_stays_logged_out() {
    let backend = Backend::new();
    *backend.stored.lock().unwrap() = None;
    let (machine, _) = machine(&backend);

    let state = machine.ensure(false).await.unwrap();

    assert_eq!(state, LoginState::logged_out());
    let snapshot = machine.snapshot().await;
    assert!(!snapshot.success);
    assert!(!snapshot.connection_problem);
    assert!(snapshot.last_decision.is_some());
}

// =========================================================================
// Cached success
// =========================================================================

#[tokio::test(start_paused = true)]
async fn test_ensure_twice_inside_success_window_probes_once() {
    let backend = Backend::new().logged_in();
    backend.set_ticket_left(None);
    let (machine, _) = machine(&backend);

    let first = machine.ensure(false).await.unwrap();
    tokio::time::advance(minutes(9)).await;
    let second = machine.ensure(false).await.unwrap();

    assert_eq!(first, second);
    assert_eq!(backend.probes(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_ensure_after_success_window_probes_again() {
    let backend = Backend::new().logged_in();
    let (machine, _) = machine(&backend);

    machine.ensure(false).await.unwrap();
    tokio::time::advance(minutes(11)).await;
    machine.ensure(false).await.unwrap();

    assert_eq!(backend.probes(), 2);
    assert_eq!(backend.logins(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_ignore_delays_probes_inside_success_window() {
    let backend = Backend::new().logged_in();
    let (machine, _) = machine(&backend);

    machine.ensure(false).await.unwrap();
    machine.ensure(true).await.unwrap();

    assert_eq!(backend.probes(), 2);
}

#[tokio::test(start_paused = true)]
async fn test_short_ticket_triggers_one_preemptive_relogin() {
    let backend = Backend::new().logged_in();
    backend.set_ticket_left(Some(minutes(30)));
    let (machine, _) = machine(&backend);

    let first = machine.ensure(false).await.unwrap();
    assert_eq!(first.time_left(), Some(minutes(30)));
    assert_eq!(backend.logins(), 0);

    tokio::time::advance(minutes(11)).await;
    let second = machine.ensure(false).await.unwrap();

    assert_eq!(backend.logins(), 1, "exactly one silent relogin");
    assert_eq!(second.time_left(), Some(FRESH_TICKET));
}

#[tokio::test(start_paused = true)]
async fn test_long_ticket_is_not_refreshed() {
    let backend = Backend::new().logged_in();
    backend.set_ticket_left(Some(minutes(120)));
    let (machine, _) = machine(&backend);

    machine.ensure(false).await.unwrap();
    let state = machine.ensure(true).await.unwrap();

    assert_eq!(state.time_left(), Some(minutes(120)));
    assert_eq!(backend.logins(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_zero_ticket_lifetime_is_not_refreshed() {
    let backend = Backend::new().logged_in();
    backend.set_ticket_left(Some(Duration::ZERO));
    let (machine, _) = machine(&backend);

    machine.ensure(false).await.unwrap();
    machine.ensure(true).await.unwrap();

    assert_eq!(backend.logins(), 0);
}

// =========================================================================
// Cached failure
// =========================================================================

#[tokio::test(start_paused = true)]
async fn test_network_failure_suppresses_retry_inside_window() {
    let backend = Backend::new();
    backend.reachable.store(false, Ordering::SeqCst);
    let (machine, _) = machine(&backend);

    machine.ensure(false).await.unwrap();

    tokio::time::advance(minutes(5)).await;
    let state = machine.ensure(false).await.unwrap();
    assert_eq!(state, LoginState::error(CONNECT_FAILED));
    assert_eq!(backend.logins(), 0);

    let state = machine.ensure(true).await.unwrap();
    assert_eq!(state, LoginState::error(CONNECT_FAILED));
    assert_eq!(backend.logins(), 0, "ignore_delays does not skip the network window");

    tokio::time::advance(minutes(6)).await;
    machine.ensure(false).await.unwrap();
    assert_eq!(backend.logins(), 1, "window over: exactly one retry");
}

#[tokio::test(start_paused = true)]
async fn test_network_failure_recovers_when_probe_succeeds() {
    let backend = Backend::new();
    backend.reachable.store(false, Ordering::SeqCst);
    let (machine, recorder) = machine(&backend);
    machine.ensure(false).await.unwrap();

    backend.reachable.store(true, Ordering::SeqCst);
    backend.logged_in.store(true, Ordering::SeqCst);
    tokio::time::advance(minutes(1)).await;
    let state = machine.ensure(false).await.unwrap();

    assert!(state.is_success());
    assert_eq!(backend.logins(), 0);
    assert_eq!(recorder.calls(), vec![vec![ConnectionId::new("perforce:1666")]]);
}

#[tokio::test(start_paused = true)]
async fn test_unchanged_credentials_inside_one_second_report_success() {
    let backend = Backend::new();
    let (machine, recorder) = machine(&backend);
    machine.failed(false, None).await;

    let first = machine.ensure(false).await.unwrap();
    tokio::time::advance(Duration::from_millis(300)).await;
    let second = machine.ensure(false).await.unwrap();

    assert_eq!(first, LoginState::SUCCESS);
    assert_eq!(second, LoginState::SUCCESS);
    assert_eq!(backend.logins(), 0);
    assert!(!machine.snapshot().await.success, "cached failure is kept");
    assert!(recorder.calls().is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_changed_credentials_retry_immediately() {
    let backend = Backend::new();
    let (machine, recorder) = machine(&backend);
    machine.failed(false, None).await;
    backend.credentials_changed.store(true, Ordering::SeqCst);

    let state = machine.ensure(false).await.unwrap();

    assert!(state.is_success());
    assert_eq!(backend.logins(), 1);
    assert_eq!(recorder.calls().len(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_credentials_failure_retried_after_one_second() {
    let backend = Backend::new();
    let (machine, _) = machine(&backend);
    machine.failed(false, None).await;

    tokio::time::advance(Duration::from_millis(1_500)).await;
    machine.ensure(false).await.unwrap();

    assert_eq!(backend.logins(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_credentials_failure_retried_when_ignoring_delays() {
    let backend = Backend::new();
    let (machine, _) = machine(&backend);
    machine.failed(false, None).await;

    machine.ensure(true).await.unwrap();

    assert_eq!(backend.logins(), 1);
}

// =========================================================================
// Concurrency
// =========================================================================

#[tokio::test(start_paused = true)]
async fn test_concurrent_callers_share_one_login() {
    let backend = Backend::new();
    *backend.delay.lock().unwrap() = Duration::from_secs(3);
    let (machine, _) = machine(&backend);

    let results = join_all((0..8).map(|_| machine.ensure(true))).await;

    assert!(results.iter().all(|r| r.as_ref().is_ok_and(|s| s.is_success())));
    assert_eq!(backend.logins(), 1, "one login for eight callers");
}

#[tokio::test(start_paused = true)]
async fn test_concurrent_callers_across_tasks_share_one_login() {
    let backend = Backend::new();
    *backend.delay.lock().unwrap() = Duration::from_secs(3);
    let (machine, _) = machine(&backend);
    let machine = Arc::new(machine);

    let handles: Vec<_> = (0..4)
        .map(|_| {
            let machine = Arc::clone(&machine);
            tokio::spawn(async move { machine.ensure(true).await })
        })
        .collect();
    for handle in handles {
        assert!(handle.await.unwrap().unwrap().is_success());
    }

    assert_eq!(backend.logins(), 1);
}

// =========================================================================
// Explicit attempts
// =========================================================================

#[tokio::test(start_paused = true)]
async fn test_login_with_wrong_password_is_recorded() {
    let backend = Backend::new();
    let (machine, _) = machine(&backend);

    let state = machine.login("guess").await.unwrap();

    assert_eq!(state, LoginState::error("Password invalid."));
    let snapshot = machine.snapshot().await;
    assert!(!snapshot.success);
    assert_eq!(snapshot.last_error.as_deref(), Some("Password invalid."));
}

#[tokio::test(start_paused = true)]
async fn test_login_after_failure_notifies_listener() {
    let backend = Backend::new();
    let (machine, recorder) = machine(&backend);
    machine.failed(false, Some("Password invalid.".into())).await;

    let state = machine.login("secret").await.unwrap();

    assert!(state.is_success());
    assert_eq!(recorder.calls().len(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_change_password_records_success() {
    let backend = Backend::new();
    let (machine, recorder) = machine(&backend);
    machine.failed(false, Some("Password has expired.".into())).await;

    let state = machine.change_password("secret", "n3w").await.unwrap();

    assert!(state.is_success());
    assert_eq!(*backend.password.lock().unwrap(), "n3w");
    assert!(machine.snapshot().await.success);
    assert_eq!(recorder.calls().len(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_failed_overrides_cached_success() {
    let backend = Backend::new().logged_in();
    let (machine, _) = machine(&backend);
    machine.ensure(false).await.unwrap();

    machine.failed(true, Some("lost".into())).await;

    let snapshot = machine.snapshot().await;
    assert!(!snapshot.success);
    assert!(snapshot.connection_problem);
    assert_eq!(snapshot.last_error.as_deref(), Some("lost"));
}

// =========================================================================
// Batching
// =========================================================================

#[tokio::test(start_paused = true)]
async fn test_ensure_batched_defers_notification() {
    let backend = Backend::new().logged_in();
    let (machine, recorder) = machine(&backend);
    machine.failed(false, None).await;

    let batch = ReconnectBatch::new();
    machine.ensure_batched(true, &batch).await.unwrap();

    assert!(recorder.calls().is_empty());
    assert_eq!(batch.len(), 1);
    let delivered = batch.flush(recorder.as_ref());
    assert_eq!(delivered, vec![ConnectionId::new("perforce:1666")]);
    assert_eq!(recorder.calls().len(), 1);
}

// =========================================================================
// Errors and cancellation
// =========================================================================

#[tokio::test(start_paused = true)]
async fn test_cancelled_probe_propagates_and_keeps_cache() {
    let backend = Backend::new().logged_in();
    let (machine, _) = machine(&backend);
    machine.ensure(false).await.unwrap();
    let before = machine.snapshot().await;

    backend.cancel_next_probe.store(true, Ordering::SeqCst);
    let result = machine.ensure(true).await;

    assert!(matches!(result, Err(LoginError::Cancelled)));
    assert_eq!(machine.snapshot().await, before);
}

#[tokio::test(start_paused = true)]
async fn test_dropped_ensure_keeps_cache() {
    let backend = Backend::new();
    let (machine, _) = machine(&backend);
    machine.failed(true, Some(CONNECT_FAILED.into())).await;
    let before = machine.snapshot().await;

    *backend.delay.lock().unwrap() = Duration::from_secs(30);
    let timed_out = tokio::time::timeout(Duration::from_secs(1), machine.ensure(true)).await;

    assert!(timed_out.is_err());
    assert_eq!(machine.snapshot().await, before);
}

#[tokio::test(start_paused = true)]
async fn test_backend_error_is_wrapped_and_machine_stays_usable() {
    let backend = Backend::new().logged_in();
    let (machine, _) = machine(&backend);

    backend.break_next_probe.store(true, Ordering::SeqCst);
    let err = machine.ensure(false).await.unwrap_err();
    assert!(matches!(err, LoginError::Unexpected { .. }));
    assert!(machine.snapshot().await.last_decision.is_none());

    let state = machine.ensure(false).await.unwrap();
    assert!(state.is_success());
}
