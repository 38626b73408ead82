use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use ticketgate::prelude::*;
use ticketgate::AttemptsStateMachine;
use tracing_subscriber::EnvFilter;

// ---------------------------------------------------------------------------
// In-memory ticket server
// ---------------------------------------------------------------------------

const PASSWORD: &str = "hunter2";
const TICKET: Duration = Duration::from_secs(12 * 3600);

/// Which connections hold a ticket, and which ones are unreachable.
#[derive(Default)]
struct TicketServer {
    tickets: Mutex<HashMap<ConnectionId, Duration>>,
    offline: Mutex<Vec<ConnectionId>>,
}

impl TicketServer {
    fn is_offline(&self, connection: &ConnectionId) -> bool {
        self.offline.lock().unwrap_or_else(|e| e.into_inner()).contains(connection)
    }

    fn status(&self, connection: &ConnectionId) -> LoginState {
        if self.is_offline(connection) {
            return LoginState::error(format!("Connect to server {connection} failed."));
        }
        let tickets = self.tickets.lock().unwrap_or_else(|e| e.into_inner());
        match tickets.get(connection) {
            // Same wording the real `login -s` uses.
            Some(left) => LoginState::from_ticket_status(&format!(
                "User bob ticket expires in {} hours {} minutes.",
                left.as_secs() / 3600,
                left.as_secs() % 3600 / 60
            )),
            None => LoginState::logged_out(),
        }
    }

    fn login(&self, connection: &ConnectionId, password: &str) -> LoginState {
        if self.is_offline(connection) {
            return LoginState::error(format!("Connect to server {connection} failed."));
        }
        if password != PASSWORD {
            return LoginState::error("Password invalid.");
        }
        self.tickets
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .insert(connection.clone(), TICKET);
        LoginState::logged_in(Some(TICKET))
    }
}

struct DemoPerformer {
    connection: ConnectionId,
    server: Arc<TicketServer>,
}

impl LoginPerformer for DemoPerformer {
    async fn login_state(&self) -> Result<LoginState, PerformerError> {
        Ok(self.server.status(&self.connection))
    }

    async fn login(&self, password: &str) -> Result<LoginState, PerformerError> {
        Ok(self.server.login(&self.connection, password))
    }

    async fn login_with_stored_password(&self) -> Result<LoginState, PerformerError> {
        // Nothing in the server's own credential store.
        Ok(LoginState::logged_out())
    }

    fn is_credentials_changed(&self) -> bool {
        false
    }

    async fn change_password(&self, old: &str, _new: &str) -> Result<LoginState, PerformerError> {
        Ok(self.server.login(&self.connection, old))
    }
}

// ---------------------------------------------------------------------------
// Collaborators
// ---------------------------------------------------------------------------

/// Non-interactive settings: "prompts" are answered from a fixed list.
struct ScriptedSettings {
    answers: Mutex<Vec<String>>,
}

impl Settings for ScriptedSettings {
    fn enabled(&self) -> bool {
        true
    }

    fn use_login(&self) -> bool {
        true
    }

    fn stored_password(&self) -> Option<String> {
        None
    }

    async fn request_password(&self, connection: &ConnectionId) -> Option<String> {
        let answer = self.answers.lock().unwrap_or_else(|e| e.into_inner()).pop();
        println!("  password prompt for {connection}: {}", if answer.is_some() { "answered" } else { "cancelled" });
        answer
    }

    async fn request_password_update<P: LoginPerformer>(&self, _: &AttemptsStateMachine<P>) -> bool {
        false
    }
}

struct PrintingNotifier;

impl Notifier for PrintingNotifier {
    fn ensure_notify(&self, connection: &ConnectionId) {
        println!("  [banner] {connection}: not logged in");
    }

    fn remove_lazy_notification(&self, connection: &ConnectionId) {
        println!("  [banner] {connection}: cleared");
    }

    fn report_connection_error(&self, connection: &ConnectionId, message: &str) {
        println!("  [warning] {connection}: {message}");
    }
}

/// Counts view invalidations.
#[derive(Default)]
struct Views(AtomicUsize);

impl DirtyScope for Views {
    fn mark_everything_dirty(&self) {
        self.0.fetch_add(1, Ordering::SeqCst);
    }
}

// ---------------------------------------------------------------------------
// Bootstrap
// ---------------------------------------------------------------------------

/// Reads a `LoginConfig` from the JSON file named by the first argument,
/// if any.
fn load_config() -> Result<LoginConfig, Box<dyn std::error::Error>> {
    match std::env::args().nth(1) {
        Some(path) => Ok(serde_json::from_str(&std::fs::read_to_string(path)?)?),
        None => Ok(LoginConfig::default()),
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let config = load_config()?;
    let server = Arc::new(TicketServer::default());
    let views = Arc::new(Views::default());

    let factory = {
        let server = Arc::clone(&server);
        move |connection: &ConnectionId| DemoPerformer {
            connection: connection.clone(),
            server: Arc::clone(&server),
        }
    };
    let settings = ScriptedSettings {
        // Popped from the back: first a typo, then the right password.
        answers: Mutex::new(vec![PASSWORD.into(), "hunter3".into()]),
    };
    let manager = LoginManagerBuilder::new()
        .config(config)
        .notifier(Arc::new(PrintingNotifier))
        .dirty_scope(views.clone())
        .build(factory, settings);
    manager.add_successful_login_listener(|| println!("  [callback] some connection logged in"));

    let main_ws = ConnectionId::for_workspace("ssl:perforce:1666", "/home/bob/main");
    let release_ws = ConnectionId::for_workspace("ssl:perforce:1666", "/home/bob/release");
    let replica = ConnectionId::new("replica:1666");
    server.offline.lock().unwrap_or_else(|e| e.into_inner()).push(replica.clone());

    println!("initial checks:");
    for connection in [&main_ws, &release_ws, &replica] {
        match manager.silent_check(connection).await {
            Ok(ok) => println!("  {connection}: logged in = {ok}"),
            Err(e) => println!("  {connection}: {e}"),
        }
    }

    println!("repairing {main_ws}:");
    let repaired = manager.check_and_repair(&main_ws).await?;
    println!("  repaired = {repaired}");

    println!("repairing {replica}:");
    let repaired = manager.check_and_repair(&replica).await?;
    println!("  repaired = {repaired}");

    // Someone logs in from a terminal; the sweep picks it up.
    server.login(&release_ws, PASSWORD);
    println!("sweep:");
    manager.refresh_login_state().await;

    for connection in manager.connections().await {
        let snapshot = manager.state_machine(&connection).await.snapshot().await;
        let status = match snapshot.failure() {
            None => "ok".to_owned(),
            Some(failure) => failure.to_string(),
        };
        println!("  {connection}: {status}");
    }
    println!("views invalidated {} time(s)", views.0.load(Ordering::SeqCst));
    Ok(())
}
