//! Interactive repair flows: stored password, then prompts.
//!
//! These may wait on the user for a long time. They only ever hold the
//! state lock of the connection being repaired, and only while a login
//! attempt runs, never while a prompt is open.

use ticketgate_state::{ConnectionId, CredentialsProblem, LoginFailure, LoginState};
use tracing::{info, warn};

use crate::{CheckError, LoginManager, PerformerFactory, Settings};

impl<F: PerformerFactory, S: Settings> LoginManager<F, S> {
    /// Checks a connection and, if it isn't logged in, tries to fix that.
    ///
    /// The flow:
    ///   1. Re-check, ignoring delays. Logged in → done.
    ///   2. A genuine connection error → report it and give up. A
    ///      rejected password does NOT count; it goes on to step 3.
    ///   3. Try the stored password once.
    ///   4. Prompt for a password until a login succeeds or the user
    ///      cancels the prompt.
    ///
    /// Returns `Ok(false)` when the user cancelled or a connection
    /// problem was reported.
    pub async fn check_and_repair(&self, connection: &ConnectionId) -> Result<bool, CheckError> {
        if let Some(decided) = self.policy_decision() {
            return Ok(decided);
        }
        let machine = self.state_machine(connection).await;

        let state = machine.ensure(true).await?;
        if state.is_success() {
            return Ok(true);
        }
        if self.gave_up_on_connection_problem(connection, &state) {
            return Ok(false);
        }

        if let Some(password) = self.inner.settings.stored_password() {
            let state = machine.login(&password).await?;
            if state.is_success() {
                info!(%connection, "logged in with stored password");
                return Ok(true);
            }
            if self.gave_up_on_connection_problem(connection, &state) {
                return Ok(false);
            }
        }

        let notifier = self.inner.notifications.notifier();
        loop {
            let Some(password) = self.inner.settings.request_password(connection).await else {
                info!(%connection, "password prompt cancelled");
                return Ok(false);
            };
            let state = machine.login(&password).await?;
            notifier.show_password_was_ok(state.is_success());
            if state.is_success() {
                info!(%connection, "logged in with prompted password");
                return Ok(true);
            }
            if self.gave_up_on_connection_problem(connection, &state) {
                return Ok(false);
            }
        }
    }

    /// Like [`check_and_repair`](Self::check_and_repair), but first offers
    /// a password update when the cached failure is an expired password.
    ///
    /// A successful update ends the flow; a declined or failed one falls
    /// back to the ordinary repair flow.
    pub async fn check_password_expiration_and_repair(
        &self,
        connection: &ConnectionId,
    ) -> Result<bool, CheckError> {
        if let Some(decided) = self.policy_decision() {
            return Ok(decided);
        }
        let machine = self.state_machine(connection).await;

        let expired = matches!(
            machine.snapshot().await.failure(),
            Some(LoginFailure::Credentials(CredentialsProblem::PasswordExpired))
        );
        if expired {
            info!(%connection, "password expired, requesting update");
            if self.inner.settings.request_password_update(machine.as_ref()).await {
                return Ok(true);
            }
        }
        self.check_and_repair(connection).await
    }

    /// Runs [`check_and_repair`](Self::check_and_repair) on every known
    /// connection, stopping at the first one that stays broken.
    pub async fn check_and_repair_all(&self) -> Result<bool, CheckError> {
        for connection in self.connections().await {
            if !self.check_and_repair(&connection).await? {
                return Ok(false);
            }
        }
        Ok(true)
    }

    /// Reports a connection problem; `true` if `state` was one.
    fn gave_up_on_connection_problem(&self, connection: &ConnectionId, state: &LoginState) -> bool {
        if !state.failure().is_some_and(|f| f.is_connection()) {
            return false;
        }
        let message = state.error_message().unwrap_or_default();
        warn!(%connection, error = message, "connection problem, not prompting for a password");
        self.inner
            .notifications
            .notifier()
            .report_connection_error(connection, message);
        true
    }
}
