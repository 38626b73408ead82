//! The hook that actually talks to the authentication backend.
//!
//! ticketgate doesn't run login commands itself; that's the job of
//! whatever integration embeds it (a CLI wrapper, an API client, a test
//! double). Instead it defines the [`LoginPerformer`] trait: a handful of
//! async operations against ONE connection, each returning a
//! [`LoginState`].
//!
//! # Failures vs. errors
//!
//! A rejected password or an unreachable server is an ordinary outcome:
//! return `Ok(LoginState::error(..))` or `Ok(LoginState::logged_out())`.
//! `Err` is reserved for cancellation and for genuinely unexpected
//! problems (see [`PerformerError`]).

use std::future::Future;

use ticketgate_state::{LoginState, PerformerError};

/// Performs probe/login/password-change operations against one connection.
///
/// # Trait bounds
///
/// - `Send + Sync` → the state machine holding the performer is shared
///   across tasks (background sweep, interactive flows, command
///   executors).
/// - `'static` → performers live as long as their connection's state
///   machine, which lives as long as the coordinator.
///
/// # Example
///
/// ```rust
/// use ticketgate_session::LoginPerformer;
/// use ticketgate_state::{LoginState, PerformerError};
///
/// /// Accepts one hard-coded password. Only for demos!
/// struct FixedPassword;
///
/// impl LoginPerformer for FixedPassword {
///     async fn login_state(&self) -> Result<LoginState, PerformerError> {
///         Ok(LoginState::logged_out())
///     }
///
///     async fn login(&self, password: &str) -> Result<LoginState, PerformerError> {
///         if password == "letmein" {
///             Ok(LoginState::SUCCESS)
///         } else {
///             Ok(LoginState::error("Password invalid."))
///         }
///     }
///
///     async fn login_with_stored_password(&self) -> Result<LoginState, PerformerError> {
///         Ok(LoginState::logged_out())
///     }
///
///     fn is_credentials_changed(&self) -> bool {
///         false
///     }
///
///     async fn change_password(
///         &self,
///         _old: &str,
///         _new: &str,
///     ) -> Result<LoginState, PerformerError> {
///         Err(PerformerError::backend("not supported"))
///     }
/// }
/// ```
pub trait LoginPerformer: Send + Sync + 'static {
    /// Probes the current login state without changing it.
    ///
    /// For a logged-in user this usually parses the backend's
    /// ticket-status line with
    /// [`LoginState::from_ticket_status`](ticketgate_state::LoginState::from_ticket_status).
    /// "Not logged in" should come back as `LoginState::logged_out()`;
    /// an explicit error text is treated as a connection problem.
    fn login_state(
        &self,
    ) -> impl Future<Output = Result<LoginState, PerformerError>> + Send;

    /// Logs in with the given password.
    fn login(
        &self,
        password: &str,
    ) -> impl Future<Output = Result<LoginState, PerformerError>> + Send;

    /// Logs in silently with whatever credential is stored.
    ///
    /// Implementations use an empty password when the backend reports
    /// that single sign-on is required or optional.
    fn login_with_stored_password(
        &self,
    ) -> impl Future<Output = Result<LoginState, PerformerError>> + Send;

    /// Returns `true` if the stored credentials changed since the last
    /// attempt. Cheap and local; never touches the backend.
    fn is_credentials_changed(&self) -> bool;

    /// Changes the password and reports the resulting login state.
    fn change_password(
        &self,
        old_password: &str,
        new_password: &str,
    ) -> impl Future<Output = Result<LoginState, PerformerError>> + Send;
}
