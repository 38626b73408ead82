//! The narrow interfaces the coordinator depends on.
//!
//! Everything outside the login decision itself is someone else's job:
//! creating performers, storing credentials, prompting the user, showing
//! banners, refreshing views. The coordinator only talks to these traits.
//!
//! `PerformerFactory` and `Settings` are used as generics because their
//! methods are async; the fire-and-forget `Notifier` and `DirtyScope` are
//! used as trait objects.

use std::future::Future;

use ticketgate_session::{AttemptsStateMachine, LoginPerformer};
use ticketgate_state::ConnectionId;

/// Creates the login performer for a connection seen for the first time.
///
/// Any `Fn(&ConnectionId) -> P` closure is a factory:
///
/// ```rust,ignore
/// let manager = LoginManagerBuilder::new().build(|c: &ConnectionId| P4Performer::new(c), settings);
/// ```
pub trait PerformerFactory: Send + Sync + 'static {
    type Performer: LoginPerformer;

    fn create(&self, connection: &ConnectionId) -> Self::Performer;
}

impl<F, P> PerformerFactory for F
where
    F: Fn(&ConnectionId) -> P + Send + Sync + 'static,
    P: LoginPerformer,
{
    type Performer = P;

    fn create(&self, connection: &ConnectionId) -> P {
        self(connection)
    }
}

/// Policy flags, stored credentials, and interactive prompts.
///
/// Read on every call, never cached, so a settings change takes effect
/// on the next check.
pub trait Settings: Send + Sync + 'static {
    /// Whether login checking is enabled at all. When `false`, every
    /// check reports "not usable" without touching the backend.
    fn enabled(&self) -> bool;

    /// Whether the backend uses ticket login. When `false`, every check
    /// reports "usable" without touching the backend.
    fn use_login(&self) -> bool;

    /// The last password the user saved, if any.
    fn stored_password(&self) -> Option<String>;

    /// Asks the user for a password. `None` means the user cancelled.
    fn request_password(
        &self,
        connection: &ConnectionId,
    ) -> impl Future<Output = Option<String>> + Send;

    /// Walks the user through a password update, typically by calling
    /// [`AttemptsStateMachine::change_password`]. Returns `true` when the
    /// connection is logged in afterwards.
    fn request_password_update<P: LoginPerformer>(
        &self,
        machine: &AttemptsStateMachine<P>,
    ) -> impl Future<Output = bool> + Send;
}

/// User-facing banners. Every method is fire-and-forget.
///
/// All methods default to doing nothing, so an implementation only
/// overrides what its UI supports.
pub trait Notifier: Send + Sync + 'static {
    /// Shows (once) the lazy "not logged in" banner for a connection.
    fn ensure_notify(&self, _connection: &ConnectionId) {}

    /// Drops the lazy banner after the connection logged in.
    fn remove_lazy_notification(&self, _connection: &ConnectionId) {}

    /// Feedback after a password typed into a prompt was tried.
    fn show_password_was_ok(&self, _ok: bool) {}

    /// Non-modal warning for a connection problem, offering to inspect
    /// the diagnostics or to retry.
    fn report_connection_error(&self, _connection: &ConnectionId, _message: &str) {}
}

/// A notifier that shows nothing.
#[derive(Debug, Default, Clone, Copy)]
pub struct SilentNotifier;

impl Notifier for SilentNotifier {}

/// Invalidates cached views once connections come back online.
pub trait DirtyScope: Send + Sync + 'static {
    fn mark_everything_dirty(&self);
}

#[derive(Debug, Default, Clone, Copy)]
pub struct NoopDirtyScope;

impl DirtyScope for NoopDirtyScope {
    fn mark_everything_dirty(&self) {}
}
