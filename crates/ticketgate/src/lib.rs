//! # ticketgate
//!
//! Keeps a set of independent backend connections logged in to a
//! ticket-based authentication service, without login storms.
//!
//! Callers ask [`LoginManager`] "may I proceed on this connection?". The
//! manager keeps one [`AttemptsStateMachine`] per connection, which
//! decides whether the cached answer is still good, and turns failures
//! into either an error or an interactive repair flow.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use ticketgate::prelude::*;
//!
//! # async fn run<F: PerformerFactory, S: Settings>(factory: F, settings: S) -> Result<(), CheckError> {
//! let manager = LoginManagerBuilder::new()
//!     .config(LoginConfig::default())
//!     .build(factory, settings);
//! let _sweep = manager.spawn_refresh_task();
//!
//! let connection = ConnectionId::for_workspace("ssl:perforce:1666", "/home/bob/ws");
//! if !manager.check(&connection, false).await? {
//!     manager.check_and_repair(&connection).await?;
//! }
//! # Ok(())
//! # }
//! ```

mod collaborators;
mod error;
mod manager;
mod notifications;
mod refresh;
mod repair;

pub use collaborators::{
    DirtyScope, NoopDirtyScope, Notifier, PerformerFactory, Settings, SilentNotifier,
};
pub use error::CheckError;
pub use manager::{LoginManager, LoginManagerBuilder};
pub use ticketgate_session::{
    AttemptsSnapshot, AttemptsStateMachine, LoginConfig, LoginError, LoginPerformer,
    LoginStateListener, ReconnectBatch,
};
pub use ticketgate_state::{
    classify_error, ConnectionId, CredentialsProblem, LoginFailure, LoginState,
    PerformerError,
};

/// Everything needed to wire up a coordinator.
pub mod prelude {
    pub use crate::{
        CheckError, ConnectionId, DirtyScope, LoginConfig, LoginError, LoginManager,
        LoginManagerBuilder, LoginPerformer, LoginState, Notifier, PerformerError,
        PerformerFactory, Settings,
    };
}
