//! Value types shared by every ticketgate layer.
//!
//! This crate knows nothing about locking, timing, or notifications. It
//! only describes what one authentication probe or attempt produced:
//!
//! - **Types** ([`ConnectionId`], [`LoginState`]): the unit of
//!   independent state and the outcome of one probe/attempt.
//! - **Status parsing** ([`LoginState::from_ticket_status`],
//!   [`classify_error`]): turning backend text into structured values.
//! - **Errors** ([`PerformerError`]): what a login performer may raise
//!   besides an ordinary failed [`LoginState`].
//!
//! # Architecture
//!
//! ```text
//! Coordinator (ticketgate) → State machine (ticketgate-session) → Values (this crate)
//! ```

mod error;
mod status;
mod types;

pub use error::PerformerError;
pub use status::{classify_error, CredentialsProblem, LoginFailure};
pub use types::{ConnectionId, LoginState};
