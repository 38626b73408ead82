//! Per-connection login decisions for ticketgate.
//!
//! This crate decides, for ONE connection at a time, whether a caller
//! can trust the cached login result or whether the backend has to be
//! asked again:
//!
//! 1. **Performing**: the backend calls themselves are someone else's
//!    job ([`LoginPerformer`] trait).
//! 2. **Deciding**: [`AttemptsStateMachine`] applies the blind-interval
//!    policy and serializes every attempt on its connection.
//! 3. **Reporting**: transitions to "logged in" go to a
//!    [`LoginStateListener`], either one by one or collected in a
//!    [`ReconnectBatch`].
//!
//! # How it fits in the stack
//!
//! ```text
//! Coordinator (above)  ← owns one state machine per connection
//!     ↕
//! State machine (this crate)  ← timing policy, caching, locking
//!     ↕
//! Values (below)  ← LoginState, ConnectionId
//! ```

#![allow(async_fn_in_trait)]

mod config;
mod error;
mod listener;
mod machine;
mod performer;

pub use config::{
    LoginConfig, CREDENTIALS_BLIND_INTERVAL, NETWORK_BLIND_INTERVAL,
    SUCCESS_BLIND_INTERVAL, TIME_TO_RELOGIN,
};
pub use error::LoginError;
pub use listener::{LoginStateListener, NoopListener, ReconnectBatch};
pub use machine::{AttemptsSnapshot, AttemptsStateMachine};
pub use performer::LoginPerformer;
