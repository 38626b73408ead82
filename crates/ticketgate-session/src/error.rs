//! Error types for the state machine layer.

use ticketgate_state::{ConnectionId, PerformerError};

/// Errors that escape a state machine operation.
///
/// Failed logins are NOT errors here; they come back as a
/// [`LoginState`](ticketgate_state::LoginState) and are cached. Only the
/// two things that must not be cached end up in this enum.
#[derive(Debug, thiserror::Error)]
pub enum LoginError {
    /// The operation was cancelled by the user or the environment.
    /// The cached state was left untouched.
    #[error("login cancelled")]
    Cancelled,

    /// The performer failed in a way that is neither a login outcome nor
    /// a cancellation. Fatal for this call only: the next call on the same
    /// connection starts from the unchanged cached state.
    #[error("unexpected login failure on {connection}: {source}")]
    Unexpected {
        connection: ConnectionId,
        #[source]
        source: PerformerError,
    },
}

impl LoginError {
    /// Lifts a performer error, keeping cancellation un-wrapped.
    pub(crate) fn from_performer(connection: &ConnectionId, error: PerformerError) -> Self {
        match error {
            PerformerError::Cancelled => Self::Cancelled,
            source => Self::Unexpected {
                connection: connection.clone(),
                source,
            },
        }
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled)
    }
}
