//! Unified error type for the coordinator.

use ticketgate_session::LoginError;
use ticketgate_state::{ConnectionId, CredentialsProblem, LoginFailure, LoginState};

/// Why a check could not confirm that a connection is usable.
///
/// The first three variants come from a decided [`LoginState`]; the last
/// one wraps the state machine's own errors. The `#[from]` attribute
/// lets `?` convert a [`LoginError`] automatically.
#[derive(Debug, thiserror::Error)]
pub enum CheckError {
    /// The backend is unreachable or failed for a reason unrelated to
    /// the password.
    #[error("connection problem on {connection}: {message}")]
    Connection {
        connection: ConnectionId,
        message: String,
    },

    /// The backend rejected the credentials.
    #[error("{problem} on {connection}: {message}")]
    Credentials {
        connection: ConnectionId,
        message: String,
        problem: CredentialsProblem,
    },

    /// Not logged in, and nothing reported an error.
    #[error("authentication required for {0}")]
    AuthenticationRequired(ConnectionId),

    /// Cancelled, or the login performer failed unexpectedly.
    #[error(transparent)]
    Login(#[from] LoginError),
}

impl CheckError {
    /// Builds the error describing a failed state; `None` on success.
    pub(crate) fn from_state(connection: &ConnectionId, state: &LoginState) -> Option<Self> {
        let message = || state.error_message().unwrap_or_default().to_owned();
        Some(match state.failure()? {
            LoginFailure::AuthenticationRequired => {
                Self::AuthenticationRequired(connection.clone())
            }
            LoginFailure::Connection => Self::Connection {
                connection: connection.clone(),
                message: message(),
            },
            LoginFailure::Credentials(problem) => Self::Credentials {
                connection: connection.clone(),
                message: message(),
                problem,
            },
        })
    }

    /// Returns `true` if the user or the environment cancelled the check.
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Login(e) if e.is_cancelled())
    }

    /// The connection this error is about, when known.
    pub fn connection(&self) -> Option<&ConnectionId> {
        match self {
            Self::Connection { connection, .. }
            | Self::Credentials { connection, .. }
            | Self::AuthenticationRequired(connection) => Some(connection),
            Self::Login(LoginError::Unexpected { connection, .. }) => Some(connection),
            Self::Login(LoginError::Cancelled) => None,
        }
    }
}
