//! Core value types: connection identity and login outcomes.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Identity
// ---------------------------------------------------------------------------

/// Identifies one backend endpoint / working-directory pair.
///
/// This is the unit of independent state: every connection gets its own
/// state machine, and operations on different connections never block
/// each other.
///
/// The inner string is reference counted, so cloning a `ConnectionId`
/// (which the registry and batches do a lot) is just a pointer bump.
///
/// `#[serde(transparent)]` serializes it as the bare string.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ConnectionId(Arc<str>);

impl ConnectionId {
    /// Creates an id from any string.
    pub fn new(id: impl AsRef<str>) -> Self {
        Self(Arc::from(id.as_ref()))
    }

    /// Builds the `server@root` form used for a server address paired
    /// with a local working directory.
    pub fn for_workspace(server: &str, root: &str) -> Self {
        Self::new(format!("{server}@{root}"))
    }

    /// Returns the id as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ConnectionId {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

impl From<String> for ConnectionId {
    fn from(id: String) -> Self {
        Self(Arc::from(id))
    }
}

// ---------------------------------------------------------------------------
// LoginState
// ---------------------------------------------------------------------------

/// Outcome of one authentication probe or attempt.
///
/// Immutable. The fields are private so the constructors can enforce the
/// one invariant: a successful state never carries an error.
///
/// | constructor | success | time_left | error |
/// |---|---|---|---|
/// | [`SUCCESS`](Self::SUCCESS) | `true` | `None` | `None` |
/// | [`logged_in`](Self::logged_in) | `true` | given | `None` |
/// | [`logged_out`](Self::logged_out) | `false` | `None` | `None` |
/// | [`error`](Self::error) | `false` | `None` | given |
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoginState {
    success: bool,
    time_left: Option<Duration>,
    error: Option<String>,
}

impl LoginState {
    /// Logged in, remaining ticket lifetime unknown.
    pub const SUCCESS: LoginState = LoginState {
        success: true,
        time_left: None,
        error: None,
    };

    /// Logged in with an optionally known remaining ticket lifetime.
    pub fn logged_in(time_left: Option<Duration>) -> Self {
        Self {
            success: true,
            time_left,
            error: None,
        }
    }

    /// Not logged in, and the backend gave no diagnostic.
    ///
    /// This is the "authentication required" shape: nothing is broken,
    /// the user simply has no valid ticket.
    pub fn logged_out() -> Self {
        Self {
            success: false,
            time_left: None,
            error: None,
        }
    }

    /// Not logged in, with the backend's diagnostic text.
    pub fn error(message: impl Into<String>) -> Self {
        Self {
            success: false,
            time_left: None,
            error: Some(message.into()),
        }
    }

    /// Builds a failed state from an optional diagnostic.
    pub fn failed(error: Option<String>) -> Self {
        Self {
            success: false,
            time_left: None,
            error,
        }
    }

    pub fn is_success(&self) -> bool {
        self.success
    }

    /// Remaining ticket lifetime, `None` when unknown or not applicable.
    pub fn time_left(&self) -> Option<Duration> {
        self.time_left
    }

    pub fn error_message(&self) -> Option<&str> {
        self.error.as_deref()
    }
}

impl Default for LoginState {
    fn default() -> Self {
        Self::logged_out()
    }
}

impl fmt::Display for LoginState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (self.success, self.time_left, &self.error) {
            (true, Some(left), _) => {
                write!(f, "logged in ({} min left)", left.as_secs() / 60)
            }
            (true, None, _) => f.write_str("logged in"),
            (false, _, Some(error)) => write!(f, "not logged in: {error}"),
            (false, _, None) => f.write_str("not logged in"),
        }
    }
}
