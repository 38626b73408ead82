//! Turning backend text into structured login information.
//!
//! Two jobs live here:
//!
//! 1. Parsing the ticket-status line a backend prints for a logged-in
//!    user (`User bob ticket expires in 2 hours 15 minutes.`) into a
//!    remaining lifetime.
//! 2. Classifying a failure diagnostic so the coordinator can pick the
//!    right remedy: report a network problem, prompt for a new password,
//!    or offer a password update.

use std::fmt;
use std::sync::LazyLock;
use std::time::Duration;

use regex::Regex;

use crate::LoginState;

/// Matches `ticket expires in [<N> hours] <M> minutes`.
///
/// The hour part is optional; singular units (`1 hour 1 minute`) are
/// accepted too.
static TICKET_EXPIRY: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"ticket expires in\s+(?:(\d+)\s+hours?\s+)?(\d+)\s+minutes?")
        .expect("ticket expiry pattern is valid")
});

const EXPIRED_MARKERS: &[&str] = &["password has expired", "password expired"];
const INVALID_MARKERS: &[&str] = &["password invalid", "(p4passwd) invalid"];

impl LoginState {
    /// Parses the status text printed for a logged-in user.
    ///
    /// The caller has already established that the user IS logged in; this
    /// only extracts how long the ticket has left. Text that doesn't match
    /// the expected shape still means "logged in", just with an unknown
    /// lifetime:
    ///
    /// ```rust
    /// use std::time::Duration;
    /// use ticketgate_state::LoginState;
    ///
    /// let state = LoginState::from_ticket_status("User bob ticket expires in 45 minutes.");
    /// assert_eq!(state.time_left(), Some(Duration::from_secs(45 * 60)));
    ///
    /// let state = LoginState::from_ticket_status("User bob was authenticated by password.");
    /// assert_eq!(state, LoginState::SUCCESS);
    /// ```
    pub fn from_ticket_status(text: &str) -> Self {
        let Some(caps) = TICKET_EXPIRY.captures(text) else {
            return Self::SUCCESS;
        };
        let hours = match caps.get(1).map(|m| m.as_str().parse::<u64>()) {
            Some(Ok(hours)) => hours,
            Some(Err(_)) => return Self::SUCCESS,
            None => 0,
        };
        let Some(Ok(minutes)) = caps.get(2).map(|m| m.as_str().parse::<u64>()) else {
            return Self::SUCCESS;
        };
        let total_minutes = hours.saturating_mul(60).saturating_add(minutes);
        Self::logged_in(Some(Duration::from_secs(total_minutes.saturating_mul(60))))
    }

    /// Classifies why this state is not logged in.
    ///
    /// Returns `None` for a successful state.
    pub fn failure(&self) -> Option<LoginFailure> {
        if self.is_success() {
            return None;
        }
        Some(match self.error_message() {
            Some(text) => classify_error(text),
            None => LoginFailure::AuthenticationRequired,
        })
    }
}

// ---------------------------------------------------------------------------
// Failure classification
// ---------------------------------------------------------------------------

/// The specific credentials problem behind a rejected login.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CredentialsProblem {
    /// The password is correct but has expired; the remedy is a password
    /// change, not a retry.
    PasswordExpired,
    /// The backend rejected the password.
    PasswordInvalid,
}

/// Why a connection is not logged in.
///
/// ```text
///   error text?  ── no ──→ AuthenticationRequired
///        │
///       yes ── password marker? ── yes ──→ Credentials(problem)
///                    │
///                    no ──→ Connection
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoginFailure {
    /// Not logged in and nothing went wrong; the user needs to log in.
    AuthenticationRequired,
    /// The backend could not be reached or answered with an error that
    /// has nothing to do with the password.
    Connection,
    /// The backend explicitly rejected the credentials.
    Credentials(CredentialsProblem),
}

impl LoginFailure {
    pub fn is_connection(&self) -> bool {
        matches!(self, Self::Connection)
    }
}

impl fmt::Display for LoginFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::AuthenticationRequired => f.write_str("authentication required"),
            Self::Connection => f.write_str("connection problem"),
            Self::Credentials(problem) => fmt::Display::fmt(problem, f),
        }
    }
}

impl fmt::Display for CredentialsProblem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::PasswordExpired => f.write_str("password expired"),
            Self::PasswordInvalid => f.write_str("password invalid"),
        }
    }
}

/// Classifies a backend diagnostic.
///
/// Markers are matched case-insensitively. An expired password wins over
/// an invalid one, since backends often print both lines.
pub fn classify_error(text: &str) -> LoginFailure {
    let lower = text.to_lowercase();
    if EXPIRED_MARKERS.iter().any(|m| lower.contains(m)) {
        LoginFailure::Credentials(CredentialsProblem::PasswordExpired)
    } else if INVALID_MARKERS.iter().any(|m| lower.contains(m)) {
        LoginFailure::Credentials(CredentialsProblem::PasswordInvalid)
    } else {
        LoginFailure::Connection
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn minutes(m: u64) -> Option<Duration> {
        Some(Duration::from_secs(m * 60))
    }

    // =====================================================================
    // from_ticket_status()
    // =====================================================================

    #[test]
    fn test_from_ticket_status_hours_and_minutes() {
        let state =
            LoginState::from_ticket_status("User bob ticket expires in 2 hours 15 minutes.");
        assert!(state.is_success());
        assert_eq!(state.time_left(), minutes(2 * 60 + 15));
        assert_eq!(
            state.time_left().map(|d| d.as_millis()),
            Some((2 * 60 + 15) * 60 * 1000)
        );
    }

    #[test]
    fn test_from_ticket_status_minutes_only() {
        let state = LoginState::from_ticket_status("User bob ticket expires in 45 minutes.");
        assert_eq!(state.time_left(), minutes(45));
    }

    #[test]
    fn test_from_ticket_status_singular_units() {
        let state =
            LoginState::from_ticket_status("User bob ticket expires in 1 hour 1 minute.");
        assert_eq!(state.time_left(), minutes(61));
    }

    #[test]
    fn test_from_ticket_status_trailing_output_ignored() {
        let text = "User alice ticket expires in 11 hours 59 minutes.\nextra line";
        assert_eq!(LoginState::from_ticket_status(text).time_left(), minutes(719));
    }

    #[test]
    fn test_from_ticket_status_malformed_is_success_with_unknown_lifetime() {
        for text in [
            "",
            "User bob ticket expires soon.",
            "User bob was authenticated by password not ticket.",
            "User bob ticket expires in many minutes.",
        ] {
            let state = LoginState::from_ticket_status(text);
            assert_eq!(state, LoginState::SUCCESS, "text: {text:?}");
        }
    }

    #[test]
    fn test_from_ticket_status_overflowing_hours_is_unknown() {
        let text = "User bob ticket expires in 999999999999999999999999 hours 5 minutes.";
        assert_eq!(LoginState::from_ticket_status(text), LoginState::SUCCESS);
    }

    // =====================================================================
    // classify_error() / failure()
    // =====================================================================

    #[test]
    fn test_classify_password_expired() {
        assert_eq!(
            classify_error("Your password has expired, please change it."),
            LoginFailure::Credentials(CredentialsProblem::PasswordExpired)
        );
    }

    #[test]
    fn test_classify_password_invalid() {
        assert_eq!(
            classify_error("Password invalid."),
            LoginFailure::Credentials(CredentialsProblem::PasswordInvalid)
        );
        assert_eq!(
            classify_error("Perforce password (P4PASSWD) invalid or unset."),
            LoginFailure::Credentials(CredentialsProblem::PasswordInvalid)
        );
    }

    #[test]
    fn test_classify_expired_wins_over_invalid() {
        assert_eq!(
            classify_error("Password invalid.\nPassword has expired."),
            LoginFailure::Credentials(CredentialsProblem::PasswordExpired)
        );
    }

    #[test]
    fn test_classify_other_text_is_connection() {
        assert_eq!(
            classify_error("Connect to server failed; check $P4PORT."),
            LoginFailure::Connection
        );
        assert!(classify_error("TCP connect to p4:1666 failed.").is_connection());
    }

    #[test]
    fn test_failure_display() {
        assert_eq!(LoginFailure::Connection.to_string(), "connection problem");
        assert_eq!(
            LoginFailure::Credentials(CredentialsProblem::PasswordExpired).to_string(),
            "password expired"
        );
    }

    #[test]
    fn test_failure_of_states() {
        assert_eq!(LoginState::SUCCESS.failure(), None);
        assert_eq!(
            LoginState::logged_out().failure(),
            Some(LoginFailure::AuthenticationRequired)
        );
        assert_eq!(
            LoginState::error("Password invalid.").failure(),
            Some(LoginFailure::Credentials(CredentialsProblem::PasswordInvalid))
        );
        assert_eq!(
            LoginState::error("timed out").failure(),
            Some(LoginFailure::Connection)
        );
    }
}
