//! Error types raised by login performers.
//!
//! A failed login is NOT an error at this level; it is an ordinary
//! [`LoginState`](crate::LoginState) with `success == false`. The variants
//! here are the two things that must escape the state machine instead of
//! being recorded as a login outcome.

/// Errors a login performer may return instead of a login state.
#[derive(Debug, thiserror::Error)]
pub enum PerformerError {
    /// The user or the environment cancelled the operation.
    ///
    /// Never logged as an error and never retried. Callers propagate it
    /// unchanged.
    #[error("operation cancelled")]
    Cancelled,

    /// Anything else that went wrong while talking to the backend
    /// (process spawn failure, unreadable output, ...).
    #[error("backend failure: {0}")]
    Backend(#[source] Box<dyn std::error::Error + Send + Sync>),
}

impl PerformerError {
    /// Wraps any error (or plain message) as a [`PerformerError::Backend`].
    ///
    /// `&str` and `String` both convert into a boxed error, so
    /// `PerformerError::backend("p4 not found")` works.
    pub fn backend(
        error: impl Into<Box<dyn std::error::Error + Send + Sync>>,
    ) -> Self {
        Self::Backend(error.into())
    }

    /// Returns `true` for [`PerformerError::Cancelled`].
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled)
    }
}
