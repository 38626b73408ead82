//! Reconnect notifications, one at a time or batched.
//!
//! When a connection goes from "not logged in" to "logged in", the
//! outside world usually wants to react (refresh views, drop a banner).
//! During a sweep over many connections, reacting once per connection
//! would cause a notification storm, so the sweep passes a
//! [`ReconnectBatch`] into each call instead and flushes it once at the
//! end.

use std::sync::{Mutex, PoisonError};

use ticketgate_state::ConnectionId;

/// Receives "became logged in" events.
///
/// Always called after the connection's state lock has been released, so
/// implementations may call back into the state machine or coordinator.
pub trait LoginStateListener: Send + Sync + 'static {
    /// One or more connections transitioned to logged in.
    ///
    /// Never called with an empty slice.
    fn reconnected(&self, connections: &[ConnectionId]);
}

/// A listener that ignores everything.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopListener;

impl LoginStateListener for NoopListener {
    fn reconnected(&self, _connections: &[ConnectionId]) {}
}

/// Collects reconnected connections during a sweep.
///
/// Shared by reference between the concurrent per-connection calls of one
/// sweep, hence the interior mutex. It is only held for a `push`.
#[derive(Debug, Default)]
pub struct ReconnectBatch {
    reconnected: Mutex<Vec<ConnectionId>>,
}

impl ReconnectBatch {
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn push(&self, connection: ConnectionId) {
        self.reconnected
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(connection);
    }

    /// Number of reconnections collected so far.
    pub fn len(&self) -> usize {
        self.reconnected
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Ends the batch: delivers every collected reconnection in one call.
    ///
    /// Does nothing when no connection reconnected. Returns the delivered
    /// connections.
    pub fn flush(self, listener: &dyn LoginStateListener) -> Vec<ConnectionId> {
        let reconnected = self
            .reconnected
            .into_inner()
            .unwrap_or_else(PoisonError::into_inner);
        if !reconnected.is_empty() {
            listener.reconnected(&reconnected);
        }
        reconnected
    }
}
