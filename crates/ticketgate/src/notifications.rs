//! Turns reconnections into one aggregated notification pass.

use std::sync::{Arc, PoisonError, RwLock};

use ticketgate_session::LoginStateListener;
use ticketgate_state::ConnectionId;
use tracing::info;

use crate::{DirtyScope, Notifier};

pub(crate) type SuccessfulLoginCallback = Arc<dyn Fn() + Send + Sync>;

/// The coordinator's listener, shared by every state machine it creates.
///
/// Per delivery (one connection, or a whole sweep's batch):
/// 1. the lazy "not logged in" banner is removed for each connection,
/// 2. `mark_everything_dirty` is called once,
/// 3. every successful-login callback is called once.
pub(crate) struct LoginNotifications {
    notifier: Arc<dyn Notifier>,
    dirty_scope: Arc<dyn DirtyScope>,
    callbacks: RwLock<Vec<SuccessfulLoginCallback>>,
}

impl LoginNotifications {
    pub(crate) fn new(notifier: Arc<dyn Notifier>, dirty_scope: Arc<dyn DirtyScope>) -> Self {
        Self {
            notifier,
            dirty_scope,
            callbacks: RwLock::new(Vec::new()),
        }
    }

    pub(crate) fn notifier(&self) -> &dyn Notifier {
        self.notifier.as_ref()
    }

    pub(crate) fn add_callback(&self, callback: SuccessfulLoginCallback) {
        self.callbacks
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .push(callback);
    }
}

impl LoginStateListener for LoginNotifications {
    fn reconnected(&self, connections: &[ConnectionId]) {
        if connections.is_empty() {
            return;
        }
        info!(count = connections.len(), "connections logged in");

        for connection in connections {
            self.notifier.remove_lazy_notification(connection);
        }
        self.dirty_scope.mark_everything_dirty();

        // Copy out so callbacks may register more callbacks.
        let callbacks = self
            .callbacks
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();
        for callback in callbacks {
            callback();
        }
    }
}
