//! Side-channel notifications for the UI.

use tokio::sync::broadcast;

use crate::classify::{RejectKind, ReloginCause};
use crate::session::BackendId;

/// Something the UI may want to surface outside a request's result.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AccessEvent {
    /// A cached value was returned because a fresh fetch failed.
    StaleServed {
        backend: BackendId,
        call: String,
        captured_at_ms: u64,
        cause: RejectKind,
    },
    ReloginSucceeded { backend: BackendId },
    ReloginFailed { backend: BackendId, cause: ReloginCause },
    /// Stored credentials are wrong; only a manual sign-in can recover.
    SignInRequired { backend: BackendId },
}

/// Broadcast channel of [`AccessEvent`]s.
///
/// Publishing never fails; events sent while nobody listens are dropped.
#[derive(Debug, Clone)]
pub struct EventBus {
    tx: broadcast::Sender<AccessEvent>,
}

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<AccessEvent> {
        self.tx.subscribe()
    }

    pub fn publish(&self, event: AccessEvent) {
        tracing::debug!(?event, "Access event");
        let _ = self.tx.send(event);
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(64)
    }
}
