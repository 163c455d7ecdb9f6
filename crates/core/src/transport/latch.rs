//! Fire-once disconnection latch
//!
//! The receiver, the monitor, and the coordinator can each observe the
//! same underlying fault; only the first observation wins. Later fires are
//! no-ops, so teardown and the status transition happen exactly once.

use std::sync::atomic::{AtomicBool, Ordering};

use tokio::sync::watch;

/// Deduplicated disconnection signal shared by the transport tasks
pub struct DisconnectLatch {
    fired: AtomicBool,
    tx: watch::Sender<Option<String>>,
}

impl Default for DisconnectLatch {
    fn default() -> Self {
        Self::new()
    }
}

impl DisconnectLatch {
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(None);
        Self {
            fired: AtomicBool::new(false),
            tx,
        }
    }

    /// Fire with a human-readable reason. Returns true only for the first
    /// caller; the reason of later calls is discarded.
    pub fn fire(&self, reason: impl Into<String>) -> bool {
        if self.fired.swap(true, Ordering::SeqCst) {
            return false;
        }
        let _ = self.tx.send(Some(reason.into()));
        true
    }

    pub fn is_fired(&self) -> bool {
        self.fired.load(Ordering::SeqCst)
    }

    /// Reason recorded by the winning observer.
    pub fn reason(&self) -> Option<String> {
        self.tx.borrow().clone()
    }

    /// Subscribe for the wind-down notification.
    pub fn subscribe(&self) -> watch::Receiver<Option<String>> {
        self.tx.subscribe()
    }
}
