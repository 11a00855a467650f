//! Observable connection status.
//!
//! The facade owns one `watch` channel of [`ClientStatus`]. Each connection
//! manager publishes into it through a [`StatusPublisher`] stamped with the
//! manager's epoch; once the facade replaces the manager, the retired
//! manager's updates are discarded.

// ============================================================================
// Imports
// ============================================================================

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use tokio::sync::watch;

use crate::error::Error;
use crate::protocol::HelloPayload;
use crate::transport::Phase;

// ============================================================================
// ClientStatus
// ============================================================================

/// Snapshot of the client's connection state.
#[derive(Debug, Clone, Default)]
pub struct ClientStatus {
    /// Lifecycle phase of the current connection.
    pub phase: Phase,
    /// `true` once the handshake succeeded, until the connection closes.
    pub connected: bool,
    /// `true` while opening the transport or handshaking.
    pub connecting: bool,
    /// Most recent connection or handshake failure. Cleared by a successful
    /// handshake.
    pub last_error: Option<Arc<Error>>,
    /// Payload of the most recent successful handshake.
    pub hello: Option<HelloPayload>,
    /// Consecutive failed attempts since the last successful handshake.
    pub reconnect_attempts: u32,
}

// ============================================================================
// StatusPublisher
// ============================================================================

/// Epoch-guarded writer into the facade's status channel.
#[derive(Debug, Clone)]
pub(crate) struct StatusPublisher {
    tx: Arc<watch::Sender<ClientStatus>>,
    epoch: u64,
    current_epoch: Arc<AtomicU64>,
}

impl StatusPublisher {
    pub(crate) fn new(
        tx: Arc<watch::Sender<ClientStatus>>,
        epoch: u64,
        current_epoch: Arc<AtomicU64>,
    ) -> Self {
        Self {
            tx,
            epoch,
            current_epoch,
        }
    }

    /// Applies `update` unless this publisher's manager has been retired.
    pub(crate) fn publish(&self, update: impl FnOnce(&mut ClientStatus)) {
        self.tx.send_if_modified(|status| {
            if self.current_epoch.load(Ordering::Acquire) != self.epoch {
                return false;
            }
            update(status);
            true
        });
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_current_epoch_publishes() {
        let (tx, rx) = watch::channel(ClientStatus::default());
        let epoch = Arc::new(AtomicU64::new(1));
        let publisher = StatusPublisher::new(Arc::new(tx), 1, Arc::clone(&epoch));

        publisher.publish(|s| s.connected = true);
        assert!(rx.borrow().connected);
    }

    #[test]
    fn test_retired_epoch_is_ignored() {
        let (tx, rx) = watch::channel(ClientStatus::default());
        let epoch = Arc::new(AtomicU64::new(1));
        let publisher = StatusPublisher::new(Arc::new(tx), 1, Arc::clone(&epoch));

        epoch.store(2, Ordering::Release);
        publisher.publish(|s| s.connected = true);
        assert!(!rx.borrow().connected);
        assert!(!rx.has_changed().expect("sender alive"));
    }
}
