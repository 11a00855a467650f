//! Event fan-out.
//!
//! Delivers each inbound event frame to every registered listener, in
//! registration order. Delivery works on a snapshot taken when the frame
//! arrives: a listener added during delivery first sees the next frame, and
//! a listener removed during delivery still receives the current one.
//! Neither case affects the other listeners.
//!
//! A panicking listener is logged and skipped; the remaining listeners
//! still receive the frame and the connection keeps running.

// ============================================================================
// Imports
// ============================================================================

use std::fmt;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};

use parking_lot::RwLock;
use tracing::{error, trace};

use crate::identifiers::ListenerId;
use crate::protocol::EventFrame;

// ============================================================================
// Types
// ============================================================================

/// Event listener callback.
pub type Listener = Arc<dyn Fn(&EventFrame) + Send + Sync>;

// ============================================================================
// EventFanout
// ============================================================================

/// Registry of event listeners.
#[derive(Default)]
pub struct EventFanout {
    listeners: RwLock<Vec<(ListenerId, Listener)>>,
}

impl fmt::Debug for EventFanout {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventFanout")
            .field("listeners", &self.len())
            .finish()
    }
}

impl EventFanout {
    /// Creates an empty registry.
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a listener and returns its id.
    pub fn add(&self, listener: Listener) -> ListenerId {
        let id = ListenerId::next();
        self.listeners.write().push((id, listener));
        trace!(listener_id = %id, "Listener added");
        id
    }

    /// Removes a listener. Returns `false` if it was not registered.
    pub fn remove(&self, id: ListenerId) -> bool {
        let mut listeners = self.listeners.write();
        let before = listeners.len();
        listeners.retain(|(existing, _)| *existing != id);
        let removed = listeners.len() != before;
        if removed {
            trace!(listener_id = %id, "Listener removed");
        }
        removed
    }

    /// Returns the number of registered listeners.
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.listeners.read().len()
    }

    /// Returns `true` if no listener is registered.
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.listeners.read().is_empty()
    }

    /// Delivers `event` to every listener registered right now.
    ///
    /// Returns the number of listeners that returned normally.
    pub fn emit(&self, event: &EventFrame) -> usize {
        // The lock is released before any listener runs, so listeners may
        // subscribe or unsubscribe freely.
        let snapshot: Vec<(ListenerId, Listener)> = self.listeners.read().clone();

        let mut delivered = 0;
        for (id, listener) in snapshot {
            match catch_unwind(AssertUnwindSafe(|| listener(event))) {
                Ok(()) => delivered += 1,
                Err(panic) => {
                    error!(
                        listener_id = %id,
                        event = %event.event,
                        panic = panic_message(panic.as_ref()),
                        "Event listener panicked"
                    );
                }
            }
        }
        delivered
    }
}

fn panic_message(panic: &(dyn std::any::Any + Send)) -> &str {
    if let Some(message) = panic.downcast_ref::<&str>() {
        message
    } else if let Some(message) = panic.downcast_ref::<String>() {
        message.as_str()
    } else {
        "<non-string panic>"
    }
}

// ============================================================================
// Subscription
// ============================================================================

/// Handle returned by `subscribe`.
///
/// Dropping the handle keeps the listener registered; call
/// [`Subscription::unsubscribe`] to remove it.
#[must_use = "the listener stays registered until unsubscribe() is called"]
pub struct Subscription {
    id: ListenerId,
    fanout: Weak<EventFanout>,
    active: AtomicBool,
}

impl Subscription {
    pub(crate) fn new(id: ListenerId, fanout: &Arc<EventFanout>) -> Self {
        Self {
            id,
            fanout: Arc::downgrade(fanout),
            active: AtomicBool::new(true),
        }
    }

    /// Returns the listener id.
    #[inline]
    #[must_use]
    pub fn id(&self) -> ListenerId {
        self.id
    }

    /// Returns `true` until [`Subscription::unsubscribe`] is called.
    #[inline]
    #[must_use]
    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::Acquire)
    }

    /// Removes the listener. Calling this more than once is harmless.
    pub fn unsubscribe(&self) {
        if self.active.swap(false, Ordering::AcqRel)
            && let Some(fanout) = self.fanout.upgrade()
        {
            fanout.remove(self.id);
        }
    }
}

impl fmt::Debug for Subscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscription")
            .field("id", &self.id)
            .field("active", &self.is_active())
            .finish()
    }
}

// ============================================================================
// Tests
// ============================================================================
