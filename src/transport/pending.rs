//! Pending-request table.
//!
//! Maps correlation ids to the one-shot channel that settles the caller's
//! future. Every entry is removed exactly once: by a matching response, by
//! the caller's timeout, by a failed write, or by [`PendingTable::drain`]
//! when the connection closes. Whoever removes the entry owns the right to
//! settle it, so a call can never settle twice.

// ============================================================================
// Imports
// ============================================================================

use std::time::Instant;

use rustc_hash::FxHashMap;
use serde_json::Value;
use tokio::sync::oneshot;
use tracing::{debug, trace};

use crate::error::{Error, Result};
use crate::identifiers::RequestId;
use crate::protocol::ResponseFrame;

// ============================================================================
// Types
// ============================================================================

/// Sending half that settles one call.
pub type Responder = oneshot::Sender<Result<Value>>;

/// One outstanding request.
#[derive(Debug)]
struct PendingEntry {
    /// Method name, kept for logging.
    method: String,
    /// Settles the caller.
    responder: Responder,
    /// When the request was registered.
    registered_at: Instant,
}

// ============================================================================
// PendingTable
// ============================================================================

/// Outstanding requests keyed by correlation id.
///
/// Not synchronised on its own; the connection manager keeps it behind the
/// same mutex as the lifecycle phase.
#[derive(Debug)]
pub struct PendingTable {
    entries: FxHashMap<RequestId, PendingEntry>,
    limit: usize,
}

impl PendingTable {
    /// Creates an empty table admitting at most `limit` ordinary requests.
    #[must_use]
    pub fn new(limit: usize) -> Self {
        Self {
            entries: FxHashMap::default(),
            limit,
        }
    }

    /// Registers an ordinary request.
    ///
    /// # Errors
    ///
    /// - [`Error::TooManyPendingRequests`] if the table is full
    /// - [`Error::Protocol`] if `id` is already registered
    pub fn insert(
        &mut self,
        id: RequestId,
        method: impl Into<String>,
        responder: Responder,
    ) -> Result<()> {
        let ordinary = self.len() - usize::from(self.contains(&RequestId::handshake()));
        if ordinary >= self.limit {
            return Err(Error::TooManyPendingRequests { limit: self.limit });
        }

        self.register(id, method.into(), responder)
    }

    /// Registers the handshake request under the reserved id.
    ///
    /// The handshake does not count towards the request limit.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Protocol`] if a handshake is already outstanding.
    pub fn insert_handshake(&mut self, responder: Responder) -> Result<()> {
        self.register(
            RequestId::handshake(),
            crate::protocol::HANDSHAKE_METHOD.to_string(),
            responder,
        )
    }

    fn register(&mut self, id: RequestId, method: String, responder: Responder) -> Result<()> {
        if self.entries.contains_key(&id) {
            return Err(Error::protocol(format!("duplicate request id {id}")));
        }

        trace!(request_id = %id, %method, "Registered pending request");
        self.entries.insert(
            id,
            PendingEntry {
                method,
                responder,
                registered_at: Instant::now(),
            },
        );
        Ok(())
    }

    /// Settles the entry matching `response.id`.
    ///
    /// Returns `false` if no entry matched; the response is dropped.
    pub fn resolve(&mut self, response: ResponseFrame) -> bool {
        let Some(entry) = self.entries.remove(&response.id) else {
            return false;
        };

        trace!(
            request_id = %response.id,
            method = %entry.method,
            ok = response.ok,
            elapsed_ms = entry.registered_at.elapsed().as_millis() as u64,
            "Resolved pending request"
        );
        let _ = entry.responder.send(response.into_result());
        true
    }

    /// Settles the entry for `id` with `error`.
    ///
    /// Returns `false` if the entry was already gone.
    pub fn fail(&mut self, id: &RequestId, error: Error) -> bool {
        match self.entries.remove(id) {
            Some(entry) => {
                let _ = entry.responder.send(Err(error));
                true
            }
            None => false,
        }
    }

    /// Removes the entry for `id` without settling it.
    ///
    /// Used by a caller whose own timeout fired.
    pub fn remove(&mut self, id: &RequestId) -> Option<Responder> {
        self.entries.remove(id).map(|entry| entry.responder)
    }

    /// Removes every entry, returning their responders.
    ///
    /// The table is empty once this returns; callers settle the responders
    /// after releasing their lock.
    pub fn drain(&mut self) -> Vec<Responder> {
        let drained: Vec<_> = self.entries.drain().map(|(_, e)| e.responder).collect();
        if !drained.is_empty() {
            debug!(count = drained.len(), "Drained pending requests");
        }
        drained
    }

    /// Returns `true` if `id` is outstanding.
    #[inline]
    #[must_use]
    pub fn contains(&self, id: &RequestId) -> bool {
        self.entries.contains_key(id)
    }

    /// Returns the number of outstanding entries, handshake included.
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns `true` if nothing is outstanding.
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Rejects every responder with [`Error::ConnectionClosed`].
pub fn reject_closed(responders: Vec<Responder>) {
    for responder in responders {
        let _ = responder.send(Err(Error::ConnectionClosed));
    }
}

// ============================================================================
// Tests
// ============================================================================
