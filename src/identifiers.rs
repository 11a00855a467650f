//! Type-safe identifiers.
//!
//! Newtype wrappers keep correlation ids and listener ids from being mixed
//! up at compile time.
//!
//! | Type | Backing | Purpose |
//! |------|---------|---------|
//! | [`RequestId`] | UUID v4 | Request/response correlation |
//! | [`ListenerId`] | `u64` | Event listener registration |

// ============================================================================
// Imports
// ============================================================================

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

use serde::{Deserialize, Serialize};
use uuid::Uuid;

// ============================================================================
// RequestId
// ============================================================================

/// Correlation id linking a request frame to its response frame.
///
/// Ordinary calls use random v4 UUIDs, so ids are not reused across
/// reconnects. The nil UUID is reserved for the handshake request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RequestId(Uuid);

impl RequestId {
    /// Generates a fresh random request id.
    #[inline]
    #[must_use]
    pub fn generate() -> Self {
        Self(Uuid::new_v4())
    }

    /// Returns the reserved handshake id.
    #[inline]
    #[must_use]
    pub const fn handshake() -> Self {
        Self(Uuid::nil())
    }

    /// Returns `true` if this is the reserved handshake id.
    #[inline]
    #[must_use]
    pub fn is_handshake(&self) -> bool {
        self.0.is_nil()
    }

    /// Returns the underlying UUID.
    #[inline]
    #[must_use]
    pub const fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl fmt::Display for RequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<Uuid> for RequestId {
    fn from(uuid: Uuid) -> Self {
        Self(uuid)
    }
}

// ============================================================================
// ListenerId
// ============================================================================

static NEXT_LISTENER_ID: AtomicU64 = AtomicU64::new(1);

/// Identifier of a registered event listener.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ListenerId(u64);

impl ListenerId {
    /// Allocates the next listener id.
    #[inline]
    #[must_use]
    pub fn next() -> Self {
        Self(NEXT_LISTENER_ID.fetch_add(1, Ordering::Relaxed))
    }

    /// Returns the raw value.
    #[inline]
    #[must_use]
    pub const fn as_u64(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for ListenerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "listener-{}", self.0)
    }
}

// ============================================================================
// Tests
// ============================================================================
