//! Connection lifecycle states.
//!
//! ```text
//!   Idle ──► Connecting ──► Handshaking ──► Ready
//!    ▲           │               │            │
//!    │           ▼               ▼            ▼
//!    └──────────────────────── Closing ◄──────┘
//! ```
//!
//! A failed transport open goes straight back to `Idle`. Every other exit
//! passes through `Closing`, where the pending table is drained.

// ============================================================================
// Imports
// ============================================================================

use std::fmt;

// ============================================================================
// Phase
// ============================================================================

/// Lifecycle state of one connection attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Phase {
    /// No transport.
    #[default]
    Idle,
    /// Transport open in progress.
    Connecting,
    /// Handshake request outstanding.
    Handshaking,
    /// Ordinary calls permitted.
    Ready,
    /// Transport going away; pending calls are being rejected.
    Closing,
}

impl Phase {
    /// Returns `true` if `call()` traffic is permitted.
    #[inline]
    #[must_use]
    pub const fn is_ready(self) -> bool {
        matches!(self, Self::Ready)
    }

    /// Returns `true` while a transport open or handshake is in progress.
    #[inline]
    #[must_use]
    pub const fn is_connecting(self) -> bool {
        matches!(self, Self::Connecting | Self::Handshaking)
    }

    /// Returns `true` if the machine may move from `self` to `next`.
    #[must_use]
    pub const fn can_transition(self, next: Self) -> bool {
        matches!(
            (self, next),
            (Self::Idle, Self::Connecting)
                | (Self::Connecting, Self::Handshaking)
                | (Self::Connecting, Self::Idle)
                | (Self::Connecting, Self::Closing)
                | (Self::Handshaking, Self::Ready)
                | (Self::Handshaking, Self::Closing)
                | (Self::Ready, Self::Closing)
                | (Self::Closing, Self::Idle)
        )
    }

    /// Moves to `next` if the transition is legal.
    ///
    /// Returns `false` and leaves the state untouched otherwise.
    pub fn advance(&mut self, next: Self) -> bool {
        if !self.can_transition(next) {
            tracing::trace!(from = %self, to = %next, "Rejected phase transition");
            return false;
        }

        tracing::debug!(from = %self, to = %next, "Phase transition");
        *self = next;
        true
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Idle => "idle",
            Self::Connecting => "connecting",
            Self::Handshaking => "handshaking",
            Self::Ready => "ready",
            Self::Closing => "closing",
        };
        f.write_str(name)
    }
}

// ============================================================================
// Tests
// ============================================================================
