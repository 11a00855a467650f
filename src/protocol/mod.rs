//! Gateway wire protocol.
//!
//! This module defines the message envelope exchanged with the gateway and
//! the handshake payloads.
//!
//! # Protocol Overview
//!
//! | Frame | Direction | Purpose |
//! |-------|-----------|---------|
//! | `req` | Client → Gateway | Method call (and the handshake) |
//! | `res` | Gateway → Client | Result of a call, matched by `id` |
//! | `event` | Gateway → Client | Pushed notification |
//!
//! # Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | `capabilities` | Ordered probes over the hello payload |
//! | `frame` | Envelope types and framer |
//! | `handshake` | Handshake params and hello payload |

// ============================================================================
// Submodules
// ============================================================================

/// Capability probing over the hello payload.
pub mod capabilities;

/// Envelope types and framer.
pub mod frame;

/// Handshake params and hello payload.
pub mod handshake;

// ============================================================================
// Re-exports
// ============================================================================

pub use capabilities::{MethodSet, probe_methods, probe_protocol};
pub use frame::{ErrorShape, EventFrame, Frame, RequestFrame, ResponseFrame, decode, encode};
pub use handshake::{
    CHALLENGE_EVENT, ClientInfo, ConnectParams, Credential, HANDSHAKE_METHOD, HelloPayload,
};
