//! WebSocket transport layer.
//!
//! This module owns the connection to the gateway: lifecycle, request
//! correlation, event fan-out and reconnection.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────┐                         ┌─────────────────┐
//! │  GatewayClient       │                         │                 │
//! │   └ ConnectionManager│        WebSocket        │     Gateway     │
//! │       ├ PendingTable │◄───────────────────────►│                 │
//! │       └ EventFanout  │   req / res / event     │                 │
//! └──────────────────────┘                         └─────────────────┘
//! ```
//!
//! # Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | `fanout` | Listener registry and event delivery |
//! | `manager` | Socket task, handshake and reconnect loop |
//! | `pending` | Outstanding requests by correlation id |
//! | `state` | Lifecycle phases |

// ============================================================================
// Submodules
// ============================================================================

/// Listener registry and event delivery.
pub mod fanout;

/// Socket task, handshake and reconnect loop.
pub mod manager;

/// Outstanding requests by correlation id.
pub mod pending;

/// Lifecycle phases.
pub mod state;

// ============================================================================
// Re-exports
// ============================================================================

pub use fanout::{EventFanout, Listener, Subscription};
pub use manager::ConnectionManager;
pub use pending::PendingTable;
pub use state::Phase;
