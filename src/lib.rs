//! Gateway Client - persistent RPC connection to the administration gateway.
//!
//! This library implements the connection core of the administration
//! dashboard: one long-lived WebSocket to the gateway carrying multiplexed
//! request/response pairs and server-pushed events.
//!
//! # Architecture
//!
//! - **Framer**: JSON envelopes (`req`, `res`, `event`) in WebSocket text messages
//! - **Handshake**: `connect` request under a reserved id, resent on every
//!   `connect.challenge`, bounded by a fixed deadline
//! - **Pending table**: outstanding calls by correlation id, each settled
//!   exactly once (response, timeout, or connection loss)
//! - **Fan-out**: every event to every listener, in registration order
//! - **Reconnect loop**: fixed delay between attempts until `disconnect()`
//!
//! # Quick Start
//!
//! ```no_run
//! use std::time::Duration;
//! use gateway_client::{ClientConfig, GatewayClient, Result};
//! use serde_json::json;
//!
//! #[tokio::main]
//! async fn main() -> Result<()> {
//!     let client = GatewayClient::new();
//!     client.connect(
//!         ClientConfig::builder()
//!             .url("ws://127.0.0.1:18789")
//!             .token("dashboard-token")
//!             .build()?,
//!     );
//!
//!     let hello = client.wait_until_ready(Duration::from_secs(5)).await?;
//!     println!("protocol {:?}", hello.protocol);
//!
//!     let sessions = client.call("sessions.list", json!({ "limit": 50 })).await?;
//!     println!("{sessions}");
//!
//!     client.disconnect();
//!     Ok(())
//! }
//! ```
//!
//! # Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | [`client`] | [`GatewayClient`] facade |
//! | [`config`] | [`ClientConfig`] and its builder |
//! | [`error`] | Error types and [`Result`] alias |
//! | [`identifiers`] | Type-safe ID wrappers |
//! | [`protocol`] | Wire envelope and handshake payloads |
//! | [`status`] | Observable [`ClientStatus`] |
//! | [`transport`] | Connection manager, pending table, fan-out |

// ============================================================================
// Modules
// ============================================================================

/// Public client facade.
pub mod client;

/// Client configuration.
pub mod config;

/// Error types and result aliases.
///
/// All fallible operations return [`Result<T>`] which uses [`Error`].
pub mod error;

/// Type-safe identifiers.
pub mod identifiers;

/// Gateway wire protocol.
pub mod protocol;

/// Observable connection status.
pub mod status;

/// WebSocket transport layer.
///
/// Connection lifecycle, request correlation and event delivery.
pub mod transport;

// ============================================================================
// Re-exports
// ============================================================================

// Client types
pub use client::GatewayClient;
pub use config::{ClientConfig, ClientConfigBuilder};
pub use status::ClientStatus;

// Error types
pub use error::{Error, Result};

// Identifier types
pub use identifiers::{ListenerId, RequestId};

// Protocol types
pub use protocol::{ClientInfo, Credential, EventFrame, HelloPayload, MethodSet};

// Transport types
pub use transport::{Phase, Subscription};
