//! Error types for the gateway client.
//!
//! This module defines all error types used throughout the crate.
//!
//! # Usage
//!
//! All fallible operations return [`Result<T>`] which uses [`Error`]:
//!
//! ```ignore
//! use gateway_client::{Error, GatewayClient, Result};
//!
//! async fn example(client: &GatewayClient) -> Result<()> {
//!     match client.call("sessions.list", serde_json::json!({ "limit": 50 })).await {
//!         Ok(payload) => println!("{payload}"),
//!         Err(Error::NotConnected) => println!("offline"),
//!         Err(e) => return Err(e),
//!     }
//!     Ok(())
//! }
//! ```
//!
//! # Error Categories
//!
//! | Category | Variants |
//! |----------|----------|
//! | Configuration | [`Error::Config`] |
//! | Call | [`Error::NotConnected`], [`Error::RequestTimeout`], [`Error::TooManyPendingRequests`] |
//! | Connection | [`Error::Connection`], [`Error::ConnectionClosed`] |
//! | Handshake | [`Error::HandshakeFailed`], [`Error::HandshakeTimeout`] |
//! | Remote | [`Error::Server`], [`Error::Protocol`] |
//! | External | [`Error::Json`], [`Error::WebSocket`], [`Error::Url`] |

// ============================================================================
// Imports
// ============================================================================

use std::result::Result as StdResult;

use serde_json::Value;
use thiserror::Error;
use tokio_tungstenite::tungstenite::Error as WsError;

use crate::identifiers::RequestId;

// ============================================================================
// Result Alias
// ============================================================================

/// Result type alias using crate [`enum@Error`].
///
/// All fallible operations in this crate return this type.
pub type Result<T> = StdResult<T, Error>;

// ============================================================================
// Error Enum
// ============================================================================

/// Main error type for the crate.
///
/// Recoverable conditions (timeout, connection loss, server error) are
/// returned from the one `call()` they affect. Handshake and transport
/// failures feed the reconnect loop and show up as
/// [`ClientStatus::last_error`](crate::ClientStatus::last_error).
#[derive(Error, Debug)]
pub enum Error {
    // ========================================================================
    // Configuration Errors
    // ========================================================================
    /// Configuration error.
    ///
    /// Returned when the client configuration is invalid.
    #[error("Configuration error: {message}")]
    Config {
        /// Description of the configuration error.
        message: String,
    },

    // ========================================================================
    // Call Errors
    // ========================================================================
    /// No ready connection.
    ///
    /// Returned immediately by `call()` when the handshake has not completed.
    /// Nothing is sent.
    #[error("Not connected to gateway")]
    NotConnected,

    /// Request timed out.
    ///
    /// The request may or may not have been processed by the gateway.
    #[error("Request {request_id} timed out after {timeout_ms}ms")]
    RequestTimeout {
        /// The request ID that timed out.
        request_id: RequestId,
        /// Milliseconds waited before timeout.
        timeout_ms: u64,
    },

    /// Too many requests in flight.
    ///
    /// Returned immediately by `call()` when the pending table is full.
    #[error("Too many pending requests (limit {limit})")]
    TooManyPendingRequests {
        /// Configured maximum number of outstanding requests.
        limit: usize,
    },

    // ========================================================================
    // Connection Errors
    // ========================================================================
    /// Transport-level failure.
    ///
    /// Returned when the WebSocket cannot be opened or a write fails.
    #[error("Connection failed: {message}")]
    Connection {
        /// Description of the connection error.
        message: String,
    },

    /// Connection closed while the request was outstanding.
    #[error("Connection closed")]
    ConnectionClosed,

    // ========================================================================
    // Handshake Errors
    // ========================================================================
    /// Gateway rejected the handshake.
    ///
    /// Authentication or protocol negotiation failed.
    #[error("Handshake failed: {message}")]
    HandshakeFailed {
        /// Reason reported by the gateway.
        message: String,
    },

    /// No handshake response before the deadline.
    #[error("Handshake timed out after {timeout_ms}ms")]
    HandshakeTimeout {
        /// Milliseconds waited before timeout.
        timeout_ms: u64,
    },

    // ========================================================================
    // Remote Errors
    // ========================================================================
    /// Structured error returned by the gateway in a response.
    #[error("Server error [{code}]: {message}")]
    Server {
        /// Machine-readable error code.
        code: String,
        /// Human-readable message.
        message: String,
        /// Additional error details, if any.
        details: Option<Value>,
    },

    /// Protocol violation or malformed frame.
    #[error("Protocol error: {message}")]
    Protocol {
        /// Description of the protocol violation.
        message: String,
    },

    // ========================================================================
    // External Errors
    // ========================================================================
    /// JSON serialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// WebSocket error.
    #[error("WebSocket error: {0}")]
    WebSocket(#[from] WsError),

    /// Endpoint URL could not be parsed.
    #[error("Invalid URL: {0}")]
    Url(#[from] url::ParseError),
}

// ============================================================================
// Error Constructors
// ============================================================================

impl Error {
    /// Creates a configuration error.
    #[inline]
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
        }
    }

    /// Creates a connection error.
    #[inline]
    pub fn connection(message: impl Into<String>) -> Self {
        Self::Connection {
            message: message.into(),
        }
    }

    /// Creates a protocol error.
    #[inline]
    pub fn protocol(message: impl Into<String>) -> Self {
        Self::Protocol {
            message: message.into(),
        }
    }

    /// Creates a handshake failure.
    #[inline]
    pub fn handshake_failed(message: impl Into<String>) -> Self {
        Self::HandshakeFailed {
            message: message.into(),
        }
    }

    /// Creates a handshake timeout error.
    #[inline]
    pub fn handshake_timeout(timeout_ms: u64) -> Self {
        Self::HandshakeTimeout { timeout_ms }
    }

    /// Creates a request timeout error.
    #[inline]
    pub fn request_timeout(request_id: RequestId, timeout_ms: u64) -> Self {
        Self::RequestTimeout {
            request_id,
            timeout_ms,
        }
    }

    /// Creates a server error.
    #[inline]
    pub fn server(
        code: impl Into<String>,
        message: impl Into<String>,
        details: Option<Value>,
    ) -> Self {
        Self::Server {
            code: code.into(),
            message: message.into(),
            details,
        }
    }
}

// ============================================================================
// Error Predicates
// ============================================================================

impl Error {
    /// Returns `true` if this is a timeout error.
    #[inline]
    #[must_use]
    pub fn is_timeout(&self) -> bool {
        matches!(
            self,
            Self::RequestTimeout { .. } | Self::HandshakeTimeout { .. }
        )
    }

    /// Returns `true` if this is a connection error.
    #[inline]
    #[must_use]
    pub fn is_connection_error(&self) -> bool {
        matches!(
            self,
            Self::NotConnected
                | Self::Connection { .. }
                | Self::ConnectionClosed
                | Self::WebSocket(_)
        )
    }

    /// Returns `true` if this is a handshake error.
    #[inline]
    #[must_use]
    pub fn is_handshake_error(&self) -> bool {
        matches!(
            self,
            Self::HandshakeFailed { .. } | Self::HandshakeTimeout { .. }
        )
    }

    /// Returns `true` if the caller may reasonably retry the call.
    ///
    /// The core never retries on its own.
    #[inline]
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::NotConnected
                | Self::RequestTimeout { .. }
                | Self::ConnectionClosed
                | Self::TooManyPendingRequests { .. }
        )
    }
}

// ============================================================================
// Tests
// ============================================================================
