//! Client configuration.
//!
//! Provides a fluent builder for [`ClientConfig`].
//!
//! # Example
//!
//! ```no_run
//! use std::time::Duration;
//! use gateway_client::ClientConfig;
//!
//! # fn example() -> gateway_client::Result<()> {
//! let config = ClientConfig::builder()
//!     .url("ws://127.0.0.1:18789")
//!     .token("dashboard-token")
//!     .request_timeout(Duration::from_secs(5))
//!     .build()?;
//! # Ok(())
//! # }
//! ```

// ============================================================================
// Imports
// ============================================================================

use std::time::Duration;

use url::Url;

use crate::error::{Error, Result};
use crate::protocol::{ClientInfo, ConnectParams, Credential};

// ============================================================================
// Constants
// ============================================================================

/// Default timeout for an ordinary call.
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// Default timeout for the handshake response.
pub const DEFAULT_HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(10);

/// Default timeout for opening the transport.
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Fixed delay between reconnect attempts.
pub const DEFAULT_RECONNECT_DELAY: Duration = Duration::from_secs(3);

/// Default cap on outstanding calls.
pub const DEFAULT_MAX_PENDING_REQUESTS: usize = 256;

/// Protocol version spoken by this client.
pub const PROTOCOL_VERSION: u32 = 3;

// ============================================================================
// ClientConfig
// ============================================================================

/// Validated connection settings.
#[derive(Debug, Clone, PartialEq)]
pub struct ClientConfig {
    /// Gateway endpoint (`ws://` or `wss://`).
    pub url: Url,
    /// Credential sent with the handshake.
    pub credential: Option<Credential>,
    /// Identity presented to the gateway.
    pub client: ClientInfo,
    /// Lowest acceptable protocol version.
    pub min_protocol: u32,
    /// Highest acceptable protocol version.
    pub max_protocol: u32,
    /// Deadline for opening the transport.
    pub connect_timeout: Duration,
    /// Deadline for the handshake response. Challenges do not extend it.
    pub handshake_timeout: Duration,
    /// Deadline for ordinary calls.
    pub request_timeout: Duration,
    /// Delay before each reconnect attempt.
    pub reconnect_delay: Duration,
    /// Reconnect after the connection drops.
    pub auto_reconnect: bool,
    /// Maximum outstanding calls.
    pub max_pending_requests: usize,
}

impl ClientConfig {
    /// Creates a new builder.
    #[inline]
    #[must_use]
    pub fn builder() -> ClientConfigBuilder {
        ClientConfigBuilder::new()
    }

    /// Builds a config for `url` with defaults for everything else.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] or [`Error::Url`] if `url` is invalid.
    pub fn for_endpoint(url: &str, credential: Option<Credential>) -> Result<Self> {
        let mut builder = Self::builder().url(url);
        if let Some(credential) = credential {
            builder = builder.credential(credential);
        }
        builder.build()
    }

    /// Returns the handshake parameters for this config.
    #[must_use]
    pub fn connect_params(&self) -> ConnectParams {
        ConnectParams {
            min_protocol: self.min_protocol,
            max_protocol: self.max_protocol,
            client: self.client.clone(),
            auth: self.credential.clone().filter(|c| !c.is_empty()),
        }
    }
}

// ============================================================================
// ClientConfigBuilder
// ============================================================================

/// Builder for [`ClientConfig`].
#[derive(Debug, Clone)]
pub struct ClientConfigBuilder {
    url: Option<String>,
    credential: Option<Credential>,
    client: ClientInfo,
    min_protocol: u32,
    max_protocol: u32,
    connect_timeout: Duration,
    handshake_timeout: Duration,
    request_timeout: Duration,
    reconnect_delay: Duration,
    auto_reconnect: bool,
    max_pending_requests: usize,
}

impl Default for ClientConfigBuilder {
    fn default() -> Self {
        Self {
            url: None,
            credential: None,
            client: ClientInfo::default(),
            min_protocol: PROTOCOL_VERSION,
            max_protocol: PROTOCOL_VERSION,
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            handshake_timeout: DEFAULT_HANDSHAKE_TIMEOUT,
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
            reconnect_delay: DEFAULT_RECONNECT_DELAY,
            auto_reconnect: true,
            max_pending_requests: DEFAULT_MAX_PENDING_REQUESTS,
        }
    }
}

impl ClientConfigBuilder {
    /// Creates a builder with default settings.
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the gateway endpoint.
    #[inline]
    #[must_use]
    pub fn url(mut self, url: impl Into<String>) -> Self {
        self.url = Some(url.into());
        self
    }

    /// Authenticates with a bearer token.
    #[inline]
    #[must_use]
    pub fn token(mut self, token: impl Into<String>) -> Self {
        self.credential.get_or_insert_with(Credential::default).token = Some(token.into());
        self
    }

    /// Authenticates with a password.
    #[inline]
    #[must_use]
    pub fn password(mut self, password: impl Into<String>) -> Self {
        self.credential.get_or_insert_with(Credential::default).password = Some(password.into());
        self
    }

    /// Replaces the credential.
    #[inline]
    #[must_use]
    pub fn credential(mut self, credential: Credential) -> Self {
        self.credential = Some(credential);
        self
    }

    /// Sets the client identity.
    #[inline]
    #[must_use]
    pub fn client(mut self, client: ClientInfo) -> Self {
        self.client = client;
        self
    }

    /// Sets the accepted protocol version range.
    #[inline]
    #[must_use]
    pub fn protocol_range(mut self, min: u32, max: u32) -> Self {
        self.min_protocol = min;
        self.max_protocol = max;
        self
    }

    /// Sets the transport open timeout.
    #[inline]
    #[must_use]
    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    /// Sets the handshake timeout.
    #[inline]
    #[must_use]
    pub fn handshake_timeout(mut self, timeout: Duration) -> Self {
        self.handshake_timeout = timeout;
        self
    }

    /// Sets the per-call timeout.
    #[inline]
    #[must_use]
    pub fn request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    /// Sets the fixed reconnect delay.
    #[inline]
    #[must_use]
    pub fn reconnect_delay(mut self, delay: Duration) -> Self {
        self.reconnect_delay = delay;
        self
    }

    /// Enables or disables automatic reconnection.
    #[inline]
    #[must_use]
    pub fn auto_reconnect(mut self, enabled: bool) -> Self {
        self.auto_reconnect = enabled;
        self
    }

    /// Sets the maximum number of outstanding calls.
    #[inline]
    #[must_use]
    pub fn max_pending_requests(mut self, limit: usize) -> Self {
        self.max_pending_requests = limit;
        self
    }

    /// Builds the config with validation.
    ///
    /// # Errors
    ///
    /// - [`Error::Config`] if the URL is missing, not `ws`/`wss`, the
    ///   protocol range is empty, a timeout is zero, or the pending limit
    ///   is zero
    /// - [`Error::Url`] if the URL does not parse
    pub fn build(self) -> Result<ClientConfig> {
        let url = self.validate_url()?;
        self.validate_limits()?;

        Ok(ClientConfig {
            url,
            credential: self.credential,
            client: self.client,
            min_protocol: self.min_protocol,
            max_protocol: self.max_protocol,
            connect_timeout: self.connect_timeout,
            handshake_timeout: self.handshake_timeout,
            request_timeout: self.request_timeout,
            reconnect_delay: self.reconnect_delay,
            auto_reconnect: self.auto_reconnect,
            max_pending_requests: self.max_pending_requests,
        })
    }
}

// ============================================================================
// Validation
// ============================================================================

impl ClientConfigBuilder {
    fn validate_url(&self) -> Result<Url> {
        let raw = self.url.as_deref().ok_or_else(|| {
            Error::config(
                "Gateway URL is required. Use .url() to set it.\n\
                 Example: ClientConfig::builder().url(\"ws://127.0.0.1:18789\")",
            )
        })?;

        let url = Url::parse(raw)?;
        match url.scheme() {
            "ws" | "wss" => Ok(url),
            other => Err(Error::config(format!(
                "Unsupported URL scheme '{other}', expected ws or wss"
            ))),
        }
    }

    fn validate_limits(&self) -> Result<()> {
        if self.min_protocol > self.max_protocol {
            return Err(Error::config(format!(
                "Empty protocol range {}..={}",
                self.min_protocol, self.max_protocol
            )));
        }

        let timeouts = [
            ("connect_timeout", self.connect_timeout),
            ("handshake_timeout", self.handshake_timeout),
            ("request_timeout", self.request_timeout),
        ];
        if let Some((name, _)) = timeouts.iter().find(|(_, t)| t.is_zero()) {
            return Err(Error::config(format!("{name} must be greater than zero")));
        }

        if self.max_pending_requests == 0 {
            return Err(Error::config("max_pending_requests must be at least 1"));
        }

        Ok(())
    }
}

// ============================================================================
// Tests
// ============================================================================
