//! Handshake request parameters and hello payload.
//!
//! The first frame on every connection is a `connect` request sent under
//! the reserved handshake id. The gateway may answer with a
//! `connect.challenge` event first, in which case the same request is sent
//! again. A successful response carries the hello payload.
//!
//! # Request Format
//!
//! ```json
//! {
//!   "type": "req",
//!   "id": "00000000-0000-0000-0000-000000000000",
//!   "method": "connect",
//!   "params": {
//!     "minProtocol": 3,
//!     "maxProtocol": 3,
//!     "client": { "id": "...", "displayName": "...", "version": "...", "platform": "linux", "mode": "ui" },
//!     "auth": { "token": "..." }
//!   }
//! }
//! ```

// ============================================================================
// Imports
// ============================================================================

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{Error, Result};
use crate::identifiers::RequestId;

use super::capabilities::{MethodSet, probe_methods, probe_protocol};
use super::frame::RequestFrame;

// ============================================================================
// Constants
// ============================================================================

/// Method name of the handshake request.
pub const HANDSHAKE_METHOD: &str = "connect";

/// Event name the gateway uses to ask for the handshake to be resent.
pub const CHALLENGE_EVENT: &str = "connect.challenge";

// ============================================================================
// ClientInfo
// ============================================================================

/// Identity the client presents during the handshake.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClientInfo {
    /// Stable client identifier.
    pub id: String,
    /// Name shown in gateway presence lists.
    pub display_name: String,
    /// Client version.
    pub version: String,
    /// Operating system or runtime platform.
    pub platform: String,
    /// Client mode, e.g. `ui` or `cli`.
    pub mode: String,
}

impl Default for ClientInfo {
    fn default() -> Self {
        Self {
            id: env!("CARGO_PKG_NAME").to_string(),
            display_name: "Gateway Dashboard".to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
            platform: std::env::consts::OS.to_string(),
            mode: "ui".to_string(),
        }
    }
}

// ============================================================================
// Credential
// ============================================================================

/// Authentication material sent with the handshake.
#[derive(Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Credential {
    /// Bearer token.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token: Option<String>,
    /// Shared password.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,
}

impl Credential {
    /// Creates a token credential.
    #[inline]
    #[must_use]
    pub fn token(token: impl Into<String>) -> Self {
        Self {
            token: Some(token.into()),
            password: None,
        }
    }

    /// Creates a password credential.
    #[inline]
    #[must_use]
    pub fn password(password: impl Into<String>) -> Self {
        Self {
            token: None,
            password: Some(password.into()),
        }
    }

    /// Returns `true` if neither token nor password is set.
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.token.is_none() && self.password.is_none()
    }
}

// Secrets stay out of logs.
impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credential")
            .field("token", &self.token.as_ref().map(|_| "<redacted>"))
            .field("password", &self.password.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}

// ============================================================================
// ConnectParams
// ============================================================================

/// Parameters of the handshake request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectParams {
    /// Lowest protocol version the client speaks.
    pub min_protocol: u32,
    /// Highest protocol version the client speaks.
    pub max_protocol: u32,
    /// Client identity.
    pub client: ClientInfo,
    /// Credential, omitted when empty.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub auth: Option<Credential>,
}

impl ConnectParams {
    /// Builds the handshake request frame under the reserved id.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Json`] if the params cannot be serialized.
    pub fn to_request(&self) -> Result<RequestFrame> {
        let params = serde_json::to_value(self)?;
        Ok(RequestFrame::with_id(
            RequestId::handshake(),
            HANDSHAKE_METHOD,
            params,
        ))
    }

    /// Returns `true` if `version` lies in the supported range.
    #[inline]
    #[must_use]
    pub fn supports(&self, version: u32) -> bool {
        (self.min_protocol..=self.max_protocol).contains(&version)
    }
}

// ============================================================================
// HelloPayload
// ============================================================================

/// Session metadata returned by a successful handshake.
#[derive(Debug, Clone, PartialEq)]
pub struct HelloPayload {
    /// Negotiated protocol version, if the gateway reported one.
    pub protocol: Option<u32>,
    /// Methods the gateway advertises, if any shape matched.
    pub methods: Option<MethodSet>,
    /// Payload exactly as received.
    pub raw: Value,
}

impl HelloPayload {
    /// Parses the handshake response payload.
    ///
    /// Unknown shapes are tolerated: fields that no probe recognises stay
    /// `None`, and the raw payload is always kept.
    #[must_use]
    pub fn from_value(raw: Value) -> Self {
        Self {
            protocol: probe_protocol(&raw),
            methods: probe_methods(&raw),
            raw,
        }
    }

    /// Checks the negotiated version against the requested range.
    ///
    /// # Errors
    ///
    /// Returns [`Error::HandshakeFailed`] if the gateway picked a version
    /// outside `params`' range.
    pub fn validate(&self, params: &ConnectParams) -> Result<()> {
        match self.protocol {
            Some(version) if !params.supports(version) => Err(Error::handshake_failed(format!(
                "gateway negotiated protocol {version}, client supports {}..={}",
                params.min_protocol, params.max_protocol
            ))),
            _ => Ok(()),
        }
    }

    /// Returns `true` if the gateway advertises `method`.
    ///
    /// Returns `None` when the payload carried no method list at all, so
    /// callers can tell "unsupported" from "unknown".
    #[inline]
    #[must_use]
    pub fn supports_method(&self, method: &str) -> Option<bool> {
        self.methods.as_ref().map(|set| set.contains(method))
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    use serde_json::json;

    fn params() -> ConnectParams {
        ConnectParams {
            min_protocol: 3,
            max_protocol: 3,
            client: ClientInfo::default(),
            auth: Some(Credential::token("secret")),
        }
    }

    #[test]
    fn test_to_request_uses_reserved_id() {
        let request = params().to_request().expect("request");
        assert!(request.id.is_handshake());
        assert_eq!(request.method, HANDSHAKE_METHOD);
        assert_eq!(request.params["minProtocol"], 3);
        assert_eq!(request.params["maxProtocol"], 3);
        assert_eq!(request.params["auth"]["token"], "secret");
        assert!(request.params["auth"].get("password").is_none());
        assert_eq!(request.params["client"]["mode"], "ui");
        assert!(request.params["client"]["displayName"].is_string());
    }

    #[test]
    fn test_auth_omitted_when_absent() {
        let mut p = params();
        p.auth = None;
        let request = p.to_request().expect("request");
        assert!(request.params.get("auth").is_none());
    }

    #[test]
    fn test_credential_debug_redacts() {
        let debug = format!("{:?}", Credential::password("hunter2"));
        assert!(!debug.contains("hunter2"));
        assert!(debug.contains("redacted"));
    }

    #[test]
    fn test_hello_keeps_raw_payload() {
        let hello = HelloPayload::from_value(json!({ "version": 3 }));
        assert_eq!(hello.raw, json!({ "version": 3 }));
        assert_eq!(hello.protocol, Some(3));
        assert_eq!(hello.methods, None);
        assert_eq!(hello.supports_method("chat.send"), None);
    }

    #[test]
    fn test_hello_validate_rejects_out_of_range() {
        let hello = HelloPayload::from_value(json!({ "protocol": 5 }));
        let err = hello.validate(&params()).unwrap_err();
        assert!(err.is_handshake_error());
    }

    #[test]
    fn test_hello_validate_accepts_missing_version() {
        let hello = HelloPayload::from_value(json!({}));
        assert!(hello.validate(&params()).is_ok());
    }

    #[test]
    fn test_hello_supports_method() {
        let hello = HelloPayload::from_value(json!({
            "protocol": 3,
            "features": { "methods": ["sessions.list", "chat.send"] }
        }));
        assert_eq!(hello.supports_method("chat.send"), Some(true));
        assert_eq!(hello.supports_method("agents.delete"), Some(false));
    }
}
