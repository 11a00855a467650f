//! Wire envelope and framer.
//!
//! Every WebSocket text message carries exactly one JSON [`Frame`]:
//!
//! ```json
//! { "type": "req",   "id": "uuid", "method": "sessions.list", "params": { ... } }
//! { "type": "res",   "id": "uuid", "ok": true, "payload": { ... } }
//! { "type": "res",   "id": "uuid", "ok": false, "error": { "code": "...", "message": "..." } }
//! { "type": "event", "event": "chat", "payload": { ... }, "seq": 42 }
//! ```
//!
//! [`encode`] and [`decode`] are pure translations between [`Frame`] and
//! [`Message`]; they hold no state.

// ============================================================================
// Imports
// ============================================================================

use serde::{Deserialize, Serialize};
use serde_json::{Value, from_slice, from_str, to_string};
use tokio_tungstenite::tungstenite::Message;

use crate::error::{Error, Result};
use crate::identifiers::RequestId;

// ============================================================================
// Frame
// ============================================================================

/// One protocol envelope.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum Frame {
    /// Client → gateway request.
    #[serde(rename = "req")]
    Request(RequestFrame),

    /// Gateway → client response.
    #[serde(rename = "res")]
    Response(ResponseFrame),

    /// Gateway → client pushed event.
    #[serde(rename = "event")]
    Event(EventFrame),
}

// ============================================================================
// RequestFrame
// ============================================================================

/// A method invocation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RequestFrame {
    /// Correlation id.
    pub id: RequestId,

    /// Method name, e.g. `sessions.list`.
    pub method: String,

    /// Method parameters.
    #[serde(default)]
    pub params: Value,
}

impl RequestFrame {
    /// Creates a request with a freshly generated id.
    #[inline]
    #[must_use]
    pub fn new(method: impl Into<String>, params: Value) -> Self {
        Self::with_id(RequestId::generate(), method, params)
    }

    /// Creates a request with a specific id.
    #[inline]
    #[must_use]
    pub fn with_id(id: RequestId, method: impl Into<String>, params: Value) -> Self {
        Self {
            id,
            method: method.into(),
            params,
        }
    }
}

// ============================================================================
// ResponseFrame
// ============================================================================

/// Result of a request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResponseFrame {
    /// Matches the request `id`.
    pub id: RequestId,

    /// Whether the call succeeded.
    pub ok: bool,

    /// Result data (if ok).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payload: Option<Value>,

    /// Error data (if not ok).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorShape>,
}

impl ResponseFrame {
    /// Creates a successful response.
    #[inline]
    #[must_use]
    pub fn success(id: RequestId, payload: Value) -> Self {
        Self {
            id,
            ok: true,
            payload: Some(payload),
            error: None,
        }
    }

    /// Creates an error response.
    #[inline]
    #[must_use]
    pub fn failure(id: RequestId, error: ErrorShape) -> Self {
        Self {
            id,
            ok: false,
            payload: None,
            error: Some(error),
        }
    }

    /// Extracts the payload, converting an error response into
    /// [`Error::Server`].
    ///
    /// # Errors
    ///
    /// Returns [`Error::Server`] if `ok` is false.
    pub fn into_result(self) -> Result<Value> {
        if self.ok {
            return Ok(self.payload.unwrap_or(Value::Null));
        }

        let error = self.error.unwrap_or_default();
        Err(Error::server(error.code, error.message, error.details))
    }
}

// ============================================================================
// ErrorShape
// ============================================================================

/// Structured error carried by a failed response.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorShape {
    /// Machine-readable code.
    #[serde(default = "ErrorShape::unknown_code")]
    pub code: String,

    /// Human-readable message.
    #[serde(default)]
    pub message: String,

    /// Additional details.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub details: Option<Value>,
}

impl ErrorShape {
    /// Creates an error shape.
    #[inline]
    #[must_use]
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            message: message.into(),
            details: None,
        }
    }

    fn unknown_code() -> String {
        "UNKNOWN".to_string()
    }
}

impl Default for ErrorShape {
    fn default() -> Self {
        Self::new(Self::unknown_code(), "request failed")
    }
}

// ============================================================================
// EventFrame
// ============================================================================

/// A server-pushed event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventFrame {
    /// Event name, e.g. `chat` or `connect.challenge`.
    pub event: String,

    /// Event data.
    #[serde(default)]
    pub payload: Value,

    /// Gateway sequence number, informational only.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub seq: Option<u64>,
}

impl EventFrame {
    /// Creates an event frame without a sequence number.
    #[inline]
    #[must_use]
    pub fn new(event: impl Into<String>, payload: Value) -> Self {
        Self {
            event: event.into(),
            payload,
            seq: None,
        }
    }
}

// ============================================================================
// Framer
// ============================================================================

/// Encodes a frame as a WebSocket text message.
///
/// # Errors
///
/// Returns [`Error::Json`] if serialization fails.
pub fn encode(frame: &Frame) -> Result<Message> {
    let json = to_string(frame)?;
    Ok(Message::Text(json.into()))
}

/// Decodes a WebSocket message into a frame.
///
/// Returns `Ok(None)` for control messages (ping, pong, close, raw frames)
/// that carry no envelope.
///
/// # Errors
///
/// Returns [`Error::Protocol`] if a data message is not a valid envelope.
pub fn decode(message: &Message) -> Result<Option<Frame>> {
    let parsed = match message {
        Message::Text(text) => from_str::<Frame>(text),
        Message::Binary(data) => from_slice::<Frame>(data),
        _ => return Ok(None),
    };

    parsed
        .map(Some)
        .map_err(|e| Error::protocol(format!("malformed frame: {e}")))
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    use serde_json::json;

    #[test]
    fn test_request_encodes_with_type_tag() {
        let frame = Frame::Request(RequestFrame::new("sessions.list", json!({ "limit": 50 })));
        let message = encode(&frame).expect("encode");

        let Message::Text(text) = message else {
            panic!("expected text message");
        };
        let value: Value = serde_json::from_str(&text).expect("json");
        assert_eq!(value["type"], "req");
        assert_eq!(value["method"], "sessions.list");
        assert_eq!(value["params"]["limit"], 50);
        assert!(value["id"].is_string());
    }

    #[test]
    fn test_decode_success_response() {
        let text = r#"{
            "type": "res",
            "id": "550e8400-e29b-41d4-a716-446655440000",
            "ok": true,
            "payload": {"sessions": []}
        }"#;

        let frame = decode(&Message::Text(text.into())).expect("decode");
        let Some(Frame::Response(response)) = frame else {
            panic!("expected response");
        };
        assert!(response.ok);
        assert_eq!(response.into_result().expect("ok"), json!({ "sessions": [] }));
    }

    #[test]
    fn test_decode_error_response() {
        let text = r#"{
            "type": "res",
            "id": "550e8400-e29b-41d4-a716-446655440000",
            "ok": false,
            "error": {"code": "INVALID_REQUEST", "message": "bad params", "details": {"field": "limit"}}
        }"#;

        let frame = decode(&Message::Text(text.into())).expect("decode");
        let Some(Frame::Response(response)) = frame else {
            panic!("expected response");
        };

        match response.into_result() {
            Err(Error::Server {
                code,
                message,
                details,
            }) => {
                assert_eq!(code, "INVALID_REQUEST");
                assert_eq!(message, "bad params");
                assert_eq!(details, Some(json!({ "field": "limit" })));
            }
            other => panic!("expected server error, got {other:?}"),
        }
    }

    #[test]
    fn test_error_response_without_error_object() {
        let response = ResponseFrame {
            id: RequestId::generate(),
            ok: false,
            payload: None,
            error: None,
        };

        let err = response.into_result().unwrap_err();
        assert!(matches!(err, Error::Server { ref code, .. } if code == "UNKNOWN"));
    }

    #[test]
    fn test_decode_event_with_seq() {
        let text = r#"{"type":"event","event":"chat","payload":{"sessionKey":"s1"},"seq":7}"#;

        let frame = decode(&Message::Text(text.into())).expect("decode");
        assert_eq!(
            frame,
            Some(Frame::Event(EventFrame {
                event: "chat".to_string(),
                payload: json!({ "sessionKey": "s1" }),
                seq: Some(7),
            }))
        );
    }

    #[test]
    fn test_decode_binary_message() {
        let text = r#"{"type":"event","event":"tick"}"#;
        let frame = decode(&Message::Binary(text.as_bytes().to_vec().into())).expect("decode");
        assert!(matches!(frame, Some(Frame::Event(ref e)) if e.event == "tick" && e.payload.is_null()));
    }

    #[test]
    fn test_decode_control_messages_yield_none() {
        assert!(decode(&Message::Ping(Vec::new().into())).expect("ping").is_none());
        assert!(decode(&Message::Pong(Vec::new().into())).expect("pong").is_none());
        assert!(decode(&Message::Close(None)).expect("close").is_none());
    }

    #[test]
    fn test_decode_rejects_unknown_type() {
        let text = r#"{"type":"bogus","id":"x"}"#;
        let err = decode(&Message::Text(text.into())).unwrap_err();
        assert!(matches!(err, Error::Protocol { .. }));
    }

    #[test]
    fn test_decode_rejects_garbage() {
        let err = decode(&Message::Text("not json".into())).unwrap_err();
        assert!(matches!(err, Error::Protocol { .. }));
    }
}
