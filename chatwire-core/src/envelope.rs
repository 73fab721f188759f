// ABOUTME: Socket envelope decoding and frame classification.
// ABOUTME: Turns one raw text frame into an event, handshake, resume ack, or protocol error.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::ProtocolError;

/// Frame category tags used by the gateway
pub mod opcode {
    pub const EVENT: u8 = 0;
    pub const WELCOME: u8 = 1;
    pub const RESUME: u8 = 2;
    pub const INVALID_CURSOR: u8 = 8;
    pub const INTERNAL_ERROR: u8 = 9;
}

/// Normalized shape of every inbound frame
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SocketEnvelope {
    #[serde(rename = "op")]
    pub opcode: u8,
    #[serde(rename = "t", default, skip_serializing_if = "Option::is_none")]
    pub event_name: Option<String>,
    #[serde(rename = "d", default, skip_serializing_if = "Option::is_none")]
    pub payload: Option<Value>,
    #[serde(rename = "s", default, skip_serializing_if = "Option::is_none")]
    pub cursor: Option<String>,
}

impl SocketEnvelope {
    /// Build an op-0 event envelope
    pub fn event(name: impl Into<String>, payload: Value, cursor: Option<String>) -> Self {
        Self {
            opcode: opcode::EVENT,
            event_name: Some(name.into()),
            payload: Some(payload),
            cursor,
        }
    }

    pub fn to_json(&self) -> String {
        // Serializing plain strings/values into a String cannot fail
        serde_json::to_string(self).unwrap_or_default()
    }
}

/// Result of classifying one envelope
#[derive(Debug, Clone, PartialEq)]
pub enum Frame {
    /// Op 0: a named event for the dispatcher
    Event {
        name: String,
        payload: Value,
        cursor: Option<String>,
    },
    /// Op 1: handshake welcome, consumed by the connection manager
    Welcome(Value),
    /// Op 2: resume acknowledgement, consumed by the connection manager
    Resumed {
        payload: Value,
        cursor: Option<String>,
    },
    /// Op 8 / op 9: routed to the error stream
    Error(ProtocolError),
}

/// Parse and classify a raw inbound text frame.
///
/// Returns `None` for anything that does not fit the envelope shape: invalid
/// JSON, unknown opcodes, or events with no name. Those frames are dropped.
pub fn classify(raw: &str) -> Option<Frame> {
    let envelope: SocketEnvelope = match serde_json::from_str(raw) {
        Ok(envelope) => envelope,
        Err(e) => {
            tracing::debug!(error = %e, len = raw.len(), "Dropping malformed frame");
            return None;
        }
    };
    classify_envelope(envelope)
}

/// Classify an already-decoded envelope
pub fn classify_envelope(envelope: SocketEnvelope) -> Option<Frame> {
    match envelope.opcode {
        opcode::EVENT => {
            let Some(name) = envelope.event_name else {
                tracing::debug!("Dropping event frame without an event name");
                return None;
            };
            Some(Frame::Event {
                name,
                payload: envelope.payload.unwrap_or(Value::Null),
                cursor: envelope.cursor,
            })
        }
        opcode::WELCOME => Some(Frame::Welcome(envelope.payload.unwrap_or(Value::Null))),
        opcode::RESUME => Some(Frame::Resumed {
            payload: envelope.payload.unwrap_or(Value::Null),
            cursor: envelope.cursor,
        }),
        opcode::INVALID_CURSOR => {
            let message = envelope
                .payload
                .as_ref()
                .and_then(|d| d.get("message"))
                .and_then(Value::as_str)
                .map(str::to_string);
            Some(Frame::Error(ProtocolError::invalid_cursor(message)))
        }
        opcode::INTERNAL_ERROR => Some(Frame::Error(ProtocolError::internal())),
        other => {
            tracing::debug!(opcode = other, "Dropping frame with unknown opcode");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ProtocolErrorKind;
    use serde_json::json;

    #[test]
    fn test_classify_event_with_cursor() {
        let frame = classify(r#"{"op":0,"t":"ChatMessageCreated","d":{"a":1},"s":"cur-1"}"#);
        assert_eq!(
            frame,
            Some(Frame::Event {
                name: "ChatMessageCreated".into(),
                payload: json!({"a": 1}),
                cursor: Some("cur-1".into()),
            })
        );
    }

    #[test]
    fn test_classify_event_without_name_is_dropped() {
        assert_eq!(classify(r#"{"op":0,"d":{},"s":"x"}"#), None);
    }

    #[test]
    fn test_classify_welcome() {
        let frame = classify(r#"{"op":1,"d":{"heartbeatIntervalMs":22500}}"#);
        assert!(matches!(frame, Some(Frame::Welcome(d)) if d["heartbeatIntervalMs"] == 22500));
    }

    #[test]
    fn test_classify_resume_ack() {
        let frame = classify(r#"{"op":2,"d":{"lastMessageId":"m"},"s":"m"}"#);
        assert!(matches!(frame, Some(Frame::Resumed { cursor: Some(c), .. }) if c == "m"));
    }

    #[test]
    fn test_classify_invalid_cursor_error() {
        let frame = classify(r#"{"op":8,"d":{"message":"bad cursor"}}"#);
        match frame {
            Some(Frame::Error(err)) => {
                assert_eq!(err.kind, ProtocolErrorKind::InvalidCursor);
                assert_eq!(err.message.as_deref(), Some("bad cursor"));
            }
            other => panic!("expected protocol error, got {:?}", other),
        }
    }

    #[test]
    fn test_classify_internal_error_without_payload() {
        let frame = classify(r#"{"op":9}"#);
        assert_eq!(frame, Some(Frame::Error(ProtocolError::internal())));
    }

    #[test]
    fn test_malformed_frames_are_dropped() {
        assert_eq!(classify("not json"), None);
        assert_eq!(classify(r#"{"t":"x"}"#), None);
        assert_eq!(classify(r#"{"op":"zero"}"#), None);
        assert_eq!(classify(r#"{"op":42,"d":{}}"#), None);
    }

    #[test]
    fn test_envelope_to_json_roundtrips_wire_names() {
        let env = SocketEnvelope::event("Ping", json!({}), Some("c".into()));
        let json = env.to_json();
        assert!(json.contains(r#""op":0"#));
        assert!(json.contains(r#""t":"Ping""#));
        assert!(json.contains(r#""s":"c""#));
    }
}
