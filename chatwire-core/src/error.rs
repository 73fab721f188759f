// ABOUTME: Typed errors for the gateway connection and event dispatch layers.
// ABOUTME: Protocol errors (op 8/9) are values on the error stream, not failures of the loop.

use std::sync::Arc;
use thiserror::Error;

/// Failures surfaced by `ConnectionManager` operations and transports
#[derive(Debug, Error)]
pub enum GatewayError {
    #[error("failed to connect to gateway: {0}")]
    Connect(String),

    #[error("transport error: {0}")]
    Transport(String),

    #[error("invalid outbound header {name}: {reason}")]
    InvalidHeader { name: String, reason: String },

    #[error("connection manager has been disposed")]
    Disposed,

    #[error("connect was abandoned by a disconnect")]
    Cancelled,
}

/// Errors raised by the event registry
#[derive(Debug, Clone, Error)]
pub enum EventError {
    #[error("event {event} is not registered")]
    NotRegistered { event: String },

    #[error("event {event} is registered as {registered}, not {requested}")]
    TypeMismatch {
        event: String,
        registered: &'static str,
        requested: &'static str,
    },

    /// Payload transform failed; delivered only to that event's subscribers
    #[error("failed to decode {event} payload: {message}")]
    Decode { event: String, message: String },
}

/// Kind of protocol error reported by the service
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProtocolErrorKind {
    /// Opcode 8: the resumption cursor was rejected, or the request was malformed
    InvalidCursor,
    /// Opcode 9: the service failed internally
    Internal,
}

/// A protocol error frame, published on the connection's error stream
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProtocolError {
    pub kind: ProtocolErrorKind,
    pub message: Option<String>,
}

impl ProtocolError {
    pub fn invalid_cursor(message: Option<String>) -> Self {
        Self {
            kind: ProtocolErrorKind::InvalidCursor,
            message,
        }
    }

    pub fn internal() -> Self {
        Self {
            kind: ProtocolErrorKind::Internal,
            message: None,
        }
    }

    /// Whether receiving this error invalidates the stored cursor
    pub fn invalidates_cursor(&self) -> bool {
        self.kind == ProtocolErrorKind::InvalidCursor
    }
}

impl std::fmt::Display for ProtocolError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let label = match self.kind {
            ProtocolErrorKind::InvalidCursor => "invalid cursor",
            ProtocolErrorKind::Internal => "internal server error",
        };
        match &self.message {
            Some(message) => write!(f, "{}: {}", label, message),
            None => f.write_str(label),
        }
    }
}

/// Shared form of a decode failure so one error can fan out to many subscribers
pub type SharedEventError = Arc<EventError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_invalid_cursor_invalidates() {
        assert!(ProtocolError::invalid_cursor(None).invalidates_cursor());
        assert!(!ProtocolError::internal().invalidates_cursor());
    }

    #[test]
    fn test_protocol_error_display() {
        let err = ProtocolError::invalid_cursor(Some("stale id".into()));
        assert_eq!(err.to_string(), "invalid cursor: stale id");
        assert_eq!(ProtocolError::internal().to_string(), "internal server error");
    }
}
