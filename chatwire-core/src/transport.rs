// ABOUTME: Transport seam between the connection manager and the wire.
// ABOUTME: Connector/Socket traits plus the default WebSocket implementation over tokio-tungstenite.

use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http::{HeaderName, HeaderValue};
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::Message;

use crate::error::GatewayError;

/// WebSocket close code for a normal, requested closure
pub const NORMAL_CLOSURE: u16 = 1000;

/// Everything needed to open one gateway session
#[derive(Clone, PartialEq, Eq)]
pub struct ConnectRequest {
    pub url: String,
    /// Outbound headers, including authorization and the resume cursor
    pub headers: Vec<(String, String)>,
}

impl ConnectRequest {
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }
}

// Custom Debug impl to redact credentials
impl std::fmt::Debug for ConnectRequest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let headers: Vec<(&str, &str)> = self
            .headers
            .iter()
            .map(|(k, v)| {
                if k.eq_ignore_ascii_case("authorization") {
                    (k.as_str(), "[REDACTED]")
                } else {
                    (k.as_str(), v.as_str())
                }
            })
            .collect();
        f.debug_struct("ConnectRequest")
            .field("url", &self.url)
            .field("headers", &headers)
            .finish()
    }
}

/// One inbound unit from a socket
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Inbound {
    /// A text frame carrying one envelope
    Text(String),
    /// The peer closed the connection
    Closed { code: Option<u16>, reason: String },
}

/// An open gateway session
#[async_trait]
pub trait Socket: Send {
    /// Next inbound item; None when the stream ends without a close frame
    async fn recv(&mut self) -> Option<Result<Inbound, GatewayError>>;

    /// Keep-alive ping
    async fn ping(&mut self) -> Result<(), GatewayError>;

    /// Close the session with a code and reason
    async fn close(&mut self, code: u16, reason: &str) -> Result<(), GatewayError>;
}

/// Opens sockets. One connector serves every (re)connect of a manager.
#[async_trait]
pub trait Connector: Send + Sync {
    async fn connect(&self, request: &ConnectRequest) -> Result<Box<dyn Socket>, GatewayError>;
}

// =============================================================================
// WebSocket transport
// =============================================================================

type WsStream =
    tokio_tungstenite::WebSocketStream<tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>>;

/// Default connector speaking WebSocket
#[derive(Debug, Clone, Copy, Default)]
pub struct WebSocketConnector;

#[async_trait]
impl Connector for WebSocketConnector {
    async fn connect(&self, request: &ConnectRequest) -> Result<Box<dyn Socket>, GatewayError> {
        let mut ws_request = request
            .url
            .as_str()
            .into_client_request()
            .map_err(|e| GatewayError::Connect(e.to_string()))?;

        for (name, value) in &request.headers {
            let header_name =
                HeaderName::from_bytes(name.as_bytes()).map_err(|e| GatewayError::InvalidHeader {
                    name: name.clone(),
                    reason: e.to_string(),
                })?;
            let header_value =
                HeaderValue::from_str(value).map_err(|e| GatewayError::InvalidHeader {
                    name: name.clone(),
                    reason: e.to_string(),
                })?;
            ws_request.headers_mut().insert(header_name, header_value);
        }

        tracing::info!(url = %request.url, "Connecting to gateway");
        let (stream, _) = tokio_tungstenite::connect_async(ws_request)
            .await
            .map_err(|e| GatewayError::Connect(e.to_string()))?;

        Ok(Box::new(WebSocketSocket { stream }))
    }
}

struct WebSocketSocket {
    stream: WsStream,
}

#[async_trait]
impl Socket for WebSocketSocket {
    async fn recv(&mut self) -> Option<Result<Inbound, GatewayError>> {
        loop {
            let message = match self.stream.next().await? {
                Ok(message) => message,
                Err(e) => return Some(Err(GatewayError::Transport(e.to_string()))),
            };
            match message {
                Message::Text(text) => return Some(Ok(Inbound::Text(text.to_string()))),
                Message::Close(frame) => {
                    let (code, reason) = match frame {
                        Some(frame) => (Some(u16::from(frame.code)), frame.reason.to_string()),
                        None => (None, String::new()),
                    };
                    return Some(Ok(Inbound::Closed { code, reason }));
                }
                // Pings are answered by tungstenite; pongs and binary carry nothing for us
                _ => continue,
            }
        }
    }

    async fn ping(&mut self) -> Result<(), GatewayError> {
        self.stream
            .send(Message::Ping(Vec::<u8>::new().into()))
            .await
            .map_err(|e| GatewayError::Transport(e.to_string()))
    }

    async fn close(&mut self, code: u16, reason: &str) -> Result<(), GatewayError> {
        let frame = CloseFrame {
            code: CloseCode::from(code),
            reason: reason.to_string().into(),
        };
        self.stream
            .close(Some(frame))
            .await
            .map_err(|e| GatewayError::Transport(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_header_lookup_is_case_insensitive() {
        let request = ConnectRequest {
            url: "wss://example.test/ws".into(),
            headers: vec![("Last-Message-Id".into(), "abc".into())],
        };
        assert_eq!(request.header("last-message-id"), Some("abc"));
        assert_eq!(request.header("missing"), None);
    }

    #[test]
    fn test_debug_redacts_authorization() {
        let request = ConnectRequest {
            url: "wss://example.test/ws".into(),
            headers: vec![("Authorization".into(), "Bearer secret".into())],
        };
        let debug = format!("{:?}", request);
        assert!(!debug.contains("secret"));
        assert!(debug.contains("[REDACTED]"));
    }
}
