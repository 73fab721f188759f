// ABOUTME: Real-time gateway layer for the chat platform client.
// ABOUTME: Connection lifecycle, frame classification, resume cursor, and typed event fan-out.

pub mod config;
pub mod connection;
pub mod envelope;
pub mod error;
pub mod events;
pub mod model;
pub mod reconnect;
pub mod testing;
pub mod transport;

pub use config::{GatewayConfig, ReconnectConfig};
pub use connection::{ConnectionEvent, ConnectionManager, ConnectionState, DisconnectReason};
pub use envelope::{classify, Frame, SocketEnvelope};
pub use error::{EventError, GatewayError, ProtocolError, ProtocolErrorKind};
pub use events::{EventDescriptor, EventItem, EventRegistry, EventSubscription};
pub use model::{event_names, BotUser, ChatMessage, HashId, MessageEvent, WelcomePayload};
pub use transport::{ConnectRequest, Connector, Inbound, Socket, WebSocketConnector};
