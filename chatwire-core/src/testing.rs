// ABOUTME: In-memory connector and scripted sockets for exercising the connection layer.
// ABOUTME: Tests push frames through a MockServer handle and inspect what the client sent.

use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::mpsc;

use crate::envelope::SocketEnvelope;
use crate::error::GatewayError;
use crate::transport::{ConnectRequest, Connector, Inbound, Socket};

type ScriptedInbound = Result<Inbound, String>;

enum Script {
    Session(MockSocket),
    Failure(String),
    Stalled,
}

/// Connector that hands out pre-scripted sessions in order.
///
/// Each `connect` pops the next script; with nothing scripted the connect
/// fails. Every request is recorded for inspection.
#[derive(Clone, Default)]
pub struct MockConnector {
    scripts: Arc<Mutex<VecDeque<Script>>>,
    requests: Arc<Mutex<Vec<ConnectRequest>>>,
}

impl MockConnector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a session that will accept the next connect
    pub fn push_session(&self) -> MockServer {
        let (tx, rx) = mpsc::unbounded_channel();
        let state = Arc::new(MockSocketState::default());
        self.scripts
            .lock()
            .unwrap()
            .push_back(Script::Session(MockSocket {
                rx,
                state: state.clone(),
            }));
        MockServer { tx, state }
    }

    /// Queue a connect failure
    pub fn push_failure(&self, message: impl Into<String>) {
        self.scripts
            .lock()
            .unwrap()
            .push_back(Script::Failure(message.into()));
    }

    /// Queue a connect that never completes, like a gateway that accepts
    /// the TCP connection and never answers the handshake
    pub fn push_stalled(&self) {
        self.scripts.lock().unwrap().push_back(Script::Stalled);
    }

    /// Requests seen so far, oldest first
    pub fn requests(&self) -> Vec<ConnectRequest> {
        self.requests.lock().unwrap().clone()
    }

    pub fn connect_count(&self) -> usize {
        self.requests.lock().unwrap().len()
    }
}

#[async_trait]
impl Connector for MockConnector {
    async fn connect(&self, request: &ConnectRequest) -> Result<Box<dyn Socket>, GatewayError> {
        self.requests.lock().unwrap().push(request.clone());
        let next = self.scripts.lock().unwrap().pop_front();
        match next {
            Some(Script::Session(socket)) => Ok(Box::new(socket)),
            Some(Script::Failure(message)) => Err(GatewayError::Connect(message)),
            Some(Script::Stalled) => std::future::pending().await,
            None => Err(GatewayError::Connect("no scripted session".to_string())),
        }
    }
}

#[derive(Default)]
struct MockSocketState {
    pings: AtomicUsize,
    close: Mutex<Option<(u16, String)>>,
}

struct MockSocket {
    rx: mpsc::UnboundedReceiver<ScriptedInbound>,
    state: Arc<MockSocketState>,
}

#[async_trait]
impl Socket for MockSocket {
    async fn recv(&mut self) -> Option<Result<Inbound, GatewayError>> {
        self.rx
            .recv()
            .await
            .map(|item| item.map_err(GatewayError::Transport))
    }

    async fn ping(&mut self) -> Result<(), GatewayError> {
        self.state.pings.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn close(&mut self, code: u16, reason: &str) -> Result<(), GatewayError> {
        *self.state.close.lock().unwrap() = Some((code, reason.to_string()));
        Ok(())
    }
}

/// Server side of a scripted session. Dropping it ends the client's stream.
pub struct MockServer {
    tx: mpsc::UnboundedSender<ScriptedInbound>,
    state: Arc<MockSocketState>,
}

impl MockServer {
    pub fn send_text(&self, text: impl Into<String>) {
        let _ = self.tx.send(Ok(Inbound::Text(text.into())));
    }

    pub fn send_envelope(&self, envelope: &SocketEnvelope) {
        self.send_text(envelope.to_json());
    }

    /// Send a close frame from the server
    pub fn close(&self, code: u16, reason: impl Into<String>) {
        let _ = self.tx.send(Ok(Inbound::Closed {
            code: Some(code),
            reason: reason.into(),
        }));
    }

    /// Fail the socket with an I/O error
    pub fn fail(&self, message: impl Into<String>) {
        let _ = self.tx.send(Err(message.into()));
    }

    pub fn pings(&self) -> usize {
        self.state.pings.load(Ordering::SeqCst)
    }

    /// Close frame the client sent, if any
    pub fn client_close(&self) -> Option<(u16, String)> {
        self.state.close.lock().unwrap().clone()
    }
}
