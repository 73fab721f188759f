// ABOUTME: ChatClient wires the gateway connection, typed event registry, and command invoker.
// ABOUTME: One object to start, observe, and shut down a running bot.

use anyhow::{Context, Result};
use chatwire_commands::{CommandInvoker, CommandOutcome, CommandTable};
use chatwire_core::{
    event_names, ConnectionEvent, ConnectionManager, ConnectionState, Connector, EventError,
    EventRegistry, EventSubscription, MessageEvent, ProtocolError, WebSocketConnector,
};
use std::sync::Arc;
use tokio::sync::{broadcast, Mutex};
use tokio::task::JoinHandle;

use crate::config::Config;

pub struct ChatClient {
    connection: Arc<ConnectionManager>,
    invoker: Arc<CommandInvoker>,
    listener: Mutex<Option<JoinHandle<()>>>,
}

impl ChatClient {
    /// Client speaking WebSocket to the configured gateway
    pub fn new(config: Config, commands: Arc<CommandTable>) -> Self {
        Self::with_connector(config, commands, Arc::new(WebSocketConnector))
    }

    pub fn with_connector(
        config: Config,
        commands: Arc<CommandTable>,
        connector: Arc<dyn Connector>,
    ) -> Self {
        let mut events = EventRegistry::with_capacity(config.gateway.event_capacity);
        events.register_defaults();

        let connection = Arc::new(ConnectionManager::new(
            config.gateway,
            connector,
            Arc::new(events),
        ));
        let invoker = Arc::new(
            CommandInvoker::new(commands, config.commands)
                .with_self_user(connection.watch_bot_user()),
        );

        Self {
            connection,
            invoker,
            listener: Mutex::new(None),
        }
    }

    /// Start routing messages to commands and open the gateway connection
    pub async fn start(&self) -> Result<()> {
        if self.connection.is_disposed() {
            anyhow::bail!("Chat client has been shut down");
        }
        self.ensure_listening().await?;
        self.connection
            .connect()
            .await
            .context("Failed to connect to gateway")?;
        tracing::info!(
            commands = self.invoker.table().len(),
            prefix = %self.invoker.prefix(),
            "Chat client started"
        );
        Ok(())
    }

    async fn ensure_listening(&self) -> Result<()> {
        let mut listener = self.listener.lock().await;
        if listener.as_ref().is_some_and(|task| !task.is_finished()) {
            return Ok(());
        }
        let subscription = self
            .connection
            .events()
            .subscribe::<MessageEvent>(event_names::CHAT_MESSAGE_CREATED)?;
        *listener = Some(self.invoker.clone().listen(subscription));
        Ok(())
    }

    /// Close the connection for good and stop routing messages.
    /// Handlers already running are left to finish.
    pub async fn shutdown(&self) {
        self.connection.dispose().await;
        if let Some(task) = self.listener.lock().await.take() {
            task.abort();
        }
        tracing::info!("Chat client shut down");
    }

    pub fn connection(&self) -> &Arc<ConnectionManager> {
        &self.connection
    }

    pub fn invoker(&self) -> &Arc<CommandInvoker> {
        &self.invoker
    }

    pub fn commands(&self) -> &Arc<CommandTable> {
        self.invoker.table()
    }

    pub fn state(&self) -> ConnectionState {
        self.connection.state()
    }

    /// Typed subscription to any registered event
    pub fn subscribe<T>(&self, event: &str) -> Result<EventSubscription<T>, EventError>
    where
        T: Send + Sync + 'static,
    {
        self.connection.events().subscribe(event)
    }

    pub fn subscribe_outcomes(&self) -> broadcast::Receiver<CommandOutcome> {
        self.invoker.subscribe_outcomes()
    }

    pub fn subscribe_notifications(&self) -> broadcast::Receiver<ConnectionEvent> {
        self.connection.subscribe_notifications()
    }

    pub fn subscribe_errors(&self) -> broadcast::Receiver<ProtocolError> {
        self.connection.subscribe_errors()
    }
}
