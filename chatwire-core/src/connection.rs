// ABOUTME: Gateway connection manager: socket lifecycle, resume cursor, and the receive loop.
// ABOUTME: Frames flow classifier -> cursor bookkeeping -> event dispatcher on one task per session.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, watch, Mutex};
use tokio::task::JoinHandle;

use crate::config::GatewayConfig;
use crate::envelope::{self, Frame};
use crate::error::{GatewayError, ProtocolError};
use crate::events::EventRegistry;
use crate::model::{BotUser, WelcomePayload};
use crate::reconnect::{ResumeAttempt, ResumeSchedule};
use crate::transport::{
    ConnectRequest, Connector, Inbound, Socket, WebSocketConnector, NORMAL_CLOSURE,
};

/// Buffer for connection notifications and protocol errors
const NOTIFICATION_CAPACITY: usize = 64;

/// How long `disconnect` waits for the receive task to send its close frame
const SHUTDOWN_GRACE: Duration = Duration::from_secs(5);

/// Welcome heartbeat intervals below this are ignored
const MIN_HEARTBEAT: Duration = Duration::from_millis(10);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
    Reconnecting,
}

/// Why a session ended
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DisconnectReason {
    /// `disconnect()` or `dispose()` was called
    Requested,
    /// The service sent a close frame
    ClosedByServer { code: Option<u16>, reason: String },
    /// Socket I/O failed, including a failed heartbeat
    TransportError(String),
    /// The socket stream ended without a close frame
    StreamEnded,
    /// Automatic resume gave up
    RetriesExhausted,
}

/// Lifecycle notifications, independent of the typed event streams
#[derive(Debug, Clone)]
pub enum ConnectionEvent {
    Connected,
    Welcome(Arc<WelcomePayload>),
    Resumed { cursor: Option<String> },
    Reconnecting { attempt: u32, delay: Duration },
    Disconnected { reason: DisconnectReason },
}

/// State shared between the manager and its receive task
struct Shared {
    config: GatewayConfig,
    connector: Arc<dyn Connector>,
    events: Arc<EventRegistry>,
    state: watch::Sender<ConnectionState>,
    cursor: watch::Sender<Option<String>>,
    heartbeat: watch::Sender<Duration>,
    bot_user: watch::Sender<Option<BotUser>>,
    notifications: broadcast::Sender<ConnectionEvent>,
    errors: broadcast::Sender<ProtocolError>,
}

impl Shared {
    fn set_state(&self, next: ConnectionState) -> ConnectionState {
        let previous = self.state.send_replace(next);
        if previous != next {
            tracing::debug!(from = ?previous, to = ?next, "Connection state changed");
        }
        previous
    }

    fn notify(&self, event: ConnectionEvent) {
        // No listeners is fine
        let _ = self.notifications.send(event);
    }

    fn connect_request(&self) -> ConnectRequest {
        let mut headers = Vec::new();
        if !self.config.token.is_empty() {
            headers.push((
                "Authorization".to_string(),
                format!("Bearer {}", self.config.token),
            ));
        }
        if let Some(cursor) = self.cursor.borrow().as_ref() {
            headers.push((self.config.cursor_header.clone(), cursor.clone()));
        }
        ConnectRequest {
            url: self.config.url.clone(),
            headers,
        }
    }

    /// Classify one raw frame and route it
    fn ingest(&self, raw: &str) {
        let Some(frame) = envelope::classify(raw) else {
            return;
        };

        match frame {
            Frame::Event {
                name,
                payload,
                cursor,
            } => {
                if let Some(cursor) = cursor {
                    self.cursor.send_replace(Some(cursor));
                }
                self.events.dispatch(&name, &payload);
            }
            Frame::Welcome(payload) => match serde_json::from_value::<WelcomePayload>(payload) {
                Ok(welcome) => {
                    let interval = Duration::from_millis(welcome.heartbeat_interval_ms);
                    if interval < MIN_HEARTBEAT {
                        tracing::warn!(
                            heartbeat_ms = welcome.heartbeat_interval_ms,
                            current_ms = self.heartbeat.borrow().as_millis() as u64,
                            "Ignoring implausible heartbeat interval in welcome"
                        );
                    } else {
                        self.heartbeat.send_if_modified(|current| {
                            let changed = *current != interval;
                            *current = interval;
                            changed
                        });
                    }
                    self.bot_user.send_replace(welcome.user.clone());
                    tracing::info!(
                        heartbeat_ms = welcome.heartbeat_interval_ms,
                        bot = ?welcome.user.as_ref().map(|u| u.name.as_str()),
                        "Gateway welcome received"
                    );
                    self.notify(ConnectionEvent::Welcome(Arc::new(welcome)));
                }
                Err(e) => tracing::warn!(error = %e, "Malformed welcome payload"),
            },
            Frame::Resumed { cursor, .. } => {
                if let Some(cursor) = &cursor {
                    self.cursor.send_replace(Some(cursor.clone()));
                }
                tracing::info!(cursor = ?cursor, "Gateway session resumed");
                self.notify(ConnectionEvent::Resumed { cursor });
            }
            Frame::Error(err) => {
                if err.invalidates_cursor() {
                    self.cursor.send_replace(None);
                    tracing::warn!(error = %err, "Resume cursor rejected, cleared for a full resync");
                } else {
                    tracing::error!(error = %err, "Gateway reported an error");
                }
                let _ = self.errors.send(err);
            }
        }
    }
}

/// Handle to a session, from the start of `connect` until it ends
struct SessionHandle {
    id: u64,
    cancel: watch::Sender<bool>,
    /// Receive task, absent while the transport is still opening
    task: Option<JoinHandle<()>>,
}

impl SessionHandle {
    fn is_live(&self) -> bool {
        self.task.as_ref().map_or(true, |task| !task.is_finished())
    }
}

/// Owns the gateway socket lifecycle.
///
/// Frames are received on one spawned task per session and processed in
/// order. The cursor and state are written only by that task (and by
/// `connect` before the task exists).
pub struct ConnectionManager {
    shared: Arc<Shared>,
    session: Mutex<Option<SessionHandle>>,
    next_session: AtomicU64,
    disposed: AtomicBool,
}

impl ConnectionManager {
    pub fn new(
        config: GatewayConfig,
        connector: Arc<dyn Connector>,
        events: Arc<EventRegistry>,
    ) -> Self {
        let heartbeat = config.heartbeat();
        let (state, _) = watch::channel(ConnectionState::Disconnected);
        let (cursor, _) = watch::channel(None);
        let (heartbeat, _) = watch::channel(heartbeat);
        let (bot_user, _) = watch::channel(None);
        let (notifications, _) = broadcast::channel(NOTIFICATION_CAPACITY);
        let (errors, _) = broadcast::channel(NOTIFICATION_CAPACITY);

        Self {
            shared: Arc::new(Shared {
                config,
                connector,
                events,
                state,
                cursor,
                heartbeat,
                bot_user,
                notifications,
                errors,
            }),
            session: Mutex::new(None),
            next_session: AtomicU64::new(0),
            disposed: AtomicBool::new(false),
        }
    }

    /// Manager speaking WebSocket to `config.url`
    pub fn with_websocket(config: GatewayConfig, events: Arc<EventRegistry>) -> Self {
        Self::new(config, Arc::new(WebSocketConnector), events)
    }

    /// Open the transport, sending the held cursor (if any) so the service
    /// replays what was missed. Calling this on a live or opening session is
    /// a no-op. A `disconnect` while the transport is opening abandons the
    /// attempt with `GatewayError::Cancelled`.
    pub async fn connect(&self) -> Result<(), GatewayError> {
        if self.disposed.load(Ordering::Acquire) {
            return Err(GatewayError::Disposed);
        }

        let id = self.next_session.fetch_add(1, Ordering::Relaxed);
        let mut cancel_rx = {
            let mut session = self.session.lock().await;
            if self.disposed.load(Ordering::Acquire) {
                return Err(GatewayError::Disposed);
            }
            if session.as_ref().is_some_and(SessionHandle::is_live) {
                tracing::debug!("Gateway session already running");
                return Ok(());
            }
            let (cancel, cancel_rx) = watch::channel(false);
            *session = Some(SessionHandle {
                id,
                cancel,
                task: None,
            });
            self.shared.set_state(ConnectionState::Connecting);
            cancel_rx
        };

        let request = self.shared.connect_request();
        tracing::debug!(request = ?request, "Opening gateway session");

        let result = tokio::select! {
            _ = cancelled(&mut cancel_rx) => {
                tracing::debug!("Gateway connect abandoned by disconnect");
                return Err(GatewayError::Cancelled);
            }
            result = self.shared.connector.connect(&request) => result,
        };

        let mut session = self.session.lock().await;
        if !session.as_ref().is_some_and(|handle| handle.id == id) {
            drop(session);
            if let Ok(mut socket) = result {
                let _ = socket.close(NORMAL_CLOSURE, "client disconnect").await;
            }
            tracing::debug!("Gateway connect abandoned by disconnect");
            return Err(GatewayError::Cancelled);
        }

        let socket = match result {
            Ok(socket) => socket,
            Err(e) => {
                *session = None;
                self.shared.set_state(ConnectionState::Disconnected);
                tracing::error!(error = %e, "Gateway connection failed");
                return Err(e);
            }
        };

        self.shared.set_state(ConnectionState::Connected);
        self.shared.notify(ConnectionEvent::Connected);
        let resuming = request.header(&self.shared.config.cursor_header).is_some();
        tracing::info!(resuming, "Gateway connected");

        let task = tokio::spawn(run_session(self.shared.clone(), socket, cancel_rx));
        if let Some(handle) = session.as_mut() {
            handle.task = Some(task);
        }
        Ok(())
    }

    /// Close the transport with a normal-closure reason and mark the
    /// connection Disconnected. Command handlers already running are not
    /// waited for.
    pub async fn disconnect(&self) {
        let handle = self.session.lock().await.take();
        if let Some(SessionHandle { cancel, task, .. }) = handle {
            let _ = cancel.send(true);
            if let Some(mut task) = task {
                if tokio::time::timeout(SHUTDOWN_GRACE, &mut task).await.is_err() {
                    tracing::warn!("Receive task did not stop in time, aborting");
                    task.abort();
                }
            }
        }

        let previous = self.shared.set_state(ConnectionState::Disconnected);
        if previous != ConnectionState::Disconnected {
            tracing::info!("Gateway disconnected");
            self.shared.notify(ConnectionEvent::Disconnected {
                reason: DisconnectReason::Requested,
            });
        }
    }

    /// Disconnect and release the transport for good. Idempotent.
    pub async fn dispose(&self) {
        if self.disposed.swap(true, Ordering::AcqRel) {
            return;
        }
        self.disconnect().await;
        tracing::debug!("Connection manager disposed");
    }

    /// Run one raw frame through classification and bookkeeping, exactly as
    /// the receive loop does
    pub fn ingest(&self, raw: &str) {
        self.shared.ingest(raw);
    }

    pub fn state(&self) -> ConnectionState {
        *self.shared.state.borrow()
    }

    pub fn watch_state(&self) -> watch::Receiver<ConnectionState> {
        self.shared.state.subscribe()
    }

    /// Last cursor observed in this session
    pub fn cursor(&self) -> Option<String> {
        self.shared.cursor.borrow().clone()
    }

    /// Seed the cursor from a previous process before the first `connect`
    pub fn set_cursor(&self, cursor: Option<String>) {
        self.shared.cursor.send_replace(cursor);
    }

    /// Bot identity announced by the last welcome frame
    pub fn bot_user(&self) -> Option<BotUser> {
        self.shared.bot_user.borrow().clone()
    }

    pub fn watch_bot_user(&self) -> watch::Receiver<Option<BotUser>> {
        self.shared.bot_user.subscribe()
    }

    /// Heartbeat interval currently in effect
    pub fn heartbeat_interval(&self) -> Duration {
        *self.shared.heartbeat.borrow()
    }

    pub fn is_disposed(&self) -> bool {
        self.disposed.load(Ordering::Acquire)
    }

    pub fn subscribe_notifications(&self) -> broadcast::Receiver<ConnectionEvent> {
        self.shared.notifications.subscribe()
    }

    pub fn subscribe_errors(&self) -> broadcast::Receiver<ProtocolError> {
        self.shared.errors.subscribe()
    }

    pub fn events(&self) -> &Arc<EventRegistry> {
        &self.shared.events
    }

    /// Request that the next `connect` would send
    pub fn connect_request(&self) -> ConnectRequest {
        self.shared.connect_request()
    }
}

// =============================================================================
// Receive task
// =============================================================================

enum SessionExit {
    Cancelled,
    Dropped(DisconnectReason),
}

/// Resolves once cancellation is requested or the manager is gone
async fn cancelled(rx: &mut watch::Receiver<bool>) {
    while !*rx.borrow_and_update() {
        if rx.changed().await.is_err() {
            return;
        }
    }
}

async fn run_session(
    shared: Arc<Shared>,
    mut socket: Box<dyn Socket>,
    mut cancel_rx: watch::Receiver<bool>,
) {
    let mut schedule = ResumeSchedule::new(shared.config.reconnect.policy());

    loop {
        let exit = receive_loop(&shared, socket.as_mut(), &mut cancel_rx, &mut schedule).await;
        let reason = match exit {
            SessionExit::Cancelled => {
                if let Err(e) = socket.close(NORMAL_CLOSURE, "client disconnect").await {
                    tracing::debug!(error = %e, "Close frame not delivered");
                }
                return;
            }
            SessionExit::Dropped(reason) => reason,
        };

        tracing::warn!(reason = ?reason, "Gateway session dropped");
        drop(socket);

        if !shared.config.reconnect.enabled {
            shared.set_state(ConnectionState::Disconnected);
            shared.notify(ConnectionEvent::Disconnected { reason });
            return;
        }

        shared.set_state(ConnectionState::Reconnecting);
        shared.notify(ConnectionEvent::Disconnected { reason });

        socket = loop {
            let Some(ResumeAttempt {
                number: attempt,
                delay,
            }) = schedule.next_attempt()
            else {
                tracing::error!(
                    attempts = schedule.attempts(),
                    "Gateway resume retries exhausted"
                );
                shared.set_state(ConnectionState::Disconnected);
                shared.notify(ConnectionEvent::Disconnected {
                    reason: DisconnectReason::RetriesExhausted,
                });
                return;
            };

            tracing::info!(attempt, delay_ms = delay.as_millis() as u64, "Reconnecting to gateway");
            shared.notify(ConnectionEvent::Reconnecting { attempt, delay });

            tokio::select! {
                _ = cancelled(&mut cancel_rx) => return,
                _ = tokio::time::sleep(delay) => {}
            }

            let request = shared.connect_request();
            let result = tokio::select! {
                _ = cancelled(&mut cancel_rx) => return,
                result = shared.connector.connect(&request) => result,
            };

            match result {
                Ok(socket) => {
                    shared.set_state(ConnectionState::Connected);
                    shared.notify(ConnectionEvent::Connected);
                    tracing::info!(attempt, "Gateway reconnected");
                    break socket;
                }
                Err(e) => tracing::warn!(attempt, error = %e, "Gateway reconnect failed"),
            }
        };
    }
}

/// Pull frames until the session ends or cancellation is requested.
/// The first frame of a session clears the resume attempt count.
async fn receive_loop(
    shared: &Shared,
    socket: &mut dyn Socket,
    cancel_rx: &mut watch::Receiver<bool>,
    schedule: &mut ResumeSchedule,
) -> SessionExit {
    let mut heartbeat_rx = shared.heartbeat.subscribe();
    let mut heartbeat = new_heartbeat(*heartbeat_rx.borrow_and_update());

    loop {
        tokio::select! {
            _ = cancelled(cancel_rx) => return SessionExit::Cancelled,
            Ok(()) = heartbeat_rx.changed() => {
                heartbeat = new_heartbeat(*heartbeat_rx.borrow_and_update());
            }
            _ = heartbeat.tick() => {
                if let Err(e) = socket.ping().await {
                    return SessionExit::Dropped(DisconnectReason::TransportError(e.to_string()));
                }
            }
            inbound = socket.recv() => match inbound {
                Some(Ok(Inbound::Text(text))) => {
                    if schedule.mark_healthy() {
                        tracing::debug!("Gateway session delivering frames, resume attempts reset");
                    }
                    shared.ingest(&text);
                }
                Some(Ok(Inbound::Closed { code, reason })) => {
                    return SessionExit::Dropped(DisconnectReason::ClosedByServer { code, reason });
                }
                Some(Err(e)) => {
                    return SessionExit::Dropped(DisconnectReason::TransportError(e.to_string()));
                }
                None => return SessionExit::Dropped(DisconnectReason::StreamEnded),
            },
        }
    }
}

/// Heartbeat ticker whose first tick fires one period from now
fn new_heartbeat(period: Duration) -> tokio::time::Interval {
    let mut interval = tokio::time::interval_at(tokio::time::Instant::now() + period, period);
    interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
    interval
}
