// ABOUTME: Integration tests for the connection manager's receive loop and resume behavior.
// ABOUTME: Drives scripted sessions through MockConnector and observes state, cursor, and streams.

use std::sync::Arc;

use chatwire_core::testing::{MockConnector, MockServer};
use chatwire_core::{
    ConnectionEvent, ConnectionManager, ConnectionState, DisconnectReason, EventRegistry,
    GatewayConfig, GatewayError, MessageEvent, ProtocolErrorKind, SocketEnvelope,
};
use serde_json::json;
use tokio::sync::broadcast;
use tokio::time::{timeout, Duration};

const WAIT: Duration = Duration::from_secs(2);

fn fast_config() -> GatewayConfig {
    let mut config = GatewayConfig::new("wss://gateway.test/ws", "secret");
    config.reconnect.initial_delay_ms = 10;
    config.reconnect.max_delay_ms = 20;
    config
}

fn manager_with(config: GatewayConfig, connector: &MockConnector) -> ConnectionManager {
    ConnectionManager::new(
        config,
        Arc::new(connector.clone()),
        Arc::new(EventRegistry::with_default_events()),
    )
}

fn message_payload(content: &str) -> serde_json::Value {
    json!({
        "serverId": "wlVr3Ggl",
        "message": {
            "id": "00000000-0000-0000-0000-000000000001",
            "channelId": "00000000-0000-0000-0000-000000000002",
            "content": content,
            "createdBy": "Ann6LewA",
            "createdAt": "2024-01-01T00:00:00Z"
        }
    })
}

async fn wait_for_state(manager: &ConnectionManager, expected: ConnectionState) {
    let mut rx = manager.watch_state();
    timeout(WAIT, rx.wait_for(|state| *state == expected))
        .await
        .expect("timed out waiting for state")
        .expect("state channel closed");
}

async fn wait_for_connects(connector: &MockConnector, count: usize) {
    timeout(WAIT, async {
        while connector.connect_count() < count {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("timed out waiting for reconnect");
}

async fn next_matching<F>(rx: &mut broadcast::Receiver<ConnectionEvent>, mut pred: F) -> ConnectionEvent
where
    F: FnMut(&ConnectionEvent) -> bool,
{
    timeout(WAIT, async {
        loop {
            let event = rx.recv().await.expect("notification channel closed");
            if pred(&event) {
                return event;
            }
        }
    })
    .await
    .expect("timed out waiting for notification")
}

/// Session that closes with 1011 as soon as the client reads from it
fn push_dropping_session(connector: &MockConnector) -> MockServer {
    let server = connector.push_session();
    server.close(1011, "overloaded");
    server
}

fn is_exhausted(event: &ConnectionEvent) -> bool {
    matches!(
        event,
        ConnectionEvent::Disconnected {
            reason: DisconnectReason::RetriesExhausted
        }
    )
}

#[tokio::test]
async fn test_connect_dispatches_events_in_order() {
    let connector = MockConnector::new();
    let server = connector.push_session();
    let manager = manager_with(fast_config(), &connector);
    let mut sub = manager
        .events()
        .subscribe::<MessageEvent>("ChatMessageCreated")
        .unwrap();

    manager.connect().await.unwrap();
    assert_eq!(manager.state(), ConnectionState::Connected);

    for (i, content) in ["one", "two", "three"].iter().enumerate() {
        server.send_envelope(&SocketEnvelope::event(
            "ChatMessageCreated",
            message_payload(content),
            Some(format!("cursor-{}", i)),
        ));
    }

    for expected in ["one", "two", "three"] {
        let item = timeout(WAIT, sub.recv()).await.unwrap().unwrap().unwrap();
        assert_eq!(item.content(), expected);
    }
    assert_eq!(manager.cursor().as_deref(), Some("cursor-2"));

    manager.dispose().await;
}

#[tokio::test]
async fn test_connect_sends_authorization_and_cursor() {
    let connector = MockConnector::new();
    let _server = connector.push_session();
    let manager = manager_with(fast_config(), &connector);
    manager.set_cursor(Some("resume-here".into()));

    manager.connect().await.unwrap();

    let requests = connector.requests();
    assert_eq!(requests.len(), 1);
    assert_eq!(requests[0].url, "wss://gateway.test/ws");
    assert_eq!(requests[0].header("Authorization"), Some("Bearer secret"));
    assert_eq!(
        requests[0].header("guilded-last-message-id"),
        Some("resume-here")
    );
    manager.dispose().await;
}

#[tokio::test]
async fn test_malformed_and_unknown_frames_do_not_stop_loop() {
    let connector = MockConnector::new();
    let server = connector.push_session();
    let manager = manager_with(fast_config(), &connector);
    let mut sub = manager
        .events()
        .subscribe::<MessageEvent>("ChatMessageCreated")
        .unwrap();
    manager.connect().await.unwrap();

    server.send_text("{not json");
    server.send_text(r#"{"op":77}"#);
    server.send_envelope(&SocketEnvelope::event("BrandNewEvent", json!({}), Some("c1".into())));
    server.send_envelope(&SocketEnvelope::event(
        "ChatMessageCreated",
        message_payload("still alive"),
        Some("c2".into()),
    ));

    let item = timeout(WAIT, sub.recv()).await.unwrap().unwrap().unwrap();
    assert_eq!(item.content(), "still alive");
    assert_eq!(manager.state(), ConnectionState::Connected);
    manager.dispose().await;
}

#[tokio::test]
async fn test_decode_error_reaches_only_its_stream() {
    let connector = MockConnector::new();
    let server = connector.push_session();
    let manager = manager_with(fast_config(), &connector);
    let mut created = manager
        .events()
        .subscribe::<MessageEvent>("ChatMessageCreated")
        .unwrap();
    let mut updated = manager
        .events()
        .subscribe::<MessageEvent>("ChatMessageUpdated")
        .unwrap();
    manager.connect().await.unwrap();

    server.send_envelope(&SocketEnvelope::event(
        "ChatMessageCreated",
        json!({"message": "wrong shape"}),
        None,
    ));
    server.send_envelope(&SocketEnvelope::event(
        "ChatMessageUpdated",
        message_payload("edited"),
        None,
    ));

    let failed = timeout(WAIT, created.recv()).await.unwrap().unwrap();
    assert!(failed.is_err());
    let ok = timeout(WAIT, updated.recv()).await.unwrap().unwrap().unwrap();
    assert_eq!(ok.content(), "edited");
    manager.dispose().await;
}

#[tokio::test]
async fn test_protocol_errors_go_to_error_stream() {
    let connector = MockConnector::new();
    let server = connector.push_session();
    let manager = manager_with(fast_config(), &connector);
    let mut errors = manager.subscribe_errors();
    manager.set_cursor(Some("old".into()));
    manager.connect().await.unwrap();

    server.send_text(r#"{"op":8,"d":{"message":"cursor expired"}}"#);
    server.send_text(r#"{"op":9}"#);

    let first = timeout(WAIT, errors.recv()).await.unwrap().unwrap();
    assert_eq!(first.kind, ProtocolErrorKind::InvalidCursor);
    assert_eq!(first.message.as_deref(), Some("cursor expired"));
    let second = timeout(WAIT, errors.recv()).await.unwrap().unwrap();
    assert_eq!(second.kind, ProtocolErrorKind::Internal);

    assert_eq!(manager.cursor(), None);
    assert_eq!(manager.state(), ConnectionState::Connected);
    manager.dispose().await;
}

#[tokio::test]
async fn test_disconnect_sends_normal_closure() {
    let connector = MockConnector::new();
    let server = connector.push_session();
    let manager = manager_with(fast_config(), &connector);
    let mut notifications = manager.subscribe_notifications();
    manager.connect().await.unwrap();

    manager.disconnect().await;

    assert_eq!(manager.state(), ConnectionState::Disconnected);
    assert_eq!(server.client_close(), Some((1000, "client disconnect".to_string())));
    let event = next_matching(&mut notifications, |e| {
        matches!(e, ConnectionEvent::Disconnected { .. })
    })
    .await;
    assert!(matches!(
        event,
        ConnectionEvent::Disconnected {
            reason: DisconnectReason::Requested
        }
    ));

    // Disconnect when already disconnected is quiet
    manager.disconnect().await;
    assert_eq!(manager.state(), ConnectionState::Disconnected);
}

#[tokio::test]
async fn test_transport_failure_resumes_with_cursor() {
    let connector = MockConnector::new();
    let first = connector.push_session();
    let second = connector.push_session();
    let manager = manager_with(fast_config(), &connector);
    let mut notifications = manager.subscribe_notifications();
    manager.connect().await.unwrap();

    first.send_envelope(&SocketEnvelope::event("Anything", json!({}), Some("last-seen".into())));
    first.fail("connection reset");

    let event = next_matching(&mut notifications, |e| {
        matches!(e, ConnectionEvent::Disconnected { .. })
    })
    .await;
    assert!(matches!(
        event,
        ConnectionEvent::Disconnected {
            reason: DisconnectReason::TransportError(_)
        }
    ));
    next_matching(&mut notifications, |e| matches!(e, ConnectionEvent::Connected)).await;
    assert_eq!(manager.state(), ConnectionState::Connected);

    let requests = connector.requests();
    assert_eq!(requests.len(), 2);
    assert_eq!(
        requests[1].header("guilded-last-message-id"),
        Some("last-seen")
    );

    second.send_text(r#"{"op":2,"d":{"lastMessageId":"replayed"},"s":"replayed"}"#);
    next_matching(&mut notifications, |e| matches!(e, ConnectionEvent::Resumed { .. })).await;
    assert_eq!(manager.cursor().as_deref(), Some("replayed"));
    manager.dispose().await;
}

#[tokio::test]
async fn test_reconnect_after_invalid_cursor_omits_cursor() {
    let connector = MockConnector::new();
    let first = connector.push_session();
    let _second = connector.push_session();
    let manager = manager_with(fast_config(), &connector);
    manager.set_cursor(Some("rejected".into()));
    manager.connect().await.unwrap();

    first.send_text(r#"{"op":8,"d":{"message":"invalid cursor"}}"#);
    first.close(4000, "resync");

    wait_for_connects(&connector, 2).await;
    wait_for_state(&manager, ConnectionState::Connected).await;

    let requests = connector.requests();
    assert_eq!(requests.len(), 2);
    assert_eq!(requests[0].header("guilded-last-message-id"), Some("rejected"));
    assert_eq!(requests[1].header("guilded-last-message-id"), None);
    manager.dispose().await;
}

#[tokio::test]
async fn test_retries_exhausted_ends_disconnected() {
    let mut config = fast_config();
    config.reconnect.max_retries = 2;
    let connector = MockConnector::new();
    let first = connector.push_session();
    connector.push_failure("refused");
    connector.push_failure("refused");
    let manager = manager_with(config, &connector);
    let mut notifications = manager.subscribe_notifications();
    manager.connect().await.unwrap();

    drop(first);

    let event = next_matching(&mut notifications, |e| {
        matches!(
            e,
            ConnectionEvent::Disconnected {
                reason: DisconnectReason::RetriesExhausted
            }
        )
    })
    .await;
    assert!(matches!(event, ConnectionEvent::Disconnected { .. }));
    wait_for_state(&manager, ConnectionState::Disconnected).await;
    assert_eq!(connector.connect_count(), 3);
}

#[tokio::test]
async fn test_reconnect_disabled_goes_straight_to_disconnected() {
    let mut config = fast_config();
    config.reconnect.enabled = false;
    let connector = MockConnector::new();
    let server = connector.push_session();
    let manager = manager_with(config, &connector);
    manager.connect().await.unwrap();

    server.close(1001, "going away");
    wait_for_state(&manager, ConnectionState::Disconnected).await;
    assert_eq!(connector.connect_count(), 1);

    // A fresh connect is allowed after the session ended
    let _next = connector.push_session();
    manager.connect().await.unwrap();
    assert_eq!(manager.state(), ConnectionState::Connected);
    manager.dispose().await;
}

#[tokio::test]
async fn test_disconnect_during_backoff_cancels_retry() {
    let mut config = fast_config();
    config.reconnect.initial_delay_ms = 60_000;
    config.reconnect.max_delay_ms = 60_000;
    let connector = MockConnector::new();
    let server = connector.push_session();
    let manager = manager_with(config, &connector);
    manager.connect().await.unwrap();

    server.fail("boom");
    wait_for_state(&manager, ConnectionState::Reconnecting).await;

    timeout(WAIT, manager.disconnect())
        .await
        .expect("disconnect should not wait out the backoff");
    assert_eq!(manager.state(), ConnectionState::Disconnected);
    assert_eq!(connector.connect_count(), 1);
}

#[tokio::test]
async fn test_heartbeat_pings_at_welcome_interval() {
    let connector = MockConnector::new();
    let server = connector.push_session();
    let manager = manager_with(fast_config(), &connector);
    let mut notifications = manager.subscribe_notifications();
    manager.connect().await.unwrap();

    server.send_text(r#"{"op":1,"d":{"heartbeatIntervalMs":20}}"#);
    next_matching(&mut notifications, |e| matches!(e, ConnectionEvent::Welcome(_))).await;

    tokio::time::sleep(Duration::from_millis(150)).await;
    assert!(server.pings() >= 2, "expected heartbeats, got {}", server.pings());
    manager.dispose().await;
}

#[tokio::test]
async fn test_disconnect_abandons_stalled_connect() {
    let connector = MockConnector::new();
    connector.push_stalled();
    let manager = Arc::new(manager_with(fast_config(), &connector));

    let connecting = tokio::spawn({
        let manager = manager.clone();
        async move { manager.connect().await }
    });
    wait_for_connects(&connector, 1).await;
    assert_eq!(manager.state(), ConnectionState::Connecting);

    timeout(WAIT, manager.disconnect())
        .await
        .expect("disconnect should not wait for the handshake");
    assert_eq!(manager.state(), ConnectionState::Disconnected);

    let result = timeout(WAIT, connecting).await.unwrap().unwrap();
    assert!(matches!(result, Err(GatewayError::Cancelled)));
    assert_eq!(manager.state(), ConnectionState::Disconnected);

    // The manager can connect again afterwards
    let _server = connector.push_session();
    manager.connect().await.unwrap();
    assert_eq!(manager.state(), ConnectionState::Connected);
    manager.dispose().await;
}

#[tokio::test]
async fn test_dispose_abandons_stalled_connect() {
    let connector = MockConnector::new();
    connector.push_stalled();
    let manager = Arc::new(manager_with(fast_config(), &connector));

    let connecting = tokio::spawn({
        let manager = manager.clone();
        async move { manager.connect().await }
    });
    wait_for_connects(&connector, 1).await;

    timeout(WAIT, manager.dispose())
        .await
        .expect("dispose should not wait for the handshake");
    assert_eq!(manager.state(), ConnectionState::Disconnected);

    let result = timeout(WAIT, connecting).await.unwrap().unwrap();
    assert!(matches!(result, Err(GatewayError::Cancelled)));
    assert!(matches!(manager.connect().await, Err(GatewayError::Disposed)));
}

#[tokio::test]
async fn test_server_accepting_then_dropping_exhausts_retries() {
    let mut config = fast_config();
    config.reconnect.max_retries = 2;
    let connector = MockConnector::new();
    let _servers: Vec<MockServer> = (0..10).map(|_| push_dropping_session(&connector)).collect();
    let manager = manager_with(config, &connector);
    let mut notifications = manager.subscribe_notifications();

    manager.connect().await.unwrap();

    next_matching(&mut notifications, is_exhausted).await;
    wait_for_state(&manager, ConnectionState::Disconnected).await;
    assert_eq!(connector.connect_count(), 3);
}

#[tokio::test]
async fn test_session_delivering_frames_restarts_resume_attempts() {
    let mut config = fast_config();
    config.reconnect.max_retries = 1;
    let connector = MockConnector::new();
    let _first = push_dropping_session(&connector);
    let healthy = connector.push_session();
    healthy.send_text(r#"{"op":2,"d":{},"s":"after-resume"}"#);
    healthy.close(1011, "overloaded");
    let _third = push_dropping_session(&connector);
    let _spare = push_dropping_session(&connector);
    let manager = manager_with(config, &connector);
    let mut notifications = manager.subscribe_notifications();

    manager.connect().await.unwrap();

    next_matching(&mut notifications, is_exhausted).await;
    // first connect, one retry that delivered a frame, one more retry after it
    assert_eq!(connector.connect_count(), 3);
    assert_eq!(manager.cursor().as_deref(), Some("after-resume"));
}
