// ABOUTME: Gateway connection settings, deserializable from the [gateway] TOML table.
// ABOUTME: Provides defaults for endpoint, cursor header, heartbeat, buffers, and reconnect backoff.

use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::reconnect::ResumePolicy;

#[derive(Clone, Serialize, Deserialize)]
pub struct GatewayConfig {
    #[serde(default = "default_url")]
    pub url: String,
    /// Bot access token, sent as a bearer authorization header
    #[serde(default)]
    pub token: String,
    /// Header carrying the resumption cursor on (re)connect
    #[serde(default = "default_cursor_header")]
    pub cursor_header: String,
    /// Heartbeat used until the welcome frame announces one
    #[serde(default = "default_heartbeat_ms")]
    pub heartbeat_ms: u64,
    /// Per-event-kind broadcast buffer
    #[serde(default = "default_event_capacity")]
    pub event_capacity: usize,
    #[serde(default)]
    pub reconnect: ReconnectConfig,
}

// Custom Debug impl to redact the token
impl std::fmt::Debug for GatewayConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GatewayConfig")
            .field("url", &self.url)
            .field("token", &"[REDACTED]")
            .field("cursor_header", &self.cursor_header)
            .field("heartbeat_ms", &self.heartbeat_ms)
            .field("event_capacity", &self.event_capacity)
            .field("reconnect", &self.reconnect)
            .finish()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReconnectConfig {
    /// Resume automatically after a transport failure
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default = "default_initial_delay_ms")]
    pub initial_delay_ms: u64,
    #[serde(default = "default_max_delay_ms")]
    pub max_delay_ms: u64,
    #[serde(default = "default_multiplier")]
    pub multiplier: u32,
    /// 0 = retry forever
    #[serde(default)]
    pub max_retries: u32,
}

impl ReconnectConfig {
    pub fn policy(&self) -> ResumePolicy {
        ResumePolicy {
            initial_delay: Duration::from_millis(self.initial_delay_ms),
            max_delay: Duration::from_millis(self.max_delay_ms),
            multiplier: self.multiplier.max(1),
            max_attempts: (self.max_retries > 0).then_some(self.max_retries),
        }
    }
}

impl Default for ReconnectConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            initial_delay_ms: default_initial_delay_ms(),
            max_delay_ms: default_max_delay_ms(),
            multiplier: default_multiplier(),
            max_retries: 0,
        }
    }
}

impl GatewayConfig {
    pub fn new(url: impl Into<String>, token: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            token: token.into(),
            ..Self::default()
        }
    }

    pub fn heartbeat(&self) -> Duration {
        Duration::from_millis(self.heartbeat_ms.max(1))
    }
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            url: default_url(),
            token: String::new(),
            cursor_header: default_cursor_header(),
            heartbeat_ms: default_heartbeat_ms(),
            event_capacity: default_event_capacity(),
            reconnect: ReconnectConfig::default(),
        }
    }
}

fn default_url() -> String {
    "wss://www.guilded.gg/websocket/v1".to_string()
}

fn default_cursor_header() -> String {
    "guilded-last-message-id".to_string()
}

fn default_heartbeat_ms() -> u64 {
    22_500
}

fn default_event_capacity() -> usize {
    crate::events::DEFAULT_EVENT_CAPACITY
}

fn default_true() -> bool {
    true
}

fn default_initial_delay_ms() -> u64 {
    2_000
}

fn default_max_delay_ms() -> u64 {
    60_000
}

fn default_multiplier() -> u32 {
    2
}
