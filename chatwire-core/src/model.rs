// ABOUTME: Payload models for the handful of events the command engine consumes.
// ABOUTME: Includes the platform's 8-character hashed identifier and handshake payloads.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// Event names dispatched by the gateway
pub mod event_names {
    pub const CHAT_MESSAGE_CREATED: &str = "ChatMessageCreated";
    pub const CHAT_MESSAGE_UPDATED: &str = "ChatMessageUpdated";
    pub const CHAT_MESSAGE_DELETED: &str = "ChatMessageDeleted";
}

// =============================================================================
// Hashed identifiers
// =============================================================================

/// Platform identifier for users and servers, e.g. `Ann6LewA`
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct HashId(String);

/// Length of every hashed identifier
pub const HASH_ID_LEN: usize = 8;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid hashed identifier {0:?}: expected {HASH_ID_LEN} ASCII alphanumerics")]
pub struct InvalidHashId(pub String);

impl HashId {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl FromStr for HashId {
    type Err = InvalidHashId;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.len() == HASH_ID_LEN && s.bytes().all(|b| b.is_ascii_alphanumeric()) {
            Ok(Self(s.to_string()))
        } else {
            Err(InvalidHashId(s.to_string()))
        }
    }
}

impl TryFrom<String> for HashId {
    type Error = InvalidHashId;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<HashId> for String {
    fn from(id: HashId) -> Self {
        id.0
    }
}

impl fmt::Display for HashId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

// =============================================================================
// Chat messages
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageType {
    #[default]
    Default,
    System,
}

/// A chat message as carried by message events
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatMessage {
    pub id: Uuid,
    #[serde(rename = "type", default)]
    pub message_type: MessageType,
    #[serde(default)]
    pub server_id: Option<HashId>,
    pub channel_id: Uuid,
    #[serde(default)]
    pub content: String,
    pub created_by: HashId,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub updated_at: Option<DateTime<Utc>>,
}

/// Payload of `ChatMessageCreated` and `ChatMessageUpdated`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MessageEvent {
    #[serde(default)]
    pub server_id: Option<HashId>,
    pub message: ChatMessage,
}

impl MessageEvent {
    pub fn content(&self) -> &str {
        &self.message.content
    }

    pub fn author(&self) -> &HashId {
        &self.message.created_by
    }
}

/// Minimal reference to a removed message
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeletedMessage {
    pub id: Uuid,
    pub channel_id: Uuid,
    #[serde(default)]
    pub server_id: Option<HashId>,
    pub deleted_at: DateTime<Utc>,
}

/// Payload of `ChatMessageDeleted`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MessageDeletedEvent {
    #[serde(default)]
    pub server_id: Option<HashId>,
    pub message: DeletedMessage,
}

// =============================================================================
// Handshake payloads
// =============================================================================

/// Identity of the connected bot
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BotUser {
    pub id: HashId,
    #[serde(default)]
    pub bot_id: Option<Uuid>,
    #[serde(default)]
    pub name: String,
}

/// Op-1 welcome payload
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WelcomePayload {
    pub heartbeat_interval_ms: u64,
    #[serde(default)]
    pub last_message_id: Option<String>,
    #[serde(default)]
    pub user: Option<BotUser>,
}
