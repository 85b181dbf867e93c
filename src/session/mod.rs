//! Messaging session adapter.
//!
//! The messaging backend is an external collaborator. Adapters wrap it and
//! expose a uniform event stream plus three commands; everything above this
//! module (reconnection, relay, fan-out) only speaks in these types.
//!
//! ```text
//!   external session ──► SessionClient ──► mpsc<SessionEvent> ──► Dispatcher
//!                             ▲
//!                             │ start() / list_chats() / fetch_message_metadata()
//!                    ReconnectionController, RelayEngine
//! ```

pub mod bridge;
pub mod controller;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

use crate::error::SessionError;

pub use bridge::{BridgeSessionClient, LaunchOptions};
pub use controller::{ReconnectionController, RetryPolicy, Session, SessionHandle, SessionState};

/// Capacity of the adapter → dispatcher event channel.
pub const EVENT_CHANNEL_CAPACITY: usize = 256;

/// Placeholder used whenever a name cannot be resolved.
pub const UNKNOWN: &str = "Unknown";

const DIRECT_SUFFIX: &str = "@c.us";
const GROUP_SUFFIX: &str = "@g.us";

/// Opaque identifier of a source conversation (e.g. `111@c.us`).
pub type ConversationId = String;

/// Raw incoming message as produced by the adapter.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IncomingMessage {
    /// Backend message identifier, used to fetch metadata.
    #[serde(default)]
    pub id: String,
    /// Conversation the message arrived on.
    pub from: ConversationId,
    /// Group participant who wrote the message, if any.
    #[serde(default)]
    pub author: Option<String>,
    #[serde(default)]
    pub body: String,
    /// Unix timestamp in seconds, as reported by the backend.
    #[serde(default)]
    pub timestamp: Option<i64>,
}

/// Chat and contact metadata fetched from the session for one message.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MessageMetadata {
    #[serde(default)]
    pub chat_name: Option<String>,
    #[serde(default)]
    pub is_group: bool,
    /// Display name of the direct-chat contact.
    #[serde(default)]
    pub contact_name: Option<String>,
    /// Display name of the group author, when the backend knows it.
    #[serde(default)]
    pub author_name: Option<String>,
}

/// Fully resolved message, ready for delivery.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MessageDetails {
    pub sender_name: String,
    pub sender_number: String,
    pub message: String,
    pub timestamp: DateTime<Utc>,
    pub is_group: bool,
    pub chat_name: String,
}

/// Preview of the last message in a chat.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LastMessage {
    pub body: String,
    pub timestamp: i64,
}

/// Entry of the chat list exposed to observers and `GET /api/chats`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatSummary {
    pub id: ConversationId,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub is_group: bool,
    #[serde(default)]
    pub unread_count: u32,
    #[serde(default)]
    pub last_message: Option<LastMessage>,
}

impl ChatSummary {
    /// Fill in the display placeholders the dashboard expects.
    pub fn normalized(mut self) -> Self {
        if self.name.trim().is_empty() {
            self.name = UNKNOWN.to_string();
        }
        self
    }
}

/// Events emitted by a session adapter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEvent {
    /// Authentication challenge (QR payload) to show to the user.
    QrChallenge(String),
    /// The session is authenticated and usable.
    Ready,
    /// A message arrived on some conversation.
    Message(IncomingMessage),
    /// The session was closed by the backend.
    Disconnected(String),
    /// The session failed after having started.
    Fault(String),
}

/// Sender half handed to adapters at construction.
pub type SessionEventSender = mpsc::Sender<SessionEvent>;

/// Create the bounded adapter → dispatcher event channel.
pub fn event_channel() -> (SessionEventSender, mpsc::Receiver<SessionEvent>) {
    mpsc::channel(EVENT_CHANNEL_CAPACITY)
}

/// Uniform interface over the external messaging session.
///
/// Implementations push [`SessionEvent`]s into the sender they were built
/// with; the methods here are the commands callers may issue.
#[async_trait]
pub trait SessionClient: Send + Sync {
    /// Start (or restart) the session. An error counts as a fault.
    async fn start(&self) -> Result<(), SessionError>;

    /// Fetch the current chat list.
    async fn list_chats(&self) -> Result<Vec<ChatSummary>, SessionError>;

    /// Fetch chat/contact metadata needed to describe a message.
    async fn fetch_message_metadata(
        &self,
        msg: &IncomingMessage,
    ) -> Result<MessageMetadata, SessionError>;
}

/// Strip the backend domain suffix from a conversation identifier.
pub fn strip_domain_suffix(id: &str) -> String {
    id.strip_suffix(DIRECT_SUFFIX)
        .or_else(|| id.strip_suffix(GROUP_SUFFIX))
        .unwrap_or(id)
        .to_string()
}

/// Resolve a message against the session. Never fails: metadata errors
/// degrade to [`fallback_details`].
pub async fn resolve_message_details(
    client: &dyn SessionClient,
    msg: &IncomingMessage,
) -> MessageDetails {
    match client.fetch_message_metadata(msg).await {
        Ok(meta) => details_from_metadata(msg, &meta),
        Err(e) => {
            tracing::warn!(chat_id = %msg.from, error = %e, "Failed to resolve message details");
            fallback_details(msg)
        }
    }
}

/// Build details from successfully fetched metadata.
pub fn details_from_metadata(msg: &IncomingMessage, meta: &MessageMetadata) -> MessageDetails {
    let chat_name = meta
        .chat_name
        .clone()
        .filter(|n| !n.trim().is_empty())
        .unwrap_or_else(|| UNKNOWN.to_string());

    let sender_name = if meta.is_group {
        let mut name = format!("{} (Group)", chat_name);
        if let Some(author) = &msg.author {
            let shown = meta.author_name.as_deref().unwrap_or(author);
            name.push_str(&format!("\nFrom: {}", shown));
        }
        name
    } else {
        meta.contact_name
            .clone()
            .filter(|n| !n.trim().is_empty())
            .unwrap_or_else(|| "Unknown Contact".to_string())
    };

    let timestamp = msg
        .timestamp
        .and_then(|secs| DateTime::from_timestamp(secs, 0))
        .unwrap_or_else(Utc::now);

    MessageDetails {
        sender_name,
        sender_number: strip_domain_suffix(&msg.from),
        message: msg.body.clone(),
        timestamp,
        is_group: meta.is_group,
        chat_name,
    }
}

/// Best-effort details used when the session cannot describe a message.
pub fn fallback_details(msg: &IncomingMessage) -> MessageDetails {
    MessageDetails {
        sender_name: UNKNOWN.to_string(),
        sender_number: strip_domain_suffix(&msg.from),
        message: msg.body.clone(),
        timestamp: Utc::now(),
        is_group: false,
        chat_name: UNKNOWN.to_string(),
    }
}
