//! Wire types for the observer channel.
//!
//! Frames are JSON objects of the form `{"event": <name>, "data": <payload>}`.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::session::{ChatSummary, ConversationId};

/// Server → observer events.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event", content = "data", rename_all = "camelCase")]
pub enum RelayEvent {
    /// Authentication challenge, passed through verbatim.
    Qr(String),
    Ready {
        chats: Vec<ChatSummary>,
    },
    SelectedChats(Vec<ConversationId>),
    MessageForwarded(ForwardedMessage),
    WhatsappDisconnected {
        reason: String,
    },
    WhatsappError {
        error: String,
    },
}

impl RelayEvent {
    /// Wire name of the event.
    pub fn name(&self) -> &'static str {
        match self {
            RelayEvent::Qr(_) => "qr",
            RelayEvent::Ready { .. } => "ready",
            RelayEvent::SelectedChats(_) => "selectedChats",
            RelayEvent::MessageForwarded(_) => "messageForwarded",
            RelayEvent::WhatsappDisconnected { .. } => "whatsappDisconnected",
            RelayEvent::WhatsappError { .. } => "whatsappError",
        }
    }
}

/// Result of relaying one message.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ForwardedMessage {
    pub from: ConversationId,
    pub body: String,
    pub sender_name: String,
    pub timestamp: DateTime<Utc>,
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Observer → server commands.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(tag = "event", content = "data", rename_all = "camelCase")]
pub enum ObserverCommand {
    SelectChat(ConversationId),
    DeselectChat(ConversationId),
}
