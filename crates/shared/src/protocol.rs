use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::{MessageId, RoomId};

/// A message as held by the remote source of truth.
///
/// Attachment messages carry an empty `text` and a `locator`; plain messages
/// carry non-empty `text` and no `locator`. `sent_at` is display-only; the
/// client orders messages by arrival, never by timestamp.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub id: MessageId,
    pub room: RoomId,
    pub author: String,
    #[serde(default)]
    pub text: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub locator: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sent_at: Option<DateTime<Utc>>,
}

impl Message {
    pub fn has_attachment(&self) -> bool {
        self.locator.is_some()
    }
}

/// Body of a message-creation request; the remote assigns the ID.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewMessage {
    pub author: String,
    pub text: String,
    pub room: RoomId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub locator: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EditMessageRequest {
    pub text: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UploadResponse {
    pub locator: String,
}

/// Push notifications delivered over the event channel.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload", rename_all = "snake_case")]
pub enum ChannelEvent {
    ReceiveMessage { message: Message },
    EditMessage { message: Message },
    DeleteMessage { id: MessageId },
}

/// Fire-and-forget signals emitted by the client on the event channel.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload", rename_all = "snake_case")]
pub enum ClientSignal {
    JoinRoom { room: RoomId },
}
