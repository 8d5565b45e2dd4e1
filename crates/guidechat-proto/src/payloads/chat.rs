//! Chat message payloads.

use serde::{Deserialize, Serialize};

use crate::{Frame, errors::Result};

/// Room identifier, assigned by the server.
pub type RoomId = u64;

/// User identifier, assigned by the server.
pub type UserId = u64;

/// Message identifier, unique within a room.
pub type MessageId = u64;

/// A single chat message as delivered by the history endpoint and the room
/// topic.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatMessage {
    /// Server-assigned identifier. `None` until the message has round-tripped
    /// through the server.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<MessageId>,
    /// Room the message belongs to.
    pub room_id: RoomId,
    /// Author.
    pub sender_id: UserId,
    /// Message text.
    pub content: String,
    /// Server creation timestamp, passed through verbatim.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<String>,
}

impl ChatMessage {
    /// Decode a `MESSAGE` frame body.
    pub fn from_frame(frame: &Frame) -> Result<Self> {
        frame.json()
    }
}

/// Body published to a room's send destination.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutgoingMessage {
    /// Message text.
    pub content: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decodes_server_json() {
        let json = r#"{"id":9,"roomId":3,"senderId":12,"content":"hello","createdAt":"2024-05-01T10:00:00"}"#;
        let message: ChatMessage = serde_json::from_str(json).unwrap();

        assert_eq!(message.id, Some(9));
        assert_eq!(message.room_id, 3);
        assert_eq!(message.sender_id, 12);
        assert_eq!(message.created_at.as_deref(), Some("2024-05-01T10:00:00"));
    }

    #[test]
    fn id_and_timestamp_are_optional() {
        let json = r#"{"roomId":3,"senderId":12,"content":"pending"}"#;
        let message: ChatMessage = serde_json::from_str(json).unwrap();
        assert_eq!(message.id, None);
        assert_eq!(message.created_at, None);
    }

    #[test]
    fn outgoing_message_shape() {
        let body = serde_json::to_string(&OutgoingMessage { content: "hi".into() }).unwrap();
        assert_eq!(body, r#"{"content":"hi"}"#);
    }
}
