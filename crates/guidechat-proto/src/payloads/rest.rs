//! REST payloads for room metadata and the room directory.

use serde::{Deserialize, Serialize};

use crate::{MessageId, RoomId, UserId};

/// Envelope wrapping every REST response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApiResponse<T> {
    /// Server status text.
    #[serde(default)]
    pub msg: String,
    /// Response body.
    pub data: T,
}

/// Room metadata.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RoomInfo {
    /// Room identifier.
    pub id: RoomId,
    /// Canonical room title.
    #[serde(default)]
    pub title: String,
    /// Title shown to the current user (usually the other party's name).
    #[serde(default)]
    pub display_title: String,
    /// Guide participating in the room.
    pub guide_id: UserId,
    /// Traveler participating in the room.
    pub user_id: UserId,
    /// Last activity timestamp, passed through verbatim.
    #[serde(default)]
    pub updated_at: Option<String>,
    /// Newest message in the room. `None` for an empty room.
    #[serde(default)]
    pub last_message_id: Option<MessageId>,
}

/// One page of the room directory.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RoomPage {
    /// Rooms on this page.
    pub rooms: Vec<RoomInfo>,
    /// Cursor for the next page. `None` on the last page.
    #[serde(default)]
    pub next_cursor: Option<String>,
}

/// Body of the create-or-reuse room request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StartRoomRequest {
    /// Guide to talk to.
    pub guide_id: UserId,
    /// Traveler starting the conversation.
    pub user_id: UserId,
}
