//! Observable session state types.
//!
//! These are the "View Model" of a chat room: what the presentation layer
//! needs to render status and messages without reaching into the connection
//! or reconciler.

use guidechat_proto::{ChatMessage, RoomId, UserId};

/// Label attached to every in-flight request and transport link.
///
/// The generation increases on every room selection, so a result tagged for an
/// earlier selection of the *same* room is still recognised as stale.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SessionTag {
    /// Room the request was issued for.
    pub room_id: RoomId,
    /// Selection counter at issue time.
    pub generation: u64,
}

/// Room session lifecycle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionState {
    /// No room selected.
    Idle,
    /// History fetch in flight.
    Loading,
    /// History shown; broker handshake in flight or reconnecting.
    Connecting,
    /// Connected and subscribed; sending is allowed.
    Active,
    /// Broker rejected the session. History stays visible; re-select the
    /// room to retry.
    Failed,
    /// Room could not be loaded. Terminal for this selection.
    Unavailable(Unavailability),
    /// View torn down. All further events are ignored.
    Closed,
}

/// Why a room could not be loaded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Unavailability {
    /// Room does not exist or is not visible to this user.
    NotFound,
    /// Fetch failed for another reason.
    Failed(String),
}

/// Rendering side of a message relative to the current user.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageSide {
    /// Written by the current user.
    Sent,
    /// Written by someone else.
    Received,
}

impl MessageSide {
    /// Side of `message` for `current_user`. Unknown users see everything as
    /// received.
    pub fn of(message: &ChatMessage, current_user: Option<UserId>) -> Self {
        if current_user == Some(message.sender_id) { Self::Sent } else { Self::Received }
    }
}
