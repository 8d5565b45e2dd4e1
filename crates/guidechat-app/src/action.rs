//! Session side-effects and user notices.
//!
//! This module defines the [`SessionAction`] enum, which represents
//! instructions produced by the [`crate::RoomSession`] state machine for the
//! runtime to execute, and [`Notice`], the user-visible outcomes.

use std::fmt;

use guidechat_proto::{Frame, MessageId, RoomId};

use crate::SessionTag;

/// Actions produced by the session state machine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionAction {
    /// Fetch room metadata.
    FetchRoom {
        /// Tag to report the result with.
        tag: SessionTag,
    },

    /// Fetch message history.
    FetchHistory {
        /// Tag to report the result with.
        tag: SessionTag,
        /// Only messages after this id. `None` for the full history.
        after: Option<MessageId>,
    },

    /// Open a transport link to the broker.
    OpenTransport {
        /// Tag to report link events with.
        tag: SessionTag,
    },

    /// Write a frame on the link.
    SendFrame {
        /// Link to write on.
        tag: SessionTag,
        /// Frame to write.
        frame: Frame,
    },

    /// Write a heart-beat on the link.
    SendHeartbeat {
        /// Link to write on.
        tag: SessionTag,
    },

    /// Close the link.
    CloseTransport {
        /// Link to close.
        tag: SessionTag,
    },

    /// Clear the message input. Only executed if every preceding frame write
    /// in the same batch succeeded.
    ClearInput,

    /// Show a notice to the user.
    Notify(Notice),

    /// Render the session.
    Render,
}

/// User-visible outcome.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Notice {
    /// Send rejected: nothing to send.
    EmptyMessage,
    /// Send rejected: not connected.
    NotConnected,
    /// Transport refused the outgoing frame.
    SendFailed,
    /// Link dropped; reconnecting.
    Reconnecting,
    /// Link restored.
    Reconnected,
    /// Broker rejected the session.
    ConnectionError {
        /// Broker's reason.
        message: String,
    },
    /// Selected room does not exist.
    RoomNotFound {
        /// Selected room.
        room_id: RoomId,
    },
    /// Room or history could not be loaded.
    FetchFailed {
        /// Failure description.
        reason: String,
    },
}

impl Notice {
    /// Notices that block the view until the user acts.
    pub fn is_blocking(&self) -> bool {
        matches!(self, Self::ConnectionError { .. } | Self::RoomNotFound { .. } | Self::FetchFailed { .. })
    }
}

impl fmt::Display for Notice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::EmptyMessage => f.write_str("type a message first"),
            Self::NotConnected => f.write_str("not connected to the chat server"),
            Self::SendFailed => f.write_str("message could not be sent"),
            Self::Reconnecting => f.write_str("connection lost, reconnecting"),
            Self::Reconnected => f.write_str("reconnected"),
            Self::ConnectionError { message } => write!(f, "connection error: {message}"),
            Self::RoomNotFound { room_id } => write!(f, "chat room {room_id} not found"),
            Self::FetchFailed { reason } => write!(f, "could not load the chat room: {reason}"),
        }
    }
}
