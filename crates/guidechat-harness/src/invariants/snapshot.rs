//! Observable state snapshots for invariant checking.
//!
//! Snapshots capture the observable state of a session at a point in time.
//! Invariants operate on snapshots rather than live state to ensure
//! consistent, atomic checks.

use std::{ops::Sub, time::Duration};

use guidechat_app::{RoomSession, SessionState, SessionTag};
use guidechat_core::ConnectionStatus;
use guidechat_proto::{MessageId, RoomId};

/// Snapshot of one session's observable state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionSnapshot {
    /// Lifecycle state.
    pub state: SessionState,
    /// Current selection. `None` while idle or closed.
    pub tag: Option<SessionTag>,
    /// Connection status of the current binding.
    pub connection_status: ConnectionStatus,
    /// Sending enabled.
    pub connected: bool,
    /// Shown messages as `(id, room)`, in display order.
    pub messages: Vec<(Option<MessageId>, RoomId)>,
}

impl Default for SessionSnapshot {
    fn default() -> Self {
        Self {
            state: SessionState::Idle,
            tag: None,
            connection_status: ConnectionStatus::Disconnected,
            connected: false,
            messages: Vec::new(),
        }
    }
}

impl SessionSnapshot {
    /// Capture the observable state of `session`.
    pub fn of<I>(session: &RoomSession<I>) -> Self
    where
        I: Copy + Ord + Send + Sync + Sub<Output = Duration>,
    {
        Self {
            state: session.state().clone(),
            tag: session.tag(),
            connection_status: session.connection_status(),
            connected: session.is_connected(),
            messages: session.messages().iter().map(|m| (m.id, m.room_id)).collect(),
        }
    }

    /// Selected room.
    pub fn room_id(&self) -> Option<RoomId> {
        self.tag.map(|t| t.room_id)
    }

    /// Identifiers of shown messages in display order, skipping unconfirmed
    /// ones.
    pub fn message_ids(&self) -> Vec<MessageId> {
        self.messages.iter().filter_map(|(id, _)| *id).collect()
    }
}
