//! Session input events.
//!
//! This module defines [`SessionEvent`], the inputs that drive the
//! [`crate::RoomSession`] state machine.
//!
//! Events originate from two distinct sources:
//! - UI navigation (room selection, view teardown) and periodic ticks.
//! - Completions of I/O the session requested, each carrying the
//!   [`SessionTag`] it was issued with.

use guidechat_proto::{ChatMessage, Frame, RoomId, RoomInfo};
use thiserror::Error;

use crate::SessionTag;

/// Failure reported by a fetch collaborator.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FetchError {
    /// Resource does not exist.
    #[error("not found")]
    NotFound,
    /// Any other failure (network, server, decoding).
    #[error("{0}")]
    Failed(String),
}

/// Events processed by the session state machine.
#[derive(Debug, Clone)]
pub enum SessionEvent {
    /// User selected a room.
    SelectRoom {
        /// Selected room.
        room_id: RoomId,
    },

    /// Room metadata fetch completed. `Ok(None)` means not found.
    RoomLoaded {
        /// Tag the fetch was issued with.
        tag: SessionTag,
        /// Fetch outcome.
        result: Result<Option<RoomInfo>, FetchError>,
    },

    /// History fetch completed, chronological order.
    HistoryLoaded {
        /// Tag the fetch was issued with.
        tag: SessionTag,
        /// Fetch outcome.
        result: Result<Vec<ChatMessage>, FetchError>,
    },

    /// Transport link is open.
    TransportOpened {
        /// Tag the link was opened with.
        tag: SessionTag,
    },

    /// Transport link closed or failed to open.
    TransportClosed {
        /// Tag the link was opened with.
        tag: SessionTag,
    },

    /// Frame received on a transport link.
    FrameReceived {
        /// Tag of the link.
        tag: SessionTag,
        /// Decoded frame.
        frame: Frame,
    },

    /// Heart-beat received on a transport link.
    HeartbeatReceived {
        /// Tag of the link.
        tag: SessionTag,
    },

    /// Periodic tick.
    Tick,

    /// View torn down.
    Unmount,
}
