//! CLI errors.

use std::io;

use guidechat_app::FetchError;
use guidechat_client::{ApiError, TransportError};
use guidechat_proto::RoomId;
use thiserror::Error;

/// Runtime errors.
#[derive(Debug, Error)]
pub enum RuntimeError {
    /// I/O error from terminal operations.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// Transport error.
    #[error("transport error: {0}")]
    Transport(#[from] TransportError),

    /// REST error.
    #[error("api error: {0}")]
    Api(#[from] ApiError),

    /// Room or history fetch failed.
    #[error("fetch failed: {0}")]
    Fetch(#[from] FetchError),

    /// Write attempted on a link that is not open.
    #[error("no open link for room {room_id}")]
    NoLink {
        /// Room the write was for.
        room_id: RoomId,
    },
}
