//! Error types for the chat core.

use guidechat_proto::{Command, ProtocolError};
use thiserror::Error;

use crate::connection::ConnectionStatus;

/// Errors that can occur during connection state machine operations.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConnectionError {
    /// Publish attempted while not connected. Nothing was queued.
    #[error("not connected (status {status:?})")]
    NotConnected {
        /// Status when the publish was attempted
        status: ConnectionStatus,
    },

    /// Invalid state transition attempted
    #[error("invalid state transition: cannot {operation} from {status:?}")]
    InvalidState {
        /// Current status when error occurred
        status: ConnectionStatus,
        /// Operation that was attempted
        operation: &'static str,
    },

    /// Received a frame that makes no sense in the current status
    #[error("unexpected {command} frame in status {status:?}")]
    UnexpectedFrame {
        /// Current status when frame was received
        status: ConnectionStatus,
        /// Command of the unexpected frame
        command: Command,
    },

    /// Frame encoding or parsing failed
    #[error("protocol error: {0}")]
    Protocol(#[from] ProtocolError),
}

impl ConnectionError {
    /// Returns true if the operation may succeed once the connection recovers.
    ///
    /// A publish rejected for lack of a connection can be retried after the
    /// reconnect completes. Protocol violations never become valid by waiting.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::NotConnected { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_not_connected_is_transient() {
        assert!(ConnectionError::NotConnected { status: ConnectionStatus::Connecting }.is_transient());
        assert!(!ConnectionError::Protocol(ProtocolError::InvalidUtf8).is_transient());
    }
}
