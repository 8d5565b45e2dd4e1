//! Protocol errors.
//!
//! Everything that can go wrong while turning transport bytes into frames, or
//! frames into typed payloads. Errors carry owned strings rather than source
//! errors so they stay `Clone + Eq` and can be asserted on in tests.

use thiserror::Error;

/// Result alias for protocol operations.
pub type Result<T> = std::result::Result<T, ProtocolError>;

/// Errors raised by the frame codec and payload decoding.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProtocolError {
    /// Command line is not a STOMP 1.2 command.
    #[error("unknown command: {0:?}")]
    UnknownCommand(String),

    /// Header line has no `:` separator or an empty name.
    #[error("invalid header line: {0:?}")]
    InvalidHeader(String),

    /// Header contains a backslash escape STOMP 1.2 does not define.
    #[error("invalid escape sequence in header {0:?}")]
    InvalidEscape(String),

    /// Input ended before the frame was complete.
    #[error("frame truncated: {0}")]
    FrameTruncated(&'static str),

    /// `content-length` header is not a decimal integer.
    #[error("invalid content-length: {0:?}")]
    InvalidContentLength(String),

    /// Body exceeds the accepted size.
    #[error("body too large: {size} bytes (max {max})")]
    BodyTooLarge {
        /// Claimed or actual body size.
        size: usize,
        /// Maximum accepted body size.
        max: usize,
    },

    /// Command or header bytes are not UTF-8.
    #[error("frame text is not valid UTF-8")]
    InvalidUtf8,

    /// A header required for this command is absent.
    #[error("missing {header} header on {command} frame")]
    MissingHeader {
        /// Command of the offending frame.
        command: &'static str,
        /// Name of the missing header.
        header: &'static str,
    },

    /// `heart-beat` header is not `<cx>,<cy>`.
    #[error("invalid heart-beat header: {0:?}")]
    InvalidHeartBeat(String),

    /// JSON body could not be encoded or decoded.
    #[error("json error: {0}")]
    Json(String),
}

impl From<serde_json::Error> for ProtocolError {
    fn from(err: serde_json::Error) -> Self {
        Self::Json(err.to_string())
    }
}
