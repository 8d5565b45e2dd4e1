//! STOMP frame type and encoder.
//!
//! A `Frame` is one protocol unit on the chat transport:
//!
//! ```text
//! COMMAND\n
//! name:value\n      (zero or more headers)
//! \n
//! body\0
//! ```
//!
//! Frames are plain data. Which frames to send, and when, is decided by the
//! connection state machine in `guidechat-core`.

use bytes::{BufMut, Bytes};
use serde::{Serialize, de::DeserializeOwned};

use crate::{
    Command, HeartBeat,
    errors::{ProtocolError, Result},
};

/// Largest body accepted by the decoder or produced by the encoder.
pub const MAX_BODY_SIZE: usize = 1024 * 1024;

/// One STOMP frame.
///
/// # Invariants
///
/// - Header order is preserved. When a header name repeats, the first
///   occurrence is authoritative, as STOMP 1.2 requires.
/// - Header names are non-empty and never contain `:` or line breaks; this is
///   checked on [`Frame::encode`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    /// Frame command.
    pub command: Command,
    /// Headers in wire order.
    headers: Vec<(String, String)>,
    /// Raw body bytes.
    pub body: Bytes,
}

impl Frame {
    /// Create a frame with no headers and an empty body.
    #[must_use]
    pub fn new(command: Command) -> Self {
        Self { command, headers: Vec::new(), body: Bytes::new() }
    }

    /// Append a header.
    #[must_use]
    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    /// Replace the body.
    #[must_use]
    pub fn with_body(mut self, body: impl Into<Bytes>) -> Self {
        self.body = body.into();
        self
    }

    /// `CONNECT` frame advertising STOMP 1.2 and the given heart-beat.
    ///
    /// The bearer token, when present, travels as an `Authorization` header
    /// because the broker authenticates the STOMP session, not the socket.
    #[must_use]
    pub fn connect(heartbeat: HeartBeat, token: Option<&str>) -> Self {
        let frame = Self::new(Command::Connect)
            .with_header("accept-version", "1.2")
            .with_header("heart-beat", heartbeat.to_header());
        match token {
            Some(token) => frame.with_header("Authorization", format!("Bearer {token}")),
            None => frame,
        }
    }

    /// `SUBSCRIBE` frame for `destination` under subscription `id`.
    #[must_use]
    pub fn subscribe(id: &str, destination: &str) -> Self {
        Self::new(Command::Subscribe).with_header("id", id).with_header("destination", destination)
    }

    /// `UNSUBSCRIBE` frame for subscription `id`.
    #[must_use]
    pub fn unsubscribe(id: &str) -> Self {
        Self::new(Command::Unsubscribe).with_header("id", id)
    }

    /// `SEND` frame carrying `payload` as JSON.
    pub fn send_json<T: Serialize>(destination: &str, payload: &T) -> Result<Self> {
        let body = serde_json::to_vec(payload)?;
        Ok(Self::new(Command::Send)
            .with_header("destination", destination)
            .with_header("content-type", "application/json")
            .with_body(body))
    }

    /// `DISCONNECT` frame.
    #[must_use]
    pub fn disconnect() -> Self {
        Self::new(Command::Disconnect)
    }

    /// First value of header `name`. `None` if absent.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.iter().find(|(n, _)| n == name).map(|(_, v)| v.as_str())
    }

    /// Value of header `name`, or [`ProtocolError::MissingHeader`].
    pub fn require_header(&self, name: &'static str) -> Result<&str> {
        self.header(name)
            .ok_or(ProtocolError::MissingHeader { command: self.command.as_str(), header: name })
    }

    /// All headers in wire order.
    pub fn headers(&self) -> impl Iterator<Item = (&str, &str)> {
        self.headers.iter().map(|(n, v)| (n.as_str(), v.as_str()))
    }

    /// Body as UTF-8 text.
    pub fn body_str(&self) -> Result<&str> {
        std::str::from_utf8(&self.body).map_err(|_| ProtocolError::InvalidUtf8)
    }

    /// Deserialize the body as JSON.
    pub fn json<T: DeserializeOwned>(&self) -> Result<T> {
        Ok(serde_json::from_slice(&self.body)?)
    }

    /// Encode the frame into `dst`.
    ///
    /// A `content-length` header is added for non-empty bodies unless the
    /// caller already set one, so bodies may safely contain NUL bytes.
    ///
    /// # Errors
    ///
    /// - `ProtocolError::InvalidHeader` for an empty name or one containing
    ///   `:`, `\r` or `\n`, and for an unescapable `CONNECT` header value
    /// - `ProtocolError::BodyTooLarge` if the body exceeds [`MAX_BODY_SIZE`]
    pub fn encode(&self, dst: &mut impl BufMut) -> Result<()> {
        if self.body.len() > MAX_BODY_SIZE {
            return Err(ProtocolError::BodyTooLarge { size: self.body.len(), max: MAX_BODY_SIZE });
        }

        let escape = self.command.escapes_headers();

        dst.put_slice(self.command.as_str().as_bytes());
        dst.put_u8(b'\n');

        for (name, value) in &self.headers {
            if name.is_empty() || name.contains([':', '\r', '\n']) {
                return Err(ProtocolError::InvalidHeader(name.clone()));
            }
            if escape {
                dst.put_slice(escape_header(name).as_bytes());
                dst.put_u8(b':');
                dst.put_slice(escape_header(value).as_bytes());
            } else {
                if value.contains(['\r', '\n']) {
                    return Err(ProtocolError::InvalidHeader(name.clone()));
                }
                dst.put_slice(name.as_bytes());
                dst.put_u8(b':');
                dst.put_slice(value.as_bytes());
            }
            dst.put_u8(b'\n');
        }

        if !self.body.is_empty() && self.header("content-length").is_none() {
            dst.put_slice(format!("content-length:{}\n", self.body.len()).as_bytes());
        }

        dst.put_u8(b'\n');
        dst.put_slice(&self.body);
        dst.put_u8(0);

        Ok(())
    }

    /// Encode the frame as a text transport message.
    ///
    /// # Errors
    ///
    /// As [`Frame::encode`], plus `ProtocolError::InvalidUtf8` for a binary
    /// body.
    pub fn to_text(&self) -> Result<String> {
        let mut buf = Vec::with_capacity(64 + self.body.len());
        self.encode(&mut buf)?;
        String::from_utf8(buf).map_err(|_| ProtocolError::InvalidUtf8)
    }
}

/// Escape a header name or value for frames other than `CONNECT`/`CONNECTED`.
pub(crate) fn escape_header(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    for c in raw.chars() {
        match c {
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            ':' => out.push_str("\\c"),
            other => out.push(other),
        }
    }
    out
}

/// Reverse [`escape_header`].
pub(crate) fn unescape_header(raw: &str) -> Result<String> {
    let mut out = String::with_capacity(raw.len());
    let mut chars = raw.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.next() {
            Some('\\') => out.push('\\'),
            Some('n') => out.push('\n'),
            Some('r') => out.push('\r'),
            Some('c') => out.push(':'),
            _ => return Err(ProtocolError::InvalidEscape(raw.to_string())),
        }
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;

    #[test]
    fn connect_frame_wire_format() {
        let heartbeat = HeartBeat::new(Duration::from_secs(4), Duration::from_secs(4));
        let text = Frame::connect(heartbeat, Some("abc")).to_text().unwrap();

        insta::assert_snapshot!(text.replace('\0', "^@"), @r"
        CONNECT
        accept-version:1.2
        heart-beat:4000,4000
        Authorization:Bearer abc

        ^@
        ");
    }

    #[test]
    fn connect_without_token_omits_authorization() {
        let frame = Frame::connect(HeartBeat::default(), None);
        assert!(frame.header("Authorization").is_none());
    }

    #[test]
    fn send_adds_content_length() {
        let frame = Frame::send_json("/pub/userchat/7/messages", &serde_json::json!({"content": "hi"}))
            .unwrap();
        let text = frame.to_text().unwrap();

        assert!(text.starts_with("SEND\ndestination:/pub/userchat/7/messages\n"));
        assert!(text.contains("content-length:16\n"));
        assert!(text.ends_with("\n\n{\"content\":\"hi\"}\0"));
    }

    #[test]
    fn escaped_header_values() {
        let frame = Frame::new(Command::Message).with_header("note", "a:b\nc\\d");
        let text = frame.to_text().unwrap();
        assert!(text.contains("note:a\\cb\\nc\\\\d\n"));
    }

    #[test]
    fn rejects_header_name_with_colon() {
        let frame = Frame::new(Command::Send).with_header("bad:name", "x");
        assert!(matches!(frame.to_text(), Err(ProtocolError::InvalidHeader(_))));
    }

    #[test]
    fn rejects_oversized_body() {
        let frame = Frame::new(Command::Send).with_body(vec![b'a'; MAX_BODY_SIZE + 1]);
        assert!(matches!(frame.to_text(), Err(ProtocolError::BodyTooLarge { .. })));
    }

    #[test]
    fn first_header_occurrence_wins() {
        let frame =
            Frame::new(Command::Message).with_header("destination", "a").with_header("destination", "b");
        assert_eq!(frame.header("destination"), Some("a"));
    }

    #[test]
    fn unescape_rejects_unknown_sequence() {
        assert!(matches!(unescape_header("a\\tb"), Err(ProtocolError::InvalidEscape(_))));
        assert_eq!(unescape_header("a\\cb\\\\").unwrap(), "a:b\\");
    }
}
