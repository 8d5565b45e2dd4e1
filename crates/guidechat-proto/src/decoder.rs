//! Transport message decoder.
//!
//! One WebSocket message may hold several frames, heart-beat end-of-lines
//! between them, or both. [`decode`] turns the whole message into an ordered
//! list of [`Inbound`] items; a message that ends mid-frame is rejected
//! rather than buffered, since the transport never splits frames.

use bytes::Bytes;

use crate::{
    Command, Frame,
    errors::{ProtocolError, Result},
    frame::{MAX_BODY_SIZE, unescape_header},
};

/// Item decoded from a transport message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Inbound {
    /// Bare end-of-line: the peer is alive.
    Heartbeat,
    /// Complete frame.
    Frame(Frame),
}

/// Decode every frame and heart-beat in `input`, in order.
///
/// # Errors
///
/// - `ProtocolError::FrameTruncated` if a frame is missing its header
///   terminator, body, or trailing NUL
/// - `ProtocolError::UnknownCommand`, `InvalidHeader`, `InvalidEscape`,
///   `InvalidContentLength`, `BodyTooLarge`, `InvalidUtf8` for malformed
///   frames
pub fn decode(input: &[u8]) -> Result<Vec<Inbound>> {
    let mut items = Vec::new();
    let mut pos = 0;

    while let Some(rest) = input.get(pos..)
        && !rest.is_empty()
    {
        match rest {
            [b'\n', ..] => {
                items.push(Inbound::Heartbeat);
                pos += 1;
            },
            [b'\r', b'\n', ..] => {
                items.push(Inbound::Heartbeat);
                pos += 2;
            },
            _ => {
                let (frame, consumed) = decode_frame(rest)?;
                debug_assert!(consumed > 0);
                items.push(Inbound::Frame(frame));
                pos += consumed;
            },
        }
    }

    Ok(items)
}

/// Decode one frame at the start of `buf`. Returns the frame and the number of
/// bytes consumed, including the trailing NUL.
fn decode_frame(buf: &[u8]) -> Result<(Frame, usize)> {
    let (command_line, mut pos) = read_line(buf, 0)?;
    let command: Command = command_line.parse()?;
    let escaped = command.escapes_headers();

    let mut frame = Frame::new(command);
    loop {
        let (line, next) = read_line(buf, pos)?;
        pos = next;
        if line.is_empty() {
            break;
        }

        let (name, value) =
            line.split_once(':').ok_or_else(|| ProtocolError::InvalidHeader(line.to_string()))?;
        if name.is_empty() {
            return Err(ProtocolError::InvalidHeader(line.to_string()));
        }

        frame = if escaped {
            frame.with_header(unescape_header(name)?, unescape_header(value)?)
        } else {
            frame.with_header(name, value)
        };
    }

    let rest = buf.get(pos..).unwrap_or_default();
    let body_len = match frame.header("content-length") {
        Some(raw) => {
            let len: usize = raw
                .trim()
                .parse()
                .map_err(|_| ProtocolError::InvalidContentLength(raw.to_string()))?;
            if len > MAX_BODY_SIZE {
                return Err(ProtocolError::BodyTooLarge { size: len, max: MAX_BODY_SIZE });
            }
            if rest.get(len) != Some(&0) {
                return Err(ProtocolError::FrameTruncated("body shorter than content-length"));
            }
            len
        },
        None => {
            let len = rest
                .iter()
                .position(|&b| b == 0)
                .ok_or(ProtocolError::FrameTruncated("missing NUL terminator"))?;
            if len > MAX_BODY_SIZE {
                return Err(ProtocolError::BodyTooLarge { size: len, max: MAX_BODY_SIZE });
            }
            len
        },
    };

    let body = Bytes::copy_from_slice(rest.get(..body_len).unwrap_or_default());
    Ok((frame.with_body(body), pos + body_len + 1))
}

/// Read a line starting at `start`. Returns the line without its EOL and the
/// offset of the next line.
fn read_line(buf: &[u8], start: usize) -> Result<(&str, usize)> {
    let rest = buf.get(start..).unwrap_or_default();
    let end = rest
        .iter()
        .position(|&b| b == b'\n')
        .ok_or(ProtocolError::FrameTruncated("missing end of line"))?;
    let line = rest.get(..end).unwrap_or_default();
    let line = line.strip_suffix(b"\r").unwrap_or(line);
    let line = std::str::from_utf8(line).map_err(|_| ProtocolError::InvalidUtf8)?;
    Ok((line, start + end + 1))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn frames(input: &[u8]) -> Vec<Frame> {
        decode(input)
            .unwrap()
            .into_iter()
            .filter_map(|item| match item {
                Inbound::Frame(f) => Some(f),
                Inbound::Heartbeat => None,
            })
            .collect()
    }

    #[test]
    fn decodes_message_frame() {
        let input = b"MESSAGE\nsubscription:sub-0\ndestination:/topic/userchat/3\n\n{\"id\":1}\0";
        let [frame] = frames(input).try_into().unwrap();

        assert_eq!(frame.command, Command::Message);
        assert_eq!(frame.header("subscription"), Some("sub-0"));
        assert_eq!(frame.body_str().unwrap(), "{\"id\":1}");
    }

    #[test]
    fn heartbeats_between_frames() {
        let input = b"\n\r\nRECEIPT\nreceipt-id:1\n\n\0\n";
        let items = decode(input).unwrap();

        assert_eq!(items.len(), 4);
        assert_eq!(items[0], Inbound::Heartbeat);
        assert_eq!(items[1], Inbound::Heartbeat);
        assert!(matches!(&items[2], Inbound::Frame(f) if f.command == Command::Receipt));
        assert_eq!(items[3], Inbound::Heartbeat);
    }

    #[test]
    fn multiple_frames_in_one_message() {
        let input = b"MESSAGE\nsubscription:a\n\nx\0MESSAGE\nsubscription:b\n\ny\0";
        let frames = frames(input);
        assert_eq!(frames.len(), 2);
        assert_eq!(frames[1].header("subscription"), Some("b"));
    }

    #[test]
    fn content_length_allows_nul_in_body() {
        let input = b"MESSAGE\ncontent-length:3\n\na\0b\0";
        let [frame] = frames(input).try_into().unwrap();
        assert_eq!(&frame.body[..], b"a\0b");
    }

    #[test]
    fn crlf_line_endings() {
        let input = b"ERROR\r\nmessage:denied\r\n\r\nbad token\0";
        let [frame] = frames(input).try_into().unwrap();
        assert_eq!(frame.header("message"), Some("denied"));
        assert_eq!(frame.body_str().unwrap(), "bad token");
    }

    #[test]
    fn connected_headers_are_not_unescaped() {
        let input = b"CONNECTED\nserver:a\\cb\n\n\0";
        let [frame] = frames(input).try_into().unwrap();
        assert_eq!(frame.header("server"), Some("a\\cb"));
    }

    #[test]
    fn truncated_frames_are_rejected() {
        assert!(matches!(
            decode(b"MESSAGE\nsubscription:a\n\nbody"),
            Err(ProtocolError::FrameTruncated(_))
        ));
        assert!(matches!(
            decode(b"MESSAGE\ncontent-length:10\n\nabc\0"),
            Err(ProtocolError::FrameTruncated(_))
        ));
        assert!(matches!(decode(b"MESSAGE"), Err(ProtocolError::FrameTruncated(_))));
    }

    #[test]
    fn malformed_headers_are_rejected() {
        assert!(matches!(decode(b"MESSAGE\nnocolon\n\n\0"), Err(ProtocolError::InvalidHeader(_))));
        assert!(matches!(decode(b"MESSAGE\n:value\n\n\0"), Err(ProtocolError::InvalidHeader(_))));
        assert!(matches!(
            decode(b"MESSAGE\ncontent-length:x\n\n\0"),
            Err(ProtocolError::InvalidContentLength(_))
        ));
        assert!(matches!(decode(b"HELLO\n\n\0"), Err(ProtocolError::UnknownCommand(_))));
    }
}
