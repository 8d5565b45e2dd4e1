//! Fuzz target for STOMP frame boundary conditions
//!
//! Body framing is the part of the decoder an untrusted broker controls most
//! directly: `content-length` against the actual body, NUL bytes inside
//! bodies, and headers needing escapes.
//!
//! # Strategy
//!
//! - Content length: absent, exact, short, long, over the body cap, garbage
//! - Bodies with and without embedded NULs
//! - Structured frames with arbitrary header values, encoded then decoded
//!
//! # Invariants
//!
//! - A declared length over `MAX_BODY_SIZE` MUST return `BodyTooLarge`
//! - An exact declared length MUST decode to exactly the declared body
//! - Any frame that encodes MUST decode back to the same command, body and
//!   header values
//! - Never panic

#![no_main]

use arbitrary::Arbitrary;
use guidechat_proto::{Command, Frame, Inbound, ProtocolError, decode};
use libfuzzer_sys::fuzz_target;

const MAX_BODY_SIZE: usize = 1024 * 1024;

const COMMANDS: [Command; 15] = [
    Command::Connect,
    Command::Stomp,
    Command::Send,
    Command::Subscribe,
    Command::Unsubscribe,
    Command::Ack,
    Command::Nack,
    Command::Begin,
    Command::Commit,
    Command::Abort,
    Command::Disconnect,
    Command::Connected,
    Command::Message,
    Command::Receipt,
    Command::Error,
];

const HEADER_NAMES: [&str; 5] = ["id", "destination", "subscription", "message", "x-trace"];

#[derive(Debug, Clone, Arbitrary)]
enum ContentLength {
    Absent,
    Exact,
    Short(u8),
    Long(u8),
    OverMax(u16),
    Garbage(String),
}

#[derive(Debug, Clone, Arbitrary)]
enum Case {
    RawMessage { length: ContentLength, body: Vec<u8> },
    Structured { command: u8, headers: Vec<(u8, String)>, body: Vec<u8> },
}

fuzz_target!(|case: Case| {
    match case {
        Case::RawMessage { length, body } => raw_message(&length, &body),
        Case::Structured { command, headers, body } => structured(command, headers, body),
    }
});

fn raw_message(length: &ContentLength, body: &[u8]) {
    if body.len() > MAX_BODY_SIZE {
        return;
    }

    let declared = match length {
        ContentLength::Absent => None,
        ContentLength::Exact => Some(body.len().to_string()),
        ContentLength::Short(n) => Some(body.len().saturating_sub(usize::from(*n) + 1).to_string()),
        ContentLength::Long(n) => Some((body.len() + usize::from(*n) + 1).to_string()),
        ContentLength::OverMax(n) => Some((MAX_BODY_SIZE + 1 + usize::from(*n)).to_string()),
        ContentLength::Garbage(s) => Some(s.replace(['\n', '\r'], "")),
    };

    let mut input = b"MESSAGE\nsubscription:sub-0\n".to_vec();
    if let Some(declared) = &declared {
        input.extend_from_slice(format!("content-length:{declared}\n").as_bytes());
    }
    input.push(b'\n');
    input.extend_from_slice(body);
    input.push(0);

    let result = decode(&input);
    match length {
        ContentLength::OverMax(_) => {
            assert!(matches!(result, Err(ProtocolError::BodyTooLarge { .. })), "{result:?}");
        },
        ContentLength::Exact => {
            let items = result.expect("exact content-length decodes");
            let Some(Inbound::Frame(frame)) = items.first() else {
                panic!("expected a frame, got {items:?}");
            };
            assert_eq!(&frame.body[..], body);
        },
        _ => {},
    }
}

fn structured(command: u8, headers: Vec<(u8, String)>, body: Vec<u8>) {
    let command = COMMANDS[usize::from(command) % COMMANDS.len()];
    let mut frame = Frame::new(command);
    for (name, value) in &headers {
        frame = frame.with_header(HEADER_NAMES[usize::from(*name) % HEADER_NAMES.len()], value.as_str());
    }
    let frame = frame.with_body(body);

    let mut buf = Vec::new();
    if frame.encode(&mut buf).is_err() {
        return;
    }

    let items = decode(&buf).expect("encoded frame decodes");
    assert_eq!(items.len(), 1, "{items:?}");
    let Some(Inbound::Frame(decoded)) = items.into_iter().next() else {
        panic!("expected a frame");
    };

    assert_eq!(decoded.command, frame.command);
    assert_eq!(decoded.body, frame.body);
    for (name, _) in frame.headers() {
        assert_eq!(decoded.header(name), frame.header(name), "header {name}");
    }
}
