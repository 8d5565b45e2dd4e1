//! Guide chat wire protocol
//!
//! The real-time chat transport is STOMP 1.2 carried in WebSocket text
//! messages. This crate holds the pieces both sides of that link agree on:
//!
//! - [`Frame`]: one STOMP frame (command, headers, body) and its encoder
//! - [`decode`]: splits a transport message into frames and heart-beats
//! - [`HeartBeat`]: `heart-beat` header parsing and negotiation
//! - [`destination`]: topic and publish destinations for a room
//! - [`payloads`]: JSON bodies (chat messages, REST envelopes, room metadata)
//!
//! There is no I/O here. The connection state machine in `guidechat-core`
//! decides what to send, and the transport in `guidechat-client` moves bytes.

#![forbid(unsafe_code)]
#![deny(missing_docs)]

mod command;
mod decoder;
pub mod destination;
pub mod errors;
mod frame;
mod heartbeat;
pub mod payloads;

pub use command::Command;
pub use decoder::{Inbound, decode};
pub use errors::{ProtocolError, Result};
pub use frame::Frame;
pub use heartbeat::HeartBeat;
pub use payloads::{ChatMessage, MessageId, OutgoingMessage, RoomId, RoomInfo, RoomPage, UserId};
