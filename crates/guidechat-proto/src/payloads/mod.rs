//! JSON payloads.
//!
//! Frame bodies on the live transport and REST bodies share the same message
//! shape, so both live here.

mod chat;
mod rest;

pub use chat::{ChatMessage, MessageId, OutgoingMessage, RoomId, UserId};
pub use rest::{ApiResponse, RoomInfo, RoomPage, StartRoomRequest};
