//! Typed line parsing.
//!
//! Lines starting with `/` are commands; everything else is a message.

use guidechat_app::{DriverEvent, SessionEvent};
use guidechat_proto::RoomId;

/// Help shown for `/help` and unknown commands.
pub const HELP: &str = "commands: /room <id> switch room, /quit exit, /help this text";

/// What a typed line asks for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Input {
    /// Open another room.
    Room(RoomId),
    /// Send the line as a message.
    Message(String),
    /// Leave the client.
    Quit,
    /// Show the command list.
    Help,
    /// Malformed command.
    Invalid(String),
}

impl Input {
    /// Runtime event for this input. `None` for inputs handled by the driver.
    pub fn into_event(self) -> Option<DriverEvent> {
        match self {
            Self::Room(room_id) => Some(DriverEvent::Session(SessionEvent::SelectRoom { room_id })),
            Self::Message(text) => Some(DriverEvent::Send(text)),
            Self::Quit => Some(DriverEvent::Quit),
            Self::Help | Self::Invalid(_) => None,
        }
    }
}

/// Parse one typed line.
pub fn parse(line: &str) -> Input {
    let Some(command) = line.trim_start().strip_prefix('/') else {
        return Input::Message(line.to_string());
    };

    let mut words = command.split_whitespace();
    match (words.next(), words.next(), words.next()) {
        (Some("room"), Some(id), None) => match id.parse() {
            Ok(room_id) => Input::Room(room_id),
            Err(_) => Input::Invalid(format!("not a room id: {id}")),
        },
        (Some("quit" | "exit"), None, None) => Input::Quit,
        (Some("help"), None, None) => Input::Help,
        _ => Input::Invalid(format!("unknown command: /{}", command.trim())),
    }
}
