//! Text rendering.
//!
//! The session's message buffer only grows within a selection, so rendering is
//! incremental: each call prints what changed since the previous one.

use std::{
    io::{self, Write},
    ops::Sub,
    time::Duration,
};

use guidechat_app::{MessageSide, Notice, RoomSession, SessionState, SessionTag, Unavailability};
use guidechat_proto::{ChatMessage, RoomId, RoomInfo};

/// Incremental session renderer.
#[derive(Debug)]
pub struct Renderer<W> {
    out: W,
    shown: Option<SessionTag>,
    titled: bool,
    printed: usize,
    state: Option<SessionState>,
}

impl<W: Write> Renderer<W> {
    /// Renderer writing to `out`.
    pub fn new(out: W) -> Self {
        Self { out, shown: None, titled: false, printed: 0, state: None }
    }

    /// Underlying writer.
    pub fn into_inner(self) -> W {
        self.out
    }

    /// Print whatever changed since the last call.
    pub fn render<I>(&mut self, session: &RoomSession<I>) -> io::Result<()>
    where
        I: Copy + Ord + Send + Sync + Sub<Output = Duration>,
    {
        let tag = session.tag();
        if tag != self.shown {
            self.shown = tag;
            self.titled = false;
            self.printed = 0;
            if let Some(tag) = tag {
                writeln!(self.out, "{}", room_banner(tag.room_id, None))?;
            }
        }

        if !self.titled
            && let (Some(tag), Some(room)) = (tag, session.room())
        {
            writeln!(self.out, "{}", room_banner(tag.room_id, Some(room)))?;
            self.titled = true;
        }

        let state = session.state();
        if self.state.as_ref() != Some(state) {
            if let Some(line) = state_line(state, session.room_id()) {
                writeln!(self.out, "{line}")?;
            }
            self.state = Some(state.clone());
        }

        let messages = session.messages();
        for message in messages.get(self.printed..).unwrap_or_default() {
            writeln!(self.out, "{}", message_line(message, session.side(message), session.room()))?;
        }
        self.printed = messages.len();

        self.out.flush()
    }

    /// Print a notice.
    pub fn notice(&mut self, notice: &Notice) -> io::Result<()> {
        let marker = if notice.is_blocking() { '!' } else { '*' };
        writeln!(self.out, "{marker} {notice}")?;
        self.out.flush()
    }

    /// Print a free-form line.
    pub fn line(&mut self, text: &str) -> io::Result<()> {
        writeln!(self.out, "{text}")?;
        self.out.flush()
    }
}

fn room_banner(room_id: RoomId, room: Option<&RoomInfo>) -> String {
    match room.map(|room| room.display_title.as_str()).filter(|title| !title.is_empty()) {
        Some(title) => format!("-- {title} (room {room_id}) --"),
        None => format!("-- room {room_id} --"),
    }
}

fn state_line(state: &SessionState, room_id: Option<RoomId>) -> Option<String> {
    let line = match state {
        SessionState::Idle => return None,
        SessionState::Loading => "loading messages...".to_string(),
        SessionState::Connecting => "connecting...".to_string(),
        SessionState::Active => "connected".to_string(),
        SessionState::Failed => match room_id {
            Some(room_id) => format!("disconnected, /room {room_id} to retry"),
            None => "disconnected".to_string(),
        },
        SessionState::Unavailable(Unavailability::NotFound) => "room not available".to_string(),
        SessionState::Unavailable(Unavailability::Failed(reason)) => format!("room not available: {reason}"),
        SessionState::Closed => "closed".to_string(),
    };
    Some(line)
}

/// One message as a line of text.
pub fn message_line(message: &ChatMessage, side: MessageSide, room: Option<&RoomInfo>) -> String {
    let time = message.created_at.as_deref().and_then(clock_time).unwrap_or("--:--");
    let author = match side {
        MessageSide::Sent => "you".to_string(),
        MessageSide::Received => room
            .map(|room| room.display_title.as_str())
            .filter(|title| !title.is_empty())
            .map_or_else(|| format!("user {}", message.sender_id), str::to_string),
    };
    format!("[{time}] {author}: {}", message.content)
}

/// `HH:MM` from an ISO-8601 timestamp.
fn clock_time(timestamp: &str) -> Option<&str> {
    let (_, time) = timestamp.split_once('T')?;
    time.get(..5)
}

/// One room directory entry as a line of text.
pub fn room_line(room: &RoomInfo) -> String {
    let title = if room.display_title.is_empty() { &room.title } else { &room.display_title };
    let updated = room.updated_at.as_deref().unwrap_or("-");
    format!("{:>6}  {title}  (guide {}, user {}, updated {updated})", room.id, room.guide_id, room.user_id)
}
