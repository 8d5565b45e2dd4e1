//! Fuzz target for the room session controller
//!
//! Feeds `RoomSession` arbitrary room selections, fetch completions, broker
//! frames and timer ticks, with completions tagged for either the current
//! selection or a stale one.
//!
//! # Invariants
//!
//! - Displayed messages always belong to the selected room
//! - No message id is displayed twice
//! - Within one selection the displayed sequence only grows
//! - A `SEND` frame is only produced while `Active`
//! - Once closed, the session emits nothing but link teardown

#![no_main]

use std::{collections::HashSet, sync::Arc, time::Duration};

use arbitrary::Arbitrary;
use guidechat_app::{
    FetchError, RoomSession, SessionAction, SessionEvent, SessionState, SessionTag, StaticToken,
};
use guidechat_core::{BearerToken, ConnectionConfig};
use guidechat_proto::{ChatMessage, Command, Frame, RoomInfo};
use libfuzzer_sys::fuzz_target;

#[derive(Debug, Clone, Arbitrary)]
enum TagChoice {
    Current,
    Stale { room_id: u8, generation: u8 },
}

#[derive(Debug, Clone, Arbitrary)]
enum Op {
    Select { room_id: u8 },
    RoomLoaded { tag: TagChoice, outcome: u8 },
    HistoryLoaded { tag: TagChoice, ids: Vec<u8>, fail: bool },
    TransportOpened { tag: TagChoice },
    TransportClosed { tag: TagChoice },
    Connected { tag: TagChoice },
    Live { tag: TagChoice, id: u8, room_offset: u8, subscription: u8 },
    BrokerError { tag: TagChoice },
    Heartbeat { tag: TagChoice },
    Advance { millis: u16 },
    Send { text: String },
    Unmount,
}

fn resolve(session: &RoomSession<Duration>, choice: &TagChoice) -> SessionTag {
    match (choice, session.tag()) {
        (TagChoice::Current, Some(tag)) => tag,
        (TagChoice::Current, None) => SessionTag { room_id: 0, generation: 0 },
        (TagChoice::Stale { room_id, generation }, _) => {
            SessionTag { room_id: u64::from(*room_id), generation: u64::from(*generation) }
        },
    }
}

fn message(id: u8, room_id: u64) -> ChatMessage {
    ChatMessage {
        id: Some(u64::from(id)),
        room_id,
        sender_id: u64::from(id % 3),
        content: format!("m{id}"),
        created_at: None,
    }
}

fn room(room_id: u64) -> RoomInfo {
    RoomInfo {
        id: room_id,
        title: "room".into(),
        display_title: "guide".into(),
        guide_id: 1,
        user_id: 2,
        updated_at: None,
        last_message_id: None,
    }
}

fn event(session: &RoomSession<Duration>, op: &Op) -> Option<SessionEvent> {
    let event = match op {
        Op::Select { room_id } => SessionEvent::SelectRoom { room_id: u64::from(*room_id) },
        Op::RoomLoaded { tag, outcome } => {
            let tag = resolve(session, tag);
            let result = match outcome % 3 {
                0 => Ok(Some(room(tag.room_id))),
                1 => Ok(None),
                _ => Err(FetchError::Failed("unavailable".into())),
            };
            SessionEvent::RoomLoaded { tag, result }
        },
        Op::HistoryLoaded { tag, ids, fail } => {
            let tag = resolve(session, tag);
            let result = if *fail {
                Err(FetchError::Failed("timeout".into()))
            } else {
                Ok(ids.iter().take(64).map(|id| message(*id, tag.room_id)).collect())
            };
            SessionEvent::HistoryLoaded { tag, result }
        },
        Op::TransportOpened { tag } => SessionEvent::TransportOpened { tag: resolve(session, tag) },
        Op::TransportClosed { tag } => SessionEvent::TransportClosed { tag: resolve(session, tag) },
        Op::Connected { tag } => SessionEvent::FrameReceived {
            tag: resolve(session, tag),
            frame: Frame::new(Command::Connected).with_header("version", "1.2"),
        },
        Op::Live { tag, id, room_offset, subscription } => {
            let tag = resolve(session, tag);
            let room_id = tag.room_id + u64::from(room_offset % 2);
            let body = serde_json::to_vec(&message(*id, room_id)).ok()?;
            let frame = Frame::new(Command::Message)
                .with_header("subscription", format!("sub-{}", subscription % 2))
                .with_header("destination", format!("/topic/userchat/{}", tag.room_id))
                .with_body(body);
            SessionEvent::FrameReceived { tag, frame }
        },
        Op::BrokerError { tag } => SessionEvent::FrameReceived {
            tag: resolve(session, tag),
            frame: Frame::new(Command::Error).with_header("message", "denied"),
        },
        Op::Heartbeat { tag } => SessionEvent::HeartbeatReceived { tag: resolve(session, tag) },
        Op::Unmount => SessionEvent::Unmount,
        Op::Advance { .. } | Op::Send { .. } => return None,
    };
    Some(event)
}

fn check_messages(session: &RoomSession<Duration>) {
    let mut ids = HashSet::new();
    for message in session.messages() {
        assert_eq!(Some(message.room_id), session.room_id(), "message for another room displayed");
        if let Some(id) = message.id {
            assert!(ids.insert(id), "message {id} displayed twice");
        }
    }
}

fuzz_target!(|ops: Vec<Op>| {
    let tokens = Arc::new(StaticToken::new(Some(BearerToken::new("t"))));
    let mut session: RoomSession<Duration> = RoomSession::new(ConnectionConfig::default(), tokens);
    let mut now = Duration::ZERO;

    let mut shown = (session.tag(), 0usize);

    for op in ops.iter().take(256) {
        let was_active = session.state() == &SessionState::Active;
        let was_closed = session.state() == &SessionState::Closed;

        let actions = match op {
            Op::Advance { millis } => {
                now += Duration::from_millis(u64::from(*millis));
                session.handle(SessionEvent::Tick, now)
            },
            Op::Send { text } => session.send(text, now),
            other => match event(&session, other) {
                Some(event) => session.handle(event, now),
                None => continue,
            },
        };

        for action in &actions {
            if let SessionAction::SendFrame { frame, .. } = action
                && frame.command == Command::Send
            {
                assert!(was_active, "SEND produced outside Active");
            }
            if was_closed {
                assert!(
                    matches!(action, SessionAction::CloseTransport { .. }),
                    "closed session emitted {action:?}"
                );
            }
        }

        check_messages(&session);

        let tag = session.tag();
        let len = session.messages().len();
        if tag == shown.0 {
            assert!(len >= shown.1, "displayed sequence shrank within a selection");
        }
        shown = (tag, len);
    }
});
