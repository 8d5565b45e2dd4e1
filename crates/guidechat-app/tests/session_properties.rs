//! Property-based tests for the RoomSession state machine.
//!
//! Tests verify that invariants hold under arbitrary event sequences, with
//! completions tagged for the current selection or any earlier one.

use std::{collections::HashSet, sync::Arc, time::Duration};

use guidechat_app::{
    FetchError, RoomSession, SessionAction, SessionEvent, SessionState, SessionTag, StaticToken,
};
use guidechat_core::{ConnectionConfig, ConnectionStatus};
use guidechat_proto::{ChatMessage, Command, Frame, RoomInfo, destination};
use proptest::prelude::*;

/// Test input. Tags are resolved against the selections made so far.
#[derive(Debug, Clone)]
enum Step {
    Select(u64),
    RoomLoaded { pick: usize, found: bool },
    History { pick: usize, ids: Vec<u64>, fail: bool },
    Opened { pick: usize },
    Closed { pick: usize },
    Connected { pick: usize },
    Live { pick: usize, room: u64, id: u64 },
    Error { pick: usize },
    Tick(u64),
    Send(String),
    Unmount,
}

fn step_strategy() -> impl Strategy<Value = Step> {
    prop_oneof![
        3 => (1u64..4).prop_map(Step::Select),
        1 => (any::<usize>(), any::<bool>()).prop_map(|(pick, found)| Step::RoomLoaded { pick, found }),
        3 => (any::<usize>(), prop::collection::vec(1u64..20, 0..5), prop::bool::weighted(0.1))
            .prop_map(|(pick, ids, fail)| Step::History { pick, ids, fail }),
        2 => any::<usize>().prop_map(|pick| Step::Opened { pick }),
        1 => any::<usize>().prop_map(|pick| Step::Closed { pick }),
        2 => any::<usize>().prop_map(|pick| Step::Connected { pick }),
        4 => (any::<usize>(), 1u64..4, 1u64..20).prop_map(|(pick, room, id)| Step::Live { pick, room, id }),
        1 => any::<usize>().prop_map(|pick| Step::Error { pick }),
        2 => (0u64..8000).prop_map(Step::Tick),
        2 => "[ a-z]{0,6}".prop_map(Step::Send),
        1 => Just(Step::Unmount),
    ]
}

fn message(id: u64, room_id: u64) -> ChatMessage {
    ChatMessage { id: Some(id), room_id, sender_id: 1, content: format!("m{id}"), created_at: None }
}

fn room_info(id: u64) -> RoomInfo {
    RoomInfo {
        id,
        title: format!("room {id}"),
        display_title: "guide".into(),
        guide_id: 2,
        user_id: 1,
        updated_at: None,
        last_message_id: None,
    }
}

fn live_frame(room_id: u64, id: u64) -> Frame {
    Frame::new(Command::Message)
        .with_header("subscription", "sub-0")
        .with_header("destination", destination::room_topic(room_id))
        .with_header("message-id", id.to_string())
        .with_body(serde_json::to_vec(&message(id, room_id)).unwrap_or_default())
}

fn connected_frame() -> Frame {
    Frame::new(Command::Connected).with_header("version", "1.2").with_header("heart-beat", "4000,4000")
}

fn check_invariants(session: &RoomSession<Duration>, actions: &[SessionAction]) {
    // Only the current room's messages are ever shown
    let room = session.room_id();
    for m in session.messages() {
        assert_eq!(Some(m.room_id), room, "foreign message in buffer: {m:?}");
    }

    // No identifier appears twice
    let mut seen = HashSet::new();
    for id in session.messages().iter().filter_map(|m| m.id) {
        assert!(seen.insert(id), "duplicate id {id}");
    }

    // Sending is possible only with a live subscription
    if session.is_connected() {
        assert_eq!(session.connection_status(), ConnectionStatus::Connected);
    }

    if session.state() == &SessionState::Closed {
        assert!(session.room_id().is_none());
        assert!(session.messages().is_empty());
        assert!(actions.iter().all(|a| !matches!(a, SessionAction::OpenTransport { .. })));
    }

    // Every link-level action targets the current selection, except closes
    for action in actions {
        match action {
            SessionAction::FetchRoom { tag }
            | SessionAction::FetchHistory { tag, .. }
            | SessionAction::OpenTransport { tag }
            | SessionAction::SendHeartbeat { tag } => assert_eq!(Some(*tag), session.tag()),
            _ => {},
        }
    }
}

proptest! {
    #[test]
    fn prop_session_invariants_hold(steps in prop::collection::vec(step_strategy(), 0..60)) {
        let mut session: RoomSession<Duration> =
            RoomSession::new(ConnectionConfig::default(), Arc::new(StaticToken::default()));
        let mut tags: Vec<SessionTag> = Vec::new();
        let mut now = Duration::ZERO;

        for step in steps {
            let pick = |i: usize| tags.get(i % tags.len().max(1)).copied();

            let actions = match step {
                Step::Select(room_id) => {
                    let actions = session.handle(SessionEvent::SelectRoom { room_id }, now);
                    if let Some(tag) = session.tag()
                        && !tags.contains(&tag)
                    {
                        tags.push(tag);
                    }
                    actions
                },
                Step::RoomLoaded { pick: i, found } => match pick(i) {
                    Some(tag) => {
                        let result = Ok(found.then(|| room_info(tag.room_id)));
                        session.handle(SessionEvent::RoomLoaded { tag, result }, now)
                    },
                    None => vec![],
                },
                Step::History { pick: i, ids, fail } => match pick(i) {
                    Some(tag) => {
                        let result = if fail {
                            Err(FetchError::Failed("boom".into()))
                        } else {
                            Ok(ids.into_iter().map(|id| message(id, tag.room_id)).collect())
                        };
                        session.handle(SessionEvent::HistoryLoaded { tag, result }, now)
                    },
                    None => vec![],
                },
                Step::Opened { pick: i } => match pick(i) {
                    Some(tag) => session.handle(SessionEvent::TransportOpened { tag }, now),
                    None => vec![],
                },
                Step::Closed { pick: i } => match pick(i) {
                    Some(tag) => session.handle(SessionEvent::TransportClosed { tag }, now),
                    None => vec![],
                },
                Step::Connected { pick: i } => match pick(i) {
                    Some(tag) => session.handle(SessionEvent::FrameReceived { tag, frame: connected_frame() }, now),
                    None => vec![],
                },
                Step::Live { pick: i, room, id } => match pick(i) {
                    Some(tag) => session.handle(SessionEvent::FrameReceived { tag, frame: live_frame(room, id) }, now),
                    None => vec![],
                },
                Step::Error { pick: i } => match pick(i) {
                    Some(tag) => {
                        let frame = Frame::new(Command::Error).with_header("message", "nope");
                        session.handle(SessionEvent::FrameReceived { tag, frame }, now)
                    },
                    None => vec![],
                },
                Step::Tick(ms) => {
                    now += Duration::from_millis(ms);
                    session.handle(SessionEvent::Tick, now)
                },
                Step::Send(text) => {
                    let actions = session.send(&text, now);
                    let published = actions.iter().any(|a| matches!(a, SessionAction::SendFrame { .. }));
                    prop_assert!(!published || session.is_connected(), "published while not connected");
                    actions
                },
                Step::Unmount => session.handle(SessionEvent::Unmount, now),
            };

            check_invariants(&session, &actions);
        }
    }
}
