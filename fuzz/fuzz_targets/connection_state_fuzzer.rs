//! Fuzz target for the broker connection state machine
//!
//! Drives `ConnectionManager` through arbitrary interleavings of transport
//! events, broker frames, timer ticks and owner calls.
//!
//! # Invariants
//!
//! - `publish` succeeds only while `Connected`, and never queues otherwise
//! - `OpenTransport` is only emitted while `Connecting`
//! - `close` is idempotent: a second close emits nothing
//! - An inactive connection ignores every event

#![no_main]

use std::time::Duration;

use arbitrary::Arbitrary;
use guidechat_core::{
    BearerToken, ConnectionAction, ConnectionConfig, ConnectionError, ConnectionManager,
    ConnectionStatus, SubscriptionId,
};
use guidechat_proto::{Command, Frame};
use libfuzzer_sys::fuzz_target;

#[derive(Debug, Clone, Arbitrary)]
enum Op {
    Open { with_token: bool },
    TransportOpened,
    TransportClosed,
    Connected { heart_beat: Option<(u16, u16)> },
    Message { subscription: u8 },
    Receipt,
    Error,
    Heartbeat,
    Advance { millis: u16 },
    Subscribe,
    Unsubscribe { id: u8 },
    Publish,
    Close,
}

fn broker_frame(op: &Op) -> Option<Frame> {
    let frame = match op {
        Op::Connected { heart_beat } => {
            let frame = Frame::new(Command::Connected).with_header("version", "1.2");
            match heart_beat {
                Some((cx, cy)) => frame.with_header("heart-beat", format!("{cx},{cy}")),
                None => frame,
            }
        },
        Op::Message { subscription } => Frame::new(Command::Message)
            .with_header("subscription", format!("sub-{subscription}"))
            .with_header("destination", "/topic/userchat/1")
            .with_body(r#"{"id":1,"roomId":1,"senderId":2,"content":"hi"}"#),
        Op::Receipt => Frame::new(Command::Receipt).with_header("receipt-id", "r-1"),
        Op::Error => Frame::new(Command::Error).with_header("message", "denied"),
        _ => return None,
    };
    Some(frame)
}

fn check_actions(
    status_before: ConnectionStatus,
    manager: &ConnectionManager<Duration>,
    actions: &[ConnectionAction],
) {
    for action in actions {
        if matches!(action, ConnectionAction::OpenTransport) {
            assert_eq!(
                manager.status(),
                ConnectionStatus::Connecting,
                "OpenTransport emitted outside Connecting (was {status_before:?})"
            );
        }
    }
}

fuzz_target!(|ops: Vec<Op>| {
    let mut manager = ConnectionManager::new(1, ConnectionConfig::default(), Duration::ZERO);
    let mut now = Duration::ZERO;
    let mut closed = false;

    for op in ops.iter().take(256) {
        let before = manager.status();

        let actions = match op {
            Op::Open { with_token } => {
                let token = with_token.then(|| BearerToken::new("t"));
                match manager.open(token, now) {
                    Ok(actions) => {
                        closed = false;
                        actions
                    },
                    Err(e) => {
                        assert!(matches!(e, ConnectionError::InvalidState { .. }));
                        assert!(manager.is_active());
                        continue;
                    },
                }
            },
            Op::TransportOpened => manager.transport_opened(now),
            Op::TransportClosed => manager.transport_closed(now),
            Op::Heartbeat => {
                manager.heartbeat_received(now);
                vec![]
            },
            Op::Advance { millis } => {
                now += Duration::from_millis(u64::from(*millis));
                manager.tick(now)
            },
            Op::Subscribe => manager.subscribe("/topic/userchat/1").1,
            Op::Unsubscribe { id } => match format!("sub-{id}").parse::<SubscriptionId>() {
                Ok(id) => manager.unsubscribe(id),
                Err(_) => continue,
            },
            Op::Publish => {
                let payload = serde_json::json!({ "content": "hello" });
                match manager.publish("/pub/userchat/1/messages", &payload, now) {
                    Ok(actions) => {
                        assert_eq!(before, ConnectionStatus::Connected, "publish accepted while {before:?}");
                        assert!(matches!(actions.as_slice(), [ConnectionAction::SendFrame(_)]));
                        actions
                    },
                    Err(ConnectionError::NotConnected { status }) => {
                        assert_ne!(status, ConnectionStatus::Connected);
                        continue;
                    },
                    Err(e) => panic!("unexpected publish error: {e}"),
                }
            },
            Op::Close => {
                let actions = manager.close();
                assert!(manager.close().is_empty(), "second close emitted actions");
                closed = true;
                actions
            },
            frame_op => {
                let Some(frame) = broker_frame(frame_op) else { continue };
                match manager.handle_frame(frame, now) {
                    Ok(actions) => actions,
                    Err(_) => continue,
                }
            },
        };

        if closed && !matches!(op, Op::Close) {
            assert!(actions.is_empty(), "inactive connection reacted to {op:?}: {actions:?}");
        }

        check_actions(before, &manager, &actions);
    }
});
