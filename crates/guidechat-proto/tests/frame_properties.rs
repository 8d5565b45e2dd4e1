//! Property-based tests for the STOMP codec.

use guidechat_proto::{Command, Frame, Inbound, decode};
use proptest::prelude::*;

fn command_strategy() -> impl Strategy<Value = Command> {
    prop_oneof![
        Just(Command::Send),
        Just(Command::Subscribe),
        Just(Command::Message),
        Just(Command::Error),
        Just(Command::Connected),
    ]
}

fn frame_strategy() -> impl Strategy<Value = Frame> {
    (
        command_strategy(),
        prop::collection::vec(("[a-z][a-z-]{0,8}", "[ -~]{0,16}"), 0..4),
        prop::collection::vec(any::<u8>(), 0..64),
    )
        .prop_map(|(command, headers, body)| {
            headers
                .into_iter()
                // CONNECTED values are sent raw, so keep them free of escapes
                .filter(|(_, v)| command != Command::Connected || !v.contains('\\'))
                .fold(Frame::new(command), |frame, (n, v)| frame.with_header(n, v))
                .with_body(body)
        })
}

proptest! {
    #[test]
    fn prop_decoder_never_panics(bytes in prop::collection::vec(any::<u8>(), 0..256)) {
        let _ = decode(&bytes);
    }

    #[test]
    fn prop_encoded_frames_decode_in_order(frames in prop::collection::vec(frame_strategy(), 1..4)) {
        let mut wire = Vec::new();
        for frame in &frames {
            frame.encode(&mut wire).unwrap();
            wire.push(b'\n');
        }

        let decoded: Vec<Frame> = decode(&wire)
            .unwrap()
            .into_iter()
            .filter_map(|item| match item {
                Inbound::Frame(f) => Some(f),
                Inbound::Heartbeat => None,
            })
            .collect();

        prop_assert_eq!(decoded.len(), frames.len());
        for (original, decoded) in frames.iter().zip(&decoded) {
            prop_assert_eq!(original.command, decoded.command);
            prop_assert_eq!(&original.body, &decoded.body);
            for (name, _) in original.headers() {
                prop_assert_eq!(decoded.header(name), original.header(name));
            }
        }
    }
}
