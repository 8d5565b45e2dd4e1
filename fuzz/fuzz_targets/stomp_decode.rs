//! Fuzz target for the STOMP transport message decoder
//!
//! Feeds arbitrary bytes to `decode` to find:
//! - Parser panics on truncated or malformed frames
//! - Out-of-bounds slicing around `content-length`
//! - Non-terminating loops over heart-beat runs
//!
//! The decoder should NEVER panic. Invalid input returns an error.

#![no_main]

use guidechat_proto::{Inbound, decode};
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    if let Ok(items) = decode(data) {
        // Re-encoding a decoded frame must not panic either
        for item in items {
            if let Inbound::Frame(frame) = item {
                let _ = frame.to_text();
            }
        }
    }
});
