//! Broker destinations for room chat.
//!
//! Live messages for a room fan out on `/topic/userchat/{roomId}`; clients
//! publish to `/pub/userchat/{roomId}/messages`.

use crate::RoomId;

/// Prefix of per-room subscription topics.
pub const TOPIC_PREFIX: &str = "/topic/userchat/";

/// Prefix of per-room publish destinations.
pub const PUBLISH_PREFIX: &str = "/pub/userchat/";

/// Topic carrying live messages for `room_id`.
pub fn room_topic(room_id: RoomId) -> String {
    format!("{TOPIC_PREFIX}{room_id}")
}

/// Destination that accepts new messages for `room_id`.
pub fn room_publish(room_id: RoomId) -> String {
    format!("{PUBLISH_PREFIX}{room_id}/messages")
}

/// Room addressed by a topic destination. `None` for any other destination.
pub fn room_of_topic(destination: &str) -> Option<RoomId> {
    destination.strip_prefix(TOPIC_PREFIX)?.parse().ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn destinations_for_room() {
        assert_eq!(room_topic(42), "/topic/userchat/42");
        assert_eq!(room_publish(42), "/pub/userchat/42/messages");
    }

    #[test]
    fn topic_parses_back_to_room() {
        assert_eq!(room_of_topic(&room_topic(7)), Some(7));
        assert_eq!(room_of_topic("/topic/other/7"), None);
        assert_eq!(room_of_topic("/topic/userchat/7/extra"), None);
    }
}
