//! Destination naming for the broker.
//!
//! Publishes go to `/app/<event type lowercased>`, subscriptions read from
//! `/topic/room/<room id>`.

use crate::{EventKind, RoomId};

/// Prefix of destinations handled by the broker's application relay.
pub const APP_PREFIX: &str = "/app/";

/// Prefix of per-room broadcast topics.
pub const ROOM_TOPIC_PREFIX: &str = "/topic/room/";

/// Returns the destination a client publishes `kind` to.
pub fn publish_destination(kind: EventKind) -> String {
    format!("{APP_PREFIX}{}", kind.as_str().to_lowercase())
}

/// Returns the broadcast topic of `room`.
pub fn room_topic(room: &RoomId) -> String {
    format!("{ROOM_TOPIC_PREFIX}{room}")
}

/// Maps an application destination back to its event kind.
pub fn parse_publish_destination(destination: &str) -> Option<EventKind> {
    let name = destination.strip_prefix(APP_PREFIX)?;
    EventKind::ALL
        .into_iter()
        .find(|k| k.as_str().to_lowercase() == name)
}

/// Extracts the room id from a room topic.
pub fn parse_room_topic(destination: &str) -> Option<RoomId> {
    destination
        .strip_prefix(ROOM_TOPIC_PREFIX)
        .filter(|id| !id.is_empty())
        .map(RoomId::new)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_publish_destination_is_lowercased_event_name() {
        assert_eq!(publish_destination(EventKind::Join), "/app/join");
        assert_eq!(
            publish_destination(EventKind::CodeChange),
            "/app/code_change"
        );
        assert_eq!(publish_destination(EventKind::SyncCode), "/app/sync_code");
    }

    #[test]
    fn test_parse_publish_destination_inverts_naming() {
        for kind in EventKind::ALL {
            assert_eq!(
                parse_publish_destination(&publish_destination(kind)),
                Some(kind)
            );
        }
        assert_eq!(parse_publish_destination("/app/unknown"), None);
        assert_eq!(parse_publish_destination("/topic/room/abc"), None);
    }

    #[test]
    fn test_room_topic_round_trip() {
        let room = RoomId::new("abc");
        assert_eq!(room_topic(&room), "/topic/room/abc");
        assert_eq!(parse_room_topic("/topic/room/abc"), Some(room));
        assert_eq!(parse_room_topic("/topic/room/"), None);
        assert_eq!(parse_room_topic("/app/join"), None);
    }
}
