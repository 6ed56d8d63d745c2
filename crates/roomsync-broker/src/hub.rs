//! The relay: what the broker does with each room event.
//!
//! ```text
//! /app/join        → register participant, broadcast JOINED + roster
//! /app/code_change → broadcast CODE_CHANGE to the room
//! /app/sync_code   → broadcast SYNC_CODE to the room
//! /app/leave       → remove participant, broadcast DISCONNECTED
//! connection lost  → same as leave
//! ```

use roomsync_protocol::{
    destination, Codec, DisconnectedPayload, JoinPayload, JoinedPayload, JsonCodec, Participant,
    RoomEvent, RoomId, SocketId,
};

use crate::rooms::{Departure, RoomRegistry};
use crate::topics::{Outbox, Topics};

/// Display name given to a participant who offers none.
pub const ANONYMOUS: &str = "Anonymous";

/// Why a client event was not relayed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Rejection {
    /// Clients may not publish this event type.
    ServerOnly(&'static str),
}

impl std::fmt::Display for Rejection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::ServerOnly(kind) => write!(f, "{kind} is sent by the server only"),
        }
    }
}

/// Rooms plus destination subscriptions, guarded together by the broker.
#[derive(Debug, Default)]
pub(crate) struct Hub {
    rooms: RoomRegistry,
    topics: Topics,
}

impl Hub {
    pub(crate) fn subscribe(&mut self, destination: &str, session: &SocketId, id: &str, outbox: Outbox) {
        self.topics.subscribe(destination, session, id, outbox);
    }

    pub(crate) fn unsubscribe(&mut self, session: &SocketId, id: &str) -> bool {
        self.topics.unsubscribe(session, id)
    }

    /// Applies one event published by `session`.
    pub(crate) fn handle(&mut self, session: &SocketId, event: RoomEvent) -> Result<(), Rejection> {
        match event {
            RoomEvent::Join(payload) => {
                self.join(session, payload);
                Ok(())
            }
            RoomEvent::CodeChange(ref payload) => {
                let room_id = payload.room_id.clone();
                self.broadcast(&room_id, &event);
                Ok(())
            }
            RoomEvent::SyncCode(ref payload) => {
                let room_id = payload.room_id.clone();
                self.broadcast(&room_id, &event);
                Ok(())
            }
            RoomEvent::Leave(payload) => {
                if payload.socket_id != *session {
                    tracing::debug!(%session, claimed = %payload.socket_id, "LEAVE for another socket, using sender");
                }
                self.depart(session);
                Ok(())
            }
            RoomEvent::Joined(_) => Err(Rejection::ServerOnly("JOINED")),
            RoomEvent::Disconnected(_) => Err(Rejection::ServerOnly("DISCONNECTED")),
        }
    }

    /// Forgets everything about `session`: its subscriptions and its room
    /// membership.
    pub(crate) fn drop_session(&mut self, session: &SocketId) {
        self.topics.remove_session(session);
        self.depart(session);
    }

    pub(crate) fn roster(&self, room_id: &RoomId) -> Vec<Participant> {
        self.rooms.roster(room_id)
    }

    pub(crate) fn room_count(&self) -> usize {
        self.rooms.room_count()
    }

    fn join(&mut self, session: &SocketId, payload: JoinPayload) {
        let participant = Participant {
            socket_id: session.clone(),
            username: payload
                .username
                .filter(|name| !name.trim().is_empty())
                .unwrap_or_else(|| ANONYMOUS.to_string()),
            photo_url: Some(payload.photo_url.unwrap_or_default()),
            email: Some(payload.email.unwrap_or_default()),
        };
        let username = participant.username.clone();
        let room_id = payload.room_id;

        let (clients, moved_from) = self.rooms.join(room_id.clone(), participant);
        if let Some(departure) = moved_from {
            self.announce_departure(departure);
        }
        tracing::info!(room = %room_id, %session, %username, "participant joined");

        let joined = RoomEvent::Joined(JoinedPayload {
            clients,
            username,
            socket_id: session.clone(),
            room_id: Some(room_id.clone()),
        });
        self.broadcast(&room_id, &joined);
    }

    fn depart(&mut self, session: &SocketId) {
        if let Some(departure) = self.rooms.leave(session) {
            self.announce_departure(departure);
        }
    }

    fn announce_departure(&mut self, departure: Departure) {
        let Departure {
            room_id,
            participant,
        } = departure;
        tracing::info!(room = %room_id, session = %participant.socket_id, "participant left");
        let event = RoomEvent::Disconnected(DisconnectedPayload {
            socket_id: participant.socket_id,
            username: participant.username,
            room_id: Some(room_id.clone()),
        });
        self.broadcast(&room_id, &event);
    }

    fn broadcast(&mut self, room_id: &RoomId, event: &RoomEvent) {
        let body = match JsonCodec.encode(event) {
            Ok(body) => body,
            Err(e) => {
                tracing::warn!(room = %room_id, error = %e, "failed to encode event");
                return;
            }
        };
        let topic = destination::room_topic(room_id);
        let reached = self.topics.publish(&topic, &body);
        tracing::debug!(%topic, kind = %event.kind(), reached, "broadcast");
    }
}

#[cfg(test)]
mod tests {
    use roomsync_protocol::{decode_packets, CodeChangePayload, LeavePayload, Packet};
    use tokio::sync::mpsc;

    use super::*;

    fn subscribed(hub: &mut Hub, session: &str, room: &str) -> mpsc::UnboundedReceiver<Vec<u8>> {
        let (tx, rx) = mpsc::unbounded_channel();
        hub.subscribe(
            &destination::room_topic(&RoomId::new(room)),
            &SocketId::new(session),
            "sub-1",
            tx,
        );
        rx
    }

    fn events(rx: &mut mpsc::UnboundedReceiver<Vec<u8>>) -> Vec<RoomEvent> {
        let mut out = Vec::new();
        while let Ok(bytes) = rx.try_recv() {
            for packet in decode_packets(&bytes).unwrap() {
                if let Packet::Frame(frame) = packet {
                    out.push(JsonCodec.decode(&frame.body).unwrap());
                }
            }
        }
        out
    }

    fn join(room: &str, name: Option<&str>) -> RoomEvent {
        RoomEvent::Join(JoinPayload {
            room_id: RoomId::new(room),
            username: name.map(str::to_string),
            photo_url: None,
            email: None,
        })
    }

    #[test]
    fn test_join_broadcasts_joined_with_roster() {
        let mut hub = Hub::default();
        let mut rx = subscribed(&mut hub, "s1", "abc");

        hub.handle(&SocketId::new("s1"), join("abc", Some("Ada"))).unwrap();

        match events(&mut rx).as_slice() {
            [RoomEvent::Joined(p)] => {
                assert_eq!(p.socket_id, SocketId::new("s1"));
                assert_eq!(p.username, "Ada");
                assert_eq!(p.clients.len(), 1);
                assert_eq!(p.clients[0].email.as_deref(), Some(""));
            }
            other => panic!("expected one JOINED, got {other:?}"),
        }
    }

    #[test]
    fn test_join_without_name_is_anonymous() {
        let mut hub = Hub::default();
        hub.handle(&SocketId::new("s1"), join("abc", None)).unwrap();
        assert_eq!(hub.roster(&RoomId::new("abc"))[0].username, ANONYMOUS);
    }

    #[test]
    fn test_code_change_only_reaches_its_room() {
        let mut hub = Hub::default();
        let mut abc = subscribed(&mut hub, "s1", "abc");
        let mut xyz = subscribed(&mut hub, "s2", "xyz");

        hub.handle(
            &SocketId::new("s1"),
            RoomEvent::CodeChange(CodeChangePayload {
                room_id: RoomId::new("abc"),
                code: Some("x=1".into()),
            }),
        )
        .unwrap();

        assert_eq!(events(&mut abc).len(), 1);
        assert!(events(&mut xyz).is_empty());
    }

    #[test]
    fn test_leave_broadcasts_disconnected_and_drops_room() {
        let mut hub = Hub::default();
        hub.handle(&SocketId::new("s1"), join("abc", Some("Ada"))).unwrap();
        hub.handle(&SocketId::new("s2"), join("abc", Some("Bob"))).unwrap();
        let mut rx = subscribed(&mut hub, "s1", "abc");

        hub.handle(
            &SocketId::new("s2"),
            RoomEvent::Leave(LeavePayload {
                socket_id: SocketId::new("s2"),
                room_id: RoomId::new("abc"),
            }),
        )
        .unwrap();

        match events(&mut rx).as_slice() {
            [RoomEvent::Disconnected(p)] => {
                assert_eq!(p.socket_id, SocketId::new("s2"));
                assert_eq!(p.username, "Bob");
            }
            other => panic!("expected one DISCONNECTED, got {other:?}"),
        }

        hub.drop_session(&SocketId::new("s1"));
        assert_eq!(hub.room_count(), 0);
    }

    #[test]
    fn test_client_cannot_publish_server_events() {
        let mut hub = Hub::default();
        let result = hub.handle(
            &SocketId::new("s1"),
            RoomEvent::Disconnected(DisconnectedPayload {
                socket_id: SocketId::new("s2"),
                username: "Bob".into(),
                room_id: None,
            }),
        );
        assert_eq!(result, Err(Rejection::ServerOnly("DISCONNECTED")));
    }
}
