//! Who is in which room.

use std::collections::HashMap;

use roomsync_protocol::{Participant, RoomId, SocketId};

/// A participant removed from a room.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Departure {
    pub room_id: RoomId,
    pub participant: Participant,
}

/// Rooms and their participants, in join order.
///
/// A session is in at most one room. Rooms exist only while someone is in
/// them.
#[derive(Debug, Default)]
pub struct RoomRegistry {
    rooms: HashMap<RoomId, Vec<Participant>>,
    membership: HashMap<SocketId, RoomId>,
}

impl RoomRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds `participant` to `room_id` and returns the room's roster.
    ///
    /// Joining the same room again replaces the entry. Joining a different
    /// room first leaves the old one, which is returned as a departure.
    pub fn join(
        &mut self,
        room_id: RoomId,
        participant: Participant,
    ) -> (Vec<Participant>, Option<Departure>) {
        let socket_id = participant.socket_id.clone();
        let departure = match self.membership.get(&socket_id) {
            Some(current) if current != &room_id => self.leave(&socket_id),
            _ => None,
        };

        let roster = self.rooms.entry(room_id.clone()).or_default();
        match roster.iter_mut().find(|p| p.socket_id == socket_id) {
            Some(existing) => *existing = participant,
            None => roster.push(participant),
        }
        let snapshot = roster.clone();
        self.membership.insert(socket_id, room_id);
        (snapshot, departure)
    }

    /// Removes `socket_id` from its room. Empty rooms are dropped.
    pub fn leave(&mut self, socket_id: &SocketId) -> Option<Departure> {
        let room_id = self.membership.remove(socket_id)?;
        let roster = self.rooms.get_mut(&room_id)?;
        let pos = roster.iter().position(|p| &p.socket_id == socket_id)?;
        let participant = roster.remove(pos);
        if roster.is_empty() {
            self.rooms.remove(&room_id);
            tracing::debug!(room = %room_id, "room empty, dropped");
        }
        Some(Departure {
            room_id,
            participant,
        })
    }

    pub fn roster(&self, room_id: &RoomId) -> Vec<Participant> {
        self.rooms.get(room_id).cloned().unwrap_or_default()
    }

    pub fn room_of(&self, socket_id: &SocketId) -> Option<&RoomId> {
        self.membership.get(socket_id)
    }

    pub fn room_count(&self) -> usize {
        self.rooms.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn participant(id: &str, name: &str) -> Participant {
        Participant {
            socket_id: SocketId::new(id),
            username: name.to_string(),
            photo_url: Some(String::new()),
            email: Some(String::new()),
        }
    }

    #[test]
    fn test_join_returns_roster_in_join_order() {
        let mut rooms = RoomRegistry::new();
        rooms.join(RoomId::new("abc"), participant("s1", "Ada"));
        let (roster, departure) = rooms.join(RoomId::new("abc"), participant("s2", "Bob"));

        let names: Vec<_> = roster.iter().map(|p| p.username.as_str()).collect();
        assert_eq!(names, vec!["Ada", "Bob"]);
        assert!(departure.is_none());
    }

    #[test]
    fn test_join_same_room_twice_replaces_entry() {
        let mut rooms = RoomRegistry::new();
        rooms.join(RoomId::new("abc"), participant("s1", "Ada"));
        let (roster, _) = rooms.join(RoomId::new("abc"), participant("s1", "Ada L."));
        assert_eq!(roster.len(), 1);
        assert_eq!(roster[0].username, "Ada L.");
    }

    #[test]
    fn test_join_other_room_leaves_previous() {
        let mut rooms = RoomRegistry::new();
        rooms.join(RoomId::new("abc"), participant("s1", "Ada"));
        let (_, departure) = rooms.join(RoomId::new("xyz"), participant("s1", "Ada"));

        let departure = departure.unwrap();
        assert_eq!(departure.room_id, RoomId::new("abc"));
        assert_eq!(rooms.room_count(), 1);
        assert_eq!(rooms.room_of(&SocketId::new("s1")), Some(&RoomId::new("xyz")));
    }

    #[test]
    fn test_leave_last_participant_drops_room() {
        let mut rooms = RoomRegistry::new();
        rooms.join(RoomId::new("abc"), participant("s1", "Ada"));

        let departure = rooms.leave(&SocketId::new("s1")).unwrap();

        assert_eq!(departure.participant.username, "Ada");
        assert_eq!(rooms.room_count(), 0);
        assert!(rooms.roster(&RoomId::new("abc")).is_empty());
    }

    #[test]
    fn test_leave_unknown_is_none() {
        let mut rooms = RoomRegistry::new();
        assert!(rooms.leave(&SocketId::new("ghost")).is_none());
    }
}
