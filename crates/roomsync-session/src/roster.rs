//! The local view of who is in the room.

use std::collections::BTreeMap;

use roomsync_protocol::{Participant, SocketId};

/// Participants keyed by session id.
///
/// Owned by the session; the transport never touches it.
#[derive(Debug, Clone, Default)]
pub struct Roster {
    participants: BTreeMap<SocketId, Participant>,
}

impl Roster {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replaces the whole roster with the one carried by a JOINED event.
    ///
    /// Duplicate session ids collapse to the last entry.
    pub fn replace(&mut self, clients: Vec<Participant>) {
        self.participants = clients
            .into_iter()
            .map(|p| (p.socket_id.clone(), p))
            .collect();
    }

    /// Removes the participant with this session id, if present.
    pub fn remove(&mut self, socket_id: &SocketId) -> Option<Participant> {
        self.participants.remove(socket_id)
    }

    pub fn get(&self, socket_id: &SocketId) -> Option<&Participant> {
        self.participants.get(socket_id)
    }

    pub fn contains(&self, socket_id: &SocketId) -> bool {
        self.participants.contains_key(socket_id)
    }

    /// Drops every participant.
    pub fn clear(&mut self) {
        self.participants.clear();
    }

    pub fn len(&self) -> usize {
        self.participants.len()
    }

    pub fn is_empty(&self) -> bool {
        self.participants.is_empty()
    }

    /// Returns a snapshot ordered by session id.
    pub fn participants(&self) -> Vec<Participant> {
        self.participants.values().cloned().collect()
    }
}
