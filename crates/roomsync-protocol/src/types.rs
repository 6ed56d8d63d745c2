//! Room event types: everything that travels in a STOMP `MESSAGE` or
//! `SEND` body.
//!
//! Every body is a JSON object with a `type` discriminator equal to the
//! event name (`"JOIN"`, `"CODE_CHANGE"`, ...). Field names follow the
//! browser client's camelCase (`roomId`, `socketId`, `photoURL`).

use std::fmt;

use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Identity types
// ---------------------------------------------------------------------------

/// An opaque room identifier. Rooms only exist as routing keys.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RoomId(pub String);

impl RoomId {
    /// Creates a room id from anything string-like.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Returns the id as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RoomId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for RoomId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// The broker-assigned identifier of one connected session.
///
/// Unique per connection; a reconnect yields a new one.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SocketId(pub String);

impl SocketId {
    /// Creates a socket id from anything string-like.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Returns the id as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SocketId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for SocketId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

// ---------------------------------------------------------------------------
// Participant
// ---------------------------------------------------------------------------

/// One connected user in a room, as carried in a JOINED roster.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Participant {
    #[serde(rename = "socketId")]
    pub socket_id: SocketId,
    pub username: String,
    #[serde(rename = "photoURL", default)]
    pub photo_url: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
}

// ---------------------------------------------------------------------------
// Payloads
// ---------------------------------------------------------------------------

/// Client → broker: announce presence in a room.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JoinPayload {
    #[serde(rename = "roomId")]
    pub room_id: RoomId,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(rename = "photoURL", default)]
    pub photo_url: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
}

/// Broker → clients: someone joined; carries the full roster.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JoinedPayload {
    pub clients: Vec<Participant>,
    /// Display name of the new joiner.
    pub username: String,
    /// Session id of the new joiner.
    #[serde(rename = "socketId")]
    pub socket_id: SocketId,
    #[serde(rename = "roomId", default)]
    pub room_id: Option<RoomId>,
}

/// Full-document replacement, in either direction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CodeChangePayload {
    #[serde(rename = "roomId")]
    pub room_id: RoomId,
    /// `None` when the sender had no document; receivers ignore it.
    #[serde(default)]
    pub code: Option<String>,
}

/// Client → client (relayed): hand the current document to one late joiner.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncCodePayload {
    pub code: String,
    /// The joiner this document is addressed to.
    #[serde(rename = "socketId")]
    pub socket_id: SocketId,
    #[serde(rename = "roomId")]
    pub room_id: RoomId,
}

/// Broker → clients: a peer left or lost its connection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DisconnectedPayload {
    #[serde(rename = "socketId")]
    pub socket_id: SocketId,
    pub username: String,
    #[serde(rename = "roomId", default)]
    pub room_id: Option<RoomId>,
}

/// Client → broker: leave a room explicitly.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LeavePayload {
    #[serde(rename = "socketId")]
    pub socket_id: SocketId,
    #[serde(rename = "roomId")]
    pub room_id: RoomId,
}

// ---------------------------------------------------------------------------
// RoomEvent / EventKind
// ---------------------------------------------------------------------------

/// Every event exchanged over a room, discriminated by its `type` field.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RoomEvent {
    Join(JoinPayload),
    Joined(JoinedPayload),
    CodeChange(CodeChangePayload),
    SyncCode(SyncCodePayload),
    Disconnected(DisconnectedPayload),
    Leave(LeavePayload),
}

impl RoomEvent {
    /// Returns the discriminator of this event.
    pub fn kind(&self) -> EventKind {
        match self {
            Self::Join(_) => EventKind::Join,
            Self::Joined(_) => EventKind::Joined,
            Self::CodeChange(_) => EventKind::CodeChange,
            Self::SyncCode(_) => EventKind::SyncCode,
            Self::Disconnected(_) => EventKind::Disconnected,
            Self::Leave(_) => EventKind::Leave,
        }
    }

    /// Returns the room this event names, if its payload carries one.
    pub fn room_id(&self) -> Option<&RoomId> {
        match self {
            Self::Join(p) => Some(&p.room_id),
            Self::Joined(p) => p.room_id.as_ref(),
            Self::CodeChange(p) => Some(&p.room_id),
            Self::SyncCode(p) => Some(&p.room_id),
            Self::Disconnected(p) => p.room_id.as_ref(),
            Self::Leave(p) => Some(&p.room_id),
        }
    }
}

/// The closed set of event types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    Join,
    Joined,
    CodeChange,
    SyncCode,
    Disconnected,
    Leave,
}

impl EventKind {
    /// All kinds, in protocol order.
    pub const ALL: [EventKind; 6] = [
        Self::Join,
        Self::Joined,
        Self::CodeChange,
        Self::SyncCode,
        Self::Disconnected,
        Self::Leave,
    ];

    /// The wire name, identical to the `type` discriminator.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Join => "JOIN",
            Self::Joined => "JOINED",
            Self::CodeChange => "CODE_CHANGE",
            Self::SyncCode => "SYNC_CODE",
            Self::Disconnected => "DISCONNECTED",
            Self::Leave => "LEAVE",
        }
    }

    /// Parses a wire name. Matching is exact.
    pub fn from_wire(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|k| k.as_str() == name)
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
