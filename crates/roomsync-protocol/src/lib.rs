//! Wire protocol for Roomsync.
//!
//! - **Types** ([`RoomEvent`], [`EventKind`], payloads, [`RoomId`],
//!   [`SocketId`]): the room events carried in message bodies.
//! - **Frames** ([`Frame`], [`decode_packets`]): STOMP 1.2 framing.
//! - **Heartbeats** ([`HeartBeat`]): `heart-beat` negotiation.
//! - **Destinations**: `/app/<event>` for publishes, `/topic/room/<id>`
//!   for subscriptions.
//! - **Codec** ([`Codec`], [`JsonCodec`]): body serialization.
//!
//! ```text
//! Transport (bytes) → Frame (STOMP) → Codec → RoomEvent → Session
//! ```

mod codec;
pub mod destination;
mod error;
mod frame;
mod heartbeat;
mod types;

pub use codec::Codec;
#[cfg(feature = "json")]
pub use codec::JsonCodec;
pub use error::ProtocolError;
pub use frame::{decode_packets, Command, Frame, Packet};
pub use heartbeat::{HeartBeat, Negotiated};
pub use types::{
    CodeChangePayload, DisconnectedPayload, EventKind, JoinPayload,
    JoinedPayload, LeavePayload, Participant, RoomEvent, RoomId, SocketId,
    SyncCodePayload,
};

/// The STOMP version negotiated by both ends.
pub const STOMP_VERSION: &str = "1.2";
