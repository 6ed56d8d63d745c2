//! STOMP relay broker for Roomsync rooms.
//!
//! Clients connect over WebSocket, subscribe to `/topic/room/<id>` and
//! publish room events to `/app/<event>`. The broker keeps who is in which
//! room and fans every event out to the room topic.
//!
//! # Key types
//!
//! - [`Broker`] / [`BrokerBuilder`]: bind and run the accept loop
//! - [`BrokerHandle`]: stop a running broker, inspect its rooms
//! - [`BrokerConfig`]: bind address, heartbeats, handshake timeout
//! - [`RoomRegistry`]: per-room participant lists

mod config;
mod error;
mod handler;
mod hub;
mod rooms;
mod server;
mod topics;

pub use config::BrokerConfig;
pub use error::BrokerError;
pub use hub::ANONYMOUS;
pub use rooms::{Departure, RoomRegistry};
pub use server::{Broker, BrokerBuilder, BrokerHandle};
