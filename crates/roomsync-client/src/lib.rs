//! # Roomsync
//!
//! Room-scoped synchronization for collaborative code editing.
//!
//! A client opens one [`Channel`] to a STOMP broker, joins a room, and from
//! then on every participant sees the same code document: each edit is
//! published as the full document, the last one to arrive wins, and a
//! late joiner is brought up to date by whoever already has content.
//!
//! The pieces, bottom-up:
//!
//! - [`Channel`]: connect with timeout, heartbeats, reconnect forever
//! - [`Publisher`] / [`SubscriptionHandle`]: the topic router
//! - [`SubscriptionRegistry`]: callbacks, torn down all at once
//! - [`RoomClient`]: the room session wired to a channel
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use roomsync_client::prelude::*;
//!
//! # async fn demo() -> Result<(), ClientError> {
//! let mut client = RoomClient::join(
//!     "ws://127.0.0.1:8080/ws",
//!     RoomId::new("abc"),
//!     UserProfile::new("Ada"),
//!     ClientConfig::default(),
//! )
//! .await?;
//! client.edit("print(1)");
//! client.leave().await;
//! # Ok(())
//! # }
//! ```

mod channel;
mod config;
mod error;
mod registry;
mod room;
mod router;

pub use channel::{Channel, ConnectionEvent, ConnectionState};
pub use config::{ClientConfig, HeartbeatConfig};
pub use error::ClientError;
pub use registry::{EventCallback, SubscriptionId, SubscriptionRegistry};
pub use room::RoomClient;
pub use router::{Publisher, SubscriptionHandle};

pub mod prelude {
    pub use crate::{
        Channel, ClientConfig, ClientError, ConnectionEvent, ConnectionState, RoomClient,
        SubscriptionHandle,
    };
    pub use roomsync_protocol::{EventKind, Participant, RoomEvent, RoomId, SocketId};
    pub use roomsync_session::{SessionNotice, SessionState, UserProfile};
}
