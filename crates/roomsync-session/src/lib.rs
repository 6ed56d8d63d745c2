//! Room session management for Roomsync.
//!
//! This crate holds everything a client knows about the room it is in,
//! without doing any I/O:
//!
//! 1. **Lifecycle** ([`SessionState`]): Disconnected → Connecting →
//!    Joining → Active → Leaving → Disconnected
//! 2. **Roster** ([`Roster`]): who else is here, keyed by session id
//! 3. **Document** ([`CodeDocument`]): the shared code, last writer wins
//! 4. **Identity** ([`IdentityProvider`]): who is joining
//!
//! [`RoomSession`] ties them together and turns inbound events and local
//! edits into [`SessionAction`]s.
//!
//! # How it fits in the stack
//!
//! ```text
//! Client Layer (above)   ← drives the session, publishes its actions
//!     ↕
//! Session Layer (this crate)  ← room state machine
//!     ↕
//! Protocol Layer (below) ← RoomEvent, RoomId, SocketId
//! ```

#![allow(async_fn_in_trait)]

mod document;
mod error;
mod identity;
mod roster;
mod session;
mod state;

pub use document::CodeDocument;
pub use error::SessionError;
pub use identity::{IdentityProvider, StaticIdentity, UserProfile, ANONYMOUS};
pub use roster::Roster;
pub use session::{RoomSession, SessionAction, SessionNotice};
pub use state::SessionState;
