//! Transport abstraction layer for Roomsync.
//!
//! Provides the [`Connection`] trait for a duplex text/byte connection, the
//! [`Connector`] trait that dials out to a broker (client side), and the
//! [`Transport`] trait that accepts incoming connections (broker side).
//!
//! Accepting is split in two: [`Transport::accept`] returns as soon as a
//! socket is accepted, and [`Handshake::complete`] runs the upgrade. A peer
//! that never finishes its upgrade then only holds up its own task.
//!
//! # Feature Flags
//!
//! - `websocket` (default): WebSocket transport via `tokio-tungstenite`

use std::fmt;
use std::future::Future;

mod error;
#[cfg(feature = "websocket")]
mod websocket;

pub use error::TransportError;
#[cfg(feature = "websocket")]
pub use websocket::{
    ClientStream, PendingWebSocket, WebSocketConnection, WebSocketConnector,
    WebSocketTransport,
};

/// Opaque identifier for a connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ConnectionId(u64);

impl ConnectionId {
    /// Creates a new `ConnectionId` from a raw `u64`.
    pub fn new(id: u64) -> Self {
        Self(id)
    }

    /// Returns the underlying `u64` value.
    pub fn into_inner(self) -> u64 {
        self.0
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "conn-{}", self.0)
    }
}

/// Accepts new incoming connections.
pub trait Transport: Send + Sync + 'static {
    /// The connection type produced by this transport.
    type Connection: Connection;
    /// An accepted socket whose upgrade has not run yet.
    type Handshake: Handshake<Connection = Self::Connection, Error = Self::Error>;
    /// The error type for transport operations.
    type Error: std::error::Error + Send + Sync + 'static;

    /// Waits for the next incoming socket.
    ///
    /// Does not wait for the peer's upgrade request; call
    /// [`Handshake::complete`] on the result, usually in a per-connection task.
    fn accept(
        &mut self,
    ) -> impl Future<Output = Result<Self::Handshake, Self::Error>> + Send;

    /// Gracefully shuts down the transport, stopping new connections.
    fn shutdown(&self) -> impl Future<Output = Result<(), Self::Error>> + Send;
}

/// The server half of an upgrade handshake.
pub trait Handshake: Send + 'static {
    /// The connection produced once the upgrade succeeds.
    type Connection: Connection;
    /// The error type for a failed upgrade.
    type Error: std::error::Error + Send + Sync + 'static;

    /// Reads the peer's upgrade request and answers it. Not time-bounded;
    /// callers wrap it in a timeout.
    fn complete(
        self,
    ) -> impl Future<Output = Result<Self::Connection, Self::Error>> + Send;
}

/// Dials a remote endpoint and produces a connection.
///
/// The connector is kept by the caller for the lifetime of a client so it
/// can be reused for every reconnect attempt.
pub trait Connector: Send + Sync + 'static {
    /// The connection type produced by this connector.
    type Connection: Connection;
    /// The error type for connect attempts.
    type Error: std::error::Error + Send + Sync + 'static;

    /// Opens a connection to `endpoint`, performing any upgrade handshake.
    fn connect(
        &self,
        endpoint: &str,
    ) -> impl Future<Output = Result<Self::Connection, Self::Error>> + Send;
}

/// A single connection that can send and receive messages.
pub trait Connection: Send + Sync + 'static {
    /// The error type for connection operations.
    type Error: std::error::Error + Send + Sync + 'static;

    /// Sends one message to the remote peer.
    fn send(
        &self,
        data: &[u8],
    ) -> impl Future<Output = Result<(), Self::Error>> + Send;

    /// Receives the next message from the remote peer.
    ///
    /// Returns `Ok(None)` when the connection is cleanly closed. Sending
    /// and receiving may run concurrently.
    fn recv(
        &self,
    ) -> impl Future<Output = Result<Option<Vec<u8>>, Self::Error>> + Send;

    /// Closes the connection.
    fn close(&self) -> impl Future<Output = Result<(), Self::Error>> + Send;

    /// Returns the unique identifier for this connection.
    fn id(&self) -> ConnectionId;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_connection_id_new_and_into_inner() {
        let id = ConnectionId::new(42);
        assert_eq!(id.into_inner(), 42);
    }

    #[test]
    fn test_connection_id_display() {
        let id = ConnectionId::new(7);
        assert_eq!(id.to_string(), "conn-7");
    }

    #[test]
    fn test_connection_id_hash_works_as_map_key() {
        use std::collections::HashMap;
        let mut map = HashMap::new();
        map.insert(ConnectionId::new(1), "editor-a");
        map.insert(ConnectionId::new(2), "editor-b");
        assert_eq!(map[&ConnectionId::new(1)], "editor-a");
    }
}
