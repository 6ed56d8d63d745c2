//! Error types for the broker.

use roomsync_protocol::ProtocolError;
use roomsync_transport::TransportError;

/// Errors that end a broker connection or stop the broker.
///
/// Problems with a single frame (unknown destination, undecodable body)
/// are not errors at this level: the client gets a STOMP `ERROR` frame
/// and the connection stays up.
#[derive(Debug, thiserror::Error)]
pub enum BrokerError {
    #[error(transparent)]
    Transport(#[from] TransportError),

    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    /// The client did not send `CONNECT` in time, or sent something else.
    #[error("handshake failed: {0}")]
    Handshake(String),

    /// The client stopped sending anything, heartbeats included.
    #[error("client silent for {0:?}")]
    Silent(std::time::Duration),
}
