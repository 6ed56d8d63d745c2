//! Unified error type for the Roomsync client.

use std::time::Duration;

use roomsync_protocol::ProtocolError;
use roomsync_session::SessionError;
use roomsync_transport::TransportError;

/// Top-level error that wraps all crate-specific errors.
///
/// The `#[from]` variants let `?` convert lower-layer errors. The named
/// variants are the failures a caller of [`Channel::open`](crate::Channel::open)
/// or [`RoomClient::join`](crate::RoomClient::join) is expected to handle.
#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    /// No `CONNECTED` arrived within the connect timeout.
    #[error("connection timed out after {0:?}")]
    ConnectionTimeout(Duration),

    /// The broker refused the connection or the socket could not be opened.
    #[error("connection failed: {0}")]
    ConnectionFailed(String),

    /// The room never acknowledged our JOIN.
    #[error("no JOINED received within {0:?}")]
    JoinTimeout(Duration),

    /// The channel was torn down.
    #[error("channel closed")]
    Closed,

    /// A transport-level error (connect, send, recv).
    #[error(transparent)]
    Transport(#[from] TransportError),

    /// A protocol-level error (frame, encode, decode).
    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    /// A session-level error (invalid transition, identity).
    #[error(transparent)]
    Session(#[from] SessionError),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_transport_error() {
        let err = TransportError::ConnectionClosed("gone".into());
        let client_err: ClientError = err.into();
        assert!(matches!(client_err, ClientError::Transport(_)));
        assert!(client_err.to_string().contains("gone"));
    }

    #[test]
    fn test_from_protocol_error() {
        let err = ProtocolError::InvalidMessage("bad".into());
        let client_err: ClientError = err.into();
        assert!(matches!(client_err, ClientError::Protocol(_)));
    }

    #[test]
    fn test_from_session_error() {
        let err = SessionError::IdentityUnavailable("nobody".into());
        let client_err: ClientError = err.into();
        assert!(matches!(client_err, ClientError::Session(_)));
    }

    #[test]
    fn test_connection_timeout_display() {
        let err = ClientError::ConnectionTimeout(Duration::from_secs(10));
        assert_eq!(err.to_string(), "connection timed out after 10s");
    }
}
