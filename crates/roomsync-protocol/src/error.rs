//! Error types for the protocol layer.

/// Errors raised while framing, encoding or decoding messages.
///
/// None of these are fatal to a connection: a peer that receives an
/// undecodable message logs it and drops that message.
#[derive(Debug, thiserror::Error)]
pub enum ProtocolError {
    /// Serializing a body failed.
    #[cfg(feature = "json")]
    #[error("encode failed: {0}")]
    Encode(serde_json::Error),

    /// A body could not be parsed into the expected type.
    #[cfg(feature = "json")]
    #[error("decode failed: {0}")]
    Decode(serde_json::Error),

    /// The bytes are not a well-formed STOMP frame.
    #[error("malformed frame: {0}")]
    MalformedFrame(String),

    /// The frame parsed but breaks protocol rules (missing required
    /// header, bad heart-beat value, unexpected command).
    #[error("invalid message: {0}")]
    InvalidMessage(String),
}
