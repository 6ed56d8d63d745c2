//! Body codecs.
//!
//! STOMP frames carry opaque bodies; the [`Codec`] trait decides how a
//! [`RoomEvent`](crate::RoomEvent) (or any serde type) becomes those bytes.
//! The browser clients speak JSON, so [`JsonCodec`] is the default.

use serde::{de::DeserializeOwned, Serialize};

use crate::ProtocolError;

/// Encodes values to frame bodies and decodes them back.
///
/// `Send + Sync + 'static` because a codec lives inside long-running
/// connection tasks.
pub trait Codec: Send + Sync + 'static {
    /// Serializes a value into a body.
    ///
    /// # Errors
    /// Returns [`ProtocolError::Encode`] if serialization fails.
    fn encode<T: Serialize>(&self, value: &T) -> Result<Vec<u8>, ProtocolError>;

    /// Deserializes a body.
    ///
    /// # Errors
    /// Returns [`ProtocolError::Decode`] if the bytes are malformed or do
    /// not match `T`.
    fn decode<T: DeserializeOwned>(&self, data: &[u8]) -> Result<T, ProtocolError>;

    /// The `content-type` header value for bodies produced by this codec.
    fn content_type(&self) -> &'static str;
}

/// A [`Codec`] that uses JSON (via `serde_json`).
///
/// ```rust
/// use roomsync_protocol::{Codec, CodeChangePayload, JsonCodec, RoomEvent};
///
/// let codec = JsonCodec;
/// let event = RoomEvent::CodeChange(CodeChangePayload {
///     room_id: "abc".into(),
///     code: Some("x=1".into()),
/// });
///
/// let bytes = codec.encode(&event).unwrap();
/// let decoded: RoomEvent = codec.decode(&bytes).unwrap();
/// assert_eq!(event, decoded);
/// ```
#[cfg(feature = "json")]
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonCodec;

#[cfg(feature = "json")]
impl Codec for JsonCodec {
    fn encode<T: Serialize>(&self, value: &T) -> Result<Vec<u8>, ProtocolError> {
        serde_json::to_vec(value).map_err(ProtocolError::Encode)
    }

    fn decode<T: DeserializeOwned>(&self, data: &[u8]) -> Result<T, ProtocolError> {
        serde_json::from_slice(data).map_err(ProtocolError::Decode)
    }

    fn content_type(&self) -> &'static str {
        "application/json"
    }
}
