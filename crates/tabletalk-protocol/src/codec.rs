//! Codec trait and implementations for turning frames into values.
//!
//! A "codec" (coder/decoder) converts between Rust types and raw bytes.
//! The transport hands us opaque frames; the codec parses them into the
//! untyped JSON value that the [`Decoder`](crate::Decoder) validates, and
//! serializes outgoing [`Event`]s back into frames.
//!
//! Only [`JsonCodec`] exists today, since every peer of this protocol
//! speaks JSON.

use serde::{de::DeserializeOwned, Serialize};

use crate::{Event, ProtocolError};

/// A codec that can encode Rust types to bytes and decode bytes back.
///
/// ## Trait bounds
///
/// - `Send + Sync` → one codec can be shared by every session task.
/// - `'static` → it owns everything it needs, so it can live inside a
///   long-running actor.
pub trait Codec: Send + Sync + 'static {
    /// Serializes a value into bytes.
    ///
    /// # Errors
    /// Returns `ProtocolError::Encode` if serialization fails.
    fn encode<T: Serialize>(&self, value: &T) -> Result<Vec<u8>, ProtocolError>;

    /// Deserializes bytes back into a value.
    ///
    /// # Errors
    /// Returns `ProtocolError::Decode` if the bytes are malformed,
    /// incomplete, or don't match the expected type.
    fn decode<T: DeserializeOwned>(&self, data: &[u8]) -> Result<T, ProtocolError>;

    /// Serializes an event in its wire form (see [`Event::to_wire`]).
    fn encode_event(&self, event: &Event) -> Result<Vec<u8>, ProtocolError> {
        self.encode(&event.to_wire())
    }
}

// ---------------------------------------------------------------------------
// JsonCodec
// ---------------------------------------------------------------------------

/// A [`Codec`] that uses JSON (via `serde_json`).
///
/// ## Example
///
/// ```rust
/// use tabletalk_protocol::{Body, Codec, Decoder, Event, JsonCodec};
///
/// let codec = JsonCodec;
/// let event = Event::new(Body::Phase { phase: "night".into() })
///     .with_message("Night phase begins.");
///
/// let bytes = codec.encode_event(&event).unwrap();
/// let decoded = Decoder::default().decode_frame(&codec, &bytes).unwrap();
/// assert_eq!(event, decoded);
/// ```
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonCodec;

impl Codec for JsonCodec {
    fn encode<T: Serialize>(&self, value: &T) -> Result<Vec<u8>, ProtocolError> {
        serde_json::to_vec(value).map_err(ProtocolError::Encode)
    }

    fn decode<T: DeserializeOwned>(&self, data: &[u8]) -> Result<T, ProtocolError> {
        serde_json::from_slice(data).map_err(ProtocolError::Decode)
    }
}
