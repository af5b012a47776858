//! Error types for the protocol layer.
//!
//! Malformed input is an expected, everyday case here, so nothing in this
//! crate panics on bad payloads: every failure is one of these values.

use crate::schema::{Compat, FieldKind};
use crate::Tag;

/// Why a payload could not be turned into an [`Event`](crate::Event).
///
/// Checks run in schema field order and the first violation wins, so two
/// decoders given the same malformed payload report the same error.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DecodeError {
    /// The payload is not a JSON object.
    #[error("payload is not an object")]
    NotAnObject,

    /// `type` is absent (`None`), not a string, or not in the catalog.
    /// Carries the offending discriminant as text when there was one.
    #[error("unknown variant: {}", .0.as_deref().unwrap_or("<missing type>"))]
    UnknownVariant(Option<String>),

    /// A required field is missing.
    #[error("{variant}: missing required field `{field}`")]
    MissingField { variant: Tag, field: &'static str },

    /// A field is present but has the wrong shape.
    #[error("{variant}: field `{field}` must be {expected}")]
    WrongType {
        variant: Tag,
        field: &'static str,
        expected: FieldKind,
    },
}

/// Schema registry lookup failures.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SchemaError {
    /// Nothing is registered for this discriminant under this policy.
    #[error("no schema for `{tag}` under {compat}")]
    NotFound { tag: String, compat: Compat },
}

/// Errors from turning bytes into events and back.
#[derive(Debug, thiserror::Error)]
pub enum ProtocolError {
    /// Serialization failed.
    #[error("encode failed: {0}")]
    Encode(serde_json::Error),

    /// The bytes are not valid JSON.
    #[error("decode failed: {0}")]
    Decode(serde_json::Error),

    /// The JSON parsed but is not a valid message.
    #[error(transparent)]
    Envelope(#[from] DecodeError),
}
