//! Wire protocol for tabletalk.
//!
//! This crate defines the messages a turn-based game server exchanges
//! with its players and spectators, and how to validate them:
//!
//! - **Types** ([`Event`], [`Body`], [`Tag`], [`Nullable`]): the typed
//!   form of every message variant.
//! - **Schema** ([`SchemaRegistry`], [`Revision`], [`Compat`]): which
//!   fields each variant carries in each of the four schema revisions.
//! - **Decoder** ([`Decoder`]): untyped payload → typed event, or a
//!   [`DecodeError`] naming the first problem.
//! - **Codec** ([`Codec`], [`JsonCodec`]): frames ↔ JSON values.
//!
//! # Architecture
//!
//! The protocol layer sits between the transport (raw frames) and the
//! session lifecycle. It doesn't know about games or turns; it only
//! knows whether a payload is a well-formed message.
//!
//! ```text
//! Transport (bytes) → Protocol (Event) → Session (lifecycle) → Dispatch
//! ```

mod codec;
mod decode;
mod error;
mod schema;
mod types;

pub use codec::{Codec, JsonCodec};
pub use decode::Decoder;
pub use error::{DecodeError, ProtocolError, SchemaError};
pub use schema::{
    Compat, FieldKind, FieldSpec, Presence, Revision, SchemaRegistry,
    VariantSchema,
};
pub use types::{
    Body, Event, GameId, Nullable, PromptChoice, RawPayload, Tag,
    DEFAULT_USERNAME,
};
