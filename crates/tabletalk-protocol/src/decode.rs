//! Envelope decoder: untyped payload in, typed [`Event`] out.
//!
//! The decoder is a pure function of its input. It holds a shared,
//! read-only [`SchemaRegistry`] and the [`Compat`] policy in effect, so
//! one instance can be cloned freely and used from many tasks at once.
//!
//! ```text
//! {"type": "next_speaker", "player": "alice"}
//!     → look up `type` in the registry
//!     → check each field in schema order (first failure wins)
//!     → Event { body: NextSpeaker { player: "alice" }, .. }
//! ```

use std::sync::Arc;

use serde_json::Value;

use crate::{
    Body, Codec, Compat, DecodeError, Event, FieldSpec, GameId, Nullable,
    PromptChoice, ProtocolError, RawPayload, SchemaRegistry, Tag,
    VariantSchema,
};

/// Converts raw payloads into typed events.
#[derive(Debug, Clone)]
pub struct Decoder {
    registry: Arc<SchemaRegistry>,
    compat: Compat,
}

impl Default for Decoder {
    /// The built-in registry with union-tolerant decoding.
    fn default() -> Self {
        Self::new(Arc::new(SchemaRegistry::builtin()), Compat::Union)
    }
}

impl Decoder {
    pub fn new(registry: Arc<SchemaRegistry>, compat: Compat) -> Self {
        Self { registry, compat }
    }

    /// The schema policy this decoder validates against.
    pub fn compat(&self) -> Compat {
        self.compat
    }

    pub fn registry(&self) -> &SchemaRegistry {
        &self.registry
    }

    /// Decodes one payload.
    ///
    /// # Errors
    /// - [`DecodeError::UnknownVariant`] if `type` is missing, not a
    ///   string, or not registered under this decoder's policy.
    /// - [`DecodeError::MissingField`] / [`DecodeError::WrongType`] for
    ///   the first field (in schema order) that fails its check.
    pub fn decode(&self, raw: &RawPayload) -> Result<Event, DecodeError> {
        let tag = match raw.get("type") {
            Some(Value::String(tag)) => tag.as_str(),
            Some(other) => {
                return Err(DecodeError::UnknownVariant(Some(other.to_string())));
            }
            None => return Err(DecodeError::UnknownVariant(None)),
        };

        let schema = self
            .registry
            .lookup_wire(tag, self.compat)
            .map_err(|_| DecodeError::UnknownVariant(Some(tag.to_string())))?;

        check_fields(raw, schema)?;
        let event = build_event(raw, schema.tag)?;

        if let Body::PlayerAction { player, action } = &event.body {
            tracing::debug!(
                %player,
                %action,
                message = event.message.state(),
                "decoded player action"
            );
        } else {
            tracing::trace!(variant = %schema.tag, "decoded event");
        }

        Ok(event)
    }

    /// Decodes a JSON value, rejecting anything that isn't an object.
    pub fn decode_value(&self, raw: &Value) -> Result<Event, DecodeError> {
        match raw {
            Value::Object(map) => self.decode(map),
            _ => Err(DecodeError::NotAnObject),
        }
    }

    /// Parses a frame with `codec` and decodes the result.
    ///
    /// # Errors
    /// [`ProtocolError::Decode`] if the bytes don't parse,
    /// [`ProtocolError::Envelope`] if the parsed value is not a valid
    /// message.
    pub fn decode_frame<C: Codec>(
        &self,
        codec: &C,
        data: &[u8],
    ) -> Result<Event, ProtocolError> {
        let value: Value = codec.decode(data)?;
        Ok(self.decode_value(&value)?)
    }
}

// ---------------------------------------------------------------------------
// Validation
// ---------------------------------------------------------------------------

fn check_fields(raw: &RawPayload, schema: &VariantSchema) -> Result<(), DecodeError> {
    for spec in &schema.fields {
        check_field(raw, schema.tag, spec)?;
    }
    Ok(())
}

fn check_field(raw: &RawPayload, tag: Tag, spec: &FieldSpec) -> Result<(), DecodeError> {
    match raw.get(spec.name) {
        None if spec.is_required() => Err(DecodeError::MissingField {
            variant: tag,
            field: spec.name,
        }),
        None => Ok(()),
        // A stray null on an optional non-nullable field reads as absent.
        Some(Value::Null) if !spec.kind.is_nullable() && !spec.is_required() => Ok(()),
        Some(value) if spec.kind.matches(value) => Ok(()),
        Some(_) => Err(DecodeError::WrongType {
            variant: tag,
            field: spec.name,
            expected: spec.kind,
        }),
    }
}

// ---------------------------------------------------------------------------
// Construction
// ---------------------------------------------------------------------------

fn build_event(raw: &RawPayload, tag: Tag) -> Result<Event, DecodeError> {
    let body = match tag {
        Tag::GameConnect => Body::GameConnect {
            game_id: GameId(required_string(raw, tag, "gameId")?),
        },
        Tag::GameDisconnect => Body::GameDisconnect,
        Tag::GameStarted => Body::GameStarted {
            players: required_list(raw, tag, "players")?,
        },
        Tag::GameEnded => Body::GameEnded,
        Tag::NextSpeaker => Body::NextSpeaker {
            player: required_string(raw, tag, "player")?,
        },
        Tag::Phase => Body::Phase {
            phase: required_string(raw, tag, "phase")?,
        },
        Tag::PlayerAction => Body::PlayerAction {
            player: required_string(raw, tag, "player")?,
            action: required_string(raw, tag, "action")?,
        },
        Tag::Prompt => Body::Prompt {
            choices: optional_choices(raw),
            multiple: raw.get("multiple").and_then(Value::as_bool),
            min_choices: raw.get("min_choices").and_then(Value::as_u64),
            max_choices: nullable(raw, "max_choices", Value::as_u64),
        },
        Tag::Observation => Body::Observation,
        Tag::Speech => Body::Speech,
        Tag::RulesError => Body::RulesError,
    };

    let mut message = nullable(raw, "message", |v| v.as_str().map(str::to_string));
    if tag != Tag::PlayerAction && message == Nullable::Null {
        message = Nullable::Absent;
    }

    Ok(Event {
        message,
        username: optional_string(raw, "username"),
        timestamp: optional_string(raw, "timestamp"),
        body,
    })
}

fn optional_string(raw: &RawPayload, name: &str) -> Option<String> {
    raw.get(name).and_then(Value::as_str).map(str::to_string)
}

fn required_string(
    raw: &RawPayload,
    tag: Tag,
    name: &'static str,
) -> Result<String, DecodeError> {
    match raw.get(name) {
        Some(Value::String(value)) => Ok(value.clone()),
        Some(_) => Err(DecodeError::WrongType {
            variant: tag,
            field: name,
            expected: crate::FieldKind::String,
        }),
        None => Err(DecodeError::MissingField { variant: tag, field: name }),
    }
}

fn required_list(
    raw: &RawPayload,
    tag: Tag,
    name: &'static str,
) -> Result<Vec<String>, DecodeError> {
    let wrong_type = || DecodeError::WrongType {
        variant: tag,
        field: name,
        expected: crate::FieldKind::StringList,
    };
    let items = match raw.get(name) {
        Some(Value::Array(items)) => items,
        Some(_) => return Err(wrong_type()),
        None => return Err(DecodeError::MissingField { variant: tag, field: name }),
    };
    items
        .iter()
        .map(|item| item.as_str().map(str::to_string).ok_or_else(wrong_type))
        .collect()
}

fn nullable<T>(
    raw: &RawPayload,
    name: &str,
    extract: impl FnOnce(&Value) -> Option<T>,
) -> Nullable<T> {
    match raw.get(name) {
        None => Nullable::Absent,
        Some(Value::Null) => Nullable::Null,
        Some(value) => extract(value).into(),
    }
}

fn optional_choices(raw: &RawPayload) -> Option<Vec<PromptChoice>> {
    let items = raw.get("choices")?.as_array()?;
    items
        .iter()
        .map(|item| {
            Some(PromptChoice {
                index: item.get("index")?.as_u64()?,
                name: item.get("name")?.as_str()?.to_string(),
            })
        })
        .collect()
}

// =========================================================================
// Tests
// =========================================================================
