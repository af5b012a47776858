//! Schema registry: which fields each variant carries, per revision.
//!
//! The protocol's field sets changed four times. Rather than keeping four
//! type hierarchies, each revision registers a [`VariantSchema`] per
//! [`Tag`], and the registry derives a union schema that accepts payloads
//! from any of them.
//!
//! ```text
//! V1  message + username + timestamp on every message
//! V2  timestamp dropped
//! V3  username optional, message optional on lifecycle variants
//! V4  Speech.username required again
//! ```

use std::collections::{BTreeMap, HashMap};
use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::{SchemaError, Tag};

// ---------------------------------------------------------------------------
// Revision / Compat
// ---------------------------------------------------------------------------

/// One observed revision of the message field sets, oldest first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Revision {
    V1,
    V2,
    V3,
    V4,
}

impl Revision {
    /// All revisions, oldest first.
    pub const ALL: [Revision; 4] =
        [Revision::V1, Revision::V2, Revision::V3, Revision::V4];

    /// The newest revision.
    pub const LATEST: Revision = Revision::V4;
}

impl fmt::Display for Revision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Revision::V1 => f.write_str("v1"),
            Revision::V2 => f.write_str("v2"),
            Revision::V3 => f.write_str("v3"),
            Revision::V4 => f.write_str("v4"),
        }
    }
}

/// Which schema a decoder validates against.
///
/// In JSON config this is either `"union"` or `{"strict": "v2"}`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Compat {
    /// Exactly the field set of one revision.
    Strict(Revision),
    /// Accept payloads from any registered revision.
    #[default]
    Union,
}

impl fmt::Display for Compat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Compat::Strict(revision) => write!(f, "strict {revision}"),
            Compat::Union => f.write_str("union"),
        }
    }
}

// ---------------------------------------------------------------------------
// Field specs
// ---------------------------------------------------------------------------

/// The JSON shape a field must have.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FieldKind {
    String,
    /// A string or `null`.
    NullableString,
    StringList,
    Bool,
    /// A non-negative integer.
    Count,
    /// A non-negative integer or `null`.
    NullableCount,
    /// A list of `{"index": <count>, "name": <string>}` objects.
    ChoiceList,
}

impl FieldKind {
    /// Returns `true` if `null` is a valid value for this kind.
    pub fn is_nullable(self) -> bool {
        matches!(self, FieldKind::NullableString | FieldKind::NullableCount)
    }

    /// Returns `true` if `value` has this shape.
    pub fn matches(self, value: &Value) -> bool {
        match self {
            FieldKind::String => value.is_string(),
            FieldKind::NullableString => value.is_string() || value.is_null(),
            FieldKind::StringList => value
                .as_array()
                .is_some_and(|items| items.iter().all(Value::is_string)),
            FieldKind::Bool => value.is_boolean(),
            FieldKind::Count => value.is_u64(),
            FieldKind::NullableCount => value.is_u64() || value.is_null(),
            FieldKind::ChoiceList => value.as_array().is_some_and(|items| {
                items.iter().all(|item| {
                    item.get("index").is_some_and(Value::is_u64)
                        && item.get("name").is_some_and(Value::is_string)
                })
            }),
        }
    }
}

impl fmt::Display for FieldKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            FieldKind::String => "a string",
            FieldKind::NullableString => "a string or null",
            FieldKind::StringList => "a list of strings",
            FieldKind::Bool => "a boolean",
            FieldKind::Count => "a non-negative integer",
            FieldKind::NullableCount => "a non-negative integer or null",
            FieldKind::ChoiceList => "a list of {index, name} choices",
        };
        f.write_str(text)
    }
}

/// Whether a field must appear in the payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Presence {
    Required,
    Optional,
}

/// One field of a variant: wire name, shape, and presence.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FieldSpec {
    pub name: &'static str,
    pub kind: FieldKind,
    pub presence: Presence,
}

impl FieldSpec {
    pub const fn required(name: &'static str, kind: FieldKind) -> Self {
        Self { name, kind, presence: Presence::Required }
    }

    pub const fn optional(name: &'static str, kind: FieldKind) -> Self {
        Self { name, kind, presence: Presence::Optional }
    }

    pub fn is_required(&self) -> bool {
        self.presence == Presence::Required
    }
}

/// The field set of one variant. Field order is check order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VariantSchema {
    pub tag: Tag,
    pub fields: Vec<FieldSpec>,
}

impl VariantSchema {
    pub fn new(tag: Tag, fields: Vec<FieldSpec>) -> Self {
        Self { tag, fields }
    }

    /// Looks up a field by wire name.
    pub fn field(&self, name: &str) -> Option<&FieldSpec> {
        self.fields.iter().find(|spec| spec.name == name)
    }

    /// Names of the required fields, in check order.
    pub fn required_fields(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.fields
            .iter()
            .filter(|spec| spec.is_required())
            .map(|spec| spec.name)
    }
}

// ---------------------------------------------------------------------------
// SchemaRegistry
// ---------------------------------------------------------------------------

/// Catalog of variant schemas, registered per revision.
///
/// Lookups are pure; the only mutation is [`register`](Self::register),
/// which also refreshes the union schema of the affected variant.
#[derive(Debug, Clone, Default)]
pub struct SchemaRegistry {
    revisions: BTreeMap<Revision, HashMap<Tag, VariantSchema>>,
    union: HashMap<Tag, VariantSchema>,
}

impl SchemaRegistry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a registry holding all four observed revisions.
    pub fn builtin() -> Self {
        let mut registry = Self::new();
        for revision in Revision::ALL {
            for tag in Tag::ALL {
                registry.register(revision, builtin_schema(revision, tag));
            }
        }
        registry
    }

    /// Registers (or replaces) one variant's schema for one revision.
    pub fn register(&mut self, revision: Revision, schema: VariantSchema) {
        let tag = schema.tag;
        self.revisions
            .entry(revision)
            .or_default()
            .insert(tag, schema);
        self.rebuild_union(tag);
    }

    /// Finds the schema for `tag` under the given policy.
    pub fn lookup(
        &self,
        tag: Tag,
        compat: Compat,
    ) -> Result<&VariantSchema, SchemaError> {
        let found = match compat {
            Compat::Strict(revision) => self
                .revisions
                .get(&revision)
                .and_then(|schemas| schemas.get(&tag)),
            Compat::Union => self.union.get(&tag),
        };
        found.ok_or_else(|| SchemaError::NotFound {
            tag: tag.as_str().to_string(),
            compat,
        })
    }

    /// Like [`lookup`](Self::lookup), starting from a wire discriminant.
    pub fn lookup_wire(
        &self,
        tag: &str,
        compat: Compat,
    ) -> Result<&VariantSchema, SchemaError> {
        let parsed = Tag::from_wire(tag).ok_or_else(|| SchemaError::NotFound {
            tag: tag.to_string(),
            compat,
        })?;
        self.lookup(parsed, compat)
    }

    /// Revisions that have at least one variant registered.
    pub fn revisions(&self) -> impl Iterator<Item = Revision> + '_ {
        self.revisions.keys().copied()
    }

    /// Recomputes the union schema for one variant.
    ///
    /// Fields are ordered by first appearance, oldest revision first. A
    /// field is required only if every revision defining the variant
    /// requires it.
    fn rebuild_union(&mut self, tag: Tag) {
        let defining: Vec<&VariantSchema> = self
            .revisions
            .values()
            .filter_map(|schemas| schemas.get(&tag))
            .collect();

        let mut fields: Vec<FieldSpec> = Vec::new();
        for schema in &defining {
            for spec in &schema.fields {
                if fields.iter().any(|existing| existing.name == spec.name) {
                    continue;
                }
                let required_everywhere = defining.iter().all(|other| {
                    other.field(spec.name).is_some_and(FieldSpec::is_required)
                });
                fields.push(FieldSpec {
                    name: spec.name,
                    kind: spec.kind,
                    presence: if required_everywhere {
                        Presence::Required
                    } else {
                        Presence::Optional
                    },
                });
            }
        }

        self.union.insert(tag, VariantSchema::new(tag, fields));
    }
}

// ---------------------------------------------------------------------------
// Built-in revisions
// ---------------------------------------------------------------------------

fn presence(required: bool) -> Presence {
    if required {
        Presence::Required
    } else {
        Presence::Optional
    }
}

/// The field set of `tag` in `revision`: payload fields first, then the
/// base fields, then the optional prompt extras.
fn builtin_schema(revision: Revision, tag: Tag) -> VariantSchema {
    use FieldKind::*;

    let mut fields = Vec::new();

    match tag {
        Tag::GameConnect => fields.push(FieldSpec::required("gameId", String)),
        Tag::GameStarted => fields.push(FieldSpec::required("players", StringList)),
        Tag::NextSpeaker => fields.push(FieldSpec::required("player", String)),
        Tag::Phase => fields.push(FieldSpec::required("phase", String)),
        Tag::PlayerAction => {
            fields.push(FieldSpec::required("player", String));
            fields.push(FieldSpec::required("action", String));
            // Early revisions always sent the key, null or not.
            fields.push(FieldSpec {
                name: "message",
                kind: NullableString,
                presence: presence(revision <= Revision::V2),
            });
        }
        Tag::Prompt | Tag::Observation | Tag::Speech | Tag::RulesError => {
            fields.push(FieldSpec::required("message", String));
        }
        Tag::GameDisconnect | Tag::GameEnded => {}
    }

    if tag == Tag::Speech {
        fields.push(FieldSpec {
            name: "username",
            kind: String,
            presence: presence(revision != Revision::V3),
        });
    }

    // NextSpeaker never carried the base message fields.
    if tag != Tag::NextSpeaker {
        if !fields.iter().any(|spec| spec.name == "message") {
            fields.push(FieldSpec {
                name: "message",
                kind: String,
                presence: presence(revision <= Revision::V2),
            });
        }
        if !fields.iter().any(|spec| spec.name == "username") {
            fields.push(FieldSpec {
                name: "username",
                kind: String,
                presence: presence(revision <= Revision::V2),
            });
        }
        fields.push(FieldSpec {
            name: "timestamp",
            kind: String,
            presence: presence(revision == Revision::V1),
        });
    }

    if tag == Tag::Prompt {
        fields.push(FieldSpec::optional("choices", ChoiceList));
        fields.push(FieldSpec::optional("multiple", Bool));
        fields.push(FieldSpec::optional("min_choices", Count));
        fields.push(FieldSpec::optional("max_choices", NullableCount));
    }

    VariantSchema::new(tag, fields)
}

// =========================================================================
// Tests
// =========================================================================
