//! Typed message catalog for the game protocol.
//!
//! Every payload that survives decoding becomes an [`Event`]: the fields
//! every message may carry (`message`, `username`, `timestamp`) plus a
//! [`Body`] holding the variant-specific payload. The closed set of
//! variants is named by [`Tag`], the value of the wire `type` field.

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Username the server stamps on messages it originates itself.
///
/// Older peers always serialised this default, newer ones omit the field.
pub const DEFAULT_USERNAME: &str = "System";

/// An untyped payload as it arrives from the transport, before decoding.
pub type RawPayload = Map<String, Value>;

// ---------------------------------------------------------------------------
// Identity types
// ---------------------------------------------------------------------------

/// Identifies one game session on the server.
///
/// Newtype over the server-issued string so it can't be confused with a
/// player name. `#[serde(transparent)]` keeps it a plain JSON string.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct GameId(pub String);

impl GameId {
    /// Returns the id as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for GameId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for GameId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl From<String> for GameId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

// ---------------------------------------------------------------------------
// Tag: the discriminant
// ---------------------------------------------------------------------------

/// The discriminant of a message: which variant a payload represents.
///
/// On the wire this is the `type` field, written in snake_case
/// (`"game_connect"`, `"next_speaker"`, ...).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Tag {
    GameConnect,
    GameDisconnect,
    GameStarted,
    GameEnded,
    NextSpeaker,
    Phase,
    PlayerAction,
    Prompt,
    Observation,
    Speech,
    RulesError,
}

impl Tag {
    /// Every variant, in catalog order.
    pub const ALL: [Tag; 11] = [
        Tag::GameConnect,
        Tag::GameDisconnect,
        Tag::GameStarted,
        Tag::GameEnded,
        Tag::NextSpeaker,
        Tag::Phase,
        Tag::PlayerAction,
        Tag::Prompt,
        Tag::Observation,
        Tag::Speech,
        Tag::RulesError,
    ];

    /// The wire name of this variant.
    pub fn as_str(self) -> &'static str {
        match self {
            Tag::GameConnect => "game_connect",
            Tag::GameDisconnect => "game_disconnect",
            Tag::GameStarted => "game_started",
            Tag::GameEnded => "game_ended",
            Tag::NextSpeaker => "next_speaker",
            Tag::Phase => "phase",
            Tag::PlayerAction => "player_action",
            Tag::Prompt => "prompt",
            Tag::Observation => "observation",
            Tag::Speech => "speech",
            Tag::RulesError => "rules_error",
        }
    }

    /// Parses a wire discriminant. Returns `None` for anything outside
    /// the catalog, including different casing.
    pub fn from_wire(value: &str) -> Option<Tag> {
        Tag::ALL.into_iter().find(|tag| tag.as_str() == value)
    }

    /// Returns `true` for the narration variants that never move the
    /// lifecycle: prompts, observations, speech and rules errors.
    pub fn is_informational(self) -> bool {
        matches!(
            self,
            Tag::Prompt | Tag::Observation | Tag::Speech | Tag::RulesError
        )
    }
}

impl fmt::Display for Tag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// Nullable: absent vs null vs set
// ---------------------------------------------------------------------------

/// A field that may be missing, explicitly `null`, or set.
///
/// Consumers usually only care whether there is a value ([`value`]), but
/// keeping `Absent` and `Null` apart lets diagnostics say which one the
/// server actually sent.
///
/// [`value`]: Nullable::value
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum Nullable<T> {
    /// The key was not in the payload.
    #[default]
    Absent,
    /// The key was present with a JSON `null`.
    Null,
    /// The key carried a value.
    Set(T),
}

impl<T> Nullable<T> {
    /// Returns the value, treating `Absent` and `Null` alike.
    pub fn value(&self) -> Option<&T> {
        match self {
            Nullable::Set(value) => Some(value),
            Nullable::Absent | Nullable::Null => None,
        }
    }

    /// Returns `true` if a value is present.
    pub fn is_set(&self) -> bool {
        matches!(self, Nullable::Set(_))
    }

    /// Short label for logging: `"absent"`, `"null"` or `"set"`.
    pub fn state(&self) -> &'static str {
        match self {
            Nullable::Absent => "absent",
            Nullable::Null => "null",
            Nullable::Set(_) => "set",
        }
    }
}

impl<T> From<Option<T>> for Nullable<T> {
    fn from(value: Option<T>) -> Self {
        match value {
            Some(value) => Nullable::Set(value),
            None => Nullable::Absent,
        }
    }
}

// ---------------------------------------------------------------------------
// Event payloads
// ---------------------------------------------------------------------------

/// One selectable option attached to a [`Body::Prompt`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PromptChoice {
    pub index: u64,
    pub name: String,
}

/// Variant-specific payload of an [`Event`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Body {
    /// A client joined the game session `game_id`.
    GameConnect { game_id: GameId },
    /// A client left.
    GameDisconnect,
    /// The roster is fixed and play begins.
    GameStarted { players: Vec<String> },
    /// Terminal.
    GameEnded,
    /// `player` now holds the turn.
    NextSpeaker { player: String },
    /// The game moved to a new stage (`"night"`, `"day"`, `"voting"`...).
    Phase { phase: String },
    /// A player did something. The human-readable text lives in
    /// [`Event::message`], which is nullable for this variant.
    PlayerAction { player: String, action: String },
    /// The server asks for input, optionally from a fixed set of choices.
    Prompt {
        choices: Option<Vec<PromptChoice>>,
        multiple: Option<bool>,
        min_choices: Option<u64>,
        max_choices: Nullable<u64>,
    },
    Observation,
    Speech,
    RulesError,
}

impl Body {
    /// The discriminant of this payload.
    pub fn tag(&self) -> Tag {
        match self {
            Body::GameConnect { .. } => Tag::GameConnect,
            Body::GameDisconnect => Tag::GameDisconnect,
            Body::GameStarted { .. } => Tag::GameStarted,
            Body::GameEnded => Tag::GameEnded,
            Body::NextSpeaker { .. } => Tag::NextSpeaker,
            Body::Phase { .. } => Tag::Phase,
            Body::PlayerAction { .. } => Tag::PlayerAction,
            Body::Prompt { .. } => Tag::Prompt,
            Body::Observation => Tag::Observation,
            Body::Speech => Tag::Speech,
            Body::RulesError => Tag::RulesError,
        }
    }
}

// ---------------------------------------------------------------------------
// Event
// ---------------------------------------------------------------------------

/// A decoded, structurally valid message.
///
/// Optional fields the server omitted stay `None`/`Absent`; they are
/// never filled with empty strings, so "not sent" and "sent empty" remain
/// distinguishable.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Event {
    /// Human-readable text. Nullable only for `PlayerAction`; for other
    /// variants a `null` is folded into `Absent` by the decoder.
    pub message: Nullable<String>,
    /// Originating player or narrator.
    pub username: Option<String>,
    /// ISO-8601 send time; only the earliest schema revision sends it.
    pub timestamp: Option<String>,
    pub body: Body,
}

impl Event {
    /// Creates an event with no base fields set.
    pub fn new(body: Body) -> Self {
        Self {
            message: Nullable::Absent,
            username: None,
            timestamp: None,
            body,
        }
    }

    /// Sets the `message` field.
    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = Nullable::Set(message.into());
        self
    }

    /// Sets the `username` field.
    pub fn with_username(mut self, username: impl Into<String>) -> Self {
        self.username = Some(username.into());
        self
    }

    /// Sets the `timestamp` field.
    pub fn with_timestamp(mut self, timestamp: impl Into<String>) -> Self {
        self.timestamp = Some(timestamp.into());
        self
    }

    /// The discriminant of this event.
    pub fn tag(&self) -> Tag {
        self.body.tag()
    }

    /// The message text, if any.
    pub fn message(&self) -> Option<&str> {
        self.message.value().map(String::as_str)
    }

    /// The username, falling back to [`DEFAULT_USERNAME`].
    pub fn username_or_default(&self) -> &str {
        self.username.as_deref().unwrap_or(DEFAULT_USERNAME)
    }

    /// Text suitable for a transcript or for feeding to a non-visual
    /// player. Speech is attributed to its speaker; prompts list their
    /// choices and selection limits.
    pub fn narration(&self) -> String {
        let message = self.message().unwrap_or_default();
        match &self.body {
            Body::Speech => format!("{}: {message}", self.username_or_default()),
            Body::Prompt {
                choices,
                multiple,
                min_choices,
                max_choices,
            } => {
                let mut text = message.to_string();
                if let Some(choices) = choices.as_ref().filter(|c| !c.is_empty()) {
                    text.push_str("\nChoices:\n");
                    let lines: Vec<String> = choices
                        .iter()
                        .map(|choice| format!("{}: {}", choice.index, choice.name))
                        .collect();
                    text.push_str(&lines.join("\n"));
                }
                if multiple.unwrap_or(false) {
                    // A zero maximum means no limit.
                    let max = match max_choices.value() {
                        Some(max) if *max > 0 => max.to_string(),
                        _ => "unlimited".to_string(),
                    };
                    text.push_str(&format!(
                        "\nYou can select multiple choices (min: {}, max: {max}).",
                        min_choices.unwrap_or(1)
                    ));
                }
                text
            }
            _ => message.to_string(),
        }
    }

    /// Re-encodes the event as its wire object.
    ///
    /// `Absent` fields are omitted and `Null` fields are written as
    /// `null`, so decoding the result yields an equal event.
    pub fn to_wire(&self) -> Value {
        let mut map = Map::new();
        map.insert("type".into(), Value::from(self.tag().as_str()));

        match &self.body {
            Body::GameConnect { game_id } => {
                map.insert("gameId".into(), Value::from(game_id.as_str()));
            }
            Body::GameStarted { players } => {
                map.insert("players".into(), Value::from(players.clone()));
            }
            Body::NextSpeaker { player } => {
                map.insert("player".into(), Value::from(player.as_str()));
            }
            Body::Phase { phase } => {
                map.insert("phase".into(), Value::from(phase.as_str()));
            }
            Body::PlayerAction { player, action } => {
                map.insert("player".into(), Value::from(player.as_str()));
                map.insert("action".into(), Value::from(action.as_str()));
            }
            Body::Prompt {
                choices,
                multiple,
                min_choices,
                max_choices,
            } => {
                if let Some(choices) = choices {
                    let list = choices
                        .iter()
                        .map(|choice| {
                            serde_json::json!({
                                "index": choice.index,
                                "name": choice.name,
                            })
                        })
                        .collect();
                    map.insert("choices".into(), Value::Array(list));
                }
                if let Some(multiple) = multiple {
                    map.insert("multiple".into(), Value::from(*multiple));
                }
                if let Some(min) = min_choices {
                    map.insert("min_choices".into(), Value::from(*min));
                }
                insert_nullable(&mut map, "max_choices", max_choices, |max| {
                    Value::from(*max)
                });
            }
            Body::GameDisconnect
            | Body::GameEnded
            | Body::Observation
            | Body::Speech
            | Body::RulesError => {}
        }

        insert_nullable(&mut map, "message", &self.message, |message| {
            Value::from(message.as_str())
        });
        if let Some(username) = &self.username {
            map.insert("username".into(), Value::from(username.as_str()));
        }
        if let Some(timestamp) = &self.timestamp {
            map.insert("timestamp".into(), Value::from(timestamp.as_str()));
        }

        Value::Object(map)
    }
}

fn insert_nullable<T>(
    map: &mut Map<String, Value>,
    key: &str,
    field: &Nullable<T>,
    to_value: impl FnOnce(&T) -> Value,
) {
    match field {
        Nullable::Absent => {}
        Nullable::Null => {
            map.insert(key.into(), Value::Null);
        }
        Nullable::Set(value) => {
            map.insert(key.into(), to_value(value));
        }
    }
}

// =========================================================================
// Tests
// =========================================================================
