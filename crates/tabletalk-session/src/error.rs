//! Error types for the session layer.

use tabletalk_protocol::{GameId, Tag};

/// A structurally valid message that the current lifecycle state forbids.
///
/// These are never fatal: the state machine stays where it was and the
/// rejection is handed to the consumer to display or log.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum LifecycleError {
    /// A player acted without holding the turn.
    #[error(
        "{player} acted out of turn (turn holder: {})",
        .expected.as_deref().unwrap_or("nobody")
    )]
    OutOfTurn {
        player: String,
        expected: Option<String>,
    },

    /// The game is over (or everyone left); only disconnects are accepted
    /// after `game_ended`, nothing at all after the last disconnect.
    #[error("{variant} rejected: session terminated")]
    SessionTerminated { variant: Tag },

    /// The message is not valid in the current state.
    #[error("{variant} not allowed in state {state}")]
    InvalidTransition { variant: Tag, state: String },

    /// `game_started` with no players.
    #[error("game_started with an empty roster")]
    EmptyRoster,

    /// `game_started` naming the same player twice.
    #[error("player {0} appears more than once in the roster")]
    DuplicatePlayer(String),

    /// A turn was granted to someone outside the roster.
    #[error("player {0} is not in the roster")]
    NotInRoster(String),

    /// A disconnect for someone who never connected.
    #[error("participant {0} is not part of this session")]
    UnknownParticipant(String),

    /// A `game_connect` for a different game than this session's.
    #[error("game_connect for {got} on session {expected}")]
    GameMismatch { expected: GameId, got: GameId },

    /// A message arrived before any `game_connect` opened a session.
    #[error("{variant} received before any game_connect")]
    UnknownSession { variant: Tag },
}
