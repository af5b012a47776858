//! The lifecycle state machine a game's message stream must obey.
//!
//! ```text
//!            game_connect          game_connect (threshold)
//!   Idle ───────────────→ Connecting ───────────────→ Lobby
//!                              │                        │
//!                              └──── game_started ──────┤
//!                                                       ▼
//!                  phase / next_speaker / player_action
//!                     ┌──────────────┐
//!                     └─→ InProgress(phase) ── game_ended ──→ Ended
//!
//!   any non-Idle state ── last participant disconnects ──→ Disconnected
//! ```
//!
//! A disconnect that leaves `Lobby` below the threshold falls back to
//! `Connecting`.
//!
//! A rejected message never moves the machine: every check runs before
//! any field is touched.

use std::fmt;

use serde::{Deserialize, Serialize};
use tabletalk_protocol::{Body, Event, Tag};

use crate::{LifecycleConfig, LifecycleError};

/// The phase name a game starts in before the first `phase` message.
pub const INITIAL_PHASE: &str = "unset";

// ---------------------------------------------------------------------------
// LifecycleState
// ---------------------------------------------------------------------------

/// Where a session is in its life.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum LifecycleState {
    /// Nothing has connected yet.
    Idle,
    /// At least one participant connected, fewer than the lobby threshold.
    Connecting,
    /// Enough participants to start.
    Lobby,
    /// The game is running in `phase`.
    InProgress { phase: String },
    /// `game_ended` was received. Terminal.
    Ended,
    /// Every known participant disconnected. Terminal.
    Disconnected,
}

impl LifecycleState {
    /// Returns `true` once no further game messages can be accepted.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Ended | Self::Disconnected)
    }

    /// Returns `true` if prompts, observations, speech and rules errors
    /// are accepted in this state.
    pub fn accepts_informational(&self) -> bool {
        matches!(
            self,
            Self::Connecting | Self::Lobby | Self::InProgress { .. }
        )
    }

    /// The current phase, if the game is running.
    pub fn phase(&self) -> Option<&str> {
        match self {
            Self::InProgress { phase } => Some(phase),
            _ => None,
        }
    }
}

impl fmt::Display for LifecycleState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Idle => write!(f, "Idle"),
            Self::Connecting => write!(f, "Connecting"),
            Self::Lobby => write!(f, "Lobby"),
            Self::InProgress { phase } => write!(f, "InProgress({phase})"),
            Self::Ended => write!(f, "Ended"),
            Self::Disconnected => write!(f, "Disconnected"),
        }
    }
}

/// The before/after states of an accepted message. `from == to` when the
/// message was accepted without moving the machine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Transition {
    pub from: LifecycleState,
    pub to: LifecycleState,
}

impl Transition {
    /// Returns `true` if the state changed.
    pub fn is_change(&self) -> bool {
        self.from != self.to
    }
}

// ---------------------------------------------------------------------------
// Lifecycle
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq)]
struct Participant {
    name: String,
    connected: bool,
}

/// The state machine for one session.
///
/// Participants are identified by the `username` of their
/// `game_connect`, or [`DEFAULT_USERNAME`](tabletalk_protocol::DEFAULT_USERNAME)
/// when it is absent.
#[derive(Debug, Clone)]
pub struct Lifecycle {
    config: LifecycleConfig,
    state: LifecycleState,
    participants: Vec<Participant>,
    roster: Vec<String>,
    speaker: Option<String>,
}

impl Lifecycle {
    pub fn new(config: LifecycleConfig) -> Self {
        Self {
            config,
            state: LifecycleState::Idle,
            participants: Vec::new(),
            roster: Vec::new(),
            speaker: None,
        }
    }

    pub fn state(&self) -> &LifecycleState {
        &self.state
    }

    pub fn config(&self) -> &LifecycleConfig {
        &self.config
    }

    /// The roster fixed by `game_started` (empty before that).
    pub fn roster(&self) -> &[String] {
        &self.roster
    }

    /// The player last granted the turn by `next_speaker`.
    pub fn current_speaker(&self) -> Option<&str> {
        self.speaker.as_deref()
    }

    /// Names of participants that are currently connected, in join order.
    pub fn connected_participants(&self) -> Vec<String> {
        self.participants
            .iter()
            .filter(|p| p.connected)
            .map(|p| p.name.clone())
            .collect()
    }

    /// Validates `event` against the current state and applies it.
    ///
    /// # Errors
    /// Any [`LifecycleError`]; on error nothing changes.
    pub fn apply(&mut self, event: &Event) -> Result<Transition, LifecycleError> {
        let tag = event.tag();
        let from = self.state.clone();

        match self.state {
            LifecycleState::Disconnected => {
                return Err(LifecycleError::SessionTerminated { variant: tag });
            }
            LifecycleState::Ended if tag != Tag::GameDisconnect => {
                return Err(LifecycleError::SessionTerminated { variant: tag });
            }
            _ => {}
        }

        match &event.body {
            Body::GameConnect { .. } => self.connect(event.username_or_default(), tag)?,
            Body::GameDisconnect => self.disconnect(event.username_or_default(), tag)?,
            Body::GameStarted { players } => self.start(players, tag)?,
            Body::GameEnded => {
                self.require_in_progress(tag)?;
                self.state = LifecycleState::Ended;
            }
            Body::NextSpeaker { player } => {
                self.require_in_progress(tag)?;
                if !self.roster.contains(player) {
                    return Err(LifecycleError::NotInRoster(player.clone()));
                }
                self.speaker = Some(player.clone());
            }
            Body::Phase { phase } => {
                self.require_in_progress(tag)?;
                self.state = LifecycleState::InProgress { phase: phase.clone() };
            }
            Body::PlayerAction { player, .. } => {
                self.require_in_progress(tag)?;
                if self.config.enforce_turn_order
                    && self.speaker.as_deref() != Some(player.as_str())
                {
                    return Err(LifecycleError::OutOfTurn {
                        player: player.clone(),
                        expected: self.speaker.clone(),
                    });
                }
            }
            Body::Prompt { .. } | Body::Observation | Body::Speech | Body::RulesError => {
                if !self.state.accepts_informational() {
                    return Err(self.invalid(tag));
                }
            }
        }

        Ok(Transition {
            from,
            to: self.state.clone(),
        })
    }

    fn invalid(&self, variant: Tag) -> LifecycleError {
        LifecycleError::InvalidTransition {
            variant,
            state: self.state.to_string(),
        }
    }

    fn require_in_progress(&self, tag: Tag) -> Result<(), LifecycleError> {
        match self.state {
            LifecycleState::InProgress { .. } => Ok(()),
            _ => Err(self.invalid(tag)),
        }
    }

    fn connect(&mut self, name: &str, tag: Tag) -> Result<(), LifecycleError> {
        let known = self.participants.iter().position(|p| p.name == name);

        match (&self.state, known) {
            // Rejoining a running game: only someone already known.
            (LifecycleState::InProgress { .. }, Some(index)) => {
                self.participants[index].connected = true;
            }
            (LifecycleState::InProgress { .. }, None) => return Err(self.invalid(tag)),
            (_, Some(index)) => {
                self.participants[index].connected = true;
            }
            (_, None) => self.participants.push(Participant {
                name: name.to_string(),
                connected: true,
            }),
        }

        if self.state == LifecycleState::Idle {
            self.state = LifecycleState::Connecting;
        }
        if self.state == LifecycleState::Connecting
            && self.connected_count() >= self.config.lobby_threshold
        {
            self.state = LifecycleState::Lobby;
        }
        Ok(())
    }

    fn disconnect(&mut self, name: &str, tag: Tag) -> Result<(), LifecycleError> {
        if self.state == LifecycleState::Idle {
            return Err(self.invalid(tag));
        }
        let index = self
            .participants
            .iter()
            .position(|p| p.name == name)
            .ok_or_else(|| LifecycleError::UnknownParticipant(name.to_string()))?;

        self.participants[index].connected = false;
        let connected = self.connected_count();
        if connected == 0 {
            self.state = LifecycleState::Disconnected;
        } else if self.state == LifecycleState::Lobby && connected < self.config.lobby_threshold {
            self.state = LifecycleState::Connecting;
        }
        Ok(())
    }

    fn start(&mut self, players: &[String], tag: Tag) -> Result<(), LifecycleError> {
        if !matches!(self.state, LifecycleState::Connecting | LifecycleState::Lobby) {
            return Err(self.invalid(tag));
        }
        if players.is_empty() {
            return Err(LifecycleError::EmptyRoster);
        }
        for (i, player) in players.iter().enumerate() {
            if players[..i].contains(player) {
                return Err(LifecycleError::DuplicatePlayer(player.clone()));
            }
        }

        self.roster = players.to_vec();
        self.speaker = None;
        self.state = LifecycleState::InProgress {
            phase: INITIAL_PHASE.to_string(),
        };
        Ok(())
    }

    fn connected_count(&self) -> usize {
        self.participants.iter().filter(|p| p.connected).count()
    }
}

// =========================================================================
// Tests
// =========================================================================
