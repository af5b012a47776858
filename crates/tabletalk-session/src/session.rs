//! A session: one game's lifecycle plus the ordered log of what it accepted.
//!
//! A session is opened by the first accepted `game_connect` for a game id
//! and is exclusively owned by whoever processes that game's stream, so
//! nothing here needs locking.

use serde::Serialize;
use tabletalk_protocol::{Body, Event, GameId};

use crate::{Lifecycle, LifecycleConfig, LifecycleError, LifecycleState, Transition};

/// An accepted event and its position in the session log (from 1).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoggedEvent {
    pub seq: u64,
    pub event: Event,
}

/// A snapshot of session metadata (not the event log itself).
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SessionInfo {
    pub game_id: GameId,
    pub state: LifecycleState,
    /// Participants currently connected, in join order.
    pub participants: Vec<String>,
    pub roster: Vec<String>,
    pub current_speaker: Option<String>,
    /// Number of events in the log.
    pub accepted: usize,
    /// Number of events the lifecycle refused.
    pub refused: u64,
}

/// The per-game lifecycle and event log.
#[derive(Debug, Clone)]
pub struct Session {
    game_id: GameId,
    lifecycle: Lifecycle,
    log: Vec<LoggedEvent>,
    refused: u64,
}

impl Session {
    /// Opens a session from its first event.
    ///
    /// # Errors
    /// [`LifecycleError::UnknownSession`] unless `event` is a
    /// `game_connect`; the connect itself is always accepted from `Idle`.
    pub fn open(
        event: &Event,
        config: LifecycleConfig,
    ) -> Result<(Session, Transition), LifecycleError> {
        let Body::GameConnect { game_id } = &event.body else {
            return Err(LifecycleError::UnknownSession { variant: event.tag() });
        };

        let mut session = Session {
            game_id: game_id.clone(),
            lifecycle: Lifecycle::new(config),
            log: Vec::new(),
            refused: 0,
        };
        tracing::info!(game_id = %session.game_id, "session opened");

        let transition = session.apply(event)?;
        Ok((session, transition))
    }

    /// Validates `event` against the lifecycle and, if accepted, appends
    /// it to the log.
    ///
    /// # Errors
    /// [`LifecycleError::GameMismatch`] for a `game_connect` naming another
    /// game, or whatever the lifecycle refused. The session is unchanged
    /// apart from its refusal count.
    pub fn apply(&mut self, event: &Event) -> Result<Transition, LifecycleError> {
        let result = self.check_game(event).and_then(|()| self.lifecycle.apply(event));

        match result {
            Ok(transition) => {
                let seq = self.log.len() as u64 + 1;
                self.log.push(LoggedEvent { seq, event: event.clone() });
                if transition.is_change() {
                    tracing::info!(
                        game_id = %self.game_id,
                        seq,
                        variant = %event.tag(),
                        from = %transition.from,
                        to = %transition.to,
                        "lifecycle transition"
                    );
                }
                Ok(transition)
            }
            Err(error) => {
                self.refused += 1;
                tracing::debug!(
                    game_id = %self.game_id,
                    variant = %event.tag(),
                    state = %self.lifecycle.state(),
                    %error,
                    "event refused"
                );
                Err(error)
            }
        }
    }

    fn check_game(&self, event: &Event) -> Result<(), LifecycleError> {
        match &event.body {
            Body::GameConnect { game_id } if *game_id != self.game_id => {
                Err(LifecycleError::GameMismatch {
                    expected: self.game_id.clone(),
                    got: game_id.clone(),
                })
            }
            _ => Ok(()),
        }
    }

    pub fn game_id(&self) -> &GameId {
        &self.game_id
    }

    pub fn state(&self) -> &LifecycleState {
        self.lifecycle.state()
    }

    pub fn lifecycle(&self) -> &Lifecycle {
        &self.lifecycle
    }

    /// Accepted events, in arrival order.
    pub fn log(&self) -> &[LoggedEvent] {
        &self.log
    }

    pub fn refused(&self) -> u64 {
        self.refused
    }

    /// Returns `true` once every participant has disconnected. A closed
    /// session must be dropped; it accepts nothing further.
    pub fn is_closed(&self) -> bool {
        *self.lifecycle.state() == LifecycleState::Disconnected
    }

    pub fn info(&self) -> SessionInfo {
        SessionInfo {
            game_id: self.game_id.clone(),
            state: self.lifecycle.state().clone(),
            participants: self.lifecycle.connected_participants(),
            roster: self.lifecycle.roster().to_vec(),
            current_speaker: self.lifecycle.current_speaker().map(str::to_string),
            accepted: self.log.len(),
            refused: self.refused,
        }
    }
}
