//! One message stream, end to end.
//!
//! ```text
//! frame / value ──► Decoder ──► Session (lifecycle) ──► Dispatcher
//!                      │               │
//!                      └─ Malformed    └─ Refused      ──► rejection handlers
//! ```
//!
//! A [`Pipeline`] owns at most one [`Session`]. It opens the session on
//! the first accepted `game_connect` and destroys it once every
//! participant has disconnected; from then on every input is
//! [`Outcome::Discarded`] without being decoded or applied.

use std::sync::Arc;

use serde_json::Value;
use tabletalk_dispatch::{Dispatcher, Rejection, Report};
use tabletalk_protocol::{
    Body, Decoder, Event, GameId, JsonCodec, ProtocolError, SchemaRegistry, Tag,
};
use tabletalk_session::{LifecycleConfig, LifecycleError, Session, SessionInfo, Transition};

use crate::PipelineConfig;

/// What happened to one input.
#[derive(Debug)]
pub enum Outcome {
    /// Decoded, accepted by the lifecycle, logged and dispatched.
    Accepted {
        tag: Tag,
        transition: Transition,
        report: Report,
    },
    /// Decoded, but the lifecycle refused it. State is unchanged.
    Refused(LifecycleError),
    /// Not a valid message.
    Malformed(ProtocolError),
    /// The session was already destroyed; the input was dropped unread.
    Discarded,
}

impl Outcome {
    pub fn is_accepted(&self) -> bool {
        matches!(self, Outcome::Accepted { .. })
    }
}

enum Stage {
    /// Waiting for the `game_connect` that opens the session.
    Waiting,
    Open(Session),
    /// Torn down; keeps the final snapshot for inspection.
    Closed(SessionInfo),
}

/// Decoder, session and dispatcher for one game's stream.
///
/// Inputs are processed strictly one at a time, in the order they are
/// passed in.
pub struct Pipeline {
    decoder: Decoder,
    codec: JsonCodec,
    lifecycle: LifecycleConfig,
    dispatcher: Dispatcher,
    expected: Option<GameId>,
    stage: Stage,
}

impl Pipeline {
    pub fn new(decoder: Decoder, lifecycle: LifecycleConfig, dispatcher: Dispatcher) -> Self {
        Self {
            decoder,
            codec: JsonCodec,
            lifecycle,
            dispatcher,
            expected: None,
            stage: Stage::Waiting,
        }
    }

    /// Only opens a session for `game_id`; a `game_connect` naming any
    /// other game is refused with [`LifecycleError::GameMismatch`].
    pub fn bind(mut self, game_id: GameId) -> Self {
        self.expected = Some(game_id);
        self
    }

    /// Builds a pipeline over the built-in schema registry.
    pub fn from_config(config: &PipelineConfig, dispatcher: Dispatcher) -> Self {
        let registry = Arc::new(SchemaRegistry::builtin());
        Self::new(
            Decoder::new(registry, config.compat),
            config.lifecycle.clone(),
            dispatcher,
        )
    }

    /// Processes one parsed payload.
    pub fn ingest(&mut self, raw: &Value) -> Outcome {
        if self.is_closed() {
            return self.discard();
        }
        match self.decoder.decode_value(raw) {
            Ok(event) => self.apply(event),
            Err(error) => self.reject(Rejection::Malformed(error.into())),
        }
    }

    /// Parses and processes one JSON frame.
    pub fn ingest_frame(&mut self, frame: &[u8]) -> Outcome {
        if self.is_closed() {
            return self.discard();
        }
        match self.decoder.decode_frame(&self.codec, frame) {
            Ok(event) => self.apply(event),
            Err(error) => self.reject(Rejection::Malformed(error)),
        }
    }

    /// Tears the session down. Later inputs are discarded. Returns the
    /// final snapshot, if a session had been opened.
    pub fn close(&mut self) -> Option<SessionInfo> {
        let info = match std::mem::replace(&mut self.stage, Stage::Waiting) {
            Stage::Waiting => None,
            Stage::Open(session) => Some(session.info()),
            Stage::Closed(info) => Some(info),
        };
        if let Some(info) = &info {
            tracing::info!(game_id = %info.game_id, state = %info.state, "session closed");
            self.stage = Stage::Closed(info.clone());
        }
        info
    }

    /// The live session, if one is open.
    pub fn session(&self) -> Option<&Session> {
        match &self.stage {
            Stage::Open(session) => Some(session),
            _ => None,
        }
    }

    /// Snapshot of the live session, or the final one after teardown.
    pub fn info(&self) -> Option<SessionInfo> {
        match &self.stage {
            Stage::Waiting => None,
            Stage::Open(session) => Some(session.info()),
            Stage::Closed(info) => Some(info.clone()),
        }
    }

    pub fn game_id(&self) -> Option<&GameId> {
        match &self.stage {
            Stage::Waiting => None,
            Stage::Open(session) => Some(session.game_id()),
            Stage::Closed(info) => Some(&info.game_id),
        }
    }

    /// Returns `true` until a `game_connect` has opened the session.
    pub fn is_waiting(&self) -> bool {
        matches!(self.stage, Stage::Waiting)
    }

    /// Returns `true` once the session has been destroyed.
    pub fn is_closed(&self) -> bool {
        matches!(self.stage, Stage::Closed(_))
    }

    pub fn dispatcher(&self) -> &Dispatcher {
        &self.dispatcher
    }

    pub fn dispatcher_mut(&mut self) -> &mut Dispatcher {
        &mut self.dispatcher
    }

    fn apply(&mut self, event: Event) -> Outcome {
        let result = if let Stage::Open(session) = &mut self.stage {
            session.apply(&event)
        } else if matches!(self.stage, Stage::Waiting) {
            self.open(&event)
        } else {
            return self.discard();
        };

        let transition = match result {
            Ok(transition) => transition,
            Err(error) => return self.reject(Rejection::Refused { event, error }),
        };

        let tag = event.tag();
        let report = self.dispatcher.dispatch(&event);

        if let Stage::Open(session) = &self.stage {
            if session.is_closed() {
                let info = session.info();
                tracing::info!(
                    game_id = %info.game_id,
                    accepted = info.accepted,
                    "session destroyed"
                );
                self.stage = Stage::Closed(info);
            }
        }

        Outcome::Accepted {
            tag,
            transition,
            report,
        }
    }

    fn open(&mut self, event: &Event) -> Result<Transition, LifecycleError> {
        if let (Some(expected), Body::GameConnect { game_id }) = (&self.expected, &event.body) {
            if game_id != expected {
                return Err(LifecycleError::GameMismatch {
                    expected: expected.clone(),
                    got: game_id.clone(),
                });
            }
        }
        let (session, transition) = Session::open(event, self.lifecycle.clone())?;
        self.stage = Stage::Open(session);
        Ok(transition)
    }

    fn reject(&mut self, rejection: Rejection) -> Outcome {
        self.dispatcher.dispatch_rejection(&rejection);
        match rejection {
            Rejection::Malformed(error) => Outcome::Malformed(error),
            Rejection::Refused { error, .. } => Outcome::Refused(error),
        }
    }

    fn discard(&self) -> Outcome {
        tracing::trace!(game_id = ?self.game_id(), "input after teardown discarded");
        Outcome::Discarded
    }
}

impl std::fmt::Debug for Pipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Pipeline")
            .field("compat", &self.decoder.compat())
            .field("game_id", &self.game_id())
            .field("closed", &self.is_closed())
            .finish_non_exhaustive()
    }
}
