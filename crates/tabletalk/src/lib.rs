//! # Tabletalk
//!
//! Decode, validate and dispatch the message stream of a turn-based
//! multiplayer game.
//!
//! A game server talks to its players in discrete JSON messages
//! (`game_connect`, `next_speaker`, `player_action`, ...). Tabletalk turns
//! that loosely typed stream into typed events, checks each one against
//! what the game's lifecycle allows, and hands the survivors to your
//! handlers in arrival order:
//!
//! ```text
//! raw payload → Decoder → Session (lifecycle) → Dispatcher → handlers
//! ```
//!
//! - [`Pipeline`] does this for one stream, synchronously.
//! - [`Hub`] runs one pipeline per game in its own Tokio task.
//!
//! ## Quick Start
//!
//! ```rust
//! use tabletalk::prelude::*;
//! use serde_json::json;
//!
//! let mut dispatcher = Dispatcher::new();
//! dispatcher.register(Tag::PlayerAction, |event: &Event| {
//!     println!("{}", event.narration());
//!     Ok(())
//! });
//!
//! let mut pipeline = Pipeline::from_config(&PipelineConfig::default(), dispatcher);
//! pipeline.ingest(&json!({"type": "game_connect", "gameId": "g1"}));
//! pipeline.ingest(&json!({"type": "game_started", "players": ["alice", "bob"]}));
//! pipeline.ingest(&json!({"type": "next_speaker", "player": "bob"}));
//!
//! let outcome =
//!     pipeline.ingest(&json!({"type": "player_action", "player": "alice", "action": "fold"}));
//! assert!(matches!(outcome, Outcome::Refused(LifecycleError::OutOfTurn { .. })));
//! ```

mod config;
mod error;
mod hub;
pub mod logging;
mod pipeline;

pub use config::{PipelineConfig, DEFAULT_CHANNEL_SIZE};
pub use error::{HubError, TabletalkError};
pub use hub::{DispatcherFactory, Hub, SessionHandle};
pub use pipeline::{Outcome, Pipeline};

pub use tabletalk_dispatch as dispatch;
pub use tabletalk_protocol as protocol;
pub use tabletalk_session as session;

/// The types most programs need.
pub mod prelude {
    pub use crate::{Hub, HubError, Outcome, Pipeline, PipelineConfig, TabletalkError};
    pub use tabletalk_dispatch::{
        Dispatcher, FaultCause, FaultSink, Handler, HandlerError, HandlerResult, Rejection,
        Report, TracingSink,
    };
    pub use tabletalk_protocol::{
        Body, Compat, DecodeError, Event, GameId, Nullable, ProtocolError, Revision, Tag,
    };
    pub use tabletalk_session::{LifecycleConfig, LifecycleError, LifecycleState, SessionInfo};
}
