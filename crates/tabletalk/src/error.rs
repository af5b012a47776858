//! Unified error type for tabletalk.

use tabletalk_protocol::{GameId, ProtocolError};
use tabletalk_session::LifecycleError;

/// Errors from talking to a [`Hub`](crate::Hub) session actor.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum HubError {
    /// The session's actor has stopped: the session was destroyed or
    /// closed. Its handle is dropped from the hub.
    #[error("session for game {0} is closed")]
    Closed(GameId),

    /// No session is running for this game.
    #[error("no session for game {0}")]
    NotFound(GameId),
}

/// Top-level error that wraps all crate-specific errors.
///
/// The `#[from]` attribute on each variant lets `?` convert layer errors
/// automatically.
#[derive(Debug, thiserror::Error)]
pub enum TabletalkError {
    /// A frame or payload could not be parsed or decoded.
    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    /// A well-formed message was refused by the session lifecycle.
    #[error(transparent)]
    Lifecycle(#[from] LifecycleError),

    /// A session actor could not be reached.
    #[error(transparent)]
    Hub(#[from] HubError),

    /// A configuration document did not parse.
    #[error("invalid configuration: {0}")]
    Config(#[source] serde_json::Error),

    /// A global tracing subscriber was already installed.
    #[error("logging already initialized: {0}")]
    Logging(#[from] tracing_subscriber::util::TryInitError),
}
