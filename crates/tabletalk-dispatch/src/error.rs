//! Error types for the dispatch layer.

use std::fmt;

use tabletalk_protocol::{Event, ProtocolError, Tag};
use tabletalk_session::LifecycleError;

/// Boxed error a handler may return.
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// What a handler returns.
pub type HandlerResult = Result<(), BoxError>;

/// Which handler list a delivery went through.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Route {
    /// Handlers registered for one variant.
    Event(Tag),
    /// Handlers registered for rejections.
    Rejection,
}

impl Route {
    /// The variant, for event routes.
    pub fn variant(self) -> Option<Tag> {
        match self {
            Route::Event(tag) => Some(tag),
            Route::Rejection => None,
        }
    }
}

impl fmt::Display for Route {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Route::Event(tag) => write!(f, "{tag}"),
            Route::Rejection => write!(f, "rejection"),
        }
    }
}

/// How a handler failed.
#[derive(Debug, thiserror::Error)]
pub enum FaultCause {
    /// The handler returned an error.
    #[error("{0}")]
    Failed(BoxError),

    /// The handler panicked; carries the panic message when it had one.
    #[error("panicked: {0}")]
    Panicked(String),
}

/// A fault raised by one handler invocation.
///
/// Reported to the dispatcher's [`FaultSink`](crate::FaultSink); it
/// never stops delivery to the remaining handlers or the next event.
#[derive(Debug, thiserror::Error)]
#[error("handler #{handler} for {route} failed: {cause}")]
pub struct HandlerError {
    pub route: Route,
    /// Position of the handler in its route's registration order.
    pub handler: usize,
    #[source]
    pub cause: FaultCause,
}

/// A payload that did not become an accepted event.
#[derive(Debug)]
pub enum Rejection {
    /// The payload could not be parsed or decoded.
    Malformed(ProtocolError),
    /// The payload decoded, but the session lifecycle refused it.
    Refused { event: Event, error: LifecycleError },
}

impl fmt::Display for Rejection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Rejection::Malformed(error) => write!(f, "malformed payload: {error}"),
            Rejection::Refused { error, .. } => write!(f, "refused: {error}"),
        }
    }
}
