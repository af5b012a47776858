//! Event dispatch for tabletalk.
//!
//! A [`Dispatcher`] maps each message variant to an ordered list of
//! handlers. Accepted events go to the handlers for their variant;
//! malformed or refused payloads go to the rejection handlers as a
//! [`Rejection`].
//!
//! Handler failures are isolated: an `Err` return or a panic becomes a
//! [`HandlerError`] for the [`FaultSink`], and delivery continues.
//!
//! ```
//! use tabletalk_dispatch::Dispatcher;
//! use tabletalk_protocol::{Body, Event, Tag};
//!
//! let mut dispatcher = Dispatcher::new();
//! dispatcher.register(Tag::Phase, |event: &Event| {
//!     println!("{}", event.narration());
//!     Ok(())
//! });
//!
//! let report = dispatcher.dispatch(&Event::new(Body::Phase { phase: "night".into() }));
//! assert_eq!(report.delivered, 1);
//! ```

mod dispatcher;
mod error;
mod sink;

pub use dispatcher::{Dispatcher, Handler, Report};
pub use error::{BoxError, FaultCause, HandlerError, HandlerResult, Rejection, Route};
pub use sink::{FaultSink, TracingSink};
