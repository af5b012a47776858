//! Per-variant handler registry and delivery.

use std::any::Any;
use std::collections::HashMap;
use std::fmt;
use std::panic::{self, AssertUnwindSafe};

use tabletalk_protocol::{Event, Tag};

use crate::{FaultCause, FaultSink, HandlerError, HandlerResult, Rejection, Route, TracingSink};

/// Something that consumes events of one variant.
///
/// Closures `FnMut(&Event) -> HandlerResult` are handlers; implement the
/// trait directly for handlers that carry more state than a closure
/// comfortably holds.
pub trait Handler: Send + 'static {
    fn handle(&mut self, event: &Event) -> HandlerResult;
}

impl<F> Handler for F
where
    F: FnMut(&Event) -> HandlerResult + Send + 'static,
{
    fn handle(&mut self, event: &Event) -> HandlerResult {
        self(event)
    }
}

type RejectionHandler = Box<dyn FnMut(&Rejection) -> HandlerResult + Send>;

/// Result of one delivery.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Report {
    /// Handlers that returned `Ok`.
    pub delivered: usize,
    /// Handlers that returned an error or panicked.
    pub faults: usize,
}

impl Report {
    pub fn is_clean(&self) -> bool {
        self.faults == 0
    }
}

/// Delivers events to the handlers registered for their variant.
///
/// Handlers run synchronously in registration order, one event at a time,
/// so every handler sees events in arrival order. A handler that fails,
/// by returning `Err` or by panicking, is reported to the [`FaultSink`]
/// and delivery carries on with the next handler.
pub struct Dispatcher {
    handlers: HashMap<Tag, Vec<Box<dyn Handler>>>,
    rejection_handlers: Vec<RejectionHandler>,
    sink: Box<dyn FaultSink>,
}

impl Dispatcher {
    /// Creates a dispatcher that logs faults through `tracing`.
    pub fn new() -> Self {
        Self::with_sink(TracingSink)
    }

    pub fn with_sink(sink: impl FaultSink) -> Self {
        Self {
            handlers: HashMap::new(),
            rejection_handlers: Vec::new(),
            sink: Box::new(sink),
        }
    }

    /// Replaces the fault sink.
    pub fn set_sink(&mut self, sink: impl FaultSink) {
        self.sink = Box::new(sink);
    }

    /// Registers a closure for one variant.
    pub fn register<F>(&mut self, tag: Tag, handler: F) -> &mut Self
    where
        F: FnMut(&Event) -> HandlerResult + Send + 'static,
    {
        self.register_handler(tag, handler)
    }

    /// Registers any [`Handler`] for one variant.
    pub fn register_handler(&mut self, tag: Tag, handler: impl Handler) -> &mut Self {
        self.handlers.entry(tag).or_default().push(Box::new(handler));
        self
    }

    /// Registers a handler for malformed or refused payloads.
    pub fn on_rejection<F>(&mut self, handler: F) -> &mut Self
    where
        F: FnMut(&Rejection) -> HandlerResult + Send + 'static,
    {
        self.rejection_handlers.push(Box::new(handler));
        self
    }

    pub fn handler_count(&self, tag: Tag) -> usize {
        self.handlers.get(&tag).map_or(0, Vec::len)
    }

    pub fn rejection_handler_count(&self) -> usize {
        self.rejection_handlers.len()
    }

    /// Delivers `event` to every handler registered for its variant.
    ///
    /// An event with no handlers is dropped silently.
    pub fn dispatch(&mut self, event: &Event) -> Report {
        let tag = event.tag();
        let mut report = Report::default();
        let Some(handlers) = self.handlers.get_mut(&tag) else {
            tracing::trace!(variant = %tag, "no handlers registered");
            return report;
        };

        for (index, handler) in handlers.iter_mut().enumerate() {
            let outcome = invoke(|| handler.handle(event));
            record(&mut report, &mut *self.sink, Route::Event(tag), index, outcome);
        }
        report
    }

    /// Delivers a rejection to every rejection handler.
    pub fn dispatch_rejection(&mut self, rejection: &Rejection) -> Report {
        let mut report = Report::default();
        for (index, handler) in self.rejection_handlers.iter_mut().enumerate() {
            let outcome = invoke(|| handler(rejection));
            record(&mut report, &mut *self.sink, Route::Rejection, index, outcome);
        }
        report
    }
}

impl Default for Dispatcher {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for Dispatcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut counts: Vec<(Tag, usize)> = self
            .handlers
            .iter()
            .map(|(tag, list)| (*tag, list.len()))
            .collect();
        counts.sort_by_key(|(tag, _)| tag.as_str());
        f.debug_struct("Dispatcher")
            .field("handlers", &counts)
            .field("rejection_handlers", &self.rejection_handlers.len())
            .finish_non_exhaustive()
    }
}

fn invoke(call: impl FnOnce() -> HandlerResult) -> Result<(), FaultCause> {
    match panic::catch_unwind(AssertUnwindSafe(call)) {
        Ok(Ok(())) => Ok(()),
        Ok(Err(error)) => Err(FaultCause::Failed(error)),
        Err(payload) => Err(FaultCause::Panicked(panic_message(payload.as_ref()))),
    }
}

fn record(
    report: &mut Report,
    sink: &mut dyn FaultSink,
    route: Route,
    handler: usize,
    outcome: Result<(), FaultCause>,
) {
    match outcome {
        Ok(()) => report.delivered += 1,
        Err(cause) => {
            report.faults += 1;
            let fault = HandlerError {
                route,
                handler,
                cause,
            };
            if let Err(payload) = panic::catch_unwind(AssertUnwindSafe(|| sink.report(fault))) {
                tracing::error!(
                    %route,
                    handler,
                    panic = %panic_message(payload.as_ref()),
                    "fault sink panicked"
                );
            }
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "non-string panic payload".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};
    use tabletalk_protocol::{Body, DecodeError, ProtocolError};
    use tabletalk_session::LifecycleError;

    fn phase(name: &str) -> Event {
        Event::new(Body::Phase {
            phase: name.to_string(),
        })
    }

    fn collecting_sink() -> (Arc<Mutex<Vec<HandlerError>>>, impl FaultSink) {
        let faults = Arc::new(Mutex::new(Vec::new()));
        let sink = {
            let faults = Arc::clone(&faults);
            move |fault: HandlerError| faults.lock().unwrap().push(fault)
        };
        (faults, sink)
    }

    #[test]
    fn test_handlers_run_in_registration_order() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let mut dispatcher = Dispatcher::new();
        for id in 0..3 {
            let seen = Arc::clone(&seen);
            dispatcher.register(Tag::Phase, move |_: &Event| {
                seen.lock().unwrap().push(id);
                Ok(())
            });
        }

        let report = dispatcher.dispatch(&phase("night"));

        assert_eq!(report, Report { delivered: 3, faults: 0 });
        assert_eq!(*seen.lock().unwrap(), vec![0, 1, 2]);
    }

    #[test]
    fn test_only_matching_variant_is_invoked() {
        let hits = Arc::new(Mutex::new(0));
        let mut dispatcher = Dispatcher::new();
        {
            let hits = Arc::clone(&hits);
            dispatcher.register(Tag::Speech, move |_: &Event| {
                *hits.lock().unwrap() += 1;
                Ok(())
            });
        }

        let report = dispatcher.dispatch(&phase("day"));

        assert_eq!(report, Report::default());
        assert_eq!(*hits.lock().unwrap(), 0);
        assert_eq!(dispatcher.handler_count(Tag::Speech), 1);
        assert_eq!(dispatcher.handler_count(Tag::Phase), 0);
    }

    #[test]
    fn test_error_is_reported_and_siblings_still_run() {
        let (faults, sink) = collecting_sink();
        let ran = Arc::new(Mutex::new(false));
        let mut dispatcher = Dispatcher::with_sink(sink);
        dispatcher.register(Tag::Phase, |_: &Event| Err("boom".into()));
        {
            let ran = Arc::clone(&ran);
            dispatcher.register(Tag::Phase, move |_: &Event| {
                *ran.lock().unwrap() = true;
                Ok(())
            });
        }

        let report = dispatcher.dispatch(&phase("night"));

        assert_eq!(report, Report { delivered: 1, faults: 1 });
        assert!(*ran.lock().unwrap());
        let faults = faults.lock().unwrap();
        assert_eq!(faults.len(), 1);
        assert_eq!(faults[0].route, Route::Event(Tag::Phase));
        assert_eq!(faults[0].handler, 0);
        assert!(matches!(faults[0].cause, FaultCause::Failed(_)));
        assert_eq!(faults[0].to_string(), "handler #0 for phase failed: boom");
    }

    #[test]
    fn test_panic_is_caught_and_reported() {
        let (faults, sink) = collecting_sink();
        let mut dispatcher = Dispatcher::with_sink(sink);
        dispatcher.register(Tag::Phase, |event: &Event| {
            panic!("cannot handle {}", event.tag());
        });

        let report = dispatcher.dispatch(&phase("night"));
        let again = dispatcher.dispatch(&phase("day"));

        assert_eq!(report.faults, 1);
        assert_eq!(again.faults, 1);
        let faults = faults.lock().unwrap();
        assert_eq!(faults.len(), 2);
        match &faults[0].cause {
            FaultCause::Panicked(message) => assert_eq!(message, "cannot handle phase"),
            other => panic!("expected panic cause, got {other:?}"),
        }
    }

    struct BrokenSink;

    impl FaultSink for BrokenSink {
        fn report(&mut self, _fault: HandlerError) {
            panic!("sink down");
        }
    }

    #[test]
    fn test_panicking_sink_does_not_stop_delivery() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let mut dispatcher = Dispatcher::with_sink(BrokenSink);
        dispatcher.register(Tag::Phase, |_: &Event| Err("boom".into()));
        {
            let seen = Arc::clone(&seen);
            dispatcher.register(Tag::Phase, move |event: &Event| {
                seen.lock().unwrap().push(event.tag());
                Ok(())
            });
        }
        dispatcher.on_rejection(|_: &Rejection| Err("also broken".into()));

        let first = dispatcher.dispatch(&phase("night"));
        let second = dispatcher.dispatch(&phase("day"));
        let rejected = dispatcher.dispatch_rejection(&Rejection::Malformed(
            ProtocolError::Envelope(DecodeError::NotAnObject),
        ));

        assert_eq!(first, Report { delivered: 1, faults: 1 });
        assert_eq!(second, Report { delivered: 1, faults: 1 });
        assert_eq!(rejected, Report { delivered: 0, faults: 1 });
        assert_eq!(*seen.lock().unwrap(), vec![Tag::Phase, Tag::Phase]);
    }

    struct Counter {
        seen: Arc<Mutex<Vec<String>>>,
    }

    impl Handler for Counter {
        fn handle(&mut self, event: &Event) -> HandlerResult {
            let Body::Phase { phase } = &event.body else {
                return Err("not a phase".into());
            };
            self.seen.lock().unwrap().push(phase.clone());
            Ok(())
        }
    }

    #[test]
    fn test_struct_handlers_keep_state() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let mut dispatcher = Dispatcher::new();
        dispatcher.register_handler(
            Tag::Phase,
            Counter {
                seen: Arc::clone(&seen),
            },
        );

        dispatcher.dispatch(&phase("night"));
        dispatcher.dispatch(&phase("day"));

        assert_eq!(*seen.lock().unwrap(), vec!["night", "day"]);
    }

    #[test]
    fn test_rejections_reach_rejection_handlers() {
        let (faults, sink) = collecting_sink();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let mut dispatcher = Dispatcher::with_sink(sink);
        {
            let seen = Arc::clone(&seen);
            dispatcher.on_rejection(move |rejection: &Rejection| {
                seen.lock().unwrap().push(rejection.to_string());
                Ok(())
            });
        }
        dispatcher.on_rejection(|_: &Rejection| Err("log full".into()));

        let malformed = Rejection::Malformed(ProtocolError::Envelope(DecodeError::NotAnObject));
        let refused = Rejection::Refused {
            event: phase("night"),
            error: LifecycleError::EmptyRoster,
        };
        let first = dispatcher.dispatch_rejection(&malformed);
        dispatcher.dispatch_rejection(&refused);

        assert_eq!(first, Report { delivered: 1, faults: 1 });
        assert_eq!(dispatcher.rejection_handler_count(), 2);
        let seen = seen.lock().unwrap();
        assert_eq!(seen.len(), 2);
        assert!(seen[0].starts_with("malformed payload"));
        assert!(seen[1].starts_with("refused"));
        let faults = faults.lock().unwrap();
        assert_eq!(faults.len(), 2);
        assert!(faults.iter().all(|f| f.route == Route::Rejection));
        assert_eq!(faults[0].route.variant(), None);
    }
}
