//! Where handler faults go.

use crate::HandlerError;

/// Receives every [`HandlerError`] the dispatcher catches.
///
/// Any `FnMut(HandlerError)` closure is a sink, which is the easy way to
/// forward faults into a channel or collect them in tests.
pub trait FaultSink: Send + 'static {
    fn report(&mut self, fault: HandlerError);
}

impl<F> FaultSink for F
where
    F: FnMut(HandlerError) + Send + 'static,
{
    fn report(&mut self, fault: HandlerError) {
        self(fault)
    }
}

/// The default sink: logs each fault at `warn`.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingSink;

impl FaultSink for TracingSink {
    fn report(&mut self, fault: HandlerError) {
        tracing::warn!(
            route = %fault.route,
            handler = fault.handler,
            cause = %fault.cause,
            "handler failed"
        );
    }
}
