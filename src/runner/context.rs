//! Per-run execution context.

use std::sync::Arc;

use crate::bus::{BusError, DiagnosticSink, MessageBus, RunnerMessage};
use crate::cancellation::CancellationTokenSource;

/// Immutable context shared by every runner level: the run's bus and its
/// cancellation source. Levels never mutate it; results travel back up as
/// return values.
#[derive(Clone)]
pub(crate) struct RunContext {
    bus: Arc<dyn MessageBus>,
    cancellation: CancellationTokenSource,
}

impl RunContext {
    pub fn new(bus: Arc<dyn MessageBus>, cancellation: CancellationTokenSource) -> Self {
        Self { bus, cancellation }
    }

    pub fn cancellation(&self) -> &CancellationTokenSource {
        &self.cancellation
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancellation.is_cancellation_requested()
    }

    /// Queue one message. A sink "stop" reply is converted into cancellation
    /// and surfaced as `Ok(false)`; sink rejections propagate.
    pub fn queue(&self, message: RunnerMessage) -> Result<bool, BusError> {
        match self.bus.queue_message(message) {
            Ok(true) => Ok(true),
            Ok(false) => {
                self.cancellation.cancel();
                Ok(false)
            }
            Err(error) => Err(error),
        }
    }

    /// Queue an out-of-band diagnostic
    pub fn diagnostic(&self, message: impl Into<String>) -> Result<bool, BusError> {
        self.queue(RunnerMessage::Diagnostic {
            message: message.into(),
        })
    }

    /// Handle given to test classes that ask for the diagnostic sink
    pub fn diagnostic_sink(&self) -> DiagnosticSink {
        DiagnosticSink::new(self.bus.clone())
    }
}
