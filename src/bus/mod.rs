//! Ordered, thread-safe reporting of lifecycle messages.
//!
//! The bus owns the only path between the runner hierarchy and the consumer's
//! [`MessageSink`]. Enqueue failures are not recoverable inside the pipeline:
//! they poison the bus and unwind the affected runner levels.

mod messages;

pub use messages::{OwnerChain, RunnerMessage};

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, OnceLock};
use thiserror::Error;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::model::Failure;

/// Bus errors
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum BusError {
    #[error("message sink rejected {message_type}: {reason}")]
    Sink {
        message_type: &'static str,
        reason: String,
    },

    #[error("message bus is closed")]
    Closed,
}

/// Consumer of the lifecycle message stream.
///
/// `Ok(false)` asks the engine to stop starting new work; an `Err` poisons
/// the bus and unwinds the current runner level.
pub trait MessageSink: Send + Sync {
    fn on_message(&self, message: &RunnerMessage) -> anyhow::Result<bool>;
}

/// Append-only, thread-safe message dispatch
pub trait MessageBus: Send + Sync {
    /// Queue one message. `Ok(false)` signals "stop test execution".
    fn queue_message(&self, message: RunnerMessage) -> Result<bool, BusError>;
}

fn dispatch(sink: &dyn MessageSink, message: &RunnerMessage) -> Result<bool, BusError> {
    let message_type = message.type_name();
    match catch_unwind(AssertUnwindSafe(|| sink.on_message(message))) {
        Ok(Ok(keep_going)) => Ok(keep_going),
        Ok(Err(error)) => Err(BusError::Sink {
            message_type,
            reason: format!("{error:#}"),
        }),
        Err(payload) => Err(BusError::Sink {
            message_type,
            reason: Failure::from_panic(payload).message,
        }),
    }
}

/// Dispatches inline on the caller's thread, so a sink rejection is visible
/// to the caller before the next pipeline step runs.
pub struct SyncMessageBus {
    sink: Arc<dyn MessageSink>,
}

impl SyncMessageBus {
    pub fn new(sink: Arc<dyn MessageSink>) -> Self {
        Self { sink }
    }
}

impl MessageBus for SyncMessageBus {
    fn queue_message(&self, message: RunnerMessage) -> Result<bool, BusError> {
        dispatch(self.sink.as_ref(), &message)
    }
}

struct AsyncBusShared {
    failure: OnceLock<BusError>,
    stop: AtomicBool,
}

/// Buffers messages into a channel drained by a background task.
///
/// `queue_message` returns quickly; a sink rejection observed by the drain
/// task fails every subsequent enqueue and is surfaced again by the
/// [`BusDrain`].
pub struct AsyncMessageBus {
    tx: mpsc::UnboundedSender<RunnerMessage>,
    shared: Arc<AsyncBusShared>,
}

/// Handle for waiting out the background drain task
pub struct BusDrain {
    worker: JoinHandle<()>,
    shared: Arc<AsyncBusShared>,
}

impl AsyncMessageBus {
    pub fn new(sink: Arc<dyn MessageSink>) -> (Self, BusDrain) {
        let (tx, mut rx) = mpsc::unbounded_channel::<RunnerMessage>();
        let shared = Arc::new(AsyncBusShared {
            failure: OnceLock::new(),
            stop: AtomicBool::new(false),
        });

        let worker_shared = shared.clone();
        let worker = tokio::spawn(async move {
            while let Some(message) = rx.recv().await {
                match dispatch(sink.as_ref(), &message) {
                    Ok(true) => {}
                    Ok(false) => worker_shared.stop.store(true, Ordering::SeqCst),
                    Err(error) => {
                        warn!("message sink failed, poisoning bus: {error}");
                        let _ = worker_shared.failure.set(error);
                        break;
                    }
                }
            }
            debug!("async message bus drained");
        });

        (
            Self {
                tx,
                shared: shared.clone(),
            },
            BusDrain { worker, shared },
        )
    }
}

impl MessageBus for AsyncMessageBus {
    fn queue_message(&self, message: RunnerMessage) -> Result<bool, BusError> {
        if let Some(error) = self.shared.failure.get() {
            return Err(error.clone());
        }
        if self.shared.stop.load(Ordering::SeqCst) {
            return Ok(false);
        }
        self.tx.send(message).map_err(|_| BusError::Closed)?;
        Ok(true)
    }
}

impl BusDrain {
    /// Wait for all buffered messages to reach the sink. Returns the recorded
    /// sink failure, if any.
    pub async fn wait(self) -> Result<(), BusError> {
        let _ = self.worker.await;
        match self.shared.failure.get() {
            Some(error) => Err(error.clone()),
            None => Ok(()),
        }
    }
}

/// Cloneable handle handed to test classes that want to publish diagnostics
/// through the run's bus.
#[derive(Clone)]
pub struct DiagnosticSink {
    bus: Arc<dyn MessageBus>,
}

impl DiagnosticSink {
    /// Type name matched during constructor-argument resolution
    pub const TYPE_NAME: &'static str = "DiagnosticSink";

    pub fn new(bus: Arc<dyn MessageBus>) -> Self {
        Self { bus }
    }

    /// Best-effort publish; a poisoned bus only logs
    pub fn send(&self, message: impl Into<String>) {
        let message = message.into();
        if let Err(error) = self.bus.queue_message(RunnerMessage::Diagnostic { message }) {
            warn!("dropping diagnostic message: {error}");
        }
    }
}

/// Sink that records every message, in order
#[derive(Default)]
pub struct CollectingSink {
    messages: Mutex<Vec<RunnerMessage>>,
}

impl CollectingSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn messages(&self) -> Vec<RunnerMessage> {
        self.messages
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }
}

impl MessageSink for CollectingSink {
    fn on_message(&self, message: &RunnerMessage) -> anyhow::Result<bool> {
        self.messages
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(message.clone());
        Ok(true)
    }
}
