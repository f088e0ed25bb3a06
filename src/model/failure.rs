//! Failure values carried through the execution pipeline.
//!
//! Test and extensibility code never aborts the engine; everything it throws
//! is converted into a [`Failure`] value and routed through aggregators and
//! lifecycle messages.

use serde::{Deserialize, Serialize};
use std::any::Any;
use std::fmt;

/// Classification of a captured failure
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FailureKind {
    /// Raised by an assertion library
    Assertion,
    /// Any other error or panic from user code
    Exception,
}

/// A single captured failure, possibly wrapping others
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Failure {
    pub kind: FailureKind,
    /// Type name reported to sinks, e.g. `AssertionFailure` or `Panic`
    pub type_name: String,
    pub message: String,
    pub stack_trace: Option<String>,
    /// Wrapped failures when this is an aggregate
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub inner: Vec<Failure>,
}

impl Failure {
    /// Create a generic exception-kind failure
    pub fn new(type_name: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            kind: FailureKind::Exception,
            type_name: type_name.into(),
            message: message.into(),
            stack_trace: None,
            inner: Vec::new(),
        }
    }

    /// Create an assertion failure
    pub fn assertion(message: impl Into<String>) -> Self {
        Self {
            kind: FailureKind::Assertion,
            type_name: "AssertionFailure".to_string(),
            message: message.into(),
            stack_trace: None,
            inner: Vec::new(),
        }
    }

    /// Create a configuration failure (bad constructor, unresolved fixture,
    /// unknown orderer)
    pub fn configuration(message: impl Into<String>) -> Self {
        Self::new("ConfigurationError", message)
    }

    /// Convert a caught panic payload into a failure
    pub fn from_panic(payload: Box<dyn Any + Send>) -> Self {
        let message = if let Some(s) = payload.downcast_ref::<&'static str>() {
            (*s).to_string()
        } else if let Some(s) = payload.downcast_ref::<String>() {
            s.clone()
        } else {
            "non-string panic payload".to_string()
        };
        Self::new("Panic", message)
    }

    /// Wrap several failures into a single aggregate
    pub fn aggregate(failures: Vec<Failure>) -> Self {
        let message = format!("{} failure(s) occurred", failures.len());
        Self {
            kind: FailureKind::Exception,
            type_name: "AggregateFailure".to_string(),
            message,
            stack_trace: None,
            inner: failures,
        }
    }

    /// Attach a captured stack or backtrace rendering
    pub fn with_stack_trace(mut self, stack_trace: impl Into<String>) -> Self {
        self.stack_trace = Some(stack_trace.into());
        self
    }

    pub fn is_assertion(&self) -> bool {
        self.kind == FailureKind::Assertion
    }
}

impl fmt::Display for Failure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.type_name, self.message)
    }
}

/// Wire form of a failure tree: parallel arrays indexed together, with
/// `exception_parent_indices` linking nested failures to their parent
/// (`-1` for the root).
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct FailureInfo {
    pub exception_types: Vec<String>,
    pub messages: Vec<String>,
    pub stack_traces: Vec<Option<String>>,
    pub exception_parent_indices: Vec<i32>,
}

impl FailureInfo {
    /// First (root) message, for logging
    pub fn first_message(&self) -> &str {
        self.messages.first().map(String::as_str).unwrap_or("")
    }
}

impl From<&Failure> for FailureInfo {
    fn from(failure: &Failure) -> Self {
        let mut info = FailureInfo::default();
        flatten(failure, -1, &mut info);
        info
    }
}

fn flatten(failure: &Failure, parent: i32, info: &mut FailureInfo) {
    let index = info.exception_types.len() as i32;
    info.exception_types.push(failure.type_name.clone());
    info.messages.push(failure.message.clone());
    info.stack_traces.push(failure.stack_trace.clone());
    info.exception_parent_indices.push(parent);
    for inner in &failure.inner {
        flatten(inner, index, info);
    }
}
