//! Failure aggregation without short-circuiting sibling work.

use futures::FutureExt;
use std::future::Future;
use std::panic::{catch_unwind, AssertUnwindSafe};

use crate::model::Failure;

/// Collects failures from user and extensibility code. Each runner level owns
/// its own aggregator, optionally seeded from its parent so upstream failures
/// stay visible below; it is never shared across concurrent runners.
#[derive(Clone, Debug, Default)]
pub struct ExceptionAggregator {
    failures: Vec<Failure>,
    prior_failures: bool,
}

impl ExceptionAggregator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Child aggregator carrying a copy of the parent's failures
    pub fn seeded(parent: &ExceptionAggregator) -> Self {
        parent.clone()
    }

    pub fn add(&mut self, failure: Failure) {
        self.failures.push(failure);
    }

    /// Run `op`, capturing a returned failure or a panic. Returns the value
    /// on success, `None` when a failure was captured.
    pub fn run<T>(&mut self, op: impl FnOnce() -> Result<T, Failure>) -> Option<T> {
        match catch_unwind(AssertUnwindSafe(op)) {
            Ok(Ok(value)) => Some(value),
            Ok(Err(failure)) => {
                self.failures.push(failure);
                None
            }
            Err(payload) => {
                self.failures.push(Failure::from_panic(payload));
                None
            }
        }
    }

    /// Async variant of [`run`](Self::run)
    pub async fn run_async<T, F>(&mut self, fut: F) -> Option<T>
    where
        F: Future<Output = Result<T, Failure>>,
    {
        match AssertUnwindSafe(fut).catch_unwind().await {
            Ok(Ok(value)) => Some(value),
            Ok(Err(failure)) => {
                self.failures.push(failure);
                None
            }
            Err(payload) => {
                self.failures.push(Failure::from_panic(payload));
                None
            }
        }
    }

    pub fn has_failures(&self) -> bool {
        !self.failures.is_empty()
    }

    /// True when `clear` discarded at least one failure. Used to tell apart a
    /// finishing-phase failure from one carried over from the starting phase.
    pub fn had_prior_failures(&self) -> bool {
        self.prior_failures
    }

    /// Empty the list before entering the finishing phase, remembering that
    /// prior failures existed so they are never re-reported as cleanup
    /// failures.
    pub fn clear(&mut self) {
        if !self.failures.is_empty() {
            self.prior_failures = true;
        }
        self.failures.clear();
    }

    /// Zero captured failures → `None`; one → that failure; several → an
    /// aggregate wrapping them in capture order.
    pub fn to_failure(&self) -> Option<Failure> {
        match self.failures.as_slice() {
            [] => None,
            [single] => Some(single.clone()),
            _ => Some(Failure::aggregate(self.failures.clone())),
        }
    }
}
