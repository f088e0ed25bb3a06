//! Crucible - Hierarchical Test-Execution Engine
//!
//! Runs discovered test cases grouped by assembly → collection → class →
//! method, reports structured lifecycle events over a message bus, and
//! aggregates pass/fail/skip statistics with cooperative cancellation and
//! selectable parallelism.
//!
//! ## Features
//!
//! - Six-level runner pipeline with a single shared lifecycle driver
//! - Ordered sync/async message bus with poison-on-failure semantics
//! - Collection-, class- and assembly-scoped fixture lifecycle management
//! - Pluggable, panic-safe test case and collection orderers
//! - Conservative (capped spawn) and aggressive (fixed worker pool)
//!   partitioning of test collections
//!
//! ## Usage
//!
//! ```no_run
//! use std::sync::Arc;
//! use crucible::bus::CollectingSink;
//! use crucible::config::ExecutionConfig;
//! use crucible::model::{TestAssembly, TestCase, TestClass, TestCollection, TestMethod};
//! use crucible::AssemblyRunner;
//!
//! # async fn run() -> Result<(), crucible::EngineError> {
//! let assembly = Arc::new(TestAssembly::new("asm-1", "example tests"));
//! let collection = Arc::new(TestCollection::new("col-1", "default", assembly.clone()));
//! let class = Arc::new(TestClass::new("cls-1", "SmokeTests", collection));
//! let method = Arc::new(TestMethod::new("met-1", "works", class));
//! let case = Arc::new(TestCase::new("case-1", method, |_| {
//!     Box::pin(async { Ok(String::new()) })
//! }));
//!
//! let sink = Arc::new(CollectingSink::new());
//! let summary = AssemblyRunner::new(assembly, vec![case], sink.clone())
//!     .with_config(ExecutionConfig::default())
//!     .run()
//!     .await?;
//! assert_eq!(summary.total, 1);
//! # Ok(())
//! # }
//! ```

pub mod aggregator;
pub mod bus;
pub mod cancellation;
pub mod config;
pub mod fixtures;
pub mod model;
pub mod ordering;
pub mod runner;
pub mod utils;

mod executor;

#[cfg(test)]
pub(crate) mod test_support;

pub use aggregator::ExceptionAggregator;
pub use bus::{BusError, MessageBus, MessageSink, OwnerChain, RunnerMessage};
pub use cancellation::CancellationTokenSource;
pub use config::{ExecutionConfig, ParallelAlgorithm};
pub use model::{Failure, FailureInfo, RunSummary};
pub use runner::{AssemblyRunner, EngineError};
