//! Data models for test execution
//!
//! This module contains the discovery-supplied test tree, run summaries and
//! failure values used throughout the engine.

mod failure;
mod summary;

pub use failure::{Failure, FailureInfo, FailureKind};
pub use summary::RunSummary;
pub use test::{
    ClassConstructor, InvokeFuture, OrdererReference, ParameterDescriptor, TestAssembly, TestCase,
    TestClass, TestCollection, TestHook, TestMethod,
};
