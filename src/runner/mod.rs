//! The hierarchical runner pipeline.
//!
//! Six levels, one shared state machine: assembly → collection → class →
//! method → case → test, with the invoker at the leaf. Each level owns its
//! aggregator, emits a `Starting`/`Finished` pair, and rolls its children's
//! summaries up.

mod assembly;
#[cfg(test)]
mod pipeline_tests;

pub(crate) mod case;
pub(crate) mod class;
pub(crate) mod collection;
pub(crate) mod context;
pub(crate) mod invoker;
pub(crate) mod method;
pub(crate) mod stage;

pub use assembly::AssemblyRunner;

use std::sync::Arc;
use thiserror::Error;

use crate::aggregator::ExceptionAggregator;
use crate::bus::BusError;
use crate::fixtures::{ConstructorArg, FixtureStore, TestInstance};
use crate::model::{ClassConstructor, Failure, RunSummary, TestCase};
use crate::ordering::{MetadataResolver, TestCaseOrderer};

/// A message-bus failure that unwound the pipeline. The summary accumulated
/// before the unwind is preserved so reporting collaborators still see
/// partial counts.
#[derive(Debug, Error)]
#[error("test pipeline failed: {source}")]
pub struct EngineError {
    pub partial: RunSummary,
    #[source]
    pub source: BusError,
}

/// Environment handed to each collection runner
#[derive(Clone)]
pub(crate) struct CollectionEnv {
    pub assembly_fixtures: Arc<FixtureStore>,
    pub resolver: Arc<dyn MetadataResolver>,
    /// Parent aggregator snapshot, re-seeded per collection
    pub seed: ExceptionAggregator,
}

/// Environment handed to each class runner
#[derive(Clone)]
pub(crate) struct ClassEnv {
    pub assembly_fixtures: Arc<FixtureStore>,
    pub collection_fixtures: Arc<FixtureStore>,
    pub resolver: Arc<dyn MetadataResolver>,
    /// Collection-level case orderer, used when the class declares none
    pub inherited_case_orderer: Option<Arc<dyn TestCaseOrderer>>,
}

/// Environment handed down from the class runner to its tests
#[derive(Clone, Default)]
pub(crate) struct TestEnv {
    pub factory: Option<InstanceFactory>,
}

/// A validated constructor plus its resolved arguments
#[derive(Clone)]
pub(crate) struct InstanceFactory {
    pub constructor: ClassConstructor,
    pub args: Arc<Vec<ConstructorArg>>,
}

impl InstanceFactory {
    pub fn construct(&self) -> Result<Arc<dyn TestInstance>, Failure> {
        self.constructor.construct(&self.args)
    }
}

/// Group cases by a key, preserving the order of first appearance within
/// and across groups.
pub(crate) fn group_cases<F>(cases: &[Arc<TestCase>], key: F) -> Vec<Vec<Arc<TestCase>>>
where
    F: Fn(&TestCase) -> String,
{
    let mut groups: Vec<(String, Vec<Arc<TestCase>>)> = Vec::new();
    for case in cases {
        let k = key(case);
        match groups.iter_mut().find(|(existing, _)| *existing == k) {
            Some((_, members)) => members.push(case.clone()),
            None => groups.push((k, vec![case.clone()])),
        }
    }
    groups.into_iter().map(|(_, members)| members).collect()
}
