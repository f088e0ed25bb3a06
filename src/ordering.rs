//! Pluggable execution-order strategies.
//!
//! Orderers are stateless strategies over read-only slices. A custom orderer
//! is never trusted with the run: if it panics or returns the wrong number of
//! items, the engine logs a diagnostic and falls back to discovery order.

use std::collections::HashMap;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;

use crate::model::{Failure, OrdererReference, TestCase, TestCollection};

/// Orders the test cases of one class/collection scope
pub trait TestCaseOrderer: Send + Sync {
    fn name(&self) -> &str;

    fn order_test_cases(&self, cases: &[Arc<TestCase>]) -> Vec<Arc<TestCase>>;
}

impl std::fmt::Debug for dyn TestCaseOrderer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("TestCaseOrderer")
    }
}

/// Orders test collections before they are partitioned across workers
pub trait TestCollectionOrderer: Send + Sync {
    fn name(&self) -> &str;

    fn order_test_collections(&self, collections: &[Arc<TestCollection>])
        -> Vec<Arc<TestCollection>>;
}

/// Default strategy: discovery order, untouched
#[derive(Clone, Copy, Debug, Default)]
pub struct DiscoveryOrderer;

impl TestCaseOrderer for DiscoveryOrderer {
    fn name(&self) -> &str {
        "DiscoveryOrderer"
    }

    fn order_test_cases(&self, cases: &[Arc<TestCase>]) -> Vec<Arc<TestCase>> {
        cases.to_vec()
    }
}

impl TestCollectionOrderer for DiscoveryOrderer {
    fn name(&self) -> &str {
        "DiscoveryOrderer"
    }

    fn order_test_collections(
        &self,
        collections: &[Arc<TestCollection>],
    ) -> Vec<Arc<TestCollection>> {
        collections.to_vec()
    }
}

/// Resolves orderer references declared on assemblies, collections and
/// classes. How the mapping was obtained (reflection, registration, codegen)
/// is the collaborator's business.
pub trait MetadataResolver: Send + Sync {
    fn resolve_case_orderer(
        &self,
        reference: &OrdererReference,
    ) -> Result<Arc<dyn TestCaseOrderer>, Failure>;

    fn resolve_collection_orderer(
        &self,
        reference: &OrdererReference,
    ) -> Result<Arc<dyn TestCollectionOrderer>, Failure>;
}

/// Registration-backed resolver
#[derive(Default)]
pub struct RegistryResolver {
    case_orderers: HashMap<OrdererReference, Arc<dyn TestCaseOrderer>>,
    collection_orderers: HashMap<OrdererReference, Arc<dyn TestCollectionOrderer>>,
}

impl RegistryResolver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register_case_orderer(
        mut self,
        reference: OrdererReference,
        orderer: Arc<dyn TestCaseOrderer>,
    ) -> Self {
        self.case_orderers.insert(reference, orderer);
        self
    }

    pub fn register_collection_orderer(
        mut self,
        reference: OrdererReference,
        orderer: Arc<dyn TestCollectionOrderer>,
    ) -> Self {
        self.collection_orderers.insert(reference, orderer);
        self
    }
}

impl MetadataResolver for RegistryResolver {
    fn resolve_case_orderer(
        &self,
        reference: &OrdererReference,
    ) -> Result<Arc<dyn TestCaseOrderer>, Failure> {
        self.case_orderers.get(reference).cloned().ok_or_else(|| {
            Failure::configuration(format!("could not resolve test case orderer {reference}"))
        })
    }

    fn resolve_collection_orderer(
        &self,
        reference: &OrdererReference,
    ) -> Result<Arc<dyn TestCollectionOrderer>, Failure> {
        self.collection_orderers.get(reference).cloned().ok_or_else(|| {
            Failure::configuration(format!(
                "could not resolve test collection orderer {reference}"
            ))
        })
    }
}

fn checked<T>(name: &str, input_len: usize, ordered: Vec<T>) -> Result<Vec<T>, Failure> {
    if ordered.len() != input_len {
        return Err(Failure::configuration(format!(
            "orderer {} returned {} of {} item(s)",
            name,
            ordered.len(),
            input_len
        )));
    }
    Ok(ordered)
}

/// Run a case orderer defensively; the caller falls back to input order on
/// `Err`
pub fn apply_case_orderer(
    orderer: &dyn TestCaseOrderer,
    cases: &[Arc<TestCase>],
) -> Result<Vec<Arc<TestCase>>, Failure> {
    match catch_unwind(AssertUnwindSafe(|| orderer.order_test_cases(cases))) {
        Ok(ordered) => checked(orderer.name(), cases.len(), ordered),
        Err(payload) => Err(Failure::from_panic(payload)),
    }
}

/// Run a collection orderer defensively; the caller falls back to input order
/// on `Err`
pub fn apply_collection_orderer(
    orderer: &dyn TestCollectionOrderer,
    collections: &[Arc<TestCollection>],
) -> Result<Vec<Arc<TestCollection>>, Failure> {
    match catch_unwind(AssertUnwindSafe(|| {
        orderer.order_test_collections(collections)
    })) {
        Ok(ordered) => checked(orderer.name(), collections.len(), ordered),
        Err(payload) => Err(Failure::from_panic(payload)),
    }
}
