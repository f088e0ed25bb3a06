//! Shared fixture lifecycle management.
//!
//! Fixtures are created once per scope (assembly, collection or class), keyed
//! by their declared type name, injected into test-class constructors, and
//! disposed exactly once at end of scope. For a fixture carrying both
//! disposal flavors, the async path is awaited before the sync path runs.

use futures::future::{ready, BoxFuture};
use std::any::Any;
use std::fmt;
use std::sync::Arc;

use crate::aggregator::ExceptionAggregator;
use crate::bus::DiagnosticSink;
use crate::model::{Failure, ParameterDescriptor};

/// A shared, lifecycle-managed instance injected into test-class constructors
pub trait TestFixture: Send + Sync {
    fn as_any(&self) -> &dyn Any;

    /// Synchronous disposal; runs after [`dispose_async`](Self::dispose_async)
    fn dispose(&self) -> Result<(), Failure> {
        Ok(())
    }

    /// Asynchronous disposal; assumed to release whatever the sync path
    /// depends on
    fn dispose_async(&self) -> BoxFuture<'_, Result<(), Failure>> {
        Box::pin(ready(Ok(())))
    }
}

/// A constructed test-class instance, disposed after its test regardless of
/// outcome
pub trait TestInstance: Send + Sync {
    fn as_any(&self) -> &dyn Any;

    fn dispose(&self) -> Result<(), Failure> {
        Ok(())
    }

    fn dispose_async(&self) -> BoxFuture<'_, Result<(), Failure>> {
        Box::pin(ready(Ok(())))
    }
}

type FixtureFactory = dyn Fn() -> Result<Arc<dyn TestFixture>, Failure> + Send + Sync;

/// Recipe for one fixture: the declared type name it is keyed under plus the
/// factory supplied by discovery
#[derive(Clone)]
pub struct FixtureSource {
    pub type_name: String,
    factory: Arc<FixtureFactory>,
}

impl FixtureSource {
    pub fn new(
        type_name: impl Into<String>,
        factory: impl Fn() -> Result<Arc<dyn TestFixture>, Failure> + Send + Sync + 'static,
    ) -> Self {
        Self {
            type_name: type_name.into(),
            factory: Arc::new(factory),
        }
    }

    pub fn create(&self) -> Result<Arc<dyn TestFixture>, Failure> {
        (self.factory)().map_err(|failure| {
            Failure::configuration(format!(
                "fixture {} construction failed: {}",
                self.type_name, failure.message
            ))
        })
    }
}

impl fmt::Debug for FixtureSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FixtureSource")
            .field("type_name", &self.type_name)
            .finish()
    }
}

/// Type-name-keyed fixture cache for one scope. Insertion order is creation
/// order; disposal walks it in reverse.
#[derive(Default)]
pub struct FixtureStore {
    entries: Vec<(String, Arc<dyn TestFixture>)>,
}

impl FixtureStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create every fixture in declaration order, capturing factory failures
    /// and panics into `aggregator`
    pub fn create_all(&mut self, sources: &[FixtureSource], aggregator: &mut ExceptionAggregator) {
        for source in sources {
            if let Some(fixture) = aggregator.run(|| source.create()) {
                self.entries.push((source.type_name.clone(), fixture));
            }
        }
    }

    pub fn insert(&mut self, type_name: impl Into<String>, fixture: Arc<dyn TestFixture>) {
        self.entries.push((type_name.into(), fixture));
    }

    pub fn get(&self, type_name: &str) -> Option<Arc<dyn TestFixture>> {
        self.entries
            .iter()
            .find(|(name, _)| name == type_name)
            .map(|(_, fixture)| fixture.clone())
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Dispose all fixtures in reverse creation order, async disposal awaited
    /// before sync disposal for each. Failures are captured, never thrown.
    pub async fn dispose_all(&self, aggregator: &mut ExceptionAggregator) {
        for (_, fixture) in self.entries.iter().rev() {
            aggregator.run_async(fixture.dispose_async()).await;
            aggregator.run(|| fixture.dispose());
        }
    }
}

impl fmt::Debug for FixtureStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let names: Vec<&str> = self.entries.iter().map(|(n, _)| n.as_str()).collect();
        f.debug_struct("FixtureStore").field("entries", &names).finish()
    }
}

/// A resolved constructor argument
#[derive(Clone)]
pub enum ConstructorArg {
    Fixture(Arc<dyn TestFixture>),
    DiagnosticSink(DiagnosticSink),
}

impl fmt::Debug for ConstructorArg {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConstructorArg::Fixture(_) => f.write_str("ConstructorArg::Fixture"),
            ConstructorArg::DiagnosticSink(_) => f.write_str("ConstructorArg::DiagnosticSink"),
        }
    }
}

impl fmt::Debug for dyn TestInstance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("TestInstance")
    }
}

impl ConstructorArg {
    /// Downcast a fixture argument to its concrete type
    pub fn downcast_fixture<T: 'static>(&self) -> Option<&T> {
        match self {
            ConstructorArg::Fixture(fixture) => fixture.as_any().downcast_ref::<T>(),
            ConstructorArg::DiagnosticSink(_) => None,
        }
    }

    pub fn as_diagnostic_sink(&self) -> Option<&DiagnosticSink> {
        match self {
            ConstructorArg::DiagnosticSink(sink) => Some(sink),
            ConstructorArg::Fixture(_) => None,
        }
    }
}

/// Match every declared constructor parameter against the available fixture
/// scopes (searched in order) and the diagnostic sink. Either all parameters
/// resolve, or the error names every unmatched parameter by type and name.
pub fn resolve_constructor_args(
    parameters: &[ParameterDescriptor],
    stores: &[&FixtureStore],
    sink: &DiagnosticSink,
) -> Result<Vec<ConstructorArg>, Failure> {
    let mut args = Vec::with_capacity(parameters.len());
    let mut unresolved = Vec::new();

    for parameter in parameters {
        if parameter.type_name == DiagnosticSink::TYPE_NAME {
            args.push(ConstructorArg::DiagnosticSink(sink.clone()));
            continue;
        }
        match stores.iter().find_map(|store| store.get(&parameter.type_name)) {
            Some(fixture) => args.push(ConstructorArg::Fixture(fixture)),
            None => unresolved.push(format!("{} {}", parameter.type_name, parameter.name)),
        }
    }

    if unresolved.is_empty() {
        Ok(args)
    } else {
        Err(Failure::configuration(format!(
            "unresolved constructor arguments: {}",
            unresolved.join(", ")
        )))
    }
}
