//! Assembly-level runner: the public entry point of the engine.
//!
//! Computes the environment string, creates the run's bus and cancellation
//! source, orders and partitions test collections, and returns the top-level
//! [`RunSummary`].

use chrono::{DateTime, Utc};
use std::sync::Arc;
use tracing::{info, warn};

use crate::aggregator::ExceptionAggregator;
use crate::bus::{
    AsyncMessageBus, BusDrain, MessageBus, MessageSink, OwnerChain, RunnerMessage, SyncMessageBus,
};
use crate::cancellation::CancellationTokenSource;
use crate::config::ExecutionConfig;
use crate::executor::{run_collections, CollectionJob, Partitioning};
use crate::fixtures::FixtureStore;
use crate::model::{Failure, FailureInfo, RunSummary, TestAssembly, TestCase, TestCollection};
use crate::ordering::{apply_collection_orderer, MetadataResolver, RegistryResolver};
use crate::runner::context::RunContext;
use crate::runner::stage::{run_stage, Stage, StageError};
use crate::runner::{group_cases, CollectionEnv, EngineError};
use crate::utils::Timer;

/// Runs one assembly's test cases and reports lifecycle messages to the
/// given sink.
pub struct AssemblyRunner {
    assembly: Arc<TestAssembly>,
    test_cases: Vec<Arc<TestCase>>,
    sink: Arc<dyn MessageSink>,
    config: ExecutionConfig,
    resolver: Arc<dyn MetadataResolver>,
}

impl AssemblyRunner {
    pub fn new(
        assembly: Arc<TestAssembly>,
        test_cases: Vec<Arc<TestCase>>,
        sink: Arc<dyn MessageSink>,
    ) -> Self {
        Self {
            assembly,
            test_cases,
            sink,
            config: ExecutionConfig::default(),
            resolver: Arc::new(RegistryResolver::new()),
        }
    }

    pub fn with_config(mut self, config: ExecutionConfig) -> Self {
        self.config = config;
        self
    }

    pub fn with_resolver(mut self, resolver: Arc<dyn MetadataResolver>) -> Self {
        self.resolver = resolver;
        self
    }

    /// Run everything. The summary is always populated with whatever
    /// completed; a bus failure carries the partial summary inside the
    /// error.
    pub async fn run(self) -> Result<RunSummary, EngineError> {
        info!(
            "starting test run for {} ({} test case(s), {})",
            self.assembly.display_name,
            self.test_cases.len(),
            self.config.parallelism_description()
        );
        let timer = Timer::start(self.assembly.display_name.clone());

        let cancellation = CancellationTokenSource::new();
        let (bus, drain): (Arc<dyn MessageBus>, Option<BusDrain>) =
            if self.config.synchronous_message_reporting {
                (Arc::new(SyncMessageBus::new(self.sink.clone())), None)
            } else {
                let (bus, drain) = AsyncMessageBus::new(self.sink.clone());
                (Arc::new(bus), Some(drain))
            };
        let ctx = RunContext::new(bus, cancellation);

        let mut stage = AssemblyStage {
            assembly: self.assembly.clone(),
            cases: self.test_cases,
            config: self.config,
            resolver: self.resolver,
            fixtures: Arc::new(FixtureStore::new()),
            started_at: Utc::now(),
        };

        let result = run_stage(&ctx, &mut stage, ExceptionAggregator::new()).await;

        // Release the bus so the drain task sees the channel close.
        drop(ctx);

        let mut result = result.map_err(|error| EngineError {
            partial: error.summary,
            source: error.source,
        });

        if let Some(drain) = drain {
            if let Err(bus_error) = drain.wait().await {
                // Surface a sink failure recorded after the last enqueue.
                result = match result {
                    Ok(summary) => Err(EngineError {
                        partial: summary,
                        source: bus_error,
                    }),
                    Err(error) => Err(error),
                };
            }
        }

        let elapsed = timer.stop();
        match &result {
            Ok(summary) => info!(
                "test run finished for {} in {}ms: {}",
                self.assembly.display_name,
                elapsed.as_millis(),
                summary
            ),
            Err(error) => warn!(
                "test run unwound for {}: {} (partial: {})",
                self.assembly.display_name, error.source, error.partial
            ),
        }
        result
    }
}

struct AssemblyStage {
    assembly: Arc<TestAssembly>,
    cases: Vec<Arc<TestCase>>,
    config: ExecutionConfig,
    resolver: Arc<dyn MetadataResolver>,
    fixtures: Arc<FixtureStore>,
    started_at: DateTime<Utc>,
}

impl AssemblyStage {
    fn owners(&self) -> OwnerChain {
        OwnerChain::assembly(&self.assembly.id)
    }

    fn environment(&self) -> String {
        format!(
            "crucible {} [{}]",
            env!("CARGO_PKG_VERSION"),
            self.config.parallelism_description()
        )
    }

    /// Order the discovered collections, falling back to discovery order
    /// with a diagnostic when the declared orderer cannot be resolved or
    /// misbehaves.
    async fn order_collections(
        &self,
        ctx: &RunContext,
        collections: &[Arc<TestCollection>],
    ) -> Result<Vec<Arc<TestCollection>>, StageError> {
        let Some(reference) = &self.assembly.collection_orderer else {
            return Ok(collections.to_vec());
        };

        let orderer = match self.resolver.resolve_collection_orderer(reference) {
            Ok(orderer) => orderer,
            Err(failure) => {
                warn!("could not resolve collection orderer: {failure}");
                ctx.diagnostic(format!(
                    "could not resolve test collection orderer {}: {}; using default order",
                    reference, failure.message
                ))
                .map_err(StageError::bare)?;
                return Ok(collections.to_vec());
            }
        };

        match apply_collection_orderer(orderer.as_ref(), collections) {
            Ok(ordered) => Ok(ordered),
            Err(failure) => {
                warn!(
                    "collection orderer {} failed: {failure}",
                    orderer.name()
                );
                ctx.diagnostic(format!(
                    "test collection orderer {} threw: {}; running collections in discovery order",
                    orderer.name(),
                    failure.message
                ))
                .map_err(StageError::bare)?;
                Ok(collections.to_vec())
            }
        }
    }
}

impl Stage for AssemblyStage {
    fn stage_name(&self) -> &'static str {
        "assembly"
    }

    fn unit_name(&self) -> String {
        self.assembly.display_name.clone()
    }

    fn starting_message(&self) -> RunnerMessage {
        RunnerMessage::AssemblyStarting {
            owners: self.owners(),
            display_name: self.assembly.display_name.clone(),
            environment: self.environment(),
            started_at: self.started_at,
        }
    }

    fn finished_message(&self, summary: &RunSummary) -> RunnerMessage {
        RunnerMessage::AssemblyFinished {
            owners: self.owners(),
            summary: *summary,
        }
    }

    fn cleanup_failure_message(&self, failure: &Failure) -> RunnerMessage {
        RunnerMessage::AssemblyCleanupFailure {
            owners: self.owners(),
            failure: FailureInfo::from(failure),
        }
    }

    async fn on_starting(&mut self, _ctx: &RunContext, aggregator: &mut ExceptionAggregator) {
        let mut store = FixtureStore::new();
        store.create_all(&self.assembly.fixture_sources, aggregator);
        self.fixtures = Arc::new(store);
    }

    async fn execute(
        &mut self,
        ctx: &RunContext,
        aggregator: &mut ExceptionAggregator,
    ) -> Result<RunSummary, StageError> {
        let groups = group_cases(&self.cases, |case| case.method.class.collection.id.clone());
        let collections: Vec<Arc<TestCollection>> = groups
            .iter()
            .map(|group| group[0].method.class.collection.clone())
            .collect();

        let ordered = self.order_collections(ctx, &collections).await?;

        // Pair each ordered collection back with its cases. Each group is
        // consumed at most once and leftovers still run, so a misbehaving
        // orderer can neither duplicate nor lose tests.
        let mut pending: Vec<(String, Vec<Arc<TestCase>>)> = groups
            .into_iter()
            .map(|group| (group[0].method.class.collection.id.clone(), group))
            .collect();
        let mut jobs = Vec::with_capacity(pending.len());
        for collection in ordered {
            if let Some(position) = pending.iter().position(|(id, _)| *id == collection.id) {
                let (_, cases) = pending.remove(position);
                jobs.push(CollectionJob { collection, cases });
            }
        }
        for (_, cases) in pending {
            let collection = cases[0].method.class.collection.clone();
            jobs.push(CollectionJob { collection, cases });
        }

        let env = CollectionEnv {
            assembly_fixtures: self.fixtures.clone(),
            resolver: self.resolver.clone(),
            seed: ExceptionAggregator::seeded(aggregator),
        };
        let partitioning = Partitioning::from_config(&self.config);
        run_collections(ctx, jobs, env, partitioning).await
    }

    async fn on_finishing(&mut self, _ctx: &RunContext, aggregator: &mut ExceptionAggregator) {
        self.fixtures.dispose_all(aggregator).await;
    }
}
