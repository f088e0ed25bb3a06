//! Collection-level runner: collection fixtures and serial class execution.

use std::sync::Arc;

use tracing::warn;

use crate::aggregator::ExceptionAggregator;
use crate::bus::{OwnerChain, RunnerMessage};
use crate::fixtures::FixtureStore;
use crate::model::{Failure, FailureInfo, RunSummary, TestCase, TestCollection};
use crate::ordering::TestCaseOrderer;
use crate::runner::class::run_class;
use crate::runner::context::RunContext;
use crate::runner::stage::{run_stage, Stage, StageError};
use crate::runner::{group_cases, ClassEnv, CollectionEnv};

/// Entry point used by the partitioning executor; takes owned inputs so it
/// can run on a pooled worker.
pub(crate) async fn run_collection(
    ctx: RunContext,
    collection: Arc<TestCollection>,
    cases: Vec<Arc<TestCase>>,
    env: CollectionEnv,
) -> Result<RunSummary, StageError> {
    let seed = ExceptionAggregator::seeded(&env.seed);
    let mut stage = CollectionStage {
        collection,
        cases,
        env,
        fixtures: Arc::new(FixtureStore::new()),
    };
    run_stage(&ctx, &mut stage, seed).await
}

struct CollectionStage {
    collection: Arc<TestCollection>,
    cases: Vec<Arc<TestCase>>,
    env: CollectionEnv,
    fixtures: Arc<FixtureStore>,
}

impl CollectionStage {
    fn owners(&self) -> OwnerChain {
        OwnerChain::assembly(&self.collection.assembly.id).collection(&self.collection.id)
    }
}

impl Stage for CollectionStage {
    fn stage_name(&self) -> &'static str {
        "collection"
    }

    fn unit_name(&self) -> String {
        self.collection.display_name.clone()
    }

    fn starting_message(&self) -> RunnerMessage {
        RunnerMessage::CollectionStarting {
            owners: self.owners(),
            display_name: self.collection.display_name.clone(),
        }
    }

    fn finished_message(&self, summary: &RunSummary) -> RunnerMessage {
        RunnerMessage::CollectionFinished {
            owners: self.owners(),
            summary: *summary,
        }
    }

    fn cleanup_failure_message(&self, failure: &Failure) -> RunnerMessage {
        RunnerMessage::CollectionCleanupFailure {
            owners: self.owners(),
            failure: FailureInfo::from(failure),
        }
    }

    async fn on_starting(&mut self, _ctx: &RunContext, aggregator: &mut ExceptionAggregator) {
        let mut store = FixtureStore::new();
        store.create_all(&self.collection.fixture_sources, aggregator);
        self.fixtures = Arc::new(store);
    }

    async fn execute(
        &mut self,
        ctx: &RunContext,
        aggregator: &mut ExceptionAggregator,
    ) -> Result<RunSummary, StageError> {
        // The collection-level case orderer is resolved once and inherited
        // by every class that does not declare its own.
        let inherited_case_orderer: Option<Arc<dyn TestCaseOrderer>> =
            match &self.collection.case_orderer {
                None => None,
                Some(reference) => match self.env.resolver.resolve_case_orderer(reference) {
                    Ok(orderer) => Some(orderer),
                    Err(failure) => {
                        warn!(
                            "could not resolve case orderer for collection {}: {}",
                            self.collection.display_name, failure
                        );
                        ctx.diagnostic(format!(
                            "could not resolve test case orderer {} for collection {}: {}; using default order",
                            reference, self.collection.display_name, failure.message
                        ))
                        .map_err(StageError::bare)?;
                        None
                    }
                },
            };

        let mut summary = RunSummary::default();
        for group in group_cases(&self.cases, |case| case.method.class.id.clone()) {
            if ctx.is_cancelled() {
                break;
            }
            let class = group[0].method.class.clone();
            let env = ClassEnv {
                assembly_fixtures: self.env.assembly_fixtures.clone(),
                collection_fixtures: self.fixtures.clone(),
                resolver: self.env.resolver.clone(),
                inherited_case_orderer: inherited_case_orderer.clone(),
            };
            match run_class(
                ctx,
                class,
                group,
                env,
                ExceptionAggregator::seeded(aggregator),
            )
            .await
            {
                Ok(child) => summary.aggregate(&child),
                Err(error) => {
                    summary.aggregate(&error.summary);
                    return Err(StageError::new(summary, error.source));
                }
            }
        }
        Ok(summary)
    }

    async fn on_finishing(&mut self, _ctx: &RunContext, aggregator: &mut ExceptionAggregator) {
        self.fixtures.dispose_all(aggregator).await;
    }
}
