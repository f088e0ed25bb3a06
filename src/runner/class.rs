//! Class-level runner: constructor validation, fixture injection and case
//! ordering.

use std::sync::Arc;

use tracing::warn;

use crate::aggregator::ExceptionAggregator;
use crate::bus::{OwnerChain, RunnerMessage};
use crate::fixtures::{resolve_constructor_args, FixtureStore};
use crate::model::{Failure, FailureInfo, RunSummary, TestCase, TestClass};
use crate::ordering::{apply_case_orderer, DiscoveryOrderer, TestCaseOrderer};
use crate::runner::context::RunContext;
use crate::runner::method::run_method;
use crate::runner::stage::{run_stage, Stage, StageError};
use crate::runner::{group_cases, ClassEnv, InstanceFactory, TestEnv};

pub(crate) async fn run_class(
    ctx: &RunContext,
    class: Arc<TestClass>,
    cases: Vec<Arc<TestCase>>,
    env: ClassEnv,
    seed: ExceptionAggregator,
) -> Result<RunSummary, StageError> {
    let mut stage = ClassStage {
        class,
        cases,
        env,
        fixtures: Arc::new(FixtureStore::new()),
        factory: None,
    };
    run_stage(ctx, &mut stage, seed).await
}

struct ClassStage {
    class: Arc<TestClass>,
    cases: Vec<Arc<TestCase>>,
    env: ClassEnv,
    fixtures: Arc<FixtureStore>,
    factory: Option<InstanceFactory>,
}

impl ClassStage {
    fn owners(&self) -> OwnerChain {
        OwnerChain::assembly(&self.class.collection.assembly.id)
            .collection(&self.class.collection.id)
            .class(&self.class.id)
    }

    /// Effective case orderer: class attribute, else the collection's, else
    /// discovery order. Resolution failure is non-fatal.
    async fn effective_orderer(
        &self,
        ctx: &RunContext,
    ) -> Result<Arc<dyn TestCaseOrderer>, StageError> {
        if let Some(reference) = &self.class.case_orderer {
            match self.env.resolver.resolve_case_orderer(reference) {
                Ok(orderer) => return Ok(orderer),
                Err(failure) => {
                    warn!(
                        "could not resolve case orderer for class {}: {}",
                        self.class.name, failure
                    );
                    ctx.diagnostic(format!(
                        "could not resolve test case orderer {} for class {}: {}; using default order",
                        reference, self.class.name, failure.message
                    ))
                    .map_err(StageError::bare)?;
                }
            }
        }
        if let Some(inherited) = &self.env.inherited_case_orderer {
            return Ok(inherited.clone());
        }
        Ok(Arc::new(DiscoveryOrderer))
    }
}

impl Stage for ClassStage {
    fn stage_name(&self) -> &'static str {
        "class"
    }

    fn unit_name(&self) -> String {
        self.class.name.clone()
    }

    fn starting_message(&self) -> RunnerMessage {
        RunnerMessage::ClassStarting {
            owners: self.owners(),
            class_name: self.class.name.clone(),
        }
    }

    fn finished_message(&self, summary: &RunSummary) -> RunnerMessage {
        RunnerMessage::ClassFinished {
            owners: self.owners(),
            summary: *summary,
        }
    }

    fn cleanup_failure_message(&self, failure: &Failure) -> RunnerMessage {
        RunnerMessage::ClassCleanupFailure {
            owners: self.owners(),
            failure: FailureInfo::from(failure),
        }
    }

    async fn on_starting(&mut self, ctx: &RunContext, aggregator: &mut ExceptionAggregator) {
        let mut store = FixtureStore::new();
        store.create_all(&self.class.fixture_sources, aggregator);
        self.fixtures = Arc::new(store);

        match self.class.constructors.as_slice() {
            // Instanceless (static) test class
            [] => {}
            [constructor] => {
                let stores = [
                    self.fixtures.as_ref(),
                    self.env.collection_fixtures.as_ref(),
                    self.env.assembly_fixtures.as_ref(),
                ];
                match resolve_constructor_args(
                    &constructor.parameters,
                    &stores,
                    &ctx.diagnostic_sink(),
                ) {
                    Ok(args) => {
                        self.factory = Some(InstanceFactory {
                            constructor: constructor.clone(),
                            args: Arc::new(args),
                        });
                    }
                    Err(failure) => aggregator.add(Failure::configuration(format!(
                        "test class {}: {}",
                        self.class.name, failure.message
                    ))),
                }
            }
            many => aggregator.add(Failure::configuration(format!(
                "test class {} has {} public constructors; at most one is allowed",
                self.class.name,
                many.len()
            ))),
        }
    }

    async fn execute(
        &mut self,
        ctx: &RunContext,
        aggregator: &mut ExceptionAggregator,
    ) -> Result<RunSummary, StageError> {
        let orderer = self.effective_orderer(ctx).await?;
        let ordered = match apply_case_orderer(orderer.as_ref(), &self.cases) {
            Ok(ordered) => ordered,
            Err(failure) => {
                warn!(
                    "test case orderer {} failed for class {}: {}",
                    orderer.name(),
                    self.class.name,
                    failure
                );
                ctx.diagnostic(format!(
                    "test case orderer {} threw in class {}: {}; running in discovery order",
                    orderer.name(),
                    self.class.name,
                    failure.message
                ))
                .map_err(StageError::bare)?;
                self.cases.clone()
            }
        };

        let env = TestEnv {
            factory: self.factory.clone(),
        };

        let mut summary = RunSummary::default();
        for group in group_cases(&ordered, |case| case.method.id.clone()) {
            if ctx.is_cancelled() {
                break;
            }
            let method = group[0].method.clone();
            match run_method(
                ctx,
                method,
                group,
                env.clone(),
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
