//! Case-level runner: display-name resolution and hook merging.

use std::sync::Arc;

use crate::aggregator::ExceptionAggregator;
use crate::bus::{OwnerChain, RunnerMessage};
use crate::model::{Failure, FailureInfo, RunSummary, TestCase, TestHook};
use crate::runner::context::RunContext;
use crate::runner::stage::{run_stage, Stage, StageError};
use crate::runner::test::run_test;
use crate::runner::TestEnv;

pub(crate) async fn run_case(
    ctx: &RunContext,
    case: Arc<TestCase>,
    env: TestEnv,
    seed: ExceptionAggregator,
) -> Result<RunSummary, StageError> {
    let display_name = case.resolve_display_name();

    // Hooks declared at assembly, collection, class and method level all
    // wrap this case's tests, outermost first.
    let method = &case.method;
    let mut hooks: Vec<Arc<dyn TestHook>> = Vec::new();
    hooks.extend(method.class.collection.assembly.hooks.iter().cloned());
    hooks.extend(method.class.collection.hooks.iter().cloned());
    hooks.extend(method.class.hooks.iter().cloned());
    hooks.extend(method.hooks.iter().cloned());

    let mut stage = CaseStage {
        case,
        display_name,
        hooks,
        env,
    };
    run_stage(ctx, &mut stage, seed).await
}

struct CaseStage {
    case: Arc<TestCase>,
    display_name: String,
    hooks: Vec<Arc<dyn TestHook>>,
    env: TestEnv,
}

impl CaseStage {
    fn owners(&self) -> OwnerChain {
        let method = &self.case.method;
        OwnerChain::assembly(&method.class.collection.assembly.id)
            .collection(&method.class.collection.id)
            .class(&method.class.id)
            .method(&method.id)
            .case(&self.case.id)
    }
}

impl Stage for CaseStage {
    fn stage_name(&self) -> &'static str {
        "case"
    }

    fn unit_name(&self) -> String {
        self.display_name.clone()
    }

    fn starting_message(&self) -> RunnerMessage {
        RunnerMessage::CaseStarting {
            owners: self.owners(),
            display_name: self.display_name.clone(),
        }
    }

    fn finished_message(&self, summary: &RunSummary) -> RunnerMessage {
        RunnerMessage::CaseFinished {
            owners: self.owners(),
            summary: *summary,
        }
    }

    fn cleanup_failure_message(&self, failure: &Failure) -> RunnerMessage {
        RunnerMessage::CaseCleanupFailure {
            owners: self.owners(),
            failure: FailureInfo::from(failure),
        }
    }

    async fn execute(
        &mut self,
        ctx: &RunContext,
        aggregator: &mut ExceptionAggregator,
    ) -> Result<RunSummary, StageError> {
        run_test(
            ctx,
            self.case.clone(),
            self.display_name.clone(),
            self.hooks.clone(),
            self.env.clone(),
            ExceptionAggregator::seeded(aggregator),
        )
        .await
    }
}
