//! Method-level runner: serial execution of one method's cases.

use std::sync::Arc;

use crate::aggregator::ExceptionAggregator;
use crate::bus::{OwnerChain, RunnerMessage};
use crate::model::{Failure, FailureInfo, RunSummary, TestCase, TestMethod};
use crate::runner::case::run_case;
use crate::runner::context::RunContext;
use crate::runner::stage::{run_stage, Stage, StageError};
use crate::runner::TestEnv;

pub(crate) async fn run_method(
    ctx: &RunContext,
    method: Arc<TestMethod>,
    cases: Vec<Arc<TestCase>>,
    env: TestEnv,
    seed: ExceptionAggregator,
) -> Result<RunSummary, StageError> {
    let mut stage = MethodStage { method, cases, env };
    run_stage(ctx, &mut stage, seed).await
}

/// No fixture scope of its own; just the serial loop over cases
struct MethodStage {
    method: Arc<TestMethod>,
    cases: Vec<Arc<TestCase>>,
    env: TestEnv,
}

impl MethodStage {
    fn owners(&self) -> OwnerChain {
        OwnerChain::assembly(&self.method.class.collection.assembly.id)
            .collection(&self.method.class.collection.id)
            .class(&self.method.class.id)
            .method(&self.method.id)
    }
}

impl Stage for MethodStage {
    fn stage_name(&self) -> &'static str {
        "method"
    }

    fn unit_name(&self) -> String {
        format!("{}.{}", self.method.class.name, self.method.name)
    }

    fn starting_message(&self) -> RunnerMessage {
        RunnerMessage::MethodStarting {
            owners: self.owners(),
            method_name: self.method.name.clone(),
        }
    }

    fn finished_message(&self, summary: &RunSummary) -> RunnerMessage {
        RunnerMessage::MethodFinished {
            owners: self.owners(),
            summary: *summary,
        }
    }

    fn cleanup_failure_message(&self, failure: &Failure) -> RunnerMessage {
        RunnerMessage::MethodCleanupFailure {
            owners: self.owners(),
            failure: FailureInfo::from(failure),
        }
    }

    async fn execute(
        &mut self,
        ctx: &RunContext,
        aggregator: &mut ExceptionAggregator,
    ) -> Result<RunSummary, StageError> {
        let mut summary = RunSummary::default();
        for case in self.cases.clone() {
            if ctx.is_cancelled() {
                break;
            }
            match run_case(
                ctx,
                case,
                self.env.clone(),
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
}
