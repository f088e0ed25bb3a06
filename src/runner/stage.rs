//! The shared state machine every runner level runs through.
//!
//! One driver, six specializations: instead of a tower of base classes, each
//! level implements [`Stage`] and [`run_stage`] walks the uniform lifecycle
//! (`Starting` message → starting hook → body → finishing hook →
//! `CleanupFailure`/`Finished` messages) with cancellation checked after
//! every bus operation.

use tracing::debug;

use crate::aggregator::ExceptionAggregator;
use crate::bus::{BusError, RunnerMessage};
use crate::model::{Failure, RunSummary};
use crate::runner::context::RunContext;

/// A bus failure that unwound a runner level, carrying whatever summary had
/// been aggregated before the unwind so completed work is not lost.
#[derive(Debug)]
pub(crate) struct StageError {
    pub summary: RunSummary,
    pub source: BusError,
}

impl StageError {
    pub fn new(summary: RunSummary, source: BusError) -> Self {
        Self { summary, source }
    }

    pub fn bare(source: BusError) -> Self {
        Self {
            summary: RunSummary::default(),
            source,
        }
    }
}

/// Level-specific callbacks plugged into the shared driver
pub(crate) trait Stage {
    fn stage_name(&self) -> &'static str;

    /// Display name of the unit this stage runs, for logs
    fn unit_name(&self) -> String;

    fn starting_message(&self) -> RunnerMessage;

    fn finished_message(&self, summary: &RunSummary) -> RunnerMessage;

    fn cleanup_failure_message(&self, failure: &Failure) -> RunnerMessage;

    /// Extensibility hook run right after the `Starting` message; skipped
    /// once cancellation has been observed. Failures go into `aggregator`.
    async fn on_starting(&mut self, ctx: &RunContext, aggregator: &mut ExceptionAggregator) {
        let _ = (ctx, aggregator);
    }

    /// The body: composite levels delegate to the next level per child
    /// group; the leaf invokes the test
    async fn execute(
        &mut self,
        ctx: &RunContext,
        aggregator: &mut ExceptionAggregator,
    ) -> Result<RunSummary, StageError>;

    /// Cleanup hook (fixture disposal); runs regardless of cancellation or
    /// body failure. Failures go into `aggregator` and surface as a
    /// `CleanupFailure` message.
    async fn on_finishing(&mut self, ctx: &RunContext, aggregator: &mut ExceptionAggregator) {
        let _ = (ctx, aggregator);
    }
}

/// Drive one stage through the uniform lifecycle.
///
/// The aggregator is owned by this level, seeded by the caller from the
/// parent's. Before the finishing hook it is cleared, so a `CleanupFailure`
/// message can never contain carried-over starting-phase failures.
pub(crate) async fn run_stage<S: Stage>(
    ctx: &RunContext,
    stage: &mut S,
    mut aggregator: ExceptionAggregator,
) -> Result<RunSummary, StageError> {
    debug!("{} starting: {}", stage.stage_name(), stage.unit_name());

    // A failed or refused Starting message aborts the whole unit: no body,
    // no Finished message.
    if !ctx.queue(stage.starting_message()).map_err(StageError::bare)? {
        return Ok(RunSummary::default());
    }

    if !ctx.is_cancelled() {
        stage.on_starting(ctx, &mut aggregator).await;
    }

    let mut summary = RunSummary::default();
    let mut abort: Option<BusError> = None;

    match stage.execute(ctx, &mut aggregator).await {
        Ok(child) => summary.aggregate(&child),
        Err(error) => {
            summary.aggregate(&error.summary);
            abort = Some(error.source);
        }
    }

    aggregator.clear();
    stage.on_finishing(ctx, &mut aggregator).await;

    if let Some(source) = abort {
        // The bus is already poisoned; resources were still released above.
        return Err(StageError::new(summary, source));
    }

    if let Some(failure) = aggregator.to_failure() {
        if aggregator.had_prior_failures() {
            debug!(
                "{} cleanup failure for {} reported without carried-over starting failures",
                stage.stage_name(),
                stage.unit_name()
            );
        }
        ctx.queue(stage.cleanup_failure_message(&failure))
            .map_err(|error| StageError::new(summary, error))?;
    }

    ctx.queue(stage.finished_message(&summary))
        .map_err(|error| StageError::new(summary, error))?;

    debug!(
        "{} finished: {} ({} tests, {} failed)",
        stage.stage_name(),
        stage.unit_name(),
        summary.total,
        summary.failed
    );
    Ok(summary)
}
