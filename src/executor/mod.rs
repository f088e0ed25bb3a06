//! Parallel scheduling of test collections.
//!
//! Only the assembly level introduces concurrency; everything below a
//! collection runs serially on whichever worker picked the collection up.

pub(crate) mod pool;

use futures::future::join_all;
use std::sync::Arc;
use tokio::sync::Semaphore;
use tracing::{debug, error};

use crate::bus::BusError;
use crate::config::{ExecutionConfig, ParallelAlgorithm};
use crate::model::{RunSummary, TestCase, TestCollection};
use crate::runner::collection::run_collection;
use crate::runner::context::RunContext;
use crate::runner::stage::StageError;
use crate::runner::CollectionEnv;

/// One unit of schedulable work: a collection plus its cases
pub(crate) struct CollectionJob {
    pub collection: Arc<TestCollection>,
    pub cases: Vec<Arc<TestCase>>,
}

/// Selected partitioning policy
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum Partitioning {
    /// All collections serially on the caller's task
    Disabled,
    /// Shared executor, concurrently running collections capped
    Conservative { max_concurrent: usize },
    /// Fixed-size private pool of exactly N long-lived workers
    Aggressive { workers: usize },
}

impl Partitioning {
    pub fn from_config(config: &ExecutionConfig) -> Self {
        if config.disable_parallelization {
            return Partitioning::Disabled;
        }
        let threads = config.effective_parallel_threads().max(1);
        match config.parallel_algorithm {
            ParallelAlgorithm::Conservative => Partitioning::Conservative {
                max_concurrent: threads,
            },
            ParallelAlgorithm::Aggressive => Partitioning::Aggressive { workers: threads },
        }
    }
}

pub(crate) async fn run_collections(
    ctx: &RunContext,
    jobs: Vec<CollectionJob>,
    env: CollectionEnv,
    partitioning: Partitioning,
) -> Result<RunSummary, StageError> {
    debug!("scheduling {} collection(s) with {:?}", jobs.len(), partitioning);
    match partitioning {
        Partitioning::Disabled => run_serial(ctx, jobs, env).await,
        Partitioning::Conservative { max_concurrent } => {
            run_conservative(ctx, jobs, env, max_concurrent).await
        }
        Partitioning::Aggressive { workers } => {
            pool::run_with_fixed_pool(ctx, jobs, env, workers).await
        }
    }
}

async fn run_serial(
    ctx: &RunContext,
    jobs: Vec<CollectionJob>,
    env: CollectionEnv,
) -> Result<RunSummary, StageError> {
    let mut summary = RunSummary::default();
    for job in jobs {
        if ctx.is_cancelled() {
            break;
        }
        match run_collection(ctx.clone(), job.collection, job.cases, env.clone()).await {
            Ok(child) => summary.aggregate(&child),
            Err(error) => {
                summary.aggregate(&error.summary);
                return Err(StageError::new(summary, error.source));
            }
        }
    }
    Ok(summary)
}

async fn run_conservative(
    ctx: &RunContext,
    jobs: Vec<CollectionJob>,
    env: CollectionEnv,
    max_concurrent: usize,
) -> Result<RunSummary, StageError> {
    let semaphore = Arc::new(Semaphore::new(max_concurrent));
    let mut handles = Vec::with_capacity(jobs.len());

    for job in jobs {
        let semaphore = semaphore.clone();
        let ctx = ctx.clone();
        let env = env.clone();

        handles.push(tokio::spawn(async move {
            let _permit = semaphore.acquire().await.unwrap();
            // Not-yet-started collections are skipped entirely once
            // cancellation has been requested.
            if ctx.is_cancelled() {
                return Ok(RunSummary::default());
            }
            run_collection(ctx, job.collection, job.cases, env).await
        }));
    }

    let mut results = Vec::with_capacity(handles.len());
    for joined in join_all(handles).await {
        match joined {
            Ok(result) => results.push(result),
            Err(join_error) => error!("collection task aborted: {join_error}"),
        }
    }
    combine_outcomes(results)
}

/// Sum every worker's partial summary; the first bus failure, if any, wins.
pub(crate) fn combine_outcomes(
    results: Vec<Result<RunSummary, StageError>>,
) -> Result<RunSummary, StageError> {
    let mut summary = RunSummary::default();
    let mut first_error: Option<BusError> = None;

    for result in results {
        match result {
            Ok(child) => summary.aggregate(&child),
            Err(error) => {
                summary.aggregate(&error.summary);
                if first_error.is_none() {
                    first_error = Some(error.source);
                }
            }
        }
    }

    match first_error {
        None => Ok(summary),
        Some(source) => Err(StageError::new(summary, source)),
    }
}
