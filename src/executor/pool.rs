//! Fixed-size worker pool for the aggressive partitioning algorithm.
//!
//! Exactly N long-lived workers pull collections from a shared channel, so
//! at most N collections are ever in flight no matter how many logical
//! collections exist. A single-worker pool degenerates to deterministic
//! serial execution, which the tests rely on.

use futures::future::join_all;
use std::sync::Arc;
use tokio::sync::{mpsc, Mutex};
use tracing::{debug, error};

use crate::executor::{combine_outcomes, CollectionJob};
use crate::model::RunSummary;
use crate::runner::collection::run_collection;
use crate::runner::context::RunContext;
use crate::runner::stage::StageError;
use crate::runner::CollectionEnv;

pub(crate) async fn run_with_fixed_pool(
    ctx: &RunContext,
    jobs: Vec<CollectionJob>,
    env: CollectionEnv,
    workers: usize,
) -> Result<RunSummary, StageError> {
    let workers = workers.max(1);

    // The queue is filled up front and closed, so a worker holding the
    // receiver lock never waits on a producer.
    let (tx, rx) = mpsc::unbounded_channel::<CollectionJob>();
    for job in jobs {
        let _ = tx.send(job);
    }
    drop(tx);
    let rx = Arc::new(Mutex::new(rx));

    let handles: Vec<_> = (0..workers)
        .map(|worker| {
            let rx = rx.clone();
            let ctx = ctx.clone();
            let env = env.clone();

            tokio::spawn(async move {
                let mut outcomes = Vec::new();
                loop {
                    let job = { rx.lock().await.recv().await };
                    let Some(job) = job else { break };

                    // Drain remaining jobs without starting them once
                    // cancellation has been requested.
                    if ctx.is_cancelled() {
                        continue;
                    }

                    debug!(
                        "worker {worker} running collection {}",
                        job.collection.display_name
                    );
                    outcomes
                        .push(run_collection(ctx.clone(), job.collection, job.cases, env.clone()).await);
                }
                outcomes
            })
        })
        .collect();

    let mut results = Vec::new();
    for joined in join_all(handles).await {
        match joined {
            Ok(outcomes) => results.extend(outcomes),
            Err(join_error) => error!("pooled worker aborted: {join_error}"),
        }
    }
    combine_outcomes(results)
}
