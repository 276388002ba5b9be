use std::sync::Arc;
use tokio::sync::{Semaphore, broadcast, mpsc};
use tokio::task::JoinSet;
use tracing::info;

use crate::services::indexing::{IndexerContext, QueuedJob, run_job};

/// Background worker pool that drives indexing jobs.
///
/// Jobs arrive over the submission channel; at most
/// `indexing.max_concurrent_jobs` run at once, across all tenants. On
/// shutdown the queue is abandoned but running jobs are drained to a
/// terminal state.
pub async fn indexing_worker(
    ctx: IndexerContext,
    mut job_rx: mpsc::Receiver<QueuedJob>,
    mut shutdown_rx: broadcast::Receiver<()>,
) {
    let max_jobs = ctx.config.indexing.max_concurrent_jobs.max(1);
    let semaphore = Arc::new(Semaphore::new(max_jobs));
    let mut running = JoinSet::new();

    info!(max_jobs, "indexing worker started");

    loop {
        tokio::select! {
            _ = shutdown_rx.recv() => {
                info!("indexing worker shutting down");
                break;
            }
            queued = job_rx.recv() => {
                let Some(job) = queued else {
                    info!("indexing submission channel closed");
                    break;
                };

                let permit = match semaphore.clone().acquire_owned().await {
                    Ok(permit) => permit,
                    Err(_) => break,
                };

                let ctx = ctx.clone();
                running.spawn(async move {
                    run_job(&ctx, job).await;
                    drop(permit);
                });
            }
        }
    }

    // Drain running jobs so none is left without a terminal status.
    while running.join_next().await.is_some() {}

    info!("indexing worker stopped");
}
