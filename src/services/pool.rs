use std::future::Future;
use std::sync::Arc;
use tokio::sync::{mpsc, Mutex};
use tracing::{debug, warn};

use crate::shutdown::Shutdown;

/// Runs `work` over `jobs` on a fixed number of workers and returns every result.
///
/// The job queue is filled and closed before the workers start pulling, and the
/// results channel closes once the last worker drops its sender. All worker tasks
/// are joined before this returns, including after cancellation, in which case
/// the results are partial. Completion order is unspecified.
pub async fn fan_out<J, R, F, Fut>(jobs: Vec<J>, workers: usize, shutdown: &Shutdown, work: F) -> Vec<R>
where
    J: Send + 'static,
    R: Send + 'static,
    F: Fn(J) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = R> + Send + 'static,
{
    if jobs.is_empty() {
        return Vec::new();
    }
    let total = jobs.len();
    let workers = workers.clamp(1, total);

    let (job_tx, job_rx) = mpsc::channel::<J>(total);
    for job in jobs {
        if job_tx.send(job).await.is_err() {
            break;
        }
    }
    drop(job_tx);

    let job_rx = Arc::new(Mutex::new(job_rx));
    let (result_tx, mut result_rx) = mpsc::channel::<R>(workers);
    let work = Arc::new(work);

    let mut handles = Vec::with_capacity(workers);
    for worker_id in 0..workers {
        let job_rx = Arc::clone(&job_rx);
        let result_tx = result_tx.clone();
        let work = Arc::clone(&work);
        let shutdown = shutdown.clone();

        handles.push(tokio::spawn(async move {
            loop {
                let job = {
                    let mut rx = job_rx.lock().await;
                    tokio::select! {
                        biased;
                        _ = shutdown.cancelled() => None,
                        job = rx.recv() => job,
                    }
                };
                let Some(job) = job else { break };

                let result = tokio::select! {
                    biased;
                    _ = shutdown.cancelled() => break,
                    result = work(job) => result,
                };
                if result_tx.send(result).await.is_err() {
                    break;
                }
            }
            debug!("[POOL] worker {} done", worker_id);
        }));
    }
    drop(result_tx);

    let mut results = Vec::with_capacity(total);
    while let Some(result) = result_rx.recv().await {
        results.push(result);
    }

    for handle in handles {
        if let Err(e) = handle.await {
            warn!("[POOL] worker task failed: {}", e);
        }
    }
    results
}
