//! Bounded worker pool.
//!
//! Runs a batch of independent futures with at most `limit` in flight and
//! gathers every outcome, in submission order. Tasks are never cancelled:
//! once submitted, each runs to completion or individual failure.

use futures::future::join_all;
use std::future::Future;
use std::sync::Arc;
use tokio::sync::Semaphore;

/// Run `tasks` with at most `limit` executing concurrently, returning all
/// outputs in the order the tasks were submitted.
pub async fn run_bounded<F, T>(limit: usize, tasks: Vec<F>) -> Vec<T>
where
    F: Future<Output = T> + Send + 'static,
    T: Send + 'static,
{
    let semaphore = Arc::new(Semaphore::new(limit.max(1)));

    let handles: Vec<_> = tasks
        .into_iter()
        .map(|task| {
            let semaphore = Arc::clone(&semaphore);
            tokio::spawn(async move {
                // The semaphore is never closed, acquire cannot fail
                let _permit = semaphore.acquire_owned().await.expect("semaphore closed");
                task.await
            })
        })
        .collect();

    join_all(handles)
        .await
        .into_iter()
        .map(|joined| joined.expect("pool task panicked"))
        .collect()
}
