//! Batch runner.
//!
//! Runs one job per asset, sequentially or on a bounded set of tasks, and
//! returns every job's outcome in input order. A failing job never stops
//! its siblings. Jobs that share an asset identity are serialized through a
//! [`LockTable`] scoped to the batch.

use std::future::Future;
use std::sync::Arc;

use futures::future::join_all;
use tokio::sync::Semaphore;
use tracing::{debug, info};

use vqrun_models::AssetDescriptor;

use crate::error::{WorkerError, WorkerResult};
use crate::lock_table::LockTable;

#[derive(Debug, Clone)]
pub struct ParallelRunner {
    parallelize: bool,
    max_parallel: usize,
}

impl Default for ParallelRunner {
    fn default() -> Self {
        Self::sequential()
    }
}

impl ParallelRunner {
    /// Run jobs one after another.
    pub fn sequential() -> Self {
        Self {
            parallelize: false,
            max_parallel: 1,
        }
    }

    /// Run up to `max_parallel` jobs at once.
    pub fn parallel(max_parallel: usize) -> Self {
        Self {
            parallelize: true,
            max_parallel: max_parallel.max(1),
        }
    }

    pub fn is_parallel(&self) -> bool {
        self.parallelize
    }

    pub fn max_parallel(&self) -> usize {
        self.max_parallel
    }

    /// Run `job` for every asset.
    ///
    /// Each job holds its asset's identity lock for its whole duration.
    pub async fn run_all<T, F, Fut>(
        &self,
        assets: Vec<AssetDescriptor>,
        job: F,
    ) -> Vec<WorkerResult<T>>
    where
        T: Send + 'static,
        F: Fn(AssetDescriptor) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = WorkerResult<T>> + Send + 'static,
    {
        let locks = Arc::new(LockTable::new());
        let job = Arc::new(job);

        if !self.parallelize {
            let mut outcomes = Vec::with_capacity(assets.len());
            for asset in assets {
                let guard = locks.acquire(&asset.identity()).await;
                outcomes.push(job(asset).await);
                locks.release(guard);
            }
            return outcomes;
        }

        info!(
            jobs = assets.len(),
            max_parallel = self.max_parallel,
            "Running batch in parallel"
        );

        let semaphore = Arc::new(Semaphore::new(self.max_parallel));
        let handles: Vec<_> = assets
            .into_iter()
            .map(|asset| {
                let locks = Arc::clone(&locks);
                let semaphore = Arc::clone(&semaphore);
                let job = Arc::clone(&job);

                tokio::spawn(async move {
                    // Identity first, so a blocked duplicate never holds a slot
                    let guard = locks.acquire(&asset.identity()).await;
                    let _permit = semaphore
                        .acquire_owned()
                        .await
                        .map_err(|_| WorkerError::job_failed("Semaphore closed"))?;

                    let outcome = job(asset).await;
                    locks.release(guard);
                    outcome
                })
            })
            .collect();

        let outcomes: Vec<WorkerResult<T>> = join_all(handles)
            .await
            .into_iter()
            .map(|joined| {
                joined.unwrap_or_else(|e| {
                    Err(WorkerError::job_failed(format!("job task failed: {}", e)))
                })
            })
            .collect();

        debug!(distinct_assets = locks.len(), "Batch finished");
        outcomes
    }
}
