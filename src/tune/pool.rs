//! Explicit worker pool for tuning sweeps.
//!
//! Tuning never touches the global rayon pool: callers build a
//! [`WorkerPool`], run the sweep inside [`WorkerPool::install`], and the
//! workers are joined when the pool is dropped.

use rayon::{ThreadPool, ThreadPoolBuilder};
use tracing::debug;

use crate::error::{Result, TreetuneError};

pub struct WorkerPool {
    pool: ThreadPool,
    workers: usize,
}

impl WorkerPool {
    /// Pool with `workers` threads. Zero means one per available core.
    pub fn new(workers: usize) -> Result<Self> {
        let workers = if workers == 0 {
            std::thread::available_parallelism()
                .map(|n| n.get())
                .unwrap_or(1)
        } else {
            workers
        };
        let pool = ThreadPoolBuilder::new()
            .num_threads(workers)
            .thread_name(|idx| format!("treetune-worker-{}", idx))
            .build()
            .map_err(|e| TreetuneError::ThreadPoolError(e.to_string()))?;
        debug!(workers, "worker pool ready");
        Ok(Self { pool, workers })
    }

    pub fn workers(&self) -> usize {
        self.workers
    }

    /// Run `op` with this pool as the ambient rayon pool. Parallel iterators
    /// inside `op` (including nested tree growth) are scheduled here and
    /// nowhere else; the call returns once all spawned work has finished.
    pub fn install<OP, R>(&self, op: OP) -> R
    where
        OP: FnOnce() -> R + Send,
        R: Send,
    {
        self.pool.install(op)
    }
}

impl std::fmt::Debug for WorkerPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WorkerPool")
            .field("workers", &self.workers)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rayon::prelude::*;

    #[test]
    fn test_work_runs_on_requested_threads() {
        let pool = WorkerPool::new(3).unwrap();
        assert_eq!(pool.workers(), 3);

        let inside = pool.install(rayon::current_num_threads);
        assert_eq!(inside, 3);
    }

    #[test]
    fn test_pool_is_reusable() {
        let pool = WorkerPool::new(2).unwrap();
        let first: i64 = pool.install(|| (0..100).into_par_iter().map(i64::from).sum());
        let second: i64 = pool.install(|| (0..100).into_par_iter().map(i64::from).sum());
        assert_eq!(first, 4950);
        assert_eq!(first, second);
    }

    #[test]
    fn test_zero_workers_uses_all_cores() {
        let pool = WorkerPool::new(0).unwrap();
        assert!(pool.workers() >= 1);
    }
}
