//! Rayon thread pool configuration for simulation sweeps.
//!
//! Use [WorkerPool::install] to run a sweep with a fixed number of threads, or rely on
//! Rayon's global pool (all CPU cores).

use rayon::ThreadPoolBuilder;
use tracing::warn;

/// How many worker threads a simulation uses.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WorkerPool {
    /// Number of worker threads. If 0, use the Rayon default (one per core).
    pub workers: usize,
}

impl WorkerPool {
    /// Use exactly `n` worker threads; 0 means the Rayon default.
    pub fn with_workers(n: usize) -> Self {
        Self { workers: n }
    }

    /// Run `f` on a pool with this worker count. With 0 workers, or if a dedicated pool cannot
    /// be built, `f` runs against the global Rayon pool.
    pub fn install<F, R>(&self, f: F) -> R
    where
        F: FnOnce() -> R + Send,
        R: Send,
    {
        if self.workers == 0 {
            return f();
        }
        match ThreadPoolBuilder::new().num_threads(self.workers).build() {
            Ok(pool) => pool.install(f),
            Err(err) => {
                warn!(
                    workers = self.workers,
                    error = %err,
                    "falling back to the global thread pool"
                );
                f()
            }
        }
    }
}
