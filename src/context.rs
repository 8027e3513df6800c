use crate::errors::Result;
use rayon::{ThreadPool, ThreadPoolBuilder};

/// Scoped compute resources of a selection run.
///
/// Holds a dedicated rayon thread pool when a thread count is requested, otherwise
/// work goes to the global pool. The pool is released when the context is dropped.
#[derive(Debug)]
pub struct ComputeContext {
    pool: Option<ThreadPool>,
}

impl ComputeContext {
    /// Acquire a context, with a dedicated pool of `n_threads` workers if given
    pub fn new(n_threads: Option<usize>) -> Result<Self> {
        let pool = match n_threads {
            Some(n) => Some(ThreadPoolBuilder::new().num_threads(n).build()?),
            None => None,
        };
        Ok(ComputeContext { pool })
    }

    /// Number of worker threads available to data-parallel batches
    pub fn n_threads(&self) -> usize {
        match &self.pool {
            Some(pool) => pool.current_num_threads(),
            None => rayon::current_num_threads(),
        }
    }

    /// Run `op` so that parallel work inside it executes on this context's workers
    pub fn install<R, OP>(&self, op: OP) -> R
    where
        R: Send,
        OP: FnOnce() -> R + Send,
    {
        match &self.pool {
            Some(pool) => pool.install(op),
            None => op(),
        }
    }
}
