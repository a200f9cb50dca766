use rayon::prelude::*;
use thiserror::Error;

/// Errors that can occur during parallel execution.
#[derive(Error, Debug, PartialEq)]
pub enum ParallelError {
    /// The thread pool failed to build.
    #[error("failed to build thread pool: {0}")]
    BuildError(String),

    /// The requested thread count is invalid.
    #[error("thread count must be > 0, got {0}")]
    InvalidThreadCount(usize),
}

/// Controls how parallel operations are executed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ExecutionStrategy {
    /// Use the global Rayon thread pool to process every element in parallel.
    #[default]
    ParallelElements,

    /// Run sequentially on the current thread.
    ///
    /// Useful for small inputs, debugging, or when the overhead of parallelization
    /// outweighs the benefits.
    Serial,

    /// Run on a local thread pool with `n` threads.
    ///
    /// # Warning
    /// Creates a new thread pool on every call, which has significant overhead.
    /// Use this primarily for benchmarking or specific isolation needs.
    Fixed(usize),
}

/// Trait to map the elements of a slice with a given strategy.
pub trait ExecuteExt<T> {
    /// Map every element of the slice, preserving the input order.
    ///
    /// # Arguments
    ///
    /// * `strategy` - The execution strategy.
    /// * `op` - The operation to apply to each element.
    ///
    /// # Returns
    ///
    /// The mapped values in input order, or an error if the thread pool could not be built.
    fn map_with<U, F>(&self, strategy: ExecutionStrategy, op: F) -> Result<Vec<U>, ParallelError>
    where
        U: Send,
        F: Fn(&T) -> U + Sync + Send;
}

impl<T: Sync> ExecuteExt<T> for &[T] {
    fn map_with<U, F>(&self, strategy: ExecutionStrategy, op: F) -> Result<Vec<U>, ParallelError>
    where
        U: Send,
        F: Fn(&T) -> U + Sync + Send,
    {
        match strategy {
            ExecutionStrategy::Serial => Ok(self.iter().map(op).collect()),
            ExecutionStrategy::ParallelElements => Ok(self.par_iter().map(op).collect()),
            ExecutionStrategy::Fixed(n) => {
                if n == 0 {
                    return Err(ParallelError::InvalidThreadCount(n));
                }
                let pool = rayon::ThreadPoolBuilder::new()
                    .num_threads(n)
                    .build()
                    .map_err(|e| ParallelError::BuildError(e.to_string()))?;

                Ok(pool.install(|| self.par_iter().map(op).collect()))
            }
        }
    }
}
