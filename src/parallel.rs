//! Parallel processing configuration and management
//!
//! Statistics are evaluated row by row on Rayon's global thread pool. This
//! module configures that pool and reports what it ended up with.

use crate::errors::{EnsembleError, Result};
use rayon::ThreadPoolBuilder;

/// Configuration for parallel processing
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ParallelConfig {
    pub num_threads: Option<usize>,
}

impl ParallelConfig {
    /// Create a new parallel configuration
    #[must_use]
    pub const fn new(num_threads: Option<usize>) -> Self {
        Self { num_threads }
    }

    /// Set up the global Rayon thread pool with the specified configuration
    ///
    /// # Errors
    ///
    /// Returns an error if the thread count is zero or the global pool was
    /// already initialized.
    pub fn setup_global_pool(&self) -> Result<()> {
        match self.num_threads {
            Some(0) => {
                return Err(EnsembleError::ThreadPool(
                    "thread count must be at least 1".to_string(),
                ))
            }
            Some(num_threads) => {
                ThreadPoolBuilder::new()
                    .num_threads(num_threads)
                    .build_global()
                    .map_err(|e| {
                        EnsembleError::ThreadPool(format!(
                            "failed to initialize thread pool with {num_threads} threads: {e}"
                        ))
                    })?;
                tracing::info!(threads = num_threads, "configured parallel processing");
            }
            None => tracing::debug!("using default thread pool configuration"),
        }
        Ok(())
    }

    /// Get the current number of threads being used
    #[must_use]
    pub fn current_threads(&self) -> usize {
        rayon::current_num_threads()
    }

    /// Create a configuration that uses all available CPU cores
    #[must_use]
    pub fn all_cores() -> Self {
        Self {
            num_threads: Some(num_cpus::get()),
        }
    }

    /// Create a configuration that uses a specific number of threads
    #[must_use]
    pub const fn with_threads(num_threads: usize) -> Self {
        Self {
            num_threads: Some(num_threads),
        }
    }
}

/// Get information about the current parallel configuration
#[must_use]
pub fn get_parallel_info() -> ParallelInfo {
    ParallelInfo {
        current_threads: rayon::current_num_threads(),
        available_cores: num_cpus::get(),
        available_parallelism: std::thread::available_parallelism()
            .map(std::num::NonZeroUsize::get)
            .unwrap_or(1),
    }
}

/// Information about the parallel processing environment
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParallelInfo {
    pub current_threads: usize,
    pub available_cores: usize,
    pub available_parallelism: usize,
}

impl ParallelInfo {
    /// Log parallel processing information at debug level
    pub fn log(&self) {
        tracing::debug!(
            current_threads = self.current_threads,
            available_cores = self.available_cores,
            available_parallelism = self.available_parallelism,
            "parallel processing information"
        );
    }
}
