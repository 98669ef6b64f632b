//! CPU compute backend using Rayon for shared-memory parallelism.

use log::warn;
use rayon::prelude::*;

use crate::backend::{BackendType, ComputeBackend, ComputeError, DeviceInfo};

/// CPU backend that parallelises work across threads via Rayon.
///
/// [`CpuBackend::new`] runs on the global Rayon pool; a backend built with
/// [`CpuBackend::with_threads`] owns a dedicated pool of that size.
pub struct CpuBackend {
    num_threads: usize,
    pool: Option<rayon::ThreadPool>,
}

impl CpuBackend {
    /// Create a new CPU backend using all available threads.
    pub fn new() -> Self {
        Self {
            num_threads: rayon::current_num_threads(),
            pool: None,
        }
    }

    /// Create a CPU backend with a dedicated pool of `num_threads` workers.
    ///
    /// Requests above the hardware parallelism are capped.
    pub fn with_threads(num_threads: usize) -> Result<Self, ComputeError> {
        if num_threads == 0 {
            return Err(ComputeError::InvalidThreads(
                "number of threads must be at least 1".into(),
            ));
        }
        let available = rayon::current_num_threads();
        let threads = if num_threads > available {
            warn!(
                "Requested {} threads but only {} are available; using {}",
                num_threads, available, available
            );
            available
        } else {
            num_threads
        };
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(threads)
            .build()
            .map_err(|e| ComputeError::ThreadPool(e.to_string()))?;
        Ok(Self {
            num_threads: threads,
            pool: Some(pool),
        })
    }

    pub fn num_threads(&self) -> usize {
        self.num_threads
    }
}

impl Default for CpuBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl ComputeBackend for CpuBackend {
    fn device_info(&self) -> DeviceInfo {
        DeviceInfo {
            name: format!("CPU ({} threads)", self.num_threads),
            backend_type: BackendType::Cpu,
            compute_units: Some(self.num_threads),
        }
    }

    fn parallel_map(
        &self,
        len: usize,
        task: &(dyn Fn(usize) -> f64 + Send + Sync),
    ) -> Result<Vec<f64>, ComputeError> {
        let run = || (0..len).into_par_iter().map(task).collect::<Vec<f64>>();
        Ok(match &self.pool {
            Some(pool) => pool.install(run),
            None => run(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parallel_map_matches_serial() {
        let backend = CpuBackend::with_threads(2).unwrap();
        let out = backend.parallel_map(1000, &|i| (i as f64).sqrt()).unwrap();
        assert_eq!(out.len(), 1000);
        for (i, v) in out.iter().enumerate() {
            assert_eq!(*v, (i as f64).sqrt());
        }
    }

    #[test]
    fn test_zero_threads_rejected() {
        assert!(matches!(
            CpuBackend::with_threads(0),
            Err(ComputeError::InvalidThreads(_))
        ));
    }

    #[test]
    fn test_thread_count_capped() {
        let backend = CpuBackend::with_threads(usize::MAX / 2).unwrap();
        assert!(backend.num_threads() <= rayon::current_num_threads());
        assert_eq!(backend.device_info().backend_type, BackendType::Cpu);
    }
}
