//! Compute backend trait and device abstraction.
//!
//! The [`ComputeBackend`] trait abstracts over execution environments so that
//! the integrators in `strata-core` remain device-agnostic.

use thiserror::Error;

/// Errors originating from compute backends.
#[derive(Debug, Error)]
pub enum ComputeError {
    #[error("Backend not available: {0}")]
    Unavailable(String),

    #[error("Invalid thread count: {0}")]
    InvalidThreads(String),

    #[error("Thread pool error: {0}")]
    ThreadPool(String),

    #[error("Invalid partition: {0}")]
    Partition(String),
}

/// Describes the capabilities of a compute backend.
#[derive(Debug, Clone)]
pub struct DeviceInfo {
    pub name: String,
    pub backend_type: BackendType,
    pub compute_units: Option<usize>,
}

/// The type of compute backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackendType {
    Cpu,
    Serial,
}

/// Abstraction over compute backends.
///
/// Implementations evaluate a batch of independent tasks and return their
/// results in index order. Each task writes only its own output slot, so no
/// synchronisation is needed beyond the join at the end of the batch.
pub trait ComputeBackend: Send + Sync {
    /// Return information about the device.
    fn device_info(&self) -> DeviceInfo;

    /// Evaluate `task(i)` for every `i` in `0..len`.
    ///
    /// This is the fork-join primitive behind grid integration: each task is
    /// one (kx, ky) point at a fixed frequency.
    fn parallel_map(
        &self,
        len: usize,
        task: &(dyn Fn(usize) -> f64 + Send + Sync),
    ) -> Result<Vec<f64>, ComputeError>;
}

/// Single-threaded backend.
#[derive(Debug, Clone, Copy, Default)]
pub struct SerialBackend;

impl ComputeBackend for SerialBackend {
    fn device_info(&self) -> DeviceInfo {
        DeviceInfo {
            name: "Serial".into(),
            backend_type: BackendType::Serial,
            compute_units: Some(1),
        }
    }

    fn parallel_map(
        &self,
        len: usize,
        task: &(dyn Fn(usize) -> f64 + Send + Sync),
    ) -> Result<Vec<f64>, ComputeError> {
        Ok((0..len).map(task).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_serial_preserves_order() {
        let out = SerialBackend.parallel_map(5, &|i| (i * i) as f64).unwrap();
        assert_eq!(out, vec![0.0, 1.0, 4.0, 9.0, 16.0]);
        assert_eq!(SerialBackend.device_info().backend_type, BackendType::Serial);
    }
}
