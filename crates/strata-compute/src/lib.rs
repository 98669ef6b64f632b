//! # Strata Compute
//!
//! Execution backends for the Strata solver. The physics code in
//! `strata-core` evaluates independent k-space points through the
//! [`ComputeBackend`](backend::ComputeBackend) trait and never touches a
//! thread pool directly.
//!
//! ## Available backends
//!
//! | Backend | Feature flag | Use |
//! |---------|-------------|-----|
//! | CPU (Rayon) | `cpu` (default) | Shared-memory fork-join |
//! | Serial | always | Single-threaded reference |
//!
//! [`distributed`] partitions a flat index space into contiguous chunks so
//! that independent processes (for example MPI ranks) can each integrate a
//! share of the work.

pub mod backend;
pub mod distributed;

#[cfg(feature = "cpu")]
pub mod cpu;

pub use backend::{BackendType, ComputeBackend, ComputeError, DeviceInfo, SerialBackend};
pub use distributed::chunk_range;

#[cfg(feature = "cpu")]
pub use cpu::CpuBackend;
