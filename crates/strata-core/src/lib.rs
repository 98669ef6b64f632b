//! # Strata Core
//!
//! Near-field thermal radiation between layered, periodically patterned
//! structures, computed with the Fourier modal method and fluctuational
//! electrodynamics.
//!
//! ## Architecture
//!
//! A [`simulation::Simulation`] holds the materials, the layer stack and the
//! lattice. For each frequency the per-layer Fourier permittivity matrices
//! ([`fmm`]) and the derived operators ([`modes`]) are built once into a
//! [`cache::SolveState`]; a [`flux::FluxKernel`] turns them into the flux
//! transfer function at a given in-plane wavevector, and [`integrate`]
//! accumulates the spectral flux Φ(ω) on a
//! [`ComputeBackend`](strata_compute::ComputeBackend).
//!
//! ## Modules
//!
//! - [`types`]: Constants, options and result containers.
//! - [`error`]: The solver's error taxonomy.
//! - [`structure`]: Material and layer registries.
//! - [`fmm`]: Per-layer Fourier matrices and the εzz inverse.
//! - [`modes`]: Operator assembly.
//! - [`cache`]: Per-frequency solve cache.
//! - [`flux`]: Flux kernels.
//! - [`integrate`]: Grid, chunked and k-parallel integration.
//! - [`simulation`]: The public orchestrator.

pub mod cache;
pub mod error;
pub mod flux;
pub mod fmm;
pub mod integrate;
pub mod modes;
pub mod simulation;
pub mod structure;
pub mod types;

pub use error::SimulationError;
pub use flux::{FluxInput, FluxKernel, PlanarFluxKernel};
pub use simulation::Simulation;
pub use types::{
    EpsilonSample, FluxSpectrum, Polarization, QuadratureRule, RealizationPoint,
    SimulationOptions, LENGTH_SCALE, SPEED_OF_LIGHT,
};

pub use strata_geometry::{Periodicity, Truncation};
pub use strata_materials::Permittivity;
