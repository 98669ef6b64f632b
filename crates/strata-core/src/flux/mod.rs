//! Flux kernels.
//!
//! A [`FluxKernel`] turns one frequency's per-layer operators and one
//! in-plane wavevector into the net power flux that the fluctuating sources
//! of the source layer deliver through the lower boundary of the probe
//! layer. The integrators only ever see this trait.
//!
//! ## Modules
//!
//! - [`planar`]: Single-harmonic kernel for unpatterned and
//!   effective-medium stacks.

pub mod planar;

pub use planar::PlanarFluxKernel;

use strata_geometry::Harmonics;

use crate::error::SimulationError;
use crate::modes::LayerOperators;
use crate::types::Polarization;

/// Everything a kernel needs for one (ω, kx, ky) evaluation.
#[derive(Debug, Clone, Copy)]
pub struct FluxInput<'a> {
    /// Free-space wavenumber ω/c in internal units (1/µm).
    pub k0: f64,
    /// Layer thicknesses in internal units; outermost layers are zero.
    pub thicknesses: &'a [f64],
    /// In-plane wavevector normalised by `k0`.
    pub kx: f64,
    pub ky: f64,
    pub operators: &'a [LayerOperators],
    pub harmonics: &'a Harmonics,
    pub sources: &'a [bool],
    pub probe: usize,
    pub polarization: Polarization,
}

/// Evaluates the flux transfer function ξ(ω, kx, ky).
///
/// Implementations must be pure functions of their input: the integrators
/// call [`flux`](FluxKernel::flux) concurrently from worker threads.
pub trait FluxKernel: Send + Sync {
    /// Human-readable name of the kernel.
    fn name(&self) -> &str;

    /// Reject operator sets the kernel cannot handle.
    ///
    /// Called once after every per-frequency rebuild, before any parallel
    /// evaluation.
    fn check(
        &self,
        operators: &[LayerOperators],
        harmonics: &Harmonics,
    ) -> Result<(), SimulationError> {
        let _ = (operators, harmonics);
        Ok(())
    }

    /// Dimensionless flux transfer function at one wavevector.
    fn flux(&self, input: &FluxInput<'_>) -> f64;
}
