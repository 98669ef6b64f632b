//! Wavevector integration strategies.
//!
//! Every strategy reduces to the same primitive: make sure the solve cache
//! holds the frequency being integrated, then evaluate the flux kernel at a
//! normalised in-plane wavevector and scale it by $\omega / (2\pi^3 c)$.
//!
//! - [`integrate_grid`]: uniform (kx, ky) grid, frequencies in sequence,
//!   grid points on the compute backend.
//! - [`integrate_chunk`]: one contiguous slice of the flattened
//!   (ω, kx, ky) index space, for runs split across processes.
//! - [`integrate_k_parallel`]: radial quadrature for unpatterned stacks,
//!   frequencies on the compute backend.

pub mod quadrature;

use std::f64::consts::PI;

use log::{debug, info, warn};

use strata_compute::{chunk_range, ComputeBackend};

use crate::cache::{build_operators, SolveSetup, SolveState};
use crate::error::SimulationError;
use crate::flux::{FluxInput, FluxKernel};
use crate::modes::LayerOperators;
use crate::structure::{MaterialRegistry, Structure};
use crate::types::{Polarization, QuadratureRule, SimulationOptions, LENGTH_SCALE, SPEED_OF_LIGHT};

pub use quadrature::{adaptive_gauss_kronrod, GaussLegendre, QuadratureEstimate};

/// Uniform sampling of one in-plane wavevector axis.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AxisIntegral {
    pub points: usize,
    /// Upper bound; normalised by ω/c if `preset`, otherwise in 1/m.
    pub end: f64,
    /// True if the bound was given by the caller rather than derived from
    /// the reciprocal lattice.
    pub preset: bool,
    /// Integrate over [0, end] and double, instead of [−end, end].
    pub symmetric: bool,
}

impl AxisIntegral {
    pub fn new(points: usize, end: f64, preset: bool, symmetric: bool) -> Result<Self, SimulationError> {
        if points < 2 {
            return Err(SimulationError::OutOfRange(format!(
                "an integration axis needs at least 2 points, got {points}"
            )));
        }
        if !(end.is_finite() && end > 0.0) {
            return Err(SimulationError::OutOfRange(format!(
                "integration bound must be positive and finite, got {end}"
            )));
        }
        Ok(Self {
            points,
            end,
            preset,
            symmetric,
        })
    }

    pub fn start(&self) -> f64 {
        if self.symmetric {
            0.0
        } else {
            -self.end
        }
    }

    pub fn step(&self) -> f64 {
        (self.end - self.start()) / (self.points - 1) as f64
    }

    pub fn value(&self, i: usize) -> f64 {
        self.start() + i as f64 * self.step()
    }

    /// Divisor that normalises this axis by ω/c.
    pub fn scale(&self, omega: f64) -> f64 {
        if self.preset {
            1.0
        } else {
            omega / SPEED_OF_LIGHT
        }
    }
}

/// Radial integration bound for unpatterned stacks, normalised by ω/c.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct KParallelIntegral {
    pub end: f64,
}

impl KParallelIntegral {
    pub fn new(end: f64) -> Result<Self, SimulationError> {
        if !(end.is_finite() && end > 0.0) {
            return Err(SimulationError::OutOfRange(format!(
                "k-parallel bound must be positive and finite, got {end}"
            )));
        }
        Ok(Self { end })
    }
}

/// Everything needed to evaluate the scaled flux at one point.
#[derive(Clone, Copy)]
pub struct Evaluator<'a> {
    pub structure: &'a Structure,
    pub materials: &'a MaterialRegistry,
    pub setup: &'a SolveSetup,
    pub kernel: &'a dyn FluxKernel,
    pub polarization: Polarization,
    pub print_intermediate: bool,
}

impl<'a> Evaluator<'a> {
    /// Bring `state` to `omega_index`, rebuilding if needed, and confirm the
    /// kernel supports the operators.
    pub fn prepare(&self, state: &mut SolveState, omega_index: usize) -> Result<(), SimulationError> {
        self.setup.check_index(omega_index)?;
        state.ensure(omega_index, self.structure, self.materials, self.setup)?;
        self.kernel.check(&state.operators, &self.setup.harmonics)
    }

    /// `ω/(2π³c) · ξ(ω, kx, ky)` with (kx, ky) normalised by ω/c.
    pub fn flux(&self, operators: &[LayerOperators], omega_index: usize, kx: f64, ky: f64) -> f64 {
        let omega = self.setup.omega[omega_index];
        let k0 = omega / SPEED_OF_LIGHT;
        let input = FluxInput {
            k0: k0 / LENGTH_SCALE,
            thicknesses: &self.setup.thicknesses,
            kx,
            ky,
            operators,
            harmonics: &self.setup.harmonics,
            sources: &self.setup.sources,
            probe: self.setup.probe,
            polarization: self.polarization,
        };
        let value = k0 / PI.powi(3) / 2.0 * self.kernel.flux(&input);
        if self.print_intermediate {
            info!("omega = {omega:e}, kx = {kx:.6}, ky = {ky:.6}, flux = {value:e}");
        }
        value
    }

    /// Map grid coordinates to the normalised, sheared wavevector.
    fn sheared(&self, kx: f64, ky: f64, scale_x: f64, scale_y: f64) -> (f64, f64) {
        let tilt = (self.setup.reciprocal.angle_deg - 90.0).to_radians();
        (kx * tilt.cos() / scale_x, (ky - kx * tilt.sin()) / scale_y)
    }

    /// Jacobian and measure converting a grid sum into Φ.
    fn grid_weight(&self, omega: f64, kx: &AxisIntegral, ky: &AxisIntegral) -> f64 {
        let k0 = omega / SPEED_OF_LIGHT;
        let sin = self.setup.reciprocal.angle_deg.to_radians().sin().abs();
        symmetry_prefactor(kx, ky) * kx.step() / kx.scale(omega) * ky.step() / ky.scale(omega)
            * k0
            * k0
            * sin
    }
}

/// `2^(number of symmetric axes)`.
pub fn symmetry_prefactor(kx: &AxisIntegral, ky: &AxisIntegral) -> f64 {
    [kx, ky].iter().filter(|a| a.symmetric).fold(1.0, |p, _| p * 2.0)
}

/// Integrate over the full (kx, ky) grid for every frequency.
///
/// Each frequency's integral is added to `phi`.
pub fn integrate_grid(
    eval: &Evaluator<'_>,
    state: &mut SolveState,
    backend: &dyn ComputeBackend,
    kx: &AxisIntegral,
    ky: &AxisIntegral,
    phi: &mut [f64],
) -> Result<(), SimulationError> {
    let per_frequency = kx.points * ky.points;
    info!(
        "Integrating {} frequencies over a {}x{} grid on {}",
        eval.setup.frequency_count(),
        kx.points,
        ky.points,
        backend.device_info().name
    );

    for (omega_index, slot) in phi.iter_mut().enumerate().take(eval.setup.frequency_count()) {
        eval.prepare(state, omega_index)?;
        let omega = eval.setup.omega[omega_index];
        let (sx, sy) = (kx.scale(omega), ky.scale(omega));
        let operators = state.operators.as_slice();

        let values = backend.parallel_map(per_frequency, &|flat| {
            let (i, j) = (flat / ky.points, flat % ky.points);
            let (x, y) = eval.sheared(kx.value(i), ky.value(j), sx, sy);
            eval.flux(operators, omega_index, x, y)
        })?;

        let contribution = eval.grid_weight(omega, kx, ky) * values.iter().sum::<f64>();
        *slot += contribution;
        debug!("phi[{omega_index}] += {contribution:e}");
    }
    Ok(())
}

/// Integrate one contiguous slice of the flattened (ω, kx, ky) index space.
///
/// This rank's partial sums are added to `phi`; running every rank on the
/// same `phi` gives the full grid integral.
#[allow(clippy::too_many_arguments)]
pub fn integrate_chunk(
    eval: &Evaluator<'_>,
    state: &mut SolveState,
    backend: &dyn ComputeBackend,
    kx: &AxisIntegral,
    ky: &AxisIntegral,
    rank: usize,
    size: usize,
    phi: &mut [f64],
) -> Result<(), SimulationError> {
    let per_frequency = kx.points * ky.points;
    let total = eval.setup.frequency_count() * per_frequency;
    let range = chunk_range(total, rank, size)?;
    info!(
        "Rank {rank}/{size} integrating indices {}..{} of {total}",
        range.start, range.end
    );

    let mut cursor = range.start;
    while cursor < range.end {
        let omega_index = cursor / per_frequency;
        let block_end = ((omega_index + 1) * per_frequency).min(range.end);
        eval.prepare(state, omega_index)?;
        let omega = eval.setup.omega[omega_index];
        let (sx, sy) = (kx.scale(omega), ky.scale(omega));
        let operators = state.operators.as_slice();
        let offset = cursor - omega_index * per_frequency;

        let values = backend.parallel_map(block_end - cursor, &|local| {
            let flat = offset + local;
            let (i, j) = (flat / ky.points, flat % ky.points);
            let (x, y) = eval.sheared(kx.value(i), ky.value(j), sx, sy);
            eval.flux(operators, omega_index, x, y)
        })?;

        phi[omega_index] += eval.grid_weight(omega, kx, ky) * values.iter().sum::<f64>();
        cursor = block_end;
    }
    Ok(())
}

/// Radial integral `(ω/c)³/π² ∫₀^end k ξ(k, 0) dk` for every frequency.
///
/// Operators for all frequencies are built up front, then frequencies are
/// integrated concurrently. Results are added to `phi`.
pub fn integrate_k_parallel(
    eval: &Evaluator<'_>,
    backend: &dyn ComputeBackend,
    bound: &KParallelIntegral,
    options: &SimulationOptions,
    phi: &mut [f64],
) -> Result<(), SimulationError> {
    let count = eval.setup.frequency_count();
    let operators = (0..count)
        .map(|omega_index| {
            let (_, ops) = build_operators(eval.structure, eval.materials, eval.setup, omega_index)?;
            eval.kernel.check(&ops, &eval.setup.harmonics)?;
            Ok(ops)
        })
        .collect::<Result<Vec<_>, SimulationError>>()?;

    let rule = match options.quadrature {
        QuadratureRule::GaussLegendre { degree } => Some(GaussLegendre::new(degree)?),
        QuadratureRule::GaussKronrod => None,
    };
    info!(
        "Integrating {count} frequencies over k in [0, {}] with {:?}",
        bound.end, options.quadrature
    );

    let values = backend.parallel_map(count, &|omega_index| {
        let ops = operators[omega_index].as_slice();
        let integrand = |k: f64| k_parallel_integrand(eval, ops, omega_index, k);
        match &rule {
            Some(rule) => rule.integrate(integrand, 0.0, bound.end),
            None => {
                let est = adaptive_gauss_kronrod(
                    integrand,
                    0.0,
                    bound.end,
                    options.abs_tolerance,
                    options.rel_tolerance,
                    options.max_subdivisions,
                );
                if !est.converged {
                    warn!(
                        "k-parallel integral at frequency index {omega_index} did not converge \
                         ({} intervals, error estimate {:e})",
                        est.intervals, est.error
                    );
                }
                est.value
            }
        }
    })?;

    for (slot, value) in phi.iter_mut().zip(values) {
        *slot += value;
    }
    Ok(())
}

/// `(ω/c)³/π² · k · ξ(k, 0)`, the integrand of the radial integral.
pub fn k_parallel_integrand(
    eval: &Evaluator<'_>,
    operators: &[LayerOperators],
    omega_index: usize,
    k: f64,
) -> f64 {
    let k0 = eval.setup.omega[omega_index] / SPEED_OF_LIGHT;
    // Evaluator::flux already carries ω/(2π³c); lift to (ω/c)³/π².
    let xi_scaled = eval.flux(operators, omega_index, k, 0.0);
    2.0 * PI * k0 * k0 * k * xi_scaled
}
