//! Core types shared across the Strata solver.
//!
//! Physical constants, solver options, and the result containers returned
//! by [`Simulation`](crate::simulation::Simulation).

use num_complex::Complex64;
use serde::{Deserialize, Serialize};

use strata_geometry::Truncation;

/// Speed of light in vacuum (m/s).
pub const SPEED_OF_LIGHT: f64 = 299_792_458.0;

/// Internal length unit per metre (lengths are handled in micrometres).
pub const LENGTH_SCALE: f64 = 1e6;

/// Default Gauss–Legendre degree for k-parallel integration.
pub const DEFAULT_QUADRATURE_DEGREE: usize = 1024;

/// Which polarizations contribute to the flux.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Polarization {
    #[default]
    #[serde(alias = "Both")]
    Both,
    /// Transverse electric (s) only.
    TE,
    /// Transverse magnetic (p) only.
    TM,
}

/// Rule used for the k-parallel integral of planar stacks.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum QuadratureRule {
    /// Fixed-degree Gauss–Legendre.
    GaussLegendre { degree: usize },
    /// Adaptive 7/15-point Gauss–Kronrod.
    GaussKronrod,
}

impl Default for QuadratureRule {
    fn default() -> Self {
        QuadratureRule::GaussLegendre {
            degree: DEFAULT_QUADRATURE_DEGREE,
        }
    }
}

/// Solver options.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SimulationOptions {
    pub polarization: Polarization,
    pub truncation: Truncation,
    pub quadrature: QuadratureRule,
    /// Log every evaluated (ω, kx, ky) point at info level.
    pub print_intermediate: bool,
    /// Absolute tolerance of the adaptive quadrature.
    pub abs_tolerance: f64,
    /// Relative tolerance of the adaptive quadrature.
    pub rel_tolerance: f64,
    /// Interval budget of the adaptive quadrature.
    pub max_subdivisions: usize,
}

impl Default for SimulationOptions {
    fn default() -> Self {
        Self {
            polarization: Polarization::Both,
            truncation: Truncation::Circular,
            quadrature: QuadratureRule::default(),
            print_intermediate: false,
            abs_tolerance: 1e-10,
            rel_tolerance: 1e-6,
            max_subdivisions: 2000,
        }
    }
}

/// Accumulated flux per frequency sample.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FluxSpectrum {
    /// Angular frequencies (rad/s).
    pub omega: Vec<f64>,
    /// Spectral flux Φ(ω).
    pub phi: Vec<f64>,
}

/// Reconstructed permittivity tensor at a point, in the file sign convention
/// (a lossy medium has a positive imaginary part).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct EpsilonSample {
    pub xx: Complex64,
    pub xy: Complex64,
    pub yx: Complex64,
    pub yy: Complex64,
    pub zz: Complex64,
}

impl EpsilonSample {
    /// Flat `[re xx, im xx, re xy, im xy, re yx, im yx, re yy, im yy, re zz, im zz]`.
    pub fn to_array(&self) -> [f64; 10] {
        [
            self.xx.re, self.xx.im,
            self.xy.re, self.xy.im,
            self.yx.re, self.yx.im,
            self.yy.re, self.yy.im,
            self.zz.re, self.zz.im,
        ]
    }
}

/// One point of a sampled layer cross-section.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RealizationPoint {
    /// In-plane position (m).
    pub x: f64,
    pub y: f64,
    pub epsilon: EpsilonSample,
}
