//! # Strata Geometry
//!
//! In-plane geometry for periodically patterned layers. This crate provides:
//!
//! - **Lattices** ([`lattice`]): Real and reciprocal lattices for 1-D
//!   gratings and 2-D oblique lattices.
//! - **Harmonics** ([`harmonics`]): Truncated sets of reciprocal lattice
//!   vectors (circular or parallelogramic truncation).
//! - **Patterns** ([`pattern`]): Gratings, rectangles, circles, ellipses
//!   and polygons placed in a unit cell, with nesting.
//! - **Fourier factorisation** ([`fourier`]): Analytic indicator transforms
//!   and the permittivity matrices contributed by one inclusion.
//! - **Special functions** ([`special`]): `sinc` and the Bessel function
//!   J₁ used by the shape transforms.
//!
//! Lengths are in whatever unit the caller uses consistently; the solver
//! passes micrometres.

pub mod fourier;
pub mod harmonics;
pub mod lattice;
pub mod pattern;
pub mod special;

use thiserror::Error;

pub use fourier::{factorize, shape_coefficient, FourierMatrices};
pub use harmonics::{generate_harmonics, Harmonics, Truncation};
pub use lattice::{Lattice, Periodicity, ReciprocalLattice};
pub use pattern::{Pattern, Shape};

/// Errors from lattice, harmonic and pattern construction.
#[derive(Debug, Error)]
pub enum GeometryError {
    #[error("Invalid lattice: {0}")]
    InvalidLattice(String),

    #[error("Invalid pattern: {0}")]
    InvalidPattern(String),

    #[error("Unknown truncation '{0}' (expected Circular or Parallelogramic)")]
    UnknownTruncation(String),

    #[error("Value out of range: {0}")]
    OutOfRange(String),
}
