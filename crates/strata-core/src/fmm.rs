//! Per-layer Fourier permittivity matrices.
//!
//! For each layer the builder folds every inclusion into the five
//! permittivity Fourier matrices, adds the background as a scaled identity,
//! and inverts $[\varepsilon_{zz}]$. The normal component enters the mode
//! equations through its exact matrix inverse (the inverse rule), so the
//! inversion is a dense LU solve rather than an elementwise reciprocal.

use faer::complex_native::c64;
use faer::prelude::SolverCore;
use ndarray::Array2;
use num_complex::Complex64;

use strata_geometry::{factorize, FourierMatrices, Harmonics};
use strata_materials::EpsilonTensor;

use crate::error::SimulationError;
use crate::structure::{Layer, MaterialRegistry};
use crate::types::LENGTH_SCALE;

/// Fourier matrices of one layer at one frequency.
#[derive(Debug, Clone, PartialEq)]
pub struct LayerMatrices {
    pub fourier: FourierMatrices,
    /// Exact inverse of `fourier.eps_zz`.
    pub eps_zz_inv: Array2<Complex64>,
}

/// Build the Fourier matrices of `layer` at frequency index `omega_index`.
///
/// `harmonics` and `area` are in internal units; pattern geometry is
/// rescaled from metres before factorisation.
pub fn build_layer_matrices(
    layer: &Layer,
    materials: &MaterialRegistry,
    omega_index: usize,
    harmonics: &Harmonics,
    area: f64,
) -> Result<LayerMatrices, SimulationError> {
    let tensor_of = |id: usize| -> Result<EpsilonTensor, SimulationError> {
        let material = materials.get(id).ok_or_else(|| {
            SimulationError::OutOfRange(format!("material id {id} is not registered"))
        })?;
        material
            .at(omega_index)
            .map(|p| p.to_tensor())
            .ok_or_else(|| {
                SimulationError::OutOfRange(format!(
                    "frequency index {omega_index} is out of range for material '{}'",
                    material.name()
                ))
            })
    };

    let background = tensor_of(layer.background)?;
    let mut fourier = FourierMatrices::zeros(harmonics.len());

    for (i, pattern) in layer.patterns.iter().enumerate() {
        let host = match pattern.parent {
            None => background,
            Some(p) if p < i => tensor_of(layer.patterns[p].material)?,
            Some(p) => {
                return Err(SimulationError::OutOfRange(format!(
                    "pattern {i} of layer '{}' has parent {p}, which is not an earlier pattern",
                    layer.name
                )))
            }
        };
        let inclusion = tensor_of(pattern.material)?;
        let shape = pattern.shape.scaled(LENGTH_SCALE);
        let contribution = factorize(&shape, &inclusion, &host, layer.anisotropic, harmonics, area);
        fourier.accumulate(&contribution);
    }

    fourier.add_uniform(&background, layer.anisotropic);
    let eps_zz_inv = invert(&fourier.eps_zz)?;

    Ok(LayerMatrices {
        fourier,
        eps_zz_inv,
    })
}

/// Dense complex inverse via LU with partial pivoting.
pub fn invert(matrix: &Array2<Complex64>) -> Result<Array2<Complex64>, SimulationError> {
    let dim = matrix.nrows();
    if dim != matrix.ncols() {
        return Err(SimulationError::LinearAlgebra(format!(
            "cannot invert a {}x{} matrix",
            dim,
            matrix.ncols()
        )));
    }

    let faer_mat = faer::Mat::<c64>::from_fn(dim, dim, |i, j| {
        let c = matrix[[i, j]];
        c64::new(c.re, c.im)
    });
    let lu = faer_mat.partial_piv_lu();
    let inv = lu.inverse();

    let result = Array2::from_shape_fn((dim, dim), |(i, j)| {
        let c = inv.read(i, j);
        Complex64::new(c.re, c.im)
    });

    if result.iter().any(|c| !c.re.is_finite() || !c.im.is_finite()) {
        return Err(SimulationError::LinearAlgebra(
            "matrix is singular to working precision".into(),
        ));
    }
    Ok(result)
}
