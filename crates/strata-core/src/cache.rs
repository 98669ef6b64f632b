//! Per-frequency solve cache.
//!
//! Building the Fourier matrices and operators of every layer is the
//! expensive part of a flux evaluation, and it depends only on the
//! frequency index. [`SolveState`] keeps the set for the last index it was
//! built for; the integrators walk frequencies in order so each set is built
//! once per integration.

use log::debug;

use strata_geometry::{Harmonics, ReciprocalLattice};

use crate::error::SimulationError;
use crate::fmm::{build_layer_matrices, LayerMatrices};
use crate::modes::{assemble_operators, LayerOperators};
use crate::structure::{MaterialRegistry, Structure};

/// Frequency-independent data fixed by `init_simulation`.
#[derive(Debug, Clone, PartialEq)]
pub struct SolveSetup {
    /// Angular frequencies (rad/s).
    pub omega: Vec<f64>,
    /// Layer thicknesses in internal units, outermost layers zeroed.
    pub thicknesses: Vec<f64>,
    pub sources: Vec<bool>,
    pub probe: usize,
    /// Retained harmonics in internal units.
    pub harmonics: Harmonics,
    /// Unit cell area in internal units (0 when unpatterned).
    pub area: f64,
    /// Reciprocal lattice in SI units.
    pub reciprocal: ReciprocalLattice,
}

impl SolveSetup {
    pub fn frequency_count(&self) -> usize {
        self.omega.len()
    }

    pub fn check_index(&self, omega_index: usize) -> Result<(), SimulationError> {
        if omega_index < self.omega.len() {
            Ok(())
        } else {
            Err(SimulationError::OutOfRange(format!(
                "frequency index {omega_index} is out of range (0..{})",
                self.omega.len()
            )))
        }
    }
}

/// Matrices and operators of every layer at one frequency.
#[derive(Debug, Default)]
pub struct SolveState {
    cached_index: Option<usize>,
    pub matrices: Vec<LayerMatrices>,
    pub operators: Vec<LayerOperators>,
}

impl SolveState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cached_index(&self) -> Option<usize> {
        self.cached_index
    }

    pub fn needs_rebuild(&self, omega_index: usize) -> bool {
        self.cached_index != Some(omega_index)
    }

    pub fn invalidate(&mut self) {
        self.cached_index = None;
        self.matrices.clear();
        self.operators.clear();
    }

    /// Make sure the cache holds `omega_index`. Returns true if it was
    /// rebuilt.
    ///
    /// On failure the cache is left empty rather than holding a partial set.
    pub fn ensure(
        &mut self,
        omega_index: usize,
        structure: &Structure,
        materials: &MaterialRegistry,
        setup: &SolveSetup,
    ) -> Result<bool, SimulationError> {
        if !self.needs_rebuild(omega_index) {
            return Ok(false);
        }
        self.invalidate();
        let (matrices, operators) = build_operators(structure, materials, setup, omega_index)?;
        self.matrices = matrices;
        self.operators = operators;
        self.cached_index = Some(omega_index);
        debug!(
            "Rebuilt {} layer operator sets for frequency index {}",
            self.operators.len(),
            omega_index
        );
        Ok(true)
    }
}

/// Build the matrices and operators of every layer at `omega_index`.
pub fn build_operators(
    structure: &Structure,
    materials: &MaterialRegistry,
    setup: &SolveSetup,
    omega_index: usize,
) -> Result<(Vec<LayerMatrices>, Vec<LayerOperators>), SimulationError> {
    setup.check_index(omega_index)?;
    let matrices = structure
        .layers()
        .iter()
        .map(|layer| {
            build_layer_matrices(layer, materials, omega_index, &setup.harmonics, setup.area)
        })
        .collect::<Result<Vec<_>, _>>()?;
    let operators = matrices.iter().map(assemble_operators).collect();
    Ok((matrices, operators))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::structure::Layer;
    use num_complex::Complex64;
    use strata_materials::{Material, Permittivity};

    fn fixture() -> (Structure, MaterialRegistry, SolveSetup) {
        let freqs = vec![1e14, 2e14];
        let mut reg = MaterialRegistry::new();
        let vals = |re: f64| {
            freqs
                .iter()
                .map(|f| Permittivity::Scalar(Complex64::new(re, -f * 1e-14)))
                .collect()
        };
        reg.insert(Material::new("A", freqs.clone(), vals(1.0)).unwrap())
            .unwrap();
        reg.insert(Material::new("B", freqs.clone(), vals(4.0)).unwrap())
            .unwrap();
        let mut s = Structure::new();
        s.push(Layer::new("bottom", 1, 0.0)).unwrap();
        s.push(Layer::new("top", 0, 0.0)).unwrap();
        let setup = SolveSetup {
            omega: freqs,
            thicknesses: vec![0.0, 0.0],
            sources: vec![true, false],
            probe: 1,
            harmonics: Harmonics::planar(),
            area: 0.0,
            reciprocal: ReciprocalLattice::default(),
        };
        (s, reg, setup)
    }

    #[test]
    fn test_rebuild_only_on_index_change() {
        let (s, reg, setup) = fixture();
        let mut state = SolveState::new();
        assert!(state.needs_rebuild(0));
        assert!(state.ensure(0, &s, &reg, &setup).unwrap());
        assert!(!state.ensure(0, &s, &reg, &setup).unwrap());
        assert_eq!(state.cached_index(), Some(0));
        let before = state.operators[0].eps_xx(0, 0);

        assert!(state.ensure(1, &s, &reg, &setup).unwrap());
        assert_eq!(state.cached_index(), Some(1));
        assert_ne!(state.operators[0].eps_xx(0, 0), before);
    }

    #[test]
    fn test_failed_rebuild_leaves_cache_empty() {
        let (s, reg, setup) = fixture();
        let mut state = SolveState::new();
        state.ensure(0, &s, &reg, &setup).unwrap();
        let err = state.ensure(5, &s, &reg, &setup);
        assert!(matches!(err, Err(SimulationError::OutOfRange(_))));
        assert_eq!(state.cached_index(), None);
        assert!(state.operators.is_empty());
    }
}
