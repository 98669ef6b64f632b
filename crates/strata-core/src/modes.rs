//! Operator assembly for the mode solve.
//!
//! Each layer contributes two block operators built from its Fourier
//! matrices:
//!
//! $$
//! E = \begin{pmatrix} [\varepsilon_{yy}] & -[\varepsilon_{yx}] \\
//!                     -[\varepsilon_{xy}] & [\varepsilon_{xx}] \end{pmatrix},
//! \qquad
//! \mathcal{I} = \begin{pmatrix} [\Im\varepsilon_{xx}] & [\Im\varepsilon_{xy}] & 0 \\
//!                               [\Im\varepsilon_{yx}] & [\Im\varepsilon_{yy}] & 0 \\
//!                               0 & 0 & [\Im\varepsilon_{zz}] \end{pmatrix}
//! $$
//!
//! The grand imaginary matrix $\mathcal{I}$ weights the fluctuating
//! currents of a source layer.

use ndarray::{s, Array2};
use num_complex::Complex64;

use crate::fmm::LayerMatrices;

/// Operators of one layer at one frequency, as consumed by flux kernels.
#[derive(Debug, Clone, PartialEq)]
pub struct LayerOperators {
    /// `2nG × 2nG` in-plane permittivity operator.
    pub e_matrix: Array2<Complex64>,
    /// `3nG × 3nG` absorption weights.
    pub grand_imaginary: Array2<Complex64>,
    pub eps_zz_inv: Array2<Complex64>,
}

impl LayerOperators {
    pub fn harmonic_count(&self) -> usize {
        self.eps_zz_inv.nrows()
    }

    /// `[ε_xx]_{ij}` read back from the E matrix.
    pub fn eps_xx(&self, i: usize, j: usize) -> Complex64 {
        let n = self.harmonic_count();
        self.e_matrix[[n + i, n + j]]
    }

    pub fn eps_yy(&self, i: usize, j: usize) -> Complex64 {
        self.e_matrix[[i, j]]
    }

    pub fn eps_xy(&self, i: usize, j: usize) -> Complex64 {
        let n = self.harmonic_count();
        -self.e_matrix[[n + i, j]]
    }

    pub fn eps_yx(&self, i: usize, j: usize) -> Complex64 {
        let n = self.harmonic_count();
        -self.e_matrix[[i, n + j]]
    }
}

/// Assemble the E matrix and grand imaginary matrix of a layer.
pub fn assemble_operators(matrices: &LayerMatrices) -> LayerOperators {
    let m = &matrices.fourier;
    let n = m.dim();

    let mut e_matrix = Array2::<Complex64>::zeros((2 * n, 2 * n));
    e_matrix.slice_mut(s![..n, ..n]).assign(&m.eps_yy);
    e_matrix.slice_mut(s![..n, n..]).assign(&m.eps_yx.mapv(|v| -v));
    e_matrix.slice_mut(s![n.., ..n]).assign(&m.eps_xy.mapv(|v| -v));
    e_matrix.slice_mut(s![n.., n..]).assign(&m.eps_xx);

    let mut grand_imaginary = Array2::<Complex64>::zeros((3 * n, 3 * n));
    grand_imaginary.slice_mut(s![..n, ..n]).assign(&m.im_xx);
    grand_imaginary.slice_mut(s![..n, n..2 * n]).assign(&m.im_xy);
    grand_imaginary.slice_mut(s![n..2 * n, ..n]).assign(&m.im_yx);
    grand_imaginary.slice_mut(s![n..2 * n, n..2 * n]).assign(&m.im_yy);
    grand_imaginary.slice_mut(s![2 * n.., 2 * n..]).assign(&m.im_zz);

    LayerOperators {
        e_matrix,
        grand_imaginary,
        eps_zz_inv: matrices.eps_zz_inv.clone(),
    }
}
