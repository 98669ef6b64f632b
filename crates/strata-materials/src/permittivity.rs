//! Permittivity samples.
//!
//! A sample is stored in the narrowest form the data supports. Layer
//! assembly works on the canonical [`EpsilonTensor`], which carries the
//! in-plane 2×2 block plus the out-of-plane component:
//!
//! $$
//! \varepsilon = \begin{pmatrix}
//! \varepsilon_{xx} & \varepsilon_{xy} & 0 \\
//! \varepsilon_{yx} & \varepsilon_{yy} & 0 \\
//! 0 & 0 & \varepsilon_{zz}
//! \end{pmatrix}
//! $$

use std::fmt;
use std::str::FromStr;

use num_complex::Complex64;
use serde::{Deserialize, Serialize};

use crate::material::MaterialError;

/// Storage kind of a material's permittivity samples.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PermittivityKind {
    /// One isotropic value.
    Scalar,
    /// Three values on the diagonal (xx, yy, zz).
    Diagonal,
    /// In-plane 2×2 block plus zz (xx, xy, yx, yy, zz).
    Tensor,
}

impl PermittivityKind {
    /// Number of real fields per row in tabulated data (re/im pairs).
    pub fn field_count(self) -> usize {
        match self {
            PermittivityKind::Scalar => 2,
            PermittivityKind::Diagonal => 6,
            PermittivityKind::Tensor => 10,
        }
    }

    /// Infer the kind from a row width, if the width is one of 2, 6 or 10.
    pub fn from_field_count(count: usize) -> Option<Self> {
        match count {
            2 => Some(PermittivityKind::Scalar),
            6 => Some(PermittivityKind::Diagonal),
            10 => Some(PermittivityKind::Tensor),
            _ => None,
        }
    }
}

impl fmt::Display for PermittivityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            PermittivityKind::Scalar => "scalar",
            PermittivityKind::Diagonal => "diagonal",
            PermittivityKind::Tensor => "tensor",
        };
        f.write_str(name)
    }
}

impl FromStr for PermittivityKind {
    type Err = MaterialError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "scalar" => Ok(PermittivityKind::Scalar),
            "diagonal" => Ok(PermittivityKind::Diagonal),
            "tensor" => Ok(PermittivityKind::Tensor),
            other => Err(MaterialError::UnsupportedKind(other.to_string())),
        }
    }
}

/// A single permittivity sample.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum Permittivity {
    Scalar(Complex64),
    Diagonal([Complex64; 3]),
    Tensor {
        xx: Complex64,
        xy: Complex64,
        yx: Complex64,
        yy: Complex64,
        zz: Complex64,
    },
}

impl Permittivity {
    pub fn kind(&self) -> PermittivityKind {
        match self {
            Permittivity::Scalar(_) => PermittivityKind::Scalar,
            Permittivity::Diagonal(_) => PermittivityKind::Diagonal,
            Permittivity::Tensor { .. } => PermittivityKind::Tensor,
        }
    }

    /// Build a sample from a row of re/im pairs laid out as in data files.
    ///
    /// The values are taken as-is; no sign flipping happens here.
    pub fn from_fields(kind: PermittivityKind, fields: &[f64]) -> Result<Self, MaterialError> {
        if fields.len() != kind.field_count() {
            return Err(MaterialError::FieldCount {
                kind,
                expected: kind.field_count(),
                found: fields.len(),
            });
        }
        let c = |k: usize| Complex64::new(fields[2 * k], fields[2 * k + 1]);
        Ok(match kind {
            PermittivityKind::Scalar => Permittivity::Scalar(c(0)),
            PermittivityKind::Diagonal => Permittivity::Diagonal([c(0), c(1), c(2)]),
            PermittivityKind::Tensor => Permittivity::Tensor {
                xx: c(0),
                xy: c(1),
                yx: c(2),
                yy: c(3),
                zz: c(4),
            },
        })
    }

    /// Widen into the canonical five-component tensor.
    pub fn to_tensor(&self) -> EpsilonTensor {
        let zero = Complex64::new(0.0, 0.0);
        match *self {
            Permittivity::Scalar(eps) => EpsilonTensor {
                xx: eps,
                xy: zero,
                yx: zero,
                yy: eps,
                zz: eps,
            },
            Permittivity::Diagonal([xx, yy, zz]) => EpsilonTensor {
                xx,
                xy: zero,
                yx: zero,
                yy,
                zz,
            },
            Permittivity::Tensor { xx, xy, yx, yy, zz } => EpsilonTensor { xx, xy, yx, yy, zz },
        }
    }

    /// Same sample with every imaginary part negated.
    pub fn conj(&self) -> Self {
        match *self {
            Permittivity::Scalar(eps) => Permittivity::Scalar(eps.conj()),
            Permittivity::Diagonal(d) => Permittivity::Diagonal(d.map(|c| c.conj())),
            Permittivity::Tensor { xx, xy, yx, yy, zz } => Permittivity::Tensor {
                xx: xx.conj(),
                xy: xy.conj(),
                yx: yx.conj(),
                yy: yy.conj(),
                zz: zz.conj(),
            },
        }
    }
}

/// Canonical permittivity tensor (in-plane block plus zz).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct EpsilonTensor {
    pub xx: Complex64,
    pub xy: Complex64,
    pub yx: Complex64,
    pub yy: Complex64,
    pub zz: Complex64,
}

impl EpsilonTensor {
    /// Component-wise difference `self − other`.
    pub fn difference(&self, other: &EpsilonTensor) -> EpsilonTensor {
        EpsilonTensor {
            xx: self.xx - other.xx,
            xy: self.xy - other.xy,
            yx: self.yx - other.yx,
            yy: self.yy - other.yy,
            zz: self.zz - other.zz,
        }
    }

    /// Anti-Hermitian part of the in-plane off-diagonal pair,
    /// `((xy − conj yx) / 2i, (yx − conj xy) / 2i)`.
    pub fn off_diagonal_loss(&self) -> (Complex64, Complex64) {
        let two_i = Complex64::new(0.0, 2.0);
        (
            (self.xy - self.yx.conj()) / two_i,
            (self.yx - self.xy.conj()) / two_i,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_kind_parsing() {
        assert_eq!("Scalar".parse::<PermittivityKind>().unwrap(), PermittivityKind::Scalar);
        assert_eq!(" tensor ".parse::<PermittivityKind>().unwrap(), PermittivityKind::Tensor);
        assert!(matches!(
            "gyrotropic".parse::<PermittivityKind>(),
            Err(MaterialError::UnsupportedKind(_))
        ));
    }

    #[test]
    fn test_field_counts_round_trip_kind() {
        for kind in [
            PermittivityKind::Scalar,
            PermittivityKind::Diagonal,
            PermittivityKind::Tensor,
        ] {
            assert_eq!(PermittivityKind::from_field_count(kind.field_count()), Some(kind));
        }
        assert_eq!(PermittivityKind::from_field_count(4), None);
    }

    #[test]
    fn test_scalar_widens_to_isotropic_tensor() {
        let eps = Complex64::new(12.0, -0.4);
        let t = Permittivity::Scalar(eps).to_tensor();
        assert_eq!(t.xx, eps);
        assert_eq!(t.yy, eps);
        assert_eq!(t.zz, eps);
        assert_eq!(t.xy, Complex64::new(0.0, 0.0));
        assert_eq!(t.yx, Complex64::new(0.0, 0.0));
    }

    #[test]
    fn test_tensor_field_order() {
        let fields: Vec<f64> = (0..10).map(|i| i as f64).collect();
        let p = Permittivity::from_fields(PermittivityKind::Tensor, &fields).unwrap();
        let t = p.to_tensor();
        assert_eq!(t.xx, Complex64::new(0.0, 1.0));
        assert_eq!(t.xy, Complex64::new(2.0, 3.0));
        assert_eq!(t.yx, Complex64::new(4.0, 5.0));
        assert_eq!(t.yy, Complex64::new(6.0, 7.0));
        assert_eq!(t.zz, Complex64::new(8.0, 9.0));
    }

    #[test]
    fn test_wrong_width_rejected() {
        let err = Permittivity::from_fields(PermittivityKind::Diagonal, &[1.0, 0.0]);
        assert!(matches!(err, Err(MaterialError::FieldCount { expected: 6, found: 2, .. })));
    }

    #[test]
    fn test_off_diagonal_loss_of_hermitian_pair_vanishes() {
        // A Hermitian off-diagonal pair (yx = conj xy) is lossless.
        let t = EpsilonTensor {
            xx: Complex64::new(2.0, 0.0),
            xy: Complex64::new(0.3, 0.7),
            yx: Complex64::new(0.3, -0.7),
            yy: Complex64::new(2.0, 0.0),
            zz: Complex64::new(2.0, 0.0),
        };
        let (lxy, lyx) = t.off_diagonal_loss();
        assert_relative_eq!(lxy.norm(), 0.0, epsilon = 1e-15);
        assert_relative_eq!(lyx.norm(), 0.0, epsilon = 1e-15);
    }
}
