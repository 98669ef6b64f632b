//! Real and reciprocal lattices.
//!
//! A 2-D lattice is described by two lengths and the angle between its
//! primitive vectors; `a1` lies along x:
//!
//! $$
//! \mathbf{a}_1 = (L_x, 0), \qquad
//! \mathbf{a}_2 = (L_y \cos\theta, L_y \sin\theta)
//! $$
//!
//! and the reciprocal vectors satisfy $\mathbf{a}_i \cdot \mathbf{b}_j =
//! 2\pi \delta_{ij}$ with $\mathbf{b}_2$ along y. The reciprocal angle is
//! $180° - \theta$.

use std::f64::consts::PI;

use serde::{Deserialize, Serialize};

use crate::GeometryError;

/// Number of in-plane periodic directions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Periodicity {
    /// Unpatterned planar stack.
    None,
    /// Gratings periodic along x.
    One,
    /// Patterns periodic in the plane.
    Two,
}

impl Periodicity {
    pub fn is_periodic(self) -> bool {
        self != Periodicity::None
    }
}

/// Real-space lattice.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Lattice {
    pub periodicity: Periodicity,
    pub a1: [f64; 2],
    pub a2: [f64; 2],
    /// Unit cell area (2-D) or period (1-D).
    pub area: f64,
    /// Angle between `a1` and `a2`, in degrees.
    pub angle_deg: f64,
}

/// Reciprocal lattice.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ReciprocalLattice {
    pub b1: [f64; 2],
    pub b2: [f64; 2],
    /// Reciprocal cell area (2-D) or length of `b1` (1-D).
    pub area: f64,
    /// Angle between `b1` and `b2`, in degrees.
    pub angle_deg: f64,
}

impl Default for ReciprocalLattice {
    /// The trivial lattice of an unpatterned stack. Only the angle is
    /// meaningful: a right angle leaves the k-space grid unsheared.
    fn default() -> Self {
        Self {
            b1: [0.0, 0.0],
            b2: [0.0, 0.0],
            area: 0.0,
            angle_deg: 90.0,
        }
    }
}

impl Lattice {
    /// One-dimensional lattice of the given period.
    pub fn one_dimensional(period: f64) -> Result<Self, GeometryError> {
        if !(period > 0.0) {
            return Err(GeometryError::InvalidLattice(format!(
                "period must be positive, got {period}"
            )));
        }
        Ok(Self {
            periodicity: Periodicity::One,
            a1: [period, 0.0],
            a2: [0.0, 0.0],
            area: period,
            angle_deg: 90.0,
        })
    }

    /// Two-dimensional lattice. The angle must lie strictly between 0° and
    /// 180°.
    pub fn two_dimensional(x_len: f64, y_len: f64, angle_deg: f64) -> Result<Self, GeometryError> {
        if !(angle_deg > 0.0 && angle_deg < 180.0) {
            return Err(GeometryError::OutOfRange(format!(
                "lattice angle must lie in (0, 180) degrees, got {angle_deg}"
            )));
        }
        if !(x_len > 0.0 && y_len > 0.0) {
            return Err(GeometryError::InvalidLattice(format!(
                "lattice lengths must be positive, got ({x_len}, {y_len})"
            )));
        }
        let theta = angle_deg.to_radians();
        let a1 = [x_len, 0.0];
        let a2 = [y_len * theta.cos(), y_len * theta.sin()];
        Ok(Self {
            periodicity: Periodicity::Two,
            a1,
            a2,
            area: a1[0] * a2[1],
            angle_deg,
        })
    }

    pub fn reciprocal(&self) -> ReciprocalLattice {
        match self.periodicity {
            Periodicity::None => ReciprocalLattice::default(),
            Periodicity::One => {
                let b = 2.0 * PI / self.a1[0];
                ReciprocalLattice {
                    b1: [b, 0.0],
                    b2: [0.0, 0.0],
                    area: b,
                    angle_deg: 90.0,
                }
            }
            Periodicity::Two => {
                let b1 = [
                    2.0 * PI / self.a1[0],
                    -2.0 * PI * self.a2[0] / (self.a2[1] * self.a1[0]),
                ];
                let b2 = [0.0, 2.0 * PI / self.a2[1]];
                ReciprocalLattice {
                    b1,
                    b2,
                    area: (b2[1] * b1[0]).abs(),
                    angle_deg: 180.0 - self.angle_deg,
                }
            }
        }
    }

    /// Cartesian point from fractional coordinates `(u, v)`.
    pub fn point(&self, u: f64, v: f64) -> [f64; 2] {
        [
            self.a1[0] * u + self.a2[0] * v,
            self.a1[1] * u + self.a2[1] * v,
        ]
    }
}

impl ReciprocalLattice {
    pub fn b1_norm(&self) -> f64 {
        self.b1[0].hypot(self.b1[1])
    }

    pub fn b2_norm(&self) -> f64 {
        self.b2[0].hypot(self.b2[1])
    }
}
