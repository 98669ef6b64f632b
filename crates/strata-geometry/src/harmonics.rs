//! Truncated reciprocal lattice vector sets.
//!
//! The solver represents every patterned layer in a basis of plane waves
//! $e^{i(\mathbf{k} + \mathbf{G})\cdot\mathbf{r}}$ with $\mathbf{G} = m
//! \mathbf{b}_1 + n \mathbf{b}_2$. Which `(m, n)` pairs are retained is
//! controlled by [`Truncation`].

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::lattice::{Periodicity, ReciprocalLattice};
use crate::GeometryError;

/// Truncation scheme for 2-D harmonic sets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum Truncation {
    /// Keep the vectors of smallest length, whole shells only.
    #[default]
    Circular,
    /// Keep an odd `N × N` block of `(m, n)`.
    Parallelogramic,
}

impl fmt::Display for Truncation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Truncation::Circular => f.write_str("Circular"),
            Truncation::Parallelogramic => f.write_str("Parallelogramic"),
        }
    }
}

impl FromStr for Truncation {
    type Err = GeometryError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Circular" => Ok(Truncation::Circular),
            "Parallelogramic" => Ok(Truncation::Parallelogramic),
            other => Err(GeometryError::UnknownTruncation(other.to_string())),
        }
    }
}

/// A retained set of reciprocal lattice vectors.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Harmonics {
    pub gx: Vec<f64>,
    pub gy: Vec<f64>,
    /// Integer coordinates `(m, n)` of each vector.
    pub orders: Vec<(i32, i32)>,
    /// Position of G = 0 in the lists.
    pub zero_index: usize,
}

impl Harmonics {
    /// The single harmonic of an unpatterned stack.
    pub fn planar() -> Self {
        Self {
            gx: vec![0.0],
            gy: vec![0.0],
            orders: vec![(0, 0)],
            zero_index: 0,
        }
    }

    pub fn len(&self) -> usize {
        self.gx.len()
    }

    pub fn is_empty(&self) -> bool {
        self.gx.is_empty()
    }

    pub fn vector(&self, i: usize) -> [f64; 2] {
        [self.gx[i], self.gy[i]]
    }

    /// Same orders with every vector multiplied by `factor`.
    pub fn scaled(&self, factor: f64) -> Self {
        Self {
            gx: self.gx.iter().map(|g| g * factor).collect(),
            gy: self.gy.iter().map(|g| g * factor).collect(),
            orders: self.orders.clone(),
            zero_index: self.zero_index,
        }
    }

    fn from_orders(orders: Vec<(i32, i32)>, rec: &ReciprocalLattice) -> Self {
        let gx = orders
            .iter()
            .map(|&(m, n)| m as f64 * rec.b1[0] + n as f64 * rec.b2[0])
            .collect();
        let gy = orders
            .iter()
            .map(|&(m, n)| m as f64 * rec.b1[1] + n as f64 * rec.b2[1])
            .collect();
        let zero_index = orders.iter().position(|&o| o == (0, 0)).unwrap_or(0);
        Self {
            gx,
            gy,
            orders,
            zero_index,
        }
    }
}

/// Generate at most `count` harmonics for the given lattice.
///
/// The planar case always yields one harmonic; 1-D gratings and
/// parallelogramic truncation round the count down to an odd number (or odd
/// square) so that the set is symmetric about G = 0.
pub fn generate_harmonics(
    count: usize,
    rec: &ReciprocalLattice,
    periodicity: Periodicity,
    truncation: Truncation,
) -> Result<Harmonics, GeometryError> {
    if count == 0 {
        return Err(GeometryError::OutOfRange(
            "number of harmonics must be at least 1".into(),
        ));
    }
    let harmonics = match periodicity {
        Periodicity::None => Harmonics::planar(),
        Periodicity::One => {
            let half = ((count - 1) / 2) as i32;
            let orders = (-half..=half).map(|m| (m, 0)).collect();
            Harmonics::from_orders(orders, rec)
        }
        Periodicity::Two => match truncation {
            Truncation::Parallelogramic => parallelogramic(count, rec),
            Truncation::Circular => circular(count, rec),
        },
    };
    Ok(harmonics)
}

fn parallelogramic(count: usize, rec: &ReciprocalLattice) -> Harmonics {
    let mut side = (count as f64).sqrt().floor() as usize;
    if side % 2 == 0 {
        side = side.saturating_sub(1).max(1);
    }
    let half = (side / 2) as i32;
    let mut orders = Vec::with_capacity(side * side);
    for m in -half..=half {
        for n in -half..=half {
            orders.push((m, n));
        }
    }
    Harmonics::from_orders(orders, rec)
}

fn circular(count: usize, rec: &ReciprocalLattice) -> Harmonics {
    let b1 = rec.b1_norm();
    let b2 = rec.b2_norm();
    // Radius holding comfortably more than `count` lattice points.
    let radius = 1.5 * (count as f64 * rec.area / std::f64::consts::PI).sqrt() + b1.max(b2);
    let m_max = (radius * b2 / rec.area).ceil() as i32 + 1;
    let n_max = (radius * b1 / rec.area).ceil() as i32 + 1;

    let mut candidates: Vec<((i32, i32), f64)> = Vec::new();
    for m in -m_max..=m_max {
        for n in -n_max..=n_max {
            let gx = m as f64 * rec.b1[0] + n as f64 * rec.b2[0];
            let gy = m as f64 * rec.b1[1] + n as f64 * rec.b2[1];
            let norm = gx.hypot(gy);
            if norm <= radius {
                candidates.push(((m, n), norm));
            }
        }
    }
    candidates.sort_by(|a, b| a.1.total_cmp(&b.1).then(a.0.cmp(&b.0)));

    let tol = 1e-9 * b1.min(b2);
    let mut orders = Vec::with_capacity(count);
    let mut start = 0;
    while start < candidates.len() {
        let shell_norm = candidates[start].1;
        let end = candidates[start..]
            .iter()
            .position(|c| c.1 - shell_norm > tol)
            .map_or(candidates.len(), |p| start + p);
        if orders.len() + (end - start) > count {
            break;
        }
        orders.extend(candidates[start..end].iter().map(|c| c.0));
        start = end;
    }
    Harmonics::from_orders(orders, rec)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lattice::Lattice;

    fn square() -> ReciprocalLattice {
        Lattice::two_dimensional(1.0, 1.0, 90.0).unwrap().reciprocal()
    }

    #[test]
    fn test_planar_single_harmonic() {
        let h = generate_harmonics(
            25,
            &ReciprocalLattice::default(),
            Periodicity::None,
            Truncation::Circular,
        )
        .unwrap();
        assert_eq!(h.len(), 1);
        assert_eq!(h.vector(0), [0.0, 0.0]);
    }

    #[test]
    fn test_one_dimensional_is_odd_and_centred() {
        let rec = Lattice::one_dimensional(1.0).unwrap().reciprocal();
        let h = generate_harmonics(10, &rec, Periodicity::One, Truncation::Circular).unwrap();
        assert_eq!(h.len(), 9);
        assert_eq!(h.orders[h.zero_index], (0, 0));
        assert_eq!(h.zero_index, 4);
        assert!(h.gy.iter().all(|&g| g == 0.0));
    }

    #[test]
    fn test_parallelogramic_block() {
        let h =
            generate_harmonics(30, &square(), Periodicity::Two, Truncation::Parallelogramic).unwrap();
        // floor(sqrt(30)) = 5, already odd.
        assert_eq!(h.len(), 25);
        assert_eq!(h.zero_index, 12);
        assert_eq!(h.orders[h.zero_index], (0, 0));

        let h =
            generate_harmonics(16, &square(), Periodicity::Two, Truncation::Parallelogramic).unwrap();
        assert_eq!(h.len(), 9);
    }

    #[test]
    fn test_circular_keeps_whole_shells() {
        // Square lattice shells: 1, 4, 4, 4, 8, ... → cumulative 1, 5, 9, 13, 21.
        let h = generate_harmonics(12, &square(), Periodicity::Two, Truncation::Circular).unwrap();
        assert_eq!(h.len(), 9);
        assert_eq!(h.zero_index, 0);
        let h = generate_harmonics(21, &square(), Periodicity::Two, Truncation::Circular).unwrap();
        assert_eq!(h.len(), 21);
    }

    #[test]
    fn test_circular_is_inversion_symmetric() {
        let rec = Lattice::two_dimensional(1.0, 1.3, 70.0).unwrap().reciprocal();
        let h = generate_harmonics(40, &rec, Periodicity::Two, Truncation::Circular).unwrap();
        for &(m, n) in &h.orders {
            assert!(h.orders.contains(&(-m, -n)), "missing partner of ({m}, {n})");
        }
    }

    #[test]
    fn test_truncation_parse() {
        assert_eq!("Circular".parse::<Truncation>().unwrap(), Truncation::Circular);
        assert_eq!(
            "Parallelogramic".parse::<Truncation>().unwrap(),
            Truncation::Parallelogramic
        );
        assert!("Square".parse::<Truncation>().is_err());
    }

    #[test]
    fn test_zero_count_rejected() {
        assert!(generate_harmonics(0, &square(), Periodicity::Two, Truncation::Circular).is_err());
    }
}
