//! One-dimensional quadrature rules.
//!
//! - [`GaussLegendre`]: fixed-degree rule with nodes found by Newton
//!   iteration on the Legendre recurrence.
//! - [`adaptive_gauss_kronrod`]: globally adaptive 7/15-point
//!   Gauss–Kronrod integration.

use std::f64::consts::PI;

use crate::error::SimulationError;

/// Fixed-degree Gauss–Legendre rule on [−1, 1].
#[derive(Debug, Clone, PartialEq)]
pub struct GaussLegendre {
    nodes: Vec<f64>,
    weights: Vec<f64>,
}

impl GaussLegendre {
    pub fn new(degree: usize) -> Result<Self, SimulationError> {
        if degree == 0 {
            return Err(SimulationError::OutOfRange(
                "Gauss-Legendre degree must be at least 1".into(),
            ));
        }
        let n = degree;
        let mut nodes = vec![0.0; n];
        let mut weights = vec![0.0; n];

        for i in 0..n.div_ceil(2) {
            // Tricomi initial guess for the i-th largest root.
            let mut x = (PI * (i as f64 + 0.75) / (n as f64 + 0.5)).cos();
            let mut derivative = 0.0;
            for _ in 0..100 {
                let (p, dp) = legendre(n, x);
                derivative = dp;
                let dx = p / dp;
                x -= dx;
                if dx.abs() < 1e-15 {
                    break;
                }
            }
            let (_, dp) = legendre(n, x);
            if dp != 0.0 {
                derivative = dp;
            }
            let w = 2.0 / ((1.0 - x * x) * derivative * derivative);
            nodes[i] = x;
            weights[i] = w;
            nodes[n - 1 - i] = -x;
            weights[n - 1 - i] = w;
        }

        Ok(Self { nodes, weights })
    }

    pub fn degree(&self) -> usize {
        self.nodes.len()
    }

    pub fn nodes(&self) -> &[f64] {
        &self.nodes
    }

    pub fn weights(&self) -> &[f64] {
        &self.weights
    }

    /// ∫ₐᵇ f(x) dx.
    pub fn integrate<F: Fn(f64) -> f64>(&self, f: F, a: f64, b: f64) -> f64 {
        let half = 0.5 * (b - a);
        let mid = 0.5 * (b + a);
        self.nodes
            .iter()
            .zip(&self.weights)
            .map(|(&x, &w)| w * f(mid + half * x))
            .sum::<f64>()
            * half
    }
}

/// Legendre polynomial P_n(x) and its derivative.
fn legendre(n: usize, x: f64) -> (f64, f64) {
    let mut p0 = 1.0;
    let mut p1 = x;
    if n == 0 {
        return (1.0, 0.0);
    }
    for k in 2..=n {
        let k = k as f64;
        let p2 = ((2.0 * k - 1.0) * x * p1 - (k - 1.0) * p0) / k;
        p0 = p1;
        p1 = p2;
    }
    let dp = n as f64 * (x * p1 - p0) / (x * x - 1.0);
    (p1, dp)
}

const KRONROD_NODES: [f64; 8] = [
    0.991_455_371_120_812_6,
    0.949_107_912_342_758_5,
    0.864_864_423_359_769_1,
    0.741_531_185_599_394_4,
    0.586_087_235_467_691_1,
    0.405_845_151_377_397_2,
    0.207_784_955_007_898_5,
    0.0,
];

const KRONROD_WEIGHTS: [f64; 8] = [
    0.022_935_322_010_529_22,
    0.063_092_092_629_978_55,
    0.104_790_010_322_250_2,
    0.140_653_259_715_525_9,
    0.169_004_726_639_267_9,
    0.190_350_578_064_785_4,
    0.204_432_940_075_298_9,
    0.209_482_141_084_727_8,
];

/// Weights of the embedded 7-point Gauss rule, at Kronrod nodes 1, 3, 5, 7.
const GAUSS_WEIGHTS: [f64; 4] = [
    0.129_484_966_168_869_7,
    0.279_705_391_489_276_7,
    0.381_830_050_505_118_9,
    0.417_959_183_673_469_4,
];

/// Result of an adaptive integration.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct QuadratureEstimate {
    pub value: f64,
    /// Estimated absolute error.
    pub error: f64,
    /// Number of subintervals used.
    pub intervals: usize,
    /// False if the interval budget ran out before the tolerance was met.
    pub converged: bool,
}

#[derive(Debug, Clone, Copy)]
struct Segment {
    a: f64,
    b: f64,
    value: f64,
    error: f64,
}

fn kronrod_segment<F: Fn(f64) -> f64>(f: &F, a: f64, b: f64) -> Segment {
    let half = 0.5 * (b - a);
    let mid = 0.5 * (b + a);
    let centre = f(mid);
    let mut kronrod = centre * KRONROD_WEIGHTS[7];
    let mut gauss = centre * GAUSS_WEIGHTS[3];
    for (j, (&x, &w)) in KRONROD_NODES[..7].iter().zip(&KRONROD_WEIGHTS[..7]).enumerate() {
        let pair = f(mid - half * x) + f(mid + half * x);
        kronrod += w * pair;
        if j % 2 == 1 {
            gauss += GAUSS_WEIGHTS[j / 2] * pair;
        }
    }
    Segment {
        a,
        b,
        value: kronrod * half,
        error: ((kronrod - gauss) * half).abs(),
    }
}

/// Globally adaptive 7/15-point Gauss–Kronrod integration of f over [a, b].
///
/// The interval with the largest error estimate is bisected until the total
/// error is below `max(abs_tol, rel_tol · |value|)` or `max_intervals`
/// subintervals are in use.
pub fn adaptive_gauss_kronrod<F: Fn(f64) -> f64>(
    f: F,
    a: f64,
    b: f64,
    abs_tol: f64,
    rel_tol: f64,
    max_intervals: usize,
) -> QuadratureEstimate {
    let mut segments = vec![kronrod_segment(&f, a, b)];
    let budget = max_intervals.max(1);

    loop {
        let value: f64 = segments.iter().map(|s| s.value).sum();
        let error: f64 = segments.iter().map(|s| s.error).sum();
        let target = abs_tol.max(rel_tol * value.abs());
        if error <= target || segments.len() >= budget {
            return QuadratureEstimate {
                value,
                error,
                intervals: segments.len(),
                converged: error <= target,
            };
        }

        let worst = segments
            .iter()
            .enumerate()
            .max_by(|(_, x), (_, y)| x.error.total_cmp(&y.error))
            .map(|(i, _)| i)
            .unwrap_or(0);
        let s = segments.swap_remove(worst);
        let mid = 0.5 * (s.a + s.b);
        if mid <= s.a || mid >= s.b {
            // Interval can no longer be split in floating point.
            return QuadratureEstimate {
                value,
                error,
                intervals: segments.len() + 1,
                converged: false,
            };
        }
        segments.push(kronrod_segment(&f, s.a, mid));
        segments.push(kronrod_segment(&f, mid, s.b));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_low_degree_nodes() {
        let rule = GaussLegendre::new(3).unwrap();
        let r = (3.0_f64 / 5.0).sqrt();
        assert_relative_eq!(rule.nodes()[0], r, epsilon = 1e-14);
        assert_relative_eq!(rule.nodes()[1], 0.0, epsilon = 1e-14);
        assert_relative_eq!(rule.nodes()[2], -r, epsilon = 1e-14);
        assert_relative_eq!(rule.weights()[0], 5.0 / 9.0, epsilon = 1e-14);
        assert_relative_eq!(rule.weights()[1], 8.0 / 9.0, epsilon = 1e-14);
    }

    #[test]
    fn test_weights_sum_to_interval_length() {
        for n in [1, 2, 7, 64, 1024] {
            let rule = GaussLegendre::new(n).unwrap();
            let total: f64 = rule.weights().iter().sum();
            assert_relative_eq!(total, 2.0, epsilon = 1e-12);
        }
    }

    #[test]
    fn test_polynomials_are_exact() {
        // Degree n integrates polynomials up to 2n − 1 exactly.
        let rule = GaussLegendre::new(5).unwrap();
        let value = rule.integrate(|x| x.powi(9) + 3.0 * x.powi(4), 0.0, 2.0);
        assert_relative_eq!(value, 1024.0 / 10.0 + 3.0 * 32.0 / 5.0, epsilon = 1e-11);
    }

    #[test]
    fn test_high_degree_smooth_integrand() {
        let rule = GaussLegendre::new(1024).unwrap();
        let value = rule.integrate(|x| x * x.sin(), 0.0, PI);
        assert_relative_eq!(value, PI, epsilon = 1e-12);
    }

    #[test]
    fn test_zero_degree_rejected() {
        assert!(matches!(GaussLegendre::new(0), Err(SimulationError::OutOfRange(_))));
    }

    #[test]
    fn test_kronrod_smooth() {
        let est = adaptive_gauss_kronrod(|x| x.exp(), 0.0, 1.0, 1e-12, 1e-10, 100);
        assert!(est.converged);
        assert_relative_eq!(est.value, 1.0_f64.exp() - 1.0, epsilon = 1e-12);
    }

    #[test]
    fn test_kronrod_refines_near_peak() {
        // Narrow Lorentzian: ∫ γ/(x² + γ²) over [−1, 1] = 2 atan(1/γ).
        let gamma = 1e-3;
        let est = adaptive_gauss_kronrod(|x| gamma / (x * x + gamma * gamma), -1.0, 1.0, 1e-10, 1e-10, 2000);
        assert!(est.converged);
        assert!(est.intervals > 1);
        assert_relative_eq!(est.value, 2.0 * (1.0 / gamma).atan(), epsilon = 1e-8);
    }

    #[test]
    fn test_kronrod_budget_exhaustion() {
        let est = adaptive_gauss_kronrod(|x| x.sqrt().recip(), 0.0, 1.0, 0.0, 0.0, 4);
        assert!(!est.converged);
        assert!(est.intervals <= 4);
    }
}
