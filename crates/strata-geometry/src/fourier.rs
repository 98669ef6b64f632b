//! Fourier factorisation of a single inclusion.
//!
//! The indicator function of a shape in a cell of area $A$ has Fourier
//! coefficients
//!
//! $$
//! c(\mathbf{G}) = \frac{1}{A} \int_{\text{shape}} e^{-i\mathbf{G}\cdot\mathbf{r}}\, d^2 r
//! $$
//!
//! and its convolution matrix in a harmonic basis is $S_{ij} = c(\mathbf{G}_i
//! - \mathbf{G}_j)$. An inclusion of permittivity $\varepsilon_{in}$ placed
//! into a host $\varepsilon_{host}$ contributes $(\varepsilon_{in} -
//! \varepsilon_{host}) S$ to each component (Laurent rule). Nested
//! inclusions are handled by the caller choosing the host: the child's
//! contribution replaces its parent's permittivity over the child's area.

use std::f64::consts::PI;

use ndarray::Array2;
use num_complex::Complex64;

use strata_materials::EpsilonTensor;

use crate::harmonics::Harmonics;
use crate::pattern::{polygon_signed_area, Shape};
use crate::special::{jinc, sinc};

/// The five permittivity Fourier matrices of a layer (or one inclusion's
/// share of them) and the anti-Hermitian parts used as absorption weights.
#[derive(Debug, Clone, PartialEq)]
pub struct FourierMatrices {
    pub eps_xx: Array2<Complex64>,
    pub eps_xy: Array2<Complex64>,
    pub eps_yx: Array2<Complex64>,
    pub eps_yy: Array2<Complex64>,
    pub eps_zz: Array2<Complex64>,
    pub im_xx: Array2<Complex64>,
    pub im_xy: Array2<Complex64>,
    pub im_yx: Array2<Complex64>,
    pub im_yy: Array2<Complex64>,
    pub im_zz: Array2<Complex64>,
}

impl FourierMatrices {
    pub fn zeros(n: usize) -> Self {
        let z = || Array2::<Complex64>::zeros((n, n));
        Self {
            eps_xx: z(),
            eps_xy: z(),
            eps_yx: z(),
            eps_yy: z(),
            eps_zz: z(),
            im_xx: z(),
            im_xy: z(),
            im_yx: z(),
            im_yy: z(),
            im_zz: z(),
        }
    }

    pub fn dim(&self) -> usize {
        self.eps_xx.nrows()
    }

    /// Add another set of matrices component-wise.
    pub fn accumulate(&mut self, other: &FourierMatrices) {
        self.eps_xx += &other.eps_xx;
        self.eps_xy += &other.eps_xy;
        self.eps_yx += &other.eps_yx;
        self.eps_yy += &other.eps_yy;
        self.eps_zz += &other.eps_zz;
        self.im_xx += &other.im_xx;
        self.im_xy += &other.im_xy;
        self.im_yx += &other.im_yx;
        self.im_yy += &other.im_yy;
        self.im_zz += &other.im_zz;
    }

    /// Add a uniform tensor (a multiple of the identity per component).
    ///
    /// Off-diagonal components are only added for anisotropic layers.
    pub fn add_uniform(&mut self, eps: &EpsilonTensor, anisotropic: bool) {
        let n = self.dim();
        for i in 0..n {
            self.eps_xx[[i, i]] += eps.xx;
            self.eps_yy[[i, i]] += eps.yy;
            self.eps_zz[[i, i]] += eps.zz;
            self.im_xx[[i, i]] += eps.xx.im;
            self.im_yy[[i, i]] += eps.yy.im;
            self.im_zz[[i, i]] += eps.zz.im;
        }
        if anisotropic {
            let (loss_xy, loss_yx) = eps.off_diagonal_loss();
            for i in 0..n {
                self.eps_xy[[i, i]] += eps.xy;
                self.eps_yx[[i, i]] += eps.yx;
                self.im_xy[[i, i]] += loss_xy;
                self.im_yx[[i, i]] += loss_yx;
            }
        }
    }
}

/// Fourier coefficient of a shape's indicator function at wavevector `g`.
///
/// `area` is the unit cell area, or the period for gratings.
pub fn shape_coefficient(shape: &Shape, g: [f64; 2], area: f64) -> Complex64 {
    let phase = |c: [f64; 2]| Complex64::from_polar(1.0, -(g[0] * c[0] + g[1] * c[1]));
    match shape {
        Shape::Grating(s) => {
            let p = Complex64::from_polar(1.0, -g[0] * s.center);
            p * (s.width / area * sinc(g[0] * s.width / 2.0))
        }
        Shape::Rectangle(r) => {
            let (gx, gy) = rotated(g, r.angle_deg);
            let amp = r.widths[0] * r.widths[1] / area
                * sinc(gx * r.widths[0] / 2.0)
                * sinc(gy * r.widths[1] / 2.0);
            phase(r.center) * amp
        }
        Shape::Circle(c) => {
            let rho = g[0].hypot(g[1]) * c.radius;
            phase(c.center) * (PI * c.radius * c.radius / area * jinc(rho))
        }
        Shape::Ellipse(e) => {
            let (gx, gy) = rotated(g, e.angle_deg);
            let rho = (e.half_widths[0] * gx).hypot(e.half_widths[1] * gy);
            phase(e.center) * (PI * e.half_widths[0] * e.half_widths[1] / area * jinc(rho))
        }
        Shape::Polygon(p) => polygon_coefficient(&p.absolute_vertices(), g, area),
    }
}

/// Components of `g` in a frame rotated by `angle_deg`.
fn rotated(g: [f64; 2], angle_deg: f64) -> (f64, f64) {
    let (s, c) = angle_deg.to_radians().sin_cos();
    (g[0] * c + g[1] * s, -g[0] * s + g[1] * c)
}

fn polygon_coefficient(vertices: &[[f64; 2]], g: [f64; 2], area: f64) -> Complex64 {
    let signed = polygon_signed_area(vertices);
    let g2 = g[0] * g[0] + g[1] * g[1];
    if g2 == 0.0 {
        return Complex64::new(signed.abs() / area, 0.0);
    }
    let n = vertices.len();
    let mut sum = Complex64::new(0.0, 0.0);
    for k in 0..n {
        let a = vertices[k];
        let b = vertices[(k + 1) % n];
        let d = [b[0] - a[0], b[1] - a[1]];
        let mid = [(a[0] + b[0]) / 2.0, (a[1] + b[1]) / 2.0];
        let weight = g[0] * d[1] - g[1] * d[0];
        let half = (g[0] * d[0] + g[1] * d[1]) / 2.0;
        sum += Complex64::from_polar(weight * sinc(half), -(g[0] * mid[0] + g[1] * mid[1]));
    }
    // Edge normals point outward only for counter-clockwise vertices.
    let orientation = signed.signum();
    Complex64::new(0.0, 1.0) * sum * (orientation / (g2 * area))
}

/// Convolution matrix `S[i][j] = c(G_i − G_j)` of a shape.
pub fn convolution_matrix(shape: &Shape, harmonics: &Harmonics, area: f64) -> Array2<Complex64> {
    let n = harmonics.len();
    Array2::from_shape_fn((n, n), |(i, j)| {
        let g = [
            harmonics.gx[i] - harmonics.gx[j],
            harmonics.gy[i] - harmonics.gy[j],
        ];
        shape_coefficient(shape, g, area)
    })
}

/// Fourier matrices contributed by one inclusion of permittivity
/// `inclusion` embedded in `host`.
///
/// Off-diagonal components (and their symmetrised imaginary parts) are only
/// produced for anisotropic layers.
pub fn factorize(
    shape: &Shape,
    inclusion: &EpsilonTensor,
    host: &EpsilonTensor,
    anisotropic: bool,
    harmonics: &Harmonics,
    area: f64,
) -> FourierMatrices {
    let s = convolution_matrix(shape, harmonics, area);
    let delta = inclusion.difference(host);
    let n = harmonics.len();
    let scaled = |c: Complex64| s.mapv(|v| v * c);

    let zeros = || Array2::<Complex64>::zeros((n, n));
    let (eps_xy, eps_yx, im_xy, im_yx) = if anisotropic {
        let (loss_xy, loss_yx) = delta.off_diagonal_loss();
        (
            scaled(delta.xy),
            scaled(delta.yx),
            scaled(loss_xy),
            scaled(loss_yx),
        )
    } else {
        (zeros(), zeros(), zeros(), zeros())
    };

    FourierMatrices {
        eps_xx: scaled(delta.xx),
        eps_xy,
        eps_yx,
        eps_yy: scaled(delta.yy),
        eps_zz: scaled(delta.zz),
        im_xx: scaled(Complex64::new(delta.xx.im, 0.0)),
        im_xy,
        im_yx,
        im_yy: scaled(Complex64::new(delta.yy.im, 0.0)),
        im_zz: scaled(Complex64::new(delta.zz.im, 0.0)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::harmonics::{generate_harmonics, Truncation};
    use crate::lattice::{Lattice, Periodicity};
    use crate::pattern::{Circle, Ellipse, Grating, Polygon, Rectangle};
    use approx::assert_relative_eq;

    fn square_harmonics(count: usize) -> Harmonics {
        let rec = Lattice::two_dimensional(1.0, 1.0, 90.0).unwrap().reciprocal();
        generate_harmonics(count, &rec, Periodicity::Two, Truncation::Parallelogramic).unwrap()
    }

    fn isotropic(re: f64, im: f64) -> EpsilonTensor {
        strata_materials::Permittivity::Scalar(Complex64::new(re, im)).to_tensor()
    }

    #[test]
    fn test_fill_factor_at_zero() {
        let shapes = [
            Shape::Rectangle(Rectangle {
                center: [0.1, 0.0],
                widths: [0.5, 0.4],
                angle_deg: 17.0,
            }),
            Shape::Circle(Circle {
                center: [0.0, 0.2],
                radius: 0.3,
            }),
            Shape::Ellipse(Ellipse {
                center: [0.0, 0.0],
                half_widths: [0.3, 0.1],
                angle_deg: 45.0,
            }),
            Shape::Polygon(Polygon {
                center: [0.0, 0.0],
                angle_deg: 0.0,
                vertices: vec![[0.0, 0.0], [0.4, 0.0], [0.0, 0.3]],
            }),
        ];
        for shape in &shapes {
            let c0 = shape_coefficient(shape, [0.0, 0.0], 1.0);
            assert_relative_eq!(c0.re, shape.area(), epsilon = 1e-12);
            assert_relative_eq!(c0.im, 0.0, epsilon = 1e-12);
        }
    }

    #[test]
    fn test_polygon_square_matches_rectangle() {
        let rect = Shape::Rectangle(Rectangle {
            center: [0.1, -0.05],
            widths: [0.4, 0.4],
            angle_deg: 0.0,
        });
        let ccw = Shape::Polygon(Polygon {
            center: [0.1, -0.05],
            angle_deg: 0.0,
            vertices: vec![[-0.2, -0.2], [0.2, -0.2], [0.2, 0.2], [-0.2, 0.2]],
        });
        let cw = Shape::Polygon(Polygon {
            center: [0.1, -0.05],
            angle_deg: 0.0,
            vertices: vec![[-0.2, 0.2], [0.2, 0.2], [0.2, -0.2], [-0.2, -0.2]],
        });
        for g in [[2.0 * PI, 0.0], [2.0 * PI, -4.0 * PI], [-6.0 * PI, 2.0 * PI]] {
            let a = shape_coefficient(&rect, g, 1.0);
            for poly in [&ccw, &cw] {
                let b = shape_coefficient(poly, g, 1.0);
                assert_relative_eq!(a.re, b.re, epsilon = 1e-12);
                assert_relative_eq!(a.im, b.im, epsilon = 1e-12);
            }
        }
    }

    #[test]
    fn test_ellipse_with_equal_axes_is_circle() {
        let circle = Shape::Circle(Circle {
            center: [0.2, 0.1],
            radius: 0.25,
        });
        let ellipse = Shape::Ellipse(Ellipse {
            center: [0.2, 0.1],
            half_widths: [0.25, 0.25],
            angle_deg: 33.0,
        });
        let g = [4.0 * PI, -2.0 * PI];
        let a = shape_coefficient(&circle, g, 1.0);
        let b = shape_coefficient(&ellipse, g, 1.0);
        assert_relative_eq!(a.re, b.re, epsilon = 1e-12);
        assert_relative_eq!(a.im, b.im, epsilon = 1e-12);
    }

    #[test]
    fn test_grating_coefficient() {
        let g = Shape::Grating(Grating {
            center: 0.0,
            width: 0.5,
        });
        // Half filling: c(2π/p) = sin(π/2) / π.
        let c = shape_coefficient(&g, [2.0 * PI, 0.0], 1.0);
        assert_relative_eq!(c.re, 1.0 / PI, epsilon = 1e-12);
        assert_relative_eq!(c.im, 0.0, epsilon = 1e-12);
    }

    #[test]
    fn test_convolution_matrix_is_hermitian() {
        let h = square_harmonics(25);
        let s = convolution_matrix(
            &Shape::Ellipse(Ellipse {
                center: [0.1, 0.3],
                half_widths: [0.3, 0.15],
                angle_deg: 20.0,
            }),
            &h,
            1.0,
        );
        for i in 0..h.len() {
            for j in 0..h.len() {
                let d = s[[i, j]] - s[[j, i]].conj();
                assert!(d.norm() < 1e-12, "S not Hermitian at ({i}, {j})");
            }
        }
    }

    #[test]
    fn test_factorize_isotropic_leaves_off_diagonals_empty() {
        let h = square_harmonics(9);
        let shape = Shape::Circle(Circle {
            center: [0.0, 0.0],
            radius: 0.2,
        });
        let m = factorize(&shape, &isotropic(4.0, -1.0), &isotropic(1.0, 0.0), false, &h, 1.0);
        assert!(m.eps_xy.iter().all(|c| c.norm() == 0.0));
        let fill = PI * 0.04;
        let z = h.zero_index;
        assert_relative_eq!(m.eps_xx[[z, z]].re, 3.0 * fill, epsilon = 1e-12);
        assert_relative_eq!(m.eps_xx[[z, z]].im, -fill, epsilon = 1e-12);
        assert_relative_eq!(m.im_zz[[z, z]].re, -fill, epsilon = 1e-12);
    }

    #[test]
    fn test_uniform_background() {
        let mut m = FourierMatrices::zeros(3);
        m.add_uniform(&isotropic(2.0, -0.5), false);
        assert_eq!(m.eps_zz[[1, 1]], Complex64::new(2.0, -0.5));
        assert_eq!(m.im_xx[[2, 2]], Complex64::new(-0.5, 0.0));
        assert_eq!(m.eps_xx[[0, 1]], Complex64::new(0.0, 0.0));
    }
}
