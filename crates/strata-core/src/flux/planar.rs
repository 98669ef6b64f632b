//! Flux kernel for single-harmonic stacks.
//!
//! With one harmonic every layer is a homogeneous uniaxial slab and the two
//! polarizations decouple. For each polarization the fluctuating sheet
//! currents of the source layer are propagated to the probe layer with
//! Airy-type reflection recursions and the resulting Poynting flux is
//! integrated analytically over the source thickness.
//!
//! Fields follow the physical $e^{-i\omega t}$ convention with
//! $\Im k_z \ge 0$; the internal permittivities are conjugated on entry.
//! In each layer a wave is described by its continuous tangential field
//! amplitude $F$ (E for TE, H for TM) and admittance $q$ ($k_z$ for TE,
//! $k_z / \varepsilon_\parallel$ for TM), so the flux of up- and
//! down-going amplitudes $a, b$ is $\Re[(a + b)\,\overline{q (a - b)}]$.
//!
//! The result is normalised so that a black body radiating into vacuum
//! gives exactly 1 per polarization for every propagating wavevector.

use log::debug;
use num_complex::Complex64;

use strata_geometry::Harmonics;

use crate::error::SimulationError;
use crate::flux::{FluxInput, FluxKernel};
use crate::modes::LayerOperators;
use crate::types::Polarization;

const I: Complex64 = Complex64 { re: 0.0, im: 1.0 };
const ONE: Complex64 = Complex64 { re: 1.0, im: 0.0 };

/// Kernel for unpatterned (or homogenised) stacks with in-plane isotropic
/// layers.
#[derive(Debug, Clone, Copy, Default)]
pub struct PlanarFluxKernel;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Wave {
    Te,
    Tm,
}

/// Optical constants of one layer for one polarization.
#[derive(Debug, Clone, Copy)]
struct Slab {
    kz: Complex64,
    q: Complex64,
    d: f64,
    eps: Complex64,
    eps_zz: Complex64,
    /// Im ε∥ (physical sign).
    loss: f64,
    /// Im εzz (physical sign).
    loss_zz: f64,
}

/// A sheet current component: amplitudes emitted upward and downward, and
/// its fluctuation weight.
#[derive(Debug, Clone, Copy)]
struct Emitter {
    up: Complex64,
    down: Complex64,
    weight: f64,
}

fn sqrt_upper(z: Complex64) -> Complex64 {
    let s = z.sqrt();
    if s.im < 0.0 {
        -s
    } else {
        s
    }
}

fn fresnel(qa: Complex64, qb: Complex64) -> Complex64 {
    let den = qa + qb;
    if den.norm() == 0.0 {
        Complex64::new(0.0, 0.0)
    } else {
        (qa - qb) / den
    }
}

fn combine(r: Complex64, gamma: Complex64) -> Complex64 {
    (r + gamma) / (ONE + r * gamma)
}

/// `(1 − e^{−x d}) / x`, tending to `d` as `x → 0`.
fn decay_window(x: f64, d: f64) -> f64 {
    if (x * d).abs() < 1e-10 {
        d
    } else {
        -(-x * d).exp_m1() / x
    }
}

/// `(1 − e^{−i y d}) / (i y)`, tending to `d` as `y → 0`.
fn phase_window(y: f64, d: f64) -> Complex64 {
    let phi = y * d;
    if phi.abs() < 1e-10 {
        return Complex64::new(d, 0.0);
    }
    let half = (phi / 2.0).sin();
    Complex64::new(phi.sin() / phi, -2.0 * half * half / phi) * d
}

/// `∫₀^d |α e^{iκζ} + β e^{2iκd} e^{−iκζ}|² dζ`, written so that no
/// growing exponential appears.
fn slab_integral(alpha: Complex64, beta: Complex64, kz: Complex64, d: f64) -> f64 {
    let decay = (-2.0 * kz.im * d).exp();
    let w = decay_window(2.0 * kz.im, d);
    let direct = alpha.norm_sqr() * w;
    let reflected = beta.norm_sqr() * decay * w;
    let cross = 2.0 * (alpha * beta.conj() * phase_window(2.0 * kz.re, d) * decay).re;
    direct + reflected + cross
}

/// `∫₀^∞ |α e^{iκζ}|² dζ`.
fn half_space_integral(alpha: Complex64, kz: Complex64) -> f64 {
    if kz.im > 0.0 {
        alpha.norm_sqr() / (2.0 * kz.im)
    } else {
        0.0
    }
}

impl PlanarFluxKernel {
    fn slabs(input: &FluxInput<'_>, wave: Wave) -> Vec<Slab> {
        let k2 = input.kx * input.kx + input.ky * input.ky;
        input
            .operators
            .iter()
            .zip(input.thicknesses)
            .map(|(op, &d)| {
                let eps = op.eps_xx(0, 0).conj();
                let eps_zz = (ONE / op.eps_zz_inv[[0, 0]]).conj();
                let kz = match wave {
                    Wave::Te => input.k0 * sqrt_upper(eps - k2),
                    Wave::Tm => input.k0 * sqrt_upper(eps * (ONE - k2 / eps_zz)),
                };
                let q = match wave {
                    Wave::Te => kz,
                    Wave::Tm => kz / eps,
                };
                Slab {
                    kz,
                    q,
                    d,
                    eps,
                    eps_zz,
                    loss: -op.grand_imaginary[[0, 0]].re,
                    loss_zz: -op.grand_imaginary[[2, 2]].re,
                }
            })
            .collect()
    }

    fn emitters(slab: &Slab, wave: Wave, k0: f64, k_parallel: f64) -> Vec<Emitter> {
        match wave {
            Wave::Te => {
                let u = ONE / (2.0 * slab.kz);
                vec![Emitter {
                    up: u,
                    down: u,
                    weight: k0 * k0 * slab.loss,
                }]
            }
            Wave::Tm => {
                let c = slab.eps * (k_parallel * k0) / (2.0 * slab.kz * slab.eps_zz);
                vec![
                    Emitter {
                        up: Complex64::new(-0.5, 0.0),
                        down: Complex64::new(0.5, 0.0),
                        weight: slab.loss,
                    },
                    Emitter {
                        up: c,
                        down: c,
                        weight: slab.loss_zz,
                    },
                ]
            }
        }
    }

    fn polarized_flux(input: &FluxInput<'_>, wave: Wave) -> f64 {
        let slabs = Self::slabs(input, wave);
        let n = slabs.len();
        let t = input.probe;
        if n < 2 || t >= n {
            return 0.0;
        }
        let round_trip = |i: usize| (I * 2.0 * slabs[i].kz * slabs[i].d).exp();

        // Reflection at the top of each layer looking up, and at its bottom
        // looking down.
        let mut r_up = vec![Complex64::new(0.0, 0.0); n];
        for i in (0..n - 1).rev() {
            let gamma = r_up[i + 1] * round_trip(i + 1);
            r_up[i] = combine(fresnel(slabs[i].q, slabs[i + 1].q), gamma);
        }
        let mut r_dn = vec![Complex64::new(0.0, 0.0); n];
        for i in 1..n {
            let gamma = r_dn[i - 1] * round_trip(i - 1);
            r_dn[i] = combine(fresnel(slabs[i].q, slabs[i - 1].q), gamma);
        }

        let k_parallel = (input.kx * input.kx + input.ky * input.ky).sqrt();
        let mut total = 0.0;

        for (s, slab) in slabs.iter().enumerate().take(t + 1) {
            if !input.sources.get(s).copied().unwrap_or(false) {
                continue;
            }
            if s == t && s == 0 {
                // No lower boundary to measure at.
                continue;
            }
            let cavity = ONE - r_dn[s] * r_up[s] * round_trip(s);
            let cavity2 = cavity.norm_sqr();

            for emitter in Self::emitters(slab, wave, input.k0, k_parallel) {
                if emitter.weight == 0.0 {
                    continue;
                }
                let contribution = if s < t {
                    let depth = if s == 0 {
                        half_space_integral(emitter.up, slab.kz)
                    } else {
                        slab_integral(emitter.up, r_dn[s] * emitter.down, slab.kz, slab.d)
                    };
                    let mut amp = ONE;
                    for m in s + 1..=t {
                        let gamma = r_up[m] * round_trip(m);
                        amp *= (ONE + r_up[m - 1]) / (ONE + gamma);
                        if m < t {
                            amp *= (I * slabs[m].kz * slabs[m].d).exp();
                        }
                    }
                    let gamma_t = r_up[t] * round_trip(t);
                    let probe = ((ONE + gamma_t) * (slabs[t].q * (ONE - gamma_t)).conj()).re;
                    emitter.weight * depth / cavity2 * amp.norm_sqr() * probe
                } else {
                    let depth = if s == n - 1 {
                        half_space_integral(emitter.down, slab.kz)
                    } else {
                        slab_integral(emitter.down, r_up[s] * emitter.up, slab.kz, slab.d)
                    };
                    let probe = ((ONE + r_dn[s]) * (slab.q * (r_dn[s] - ONE)).conj()).re;
                    emitter.weight * depth / cavity2 * probe
                };
                if contribution.is_finite() {
                    total += contribution;
                } else {
                    debug!(
                        "Dropping non-finite {:?} contribution from layer {} at k = ({}, {})",
                        wave, s, input.kx, input.ky
                    );
                }
            }
        }
        4.0 * total
    }
}

impl FluxKernel for PlanarFluxKernel {
    fn name(&self) -> &str {
        "planar"
    }

    fn check(
        &self,
        operators: &[LayerOperators],
        harmonics: &Harmonics,
    ) -> Result<(), SimulationError> {
        if harmonics.len() != 1 {
            return Err(SimulationError::InvalidConfiguration(format!(
                "the planar flux kernel needs exactly one harmonic, got {}",
                harmonics.len()
            )));
        }
        for (i, op) in operators.iter().enumerate() {
            let xx = op.eps_xx(0, 0);
            let scale = xx.norm().max(1.0);
            let in_plane_split = (xx - op.eps_yy(0, 0)).norm()
                + op.eps_xy(0, 0).norm()
                + op.eps_yx(0, 0).norm();
            if in_plane_split > 1e-9 * scale {
                return Err(SimulationError::InvalidConfiguration(format!(
                    "layer {i} is anisotropic in plane; the planar flux kernel needs εxx = εyy and εxy = εyx = 0"
                )));
            }
        }
        Ok(())
    }

    fn flux(&self, input: &FluxInput<'_>) -> f64 {
        match input.polarization {
            Polarization::TE => Self::polarized_flux(input, Wave::Te),
            Polarization::TM => Self::polarized_flux(input, Wave::Tm),
            Polarization::Both => {
                Self::polarized_flux(input, Wave::Te) + Self::polarized_flux(input, Wave::Tm)
            }
        }
    }
}
