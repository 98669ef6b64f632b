//! Simulation runner: builds the structure from a job and integrates it.

use std::io::Write;
use std::path::Path;

use anyhow::{bail, Context, Result};
use log::info;

use strata_core::{FluxSpectrum, Permittivity, RealizationPoint, Simulation};
use strata_materials::PermittivityKind;

use crate::config::{
    IntegrationConfig, JobConfig, LatticeConfig, MaterialSource, PatternConfig, QuadratureConfig,
};

/// Results of a run.
pub struct RunOutput {
    pub spectrum: FluxSpectrum,
    pub realization: Option<Vec<RealizationPoint>>,
}

/// Build and initialise the simulation described by `job`. Relative
/// material paths are resolved against `base_dir`.
pub fn build_simulation(job: &JobConfig, base_dir: &Path) -> Result<Simulation> {
    let cfg = &job.simulation;
    let mut sim = match cfg.periodicity.as_str() {
        "planar" => Simulation::planar(),
        "grating" => Simulation::grating(),
        "patterned" => Simulation::patterned(),
        other => bail!("Unknown periodicity '{other}'. Valid values: planar, grating, patterned"),
    };

    for material in &job.materials {
        match &material.source {
            MaterialSource::File { file } => {
                let path = base_dir.join(file);
                sim.add_material(&material.name, &path)
                    .with_context(|| format!("material '{}' from {}", material.name, path.display()))?;
            }
            MaterialSource::Inline { frequencies, values } => {
                let values = inline_values(values)
                    .with_context(|| format!("material '{}'", material.name))?;
                sim.add_material_values(&material.name, frequencies.clone(), values)
                    .with_context(|| format!("material '{}'", material.name))?;
            }
        }
    }

    match (&job.lattice, cfg.periodicity.as_str()) {
        (None, _) | (_, "planar") => {}
        (Some(LatticeConfig::OneDimensional { period }), _) => sim.set_lattice_1d(*period)?,
        (Some(LatticeConfig::TwoDimensional { x_len, y_len, angle }), _) => {
            sim.set_lattice_2d(*x_len, *y_len, *angle)?
        }
    }

    for layer in &job.layers {
        sim.add_layer(&layer.name, layer.thickness, &layer.material)
            .with_context(|| format!("layer '{}'", layer.name))?;
        for (i, pattern) in layer.patterns.iter().enumerate() {
            add_pattern(&mut sim, &layer.name, pattern)
                .with_context(|| format!("layer '{}' pattern {}", layer.name, i + 1))?;
        }
    }
    sim.set_source_layer(&cfg.source).context("source layer")?;
    sim.set_probe_layer(&cfg.probe).context("probe layer")?;

    sim.set_num_of_harmonics(cfg.harmonics)?;
    if let Some(truncation) = &cfg.truncation {
        sim.opt_truncation(truncation)?;
    }
    sim.opt_polarization(cfg.polarization);
    sim.opt_print_intermediate(cfg.print_intermediate);
    if let Some(threads) = cfg.threads {
        sim.set_threads(threads)?;
    }

    match &job.integration {
        IntegrationConfig::Grid { kx, ky, .. } => {
            let kx_set = if kx.symmetric {
                sim.set_kx_integral_sym(kx.points, kx.end)
            } else {
                sim.set_kx_integral(kx.points, kx.end)
            };
            kx_set.context("kx integral")?;
            let ky_set = if ky.symmetric {
                sim.set_ky_integral_sym(ky.points, ky.end)
            } else {
                sim.set_ky_integral(ky.points, ky.end)
            };
            ky_set.context("ky integral")?;
        }
        IntegrationConfig::KParallel { end, rule } => {
            sim.set_k_parallel_integral(*end)?;
            match *rule {
                QuadratureConfig::GaussLegendre { degree } => sim.opt_use_gauss_legendre(degree)?,
                QuadratureConfig::GaussKronrod {
                    abs_tolerance,
                    rel_tolerance,
                    max_subdivisions,
                } => {
                    sim.opt_use_gauss_kronrod();
                    let defaults = sim.options().clone();
                    sim.opt_adaptive_tolerance(
                        abs_tolerance.unwrap_or(defaults.abs_tolerance),
                        rel_tolerance.unwrap_or(defaults.rel_tolerance),
                        max_subdivisions.unwrap_or(defaults.max_subdivisions),
                    )?;
                }
            }
        }
    }

    sim.init_simulation().context("initialising the simulation")?;
    Ok(sim)
}

/// Convert inline rows (file sign convention) to samples.
fn inline_values(rows: &[Vec<f64>]) -> Result<Vec<Permittivity>> {
    rows.iter()
        .enumerate()
        .map(|(i, row)| {
            let kind = PermittivityKind::from_field_count(row.len()).with_context(|| {
                format!("row {} has {} numbers, expected 2, 6 or 10", i + 1, row.len())
            })?;
            Ok(Permittivity::from_fields(kind, row)?.conj())
        })
        .collect()
}

fn add_pattern(sim: &mut Simulation, layer: &str, pattern: &PatternConfig) -> Result<()> {
    match pattern {
        PatternConfig::Grating {
            material,
            center,
            width,
        } => sim.set_layer_pattern_grating(layer, material, *center, *width)?,
        PatternConfig::Rectangle {
            material,
            center,
            angle,
            widths,
        } => sim.set_layer_pattern_rectangle(layer, material, *center, *angle, *widths)?,
        PatternConfig::Circle {
            material,
            center,
            radius,
        } => sim.set_layer_pattern_circle(layer, material, *center, *radius)?,
        PatternConfig::Ellipse {
            material,
            center,
            angle,
            half_widths,
        } => sim.set_layer_pattern_ellipse(layer, material, *center, *angle, *half_widths)?,
        PatternConfig::Polygon {
            material,
            center,
            angle,
            vertices,
        } => sim.set_layer_pattern_polygon(layer, material, *center, *angle, vertices)?,
    }
    Ok(())
}

/// Run a full job.
pub fn run_simulation(job: &JobConfig, base_dir: &Path) -> Result<RunOutput> {
    let mut sim = build_simulation(job, base_dir)?;
    if job.output.system_info {
        println!("{}", sim.system_info());
    }
    println!(
        "Structure: {} layers, {} frequencies, {} harmonics requested",
        sim.layer_names().len(),
        sim.omega().len(),
        sim.num_of_harmonics()
    );

    match &job.integration {
        IntegrationConfig::Grid { chunk: None, .. } => sim.integrate_kx_ky()?,
        IntegrationConfig::Grid {
            chunk: Some(chunk), ..
        } => {
            info!("Integrating chunk {} of {}", chunk.rank, chunk.size);
            sim.integrate_kx_ky_chunk(chunk.rank, chunk.size)?
        }
        IntegrationConfig::KParallel { .. } => sim.integrate_k_parallel()?,
    }

    let realization = match &job.output.realization {
        Some(r) => Some(
            sim.layer_pattern_realization(r.omega_index, &r.layer, r.nu, r.nv)
                .with_context(|| format!("sampling layer '{}'", r.layer))?,
        ),
        None => None,
    };

    Ok(RunOutput {
        spectrum: sim.spectrum(),
        realization,
    })
}

fn create_parent(path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("creating directory {}", parent.display()))?;
    }
    Ok(())
}

/// Write the flux spectrum to a CSV file with a metadata header.
pub fn write_spectrum_csv(spectrum: &FluxSpectrum, path: &Path, job: &JobConfig) -> Result<()> {
    create_parent(path)?;
    let mut file = std::fs::File::create(path)
        .with_context(|| format!("creating {}", path.display()))?;

    writeln!(file, "# Strata flux spectrum")?;
    writeln!(file, "# Version: {}", env!("CARGO_PKG_VERSION"))?;
    writeln!(file, "# periodicity: {}", job.simulation.periodicity)?;
    writeln!(file, "# harmonics: {}", job.simulation.harmonics)?;
    writeln!(file, "# polarization: {:?}", job.simulation.polarization)?;
    writeln!(
        file,
        "# source: {}, probe: {}",
        job.simulation.source, job.simulation.probe
    )?;
    for layer in &job.layers {
        writeln!(
            file,
            "# layer '{}': material={}, thickness={:e} m, patterns={}",
            layer.name,
            layer.material,
            layer.thickness,
            layer.patterns.len()
        )?;
    }
    writeln!(file, "#")?;
    writeln!(file, "omega_rad_s,phi")?;

    for (omega, phi) in spectrum.omega.iter().zip(&spectrum.phi) {
        writeln!(file, "{:.6e},{:.6e}", omega, phi)?;
    }

    println!("Spectrum written to: {}", path.display());
    Ok(())
}

/// Write the flux spectrum to a JSON file.
pub fn write_spectrum_json(spectrum: &FluxSpectrum, path: &Path) -> Result<()> {
    create_parent(path)?;
    let json = serde_json::to_string_pretty(spectrum).context("serialising the spectrum")?;
    std::fs::write(path, json).with_context(|| format!("writing {}", path.display()))?;

    println!("Spectrum (JSON) written to: {}", path.display());
    Ok(())
}

/// Write a sampled layer cross-section to a CSV file.
pub fn write_realization_csv(points: &[RealizationPoint], path: &Path) -> Result<()> {
    create_parent(path)?;
    let mut file = std::fs::File::create(path)
        .with_context(|| format!("creating {}", path.display()))?;
    writeln!(file, "# Strata layer permittivity realization")?;
    writeln!(file, "#")?;
    writeln!(
        file,
        "x_m,y_m,re_xx,im_xx,re_xy,im_xy,re_yx,im_yx,re_yy,im_yy,re_zz,im_zz"
    )?;
    for point in points {
        let values = point
            .epsilon
            .to_array()
            .iter()
            .map(|v| format!("{v:.6e}"))
            .collect::<Vec<_>>()
            .join(",");
        writeln!(file, "{:.6e},{:.6e},{}", point.x, point.y, values)?;
    }

    println!("Realization written to: {}", path.display());
    Ok(())
}
