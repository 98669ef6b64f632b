//! TOML configuration deserialisation for flux jobs.

use std::path::{Path, PathBuf};

use anyhow::Context;
use serde::Deserialize;
use strata_core::Polarization;

/// Top-level job configuration.
#[derive(Debug, Deserialize)]
pub struct JobConfig {
    pub simulation: SimulationConfig,
    #[serde(default)]
    pub lattice: Option<LatticeConfig>,
    #[serde(rename = "material")]
    pub materials: Vec<MaterialConfig>,
    #[serde(rename = "layer")]
    pub layers: Vec<LayerConfig>,
    pub integration: IntegrationConfig,
    #[serde(default)]
    pub output: OutputConfig,
}

/// Structure-wide settings.
#[derive(Debug, Deserialize)]
pub struct SimulationConfig {
    /// "planar", "grating" or "patterned".
    #[serde(default = "default_periodicity")]
    pub periodicity: String,
    /// Layer that emits.
    pub source: String,
    /// Layer at whose lower boundary the flux is measured.
    pub probe: String,
    #[serde(default = "default_harmonics")]
    pub harmonics: usize,
    /// "Circular" or "Parallelogramic".
    #[serde(default)]
    pub truncation: Option<String>,
    #[serde(default)]
    pub polarization: Polarization,
    /// Worker threads (default: all cores).
    #[serde(default)]
    pub threads: Option<usize>,
    #[serde(default)]
    pub print_intermediate: bool,
}

fn default_periodicity() -> String {
    "planar".into()
}

fn default_harmonics() -> usize {
    1
}

/// Unit cell of a periodic structure, in metres.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub enum LatticeConfig {
    OneDimensional {
        period: f64,
    },
    TwoDimensional {
        x_len: f64,
        y_len: f64,
        #[serde(default = "default_lattice_angle")]
        angle: f64,
    },
}

fn default_lattice_angle() -> f64 {
    90.0
}

/// A named material, either read from a permittivity file or given inline.
#[derive(Debug, Deserialize)]
pub struct MaterialConfig {
    pub name: String,
    #[serde(flatten)]
    pub source: MaterialSource,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub enum MaterialSource {
    /// Path to a permittivity table, relative to the job file.
    File { file: PathBuf },
    /// Angular frequencies (rad/s) and one row of re/im pairs per
    /// frequency (2, 6 or 10 numbers). Absorption is a positive imaginary
    /// part, as in permittivity files.
    Inline {
        frequencies: Vec<f64>,
        values: Vec<Vec<f64>>,
    },
}

/// One layer, listed bottom to top.
#[derive(Debug, Deserialize)]
pub struct LayerConfig {
    pub name: String,
    /// Thickness in metres. Ignored for the outermost layers.
    #[serde(default)]
    pub thickness: f64,
    /// Background material.
    pub material: String,
    #[serde(default, rename = "pattern")]
    pub patterns: Vec<PatternConfig>,
}

/// An embedded shape. Lengths in metres, angles in degrees.
#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum PatternConfig {
    Grating {
        material: String,
        center: f64,
        width: f64,
    },
    Rectangle {
        material: String,
        center: [f64; 2],
        #[serde(default)]
        angle: f64,
        widths: [f64; 2],
    },
    Circle {
        material: String,
        center: [f64; 2],
        radius: f64,
    },
    Ellipse {
        material: String,
        center: [f64; 2],
        #[serde(default)]
        angle: f64,
        half_widths: [f64; 2],
    },
    Polygon {
        material: String,
        center: [f64; 2],
        #[serde(default)]
        angle: f64,
        vertices: Vec<[f64; 2]>,
    },
}

/// How the flux spectrum is integrated.
#[derive(Debug, Deserialize)]
#[serde(tag = "method", rename_all = "snake_case")]
pub enum IntegrationConfig {
    /// Rectangle rule over a (kx, ky) grid.
    Grid {
        kx: AxisConfig,
        ky: AxisConfig,
        /// Integrate only one rank's share of the grid.
        #[serde(default)]
        chunk: Option<ChunkConfig>,
    },
    /// Radial quadrature for planar stacks.
    KParallel {
        /// Upper bound, normalised by ω/c.
        end: f64,
        #[serde(default)]
        rule: QuadratureConfig,
    },
}

/// One wavevector axis. `end = 0` derives the bound from the lattice.
#[derive(Debug, Clone, Copy, Deserialize)]
pub struct AxisConfig {
    pub points: usize,
    #[serde(default)]
    pub end: f64,
    /// Sample [0, end] and double.
    #[serde(default)]
    pub symmetric: bool,
}

#[derive(Debug, Clone, Copy, Deserialize)]
pub struct ChunkConfig {
    pub rank: usize,
    pub size: usize,
}

#[derive(Debug, Clone, Copy, Deserialize)]
#[serde(tag = "name", rename_all = "snake_case")]
pub enum QuadratureConfig {
    GaussLegendre {
        #[serde(default = "default_degree")]
        degree: usize,
    },
    GaussKronrod {
        #[serde(default)]
        abs_tolerance: Option<f64>,
        #[serde(default)]
        rel_tolerance: Option<f64>,
        #[serde(default)]
        max_subdivisions: Option<usize>,
    },
}

impl Default for QuadratureConfig {
    fn default() -> Self {
        QuadratureConfig::GaussLegendre {
            degree: default_degree(),
        }
    }
}

fn default_degree() -> usize {
    strata_core::types::DEFAULT_QUADRATURE_DEGREE
}

/// Output configuration.
#[derive(Debug, Deserialize)]
pub struct OutputConfig {
    /// Output directory (default: "./output").
    #[serde(default = "default_output_dir")]
    pub directory: String,
    /// Whether to save the spectrum as CSV (default: true).
    #[serde(default = "default_true")]
    pub save_spectrum: bool,
    /// Whether to also save the spectrum as JSON (default: false).
    #[serde(default)]
    pub save_json: bool,
    /// Print the layer summary before solving.
    #[serde(default)]
    pub system_info: bool,
    /// Sample one layer's reconstructed permittivity after solving.
    #[serde(default)]
    pub realization: Option<RealizationConfig>,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            directory: default_output_dir(),
            save_spectrum: true,
            save_json: false,
            system_info: false,
            realization: None,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct RealizationConfig {
    pub layer: String,
    #[serde(default)]
    pub omega_index: usize,
    #[serde(default = "default_samples")]
    pub nu: usize,
    #[serde(default = "default_samples")]
    pub nv: usize,
}

fn default_samples() -> usize {
    50
}

fn default_output_dir() -> String {
    "./output".into()
}

fn default_true() -> bool {
    true
}

/// Load and parse a TOML job configuration file.
pub fn load_config(path: &Path) -> anyhow::Result<JobConfig> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("reading job file {}", path.display()))?;
    parse_config(&content).with_context(|| format!("parsing job file {}", path.display()))
}

pub fn parse_config(content: &str) -> anyhow::Result<JobConfig> {
    let config: JobConfig = toml::from_str(content)?;
    Ok(config)
}
