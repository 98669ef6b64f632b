//! The simulation orchestrator.
//!
//! A [`Simulation`] owns the material registry, the layer stack, the lattice
//! and all solver options. Building a structure, calling
//! [`init_simulation`](Simulation::init_simulation) and then one of the
//! integration methods produces the flux spectrum Φ(ω).
//!
//! Lengths are in metres and frequencies are angular (rad/s). Permittivity
//! values passed to the material setters use the internal sign convention
//! (absorption has a negative imaginary part); values read from files and
//! values returned by [`epsilon_at`](Simulation::epsilon_at) use the usual
//! convention with a positive imaginary part.
//!
//! Changing the structure, the materials, the lattice or the solver options
//! discards the current initialisation, so `init_simulation` has to be
//! called again before solving. Integration settings can be changed freely.

use std::fmt::Write as _;
use std::path::Path;
use std::sync::Arc;

use log::{debug, info};
use num_complex::Complex64;

use strata_compute::{ComputeBackend, CpuBackend};
use strata_geometry::pattern::{Circle, Ellipse, Grating, Polygon, Rectangle};
use strata_geometry::{
    generate_harmonics, Harmonics, Lattice, Pattern, Periodicity, ReciprocalLattice, Shape,
    Truncation,
};
use strata_materials::{load_permittivity, Material, Permittivity, PermittivityKind};

use crate::cache::{SolveSetup, SolveState};
use crate::error::SimulationError;
use crate::flux::{FluxKernel, PlanarFluxKernel};
use crate::fmm::LayerMatrices;
use crate::integrate::{
    integrate_chunk, integrate_grid, integrate_k_parallel, k_parallel_integrand, AxisIntegral,
    Evaluator, KParallelIntegral,
};
use crate::structure::{Layer, MaterialRegistry, Structure};
use crate::types::{
    EpsilonSample, FluxSpectrum, Polarization, QuadratureRule, RealizationPoint,
    SimulationOptions, LENGTH_SCALE,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Axis {
    X,
    Y,
}

/// A thermal flux simulation of a layered, optionally patterned structure.
pub struct Simulation {
    periodicity: Periodicity,
    materials: MaterialRegistry,
    structure: Structure,
    lattice: Option<Lattice>,
    num_harmonics: usize,
    options: SimulationOptions,
    probe: Option<String>,
    kx: Option<AxisIntegral>,
    ky: Option<AxisIntegral>,
    k_parallel: Option<KParallelIntegral>,
    backend: Arc<dyn ComputeBackend>,
    kernel: Arc<dyn FluxKernel>,
    setup: Option<SolveSetup>,
    state: SolveState,
    phi: Vec<f64>,
}

impl Simulation {
    fn new(periodicity: Periodicity) -> Self {
        Self {
            periodicity,
            materials: MaterialRegistry::new(),
            structure: Structure::new(),
            lattice: None,
            num_harmonics: 1,
            options: SimulationOptions::default(),
            probe: None,
            kx: None,
            ky: None,
            k_parallel: None,
            backend: Arc::new(CpuBackend::new()),
            kernel: Arc::new(PlanarFluxKernel),
            setup: None,
            state: SolveState::new(),
            phi: Vec::new(),
        }
    }

    /// Unpatterned stack.
    pub fn planar() -> Self {
        Self::new(Periodicity::None)
    }

    /// Stack with 1-D gratings, periodic along x.
    pub fn grating() -> Self {
        Self::new(Periodicity::One)
    }

    /// Stack with 2-D patterns on an oblique lattice.
    pub fn patterned() -> Self {
        Self::new(Periodicity::Two)
    }

    /// Replace the flux kernel.
    pub fn with_kernel(mut self, kernel: Arc<dyn FluxKernel>) -> Self {
        self.kernel = kernel;
        self.invalidate();
        self
    }

    /// Replace the compute backend.
    pub fn with_backend(mut self, backend: Arc<dyn ComputeBackend>) -> Self {
        self.backend = backend;
        self
    }

    pub fn periodicity(&self) -> Periodicity {
        self.periodicity
    }

    pub fn options(&self) -> &SimulationOptions {
        &self.options
    }

    pub fn is_initialized(&self) -> bool {
        self.setup.is_some()
    }

    fn invalidate(&mut self) {
        if self.setup.take().is_some() {
            debug!("Simulation setup invalidated");
        }
        self.state.invalidate();
        self.phi.clear();
    }

    // ---------------------------------------------------------------
    // Materials
    // ---------------------------------------------------------------

    /// Load a material from a permittivity file.
    pub fn add_material(&mut self, name: &str, path: impl AsRef<Path>) -> Result<(), SimulationError> {
        self.ensure_new_material(name)?;
        let table = load_permittivity(path.as_ref())?;
        let material = Material::new(name, table.frequencies, table.values)?;
        self.insert_material(material)
    }

    /// Add a material from angular frequencies and samples.
    pub fn add_material_values(
        &mut self,
        name: &str,
        frequencies: Vec<f64>,
        values: Vec<Permittivity>,
    ) -> Result<(), SimulationError> {
        self.ensure_new_material(name)?;
        let material = Material::new(name, frequencies, values)?;
        self.insert_material(material)
    }

    fn ensure_new_material(&self, name: &str) -> Result<(), SimulationError> {
        if self.materials.id(name).is_ok() {
            return Err(SimulationError::already_exists("material", name));
        }
        Ok(())
    }

    fn insert_material(&mut self, material: Material) -> Result<(), SimulationError> {
        info!(
            "Adding material '{}' ({}, {} frequencies)",
            material.name(),
            material.kind(),
            material.len()
        );
        self.materials.insert(material)?;
        self.invalidate();
        Ok(())
    }

    /// Replace every sample of an existing material.
    ///
    /// Layers containing the material update their anisotropy flag when the
    /// material changes between tensor and non-tensor kinds.
    pub fn set_material(&mut self, name: &str, values: Vec<Permittivity>) -> Result<(), SimulationError> {
        let id = self.materials.id(name)?;
        let material = self
            .materials
            .get_mut(id)
            .ok_or_else(|| SimulationError::not_found("material", name))?;
        material.replace(values)?;
        for layer in self.structure.layers_mut() {
            if layer.uses_material(id) && layer.refresh_anisotropy(&self.materials) {
                debug!("Layer '{}' anisotropy is now {}", layer.name, layer.anisotropic);
            }
        }
        self.invalidate();
        Ok(())
    }

    /// Replace every sample of an existing material from rows of re/im
    /// pairs. `kind` is one of `scalar`, `diagonal` or `tensor`, with rows
    /// of 2, 6 or 10 numbers respectively.
    pub fn set_material_raw(&mut self, name: &str, rows: &[Vec<f64>], kind: &str) -> Result<(), SimulationError> {
        let kind: PermittivityKind = kind.parse()?;
        let values = rows
            .iter()
            .map(|row| Permittivity::from_fields(kind, row))
            .collect::<Result<Vec<_>, _>>()?;
        self.set_material(name, values)
    }

    pub fn material_names(&self) -> Vec<&str> {
        self.materials.iter().map(|m| m.name()).collect()
    }

    pub fn materials(&self) -> &MaterialRegistry {
        &self.materials
    }

    // ---------------------------------------------------------------
    // Layers
    // ---------------------------------------------------------------

    fn check_thickness(thickness: f64) -> Result<(), SimulationError> {
        if thickness.is_finite() && thickness >= 0.0 {
            Ok(())
        } else {
            Err(SimulationError::OutOfRange(format!(
                "layer thickness must be non-negative, got {thickness}"
            )))
        }
    }

    /// Add a layer on top of the stack.
    pub fn add_layer(&mut self, name: &str, thickness: f64, material: &str) -> Result<(), SimulationError> {
        Self::check_thickness(thickness)?;
        let background = self.materials.id(material)?;
        let mut layer = Layer::new(name, background, thickness);
        layer.refresh_anisotropy(&self.materials);
        self.structure.push(layer)?;
        self.invalidate();
        Ok(())
    }

    /// Change the background material and thickness of a layer.
    pub fn set_layer(&mut self, name: &str, thickness: f64, material: &str) -> Result<(), SimulationError> {
        Self::check_thickness(thickness)?;
        let background = self.materials.id(material)?;
        let layer = self.structure.by_name_mut(name)?;
        layer.background = background;
        layer.thickness = thickness;
        layer.refresh_anisotropy(&self.materials);
        self.invalidate();
        Ok(())
    }

    pub fn set_layer_thickness(&mut self, name: &str, thickness: f64) -> Result<(), SimulationError> {
        Self::check_thickness(thickness)?;
        self.structure.by_name_mut(name)?.thickness = thickness;
        self.invalidate();
        Ok(())
    }

    /// Add a copy of an existing layer (patterns included) on top of the
    /// stack. The copy is never a source.
    pub fn add_layer_copy(&mut self, name: &str, original: &str) -> Result<(), SimulationError> {
        let mut layer = self.structure.by_name(original)?.clone();
        layer.name = name.to_string();
        layer.is_source = false;
        self.structure.push(layer)?;
        self.invalidate();
        Ok(())
    }

    pub fn delete_layer(&mut self, name: &str) -> Result<(), SimulationError> {
        self.structure.remove(name)?;
        self.invalidate();
        Ok(())
    }

    /// Layer names from bottom to top.
    pub fn layer_names(&self) -> Vec<&str> {
        self.structure.layers().iter().map(|l| l.name.as_str()).collect()
    }

    pub fn structure(&self) -> &Structure {
        &self.structure
    }

    // ---------------------------------------------------------------
    // Patterns
    // ---------------------------------------------------------------

    fn add_pattern(
        &mut self,
        layer: &str,
        material: &str,
        shape: Shape,
        required: Periodicity,
    ) -> Result<(), SimulationError> {
        if self.periodicity != required {
            return Err(SimulationError::InvalidConfiguration(format!(
                "{} patterns need {:?} periodicity, this simulation is {:?}",
                shape.kind_name(),
                required,
                self.periodicity
            )));
        }
        let material = self.materials.id(material)?;
        let tensor = self.materials.is_tensor(material);
        let target = self.structure.by_name_mut(layer)?;
        let pattern = Pattern::nested_in(shape, material, None, &target.patterns)?;
        debug!(
            "Layer '{}': {} pattern {} embedded in {}",
            target.name,
            pattern.shape.kind_name(),
            target.patterns.len(),
            pattern
                .parent
                .map_or_else(|| "the background".to_string(), |p| format!("pattern {p}"))
        );
        target.patterns.push(pattern);
        if tensor {
            target.anisotropic = true;
        }
        self.invalidate();
        Ok(())
    }

    /// Add a grating stripe of `width` centred at `center`.
    pub fn set_layer_pattern_grating(
        &mut self,
        layer: &str,
        material: &str,
        center: f64,
        width: f64,
    ) -> Result<(), SimulationError> {
        let shape = Shape::Grating(Grating { center, width });
        self.add_pattern(layer, material, shape, Periodicity::One)
    }

    /// Add a rectangle of full widths `widths`, rotated by `angle_deg`.
    pub fn set_layer_pattern_rectangle(
        &mut self,
        layer: &str,
        material: &str,
        center: [f64; 2],
        angle_deg: f64,
        widths: [f64; 2],
    ) -> Result<(), SimulationError> {
        let shape = Shape::Rectangle(Rectangle {
            center,
            widths,
            angle_deg,
        });
        self.add_pattern(layer, material, shape, Periodicity::Two)
    }

    pub fn set_layer_pattern_circle(
        &mut self,
        layer: &str,
        material: &str,
        center: [f64; 2],
        radius: f64,
    ) -> Result<(), SimulationError> {
        let shape = Shape::Circle(Circle { center, radius });
        self.add_pattern(layer, material, shape, Periodicity::Two)
    }

    /// Add an ellipse with semi-axes `half_widths`, rotated by `angle_deg`.
    pub fn set_layer_pattern_ellipse(
        &mut self,
        layer: &str,
        material: &str,
        center: [f64; 2],
        angle_deg: f64,
        half_widths: [f64; 2],
    ) -> Result<(), SimulationError> {
        let shape = Shape::Ellipse(Ellipse {
            center,
            half_widths,
            angle_deg,
        });
        self.add_pattern(layer, material, shape, Periodicity::Two)
    }

    /// Add a polygon with vertices relative to `center`, rotated by
    /// `angle_deg`. At least three vertices are required.
    pub fn set_layer_pattern_polygon(
        &mut self,
        layer: &str,
        material: &str,
        center: [f64; 2],
        angle_deg: f64,
        vertices: &[[f64; 2]],
    ) -> Result<(), SimulationError> {
        let shape = Shape::Polygon(Polygon {
            center,
            angle_deg,
            vertices: vertices.to_vec(),
        });
        self.add_pattern(layer, material, shape, Periodicity::Two)
    }

    // ---------------------------------------------------------------
    // Lattice
    // ---------------------------------------------------------------

    fn set_lattice(&mut self, lattice: Lattice) {
        // Bounds derived from the old lattice no longer apply.
        if self.kx.is_some_and(|a| !a.preset) {
            self.kx = None;
        }
        if self.ky.is_some_and(|a| !a.preset) {
            self.ky = None;
        }
        self.lattice = Some(lattice);
        self.invalidate();
    }

    /// Set the period of a 1-D grating (m).
    pub fn set_lattice_1d(&mut self, period: f64) -> Result<(), SimulationError> {
        if self.periodicity != Periodicity::One {
            return Err(SimulationError::InvalidConfiguration(format!(
                "a 1-D lattice needs One periodicity, this simulation is {:?}",
                self.periodicity
            )));
        }
        let lattice = Lattice::one_dimensional(period)?;
        self.set_lattice(lattice);
        Ok(())
    }

    /// Set a 2-D lattice spanned by `(x_len, 0)` and
    /// `y_len (cos θ, sin θ)`. The angle must lie in (0°, 180°).
    pub fn set_lattice_2d(&mut self, x_len: f64, y_len: f64, angle_deg: f64) -> Result<(), SimulationError> {
        if self.periodicity != Periodicity::Two {
            return Err(SimulationError::InvalidConfiguration(format!(
                "a 2-D lattice needs Two periodicity, this simulation is {:?}",
                self.periodicity
            )));
        }
        let lattice = Lattice::two_dimensional(x_len, y_len, angle_deg)?;
        self.set_lattice(lattice);
        Ok(())
    }

    pub fn lattice(&self) -> Option<&Lattice> {
        self.lattice.as_ref()
    }

    pub fn reciprocal_lattice(&self) -> Option<ReciprocalLattice> {
        self.lattice.as_ref().map(Lattice::reciprocal)
    }

    // ---------------------------------------------------------------
    // Source and probe
    // ---------------------------------------------------------------

    /// Mark a layer as the emitting layer. Any previous source is cleared.
    pub fn set_source_layer(&mut self, name: &str) -> Result<(), SimulationError> {
        let id = self.structure.position(name)?;
        for (i, layer) in self.structure.layers_mut().iter_mut().enumerate() {
            layer.is_source = i == id;
        }
        self.invalidate();
        Ok(())
    }

    /// Measure the flux at the lower boundary of `name`, which must not lie
    /// below the source layer.
    pub fn set_probe_layer(&mut self, name: &str) -> Result<(), SimulationError> {
        let id = self.structure.position(name)?;
        if let Some(source) = self.structure.source() {
            if id < source {
                return Err(SimulationError::OutOfRange(format!(
                    "probe layer '{name}' lies below the source layer '{}'",
                    self.structure.layers()[source].name
                )));
            }
        }
        self.probe = Some(name.to_string());
        self.invalidate();
        Ok(())
    }

    // ---------------------------------------------------------------
    // Options
    // ---------------------------------------------------------------

    /// Number of harmonics to retain. Ignored for planar stacks.
    pub fn set_num_of_harmonics(&mut self, count: usize) -> Result<(), SimulationError> {
        if count == 0 {
            return Err(SimulationError::OutOfRange(
                "number of harmonics must be at least 1".into(),
            ));
        }
        self.num_harmonics = count;
        self.invalidate();
        Ok(())
    }

    pub fn num_of_harmonics(&self) -> usize {
        self.num_harmonics
    }

    pub fn opt_polarization(&mut self, polarization: Polarization) {
        self.options.polarization = polarization;
    }

    /// Select `"Circular"` or `"Parallelogramic"` truncation.
    pub fn opt_truncation(&mut self, truncation: &str) -> Result<(), SimulationError> {
        let truncation: Truncation = truncation.parse()?;
        self.options.truncation = truncation;
        self.invalidate();
        Ok(())
    }

    pub fn opt_print_intermediate(&mut self, enabled: bool) {
        self.options.print_intermediate = enabled;
    }

    /// Run on a dedicated pool of `threads` workers, capped at the hardware
    /// parallelism.
    pub fn set_threads(&mut self, threads: usize) -> Result<(), SimulationError> {
        self.backend = Arc::new(CpuBackend::with_threads(threads)?);
        Ok(())
    }

    pub fn opt_use_gauss_legendre(&mut self, degree: usize) -> Result<(), SimulationError> {
        if degree == 0 {
            return Err(SimulationError::OutOfRange(
                "Gauss-Legendre degree must be at least 1".into(),
            ));
        }
        self.options.quadrature = QuadratureRule::GaussLegendre { degree };
        Ok(())
    }

    pub fn opt_use_gauss_kronrod(&mut self) {
        self.options.quadrature = QuadratureRule::GaussKronrod;
    }

    /// Tolerances and interval budget of the adaptive k-parallel quadrature.
    pub fn opt_adaptive_tolerance(
        &mut self,
        abs_tolerance: f64,
        rel_tolerance: f64,
        max_subdivisions: usize,
    ) -> Result<(), SimulationError> {
        if !(abs_tolerance >= 0.0 && rel_tolerance >= 0.0) || max_subdivisions == 0 {
            return Err(SimulationError::OutOfRange(format!(
                "invalid adaptive quadrature settings: abs {abs_tolerance}, rel {rel_tolerance}, \
                 max intervals {max_subdivisions}"
            )));
        }
        self.options.abs_tolerance = abs_tolerance;
        self.options.rel_tolerance = rel_tolerance;
        self.options.max_subdivisions = max_subdivisions;
        Ok(())
    }

    // ---------------------------------------------------------------
    // Integration setup
    // ---------------------------------------------------------------

    /// Bound of an axis derived from the reciprocal lattice, if the
    /// periodicity provides one.
    fn derived_bound(&self, axis: Axis) -> Result<Option<f64>, SimulationError> {
        let needs_lattice = matches!(
            (self.periodicity, axis),
            (Periodicity::One, Axis::X) | (Periodicity::Two, _)
        );
        if !needs_lattice {
            return Ok(None);
        }
        let rec = self.reciprocal_lattice().ok_or_else(|| {
            SimulationError::InvalidConfiguration("lattice not set".into())
        })?;
        Ok(Some(match axis {
            Axis::X => rec.b1_norm() / 2.0,
            Axis::Y => rec.b2_norm() / 2.0,
        }))
    }

    fn axis(&self, axis: Axis, points: usize, end: f64, symmetric: bool) -> Result<AxisIntegral, SimulationError> {
        if points < 2 {
            return Err(SimulationError::OutOfRange(format!(
                "an integration axis needs at least 2 points, got {points}"
            )));
        }
        let derived = self.derived_bound(axis)?;
        if end != 0.0 {
            return AxisIntegral::new(points, end, true, symmetric);
        }
        match derived {
            Some(bound) => AxisIntegral::new(points, bound, false, symmetric),
            None => Err(SimulationError::InvalidConfiguration(format!(
                "integration bound along {axis:?} cannot be zero for {:?} periodicity",
                self.periodicity
            ))),
        }
    }

    /// Sample kx over [−end, end]. `end` is normalised by ω/c; zero derives
    /// the bound from the reciprocal lattice (half the first Brillouin zone).
    pub fn set_kx_integral(&mut self, points: usize, end: f64) -> Result<(), SimulationError> {
        self.kx = Some(self.axis(Axis::X, points, end, false)?);
        Ok(())
    }

    /// Sample kx over [0, end] and double, for structures symmetric in x.
    pub fn set_kx_integral_sym(&mut self, points: usize, end: f64) -> Result<(), SimulationError> {
        self.kx = Some(self.axis(Axis::X, points, end, true)?);
        Ok(())
    }

    pub fn set_ky_integral(&mut self, points: usize, end: f64) -> Result<(), SimulationError> {
        self.ky = Some(self.axis(Axis::Y, points, end, false)?);
        Ok(())
    }

    pub fn set_ky_integral_sym(&mut self, points: usize, end: f64) -> Result<(), SimulationError> {
        self.ky = Some(self.axis(Axis::Y, points, end, true)?);
        Ok(())
    }

    /// Use radial integration over [0, end] (normalised by ω/c). Planar
    /// stacks only.
    pub fn set_k_parallel_integral(&mut self, end: f64) -> Result<(), SimulationError> {
        if self.periodicity != Periodicity::None {
            return Err(SimulationError::InvalidConfiguration(
                "k-parallel integration is only available for planar stacks".into(),
            ));
        }
        self.k_parallel = Some(KParallelIntegral::new(end)?);
        Ok(())
    }

    // ---------------------------------------------------------------
    // Solve
    // ---------------------------------------------------------------

    /// Validate the structure and fix the frequency-independent solve data.
    pub fn init_simulation(&mut self) -> Result<(), SimulationError> {
        self.invalidate();
        if self.structure.is_empty() {
            return Err(SimulationError::InvalidConfiguration("the structure has no layers".into()));
        }
        let omega = self
            .materials
            .frequencies()
            .ok_or_else(|| SimulationError::InvalidConfiguration("no materials defined".into()))?
            .to_vec();
        let source = self
            .structure
            .source()
            .ok_or_else(|| SimulationError::InvalidConfiguration("no source layer set".into()))?;
        let probe_name = self
            .probe
            .as_deref()
            .ok_or_else(|| SimulationError::InvalidConfiguration("no probe layer set".into()))?;
        let probe = self.structure.position(probe_name)?;
        if probe < source {
            return Err(SimulationError::OutOfRange(format!(
                "probe layer '{probe_name}' lies below the source layer '{}'",
                self.structure.layers()[source].name
            )));
        }

        let (reciprocal, area) = match (self.periodicity, &self.lattice) {
            (Periodicity::None, _) => (ReciprocalLattice::default(), 0.0),
            (_, None) => {
                return Err(SimulationError::InvalidConfiguration("lattice not set".into()));
            }
            (Periodicity::One, Some(l)) => (l.reciprocal(), l.area * LENGTH_SCALE),
            (Periodicity::Two, Some(l)) => (l.reciprocal(), l.area * LENGTH_SCALE * LENGTH_SCALE),
        };
        let harmonics = generate_harmonics(
            self.num_harmonics,
            &reciprocal,
            self.periodicity,
            self.options.truncation,
        )?
        .scaled(1.0 / LENGTH_SCALE);

        let materials = &self.materials;
        for layer in self.structure.layers_mut() {
            layer.refresh_anisotropy(materials);
        }
        let layers = self.structure.layers();
        let mut thicknesses: Vec<f64> = layers.iter().map(|l| l.thickness * LENGTH_SCALE).collect();
        thicknesses[0] = 0.0;
        let last = thicknesses.len() - 1;
        thicknesses[last] = 0.0;

        let setup = SolveSetup {
            omega,
            thicknesses,
            sources: layers.iter().map(|l| l.is_source).collect(),
            probe,
            harmonics,
            area,
            reciprocal,
        };
        info!(
            "Initialised {} layers, {} frequencies, {} harmonics, source '{}', probe '{}', kernel '{}'",
            layers.len(),
            setup.frequency_count(),
            setup.harmonics.len(),
            layers[source].name,
            probe_name,
            self.kernel.name()
        );
        self.phi = vec![0.0; setup.frequency_count()];
        self.setup = Some(setup);
        debug!("{}", self.system_info());
        Ok(())
    }

    fn require_setup(setup: &Option<SolveSetup>) -> Result<&SolveSetup, SimulationError> {
        setup.as_ref().ok_or_else(|| {
            SimulationError::InvalidConfiguration("call init_simulation before solving".into())
        })
    }

    fn require_axes(&self) -> Result<(AxisIntegral, AxisIntegral), SimulationError> {
        match (self.kx, self.ky) {
            (Some(kx), Some(ky)) => Ok((kx, ky)),
            _ => Err(SimulationError::InvalidConfiguration(
                "both kx and ky integrals must be set".into(),
            )),
        }
    }

    /// Scaled flux `ω/(2π³c) · ξ` at one frequency and normalised
    /// wavevector.
    pub fn flux_at_kx_ky(&mut self, omega_index: usize, kx: f64, ky: f64) -> Result<f64, SimulationError> {
        let Simulation {
            structure,
            materials,
            kernel,
            options,
            setup,
            state,
            ..
        } = self;
        let setup = Self::require_setup(setup)?;
        let eval = evaluator(structure, materials, setup, kernel.as_ref(), options);
        eval.prepare(state, omega_index)?;
        Ok(eval.flux(&state.operators, omega_index, kx, ky))
    }

    /// Radial integrand `(ω/c)³/π² · k · ξ(k, 0)` of a planar stack.
    pub fn flux_at_k_parallel(&mut self, omega_index: usize, k: f64) -> Result<f64, SimulationError> {
        self.require_planar("k-parallel flux")?;
        self.require_k_parallel()?;
        let Simulation {
            structure,
            materials,
            kernel,
            options,
            setup,
            state,
            ..
        } = self;
        let setup = Self::require_setup(setup)?;
        let eval = evaluator(structure, materials, setup, kernel.as_ref(), options);
        eval.prepare(state, omega_index)?;
        Ok(k_parallel_integrand(&eval, &state.operators, omega_index, k))
    }

    fn require_k_parallel(&self) -> Result<KParallelIntegral, SimulationError> {
        self.k_parallel.ok_or_else(|| {
            SimulationError::InvalidConfiguration(
                "k-parallel integration needs set_k_parallel_integral first".into(),
            )
        })
    }

    fn require_planar(&self, what: &str) -> Result<(), SimulationError> {
        if self.periodicity == Periodicity::None {
            Ok(())
        } else {
            Err(SimulationError::InvalidConfiguration(format!(
                "{what} is only available for planar stacks"
            )))
        }
    }

    /// Integrate over the (kx, ky) grid for every frequency.
    pub fn integrate_kx_ky(&mut self) -> Result<(), SimulationError> {
        let (kx, ky) = self.require_axes()?;
        let Simulation {
            structure,
            materials,
            kernel,
            backend,
            options,
            setup,
            state,
            phi,
            ..
        } = self;
        let setup = Self::require_setup(setup)?;
        let eval = evaluator(structure, materials, setup, kernel.as_ref(), options);
        integrate_grid(&eval, state, backend.as_ref(), &kx, &ky, phi)
    }

    /// Integrate this rank's share of the flattened (ω, kx, ky) index space.
    ///
    /// The partial sums are added to [`phi`](Self::phi), so running ranks
    /// `0..size` on one simulation, or adding the spectra of separate
    /// processes, gives the full integral.
    pub fn integrate_kx_ky_chunk(&mut self, rank: usize, size: usize) -> Result<(), SimulationError> {
        let (kx, ky) = self.require_axes()?;
        let Simulation {
            structure,
            materials,
            kernel,
            backend,
            options,
            setup,
            state,
            phi,
            ..
        } = self;
        let setup = Self::require_setup(setup)?;
        let eval = evaluator(structure, materials, setup, kernel.as_ref(), options);
        integrate_chunk(&eval, state, backend.as_ref(), &kx, &ky, rank, size, phi)
    }

    /// Radial integration for planar stacks.
    pub fn integrate_k_parallel(&mut self) -> Result<(), SimulationError> {
        self.require_planar("k-parallel integration")?;
        let bound = self.require_k_parallel()?;
        let Simulation {
            structure,
            materials,
            kernel,
            backend,
            options,
            setup,
            phi,
            ..
        } = self;
        let setup = Self::require_setup(setup)?;
        let eval = evaluator(structure, materials, setup, kernel.as_ref(), options);
        integrate_k_parallel(&eval, backend.as_ref(), &bound, options, phi)
    }

    // ---------------------------------------------------------------
    // Results
    // ---------------------------------------------------------------

    /// Flux per frequency. Zeroed by [`init_simulation`](Self::init_simulation)
    /// and accumulated by every integration; empty while the simulation
    /// needs re-initialising.
    pub fn phi(&self) -> &[f64] {
        &self.phi
    }

    /// Angular frequencies (rad/s) shared by all materials.
    pub fn omega(&self) -> &[f64] {
        self.materials.frequencies().unwrap_or(&[])
    }

    pub fn spectrum(&self) -> FluxSpectrum {
        FluxSpectrum {
            omega: self.omega().to_vec(),
            phi: self.phi.clone(),
        }
    }

    // ---------------------------------------------------------------
    // Introspection
    // ---------------------------------------------------------------

    /// Reconstructed permittivity at `position = [x, y, z]` (m), with z
    /// measured from the top of the bottom layer.
    pub fn epsilon_at(&mut self, omega_index: usize, position: [f64; 3]) -> Result<EpsilonSample, SimulationError> {
        let layer = {
            let setup = Self::require_setup(&self.setup)?;
            locate_layer(&setup.thicknesses, position[2] * LENGTH_SCALE)
        };
        self.epsilon_in_layer(omega_index, layer, position[0], position[1])
    }

    fn epsilon_in_layer(
        &mut self,
        omega_index: usize,
        layer: usize,
        x: f64,
        y: f64,
    ) -> Result<EpsilonSample, SimulationError> {
        let Simulation {
            structure,
            materials,
            setup,
            state,
            ..
        } = self;
        let setup = Self::require_setup(setup)?;
        setup.check_index(omega_index)?;
        state.ensure(omega_index, structure, materials, setup)?;
        let matrices = state.matrices.get(layer).ok_or_else(|| {
            SimulationError::OutOfRange(format!("layer index {layer} is out of range"))
        })?;
        Ok(reconstruct(
            matrices,
            &setup.harmonics,
            x * LENGTH_SCALE,
            y * LENGTH_SCALE,
        ))
    }

    /// Sample the reconstructed permittivity of `layer` on an `nu × nv`
    /// grid spanning one unit cell.
    pub fn layer_pattern_realization(
        &mut self,
        omega_index: usize,
        layer: &str,
        nu: usize,
        nv: usize,
    ) -> Result<Vec<RealizationPoint>, SimulationError> {
        if nu == 0 || nv == 0 {
            return Err(SimulationError::OutOfRange(format!(
                "sampling grid must be at least 1x1, got {nu}x{nv}"
            )));
        }
        let lattice = self.lattice.ok_or_else(|| {
            SimulationError::InvalidConfiguration(
                "pattern realization needs a periodic lattice".into(),
            )
        })?;
        let index = self.structure.position(layer)?;
        Self::require_setup(&self.setup)?;

        let len_u = lattice.a1[0].hypot(lattice.a1[1]);
        let len_v = lattice.a2[0].hypot(lattice.a2[1]);
        let du = if nu == 1 { len_u } else { len_u / (nu - 1) as f64 };
        let dv = if nv == 1 { len_v } else { len_v / (nv - 1) as f64 };
        let (sin, cos) = lattice.angle_deg.to_radians().sin_cos();

        let mut points = Vec::with_capacity(nu * nv);
        for i in 0..nu {
            for j in 0..nv {
                let x = du * i as f64 + dv * j as f64 * cos;
                let y = dv * j as f64 * sin;
                let epsilon = self.epsilon_in_layer(omega_index, index, x, y)?;
                points.push(RealizationPoint { x, y, epsilon });
            }
        }
        Ok(points)
    }

    /// Human-readable description of the stack, bottom to top.
    pub fn system_info(&self) -> String {
        let mut out = String::new();
        let rule = "=".repeat(50);
        let _ = writeln!(out, "{rule}");
        let _ = writeln!(out, "The system has {} layers.", self.structure.len());
        match (self.periodicity, &self.lattice) {
            (Periodicity::None, _) => {
                let _ = writeln!(out, "Planar stack, no lattice.");
            }
            (_, None) => {
                let _ = writeln!(out, "Lattice not set.");
            }
            (Periodicity::One, Some(l)) => {
                let _ = writeln!(out, "Periodicity in x is {:e} m", l.a1[0]);
            }
            (Periodicity::Two, Some(l)) => {
                let _ = writeln!(
                    out,
                    "Lattice vectors are ({:e}, {:e}), ({:e}, {:e}) m",
                    l.a1[0], l.a1[1], l.a2[0], l.a2[1]
                );
            }
        }
        let _ = writeln!(out, "{rule}");
        let _ = writeln!(out, "Layers from bottom to top:");
        let _ = writeln!(out, "{rule}");

        let material_name = |id: usize| self.materials.get(id).map_or("?", |m| m.name());
        for (i, layer) in self.structure.layers().iter().enumerate() {
            let _ = writeln!(out, "Layer {i}: {}", layer.name);
            let _ = writeln!(out, "Thickness: {:e} m", layer.thickness);
            let _ = writeln!(out, "Anisotropic: {}", yes_no(layer.anisotropic));
            let _ = writeln!(out, "Source: {}", yes_no(layer.is_source));
            let _ = writeln!(out, "Background: {}", material_name(layer.background));
            for (k, pattern) in layer.patterns.iter().enumerate() {
                let _ = writeln!(
                    out,
                    "Pattern {}: {} of {}",
                    k + 1,
                    describe_shape(&pattern.shape),
                    material_name(pattern.material)
                );
                if let Some(parent) = pattern.parent {
                    let _ = writeln!(out, "  contained in pattern {}", parent + 1);
                }
            }
            let _ = writeln!(out, "{rule}");
        }
        out
    }
}

fn evaluator<'a>(
    structure: &'a Structure,
    materials: &'a MaterialRegistry,
    setup: &'a SolveSetup,
    kernel: &'a dyn FluxKernel,
    options: &SimulationOptions,
) -> Evaluator<'a> {
    Evaluator {
        structure,
        materials,
        setup,
        kernel,
        polarization: options.polarization,
        print_intermediate: options.print_intermediate,
    }
}

/// Index of the layer containing height `z` (internal units), measured from
/// the top of the bottom layer.
fn locate_layer(thicknesses: &[f64], z: f64) -> usize {
    let mut offset = 0.0;
    for (i, &t) in thicknesses.iter().enumerate().skip(1) {
        if z > offset && z <= offset + t {
            return i;
        }
        offset += t;
    }
    if z > offset {
        thicknesses.len().saturating_sub(1)
    } else {
        0
    }
}

/// Evaluate the Fourier series of a layer's permittivity at (x, y), in
/// internal units, returning the file sign convention.
fn reconstruct(matrices: &LayerMatrices, harmonics: &Harmonics, x: f64, y: f64) -> EpsilonSample {
    let row = harmonics.zero_index;
    let f = &matrices.fourier;
    let mut sums = [Complex64::new(0.0, 0.0); 5];
    for j in 0..harmonics.len() {
        let [gx, gy] = harmonics.vector(j);
        let phase = Complex64::new(0.0, -(gx * x + gy * y)).exp();
        sums[0] += f.eps_xx[[row, j]] * phase;
        sums[1] += f.eps_xy[[row, j]] * phase;
        sums[2] += f.eps_yx[[row, j]] * phase;
        sums[3] += f.eps_yy[[row, j]] * phase;
        sums[4] += f.eps_zz[[row, j]] * phase;
    }
    EpsilonSample {
        xx: sums[0].conj(),
        xy: sums[1].conj(),
        yx: sums[2].conj(),
        yy: sums[3].conj(),
        zz: sums[4].conj(),
    }
}

fn yes_no(flag: bool) -> &'static str {
    if flag {
        "yes"
    } else {
        "no"
    }
}

fn describe_shape(shape: &Shape) -> String {
    match shape {
        Shape::Grating(g) => format!("grating (center, width) = ({:e}, {:e})", g.center, g.width),
        Shape::Rectangle(r) => format!(
            "rectangle center ({:e}, {:e}), widths ({:e}, {:e}), angle {}",
            r.center[0], r.center[1], r.widths[0], r.widths[1], r.angle_deg
        ),
        Shape::Circle(c) => format!(
            "circle center ({:e}, {:e}), radius {:e}",
            c.center[0], c.center[1], c.radius
        ),
        Shape::Ellipse(e) => format!(
            "ellipse center ({:e}, {:e}), semi-axes ({:e}, {:e}), angle {}",
            e.center[0], e.center[1], e.half_widths[0], e.half_widths[1], e.angle_deg
        ),
        Shape::Polygon(p) => {
            let vertices = p
                .absolute_vertices()
                .iter()
                .map(|v| format!("({:e}, {:e})", v[0], v[1]))
                .collect::<Vec<_>>()
                .join(", ");
            format!("polygon angle {}, vertices {vertices}", p.angle_deg)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_locate_layer() {
        // Bottom and top are half spaces; two slabs of 1 and 2 units.
        let t = [0.0, 1.0, 2.0, 0.0];
        assert_eq!(locate_layer(&t, -5.0), 0);
        assert_eq!(locate_layer(&t, 0.0), 0);
        assert_eq!(locate_layer(&t, 0.5), 1);
        assert_eq!(locate_layer(&t, 1.0), 1);
        assert_eq!(locate_layer(&t, 2.5), 2);
        assert_eq!(locate_layer(&t, 10.0), 3);
    }

    #[test]
    fn test_pattern_needs_matching_periodicity() {
        let mut sim = Simulation::planar();
        sim.add_material_values("A", vec![1e14], vec![Permittivity::Scalar(Complex64::new(1.0, 0.0))])
            .unwrap();
        sim.add_layer("slab", 1e-6, "A").unwrap();
        let err = sim.set_layer_pattern_circle("slab", "A", [0.0, 0.0], 1e-7);
        assert!(matches!(err, Err(SimulationError::InvalidConfiguration(_))));
    }

    #[test]
    fn test_derived_bound_needs_lattice() {
        let mut sim = Simulation::grating();
        assert!(matches!(
            sim.set_kx_integral(10, 0.0),
            Err(SimulationError::InvalidConfiguration(_))
        ));
        sim.set_lattice_1d(1e-6).unwrap();
        sim.set_kx_integral(10, 0.0).unwrap();
        // ky of a grating has no lattice bound.
        assert!(matches!(
            sim.set_ky_integral(10, 0.0),
            Err(SimulationError::InvalidConfiguration(_))
        ));
        sim.set_ky_integral(10, 1.0).unwrap();
    }
}
