//! Integration tests: structure building, validation and introspection
//! through the public `Simulation` API.

use std::io::Write;

use approx::assert_relative_eq;
use num_complex::Complex64;
use strata_core::{Permittivity, Simulation, SimulationError};

fn scalar(re: f64, im: f64, count: usize) -> Vec<Permittivity> {
    vec![Permittivity::Scalar(Complex64::new(re, im)); count]
}

fn three_layer_stack() -> Simulation {
    let mut sim = Simulation::planar();
    let omega = vec![1e14, 2e14];
    sim.add_material_values("Vacuum", omega.clone(), scalar(1.0, 0.0, 2)).unwrap();
    sim.add_material_values("SiC", omega, scalar(4.0, -0.5, 2)).unwrap();
    sim.add_layer("Bottom", 0.0, "SiC").unwrap();
    sim.add_layer("Gap", 1e-7, "Vacuum").unwrap();
    sim.add_layer("Top", 0.0, "SiC").unwrap();
    sim
}

#[test]
fn test_names_are_unique() {
    let mut sim = three_layer_stack();
    assert!(matches!(
        sim.add_material_values("SiC", vec![1e14, 2e14], scalar(1.0, 0.0, 2)),
        Err(SimulationError::AlreadyExists { .. })
    ));
    assert!(matches!(
        sim.add_layer("Gap", 1e-7, "Vacuum"),
        Err(SimulationError::AlreadyExists { .. })
    ));
    assert!(matches!(
        sim.add_layer("Other", 1e-7, "Gold"),
        Err(SimulationError::NotFound { .. })
    ));
    assert!(matches!(
        sim.set_source_layer("Missing"),
        Err(SimulationError::NotFound { .. })
    ));
}

#[test]
fn test_frequency_count_mismatch_rejected() {
    let mut sim = three_layer_stack();
    let err = sim.add_material_values("Gold", vec![1e14, 2e14, 3e14], scalar(-10.0, -1.0, 3));
    assert!(matches!(err, Err(SimulationError::MalformedInput(_))));
    assert_eq!(sim.material_names(), vec!["Vacuum", "SiC"]);
}

#[test]
fn test_probe_below_source_rejected() {
    let mut sim = three_layer_stack();
    sim.set_source_layer("Gap").unwrap();
    assert!(matches!(
        sim.set_probe_layer("Bottom"),
        Err(SimulationError::OutOfRange(_))
    ));

    // Setting the source after the probe is caught at initialisation.
    let mut sim = three_layer_stack();
    sim.set_probe_layer("Gap").unwrap();
    sim.set_source_layer("Top").unwrap();
    assert!(matches!(sim.init_simulation(), Err(SimulationError::OutOfRange(_))));
}

#[test]
fn test_source_is_exclusive() {
    let mut sim = three_layer_stack();
    sim.set_source_layer("Bottom").unwrap();
    sim.set_source_layer("Gap").unwrap();
    let sources: Vec<bool> = sim.structure().layers().iter().map(|l| l.is_source).collect();
    assert_eq!(sources, vec![false, true, false]);
}

#[test]
fn test_init_requires_source_and_probe() {
    let mut sim = three_layer_stack();
    assert!(matches!(
        sim.init_simulation(),
        Err(SimulationError::InvalidConfiguration(_))
    ));
    sim.set_source_layer("Bottom").unwrap();
    assert!(matches!(
        sim.init_simulation(),
        Err(SimulationError::InvalidConfiguration(_))
    ));
    sim.set_probe_layer("Top").unwrap();
    sim.init_simulation().unwrap();
    assert_eq!(sim.phi(), &[0.0, 0.0]);
}

#[test]
fn test_mutation_requires_reinit() {
    let mut sim = three_layer_stack();
    sim.set_source_layer("Bottom").unwrap();
    sim.set_probe_layer("Top").unwrap();
    sim.init_simulation().unwrap();
    sim.flux_at_kx_ky(0, 0.5, 0.0).unwrap();

    sim.set_layer_thickness("Gap", 2e-7).unwrap();
    assert!(!sim.is_initialized());
    assert!(matches!(
        sim.flux_at_kx_ky(0, 0.5, 0.0),
        Err(SimulationError::InvalidConfiguration(_))
    ));
    sim.init_simulation().unwrap();
    sim.flux_at_kx_ky(0, 0.5, 0.0).unwrap();
}

#[test]
fn test_frequency_index_out_of_range() {
    let mut sim = three_layer_stack();
    sim.set_source_layer("Bottom").unwrap();
    sim.set_probe_layer("Top").unwrap();
    sim.init_simulation().unwrap();
    assert!(matches!(
        sim.flux_at_kx_ky(2, 0.1, 0.1),
        Err(SimulationError::OutOfRange(_))
    ));
}

#[test]
fn test_near_field_exceeds_far_field() {
    // Across a 100 nm gap evanescent waves dominate the exchange.
    let mut sim = three_layer_stack();
    sim.set_source_layer("Bottom").unwrap();
    sim.set_probe_layer("Top").unwrap();
    sim.set_k_parallel_integral(40.0).unwrap();
    sim.opt_use_gauss_kronrod();
    sim.init_simulation().unwrap();
    sim.integrate_k_parallel().unwrap();
    let near = sim.phi()[0];

    sim.set_k_parallel_integral(1.0).unwrap();
    sim.init_simulation().unwrap();
    sim.integrate_k_parallel().unwrap();
    let far = sim.phi()[0];
    assert!(far > 0.0);
    assert!(near > far);
}

#[test]
fn test_k_parallel_needs_planar_and_bound() {
    let mut sim = Simulation::patterned();
    assert!(matches!(
        sim.set_k_parallel_integral(1.0),
        Err(SimulationError::InvalidConfiguration(_))
    ));

    let mut sim = three_layer_stack();
    sim.set_source_layer("Bottom").unwrap();
    sim.set_probe_layer("Top").unwrap();
    sim.init_simulation().unwrap();
    assert!(matches!(
        sim.integrate_k_parallel(),
        Err(SimulationError::InvalidConfiguration(_))
    ));
    assert!(matches!(
        sim.flux_at_k_parallel(0, 0.5),
        Err(SimulationError::InvalidConfiguration(_))
    ));
    assert!(matches!(
        sim.integrate_kx_ky(),
        Err(SimulationError::InvalidConfiguration(_))
    ));
}

#[test]
fn test_point_k_parallel_flux_needs_radial_mode() {
    let mut sim = three_layer_stack();
    sim.set_source_layer("Bottom").unwrap();
    sim.set_probe_layer("Top").unwrap();
    sim.set_kx_integral(11, 1.0).unwrap();
    sim.set_ky_integral(11, 1.0).unwrap();
    sim.init_simulation().unwrap();
    assert!(matches!(
        sim.flux_at_k_parallel(0, 0.5),
        Err(SimulationError::InvalidConfiguration(_))
    ));

    sim.set_k_parallel_integral(10.0).unwrap();
    assert!(sim.flux_at_k_parallel(0, 0.5).unwrap() > 0.0);
}

#[test]
fn test_integration_axis_validation() {
    let mut sim = three_layer_stack();
    assert!(matches!(sim.set_kx_integral(1, 1.0), Err(SimulationError::OutOfRange(_))));
    assert!(matches!(
        sim.set_kx_integral(10, 0.0),
        Err(SimulationError::InvalidConfiguration(_))
    ));
    assert!(matches!(sim.set_threads(0), Err(SimulationError::OutOfRange(_))));
    sim.set_threads(2).unwrap();
}

#[test]
fn test_anisotropy_follows_material_kind() {
    let mut sim = Simulation::patterned();
    let omega = vec![1e14];
    sim.add_material_values("Host", omega.clone(), scalar(2.0, 0.0, 1)).unwrap();
    sim.add_material_values("Rod", omega, scalar(4.0, -0.1, 1)).unwrap();
    sim.add_layer("Slab", 1e-6, "Host").unwrap();
    sim.set_layer_pattern_circle("Slab", "Rod", [0.0, 0.0], 1e-7).unwrap();
    let slab = |sim: &Simulation| sim.structure().by_name("Slab").unwrap().anisotropic;
    assert!(!slab(&sim));

    let tensor_row = vec![4.0, -0.1, 0.2, 0.0, 0.2, 0.0, 4.0, -0.1, 3.0, -0.1];
    sim.set_material_raw("Rod", &[tensor_row], "tensor").unwrap();
    assert!(slab(&sim));

    // Diagonal is still not a full tensor.
    let diagonal_row = vec![4.0, -0.1, 4.0, -0.1, 3.0, -0.1];
    sim.set_material_raw("Rod", &[diagonal_row], "diagonal").unwrap();
    assert!(!slab(&sim));

    assert!(matches!(
        sim.set_material_raw("Rod", &[vec![1.0, 0.0, 2.0]], "scalar"),
        Err(SimulationError::OutOfRange(_))
    ));
    assert!(matches!(
        sim.set_material_raw("Rod", &[vec![1.0, 0.0]], "isotropic"),
        Err(SimulationError::InvalidConfiguration(_))
    ));
}

#[test]
fn test_pattern_validation() {
    let mut sim = Simulation::patterned();
    sim.add_material_values("Host", vec![1e14], scalar(2.0, 0.0, 1)).unwrap();
    sim.add_layer("Slab", 1e-6, "Host").unwrap();
    assert!(matches!(
        sim.set_layer_pattern_polygon("Slab", "Host", [0.0, 0.0], 0.0, &[[0.0, 0.0], [1e-7, 0.0]]),
        Err(SimulationError::OutOfRange(_))
    ));
    assert!(matches!(
        sim.set_layer_pattern_grating("Slab", "Host", 0.0, 1e-7),
        Err(SimulationError::InvalidConfiguration(_))
    ));
    assert!(matches!(
        sim.set_lattice_2d(1e-6, 1e-6, 180.0),
        Err(SimulationError::OutOfRange(_))
    ));
}

#[test]
fn test_layer_copy_and_delete() {
    let mut sim = three_layer_stack();
    sim.set_source_layer("Gap").unwrap();
    sim.add_layer_copy("Gap2", "Gap").unwrap();
    assert_eq!(sim.layer_names(), vec!["Bottom", "Gap", "Top", "Gap2"]);
    let copy = sim.structure().by_name("Gap2").unwrap();
    assert!(!copy.is_source);
    assert_relative_eq!(copy.thickness, 1e-7);

    sim.delete_layer("Top").unwrap();
    assert_eq!(sim.layer_names(), vec!["Bottom", "Gap", "Gap2"]);
    assert!(matches!(sim.delete_layer("Top"), Err(SimulationError::NotFound { .. })));
}

#[test]
fn test_epsilon_query_planar() {
    let mut sim = three_layer_stack();
    sim.set_source_layer("Bottom").unwrap();
    sim.set_probe_layer("Top").unwrap();
    sim.init_simulation().unwrap();

    // Returned in the file convention: absorption is a positive imaginary part.
    let below = sim.epsilon_at(0, [0.0, 0.0, -1e-6]).unwrap();
    assert_relative_eq!(below.xx.re, 4.0);
    assert_relative_eq!(below.xx.im, 0.5);
    assert_relative_eq!(below.zz.im, 0.5);
    assert_eq!(below.xy, Complex64::new(0.0, 0.0));

    let inside_gap = sim.epsilon_at(0, [0.0, 0.0, 5e-8]).unwrap();
    assert_relative_eq!(inside_gap.yy.re, 1.0);

    let above = sim.epsilon_at(1, [0.0, 0.0, 1e-3]).unwrap();
    assert_relative_eq!(above.xx.re, 4.0);
    assert_eq!(above.to_array()[1], 0.5);
}

#[test]
fn test_pattern_realization() {
    let mut sim = Simulation::patterned();
    let omega = vec![1e14];
    sim.add_material_values("Host", omega.clone(), scalar(1.0, 0.0, 1)).unwrap();
    sim.add_material_values("Rod", omega, scalar(9.0, 0.0, 1)).unwrap();
    sim.add_layer("Bottom", 0.0, "Host").unwrap();
    sim.add_layer("Slab", 1e-6, "Host").unwrap();
    sim.add_layer("Top", 0.0, "Host").unwrap();
    sim.set_layer_pattern_circle("Slab", "Rod", [0.5e-6, 0.5e-6], 0.3e-6).unwrap();
    sim.set_source_layer("Bottom").unwrap();
    sim.set_probe_layer("Top").unwrap();
    sim.set_lattice_2d(1e-6, 1e-6, 90.0).unwrap();
    sim.set_num_of_harmonics(121).unwrap();
    sim.init_simulation().unwrap();

    let points = sim.layer_pattern_realization(0, "Slab", 5, 5).unwrap();
    assert_eq!(points.len(), 25);
    assert_relative_eq!(points[0].x, 0.0);
    assert_relative_eq!(points[24].x, 1e-6, epsilon = 1e-18);
    assert_relative_eq!(points[24].y, 1e-6, epsilon = 1e-18);

    // Cell centre lies in the rod, the corner in the host.
    let centre = points[12].epsilon.xx.re;
    let corner = points[0].epsilon.xx.re;
    assert!(centre > 5.0, "centre {centre}");
    assert!(corner < 5.0, "corner {corner}");

    assert!(matches!(
        sim.layer_pattern_realization(0, "Slab", 0, 5),
        Err(SimulationError::OutOfRange(_))
    ));
}

#[test]
fn test_material_from_file() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    writeln!(file, "# omega re im").unwrap();
    writeln!(file, "1e14 4.0 0.5").unwrap();
    writeln!(file, "2e14 4.2 0.6").unwrap();
    file.flush().unwrap();

    let mut sim = Simulation::planar();
    sim.add_material("SiC", file.path()).unwrap();
    assert_eq!(sim.omega(), &[1e14, 2e14]);
    let stored = sim.materials().get(0).unwrap().at(1).unwrap();
    assert_eq!(*stored, Permittivity::Scalar(Complex64::new(4.2, -0.6)));

    assert!(matches!(
        sim.add_material("Missing", "/nonexistent/strata/eps.txt"),
        Err(SimulationError::MalformedInput(_))
    ));
}

#[test]
fn test_system_info_lists_layers() {
    let mut sim = three_layer_stack();
    sim.set_source_layer("Gap").unwrap();
    let info = sim.system_info();
    assert!(info.contains("The system has 3 layers."));
    assert!(info.contains("Layer 1: Gap"));
    assert!(info.contains("Source: yes"));
    assert!(info.contains("Background: SiC"));
}
