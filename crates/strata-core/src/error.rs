//! Error taxonomy of the solver.
//!
//! Errors from the materials, geometry and compute crates are folded into
//! the same small set of categories so that callers can match on the kind
//! of failure without knowing which crate produced it.

use strata_compute::ComputeError;
use strata_geometry::GeometryError;
use strata_materials::MaterialError;
use thiserror::Error;

/// Errors raised by [`Simulation`](crate::simulation::Simulation) and the
/// numerical building blocks beneath it.
#[derive(Debug, Error)]
pub enum SimulationError {
    #[error("{kind} '{name}' does not exist")]
    NotFound { kind: &'static str, name: String },

    #[error("{kind} '{name}' already exists")]
    AlreadyExists { kind: &'static str, name: String },

    #[error("Out of range: {0}")]
    OutOfRange(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfiguration(String),

    #[error("Malformed input: {0}")]
    MalformedInput(String),

    #[error("Linear algebra error: {0}")]
    LinearAlgebra(String),
}

impl SimulationError {
    pub(crate) fn not_found(kind: &'static str, name: &str) -> Self {
        SimulationError::NotFound {
            kind,
            name: name.to_string(),
        }
    }

    pub(crate) fn already_exists(kind: &'static str, name: &str) -> Self {
        SimulationError::AlreadyExists {
            kind,
            name: name.to_string(),
        }
    }
}

impl From<MaterialError> for SimulationError {
    fn from(e: MaterialError) -> Self {
        match e {
            other @ MaterialError::UnsupportedKind(_) => {
                SimulationError::InvalidConfiguration(other.to_string())
            }
            other @ MaterialError::FieldCount { .. } => SimulationError::OutOfRange(other.to_string()),
            other => SimulationError::MalformedInput(other.to_string()),
        }
    }
}

impl From<GeometryError> for SimulationError {
    fn from(e: GeometryError) -> Self {
        match e {
            GeometryError::OutOfRange(msg) => SimulationError::OutOfRange(msg),
            other => SimulationError::InvalidConfiguration(other.to_string()),
        }
    }
}

impl From<ComputeError> for SimulationError {
    fn from(e: ComputeError) -> Self {
        match e {
            ComputeError::InvalidThreads(msg) | ComputeError::Partition(msg) => {
                SimulationError::OutOfRange(msg)
            }
            other => SimulationError::InvalidConfiguration(other.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_material_errors_map_to_taxonomy() {
        let e: SimulationError = MaterialError::FileNotFound("/x/y.txt".into()).into();
        assert!(matches!(e, SimulationError::MalformedInput(m) if m.contains("/x/y.txt")));
        let e: SimulationError = MaterialError::UnsupportedKind("gyro".into()).into();
        assert!(matches!(e, SimulationError::InvalidConfiguration(_)));
        let e: SimulationError = MaterialError::Empty.into();
        assert!(matches!(e, SimulationError::MalformedInput(_)));
    }

    #[test]
    fn test_geometry_range_errors_stay_range_errors() {
        let e: SimulationError = GeometryError::OutOfRange("angle".into()).into();
        assert!(matches!(e, SimulationError::OutOfRange(_)));
        let e: SimulationError = GeometryError::InvalidLattice("period".into()).into();
        assert!(matches!(e, SimulationError::InvalidConfiguration(_)));
    }

    #[test]
    fn test_display() {
        let e = SimulationError::not_found("layer", "GaAs");
        assert_eq!(e.to_string(), "layer 'GaAs' does not exist");
    }
}
