//! Material records.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::permittivity::{Permittivity, PermittivityKind};

/// Errors from material construction and loading.
#[derive(Debug, Error)]
pub enum MaterialError {
    #[error("Permittivity file not found: {}", .0.display())]
    FileNotFound(PathBuf),

    #[error("I/O error reading {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Line {line}: {message}")]
    Parse { line: usize, message: String },

    #[error("Unsupported permittivity type '{0}' (expected scalar, diagonal or tensor)")]
    UnsupportedKind(String),

    #[error("A {kind} permittivity row needs {expected} fields, found {found}")]
    FieldCount {
        kind: PermittivityKind,
        expected: usize,
        found: usize,
    },

    #[error("Mixed permittivity kinds: expected {expected}, found {found}")]
    MixedKinds {
        expected: PermittivityKind,
        found: PermittivityKind,
    },

    #[error("Got {values} permittivity samples for {frequencies} frequencies")]
    LengthMismatch { frequencies: usize, values: usize },

    #[error("Material has no frequency samples")]
    Empty,
}

/// A named, frequency-sampled material.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Material {
    name: String,
    frequencies: Vec<f64>,
    kind: PermittivityKind,
    values: Vec<Permittivity>,
}

impl Material {
    /// Create a material from angular frequencies (rad/s) and matching
    /// samples in the internal sign convention.
    ///
    /// All samples must share one kind.
    pub fn new(
        name: impl Into<String>,
        frequencies: Vec<f64>,
        values: Vec<Permittivity>,
    ) -> Result<Self, MaterialError> {
        let kind = check_samples(frequencies.len(), &values)?;
        Ok(Self {
            name: name.into(),
            frequencies,
            kind,
            values,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn frequencies(&self) -> &[f64] {
        &self.frequencies
    }

    pub fn kind(&self) -> PermittivityKind {
        self.kind
    }

    pub fn is_tensor(&self) -> bool {
        self.kind == PermittivityKind::Tensor
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn values(&self) -> &[Permittivity] {
        &self.values
    }

    /// Sample at a frequency index.
    pub fn at(&self, index: usize) -> Option<&Permittivity> {
        self.values.get(index)
    }

    /// Replace every sample, keeping the frequency list. The kind may change.
    pub fn replace(&mut self, values: Vec<Permittivity>) -> Result<(), MaterialError> {
        self.kind = check_samples(self.frequencies.len(), &values)?;
        self.values = values;
        Ok(())
    }
}

fn check_samples(
    frequencies: usize,
    values: &[Permittivity],
) -> Result<PermittivityKind, MaterialError> {
    let first = values.first().ok_or(MaterialError::Empty)?;
    if values.len() != frequencies {
        return Err(MaterialError::LengthMismatch {
            frequencies,
            values: values.len(),
        });
    }
    let kind = first.kind();
    if let Some(other) = values.iter().find(|v| v.kind() != kind) {
        return Err(MaterialError::MixedKinds {
            expected: kind,
            found: other.kind(),
        });
    }
    Ok(kind)
}

#[cfg(test)]
mod tests {
    use super::*;
    use num_complex::Complex64;

    fn scalar(re: f64, im: f64) -> Permittivity {
        Permittivity::Scalar(Complex64::new(re, im))
    }

    #[test]
    fn test_new_material() {
        let m = Material::new("SiO2", vec![1e14, 2e14], vec![scalar(2.1, -0.1), scalar(2.0, -0.2)])
            .unwrap();
        assert_eq!(m.name(), "SiO2");
        assert_eq!(m.len(), 2);
        assert_eq!(m.kind(), PermittivityKind::Scalar);
        assert!(!m.is_tensor());
    }

    #[test]
    fn test_length_mismatch() {
        let err = Material::new("x", vec![1e14, 2e14], vec![scalar(1.0, 0.0)]);
        assert!(matches!(
            err,
            Err(MaterialError::LengthMismatch { frequencies: 2, values: 1 })
        ));
    }

    #[test]
    fn test_mixed_kinds_rejected() {
        let err = Material::new(
            "x",
            vec![1e14, 2e14],
            vec![
                scalar(1.0, 0.0),
                Permittivity::Diagonal([Complex64::new(1.0, 0.0); 3]),
            ],
        );
        assert!(matches!(err, Err(MaterialError::MixedKinds { .. })));
    }

    #[test]
    fn test_replace_changes_kind() {
        let mut m = Material::new("x", vec![1e14], vec![scalar(1.0, 0.0)]).unwrap();
        let z = Complex64::new(0.0, 0.0);
        let one = Complex64::new(1.0, 0.0);
        m.replace(vec![Permittivity::Tensor {
            xx: one,
            xy: z,
            yx: z,
            yy: one,
            zz: one,
        }])
        .unwrap();
        assert!(m.is_tensor());
        assert!(m.replace(vec![]).is_err());
        // A failed replace leaves the material untouched.
        assert!(m.is_tensor());
        assert_eq!(m.len(), 1);
    }
}
