//! Permittivity table loader.
//!
//! Files are plain text, one frequency per line:
//!
//! ```text
//! # omega (rad/s)   Re(eps)   Im(eps)
//! 1.0e14            12.1      0.35
//! 1.1e14            12.0      0.31
//! ```
//!
//! After the frequency column a row carries 2, 6 or 10 numbers (scalar,
//! diagonal, or tensor, as re/im pairs; tensors are ordered xx, xy, yx, yy,
//! zz). Every row must have the same width. Lines starting with `#` and
//! blank lines are skipped. Imaginary parts are negated on load to match
//! the solver's internal convention.

use std::path::Path;

use log::debug;

use crate::material::MaterialError;
use crate::permittivity::{Permittivity, PermittivityKind};

/// Frequencies, samples and kind read from one table.
#[derive(Debug, Clone)]
pub struct PermittivityTable {
    pub frequencies: Vec<f64>,
    pub values: Vec<Permittivity>,
    pub kind: PermittivityKind,
}

/// Load a permittivity table from disk.
pub fn load_permittivity(path: &Path) -> Result<PermittivityTable, MaterialError> {
    if !path.exists() {
        return Err(MaterialError::FileNotFound(path.to_path_buf()));
    }
    let content = std::fs::read_to_string(path).map_err(|source| MaterialError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    let table = parse_permittivity(&content)?;
    debug!(
        "Loaded {} {} samples from {}",
        table.values.len(),
        table.kind,
        path.display()
    );
    Ok(table)
}

/// Parse the text of a permittivity table.
pub fn parse_permittivity(content: &str) -> Result<PermittivityTable, MaterialError> {
    let mut frequencies = Vec::new();
    let mut values = Vec::new();
    let mut kind: Option<PermittivityKind> = None;

    for (lineno, line) in content.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }

        let numbers = line
            .split_whitespace()
            .map(|tok| {
                tok.parse::<f64>().map_err(|_| MaterialError::Parse {
                    line: lineno + 1,
                    message: format!("'{tok}' is not a number"),
                })
            })
            .collect::<Result<Vec<f64>, _>>()?;

        let (omega, fields) = numbers.split_first().ok_or(MaterialError::Parse {
            line: lineno + 1,
            message: "empty row".into(),
        })?;

        let row_kind = PermittivityKind::from_field_count(fields.len()).ok_or_else(|| {
            MaterialError::Parse {
                line: lineno + 1,
                message: format!(
                    "expected 2, 6 or 10 values after the frequency, found {}",
                    fields.len()
                ),
            }
        })?;

        match kind {
            None => kind = Some(row_kind),
            Some(k) if k != row_kind => {
                return Err(MaterialError::Parse {
                    line: lineno + 1,
                    message: format!(
                        "row has {} values but earlier rows have {}",
                        fields.len(),
                        k.field_count()
                    ),
                });
            }
            Some(_) => {}
        }

        let sample = Permittivity::from_fields(row_kind, fields)?;
        frequencies.push(*omega);
        values.push(sample.conj());
    }

    let kind = kind.ok_or(MaterialError::Empty)?;
    Ok(PermittivityTable {
        frequencies,
        values,
        kind,
    })
}
