//! Material and layer registries.
//!
//! Both registries are arenas: a dense `Vec` in insertion (for layers,
//! bottom-to-top) order plus a name→index map. Layers refer to materials
//! and patterns refer to earlier patterns by index, never by pointer.

use std::collections::HashMap;

use strata_geometry::Pattern;
use strata_materials::Material;

use crate::error::SimulationError;

/// Registry of named materials.
#[derive(Debug, Clone, Default)]
pub struct MaterialRegistry {
    materials: Vec<Material>,
    index: HashMap<String, usize>,
}

impl MaterialRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a material. Its sample count and frequencies must match the
    /// materials already registered.
    pub fn insert(&mut self, material: Material) -> Result<usize, SimulationError> {
        if self.index.contains_key(material.name()) {
            return Err(SimulationError::already_exists("material", material.name()));
        }
        if let Some(first) = self.materials.first() {
            check_frequencies(first, &material)?;
        }
        let id = self.materials.len();
        self.index.insert(material.name().to_string(), id);
        self.materials.push(material);
        Ok(id)
    }

    pub fn id(&self, name: &str) -> Result<usize, SimulationError> {
        self.index
            .get(name)
            .copied()
            .ok_or_else(|| SimulationError::not_found("material", name))
    }

    pub fn get(&self, id: usize) -> Option<&Material> {
        self.materials.get(id)
    }

    pub(crate) fn get_mut(&mut self, id: usize) -> Option<&mut Material> {
        self.materials.get_mut(id)
    }

    pub fn len(&self) -> usize {
        self.materials.len()
    }

    pub fn is_empty(&self) -> bool {
        self.materials.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Material> {
        self.materials.iter()
    }

    /// Frequency list shared by every registered material.
    pub fn frequencies(&self) -> Option<&[f64]> {
        self.materials.first().map(|m| m.frequencies())
    }

    pub fn is_tensor(&self, id: usize) -> bool {
        self.materials.get(id).is_some_and(|m| m.is_tensor())
    }
}

fn check_frequencies(reference: &Material, candidate: &Material) -> Result<(), SimulationError> {
    if reference.len() != candidate.len() {
        return Err(SimulationError::MalformedInput(format!(
            "material '{}' has {} frequency samples but '{}' has {}",
            candidate.name(),
            candidate.len(),
            reference.name(),
            reference.len()
        )));
    }
    let mismatch = reference
        .frequencies()
        .iter()
        .zip(candidate.frequencies())
        .position(|(a, b)| (a - b).abs() > 1e-9 * a.abs().max(b.abs()));
    if let Some(i) = mismatch {
        return Err(SimulationError::MalformedInput(format!(
            "material '{}' frequency {} ({}) differs from '{}' ({})",
            candidate.name(),
            i,
            candidate.frequencies()[i],
            reference.name(),
            reference.frequencies()[i]
        )));
    }
    Ok(())
}

/// One layer of the stack.
#[derive(Debug, Clone, PartialEq)]
pub struct Layer {
    pub name: String,
    /// Background material id.
    pub background: usize,
    /// Thickness (m). Ignored for the outermost layers.
    pub thickness: f64,
    pub patterns: Vec<Pattern>,
    pub is_source: bool,
    /// True iff any constituent material has a full tensor permittivity.
    pub anisotropic: bool,
}

impl Layer {
    pub fn new(name: impl Into<String>, background: usize, thickness: f64) -> Self {
        Self {
            name: name.into(),
            background,
            thickness,
            patterns: Vec::new(),
            is_source: false,
            anisotropic: false,
        }
    }

    /// Background and pattern material ids.
    pub fn material_ids(&self) -> impl Iterator<Item = usize> + '_ {
        std::iter::once(self.background).chain(self.patterns.iter().map(|p| p.material))
    }

    pub fn uses_material(&self, id: usize) -> bool {
        self.material_ids().any(|m| m == id)
    }

    /// Recompute the anisotropy flag from the constituent materials.
    ///
    /// Returns true if the flag changed.
    pub fn refresh_anisotropy(&mut self, materials: &MaterialRegistry) -> bool {
        let anisotropic = self.material_ids().any(|id| materials.is_tensor(id));
        let changed = anisotropic != self.anisotropic;
        self.anisotropic = anisotropic;
        changed
    }
}

/// Ordered layer stack, index 0 at the bottom.
#[derive(Debug, Clone, Default)]
pub struct Structure {
    layers: Vec<Layer>,
    index: HashMap<String, usize>,
}

impl Structure {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a layer on top of the stack.
    pub fn push(&mut self, layer: Layer) -> Result<usize, SimulationError> {
        if self.index.contains_key(&layer.name) {
            return Err(SimulationError::already_exists("layer", &layer.name));
        }
        let id = self.layers.len();
        self.index.insert(layer.name.clone(), id);
        self.layers.push(layer);
        Ok(id)
    }

    /// Remove a layer; the layers above it move down by one.
    pub fn remove(&mut self, name: &str) -> Result<Layer, SimulationError> {
        let id = self.position(name)?;
        let layer = self.layers.remove(id);
        self.index = self
            .layers
            .iter()
            .enumerate()
            .map(|(i, l)| (l.name.clone(), i))
            .collect();
        Ok(layer)
    }

    pub fn position(&self, name: &str) -> Result<usize, SimulationError> {
        self.index
            .get(name)
            .copied()
            .ok_or_else(|| SimulationError::not_found("layer", name))
    }

    pub fn get(&self, id: usize) -> Option<&Layer> {
        self.layers.get(id)
    }

    pub fn by_name(&self, name: &str) -> Result<&Layer, SimulationError> {
        let id = self.position(name)?;
        Ok(&self.layers[id])
    }

    pub fn by_name_mut(&mut self, name: &str) -> Result<&mut Layer, SimulationError> {
        let id = self.position(name)?;
        Ok(&mut self.layers[id])
    }

    pub fn layers(&self) -> &[Layer] {
        &self.layers
    }

    pub(crate) fn layers_mut(&mut self) -> &mut [Layer] {
        &mut self.layers
    }

    pub fn len(&self) -> usize {
        self.layers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.layers.is_empty()
    }

    /// Index of the source layer, if one is marked.
    pub fn source(&self) -> Option<usize> {
        self.layers.iter().position(|l| l.is_source)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use num_complex::Complex64;
    use strata_materials::Permittivity;

    fn scalar_material(name: &str, freqs: &[f64]) -> Material {
        let values = freqs
            .iter()
            .map(|_| Permittivity::Scalar(Complex64::new(1.0, 0.0)))
            .collect();
        Material::new(name, freqs.to_vec(), values).unwrap()
    }

    #[test]
    fn test_duplicate_material_rejected() {
        let mut reg = MaterialRegistry::new();
        reg.insert(scalar_material("Vacuum", &[1e14])).unwrap();
        assert!(matches!(
            reg.insert(scalar_material("Vacuum", &[1e14])),
            Err(SimulationError::AlreadyExists { .. })
        ));
    }

    #[test]
    fn test_frequency_count_mismatch_rejected() {
        let mut reg = MaterialRegistry::new();
        reg.insert(scalar_material("A", &[1e14, 2e14])).unwrap();
        let err = reg.insert(scalar_material("B", &[1e14, 2e14, 3e14]));
        assert!(matches!(err, Err(SimulationError::MalformedInput(_))));
        assert_eq!(reg.len(), 1);
        assert!(reg.id("B").is_err());
    }

    #[test]
    fn test_remove_reindexes() {
        let mut s = Structure::new();
        s.push(Layer::new("bottom", 0, 0.0)).unwrap();
        s.push(Layer::new("middle", 0, 1e-6)).unwrap();
        s.push(Layer::new("top", 0, 0.0)).unwrap();
        s.remove("middle").unwrap();
        assert_eq!(s.position("top").unwrap(), 1);
        assert!(matches!(s.position("middle"), Err(SimulationError::NotFound { .. })));
    }

    #[test]
    fn test_duplicate_layer_rejected() {
        let mut s = Structure::new();
        s.push(Layer::new("a", 0, 0.0)).unwrap();
        assert!(matches!(
            s.push(Layer::new("a", 0, 0.0)),
            Err(SimulationError::AlreadyExists { .. })
        ));
    }
}
