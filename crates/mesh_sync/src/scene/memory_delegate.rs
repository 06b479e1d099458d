//! In-memory scene delegate
//!
//! Holds authored mesh and instancer data in hash maps. Used by the demo
//! application and the tests; a real scene graph would implement
//! [`SceneDelegate`] directly.

use std::collections::HashMap;

use nalgebra::Matrix4;

use super::delegate::{CullStyle, DisplayStyle, SceneDelegate};
use super::primvar::{Interpolation, PrimvarDescriptor};
use crate::buffer::Value;
use crate::topology::{MeshTopology, SubdivTags};

/// Authored data of one mesh
#[derive(Debug, Clone)]
pub struct MeshData {
    /// Face layout
    pub topology: MeshTopology,
    /// Display style
    pub display_style: DisplayStyle,
    /// Subdivision tags
    pub subdiv_tags: SubdivTags,
    /// Primvars in authoring order
    pub primvars: Vec<(PrimvarDescriptor, Value)>,
    /// Bound material
    pub material_id: Option<String>,
    /// Bound instancer
    pub instancer_id: Option<String>,
    /// Object-to-world transform
    pub transform: Matrix4<f64>,
    /// Double sided flag
    pub double_sided: bool,
    /// Cull style
    pub cull_style: CullStyle,
    /// Visibility
    pub visible: bool,
}

impl MeshData {
    /// Mesh with the given topology and nothing else authored
    pub fn new(topology: MeshTopology) -> Self {
        Self {
            topology,
            display_style: DisplayStyle::default(),
            subdiv_tags: SubdivTags::default(),
            primvars: Vec::new(),
            material_id: None,
            instancer_id: None,
            transform: Matrix4::identity(),
            double_sided: false,
            cull_style: CullStyle::DontCare,
            visible: true,
        }
    }

    /// Add or replace a primvar
    pub fn with_primvar(mut self, name: &str, interpolation: Interpolation, value: Value) -> Self {
        self.set_primvar(name, interpolation, value);
        self
    }

    /// Set the display style
    pub fn with_display_style(mut self, display_style: DisplayStyle) -> Self {
        self.display_style = display_style;
        self
    }

    /// Bind a material
    pub fn with_material(mut self, material_id: impl Into<String>) -> Self {
        self.material_id = Some(material_id.into());
        self
    }

    /// Bind an instancer
    pub fn with_instancer(mut self, instancer_id: impl Into<String>) -> Self {
        self.instancer_id = Some(instancer_id.into());
        self
    }

    /// Add or replace a primvar in place
    pub fn set_primvar(&mut self, name: &str, interpolation: Interpolation, value: Value) {
        let descriptor = PrimvarDescriptor::new(name, interpolation);
        match self.primvars.iter_mut().find(|(existing, _)| existing.name == name) {
            Some(entry) => *entry = (descriptor, value),
            None => self.primvars.push((descriptor, value)),
        }
    }

    /// Remove a primvar; returns whether it existed
    pub fn remove_primvar(&mut self, name: &str) -> bool {
        let before = self.primvars.len();
        self.primvars.retain(|(descriptor, _)| descriptor.name != name);
        before != self.primvars.len()
    }
}

/// Authored data of one instancer
#[derive(Debug, Clone, Default)]
pub struct InstancerData {
    /// Number of instances
    pub count: usize,
    /// Per-instance primvars
    pub primvars: Vec<(String, Value)>,
}

/// Scene delegate backed by hash maps
#[derive(Debug, Clone, Default)]
pub struct MemoryDelegate {
    meshes: HashMap<String, MeshData>,
    instancers: HashMap<String, InstancerData>,
}

impl MemoryDelegate {
    /// Empty scene
    pub fn new() -> Self {
        Self::default()
    }

    /// Add or replace a mesh
    pub fn insert_mesh(&mut self, id: impl Into<String>, data: MeshData) {
        self.meshes.insert(id.into(), data);
    }

    /// Remove a mesh
    pub fn remove_mesh(&mut self, id: &str) -> Option<MeshData> {
        self.meshes.remove(id)
    }

    /// Authored data of a mesh
    pub fn mesh(&self, id: &str) -> Option<&MeshData> {
        self.meshes.get(id)
    }

    /// Mutable authored data of a mesh
    pub fn mesh_mut(&mut self, id: &str) -> Option<&mut MeshData> {
        self.meshes.get_mut(id)
    }

    /// Add or replace an instancer
    pub fn insert_instancer(&mut self, id: impl Into<String>, data: InstancerData) {
        self.instancers.insert(id.into(), data);
    }

    /// Mutable authored data of an instancer
    pub fn instancer_mut(&mut self, id: &str) -> Option<&mut InstancerData> {
        self.instancers.get_mut(id)
    }

    fn with_mesh<T>(&self, id: &str, fallback: T, f: impl FnOnce(&MeshData) -> T) -> T {
        match self.meshes.get(id) {
            Some(mesh) => f(mesh),
            None => {
                log::warn!("MemoryDelegate: unknown mesh {}", id);
                fallback
            }
        }
    }
}

impl SceneDelegate for MemoryDelegate {
    fn mesh_topology(&self, id: &str) -> MeshTopology {
        self.with_mesh(id, MeshTopology::default(), |mesh| mesh.topology.clone())
    }

    fn display_style(&self, id: &str) -> DisplayStyle {
        self.with_mesh(id, DisplayStyle::default(), |mesh| mesh.display_style)
    }

    fn subdiv_tags(&self, id: &str) -> SubdivTags {
        self.with_mesh(id, SubdivTags::default(), |mesh| mesh.subdiv_tags.clone())
    }

    fn primvar_descriptors(&self, id: &str, interpolation: Interpolation) -> Vec<PrimvarDescriptor> {
        self.with_mesh(id, Vec::new(), |mesh| {
            mesh.primvars
                .iter()
                .filter(|(descriptor, _)| descriptor.interpolation == interpolation)
                .map(|(descriptor, _)| descriptor.clone())
                .collect()
        })
    }

    fn primvar(&self, id: &str, name: &str) -> Value {
        self.with_mesh(id, Value::Empty, |mesh| {
            mesh.primvars
                .iter()
                .find(|(descriptor, _)| descriptor.name == name)
                .map(|(_, value)| value.clone())
                .unwrap_or_default()
        })
    }

    fn material_id(&self, id: &str) -> Option<String> {
        self.with_mesh(id, None, |mesh| mesh.material_id.clone())
    }

    fn instancer_id(&self, id: &str) -> Option<String> {
        self.with_mesh(id, None, |mesh| mesh.instancer_id.clone())
    }

    fn transform(&self, id: &str) -> Matrix4<f64> {
        self.with_mesh(id, Matrix4::identity(), |mesh| mesh.transform)
    }

    fn double_sided(&self, id: &str) -> bool {
        self.with_mesh(id, false, |mesh| mesh.double_sided)
    }

    fn cull_style(&self, id: &str) -> CullStyle {
        self.with_mesh(id, CullStyle::DontCare, |mesh| mesh.cull_style)
    }

    fn visible(&self, id: &str) -> bool {
        self.with_mesh(id, true, |mesh| mesh.visible)
    }

    fn instance_primvar_descriptors(&self, instancer_id: &str) -> Vec<PrimvarDescriptor> {
        self.instancers.get(instancer_id).map_or_else(Vec::new, |instancer| {
            instancer
                .primvars
                .iter()
                .map(|(name, _)| PrimvarDescriptor::new(name.clone(), Interpolation::Instance))
                .collect()
        })
    }

    fn instance_primvar(&self, instancer_id: &str, name: &str) -> Value {
        self.instancers
            .get(instancer_id)
            .and_then(|instancer| instancer.primvars.iter().find(|(n, _)| n == name))
            .map(|(_, value)| value.clone())
            .unwrap_or_default()
    }

    fn instance_count(&self, instancer_id: &str) -> Option<usize> {
        self.instancers.get(instancer_id).map(|instancer| instancer.count)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn quad() -> MeshTopology {
        MeshTopology::new(crate::topology::SubdivScheme::CatmullClark, vec![4], vec![0, 1, 2, 3])
    }

    #[test]
    fn test_primvars_filtered_by_interpolation() {
        let mut delegate = MemoryDelegate::new();
        delegate.insert_mesh(
            "/quad",
            MeshData::new(quad())
                .with_primvar("points", Interpolation::Vertex, Value::FloatArray(vec![0.0; 12]))
                .with_primvar("displayColor", Interpolation::Constant, Value::FloatArray(vec![1.0; 3])),
        );
        let vertex = delegate.primvar_descriptors("/quad", Interpolation::Vertex);
        assert_eq!(vertex.len(), 1);
        assert_eq!(vertex[0].name, "points");
        assert_eq!(delegate.primvar("/quad", "missing"), Value::Empty);
    }

    #[test]
    fn test_set_primvar_replaces() {
        let mut data = MeshData::new(quad()).with_primvar("a", Interpolation::Vertex, Value::Int(1));
        data.set_primvar("a", Interpolation::Uniform, Value::Int(2));
        assert_eq!(data.primvars.len(), 1);
        assert_eq!(data.primvars[0].0.interpolation, Interpolation::Uniform);
        assert!(data.remove_primvar("a"));
        assert!(!data.remove_primvar("a"));
    }

    #[test]
    fn test_unknown_ids_fall_back() {
        let delegate = MemoryDelegate::new();
        assert_eq!(delegate.mesh_topology("/nope"), MeshTopology::default());
        assert_eq!(delegate.instance_count("/inst"), None);
    }
}
