//! Scene delegate contract
//!
//! The sync pipeline pulls everything it needs through [`SceneDelegate`],
//! and only when the matching dirty bit is set.

use nalgebra::Matrix4;
use serde::{Deserialize, Serialize};

use super::primvar::{Interpolation, PrimvarDescriptor};
use crate::buffer::Value;
use crate::topology::{MeshTopology, SubdivTags};

/// Per-prim display settings
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DisplayStyle {
    /// Subdivision level requested for the prim
    pub refine_level: i32,
    /// Draw faceted
    pub flat_shading_enabled: bool,
    /// Allow material displacement
    pub displacement_enabled: bool,
}

impl Default for DisplayStyle {
    fn default() -> Self {
        Self { refine_level: 0, flat_shading_enabled: false, displacement_enabled: true }
    }
}

impl DisplayStyle {
    /// Style with the given refine level
    pub fn with_refine_level(mut self, refine_level: i32) -> Self {
        self.refine_level = refine_level;
        self
    }

    /// Style with flat shading toggled
    pub fn with_flat_shading(mut self, enabled: bool) -> Self {
        self.flat_shading_enabled = enabled;
        self
    }
}

/// Face culling
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum CullStyle {
    /// Defer to the next level (repr, prim, render pass)
    #[default]
    DontCare,
    /// Cull nothing
    Nothing,
    /// Cull back faces
    Back,
    /// Cull front faces
    Front,
    /// Cull back faces unless double sided
    BackUnlessDoubleSided,
    /// Cull front faces unless double sided
    FrontUnlessDoubleSided,
}

/// Source of scene data for mesh prims
pub trait SceneDelegate: Send + Sync {
    /// Raw face layout of `id`
    fn mesh_topology(&self, id: &str) -> MeshTopology;

    /// Display style of `id`
    fn display_style(&self, _id: &str) -> DisplayStyle {
        DisplayStyle::default()
    }

    /// Subdivision tags of `id`
    fn subdiv_tags(&self, _id: &str) -> SubdivTags {
        SubdivTags::default()
    }

    /// Primvars of `id` with the given interpolation
    fn primvar_descriptors(&self, id: &str, interpolation: Interpolation) -> Vec<PrimvarDescriptor>;

    /// Value of primvar `name` on `id`
    fn primvar(&self, id: &str, name: &str) -> Value;

    /// Bound material
    fn material_id(&self, _id: &str) -> Option<String> {
        None
    }

    /// Bound instancer
    fn instancer_id(&self, _id: &str) -> Option<String> {
        None
    }

    /// Object-to-world transform
    fn transform(&self, _id: &str) -> Matrix4<f64> {
        Matrix4::identity()
    }

    /// Whether both sides of faces are lit
    fn double_sided(&self, _id: &str) -> bool {
        false
    }

    /// Cull style of `id`
    fn cull_style(&self, _id: &str) -> CullStyle {
        CullStyle::DontCare
    }

    /// Visibility of `id`
    fn visible(&self, _id: &str) -> bool {
        true
    }

    /// Per-instance primvars of an instancer
    fn instance_primvar_descriptors(&self, _instancer_id: &str) -> Vec<PrimvarDescriptor> {
        Vec::new()
    }

    /// Value of an instance primvar
    fn instance_primvar(&self, _instancer_id: &str, _name: &str) -> Value {
        Value::Empty
    }

    /// Number of instances, `None` if the instancer is unknown
    fn instance_count(&self, _instancer_id: &str) -> Option<usize> {
        None
    }
}
