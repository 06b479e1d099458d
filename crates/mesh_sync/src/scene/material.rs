//! Material capabilities consumed by mesh sync

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

/// Material tag for prims with no material
pub const DEFAULT_MATERIAL_TAG: &str = "defaultMaterialTag";

/// Capability queries the sync pipeline asks of a bound material
pub trait MaterialCapabilities: Send + Sync + fmt::Debug {
    /// Uses per-face textures, which need quadrangulated faces
    fn has_ptex(&self) -> bool;

    /// Evaluates the limit surface, which needs patch refinement
    fn has_limit_surface_evaluation(&self) -> bool;

    /// Has a displacement terminal
    fn has_displacement(&self) -> bool;

    /// Tag used to group draw items
    fn material_tag(&self) -> &str;
}

/// Materials by path
pub type MaterialMap = HashMap<String, Arc<dyn MaterialCapabilities>>;

/// A plain material description
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Material {
    ptex: bool,
    limit_surface_evaluation: bool,
    displacement: bool,
    tag: String,
}

impl Default for Material {
    fn default() -> Self {
        Self {
            ptex: false,
            limit_surface_evaluation: false,
            displacement: false,
            tag: DEFAULT_MATERIAL_TAG.to_string(),
        }
    }
}

impl Material {
    /// Material with no capabilities and the default tag
    pub fn new() -> Self {
        Self::default()
    }

    /// Toggle ptex
    pub fn with_ptex(mut self, enabled: bool) -> Self {
        self.ptex = enabled;
        self
    }

    /// Toggle limit surface evaluation
    pub fn with_limit_surface_evaluation(mut self, enabled: bool) -> Self {
        self.limit_surface_evaluation = enabled;
        self
    }

    /// Toggle displacement
    pub fn with_displacement(mut self, enabled: bool) -> Self {
        self.displacement = enabled;
        self
    }

    /// Set the material tag
    pub fn with_tag(mut self, tag: impl Into<String>) -> Self {
        self.tag = tag.into();
        self
    }
}

impl MaterialCapabilities for Material {
    fn has_ptex(&self) -> bool {
        self.ptex
    }

    fn has_limit_surface_evaluation(&self) -> bool {
        self.limit_surface_evaluation
    }

    fn has_displacement(&self) -> bool {
        self.displacement
    }

    fn material_tag(&self) -> &str {
        &self.tag
    }
}

/// Capabilities of a prim's material binding, resolved once per sync
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MaterialFlags {
    /// See [`MaterialCapabilities::has_ptex`]
    pub has_ptex: bool,
    /// See [`MaterialCapabilities::has_limit_surface_evaluation`]
    pub has_limit_surface_evaluation: bool,
    /// See [`MaterialCapabilities::has_displacement`]
    pub has_displacement: bool,
    /// See [`MaterialCapabilities::material_tag`]
    pub tag: String,
}

impl Default for MaterialFlags {
    fn default() -> Self {
        Self {
            has_ptex: false,
            has_limit_surface_evaluation: false,
            has_displacement: false,
            tag: DEFAULT_MATERIAL_TAG.to_string(),
        }
    }
}

impl MaterialFlags {
    /// Resolve `material_id` against `materials`
    ///
    /// An unbound or missing material has no capabilities and the default tag.
    pub fn resolve(materials: &MaterialMap, material_id: Option<&str>) -> Self {
        material_id
            .and_then(|id| materials.get(id))
            .map_or_else(Self::default, |material| Self {
                has_ptex: material.has_ptex(),
                has_limit_surface_evaluation: material.has_limit_surface_evaluation(),
                has_displacement: material.has_displacement(),
                tag: material.material_tag().to_string(),
            })
    }
}
