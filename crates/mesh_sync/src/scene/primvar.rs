//! Primvar descriptors

use serde::{Deserialize, Serialize};

/// Granularity at which a primvar is sampled
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Interpolation {
    /// One value for the whole prim
    Constant,
    /// One value per face
    Uniform,
    /// One value per point, interpolated linearly
    Varying,
    /// One value per point, interpolated by the subdivision scheme
    Vertex,
    /// One value per face corner
    FaceVarying,
    /// One value per instance
    Instance,
}

/// Semantic role of a primvar
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum PrimvarRole {
    /// No particular role
    #[default]
    None,
    /// Positions
    Point,
    /// Normals
    Normal,
    /// Directions
    Vector,
    /// Colors
    Color,
    /// Texture coordinates
    TextureCoordinate,
}

/// A primvar as described by the scene delegate
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PrimvarDescriptor {
    /// Primvar name
    pub name: String,
    /// Interpolation class
    pub interpolation: Interpolation,
    /// Semantic role
    pub role: PrimvarRole,
}

impl PrimvarDescriptor {
    /// Describe a primvar with no particular role
    pub fn new(name: impl Into<String>, interpolation: Interpolation) -> Self {
        Self { name: name.into(), interpolation, role: PrimvarRole::None }
    }

    /// Set the role
    pub fn with_role(mut self, role: PrimvarRole) -> Self {
        self.role = role;
        self
    }
}
