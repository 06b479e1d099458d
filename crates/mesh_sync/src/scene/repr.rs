//! Mesh representations
//!
//! A repr is a named list of descriptors; each descriptor becomes one or
//! more draw items.

use super::delegate::CullStyle;

/// How a descriptor rasterizes the mesh
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum GeomStyle {
    /// Draws nothing
    #[default]
    Invalid,
    /// Refined surface
    Surf,
    /// Refined edges
    EdgeOnly,
    /// Refined surface with edges
    EdgeOnSurf,
    /// Coarse surface
    Hull,
    /// Coarse edges
    HullEdgeOnly,
    /// Coarse surface with edges
    HullEdgeOnSurf,
    /// Points
    Points,
}

impl GeomStyle {
    /// Whether the style draws the coarse (unrefined) faces
    pub const fn is_hull(self) -> bool {
        matches!(self, Self::Hull | Self::HullEdgeOnly | Self::HullEdgeOnSurf)
    }

    /// Whether the style is rasterized as lines
    pub const fn is_edge_only(self) -> bool {
        matches!(self, Self::EdgeOnly | Self::HullEdgeOnly)
    }
}

/// Shader entry point used for shading
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum ShadingTerminal {
    /// Lit surface shader
    #[default]
    SurfaceShader,
    /// Unlit surface shader
    SurfaceShaderUnlit,
    /// Points shader
    Points,
}

/// One descriptor of a mesh repr
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MeshReprDesc {
    /// Rasterization style
    pub geom_style: GeomStyle,
    /// Culling override; `DontCare` defers to the prim
    pub cull_style: CullStyle,
    /// Shading entry point
    pub shading_terminal: ShadingTerminal,
    /// Draw faceted
    pub flat_shading_enabled: bool,
    /// Blend wireframe color over the surface
    pub blend_wireframe_color: bool,
    /// Force double sided
    pub double_sided: bool,
    /// Line width for edge styles, 0 for the default
    pub line_width: f32,
    /// Allow the material's displacement terminal
    pub use_custom_displacement: bool,
    /// Allow the scalar color override
    pub enable_scalar_override: bool,
}

impl Default for MeshReprDesc {
    fn default() -> Self {
        Self {
            geom_style: GeomStyle::Invalid,
            cull_style: CullStyle::DontCare,
            shading_terminal: ShadingTerminal::SurfaceShader,
            flat_shading_enabled: false,
            blend_wireframe_color: true,
            double_sided: false,
            line_width: 0.0,
            use_custom_displacement: true,
            enable_scalar_override: true,
        }
    }
}

impl MeshReprDesc {
    fn styled(geom_style: GeomStyle, flat_shading_enabled: bool) -> Self {
        Self { geom_style, flat_shading_enabled, ..Self::default() }
    }
}

/// Names of the built-in reprs
pub const BUILTIN_REPRS: [&str; 8] = [
    "hull",
    "smoothHull",
    "refined",
    "refinedWire",
    "refinedWireOnSurf",
    "wire",
    "wireOnSurf",
    "points",
];

/// Descriptors of a built-in repr, `None` for unknown names
pub fn repr_descs(name: &str) -> Option<Vec<MeshReprDesc>> {
    let desc = match name {
        "hull" => MeshReprDesc::styled(GeomStyle::Hull, true),
        "smoothHull" => MeshReprDesc::styled(GeomStyle::Hull, false),
        "refined" => MeshReprDesc::styled(GeomStyle::Surf, false),
        "refinedWire" => MeshReprDesc::styled(GeomStyle::EdgeOnly, false),
        "refinedWireOnSurf" => MeshReprDesc::styled(GeomStyle::EdgeOnSurf, false),
        "wire" => MeshReprDesc::styled(GeomStyle::HullEdgeOnly, true),
        "wireOnSurf" => MeshReprDesc::styled(GeomStyle::HullEdgeOnSurf, true),
        "points" => MeshReprDesc {
            geom_style: GeomStyle::Points,
            shading_terminal: ShadingTerminal::Points,
            blend_wireframe_color: false,
            ..MeshReprDesc::default()
        },
        _ => return None,
    };
    Some(vec![desc])
}

/// Selection highlight modes drawn as extra passes for edge styles
pub const HIGHLIGHT_MODE_COUNT: usize = 2;

/// Draw items a descriptor produces
///
/// Edge-only styles draw twice more, once per selection highlight mode,
/// since a shared edge cannot be attributed to one face.
pub const fn num_draw_items(desc: &MeshReprDesc) -> usize {
    match desc.geom_style {
        GeomStyle::Invalid => 0,
        style if style.is_edge_only() => 1 + HIGHLIGHT_MODE_COUNT,
        _ => 1,
    }
}
