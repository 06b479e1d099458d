//! Geometric shader selection
//!
//! [`GeometricShaderSelector::select`] is a pure mapping from a draw item's
//! configuration to a [`MeshShaderKey`]. Shaders are shared through the
//! resource registry by key hash; swapping a draw item's shader bumps the
//! batch version so draw batches get rebuilt.

use std::sync::Arc;

use crate::foundation::hash::ContentHasher;
use crate::registry::ResourceRegistry;
use crate::scene::change_tracker::ChangeTracker;
use crate::scene::delegate::CullStyle;
use crate::scene::draw_item::DrawItem;
use crate::scene::material::MaterialFlags;
use crate::scene::primvar::Interpolation;
use crate::scene::repr::{GeomStyle, MeshReprDesc, ShadingTerminal};
use crate::topology::{RefinedTopology, SubdivScheme};

/// Primitive class the shader rasterizes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PrimitiveType {
    /// One point per vertex
    Points,
    /// Fan-triangulated coarse faces
    CoarseTriangles,
    /// Quadrangulated coarse faces
    CoarseQuads,
    /// Uniformly refined triangles
    RefinedTriangles,
    /// Uniformly refined quads
    RefinedQuads,
    /// B-spline patches
    BSplinePatches,
    /// Box-spline triangle patches
    BoxSplineTrianglePatches,
}

impl PrimitiveType {
    const fn tag(self) -> u64 {
        match self {
            Self::Points => 0,
            Self::CoarseTriangles => 1,
            Self::CoarseQuads => 2,
            Self::RefinedTriangles => 3,
            Self::RefinedQuads => 4,
            Self::BSplinePatches => 5,
            Self::BoxSplineTrianglePatches => 6,
        }
    }
}

/// Where the shader reads normals from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NormalSource {
    /// Authored normals primvar
    Scene,
    /// Generated smooth normals
    Smooth,
    /// Generated flat normals
    Flat,
    /// Limit-surface normals from patch evaluation
    Limit,
    /// Derived per primitive in the geometry stage
    GeometryShader,
}

impl NormalSource {
    const fn tag(self) -> u64 {
        match self {
            Self::Scene => 0,
            Self::Smooth => 1,
            Self::Flat => 2,
            Self::Limit => 3,
            Self::GeometryShader => 4,
        }
    }
}

/// Shader variant key of one draw item
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct MeshShaderKey {
    /// Primitive class
    pub primitive_type: PrimitiveType,
    /// Shading entry point
    pub shading_terminal: ShadingTerminal,
    /// Include the material displacement stage
    pub use_custom_displacement: bool,
    /// Normals source
    pub normal_source: NormalSource,
    /// Interpolation of the normals the shader reads
    pub normals_interpolation: Interpolation,
    /// Light both sides
    pub double_sided: bool,
    /// Face-varying data (or ptex) is bound
    pub has_face_varying: bool,
    /// Blend wireframe color over the surface
    pub blend_wireframe_color: bool,
    /// Resolved cull style
    pub cull_style: CullStyle,
    /// Rasterization style
    pub geom_style: GeomStyle,
    /// Line width, as raw bits so the key stays `Eq`
    pub line_width_bits: u32,
    /// Scalar color override enabled
    pub enable_scalar_override: bool,
    /// Draw only active-selected edges
    pub discard_if_not_active_selected: bool,
    /// Draw only rollover-selected edges
    pub discard_if_not_rollover_selected: bool,
}

impl MeshShaderKey {
    /// Line width
    pub fn line_width(&self) -> f32 {
        f32::from_bits(self.line_width_bits)
    }

    /// Digest used as the registry key
    pub fn content_hash(&self) -> u64 {
        let mut hasher = ContentHasher::new();
        hasher
            .write_u64(self.primitive_type.tag())
            .write_str(&format!("{:?}", self.shading_terminal))
            .write_bool(self.use_custom_displacement)
            .write_u64(self.normal_source.tag())
            .write_str(&format!("{:?}", self.normals_interpolation))
            .write_bool(self.double_sided)
            .write_bool(self.has_face_varying)
            .write_bool(self.blend_wireframe_color)
            .write_str(&format!("{:?}", self.cull_style))
            .write_str(&format!("{:?}", self.geom_style))
            .write_u64(u64::from(self.line_width_bits))
            .write_bool(self.enable_scalar_override)
            .write_bool(self.discard_if_not_active_selected)
            .write_bool(self.discard_if_not_rollover_selected);
        hasher.finish()
    }
}

/// Shared geometric shader
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GeometricShader {
    key: MeshShaderKey,
    hash: u64,
}

impl GeometricShader {
    /// Shader for `key`
    pub fn new(key: MeshShaderKey) -> Self {
        Self { hash: key.content_hash(), key }
    }

    /// Variant key
    pub fn key(&self) -> &MeshShaderKey {
        &self.key
    }

    /// Key digest
    pub fn hash(&self) -> u64 {
        self.hash
    }
}

/// Configuration a draw item's shader depends on
#[derive(Debug, Clone)]
pub struct ShaderInputs<'a> {
    /// Repr descriptor of the item
    pub desc: &'a MeshReprDesc,
    /// Index of the item within its descriptor
    pub draw_item_index: usize,
    /// Resolved topology, if any
    pub topology: Option<&'a RefinedTopology>,
    /// Coarse faces are quadrangulated
    pub use_quad_indices: bool,
    /// Normals come from the limit surface
    pub limit_normals: bool,
    /// Prim-level flat shading
    pub flat_shading_enabled: bool,
    /// Prim-level displacement toggle
    pub displacement_enabled: bool,
    /// Interpolation of authored normals, if any
    pub scene_normals: Option<Interpolation>,
    /// Prim cull style
    pub cull_style: CullStyle,
    /// Prim double sided flag
    pub double_sided: bool,
    /// A face-varying range is bound
    pub has_face_varying: bool,
    /// Bound material capabilities
    pub material: &'a MaterialFlags,
}

impl ShaderInputs<'_> {
    fn refine_level(&self) -> usize {
        if self.desc.geom_style.is_hull() {
            0
        } else {
            self.topology.map_or(0, RefinedTopology::refine_level)
        }
    }

    fn scheme(&self) -> SubdivScheme {
        self.topology.map_or(SubdivScheme::None, RefinedTopology::scheme)
    }

    /// Flat normals are generated for unrefined, non-points items
    pub fn uses_flat_normals(&self) -> bool {
        self.refine_level() == 0 && self.desc.geom_style != GeomStyle::Points
    }

    fn primitive_type(&self) -> PrimitiveType {
        if self.desc.geom_style == GeomStyle::Points {
            return PrimitiveType::Points;
        }
        if self.refine_level() > 0 {
            if let Some(topology) = self.topology {
                if topology.refines_to_bspline_patches() {
                    return PrimitiveType::BSplinePatches;
                }
                if topology.refines_to_box_spline_triangle_patches() {
                    return PrimitiveType::BoxSplineTrianglePatches;
                }
                if topology.refines_to_triangles() {
                    return PrimitiveType::RefinedTriangles;
                }
                return PrimitiveType::RefinedQuads;
            }
        }
        if self.use_quad_indices {
            PrimitiveType::CoarseQuads
        } else {
            PrimitiveType::CoarseTriangles
        }
    }

    fn normal_source(&self) -> NormalSource {
        let scheme = self.scheme();
        let has_generated_smooth =
            !self.limit_normals && scheme != SubdivScheme::None && scheme != SubdivScheme::Bilinear;
        let has_generated_flat = self.uses_flat_normals() && scheme != SubdivScheme::None;

        if self.flat_shading_enabled || self.desc.flat_shading_enabled {
            if has_generated_flat {
                NormalSource::Flat
            } else {
                NormalSource::GeometryShader
            }
        } else if self.limit_normals {
            NormalSource::Limit
        } else if has_generated_smooth {
            NormalSource::Smooth
        } else if self.scene_normals.is_some() {
            NormalSource::Scene
        } else {
            NormalSource::GeometryShader
        }
    }
}

/// Chooses and installs geometric shaders
#[derive(Debug, Clone, Copy, Default)]
pub struct GeometricShaderSelector;

impl GeometricShaderSelector {
    /// Shader key for a draw item
    pub fn select(inputs: &ShaderInputs<'_>) -> MeshShaderKey {
        let desc = inputs.desc;
        let cull_style = if desc.cull_style == CullStyle::DontCare {
            inputs.cull_style
        } else {
            desc.cull_style
        };
        let lines = desc.geom_style.is_edge_only();

        MeshShaderKey {
            primitive_type: inputs.primitive_type(),
            shading_terminal: desc.shading_terminal,
            use_custom_displacement: inputs.material.has_displacement
                && desc.use_custom_displacement
                && inputs.displacement_enabled,
            normal_source: inputs.normal_source(),
            normals_interpolation: inputs.scene_normals.unwrap_or(Interpolation::Vertex),
            double_sided: inputs.double_sided || desc.double_sided,
            has_face_varying: inputs.has_face_varying || inputs.material.has_ptex,
            blend_wireframe_color: desc.blend_wireframe_color,
            cull_style,
            geom_style: desc.geom_style,
            line_width_bits: desc.line_width.to_bits(),
            enable_scalar_override: desc.enable_scalar_override,
            discard_if_not_active_selected: lines && inputs.draw_item_index == 1,
            discard_if_not_rollover_selected: lines && inputs.draw_item_index == 2,
        }
    }

    /// Install the shader for `key` on `item`
    ///
    /// Does nothing when the item already carries a shader with this key.
    /// Returns whether the shader changed.
    pub fn update(
        registry: &ResourceRegistry,
        tracker: &ChangeTracker,
        item: &mut DrawItem,
        key: MeshShaderKey,
    ) -> bool {
        if item.geometric_shader().is_some_and(|shader| *shader.key() == key) {
            return false;
        }

        let mut instance = registry.register_geometric_shader(key.content_hash());
        if instance.is_first_instance() {
            instance.set_value(Arc::new(GeometricShader::new(key)));
        }
        let Some(shader) = instance.into_value() else {
            log::error!("Geometric shader for {:?} was not published", key.primitive_type);
            return false;
        };

        let changed = item.geometric_shader().map_or(true, |current| !Arc::ptr_eq(current, &shader));
        if changed {
            log::trace!("Geometric shader -> {:?}/{:?}", key.primitive_type, key.normal_source);
            item.set_geometric_shader(shader);
            tracker.mark_batches_dirty();
        }
        changed
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scene::draw_item::DrawingCoord;
    use crate::scene::repr::repr_descs;
    use crate::topology::{MeshTopology, RefineMode};

    fn catmark(level: i32, mode: RefineMode) -> RefinedTopology {
        RefinedTopology::new(
            MeshTopology::new(SubdivScheme::CatmullClark, vec![4], vec![0, 1, 2, 3]),
            level,
            mode,
        )
    }

    fn inputs<'a>(
        desc: &'a MeshReprDesc,
        topology: &'a RefinedTopology,
        material: &'a MaterialFlags,
    ) -> ShaderInputs<'a> {
        ShaderInputs {
            desc,
            draw_item_index: 0,
            topology: Some(topology),
            use_quad_indices: false,
            limit_normals: false,
            flat_shading_enabled: false,
            displacement_enabled: true,
            scene_normals: None,
            cull_style: CullStyle::Back,
            double_sided: false,
            has_face_varying: false,
            material,
        }
    }

    #[test]
    fn test_primitive_type_follows_refinement() {
        let material = MaterialFlags::default();
        let refined = repr_descs("refined").unwrap()[0];
        let hull = repr_descs("hull").unwrap()[0];

        let coarse = catmark(0, RefineMode::Uniform);
        assert_eq!(
            GeometricShaderSelector::select(&inputs(&refined, &coarse, &material)).primitive_type,
            PrimitiveType::CoarseTriangles
        );

        let uniform = catmark(2, RefineMode::Uniform);
        assert_eq!(
            GeometricShaderSelector::select(&inputs(&refined, &uniform, &material)).primitive_type,
            PrimitiveType::RefinedQuads
        );
        assert_eq!(
            GeometricShaderSelector::select(&inputs(&hull, &uniform, &material)).primitive_type,
            PrimitiveType::CoarseTriangles
        );

        let patches = catmark(2, RefineMode::Patches);
        assert_eq!(
            GeometricShaderSelector::select(&inputs(&refined, &patches, &material)).primitive_type,
            PrimitiveType::BSplinePatches
        );
    }

    #[test]
    fn test_normal_source_priority() {
        let material = MaterialFlags::default();
        let topology = catmark(0, RefineMode::Uniform);
        let refined = repr_descs("refined").unwrap()[0];
        let hull = repr_descs("hull").unwrap()[0];

        let mut base = inputs(&refined, &topology, &material);
        base.scene_normals = Some(Interpolation::Vertex);
        assert_eq!(GeometricShaderSelector::select(&base).normal_source, NormalSource::Smooth);

        base.limit_normals = true;
        assert_eq!(GeometricShaderSelector::select(&base).normal_source, NormalSource::Limit);

        base.flat_shading_enabled = true;
        assert_eq!(GeometricShaderSelector::select(&base).normal_source, NormalSource::Flat);

        let flat_hull = inputs(&hull, &topology, &material);
        assert_eq!(GeometricShaderSelector::select(&flat_hull).normal_source, NormalSource::Flat);

        let none = RefinedTopology::new(MeshTopology::new(SubdivScheme::None, vec![3], vec![0, 1, 2]), 0, RefineMode::Uniform);
        let mut authored = inputs(&refined, &none, &material);
        assert_eq!(GeometricShaderSelector::select(&authored).normal_source, NormalSource::GeometryShader);
        authored.scene_normals = Some(Interpolation::Uniform);
        let key = GeometricShaderSelector::select(&authored);
        assert_eq!(key.normal_source, NormalSource::Scene);
        assert_eq!(key.normals_interpolation, Interpolation::Uniform);
    }

    #[test]
    fn test_repr_cull_style_overrides_prim() {
        let material = MaterialFlags::default();
        let topology = catmark(0, RefineMode::Uniform);
        let mut desc = repr_descs("refined").unwrap()[0];
        assert_eq!(GeometricShaderSelector::select(&inputs(&desc, &topology, &material)).cull_style, CullStyle::Back);
        desc.cull_style = CullStyle::Nothing;
        assert_eq!(GeometricShaderSelector::select(&inputs(&desc, &topology, &material)).cull_style, CullStyle::Nothing);
    }

    #[test]
    fn test_edge_items_discard_flags() {
        let material = MaterialFlags::default();
        let topology = catmark(0, RefineMode::Uniform);
        let wire = repr_descs("wire").unwrap()[0];
        let mut item = inputs(&wire, &topology, &material);
        item.draw_item_index = 1;
        let key = GeometricShaderSelector::select(&item);
        assert!(key.discard_if_not_active_selected);
        assert!(!key.discard_if_not_rollover_selected);
    }

    #[test]
    fn test_update_only_on_key_change() {
        let registry = ResourceRegistry::default();
        let tracker = ChangeTracker::new();
        let material = MaterialFlags::default();
        let topology = catmark(0, RefineMode::Uniform);
        let desc = repr_descs("refined").unwrap()[0];
        let mut item = DrawItem::new(DrawingCoord::default());

        let key = GeometricShaderSelector::select(&inputs(&desc, &topology, &material));
        assert!(GeometricShaderSelector::update(&registry, &tracker, &mut item, key));
        assert_eq!(tracker.batch_version(), 1);
        assert!(!GeometricShaderSelector::update(&registry, &tracker, &mut item, key));
        assert_eq!(tracker.batch_version(), 1);

        let mut other = DrawItem::new(DrawingCoord::default());
        GeometricShaderSelector::update(&registry, &tracker, &mut other, key);
        assert!(Arc::ptr_eq(item.geometric_shader().unwrap(), other.geometric_shader().unwrap()));

        let mut flat = inputs(&desc, &topology, &material);
        flat.flat_shading_enabled = true;
        let flat_key = GeometricShaderSelector::select(&flat);
        assert!(GeometricShaderSelector::update(&registry, &tracker, &mut item, flat_key));
        assert_eq!(tracker.batch_version(), 3);
    }
}
