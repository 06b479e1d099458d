//! Hashed, shareable mesh topology
//!
//! A [`RefinedTopology`] is what prims share through the resource registry:
//! the raw layout plus refinement level and mode. It owns the preprocessing
//! computations (quad info, subdivision tables) so that every prim sharing
//! the topology also shares their results.

use std::sync::Arc;

use parking_lot::Mutex;

use super::mesh_topology::{MeshTopology, Orientation, SubdivScheme};
use super::quadrangulate::{
    QuadIndexBuilderComputation, QuadInfo, QuadInfoBuilderComputation, QuadrangulateComputation,
    QuadrangulateComputationGpu, QuadrangulateFaceVaryingComputation,
};
use super::subdivision::{
    OsdIndexBuilderComputation, OsdRefineComputation, OsdRefineComputationGpu, OsdTopologyComputation,
};
use super::triangulate::{
    PointsIndexBuilderComputation, TriangleIndexBuilderComputation, TriangulateFaceVaryingComputation,
};
use crate::buffer::{BufferSourceHandle, ComputationHandle, TupleType};
use crate::foundation::hash::ContentHasher;

/// How a refined topology is drawn
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum RefineMode {
    /// Uniformly subdivided faces
    #[default]
    Uniform,
    /// Limit-surface patches evaluated in the shader
    Patches,
}

/// Shareable topology with refinement state
#[derive(Debug)]
pub struct RefinedTopology {
    base: Arc<MeshTopology>,
    refine_level: usize,
    refine_mode: RefineMode,
    quad_info_builder: Mutex<Option<Arc<QuadInfoBuilderComputation>>>,
    osd_topology: Mutex<Option<Arc<OsdTopologyComputation>>>,
}

impl RefinedTopology {
    /// Wrap `base`; negative levels clamp to 0
    pub fn new(base: MeshTopology, refine_level: i32, refine_mode: RefineMode) -> Self {
        Self {
            base: Arc::new(base),
            refine_level: refine_level.max(0) as usize,
            refine_mode,
            quad_info_builder: Mutex::new(None),
            osd_topology: Mutex::new(None),
        }
    }

    /// Content hash over layout, refinement and (when refined) subdivision tags
    pub fn compute_hash(&self) -> u64 {
        let mut hasher = ContentHasher::new();
        self.base.hash_layout(&mut hasher);
        hasher
            .write_u64(self.refine_level as u64)
            .write_bool(self.refine_mode == RefineMode::Patches);
        if self.refine_level > 0 {
            self.base.subdiv_tags.hash_into(&mut hasher);
        }
        hasher.finish()
    }

    /// Raw layout
    pub fn base(&self) -> &Arc<MeshTopology> {
        &self.base
    }

    /// Subdivision scheme
    pub fn scheme(&self) -> SubdivScheme {
        self.base.scheme
    }

    /// Face winding
    pub fn orientation(&self) -> Orientation {
        self.base.orientation
    }

    /// Refinement level
    pub fn refine_level(&self) -> usize {
        self.refine_level
    }

    /// Refinement mode
    pub fn refine_mode(&self) -> RefineMode {
        self.refine_mode
    }

    /// Coarse point count
    pub fn num_points(&self) -> usize {
        self.base.num_points()
    }

    /// Coarse face count
    pub fn num_faces(&self) -> usize {
        self.base.num_faces()
    }

    /// Coarse face-corner count
    pub fn num_face_varyings(&self) -> usize {
        self.base.num_face_varyings()
    }

    /// Whether refinement yields triangles
    pub fn refines_to_triangles(&self) -> bool {
        self.base.scheme.refines_to_triangles()
    }

    /// Whether refinement yields B-spline patches
    pub fn refines_to_bspline_patches(&self) -> bool {
        self.refine_mode == RefineMode::Patches && self.base.scheme == SubdivScheme::CatmullClark
    }

    /// Whether refinement yields box-spline triangle patches
    pub fn refines_to_box_spline_triangle_patches(&self) -> bool {
        self.refine_mode == RefineMode::Patches && self.base.scheme == SubdivScheme::Loop
    }

    // Quadrangulation

    /// Quad info builder, created on first request
    pub fn quad_info_builder(&self) -> Arc<QuadInfoBuilderComputation> {
        let mut slot = self.quad_info_builder.lock();
        Arc::clone(slot.get_or_insert_with(|| Arc::new(QuadInfoBuilderComputation::new(Arc::clone(&self.base)))))
    }

    /// Quad info, if already built
    pub fn quad_info(&self) -> Option<Arc<QuadInfo>> {
        self.quad_info_builder.lock().as_ref().and_then(|builder| builder.resolved_quad_info())
    }

    fn known_all_quads(&self) -> bool {
        self.quad_info().is_some_and(|info| info.is_all_quads())
    }

    /// CPU quadrangulation of a per-point source, `None` when nothing to do
    pub fn quadrangulate_computation(&self, source: BufferSourceHandle) -> Option<BufferSourceHandle> {
        if self.known_all_quads() {
            return None;
        }
        Some(Arc::new(QuadrangulateComputation::new(source, self.quad_info_builder())))
    }

    /// GPU quadrangulation of buffer `name`, `None` when nothing to do
    pub fn quadrangulate_computation_gpu(&self, name: &str, tuple_type: TupleType) -> Option<ComputationHandle> {
        if self.known_all_quads() {
            return None;
        }
        Some(Arc::new(QuadrangulateComputationGpu::new(name, tuple_type, self.quad_info_builder())))
    }

    /// CPU quadrangulation of a face-varying source
    pub fn quadrangulate_face_varying_computation(&self, source: BufferSourceHandle) -> BufferSourceHandle {
        Arc::new(QuadrangulateFaceVaryingComputation::new(Arc::clone(&self.base), source))
    }

    /// CPU triangulation of a face-varying source
    pub fn triangulate_face_varying_computation(&self, source: BufferSourceHandle) -> BufferSourceHandle {
        Arc::new(TriangulateFaceVaryingComputation::new(Arc::clone(&self.base), source))
    }

    // Subdivision

    /// Subdivision preprocessing, created on first request
    pub fn osd_topology_computation(&self) -> Arc<OsdTopologyComputation> {
        let mut slot = self.osd_topology.lock();
        Arc::clone(slot.get_or_insert_with(|| {
            Arc::new(OsdTopologyComputation::new(Arc::clone(&self.base), self.refine_level))
        }))
    }

    /// CPU refinement of a per-point source
    pub fn osd_refine_computation(&self, source: BufferSourceHandle, varying: bool) -> BufferSourceHandle {
        Arc::new(OsdRefineComputation::new(source, self.osd_topology_computation(), varying))
    }

    /// GPU refinement of buffer `name`
    pub fn osd_refine_computation_gpu(&self, name: &str, tuple_type: TupleType, varying: bool) -> ComputationHandle {
        Arc::new(OsdRefineComputationGpu::new(name, tuple_type, self.osd_topology_computation(), varying))
    }

    // Index builders

    /// Fan-triangulated indices
    pub fn triangle_index_builder_computation(&self) -> BufferSourceHandle {
        Arc::new(TriangleIndexBuilderComputation::new(Arc::clone(&self.base)))
    }

    /// Quadrangulated indices
    pub fn quad_index_builder_computation(&self) -> BufferSourceHandle {
        Arc::new(QuadIndexBuilderComputation::new(Arc::clone(&self.base), self.quad_info_builder()))
    }

    /// Refined indices
    pub fn osd_index_builder_computation(&self) -> BufferSourceHandle {
        Arc::new(OsdIndexBuilderComputation::new(Arc::clone(&self.base), self.osd_topology_computation()))
    }

    /// One index per coarse point
    pub fn points_index_builder_computation(&self) -> BufferSourceHandle {
        Arc::new(PointsIndexBuilderComputation::new(self.num_points()))
    }
}

impl PartialEq for RefinedTopology {
    fn eq(&self, other: &Self) -> bool {
        self.refine_level == other.refine_level
            && self.refine_mode == other.refine_mode
            && self.base == other.base
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::buffer::{BufferSource, ValueType};
    use crate::topology::mesh_topology::SubdivTags;

    fn quad_topology(level: i32) -> RefinedTopology {
        let base = MeshTopology::new(SubdivScheme::CatmullClark, vec![4], vec![0, 1, 2, 3]);
        RefinedTopology::new(base, level, RefineMode::Uniform)
    }

    #[test]
    fn test_equal_content_equal_hash() {
        assert_eq!(quad_topology(0).compute_hash(), quad_topology(0).compute_hash());
        assert_eq!(quad_topology(0), quad_topology(0));
    }

    #[test]
    fn test_level_changes_hash() {
        assert_ne!(quad_topology(0).compute_hash(), quad_topology(2).compute_hash());
    }

    #[test]
    fn test_tags_hashed_only_when_refined() {
        let tags = SubdivTags {
            corner_indices: vec![0],
            corner_sharpness: vec![1.0],
            ..SubdivTags::default()
        };
        let tagged = |level| {
            let base = MeshTopology::new(SubdivScheme::CatmullClark, vec![4], vec![0, 1, 2, 3])
                .with_subdiv_tags(tags.clone());
            RefinedTopology::new(base, level, RefineMode::Uniform)
        };
        assert_eq!(tagged(0).compute_hash(), quad_topology(0).compute_hash());
        assert_ne!(tagged(1).compute_hash(), quad_topology(1).compute_hash());
    }

    #[test]
    fn test_patch_classification() {
        let base = MeshTopology::new(SubdivScheme::Loop, vec![3], vec![0, 1, 2]);
        let topology = RefinedTopology::new(base, 1, RefineMode::Patches);
        assert!(topology.refines_to_triangles());
        assert!(topology.refines_to_box_spline_triangle_patches());
        assert!(!topology.refines_to_bspline_patches());
    }

    #[test]
    fn test_builders_are_shared() {
        let topology = quad_topology(1);
        assert!(Arc::ptr_eq(&topology.quad_info_builder(), &topology.quad_info_builder()));
        assert!(Arc::ptr_eq(&topology.osd_topology_computation(), &topology.osd_topology_computation()));
    }

    #[test]
    fn test_all_quads_skips_quadrangulation_once_known() {
        let topology = quad_topology(0);
        let source: BufferSourceHandle = Arc::new(crate::buffer::VtBufferSource::new(
            "points",
            TupleType::new(ValueType::Float, 3),
            crate::buffer::BufferData::Float(vec![0.0; 12]),
        ));
        assert!(topology.quadrangulate_computation(Arc::clone(&source)).is_some());
        topology.quad_info_builder().resolve().unwrap();
        assert!(topology.quadrangulate_computation(source).is_none());
    }
}
