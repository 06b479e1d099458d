//! Topology resolution
//!
//! Turns a prim's raw topology and display style into a shared
//! [`RefinedTopology`], then hands out the shared index range for each
//! index kind a draw item asks for. Both lookups go through the resource
//! registry, so prims with equal content share one topology and one index
//! range per kind.

use std::sync::Arc;

use crate::buffer::{collect_buffer_specs, is_valid_range, BufferSourceHandle, RangeHandle, RangeRole, UsageHint};
use crate::core::config::SyncConfig;
use crate::foundation::diagnostics::verify;
use crate::foundation::hash::salt;
use crate::geometry::adjacency::VertexAdjacency;
use crate::registry::{IndexKind, ResourceRegistry};
use crate::scene::delegate::{DisplayStyle, SceneDelegate};
use crate::scene::draw_item::slot;
use crate::scene::material::MaterialFlags;
use crate::scene::repr::{GeomStyle, MeshReprDesc};
use crate::topology::{MeshTopology, RefineMode, RefinedTopology, SubdivScheme, SubdivTags};

/// Whether coarse faces are quadrangulated
///
/// Needed for ptex materials (and when forced by configuration) unless the
/// scheme refines to triangles anyway.
pub fn use_quad_indices(config: &SyncConfig, topology: &RefinedTopology, material: &MaterialFlags) -> bool {
    !topology.refines_to_triangles() && (material.has_ptex || config.force_quadrangulate)
}

/// Refine level a descriptor draws at; hull styles always draw coarse
pub fn refine_level_for_desc(topology: Option<&RefinedTopology>, desc: &MeshReprDesc) -> usize {
    if desc.geom_style.is_hull() {
        return 0;
    }
    topology.map_or(0, RefinedTopology::refine_level)
}

/// Index kind and topology slot for a descriptor
pub const fn index_kind_for_desc(desc: &MeshReprDesc) -> (IndexKind, usize) {
    match desc.geom_style {
        GeomStyle::Hull | GeomStyle::HullEdgeOnly | GeomStyle::HullEdgeOnSurf => {
            (IndexKind::Hull, slot::HULL_TOPOLOGY)
        }
        GeomStyle::Points => (IndexKind::Points, slot::POINTS_TOPOLOGY),
        _ => (IndexKind::Full, slot::TOPOLOGY),
    }
}

/// Outcome of [`TopologyResolver::resolve`]
#[derive(Debug, Clone)]
pub struct ResolvedTopology {
    /// Shared topology, `None` for meshes without faces
    pub topology: Option<Arc<RefinedTopology>>,
    /// Salted content hash the topology was registered under
    pub topology_id: u64,
    /// Coarse faces are quadrangulated
    pub use_quad_indices: bool,
    /// Normals come from limit-surface evaluation
    pub limit_normals: bool,
    /// Display style pulled alongside the topology
    pub display_style: DisplayStyle,
}

/// Outcome of [`TopologyResolver::resolve_index_range`]
#[derive(Debug, Clone)]
pub struct IndexRange {
    /// Shared index range
    pub range: RangeHandle,
    /// The prim already had a different valid range for this kind
    pub varying: bool,
}

/// Registry-backed topology resolution
#[derive(Debug, Clone, Copy)]
pub struct TopologyResolver<'r> {
    registry: &'r ResourceRegistry,
}

impl<'r> TopologyResolver<'r> {
    /// Resolver bound to `registry`
    pub fn new(registry: &'r ResourceRegistry) -> Self {
        Self { registry }
    }

    /// Candidate topology for the given inputs, before registration
    ///
    /// Subdivision tags are only pulled (and hashed) when the prim refines.
    pub fn build_candidate(
        mut topology: MeshTopology,
        display_style: &DisplayStyle,
        material: &MaterialFlags,
        subdiv_tags: impl FnOnce() -> SubdivTags,
    ) -> (RefinedTopology, bool) {
        let mut refine_level = display_style.refine_level.max(0);
        if topology.scheme == SubdivScheme::None {
            refine_level = 0;
        }

        let limit = topology.scheme.supports_limit_evaluation()
            && refine_level > 0
            && material.has_limit_surface_evaluation;
        let mode = if limit { RefineMode::Patches } else { RefineMode::Uniform };

        if refine_level > 0 {
            topology.subdiv_tags = subdiv_tags();
        }
        (RefinedTopology::new(topology, refine_level, mode), limit)
    }

    /// Resolve and share the topology of prim `id`
    pub fn resolve(
        &self,
        delegate: &dyn SceneDelegate,
        id: &str,
        material: &MaterialFlags,
    ) -> ResolvedTopology {
        let display_style = delegate.display_style(id);
        let (candidate, limit_normals) = Self::build_candidate(
            delegate.mesh_topology(id),
            &display_style,
            material,
            || delegate.subdiv_tags(id),
        );

        let use_quad = use_quad_indices(self.registry.config(), &candidate, material);
        let topology_id = salt(candidate.compute_hash(), &[u8::from(use_quad)]);

        if candidate.num_faces() == 0 {
            log::debug!("{}: topology has no faces", id);
            return ResolvedTopology {
                topology: None,
                topology_id,
                use_quad_indices: use_quad,
                limit_normals,
                display_style,
            };
        }

        let shared = self.register(candidate, topology_id, use_quad, id);
        ResolvedTopology {
            topology: shared,
            topology_id,
            use_quad_indices: use_quad,
            limit_normals,
            display_style,
        }
    }

    fn register(
        &self,
        candidate: RefinedTopology,
        topology_id: u64,
        use_quad: bool,
        id: &str,
    ) -> Option<Arc<RefinedTopology>> {
        let mut instance = self.registry.register_mesh_topology(topology_id);
        if instance.is_first_instance() {
            let topology = Arc::new(candidate);
            if topology.refine_level() > 0 {
                self.registry.add_source(topology.osd_topology_computation());
            }
            // hull reprs of a refined prim still draw quadrangulated faces
            if use_quad {
                self.registry.add_source(topology.quad_info_builder());
            }
            log::trace!("{}: registered topology {:#x}", id, topology_id);
            instance.set_value(topology);
            return instance.into_value();
        }

        let shared = instance.into_value();
        if self.registry.config().safe_mode {
            if let Some(shared) = &shared {
                verify(**shared == candidate, "shared topology matches its hash");
            }
        }
        shared
    }

    /// Shared index range of `kind` for a descriptor
    ///
    /// Only the first prim to ask for a `(topology, kind)` pair builds it; the
    /// builder is chosen from the descriptor's style and refine level.
    pub fn resolve_index_range(
        &self,
        topology: &Arc<RefinedTopology>,
        topology_id: u64,
        use_quad: bool,
        desc: &MeshReprDesc,
        current: Option<&RangeHandle>,
    ) -> Option<IndexRange> {
        let (kind, _) = index_kind_for_desc(desc);
        let mut instance = self.registry.register_mesh_index_range(topology_id, kind);

        if instance.is_first_instance() {
            let source: BufferSourceHandle = if desc.geom_style == GeomStyle::Points {
                topology.points_index_builder_computation()
            } else if refine_level_for_desc(Some(topology), desc) > 0 {
                topology.osd_index_builder_computation()
            } else if use_quad {
                topology.quad_index_builder_computation()
            } else {
                topology.triangle_index_builder_computation()
            };
            let sources = vec![source];
            let mut specs = Vec::new();
            collect_buffer_specs(&sources, &mut specs);

            let hint = if current.is_some() { UsageHint::SIZE_VARYING } else { UsageHint::empty() };
            let range = self.registry.allocate_range(RangeRole::Topology, specs, hint);
            self.registry.add_sources(&range, sources);
            instance.set_value(range);
        }

        let Some(range) = instance.into_value() else {
            log::error!("Index range {:?} for topology {:#x} was not published", kind, topology_id);
            return None;
        };
        let varying = is_valid_range(current) && current.is_some_and(|current| !Arc::ptr_eq(current, &range));
        if varying {
            log::debug!("Topology {:#x} has varying {:?} indices", topology_id, kind);
        }
        Some(IndexRange { range, varying })
    }

    /// Shared vertex adjacency of a topology
    pub fn resolve_adjacency(&self, topology: &RefinedTopology, topology_id: u64) -> Option<Arc<VertexAdjacency>> {
        let mut instance = self.registry.register_vertex_adjacency(topology_id);
        if instance.is_first_instance() {
            let adjacency = Arc::new(VertexAdjacency::new(topology));
            self.registry.add_source(adjacency.builder());
            instance.set_value(adjacency);
        }
        instance.into_value()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scene::memory_delegate::{MeshData, MemoryDelegate};
    use crate::scene::repr::repr_descs;

    fn cube_faces() -> MeshTopology {
        MeshTopology::new(
            SubdivScheme::CatmullClark,
            vec![4; 6],
            vec![0, 1, 3, 2, 2, 3, 5, 4, 4, 5, 7, 6, 6, 7, 1, 0, 1, 7, 5, 3, 6, 0, 2, 4],
        )
    }

    fn scene_with(topology: MeshTopology, display_style: DisplayStyle) -> MemoryDelegate {
        let mut delegate = MemoryDelegate::new();
        delegate.insert_mesh("/a", MeshData::new(topology.clone()).with_display_style(display_style));
        delegate.insert_mesh("/b", MeshData::new(topology).with_display_style(display_style));
        delegate
    }

    #[test]
    fn test_identical_topologies_share() {
        let registry = ResourceRegistry::default();
        let resolver = TopologyResolver::new(&registry);
        let delegate = scene_with(cube_faces(), DisplayStyle::default());
        let material = MaterialFlags::default();

        let a = resolver.resolve(&delegate, "/a", &material);
        let b = resolver.resolve(&delegate, "/b", &material);
        assert_eq!(a.topology_id, b.topology_id);
        assert!(Arc::ptr_eq(a.topology.as_ref().unwrap(), b.topology.as_ref().unwrap()));
    }

    #[test]
    fn test_ptex_salts_hash() {
        let registry = ResourceRegistry::default();
        let resolver = TopologyResolver::new(&registry);
        let delegate = scene_with(cube_faces(), DisplayStyle::default());

        let plain = resolver.resolve(&delegate, "/a", &MaterialFlags::default());
        let ptex_flags = MaterialFlags { has_ptex: true, ..MaterialFlags::default() };
        let ptex = resolver.resolve(&delegate, "/b", &ptex_flags);

        assert!(!plain.use_quad_indices);
        assert!(ptex.use_quad_indices);
        assert_ne!(plain.topology_id, ptex.topology_id);
        assert!(!Arc::ptr_eq(plain.topology.as_ref().unwrap(), ptex.topology.as_ref().unwrap()));
        assert_eq!(registry.pending_source_names().last().map(String::as_str), Some(crate::tokens::QUAD_INFO));
    }

    #[test]
    fn test_none_scheme_never_refines() {
        let registry = ResourceRegistry::default();
        let resolver = TopologyResolver::new(&registry);
        let mut topology = cube_faces();
        topology.scheme = SubdivScheme::None;
        let delegate = scene_with(topology, DisplayStyle::default().with_refine_level(2));
        let resolved = resolver.resolve(&delegate, "/a", &MaterialFlags::default());
        assert_eq!(resolved.topology.unwrap().refine_level(), 0);
        assert!(registry.pending_source_names().is_empty());
    }

    #[test]
    fn test_limit_evaluation_selects_patches() {
        let limit = MaterialFlags { has_limit_surface_evaluation: true, ..MaterialFlags::default() };
        let style = DisplayStyle::default().with_refine_level(1);
        let (refined, limit_normals) =
            TopologyResolver::build_candidate(cube_faces(), &style, &limit, SubdivTags::default);
        assert!(limit_normals);
        assert_eq!(refined.refine_mode(), RefineMode::Patches);

        let mut bilinear = cube_faces();
        bilinear.scheme = SubdivScheme::Bilinear;
        let (refined, limit_normals) = TopologyResolver::build_candidate(bilinear, &style, &limit, SubdivTags::default);
        assert!(!limit_normals);
        assert_eq!(refined.refine_mode(), RefineMode::Uniform);
    }

    #[test]
    fn test_zero_faces_resolve_to_none() {
        let registry = ResourceRegistry::default();
        let resolver = TopologyResolver::new(&registry);
        let delegate = scene_with(MeshTopology::default(), DisplayStyle::default());
        assert!(resolver.resolve(&delegate, "/a", &MaterialFlags::default()).topology.is_none());
    }

    #[test]
    fn test_index_ranges_shared_per_kind() {
        let registry = ResourceRegistry::default();
        let resolver = TopologyResolver::new(&registry);
        let delegate = scene_with(cube_faces(), DisplayStyle::default());
        let resolved = resolver.resolve(&delegate, "/a", &MaterialFlags::default());
        let topology = resolved.topology.unwrap();
        let refined = repr_descs("refined").unwrap()[0];
        let hull = repr_descs("hull").unwrap()[0];

        let full = resolver.resolve_index_range(&topology, resolved.topology_id, false, &refined, None).unwrap();
        let again = resolver.resolve_index_range(&topology, resolved.topology_id, false, &refined, None).unwrap();
        let coarse = resolver.resolve_index_range(&topology, resolved.topology_id, false, &hull, None).unwrap();
        assert!(Arc::ptr_eq(&full.range, &again.range));
        assert!(!Arc::ptr_eq(&full.range, &coarse.range));
        assert!(!full.varying);

        let other = registry.allocate_range(RangeRole::Topology, Vec::new(), UsageHint::empty());
        let swapped = resolver
            .resolve_index_range(&topology, resolved.topology_id, false, &refined, Some(&other))
            .unwrap();
        assert!(swapped.varying);
    }
}
