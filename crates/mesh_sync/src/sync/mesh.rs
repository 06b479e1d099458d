//! Mesh prim
//!
//! [`Mesh`] owns the per-prim state between syncs: the resolved topology,
//! the shared data all of its draw items address, and the reprs that were
//! requested so far. A sync pass runs the stages in a fixed order:
//! material and flags, topology, index ranges, adjacency, primvars by
//! class, then geometric shaders.

use std::sync::Arc;

use crate::geometry::adjacency::VertexAdjacency;
use crate::registry::{IndexKind, ResourceRegistry};
use crate::scene::change_tracker::ChangeTracker;
use crate::scene::delegate::{CullStyle, DisplayStyle, SceneDelegate};
use crate::scene::draw_item::{slot, DrawItem, DrawingCoord, Repr, SharedData};
use crate::scene::material::{MaterialFlags, MaterialMap};
use crate::scene::repr::{num_draw_items, repr_descs, GeomStyle, MeshReprDesc};
use crate::sync::dirty::{DirtyBits, DirtyStateTracker};
use crate::sync::primvar_sync::{PrimvarContext, PrimvarState, PrimvarSynchronizer};
use crate::sync::report::SyncReport;
use crate::sync::shader_selector::{GeometricShaderSelector, ShaderInputs};
use crate::sync::topology_resolver::{index_kind_for_desc, refine_level_for_desc, TopologyResolver};
use crate::topology::{RefinedTopology, SubdivScheme};

/// Bits that can change a draw item's geometric shader
const SHADER_BITS: DirtyBits = DirtyBits::DIRTY_DISPLAY_STYLE
    .union(DirtyBits::DIRTY_CULL_STYLE)
    .union(DirtyBits::DIRTY_DOUBLE_SIDED)
    .union(DirtyBits::DIRTY_MATERIAL_ID)
    .union(DirtyBits::DIRTY_TOPOLOGY)
    .union(DirtyBits::DIRTY_NORMALS)
    .union(DirtyBits::DIRTY_PRIMVAR)
    .union(DirtyBits::NEW_REPR);

/// Bits that re-resolve the topology
const TOPOLOGY_BITS: DirtyBits = DirtyBits::DIRTY_TOPOLOGY
    .union(DirtyBits::DIRTY_DISPLAY_STYLE)
    .union(DirtyBits::DIRTY_SUBDIV_TAGS);

/// Custom index bit consumed by draw items of `kind`
pub const fn index_bit(kind: IndexKind) -> DirtyBits {
    match kind {
        IndexKind::Full => DirtyBits::DIRTY_INDICES,
        IndexKind::Hull => DirtyBits::DIRTY_HULL_INDICES,
        IndexKind::Points => DirtyBits::DIRTY_POINTS_INDICES,
    }
}

/// Everything a prim sync borrows from its render index
#[derive(Clone, Copy)]
pub struct SyncContext<'a> {
    /// Resource registry
    pub registry: &'a ResourceRegistry,
    /// Scene data
    pub delegate: &'a dyn SceneDelegate,
    /// Known materials
    pub materials: &'a MaterialMap,
    /// Batch invalidation
    pub change_tracker: &'a ChangeTracker,
}

#[derive(Debug)]
struct ReprEntry {
    name: String,
    descs: Vec<MeshReprDesc>,
    repr: Repr,
}

/// Normals a repr needs generated this pass
#[derive(Debug, Clone, Copy, Default)]
struct NormalsRequest {
    smooth: bool,
    flat: bool,
}

/// A mesh prim
#[derive(Debug)]
pub struct Mesh {
    id: String,
    prim_index: i32,

    material_id: Option<String>,
    material: MaterialFlags,
    instancer_id: Option<String>,

    topology: Option<Arc<RefinedTopology>>,
    topology_id: u64,
    use_quad_indices: bool,
    limit_normals: bool,
    display_style: DisplayStyle,
    adjacency: Option<Arc<VertexAdjacency>>,
    has_varying_topology: bool,

    cull_style: CullStyle,
    double_sided: bool,

    primvars: PrimvarState,
    tracker: DirtyStateTracker,
    shared: SharedData,
    reprs: Vec<ReprEntry>,
}

impl Mesh {
    /// New prim at path `id`
    pub fn new(id: impl Into<String>, prim_index: i32) -> Self {
        Self {
            id: id.into(),
            prim_index,
            material_id: None,
            material: MaterialFlags::default(),
            instancer_id: None,
            topology: None,
            topology_id: 0,
            use_quad_indices: false,
            limit_normals: false,
            display_style: DisplayStyle::default(),
            adjacency: None,
            has_varying_topology: false,
            cull_style: CullStyle::DontCare,
            double_sided: false,
            primvars: PrimvarState::default(),
            tracker: DirtyStateTracker::new(),
            shared: SharedData::default(),
            reprs: Vec::new(),
        }
    }

    /// Bits a freshly inserted prim starts with
    pub fn initial_dirty_bits_mask() -> DirtyBits {
        DirtyBits::ALL_SCENE_DIRTY_BITS
    }

    /// Prim path
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Prim index
    pub fn prim_index(&self) -> i32 {
        self.prim_index
    }

    /// Bound material path as of the last sync
    pub fn material_id(&self) -> Option<&str> {
        self.material_id.as_deref()
    }

    /// Resolved topology, `None` until synced or for meshes without faces
    pub fn topology(&self) -> Option<&Arc<RefinedTopology>> {
        self.topology.as_ref()
    }

    /// Salted hash the topology is shared under
    pub fn topology_id(&self) -> u64 {
        self.topology_id
    }

    /// Coarse faces are quadrangulated
    pub fn use_quad_indices(&self) -> bool {
        self.use_quad_indices
    }

    /// Normals come from limit-surface evaluation
    pub fn limit_normals(&self) -> bool {
        self.limit_normals
    }

    /// Shared vertex adjacency, if smooth normals were ever required
    pub fn adjacency(&self) -> Option<&Arc<VertexAdjacency>> {
        self.adjacency.as_ref()
    }

    /// The prim switched to a different index range after its first sync
    pub fn has_varying_topology(&self) -> bool {
        self.has_varying_topology
    }

    /// Primvar bookkeeping
    pub fn primvar_state(&self) -> &PrimvarState {
        &self.primvars
    }

    /// Ranges shared by all draw items
    pub fn shared_data(&self) -> &SharedData {
        &self.shared
    }

    /// Custom bits this prim consumes
    pub fn custom_bits_in_use(&self) -> DirtyBits {
        self.tracker.custom_in_use()
    }

    /// Draw items of repr `name`, if it was initialized
    pub fn repr(&self, name: &str) -> Option<&Repr> {
        self.reprs.iter().find(|entry| entry.name == name).map(|entry| &entry.repr)
    }

    /// Expand raw scene edits with this prim's implication rules
    pub fn propagate_dirty_bits(&self, bits: DirtyBits, gpu_compute: bool) -> DirtyBits {
        self.tracker.propagate(bits, gpu_compute)
    }

    /// Create draw items for repr `name` and declare the custom bits they need
    ///
    /// Returns `false` for unknown repr names. Initializing an existing repr
    /// does nothing.
    pub fn init_repr(&mut self, name: &str, dirty: &mut DirtyBits) -> bool {
        if self.repr(name).is_some() {
            return true;
        }
        let Some(descs) = repr_descs(name) else {
            log::error!("{}: unknown repr '{}'", self.id, name);
            return false;
        };

        let mut repr = Repr::new();
        for desc in &descs {
            let count = num_draw_items(desc);
            if count == 0 {
                continue;
            }
            let (kind, topology_slot) = index_kind_for_desc(desc);
            for _ in 0..count {
                repr.add_draw_item(DrawItem::new(DrawingCoord::with_topology(topology_slot)));
            }
            self.tracker.declare_and_mark(index_bit(kind), dirty);

            if desc.geom_style != GeomStyle::Points {
                let normals = if desc.flat_shading_enabled || self.display_style.flat_shading_enabled {
                    DirtyBits::DIRTY_FLAT_NORMALS
                } else {
                    DirtyBits::DIRTY_SMOOTH_NORMALS
                };
                self.tracker.declare_and_mark(normals, dirty);
            }
        }

        log::debug!("{}: initialized repr '{}' with {} draw items", self.id, name, repr.draw_items().len());
        self.reprs.push(ReprEntry { name: name.to_string(), descs, repr });
        *dirty |= DirtyBits::NEW_REPR;
        true
    }

    /// Sync repr `repr_name` against `dirty`
    ///
    /// Returns the report and the custom bits left pending. Scene bits are
    /// always cleared, even when the prim fails.
    pub fn sync(&mut self, ctx: &SyncContext<'_>, repr_name: &str, mut dirty: DirtyBits) -> (SyncReport, DirtyBits) {
        let mut report = SyncReport::new(self.id.clone());
        let Some(repr_index) = self.reprs.iter().position(|entry| entry.name == repr_name) else {
            log::error!("{}: sync of uninitialized repr '{}'", self.id, repr_name);
            return (report, dirty - DirtyBits::ALL_SCENE_DIRTY_BITS);
        };

        self.sync_flags(ctx, dirty);

        if dirty.intersects(TOPOLOGY_BITS) {
            self.sync_topology(ctx, &mut dirty);
        }

        self.sync_index_ranges(ctx, repr_index, &mut dirty);
        let normals = self.normals_request(repr_index);
        // normals this repr never generates must not linger as pending work
        if !normals.smooth {
            dirty -= DirtyBits::DIRTY_SMOOTH_NORMALS;
        }
        if !normals.flat {
            dirty -= DirtyBits::DIRTY_FLAT_NORMALS;
        }

        if normals.smooth && self.adjacency.is_none() {
            if let Some(topology) = &self.topology {
                self.adjacency = TopologyResolver::new(ctx.registry).resolve_adjacency(topology, self.topology_id);
            }
        }

        self.sync_primvars(ctx, repr_index, normals, &mut dirty, &mut report);

        if dirty.intersects(SHADER_BITS) {
            self.update_shaders(ctx, repr_index);
        }

        if self.topology.is_none() {
            dirty -= DirtyBits::CUSTOM_INDEX_BITS;
        }
        let remaining = dirty - DirtyBits::ALL_SCENE_DIRTY_BITS - DirtyBits::VARYING;
        (report, remaining)
    }

    fn sync_flags(&mut self, ctx: &SyncContext<'_>, dirty: DirtyBits) {
        let delegate = ctx.delegate;
        if dirty.contains(DirtyBits::DIRTY_MATERIAL_ID) {
            self.material_id = delegate.material_id(&self.id);
            self.material = MaterialFlags::resolve(ctx.materials, self.material_id.as_deref());
            self.shared.material_tag = self.material.tag.clone();
        }
        if dirty.contains(DirtyBits::DIRTY_VISIBILITY) {
            self.shared.visible = delegate.visible(&self.id);
        }
        if dirty.contains(DirtyBits::DIRTY_INSTANCER) {
            self.instancer_id = delegate.instancer_id(&self.id);
        }
        if dirty.contains(DirtyBits::DIRTY_DOUBLE_SIDED) {
            self.double_sided = delegate.double_sided(&self.id);
        }
        if dirty.contains(DirtyBits::DIRTY_CULL_STYLE) {
            self.cull_style = delegate.cull_style(&self.id);
        }
    }

    fn sync_topology(&mut self, ctx: &SyncContext<'_>, dirty: &mut DirtyBits) {
        let resolved = TopologyResolver::new(ctx.registry).resolve(ctx.delegate, &self.id, &self.material);
        if self.topology.is_some() && resolved.topology_id != self.topology_id {
            log::debug!("{}: topology {:#x} -> {:#x}", self.id, self.topology_id, resolved.topology_id);
            // everything laid out against the old topology is stale
            *dirty |= DirtyBits::ANY_PRIMVAR;
            self.tracker.mark_custom_dirty(dirty, DirtyBits::ALL_CUSTOM_BITS);
        }

        self.topology = resolved.topology;
        self.topology_id = resolved.topology_id;
        self.use_quad_indices = resolved.use_quad_indices;
        self.limit_normals = resolved.limit_normals;
        self.display_style = resolved.display_style;
        self.adjacency = None;

        if self.display_style.flat_shading_enabled {
            self.tracker.declare_and_mark(DirtyBits::DIRTY_FLAT_NORMALS, dirty);
        }
    }

    fn sync_index_ranges(&mut self, ctx: &SyncContext<'_>, repr_index: usize, dirty: &mut DirtyBits) {
        let resolver = TopologyResolver::new(ctx.registry);
        let mut consumed = DirtyBits::empty();

        for desc in &self.reprs[repr_index].descs {
            if num_draw_items(desc) == 0 {
                continue;
            }
            let (kind, topology_slot) = index_kind_for_desc(desc);
            let bit = index_bit(kind);
            if !dirty.contains(bit) || consumed.contains(bit) {
                continue;
            }
            consumed |= bit;

            let Some(topology) = &self.topology else {
                self.shared.update_range(topology_slot, None, ctx.change_tracker);
                continue;
            };
            let current = self.shared.range(topology_slot).cloned();
            let resolved =
                resolver.resolve_index_range(topology, self.topology_id, self.use_quad_indices, desc, current.as_ref());
            if let Some(resolved) = resolved {
                self.has_varying_topology |= resolved.varying;
                self.shared.update_range(topology_slot, Some(resolved.range), ctx.change_tracker);
            }
        }
        *dirty -= consumed;
    }

    fn normals_request(&self, repr_index: usize) -> NormalsRequest {
        let topology = self.topology.as_deref();
        let scheme = topology.map_or(SubdivScheme::None, RefinedTopology::scheme);
        let prim_flat = self.display_style.flat_shading_enabled;
        let mut request = NormalsRequest::default();

        for desc in &self.reprs[repr_index].descs {
            if num_draw_items(desc) == 0 || desc.geom_style == GeomStyle::Points {
                continue;
            }
            let flat_shaded = desc.flat_shading_enabled || prim_flat;
            request.smooth |= !flat_shaded
                && !self.limit_normals
                && !matches!(scheme, SubdivScheme::None | SubdivScheme::Bilinear);
            request.flat |= flat_shaded && scheme != SubdivScheme::None && refine_level_for_desc(topology, desc) == 0;
        }
        request
    }

    fn sync_primvars(
        &mut self,
        ctx: &SyncContext<'_>,
        repr_index: usize,
        normals: NormalsRequest,
        dirty: &mut DirtyBits,
        report: &mut SyncReport,
    ) {
        let primvar_ctx = PrimvarContext {
            registry: ctx.registry,
            delegate: ctx.delegate,
            change_tracker: ctx.change_tracker,
            id: &self.id,
            prim_index: self.prim_index,
            topology: self.topology.as_ref(),
            topology_id: self.topology_id,
            use_quad_indices: self.use_quad_indices,
            adjacency: self.adjacency.as_ref(),
            varying_topology: self.has_varying_topology,
        };
        let coord = DrawingCoord::default();
        let face_varying_desc = self.reprs[repr_index]
            .descs
            .iter()
            .find(|desc| num_draw_items(desc) > 0)
            .copied();
        let mut primvars = PrimvarSynchronizer::new(primvar_ctx, &mut self.shared, &mut self.primvars, report);

        primvars.sync_constant(&coord, *dirty);
        if let Some(instancer_id) = &self.instancer_id {
            primvars.sync_instance(&coord, *dirty, instancer_id);
        }

        let points = match primvars.sync_vertex(&coord, dirty, normals.smooth) {
            Ok(points) => points,
            Err(err) => {
                report.fail(err);
                return;
            }
        };
        if let Some(desc) = &face_varying_desc {
            primvars.sync_face_varying(&coord, *dirty, desc);
        }
        primvars.sync_element(&coord, dirty, normals.flat, points.as_ref());
    }

    fn update_shaders(&mut self, ctx: &SyncContext<'_>, repr_index: usize) {
        let has_face_varying = self
            .shared
            .range(slot::FACE_VARYING_PRIMVAR)
            .is_some_and(|range| range.is_valid());
        let entry = &mut self.reprs[repr_index];
        let mut item_index = 0;

        for desc in &entry.descs {
            for desc_item in 0..num_draw_items(desc) {
                let inputs = ShaderInputs {
                    desc,
                    draw_item_index: desc_item,
                    topology: self.topology.as_deref(),
                    use_quad_indices: self.use_quad_indices,
                    limit_normals: self.limit_normals,
                    flat_shading_enabled: self.display_style.flat_shading_enabled,
                    displacement_enabled: self.display_style.displacement_enabled,
                    scene_normals: self.primvars.scene_normals,
                    cull_style: self.cull_style,
                    double_sided: self.double_sided,
                    has_face_varying,
                    material: &self.material,
                };
                let key = GeometricShaderSelector::select(&inputs);
                if let Some(item) = entry.repr.draw_item_mut(item_index) {
                    GeometricShaderSelector::update(ctx.registry, ctx.change_tracker, item, key);
                }
                item_index += 1;
            }
        }
    }
}
