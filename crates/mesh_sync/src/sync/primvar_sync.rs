//! Primvar synchronization
//!
//! One [`PrimvarSynchronizer`] runs per draw item update. Each interpolation
//! class is pulled from the delegate (only for dirty names), validated
//! against the element count the topology expects, transformed for the
//! topology (refined, quadrangulated or triangulated) and handed to the
//! range lifecycle together with any generated normals.

use std::sync::Arc;

use crate::buffer::{
    is_valid_range, BufferSource, BufferSourceHandle, BufferSpec, ComputationHandle, RangeHandle, RangeRole, TupleType, UsageHint, Value,
    ValueType, VtBufferSource,
};
use crate::foundation::diagnostics::verify;
use crate::geometry::adjacency::VertexAdjacency;
use crate::geometry::normals::{
    smooth_normals_name, FlatNormalsComputation, FlatNormalsComputationGpu, SmoothNormalsComputation,
    SmoothNormalsComputationGpu,
};
use crate::registry::ResourceRegistry;
use crate::scene::change_tracker::ChangeTracker;
use crate::scene::delegate::SceneDelegate;
use crate::scene::draw_item::{DrawingCoord, SharedData};
use crate::scene::primvar::Interpolation;
use crate::scene::repr::MeshReprDesc;
use crate::sync::dirty::DirtyBits;
use crate::sync::range_lifecycle::{
    can_skip_allocation_or_update, removed_primvar_specs, BufferRangeLifecycle, PendingWork, RangeRequest,
};
use crate::sync::report::{SyncError, SyncReport, WarningKind};
use crate::sync::topology_resolver::refine_level_for_desc;
use crate::tokens;
use crate::topology::RefinedTopology;

const VERTEX_GENERATED: [&str; 2] = [tokens::SMOOTH_NORMALS, tokens::PACKED_SMOOTH_NORMALS];
const ELEMENT_GENERATED: [&str; 2] = [tokens::FLAT_NORMALS, tokens::PACKED_FLAT_NORMALS];
const CONSTANT_GENERATED: [&str; 2] = [tokens::TRANSFORM, tokens::PRIM_ID];

/// Read-only inputs shared by every stage of one prim's sync
#[derive(Clone, Copy)]
pub struct PrimvarContext<'a> {
    /// Resource registry
    pub registry: &'a ResourceRegistry,
    /// Scene data
    pub delegate: &'a dyn SceneDelegate,
    /// Batch invalidation
    pub change_tracker: &'a ChangeTracker,
    /// Prim path
    pub id: &'a str,
    /// Prim index in the render index
    pub prim_index: i32,
    /// Resolved topology
    pub topology: Option<&'a Arc<RefinedTopology>>,
    /// Salted topology hash
    pub topology_id: u64,
    /// Coarse faces are quadrangulated
    pub use_quad_indices: bool,
    /// Shared adjacency, when smooth normals are in use
    pub adjacency: Option<&'a Arc<VertexAdjacency>>,
    /// The topology changed after the first sync
    pub varying_topology: bool,
}

/// Per-prim primvar state carried between syncs
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PrimvarState {
    /// Sharing id of the vertex range, 0 when private
    pub vertex_primvar_id: u64,
    /// Interpolation of authored normals
    pub scene_normals: Option<Interpolation>,
}

/// Result of validating one primvar value
enum Validated {
    Source(VtBufferSource),
    Skipped,
    TooFewPoints { found: usize, expected: usize },
}

/// Pulls, validates and schedules a prim's primvars
pub struct PrimvarSynchronizer<'a, 's> {
    ctx: PrimvarContext<'a>,
    shared: &'s mut SharedData,
    state: &'s mut PrimvarState,
    report: &'s mut SyncReport,
}

impl<'a, 's> PrimvarSynchronizer<'a, 's> {
    /// Synchronizer over the prim's shared data and state
    pub fn new(
        ctx: PrimvarContext<'a>,
        shared: &'s mut SharedData,
        state: &'s mut PrimvarState,
        report: &'s mut SyncReport,
    ) -> Self {
        Self { ctx, shared, state, report }
    }

    fn registry(&self) -> &'a ResourceRegistry {
        self.ctx.registry
    }

    fn gpu(&self) -> bool {
        self.ctx.registry.config().gpu_compute
    }

    /// Pull `name` and check its element count against `expected`
    ///
    /// Short values are skipped (fatal only for points of the vertex
    /// class); long values are truncated.
    fn pull(&mut self, name: &str, value: &Value, interpolation: Interpolation, expected: usize) -> Validated {
        let Some(mut source) = VtBufferSource::from_value(name, value).filter(|source| !source.is_empty()) else {
            self.report.warn(name, interpolation, WarningKind::EmptyValue);
            return Validated::Skipped;
        };
        let found = source.len();
        if found < expected {
            self.report.warn(name, interpolation, WarningKind::TooFewElements { found, expected });
            let vertex_class = matches!(interpolation, Interpolation::Vertex | Interpolation::Varying);
            if vertex_class && name == tokens::POINTS {
                return Validated::TooFewPoints { found, expected };
            }
            return Validated::Skipped;
        }
        if found > expected {
            self.report.warn(name, interpolation, WarningKind::Truncated { found, expected });
            source.truncate(expected);
        }
        Validated::Source(source)
    }

    fn bind(&mut self, slot: usize, range: RangeHandle) {
        self.shared.update_range(slot, Some(range), self.ctx.change_tracker);
    }

    // Constant

    /// Transform, prim id and constant primvars
    pub fn sync_constant(&mut self, coord: &DrawingCoord, dirty: DirtyBits) {
        let should_populate = dirty.intersects(DirtyBits::DIRTY_TRANSFORM | DirtyBits::DIRTY_EXTENT | DirtyBits::DIRTY_PRIM_ID)
            || dirty.is_any_primvar_dirty();
        if !should_populate {
            return;
        }
        let delegate = self.ctx.delegate;
        let id = self.ctx.id;
        let descriptors = delegate.primvar_descriptors(id, Interpolation::Constant);
        let mut sources: Vec<BufferSourceHandle> = Vec::new();

        if dirty.contains(DirtyBits::DIRTY_TRANSFORM) {
            let transform = Value::Matrix4d(delegate.transform(id));
            if let Some(source) = VtBufferSource::from_value(tokens::TRANSFORM, &transform) {
                sources.push(Arc::new(source));
            }
        }
        if dirty.contains(DirtyBits::DIRTY_PRIM_ID) {
            if let Some(source) = VtBufferSource::from_value(tokens::PRIM_ID, &Value::Int(self.ctx.prim_index)) {
                sources.push(Arc::new(source));
            }
        }
        for descriptor in &descriptors {
            if !dirty.is_primvar_dirty(&descriptor.name) {
                continue;
            }
            let value = delegate.primvar(id, &descriptor.name);
            if let Validated::Source(source) = self.pull(&descriptor.name, &value, Interpolation::Constant, 1) {
                sources.push(Arc::new(source));
            }
        }
        if descriptors.iter().any(|descriptor| descriptor.name == tokens::NORMALS) {
            self.state.scene_normals = Some(Interpolation::Constant);
        }

        let slot = coord.constant_primvar;
        let current = self.shared.range(slot).cloned();
        if can_skip_allocation_or_update(&sources, &[], current.as_ref(), dirty) {
            return;
        }
        let removed = if dirty.contains(DirtyBits::DIRTY_PRIMVAR) {
            removed_primvar_specs(current.as_ref(), &descriptors, &CONSTANT_GENERATED)
        } else {
            Vec::new()
        };
        self.update_private(RangeRole::ConstantPrimvar, slot, current.as_ref(), PendingWork { sources, computations: Vec::new() }, &removed);
    }

    // Instance

    /// Per-instance primvars of the bound instancer
    pub fn sync_instance(&mut self, coord: &DrawingCoord, dirty: DirtyBits, instancer_id: &str) {
        let relevant = dirty.intersects(DirtyBits::DIRTY_INSTANCER | DirtyBits::DIRTY_INSTANCE_INDEX)
            || dirty.is_any_primvar_dirty();
        if !relevant {
            return;
        }
        let delegate = self.ctx.delegate;
        let Some(count) = delegate.instance_count(instancer_id) else {
            self.report.warn(instancer_id, Interpolation::Instance, WarningKind::MissingInstancer);
            return;
        };

        let descriptors = delegate.instance_primvar_descriptors(instancer_id);
        let mut sources: Vec<BufferSourceHandle> = Vec::new();
        for descriptor in &descriptors {
            if !dirty.intersects(DirtyBits::DIRTY_INSTANCER) && !dirty.is_primvar_dirty(&descriptor.name) {
                continue;
            }
            let value = delegate.instance_primvar(instancer_id, &descriptor.name);
            if let Validated::Source(source) = self.pull(&descriptor.name, &value, Interpolation::Instance, count) {
                sources.push(Arc::new(source));
            }
        }

        let slot = coord.instance_primvar;
        let current = self.shared.range(slot).cloned();
        if can_skip_allocation_or_update(&sources, &[], current.as_ref(), dirty) {
            return;
        }
        let removed = removed_primvar_specs(current.as_ref(), &descriptors, &[]);
        self.update_private(RangeRole::InstancePrimvar, slot, current.as_ref(), PendingWork { sources, computations: Vec::new() }, &removed);
    }

    // Vertex and varying

    /// Vertex and varying primvars plus smooth normals
    ///
    /// Returns the (transformed) points source when points were pulled, for
    /// flat normals. Fails when points cannot cover the topology; the vertex
    /// range is then unbound.
    pub fn sync_vertex(
        &mut self,
        coord: &DrawingCoord,
        dirty: &mut DirtyBits,
        require_smooth_normals: bool,
    ) -> Result<Option<BufferSourceHandle>, SyncError> {
        let Some(topology) = self.ctx.topology else {
            return Ok(None);
        };
        let delegate = self.ctx.delegate;
        let id = self.ctx.id;

        let mut descriptors = delegate.primvar_descriptors(id, Interpolation::Vertex);
        let num_vertex = descriptors.len();
        descriptors.extend(delegate.primvar_descriptors(id, Interpolation::Varying));

        let num_points = topology.num_points();
        let refine = topology.refine_level() > 0;
        let quadrangulate = self.ctx.use_quad_indices;
        let gpu = self.gpu();

        let mut sources: Vec<BufferSourceHandle> = Vec::new();
        let mut computations: Vec<ComputationHandle> = Vec::new();
        let mut points: Option<BufferSourceHandle> = None;

        for (index, descriptor) in descriptors.iter().enumerate() {
            let varying = index >= num_vertex;
            let interpolation = if varying { Interpolation::Varying } else { Interpolation::Vertex };
            let name = descriptor.name.as_str();
            if !dirty.is_primvar_dirty(name) {
                continue;
            }

            let value = delegate.primvar(id, name);
            let raw = match self.pull(name, &value, interpolation, num_points) {
                Validated::Source(source) => source,
                Validated::Skipped => continue,
                Validated::TooFewPoints { found, expected } => {
                    self.shared.update_range(coord.vertex_primvar, None, self.ctx.change_tracker);
                    return Err(SyncError::InsufficientPoints { prim: id.to_string(), found, expected });
                }
            };

            if name == tokens::NORMALS {
                self.state.scene_normals = Some(interpolation);
            }

            let tuple_type = raw.tuple_type();
            let raw: BufferSourceHandle = Arc::new(raw);
            let source = if refine {
                if gpu {
                    if let Some(tuple_type) = tuple_type {
                        computations.push(topology.osd_refine_computation_gpu(name, tuple_type, varying));
                    }
                    raw
                } else {
                    topology.osd_refine_computation(raw, varying)
                }
            } else if quadrangulate {
                if gpu {
                    if let Some(computation) = tuple_type.and_then(|tuple| topology.quadrangulate_computation_gpu(name, tuple)) {
                        computations.push(computation);
                    }
                    raw
                } else {
                    topology.quadrangulate_computation(Arc::clone(&raw)).unwrap_or(raw)
                }
            } else {
                raw
            };

            if name == tokens::POINTS {
                points = Some(Arc::clone(&source));
            }
            sources.push(source);
        }

        if require_smooth_normals && dirty.contains(DirtyBits::DIRTY_SMOOTH_NORMALS) {
            dirty.remove(DirtyBits::DIRTY_SMOOTH_NORMALS);
            self.smooth_normals(coord, topology, points.as_ref(), &mut sources, &mut computations);
        }

        let slot = coord.vertex_primvar;
        let current = self.shared.range(slot).cloned();
        if can_skip_allocation_or_update(&sources, &computations, current.as_ref(), *dirty) {
            return Ok(points);
        }

        let removed = if dirty.contains(DirtyBits::DIRTY_PRIMVAR) {
            removed_primvar_specs(current.as_ref(), &descriptors, &VERTEX_GENERATED)
        } else {
            Vec::new()
        };
        let work = PendingWork { sources, computations };
        let added = work.buffer_specs();
        let request = RangeRequest {
            role: RangeRole::VertexPrimvar,
            current: current.as_ref(),
            added: &added,
            removed: &removed,
            varying_topology: self.ctx.varying_topology,
            new_repr: dirty.contains(DirtyBits::NEW_REPR),
            sharing_enabled: self.registry().config().shared_vertex_primvar,
        };
        let outcome = BufferRangeLifecycle::new(self.registry()).resolve(
            &request,
            self.ctx.topology_id,
            self.state.vertex_primvar_id,
            &work,
        );
        log::trace!("{}: vertex range {} ({:?})", id, outcome.range.id(), outcome.action);

        self.state.vertex_primvar_id = outcome.primvar_id;
        self.bind(slot, Arc::clone(&outcome.range));
        if outcome.upload {
            work.schedule(self.registry(), &outcome.range);
        }
        Ok(points)
    }

    fn points_value_type(&self, coord: &DrawingCoord, points: Option<&BufferSourceHandle>) -> Option<ValueType> {
        if let Some(points) = points {
            return points.tuple_type().map(|tuple| tuple.value_type);
        }
        self.shared
            .range(coord.vertex_primvar)
            .filter(|range| range.is_valid())
            .and_then(|range| range.buffer_specs().into_iter().find(|spec| spec.name == tokens::POINTS))
            .map(|spec| spec.tuple_type.value_type)
    }

    fn smooth_normals(
        &self,
        coord: &DrawingCoord,
        topology: &RefinedTopology,
        points: Option<&BufferSourceHandle>,
        sources: &mut Vec<BufferSourceHandle>,
        computations: &mut Vec<ComputationHandle>,
    ) {
        let Some(adjacency) = self.ctx.adjacency else {
            verify(false, "vertex adjacency exists for smooth normals");
            return;
        };
        let refine = topology.refine_level() > 0;
        let quadrangulate = self.ctx.use_quad_indices;
        // refined and quadrangulated data is interpolated at full precision
        let packed = self.registry().config().packed_normals && !(refine || quadrangulate);

        if !self.gpu() {
            // without fresh points there is nothing to derive normals from
            let Some(points) = points else {
                return;
            };
            let normals: BufferSourceHandle =
                Arc::new(SmoothNormalsComputation::new(Arc::clone(adjacency), Arc::clone(points), packed));
            let normals = if refine {
                topology.osd_refine_computation(normals, false)
            } else if quadrangulate {
                topology.quadrangulate_computation(Arc::clone(&normals)).unwrap_or(normals)
            } else {
                normals
            };
            sources.push(normals);
            return;
        }

        let Some(points_type) = self.points_value_type(coord, points) else {
            return;
        };
        computations.push(Arc::new(SmoothNormalsComputationGpu::new(Arc::clone(adjacency), points_type, packed)));
        let name = smooth_normals_name(packed);
        let tuple_type = TupleType::new(points_type, 3);
        if refine {
            computations.push(topology.osd_refine_computation_gpu(name, tuple_type, false));
        } else if quadrangulate {
            if let Some(computation) = topology.quadrangulate_computation_gpu(name, tuple_type) {
                computations.push(computation);
            }
        }
    }

    // Face-varying

    /// Face-varying primvars
    pub fn sync_face_varying(&mut self, coord: &DrawingCoord, dirty: DirtyBits, desc: &MeshReprDesc) {
        let Some(topology) = self.ctx.topology else {
            return;
        };
        let delegate = self.ctx.delegate;
        let id = self.ctx.id;
        let descriptors = delegate.primvar_descriptors(id, Interpolation::FaceVarying);
        if descriptors.is_empty() {
            return;
        }

        let expected = topology.num_face_varyings();
        let quadrangulate = self.ctx.use_quad_indices
            || (refine_level_for_desc(Some(topology), desc) > 0 && !topology.refines_to_triangles());
        let mut sources: Vec<BufferSourceHandle> = Vec::new();

        for descriptor in &descriptors {
            let name = descriptor.name.as_str();
            if !dirty.is_primvar_dirty(name) {
                continue;
            }
            let value = delegate.primvar(id, name);
            let Validated::Source(source) = self.pull(name, &value, Interpolation::FaceVarying, expected) else {
                continue;
            };
            if name == tokens::NORMALS {
                self.state.scene_normals = Some(Interpolation::FaceVarying);
            }
            // face-varying data is never refined, only split like the faces
            let source: BufferSourceHandle = Arc::new(source);
            sources.push(if quadrangulate {
                topology.quadrangulate_face_varying_computation(source)
            } else {
                topology.triangulate_face_varying_computation(source)
            });
        }

        let slot = coord.face_varying_primvar;
        let current = self.shared.range(slot).cloned();
        if can_skip_allocation_or_update(&sources, &[], current.as_ref(), dirty) {
            return;
        }
        let removed = if dirty.contains(DirtyBits::DIRTY_PRIMVAR) {
            removed_primvar_specs(current.as_ref(), &descriptors, &[])
        } else {
            Vec::new()
        };
        self.update_private(RangeRole::FaceVaryingPrimvar, slot, current.as_ref(), PendingWork { sources, computations: Vec::new() }, &removed);
    }

    // Element (uniform)

    /// Uniform primvars plus flat normals
    pub fn sync_element(
        &mut self,
        coord: &DrawingCoord,
        dirty: &mut DirtyBits,
        require_flat_normals: bool,
        points: Option<&BufferSourceHandle>,
    ) {
        let Some(topology) = self.ctx.topology else {
            return;
        };
        let delegate = self.ctx.delegate;
        let id = self.ctx.id;
        let descriptors = delegate.primvar_descriptors(id, Interpolation::Uniform);
        let expected = topology.num_faces();
        let mut sources: Vec<BufferSourceHandle> = Vec::new();
        let mut computations: Vec<ComputationHandle> = Vec::new();

        for descriptor in &descriptors {
            let name = descriptor.name.as_str();
            if !dirty.is_primvar_dirty(name) {
                continue;
            }
            let value = delegate.primvar(id, name);
            let Validated::Source(source) = self.pull(name, &value, Interpolation::Uniform, expected) else {
                continue;
            };
            if name == tokens::NORMALS {
                self.state.scene_normals = Some(Interpolation::Uniform);
            }
            sources.push(Arc::new(source));
        }

        if require_flat_normals && dirty.contains(DirtyBits::DIRTY_FLAT_NORMALS) {
            dirty.remove(DirtyBits::DIRTY_FLAT_NORMALS);
            let packed = self.registry().config().packed_normals;
            let base = Arc::clone(topology.base());
            if self.gpu() {
                let vertex_range = self.shared.range(coord.vertex_primvar).filter(|range| range.is_valid()).cloned();
                if let (Some(points_type), Some(vertex_range)) = (self.points_value_type(coord, points), vertex_range) {
                    computations.push(Arc::new(FlatNormalsComputationGpu::new(base, vertex_range, points_type, packed)));
                }
            } else if let Some(points) = points {
                sources.push(Arc::new(FlatNormalsComputation::new(base, Arc::clone(points), packed)));
            }
        }

        let slot = coord.element_primvar;
        let current = self.shared.range(slot).cloned();
        if can_skip_allocation_or_update(&sources, &computations, current.as_ref(), *dirty) {
            return;
        }
        let removed = if dirty.contains(DirtyBits::DIRTY_PRIMVAR) {
            removed_primvar_specs(current.as_ref(), &descriptors, &ELEMENT_GENERATED)
        } else {
            Vec::new()
        };
        self.update_private(RangeRole::ElementPrimvar, slot, current.as_ref(), PendingWork { sources, computations }, &removed);
    }

    fn update_private(
        &mut self,
        role: RangeRole,
        slot: usize,
        current: Option<&RangeHandle>,
        work: PendingWork,
        removed: &[BufferSpec],
    ) {
        let added = work.buffer_specs();
        let range = self.registry().update_range(role, current, &added, removed, UsageHint::empty());
        verify(is_valid_range(Some(&range)), "updated primvar range is valid");
        self.bind(slot, Arc::clone(&range));
        work.schedule(self.registry(), &range);
    }
}

