//! Buffer range lifecycle
//!
//! Decides, per sync, whether a prim keeps, shares, migrates or updates the
//! range its primvars live in. The decision itself ([`decide`]) is pure;
//! [`BufferRangeLifecycle::resolve`] carries it out against the registry.
//!
//! With sharing enabled a prim starts on an immutable range registered under
//! a content-addressed sharing id, so prims with identical topology and
//! primvar data land on one allocation. The first in-place edit migrates the
//! prim to a private mutable range.

use std::collections::HashSet;
use std::sync::Arc;

use crate::buffer::{
    collect_buffer_specs, collect_computation_specs, is_valid_range, BufferSourceHandle, BufferSpec,
    ComputationHandle, RangeHandle, RangeRole, UsageHint,
};
use crate::foundation::hash::ContentHasher;
use crate::registry::ResourceRegistry;
use crate::scene::primvar::PrimvarDescriptor;
use crate::sync::dirty::DirtyBits;

/// What to do with a prim's range
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RangeAction {
    /// No valid range yet: look up or allocate a shared immutable range
    Share,
    /// Leave the shared range for a private mutable copy
    MigrateToMutable,
    /// Move to another shared immutable range that also holds the new specs
    ShareExtended,
    /// Keep the current range untouched
    Reuse,
    /// Update the private mutable range in place
    UpdateMutable,
}

/// Inputs of a range decision
#[derive(Debug, Clone, Copy)]
pub struct RangeRequest<'a> {
    /// Role of the range
    pub role: RangeRole,
    /// Range currently bound to the prim
    pub current: Option<&'a RangeHandle>,
    /// Specs of every pending source and computation
    pub added: &'a [BufferSpec],
    /// Specs to drop
    pub removed: &'a [BufferSpec],
    /// The prim's topology changed after its first sync
    pub varying_topology: bool,
    /// A repr was added this sync
    pub new_repr: bool,
    /// Immutable range sharing is enabled
    pub sharing_enabled: bool,
}

/// Choose the action for `request`
pub fn decide(request: &RangeRequest<'_>) -> RangeAction {
    if !request.sharing_enabled {
        return RangeAction::UpdateMutable;
    }
    let Some(current) = request.current.filter(|range| range.is_valid()) else {
        return RangeAction::Share;
    };
    if !current.is_immutable() {
        return RangeAction::UpdateMutable;
    }

    let updating_existing =
        !request.added.is_empty() && BufferSpec::is_subset(request.added, &current.buffer_specs());
    let migrate = request.varying_topology
        || (updating_existing && !request.new_repr)
        || !request.removed.is_empty();

    if migrate {
        RangeAction::MigrateToMutable
    } else if !request.added.is_empty() {
        RangeAction::ShareExtended
    } else {
        RangeAction::Reuse
    }
}

/// Content-addressed id of a shared primvar range
///
/// Seeded with `base` (the topology id, or the prim's previous sharing id
/// when extending), then fed every source's content hash and every
/// computation's output specs.
pub fn compute_shared_primvar_id(
    base: u64,
    sources: &[BufferSourceHandle],
    computations: &[ComputationHandle],
) -> u64 {
    let mut hasher = ContentHasher::with_seed(base);
    for source in sources {
        hasher.write_u64(source.content_hash());
    }
    let mut specs = Vec::new();
    collect_computation_specs(computations, &mut specs);
    for spec in &specs {
        hasher.write_str(&spec.name);
        spec.tuple_type.hash_into(&mut hasher);
    }
    hasher.finish()
}

/// Whether there is nothing to allocate, upload or compute
///
/// True when no work is pending and either there is no range to keep up to
/// date or no primvar description changed.
pub fn can_skip_allocation_or_update(
    sources: &[BufferSourceHandle],
    computations: &[ComputationHandle],
    current: Option<&RangeHandle>,
    dirty: DirtyBits,
) -> bool {
    sources.is_empty()
        && computations.is_empty()
        && (!is_valid_range(current) || !dirty.contains(DirtyBits::DIRTY_PRIMVAR))
}

/// Specs on `current` no longer backed by a descriptor
///
/// Buffers named in `generated` are produced by the pipeline itself and are
/// never reported.
pub fn removed_primvar_specs(
    current: Option<&RangeHandle>,
    descriptors: &[PrimvarDescriptor],
    generated: &[&str],
) -> Vec<BufferSpec> {
    let Some(range) = current.filter(|range| range.is_valid()) else {
        return Vec::new();
    };
    let live: HashSet<&str> = descriptors
        .iter()
        .map(|descriptor| descriptor.name.as_str())
        .chain(generated.iter().copied())
        .collect();
    range
        .buffer_specs()
        .into_iter()
        .filter(|spec| !live.contains(spec.name.as_str()))
        .inspect(|spec| log::debug!("Removing primvar buffer '{}' from range {}", spec.name, range.id()))
        .collect()
}

/// Pending work of one interpolation class
#[derive(Debug, Default)]
pub struct PendingWork {
    /// CPU sources to upload
    pub sources: Vec<BufferSourceHandle>,
    /// GPU computations to run against the range
    pub computations: Vec<ComputationHandle>,
}

impl PendingWork {
    /// Whether nothing is pending
    pub fn is_empty(&self) -> bool {
        self.sources.is_empty() && self.computations.is_empty()
    }

    /// Specs of all pending work
    pub fn buffer_specs(&self) -> Vec<BufferSpec> {
        let mut specs = Vec::new();
        collect_buffer_specs(&self.sources, &mut specs);
        collect_computation_specs(&self.computations, &mut specs);
        specs
    }

    /// Queue everything against `range`
    pub fn schedule(self, registry: &ResourceRegistry, range: &RangeHandle) {
        registry.add_sources(range, self.sources);
        for computation in self.computations {
            registry.add_computation(range, computation);
        }
    }
}

/// Result of resolving a range
#[derive(Debug, Clone)]
pub struct RangeOutcome {
    /// Range to bind
    pub range: RangeHandle,
    /// Action taken
    pub action: RangeAction,
    /// Sharing id to remember, 0 for private ranges
    pub primvar_id: u64,
    /// Whether the caller must upload its pending work into `range`
    pub upload: bool,
}

/// Carries out range decisions against a resource registry
#[derive(Debug, Clone, Copy)]
pub struct BufferRangeLifecycle<'r> {
    registry: &'r ResourceRegistry,
}

impl<'r> BufferRangeLifecycle<'r> {
    /// Lifecycle bound to `registry`
    pub fn new(registry: &'r ResourceRegistry) -> Self {
        Self { registry }
    }

    /// Resolve the range for `request`
    ///
    /// `topology_id` and `primvar_id` seed the sharing id; `work` is hashed
    /// into it. When another prim already published the shared range,
    /// `upload` is false and the caller drops its pending work.
    pub fn resolve(
        &self,
        request: &RangeRequest<'_>,
        topology_id: u64,
        primvar_id: u64,
        work: &PendingWork,
    ) -> RangeOutcome {
        let action = decide(request);
        match action {
            RangeAction::Share | RangeAction::ShareExtended => {
                let base = if action == RangeAction::Share { topology_id } else { primvar_id };
                let id = compute_shared_primvar_id(base, &work.sources, &work.computations);
                let (range, first) = self.shared_range(id, request);
                if !first {
                    log::trace!("Found shared {:?} range {} for sharing", request.role, range.id());
                }
                RangeOutcome { range, action, primvar_id: id, upload: first }
            }
            RangeAction::MigrateToMutable => {
                let current = request.current.filter(|range| range.is_valid());
                let hint = current.map_or_else(UsageHint::empty, |range| range.usage_hint()) - UsageHint::IMMUTABLE;
                log::debug!("Transitioning {:?} range from immutable to mutable", request.role);
                let range = self.registry.update_range(request.role, current, request.added, request.removed, hint);
                RangeOutcome { range, action, primvar_id: 0, upload: true }
            }
            RangeAction::Reuse => {
                let range = request.current.map_or_else(
                    || self.registry.allocate_range(request.role, Vec::new(), UsageHint::empty()),
                    Arc::clone,
                );
                RangeOutcome { range, action, primvar_id, upload: true }
            }
            RangeAction::UpdateMutable => {
                let range = self.update_mutable(request, UsageHint::empty());
                RangeOutcome { range, action, primvar_id, upload: true }
            }
        }
    }

    /// Allocate or update a private range with `hint`
    pub fn update_mutable(&self, request: &RangeRequest<'_>, hint: UsageHint) -> RangeHandle {
        self.registry
            .update_range(request.role, request.current, request.added, request.removed, hint)
    }

    fn shared_range(&self, id: u64, request: &RangeRequest<'_>) -> (RangeHandle, bool) {
        let mut instance = self.registry.register_primvar_range(id);
        if instance.is_first_instance() {
            let range = self.registry.update_immutable_range(
                request.role,
                request.current,
                request.added,
                request.removed,
                UsageHint::empty(),
            );
            instance.set_value(Arc::clone(&range));
            return (range, true);
        }
        match instance.into_value() {
            Some(range) => (range, false),
            None => {
                log::error!("Shared primvar range {:#x} was not published", id);
                (self.update_mutable(request, UsageHint::empty()), true)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::buffer::{BufferData, TupleType, ValueType, VtBufferSource};

    fn float3(name: &str) -> BufferSpec {
        BufferSpec::new(name, TupleType::new(ValueType::Float, 3))
    }

    fn source(name: &str, value: f32) -> BufferSourceHandle {
        Arc::new(VtBufferSource::new(
            name,
            TupleType::new(ValueType::Float, 3),
            BufferData::Float(vec![value; 12]),
        ))
    }

    fn request<'a>(current: Option<&'a RangeHandle>, added: &'a [BufferSpec], removed: &'a [BufferSpec]) -> RangeRequest<'a> {
        RangeRequest {
            role: RangeRole::VertexPrimvar,
            current,
            added,
            removed,
            varying_topology: false,
            new_repr: false,
            sharing_enabled: true,
        }
    }

    #[test]
    fn test_decision_table() {
        let registry = ResourceRegistry::default();
        let immutable =
            registry.allocate_range(RangeRole::VertexPrimvar, vec![float3("points")], UsageHint::IMMUTABLE);
        let mutable = registry.allocate_range(RangeRole::VertexPrimvar, vec![float3("points")], UsageHint::empty());
        let points = [float3("points")];
        let normals = [float3("smoothNormals")];

        assert_eq!(decide(&request(None, &points, &[])), RangeAction::Share);
        assert_eq!(decide(&request(Some(&immutable), &points, &[])), RangeAction::MigrateToMutable);
        assert_eq!(decide(&request(Some(&immutable), &normals, &[])), RangeAction::ShareExtended);
        assert_eq!(decide(&request(Some(&immutable), &[], &[])), RangeAction::Reuse);
        assert_eq!(decide(&request(Some(&immutable), &[], &points)), RangeAction::MigrateToMutable);
        assert_eq!(decide(&request(Some(&mutable), &normals, &[])), RangeAction::UpdateMutable);

        let mut varying = request(Some(&immutable), &normals, &[]);
        varying.varying_topology = true;
        assert_eq!(decide(&varying), RangeAction::MigrateToMutable);

        let mut new_repr = request(Some(&immutable), &points, &[]);
        new_repr.new_repr = true;
        assert_eq!(decide(&new_repr), RangeAction::ShareExtended);

        let mut unshared = request(None, &points, &[]);
        unshared.sharing_enabled = false;
        assert_eq!(decide(&unshared), RangeAction::UpdateMutable);
    }

    #[test]
    fn test_shared_id_is_content_addressed() {
        let a = compute_shared_primvar_id(7, &[source("points", 1.0)], &[]);
        let b = compute_shared_primvar_id(7, &[source("points", 1.0)], &[]);
        let c = compute_shared_primvar_id(7, &[source("points", 2.0)], &[]);
        let d = compute_shared_primvar_id(8, &[source("points", 1.0)], &[]);
        assert_eq!(a, b);
        assert_ne!(a, c);
        assert_ne!(a, d);
    }

    #[test]
    fn test_identical_prims_share_one_range() {
        let registry = ResourceRegistry::default();
        let lifecycle = BufferRangeLifecycle::new(&registry);
        let specs = [float3("points")];

        let work_a = PendingWork { sources: vec![source("points", 1.0)], computations: Vec::new() };
        let a = lifecycle.resolve(&request(None, &specs, &[]), 42, 0, &work_a);
        assert!(a.upload);
        assert!(a.range.is_immutable());

        let work_b = PendingWork { sources: vec![source("points", 1.0)], computations: Vec::new() };
        let b = lifecycle.resolve(&request(None, &specs, &[]), 42, 0, &work_b);
        assert!(!b.upload);
        assert!(Arc::ptr_eq(&a.range, &b.range));
        assert_eq!(a.primvar_id, b.primvar_id);
    }

    #[test]
    fn test_migration_clears_sharing() {
        let registry = ResourceRegistry::default();
        let lifecycle = BufferRangeLifecycle::new(&registry);
        let specs = [float3("points")];
        let work = PendingWork { sources: vec![source("points", 1.0)], computations: Vec::new() };
        let shared = lifecycle.resolve(&request(None, &specs, &[]), 1, 0, &work);

        let migrated = lifecycle.resolve(&request(Some(&shared.range), &specs, &[]), 1, shared.primvar_id, &work);
        assert_eq!(migrated.action, RangeAction::MigrateToMutable);
        assert_eq!(migrated.primvar_id, 0);
        assert!(!migrated.range.is_immutable());
        assert!(!Arc::ptr_eq(&shared.range, &migrated.range));
    }

    #[test]
    fn test_can_skip() {
        let registry = ResourceRegistry::default();
        let range = registry.allocate_range(RangeRole::VertexPrimvar, Vec::new(), UsageHint::empty());
        assert!(can_skip_allocation_or_update(&[], &[], None, DirtyBits::DIRTY_PRIMVAR));
        assert!(can_skip_allocation_or_update(&[], &[], Some(&range), DirtyBits::DIRTY_POINTS));
        assert!(!can_skip_allocation_or_update(&[], &[], Some(&range), DirtyBits::DIRTY_PRIMVAR));
        assert!(!can_skip_allocation_or_update(&[source("points", 0.0)], &[], None, DirtyBits::empty()));
    }

    #[test]
    fn test_removed_specs_skip_generated() {
        let registry = ResourceRegistry::default();
        let range = registry.allocate_range(
            RangeRole::VertexPrimvar,
            vec![float3("points"), float3("color"), float3("smoothNormals")],
            UsageHint::empty(),
        );
        let descriptors = [PrimvarDescriptor::new("points", crate::scene::primvar::Interpolation::Vertex)];
        let removed = removed_primvar_specs(Some(&range), &descriptors, &["smoothNormals"]);
        assert_eq!(removed, vec![float3("color")]);
    }
}
