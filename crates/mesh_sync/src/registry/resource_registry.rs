//! Resource registry
//!
//! Central point where prims allocate buffer ranges, look up shared
//! topology/adjacency/index/primvar/shader instances by content hash, and
//! queue CPU sources and GPU computations for the next commit.
//!
//! Sync tasks only take `&self`, so many prims can sync concurrently; the
//! pending queues and registries are internally synchronized.

use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;

use super::instance::{Instance, InstanceRegistry};
use crate::buffer::{
    BufferArrayRange, BufferResource, BufferSourceHandle, BufferSpec, CommitError, ComputationHandle,
    MemoryBufferArrayRange, RangeHandle, RangeRole, UsageHint,
};
use crate::core::config::SyncConfig;
use crate::geometry::adjacency::VertexAdjacency;
use crate::sync::shader_selector::GeometricShader;
use crate::topology::RefinedTopology;

/// Which index buffer a topology range holds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum IndexKind {
    /// Coarse faces (hull reprs)
    Hull,
    /// One index per point (points reprs)
    Points,
    /// Triangles, quads or refined faces (everything else)
    Full,
}

/// Snapshot of registry counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RegistryStats {
    /// Ranges allocated (including migrations)
    pub allocations: usize,
    /// Calls to update an existing range
    pub updates: usize,
    /// Ranges reallocated with carried-forward data
    pub migrations: usize,
    /// Sources queued
    pub sources: usize,
    /// Computations queued
    pub computations: usize,
    /// Commits run
    pub commits: usize,
}

#[derive(Debug, Default)]
struct Counters {
    allocations: AtomicUsize,
    updates: AtomicUsize,
    migrations: AtomicUsize,
    sources: AtomicUsize,
    computations: AtomicUsize,
    commits: AtomicUsize,
}

impl Counters {
    fn bump(counter: &AtomicUsize, amount: usize) {
        counter.fetch_add(amount, Ordering::Relaxed);
    }

    fn snapshot(&self) -> RegistryStats {
        RegistryStats {
            allocations: self.allocations.load(Ordering::Relaxed),
            updates: self.updates.load(Ordering::Relaxed),
            migrations: self.migrations.load(Ordering::Relaxed),
            sources: self.sources.load(Ordering::Relaxed),
            computations: self.computations.load(Ordering::Relaxed),
            commits: self.commits.load(Ordering::Relaxed),
        }
    }
}

#[derive(Debug)]
struct PendingSources {
    range: Option<RangeHandle>,
    sources: Vec<BufferSourceHandle>,
}

#[derive(Debug)]
struct PendingComputation {
    range: RangeHandle,
    computation: ComputationHandle,
}

/// Outcome of a successful commit
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CommitSummary {
    /// Sources resolved
    pub sources_resolved: usize,
    /// Buffers uploaded into ranges
    pub buffers_uploaded: usize,
    /// Computations executed
    pub computations_executed: usize,
    /// Dead registry entries collected
    pub entries_collected: usize,
}

/// Central resource registry
#[derive(Debug)]
pub struct ResourceRegistry {
    config: SyncConfig,
    next_range_id: AtomicU64,
    topologies: InstanceRegistry<u64, RefinedTopology>,
    adjacencies: InstanceRegistry<u64, VertexAdjacency>,
    index_ranges: InstanceRegistry<(u64, IndexKind), dyn BufferArrayRange>,
    primvar_ranges: InstanceRegistry<u64, dyn BufferArrayRange>,
    geometric_shaders: InstanceRegistry<u64, GeometricShader>,
    pending_sources: Mutex<Vec<PendingSources>>,
    pending_computations: Mutex<Vec<PendingComputation>>,
    counters: Counters,
}

impl ResourceRegistry {
    /// Create a registry with the given sync configuration
    pub fn new(config: SyncConfig) -> Self {
        Self {
            config,
            next_range_id: AtomicU64::new(1),
            topologies: InstanceRegistry::new("topology"),
            adjacencies: InstanceRegistry::new("adjacency"),
            index_ranges: InstanceRegistry::new("index range"),
            primvar_ranges: InstanceRegistry::new("primvar range"),
            geometric_shaders: InstanceRegistry::new("geometric shader"),
            pending_sources: Mutex::new(Vec::new()),
            pending_computations: Mutex::new(Vec::new()),
            counters: Counters::default(),
        }
    }

    /// Sync configuration
    pub fn config(&self) -> &SyncConfig {
        &self.config
    }

    /// Counter snapshot
    pub fn stats(&self) -> RegistryStats {
        self.counters.snapshot()
    }

    // Content-addressed lookups

    /// Register a mesh topology by salted content hash
    pub fn register_mesh_topology(&self, id: u64) -> Instance<'_, u64, RefinedTopology> {
        self.topologies.register(id)
    }

    /// Register a vertex adjacency table by topology hash
    pub fn register_vertex_adjacency(&self, id: u64) -> Instance<'_, u64, VertexAdjacency> {
        self.adjacencies.register(id)
    }

    /// Register an index range by topology hash and kind
    pub fn register_mesh_index_range(
        &self,
        topology_id: u64,
        kind: IndexKind,
    ) -> Instance<'_, (u64, IndexKind), dyn BufferArrayRange> {
        self.index_ranges.register((topology_id, kind))
    }

    /// Register a shared primvar range by sharing id
    pub fn register_primvar_range(&self, id: u64) -> Instance<'_, u64, dyn BufferArrayRange> {
        self.primvar_ranges.register(id)
    }

    /// Register a geometric shader by key hash
    pub fn register_geometric_shader(&self, key_hash: u64) -> Instance<'_, u64, GeometricShader> {
        self.geometric_shaders.register(key_hash)
    }

    // Range allocation

    /// Allocate a new range
    pub fn allocate_range(&self, role: RangeRole, specs: Vec<BufferSpec>, usage_hint: UsageHint) -> RangeHandle {
        let id = self.next_range_id.fetch_add(1, Ordering::Relaxed);
        Counters::bump(&self.counters.allocations, 1);
        log::trace!("Allocating {:?} range {} with {} specs ({:?})", role, id, specs.len(), usage_hint);
        Arc::new(MemoryBufferArrayRange::new(id, role, specs, usage_hint))
    }

    /// Update `current` with added and removed specs
    ///
    /// A valid mutable range with the same usage hint is changed in place and
    /// returned as is. Anything else (immutable range, different hint, backend
    /// refusal) migrates to a new range carrying the surviving data forward.
    /// Without a valid current range this is a plain allocation.
    pub fn update_range(
        &self,
        role: RangeRole,
        current: Option<&RangeHandle>,
        added: &[BufferSpec],
        removed: &[BufferSpec],
        usage_hint: UsageHint,
    ) -> RangeHandle {
        let Some(range) = current.filter(|range| range.is_valid()) else {
            return self.allocate_range(role, added.to_vec(), usage_hint);
        };
        Counters::bump(&self.counters.updates, 1);

        if !range.is_immutable() && range.usage_hint() == usage_hint {
            match range.update_specs(added, removed) {
                Ok(()) => return Arc::clone(range),
                Err(err) => log::debug!("In-place update of range {} refused: {}", range.id(), err),
            }
        }
        self.migrate_range(role, range, added, removed, usage_hint)
    }

    /// Allocate a new immutable range from `current` plus added specs
    ///
    /// Immutable ranges are never touched in place, so this always migrates.
    pub fn update_immutable_range(
        &self,
        role: RangeRole,
        current: Option<&RangeHandle>,
        added: &[BufferSpec],
        removed: &[BufferSpec],
        usage_hint: UsageHint,
    ) -> RangeHandle {
        let usage_hint = usage_hint | UsageHint::IMMUTABLE;
        match current.filter(|range| range.is_valid()) {
            Some(range) => {
                Counters::bump(&self.counters.updates, 1);
                self.migrate_range(role, range, added, removed, usage_hint)
            }
            None => self.allocate_range(role, added.to_vec(), usage_hint),
        }
    }

    fn migrate_range(
        &self,
        role: RangeRole,
        current: &RangeHandle,
        added: &[BufferSpec],
        removed: &[BufferSpec],
        usage_hint: UsageHint,
    ) -> RangeHandle {
        let kept = BufferSpec::difference(&current.buffer_specs(), removed);
        let specs = BufferSpec::union(&kept, added);
        let id = self.next_range_id.fetch_add(1, Ordering::Relaxed);
        let migrated = MemoryBufferArrayRange::new(id, role, specs, usage_hint);
        let copied = migrated.copy_data_from(current.as_ref());
        Counters::bump(&self.counters.allocations, 1);
        Counters::bump(&self.counters.migrations, 1);
        log::debug!(
            "Migrated {:?} range {} -> {} ({:?}, {} buffers carried forward)",
            role,
            current.id(),
            id,
            usage_hint,
            copied
        );
        Arc::new(migrated)
    }

    // Pending work

    /// Queue a source for resolution only (no upload)
    pub fn add_source(&self, source: BufferSourceHandle) {
        Counters::bump(&self.counters.sources, 1);
        self.pending_sources.lock().push(PendingSources { range: None, sources: vec![source] });
    }

    /// Queue sources to be resolved and uploaded into `range`
    pub fn add_sources(&self, range: &RangeHandle, sources: Vec<BufferSourceHandle>) {
        if sources.is_empty() {
            return;
        }
        Counters::bump(&self.counters.sources, sources.len());
        self.pending_sources.lock().push(PendingSources { range: Some(Arc::clone(range)), sources });
    }

    /// Queue a computation against `range`
    pub fn add_computation(&self, range: &RangeHandle, computation: ComputationHandle) {
        Counters::bump(&self.counters.computations, 1);
        self.pending_computations
            .lock()
            .push(PendingComputation { range: Arc::clone(range), computation });
    }

    /// Names of the queued sources, in queue order
    pub fn pending_source_names(&self) -> Vec<String> {
        self.pending_sources
            .lock()
            .iter()
            .flat_map(|pending| pending.sources.iter().map(|source| source.name().to_string()))
            .collect()
    }

    /// Names of the queued computations, in queue order
    pub fn pending_computation_names(&self) -> Vec<String> {
        self.pending_computations
            .lock()
            .iter()
            .map(|pending| pending.computation.name().to_string())
            .collect()
    }

    /// Resolve and upload every queued source, then run queued computations
    ///
    /// Work against ranges that were invalidated in the meantime is skipped.
    /// A failing item does not stop the rest of the commit; the first error
    /// is returned once everything else has run.
    pub fn commit(&self) -> Result<CommitSummary, CommitError> {
        let sources = std::mem::take(&mut *self.pending_sources.lock());
        let computations = std::mem::take(&mut *self.pending_computations.lock());
        let mut summary = CommitSummary::default();
        let mut first_error = None;

        for pending in &sources {
            if let Err(err) = Self::upload(pending, &mut summary) {
                log::error!("Commit: {}", err);
                first_error.get_or_insert(err);
            }
        }

        for pending in &computations {
            if !pending.range.is_valid() {
                log::debug!("Skipping {} against invalid range {}", pending.computation.name(), pending.range.id());
                continue;
            }
            match pending.computation.execute(pending.range.as_ref()) {
                Ok(()) => summary.computations_executed += 1,
                Err(err) => {
                    log::error!("Commit: computation {} failed: {}", pending.computation.name(), err);
                    first_error.get_or_insert(err);
                }
            }
        }

        Counters::bump(&self.counters.commits, 1);
        summary.entries_collected = self.garbage_collect();
        log::debug!(
            "Commit: {} sources, {} uploads, {} computations, {} entries collected",
            summary.sources_resolved,
            summary.buffers_uploaded,
            summary.computations_executed,
            summary.entries_collected
        );

        match first_error {
            Some(err) => Err(err),
            None => Ok(summary),
        }
    }

    fn upload(pending: &PendingSources, summary: &mut CommitSummary) -> Result<(), CommitError> {
        for source in &pending.sources {
            source.resolve()?;
            summary.sources_resolved += 1;
        }
        let Some(range) = &pending.range else {
            return Ok(());
        };
        if !range.is_valid() {
            log::debug!("Skipping upload into invalid range {}", range.id());
            return Ok(());
        }
        for source in &pending.sources {
            for output in source.outputs() {
                range.write(BufferResource::new(output.spec.clone(), output.data.clone()))?;
                summary.buffers_uploaded += 1;
            }
        }
        Ok(())
    }

    /// Drop registry entries whose values are no longer referenced
    pub fn garbage_collect(&self) -> usize {
        self.topologies.garbage_collect()
            + self.adjacencies.garbage_collect()
            + self.index_ranges.garbage_collect()
            + self.primvar_ranges.garbage_collect()
            + self.geometric_shaders.garbage_collect()
    }
}

impl Default for ResourceRegistry {
    fn default() -> Self {
        Self::new(SyncConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::buffer::{BufferData, TupleType, ValueType, VtBufferSource};

    fn float3(name: &str) -> BufferSpec {
        BufferSpec::new(name, TupleType::new(ValueType::Float, 3))
    }

    fn points_source(count: usize) -> BufferSourceHandle {
        Arc::new(VtBufferSource::new(
            "points",
            TupleType::new(ValueType::Float, 3),
            BufferData::Float(vec![1.0; count * 3]),
        ))
    }

    #[test]
    fn test_update_mutable_in_place() {
        let registry = ResourceRegistry::default();
        let range = registry.allocate_range(RangeRole::VertexPrimvar, vec![float3("points")], UsageHint::empty());
        let updated = registry.update_range(
            RangeRole::VertexPrimvar,
            Some(&range),
            &[float3("color")],
            &[],
            UsageHint::empty(),
        );
        assert!(Arc::ptr_eq(&range, &updated));
        assert_eq!(updated.buffer_specs().len(), 2);
        let stats = registry.stats();
        assert_eq!((stats.allocations, stats.updates, stats.migrations), (1, 1, 0));
    }

    #[test]
    fn test_update_immutable_migrates_with_data() {
        let registry = ResourceRegistry::default();
        let range = registry.allocate_range(RangeRole::VertexPrimvar, vec![float3("points")], UsageHint::IMMUTABLE);
        registry.add_sources(&range, vec![points_source(4)]);
        registry.commit().unwrap();

        let migrated = registry.update_range(
            RangeRole::VertexPrimvar,
            Some(&range),
            &[float3("color")],
            &[],
            UsageHint::empty(),
        );
        assert!(!Arc::ptr_eq(&range, &migrated));
        assert!(!migrated.is_immutable());
        assert_eq!(migrated.resource("points").map(|r| r.num_elements()), Some(4));
        assert_eq!(range.buffer_specs(), vec![float3("points")]);
        assert_eq!(registry.stats().migrations, 1);
    }

    #[test]
    fn test_commit_uploads_and_clears_queue() {
        let registry = ResourceRegistry::default();
        let range = registry.allocate_range(RangeRole::VertexPrimvar, vec![float3("points")], UsageHint::empty());
        registry.add_sources(&range, vec![points_source(8)]);
        assert_eq!(registry.pending_source_names(), vec!["points".to_string()]);

        let summary = registry.commit().unwrap();
        assert_eq!(summary.buffers_uploaded, 1);
        assert!(registry.pending_source_names().is_empty());
        assert_eq!(range.num_elements(), 8);
        assert_eq!(registry.stats().commits, 1);
    }

    #[test]
    fn test_commit_skips_invalid_ranges() {
        let registry = ResourceRegistry::default();
        let range = registry.allocate_range(RangeRole::VertexPrimvar, vec![float3("points")], UsageHint::empty());
        registry.add_sources(&range, vec![points_source(8)]);
        range.invalidate();
        let summary = registry.commit().unwrap();
        assert_eq!(summary.buffers_uploaded, 0);
    }

    #[test]
    fn test_commit_reports_upload_errors() {
        let registry = ResourceRegistry::default();
        let range = registry.allocate_range(RangeRole::VertexPrimvar, vec![float3("color")], UsageHint::empty());
        registry.add_sources(&range, vec![points_source(2)]);
        assert!(matches!(registry.commit(), Err(CommitError::Range(_))));
    }

    #[test]
    fn test_shared_primvar_range_released_with_last_reference() {
        let registry = ResourceRegistry::default();
        {
            let mut instance = registry.register_primvar_range(99);
            assert!(instance.is_first_instance());
            instance.set_value(registry.allocate_range(
                RangeRole::VertexPrimvar,
                vec![float3("points")],
                UsageHint::IMMUTABLE,
            ));
        }
        assert_eq!(registry.garbage_collect(), 1);
        assert!(registry.register_primvar_range(99).is_first_instance());
    }
}
