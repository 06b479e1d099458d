//! Render index
//!
//! Owns the mesh prims, the materials and the change tracker, and drives a
//! sync pass: dirty prims are synced (in parallel when configured) against
//! one shared [`ResourceRegistry`], then [`RenderIndex::commit`] resolves and
//! uploads everything they scheduled.

use std::collections::HashMap;
use std::sync::Arc;

use rayon::prelude::*;
use slotmap::{SecondaryMap, SlotMap};

use super::change_tracker::{ChangeTracker, PrimKey};
use super::delegate::SceneDelegate;
use super::material::{MaterialCapabilities, MaterialMap};
use crate::core::SyncConfig;
use crate::registry::{CommitSummary, ResourceRegistry};
use crate::sync::dirty::DirtyBits;
use crate::sync::mesh::{Mesh, SyncContext};
use crate::sync::report::{SyncError, SyncReport};

/// Mesh prims, materials and their shared resources
#[derive(Debug)]
pub struct RenderIndex {
    registry: ResourceRegistry,
    change_tracker: ChangeTracker,
    meshes: SlotMap<PrimKey, Mesh>,
    paths: HashMap<String, PrimKey>,
    materials: MaterialMap,
    next_prim_index: i32,
}

impl RenderIndex {
    /// Empty index with its own registry
    pub fn new(config: SyncConfig) -> Self {
        Self {
            registry: ResourceRegistry::new(config),
            change_tracker: ChangeTracker::new(),
            meshes: SlotMap::with_key(),
            paths: HashMap::new(),
            materials: MaterialMap::new(),
            next_prim_index: 0,
        }
    }

    /// Shared resource registry
    pub fn registry(&self) -> &ResourceRegistry {
        &self.registry
    }

    /// Dirty state of all prims
    pub fn change_tracker(&self) -> &ChangeTracker {
        &self.change_tracker
    }

    /// Number of mesh prims
    pub fn mesh_count(&self) -> usize {
        self.meshes.len()
    }

    /// Add a mesh prim at `path`, fully dirty
    ///
    /// Inserting an existing path returns its key unchanged.
    pub fn insert_mesh(&mut self, path: &str) -> PrimKey {
        if let Some(&key) = self.paths.get(path) {
            log::warn!("Mesh '{}' already in the render index", path);
            return key;
        }
        let mesh = Mesh::new(path, self.next_prim_index);
        self.next_prim_index += 1;

        let key = self.meshes.insert(mesh);
        self.paths.insert(path.to_string(), key);
        self.change_tracker.add_rprim(key, Mesh::initial_dirty_bits_mask());
        log::debug!("Inserted mesh '{}'", path);
        key
    }

    /// Remove the mesh prim at `path`
    ///
    /// Its shared resources stay registered until the next
    /// [`RenderIndex::garbage_collect`] finds them unreferenced.
    pub fn remove_mesh(&mut self, path: &str) -> bool {
        let Some(key) = self.paths.remove(path) else {
            return false;
        };
        self.change_tracker.remove_rprim(key);
        self.meshes.remove(key);
        self.change_tracker.mark_batches_dirty();
        true
    }

    /// Key of the prim at `path`
    pub fn prim_key(&self, path: &str) -> Option<PrimKey> {
        self.paths.get(path).copied()
    }

    /// Prim by key
    pub fn mesh(&self, key: PrimKey) -> Option<&Mesh> {
        self.meshes.get(key)
    }

    /// Prim by path
    pub fn mesh_by_path(&self, path: &str) -> Option<&Mesh> {
        self.prim_key(path).and_then(|key| self.meshes.get(key))
    }

    /// Record a scene edit on the prim at `path`
    pub fn mark_rprim_dirty(&mut self, path: &str, bits: DirtyBits) {
        match self.paths.get(path) {
            Some(&key) => self.change_tracker.mark_rprim_dirty(key, bits),
            None => log::warn!("mark_rprim_dirty: unknown mesh '{}'", path),
        }
    }

    /// Add or replace the material at `path`
    pub fn insert_material(&mut self, path: &str, material: Arc<dyn MaterialCapabilities>) {
        self.materials.insert(path.to_string(), material);
        self.mark_material_dirty(path);
    }

    /// Remove the material at `path`
    pub fn remove_material(&mut self, path: &str) -> bool {
        let removed = self.materials.remove(path).is_some();
        if removed {
            self.mark_material_dirty(path);
        }
        removed
    }

    /// Re-evaluate every prim bound to the material at `path`
    pub fn mark_material_dirty(&mut self, path: &str) {
        let bound: Vec<PrimKey> = self
            .meshes
            .iter()
            .filter(|(_, mesh)| mesh.material_id() == Some(path))
            .map(|(key, _)| key)
            .collect();
        for key in bound {
            self.change_tracker.mark_rprim_dirty(key, DirtyBits::DIRTY_MATERIAL_ID);
        }
    }

    /// Sync every dirty prim for repr `repr`
    ///
    /// Prims that have not initialized `repr` yet are synced too. Returns one
    /// report per synced prim.
    pub fn sync_all(&mut self, delegate: &dyn SceneDelegate, repr: &str) -> Vec<SyncReport> {
        let mut taken: SecondaryMap<PrimKey, DirtyBits> = SecondaryMap::new();
        for key in self.change_tracker.dirty_rprims() {
            taken.insert(key, self.change_tracker.take_rprim_dirty_bits(key));
        }
        for (key, mesh) in &self.meshes {
            if mesh.repr(repr).is_none() && !taken.contains_key(key) {
                let bits = self.change_tracker.take_rprim_dirty_bits(key) | DirtyBits::INIT_REPR | DirtyBits::DIRTY_REPR;
                taken.insert(key, bits);
            }
        }
        if taken.is_empty() {
            return Vec::new();
        }

        let config = self.registry.config();
        let gpu_compute = config.gpu_compute;
        let parallel = config.parallel_sync;
        let ctx = SyncContext {
            registry: &self.registry,
            delegate,
            materials: &self.materials,
            change_tracker: &self.change_tracker,
        };

        let jobs: Vec<(PrimKey, &mut Mesh, DirtyBits)> = self
            .meshes
            .iter_mut()
            .filter_map(|(key, mesh)| taken.get(key).map(|&bits| (key, mesh, bits)))
            .collect();

        let sync_one = |(key, mesh, bits): (PrimKey, &mut Mesh, DirtyBits)| {
            let mut dirty = mesh.propagate_dirty_bits(bits, gpu_compute);
            if !mesh.init_repr(repr, &mut dirty) {
                let report = SyncReport::new(mesh.id());
                return (key, report, DirtyBits::empty());
            }
            let (report, remaining) = mesh.sync(&ctx, repr, dirty);
            (key, report, remaining)
        };

        log::debug!("Syncing {} prims{}", jobs.len(), if parallel { " in parallel" } else { "" });
        let results: Vec<(PrimKey, SyncReport, DirtyBits)> = if parallel {
            jobs.into_par_iter().map(&sync_one).collect()
        } else {
            jobs.into_iter().map(&sync_one).collect()
        };

        results
            .into_iter()
            .map(|(key, report, remaining)| {
                self.change_tracker.mark_rprim_clean(key, remaining);
                report
            })
            .collect()
    }

    /// Resolve and upload everything the last sync scheduled
    pub fn commit(&self) -> Result<CommitSummary, SyncError> {
        let summary = self.registry.commit()?;
        log::debug!(
            "Commit: {} sources, {} computations",
            summary.sources_resolved,
            summary.computations_executed
        );
        Ok(summary)
    }

    /// Drop shared resources no prim references any more
    pub fn garbage_collect(&self) -> usize {
        self.registry.garbage_collect()
    }

    /// Forget which prims changed more than once
    pub fn reset_varying_state(&mut self) {
        self.change_tracker.reset_varying_state();
    }
}

impl Default for RenderIndex {
    fn default() -> Self {
        Self::new(SyncConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::buffer::Value;
    use crate::scene::material::Material;
    use crate::scene::memory_delegate::{MeshData, MemoryDelegate};
    use crate::scene::primvar::Interpolation;
    use crate::topology::{MeshTopology, SubdivScheme};
    use nalgebra::Vector3;

    fn quad_scene() -> MemoryDelegate {
        let points = vec![
            Vector3::new(0.0, 0.0, 0.0),
            Vector3::new(1.0, 0.0, 0.0),
            Vector3::new(1.0, 1.0, 0.0),
            Vector3::new(0.0, 1.0, 0.0),
        ];
        let mut delegate = MemoryDelegate::new();
        delegate.insert_mesh(
            "/quad",
            MeshData::new(MeshTopology::new(SubdivScheme::None, vec![4], vec![0, 1, 2, 3]))
                .with_primvar("points", Interpolation::Vertex, Value::Vec3fArray(points))
                .with_material("/looks/plain"),
        );
        delegate
    }

    fn serial_index() -> RenderIndex {
        RenderIndex::new(SyncConfig::default().with_parallel_sync(false))
    }

    #[test]
    fn test_insert_is_idempotent() {
        let mut index = serial_index();
        let key = index.insert_mesh("/quad");
        assert_eq!(index.insert_mesh("/quad"), key);
        assert_eq!(index.mesh_count(), 1);
        assert!(index.remove_mesh("/quad"));
        assert!(!index.remove_mesh("/quad"));
    }

    #[test]
    fn test_sync_clears_scene_bits() {
        let delegate = quad_scene();
        let mut index = serial_index();
        let key = index.insert_mesh("/quad");

        let reports = index.sync_all(&delegate, "refined");
        assert_eq!(reports.len(), 1);
        assert!(reports[0].is_ok());
        assert!(!index.change_tracker().rprim_dirty_bits(key).intersects(DirtyBits::ALL_SCENE_DIRTY_BITS));
        assert!(index.sync_all(&delegate, "refined").is_empty());
        assert!(index.commit().is_ok());
    }

    #[test]
    fn test_material_edit_dirties_bound_prims() {
        let delegate = quad_scene();
        let mut index = serial_index();
        let key = index.insert_mesh("/quad");
        index.sync_all(&delegate, "refined");

        index.insert_material("/looks/plain", Arc::new(Material::new().with_ptex(true)));
        assert!(index.change_tracker().rprim_dirty_bits(key).contains(DirtyBits::DIRTY_MATERIAL_ID));

        index.sync_all(&delegate, "refined");
        let mesh = index.mesh(key).expect("mesh");
        assert!(mesh.use_quad_indices());
    }

    #[test]
    fn test_new_repr_syncs_clean_prims() {
        let delegate = quad_scene();
        let mut index = serial_index();
        let key = index.insert_mesh("/quad");
        index.sync_all(&delegate, "refined");

        let reports = index.sync_all(&delegate, "hull");
        assert_eq!(reports.len(), 1);
        let mesh = index.mesh(key).expect("mesh");
        assert!(mesh.repr("hull").is_some());
        assert!(mesh.shared_data().range(crate::scene::draw_item::slot::HULL_TOPOLOGY).is_some());
    }
}
