//! Vertex adjacency
//!
//! For every point, the (previous, next) neighbors around each face corner
//! that touches it. Smooth normals are accumulated from these corners.

use std::sync::{Arc, OnceLock};

use crate::buffer::{BufferSource, BufferSpec, CommitError, SourceOutput};
use crate::foundation::hash::ContentHasher;
use crate::tokens;
use crate::topology::{MeshTopology, RefinedTopology};

/// Per-point face-corner neighbors
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AdjacencyTable {
    entries: Vec<Vec<(u32, u32)>>,
    left_handed: bool,
}

impl AdjacencyTable {
    /// Build the table for `topology`
    pub fn build(topology: &MeshTopology) -> Self {
        let mut entries = vec![Vec::new(); topology.num_points()];
        for (_, _, verts) in topology.faces() {
            let n = verts.len();
            if n < 3 {
                continue;
            }
            for i in 0..n {
                let v = verts[i];
                if v < 0 {
                    continue;
                }
                let prev = verts[(i + n - 1) % n].max(0) as u32;
                let next = verts[(i + 1) % n].max(0) as u32;
                entries[v as usize].push((prev, next));
            }
        }
        Self { entries, left_handed: topology.is_left_handed() }
    }

    /// Number of points covered
    pub fn num_points(&self) -> usize {
        self.entries.len()
    }

    /// Face corners touching `point`, as (previous, next)
    pub fn corners(&self, point: usize) -> &[(u32, u32)] {
        self.entries.get(point).map_or(&[], Vec::as_slice)
    }

    /// Whether normals must be flipped
    pub fn is_left_handed(&self) -> bool {
        self.left_handed
    }
}

/// Builds an [`AdjacencyTable`]; uploads nothing
#[derive(Debug)]
pub struct AdjacencyBuilderComputation {
    topology: Arc<MeshTopology>,
    table: OnceLock<Arc<AdjacencyTable>>,
}

impl AdjacencyBuilderComputation {
    /// Create a builder
    pub fn new(topology: Arc<MeshTopology>) -> Self {
        Self { topology, table: OnceLock::new() }
    }

    /// The table, building it on first use
    pub fn table(&self) -> Arc<AdjacencyTable> {
        Arc::clone(self.table.get_or_init(|| Arc::new(AdjacencyTable::build(&self.topology))))
    }
}

impl BufferSource for AdjacencyBuilderComputation {
    fn name(&self) -> &str {
        tokens::ADJACENCY
    }

    fn buffer_specs(&self, _specs: &mut Vec<BufferSpec>) {}

    fn resolve(&self) -> Result<(), CommitError> {
        self.table();
        Ok(())
    }

    fn is_resolved(&self) -> bool {
        self.table.get().is_some()
    }

    fn outputs(&self) -> &[SourceOutput] {
        &[]
    }

    fn content_hash(&self) -> u64 {
        let mut hasher = ContentHasher::new();
        hasher.write_str(tokens::ADJACENCY);
        self.topology.hash_layout(&mut hasher);
        hasher.finish()
    }
}

/// Adjacency shared by every prim with the same topology hash
#[derive(Debug)]
pub struct VertexAdjacency {
    builder: Arc<AdjacencyBuilderComputation>,
}

impl VertexAdjacency {
    /// Create the (unbuilt) adjacency of `topology`
    pub fn new(topology: &RefinedTopology) -> Self {
        Self { builder: Arc::new(AdjacencyBuilderComputation::new(Arc::clone(topology.base()))) }
    }

    /// The builder to queue for commit
    pub fn builder(&self) -> Arc<AdjacencyBuilderComputation> {
        Arc::clone(&self.builder)
    }

    /// The table, building it if the builder has not run yet
    pub fn table(&self) -> Arc<AdjacencyTable> {
        self.builder.table()
    }

    /// Whether the table was built
    pub fn is_built(&self) -> bool {
        self.builder.is_resolved()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::topology::SubdivScheme;

    #[test]
    fn test_corners_of_shared_vertex() {
        let topology = MeshTopology::new(SubdivScheme::None, vec![3, 3], vec![0, 1, 2, 0, 2, 3]);
        let table = AdjacencyTable::build(&topology);
        assert_eq!(table.num_points(), 4);
        assert_eq!(table.corners(0), &[(2, 1), (3, 2)]);
        assert_eq!(table.corners(1), &[(0, 2)]);
        assert!(table.corners(9).is_empty());
    }

    #[test]
    fn test_builder_resolves_once() {
        let base = MeshTopology::new(SubdivScheme::None, vec![3], vec![0, 1, 2]);
        let topology = RefinedTopology::new(base, 0, crate::topology::RefineMode::Uniform);
        let adjacency = VertexAdjacency::new(&topology);
        assert!(!adjacency.is_built());
        adjacency.builder().resolve().unwrap();
        assert!(adjacency.is_built());
        assert!(Arc::ptr_eq(&adjacency.table(), &adjacency.table()));
    }
}
