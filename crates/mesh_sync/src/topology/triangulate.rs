//! Fan triangulation and point indices

use std::sync::Arc;

use super::mesh_topology::MeshTopology;
use super::{edge_flags, encode_face_param};
use crate::buffer::{
    BufferData, BufferSource, BufferSourceHandle, BufferSpec, CommitError, ResolvedOutputs,
    SourceOutput, TupleType, ValueType,
};
use crate::foundation::hash::ContentHasher;
use crate::tokens;

/// Triangle indices and primitive params, fan-triangulating every face
///
/// Faces with fewer than three vertices and holes are skipped.
pub fn triangle_indices(topology: &MeshTopology) -> (Vec<i32>, Vec<i32>) {
    let flip = topology.is_left_handed();
    let mut indices = Vec::new();
    let mut params = Vec::new();
    for (face, _, verts) in topology.faces() {
        let n = verts.len();
        if n < 3 || topology.is_hole(face) {
            continue;
        }
        for j in 1..n - 1 {
            if flip {
                indices.extend_from_slice(&[verts[0], verts[j + 1], verts[j]]);
            } else {
                indices.extend_from_slice(&[verts[0], verts[j], verts[j + 1]]);
            }
            params.push(encode_face_param(face, edge_flags(j - 1, n - 2)));
        }
    }
    (indices, params)
}

/// Fan-triangulate a face-varying array, matching [`triangle_indices`]
pub fn triangulate_face_varying(topology: &MeshTopology, values: &[f64], components: usize) -> Vec<f64> {
    let flip = topology.is_left_handed();
    let mut out = Vec::new();
    let push_corner = |out: &mut Vec<f64>, corner: usize| {
        for c in 0..components {
            out.push(values.get(corner * components + c).copied().unwrap_or(0.0));
        }
    };
    for (face, offset, verts) in topology.faces() {
        let n = verts.len();
        if n < 3 || topology.is_hole(face) {
            continue;
        }
        for j in 1..n - 1 {
            let (b, c) = if flip { (j + 1, j) } else { (j, j + 1) };
            push_corner(&mut out, offset);
            push_corner(&mut out, offset + b);
            push_corner(&mut out, offset + c);
        }
    }
    out
}

/// Builds triangle `indices` and `primitiveParam`
#[derive(Debug)]
pub struct TriangleIndexBuilderComputation {
    topology: Arc<MeshTopology>,
    outputs: ResolvedOutputs,
}

impl TriangleIndexBuilderComputation {
    /// Create an index builder
    pub fn new(topology: Arc<MeshTopology>) -> Self {
        Self { topology, outputs: ResolvedOutputs::new() }
    }
}

impl BufferSource for TriangleIndexBuilderComputation {
    fn name(&self) -> &str {
        tokens::INDICES
    }

    fn buffer_specs(&self, specs: &mut Vec<BufferSpec>) {
        specs.push(BufferSpec::new(tokens::INDICES, TupleType::new(ValueType::Int32, 3)));
        specs.push(BufferSpec::new(tokens::PRIMITIVE_PARAM, TupleType::new(ValueType::Int32, 1)));
    }

    fn resolve(&self) -> Result<(), CommitError> {
        if self.outputs.is_set() {
            return Ok(());
        }
        let (indices, params) = triangle_indices(&self.topology);
        self.outputs.set(vec![
            SourceOutput::new(tokens::INDICES, TupleType::new(ValueType::Int32, 3), BufferData::Int(indices)),
            SourceOutput::new(tokens::PRIMITIVE_PARAM, TupleType::new(ValueType::Int32, 1), BufferData::Int(params)),
        ]);
        Ok(())
    }

    fn is_resolved(&self) -> bool {
        self.outputs.is_set()
    }

    fn outputs(&self) -> &[SourceOutput] {
        self.outputs.get()
    }

    fn content_hash(&self) -> u64 {
        let mut hasher = ContentHasher::new();
        hasher.write_str("triangleIndices");
        self.topology.hash_layout(&mut hasher);
        hasher.finish()
    }
}

/// Builds one index per point
#[derive(Debug)]
pub struct PointsIndexBuilderComputation {
    num_points: usize,
    outputs: ResolvedOutputs,
}

impl PointsIndexBuilderComputation {
    /// Create an index builder for `num_points` points
    pub fn new(num_points: usize) -> Self {
        Self { num_points, outputs: ResolvedOutputs::new() }
    }
}

impl BufferSource for PointsIndexBuilderComputation {
    fn name(&self) -> &str {
        tokens::INDICES
    }

    fn buffer_specs(&self, specs: &mut Vec<BufferSpec>) {
        specs.push(BufferSpec::new(tokens::INDICES, TupleType::new(ValueType::Int32, 1)));
    }

    fn resolve(&self) -> Result<(), CommitError> {
        if !self.outputs.is_set() {
            let indices = (0..self.num_points as i32).collect();
            self.outputs.set(vec![SourceOutput::new(
                tokens::INDICES,
                TupleType::new(ValueType::Int32, 1),
                BufferData::Int(indices),
            )]);
        }
        Ok(())
    }

    fn is_resolved(&self) -> bool {
        self.outputs.is_set()
    }

    fn outputs(&self) -> &[SourceOutput] {
        self.outputs.get()
    }

    fn content_hash(&self) -> u64 {
        let mut hasher = ContentHasher::new();
        hasher.write_str("pointsIndices").write_u64(self.num_points as u64);
        hasher.finish()
    }
}

/// CPU triangulation of a face-varying source
#[derive(Debug)]
pub struct TriangulateFaceVaryingComputation {
    topology: Arc<MeshTopology>,
    source: BufferSourceHandle,
    outputs: ResolvedOutputs,
}

impl TriangulateFaceVaryingComputation {
    /// Create a computation over `source`
    pub fn new(topology: Arc<MeshTopology>, source: BufferSourceHandle) -> Self {
        Self { topology, source, outputs: ResolvedOutputs::new() }
    }
}

impl BufferSource for TriangulateFaceVaryingComputation {
    fn name(&self) -> &str {
        self.source.name()
    }

    fn buffer_specs(&self, specs: &mut Vec<BufferSpec>) {
        self.source.buffer_specs(specs);
    }

    fn resolve(&self) -> Result<(), CommitError> {
        if self.outputs.is_set() {
            return Ok(());
        }
        self.source.resolve()?;
        let (Some(data), Some(tuple)) = (self.source.data(), self.source.tuple_type()) else {
            return Err(CommitError::UnresolvedSource {
                name: self.name().to_string(),
                reason: "input has no data".to_string(),
            });
        };
        let values = triangulate_face_varying(&self.topology, &data.to_f64(), tuple.count);
        self.outputs.set(vec![SourceOutput::new(
            self.name(),
            tuple,
            BufferData::from_f64(values, tuple.value_type),
        )]);
        Ok(())
    }

    fn is_resolved(&self) -> bool {
        self.outputs.is_set()
    }

    fn outputs(&self) -> &[SourceOutput] {
        self.outputs.get()
    }

    fn content_hash(&self) -> u64 {
        let mut hasher = ContentHasher::new();
        hasher.write_str("triangulateFaceVarying").write_u64(self.source.content_hash());
        hasher.finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::topology::mesh_topology::{Orientation, SubdivScheme};
    use crate::topology::decode_face_index;

    fn pentagon() -> MeshTopology {
        MeshTopology::new(SubdivScheme::None, vec![5], vec![0, 1, 2, 3, 4])
    }

    #[test]
    fn test_fan_triangulation() {
        let (indices, params) = triangle_indices(&pentagon());
        assert_eq!(indices, vec![0, 1, 2, 0, 2, 3, 0, 3, 4]);
        assert_eq!(params.len(), 3);
        assert_eq!(params[0] & 3, 1);
        assert_eq!(params[1] & 3, 3);
        assert_eq!(params[2] & 3, 2);
        assert!(params.iter().all(|&p| decode_face_index(p) == 0));
    }

    #[test]
    fn test_left_handed_flips_winding() {
        let topology = pentagon().with_orientation(Orientation::LeftHanded);
        let (indices, _) = triangle_indices(&topology);
        assert_eq!(&indices[..3], &[0, 2, 1]);
    }

    #[test]
    fn test_holes_and_degenerate_faces_skipped() {
        let topology = MeshTopology::new(SubdivScheme::None, vec![3, 2, 3], vec![0, 1, 2, 2, 3, 3, 4, 5]).with_holes(vec![0]);
        let (indices, params) = triangle_indices(&topology);
        assert_eq!(indices, vec![3, 4, 5]);
        assert_eq!(decode_face_index(params[0]), 2);
    }

    #[test]
    fn test_face_varying_matches_indices() {
        let values: Vec<f64> = (0..5).map(f64::from).collect();
        let out = triangulate_face_varying(&pentagon(), &values, 1);
        assert_eq!(out, vec![0.0, 1.0, 2.0, 0.0, 2.0, 3.0, 0.0, 3.0, 4.0]);
    }

    #[test]
    fn test_points_index_builder() {
        let builder = PointsIndexBuilderComputation::new(4);
        builder.resolve().unwrap();
        assert_eq!(builder.data(), Some(&BufferData::Int(vec![0, 1, 2, 3])));
    }
}
