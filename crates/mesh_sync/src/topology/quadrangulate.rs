//! Quadrangulation
//!
//! Non-quad faces are split into quads around an added centroid. The added
//! points (one per edge midpoint plus the centroid, per non-quad face) are
//! appended after the coarse points, in face order, so a quadrangulated
//! vertex buffer always starts with the untouched coarse points.

use std::sync::{Arc, OnceLock};

use super::mesh_topology::MeshTopology;
use super::{edge_flags, encode_face_param};
use crate::buffer::{
    BufferArrayRange, BufferData, BufferResource, BufferSource, BufferSourceHandle, BufferSpec,
    CommitError, Computation, ResolvedOutputs, SourceOutput, TupleType, ValueType,
};
use crate::foundation::hash::ContentHasher;
use crate::tokens;

/// Layout of the points added by quadrangulation
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct QuadInfo {
    /// Vertex count of each non-quad face
    pub num_verts: Vec<usize>,
    /// Vertex indices of each non-quad face, concatenated
    pub verts: Vec<i32>,
    /// Index of the first added point (the coarse point count)
    pub point_index_start: usize,
    /// Number of added points
    pub num_additional_points: usize,
    /// Largest non-quad face size
    pub max_num_vert: usize,
}

impl QuadInfo {
    /// Compute the layout for `topology`
    pub fn build(topology: &MeshTopology) -> Self {
        let mut info = Self {
            point_index_start: topology.num_points(),
            ..Self::default()
        };
        for (_, _, verts) in topology.faces() {
            let n = verts.len();
            if n == 4 || n < 3 {
                continue;
            }
            info.num_verts.push(n);
            info.verts.extend_from_slice(verts);
            info.num_additional_points += n + 1;
            info.max_num_vert = info.max_num_vert.max(n);
        }
        info
    }

    /// Whether every face is already a quad
    pub fn is_all_quads(&self) -> bool {
        self.num_additional_points == 0
    }

    /// Total points after quadrangulation
    pub fn num_points(&self) -> usize {
        self.point_index_start + self.num_additional_points
    }

    /// Append edge midpoints and centroids to a flat per-point array
    ///
    /// Only the first `point_index_start` elements of `values` are read; a
    /// short input is padded with zeros.
    pub fn quadrangulate(&self, values: &[f64], components: usize) -> Vec<f64> {
        let coarse = self.point_index_start * components;
        let mut out = Vec::with_capacity(self.num_points() * components);
        out.extend_from_slice(&values[..coarse.min(values.len())]);
        out.resize(coarse, 0.0);

        let point = |index: i32, c: usize| -> f64 {
            let base = index.max(0) as usize * components;
            out_of_range_zero(values, base + c)
        };

        let mut offset = 0usize;
        for &n in &self.num_verts {
            let verts = &self.verts[offset..offset + n];
            for i in 0..n {
                let (a, b) = (verts[i], verts[(i + 1) % n]);
                for c in 0..components {
                    out.push((point(a, c) + point(b, c)) * 0.5);
                }
            }
            for c in 0..components {
                let sum: f64 = verts.iter().map(|&v| point(v, c)).sum();
                out.push(sum / n as f64);
            }
            offset += n;
        }
        out
    }
}

fn out_of_range_zero(values: &[f64], index: usize) -> f64 {
    values.get(index).copied().unwrap_or(0.0)
}

/// Quad indices and primitive params for `topology`
///
/// Holes are skipped but still advance the added-point offset.
pub fn quad_indices(topology: &MeshTopology, info: &QuadInfo) -> (Vec<i32>, Vec<i32>) {
    let flip = topology.is_left_handed();
    let mut indices = Vec::new();
    let mut params = Vec::new();
    let mut base = info.point_index_start as i32;

    for (face, _, verts) in topology.faces() {
        let n = verts.len();
        if n < 3 {
            continue;
        }
        let hole = topology.is_hole(face);
        if n == 4 {
            if !hole {
                push_quad(&mut indices, [verts[0], verts[1], verts[2], verts[3]], flip);
                params.push(encode_face_param(face, 0));
            }
            continue;
        }
        if !hole {
            let center = base + n as i32;
            for i in 0..n {
                let prev_edge = base + ((i + n - 1) % n) as i32;
                push_quad(&mut indices, [verts[i], base + i as i32, center, prev_edge], flip);
                params.push(encode_face_param(face, edge_flags(i, n)));
            }
        }
        base += n as i32 + 1;
    }
    (indices, params)
}

fn push_quad(indices: &mut Vec<i32>, quad: [i32; 4], flip: bool) {
    if flip {
        indices.extend_from_slice(&[quad[0], quad[3], quad[2], quad[1]]);
    } else {
        indices.extend_from_slice(&quad);
    }
}

/// Quadrangulate a face-varying array (one value per face corner)
///
/// Produces four values per emitted quad, in the same order as
/// [`quad_indices`].
pub fn quadrangulate_face_varying(topology: &MeshTopology, values: &[f64], components: usize) -> Vec<f64> {
    let flip = topology.is_left_handed();
    let mut out = Vec::new();
    let corner = |index: usize, c: usize| out_of_range_zero(values, index * components + c);

    for (face, offset, verts) in topology.faces() {
        let n = verts.len();
        if n < 3 || topology.is_hole(face) {
            continue;
        }
        let mut emit = |corners: [Vec<f64>; 4]| {
            let order = if flip { [0, 3, 2, 1] } else { [0, 1, 2, 3] };
            for k in order {
                out.extend_from_slice(&corners[k]);
            }
        };
        let value = |i: usize| -> Vec<f64> { (0..components).map(|c| corner(offset + i, c)).collect() };
        if n == 4 {
            emit([value(0), value(1), value(2), value(3)]);
            continue;
        }
        let mid = |i: usize| -> Vec<f64> {
            (0..components)
                .map(|c| (corner(offset + i, c) + corner(offset + (i + 1) % n, c)) * 0.5)
                .collect()
        };
        let center: Vec<f64> = (0..components)
            .map(|c| (0..n).map(|i| corner(offset + i, c)).sum::<f64>() / n as f64)
            .collect();
        for i in 0..n {
            emit([value(i), mid(i), center.clone(), mid((i + n - 1) % n)]);
        }
    }
    out
}

fn unresolved(name: &str, reason: &str) -> CommitError {
    CommitError::UnresolvedSource { name: name.to_string(), reason: reason.to_string() }
}

/// Builds the [`QuadInfo`] of a topology; uploads nothing
#[derive(Debug)]
pub struct QuadInfoBuilderComputation {
    topology: Arc<MeshTopology>,
    info: OnceLock<Arc<QuadInfo>>,
}

impl QuadInfoBuilderComputation {
    /// Create a builder
    pub fn new(topology: Arc<MeshTopology>) -> Self {
        Self { topology, info: OnceLock::new() }
    }

    /// The layout, computing it on first use
    pub fn quad_info(&self) -> Arc<QuadInfo> {
        Arc::clone(self.info.get_or_init(|| Arc::new(QuadInfo::build(&self.topology))))
    }

    /// The layout if already computed
    pub fn resolved_quad_info(&self) -> Option<Arc<QuadInfo>> {
        self.info.get().cloned()
    }
}

impl BufferSource for QuadInfoBuilderComputation {
    fn name(&self) -> &str {
        tokens::QUAD_INFO
    }

    fn buffer_specs(&self, _specs: &mut Vec<BufferSpec>) {}

    fn resolve(&self) -> Result<(), CommitError> {
        let info = self.quad_info();
        log::trace!(
            "Quad info: {} non-quad faces, {} added points",
            info.num_verts.len(),
            info.num_additional_points
        );
        Ok(())
    }

    fn is_resolved(&self) -> bool {
        self.info.get().is_some()
    }

    fn outputs(&self) -> &[SourceOutput] {
        &[]
    }

    fn content_hash(&self) -> u64 {
        let mut hasher = ContentHasher::new();
        hasher.write_str(tokens::QUAD_INFO);
        self.topology.hash_layout(&mut hasher);
        hasher.finish()
    }
}

/// CPU quadrangulation of a per-point source
#[derive(Debug)]
pub struct QuadrangulateComputation {
    source: BufferSourceHandle,
    builder: Arc<QuadInfoBuilderComputation>,
    outputs: ResolvedOutputs,
}

impl QuadrangulateComputation {
    /// Create a computation over `source`
    pub fn new(source: BufferSourceHandle, builder: Arc<QuadInfoBuilderComputation>) -> Self {
        Self { source, builder, outputs: ResolvedOutputs::new() }
    }
}

impl BufferSource for QuadrangulateComputation {
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
        let info = self.builder.quad_info();
        let (Some(data), Some(tuple)) = (self.source.data(), self.source.tuple_type()) else {
            return Err(unresolved(self.name(), "input has no data"));
        };
        let values = info.quadrangulate(&data.to_f64(), tuple.count);
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
        hasher.write_str("quadrangulate").write_u64(self.source.content_hash());
        hasher.finish()
    }
}

/// CPU quadrangulation of a face-varying source
#[derive(Debug)]
pub struct QuadrangulateFaceVaryingComputation {
    topology: Arc<MeshTopology>,
    source: BufferSourceHandle,
    outputs: ResolvedOutputs,
}

impl QuadrangulateFaceVaryingComputation {
    /// Create a computation over `source`
    pub fn new(topology: Arc<MeshTopology>, source: BufferSourceHandle) -> Self {
        Self { topology, source, outputs: ResolvedOutputs::new() }
    }
}

impl BufferSource for QuadrangulateFaceVaryingComputation {
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
            return Err(unresolved(self.name(), "input has no data"));
        };
        let values = quadrangulate_face_varying(&self.topology, &data.to_f64(), tuple.count);
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
        hasher.write_str("quadrangulateFaceVarying").write_u64(self.source.content_hash());
        hasher.finish()
    }
}

/// Builds quad `indices` and `primitiveParam`
#[derive(Debug)]
pub struct QuadIndexBuilderComputation {
    topology: Arc<MeshTopology>,
    builder: Arc<QuadInfoBuilderComputation>,
    outputs: ResolvedOutputs,
}

impl QuadIndexBuilderComputation {
    /// Create an index builder
    pub fn new(topology: Arc<MeshTopology>, builder: Arc<QuadInfoBuilderComputation>) -> Self {
        Self { topology, builder, outputs: ResolvedOutputs::new() }
    }
}

impl BufferSource for QuadIndexBuilderComputation {
    fn name(&self) -> &str {
        tokens::INDICES
    }

    fn buffer_specs(&self, specs: &mut Vec<BufferSpec>) {
        specs.push(BufferSpec::new(tokens::INDICES, TupleType::new(ValueType::Int32, 4)));
        specs.push(BufferSpec::new(tokens::PRIMITIVE_PARAM, TupleType::new(ValueType::Int32, 1)));
    }

    fn resolve(&self) -> Result<(), CommitError> {
        if self.outputs.is_set() {
            return Ok(());
        }
        let info = self.builder.quad_info();
        let (indices, params) = quad_indices(&self.topology, &info);
        self.outputs.set(vec![
            SourceOutput::new(tokens::INDICES, TupleType::new(ValueType::Int32, 4), BufferData::Int(indices)),
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
        hasher.write_str("quadIndices");
        self.topology.hash_layout(&mut hasher);
        hasher.finish()
    }
}

/// GPU quadrangulation of a buffer already uploaded into a range
#[derive(Debug)]
pub struct QuadrangulateComputationGpu {
    spec: BufferSpec,
    builder: Arc<QuadInfoBuilderComputation>,
}

impl QuadrangulateComputationGpu {
    /// Create a computation for buffer `name`
    pub fn new(name: impl Into<String>, tuple_type: TupleType, builder: Arc<QuadInfoBuilderComputation>) -> Self {
        Self { spec: BufferSpec::new(name, tuple_type), builder }
    }
}

impl Computation for QuadrangulateComputationGpu {
    fn name(&self) -> &str {
        &self.spec.name
    }

    fn buffer_specs(&self, specs: &mut Vec<BufferSpec>) {
        specs.push(self.spec.clone());
    }

    fn execute(&self, range: &dyn BufferArrayRange) -> Result<(), CommitError> {
        let info = self.builder.quad_info();
        if info.is_all_quads() {
            return Ok(());
        }
        let resource = range.resource(&self.spec.name).ok_or_else(|| CommitError::MissingInput {
            range: range.id(),
            name: self.spec.name.clone(),
        })?;
        let values = info.quadrangulate(&resource.data.to_f64(), self.spec.tuple_type.count);
        range.write(BufferResource::new(
            self.spec.clone(),
            BufferData::from_f64(values, self.spec.tuple_type.value_type),
        ))?;
        Ok(())
    }

    fn content_hash(&self) -> u64 {
        let mut hasher = ContentHasher::new();
        hasher.write_str("quadrangulateGpu").write_str(&self.spec.name);
        self.spec.tuple_type.hash_into(&mut hasher);
        hasher.finish()
    }
}
