//! Uniform subdivision
//!
//! Each refinement level is expressed as a stencil table: every vertex of the
//! finer level is a weighted sum of vertices of the coarser level. Catmull-
//! Clark and bilinear split every face into quads around a face point; Loop
//! splits every triangle into four.
//!
//! Boundary edges and tagged crease edges are infinitely sharp: their edge
//! points are midpoints and vertices on exactly two of them use the crease
//! rule. Tagged corners, vertices on more than two sharp edges and (with
//! `EdgeAndCorner` boundaries) vertices touching a single face do not move.
//! Semi-sharp creases are treated as fully sharp.
//!
//! A refined vertex buffer holds the coarse vertices followed by the last
//! level's vertices, so coarse (hull) indices stay valid on it.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, OnceLock};

use super::mesh_topology::{ordered_edge, BoundaryInterpolation, MeshTopology, SubdivScheme};
use super::encode_face_param;
use crate::buffer::{
    BufferArrayRange, BufferData, BufferResource, BufferSource, BufferSourceHandle, BufferSpec,
    CommitError, Computation, ResolvedOutputs, SourceOutput, TupleType, ValueType,
};
use crate::foundation::hash::ContentHasher;
use crate::tokens;

/// Weighted source vertices of one refined vertex
pub type Stencil = Vec<(u32, f64)>;

/// Stencils mapping one level's vertices to the next
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StencilTable {
    /// Vertex count of the coarser level
    pub num_sources: usize,
    /// One stencil per vertex of the finer level
    pub stencils: Vec<Stencil>,
}

impl StencilTable {
    /// Apply to a flat array of `components`-tuples
    pub fn apply(&self, src: &[f64], components: usize) -> Vec<f64> {
        let mut out = vec![0.0; self.stencils.len() * components];
        for (i, stencil) in self.stencils.iter().enumerate() {
            for &(index, weight) in stencil {
                let base = index as usize * components;
                for c in 0..components {
                    out[i * components + c] += weight * src.get(base + c).copied().unwrap_or(0.0);
                }
            }
        }
        out
    }
}

/// Faces of one refinement level
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RefinedLevel {
    /// Vertex count of each face
    pub face_vertex_counts: Vec<i32>,
    /// Vertex indices of each face, local to the level
    pub face_vertex_indices: Vec<i32>,
    /// Coarse face each face descends from
    pub parent_faces: Vec<usize>,
    /// Vertex count of the level
    pub num_vertices: usize,
}

/// Stencil tables and final faces for a topology refined `level` times
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SubdivisionTables {
    /// Scheme used
    pub scheme: SubdivScheme,
    /// Number of levels
    pub level: usize,
    /// Vertex count of the coarse mesh
    pub num_coarse_points: usize,
    /// Per-level smooth stencils, for vertex primvars
    pub vertex_stencils: Vec<StencilTable>,
    /// Per-level linear stencils, for varying primvars
    pub varying_stencils: Vec<StencilTable>,
    /// Faces of the last level
    pub refined: RefinedLevel,
}

impl SubdivisionTables {
    /// Refine `topology` uniformly `level` times
    pub fn build(topology: &MeshTopology, level: usize) -> Self {
        let scheme = topology.scheme;
        let mut current = RefinedLevel {
            face_vertex_counts: topology.face_vertex_counts.clone(),
            face_vertex_indices: topology.face_vertex_indices.clone(),
            parent_faces: (0..topology.num_faces()).collect(),
            num_vertices: topology.num_points(),
        };
        let mut sharp_edges: HashSet<(u32, u32)> = topology.subdiv_tags.sharp_edges().into_iter().collect();
        let mut corners: HashSet<u32> = topology.subdiv_tags.sharp_corners().into_iter().collect();
        let boundary = topology.subdiv_tags.vertex_interpolation;

        if scheme == SubdivScheme::Loop && topology.face_vertex_counts.iter().any(|&n| n != 3) {
            log::warn!("Loop subdivision drops non-triangle faces");
        }

        let mut tables = Self {
            scheme,
            level,
            num_coarse_points: topology.num_points(),
            ..Self::default()
        };
        for _ in 0..level {
            let step = LevelRefiner::new(scheme, boundary, &current, &sharp_edges, &corners).refine();
            tables.vertex_stencils.push(step.vertex);
            tables.varying_stencils.push(step.varying);
            current = step.child;
            sharp_edges = step.sharp_edges;
            corners = step.corners;
        }
        tables.refined = current;
        tables
    }

    /// Vertex count of the last level
    pub fn num_refined_points(&self) -> usize {
        if self.level == 0 {
            0
        } else {
            self.refined.num_vertices
        }
    }

    /// Total elements of a refined vertex buffer
    pub fn num_output_points(&self) -> usize {
        self.num_coarse_points + self.num_refined_points()
    }

    /// Refine a flat per-point array
    ///
    /// Only the first `num_coarse_points` elements of `coarse` are read.
    pub fn refine(&self, coarse: &[f64], components: usize, varying: bool) -> Vec<f64> {
        let coarse_len = self.num_coarse_points * components;
        let mut out = coarse[..coarse_len.min(coarse.len())].to_vec();
        out.resize(coarse_len, 0.0);
        if self.level == 0 {
            return out;
        }

        let tables = if varying { &self.varying_stencils } else { &self.vertex_stencils };
        let mut current = out.clone();
        for table in tables {
            current = table.apply(&current, components);
        }
        out.extend_from_slice(&current);
        out
    }

    /// Refined face indices and primitive params
    ///
    /// Indices address the refined vertex buffer (offset by the coarse
    /// point count); faces descending from coarse holes are skipped.
    pub fn refined_indices(&self, topology: &MeshTopology) -> (Vec<i32>, Vec<i32>) {
        let flip = topology.is_left_handed();
        let offset = self.num_coarse_points as i32;
        let mut indices = Vec::new();
        let mut params = Vec::new();
        let mut start = 0usize;
        for (face, &count) in self.refined.face_vertex_counts.iter().enumerate() {
            let count = count as usize;
            let verts = &self.refined.face_vertex_indices[start..start + count];
            start += count;
            let parent = self.refined.parent_faces[face];
            if topology.is_hole(parent) {
                continue;
            }
            if flip {
                indices.push(verts[0] + offset);
                indices.extend(verts[1..].iter().rev().map(|&v| v + offset));
            } else {
                indices.extend(verts.iter().map(|&v| v + offset));
            }
            params.push(encode_face_param(parent, 0));
        }
        (indices, params)
    }
}

struct LevelStep {
    vertex: StencilTable,
    varying: StencilTable,
    child: RefinedLevel,
    sharp_edges: HashSet<(u32, u32)>,
    corners: HashSet<u32>,
}

struct Edge {
    verts: (u32, u32),
    faces: Vec<usize>,
}

/// Refines one level
struct LevelRefiner<'a> {
    scheme: SubdivScheme,
    boundary: BoundaryInterpolation,
    level: &'a RefinedLevel,
    sharp_edges: &'a HashSet<(u32, u32)>,
    corners: &'a HashSet<u32>,
    faces: Vec<(usize, Vec<u32>)>,
    edges: Vec<Edge>,
    face_edges: Vec<Vec<usize>>,
    vertex_faces: Vec<Vec<usize>>,
    vertex_edges: Vec<Vec<usize>>,
}

impl<'a> LevelRefiner<'a> {
    fn new(
        scheme: SubdivScheme,
        boundary: BoundaryInterpolation,
        level: &'a RefinedLevel,
        sharp_edges: &'a HashSet<(u32, u32)>,
        corners: &'a HashSet<u32>,
    ) -> Self {
        let triangles_only = scheme == SubdivScheme::Loop;
        let mut faces = Vec::new();
        let mut start = 0usize;
        for (face, &count) in level.face_vertex_counts.iter().enumerate() {
            let count = count.max(0) as usize;
            let Some(verts) = level.face_vertex_indices.get(start..start + count) else {
                break;
            };
            start += count;
            let usable = if triangles_only { count == 3 } else { count >= 3 };
            if usable && verts.iter().all(|&v| v >= 0 && (v as usize) < level.num_vertices) {
                faces.push((face, verts.iter().map(|&v| v as u32).collect()));
            }
        }

        let mut refiner = Self {
            scheme,
            boundary,
            level,
            sharp_edges,
            corners,
            faces,
            edges: Vec::new(),
            face_edges: Vec::new(),
            vertex_faces: vec![Vec::new(); level.num_vertices],
            vertex_edges: vec![Vec::new(); level.num_vertices],
        };
        refiner.build_incidence();
        refiner
    }

    fn build_incidence(&mut self) {
        let mut edge_lookup: HashMap<(u32, u32), usize> = HashMap::new();
        for (local, (_, verts)) in self.faces.iter().enumerate() {
            let n = verts.len();
            let mut edges = Vec::with_capacity(n);
            for i in 0..n {
                let key = ordered_edge(verts[i], verts[(i + 1) % n]);
                let index = if let Some(&index) = edge_lookup.get(&key) {
                    index
                } else {
                    let index = self.edges.len();
                    self.edges.push(Edge { verts: key, faces: Vec::new() });
                    self.vertex_edges[key.0 as usize].push(index);
                    self.vertex_edges[key.1 as usize].push(index);
                    edge_lookup.insert(key, index);
                    index
                };
                self.edges[index].faces.push(local);
                edges.push(index);
                self.vertex_faces[verts[i] as usize].push(local);
            }
            self.face_edges.push(edges);
        }
    }

    fn splits_into_quads(&self) -> bool {
        self.scheme != SubdivScheme::Loop
    }

    fn is_crease(&self, edge: usize) -> bool {
        let edge = &self.edges[edge];
        edge.faces.len() != 2 || self.sharp_edges.contains(&edge.verts)
    }

    fn other_vertex(&self, edge: usize, v: u32) -> u32 {
        let (a, b) = self.edges[edge].verts;
        if a == v {
            b
        } else {
            a
        }
    }

    fn face_point_index(&self, local_face: usize) -> u32 {
        (self.level.num_vertices + local_face) as u32
    }

    fn edge_point_index(&self, edge: usize) -> u32 {
        let base = if self.splits_into_quads() {
            self.level.num_vertices + self.faces.len()
        } else {
            self.level.num_vertices
        };
        (base + edge) as u32
    }

    fn face_stencil(&self, local_face: usize) -> Stencil {
        let verts = &self.faces[local_face].1;
        let weight = 1.0 / verts.len() as f64;
        verts.iter().map(|&v| (v, weight)).collect()
    }

    fn midpoint_stencil(&self, edge: usize) -> Stencil {
        let (a, b) = self.edges[edge].verts;
        vec![(a, 0.5), (b, 0.5)]
    }

    fn smooth_edge_stencil(&self, edge: usize) -> Stencil {
        if self.is_crease(edge) || self.scheme == SubdivScheme::Bilinear {
            return self.midpoint_stencil(edge);
        }
        let (a, b) = self.edges[edge].verts;
        let mut stencil = Stencil::new();
        match self.scheme {
            SubdivScheme::Loop => {
                accumulate(&mut stencil, a, 0.375);
                accumulate(&mut stencil, b, 0.375);
                for &face in &self.edges[edge].faces {
                    if let Some(&opposite) = self.faces[face].1.iter().find(|&&v| v != a && v != b) {
                        accumulate(&mut stencil, opposite, 0.125);
                    }
                }
            }
            _ => {
                accumulate(&mut stencil, a, 0.25);
                accumulate(&mut stencil, b, 0.25);
                for &face in &self.edges[edge].faces {
                    accumulate_all(&mut stencil, &self.face_stencil(face), 0.25);
                }
            }
        }
        stencil
    }

    fn smooth_vertex_stencil(&self, v: u32) -> Stencil {
        let incident_edges = &self.vertex_edges[v as usize];
        let incident_faces = &self.vertex_faces[v as usize];
        if self.scheme == SubdivScheme::Bilinear || incident_faces.is_empty() {
            return vec![(v, 1.0)];
        }

        let creases: Vec<usize> = incident_edges.iter().copied().filter(|&e| self.is_crease(e)).collect();
        let single_face_boundary =
            self.boundary == BoundaryInterpolation::EdgeAndCorner && incident_faces.len() == 1;
        if self.corners.contains(&v) || creases.len() > 2 || single_face_boundary {
            return vec![(v, 1.0)];
        }
        if creases.len() == 2 {
            let mut stencil = vec![(v, 0.75)];
            for &edge in &creases {
                accumulate(&mut stencil, self.other_vertex(edge, v), 0.125);
            }
            return stencil;
        }

        let n = incident_edges.len() as f64;
        let mut stencil = Stencil::new();
        match self.scheme {
            SubdivScheme::Loop => {
                let beta = if incident_edges.len() == 3 { 3.0 / 16.0 } else { 3.0 / (8.0 * n) };
                accumulate(&mut stencil, v, 1.0 - n * beta);
                for &edge in incident_edges {
                    accumulate(&mut stencil, self.other_vertex(edge, v), beta);
                }
            }
            _ => {
                let m = incident_faces.len() as f64;
                accumulate(&mut stencil, v, (n - 2.0) / n);
                for &edge in incident_edges {
                    accumulate(&mut stencil, self.other_vertex(edge, v), 1.0 / (n * n));
                }
                for &face in incident_faces {
                    accumulate_all(&mut stencil, &self.face_stencil(face), 1.0 / (m * n));
                }
            }
        }
        stencil
    }

    fn refine(&self) -> LevelStep {
        let nv = self.level.num_vertices;
        let quads = self.splits_into_quads();
        let num_child = nv + if quads { self.faces.len() } else { 0 } + self.edges.len();

        let mut vertex = Vec::with_capacity(num_child);
        let mut varying = Vec::with_capacity(num_child);
        for v in 0..nv as u32 {
            vertex.push(self.smooth_vertex_stencil(v));
            varying.push(vec![(v, 1.0)]);
        }
        if quads {
            for face in 0..self.faces.len() {
                let stencil = self.face_stencil(face);
                vertex.push(stencil.clone());
                varying.push(stencil);
            }
        }
        for edge in 0..self.edges.len() {
            vertex.push(self.smooth_edge_stencil(edge));
            varying.push(self.midpoint_stencil(edge));
        }

        let mut child = RefinedLevel { num_vertices: num_child, ..RefinedLevel::default() };
        for (local, (face, verts)) in self.faces.iter().enumerate() {
            let parent = self.level.parent_faces.get(*face).copied().unwrap_or(*face);
            let edges = &self.face_edges[local];
            let n = verts.len();
            if quads {
                let center = self.face_point_index(local);
                for i in 0..n {
                    let quad = [
                        verts[i],
                        self.edge_point_index(edges[i]),
                        center,
                        self.edge_point_index(edges[(i + n - 1) % n]),
                    ];
                    push_face(&mut child, &quad, parent);
                }
            } else {
                let (e0, e1, e2) = (
                    self.edge_point_index(edges[0]),
                    self.edge_point_index(edges[1]),
                    self.edge_point_index(edges[2]),
                );
                push_face(&mut child, &[verts[0], e0, e2], parent);
                push_face(&mut child, &[e0, verts[1], e1], parent);
                push_face(&mut child, &[e2, e1, verts[2]], parent);
                push_face(&mut child, &[e0, e1, e2], parent);
            }
        }

        let mut sharp_edges = HashSet::new();
        for (index, edge) in self.edges.iter().enumerate() {
            if self.sharp_edges.contains(&edge.verts) {
                let mid = self.edge_point_index(index);
                sharp_edges.insert(ordered_edge(edge.verts.0, mid));
                sharp_edges.insert(ordered_edge(edge.verts.1, mid));
            }
        }

        LevelStep {
            vertex: StencilTable { num_sources: nv, stencils: vertex },
            varying: StencilTable { num_sources: nv, stencils: varying },
            child,
            sharp_edges,
            corners: self.corners.clone(),
        }
    }
}

fn push_face(level: &mut RefinedLevel, verts: &[u32], parent: usize) {
    level.face_vertex_counts.push(verts.len() as i32);
    level.face_vertex_indices.extend(verts.iter().map(|&v| v as i32));
    level.parent_faces.push(parent);
}

fn accumulate(stencil: &mut Stencil, index: u32, weight: f64) {
    if let Some(entry) = stencil.iter_mut().find(|(i, _)| *i == index) {
        entry.1 += weight;
    } else {
        stencil.push((index, weight));
    }
}

fn accumulate_all(stencil: &mut Stencil, other: &Stencil, scale: f64) {
    for &(index, weight) in other {
        accumulate(stencil, index, weight * scale);
    }
}

fn unresolved(name: &str, reason: &str) -> CommitError {
    CommitError::UnresolvedSource { name: name.to_string(), reason: reason.to_string() }
}

/// Subdivision preprocessing: builds the stencil tables of a topology
#[derive(Debug)]
pub struct OsdTopologyComputation {
    topology: Arc<MeshTopology>,
    level: usize,
    tables: OnceLock<Arc<SubdivisionTables>>,
}

impl OsdTopologyComputation {
    /// Create a preprocessing computation
    pub fn new(topology: Arc<MeshTopology>, level: usize) -> Self {
        Self { topology, level, tables: OnceLock::new() }
    }

    /// The tables, building them on first use
    pub fn tables(&self) -> Arc<SubdivisionTables> {
        Arc::clone(self.tables.get_or_init(|| {
            log::debug!(
                "Building subdivision tables: {} faces, level {}",
                self.topology.num_faces(),
                self.level
            );
            Arc::new(SubdivisionTables::build(&self.topology, self.level))
        }))
    }

    /// Refinement level
    pub fn level(&self) -> usize {
        self.level
    }
}

impl BufferSource for OsdTopologyComputation {
    fn name(&self) -> &str {
        tokens::OSD_TOPOLOGY
    }

    fn buffer_specs(&self, _specs: &mut Vec<BufferSpec>) {}

    fn resolve(&self) -> Result<(), CommitError> {
        self.tables();
        Ok(())
    }

    fn is_resolved(&self) -> bool {
        self.tables.get().is_some()
    }

    fn outputs(&self) -> &[SourceOutput] {
        &[]
    }

    fn content_hash(&self) -> u64 {
        let mut hasher = ContentHasher::new();
        hasher.write_str(tokens::OSD_TOPOLOGY).write_u64(self.level as u64);
        self.topology.hash_layout(&mut hasher);
        self.topology.subdiv_tags.hash_into(&mut hasher);
        hasher.finish()
    }
}

/// CPU refinement of a per-point source
#[derive(Debug)]
pub struct OsdRefineComputation {
    source: BufferSourceHandle,
    osd: Arc<OsdTopologyComputation>,
    varying: bool,
    outputs: ResolvedOutputs,
}

impl OsdRefineComputation {
    /// Create a computation over `source`; `varying` selects linear stencils
    pub fn new(source: BufferSourceHandle, osd: Arc<OsdTopologyComputation>, varying: bool) -> Self {
        Self { source, osd, varying, outputs: ResolvedOutputs::new() }
    }
}

impl BufferSource for OsdRefineComputation {
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
        let tables = self.osd.tables();
        let (Some(data), Some(tuple)) = (self.source.data(), self.source.tuple_type()) else {
            return Err(unresolved(self.name(), "input has no data"));
        };
        let values = tables.refine(&data.to_f64(), tuple.count, self.varying);
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
        hasher
            .write_str("osdRefine")
            .write_bool(self.varying)
            .write_u64(self.osd.level() as u64)
            .write_u64(self.source.content_hash());
        hasher.finish()
    }
}

/// GPU refinement of a buffer already uploaded into a range
#[derive(Debug)]
pub struct OsdRefineComputationGpu {
    spec: BufferSpec,
    osd: Arc<OsdTopologyComputation>,
    varying: bool,
}

impl OsdRefineComputationGpu {
    /// Create a computation for buffer `name`
    pub fn new(name: impl Into<String>, tuple_type: TupleType, osd: Arc<OsdTopologyComputation>, varying: bool) -> Self {
        Self { spec: BufferSpec::new(name, tuple_type), osd, varying }
    }
}

impl Computation for OsdRefineComputationGpu {
    fn name(&self) -> &str {
        &self.spec.name
    }

    fn buffer_specs(&self, specs: &mut Vec<BufferSpec>) {
        specs.push(self.spec.clone());
    }

    fn execute(&self, range: &dyn BufferArrayRange) -> Result<(), CommitError> {
        let resource = range.resource(&self.spec.name).ok_or_else(|| CommitError::MissingInput {
            range: range.id(),
            name: self.spec.name.clone(),
        })?;
        let tables = self.osd.tables();
        let values = tables.refine(&resource.data.to_f64(), self.spec.tuple_type.count, self.varying);
        range.write(BufferResource::new(
            self.spec.clone(),
            BufferData::from_f64(values, self.spec.tuple_type.value_type),
        ))?;
        Ok(())
    }

    fn content_hash(&self) -> u64 {
        let mut hasher = ContentHasher::new();
        hasher
            .write_str("osdRefineGpu")
            .write_str(&self.spec.name)
            .write_bool(self.varying)
            .write_u64(self.osd.level() as u64);
        self.spec.tuple_type.hash_into(&mut hasher);
        hasher.finish()
    }
}

/// Builds refined `indices` and `primitiveParam`
#[derive(Debug)]
pub struct OsdIndexBuilderComputation {
    topology: Arc<MeshTopology>,
    osd: Arc<OsdTopologyComputation>,
    outputs: ResolvedOutputs,
}

impl OsdIndexBuilderComputation {
    /// Create an index builder
    pub fn new(topology: Arc<MeshTopology>, osd: Arc<OsdTopologyComputation>) -> Self {
        Self { topology, osd, outputs: ResolvedOutputs::new() }
    }

    fn index_tuple(&self) -> TupleType {
        let arity = if self.topology.scheme.refines_to_triangles() { 3 } else { 4 };
        TupleType::new(ValueType::Int32, arity)
    }
}

impl BufferSource for OsdIndexBuilderComputation {
    fn name(&self) -> &str {
        tokens::INDICES
    }

    fn buffer_specs(&self, specs: &mut Vec<BufferSpec>) {
        specs.push(BufferSpec::new(tokens::INDICES, self.index_tuple()));
        specs.push(BufferSpec::new(tokens::PRIMITIVE_PARAM, TupleType::new(ValueType::Int32, 1)));
    }

    fn resolve(&self) -> Result<(), CommitError> {
        if self.outputs.is_set() {
            return Ok(());
        }
        let tables = self.osd.tables();
        let (indices, params) = tables.refined_indices(&self.topology);
        self.outputs.set(vec![
            SourceOutput::new(tokens::INDICES, self.index_tuple(), BufferData::Int(indices)),
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
        hasher.write_str("osdIndices").write_u64(self.osd.content_hash());
        hasher.finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::topology::mesh_topology::SubdivTags;
    use approx::assert_relative_eq;

    fn unit_quad(scheme: SubdivScheme) -> MeshTopology {
        MeshTopology::new(scheme, vec![4], vec![0, 1, 2, 3])
    }

    fn quad_points() -> Vec<f64> {
        vec![0.0, 0.0, 0.0, 1.0, 0.0, 0.0, 1.0, 1.0, 0.0, 0.0, 1.0, 0.0]
    }

    // Two quads sharing edge 1-4
    fn two_quads() -> MeshTopology {
        MeshTopology::new(SubdivScheme::CatmullClark, vec![4, 4], vec![0, 1, 4, 3, 1, 2, 5, 4])
    }

    fn cube() -> MeshTopology {
        MeshTopology::new(
            SubdivScheme::CatmullClark,
            vec![4; 6],
            vec![0, 1, 3, 2, 2, 3, 5, 4, 4, 5, 7, 6, 6, 7, 1, 0, 1, 7, 5, 3, 6, 0, 2, 4],
        )
    }

    fn cube_points() -> Vec<f64> {
        vec![
            -0.5, -0.5, 0.5, 0.5, -0.5, 0.5, -0.5, 0.5, 0.5, 0.5, 0.5, 0.5,
            -0.5, 0.5, -0.5, 0.5, 0.5, -0.5, -0.5, -0.5, -0.5, 0.5, -0.5, -0.5,
        ]
    }

    #[test]
    fn test_single_level_quad_counts() {
        let tables = SubdivisionTables::build(&unit_quad(SubdivScheme::CatmullClark), 1);
        // 4 vertices + 1 face point + 4 edge points
        assert_eq!(tables.refined.num_vertices, 9);
        assert_eq!(tables.refined.face_vertex_counts, vec![4; 4]);
        assert_eq!(tables.num_output_points(), 13);
    }

    #[test]
    fn test_two_levels_face_count() {
        let tables = SubdivisionTables::build(&cube(), 2);
        assert_eq!(tables.refined.face_vertex_counts.len(), 6 * 16);
        assert_eq!(tables.vertex_stencils.len(), 2);
        assert!(tables.refined.parent_faces.iter().all(|&p| p < 6));
    }

    #[test]
    fn test_boundary_corners_stay_fixed() {
        let tables = SubdivisionTables::build(&unit_quad(SubdivScheme::CatmullClark), 1);
        let out = tables.refine(&quad_points(), 3, false);
        // coarse prefix is untouched, refined corner 2 equals coarse corner 2
        assert_eq!(&out[..12], quad_points().as_slice());
        assert_relative_eq!(out[12 + 6], 1.0);
        assert_relative_eq!(out[12 + 7], 1.0);
        // face point is the centroid
        assert_relative_eq!(out[12 + 12], 0.5);
        assert_relative_eq!(out[12 + 13], 0.5);
    }

    #[test]
    fn test_crease_rule_on_boundary_vertex() {
        let tables = SubdivisionTables::build(&two_quads(), 1);
        // vertex 1 sits on the boundary between two faces: 3/4 v + 1/8 (v0 + v2)
        let stencil = &tables.vertex_stencils[0].stencils[1];
        let weight = |i: u32| stencil.iter().find(|(v, _)| *v == i).map_or(0.0, |(_, w)| *w);
        assert_relative_eq!(weight(1), 0.75);
        assert_relative_eq!(weight(0), 0.125);
        assert_relative_eq!(weight(2), 0.125);
        assert_relative_eq!(weight(4), 0.0);
    }

    #[test]
    fn test_closed_mesh_shrinks_towards_center() {
        let tables = SubdivisionTables::build(&cube(), 1);
        let out = tables.refine(&cube_points(), 3, false);
        let refined_corner = &out[8 * 3..8 * 3 + 3];
        // smooth valence-3 vertex moves inward, stays on the diagonal
        assert!(refined_corner[0].abs() < 0.5);
        assert_relative_eq!(refined_corner[0].abs(), refined_corner[1].abs(), epsilon = 1e-12);
    }

    #[test]
    fn test_stencil_weights_sum_to_one() {
        let tables = SubdivisionTables::build(&cube(), 2);
        for table in tables.vertex_stencils.iter().chain(tables.varying_stencils.iter()) {
            for stencil in &table.stencils {
                let sum: f64 = stencil.iter().map(|(_, w)| w).sum();
                assert_relative_eq!(sum, 1.0, epsilon = 1e-9);
            }
        }
    }

    #[test]
    fn test_varying_uses_linear_stencils() {
        let tables = SubdivisionTables::build(&cube(), 1);
        let out = tables.refine(&cube_points(), 3, true);
        // refined vertex 0 equals coarse vertex 0 under linear interpolation
        assert_relative_eq!(out[8 * 3], -0.5);
    }

    #[test]
    fn test_tagged_corner_is_fixed() {
        let tags = SubdivTags {
            corner_indices: vec![0],
            corner_sharpness: vec![10.0],
            ..SubdivTags::default()
        };
        let tables = SubdivisionTables::build(&cube().with_subdiv_tags(tags), 1);
        assert_eq!(tables.vertex_stencils[0].stencils[0], vec![(0, 1.0)]);
    }

    #[test]
    fn test_loop_splits_triangles() {
        let tetra = MeshTopology::new(SubdivScheme::Loop, vec![3; 4], vec![0, 1, 2, 0, 3, 1, 1, 3, 2, 2, 3, 0]);
        let tables = SubdivisionTables::build(&tetra, 1);
        assert_eq!(tables.refined.face_vertex_counts, vec![3; 16]);
        assert_eq!(tables.refined.num_vertices, 4 + 6);
        let (indices, params) = tables.refined_indices(&tetra);
        assert_eq!(indices.len(), 16 * 3);
        assert_eq!(params.len(), 16);
        assert!(indices.iter().all(|&i| i >= 4));
    }

    #[test]
    fn test_refined_indices_skip_holes() {
        let topology = two_quads().with_holes(vec![1]);
        let tables = SubdivisionTables::build(&topology, 1);
        let (indices, params) = tables.refined_indices(&topology);
        assert_eq!(params.len(), 4);
        assert_eq!(indices.len(), 16);
    }
}
