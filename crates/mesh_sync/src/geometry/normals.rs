//! Generated normals
//!
//! Smooth normals are per point: the normalized sum of face-corner cross
//! products, which weights each face by its corner area. Flat normals are
//! per face, computed with Newell's method so non-planar polygons get a
//! stable average.

use std::sync::Arc;

use super::adjacency::{AdjacencyTable, VertexAdjacency};
use crate::buffer::{
    BufferArrayRange, BufferData, BufferResource, BufferSource, BufferSourceHandle, BufferSpec,
    CommitError, Computation, RangeHandle, ResolvedOutputs, SourceOutput, TupleType, ValueType,
};
use crate::foundation::hash::ContentHasher;
use crate::foundation::math::{safe_normalize, vec3_at, Vec3d};
use crate::tokens;
use crate::topology::MeshTopology;

/// Smooth per-point normals
pub fn smooth_normals(table: &AdjacencyTable, points: &[f64]) -> Vec<Vec3d> {
    let sign = if table.is_left_handed() { -1.0 } else { 1.0 };
    (0..table.num_points())
        .map(|v| {
            let p = vec3_at(points, v);
            let sum = table.corners(v).iter().fold(Vec3d::zeros(), |acc, &(prev, next)| {
                let to_next = vec3_at(points, next as usize) - p;
                let to_prev = vec3_at(points, prev as usize) - p;
                acc + to_next.cross(&to_prev)
            });
            safe_normalize(sum * sign)
        })
        .collect()
}

/// Flat per-face normals
pub fn flat_normals(topology: &MeshTopology, points: &[f64]) -> Vec<Vec3d> {
    let sign = if topology.is_left_handed() { -1.0 } else { 1.0 };
    topology
        .faces()
        .map(|(_, _, verts)| {
            let n = verts.len();
            if n < 3 {
                return Vec3d::zeros();
            }
            let sum = (0..n).fold(Vec3d::zeros(), |acc, i| {
                let a = vec3_at(points, verts[i].max(0) as usize);
                let b = vec3_at(points, verts[(i + 1) % n].max(0) as usize);
                acc + a.cross(&b)
            });
            safe_normalize(sum * sign)
        })
        .collect()
}

/// Pack a unit normal into signed 2_10_10_10 (w = 0)
pub fn pack_normal(normal: Vec3d) -> i32 {
    let component = |x: f64| -> i32 { ((x.clamp(-1.0, 1.0) * 511.0).round() as i32) & 0x3ff };
    component(normal.x) | (component(normal.y) << 10) | (component(normal.z) << 20)
}

/// Unpack a signed 2_10_10_10 normal
pub fn unpack_normal(packed: i32) -> Vec3d {
    let component = |shift: u32| -> f64 {
        let bits = (packed >> shift) & 0x3ff;
        let signed = if bits & 0x200 != 0 { bits - 0x400 } else { bits };
        f64::from(signed) / 511.0
    };
    Vec3d::new(component(0), component(10), component(20))
}

fn normals_tuple(packed: bool, value_type: ValueType) -> TupleType {
    if packed {
        TupleType::new(ValueType::PackedInt2_10_10_10, 1)
    } else {
        TupleType::new(value_type, 3)
    }
}

fn normals_data(normals: &[Vec3d], packed: bool, value_type: ValueType) -> BufferData {
    if packed {
        BufferData::Int(normals.iter().map(|&n| pack_normal(n)).collect())
    } else {
        let flat = normals.iter().flat_map(|n| [n.x, n.y, n.z]).collect();
        BufferData::from_f64(flat, value_type)
    }
}

/// Name of the generated smooth normals buffer
pub const fn smooth_normals_name(packed: bool) -> &'static str {
    if packed {
        tokens::PACKED_SMOOTH_NORMALS
    } else {
        tokens::SMOOTH_NORMALS
    }
}

/// Name of the generated flat normals buffer
pub const fn flat_normals_name(packed: bool) -> &'static str {
    if packed {
        tokens::PACKED_FLAT_NORMALS
    } else {
        tokens::FLAT_NORMALS
    }
}

fn points_input(points: &BufferSourceHandle) -> Result<Vec<f64>, CommitError> {
    points.resolve()?;
    points.data().map(BufferData::to_f64).ok_or_else(|| CommitError::UnresolvedSource {
        name: points.name().to_string(),
        reason: "points have no data".to_string(),
    })
}

fn range_points(range: &dyn BufferArrayRange) -> Result<Vec<f64>, CommitError> {
    range
        .resource(tokens::POINTS)
        .map(|resource| resource.data.to_f64())
        .ok_or_else(|| CommitError::MissingInput { range: range.id(), name: tokens::POINTS.to_string() })
}

/// CPU smooth normals from a points source
#[derive(Debug)]
pub struct SmoothNormalsComputation {
    adjacency: Arc<VertexAdjacency>,
    points: BufferSourceHandle,
    spec: BufferSpec,
    packed: bool,
    outputs: ResolvedOutputs,
}

impl SmoothNormalsComputation {
    /// Create a computation; normals take the points' value type unless packed
    pub fn new(adjacency: Arc<VertexAdjacency>, points: BufferSourceHandle, packed: bool) -> Self {
        let value_type = points.tuple_type().map_or(ValueType::Float, |t| t.value_type);
        let spec = BufferSpec::new(smooth_normals_name(packed), normals_tuple(packed, value_type));
        Self { adjacency, points, spec, packed, outputs: ResolvedOutputs::new() }
    }
}

impl BufferSource for SmoothNormalsComputation {
    fn name(&self) -> &str {
        &self.spec.name
    }

    fn buffer_specs(&self, specs: &mut Vec<BufferSpec>) {
        specs.push(self.spec.clone());
    }

    fn resolve(&self) -> Result<(), CommitError> {
        if self.outputs.is_set() {
            return Ok(());
        }
        let points = points_input(&self.points)?;
        let normals = smooth_normals(&self.adjacency.table(), &points);
        let value_type = self.spec.tuple_type.value_type;
        self.outputs.set(vec![SourceOutput::new(
            self.spec.name.clone(),
            self.spec.tuple_type,
            normals_data(&normals, self.packed, value_type),
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
        hasher.write_str(&self.spec.name).write_u64(self.points.content_hash());
        hasher.finish()
    }
}

/// CPU flat normals from a points source
#[derive(Debug)]
pub struct FlatNormalsComputation {
    topology: Arc<MeshTopology>,
    points: BufferSourceHandle,
    spec: BufferSpec,
    packed: bool,
    outputs: ResolvedOutputs,
}

impl FlatNormalsComputation {
    /// Create a computation
    pub fn new(topology: Arc<MeshTopology>, points: BufferSourceHandle, packed: bool) -> Self {
        let value_type = points.tuple_type().map_or(ValueType::Float, |t| t.value_type);
        let spec = BufferSpec::new(flat_normals_name(packed), normals_tuple(packed, value_type));
        Self { topology, points, spec, packed, outputs: ResolvedOutputs::new() }
    }
}

impl BufferSource for FlatNormalsComputation {
    fn name(&self) -> &str {
        &self.spec.name
    }

    fn buffer_specs(&self, specs: &mut Vec<BufferSpec>) {
        specs.push(self.spec.clone());
    }

    fn resolve(&self) -> Result<(), CommitError> {
        if self.outputs.is_set() {
            return Ok(());
        }
        let points = points_input(&self.points)?;
        let normals = flat_normals(&self.topology, &points);
        self.outputs.set(vec![SourceOutput::new(
            self.spec.name.clone(),
            self.spec.tuple_type,
            normals_data(&normals, self.packed, self.spec.tuple_type.value_type),
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
        hasher.write_str(&self.spec.name).write_u64(self.points.content_hash());
        self.topology.hash_layout(&mut hasher);
        hasher.finish()
    }
}

/// GPU smooth normals from the `points` buffer of the same range
#[derive(Debug)]
pub struct SmoothNormalsComputationGpu {
    adjacency: Arc<VertexAdjacency>,
    spec: BufferSpec,
    packed: bool,
}

impl SmoothNormalsComputationGpu {
    /// Create a computation; `points_type` is the component type of `points`
    pub fn new(adjacency: Arc<VertexAdjacency>, points_type: ValueType, packed: bool) -> Self {
        let spec = BufferSpec::new(smooth_normals_name(packed), normals_tuple(packed, points_type));
        Self { adjacency, spec, packed }
    }
}

impl Computation for SmoothNormalsComputationGpu {
    fn name(&self) -> &str {
        &self.spec.name
    }

    fn buffer_specs(&self, specs: &mut Vec<BufferSpec>) {
        specs.push(self.spec.clone());
    }

    fn execute(&self, range: &dyn BufferArrayRange) -> Result<(), CommitError> {
        let points = range_points(range)?;
        let normals = smooth_normals(&self.adjacency.table(), &points);
        range.write(BufferResource::new(
            self.spec.clone(),
            normals_data(&normals, self.packed, self.spec.tuple_type.value_type),
        ))?;
        Ok(())
    }

    fn content_hash(&self) -> u64 {
        let mut hasher = ContentHasher::new();
        hasher.write_str("smoothNormalsGpu").write_str(&self.spec.name);
        self.spec.tuple_type.hash_into(&mut hasher);
        hasher.finish()
    }
}

/// GPU flat normals, reading points from the prim's vertex range
#[derive(Debug)]
pub struct FlatNormalsComputationGpu {
    topology: Arc<MeshTopology>,
    vertex_range: RangeHandle,
    spec: BufferSpec,
    packed: bool,
}

impl FlatNormalsComputationGpu {
    /// Create a computation
    pub fn new(topology: Arc<MeshTopology>, vertex_range: RangeHandle, points_type: ValueType, packed: bool) -> Self {
        let spec = BufferSpec::new(flat_normals_name(packed), normals_tuple(packed, points_type));
        Self { topology, vertex_range, spec, packed }
    }
}

impl Computation for FlatNormalsComputationGpu {
    fn name(&self) -> &str {
        &self.spec.name
    }

    fn buffer_specs(&self, specs: &mut Vec<BufferSpec>) {
        specs.push(self.spec.clone());
    }

    fn execute(&self, range: &dyn BufferArrayRange) -> Result<(), CommitError> {
        let points = range_points(self.vertex_range.as_ref())?;
        let normals = flat_normals(&self.topology, &points);
        range.write(BufferResource::new(
            self.spec.clone(),
            normals_data(&normals, self.packed, self.spec.tuple_type.value_type),
        ))?;
        Ok(())
    }

    fn content_hash(&self) -> u64 {
        let mut hasher = ContentHasher::new();
        hasher.write_str("flatNormalsGpu").write_str(&self.spec.name);
        self.topology.hash_layout(&mut hasher);
        hasher.finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::buffer::VtBufferSource;
    use crate::topology::{Orientation, RefineMode, RefinedTopology, SubdivScheme};
    use approx::assert_relative_eq;

    fn unit_quad() -> MeshTopology {
        MeshTopology::new(SubdivScheme::CatmullClark, vec![4], vec![0, 1, 2, 3])
    }

    fn quad_points() -> Vec<f64> {
        vec![0.0, 0.0, 0.0, 1.0, 0.0, 0.0, 1.0, 1.0, 0.0, 0.0, 1.0, 0.0]
    }

    #[test]
    fn test_smooth_normals_of_planar_quad() {
        let table = AdjacencyTable::build(&unit_quad());
        for n in smooth_normals(&table, &quad_points()) {
            assert_relative_eq!(n.z, 1.0, epsilon = 1e-12);
        }
    }

    #[test]
    fn test_left_handed_flips_normals() {
        let topology = unit_quad().with_orientation(Orientation::LeftHanded);
        let flat = flat_normals(&topology, &quad_points());
        assert_relative_eq!(flat[0].z, -1.0, epsilon = 1e-12);
        let smooth = smooth_normals(&AdjacencyTable::build(&topology), &quad_points());
        assert_relative_eq!(smooth[0].z, -1.0, epsilon = 1e-12);
    }

    #[test]
    fn test_flat_normals_degenerate_face_is_zero() {
        let topology = MeshTopology::new(SubdivScheme::None, vec![2], vec![0, 1]);
        assert_eq!(flat_normals(&topology, &quad_points()), vec![Vec3d::zeros()]);
    }

    #[test]
    fn test_pack_round_trip_precision() {
        let n = safe_normalize(Vec3d::new(0.3, -0.5, 0.8));
        let back = unpack_normal(pack_normal(n));
        assert_relative_eq!(back.x, n.x, epsilon = 2e-3);
        assert_relative_eq!(back.y, n.y, epsilon = 2e-3);
        assert_relative_eq!(back.z, n.z, epsilon = 2e-3);
    }

    #[test]
    fn test_cpu_smooth_normals_source() {
        let topology = RefinedTopology::new(unit_quad(), 0, RefineMode::Uniform);
        let adjacency = Arc::new(VertexAdjacency::new(&topology));
        let points: BufferSourceHandle = Arc::new(VtBufferSource::new(
            tokens::POINTS,
            TupleType::new(ValueType::Float, 3),
            BufferData::Float(quad_points().into_iter().map(|x| x as f32).collect()),
        ));
        let packed = SmoothNormalsComputation::new(Arc::clone(&adjacency), Arc::clone(&points), true);
        assert_eq!(packed.name(), tokens::PACKED_SMOOTH_NORMALS);
        packed.resolve().unwrap();
        assert_eq!(packed.num_elements(), 4);

        let full = SmoothNormalsComputation::new(adjacency, points, false);
        assert_eq!(full.tuple_type(), Some(TupleType::new(ValueType::Float, 3)));
        full.resolve().unwrap();
        assert_eq!(full.data().map(BufferData::len), Some(12));
    }
}
