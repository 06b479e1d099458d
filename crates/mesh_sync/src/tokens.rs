//! Well-known buffer and primvar names

/// Point positions
pub const POINTS: &str = "points";
/// Authored normals
pub const NORMALS: &str = "normals";
/// Point widths
pub const WIDTHS: &str = "widths";
/// Index buffer
pub const INDICES: &str = "indices";
/// Per-primitive coarse face index and edge flags
pub const PRIMITIVE_PARAM: &str = "primitiveParam";
/// Generated smooth normals
pub const SMOOTH_NORMALS: &str = "smoothNormals";
/// Generated smooth normals, packed
pub const PACKED_SMOOTH_NORMALS: &str = "packedSmoothNormals";
/// Generated flat normals
pub const FLAT_NORMALS: &str = "flatNormals";
/// Generated flat normals, packed
pub const PACKED_FLAT_NORMALS: &str = "packedFlatNormals";
/// Prim transform in the constant range
pub const TRANSFORM: &str = "transform";
/// Prim id in the constant range
pub const PRIM_ID: &str = "primId";
/// Quadrangulation layout builder
pub const QUAD_INFO: &str = "quadInfo";
/// Subdivision stencil builder
pub const OSD_TOPOLOGY: &str = "osdTopology";
/// Vertex adjacency builder
pub const ADJACENCY: &str = "adjacency";

/// Buffers generated by the pipeline rather than authored
pub const GENERATED_PRIMVARS: [&str; 4] = [SMOOTH_NORMALS, PACKED_SMOOTH_NORMALS, FLAT_NORMALS, PACKED_FLAT_NORMALS];

/// Whether `name` is generated by the pipeline
pub fn is_generated(name: &str) -> bool {
    GENERATED_PRIMVARS.contains(&name)
}
