//! Mesh topology
//!
//! - [`MeshTopology`]: the raw face layout handed over by a scene delegate
//! - [`RefinedTopology`]: the hashed, shareable topology with its refinement
//!   state and the computations derived from it
//! - quadrangulation, triangulation and subdivision kernels

pub mod mesh_topology;
pub mod refined;
pub mod quadrangulate;
pub mod triangulate;
pub mod subdivision;

pub use mesh_topology::{BoundaryInterpolation, MeshTopology, Orientation, SubdivScheme, SubdivTags};
pub use refined::{RefineMode, RefinedTopology};
pub use quadrangulate::QuadInfo;
pub use subdivision::SubdivisionTables;

/// Encode a coarse face index and edge flags into a primitive param
///
/// Bit 0 marks the first sub-primitive of a split face, bit 1 the last;
/// both set marks an interior sub-primitive.
pub const fn encode_face_param(face_index: usize, edge_flags: i32) -> i32 {
    ((face_index as i32) << 2) | (edge_flags & 3)
}

/// Coarse face index stored in a primitive param
pub const fn decode_face_index(param: i32) -> usize {
    (param >> 2) as usize
}

/// Edge flags for sub-primitive `index` out of `count` pieces of one face
pub(crate) const fn edge_flags(index: usize, count: usize) -> i32 {
    if count <= 1 {
        0
    } else if index == 0 {
        1
    } else if index + 1 == count {
        2
    } else {
        3
    }
}
