//! Derived geometry: vertex adjacency and generated normals

pub mod adjacency;
pub mod normals;

pub use adjacency::{AdjacencyBuilderComputation, AdjacencyTable, VertexAdjacency};
pub use normals::{pack_normal, unpack_normal};
