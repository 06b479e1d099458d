//! Mesh sync pipeline
//!
//! - [`dirty`]: dirty bits and their propagation
//! - [`topology_resolver`]: topology hashing, sharing and index ranges
//! - [`primvar_sync`]: primvar pull, validation and scheduling
//! - [`range_lifecycle`]: share, migrate, extend or update decisions
//! - [`shader_selector`]: geometric shader keys
//! - [`mesh`]: the mesh prim tying the stages together

pub mod dirty;
pub mod report;
pub mod topology_resolver;
pub mod range_lifecycle;
pub mod primvar_sync;
pub mod shader_selector;
pub mod mesh;

pub use dirty::{DirtyBits, DirtyStateTracker};
pub use mesh::{Mesh, SyncContext};
pub use report::{SyncError, SyncReport, ValidationWarning, WarningKind};
pub use shader_selector::{GeometricShader, GeometricShaderSelector, MeshShaderKey, NormalSource, PrimitiveType};
