//! # Mesh Sync
//!
//! Incremental synchronization of mesh prims into GPU-ready buffer ranges.
//!
//! ## Features
//!
//! - **Dirty Tracking**: scene edits expand into exactly the work they imply
//! - **Shared Topology**: identical meshes share refined topology and indices
//! - **Primvar Ranges**: vertex data is shared, migrated or updated in place
//! - **CPU/GPU Compute**: normals, quadrangulation and refinement on either side
//! - **Parallel Sync**: prims sync concurrently against one registry
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use mesh_sync::prelude::*;
//! use nalgebra::Vector3;
//!
//! let mut delegate = MemoryDelegate::new();
//! delegate.insert_mesh(
//!     "/triangle",
//!     MeshData::new(MeshTopology::new(SubdivScheme::None, vec![3], vec![0, 1, 2]))
//!         .with_primvar("points", Interpolation::Vertex, Value::Vec3fArray(vec![
//!             Vector3::new(0.0, 0.0, 0.0),
//!             Vector3::new(1.0, 0.0, 0.0),
//!             Vector3::new(0.0, 1.0, 0.0),
//!         ])),
//! );
//!
//! let mut index = RenderIndex::new(SyncConfig::default());
//! index.insert_mesh("/triangle");
//! for report in index.sync_all(&delegate, "refined") {
//!     assert!(report.is_ok());
//! }
//! index.commit()?;
//! # Ok::<(), SyncError>(())
//! ```

#![warn(missing_docs)]
#![warn(clippy::all, clippy::pedantic, clippy::nursery)]
#![allow(clippy::module_name_repetitions, clippy::similar_names, clippy::too_many_arguments)]

pub mod core;
pub mod config;
pub mod foundation;
pub mod tokens;

pub mod buffer;
pub mod registry;
pub mod topology;
pub mod geometry;
pub mod scene;
pub mod sync;

/// Common imports for users of the crate
pub mod prelude {
    pub use crate::{
        buffer::{BufferArrayRange, BufferSource, RangeHandle, Value},
        config::Config,
        core::{ApplicationConfig, LoggingConfig, SyncConfig},
        registry::{CommitSummary, ResourceRegistry},
        scene::{
            CullStyle, DisplayStyle, Interpolation, Material, MemoryDelegate, MeshData, PrimKey,
            RenderIndex, SceneDelegate,
        },
        sync::{DirtyBits, Mesh, SyncError, SyncReport},
        topology::{MeshTopology, RefinedTopology, SubdivScheme, SubdivTags},
    };
}
