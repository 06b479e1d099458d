//! Scene side of the sync: delegates, materials, reprs, draw items and the
//! render index that owns the prims

pub mod primvar;
pub mod delegate;
pub mod material;
pub mod repr;
pub mod draw_item;
pub mod change_tracker;
pub mod memory_delegate;
pub mod render_index;

pub use change_tracker::{ChangeTracker, PrimKey};
pub use delegate::{CullStyle, DisplayStyle, SceneDelegate};
pub use draw_item::{DrawItem, DrawingCoord, Repr, SharedData};
pub use material::{Material, MaterialCapabilities, MaterialFlags, MaterialMap, DEFAULT_MATERIAL_TAG};
pub use memory_delegate::{InstancerData, MemoryDelegate, MeshData};
pub use primvar::{Interpolation, PrimvarDescriptor, PrimvarRole};
pub use render_index::RenderIndex;
pub use repr::{GeomStyle, MeshReprDesc, ShadingTerminal};
