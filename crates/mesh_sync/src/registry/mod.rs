//! Content-addressed registries and the resource registry
//!
//! [`InstanceRegistry`] maps a content hash to one shared value;
//! [`ResourceRegistry`] bundles the registries the mesh pipeline needs with
//! range allocation and the pending-commit queues.

pub mod instance;
pub mod resource_registry;

pub use instance::{Instance, InstanceRegistry};
pub use resource_registry::{CommitSummary, IndexKind, RegistryStats, ResourceRegistry};
