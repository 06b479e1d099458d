//! Buffer array ranges
//!
//! A range is the allocation a prim's buffers are uploaded into. The sync
//! pipeline only talks to ranges through [`BufferArrayRange`]; the in-memory
//! backend below stores the uploaded arrays so commits can be inspected.

use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use bitflags::bitflags;
use parking_lot::RwLock;

use super::types::{BufferData, BufferSpec, TupleType};

bitflags! {
    /// Allocation hints for a range
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct UsageHint: u32 {
        /// Contents never change after the first upload; the range may be shared
        const IMMUTABLE = 1 << 0;
        /// The element count is expected to change between syncs
        const SIZE_VARYING = 1 << 1;
    }
}

/// What a range stores, for diagnostics and allocation bookkeeping
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RangeRole {
    /// Index buffers
    Topology,
    /// Vertex and varying primvars
    VertexPrimvar,
    /// Uniform (per-face) primvars
    ElementPrimvar,
    /// Face-varying primvars
    FaceVaryingPrimvar,
    /// Constant primvars
    ConstantPrimvar,
    /// Per-instance primvars
    InstancePrimvar,
}

/// Range access errors
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum RangeError {
    /// The range was invalidated
    #[error("Range {0} is no longer valid")]
    InvalidRange(u64),

    /// No buffer with that name was allocated
    #[error("Buffer '{name}' is not part of range {range}")]
    UnknownBuffer {
        /// Range id
        range: u64,
        /// Buffer name
        name: String,
    },

    /// The allocated layout differs from the uploaded one
    #[error("Buffer '{name}' expects {expected:?} but received {found:?}")]
    TypeMismatch {
        /// Buffer name
        name: String,
        /// Allocated layout
        expected: TupleType,
        /// Uploaded layout
        found: TupleType,
    },

    /// Storage kind does not match the value type
    #[error("Buffer '{name}' storage does not match its value type")]
    StorageMismatch {
        /// Buffer name
        name: String,
    },

    /// In-place spec changes on an immutable range
    #[error("Range {0} is immutable")]
    Immutable(u64),
}

/// Snapshot of one buffer in a range
#[derive(Debug, Clone, PartialEq)]
pub struct BufferResource {
    /// Name and layout
    pub spec: BufferSpec,
    /// Contents
    pub data: BufferData,
}

impl BufferResource {
    /// Create a resource
    pub fn new(spec: BufferSpec, data: BufferData) -> Self {
        Self { spec, data }
    }

    /// Element count
    pub fn num_elements(&self) -> usize {
        self.data.num_elements(self.spec.tuple_type.count)
    }
}

/// Backend-independent view of an allocation
pub trait BufferArrayRange: Send + Sync + fmt::Debug {
    /// Unique allocation id
    fn id(&self) -> u64;

    /// What the range stores
    fn role(&self) -> RangeRole;

    /// Whether the allocation is still live
    fn is_valid(&self) -> bool;

    /// Allocation hints
    fn usage_hint(&self) -> UsageHint;

    /// Whether the contents may be shared and must never change
    fn is_immutable(&self) -> bool {
        self.usage_hint().contains(UsageHint::IMMUTABLE)
    }

    /// Allocated buffer specs
    fn buffer_specs(&self) -> Vec<BufferSpec>;

    /// Snapshot of one uploaded buffer
    fn resource(&self, name: &str) -> Option<BufferResource>;

    /// Largest element count over the uploaded buffers
    fn num_elements(&self) -> usize;

    /// Upload a buffer into an allocated spec
    fn write(&self, resource: BufferResource) -> Result<(), RangeError>;

    /// Add and remove specs of a mutable range in place
    fn update_specs(&self, added: &[BufferSpec], removed: &[BufferSpec]) -> Result<(), RangeError>;

    /// Release the allocation
    fn invalidate(&self);
}

/// Shared handle to a range
pub type RangeHandle = Arc<dyn BufferArrayRange>;

/// Whether `range` is present and valid
pub fn is_valid_range(range: Option<&RangeHandle>) -> bool {
    range.is_some_and(|range| range.is_valid())
}

/// In-memory range backend
#[derive(Debug)]
pub struct MemoryBufferArrayRange {
    id: u64,
    role: RangeRole,
    usage_hint: UsageHint,
    specs: RwLock<Vec<BufferSpec>>,
    buffers: RwLock<HashMap<String, BufferData>>,
    valid: AtomicBool,
}

impl MemoryBufferArrayRange {
    /// Allocate a range with the given specs
    pub fn new(id: u64, role: RangeRole, specs: Vec<BufferSpec>, usage_hint: UsageHint) -> Self {
        Self {
            id,
            role,
            usage_hint,
            specs: RwLock::new(specs),
            buffers: RwLock::new(HashMap::new()),
            valid: AtomicBool::new(true),
        }
    }

    /// Copy every buffer of `other` whose spec this range also allocates
    pub fn copy_data_from(&self, other: &dyn BufferArrayRange) -> usize {
        let specs = self.specs.read().clone();
        let mut buffers = self.buffers.write();
        let mut copied = 0;
        for spec in &specs {
            if let Some(resource) = other.resource(&spec.name) {
                if resource.spec.tuple_type == spec.tuple_type {
                    buffers.insert(spec.name.clone(), resource.data);
                    copied += 1;
                }
            }
        }
        copied
    }
}

impl BufferArrayRange for MemoryBufferArrayRange {
    fn id(&self) -> u64 {
        self.id
    }

    fn role(&self) -> RangeRole {
        self.role
    }

    fn is_valid(&self) -> bool {
        self.valid.load(Ordering::Acquire)
    }

    fn usage_hint(&self) -> UsageHint {
        self.usage_hint
    }

    fn buffer_specs(&self) -> Vec<BufferSpec> {
        self.specs.read().clone()
    }

    fn resource(&self, name: &str) -> Option<BufferResource> {
        let spec = self.specs.read().iter().find(|spec| spec.name == name)?.clone();
        let data = self.buffers.read().get(name)?.clone();
        Some(BufferResource::new(spec, data))
    }

    fn num_elements(&self) -> usize {
        let specs = self.specs.read();
        let buffers = self.buffers.read();
        specs
            .iter()
            .filter_map(|spec| buffers.get(&spec.name).map(|data| data.num_elements(spec.tuple_type.count)))
            .max()
            .unwrap_or(0)
    }

    fn write(&self, resource: BufferResource) -> Result<(), RangeError> {
        if !self.is_valid() {
            return Err(RangeError::InvalidRange(self.id));
        }
        let specs = self.specs.read();
        let spec = specs
            .iter()
            .find(|spec| spec.name == resource.spec.name)
            .ok_or_else(|| RangeError::UnknownBuffer { range: self.id, name: resource.spec.name.clone() })?;
        if spec.tuple_type != resource.spec.tuple_type {
            return Err(RangeError::TypeMismatch {
                name: resource.spec.name,
                expected: spec.tuple_type,
                found: resource.spec.tuple_type,
            });
        }
        if !resource.data.matches(spec.tuple_type.value_type) {
            return Err(RangeError::StorageMismatch { name: resource.spec.name });
        }
        self.buffers.write().insert(resource.spec.name, resource.data);
        Ok(())
    }

    fn update_specs(&self, added: &[BufferSpec], removed: &[BufferSpec]) -> Result<(), RangeError> {
        if !self.is_valid() {
            return Err(RangeError::InvalidRange(self.id));
        }
        if self.is_immutable() {
            return Err(RangeError::Immutable(self.id));
        }
        let mut specs = self.specs.write();
        let mut buffers = self.buffers.write();
        for spec in removed {
            specs.retain(|s| s.name != spec.name);
            buffers.remove(&spec.name);
        }
        for spec in added {
            let layout_changed = specs
                .iter()
                .any(|s| s.name == spec.name && s.tuple_type != spec.tuple_type);
            if layout_changed {
                buffers.remove(&spec.name);
            }
            BufferSpec::insert_unique(&mut specs, spec.clone());
        }
        Ok(())
    }

    fn invalidate(&self) {
        self.valid.store(false, Ordering::Release);
    }
}
