//! Buffer descriptions, CPU buffer sources, buffer ranges and GPU computations
//!
//! A [`BufferSource`] produces named tuple arrays on the CPU; a
//! [`BufferArrayRange`] is the (possibly shared) allocation those arrays are
//! uploaded into; a [`Computation`] transforms range contents in place at
//! commit time.

pub mod types;
pub mod value;
pub mod source;
pub mod range;
pub mod computation;

pub use types::{BufferData, BufferSpec, TupleType, ValueType};
pub use value::Value;
pub use source::{
    collect_buffer_specs, BufferSource, BufferSourceHandle, ResolvedOutputs, SourceOutput,
    VtBufferSource,
};
pub use range::{
    is_valid_range, BufferArrayRange, BufferResource, MemoryBufferArrayRange, RangeError,
    RangeHandle, RangeRole, UsageHint,
};
pub use computation::{collect_computation_specs, CommitError, Computation, ComputationHandle};
