//! GPU computations
//!
//! A computation runs against a range at commit time, after every pending
//! source has been uploaded. Computations registered against the same range
//! run in registration order, so a normals computation followed by a refine
//! computation sees the normals it just produced.

use std::fmt;
use std::sync::Arc;

use super::range::{BufferArrayRange, RangeError};
use super::types::BufferSpec;

/// Commit-time failures
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum CommitError {
    /// A source could not produce its data
    #[error("Buffer source '{name}' could not be resolved: {reason}")]
    UnresolvedSource {
        /// Source name
        name: String,
        /// Why resolution failed
        reason: String,
    },

    /// A computation input buffer was never uploaded
    #[error("Computation input '{name}' is missing from range {range}")]
    MissingInput {
        /// Range id
        range: u64,
        /// Input buffer name
        name: String,
    },

    /// Upload failure
    #[error(transparent)]
    Range(#[from] RangeError),
}

/// A transformation of range contents executed at commit time
pub trait Computation: Send + Sync + fmt::Debug {
    /// Name of the buffer written
    fn name(&self) -> &str;

    /// Specs of the buffers this computation writes
    fn buffer_specs(&self, specs: &mut Vec<BufferSpec>);

    /// Run against `range`
    fn execute(&self, range: &dyn BufferArrayRange) -> Result<(), CommitError>;

    /// Digest identifying the work, for primvar sharing ids
    fn content_hash(&self) -> u64;
}

/// Shared handle to a computation
pub type ComputationHandle = Arc<dyn Computation>;

/// Collect the specs written by many computations
pub fn collect_computation_specs(computations: &[ComputationHandle], specs: &mut Vec<BufferSpec>) {
    let mut scratch = Vec::new();
    for computation in computations {
        scratch.clear();
        computation.buffer_specs(&mut scratch);
        for spec in scratch.drain(..) {
            BufferSpec::insert_unique(specs, spec);
        }
    }
}
