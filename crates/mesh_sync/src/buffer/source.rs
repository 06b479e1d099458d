//! CPU buffer sources
//!
//! Sources are lazy: a computed source only produces its data when
//! [`BufferSource::resolve`] runs, which happens at commit time. Dependencies
//! between sources are resolved recursively by the dependent source.

use std::fmt;
use std::sync::{Arc, OnceLock};

use super::computation::CommitError;
use super::types::{BufferData, BufferSpec, TupleType};
use super::value::Value;
use crate::foundation::hash::ContentHasher;

/// One named array produced by a source
#[derive(Debug, Clone, PartialEq)]
pub struct SourceOutput {
    /// Name and layout of the array
    pub spec: BufferSpec,
    /// The data
    pub data: BufferData,
}

impl SourceOutput {
    /// Create an output
    pub fn new(name: impl Into<String>, tuple_type: TupleType, data: BufferData) -> Self {
        Self { spec: BufferSpec::new(name, tuple_type), data }
    }

    /// Number of elements in the array
    pub fn num_elements(&self) -> usize {
        self.data.num_elements(self.spec.tuple_type.count)
    }
}

/// Write-once storage for resolved outputs
#[derive(Debug, Default)]
pub struct ResolvedOutputs {
    cell: OnceLock<Vec<SourceOutput>>,
}

impl ResolvedOutputs {
    /// Create unresolved storage
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether outputs were stored
    pub fn is_set(&self) -> bool {
        self.cell.get().is_some()
    }

    /// Stored outputs, empty while unresolved
    pub fn get(&self) -> &[SourceOutput] {
        self.cell.get().map_or(&[], Vec::as_slice)
    }

    /// Store outputs; a concurrent resolve that lost the race is discarded
    pub fn set(&self, outputs: Vec<SourceOutput>) {
        let _ = self.cell.set(outputs);
    }
}

/// A lazily computed producer of named buffers
pub trait BufferSource: Send + Sync + fmt::Debug {
    /// Primary buffer name
    fn name(&self) -> &str;

    /// Specs of every buffer this source uploads, known before resolving
    ///
    /// Builder sources that only fill internal tables push nothing.
    fn buffer_specs(&self, specs: &mut Vec<BufferSpec>);

    /// Compute outputs, resolving dependencies first
    fn resolve(&self) -> Result<(), CommitError>;

    /// Whether outputs are available
    fn is_resolved(&self) -> bool;

    /// Resolved outputs, empty before resolving
    fn outputs(&self) -> &[SourceOutput];

    /// Digest of the content this source will produce
    fn content_hash(&self) -> u64;

    /// Element count of the primary output, 0 before resolving
    fn num_elements(&self) -> usize {
        self.outputs().first().map_or(0, SourceOutput::num_elements)
    }

    /// Tuple type of the primary output
    fn tuple_type(&self) -> Option<TupleType> {
        let mut specs = Vec::new();
        self.buffer_specs(&mut specs);
        specs.first().map(|spec| spec.tuple_type)
    }

    /// Resolved data of the primary output
    fn data(&self) -> Option<&BufferData> {
        self.outputs().first().map(|output| &output.data)
    }
}

/// Shared handle to a buffer source
pub type BufferSourceHandle = Arc<dyn BufferSource>;

/// Collect the specs of many sources, later names replacing earlier ones
pub fn collect_buffer_specs(sources: &[BufferSourceHandle], specs: &mut Vec<BufferSpec>) {
    let mut scratch = Vec::new();
    for source in sources {
        scratch.clear();
        source.buffer_specs(&mut scratch);
        for spec in scratch.drain(..) {
            BufferSpec::insert_unique(specs, spec);
        }
    }
}

/// A source holding authored data, resolved from construction
#[derive(Debug, Clone)]
pub struct VtBufferSource {
    output: SourceOutput,
}

impl VtBufferSource {
    /// Wrap explicit data
    pub fn new(name: impl Into<String>, tuple_type: TupleType, data: BufferData) -> Self {
        Self { output: SourceOutput::new(name, tuple_type, data) }
    }

    /// Wrap a delegate value; `None` when the value is empty
    pub fn from_value(name: impl Into<String>, value: &Value) -> Option<Self> {
        let tuple_type = value.tuple_type()?;
        let data = value.to_buffer_data()?;
        Some(Self::new(name, tuple_type, data))
    }

    /// Keep only the first `num_elements` elements
    pub fn truncate(&mut self, num_elements: usize) {
        let components = self.output.spec.tuple_type.count;
        self.output.data.truncate(num_elements * components);
    }

    /// Element count
    pub fn len(&self) -> usize {
        self.output.num_elements()
    }

    /// Whether the source holds no elements
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl BufferSource for VtBufferSource {
    fn name(&self) -> &str {
        &self.output.spec.name
    }

    fn buffer_specs(&self, specs: &mut Vec<BufferSpec>) {
        specs.push(self.output.spec.clone());
    }

    fn resolve(&self) -> Result<(), CommitError> {
        Ok(())
    }

    fn is_resolved(&self) -> bool {
        true
    }

    fn outputs(&self) -> &[SourceOutput] {
        std::slice::from_ref(&self.output)
    }

    fn content_hash(&self) -> u64 {
        let mut hasher = ContentHasher::new();
        hasher.write_str(&self.output.spec.name);
        self.output.spec.tuple_type.hash_into(&mut hasher);
        self.output.data.hash_into(&mut hasher);
        hasher.finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::buffer::types::ValueType;

    fn float3(name: &str, values: Vec<f32>) -> VtBufferSource {
        VtBufferSource::new(name, TupleType::new(ValueType::Float, 3), BufferData::Float(values))
    }

    #[test]
    fn test_vt_source_is_resolved() {
        let source = float3("points", vec![0.0; 9]);
        assert!(source.is_resolved());
        assert_eq!(source.num_elements(), 3);
        assert_eq!(source.tuple_type(), Some(TupleType::new(ValueType::Float, 3)));
    }

    #[test]
    fn test_content_hash_tracks_data_and_name() {
        let a = float3("points", vec![1.0; 9]);
        let b = float3("points", vec![1.0; 9]);
        let c = float3("points", vec![2.0; 9]);
        let d = float3("color", vec![1.0; 9]);
        assert_eq!(a.content_hash(), b.content_hash());
        assert_ne!(a.content_hash(), c.content_hash());
        assert_ne!(a.content_hash(), d.content_hash());
    }

    #[test]
    fn test_truncate_elements() {
        let mut source = float3("points", vec![0.0; 30]);
        source.truncate(8);
        assert_eq!(source.len(), 8);
    }

    #[test]
    fn test_collect_specs_dedupes_names() {
        let sources: Vec<BufferSourceHandle> = vec![
            Arc::new(float3("points", vec![0.0; 3])),
            Arc::new(float3("points", vec![0.0; 3])),
            Arc::new(float3("color", vec![0.0; 3])),
        ];
        let mut specs = Vec::new();
        collect_buffer_specs(&sources, &mut specs);
        assert_eq!(specs.len(), 2);
    }
}
