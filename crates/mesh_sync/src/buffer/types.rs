//! Tuple types, buffer specs and flat buffer storage

use crate::foundation::hash::ContentHasher;

/// Scalar component type of a buffer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ValueType {
    /// 32-bit float
    Float,
    /// 64-bit float
    Double,
    /// 32-bit signed integer
    Int32,
    /// 32-bit unsigned integer
    UInt32,
    /// Signed 2_10_10_10 normal packed into one i32
    PackedInt2_10_10_10,
}

impl ValueType {
    /// Size of one component in bytes
    pub const fn size_in_bytes(self) -> usize {
        match self {
            Self::Double => 8,
            Self::Float | Self::Int32 | Self::UInt32 | Self::PackedInt2_10_10_10 => 4,
        }
    }

    /// Stable name, fed to content hashes
    pub const fn name(self) -> &'static str {
        match self {
            Self::Float => "float",
            Self::Double => "double",
            Self::Int32 => "int",
            Self::UInt32 => "uint",
            Self::PackedInt2_10_10_10 => "packedInt2_10_10_10",
        }
    }
}

/// A value type repeated `count` times per element
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TupleType {
    /// Component type
    pub value_type: ValueType,
    /// Components per element
    pub count: usize,
}

impl TupleType {
    /// Create a tuple type
    pub const fn new(value_type: ValueType, count: usize) -> Self {
        Self { value_type, count }
    }

    /// Size of one element in bytes
    pub const fn size_in_bytes(self) -> usize {
        self.value_type.size_in_bytes() * self.count
    }

    pub(crate) fn hash_into(self, hasher: &mut ContentHasher) {
        hasher.write_str(self.value_type.name()).write_u64(self.count as u64);
    }
}

/// Name and tuple type of one buffer inside a range
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct BufferSpec {
    /// Buffer name (primvar name or generated name)
    pub name: String,
    /// Per-element layout
    pub tuple_type: TupleType,
}

impl BufferSpec {
    /// Create a buffer spec
    pub fn new(name: impl Into<String>, tuple_type: TupleType) -> Self {
        Self { name: name.into(), tuple_type }
    }

    /// Whether every spec in `subset` appears in `superset`
    pub fn is_subset(subset: &[Self], superset: &[Self]) -> bool {
        subset.iter().all(|spec| superset.contains(spec))
    }

    /// Union of two spec lists; later entries replace earlier ones with the same name
    pub fn union(a: &[Self], b: &[Self]) -> Vec<Self> {
        let mut result = a.to_vec();
        for spec in b {
            Self::insert_unique(&mut result, spec.clone());
        }
        result
    }

    /// Specs of `a` whose names do not appear in `b`
    pub fn difference(a: &[Self], b: &[Self]) -> Vec<Self> {
        a.iter()
            .filter(|spec| !b.iter().any(|other| other.name == spec.name))
            .cloned()
            .collect()
    }

    /// Insert a spec, replacing any existing spec with the same name
    pub fn insert_unique(specs: &mut Vec<Self>, spec: Self) {
        if let Some(existing) = specs.iter_mut().find(|s| s.name == spec.name) {
            *existing = spec;
        } else {
            specs.push(spec);
        }
    }
}

/// Flat storage for buffer contents
///
/// The layout (components per element) is carried separately by the
/// [`TupleType`] of the owning buffer.
#[derive(Debug, Clone, PartialEq)]
pub enum BufferData {
    /// f32 components
    Float(Vec<f32>),
    /// f64 components
    Double(Vec<f64>),
    /// i32 components (also packed normals)
    Int(Vec<i32>),
    /// u32 components
    UInt(Vec<u32>),
}

impl BufferData {
    /// Number of scalar components stored
    pub fn len(&self) -> usize {
        match self {
            Self::Float(v) => v.len(),
            Self::Double(v) => v.len(),
            Self::Int(v) => v.len(),
            Self::UInt(v) => v.len(),
        }
    }

    /// Whether no components are stored
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Number of elements for a tuple of `components`
    pub fn num_elements(&self, components: usize) -> usize {
        if components == 0 {
            0
        } else {
            self.len() / components
        }
    }

    /// Keep only the first `scalars` components
    pub fn truncate(&mut self, scalars: usize) {
        match self {
            Self::Float(v) => v.truncate(scalars),
            Self::Double(v) => v.truncate(scalars),
            Self::Int(v) => v.truncate(scalars),
            Self::UInt(v) => v.truncate(scalars),
        }
    }

    /// Components widened to f64 for computation kernels
    pub fn to_f64(&self) -> Vec<f64> {
        match self {
            Self::Float(v) => v.iter().map(|&x| f64::from(x)).collect(),
            Self::Double(v) => v.clone(),
            Self::Int(v) => v.iter().map(|&x| f64::from(x)).collect(),
            Self::UInt(v) => v.iter().map(|&x| f64::from(x)).collect(),
        }
    }

    /// Narrow kernel output back to the storage of `value_type`
    pub fn from_f64(values: Vec<f64>, value_type: ValueType) -> Self {
        match value_type {
            ValueType::Float => Self::Float(values.into_iter().map(|x| x as f32).collect()),
            ValueType::Double => Self::Double(values),
            ValueType::Int32 | ValueType::PackedInt2_10_10_10 => {
                Self::Int(values.into_iter().map(|x| x.round() as i32).collect())
            }
            ValueType::UInt32 => Self::UInt(values.into_iter().map(|x| x.round() as u32).collect()),
        }
    }

    /// Copy of the components in `start..end` (clamped to the stored length)
    pub fn slice(&self, start: usize, end: usize) -> Self {
        let end = end.min(self.len());
        let start = start.min(end);
        match self {
            Self::Float(v) => Self::Float(v[start..end].to_vec()),
            Self::Double(v) => Self::Double(v[start..end].to_vec()),
            Self::Int(v) => Self::Int(v[start..end].to_vec()),
            Self::UInt(v) => Self::UInt(v[start..end].to_vec()),
        }
    }

    /// Feed the raw contents to a content hasher
    pub fn hash_into(&self, hasher: &mut ContentHasher) {
        match self {
            Self::Float(v) => hasher.write_f32_slice(v),
            Self::Double(v) => hasher.write_f64_slice(v),
            Self::Int(v) => hasher.write_i32_slice(v),
            Self::UInt(v) => hasher.write_u32_slice(v),
        };
    }

    /// Whether this storage can hold components of `value_type`
    pub fn matches(&self, value_type: ValueType) -> bool {
        matches!(
            (self, value_type),
            (Self::Float(_), ValueType::Float)
                | (Self::Double(_), ValueType::Double)
                | (Self::Int(_), ValueType::Int32 | ValueType::PackedInt2_10_10_10)
                | (Self::UInt(_), ValueType::UInt32)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn spec(name: &str, count: usize) -> BufferSpec {
        BufferSpec::new(name, TupleType::new(ValueType::Float, count))
    }

    #[test]
    fn test_subset() {
        let superset = vec![spec("points", 3), spec("color", 3)];
        assert!(BufferSpec::is_subset(&[spec("points", 3)], &superset));
        assert!(!BufferSpec::is_subset(&[spec("points", 4)], &superset));
        assert!(BufferSpec::is_subset(&[], &superset));
    }

    #[test]
    fn test_union_replaces_by_name() {
        let merged = BufferSpec::union(&[spec("points", 3)], &[spec("points", 4), spec("uv", 2)]);
        assert_eq!(merged, vec![spec("points", 4), spec("uv", 2)]);
    }

    #[test]
    fn test_difference_by_name() {
        let a = vec![spec("points", 3), spec("color", 3)];
        let b = vec![spec("color", 4)];
        assert_eq!(BufferSpec::difference(&a, &b), vec![spec("points", 3)]);
    }

    #[test]
    fn test_truncate_and_elements() {
        let mut data = BufferData::Float((0..30).map(|x| x as f32).collect());
        assert_eq!(data.num_elements(3), 10);
        data.truncate(24);
        assert_eq!(data.num_elements(3), 8);
    }

    #[test]
    fn test_f64_round_trip_keeps_storage_kind() {
        let data = BufferData::Int(vec![1, -2, 3]);
        let back = BufferData::from_f64(data.to_f64(), ValueType::Int32);
        assert_eq!(back, data);
        assert!(back.matches(ValueType::PackedInt2_10_10_10));
        assert!(!back.matches(ValueType::Float));
    }
}
