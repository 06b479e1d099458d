//! Primvar values as handed over by a scene delegate

use nalgebra::{Matrix4, Vector2, Vector3, Vector4};

use super::types::{BufferData, TupleType, ValueType};

/// A typed primvar value
///
/// Scalars describe a single element; arrays describe one element per entry.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum Value {
    /// No value authored
    #[default]
    Empty,
    /// Single float
    Float(f32),
    /// Single double
    Double(f64),
    /// Single int
    Int(i32),
    /// Single float 3-vector
    Vec3f(Vector3<f32>),
    /// Single double 4x4 matrix
    Matrix4d(Matrix4<f64>),
    /// Float array
    FloatArray(Vec<f32>),
    /// Double array
    DoubleArray(Vec<f64>),
    /// Int array
    IntArray(Vec<i32>),
    /// Float 2-vector array
    Vec2fArray(Vec<Vector2<f32>>),
    /// Float 3-vector array
    Vec3fArray(Vec<Vector3<f32>>),
    /// Float 4-vector array
    Vec4fArray(Vec<Vector4<f32>>),
    /// Double 3-vector array
    Vec3dArray(Vec<Vector3<f64>>),
}

impl Value {
    /// Per-element layout, `None` for [`Value::Empty`]
    pub fn tuple_type(&self) -> Option<TupleType> {
        let tuple = match self {
            Self::Empty => return None,
            Self::Float(_) | Self::FloatArray(_) => TupleType::new(ValueType::Float, 1),
            Self::Double(_) | Self::DoubleArray(_) => TupleType::new(ValueType::Double, 1),
            Self::Int(_) | Self::IntArray(_) => TupleType::new(ValueType::Int32, 1),
            Self::Vec2fArray(_) => TupleType::new(ValueType::Float, 2),
            Self::Vec3f(_) | Self::Vec3fArray(_) => TupleType::new(ValueType::Float, 3),
            Self::Vec4fArray(_) => TupleType::new(ValueType::Float, 4),
            Self::Vec3dArray(_) => TupleType::new(ValueType::Double, 3),
            Self::Matrix4d(_) => TupleType::new(ValueType::Double, 16),
        };
        Some(tuple)
    }

    /// Number of elements
    pub fn num_elements(&self) -> usize {
        match self {
            Self::Empty => 0,
            Self::Float(_) | Self::Double(_) | Self::Int(_) | Self::Vec3f(_) | Self::Matrix4d(_) => 1,
            Self::FloatArray(v) => v.len(),
            Self::DoubleArray(v) => v.len(),
            Self::IntArray(v) => v.len(),
            Self::Vec2fArray(v) => v.len(),
            Self::Vec3fArray(v) => v.len(),
            Self::Vec4fArray(v) => v.len(),
            Self::Vec3dArray(v) => v.len(),
        }
    }

    /// Whether the value carries no elements
    pub fn is_empty(&self) -> bool {
        self.num_elements() == 0
    }

    /// Flatten into buffer storage
    pub fn to_buffer_data(&self) -> Option<BufferData> {
        let data = match self {
            Self::Empty => return None,
            Self::Float(x) => BufferData::Float(vec![*x]),
            Self::Double(x) => BufferData::Double(vec![*x]),
            Self::Int(x) => BufferData::Int(vec![*x]),
            Self::Vec3f(v) => BufferData::Float(v.as_slice().to_vec()),
            Self::Matrix4d(m) => BufferData::Double(m.as_slice().to_vec()),
            Self::FloatArray(v) => BufferData::Float(v.clone()),
            Self::DoubleArray(v) => BufferData::Double(v.clone()),
            Self::IntArray(v) => BufferData::Int(v.clone()),
            Self::Vec2fArray(v) => BufferData::Float(v.iter().flat_map(|e| [e.x, e.y]).collect()),
            Self::Vec3fArray(v) => BufferData::Float(v.iter().flat_map(|e| [e.x, e.y, e.z]).collect()),
            Self::Vec4fArray(v) => {
                BufferData::Float(v.iter().flat_map(|e| [e.x, e.y, e.z, e.w]).collect())
            }
            Self::Vec3dArray(v) => BufferData::Double(v.iter().flat_map(|e| [e.x, e.y, e.z]).collect()),
        };
        Some(data)
    }
}

impl From<Vec<Vector3<f32>>> for Value {
    fn from(values: Vec<Vector3<f32>>) -> Self {
        Self::Vec3fArray(values)
    }
}

impl From<Vec<f32>> for Value {
    fn from(values: Vec<f32>) -> Self {
        Self::FloatArray(values)
    }
}

impl From<Vec<Vector2<f32>>> for Value {
    fn from(values: Vec<Vector2<f32>>) -> Self {
        Self::Vec2fArray(values)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_vec3f_array_layout() {
        let value = Value::from(vec![Vector3::new(1.0_f32, 2.0, 3.0), Vector3::new(4.0, 5.0, 6.0)]);
        assert_eq!(value.num_elements(), 2);
        assert_eq!(value.tuple_type(), Some(TupleType::new(ValueType::Float, 3)));
        assert_eq!(
            value.to_buffer_data(),
            Some(BufferData::Float(vec![1.0, 2.0, 3.0, 4.0, 5.0, 6.0]))
        );
    }

    #[test]
    fn test_empty_values() {
        assert!(Value::Empty.is_empty());
        assert!(Value::FloatArray(Vec::new()).is_empty());
        assert!(Value::Empty.tuple_type().is_none());
        assert!(!Value::Float(1.0).is_empty());
    }

    #[test]
    fn test_matrix_is_one_element() {
        let value = Value::Matrix4d(Matrix4::identity());
        assert_eq!(value.num_elements(), 1);
        assert_eq!(value.to_buffer_data().map(|d| d.len()), Some(16));
    }
}
