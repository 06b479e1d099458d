//! Math utilities and types
//!
//! Normals and refinement are evaluated in double precision regardless of the
//! storage type of the source buffer.

pub use nalgebra::{Matrix4, Vector3};

/// 3D vector type used by the normal computations
pub type Vec3d = Vector3<f64>;

/// 4x4 matrix type for prim transforms
pub type Mat4d = Matrix4<f64>;

/// Read element `index` of a flat 3-component buffer as a vector
///
/// Returns the zero vector when the element is out of range, so callers
/// handling malformed topology never index past the end.
pub fn vec3_at(values: &[f64], index: usize) -> Vec3d {
    let base = index * 3;
    if base + 2 < values.len() {
        Vec3d::new(values[base], values[base + 1], values[base + 2])
    } else {
        Vec3d::zeros()
    }
}

/// Normalize a vector, leaving degenerate (zero length) vectors untouched
pub fn safe_normalize(v: Vec3d) -> Vec3d {
    let length = v.norm();
    if length > f64::EPSILON {
        v / length
    } else {
        v
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_vec3_at_out_of_range() {
        let values = [1.0, 2.0, 3.0];
        assert_eq!(vec3_at(&values, 0), Vec3d::new(1.0, 2.0, 3.0));
        assert_eq!(vec3_at(&values, 1), Vec3d::zeros());
    }

    #[test]
    fn test_safe_normalize() {
        let n = safe_normalize(Vec3d::new(0.0, 3.0, 4.0));
        assert_relative_eq!(n.norm(), 1.0, epsilon = 1e-12);
        assert_eq!(safe_normalize(Vec3d::zeros()), Vec3d::zeros());
    }
}
