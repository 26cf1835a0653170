//! Matrix Operations - Pure DOP Functions
//!
//! Helpers for baking transforms into raw `[f32; 3]` vertex arrays.

use cgmath::{InnerSpace, Matrix, Matrix3, Matrix4, Point3, SquareMatrix, Transform, Vector3, Zero};

use super::aabb::{aabb_center, aabb_size, AABB};

/// Transform a position by a full affine matrix
#[inline]
pub fn transform_point(matrix: &Matrix4<f32>, point: [f32; 3]) -> [f32; 3] {
    matrix.transform_point(Point3::from(point)).into()
}

/// Upper 3x3 of an affine matrix
pub fn linear_part(matrix: &Matrix4<f32>) -> Matrix3<f32> {
    Matrix3::from_cols(
        matrix.x.truncate(),
        matrix.y.truncate(),
        matrix.z.truncate(),
    )
}

/// Determinant of the linear part. Negative means the transform mirrors.
#[inline]
pub fn linear_determinant(matrix: &Matrix4<f32>) -> f32 {
    linear_part(matrix).determinant()
}

#[inline]
pub fn is_mirror_matrix(matrix: &Matrix4<f32>) -> bool {
    linear_determinant(matrix) < 0.0
}

/// Inverse-transpose of the linear part, used for normals.
/// Singular matrices fall back to the plain linear part.
pub fn normal_matrix(matrix: &Matrix4<f32>) -> Matrix3<f32> {
    let linear = linear_part(matrix);
    match linear.invert() {
        Some(inverse) => inverse.transpose(),
        None => linear,
    }
}

/// Transform and renormalize a normal. Zero normals stay zero.
pub fn transform_normal(normal_matrix: &Matrix3<f32>, normal: [f32; 3]) -> [f32; 3] {
    let n = normal_matrix * Vector3::from(normal);
    if n.magnitude2() > 0.0 {
        n.normalize().into()
    } else {
        Vector3::zero().into()
    }
}

/// Scale about the bounds center that pulls every face in by `amount`.
/// Axes thinner than `2 * amount` are left alone.
pub fn shrink_matrix(bounds: &AABB, amount: f32) -> Matrix4<f32> {
    let size = aabb_size(bounds);
    let center = aabb_center(bounds);
    let axis_scale = |extent: f32| {
        if extent > amount * 2.0 {
            (extent - amount * 2.0) / extent
        } else {
            1.0
        }
    };
    let scale = Vector3::new(axis_scale(size.x), axis_scale(size.y), axis_scale(size.z));
    let offset = Vector3::new(
        center.x * (1.0 - scale.x),
        center.y * (1.0 - scale.y),
        center.z * (1.0 - scale.z),
    );
    Matrix4::from_translation(offset) * Matrix4::from_nonuniform_scale(scale.x, scale.y, scale.z)
}

/// Pre-compensate a normal for a later shrink so that the inverse-transpose
/// of `shrink` maps it back onto its original direction and length.
pub fn unshrink_normal(shrink: &Matrix4<f32>, normal: [f32; 3]) -> [f32; 3] {
    let linear = linear_part(shrink);
    (linear.transpose() * Vector3::from(normal)).into()
}

/// Flat face normal of a triangle, following `(p1 - p2) x (p1 - p0)`.
pub fn face_normal(p0: [f32; 3], p1: [f32; 3], p2: [f32; 3]) -> [f32; 3] {
    let a = Vector3::from(p1) - Vector3::from(p2);
    let b = Vector3::from(p1) - Vector3::from(p0);
    let n = a.cross(b);
    if n.magnitude2() > 0.0 {
        n.normalize().into()
    } else {
        n.into()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::aabb::create_aabb;

    #[test]
    fn test_mirror_detection() {
        assert!(!is_mirror_matrix(&Matrix4::identity()));
        assert!(is_mirror_matrix(&Matrix4::from_nonuniform_scale(-1.0, 1.0, 1.0)));
    }

    #[test]
    fn test_normal_matrix_nonuniform_scale() {
        let m = Matrix4::from_nonuniform_scale(2.0, 1.0, 1.0);
        let n = transform_normal(&normal_matrix(&m), [1.0, 1.0, 0.0]);
        let expected = Vector3::new(0.5, 1.0, 0.0).normalize();
        assert!((Vector3::from(n) - expected).magnitude() < 1e-5);
    }

    #[test]
    fn test_shrink_keeps_center_fixed() {
        let bounds = create_aabb(Point3::new(0.0, 0.0, 0.0), Point3::new(10.0, 4.0, 0.5));
        let m = shrink_matrix(&bounds, 1.0);
        let center = m.transform_point(Point3::new(5.0, 2.0, 0.25));
        assert!((center - Point3::new(5.0, 2.0, 0.25)).magnitude() < 1e-5);
        let corner = m.transform_point(Point3::new(10.0, 4.0, 0.5));
        assert!((corner.x - 9.0).abs() < 1e-5);
        assert!((corner.y - 3.0).abs() < 1e-5);
        // Too thin to shrink.
        assert!((corner.z - 0.5).abs() < 1e-5);
    }

    #[test]
    fn test_unshrink_round_trip() {
        let bounds = create_aabb(Point3::new(0.0, 0.0, 0.0), Point3::new(10.0, 4.0, 2.0));
        let m = shrink_matrix(&bounds, 0.5);
        let original = Vector3::new(0.3, 0.4, 0.5);
        let stored = unshrink_normal(&m, original.into());
        let restored = normal_matrix(&m) * Vector3::from(stored);
        assert!((restored - original).magnitude() < 1e-5);
    }

    #[test]
    fn test_face_normal_ccw() {
        let n = face_normal([0.0, 0.0, 0.0], [1.0, 0.0, 0.0], [0.0, 1.0, 0.0]);
        assert!((n[2].abs() - 1.0).abs() < 1e-6);
    }
}
