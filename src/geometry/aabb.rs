/// Data-Oriented Axis-Aligned Bounding Box System
///
/// Pure functions over model bounds - no methods, just data transformations.

use cgmath::{Matrix4, Point3, Transform, Vector3};

/// Axis-Aligned Bounding Box - pure data structure
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AABB {
    pub min: Point3<f32>,
    pub max: Point3<f32>,
}

/// Create new AABB from min/max points
pub fn create_aabb(min: Point3<f32>, max: Point3<f32>) -> AABB {
    AABB { min, max }
}

/// Inverted bounds that any point will grow
pub fn empty_aabb() -> AABB {
    AABB {
        min: Point3::new(f32::MAX, f32::MAX, f32::MAX),
        max: Point3::new(f32::MIN, f32::MIN, f32::MIN),
    }
}

/// True until at least one point has been added
pub fn aabb_is_empty(aabb: &AABB) -> bool {
    aabb.min.x > aabb.max.x || aabb.min.y > aabb.max.y || aabb.min.z > aabb.max.z
}

/// Grow bounds to include a point
pub fn aabb_extend(aabb: &mut AABB, point: Point3<f32>) {
    aabb.min.x = aabb.min.x.min(point.x);
    aabb.min.y = aabb.min.y.min(point.y);
    aabb.min.z = aabb.min.z.min(point.z);
    aabb.max.x = aabb.max.x.max(point.x);
    aabb.max.y = aabb.max.y.max(point.y);
    aabb.max.z = aabb.max.z.max(point.z);
}

/// Get center point of AABB
pub fn aabb_center(aabb: &AABB) -> Point3<f32> {
    Point3::new(
        (aabb.min.x + aabb.max.x) * 0.5,
        (aabb.min.y + aabb.max.y) * 0.5,
        (aabb.min.z + aabb.max.z) * 0.5,
    )
}

/// Get half extents of AABB
pub fn aabb_half_extents(aabb: &AABB) -> Vector3<f32> {
    Vector3::new(
        (aabb.max.x - aabb.min.x) * 0.5,
        (aabb.max.y - aabb.min.y) * 0.5,
        (aabb.max.z - aabb.min.z) * 0.5,
    )
}

/// Full size along each axis
pub fn aabb_size(aabb: &AABB) -> Vector3<f32> {
    aabb.max - aabb.min
}

/// Test if AABB contains a point
pub fn aabb_contains_point(aabb: &AABB, point: Point3<f32>) -> bool {
    point.x >= aabb.min.x && point.x <= aabb.max.x &&
    point.y >= aabb.min.y && point.y <= aabb.max.y &&
    point.z >= aabb.min.z && point.z <= aabb.max.z
}

/// Bounds of the eight transformed corners
pub fn aabb_transformed(aabb: &AABB, matrix: &Matrix4<f32>) -> AABB {
    if aabb_is_empty(aabb) {
        return *aabb;
    }
    let mut result = empty_aabb();
    for i in 0..8 {
        let corner = Point3::new(
            if i & 1 == 0 { aabb.min.x } else { aabb.max.x },
            if i & 2 == 0 { aabb.min.y } else { aabb.max.y },
            if i & 4 == 0 { aabb.min.z } else { aabb.max.z },
        );
        aabb_extend(&mut result, matrix.transform_point(corner));
    }
    result
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extend_from_empty() {
        let mut aabb = empty_aabb();
        assert!(aabb_is_empty(&aabb));
        aabb_extend(&mut aabb, Point3::new(1.0, -2.0, 3.0));
        aabb_extend(&mut aabb, Point3::new(-1.0, 2.0, 0.0));
        assert!(!aabb_is_empty(&aabb));
        assert_eq!(aabb.min, Point3::new(-1.0, -2.0, 0.0));
        assert_eq!(aabb.max, Point3::new(1.0, 2.0, 3.0));
        assert_eq!(aabb_center(&aabb), Point3::new(0.0, 0.0, 1.5));
        assert!(aabb_contains_point(&aabb, Point3::new(0.5, 0.5, 0.5)));
    }

    #[test]
    fn test_transformed_translation() {
        let aabb = create_aabb(Point3::new(0.0, 0.0, 0.0), Point3::new(1.0, 1.0, 1.0));
        let moved = aabb_transformed(&aabb, &Matrix4::from_translation(Vector3::new(5.0, 0.0, 0.0)));
        assert_eq!(moved.min, Point3::new(5.0, 0.0, 0.0));
        assert_eq!(moved.max, Point3::new(6.0, 1.0, 1.0));
        assert_eq!(aabb_half_extents(&moved), Vector3::new(0.5, 0.5, 0.5));
    }
}
