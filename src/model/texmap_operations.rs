//! Texmap Operations - Pure DOP Functions
//!
//! Texture coordinates for planar, cylindrical and spherical projections.
//! A region is defined by three points: for planar maps the origin and the
//! ends of the s and t axes, for cylinders the base center, the top center
//! and a point on the seam, for spheres the center, a point on the equator
//! seam and the pole direction.

use std::f32::consts::FRAC_PI_2;

use cgmath::{InnerSpace, Matrix4, Vector3};

use super::model_data::{TexmapFrame, TexmapInfo, TexmapProjection};
use crate::geometry::transform_point;

fn v(p: [f32; 3]) -> Vector3<f32> {
    Vector3::from(p)
}

fn unit(p: Vector3<f32>) -> Vector3<f32> {
    if p.magnitude2() == 0.0 {
        p
    } else {
        p.normalize()
    }
}

/// Direction from the axis through `origin` along `normal` to `point`
fn direction_from(point: Vector3<f32>, origin: Vector3<f32>, normal: Vector3<f32>) -> Vector3<f32> {
    let ap = point - origin;
    let scale = normal.dot(normal);
    if scale == 0.0 {
        return unit(ap);
    }
    let projected = origin + normal * (ap.dot(normal) / scale);
    unit(point - projected)
}

pub fn texmap_frame(projection: TexmapProjection, points: &[[f32; 3]; 3]) -> TexmapFrame {
    let (p0, p1, p2) = (v(points[0]), v(points[1]), v(points[2]));
    match projection {
        TexmapProjection::Planar => TexmapFrame {
            origin: points[0],
            ..Default::default()
        },
        TexmapProjection::Cylindrical { sweep_degrees } => {
            let axis = p0 - p1;
            let height = axis.magnitude();
            let normal = if height > 0.0 { axis / height } else { axis };
            TexmapFrame {
                origin: points[0],
                normal: normal.into(),
                normal2: [0.0; 3],
                dir: direction_from(p2, p0, normal).into(),
                height,
                s_angle: sweep_degrees.to_radians(),
                t_angle: 0.0,
            }
        }
        TexmapProjection::Spherical { sweep_degrees } => {
            let normal = -unit((p0 - p1).cross(p2 - p1));
            TexmapFrame {
                origin: points[0],
                normal: normal.into(),
                normal2: unit(normal.cross(p1 - p0)).into(),
                dir: unit(p1 - p0).into(),
                height: 0.0,
                s_angle: sweep_degrees[0].to_radians(),
                t_angle: sweep_degrees[1].to_radians(),
            }
        }
    }
}

/// Start a region with an empty geometry set
pub fn create_texmap_info(
    texture: &str,
    projection: TexmapProjection,
    points: [[f32; 3]; 3],
    sub_model_offset: usize,
) -> TexmapInfo {
    TexmapInfo {
        texture: texture.to_string(),
        projection,
        points,
        frame: texmap_frame(projection, &points),
        sub_model_offset,
        sub_model_count: 0,
        geometry: Default::default(),
    }
}

/// Copy of `info` with its defining points moved by `matrix`
pub fn transform_texmap(info: &TexmapInfo, matrix: &Matrix4<f32>) -> TexmapInfo {
    let points = info.points.map(|p| transform_point(matrix, p));
    TexmapInfo {
        points,
        frame: texmap_frame(info.projection, &points),
        ..info.clone()
    }
}

/// Slot of a geometry set for a group
#[inline]
pub fn geometry_slot(colored: bool, bfc: bool) -> usize {
    (colored as usize) * 2 + bfc as usize
}

fn planar_coords(info: &TexmapInfo, points: &[[f32; 3]; 3]) -> [[f32; 2]; 3] {
    let p0 = v(info.points[0]);
    let s_axis = v(info.points[1]) - p0;
    let t_axis = v(info.points[2]) - p0;
    let (s_len, t_len) = (s_axis.magnitude(), t_axis.magnitude());
    points.map(|p| {
        let d = v(p) - p0;
        let s = if s_len > 0.0 { s_axis.dot(d) / (s_len * s_len) } else { 0.0 };
        let t = if t_len > 0.0 { t_axis.dot(d) / (t_len * t_len) } else { 0.0 };
        [s, t]
    })
}

/// Angle around the axis. The first point of a triangle sets the base
/// direction so later corners never wrap across the seam.
fn s_angle(
    frame: &TexmapFrame,
    point: Vector3<f32>,
    base: &mut Option<(Vector3<f32>, f32)>,
) -> f32 {
    let (origin, normal, dir) = (v(frame.origin), v(frame.normal), v(frame.dir));
    let current = direction_from(point, origin, normal);
    match *base {
        None => {
            let angle = dir.cross(current).dot(normal).atan2(current.dot(dir));
            *base = Some((current, angle));
            angle
        }
        Some((base_dir, base_angle)) => {
            base_dir.cross(current).dot(normal).atan2(current.dot(base_dir)) + base_angle
        }
    }
}

fn cylindrical_coords(frame: &TexmapFrame, points: &[[f32; 3]; 3]) -> [[f32; 2]; 3] {
    let mut base = None;
    let mut coords = [[0.0; 2]; 3];
    for (i, p) in points.iter().enumerate() {
        let point = v(*p);
        let u = if frame.s_angle != 0.0 {
            0.5 + s_angle(frame, point, &mut base) / frame.s_angle
        } else {
            0.5
        };
        let t = if frame.height > 0.0 {
            v(frame.normal).dot(v(frame.origin) - point) / frame.height
        } else {
            0.0
        };
        coords[i] = [u, t];
    }
    coords
}

fn spherical_coords(frame: &TexmapFrame, points: &[[f32; 3]; 3]) -> [[f32; 2]; 3] {
    let (origin, normal, normal2, dir) = (
        v(frame.origin),
        v(frame.normal),
        v(frame.normal2),
        v(frame.dir),
    );
    let mut base = None;
    let mut coords = [[0.0; 2]; 3];
    let mut poles = Vec::new();
    let mut s_sum = 0.0;
    for (i, p) in points.iter().enumerate() {
        let point = v(*p);
        let point_dir = unit(point - origin);
        let north = (point_dir - normal).magnitude() < 1e-5;
        let south = !north && (point_dir + normal).magnitude() < 1e-5;
        let (s, t) = if north || south {
            poles.push(i);
            (0.0, if north { -FRAC_PI_2 } else { FRAC_PI_2 })
        } else {
            let s = s_angle(frame, point, &mut base);
            s_sum += s;
            // Rotate back to zero longitude before measuring latitude.
            let theta = -s;
            let rotated = unit(
                point_dir * theta.cos()
                    + normal.cross(point_dir) * theta.sin()
                    + normal * normal.dot(point_dir) * (1.0 - theta.cos()),
            );
            (s, dir.cross(rotated).dot(normal2).atan2(rotated.dot(dir)))
        };
        let u = if frame.s_angle != 0.0 { 0.5 + s / frame.s_angle } else { 0.5 };
        let w = if frame.t_angle != 0.0 { 0.5 + t / frame.t_angle } else { 0.5 };
        coords[i] = [u, w];
    }
    // A pole takes the average longitude of the other corners.
    if !poles.is_empty() && poles.len() < 3 && frame.s_angle != 0.0 {
        let average = 0.5 + s_sum / (3 - poles.len()) as f32 / frame.s_angle;
        for i in poles {
            coords[i][0] = average;
        }
    }
    coords
}

/// Texture coordinates of one world-space triangle
pub fn texture_coords(info: &TexmapInfo, points: &[[f32; 3]; 3]) -> [[f32; 2]; 3] {
    match info.projection {
        TexmapProjection::Planar => planar_coords(info, points),
        TexmapProjection::Cylindrical { .. } => cylindrical_coords(&info.frame, points),
        TexmapProjection::Spherical { .. } => spherical_coords(&info.frame, points),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cgmath::Vector3 as V3;

    fn close(a: [f32; 2], b: [f32; 2]) -> bool {
        (a[0] - b[0]).abs() < 1e-4 && (a[1] - b[1]).abs() < 1e-4
    }

    #[test]
    fn test_planar_unit_square() {
        let info = create_texmap_info(
            "logo.png",
            TexmapProjection::Planar,
            [[0.0, 0.0, 0.0], [2.0, 0.0, 0.0], [0.0, 4.0, 0.0]],
            0,
        );
        let uv = texture_coords(&info, &[[0.0, 0.0, 0.0], [2.0, 0.0, 0.0], [1.0, 2.0, 5.0]]);
        assert!(close(uv[0], [0.0, 0.0]));
        assert!(close(uv[1], [1.0, 0.0]));
        assert!(close(uv[2], [0.5, 0.5]));
    }

    #[test]
    fn test_cylindrical_seam_and_height() {
        let info = create_texmap_info(
            "label.png",
            TexmapProjection::Cylindrical { sweep_degrees: 360.0 },
            [[0.0, 0.0, 0.0], [0.0, -10.0, 0.0], [1.0, 0.0, 0.0]],
            0,
        );
        let uv = texture_coords(&info, &[[1.0, 0.0, 0.0], [1.0, -5.0, 0.0], [1.0, -10.0, 0.0]]);
        assert!(close(uv[0], [0.5, 0.0]));
        assert!(close(uv[1], [0.5, 0.5]));
        assert!(close(uv[2], [0.5, 1.0]));
    }

    #[test]
    fn test_transform_moves_region() {
        let info = create_texmap_info(
            "logo.png",
            TexmapProjection::Planar,
            [[0.0, 0.0, 0.0], [1.0, 0.0, 0.0], [0.0, 1.0, 0.0]],
            0,
        );
        let moved = transform_texmap(&info, &Matrix4::from_translation(V3::new(5.0, 0.0, 0.0)));
        assert_eq!(moved.points[0], [5.0, 0.0, 0.0]);
        let uv = texture_coords(&moved, &[[5.0, 0.0, 0.0], [6.0, 0.0, 0.0], [5.0, 1.0, 0.0]]);
        assert!(close(uv[1], [1.0, 0.0]));
        assert!(close(uv[2], [0.0, 1.0]));
    }

    #[test]
    fn test_spherical_pole_takes_average_longitude() {
        let info = create_texmap_info(
            "globe.png",
            TexmapProjection::Spherical {
                sweep_degrees: [360.0, 180.0],
            },
            [[0.0, 0.0, 0.0], [1.0, 0.0, 0.0], [0.0, 0.0, 1.0]],
            0,
        );
        let pole: [f32; 3] = info.frame.normal;
        let uv = texture_coords(&info, &[[1.0, 0.0, 0.0], [0.0, 0.0, 1.0], pole]);
        assert!((uv[2][0] - (uv[0][0] + uv[1][0]) / 2.0).abs() < 1e-4);
        assert!((uv[2][1] - 0.0).abs() < 1e-4);
    }
}
