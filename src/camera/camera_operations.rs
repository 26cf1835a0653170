//! Camera operations - Pure DOP functions
//!
//! All functions are pure: they take data, return new data, no side effects.

use super::camera_data::{CameraData, CameraUniform};
use cgmath::{Matrix4, Point3, Rad, Vector3};

/// Camera with default angles looking at `target`
pub fn init_camera(target: Point3<f32>, distance: f32) -> CameraData {
    CameraData {
        target,
        distance,
        ..Default::default()
    }
}

/// Eye position on the orbit
pub fn camera_position(camera: &CameraData) -> Point3<f32> {
    let (sin_yaw, cos_yaw) = camera.yaw_radians.sin_cos();
    let (sin_pitch, cos_pitch) = camera.pitch_radians.sin_cos();
    let offset = Vector3::new(cos_pitch * sin_yaw, sin_pitch, cos_pitch * cos_yaw);
    camera.target + offset * camera.distance
}

pub fn build_view_matrix(camera: &CameraData) -> Matrix4<f32> {
    Matrix4::look_at_rh(camera_position(camera), camera.target, Vector3::new(0.0, 1.0, 0.0))
}

pub fn build_projection_matrix(camera: &CameraData) -> Matrix4<f32> {
    cgmath::perspective(
        Rad(camera.fov_radians),
        camera.aspect_ratio,
        camera.near_plane,
        camera.far_plane,
    )
}

/// Build camera uniform for GPU
pub fn build_camera_uniform(camera: &CameraData) -> CameraUniform {
    let eye = camera_position(camera);
    CameraUniform {
        view_matrix: build_view_matrix(camera).into(),
        projection_matrix: build_projection_matrix(camera).into(),
        camera_position: [eye.x, eye.y, eye.z, 1.0],
        planes: [camera.near_plane, camera.far_plane, 0.0, 0.0],
    }
}

/// Move back until a sphere of `radius` around `center` fits the narrower
/// field of view, and pull the clip planes around it
pub fn frame_sphere(camera: &CameraData, center: Point3<f32>, radius: f32) -> CameraData {
    let vertical = camera.fov_radians / 2.0;
    let horizontal = (vertical.tan() * camera.aspect_ratio).atan();
    let half_angle = vertical.min(horizontal);
    let radius = radius.max(f32::EPSILON);
    let distance = radius / half_angle.sin();
    CameraData {
        target: center,
        distance,
        near_plane: (distance - radius).max(distance * 0.001),
        far_plane: distance + radius,
        ..*camera
    }
}

/// Update aspect ratio (e.g., on window resize)
pub fn update_aspect_ratio(camera: &CameraData, width: u32, height: u32) -> CameraData {
    let mut new_camera = *camera;
    new_camera.aspect_ratio = width as f32 / height.max(1) as f32;
    new_camera
}

/// Orbit by the given angle deltas. Pitch stops short of the poles.
pub fn rotate(camera: &CameraData, yaw_delta: f32, pitch_delta: f32) -> CameraData {
    let limit = 89.0_f32.to_radians();
    let mut new_camera = *camera;
    new_camera.yaw_radians += yaw_delta;
    new_camera.pitch_radians = (camera.pitch_radians + pitch_delta).clamp(-limit, limit);
    new_camera
}

#[cfg(test)]
mod tests {
    use super::*;
    use cgmath::{InnerSpace, Transform};

    #[test]
    fn test_frame_sphere_fits_radius() {
        let camera = frame_sphere(&CameraData::default(), Point3::new(0.0, 0.0, 0.0), 10.0);
        let eye = camera_position(&camera);
        assert!(((eye - camera.target).magnitude() - camera.distance).abs() < 1e-3);
        assert!(camera.near_plane < camera.distance - 9.9);
        assert!((camera.far_plane - camera.distance - 10.0).abs() < 1e-3);
    }

    #[test]
    fn test_view_matrix_centers_target() {
        let camera = init_camera(Point3::new(5.0, 0.0, 0.0), 50.0);
        let eye_space = build_view_matrix(&camera).transform_point(camera.target);
        assert!(eye_space.x.abs() < 1e-3 && eye_space.y.abs() < 1e-3);
        assert!((eye_space.z + 50.0).abs() < 1e-2);
    }

    #[test]
    fn test_rotate_clamps_pitch_and_uniform_is_pod() {
        let camera = rotate(&CameraData::default(), 0.5, 10.0);
        assert!(camera.pitch_radians < std::f32::consts::FRAC_PI_2);
        let uniform = build_camera_uniform(&camera);
        assert_eq!(bytemuck::bytes_of(&uniform).len(), std::mem::size_of::<CameraUniform>());
    }
}
