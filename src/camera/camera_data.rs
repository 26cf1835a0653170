//! Camera data structures - Pure DOP
//!
//! NO METHODS. Just data.
//! All transformations happen in camera_operations.rs

use cgmath::{Matrix4, Point3};

/// Orbit camera looking at a scene center
#[derive(Debug, Clone, Copy)]
pub struct CameraData {
    /// Point the camera orbits and looks at
    pub target: Point3<f32>,

    /// Distance from the target
    pub distance: f32,

    /// Rotation around the Y axis (radians)
    pub yaw_radians: f32,

    /// Elevation above the XZ plane (radians)
    pub pitch_radians: f32,

    /// Field of view (vertical, radians)
    pub fov_radians: f32,

    /// Aspect ratio (width / height)
    pub aspect_ratio: f32,

    pub near_plane: f32,
    pub far_plane: f32,
}

/// Camera uniform buffer data for GPU
/// Must match shader layout exactly
#[repr(C)]
#[derive(Debug, Clone, Copy, bytemuck::Pod, bytemuck::Zeroable)]
pub struct CameraUniform {
    /// View matrix (4x4, column-major)
    pub view_matrix: [[f32; 4]; 4],

    /// Projection matrix (4x4, column-major)
    pub projection_matrix: [[f32; 4]; 4],

    /// Camera position (vec3 + padding)
    pub camera_position: [f32; 4],

    /// Near/far planes (vec2 + padding)
    pub planes: [f32; 4],
}

impl Default for CameraData {
    fn default() -> Self {
        Self {
            target: Point3::new(0.0, 0.0, 0.0),
            distance: 100.0,
            yaw_radians: 45.0_f32.to_radians(),
            pitch_radians: 30.0_f32.to_radians(),
            fov_radians: 25.0_f32.to_radians(),
            aspect_ratio: 4.0 / 3.0,
            near_plane: 1.0,
            far_plane: 1000.0,
        }
    }
}

impl Default for CameraUniform {
    fn default() -> Self {
        Self {
            view_matrix: Matrix4::from_scale(1.0).into(),
            projection_matrix: Matrix4::from_scale(1.0).into(),
            camera_position: [0.0, 0.0, 0.0, 1.0],
            planes: [1.0, 1000.0, 0.0, 0.0],
        }
    }
}
