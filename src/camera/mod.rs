/// Camera Module - Data-Oriented Programming (DOP) style
///
/// - camera_data.rs: Pure data structures with NO methods
/// - camera_operations.rs: Pure functions that operate on data

pub mod camera_data;
pub mod camera_operations;

pub use camera_data::{CameraData, CameraUniform};

pub use camera_operations::{
    build_camera_uniform, build_projection_matrix, build_view_matrix, camera_position,
    frame_sphere, init_camera, rotate, update_aspect_ratio,
};
