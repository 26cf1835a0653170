//! Curve-normal smoothing along conditional lines

pub mod smoother_data;
pub mod smoother_operations;

pub use smoother_data::{ModelSmoothingData, NormalInfo, SmootherData, VertexKey};
pub use smoother_operations::{smooth_groups, smoothing_threshold};
