//! Geometry helpers shared by every scene pass

pub mod aabb;
pub mod matrix_operations;

pub use aabb::*;
pub use matrix_operations::*;
