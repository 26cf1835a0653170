//! Vertex Store Data - Pure DOP
//!
//! NO METHODS. Just data.
//! All transformations happen in vertex_store_operations.rs

use std::sync::Arc;

use bit_vec::BitVec;
use parking_lot::RwLock;

use super::render_context::StoreId;
use super::render_device::VertexBufferId;

/// Store shared by every shape group that appends into it
pub type SharedVertexStore = Arc<RwLock<VertexStoreData>>;

/// Which optional attribute streams a store carries
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct VertexStoreLayout {
    pub tex_coords: bool,
    pub colors: bool,
    pub edge_flags: bool,
}

/// A single vertex, used when copying between stores
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Vertex {
    pub position: [f32; 3],
    pub normal: [f32; 3],
    pub tex_coord: [f32; 2],
    pub color: u32,
    pub edge: bool,
}

/// Device mirror bookkeeping
#[derive(Debug, Clone, Default)]
pub struct GpuBufferState {
    pub buffer: Option<VertexBufferId>,
    /// Vertex count at the time of the last upload
    pub uploaded_count: usize,
    /// Set once an allocation fails. Never retried afterwards.
    pub allocation_failed: bool,
}

/// Struct-of-Arrays vertex storage. Attribute arrays are index-aligned.
pub struct VertexStoreData {
    pub id: StoreId,
    pub label: String,
    pub layout: VertexStoreLayout,

    pub positions: Vec<[f32; 3]>,
    pub normals: Vec<[f32; 3]>,
    pub tex_coords: Vec<[f32; 2]>,
    pub colors: Vec<u32>,
    pub edge_flags: BitVec,

    /// Vertex count at the end of each build step. Non-decreasing.
    pub step_boundaries: Vec<u32>,

    pub gpu: GpuBufferState,
}
