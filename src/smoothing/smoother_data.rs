//! Smoother Data - Pure DOP
//!
//! NO METHODS. Just data.
//! All transformations happen in smoother_operations.rs

use rustc_hash::FxHashMap;

/// Exact float triple used to key vertices by position.
/// `-0.0` is folded into `0.0` when the key is built.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct VertexKey(pub [u32; 3]);

/// Conditional lines leaving one vertex position
#[derive(Debug, Clone, Default)]
pub struct SmootherData {
    pub start: [f32; 3],
    /// Far end of each conditional line
    pub ends: Vec<[f32; 3]>,
    /// Running normal per line, normalized by `finish`
    pub normals: Vec<[f32; 3]>,
    /// Lines whose normals are merged into this one. Only the lower index
    /// of a pair holds the entry.
    pub shared: Vec<Vec<usize>>,
}

/// One vertex waiting for a smoothed normal
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NormalInfo {
    /// Position of the owning group in the slice handed to the smoother
    pub group: usize,
    /// Store index of the vertex
    pub vertex: u32,
    pub key: VertexKey,
    pub line: usize,
}

/// Working state for smoothing one model
#[derive(Debug, Default)]
pub struct ModelSmoothingData {
    pub smoothers: FxHashMap<VertexKey, SmootherData>,
    pub infos: Vec<NormalInfo>,
}
