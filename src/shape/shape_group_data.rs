//! Shape Group Data - Pure DOP
//!
//! NO METHODS. Just data.
//! All transformations happen in shape_group_operations.rs

use super::shape_types::SHAPE_TYPE_COUNT;
use crate::renderer::SharedVertexStore;

/// Triangle record used by the depth sort
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SortedTriangle {
    pub indices: [u32; 3],
    pub center: [f32; 3],
    pub depth: f32,
}

/// Extension data of the transparent bucket
#[derive(Debug, Clone, Default)]
pub struct TransparentSortData {
    /// Triangles in the active step, built lazily
    pub sorted: Vec<SortedTriangle>,
    pub initialized: bool,
    /// Unsorted triangle indices, restored whenever the step changes
    pub original_indices: Vec<u32>,
    /// Step the sorted array was built for. `None` is the last step.
    pub active_step: Option<usize>,
}

/// Contiguous run of texmapped triangles sharing one texture
#[derive(Debug, Clone, PartialEq)]
pub struct TexturedRange {
    pub texture: String,
    /// Position in the triangle index array
    pub start: u32,
    pub count: u32,
}

/// Extension data of a texmapped bucket
#[derive(Debug, Clone, Default)]
pub struct TexmappedGroupData {
    pub ranges: Vec<TexturedRange>,
}

/// Bucket flavor. Dispatch is by match, never by trait object.
#[derive(Debug, Clone)]
pub enum ShapeGroupKind {
    /// Drawn in the current color
    Uncolored,
    /// Color comes from the per-vertex color stream
    Colored,
    Transparent(TransparentSortData),
    Texmapped(TexmappedGroupData),
}

/// Positions recorded during a transfer walk, removed in one batch later.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TransferRecords {
    /// `(start, len)` ranges into each flat index array
    pub ranges: [Vec<(u32, u32)>; SHAPE_TYPE_COUNT],
    /// Strip numbers for strip kinds
    pub strips: [Vec<u32>; SHAPE_TYPE_COUNT],
}

/// Index lists per primitive kind over one shared vertex store.
///
/// For strip kinds `strip_counts` sums to the index count. For conditional
/// lines `control_point_indices` holds two entries per line, parallel to the
/// line's two indices. `step_counts` holds the index count (flat kinds) or
/// strip count (strip kinds) at the end of each build step.
pub struct ShapeGroupData {
    pub store: SharedVertexStore,
    pub kind: ShapeGroupKind,
    pub bfc: bool,
    pub indices: [Vec<u32>; SHAPE_TYPE_COUNT],
    pub strip_counts: [Vec<u32>; SHAPE_TYPE_COUNT],
    pub control_point_indices: Vec<u32>,
    pub step_counts: [Vec<u32>; SHAPE_TYPE_COUNT],
    /// Bit per `ShapeType` holding at least one primitive
    pub shapes_present: u32,
    pub transfer_records: TransferRecords,
    /// Set once the first transfer walk over this group has recorded removals
    pub transfer_recorded: bool,
}
