//! Model Data - Pure DOP
//!
//! NO METHODS. Just data.
//! All transformations happen in model_operations.rs

use cgmath::Matrix4;
use rustc_hash::FxHashSet;

use crate::geometry::AABB;
use crate::renderer::{DrawListId, SharedVertexStore};
use crate::shape::{ShapeGroupData, SECTION_COUNT};

/// Index of a model in its arena
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ModelHandle(pub u32);

/// The vertex stores shared by every model of one scene
#[derive(Clone)]
pub struct StoreSet {
    pub standard: SharedVertexStore,
    pub stud: SharedVertexStore,
    pub colored: SharedVertexStore,
    pub colored_stud: SharedVertexStore,
    pub transparent: SharedVertexStore,
    pub texmap: SharedVertexStore,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum TexmapProjection {
    Planar,
    /// Sweep around the cylinder axis, in degrees
    Cylindrical { sweep_degrees: f32 },
    /// Longitude and latitude sweeps, in degrees
    Spherical { sweep_degrees: [f32; 2] },
}

/// Derived frame of a texmap region, rebuilt whenever its points move
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct TexmapFrame {
    pub origin: [f32; 3],
    pub normal: [f32; 3],
    pub normal2: [f32; 3],
    pub dir: [f32; 3],
    pub height: f32,
    pub s_angle: f32,
    pub t_angle: f32,
}

/// A texture-map region declared while building one model.
///
/// `geometry` holds the store index of the first vertex of every shape added
/// while the region was active, per `(colored, bfc)` pair.
#[derive(Debug, Clone)]
pub struct TexmapInfo {
    pub texture: String,
    pub projection: TexmapProjection,
    pub points: [[f32; 3]; 3],
    pub frame: TexmapFrame,
    pub sub_model_offset: usize,
    pub sub_model_count: usize,
    pub geometry: [FxHashSet<u32>; 4],
}

/// Placement of a child model
#[derive(Debug, Clone)]
pub struct SubModelData {
    pub model: ModelHandle,
    pub matrix: Matrix4<f32>,
    pub color: Option<u32>,
    pub edge_color: Option<u32>,
    /// Odd number of BFC inversions on the path to this instance
    pub bfc_invert: bool,
    /// `matrix` has a negative determinant
    pub mirror: bool,
    /// Light placeholder. Contributes a light, never geometry.
    pub light: bool,
    /// Set once the seam shrink has been folded into `matrix`
    pub shrunk: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ModelFlags {
    pub part: bool,
    pub flattened: bool,
    pub smoothed: bool,
    pub inverted: bool,
    pub un_mirrored: bool,
    pub normals_unshrunk: bool,
    pub compiled: bool,
}

/// One node of the model graph.
///
/// `groups[section][colored]` holds the section buckets. Variant links are
/// handles into the same arena.
pub struct ModelData {
    pub name: String,
    pub groups: [[Option<ShapeGroupData>; 2]; SECTION_COUNT],
    pub sub_models: Vec<SubModelData>,
    /// Sub-model count at the end of each build step
    pub sub_model_step_counts: Vec<u32>,
    /// Number of step snapshots taken so far
    pub steps_taken: usize,
    pub bounding_box: Option<AABB>,
    pub inverted_model: Option<ModelHandle>,
    pub un_mirrored_model: Option<ModelHandle>,
    pub texmaps: Vec<TexmapInfo>,
    /// Index into `texmaps` while a region is open
    pub active_texmap: Option<usize>,
    /// Bit per section with geometry here or below, per colored flag
    pub sections_present: [u32; 2],
    pub draw_lists: [[Option<DrawListId>; 2]; SECTION_COUNT],
    pub flags: ModelFlags,
}

/// Owner of every model node of a scene
#[derive(Default)]
pub struct ModelArena {
    pub models: Vec<ModelData>,
}

/// Per-frame settings threaded through a model draw walk
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ModelDrawParams {
    /// Active build step for the root. `None` is the last step.
    pub step: Option<usize>,
    pub last_step: bool,
    pub alpha_threshold: u8,
    pub show_all_conditionals: bool,
    /// Root conditional lines are drawn from precomputed buckets instead
    pub root_conditionals_precomputed: bool,
    /// Color most recently set on the device
    pub current_color: u32,
}

/// One baking job of a flatten pass
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FlattenJob {
    pub source: ModelHandle,
    pub matrix: Matrix4<f32>,
    pub color: Option<u32>,
    pub edge_color: Option<u32>,
}

/// A light placeholder resolved to world space
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LightData {
    pub position: [f32; 3],
    pub color: u32,
}
