//! Scene Data - Pure DOP
//!
//! NO METHODS. Just data.
//! All transformations happen in scene_operations.rs

use cgmath::Matrix4;
use rustc_hash::FxHashMap;

use crate::config::SceneConfig;
use crate::model::{LightData, ModelArena, ModelHandle, StoreSet};
use crate::shape::ShapeGroupData;
use crate::thread_pool::{ConditionalSnapshot, FrameWorkerPool, SharedShapeGroup};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScenePhase {
    /// Accepting geometry and instances
    Building,
    /// Finish and post-process have run. The graph is frozen.
    Finished,
}

/// Slots of the texmapped buckets
pub const TEXMAP_STANDARD: usize = 0;
pub const TEXMAP_BFC: usize = 1;
pub const TEXMAP_TRANSPARENT: usize = 2;

/// Overrides carried by one placed instance
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct InstanceOptions {
    pub color: Option<u32>,
    pub edge_color: Option<u32>,
    /// The instance sits under an odd number of BFC inversions
    pub bfc_invert: bool,
}

/// Result of opening a named sub-model
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SubModelBegin {
    pub model: ModelHandle,
    /// The model already had content. Callers skip re-adding its primitives.
    pub existing: bool,
}

/// Name of the empty model light placeholders point at
pub const LIGHT_MODEL_NAME: &str = "<light>";

/// Build-step bookkeeping of the root
#[derive(Debug, Clone, Default)]
pub struct StepState {
    /// Step new geometry is added in
    pub building: usize,
    /// Something was added since the last step boundary
    pub dirty: bool,
    /// Number of completed steps
    pub count: usize,
    /// Step being shown. `None` shows everything.
    pub active: Option<usize>,
}

/// Root of a retained scene: the model graph, its shared stores and the
/// scene-wide buckets filled at finish time.
pub struct SceneData {
    pub config: SceneConfig,
    pub phase: ScenePhase,
    pub stores: StoreSet,
    pub arena: ModelArena,
    pub root: ModelHandle,
    /// Models receiving primitives. The root is always at the bottom.
    pub build_stack: Vec<ModelHandle>,
    pub models_by_name: FxHashMap<String, ModelHandle>,
    pub steps: StepState,
    pub transparent: SharedShapeGroup,
    pub texmapped: [ShapeGroupData; 3],
    pub lights: Vec<LightData>,
    /// Last `(center, radius)` answered by the radius query
    pub max_radius_cache: Option<([f32; 3], f32)>,
    /// Root conditional groups shared with the workers once flattened
    pub conditional_snapshot: Option<ConditionalSnapshot>,
    /// Projection times view of the frame being drawn, when conditional
    /// visibility is precomputed
    pub conditional_mvp: Option<Matrix4<f32>>,
    pub pool: Option<FrameWorkerPool>,
    /// Set once pool creation has been attempted
    pub pool_started: bool,
}
