//! Thread Pool Data - Pure DOP
//!
//! NO METHODS. Just data.
//! All transformations happen in thread_pool_operations.rs

use std::sync::Arc;
use std::thread::JoinHandle;

use cgmath::Matrix4;
use parking_lot::{Condvar, Mutex};

use crate::constants::workers::CONDITIONAL_BUCKETS;
use crate::shape::ShapeGroupData;

/// The transparent bucket, shared with the sort worker
pub type SharedShapeGroup = Arc<Mutex<ShapeGroupData>>;

/// Uncolored and colored conditional groups of the scene root
pub type ConditionalSnapshot = Arc<[Option<ShapeGroupData>; 2]>;

/// Visible conditional indices of one bucket, per colored flag
pub type BucketResult = [Vec<u32>; 2];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TaskState {
    #[default]
    Idle,
    Pending,
    Claimed,
    Done,
}

/// Everything guarded by the pool mutex
pub struct FrameWorkState {
    pub exiting: bool,
    /// Bumped by every schedule, so stale results are never mixed in
    pub frame: u64,
    pub sort: TaskState,
    pub sort_modelview: Matrix4<f32>,
    pub conditional_mvp: Option<Matrix4<f32>>,
    pub buckets: [TaskState; CONDITIONAL_BUCKETS],
    pub results: Vec<Option<BucketResult>>,
}

/// State shared between the render thread and the workers
pub struct FrameWorkerShared {
    pub state: Mutex<FrameWorkState>,
    pub work_available: Condvar,
    pub sort_done: Condvar,
    pub conditionals_done: Condvar,
    pub transparent: Option<SharedShapeGroup>,
    pub conditionals: Option<ConditionalSnapshot>,
}

/// Bounded pool serving at most one sort and the conditional buckets per
/// frame. A pool with no workers runs everything on the caller.
pub struct FrameWorkerPool {
    pub shared: Arc<FrameWorkerShared>,
    pub workers: Vec<JoinHandle<()>>,
}
