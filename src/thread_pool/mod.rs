//! Frame worker pool for the transparent sort and conditional-line buckets

pub mod thread_pool_data;
pub mod thread_pool_operations;

pub use thread_pool_data::{
    BucketResult, ConditionalSnapshot, FrameWorkState, FrameWorkerPool, FrameWorkerShared,
    SharedShapeGroup, TaskState,
};
pub use thread_pool_operations::{
    available_threads, create_frame_worker_pool, schedule_frame, shutdown_pool,
    try_claim_or_compute_inline, wait_for_sort, worker_count,
};
