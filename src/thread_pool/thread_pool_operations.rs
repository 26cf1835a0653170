//! Thread Pool Operations - Pure DOP Functions
//!
//! Background sort and conditional-line visibility for one frame. Workers
//! claim tasks under the pool mutex; the render thread claims any task no
//! worker has reached yet and runs it itself, so waits always make progress.

use std::sync::Arc;
use std::thread;
use std::time::Duration;

use cgmath::{Matrix4, SquareMatrix};
use parking_lot::{Mutex, MutexGuard};

use super::thread_pool_data::{
    BucketResult, ConditionalSnapshot, FrameWorkState, FrameWorkerPool, FrameWorkerShared,
    SharedShapeGroup, TaskState,
};
use crate::constants::workers::{CONDITIONAL_BUCKETS, IDLE_POLL_MS};
use crate::error::{EngineError, EngineResult};
use crate::shape::conditional_operations::{active_conditional_indices, conditional_bucket_range};
use crate::shape::transparent_operations::sort_triangles;
use crate::shape::ShapeType;

/// Workers worth starting for `tasks` outstanding background tasks
pub fn worker_count(available_threads: usize, tasks: usize, max_workers: Option<usize>) -> usize {
    let count = available_threads.saturating_sub(1).min(tasks);
    match max_workers {
        Some(cap) => count.min(cap),
        None => count,
    }
}

/// Hardware threads, falling back to one when unknown
pub fn available_threads() -> usize {
    num_cpus::get().max(1)
}

pub fn create_frame_work_state() -> FrameWorkState {
    FrameWorkState {
        exiting: false,
        frame: 0,
        sort: TaskState::Idle,
        sort_modelview: Matrix4::identity(),
        conditional_mvp: None,
        buckets: [TaskState::Idle; CONDITIONAL_BUCKETS],
        results: vec![None; CONDITIONAL_BUCKETS],
    }
}

/// Start `workers` threads over the given shared buckets
pub fn create_frame_worker_pool(
    workers: usize,
    transparent: Option<SharedShapeGroup>,
    conditionals: Option<ConditionalSnapshot>,
) -> EngineResult<FrameWorkerPool> {
    let shared = Arc::new(FrameWorkerShared {
        state: Mutex::new(create_frame_work_state()),
        work_available: Default::default(),
        sort_done: Default::default(),
        conditionals_done: Default::default(),
        transparent,
        conditionals,
    });
    let mut pool = FrameWorkerPool {
        shared,
        workers: Vec::with_capacity(workers),
    };
    for index in 0..workers {
        let shared = Arc::clone(&pool.shared);
        let handle = thread::Builder::new()
            .name(format!("frame-worker-{}", index))
            .spawn(move || worker_loop(&shared))
            .map_err(|e| EngineError::WorkerPool {
                message: format!("failed to spawn frame worker {}: {}", index, e),
            })?;
        pool.workers.push(handle);
    }
    log::info!("[FrameWorkerPool::create] Started {} workers", workers);
    Ok(pool)
}

/// Queue this frame's work. `sort_modelview` requests a transparent sort,
/// `conditional_mvp` requests conditional-line visibility.
pub fn schedule_frame(
    pool: &FrameWorkerPool,
    sort_modelview: Option<Matrix4<f32>>,
    conditional_mvp: Option<Matrix4<f32>>,
) {
    let shared = &pool.shared;
    let mut state = shared.state.lock();
    state.frame = state.frame.wrapping_add(1);
    state.sort = match (sort_modelview, &shared.transparent) {
        (Some(modelview), Some(_)) => {
            state.sort_modelview = modelview;
            TaskState::Pending
        }
        _ => TaskState::Idle,
    };
    state.conditional_mvp = conditional_mvp.filter(|_| shared.conditionals.is_some());
    let bucket_state = if state.conditional_mvp.is_some() {
        TaskState::Pending
    } else {
        TaskState::Idle
    };
    state.buckets = [bucket_state; CONDITIONAL_BUCKETS];
    state.results.iter_mut().for_each(|r| *r = None);
    drop(state);
    shared.work_available.notify_all();
}

fn run_sort(shared: &FrameWorkerShared, modelview: &Matrix4<f32>) {
    if let Some(group) = &shared.transparent {
        sort_triangles(&mut group.lock(), modelview);
    }
}

/// Visible conditional lines of one bucket under `mvp`
pub fn compute_bucket(conditionals: &ConditionalSnapshot, mvp: &Matrix4<f32>, bucket: usize) -> BucketResult {
    let mut result: BucketResult = Default::default();
    for (slot, group) in conditionals.iter().enumerate() {
        if let Some(group) = group {
            let count = group.indices[ShapeType::ConditionalLine.index()].len();
            result[slot] = active_conditional_indices(group, mvp, conditional_bucket_range(count, bucket));
        }
    }
    result
}

fn run_bucket(
    shared: &FrameWorkerShared,
    state: &mut MutexGuard<'_, FrameWorkState>,
    bucket: usize,
    mvp: Matrix4<f32>,
) {
    let frame = state.frame;
    state.buckets[bucket] = TaskState::Claimed;
    let result = MutexGuard::unlocked(state, || match &shared.conditionals {
        Some(conditionals) => compute_bucket(conditionals, &mvp, bucket),
        None => Default::default(),
    });
    if state.frame == frame {
        state.results[bucket] = Some(result);
        state.buckets[bucket] = TaskState::Done;
    }
    shared.conditionals_done.notify_all();
}

fn run_claimed_sort(shared: &FrameWorkerShared, state: &mut MutexGuard<'_, FrameWorkState>) {
    let frame = state.frame;
    state.sort = TaskState::Claimed;
    let modelview = state.sort_modelview;
    MutexGuard::unlocked(state, || run_sort(shared, &modelview));
    finish_sort(state, frame);
    shared.sort_done.notify_all();
}

/// Mark the sort claimed for `frame` done. A sort scheduled since then
/// keeps its state. Returns whether the state changed.
fn finish_sort(state: &mut FrameWorkState, frame: u64) -> bool {
    if state.frame != frame {
        return false;
    }
    state.sort = TaskState::Done;
    true
}

fn worker_loop(shared: &FrameWorkerShared) {
    let mut state = shared.state.lock();
    loop {
        if state.exiting {
            break;
        }
        if state.sort == TaskState::Pending {
            run_claimed_sort(shared, &mut state);
            continue;
        }
        let next = state.buckets.iter().position(|b| *b == TaskState::Pending);
        match (next, state.conditional_mvp) {
            (Some(bucket), Some(mvp)) => run_bucket(shared, &mut state, bucket, mvp),
            _ => {
                shared
                    .work_available
                    .wait_for(&mut state, Duration::from_millis(IDLE_POLL_MS));
            }
        }
    }
    log::debug!("[FrameWorkerPool::worker_loop] Worker exiting");
}

/// Block until this frame's sort is finished, running it here if no worker
/// has claimed it. Returns immediately when no sort was scheduled.
pub fn wait_for_sort(pool: &FrameWorkerPool) {
    let shared = &pool.shared;
    let mut state = shared.state.lock();
    loop {
        match state.sort {
            TaskState::Idle | TaskState::Done => return,
            TaskState::Pending => {
                run_claimed_sort(shared, &mut state);
                return;
            }
            TaskState::Claimed => {
                shared
                    .sort_done
                    .wait_for(&mut state, Duration::from_millis(IDLE_POLL_MS));
            }
        }
    }
}

/// Result of one conditional bucket. Claims and computes it inline when no
/// worker has started it, otherwise waits for the worker that has.
pub fn try_claim_or_compute_inline(pool: &FrameWorkerPool, bucket: usize) -> BucketResult {
    if bucket >= CONDITIONAL_BUCKETS {
        return Default::default();
    }
    let shared = &pool.shared;
    let mut state = shared.state.lock();
    loop {
        let Some(mvp) = state.conditional_mvp else {
            return Default::default();
        };
        match state.buckets[bucket] {
            TaskState::Idle => return Default::default(),
            TaskState::Done => {
                return state.results[bucket].clone().unwrap_or_default();
            }
            TaskState::Pending => {
                run_bucket(shared, &mut state, bucket, mvp);
            }
            TaskState::Claimed => {
                shared
                    .conditionals_done
                    .wait_for(&mut state, Duration::from_millis(IDLE_POLL_MS));
            }
        }
    }
}

/// Wake every worker, let in-flight tasks finish and join the threads
pub fn shutdown_pool(pool: &mut FrameWorkerPool) {
    {
        let mut state = pool.shared.state.lock();
        state.exiting = true;
    }
    pool.shared.work_available.notify_all();
    pool.shared.sort_done.notify_all();
    pool.shared.conditionals_done.notify_all();
    for handle in pool.workers.drain(..) {
        if handle.join().is_err() {
            log::error!("[FrameWorkerPool::shutdown] A worker panicked");
        }
    }
}

impl Drop for FrameWorkerPool {
    fn drop(&mut self) {
        shutdown_pool(self);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::renderer::vertex_store_operations::create_shared_vertex_store;
    use crate::renderer::VertexStoreLayout;
    use crate::shape::shape_group_operations::{add_conditional_line, create_shape_group};
    use crate::shape::transfer_operations::TransferTriangle;
    use crate::shape::transparent_operations::{add_transfer_triangle, create_transparent_group};
    use crate::shape::ShapeGroupKind;

    fn transparent_bucket() -> SharedShapeGroup {
        let store = create_shared_vertex_store(
            "transparent",
            VertexStoreLayout {
                colors: true,
                ..Default::default()
            },
        );
        let mut group = create_transparent_group(store);
        for z in [-1.0, -5.0] {
            add_transfer_triangle(
                &mut group,
                &TransferTriangle {
                    positions: [[0.0, 0.0, z], [1.0, 0.0, z], [0.0, 1.0, z]],
                    normals: [[0.0, 0.0, 1.0]; 3],
                    tex_coords: [[0.0; 2]; 3],
                    color: 0xFF00_0080,
                    bfc: false,
                },
            );
        }
        Arc::new(Mutex::new(group))
    }

    fn conditionals() -> ConditionalSnapshot {
        let store = create_shared_vertex_store("standard", VertexStoreLayout::default());
        let mut group = create_shape_group(store, ShapeGroupKind::Uncolored, false);
        // Control points on opposite sides: never a silhouette.
        add_conditional_line(
            &mut group,
            &[[0.0, 0.0, 0.0], [1.0, 0.0, 0.0]],
            &[[0.5, 1.0, 0.0], [0.5, -1.0, 0.0]],
            None,
            0,
        );
        // Both control points on one side: always drawn.
        add_conditional_line(
            &mut group,
            &[[0.0, 2.0, 0.0], [1.0, 2.0, 0.0]],
            &[[0.5, 3.0, 0.0], [0.6, 3.0, 0.0]],
            None,
            0,
        );
        Arc::new([Some(group), None])
    }

    #[test]
    fn test_worker_count_bounds() {
        assert_eq!(worker_count(8, 33, None), 7);
        assert_eq!(worker_count(8, 1, None), 1);
        assert_eq!(worker_count(8, 33, Some(2)), 2);
        assert_eq!(worker_count(1, 33, None), 0);
    }

    #[test]
    fn test_wait_for_sort_without_workers_sorts_inline() {
        let bucket = transparent_bucket();
        let pool = create_frame_worker_pool(0, Some(Arc::clone(&bucket)), None).expect("pool");
        schedule_frame(&pool, Some(Matrix4::identity()), None);
        wait_for_sort(&pool);
        let group = bucket.lock();
        // The farther triangle (z = -5) was added second and now draws first.
        assert_eq!(group.indices[ShapeType::Triangle.index()][..3], [3, 4, 5]);
        assert_eq!(pool.shared.state.lock().sort, TaskState::Done);
    }

    #[test]
    fn test_stale_sort_leaves_new_frame_pending() {
        let pool = create_frame_worker_pool(0, Some(transparent_bucket()), None).expect("pool");
        schedule_frame(&pool, Some(Matrix4::identity()), None);
        let stale = {
            let mut state = pool.shared.state.lock();
            state.sort = TaskState::Claimed;
            state.frame
        };
        schedule_frame(&pool, Some(Matrix4::identity()), None);
        assert!(!finish_sort(&mut pool.shared.state.lock(), stale));
        assert_eq!(pool.shared.state.lock().sort, TaskState::Pending);

        wait_for_sort(&pool);
        assert_eq!(pool.shared.state.lock().sort, TaskState::Done);
    }

    #[test]
    fn test_buckets_computed_inline_match_workers() {
        let snapshot = conditionals();
        let inline_pool = create_frame_worker_pool(0, None, Some(Arc::clone(&snapshot))).expect("inline");
        let worker_pool = create_frame_worker_pool(2, None, Some(Arc::clone(&snapshot))).expect("workers");
        schedule_frame(&inline_pool, None, Some(Matrix4::identity()));
        schedule_frame(&worker_pool, None, Some(Matrix4::identity()));

        let gather = |pool: &FrameWorkerPool| -> Vec<u32> {
            (0..CONDITIONAL_BUCKETS)
                .flat_map(|b| try_claim_or_compute_inline(pool, b)[0].clone())
                .collect()
        };
        let inline = gather(&inline_pool);
        assert_eq!(inline, vec![6, 7]);
        assert_eq!(gather(&worker_pool), inline);
    }

    #[test]
    fn test_unscheduled_work_returns_immediately() {
        let pool = create_frame_worker_pool(1, None, None).expect("pool");
        wait_for_sort(&pool);
        assert!(try_claim_or_compute_inline(&pool, 3)[0].is_empty());
        assert!(try_claim_or_compute_inline(&pool, CONDITIONAL_BUCKETS)[1].is_empty());
    }

    #[test]
    fn test_shutdown_joins_workers() {
        let mut pool = create_frame_worker_pool(3, None, None).expect("pool");
        shutdown_pool(&mut pool);
        assert!(pool.workers.is_empty());
        assert!(pool.shared.state.lock().exiting);
    }
}
