//! Conditional Line Operations - Pure DOP Functions
//!
//! A conditional line is drawn only when both of its control points project
//! to the same side of the line on screen.

use std::ops::Range;

use cgmath::{Matrix4, Vector4};

use super::shape_group_data::ShapeGroupData;
use super::shape_types::ShapeType;
use crate::constants::workers::CONDITIONAL_BUCKETS;

fn project(mvp: &Matrix4<f32>, p: [f32; 3]) -> Option<[f32; 2]> {
    let clip = mvp * Vector4::new(p[0], p[1], p[2], 1.0);
    if clip.w <= f32::EPSILON {
        return None;
    }
    Some([clip.x / clip.w, clip.y / clip.w])
}

fn turn(a: [f32; 2], b: [f32; 2], c: [f32; 2]) -> f32 {
    (b[0] - a[0]) * (c[1] - a[1]) - (b[1] - a[1]) * (c[0] - a[0])
}

/// Same-side test in screen space. Lines with a point behind the eye are
/// drawn.
pub fn conditional_visible(
    mvp: &Matrix4<f32>,
    line: [[f32; 3]; 2],
    control_points: [[f32; 3]; 2],
) -> bool {
    let projected = (
        project(mvp, line[0]),
        project(mvp, line[1]),
        project(mvp, control_points[0]),
        project(mvp, control_points[1]),
    );
    match projected {
        (Some(a), Some(b), Some(c0), Some(c1)) => {
            let t0 = turn(a, b, c0);
            let t1 = turn(a, b, c1);
            (t0 > 0.0 && t1 > 0.0) || (t0 < 0.0 && t1 < 0.0)
        }
        _ => true,
    }
}

/// Line indices (in pairs) within `range` that are visible under `mvp`.
/// `range` is in positions of the conditional index array.
pub fn active_conditional_indices(
    group: &ShapeGroupData,
    mvp: &Matrix4<f32>,
    range: Range<usize>,
) -> Vec<u32> {
    let indices = &group.indices[ShapeType::ConditionalLine.index()];
    let controls = &group.control_point_indices;
    let end = range.end.min(indices.len()).min(controls.len());
    let start = range.start.min(end) & !1;
    let store = group.store.read();
    let position = |i: u32| store.positions.get(i as usize).copied().unwrap_or_default();

    let mut active = Vec::new();
    let mut i = start;
    while i + 1 < end {
        let line = [position(indices[i]), position(indices[i + 1])];
        let control = [position(controls[i]), position(controls[i + 1])];
        if conditional_visible(mvp, line, control) {
            active.push(indices[i]);
            active.push(indices[i + 1]);
        }
        i += 2;
    }
    active
}

/// Index range handled by one background bucket. The last bucket takes the
/// remainder so the buckets cover every line exactly once.
pub fn conditional_bucket_range(index_count: usize, bucket: usize) -> Range<usize> {
    let lines = index_count / 2;
    let step = lines / CONDITIONAL_BUCKETS * 2;
    let start = bucket * step;
    let mut end = start + step;
    if bucket + 1 == CONDITIONAL_BUCKETS {
        end += (lines % CONDITIONAL_BUCKETS) * 2;
    }
    start..end
}

/// Pull each control point to unit distance from its line's start so the
/// screen-space test stays well conditioned after flattening.
pub fn scale_conditional_control_points(group: &ShapeGroupData) {
    let indices = &group.indices[ShapeType::ConditionalLine.index()];
    let mut store = group.store.write();
    for (i, &control) in group.control_point_indices.iter().enumerate() {
        let line_start = match indices.get(i & !1) {
            Some(&start) => start as usize,
            None => break,
        };
        let (Some(&origin), Some(&point)) =
            (store.positions.get(line_start), store.positions.get(control as usize))
        else {
            continue;
        };
        let dir = [point[0] - origin[0], point[1] - origin[1], point[2] - origin[2]];
        let length = (dir[0] * dir[0] + dir[1] * dir[1] + dir[2] * dir[2]).sqrt();
        if length > 0.0 {
            store.positions[control as usize] = [
                origin[0] + dir[0] / length,
                origin[1] + dir[1] / length,
                origin[2] + dir[2] / length,
            ];
        }
    }
}
