//! Smoother Operations - Pure DOP Functions
//!
//! Curve smoothing driven by conditional lines. Every triangle or quad edge
//! that lies on a conditional line folds its face normal into a running
//! normal for that line, at both ends. After all faces are visited the
//! running normals are normalized and written back, but only where they stay
//! within half the smoothing angle of the flat normal.

use cgmath::{InnerSpace, Vector3};

use super::smoother_data::{ModelSmoothingData, NormalInfo, SmootherData, VertexKey};
use crate::constants::smoothing::CONDITIONAL_MATCH_EPSILON;
use crate::renderer::vertex_store_operations::set_normal;
use crate::shape::{ShapeGroupData, ShapeType};

pub fn vertex_key(position: [f32; 3]) -> VertexKey {
    // `+ 0.0` turns -0.0 into 0.0.
    VertexKey([
        (position[0] + 0.0).to_bits(),
        (position[1] + 0.0).to_bits(),
        (position[2] + 0.0).to_bits(),
    ])
}

fn approx_equal(a: [f32; 3], b: [f32; 3]) -> bool {
    (0..3).all(|i| (a[i] - b[i]).abs() < CONDITIONAL_MATCH_EPSILON)
}

/// True when `n2` points more than 90 degrees away from `n1`. A zero `n1`
/// never flips.
pub fn should_flip_normal(n1: [f32; 3], n2: [f32; 3]) -> bool {
    let a = Vector3::from(n1);
    let b = Vector3::from(n2);
    if a.magnitude2() == 0.0 || b.magnitude2() == 0.0 {
        return false;
    }
    let dot = a.normalize().dot(b.normalize());
    dot < 0.0 && dot.abs() > f32::EPSILON
}

fn accumulate(sum: &mut [f32; 3], normal: [f32; 3]) {
    let sign = if should_flip_normal(*sum, normal) { -1.0 } else { 1.0 };
    for i in 0..3 {
        sum[i] += sign * normal[i];
    }
}

fn normalized(v: [f32; 3]) -> [f32; 3] {
    let v = Vector3::from(v);
    if v.magnitude2() == 0.0 {
        return [0.0; 3];
    }
    v.normalize().into()
}

/// Cosine bound for accepting a smoothed normal
pub fn smoothing_threshold(smooth_angle_degrees: f32) -> f32 {
    (smooth_angle_degrees.to_radians() / 2.0).cos()
}

pub fn find_line(smoother: &SmootherData, end: [f32; 3]) -> Option<usize> {
    smoother.ends.iter().position(|&e| approx_equal(e, end))
}

fn add_line_end(data: &mut ModelSmoothingData, start: [f32; 3], end: [f32; 3]) {
    let smoother = data
        .smoothers
        .entry(vertex_key(start))
        .or_insert_with(|| SmootherData {
            start,
            ..Default::default()
        });
    if find_line(smoother, end).is_none() {
        smoother.ends.push(end);
        smoother.normals.push([0.0; 3]);
        smoother.shared.push(Vec::new());
    }
}

/// Merge two lines of one smoother so they end up with the same normal
pub fn mark_shared(smoother: &mut SmootherData, a: usize, b: usize) {
    if a == b {
        return;
    }
    let (low, high) = (a.min(b), a.max(b));
    if let Some(list) = smoother.shared.get_mut(low) {
        if !list.contains(&high) {
            list.push(high);
        }
    }
}

/// Register every conditional line of `groups` at both of its ends
pub fn fill_conditional_map(data: &mut ModelSmoothingData, groups: &[&ShapeGroupData]) {
    for group in groups {
        let store = group.store.read();
        let indices = &group.indices[ShapeType::ConditionalLine.index()];
        for pair in indices.chunks_exact(2) {
            let (Some(&p0), Some(&p1)) = (
                store.positions.get(pair[0] as usize),
                store.positions.get(pair[1] as usize),
            ) else {
                continue;
            };
            if approx_equal(p0, p1) {
                log::warn!("[NormalSmoother::fill_conditional_map] Conditional too short");
                continue;
            }
            add_line_end(data, p0, p1);
            add_line_end(data, p1, p0);
        }
    }
}

/// Fold `normal` into the line from `from` to `to`, if there is one, and
/// remember `vertex` for the write-back.
fn fold_edge_end(
    data: &mut ModelSmoothingData,
    group: usize,
    vertex: u32,
    from: [f32; 3],
    to: [f32; 3],
    normal: [f32; 3],
) -> Option<usize> {
    let key = vertex_key(from);
    let smoother = data.smoothers.get_mut(&key)?;
    let line = find_line(smoother, to)?;
    accumulate(&mut smoother.normals[line], normal);
    data.infos.push(NormalInfo {
        group,
        vertex,
        key,
        line,
    });
    Some(line)
}

/// Visit the edge `i0 -> i1` of one face, with `i2` the next corner
fn process_smooth_edge(
    data: &mut ModelSmoothingData,
    group: usize,
    positions: &[[f32; 3]],
    normals: &[[f32; 3]],
    corners: [u32; 3],
) {
    let position = |i: u32| positions.get(i as usize).copied().unwrap_or_default();
    let normal = |i: u32| normals.get(i as usize).copied().unwrap_or_default();
    let [i0, i1, i2] = corners;
    let (p0, p1, p2) = (position(i0), position(i1), position(i2));

    fold_edge_end(data, group, i0, p0, p1, normal(i0));
    let Some(line1) = fold_edge_end(data, group, i1, p1, p0, normal(i1)) else {
        return;
    };
    if let Some(smoother) = data.smoothers.get_mut(&vertex_key(p1)) {
        if let Some(line2) = find_line(smoother, p2) {
            mark_shared(smoother, line1, line2);
        }
    }
}

/// Walk every triangle and quad edge of `groups`
pub fn calc_shape_normals(data: &mut ModelSmoothingData, groups: &[&ShapeGroupData]) {
    for (group_index, group) in groups.iter().enumerate() {
        let store = group.store.read();
        for shape in [ShapeType::Triangle, ShapeType::Quad] {
            let size = shape.points();
            for face in group.indices[shape.index()].chunks_exact(size) {
                for j in 0..size {
                    let corners = [face[j], face[(j + 1) % size], face[(j + 2) % size]];
                    process_smooth_edge(data, group_index, &store.positions, &store.normals, corners);
                }
            }
        }
    }
}

/// Merge shared lines and normalize every running normal
pub fn finish_smoother(smoother: &mut SmootherData) {
    for i in 0..smoother.normals.len() {
        let mut normal = smoother.normals[i];
        for &j in &smoother.shared[i] {
            if let Some(&other) = smoother.normals.get(j) {
                accumulate(&mut normal, other);
            }
        }
        let normal = normalized(normal);
        smoother.normals[i] = normal;
        for &j in &smoother.shared[i] {
            if let Some(slot) = smoother.normals.get_mut(j) {
                *slot = normal;
            }
        }
    }
}

/// Write smoothed normals back. Returns how many vertices changed.
pub fn apply_smoothed_normals(
    data: &ModelSmoothingData,
    groups: &[&ShapeGroupData],
    threshold: f32,
) -> usize {
    // Compare against the flat normals, not partially smoothed ones.
    let mut updates: Vec<(usize, u32, [f32; 3])> = Vec::with_capacity(data.infos.len());
    for info in &data.infos {
        let (Some(group), Some(smoother)) = (groups.get(info.group), data.smoothers.get(&info.key))
        else {
            continue;
        };
        let Some(&smoothed) = smoother.normals.get(info.line) else {
            continue;
        };
        let original = {
            let store = group.store.read();
            store.normals.get(info.vertex as usize).copied().unwrap_or_default()
        };
        let mut candidate = Vector3::from(smoothed);
        if candidate.magnitude2() == 0.0 {
            continue;
        }
        if should_flip_normal(smoothed, original) {
            candidate = -candidate;
        }
        let flat = Vector3::from(normalized(original));
        if candidate.dot(flat) > threshold {
            updates.push((info.group, info.vertex, candidate.into()));
        }
    }
    for &(group, vertex, normal) in &updates {
        let mut store = groups[group].store.write();
        set_normal(&mut store, vertex, normal);
    }
    updates.len()
}

/// Smooth the faces of `shape_groups` along the conditional lines of
/// `conditional_groups`. Returns how many vertex normals changed.
pub fn smooth_groups(
    conditional_groups: &[&ShapeGroupData],
    shape_groups: &[&ShapeGroupData],
    smooth_angle_degrees: f32,
) -> usize {
    let mut data = ModelSmoothingData::default();
    fill_conditional_map(&mut data, conditional_groups);
    if data.smoothers.is_empty() {
        return 0;
    }
    calc_shape_normals(&mut data, shape_groups);
    for smoother in data.smoothers.values_mut() {
        finish_smoother(smoother);
    }
    let changed = apply_smoothed_normals(&data, shape_groups, smoothing_threshold(smooth_angle_degrees));
    log::debug!(
        "[NormalSmoother::smooth_groups] {} smoothers, {} normals updated",
        data.smoothers.len(),
        changed
    );
    changed
}
