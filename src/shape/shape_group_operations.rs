//! Shape Group Operations - Pure DOP Functions
//!
//! Building, stepping and drawing index lists over a shared vertex store.

use cgmath::Matrix4;
use rustc_hash::FxHashMap;

use super::shape_group_data::{ShapeGroupData, ShapeGroupKind, TransferRecords};
use super::shape_types::{ShapeType, SHAPE_TYPE_COUNT};
use crate::error::{EngineError, EngineResult};
use crate::geometry::{transform_point, unshrink_normal};
use crate::renderer::vertex_store_operations::{append_vertices, push_vertex, vertex_at};
use crate::renderer::{RenderContext, SharedVertexStore, StateChange, Vertex};

/// Create new empty shape group
pub fn create_shape_group(store: SharedVertexStore, kind: ShapeGroupKind, bfc: bool) -> ShapeGroupData {
    ShapeGroupData {
        store,
        kind,
        bfc,
        indices: Default::default(),
        strip_counts: Default::default(),
        control_point_indices: Vec::new(),
        step_counts: Default::default(),
        shapes_present: 0,
        transfer_records: TransferRecords::default(),
        transfer_recorded: false,
    }
}

/// True for every variant that takes its color from the vertex stream
pub fn is_colored(group: &ShapeGroupData) -> bool {
    !matches!(group.kind, ShapeGroupKind::Uncolored)
}

#[inline]
pub fn has_shape(group: &ShapeGroupData, shape: ShapeType) -> bool {
    group.shapes_present & shape.bit() != 0
}

pub fn is_empty(group: &ShapeGroupData) -> bool {
    group.indices.iter().all(|indices| indices.is_empty())
}

pub fn index_count(group: &ShapeGroupData, shape: ShapeType) -> usize {
    group.indices[shape.index()].len()
}

/// Point count check for one primitive of `shape`
pub fn validate_count(shape: ShapeType, count: usize) -> EngineResult<()> {
    let valid = match shape {
        ShapeType::TriangleStrip | ShapeType::TriangleFan => count >= 3,
        ShapeType::QuadStrip => count >= 4 && count % 2 == 0,
        flat => count == flat.points(),
    };
    if valid {
        Ok(())
    } else {
        Err(EngineError::InvalidTopology {
            shape: format!("{:?}", shape),
            count,
        })
    }
}

/// Append one primitive and return the store index of its first vertex.
///
/// `color` is required by colored groups and ignored by uncolored ones.
pub fn add_shape(
    group: &mut ShapeGroupData,
    shape: ShapeType,
    positions: &[[f32; 3]],
    normals: Option<&[[f32; 3]]>,
    tex_coords: Option<&[[f32; 2]]>,
    color: Option<u32>,
    step: usize,
) -> EngineResult<u32> {
    if shape == ShapeType::ConditionalLine {
        return Err(EngineError::InvalidState {
            operation: "add a conditional line without control points".to_string(),
            state: "building".to_string(),
        });
    }
    validate_count(shape, positions.len())?;
    let color = if is_colored(group) {
        Some(color.ok_or_else(|| EngineError::InvalidState {
            operation: "add uncolored geometry".to_string(),
            state: "a colored group".to_string(),
        })?)
    } else {
        None
    };

    let start = {
        let mut store = group.store.write();
        append_vertices(&mut store, positions, normals, tex_coords, color, true, step)
    };
    let slot = shape.index();
    group.indices[slot].extend(start..start + positions.len() as u32);
    if shape.is_strip() {
        group.strip_counts[slot].push(positions.len() as u32);
    }
    group.shapes_present |= shape.bit();
    Ok(start)
}

/// Append a conditional line. Control points go in first with the edge
/// flag cleared, then the two line vertices.
pub fn add_conditional_line(
    group: &mut ShapeGroupData,
    segment: &[[f32; 3]; 2],
    control_points: &[[f32; 3]; 2],
    color: Option<u32>,
    step: usize,
) -> u32 {
    let color = if is_colored(group) { color } else { None };
    let (control, start) = {
        let mut store = group.store.write();
        let control = append_vertices(&mut store, control_points, None, None, color, false, step);
        let start = append_vertices(&mut store, segment, None, None, color, true, step);
        (control, start)
    };
    group.indices[ShapeType::ConditionalLine.index()].extend([start, start + 1]);
    group.control_point_indices.extend([control, control + 1]);
    group.shapes_present |= ShapeType::ConditionalLine.bit();
    start
}

/// Snapshot the current counts as the end of a build step
pub fn next_step(group: &mut ShapeGroupData) {
    for shape in ShapeType::ALL {
        let slot = shape.index();
        let count = if shape.is_strip() {
            group.strip_counts[slot].len()
        } else {
            group.indices[slot].len()
        };
        group.step_counts[slot].push(count as u32);
    }
}

/// Index count (flat kinds) or strip count (strip kinds) visible at `step`.
/// `None` and steps past the last snapshot show everything.
pub fn step_limit(group: &ShapeGroupData, shape: ShapeType, step: Option<usize>) -> usize {
    let slot = shape.index();
    let total = if shape.is_strip() {
        group.strip_counts[slot].len()
    } else {
        group.indices[slot].len()
    };
    match step.and_then(|s| group.step_counts[slot].get(s)) {
        Some(&limit) => (limit as usize).min(total),
        None => total,
    }
}

/// Number of indices visible at `step`
pub fn visible_index_count(group: &ShapeGroupData, shape: ShapeType, step: Option<usize>) -> usize {
    let limit = step_limit(group, shape, step);
    if shape.is_strip() {
        group.strip_counts[shape.index()][..limit]
            .iter()
            .map(|&c| c as usize)
            .sum()
    } else {
        limit
    }
}

/// Draw every present kind except conditional lines
pub fn draw(group: &ShapeGroupData, context: &mut RenderContext, step: Option<usize>) {
    if let ShapeGroupKind::Texmapped(texmapped) = &group.kind {
        let limit = visible_index_count(group, ShapeType::Triangle, step);
        let indices = &group.indices[ShapeType::Triangle.index()];
        for range in &texmapped.ranges {
            let start = range.start as usize;
            let end = (start + range.count as usize).min(limit);
            if start >= end {
                continue;
            }
            context
                .device
                .set_state(StateChange::Texture(Some(range.texture.clone())));
            context
                .device
                .draw_elements(ShapeType::Triangle.primitive(), &indices[start..end]);
        }
        context.device.set_state(StateChange::Texture(None));
        return;
    }
    for shape in ShapeType::ALL {
        if shape == ShapeType::ConditionalLine || !has_shape(group, shape) {
            continue;
        }
        if shape.is_strip() {
            draw_strip_shape_type(group, context, shape, step);
        } else {
            draw_shape_type(group, context, shape, step);
        }
    }
}

/// One draw call for a flat kind
pub fn draw_shape_type(
    group: &ShapeGroupData,
    context: &mut RenderContext,
    shape: ShapeType,
    step: Option<usize>,
) {
    let count = visible_index_count(group, shape, step);
    if count > 0 {
        let indices = &group.indices[shape.index()][..count];
        context.device.draw_elements(shape.primitive(), indices);
    }
}

/// One multi-draw, or one draw per strip without multi-draw support
pub fn draw_strip_shape_type(
    group: &ShapeGroupData,
    context: &mut RenderContext,
    shape: ShapeType,
    step: Option<usize>,
) {
    let slot = shape.index();
    let strips = step_limit(group, shape, step);
    if strips == 0 {
        return;
    }
    let indices = &group.indices[slot];
    let mut batches = Vec::with_capacity(strips);
    let mut offset = 0usize;
    for &count in &group.strip_counts[slot][..strips] {
        let end = offset + count as usize;
        batches.push(&indices[offset..end]);
        offset = end;
    }
    if context.capabilities.multi_draw {
        context.device.multi_draw_elements(shape.primitive(), &batches);
    } else {
        for batch in batches {
            context.device.draw_elements(shape.primitive(), batch);
        }
    }
}

/// Draw a precomputed set of visible conditional line indices
pub fn draw_conditional_lines(context: &mut RenderContext, indices: &[u32]) {
    if !indices.is_empty() {
        context
            .device
            .draw_elements(ShapeType::ConditionalLine.primitive(), indices);
    }
}

/// Visit every referenced position transformed by `matrix`
pub fn scan_points(group: &ShapeGroupData, matrix: &Matrix4<f32>, visit: &mut dyn FnMut([f32; 3])) {
    let store = group.store.read();
    for indices in &group.indices {
        for &index in indices {
            if let Some(position) = store.positions.get(index as usize) {
                visit(transform_point(matrix, *position));
            }
        }
    }
}

/// Pre-scale normals so a later shrink transform leaves lighting unchanged
pub fn unshrink_normals(group: &mut ShapeGroupData, shrink: &Matrix4<f32>) {
    let mut store = group.store.write();
    let mut done = bit_vec::BitVec::from_elem(store.normals.len(), false);
    for shape in ShapeType::ALL {
        if shape.is_line() {
            continue;
        }
        for &index in &group.indices[shape.index()] {
            let i = index as usize;
            if i < store.normals.len() && !done.get(i).unwrap_or(true) {
                done.set(i, true);
                store.normals[i] = unshrink_normal(shrink, store.normals[i]);
            }
        }
    }
}

/// Drop every conditional line
pub fn remove_conditionals(group: &mut ShapeGroupData) {
    let slot = ShapeType::ConditionalLine.index();
    group.indices[slot].clear();
    group.control_point_indices.clear();
    group.step_counts[slot].clear();
    group.shapes_present &= !ShapeType::ConditionalLine.bit();
}

/// Copy of the index structure over the same store
pub fn clone_structure(group: &ShapeGroupData) -> ShapeGroupData {
    ShapeGroupData {
        store: group.store.clone(),
        kind: group.kind.clone(),
        bfc: group.bfc,
        indices: group.indices.clone(),
        strip_counts: group.strip_counts.clone(),
        control_point_indices: group.control_point_indices.clone(),
        step_counts: group.step_counts.clone(),
        shapes_present: group.shapes_present,
        transfer_records: TransferRecords::default(),
        transfer_recorded: false,
    }
}

/// Give every non-line primitive its own copy of its vertices, passing each
/// copy through `adjust`. Shared vertices are copied once.
pub fn duplicate_vertices(group: &mut ShapeGroupData, adjust: &dyn Fn(&mut Vertex)) {
    let mut store = group.store.write();
    let mut remap: FxHashMap<u32, u32> = FxHashMap::default();
    for shape in ShapeType::ALL {
        if shape.is_line() {
            continue;
        }
        for index in group.indices[shape.index()].iter_mut() {
            let old = *index;
            *index = match remap.get(&old) {
                Some(&new) => new,
                None => {
                    let mut vertex = vertex_at(&store, old);
                    adjust(&mut vertex);
                    let new = push_vertex(&mut store, &vertex);
                    remap.insert(old, new);
                    new
                }
            };
        }
    }
}

/// `sum(strip_counts) == indices.len()` for every strip kind
pub fn strip_counts_consistent(group: &ShapeGroupData) -> bool {
    (0..SHAPE_TYPE_COUNT).all(|slot| {
        let shape = ShapeType::ALL[slot];
        !shape.is_strip()
            || group.strip_counts[slot].iter().map(|&c| c as usize).sum::<usize>()
                == group.indices[slot].len()
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::renderer::recording_device::{recorded, DrawCommand, RecordingDevice};
    use crate::renderer::render_context::create_render_context;
    use crate::renderer::vertex_store_operations::create_shared_vertex_store;
    use crate::renderer::VertexStoreLayout;

    fn uncolored_group() -> ShapeGroupData {
        let store = create_shared_vertex_store("test", VertexStoreLayout::default());
        create_shape_group(store, ShapeGroupKind::Uncolored, false)
    }

    fn strip(n: usize) -> Vec<[f32; 3]> {
        (0..n).map(|i| [i as f32, (i % 2) as f32, 0.0]).collect()
    }

    #[test]
    fn test_add_shapes_and_strip_sum() {
        let mut group = uncolored_group();
        let first = add_shape(&mut group, ShapeType::Triangle, &strip(3), None, None, None, 0)
            .expect("triangle");
        assert_eq!(first, 0);
        add_shape(&mut group, ShapeType::TriangleStrip, &strip(5), None, None, None, 0)
            .expect("strip");
        add_shape(&mut group, ShapeType::TriangleStrip, &strip(4), None, None, None, 0)
            .expect("strip");
        add_shape(&mut group, ShapeType::QuadStrip, &strip(6), None, None, None, 0)
            .expect("quad strip");
        assert!(strip_counts_consistent(&group));
        assert_eq!(index_count(&group, ShapeType::TriangleStrip), 9);
        assert!(has_shape(&group, ShapeType::QuadStrip));
        assert!(!has_shape(&group, ShapeType::Quad));
    }

    #[test]
    fn test_invalid_topology_rejected() {
        let mut group = uncolored_group();
        assert!(add_shape(&mut group, ShapeType::Quad, &strip(3), None, None, None, 0).is_err());
        assert!(add_shape(&mut group, ShapeType::QuadStrip, &strip(5), None, None, None, 0).is_err());
        assert!(is_empty(&group));
    }

    #[test]
    fn test_colored_group_requires_color() {
        let store = create_shared_vertex_store(
            "colored",
            VertexStoreLayout {
                colors: true,
                ..Default::default()
            },
        );
        let mut group = create_shape_group(store, ShapeGroupKind::Colored, false);
        assert!(add_shape(&mut group, ShapeType::Triangle, &strip(3), None, None, None, 0).is_err());
        add_shape(&mut group, ShapeType::Triangle, &strip(3), None, None, Some(0x00FF_00FF), 0)
            .expect("colored triangle");
        assert_eq!(group.store.read().colors, vec![0x00FF_00FF; 3]);
    }

    #[test]
    fn test_step_prefix() {
        let mut group = uncolored_group();
        add_shape(&mut group, ShapeType::Triangle, &strip(3), None, None, None, 0).expect("t");
        add_shape(&mut group, ShapeType::TriangleFan, &strip(5), None, None, None, 0).expect("f");
        next_step(&mut group);
        add_shape(&mut group, ShapeType::Triangle, &strip(3), None, None, None, 1).expect("t");
        add_shape(&mut group, ShapeType::TriangleFan, &strip(4), None, None, None, 1).expect("f");
        next_step(&mut group);
        add_shape(&mut group, ShapeType::Triangle, &strip(3), None, None, None, 2).expect("t");

        assert_eq!(visible_index_count(&group, ShapeType::Triangle, Some(0)), 3);
        assert_eq!(visible_index_count(&group, ShapeType::Triangle, Some(1)), 6);
        assert_eq!(visible_index_count(&group, ShapeType::Triangle, None), 9);
        assert_eq!(visible_index_count(&group, ShapeType::TriangleFan, Some(0)), 5);
        assert_eq!(visible_index_count(&group, ShapeType::TriangleFan, Some(7)), 9);

        // Each step's visible indices are a prefix of the next step's.
        let triangles = &group.indices[ShapeType::Triangle.index()];
        let mut previous: &[u32] = &[];
        for step in [Some(0), Some(1), None] {
            let count = visible_index_count(&group, ShapeType::Triangle, step);
            let visible = &triangles[..count];
            assert!(visible.starts_with(previous));
            previous = visible;
        }
    }

    #[test]
    fn test_strip_draw_fallback_without_multi_draw() {
        let mut group = uncolored_group();
        add_shape(&mut group, ShapeType::TriangleStrip, &strip(4), None, None, None, 0).expect("s");
        add_shape(&mut group, ShapeType::TriangleStrip, &strip(3), None, None, None, 0).expect("s");

        let mut context = create_render_context(Box::new(RecordingDevice::minimal()));
        draw(&group, &mut context, None);
        let device = recorded(&context).expect("recording device");
        assert_eq!(device.commands.len(), 2);
        assert_eq!(device.drawn_indices(), vec![0, 1, 2, 3, 4, 5, 6]);

        let mut full = create_render_context(Box::new(RecordingDevice::full()));
        draw(&group, &mut full, None);
        let device = recorded(&full).expect("recording device");
        assert_eq!(device.commands.len(), 1);
        assert!(matches!(device.commands[0], DrawCommand::MultiDraw { .. }));
    }

    #[test]
    fn test_duplicate_vertices_leaves_originals() {
        let mut group = uncolored_group();
        add_shape(&mut group, ShapeType::Quad, &strip(4), None, None, None, 0).expect("quad");
        let mut copy = clone_structure(&group);
        duplicate_vertices(&mut copy, &|v| {
            v.normal = [-v.normal[0], -v.normal[1], -v.normal[2]];
        });
        assert_eq!(group.indices[ShapeType::Quad.index()], vec![0, 1, 2, 3]);
        assert_eq!(copy.indices[ShapeType::Quad.index()], vec![4, 5, 6, 7]);
        let store = group.store.read();
        assert_eq!(store.normals[4][2], -store.normals[0][2]);
    }

    #[test]
    fn test_conditional_line_layout() {
        let mut group = uncolored_group();
        let start = add_conditional_line(
            &mut group,
            &[[0.0, 0.0, 0.0], [1.0, 0.0, 0.0]],
            &[[0.5, 1.0, 0.0], [0.5, -1.0, 0.0]],
            None,
            0,
        );
        assert_eq!(start, 2);
        assert_eq!(group.indices[ShapeType::ConditionalLine.index()], vec![2, 3]);
        assert_eq!(group.control_point_indices, vec![0, 1]);
        assert_eq!(group.store.read().edge_flags.len(), 0);
        remove_conditionals(&mut group);
        assert!(!has_shape(&group, ShapeType::ConditionalLine));
    }
}
