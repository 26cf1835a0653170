//! Transfer Operations - Pure DOP Functions
//!
//! Moving primitives out of a group as world-space triangles, removing them
//! afterwards in one batch, and baking child groups into a parent.

use cgmath::Matrix4;
use rustc_hash::FxHashMap;

use super::shape_group_data::{ShapeGroupData, TransferRecords};
use super::shape_group_operations::is_colored;
use super::shape_types::ShapeType;
use crate::geometry::{is_mirror_matrix, normal_matrix, transform_normal, transform_point};
use crate::renderer::vertex_store_operations::{push_vertex, vertex_at};
use crate::renderer::Vertex;

/// Destination bucket of a transfer walk
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransferKind {
    Transparent,
    Texmapped,
}

/// One world-space triangle handed to a destination bucket
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TransferTriangle {
    pub positions: [[f32; 3]; 3],
    pub normals: [[f32; 3]; 3],
    pub tex_coords: [[f32; 2]; 3],
    pub color: u32,
    /// Source group was a BFC group
    pub bfc: bool,
}

struct TransferContext<'a> {
    matrix: &'a Matrix4<f32>,
    normals: cgmath::Matrix3<f32>,
    mirrored: bool,
    bfc: bool,
}

/// Referenced vertices of a group with their raw color, if the store has one
type VertexSnapshot = FxHashMap<u32, (Vertex, Option<u32>)>;

fn emit_triangle(
    vertices: &VertexSnapshot,
    ctx: &TransferContext<'_>,
    corners: [u32; 3],
    color: u32,
    sink: &mut dyn FnMut(TransferTriangle),
) {
    // A mirroring transform flips winding, so swap two corners back.
    let order = if ctx.mirrored { [0, 2, 1] } else { [0, 1, 2] };
    let mut triangle = TransferTriangle {
        positions: [[0.0; 3]; 3],
        normals: [[0.0; 3]; 3],
        tex_coords: [[0.0; 2]; 3],
        color,
        bfc: ctx.bfc,
    };
    for (slot, &corner) in order.iter().enumerate() {
        let vertex = vertices
            .get(&corners[corner])
            .map(|(vertex, _)| *vertex)
            .unwrap_or_default();
        triangle.positions[slot] = transform_point(ctx.matrix, vertex.position);
        triangle.normals[slot] = transform_normal(&ctx.normals, vertex.normal);
        triangle.tex_coords[slot] = vertex.tex_coord;
    }
    sink(triangle);
}

/// Walk every transferable primitive from last to first, hand the ones
/// `should_transfer` accepts to `sink` as world-space triangles, and record
/// their positions for `cleanup_transfer`.
///
/// `should_transfer` receives the kind, the store index of the primitive's
/// first vertex, and its resolved color. With `record` set, the positions
/// of transferred primitives are kept for `cleanup_transfer`, but only on
/// the first walk over a shared group.
#[allow(clippy::too_many_arguments)]
pub fn transfer_group(
    group: &mut ShapeGroupData,
    kind: TransferKind,
    record: bool,
    inherited_color: u32,
    matrix: &Matrix4<f32>,
    should_transfer: &mut dyn FnMut(ShapeType, u32, u32) -> bool,
    sink: &mut dyn FnMut(TransferTriangle),
) {
    let record = record && !group.transfer_recorded;
    let colored = is_colored(group);
    let ctx = TransferContext {
        matrix,
        normals: normal_matrix(matrix),
        mirrored: is_mirror_matrix(matrix),
        bfc: group.bfc,
    };
    let walked = |shape: ShapeType| {
        !shape.is_line() && (kind == TransferKind::Transparent || shape.is_texmappable())
    };

    // Copy out only what this group references, so the sink may lock
    // other stores and shared stores are not copied per instance.
    let vertices: VertexSnapshot = {
        let store = group.store.read();
        ShapeType::ALL
            .into_iter()
            .filter(|&shape| walked(shape))
            .flat_map(|shape| group.indices[shape.index()].iter().copied())
            .map(|i| (i, (vertex_at(&store, i), store.colors.get(i as usize).copied())))
            .collect()
    };
    let color_of = |index: u32| {
        if colored {
            vertices
                .get(&index)
                .and_then(|(_, color)| *color)
                .unwrap_or(inherited_color)
        } else {
            inherited_color
        }
    };

    let mut records = TransferRecords::default();
    for shape in ShapeType::ALL {
        if !walked(shape) {
            continue;
        }
        let slot = shape.index();
        let indices = &group.indices[slot];
        if indices.is_empty() {
            continue;
        }

        if !shape.is_strip() {
            let size = shape.points();
            let mut i = indices.len() as isize - size as isize;
            while i >= 0 {
                let at = i as usize;
                let first = indices[at];
                let color = color_of(first);
                if should_transfer(shape, first, color) {
                    emit_triangle(&vertices, &ctx, [first, indices[at + 1], indices[at + 2]], color, sink);
                    if size == 4 {
                        emit_triangle(&vertices, &ctx, [first, indices[at + 2], indices[at + 3]], color, sink);
                    }
                    records.ranges[slot].push((at as u32, size as u32));
                }
                i -= size as isize;
            }
            continue;
        }

        let counts = &group.strip_counts[slot];
        let mut offset = indices.len();
        for strip in (0..counts.len()).rev() {
            let count = counts[strip] as usize;
            offset -= count;
            let first = indices[offset];
            let color = color_of(first);
            if !should_transfer(shape, first, color) {
                continue;
            }
            for j in offset..offset + count - 2 {
                let corners = match shape {
                    ShapeType::TriangleFan => [indices[offset], indices[j + 1], indices[j + 2]],
                    _ if (j - offset) % 2 == 1 => [indices[j], indices[j + 2], indices[j + 1]],
                    _ => [indices[j], indices[j + 1], indices[j + 2]],
                };
                emit_triangle(&vertices, &ctx, corners, color, sink);
            }
            records.strips[slot].push(strip as u32);
        }
    }

    if record {
        group.transfer_records = records;
        group.transfer_recorded = true;
    }
}

/// Remove everything recorded by the first transfer walk. Returns the
/// records so structurally identical variant groups can apply them too.
pub fn cleanup_transfer(group: &mut ShapeGroupData) -> TransferRecords {
    let records = std::mem::take(&mut group.transfer_records);
    apply_transfer_records(group, &records);
    records
}

/// Remove recorded primitives and shift step snapshots past them
pub fn apply_transfer_records(group: &mut ShapeGroupData, records: &TransferRecords) {
    for shape in ShapeType::ALL {
        let slot = shape.index();

        let mut ranges = records.ranges[slot].clone();
        ranges.sort_unstable_by(|a, b| b.0.cmp(&a.0));
        ranges.dedup();
        for (start, len) in ranges {
            let (start, end) = (start as usize, (start + len) as usize);
            if end > group.indices[slot].len() {
                continue;
            }
            group.indices[slot].drain(start..end);
            for snapshot in group.step_counts[slot].iter_mut() {
                let c = *snapshot as usize;
                if c >= end {
                    *snapshot -= len;
                } else if c > start {
                    *snapshot = start as u32;
                }
            }
        }

        let mut strips = records.strips[slot].clone();
        strips.sort_unstable_by(|a, b| b.cmp(a));
        strips.dedup();
        for strip in strips {
            let s = strip as usize;
            if s >= group.strip_counts[slot].len() {
                continue;
            }
            let offset: usize = group.strip_counts[slot][..s].iter().map(|&c| c as usize).sum();
            let count = group.strip_counts[slot].remove(s) as usize;
            group.indices[slot].drain(offset..offset + count);
            for snapshot in group.step_counts[slot].iter_mut() {
                if *snapshot > strip {
                    *snapshot -= 1;
                }
            }
        }

        if group.indices[slot].is_empty() {
            group.shapes_present &= !shape.bit();
        }
    }
}

/// Bake `src` into `dst` under `matrix`.
///
/// Colored destinations take `color` when given, else the source's own
/// vertex colors. Conditional control points come along with their lines.
pub fn flatten_into(
    dst: &mut ShapeGroupData,
    src: &ShapeGroupData,
    matrix: &Matrix4<f32>,
    color: Option<u32>,
) {
    let normals = normal_matrix(matrix);
    let src_colored = is_colored(src);
    let bake = |vertex: Vertex| {
        let mut out = vertex;
        out.position = transform_point(matrix, vertex.position);
        out.normal = transform_normal(&normals, vertex.normal);
        out.color = match color {
            Some(c) => c,
            None if src_colored => vertex.color,
            None => 0,
        };
        out
    };

    // Copy out first: source and destination often share one store.
    let (copied, controls): (Vec<Vec<Vertex>>, Vec<Vertex>) = {
        let store = src.store.read();
        let copied = src
            .indices
            .iter()
            .map(|indices| indices.iter().map(|&i| bake(vertex_at(&store, i))).collect())
            .collect();
        let controls = src
            .control_point_indices
            .iter()
            .map(|&i| bake(vertex_at(&store, i)))
            .collect();
        (copied, controls)
    };

    let mut store = dst.store.write();
    for shape in ShapeType::ALL {
        let slot = shape.index();
        if copied[slot].is_empty() {
            continue;
        }
        for vertex in &copied[slot] {
            let index = push_vertex(&mut store, vertex);
            dst.indices[slot].push(index);
        }
        if shape.is_strip() {
            dst.strip_counts[slot].extend_from_slice(&src.strip_counts[slot]);
        }
        dst.shapes_present |= shape.bit();
    }
    for vertex in &controls {
        let index = push_vertex(&mut store, vertex);
        dst.control_point_indices.push(index);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::renderer::vertex_store_operations::create_shared_vertex_store;
    use crate::renderer::VertexStoreLayout;
    use crate::shape::ShapeGroupKind;
    use crate::shape::shape_group_operations::{
        add_shape, create_shape_group, index_count, next_step, strip_counts_consistent,
    };
    use cgmath::{SquareMatrix, Vector3};

    const OPAQUE_RED: u32 = 0xFF00_00FF;
    const CLEAR_BLUE: u32 = 0x0000_FF80;

    fn colored_group() -> ShapeGroupData {
        let store = create_shared_vertex_store(
            "colored",
            VertexStoreLayout {
                colors: true,
                ..Default::default()
            },
        );
        create_shape_group(store, ShapeGroupKind::Colored, false)
    }

    fn tri(offset: f32) -> [[f32; 3]; 3] {
        [[offset, 0.0, 0.0], [offset + 1.0, 0.0, 0.0], [offset, 1.0, 0.0]]
    }

    fn is_clear(_: ShapeType, _: u32, color: u32) -> bool {
        color & 0xFF < 240
    }

    #[test]
    fn test_transfer_and_cleanup_colored() {
        let mut group = colored_group();
        add_shape(&mut group, ShapeType::Triangle, &tri(0.0), None, None, Some(OPAQUE_RED), 0)
            .expect("opaque");
        next_step(&mut group);
        add_shape(&mut group, ShapeType::Triangle, &tri(5.0), None, None, Some(CLEAR_BLUE), 1)
            .expect("clear");
        add_shape(&mut group, ShapeType::Triangle, &tri(9.0), None, None, Some(OPAQUE_RED), 1)
            .expect("opaque");

        let matrix = Matrix4::from_translation(Vector3::new(0.0, 0.0, 10.0));
        let mut moved = Vec::new();
        transfer_group(
            &mut group,
            TransferKind::Transparent,
            true,
            0,
            &matrix,
            &mut is_clear,
            &mut |t| moved.push(t),
        );
        assert_eq!(moved.len(), 1);
        assert_eq!(moved[0].positions[0], [5.0, 0.0, 10.0]);
        assert_eq!(moved[0].color, CLEAR_BLUE);

        let before = index_count(&group, ShapeType::Triangle);
        cleanup_transfer(&mut group);
        assert_eq!(index_count(&group, ShapeType::Triangle), before - 3);
        assert_eq!(group.indices[ShapeType::Triangle.index()], vec![0, 1, 2, 6, 7, 8]);
        assert_eq!(group.step_counts[ShapeType::Triangle.index()], vec![3]);
    }

    #[test]
    fn test_second_walk_does_not_rerecord() {
        let mut group = colored_group();
        add_shape(&mut group, ShapeType::Quad, &[[0.0; 3], [1.0, 0.0, 0.0], [1.0, 1.0, 0.0], [0.0, 1.0, 0.0]], None, None, Some(CLEAR_BLUE), 0)
            .expect("quad");
        let mut count = 0;
        for _ in 0..2 {
            transfer_group(
                &mut group,
                TransferKind::Transparent,
                true,
                0,
                &Matrix4::identity(),
                &mut is_clear,
                &mut |_| count += 1,
            );
        }
        // Two instances, two triangles each.
        assert_eq!(count, 4);
        assert_eq!(group.transfer_records.ranges[ShapeType::Quad.index()], vec![(0, 4)]);
        cleanup_transfer(&mut group);
        assert_eq!(index_count(&group, ShapeType::Quad), 0);
    }

    #[test]
    fn test_strip_decomposition_and_removal() {
        let mut group = colored_group();
        let strip: Vec<[f32; 3]> = (0..5).map(|i| [i as f32, (i % 2) as f32, 0.0]).collect();
        add_shape(&mut group, ShapeType::TriangleStrip, &strip, None, None, Some(OPAQUE_RED), 0)
            .expect("strip");
        add_shape(&mut group, ShapeType::TriangleStrip, &strip, None, None, Some(CLEAR_BLUE), 0)
            .expect("strip");
        let mut moved = Vec::new();
        transfer_group(
            &mut group,
            TransferKind::Transparent,
            true,
            0,
            &Matrix4::identity(),
            &mut is_clear,
            &mut |t| moved.push(t),
        );
        assert_eq!(moved.len(), 3);
        // Odd triangles of a strip swap their last two corners.
        assert_eq!(moved[1].positions, [strip[1], strip[3], strip[2]]);
        cleanup_transfer(&mut group);
        assert_eq!(group.strip_counts[ShapeType::TriangleStrip.index()], vec![5]);
        assert!(strip_counts_consistent(&group));
    }

    #[test]
    fn test_unrecorded_walk_keeps_geometry() {
        let store = create_shared_vertex_store("plain", VertexStoreLayout::default());
        let mut group = create_shape_group(store, ShapeGroupKind::Uncolored, false);
        add_shape(&mut group, ShapeType::Triangle, &tri(0.0), None, None, None, 0).expect("t");
        let mut moved = 0;
        transfer_group(
            &mut group,
            TransferKind::Transparent,
            false,
            CLEAR_BLUE,
            &Matrix4::identity(),
            &mut is_clear,
            &mut |_| moved += 1,
        );
        assert_eq!(moved, 1);
        cleanup_transfer(&mut group);
        assert_eq!(index_count(&group, ShapeType::Triangle), 3);
    }

    #[test]
    fn test_shared_store_walk_sees_only_own_primitives() {
        let store = create_shared_vertex_store(
            "colored",
            VertexStoreLayout {
                colors: true,
                ..Default::default()
            },
        );
        let mut other = create_shape_group(store.clone(), ShapeGroupKind::Colored, false);
        for i in 0..50 {
            add_shape(&mut other, ShapeType::Triangle, &tri(i as f32), None, None, Some(CLEAR_BLUE), 0)
                .expect("other");
        }
        let mut group = create_shape_group(store, ShapeGroupKind::Colored, false);
        add_shape(&mut group, ShapeType::Triangle, &tri(100.0), None, None, Some(CLEAR_BLUE), 0)
            .expect("own");
        add_shape(&mut group, ShapeType::Triangle, &tri(200.0), None, None, Some(OPAQUE_RED), 0)
            .expect("own opaque");

        let mut moved = Vec::new();
        transfer_group(
            &mut group,
            TransferKind::Transparent,
            true,
            0,
            &Matrix4::identity(),
            &mut is_clear,
            &mut |t| moved.push(t),
        );
        assert_eq!(moved.len(), 1);
        assert_eq!(moved[0].positions[0], [100.0, 0.0, 0.0]);
        assert_eq!(moved[0].color, CLEAR_BLUE);
    }

    #[test]
    fn test_texmapped_walk_records_removals() {
        let store = create_shared_vertex_store("plain", VertexStoreLayout::default());
        let mut group = create_shape_group(store, ShapeGroupKind::Uncolored, false);
        add_shape(&mut group, ShapeType::Triangle, &tri(0.0), None, None, None, 0).expect("mapped");
        add_shape(&mut group, ShapeType::Triangle, &tri(4.0), None, None, None, 0).expect("plain");
        let mut moved = 0;
        transfer_group(
            &mut group,
            TransferKind::Texmapped,
            true,
            OPAQUE_RED,
            &Matrix4::identity(),
            &mut |_, first, _| first < 3,
            &mut |_| moved += 1,
        );
        assert_eq!(moved, 1);
        cleanup_transfer(&mut group);
        assert_eq!(group.indices[ShapeType::Triangle.index()], vec![3, 4, 5]);
    }

    #[test]
    fn test_flatten_shares_store() {
        let store = create_shared_vertex_store("shared", VertexStoreLayout::default());
        let mut parent = create_shape_group(store.clone(), ShapeGroupKind::Uncolored, false);
        let mut child = create_shape_group(store, ShapeGroupKind::Uncolored, false);
        add_shape(&mut child, ShapeType::Triangle, &tri(0.0), None, None, None, 0).expect("t");
        let matrix = Matrix4::from_translation(Vector3::new(2.0, 0.0, 0.0));
        flatten_into(&mut parent, &child, &matrix, None);
        assert_eq!(parent.indices[ShapeType::Triangle.index()], vec![3, 4, 5]);
        assert_eq!(parent.store.read().positions[3], [2.0, 0.0, 0.0]);
    }
}
