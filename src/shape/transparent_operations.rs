//! Transparent Bucket Operations - Pure DOP Functions
//!
//! The transparent bucket holds world-space triangles that are drawn far to
//! near. The sort may run on a worker thread between frame start and the
//! transparent pass.

use cgmath::{InnerSpace, Matrix4, Point3, Transform};
use rayon::prelude::*;

use super::shape_group_data::{ShapeGroupData, ShapeGroupKind, SortedTriangle, TransparentSortData};
use super::shape_group_operations::{create_shape_group, visible_index_count};
use super::shape_types::ShapeType;
use super::transfer_operations::TransferTriangle;
use crate::renderer::vertex_store_operations::push_vertex;
use crate::renderer::{SharedVertexStore, Vertex};

pub fn create_transparent_group(store: SharedVertexStore) -> ShapeGroupData {
    create_shape_group(
        store,
        ShapeGroupKind::Transparent(TransparentSortData::default()),
        false,
    )
}

/// Append one transferred triangle
pub fn add_transfer_triangle(group: &mut ShapeGroupData, triangle: &TransferTriangle) {
    let slot = ShapeType::Triangle.index();
    let mut store = group.store.write();
    for corner in 0..3 {
        let index = push_vertex(
            &mut store,
            &Vertex {
                position: triangle.positions[corner],
                normal: triangle.normals[corner],
                tex_coord: triangle.tex_coords[corner],
                color: triangle.color,
                edge: true,
            },
        );
        group.indices[slot].push(index);
    }
    group.shapes_present |= ShapeType::Triangle.bit();
}

/// Install per-step index counts and remember the unsorted order
pub fn set_step_counts(group: &mut ShapeGroupData, counts: Vec<u32>) {
    let slot = ShapeType::Triangle.index();
    group.step_counts[slot] = counts;
    let original = group.indices[slot].clone();
    if let ShapeGroupKind::Transparent(sort) = &mut group.kind {
        sort.original_indices = original;
        sort.sorted.clear();
        sort.initialized = false;
    }
}

/// Restore the unsorted order and drop the sorted records. The active index
/// range depends on the step, so the records are rebuilt on the next sort.
pub fn step_changed(group: &mut ShapeGroupData, step: Option<usize>) {
    let slot = ShapeType::Triangle.index();
    if let ShapeGroupKind::Transparent(sort) = &mut group.kind {
        if sort.original_indices.len() == group.indices[slot].len() {
            group.indices[slot].clone_from(&sort.original_indices);
        }
        sort.sorted.clear();
        sort.initialized = false;
        sort.active_step = step;
    }
}

/// Build the sorted-triangle records for the active step
pub fn init_sorted_triangles(group: &mut ShapeGroupData) {
    let step = match &group.kind {
        ShapeGroupKind::Transparent(sort) => sort.active_step,
        _ => return,
    };
    let count = visible_index_count(group, ShapeType::Triangle, step) / 3 * 3;
    let records: Vec<SortedTriangle> = {
        let store = group.store.read();
        let position = |i: u32| store.positions.get(i as usize).copied().unwrap_or_default();
        group.indices[ShapeType::Triangle.index()][..count]
            .chunks_exact(3)
            .map(|t| {
                let (a, b, c) = (position(t[0]), position(t[1]), position(t[2]));
                SortedTriangle {
                    indices: [t[0], t[1], t[2]],
                    center: [
                        (a[0] + b[0] + c[0]) / 3.0,
                        (a[1] + b[1] + c[1]) / 3.0,
                        (a[2] + b[2] + c[2]) / 3.0,
                    ],
                    depth: 0.0,
                }
            })
            .collect()
    };
    if let ShapeGroupKind::Transparent(sort) = &mut group.kind {
        sort.sorted = records;
        sort.initialized = true;
    }
}

/// Sort the active triangles far to near under `modelview` and rewrite the
/// index array in that order. Ties keep their previous relative order.
pub fn sort_triangles(group: &mut ShapeGroupData, modelview: &Matrix4<f32>) {
    let needs_init = matches!(&group.kind, ShapeGroupKind::Transparent(sort) if !sort.initialized);
    if needs_init {
        init_sorted_triangles(group);
    }
    let slot = ShapeType::Triangle.index();
    let ShapeGroupKind::Transparent(sort) = &mut group.kind else {
        return;
    };
    sort.sorted.par_iter_mut().for_each(|triangle| {
        let eye = modelview.transform_point(Point3::from(triangle.center));
        triangle.depth = (eye - Point3::new(0.0, 0.0, 0.0)).magnitude2();
    });
    sort.sorted.par_sort_by(|a, b| {
        b.depth
            .partial_cmp(&a.depth)
            .unwrap_or(std::cmp::Ordering::Equal)
    });
    for (chunk, triangle) in group.indices[slot].chunks_exact_mut(3).zip(&sort.sorted) {
        chunk.copy_from_slice(&triangle.indices);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::renderer::vertex_store_operations::create_shared_vertex_store;
    use crate::renderer::VertexStoreLayout;
    use cgmath::SquareMatrix;

    fn triangle_at(z: f32, color: u32) -> TransferTriangle {
        TransferTriangle {
            positions: [[0.0, 0.0, z], [1.0, 0.0, z], [0.0, 1.0, z]],
            normals: [[0.0, 0.0, 1.0]; 3],
            tex_coords: [[0.0; 2]; 3],
            color,
            bfc: false,
        }
    }

    fn bucket() -> ShapeGroupData {
        let store = create_shared_vertex_store(
            "transparent",
            VertexStoreLayout {
                colors: true,
                ..Default::default()
            },
        );
        create_transparent_group(store)
    }

    fn first_z(group: &ShapeGroupData, triangle: usize) -> f32 {
        let index = group.indices[ShapeType::Triangle.index()][triangle * 3];
        group.store.read().positions[index as usize][2]
    }

    #[test]
    fn test_sort_far_to_near() {
        let mut group = bucket();
        for z in [-2.0, -9.0, -5.0] {
            add_transfer_triangle(&mut group, &triangle_at(z, 0x8080_8080));
        }
        set_step_counts(&mut group, Vec::new());
        sort_triangles(&mut group, &Matrix4::identity());
        assert_eq!(first_z(&group, 0), -9.0);
        assert_eq!(first_z(&group, 1), -5.0);
        assert_eq!(first_z(&group, 2), -2.0);
    }

    #[test]
    fn test_sort_is_stable_for_ties() {
        let mut group = bucket();
        add_transfer_triangle(&mut group, &triangle_at(-3.0, 1));
        add_transfer_triangle(&mut group, &triangle_at(-3.0, 2));
        add_transfer_triangle(&mut group, &triangle_at(-1.0, 3));
        set_step_counts(&mut group, Vec::new());
        sort_triangles(&mut group, &Matrix4::identity());
        let store = group.store.read();
        let colors: Vec<u32> = group.indices[ShapeType::Triangle.index()]
            .chunks(3)
            .map(|t| store.colors[t[0] as usize])
            .collect();
        assert_eq!(colors, vec![1, 2, 3]);
    }

    #[test]
    fn test_step_limits_sorted_range() {
        let mut group = bucket();
        add_transfer_triangle(&mut group, &triangle_at(-1.0, 0x8080_8080));
        add_transfer_triangle(&mut group, &triangle_at(-8.0, 0x8080_8080));
        set_step_counts(&mut group, vec![3]);

        step_changed(&mut group, Some(0));
        sort_triangles(&mut group, &Matrix4::identity());
        // Only the first step's triangle takes part.
        assert_eq!(first_z(&group, 0), -1.0);

        step_changed(&mut group, None);
        sort_triangles(&mut group, &Matrix4::identity());
        assert_eq!(first_z(&group, 0), -8.0);

        step_changed(&mut group, Some(0));
        assert_eq!(first_z(&group, 0), -1.0);
    }
}
