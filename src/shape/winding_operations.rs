//! Winding Operations - Pure DOP Functions
//!
//! Reversal of primitive winding for inverted and un-mirrored model
//! variants. Every primitive is reversed within its own index range, so
//! step snapshots and transfer positions stay valid.

use super::shape_group_data::ShapeGroupData;
use super::shape_group_operations::duplicate_vertices;
use super::shape_types::ShapeType;

/// Reverse the winding of one primitive kind in place.
/// Returns the number of strips left untouched.
fn reverse_winding(group: &mut ShapeGroupData, shape: ShapeType) -> usize {
    let slot = shape.index();
    let mut skipped = 0;
    if !shape.is_strip() {
        let size = shape.points();
        for chunk in group.indices[slot].chunks_mut(size) {
            chunk.reverse();
        }
        return skipped;
    }

    let (indices, counts) = (&mut group.indices[slot], &group.strip_counts[slot]);
    let mut offset = 0usize;
    for &count in counts {
        let count = count as usize;
        let strip = &mut indices[offset..offset + count];
        match shape {
            ShapeType::TriangleStrip => {
                if count % 2 == 1 {
                    strip.reverse();
                } else {
                    skipped += 1;
                }
            }
            ShapeType::QuadStrip => {
                for pair in strip.chunks_mut(2) {
                    pair.swap(0, 1);
                }
            }
            ShapeType::TriangleFan => strip[1..].reverse(),
            _ => {}
        }
        offset += count;
    }
    skipped
}

fn reverse_all(group: &mut ShapeGroupData, origin: &str) {
    for shape in ShapeType::ALL {
        if shape.is_line() {
            continue;
        }
        let skipped = reverse_winding(group, shape);
        if skipped > 0 {
            log::warn!(
                "[ShapeGroup::{}] {} even-length triangle strips keep their winding",
                origin,
                skipped
            );
        }
    }
}

/// Reverse winding and flip normals. Affected vertices are duplicated first
/// so vertices shared with the source group are never touched.
pub fn invert(group: &mut ShapeGroupData) {
    duplicate_vertices(group, &|vertex| {
        vertex.normal = [-vertex.normal[0], -vertex.normal[1], -vertex.normal[2]];
    });
    reverse_all(group, "invert");
}

/// Undo the winding flip of a negative-determinant transform. Texture
/// coordinates are mirrored horizontally when the store carries them.
pub fn un_mirror(group: &mut ShapeGroupData) {
    if group.store.read().layout.tex_coords {
        duplicate_vertices(group, &|vertex| {
            vertex.tex_coord[0] = 1.0 - vertex.tex_coord[0];
        });
    }
    reverse_all(group, "un_mirror");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::renderer::vertex_store_operations::create_shared_vertex_store;
    use crate::renderer::VertexStoreLayout;
    use crate::shape::shape_group_data::ShapeGroupKind;
    use crate::shape::shape_group_operations::{
        add_shape, clone_structure, create_shape_group, strip_counts_consistent,
    };

    fn points(n: usize) -> Vec<[f32; 3]> {
        (0..n).map(|i| [i as f32, (i % 2) as f32, 0.0]).collect()
    }

    fn group_with(shape: ShapeType, n: usize) -> ShapeGroupData {
        let store = create_shared_vertex_store("winding", VertexStoreLayout::default());
        let mut group = create_shape_group(store, ShapeGroupKind::Uncolored, true);
        add_shape(&mut group, shape, &points(n), None, None, None, 0).expect("shape");
        group
    }

    #[test]
    fn test_invert_triangle_flips_normals() {
        let source = group_with(ShapeType::Triangle, 3);
        let mut inverted = clone_structure(&source);
        invert(&mut inverted);
        assert_eq!(inverted.indices[ShapeType::Triangle.index()], vec![5, 4, 3]);
        let store = source.store.read();
        assert_eq!(store.normals[3][2], -store.normals[0][2]);
        assert_eq!(source.indices[ShapeType::Triangle.index()], vec![0, 1, 2]);
    }

    #[test]
    fn test_quad_strip_swaps_pairs() {
        let mut group = group_with(ShapeType::QuadStrip, 6);
        un_mirror(&mut group);
        assert_eq!(group.indices[ShapeType::QuadStrip.index()], vec![1, 0, 3, 2, 5, 4]);
        assert!(strip_counts_consistent(&group));
    }

    #[test]
    fn test_even_triangle_strip_left_alone() {
        let mut group = group_with(ShapeType::TriangleStrip, 4);
        un_mirror(&mut group);
        assert_eq!(group.indices[ShapeType::TriangleStrip.index()], vec![0, 1, 2, 3]);

        let mut odd = group_with(ShapeType::TriangleStrip, 5);
        un_mirror(&mut odd);
        assert_eq!(odd.indices[ShapeType::TriangleStrip.index()], vec![4, 3, 2, 1, 0]);
    }

    #[test]
    fn test_fan_keeps_center() {
        let mut group = group_with(ShapeType::TriangleFan, 5);
        un_mirror(&mut group);
        assert_eq!(group.indices[ShapeType::TriangleFan.index()], vec![0, 4, 3, 2, 1]);
    }

    #[test]
    fn test_un_mirror_tex_coords() {
        let store = create_shared_vertex_store(
            "textured",
            VertexStoreLayout {
                tex_coords: true,
                ..Default::default()
            },
        );
        let mut group = create_shape_group(store, ShapeGroupKind::Uncolored, false);
        let uvs = [[0.25, 0.0], [1.0, 0.0], [0.0, 1.0]];
        add_shape(&mut group, ShapeType::Triangle, &points(3), None, Some(&uvs), None, 0)
            .expect("triangle");
        un_mirror(&mut group);
        let store = group.store.read();
        let first = group.indices[ShapeType::Triangle.index()][2] as usize;
        assert_eq!(store.tex_coords[first], [0.75, 0.0]);
    }
}
