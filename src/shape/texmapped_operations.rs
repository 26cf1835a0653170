//! Texmapped Bucket Operations - Pure DOP Functions

use super::shape_group_data::{ShapeGroupData, ShapeGroupKind, TexmappedGroupData, TexturedRange};
use super::shape_group_operations::create_shape_group;
use super::shape_types::ShapeType;
use super::transfer_operations::TransferTriangle;
use crate::constants::color::WHITE;
use crate::renderer::vertex_store_operations::push_vertex;
use crate::renderer::{SharedVertexStore, Vertex};

pub fn create_texmapped_group(store: SharedVertexStore, bfc: bool) -> ShapeGroupData {
    create_shape_group(
        store,
        ShapeGroupKind::Texmapped(TexmappedGroupData::default()),
        bfc,
    )
}

/// Append one triangle drawn with `texture`. The texture modulates white,
/// so the vertex color is always opaque white. Consecutive triangles with
/// the same texture extend one range.
pub fn add_texmapped_triangle(group: &mut ShapeGroupData, triangle: &TransferTriangle, texture: &str) {
    let slot = ShapeType::Triangle.index();
    let position = group.indices[slot].len() as u32;
    {
        let mut store = group.store.write();
        for corner in 0..3 {
            let index = push_vertex(
                &mut store,
                &Vertex {
                    position: triangle.positions[corner],
                    normal: triangle.normals[corner],
                    tex_coord: triangle.tex_coords[corner],
                    color: WHITE,
                    edge: true,
                },
            );
            group.indices[slot].push(index);
        }
    }
    group.shapes_present |= ShapeType::Triangle.bit();

    let ShapeGroupKind::Texmapped(data) = &mut group.kind else {
        return;
    };
    match data.ranges.last_mut() {
        Some(last) if last.texture == texture && last.start + last.count == position => {
            last.count += 3;
        }
        _ => data.ranges.push(TexturedRange {
            texture: texture.to_string(),
            start: position,
            count: 3,
        }),
    }
}
