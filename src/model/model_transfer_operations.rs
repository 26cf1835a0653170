//! Model Transfer Operations - Pure DOP Functions
//!
//! Walks that move geometry out of the model graph into the scene-level
//! transparent and texmapped buckets.

use std::cell::Cell;

use cgmath::{Matrix4, SquareMatrix};
use rustc_hash::{FxHashMap, FxHashSet};

use super::model_data::{ModelArena, ModelHandle, TexmapInfo};
use super::model_operations::model;
use super::texmap_operations::{geometry_slot, texture_coords, transform_texmap};
use crate::constants::color::{alpha, WHITE};
use crate::error::EngineResult;
use crate::geometry::{normal_matrix, transform_normal, transform_point};
use crate::renderer::vertex_store_operations::{set_normal, vertex_at};
use crate::shape::transfer_operations::{apply_transfer_records, cleanup_transfer, transfer_group};
use crate::shape::{Section, ShapeGroupData, ShapeType, TransferKind, TransferRecords, TransferTriangle};
use crate::smoothing::smoother_operations::should_flip_normal;

/// A transferred triangle with the build step it belongs to
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SteppedTriangle {
    pub step: usize,
    pub triangle: TransferTriangle,
}

fn flip_triangle(triangle: &mut TransferTriangle) {
    triangle.positions.swap(1, 2);
    triangle.normals.swap(1, 2);
    triangle.tex_coords.swap(1, 2);
    for normal in triangle.normals.iter_mut() {
        *normal = normal.map(|c| -c);
    }
}

/// First step whose snapshot already covers `position`
fn step_of(boundaries: &[u32], position: u32, last: usize) -> usize {
    boundaries
        .iter()
        .position(|&count| count > position)
        .unwrap_or(last)
}

/// Collect every triangle below `root` whose resolved color is transparent.
///
/// Uncolored geometry only transfers under a transparent instance color.
/// Colored groups record what they gave away for `cleanup_transparent`.
pub fn transfer_transparent(
    arena: &mut ModelArena,
    root: ModelHandle,
    alpha_threshold: u8,
) -> EngineResult<Vec<SteppedTriangle>> {
    let mut out = Vec::new();
    transfer_transparent_below(
        arena,
        root,
        &Matrix4::identity(),
        WHITE,
        false,
        alpha_threshold,
        None,
        &mut out,
    )?;
    log::debug!(
        "[GeometryModel::transfer_transparent] {} triangles moved to the transparent bucket",
        out.len()
    );
    Ok(out)
}

#[allow(clippy::too_many_arguments)]
fn transfer_transparent_below(
    arena: &mut ModelArena,
    handle: ModelHandle,
    matrix: &Matrix4<f32>,
    inherited_color: u32,
    inverted: bool,
    alpha_threshold: u8,
    step: Option<usize>,
    out: &mut Vec<SteppedTriangle>,
) -> EngineResult<()> {
    let (sub_models, sub_model_step_counts, steps_taken) = {
        let m = model(arena, handle)?;
        (m.sub_models.clone(), m.sub_model_step_counts.clone(), m.steps_taken)
    };
    let inherited_transparent = alpha(inherited_color) < alpha_threshold;

    for section in Section::ALL.into_iter().filter(|s| s.is_transferable()) {
        for colored in [false, true] {
            if !colored && !inherited_transparent {
                continue;
            }
            let Some(group) = arena.models[handle.0 as usize].groups[section.index()][colored as usize].as_mut()
            else {
                continue;
            };
            // Only the root has no step. Its primitives take the step their
            // vertices were added in.
            let boundaries = match step {
                Some(_) => Vec::new(),
                None => group.store.read().step_boundaries.clone(),
            };
            let current = Cell::new(step.unwrap_or(steps_taken));
            transfer_group(
                group,
                TransferKind::Transparent,
                colored,
                inherited_color,
                matrix,
                &mut |_, first, color| {
                    let transfer = alpha(color) < alpha_threshold;
                    if transfer && step.is_none() {
                        current.set(step_of(&boundaries, first, steps_taken));
                    }
                    transfer
                },
                &mut |mut triangle| {
                    if inverted {
                        flip_triangle(&mut triangle);
                    }
                    out.push(SteppedTriangle {
                        step: current.get(),
                        triangle,
                    });
                },
            );
        }
    }

    for (i, sub) in sub_models.iter().enumerate().filter(|(_, s)| !s.light) {
        let child_step = step.unwrap_or_else(|| step_of(&sub_model_step_counts, i as u32, steps_taken));
        transfer_transparent_below(
            arena,
            sub.model,
            &(matrix * sub.matrix),
            sub.color.unwrap_or(inherited_color),
            inverted ^ sub.bfc_invert,
            alpha_threshold,
            Some(child_step),
            out,
        )?;
    }
    Ok(())
}

/// Remove primitives moved to the transparent bucket from their source
/// groups, replaying the removals on any variant built from the same group.
pub fn cleanup_transparent(arena: &mut ModelArena) {
    let removed = cleanup_transferred(arena);
    log::debug!("[GeometryModel::cleanup_transparent] Cleaned {} groups", removed);
}

/// Remove directly texmapped primitives from their source groups. Geometry
/// reached through an instance inside a region stays, since the instanced
/// model is shared.
pub fn cleanup_texmapped(arena: &mut ModelArena) {
    let removed = cleanup_transferred(arena);
    log::debug!("[GeometryModel::cleanup_texmapped] Cleaned {} groups", removed);
}

fn cleanup_transferred(arena: &mut ModelArena) -> usize {
    let mut removed = 0usize;
    for index in 0..arena.models.len() {
        let variants: Vec<usize> = {
            let m = &arena.models[index];
            let mut variants: Vec<usize> = [m.inverted_model, m.un_mirrored_model]
                .into_iter()
                .flatten()
                .map(|h| h.0 as usize)
                .collect();
            if let Some(cross) = m
                .un_mirrored_model
                .and_then(|u| arena.models.get(u.0 as usize))
                .and_then(|u| u.inverted_model)
            {
                variants.push(cross.0 as usize);
            }
            variants.retain(|&v| v != index);
            variants.sort_unstable();
            variants.dedup();
            variants
        };
        for slot in 0..Section::ALL.len() {
            for colored in 0..2 {
                let Some(group) = arena.models[index].groups[slot][colored].as_mut() else {
                    continue;
                };
                if !group.transfer_recorded {
                    continue;
                }
                let records = cleanup_transfer(group);
                if records == TransferRecords::default() {
                    continue;
                }
                removed += 1;
                for &variant in &variants {
                    if let Some(copy) = arena.models[variant].groups[slot][colored].as_mut() {
                        if !copy.transfer_recorded {
                            apply_transfer_records(copy, &records);
                            copy.transfer_recorded = true;
                        }
                    }
                }
            }
        }
    }
    // Later walks record afresh.
    for m in arena.models.iter_mut() {
        for group in m.groups.iter_mut().flatten().flatten() {
            group.transfer_recorded = false;
        }
    }
    removed
}

/// Hand every triangle covered by a texture-map region to `sink`, with
/// texture coordinates filled in. The outermost active region wins.
///
/// Directly mapped primitives are recorded for `cleanup_texmapped`. The
/// removal waits until smoothed normals have been copied over.
pub fn transfer_texmapped(
    arena: &mut ModelArena,
    root: ModelHandle,
    sink: &mut dyn FnMut(SteppedTriangle, &str),
) -> EngineResult<()> {
    transfer_texmapped_below(arena, root, &Matrix4::identity(), WHITE, false, None, None, sink)
}

#[allow(clippy::too_many_arguments)]
fn transfer_texmapped_below(
    arena: &mut ModelArena,
    handle: ModelHandle,
    matrix: &Matrix4<f32>,
    inherited_color: u32,
    inverted: bool,
    active: Option<&TexmapInfo>,
    step: Option<usize>,
    sink: &mut dyn FnMut(SteppedTriangle, &str),
) -> EngineResult<()> {
    let (sub_models, sub_model_step_counts, steps_taken, locals) = {
        let m = model(arena, handle)?;
        let locals: Vec<TexmapInfo> = match active {
            Some(_) => Vec::new(),
            None => m.texmaps.iter().map(|t| transform_texmap(t, matrix)).collect(),
        };
        (
            m.sub_models.clone(),
            m.sub_model_step_counts.clone(),
            m.steps_taken,
            locals,
        )
    };
    if active.is_none() && locals.is_empty() && sub_models.is_empty() {
        return Ok(());
    }

    let sections = Section::ALL
        .into_iter()
        .filter(|s| s.is_smoothable() && (active.is_some() || !locals.is_empty()));
    for section in sections {
        for colored in [false, true] {
            let slot = geometry_slot(colored, section.is_bfc());
            let Some(group) = arena.models[handle.0 as usize].groups[section.index()][colored as usize].as_mut()
            else {
                continue;
            };
            let boundaries = match step {
                Some(_) => Vec::new(),
                None => group.store.read().step_boundaries.clone(),
            };
            let matched = Cell::new(0usize);
            let current = Cell::new(step.unwrap_or(steps_taken));
            transfer_group(
                group,
                TransferKind::Texmapped,
                active.is_none(),
                inherited_color,
                matrix,
                &mut |_, first, _| {
                    let hit = match active {
                        Some(_) => true,
                        None => match locals.iter().position(|info| info.geometry[slot].contains(&first)) {
                            Some(k) => {
                                matched.set(k);
                                true
                            }
                            None => false,
                        },
                    };
                    if hit && step.is_none() {
                        current.set(step_of(&boundaries, first, steps_taken));
                    }
                    hit
                },
                &mut |mut triangle| {
                    let Some(info) = active.or_else(|| locals.get(matched.get())) else {
                        return;
                    };
                    if inverted {
                        flip_triangle(&mut triangle);
                    }
                    triangle.tex_coords = texture_coords(info, &triangle.positions);
                    sink(
                        SteppedTriangle {
                            step: current.get(),
                            triangle,
                        },
                        &info.texture,
                    );
                },
            );
        }
    }

    for (i, sub) in sub_models.iter().enumerate().filter(|(_, s)| !s.light) {
        let region = match active {
            Some(info) => Some(info),
            None => locals
                .iter()
                .find(|info| i >= info.sub_model_offset && i < info.sub_model_offset + info.sub_model_count),
        };
        let child_step = step.unwrap_or_else(|| step_of(&sub_model_step_counts, i as u32, steps_taken));
        transfer_texmapped_below(
            arena,
            sub.model,
            &(matrix * sub.matrix),
            sub.color.unwrap_or(inherited_color),
            inverted ^ sub.bfc_invert,
            region,
            Some(child_step),
            sink,
        )?;
    }
    Ok(())
}

const CORNER_GRID: f32 = 1000.0;
const CORNER_TOLERANCE: f32 = 1e-4;

/// Texmapped triangles of one bucket, found by any of their corners
#[derive(Default)]
struct TexmappedLookup {
    corners: Vec<[[f32; 3]; 3]>,
    normals: Vec<[[f32; 3]; 3]>,
    vertices: Vec<[u32; 3]>,
    by_corner: FxHashMap<[i64; 3], Vec<usize>>,
}

fn corner_key(p: [f32; 3]) -> [i64; 3] {
    p.map(|c| (c * CORNER_GRID).round() as i64)
}

fn close(a: [f32; 3], b: [f32; 3]) -> bool {
    a.iter().zip(b.iter()).all(|(x, y)| (x - y).abs() <= CORNER_TOLERANCE)
}

fn texmapped_lookup(group: &ShapeGroupData) -> TexmappedLookup {
    let store = group.store.read();
    let mut lookup = TexmappedLookup::default();
    for (t, chunk) in group.indices[ShapeType::Triangle.index()].chunks_exact(3).enumerate() {
        let vertices = [chunk[0], chunk[1], chunk[2]];
        let corners = vertices.map(|i| vertex_at(&store, i).position);
        for corner in corners {
            let entry = lookup.by_corner.entry(corner_key(corner)).or_default();
            if !entry.contains(&t) {
                entry.push(t);
            }
        }
        lookup.corners.push(corners);
        lookup.normals.push(vertices.map(|i| vertex_at(&store, i).normal));
        lookup.vertices.push(vertices);
    }
    lookup
}

/// Texmapped corner each source corner lands on, when the two triangles
/// cover the same points in any order
fn corner_match(source: &[[f32; 3]; 3], target: &[[f32; 3]; 3]) -> Option<[usize; 3]> {
    let mut map = [0usize; 3];
    let mut used = [false; 3];
    for (i, &p) in source.iter().enumerate() {
        let j = (0..3).find(|&j| !used[j] && close(p, target[j]))?;
        used[j] = true;
        map[i] = j;
    }
    Some(map)
}

fn find_texmapped(lookup: &TexmappedLookup, positions: &[[f32; 3]; 3]) -> Option<(usize, [usize; 3])> {
    positions
        .iter()
        .filter_map(|p| lookup.by_corner.get(&corner_key(*p)))
        .flatten()
        .find_map(|&t| corner_match(positions, &lookup.corners[t]).map(|map| (t, map)))
}

/// `(triangle, store index, normal)` writes per texmapped bucket
type NormalUpdates = [Vec<(usize, u32, [f32; 3])>; 2];

fn smooth_normals_below(
    arena: &ModelArena,
    handle: ModelHandle,
    matrix: &Matrix4<f32>,
    lookups: &[TexmappedLookup; 2],
    updates: &mut NormalUpdates,
) {
    let Some(m) = arena.models.get(handle.0 as usize) else {
        return;
    };
    let normals = normal_matrix(matrix);
    for section in [Section::Standard, Section::Bfc] {
        let target = section.is_bfc() as usize;
        let lookup = &lookups[target];
        if lookup.corners.is_empty() {
            continue;
        }
        for group in m.groups[section.index()].iter().flatten() {
            let store = group.store.read();
            for (shape, size) in [(ShapeType::Triangle, 3), (ShapeType::Quad, 4)] {
                for primitive in group.indices[shape.index()].chunks_exact(size) {
                    let halves = if size == 4 {
                        vec![
                            [primitive[0], primitive[1], primitive[2]],
                            [primitive[0], primitive[2], primitive[3]],
                        ]
                    } else {
                        vec![[primitive[0], primitive[1], primitive[2]]]
                    };
                    for corners in halves {
                        let vertices = corners.map(|i| vertex_at(&store, i));
                        let positions = vertices.map(|v| transform_point(matrix, v.position));
                        let Some((t, map)) = find_texmapped(lookup, &positions) else {
                            continue;
                        };
                        for (i, vertex) in vertices.iter().enumerate() {
                            let j = map[i];
                            let mut normal = transform_normal(&normals, vertex.normal);
                            if should_flip_normal(normal, lookup.normals[t][j]) {
                                normal = normal.map(|c| -c);
                            }
                            updates[target].push((t, lookup.vertices[t][j], normal));
                        }
                    }
                }
            }
        }
    }
    for sub in m.sub_models.iter().filter(|s| !s.light) {
        smooth_normals_below(arena, sub.model, &(matrix * sub.matrix), lookups, updates);
    }
}

/// Copy the normals of smoothed geometry onto the texmapped triangles that
/// cover it. `texmapped[0]` matches standard faces, `texmapped[1]` BFC
/// faces. Returns the number of texmapped triangles updated.
pub fn transfer_smooth_normals(arena: &ModelArena, root: ModelHandle, texmapped: [&ShapeGroupData; 2]) -> usize {
    let lookups = texmapped.map(texmapped_lookup);
    if lookups.iter().all(|l| l.corners.is_empty()) {
        return 0;
    }
    let mut updates = NormalUpdates::default();
    smooth_normals_below(arena, root, &Matrix4::identity(), &lookups, &mut updates);

    let mut updated = 0;
    for (group, writes) in texmapped.iter().zip(updates.iter()) {
        let mut touched = FxHashSet::default();
        let mut store = group.store.write();
        for &(t, index, normal) in writes {
            set_normal(&mut store, index, normal);
            touched.insert(t);
        }
        updated += touched.len();
    }
    log::debug!(
        "[GeometryModel::transfer_smooth_normals] Updated {} texmapped triangles",
        updated
    );
    updated
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::model_data::TexmapProjection;
    use crate::model::model_operations::{
        add_model_shape, add_sub_model, begin_texmap, create_model, create_model_arena,
        create_store_set, create_sub_model, end_texmap, model_next_step,
    };
    use crate::shape::shape_group_operations::create_shape_group;
    use crate::shape::texmapped_operations::add_texmapped_triangle;
    use crate::shape::ShapeGroupKind;
    use cgmath::Vector3;

    const GLASS: u32 = 0x00FF_0080;

    fn tri() -> [[f32; 3]; 3] {
        [[0.0, 0.0, 0.0], [1.0, 0.0, 0.0], [0.0, 1.0, 0.0]]
    }

    #[test]
    fn test_transparent_colored_geometry_moves_out() {
        let stores = create_store_set();
        let mut arena = create_model_arena();
        let part = create_model(&mut arena, "window", true);
        add_model_shape(&mut arena, part, &stores, Section::Standard, ShapeType::Triangle, &tri(), None, None, Some(GLASS), 0)
            .expect("glass");
        add_model_shape(&mut arena, part, &stores, Section::Standard, ShapeType::Triangle, &tri(), None, None, Some(0xFF00_00FF), 0)
            .expect("frame");
        let root = create_model(&mut arena, "root", false);
        add_sub_model(&mut arena, root, create_sub_model(part, Matrix4::identity())).expect("a");
        add_sub_model(
            &mut arena,
            root,
            create_sub_model(part, Matrix4::from_translation(Vector3::new(0.0, 0.0, 3.0))),
        )
        .expect("b");

        let moved = transfer_transparent(&mut arena, root, 240).expect("transfer");
        assert_eq!(moved.len(), 2);
        assert_eq!(moved[1].triangle.positions[0], [0.0, 0.0, 3.0]);
        assert!(moved.iter().all(|t| t.triangle.color == GLASS));

        cleanup_transparent(&mut arena);
        let group = arena.models[part.0 as usize].groups[Section::Standard.index()][1]
            .as_ref()
            .expect("colored");
        assert_eq!(group.indices[ShapeType::Triangle.index()].len(), 3);
    }

    #[test]
    fn test_uncolored_geometry_follows_instance_color() {
        let stores = create_store_set();
        let mut arena = create_model_arena();
        let part = create_model(&mut arena, "brick", true);
        add_model_shape(&mut arena, part, &stores, Section::Bfc, ShapeType::Triangle, &tri(), None, None, None, 0)
            .expect("face");
        let root = create_model(&mut arena, "root", false);
        let mut opaque = create_sub_model(part, Matrix4::identity());
        opaque.color = Some(0x00FF_00FF);
        add_sub_model(&mut arena, root, opaque).expect("opaque");
        model_next_step(crate::model::model_operations::model_mut(&mut arena, root).expect("root"));
        let mut clear = create_sub_model(part, Matrix4::identity());
        clear.color = Some(GLASS);
        add_sub_model(&mut arena, root, clear).expect("clear");
        model_next_step(crate::model::model_operations::model_mut(&mut arena, root).expect("root"));

        let moved = transfer_transparent(&mut arena, root, 240).expect("transfer");
        assert_eq!(moved.len(), 1);
        assert_eq!(moved[0].step, 1);
        assert_eq!(moved[0].triangle.color, GLASS);
        assert!(moved[0].triangle.bfc);
    }

    #[test]
    fn test_texmap_region_covers_geometry_and_instances() {
        let stores = create_store_set();
        let mut arena = create_model_arena();
        let stud = create_model(&mut arena, "tile", true);
        add_model_shape(&mut arena, stud, &stores, Section::Standard, ShapeType::Triangle, &tri(), None, None, None, 0)
            .expect("tile face");
        let root = create_model(&mut arena, "root", false);
        add_model_shape(&mut arena, root, &stores, Section::Standard, ShapeType::Triangle, &tri(), None, None, None, 0)
            .expect("plain");
        begin_texmap(
            &mut arena,
            root,
            "sticker.png",
            TexmapProjection::Planar,
            [[0.0, 0.0, 0.0], [1.0, 0.0, 0.0], [0.0, 1.0, 0.0]],
        )
        .expect("begin");
        add_model_shape(&mut arena, root, &stores, Section::Standard, ShapeType::Triangle, &tri(), None, None, None, 0)
            .expect("mapped");
        add_sub_model(&mut arena, root, create_sub_model(stud, Matrix4::identity())).expect("sub");
        end_texmap(&mut arena, root).expect("end");
        add_sub_model(&mut arena, root, create_sub_model(stud, Matrix4::identity())).expect("outside");

        let mut seen = Vec::new();
        transfer_texmapped(&mut arena, root, &mut |triangle, texture| {
            seen.push((triangle, texture.to_string()));
        })
        .expect("transfer");
        assert_eq!(seen.len(), 2);
        assert!(seen.iter().all(|(_, t)| t == "sticker.png"));
        assert_eq!(seen[0].0.triangle.tex_coords[1], [1.0, 0.0]);

        cleanup_texmapped(&mut arena);
        // The mapped triangle moved out; the shared tile keeps its face.
        let group = arena.models[root.0 as usize].groups[Section::Standard.index()][0]
            .as_ref()
            .expect("group");
        assert_eq!(group.indices[ShapeType::Triangle.index()].len(), 3);
        let tile = arena.models[stud.0 as usize].groups[Section::Standard.index()][0]
            .as_ref()
            .expect("tile");
        assert_eq!(tile.indices[ShapeType::Triangle.index()].len(), 3);
        assert!(!group.transfer_recorded);
    }

    #[test]
    fn test_instanced_texmap_moves_once_per_instance() {
        let stores = create_store_set();
        let mut arena = create_model_arena();
        let sticker = create_model(&mut arena, "sticker", true);
        begin_texmap(
            &mut arena,
            sticker,
            "logo.png",
            TexmapProjection::Planar,
            [[0.0, 0.0, 0.0], [1.0, 0.0, 0.0], [0.0, 1.0, 0.0]],
        )
        .expect("begin");
        let quad = [[0.0, 0.0, 0.0], [1.0, 0.0, 0.0], [1.0, 1.0, 0.0], [0.0, 1.0, 0.0]];
        add_model_shape(&mut arena, sticker, &stores, Section::Standard, ShapeType::Quad, &quad, None, None, None, 0)
            .expect("face");
        end_texmap(&mut arena, sticker).expect("end");
        let root = create_model(&mut arena, "root", false);
        for x in [0.0, 4.0] {
            let placed = create_sub_model(sticker, Matrix4::from_translation(Vector3::new(x, 0.0, 0.0)));
            add_sub_model(&mut arena, root, placed).expect("instance");
        }

        let mut seen = 0;
        transfer_texmapped(&mut arena, root, &mut |_, _| seen += 1).expect("transfer");
        assert_eq!(seen, 4);
        cleanup_texmapped(&mut arena);
        let group = arena.models[sticker.0 as usize].groups[Section::Standard.index()][0]
            .as_ref()
            .expect("face");
        assert!(group.indices[ShapeType::Quad.index()].is_empty());
    }

    #[test]
    fn test_smoothed_normals_reach_texmapped_copies() {
        let stores = create_store_set();
        let mut arena = create_model_arena();
        let part = create_model(&mut arena, "slope", true);
        let smooth = [0.0, 0.6, 0.8];
        add_model_shape(
            &mut arena,
            part,
            &stores,
            Section::Standard,
            ShapeType::Triangle,
            &tri(),
            Some(&[smooth, smooth, smooth]),
            None,
            None,
            0,
        )
        .expect("face");
        let root = create_model(&mut arena, "root", false);
        let offset = Matrix4::from_translation(Vector3::new(0.0, 0.0, 2.0));
        add_sub_model(&mut arena, root, create_sub_model(part, offset)).expect("instance");

        let texmap_store = stores.texmap.clone();
        let mut standard = create_shape_group(
            texmap_store.clone(),
            ShapeGroupKind::Texmapped(Default::default()),
            false,
        );
        let bfc = create_shape_group(texmap_store, ShapeGroupKind::Texmapped(Default::default()), true);
        // Same triangle in world space, corners rotated, with a flat normal.
        let flat = [0.0, 0.0, 1.0];
        let world = [[1.0, 0.0, 2.0], [0.0, 1.0, 2.0], [0.0, 0.0, 2.0]];
        add_texmapped_triangle(
            &mut standard,
            &TransferTriangle {
                positions: world,
                normals: [flat; 3],
                tex_coords: [[0.0; 2]; 3],
                color: WHITE,
                bfc: false,
            },
            "logo.png",
        );

        assert_eq!(transfer_smooth_normals(&arena, root, [&standard, &bfc]), 1);
        let store = standard.store.read();
        for &index in &standard.indices[ShapeType::Triangle.index()] {
            let normal = store.normals[index as usize];
            assert!((normal[1] - 0.6).abs() < 1e-5 && (normal[2] - 0.8).abs() < 1e-5);
        }
    }

    #[test]
    fn test_step_of_uses_first_covering_snapshot() {
        assert_eq!(step_of(&[3, 6], 0, 2), 0);
        assert_eq!(step_of(&[3, 6], 3, 2), 1);
        assert_eq!(step_of(&[3, 6], 6, 2), 2);
    }
}
