//! Model Operations - Pure DOP Functions
//!
//! Building the model graph, variant models, flattening, steps and the
//! recursive draw walk. Models live in a `ModelArena` and refer to each
//! other by `ModelHandle`.

use cgmath::{Matrix4, Point3, SquareMatrix};
use rustc_hash::{FxHashMap, FxHashSet};

use super::model_data::{
    FlattenJob, LightData, ModelArena, ModelData, ModelDrawParams, ModelFlags, ModelHandle,
    StoreSet, SubModelData, TexmapProjection,
};
use super::texmap_operations::{create_texmap_info, geometry_slot};
use crate::constants::color::alpha;
use crate::error::{EngineError, EngineResult, OptionExt};
use crate::geometry::{
    aabb_extend, aabb_is_empty, aabb_transformed, empty_aabb, is_mirror_matrix, shrink_matrix,
    transform_point, AABB,
};
use crate::renderer::vertex_store_operations::create_shared_vertex_store;
use crate::renderer::{current_matrix, pop_matrix, push_matrix, RenderContext, SharedVertexStore};
use crate::renderer::VertexStoreLayout;
use crate::shape::conditional_operations::{
    active_conditional_indices, scale_conditional_control_points,
};
use crate::shape::shape_group_operations::{
    add_conditional_line, add_shape, clone_structure, create_shape_group, draw,
    draw_conditional_lines, draw_shape_type, is_empty, next_step, remove_conditionals, scan_points,
    unshrink_normals, visible_index_count,
};
use crate::shape::transfer_operations::{apply_transfer_records, flatten_into};
use crate::shape::winding_operations::{invert, un_mirror};
use crate::shape::{Section, ShapeGroupData, ShapeGroupKind, ShapeType, SECTION_COUNT};
use crate::smoothing::smooth_groups;

/// Create the six shared vertex stores of a scene
pub fn create_store_set() -> StoreSet {
    StoreSet {
        standard: create_shared_vertex_store(
            "standard",
            VertexStoreLayout {
                edge_flags: true,
                ..Default::default()
            },
        ),
        stud: create_shared_vertex_store(
            "stud",
            VertexStoreLayout {
                tex_coords: true,
                edge_flags: true,
                ..Default::default()
            },
        ),
        colored: create_shared_vertex_store(
            "colored",
            VertexStoreLayout {
                colors: true,
                edge_flags: true,
                ..Default::default()
            },
        ),
        colored_stud: create_shared_vertex_store(
            "colored_stud",
            VertexStoreLayout {
                tex_coords: true,
                colors: true,
                ..Default::default()
            },
        ),
        transparent: create_shared_vertex_store(
            "transparent",
            VertexStoreLayout {
                colors: true,
                ..Default::default()
            },
        ),
        texmap: create_shared_vertex_store(
            "texmap",
            VertexStoreLayout {
                tex_coords: true,
                colors: true,
                ..Default::default()
            },
        ),
    }
}

/// Store a section's group appends into
pub fn store_for(stores: &StoreSet, section: Section, colored: bool) -> SharedVertexStore {
    match (section.is_stud(), colored) {
        (false, false) => stores.standard.clone(),
        (true, false) => stores.stud.clone(),
        (false, true) => stores.colored.clone(),
        (true, true) => stores.colored_stud.clone(),
    }
}

pub fn create_model_arena() -> ModelArena {
    ModelArena::default()
}

/// Add an empty model node. `part` marks a leaf part, the unit that gets
/// flattened, smoothed, shrunk and compiled.
pub fn create_model(arena: &mut ModelArena, name: &str, part: bool) -> ModelHandle {
    let handle = ModelHandle(arena.models.len() as u32);
    arena.models.push(ModelData {
        name: name.to_string(),
        groups: Default::default(),
        sub_models: Vec::new(),
        sub_model_step_counts: Vec::new(),
        steps_taken: 0,
        bounding_box: None,
        inverted_model: None,
        un_mirrored_model: None,
        texmaps: Vec::new(),
        active_texmap: None,
        sections_present: [0; 2],
        draw_lists: Default::default(),
        flags: ModelFlags {
            part,
            ..Default::default()
        },
    });
    handle
}

fn invalid_handle(handle: ModelHandle) -> EngineError {
    EngineError::InvalidHandle {
        kind: "model".to_string(),
        index: handle.0 as usize,
    }
}

pub fn model(arena: &ModelArena, handle: ModelHandle) -> EngineResult<&ModelData> {
    arena
        .models
        .get(handle.0 as usize)
        .ok_or_engine(|| invalid_handle(handle))
}

pub fn model_mut(arena: &mut ModelArena, handle: ModelHandle) -> EngineResult<&mut ModelData> {
    arena
        .models
        .get_mut(handle.0 as usize)
        .ok_or_engine(|| invalid_handle(handle))
}

/// Group for `(section, colored)`, created on first use. New groups get a
/// zero snapshot for every step already taken.
pub fn ensure_group<'a>(
    model: &'a mut ModelData,
    stores: &StoreSet,
    section: Section,
    colored: bool,
) -> &'a mut ShapeGroupData {
    let steps = model.steps_taken;
    model.groups[section.index()][colored as usize].get_or_insert_with(|| {
        let kind = if colored {
            ShapeGroupKind::Colored
        } else {
            ShapeGroupKind::Uncolored
        };
        let mut group = create_shape_group(store_for(stores, section, colored), kind, section.is_bfc());
        for counts in group.step_counts.iter_mut() {
            counts.resize(steps, 0);
        }
        group
    })
}

/// Add one primitive to a model section. A `color` puts it in the colored
/// group of that section.
#[allow(clippy::too_many_arguments)]
pub fn add_model_shape(
    arena: &mut ModelArena,
    handle: ModelHandle,
    stores: &StoreSet,
    section: Section,
    shape: ShapeType,
    positions: &[[f32; 3]],
    normals: Option<&[[f32; 3]]>,
    tex_coords: Option<&[[f32; 2]]>,
    color: Option<u32>,
    step: usize,
) -> EngineResult<u32> {
    if matches!(section, Section::Transparent | Section::ConditionalLines)
        || shape == ShapeType::ConditionalLine
        || section.is_line() != shape.is_line()
    {
        return Err(EngineError::InvalidState {
            operation: format!("add a {:?} to the {:?} section", shape, section),
            state: "building".to_string(),
        });
    }
    let model = model_mut(arena, handle)?;
    let colored = color.is_some();
    let group = ensure_group(model, stores, section, colored);
    let first = add_shape(group, shape, positions, normals, tex_coords, color, step)?;

    if let Some(active) = model.active_texmap {
        if shape.is_texmappable() && section.is_smoothable() {
            if let Some(info) = model.texmaps.get_mut(active) {
                info.geometry[geometry_slot(colored, section.is_bfc())].insert(first);
            }
        }
    }
    model.bounding_box = None;
    Ok(first)
}

pub fn add_model_conditional_line(
    arena: &mut ModelArena,
    handle: ModelHandle,
    stores: &StoreSet,
    segment: &[[f32; 3]; 2],
    control_points: &[[f32; 3]; 2],
    color: Option<u32>,
    step: usize,
) -> EngineResult<u32> {
    let model = model_mut(arena, handle)?;
    let group = ensure_group(model, stores, Section::ConditionalLines, color.is_some());
    let first = add_conditional_line(group, segment, control_points, color, step);
    model.bounding_box = None;
    Ok(first)
}

/// Placement of `model` under `matrix` with nothing overridden
pub fn create_sub_model(model: ModelHandle, matrix: Matrix4<f32>) -> SubModelData {
    SubModelData {
        model,
        matrix,
        color: None,
        edge_color: None,
        bfc_invert: false,
        mirror: is_mirror_matrix(&matrix),
        light: false,
        shrunk: false,
    }
}

/// Append an instance and return its position in the parent's list
pub fn add_sub_model(
    arena: &mut ModelArena,
    parent: ModelHandle,
    sub_model: SubModelData,
) -> EngineResult<usize> {
    model(arena, sub_model.model)?;
    if sub_model.model == parent {
        return Err(EngineError::InvalidState {
            operation: "add a model to itself".to_string(),
            state: "building".to_string(),
        });
    }
    let model = model_mut(arena, parent)?;
    model.sub_models.push(SubModelData {
        mirror: is_mirror_matrix(&sub_model.matrix),
        ..sub_model
    });
    if let Some(active) = model.active_texmap {
        if let Some(info) = model.texmaps.get_mut(active) {
            info.sub_model_count += 1;
        }
    }
    model.bounding_box = None;
    Ok(model.sub_models.len() - 1)
}

/// Open a texture-map region. Geometry and instances added until
/// `end_texmap` belong to it.
pub fn begin_texmap(
    arena: &mut ModelArena,
    handle: ModelHandle,
    texture: &str,
    projection: TexmapProjection,
    points: [[f32; 3]; 3],
) -> EngineResult<()> {
    let model = model_mut(arena, handle)?;
    if model.active_texmap.is_some() {
        log::warn!(
            "[GeometryModel::begin_texmap] Region opened in {} while another is active",
            model.name
        );
    }
    let info = create_texmap_info(texture, projection, points, model.sub_models.len());
    model.texmaps.push(info);
    model.active_texmap = Some(model.texmaps.len() - 1);
    Ok(())
}

pub fn end_texmap(arena: &mut ModelArena, handle: ModelHandle) -> EngineResult<()> {
    model_mut(arena, handle)?.active_texmap = None;
    Ok(())
}

/// Snapshot group counts and the instance count as the end of a step
pub fn model_next_step(model: &mut ModelData) {
    for pair in model.groups.iter_mut() {
        for group in pair.iter_mut().flatten() {
            next_step(group);
        }
    }
    model.sub_model_step_counts.push(model.sub_models.len() as u32);
    model.steps_taken += 1;
}

/// Instances visible at `step`. `None` and unknown steps show all.
pub fn sub_model_limit(model: &ModelData, step: Option<usize>) -> usize {
    let total = model.sub_models.len();
    match step.and_then(|s| model.sub_model_step_counts.get(s)) {
        Some(&count) => (count as usize).min(total),
        None => total,
    }
}

fn shallow_copy(arena: &mut ModelArena, handle: ModelHandle) -> EngineResult<ModelHandle> {
    let source = model(arena, handle)?;
    let copy = ModelData {
        name: source.name.clone(),
        groups: std::array::from_fn(|s| {
            std::array::from_fn(|c| source.groups[s][c].as_ref().map(clone_structure))
        }),
        sub_models: Vec::new(),
        sub_model_step_counts: source.sub_model_step_counts.clone(),
        steps_taken: source.steps_taken,
        bounding_box: source.bounding_box,
        inverted_model: None,
        un_mirrored_model: None,
        texmaps: Vec::new(),
        active_texmap: None,
        sections_present: source.sections_present,
        draw_lists: Default::default(),
        flags: ModelFlags {
            compiled: false,
            ..source.flags
        },
    };
    let handle = ModelHandle(arena.models.len() as u32);
    arena.models.push(copy);
    Ok(handle)
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum Variant {
    Inverted,
    UnMirrored,
}

fn variant_link(model: &ModelData, variant: Variant) -> Option<ModelHandle> {
    match variant {
        Variant::Inverted => model.inverted_model,
        Variant::UnMirrored => model.un_mirrored_model,
    }
}

fn set_variant_link(model: &mut ModelData, variant: Variant, target: Option<ModelHandle>) {
    match variant {
        Variant::Inverted => model.inverted_model = target,
        Variant::UnMirrored => model.un_mirrored_model = target,
    }
}

/// Shared body of the two variant getters. Asking a variant for the same
/// variant again returns its source, and the inverted copy of an
/// un-mirrored model is the un-mirrored copy of the inverted one.
fn get_variant(arena: &mut ModelArena, handle: ModelHandle, variant: Variant) -> EngineResult<ModelHandle> {
    if let Some(existing) = variant_link(model(arena, handle)?, variant) {
        return Ok(existing);
    }
    let other = match variant {
        Variant::Inverted => Variant::UnMirrored,
        Variant::UnMirrored => Variant::Inverted,
    };
    let copy = shallow_copy(arena, handle)?;

    // Close the square: source -other-> sibling -variant-> cross.
    let cross = variant_link(&arena.models[handle.0 as usize], other)
        .and_then(|sibling| variant_link(&arena.models[sibling.0 as usize], variant));
    {
        let copy_model = &mut arena.models[copy.0 as usize];
        set_variant_link(copy_model, variant, Some(handle));
        set_variant_link(copy_model, other, cross);
        match variant {
            Variant::Inverted => copy_model.flags.inverted = !copy_model.flags.inverted,
            Variant::UnMirrored => copy_model.flags.un_mirrored = !copy_model.flags.un_mirrored,
        }
    }
    set_variant_link(&mut arena.models[handle.0 as usize], variant, Some(copy));
    if let Some(cross) = cross {
        set_variant_link(&mut arena.models[cross.0 as usize], other, Some(copy));
    }

    let sub_models = arena.models[handle.0 as usize].sub_models.clone();
    let mut mapped = Vec::with_capacity(sub_models.len());
    for sub in sub_models {
        let child = get_variant(arena, sub.model, variant)?;
        mapped.push(SubModelData { model: child, ..sub });
    }

    let copy_model = &mut arena.models[copy.0 as usize];
    copy_model.sub_models = mapped;
    for section in Section::ALL {
        if section.is_line() || section == Section::ConditionalLines {
            continue;
        }
        for group in copy_model.groups[section.index()].iter_mut().flatten() {
            match variant {
                Variant::Inverted => invert(group),
                Variant::UnMirrored => un_mirror(group),
            }
        }
    }
    log::debug!(
        "[GeometryModel::get_variant] Built {:?} variant of {}",
        match variant {
            Variant::Inverted => "inverted",
            Variant::UnMirrored => "un-mirrored",
        },
        copy_model.name
    );
    Ok(copy)
}

/// Model with reversed winding and flipped normals
pub fn get_inverted_model(arena: &mut ModelArena, handle: ModelHandle) -> EngineResult<ModelHandle> {
    get_variant(arena, handle, Variant::Inverted)
}

/// Model with reversed winding, for instances under a mirroring matrix
pub fn get_un_mirrored_model(arena: &mut ModelArena, handle: ModelHandle) -> EngineResult<ModelHandle> {
    get_variant(arena, handle, Variant::UnMirrored)
}

/// Model an instance actually draws, building variants on demand
pub fn effective_model(arena: &mut ModelArena, sub_model: &SubModelData) -> EngineResult<ModelHandle> {
    let mut handle = sub_model.model;
    if sub_model.mirror {
        handle = get_un_mirrored_model(arena, handle)?;
    }
    if sub_model.bfc_invert {
        handle = get_inverted_model(arena, handle)?;
    }
    Ok(handle)
}

/// Read-only counterpart of `effective_model`. Falls back to the base
/// model when a variant has not been built.
pub fn resolved_effective_model(arena: &ModelArena, sub_model: &SubModelData) -> ModelHandle {
    let link = |handle: ModelHandle, variant: Variant| {
        arena
            .models
            .get(handle.0 as usize)
            .and_then(|m| variant_link(m, variant))
            .unwrap_or(handle)
    };
    let mut handle = sub_model.model;
    if sub_model.mirror {
        handle = link(handle, Variant::UnMirrored);
    }
    if sub_model.bfc_invert {
        handle = link(handle, Variant::Inverted);
    }
    handle
}

/// Build every variant reachable from `root` so drawing never has to
pub fn resolve_variants(arena: &mut ModelArena, root: ModelHandle) -> EngineResult<()> {
    let mut visited = FxHashSet::default();
    resolve_variants_below(arena, root, &mut visited)
}

fn resolve_variants_below(
    arena: &mut ModelArena,
    handle: ModelHandle,
    visited: &mut FxHashSet<ModelHandle>,
) -> EngineResult<()> {
    if !visited.insert(handle) {
        return Ok(());
    }
    let sub_models = model(arena, handle)?.sub_models.clone();
    for sub in sub_models.iter().filter(|s| !s.light) {
        let child = effective_model(arena, sub)?;
        resolve_variants_below(arena, child, visited)?;
    }
    Ok(())
}

/// Bounds in the model's own space, cached until the model changes
pub fn bounding_box(arena: &mut ModelArena, handle: ModelHandle) -> EngineResult<AABB> {
    if let Some(bounds) = model(arena, handle)?.bounding_box {
        return Ok(bounds);
    }
    let mut bounds = empty_aabb();
    let identity = Matrix4::identity();
    let children: Vec<(ModelHandle, Matrix4<f32>)> = {
        let m = &arena.models[handle.0 as usize];
        for pair in &m.groups {
            for group in pair.iter().flatten() {
                scan_points(group, &identity, &mut |p| aabb_extend(&mut bounds, Point3::from(p)));
            }
        }
        m.sub_models
            .iter()
            .filter(|s| !s.light)
            .map(|s| (s.model, s.matrix))
            .collect()
    };
    for (child, matrix) in children {
        let child_bounds = bounding_box(arena, child)?;
        if !aabb_is_empty(&child_bounds) {
            let moved = aabb_transformed(&child_bounds, &matrix);
            aabb_extend(&mut bounds, moved.min);
            aabb_extend(&mut bounds, moved.max);
        }
    }
    arena.models[handle.0 as usize].bounding_box = Some(bounds);
    Ok(bounds)
}

/// Visit every drawn position under `matrix`. Variants share positions
/// with their base model, so base models are walked.
pub fn scan_model_points(
    arena: &ModelArena,
    handle: ModelHandle,
    matrix: &Matrix4<f32>,
    visit: &mut dyn FnMut([f32; 3]),
) {
    let Some(m) = arena.models.get(handle.0 as usize) else {
        return;
    };
    for pair in &m.groups {
        for group in pair.iter().flatten() {
            scan_points(group, matrix, visit);
        }
    }
    for sub in m.sub_models.iter().filter(|s| !s.light) {
        scan_model_points(arena, sub.model, &(matrix * sub.matrix), visit);
    }
}

fn collect_flatten_jobs(
    arena: &mut ModelArena,
    parent_matrix: &Matrix4<f32>,
    inherited: (Option<u32>, Option<u32>),
    sub_model: &SubModelData,
    jobs: &mut Vec<FlattenJob>,
) -> EngineResult<()> {
    if sub_model.light {
        return Ok(());
    }
    let matrix = parent_matrix * sub_model.matrix;
    let (color, edge_color) = match sub_model.color {
        Some(color) => (Some(color), Some(sub_model.edge_color.unwrap_or(color))),
        None => inherited,
    };
    let source = effective_model(arena, sub_model)?;
    jobs.push(FlattenJob {
        source,
        matrix,
        color,
        edge_color,
    });
    let children = model(arena, source)?.sub_models.clone();
    for child in &children {
        collect_flatten_jobs(arena, &matrix, (color, edge_color), child, jobs)?;
    }
    Ok(())
}

/// Bake one job's groups into `target`
fn bake_job(target: &mut ModelData, stores: &StoreSet, job: &FlattenJob, sources: Vec<(usize, bool, ShapeGroupData)>) {
    for (slot, source_colored, group) in sources {
        let section = Section::ALL[slot];
        if source_colored {
            flatten_into(ensure_group(target, stores, section, true), &group, &job.matrix, None);
            continue;
        }
        let color = if section.uses_edge_color() {
            job.edge_color
        } else {
            job.color
        };
        match color {
            Some(color) => {
                flatten_into(ensure_group(target, stores, section, true), &group, &job.matrix, Some(color))
            }
            None => flatten_into(ensure_group(target, stores, section, false), &group, &job.matrix, None),
        }
    }
}

fn group_copies(model: &ModelData, sections: &[Section]) -> Vec<(usize, bool, ShapeGroupData)> {
    let mut copies = Vec::new();
    for section in sections {
        for colored in [false, true] {
            if let Some(group) = &model.groups[section.index()][colored as usize] {
                if !is_empty(group) {
                    // Primitives already handed to the texmapped bucket stay out.
                    let mut copy = clone_structure(group);
                    apply_transfer_records(&mut copy, &group.transfer_records);
                    copies.push((section.index(), colored, copy));
                }
            }
        }
    }
    copies
}

/// Bake every instance below `handle` into its own groups and drop the
/// instance list. Skipped while every conditional line is shown.
pub fn flatten_model(
    arena: &mut ModelArena,
    handle: ModelHandle,
    stores: &StoreSet,
    show_all_conditionals: bool,
) -> EngineResult<()> {
    let sub_models = model(arena, handle)?.sub_models.clone();
    if sub_models.is_empty() || show_all_conditionals {
        return Ok(());
    }
    let mut jobs = Vec::new();
    for sub in &sub_models {
        collect_flatten_jobs(arena, &Matrix4::identity(), (None, None), sub, &mut jobs)?;
    }
    for job in &jobs {
        let sources = group_copies(model(arena, job.source)?, &Section::ALL);
        bake_job(model_mut(arena, handle)?, stores, job, sources);
    }

    let target = model_mut(arena, handle)?;
    target.sub_models.clear();
    target.sub_model_step_counts.clear();
    for group in target.groups[Section::ConditionalLines.index()].iter().flatten() {
        scale_conditional_control_points(group);
    }
    target.flags.flattened = true;
    log::debug!(
        "[GeometryModel::flatten] {} baked {} instances",
        target.name,
        jobs.len()
    );
    Ok(())
}

/// Smooth a model's faces along its conditional lines
pub fn smooth_model(arena: &mut ModelArena, handle: ModelHandle, smooth_angle_degrees: f32) -> EngineResult<usize> {
    let m = model(arena, handle)?;
    let conditionals: Vec<&ShapeGroupData> = m.groups[Section::ConditionalLines.index()]
        .iter()
        .flatten()
        .collect();
    let faces: Vec<&ShapeGroupData> = Section::ALL
        .iter()
        .filter(|s| s.is_smoothable())
        .flat_map(|s| m.groups[s.index()].iter().flatten())
        .collect();
    let changed = smooth_groups(&conditionals, &faces, smooth_angle_degrees);
    model_mut(arena, handle)?.flags.smoothed = true;
    Ok(changed)
}

/// Every distinct part reachable from `root` through drawn instances
pub fn collect_part_models(arena: &ModelArena, root: ModelHandle) -> Vec<ModelHandle> {
    let mut visited = FxHashSet::default();
    let mut parts = Vec::new();
    let mut stack = vec![root];
    while let Some(handle) = stack.pop() {
        if !visited.insert(handle) {
            continue;
        }
        let Some(m) = arena.models.get(handle.0 as usize) else {
            continue;
        };
        if m.flags.part && handle != root {
            parts.push(handle);
            continue;
        }
        for sub in m.sub_models.iter().filter(|s| !s.light) {
            stack.push(sub.model);
            let effective = resolved_effective_model(arena, sub);
            if effective != sub.model {
                stack.push(effective);
            }
        }
    }
    parts.sort();
    parts
}

/// Pull part instances below `handle` toward their centers by `amount`
pub fn shrink_parts(arena: &mut ModelArena, handle: ModelHandle, amount: f32) -> EngineResult<()> {
    let mut visited = FxHashSet::default();
    shrink_parts_below(arena, handle, amount, &mut visited)?;
    for m in arena.models.iter_mut().filter(|m| !m.flags.part) {
        m.bounding_box = None;
    }
    Ok(())
}

fn shrink_parts_below(
    arena: &mut ModelArena,
    handle: ModelHandle,
    amount: f32,
    visited: &mut FxHashSet<ModelHandle>,
) -> EngineResult<()> {
    if !visited.insert(handle) {
        return Ok(());
    }
    let count = model(arena, handle)?.sub_models.len();
    for i in 0..count {
        let sub = arena.models[handle.0 as usize].sub_models[i].clone();
        if sub.light || sub.shrunk {
            continue;
        }
        if !model(arena, sub.model)?.flags.part {
            shrink_parts_below(arena, sub.model, amount, visited)?;
            continue;
        }
        let bounds = bounding_box(arena, sub.model)?;
        if aabb_is_empty(&bounds) {
            continue;
        }
        let shrink = shrink_matrix(&bounds, amount);
        let entry = &mut arena.models[handle.0 as usize].sub_models[i];
        entry.matrix = entry.matrix * shrink;
        entry.shrunk = true;
        unshrink_model_normals(arena, sub.model, &shrink);
    }
    Ok(())
}

/// Pre-compensate normals for a shrink. Each model is adjusted once.
fn unshrink_model_normals(arena: &mut ModelArena, handle: ModelHandle, shrink: &Matrix4<f32>) {
    let Some(m) = arena.models.get_mut(handle.0 as usize) else {
        return;
    };
    if m.flags.normals_unshrunk {
        return;
    }
    m.flags.normals_unshrunk = true;
    for section in Section::ALL {
        if section.is_line() || section == Section::ConditionalLines {
            continue;
        }
        for group in m.groups[section.index()].iter_mut().flatten() {
            unshrink_normals(group, shrink);
        }
    }
    let children: Vec<(ModelHandle, Matrix4<f32>)> =
        m.sub_models.iter().map(|s| (s.model, s.matrix)).collect();
    for (child, matrix) in children {
        // The shrink seen from the child's own space.
        if let Some(inverse) = matrix.invert() {
            unshrink_model_normals(arena, child, &(inverse * shrink * matrix));
        }
    }
}

/// World positions and colors of light placeholders below `handle`
pub fn find_lights(
    arena: &ModelArena,
    handle: ModelHandle,
    matrix: &Matrix4<f32>,
    color: u32,
    lights: &mut Vec<LightData>,
) {
    let Some(m) = arena.models.get(handle.0 as usize) else {
        return;
    };
    for sub in &m.sub_models {
        let world = matrix * sub.matrix;
        let color = sub.color.unwrap_or(color);
        if sub.light {
            lights.push(LightData {
                position: transform_point(&world, [0.0, 0.0, 0.0]),
                color,
            });
        } else {
            find_lights(arena, sub.model, &world, color, lights);
        }
    }
}

fn collect_conditional_jobs(
    arena: &ModelArena,
    parent_matrix: &Matrix4<f32>,
    inherited_edge: Option<u32>,
    sub_model: &SubModelData,
    jobs: &mut Vec<FlattenJob>,
) {
    if sub_model.light {
        return;
    }
    let matrix = parent_matrix * sub_model.matrix;
    let edge_color = match sub_model.color {
        Some(color) => Some(sub_model.edge_color.unwrap_or(color)),
        None => inherited_edge,
    };
    jobs.push(FlattenJob {
        source: sub_model.model,
        matrix,
        color: edge_color,
        edge_color,
    });
    if let Some(m) = arena.models.get(sub_model.model.0 as usize) {
        for child in &m.sub_models {
            collect_conditional_jobs(arena, &matrix, edge_color, child, jobs);
        }
    }
}

/// Bake every conditional line of the scene into the root's conditional
/// groups and remove the per-model copies. Lines are laid out step by step
/// and each root group gets per-step counts, so an earlier step still draws
/// its lines from the root. Returns the number of lines now held by the root.
pub fn flatten_conditionals(arena: &mut ModelArena, root: ModelHandle, stores: &StoreSet) -> EngineResult<usize> {
    let section = Section::ConditionalLines;
    let line = ShapeType::ConditionalLine.index();
    let (sub_models, sub_model_step_counts, steps_taken) = {
        let m = model(arena, root)?;
        (m.sub_models.clone(), m.sub_model_step_counts.clone(), m.steps_taken)
    };
    let jobs: Vec<Vec<FlattenJob>> = sub_models
        .iter()
        .map(|sub| {
            let mut jobs = Vec::new();
            collect_conditional_jobs(arena, &Matrix4::identity(), None, sub, &mut jobs);
            jobs
        })
        .collect();

    // The root's own lines are re-laid in step order over their old vertices.
    let mut own: [(Vec<u32>, Vec<u32>, Vec<u32>); 2] = Default::default();
    for (colored, taken) in own.iter_mut().enumerate() {
        if let Some(group) = model_mut(arena, root)?.groups[section.index()][colored].as_mut() {
            *taken = (
                std::mem::take(&mut group.indices[line]),
                std::mem::take(&mut group.control_point_indices),
                std::mem::take(&mut group.step_counts[line]),
            );
            group.shapes_present &= !ShapeType::ConditionalLine.bit();
        }
    }

    let mut counts: [Vec<u32>; 2] = Default::default();
    let mut next_sub = 0;
    for step in 0..=steps_taken {
        for (colored, (indices, controls, own_counts)) in own.iter().enumerate() {
            let count_at = |s: usize| own_counts.get(s).map_or(indices.len(), |&c| (c as usize).min(indices.len()));
            let start = if step == 0 { 0 } else { count_at(step - 1) };
            let end = count_at(step);
            if start >= end {
                continue;
            }
            let group = ensure_group(model_mut(arena, root)?, stores, section, colored == 1);
            group.indices[line].extend_from_slice(&indices[start..end]);
            group.control_point_indices.extend_from_slice(&controls[start..end]);
            group.shapes_present |= ShapeType::ConditionalLine.bit();
        }
        let end = sub_model_step_counts
            .get(step)
            .map_or(jobs.len(), |&c| c as usize)
            .min(jobs.len());
        for job in jobs[next_sub.min(end)..end].iter().flatten() {
            let sources = group_copies(model(arena, job.source)?, &[section]);
            if !sources.is_empty() {
                bake_job(model_mut(arena, root)?, stores, job, sources);
            }
        }
        next_sub = next_sub.max(end);
        if step < steps_taken {
            let m = model(arena, root)?;
            for (colored, counts) in counts.iter_mut().enumerate() {
                let count = m.groups[section.index()][colored]
                    .as_ref()
                    .map_or(0, |g| g.indices[line].len());
                counts.push(count as u32);
            }
        }
    }
    let m = model_mut(arena, root)?;
    for (colored, counts) in counts.into_iter().enumerate() {
        if let Some(group) = m.groups[section.index()][colored].as_mut() {
            group.step_counts[line] = counts;
        }
    }

    for (index, m) in arena.models.iter_mut().enumerate() {
        if index == root.0 as usize {
            continue;
        }
        for group in m.groups[Section::ConditionalLines.index()].iter_mut().flatten() {
            remove_conditionals(group);
        }
    }
    let root_model = model(arena, root)?;
    Ok(root_model.groups[Section::ConditionalLines.index()]
        .iter()
        .flatten()
        .map(|g| g.indices[ShapeType::ConditionalLine.index()].len() / 2)
        .sum())
}

fn sections_below(arena: &ModelArena, handle: ModelHandle, memo: &mut FxHashMap<ModelHandle, [u32; 2]>) -> [u32; 2] {
    if let Some(bits) = memo.get(&handle) {
        return *bits;
    }
    let mut bits = [0u32; 2];
    if let Some(m) = arena.models.get(handle.0 as usize) {
        for section in Section::ALL {
            for colored in 0..2 {
                if m.groups[section.index()][colored]
                    .as_ref()
                    .is_some_and(|g| !is_empty(g))
                {
                    bits[colored] |= section.bit();
                }
            }
        }
        for sub in m.sub_models.iter().filter(|s| !s.light) {
            let child = sections_below(arena, sub.model, memo);
            bits[0] |= child[0];
            bits[1] |= child[1];
        }
    }
    memo.insert(handle, bits);
    bits
}

/// Recompute which sections each model or its descendants draw
pub fn update_sections_present(arena: &mut ModelArena) {
    let mut memo = FxHashMap::default();
    for index in 0..arena.models.len() {
        sections_below(arena, ModelHandle(index as u32), &mut memo);
    }
    for (index, m) in arena.models.iter_mut().enumerate() {
        if let Some(bits) = memo.get(&ModelHandle(index as u32)) {
            m.sections_present = *bits;
        }
    }
}

fn draw_section_group(
    group: &ShapeGroupData,
    context: &mut RenderContext,
    section: Section,
    step: Option<usize>,
    params: &ModelDrawParams,
    is_root: bool,
) {
    if section != Section::ConditionalLines {
        draw(group, context, step);
        return;
    }
    if is_root && params.root_conditionals_precomputed {
        return;
    }
    if params.show_all_conditionals {
        draw_shape_type(group, context, ShapeType::ConditionalLine, step);
        return;
    }
    let mvp = context.projection * current_matrix(context);
    let count = visible_index_count(group, ShapeType::ConditionalLine, step);
    let active = active_conditional_indices(group, &mvp, 0..count);
    draw_conditional_lines(context, &active);
}

/// Draw one section of a model and everything below it.
///
/// Compiled lists are replayed unless this is the root on an earlier step.
/// `sub_models_only` skips the model's own geometry, used below an
/// instance whose color is transparent.
#[allow(clippy::too_many_arguments)]
pub fn draw_model(
    arena: &ModelArena,
    handle: ModelHandle,
    context: &mut RenderContext,
    section: Section,
    colored: bool,
    params: &ModelDrawParams,
    is_root: bool,
    sub_models_only: bool,
) {
    let Some(m) = arena.models.get(handle.0 as usize) else {
        return;
    };
    if !sub_models_only && (!is_root || params.last_step) {
        if let Some(list) = m.draw_lists[section.index()][colored as usize] {
            context.device.call_draw_list(list);
            return;
        }
    }
    if m.sections_present[colored as usize] & section.bit() == 0 {
        return;
    }
    let step = if is_root { params.step } else { None };
    if !sub_models_only {
        if let Some(group) = &m.groups[section.index()][colored as usize] {
            draw_section_group(group, context, section, step, params, is_root);
        }
    }
    let count = sub_model_limit(m, step);
    for sub in m.sub_models[..count].iter().filter(|s| !s.light) {
        draw_sub_model(arena, sub, context, section, colored, params, sub_models_only);
    }
}

fn draw_sub_model(
    arena: &ModelArena,
    sub_model: &SubModelData,
    context: &mut RenderContext,
    section: Section,
    colored: bool,
    params: &ModelDrawParams,
    sub_models_only: bool,
) {
    let mut sub_models_only = sub_models_only;
    let mut applied = None;
    // Colored groups carry their own colors, only the uncolored pass needs
    // the instance color.
    if !colored {
        if let Some(color) = sub_model.color {
            sub_models_only = false;
            if section.uses_edge_color() {
                applied = Some(sub_model.edge_color.unwrap_or(color));
            } else {
                if section != Section::Lines && alpha(color) < params.alpha_threshold {
                    sub_models_only = true;
                }
                if !sub_models_only {
                    applied = Some(color);
                }
            }
        }
    }
    if let Some(color) = applied {
        context.device.set_color(color);
    }
    let child_params = ModelDrawParams {
        current_color: applied.unwrap_or(params.current_color),
        ..*params
    };
    push_matrix(context, &sub_model.matrix);
    draw_model(
        arena,
        resolved_effective_model(arena, sub_model),
        context,
        section,
        colored,
        &child_params,
        false,
        sub_models_only,
    );
    pop_matrix(context);
    if applied.is_some() {
        context.device.set_color(params.current_color);
    }
}

/// Record one section of a model into a device list. Returns false when
/// nothing was compiled, including when the device has no lists.
pub fn compile_model_section(
    arena: &mut ModelArena,
    handle: ModelHandle,
    context: &mut RenderContext,
    section: Section,
    colored: bool,
    params: &ModelDrawParams,
    is_root: bool,
) -> bool {
    if matches!(section, Section::ConditionalLines | Section::Transparent) {
        return false;
    }
    let Some(m) = arena.models.get(handle.0 as usize) else {
        return false;
    };
    if m.draw_lists[section.index()][colored as usize].is_some()
        || m.sections_present[colored as usize] & section.bit() == 0
    {
        return false;
    }
    let Some(list) = context.device.begin_draw_list() else {
        return false;
    };
    context.compiling = true;
    let compile_params = ModelDrawParams {
        step: None,
        last_step: true,
        ..*params
    };
    draw_model(arena, handle, context, section, colored, &compile_params, is_root, false);
    context.device.end_draw_list();
    context.compiling = false;
    let m = &mut arena.models[handle.0 as usize];
    m.draw_lists[section.index()][colored as usize] = Some(list);
    m.flags.compiled = true;
    true
}

/// Delete every compiled list on the device
pub fn delete_draw_lists(arena: &mut ModelArena, context: &mut RenderContext) {
    for m in arena.models.iter_mut() {
        for pair in m.draw_lists.iter_mut() {
            for list in pair.iter_mut() {
                if let Some(id) = list.take() {
                    context.device.delete_draw_list(id);
                }
            }
        }
        m.flags.compiled = false;
    }
}

/// Drop list handles without a device, for when the GPU context is gone
pub fn forget_draw_lists(arena: &mut ModelArena) {
    for m in arena.models.iter_mut() {
        m.draw_lists = [[None; 2]; SECTION_COUNT];
        m.flags.compiled = false;
    }
}
