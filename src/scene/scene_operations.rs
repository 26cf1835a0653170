//! Scene Operations - Pure DOP Functions
//!
//! Building a scene from the loader's primitive stream, the finish and
//! post-process pipeline, step selection and scene-wide queries.

use std::sync::Arc;

use cgmath::{Matrix4, Point3, SquareMatrix};
use parking_lot::Mutex;
use rustc_hash::FxHashMap;

use super::scene_data::{
    InstanceOptions, SceneData, ScenePhase, StepState, SubModelBegin, LIGHT_MODEL_NAME,
    TEXMAP_BFC, TEXMAP_STANDARD, TEXMAP_TRANSPARENT,
};
use crate::camera::{frame_sphere, CameraData};
use crate::config::SceneConfig;
use crate::constants::color::alpha;
use crate::error::{EngineError, EngineResult};
use crate::geometry::{aabb_center, aabb_is_empty};
use crate::model::model_operations::{
    collect_part_models, delete_draw_lists, find_lights, flatten_conditionals, forget_draw_lists,
    model_next_step, resolve_variants, scan_model_points, shrink_parts, smooth_model,
    update_sections_present,
};
use crate::model::model_transfer_operations::{
    cleanup_texmapped, cleanup_transparent, transfer_smooth_normals, transfer_texmapped,
    transfer_transparent,
};
use crate::model::{
    add_model_conditional_line, add_model_shape, add_sub_model, begin_texmap, bounding_box, create_model,
    create_model_arena, create_store_set, create_sub_model, end_texmap, flatten_model, model,
    model_mut, ModelHandle, SteppedTriangle, StoreSet, TexmapProjection,
};
use crate::renderer::vertex_store_operations::{delete_gpu_resources, release_gpu_resources};
use crate::renderer::{RenderContext, SharedVertexStore};
use crate::shape::shape_group_operations::{clone_structure, scan_points, validate_count};
use crate::shape::texmapped_operations::{add_texmapped_triangle, create_texmapped_group};
use crate::shape::transparent_operations::{
    add_transfer_triangle, create_transparent_group, set_step_counts, step_changed,
};
use crate::shape::{Section, ShapeType};

/// Create an empty scene. The config is validated first.
pub fn create_scene(config: SceneConfig) -> EngineResult<SceneData> {
    config.validate().map_err(|e| EngineError::Config {
        message: e.to_string(),
    })?;
    let stores = create_store_set();
    let mut arena = create_model_arena();
    let root = create_model(&mut arena, "root", false);
    let transparent = Arc::new(Mutex::new(create_transparent_group(
        stores.transparent.clone(),
    )));
    let texmapped = [
        create_texmapped_group(stores.texmap.clone(), false),
        create_texmapped_group(stores.texmap.clone(), true),
        create_texmapped_group(stores.texmap.clone(), false),
    ];
    log::info!(
        "[Scene::create] New scene (bfc={}, flatten_parts={}, multi_threaded={})",
        config.bfc,
        config.flatten_parts,
        config.multi_threaded
    );
    Ok(SceneData {
        config,
        phase: ScenePhase::Building,
        stores,
        arena,
        root,
        build_stack: vec![root],
        models_by_name: FxHashMap::default(),
        steps: StepState::default(),
        transparent,
        texmapped,
        lights: Vec::new(),
        max_radius_cache: None,
        conditional_snapshot: None,
        conditional_mvp: None,
        pool: None,
        pool_started: false,
    })
}

fn ensure_building(scene: &SceneData, operation: &str) -> EngineResult<()> {
    if scene.phase == ScenePhase::Building {
        Ok(())
    } else {
        Err(EngineError::InvalidState {
            operation: operation.to_string(),
            state: "finished".to_string(),
        })
    }
}

/// Model receiving primitives right now
pub fn current_model(scene: &SceneData) -> ModelHandle {
    scene.build_stack.last().copied().unwrap_or(scene.root)
}

fn mark_changed(scene: &mut SceneData, handle: ModelHandle) {
    if handle == scene.root {
        scene.steps.dirty = true;
    }
    scene.max_radius_cache = None;
}

/// Face section for a primitive with the given flags. BFC is ignored
/// when the scene does not honor it.
pub fn face_section(config: &SceneConfig, bfc: bool, stud: bool) -> Section {
    match (stud, bfc && config.bfc) {
        (false, false) => Section::Standard,
        (false, true) => Section::Bfc,
        (true, false) => Section::Stud,
        (true, true) => Section::StudBfc,
    }
}

/// Flat primitives covering one strip or fan, as corner indices into the
/// strip's points. Flat kinds map to themselves.
fn strip_primitives(shape: ShapeType, count: usize) -> Vec<(ShapeType, Vec<usize>)> {
    match shape {
        ShapeType::TriangleStrip => (0..count.saturating_sub(2))
            .map(|i| {
                let corners = if i % 2 == 0 {
                    vec![i, i + 1, i + 2]
                } else {
                    vec![i + 1, i, i + 2]
                };
                (ShapeType::Triangle, corners)
            })
            .collect(),
        ShapeType::QuadStrip => (0..count.saturating_sub(2) / 2)
            .map(|q| {
                let i = q * 2;
                (ShapeType::Quad, vec![i, i + 1, i + 3, i + 2])
            })
            .collect(),
        ShapeType::TriangleFan => (1..count.saturating_sub(1))
            .map(|i| (ShapeType::Triangle, vec![0, i, i + 1]))
            .collect(),
        flat => vec![(flat, (0..count).collect())],
    }
}

fn gather<T: Copy>(values: &[T], corners: &[usize]) -> Vec<T> {
    corners.iter().map(|&i| values[i]).collect()
}

/// Add one primitive to the current model.
///
/// Strips and fans are split into triangles and quads when the scene
/// does not use strips.
pub fn add_primitive(
    scene: &mut SceneData,
    section: Section,
    shape: ShapeType,
    positions: &[[f32; 3]],
    normals: Option<&[[f32; 3]]>,
    tex_coords: Option<&[[f32; 2]]>,
    color: Option<u32>,
) -> EngineResult<()> {
    ensure_building(scene, "add a primitive")?;
    if normals.is_some_and(|n| n.len() != positions.len())
        || tex_coords.is_some_and(|t| t.len() != positions.len())
    {
        return Err(EngineError::InvalidTopology {
            shape: format!("{:?} with mismatched attributes", shape),
            count: positions.len(),
        });
    }
    let handle = current_model(scene);
    let step = scene.steps.building;
    if shape.is_strip() && !scene.config.use_strips {
        validate_count(shape, positions.len())?;
        for (kind, corners) in strip_primitives(shape, positions.len()) {
            let points = gather(positions, &corners);
            let corner_normals = normals.map(|n| gather(n, &corners));
            let corner_tex = tex_coords.map(|t| gather(t, &corners));
            add_model_shape(
                &mut scene.arena,
                handle,
                &scene.stores,
                section,
                kind,
                &points,
                corner_normals.as_deref(),
                corner_tex.as_deref(),
                color,
                step,
            )?;
        }
    } else {
        add_model_shape(
            &mut scene.arena,
            handle,
            &scene.stores,
            section,
            shape,
            positions,
            normals,
            tex_coords,
            color,
            step,
        )?;
    }
    mark_changed(scene, handle);
    Ok(())
}

pub fn add_triangle(
    scene: &mut SceneData,
    positions: [[f32; 3]; 3],
    color: Option<u32>,
    bfc: bool,
) -> EngineResult<()> {
    let section = face_section(&scene.config, bfc, false);
    add_primitive(scene, section, ShapeType::Triangle, &positions, None, None, color)
}

pub fn add_quad(
    scene: &mut SceneData,
    positions: [[f32; 3]; 4],
    color: Option<u32>,
    bfc: bool,
) -> EngineResult<()> {
    let section = face_section(&scene.config, bfc, false);
    add_primitive(scene, section, ShapeType::Quad, &positions, None, None, color)
}

/// Add a triangle strip, quad strip or triangle fan
pub fn add_strip(
    scene: &mut SceneData,
    shape: ShapeType,
    positions: &[[f32; 3]],
    normals: Option<&[[f32; 3]]>,
    color: Option<u32>,
    bfc: bool,
) -> EngineResult<()> {
    if !shape.is_strip() {
        return Err(EngineError::InvalidTopology {
            shape: format!("{:?} as a strip", shape),
            count: positions.len(),
        });
    }
    let section = face_section(&scene.config, bfc, false);
    add_primitive(scene, section, shape, positions, normals, None, color)
}

pub fn add_line(scene: &mut SceneData, segment: [[f32; 3]; 2], color: Option<u32>) -> EngineResult<()> {
    add_primitive(scene, Section::Lines, ShapeType::Line, &segment, None, None, color)
}

/// Edge lines take the instance edge color and obey the `draw_lines` switch
pub fn add_edge_line(scene: &mut SceneData, segment: [[f32; 3]; 2], color: Option<u32>) -> EngineResult<()> {
    add_primitive(scene, Section::EdgeLines, ShapeType::Line, &segment, None, None, color)
}

pub fn add_conditional_line(
    scene: &mut SceneData,
    segment: [[f32; 3]; 2],
    control_points: [[f32; 3]; 2],
    color: Option<u32>,
) -> EngineResult<()> {
    ensure_building(scene, "add a conditional line")?;
    let handle = current_model(scene);
    let step = scene.steps.building;
    add_model_conditional_line(
        &mut scene.arena,
        handle,
        &scene.stores,
        &segment,
        &control_points,
        color,
        step,
    )?;
    mark_changed(scene, handle);
    Ok(())
}

pub fn find_model(scene: &SceneData, name: &str) -> Option<ModelHandle> {
    scene.models_by_name.get(name).copied()
}

/// The model registered under `name`, created when missing
pub fn create_model_named(scene: &mut SceneData, name: &str, part: bool) -> ModelHandle {
    if let Some(handle) = find_model(scene, name) {
        return handle;
    }
    let handle = create_model(&mut scene.arena, name, part);
    scene.models_by_name.insert(name.to_string(), handle);
    handle
}

/// Place `model` in the current model
pub fn add_instance(
    scene: &mut SceneData,
    model: ModelHandle,
    matrix: Matrix4<f32>,
    options: InstanceOptions,
) -> EngineResult<usize> {
    ensure_building(scene, "add an instance")?;
    let parent = current_model(scene);
    let mut sub_model = create_sub_model(model, matrix);
    sub_model.color = options.color;
    sub_model.edge_color = options.edge_color;
    sub_model.bfc_invert = options.bfc_invert;
    let index = add_sub_model(&mut scene.arena, parent, sub_model)?;
    mark_changed(scene, parent);
    Ok(index)
}

/// Place the model named `name` in the current model and make it current.
///
/// A model seen before is only placed again. Its content was built the
/// first time, which `existing` reports.
pub fn begin_sub_model(
    scene: &mut SceneData,
    name: &str,
    part: bool,
    matrix: Matrix4<f32>,
    options: InstanceOptions,
) -> EngineResult<SubModelBegin> {
    ensure_building(scene, "begin a sub-model")?;
    let existing = find_model(scene, name).is_some();
    let handle = create_model_named(scene, name, part);
    if scene.build_stack.contains(&handle) {
        return Err(EngineError::InvalidState {
            operation: format!("place {} inside itself", name),
            state: "building".to_string(),
        });
    }
    add_instance(scene, handle, matrix, options)?;
    scene.build_stack.push(handle);
    Ok(SubModelBegin {
        model: handle,
        existing,
    })
}

/// Return to the parent of the current model
pub fn end_sub_model(scene: &mut SceneData) -> EngineResult<ModelHandle> {
    ensure_building(scene, "end a sub-model")?;
    if scene.build_stack.len() <= 1 {
        return Err(EngineError::InvalidState {
            operation: "end a sub-model".to_string(),
            state: "no sub-model open".to_string(),
        });
    }
    scene.build_stack.pop();
    Ok(current_model(scene))
}

/// Add a light placeholder at the origin of `matrix`
pub fn add_light(scene: &mut SceneData, matrix: Matrix4<f32>, color: u32) -> EngineResult<()> {
    ensure_building(scene, "add a light")?;
    let light_model = create_model_named(scene, LIGHT_MODEL_NAME, false);
    let parent = current_model(scene);
    let mut sub_model = create_sub_model(light_model, matrix);
    sub_model.color = Some(color);
    sub_model.light = true;
    add_sub_model(&mut scene.arena, parent, sub_model)?;
    Ok(())
}

/// Open a texture-map region on the current model
pub fn begin_texture(
    scene: &mut SceneData,
    texture: &str,
    projection: TexmapProjection,
    points: [[f32; 3]; 3],
) -> EngineResult<()> {
    ensure_building(scene, "begin a texture region")?;
    let handle = current_model(scene);
    begin_texmap(&mut scene.arena, handle, texture, projection, points)
}

pub fn end_texture(scene: &mut SceneData) -> EngineResult<()> {
    let handle = current_model(scene);
    end_texmap(&mut scene.arena, handle)
}

/// Close the current build step. Steps with nothing added are ignored and
/// return false.
pub fn next_step(scene: &mut SceneData) -> EngineResult<bool> {
    ensure_building(scene, "close a step")?;
    if !scene.steps.dirty {
        log::debug!("[Scene::next_step] Ignoring empty step {}", scene.steps.building);
        return Ok(false);
    }
    model_next_step(model_mut(&mut scene.arena, scene.root)?);
    scene.steps.count += 1;
    scene.steps.building += 1;
    scene.steps.dirty = false;
    Ok(true)
}

pub fn step_count(scene: &SceneData) -> usize {
    scene.steps.count.max(1)
}

/// Cumulative index counts per step for triangles tagged with `steps`
fn triangle_step_counts(steps: impl Iterator<Item = usize>, step_count: usize) -> Vec<u32> {
    let count = step_count.max(1);
    let mut counts = vec![0u32; count];
    for step in steps {
        counts[step.min(count - 1)] += 3;
    }
    let mut total = 0;
    for value in counts.iter_mut() {
        total += *value;
        *value = total;
    }
    counts
}

fn texmap_slot(triangle: &SteppedTriangle, alpha_threshold: u8) -> usize {
    if alpha(triangle.triangle.color) < alpha_threshold {
        TEXMAP_TRANSPARENT
    } else if triangle.triangle.bfc {
        TEXMAP_BFC
    } else {
        TEXMAP_STANDARD
    }
}

fn fill_texmapped(scene: &mut SceneData) -> EngineResult<()> {
    let mut collected: Vec<(SteppedTriangle, String)> = Vec::new();
    transfer_texmapped(&mut scene.arena, scene.root, &mut |triangle, texture| {
        collected.push((triangle, texture.to_string()));
    })?;
    if collected.is_empty() {
        return Ok(());
    }
    let threshold = scene.config.transparent_alpha_threshold;
    let mut slots: [Vec<(SteppedTriangle, String)>; 3] = Default::default();
    for entry in collected {
        slots[texmap_slot(&entry.0, threshold)].push(entry);
    }
    let steps = step_count(scene);
    for (slot, mut triangles) in slots.into_iter().enumerate() {
        triangles.sort_by_key(|(t, _)| t.step);
        let group = &mut scene.texmapped[slot];
        for (triangle, texture) in &triangles {
            add_texmapped_triangle(group, &triangle.triangle, texture);
        }
        set_step_counts(group, triangle_step_counts(triangles.iter().map(|(t, _)| t.step), steps));
    }
    Ok(())
}

fn finish_parts(scene: &mut SceneData) -> EngineResult<()> {
    let mut flattened = 0;
    if scene.config.flatten_parts {
        // Flattening creates variants, which are parts in turn.
        let mut index = 0;
        while index < scene.arena.models.len() {
            let flags = scene.arena.models[index].flags;
            if flags.part && !flags.flattened {
                flatten_model(
                    &mut scene.arena,
                    ModelHandle(index as u32),
                    &scene.stores,
                    scene.config.show_all_conditional_lines,
                )?;
                flattened += 1;
            }
            index += 1;
        }
    }
    let mut smoothed = 0;
    if scene.config.smooth_curves {
        let parts: Vec<ModelHandle> = (0..scene.arena.models.len())
            .filter(|&i| scene.arena.models[i].flags.part)
            .map(|i| ModelHandle(i as u32))
            .collect();
        for part in parts {
            smoothed += smooth_model(&mut scene.arena, part, scene.config.smooth_angle_degrees)?;
        }
    }
    log::debug!(
        "[Scene::finish_parts] Flattened {} parts, smoothed {} normals",
        flattened,
        smoothed
    );
    Ok(())
}

/// Freeze the scene: close the last step, run the finish pipeline and the
/// post-process. Building afterwards is rejected.
pub fn finish(scene: &mut SceneData) -> EngineResult<()> {
    ensure_building(scene, "finish")?;
    if scene.build_stack.len() > 1 {
        log::warn!(
            "[Scene::finish] {} sub-models left open, closing them",
            scene.build_stack.len() - 1
        );
        scene.build_stack.truncate(1);
    }
    if scene.steps.dirty || scene.steps.count == 0 {
        model_next_step(model_mut(&mut scene.arena, scene.root)?);
        scene.steps.count += 1;
        scene.steps.dirty = false;
    }
    let root = scene.root;
    if scene.config.seam_width > 0.0 {
        shrink_parts(&mut scene.arena, root, scene.config.seam_width)?;
    }
    if scene.config.texmaps {
        fill_texmapped(scene)?;
    }
    finish_parts(scene)?;
    if scene.config.texmaps {
        if scene.config.smooth_curves {
            let [standard, bfc, _] = &scene.texmapped;
            transfer_smooth_normals(&scene.arena, root, [standard, bfc]);
        }
        cleanup_texmapped(&mut scene.arena);
    }
    scene.lights.clear();
    find_lights(
        &scene.arena,
        root,
        &Matrix4::identity(),
        scene.config.default_color,
        &mut scene.lights,
    );
    if scene.config.flatten_conditionals {
        let lines = flatten_conditionals(&mut scene.arena, root, &scene.stores)?;
        log::debug!("[Scene::finish] Root holds {} conditional lines", lines);
    }
    post_process(scene)?;
    scene.phase = ScenePhase::Finished;
    scene.max_radius_cache = None;
    log::info!(
        "[Scene::finish] {} models, {} steps, {} lights",
        scene.arena.models.len(),
        step_count(scene),
        scene.lights.len()
    );
    Ok(())
}

fn post_process(scene: &mut SceneData) -> EngineResult<()> {
    let root = scene.root;
    let mut triangles = transfer_transparent(
        &mut scene.arena,
        root,
        scene.config.transparent_alpha_threshold,
    )?;
    triangles.sort_by_key(|t| t.step);
    {
        let mut group = scene.transparent.lock();
        for triangle in &triangles {
            add_transfer_triangle(&mut group, &triangle.triangle);
        }
        let counts = triangle_step_counts(triangles.iter().map(|t| t.step), step_count(scene));
        set_step_counts(&mut group, counts);
    }
    cleanup_transparent(&mut scene.arena);
    resolve_variants(&mut scene.arena, root)?;
    update_sections_present(&mut scene.arena);

    if scene.config.flatten_conditionals {
        let groups = &model(&scene.arena, root)?.groups[Section::ConditionalLines.index()];
        scene.conditional_snapshot = Some(Arc::new([
            groups[0].as_ref().map(clone_structure),
            groups[1].as_ref().map(clone_structure),
        ]));
    }
    log::debug!(
        "[Scene::post_process] {} transparent triangles, {} parts",
        triangles.len(),
        collect_part_models(&scene.arena, root).len()
    );
    Ok(())
}

/// Show geometry up to `step`. Steps at or past the last show everything.
pub fn set_step(scene: &mut SceneData, step: usize) {
    let active = if step + 1 >= step_count(scene) {
        None
    } else {
        Some(step)
    };
    if active == scene.steps.active {
        return;
    }
    scene.steps.active = active;
    step_changed(&mut scene.transparent.lock(), active);
}

/// Distance from `center` to the farthest drawn point. The last answer is
/// cached per center.
pub fn get_max_radius(scene: &mut SceneData, center: [f32; 3]) -> f32 {
    if let Some((cached_center, radius)) = scene.max_radius_cache {
        if cached_center == center {
            return radius;
        }
    }
    let identity = Matrix4::identity();
    let mut max_squared = 0.0f32;
    {
        let mut visit = |p: [f32; 3]| {
            let d = [p[0] - center[0], p[1] - center[1], p[2] - center[2]];
            max_squared = max_squared.max(d[0] * d[0] + d[1] * d[1] + d[2] * d[2]);
        };
        scan_model_points(&scene.arena, scene.root, &identity, &mut visit);
        scan_points(&scene.transparent.lock(), &identity, &mut visit);
        for group in &scene.texmapped {
            scan_points(group, &identity, &mut visit);
        }
    }
    let radius = max_squared.sqrt();
    scene.max_radius_cache = Some((center, radius));
    radius
}

/// Camera aimed at the center of the scene's bounds, backed off far
/// enough to see every drawn point
pub fn frame_camera(scene: &mut SceneData, camera: &CameraData) -> EngineResult<CameraData> {
    let bounds = bounding_box(&mut scene.arena, scene.root)?;
    let center = if aabb_is_empty(&bounds) {
        Point3::new(0.0, 0.0, 0.0)
    } else {
        aabb_center(&bounds)
    };
    let radius = get_max_radius(scene, [center.x, center.y, center.z]);
    Ok(frame_sphere(camera, center, radius))
}

fn all_stores(stores: &StoreSet) -> [&SharedVertexStore; 6] {
    [
        &stores.standard,
        &stores.stud,
        &stores.colored,
        &stores.colored_stud,
        &stores.transparent,
        &stores.texmap,
    ]
}

/// Forget every device resource without touching the device. For hosts
/// whose GPU context is already gone.
pub fn open_gl_will_end(scene: &mut SceneData) {
    forget_draw_lists(&mut scene.arena);
    for store in all_stores(&scene.stores) {
        release_gpu_resources(store);
    }
    log::debug!("[Scene::open_gl_will_end] Device resources released");
}

/// Delete compiled lists and vertex buffers on a live device
pub fn release_device_resources(scene: &mut SceneData, context: &mut RenderContext) {
    delete_draw_lists(&mut scene.arena, context);
    for store in all_stores(&scene.stores) {
        delete_gpu_resources(store, context);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::shape::shape_group_operations::visible_index_count;
    use cgmath::Vector3;

    const RED: u32 = 0xFF00_00FF;
    const HALF_BLUE: u32 = 0x0000_FF80;

    fn test_config() -> SceneConfig {
        SceneConfig {
            seam_width: 0.0,
            multi_threaded: false,
            ..Default::default()
        }
    }

    fn triangle_at(z: f32) -> [[f32; 3]; 3] {
        [[0.0, 0.0, z], [1.0, 0.0, z], [0.0, 1.0, z]]
    }

    #[test]
    fn test_quad_max_radius_is_half_diagonal() {
        let mut scene = create_scene(test_config()).expect("scene");
        add_quad(
            &mut scene,
            [[-1.0, -1.0, 0.0], [1.0, -1.0, 0.0], [1.0, 1.0, 0.0], [-1.0, 1.0, 0.0]],
            None,
            false,
        )
        .expect("quad");
        finish(&mut scene).expect("finish");

        let radius = get_max_radius(&mut scene, [0.0, 0.0, 0.0]);
        assert!((radius - 2.0f32.sqrt()).abs() < 1e-5);
        assert_eq!(scene.max_radius_cache, Some(([0.0, 0.0, 0.0], radius)));
        let shifted = get_max_radius(&mut scene, [1.0, 1.0, 0.0]);
        assert!((shifted - 8.0f32.sqrt()).abs() < 1e-5);
    }

    #[test]
    fn test_frame_camera_sees_whole_scene() {
        let mut scene = create_scene(test_config()).expect("scene");
        add_quad(
            &mut scene,
            [[1.0, 1.0, 0.0], [3.0, 1.0, 0.0], [3.0, 3.0, 0.0], [1.0, 3.0, 0.0]],
            None,
            false,
        )
        .expect("quad");
        finish(&mut scene).expect("finish");

        let camera = crate::camera::init_camera(Point3::new(0.0, 0.0, 0.0), 1.0);
        let framed = frame_camera(&mut scene, &camera).expect("frame");
        assert_eq!(framed.target, Point3::new(2.0, 2.0, 0.0));
        assert!(framed.distance > 2.0f32.sqrt());
    }

    #[test]
    fn test_transparent_triangle_moves_to_bucket() {
        let mut scene = create_scene(test_config()).expect("scene");
        let matrix = Matrix4::from_translation(Vector3::new(0.0, 0.0, 10.0));
        let begin = begin_sub_model(&mut scene, "pane", true, matrix, InstanceOptions::default())
            .expect("begin");
        assert!(!begin.existing);
        add_triangle(&mut scene, triangle_at(0.0), Some(RED), false).expect("opaque");
        add_triangle(&mut scene, triangle_at(0.0), Some(HALF_BLUE), false).expect("transparent");
        end_sub_model(&mut scene).expect("end");
        finish(&mut scene).expect("finish");

        let pane = model(&scene.arena, begin.model).expect("pane");
        let opaque = pane.groups[Section::Standard.index()][1].as_ref().expect("colored group");
        assert_eq!(opaque.indices[ShapeType::Triangle.index()].len(), 3);
        {
            let store = opaque.store.read();
            for &index in &opaque.indices[ShapeType::Triangle.index()] {
                assert_eq!(store.colors[index as usize], RED);
            }
        }

        let bucket = scene.transparent.lock();
        let indices = &bucket.indices[ShapeType::Triangle.index()];
        assert_eq!(indices.len(), 3);
        let store = bucket.store.read();
        for &index in indices {
            assert_eq!(store.positions[index as usize][2], 10.0);
            assert_eq!(store.colors[index as usize], HALF_BLUE);
        }
    }

    #[test]
    fn test_step_playback_is_prefix() {
        let mut scene = create_scene(test_config()).expect("scene");
        add_triangle(&mut scene, triangle_at(0.0), None, false).expect("step 0");
        assert!(next_step(&mut scene).expect("step"));
        assert!(!next_step(&mut scene).expect("empty step"));
        add_triangle(&mut scene, triangle_at(1.0), None, false).expect("step 1");
        add_triangle(&mut scene, triangle_at(2.0), Some(HALF_BLUE), false).expect("step 1");
        finish(&mut scene).expect("finish");
        assert_eq!(step_count(&scene), 2);

        let root = model(&scene.arena, scene.root).expect("root");
        let group = root.groups[Section::Standard.index()][0].as_ref().expect("group");
        assert_eq!(visible_index_count(group, ShapeType::Triangle, Some(0)), 3);
        assert_eq!(visible_index_count(group, ShapeType::Triangle, None), 6);
        assert_eq!(
            group.indices[ShapeType::Triangle.index()][..3],
            [0, 1, 2],
            "step 0 indices stay in front"
        );

        let bucket = scene.transparent.lock();
        assert_eq!(bucket.step_counts[ShapeType::Triangle.index()], vec![0, 3]);
        drop(bucket);

        set_step(&mut scene, 0);
        assert_eq!(scene.steps.active, Some(0));
        set_step(&mut scene, 5);
        assert_eq!(scene.steps.active, None);
    }

    #[test]
    fn test_building_after_finish_rejected() {
        let mut scene = create_scene(test_config()).expect("scene");
        add_triangle(&mut scene, triangle_at(0.0), None, true).expect("triangle");
        finish(&mut scene).expect("finish");

        let err = add_triangle(&mut scene, triangle_at(1.0), None, true).expect_err("finished");
        assert!(matches!(err, EngineError::InvalidState { .. }));
        assert!(finish(&mut scene).is_err());
        assert!(end_sub_model(&mut scene).is_err());
    }

    #[test]
    fn test_invalid_config_rejected() {
        let config = SceneConfig {
            smooth_angle_degrees: 0.0,
            ..Default::default()
        };
        assert!(matches!(create_scene(config), Err(EngineError::Config { .. })));
    }

    #[test]
    fn test_sub_model_reuse_and_lights() {
        let mut scene = create_scene(test_config()).expect("scene");
        assert!(end_sub_model(&mut scene).is_err());

        let first = begin_sub_model(
            &mut scene,
            "brick",
            true,
            Matrix4::identity(),
            InstanceOptions {
                color: Some(RED),
                ..Default::default()
            },
        )
        .expect("first");
        add_triangle(&mut scene, triangle_at(0.0), None, false).expect("triangle");
        assert!(begin_sub_model(&mut scene, "brick", true, Matrix4::identity(), Default::default()).is_err());
        end_sub_model(&mut scene).expect("end");

        let second = begin_sub_model(
            &mut scene,
            "brick",
            true,
            Matrix4::from_translation(Vector3::new(5.0, 0.0, 0.0)),
            InstanceOptions::default(),
        )
        .expect("second");
        assert!(second.existing);
        assert_eq!(second.model, first.model);
        end_sub_model(&mut scene).expect("end");

        add_light(
            &mut scene,
            Matrix4::from_translation(Vector3::new(0.0, 3.0, 0.0)),
            0xFFFF_FFFF,
        )
        .expect("light");
        finish(&mut scene).expect("finish");

        assert_eq!(model(&scene.arena, scene.root).expect("root").sub_models.len(), 3);
        assert_eq!(scene.lights.len(), 1);
        assert_eq!(scene.lights[0].position, [0.0, 3.0, 0.0]);
    }

    #[test]
    fn test_strips_split_without_strip_support() {
        let config = SceneConfig {
            use_strips: false,
            ..test_config()
        };
        let mut scene = create_scene(config).expect("scene");
        let fan = [
            [0.0, 0.0, 0.0],
            [1.0, 0.0, 0.0],
            [1.0, 1.0, 0.0],
            [0.0, 1.0, 0.0],
            [-1.0, 1.0, 0.0],
        ];
        add_strip(&mut scene, ShapeType::TriangleFan, &fan, None, None, false).expect("fan");
        assert!(add_strip(&mut scene, ShapeType::Quad, &fan[..4], None, None, false).is_err());

        let root = model(&scene.arena, scene.root).expect("root");
        let group = root.groups[Section::Standard.index()][0].as_ref().expect("group");
        assert_eq!(group.indices[ShapeType::Triangle.index()].len(), 9);
        assert!(group.indices[ShapeType::TriangleFan.index()].is_empty());
    }

    #[test]
    fn test_strip_primitives_keep_winding() {
        let strip = strip_primitives(ShapeType::TriangleStrip, 5);
        assert_eq!(strip.len(), 3);
        assert_eq!(strip[1].1, vec![2, 1, 3]);
        let quads = strip_primitives(ShapeType::QuadStrip, 6);
        assert_eq!(quads.len(), 2);
        assert_eq!(quads[1].1, vec![2, 3, 5, 4]);
    }

    #[test]
    fn test_texture_region_fills_texmapped_bucket() {
        let mut scene = create_scene(test_config()).expect("scene");
        begin_texture(
            &mut scene,
            "logo.png",
            TexmapProjection::Planar,
            [[0.0, 0.0, 0.0], [1.0, 0.0, 0.0], [0.0, 1.0, 0.0]],
        )
        .expect("begin texture");
        add_quad(
            &mut scene,
            [[0.0, 0.0, 0.0], [1.0, 0.0, 0.0], [1.0, 1.0, 0.0], [0.0, 1.0, 0.0]],
            None,
            false,
        )
        .expect("quad");
        end_texture(&mut scene).expect("end texture");
        finish(&mut scene).expect("finish");

        let standard = &scene.texmapped[TEXMAP_STANDARD];
        assert_eq!(standard.indices[ShapeType::Triangle.index()].len(), 6);
        assert_eq!(standard.step_counts[ShapeType::Triangle.index()], vec![6]);
        assert!(scene.texmapped[TEXMAP_TRANSPARENT].indices[ShapeType::Triangle.index()].is_empty());
        // The mapped quad is drawn from the texmapped bucket only.
        let root = model(&scene.arena, scene.root).expect("root");
        let base = root.groups[Section::Standard.index()][0].as_ref().expect("base");
        assert!(base.indices[ShapeType::Quad.index()].is_empty());
    }

    #[test]
    fn test_texmapped_triangles_take_smoothed_normals() {
        let mut scene = create_scene(test_config()).expect("scene");
        begin_sub_model(&mut scene, "hinge", true, Matrix4::identity(), Default::default())
            .expect("part");
        begin_texture(
            &mut scene,
            "print.png",
            TexmapProjection::Planar,
            [[0.0, 0.0, 0.0], [1.0, 0.0, 0.0], [0.0, 1.0, 0.0]],
        )
        .expect("begin texture");
        let (sin, cos) = 10.0f32.to_radians().sin_cos();
        add_triangle(&mut scene, [[0.0, 0.0, 0.0], [1.0, 0.0, 0.0], [0.0, 1.0, 0.0]], None, false)
            .expect("flat face");
        add_triangle(&mut scene, [[1.0, 0.0, 0.0], [0.0, 0.0, 0.0], [0.0, -cos, sin]], None, false)
            .expect("tilted face");
        end_texture(&mut scene).expect("end texture");
        add_conditional_line(
            &mut scene,
            [[0.0, 0.0, 0.0], [1.0, 0.0, 0.0]],
            [[0.0, 1.0, 0.0], [0.0, -cos, sin]],
            None,
        )
        .expect("hinge line");
        end_sub_model(&mut scene).expect("end");
        finish(&mut scene).expect("finish");

        let group = &scene.texmapped[TEXMAP_STANDARD];
        let store = group.store.read();
        let at_origin: Vec<[f32; 3]> = group.indices[ShapeType::Triangle.index()]
            .iter()
            .filter(|&&i| store.positions[i as usize] == [0.0, 0.0, 0.0])
            .map(|&i| store.normals[i as usize])
            .collect();
        assert_eq!(at_origin.len(), 2);
        for normal in at_origin {
            assert!((normal[1] - 0.0872).abs() < 1e-3, "normal {:?}", normal);
            assert!((normal[2] - 0.9962).abs() < 1e-3, "normal {:?}", normal);
        }
    }

    #[test]
    fn test_flattened_conditionals_snapshot() {
        let config = SceneConfig {
            flatten_conditionals: true,
            ..test_config()
        };
        let mut scene = create_scene(config).expect("scene");
        let stud = begin_sub_model(&mut scene, "stud", true, Matrix4::identity(), Default::default())
            .expect("stud");
        add_conditional_line(
            &mut scene,
            [[0.0, 0.0, 0.0], [0.0, 1.0, 0.0]],
            [[1.0, 0.0, 0.0], [-1.0, 0.0, 0.0]],
            None,
        )
        .expect("conditional");
        end_sub_model(&mut scene).expect("end");
        finish(&mut scene).expect("finish");

        let snapshot = scene.conditional_snapshot.as_ref().expect("snapshot");
        let root_lines = snapshot[0].as_ref().expect("root conditionals");
        assert_eq!(root_lines.indices[ShapeType::ConditionalLine.index()].len(), 2);
        let part = model(&scene.arena, stud.model).expect("stud");
        assert!(part.groups[Section::ConditionalLines.index()]
            .iter()
            .flatten()
            .all(|g| g.indices[ShapeType::ConditionalLine.index()].is_empty()));
    }

    #[test]
    fn test_flattened_conditionals_laid_out_by_step() {
        let config = SceneConfig {
            flatten_conditionals: true,
            ..test_config()
        };
        let mut scene = create_scene(config).expect("scene");
        let controls = [[1.0, 0.0, 0.0], [-1.0, 0.0, 0.0]];
        add_conditional_line(&mut scene, [[0.0, 0.0, 0.0], [0.0, 1.0, 0.0]], controls, None).expect("own");
        let shifted = Matrix4::from_translation(Vector3::new(5.0, 0.0, 0.0));
        begin_sub_model(&mut scene, "stud", true, shifted, Default::default()).expect("stud");
        add_conditional_line(&mut scene, [[0.0, 0.0, 0.0], [0.0, 1.0, 0.0]], controls, None).expect("part");
        end_sub_model(&mut scene).expect("end");
        next_step(&mut scene).expect("step");
        add_conditional_line(&mut scene, [[9.0, 0.0, 0.0], [9.0, 1.0, 0.0]], controls, None).expect("later");
        finish(&mut scene).expect("finish");

        let root = model(&scene.arena, scene.root).expect("root");
        let group = root.groups[Section::ConditionalLines.index()][0].as_ref().expect("root conditionals");
        let slot = ShapeType::ConditionalLine.index();
        assert_eq!(group.step_counts[slot], vec![4]);
        assert_eq!(visible_index_count(group, ShapeType::ConditionalLine, Some(0)), 4);
        let store = group.store.read();
        let starts: Vec<f32> = group.indices[slot]
            .iter()
            .step_by(2)
            .map(|&i| store.positions[i as usize][0])
            .collect();
        assert_eq!(starts, vec![0.0, 5.0, 9.0]);
        assert_eq!(group.control_point_indices.len(), 6);
    }
}
