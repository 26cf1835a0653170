//! Scene Render Operations - Pure DOP Functions
//!
//! Per-frame pass sequence, draw-list compilation and the hand-off to the
//! frame worker pool.

use cgmath::Matrix4;

use super::scene_data::{SceneData, ScenePhase, TEXMAP_BFC, TEXMAP_STANDARD, TEXMAP_TRANSPARENT};
use crate::constants::polygon_offset::{SOLID_FACTOR, SOLID_UNITS, TEXMAP_FACTOR, TEXMAP_UNITS};
use crate::constants::workers::CONDITIONAL_BUCKETS;
use crate::model::model_operations::{collect_part_models, compile_model_section, store_for};
use crate::model::{draw_model, ModelDrawParams};
use crate::renderer::vertex_store_operations::{activate, deactivate};
use crate::renderer::{begin_frame, BlendMode, ColorMask, RenderContext, StateChange};
use crate::shape::shape_group_operations::{draw, draw_conditional_lines, is_empty};
use crate::shape::transparent_operations::sort_triangles;
use crate::shape::Section;
use crate::thread_pool::thread_pool_operations::compute_bucket;
use crate::thread_pool::{
    available_threads, create_frame_worker_pool, schedule_frame, try_claim_or_compute_inline,
    worker_count, BucketResult,
};

/// Texture bound over stud geometry when stud logos are on
pub const STUD_LOGO_TEXTURE: &str = "studlogo.png";

fn draw_params(scene: &SceneData) -> ModelDrawParams {
    ModelDrawParams {
        step: scene.steps.active,
        last_step: scene.steps.active.is_none(),
        alpha_threshold: scene.config.transparent_alpha_threshold,
        show_all_conditionals: scene.config.show_all_conditional_lines,
        root_conditionals_precomputed: conditionals_needed(scene),
        current_color: scene.config.default_color,
    }
}

fn sort_needed(scene: &SceneData) -> bool {
    scene.config.sort_transparent && !scene.config.cutaway && !is_empty(&scene.transparent.lock())
}

fn conditionals_needed(scene: &SceneData) -> bool {
    scene.conditional_snapshot.is_some()
        && scene.config.show_conditional_lines
        && !scene.config.show_all_conditional_lines
        && scene.steps.active.is_none()
}

/// Start the worker pool the first time a finished scene is drawn. A pool
/// that fails to start leaves all work on the render thread.
pub fn ensure_pool(scene: &mut SceneData) {
    if scene.pool_started || scene.phase != ScenePhase::Finished {
        return;
    }
    scene.pool_started = true;
    if !scene.config.multi_threaded {
        return;
    }
    let tasks = sort_needed(scene) as usize
        + if scene.conditional_snapshot.is_some() {
            CONDITIONAL_BUCKETS
        } else {
            0
        };
    if tasks == 0 {
        return;
    }
    let workers = worker_count(available_threads(), tasks, scene.config.max_workers);
    match create_frame_worker_pool(
        workers,
        Some(scene.transparent.clone()),
        scene.conditional_snapshot.clone(),
    ) {
        Ok(pool) => scene.pool = Some(pool),
        Err(e) => log::warn!("[Scene::ensure_pool] Running frame work inline: {}", e),
    }
}

/// Record a draw list per section for every part, and for the root with
/// `compile_all`. Returns the number of lists made.
pub fn compile(scene: &mut SceneData, context: &mut RenderContext) -> usize {
    if !(scene.config.compile_parts || scene.config.compile_all) || !context.capabilities.draw_lists {
        return 0;
    }
    let params = draw_params(scene);
    let root = scene.root;
    let mut targets = if scene.config.compile_parts {
        collect_part_models(&scene.arena, root)
    } else {
        Vec::new()
    };
    if scene.config.compile_all {
        targets.push(root);
    }
    let mut compiled = 0;
    for handle in targets {
        for section in Section::ALL {
            for colored in [false, true] {
                let present = scene.arena.models[handle.0 as usize].sections_present[colored as usize]
                    & section.bit();
                if present == 0 {
                    continue;
                }
                activate(&store_for(&scene.stores, section, colored), context, true);
                if compile_model_section(
                    &mut scene.arena,
                    handle,
                    context,
                    section,
                    colored,
                    &params,
                    handle == root,
                ) {
                    compiled += 1;
                }
            }
        }
    }
    deactivate(context);
    log::info!("[Scene::compile] Compiled {} draw lists", compiled);
    compiled
}

fn draw_root_section(scene: &SceneData, context: &mut RenderContext, section: Section, colored: bool) {
    let params = draw_params(scene);
    activate(&store_for(&scene.stores, section, colored), context, false);
    draw_model(&scene.arena, scene.root, context, section, colored, &params, true, false);
}

fn draw_face_sections(scene: &SceneData, context: &mut RenderContext, colored: bool) {
    for (plain, culled) in [(Section::Standard, Section::Bfc), (Section::Stud, Section::StudBfc)] {
        let stud = plain.is_stud() && scene.config.stud_logo;
        if stud {
            context
                .device
                .set_state(StateChange::Texture(Some(STUD_LOGO_TEXTURE.to_string())));
        }
        draw_root_section(scene, context, plain, colored);
        if scene.config.bfc {
            context.device.set_state(StateChange::CullBackFaces(true));
            draw_root_section(scene, context, culled, colored);
            context.device.set_state(StateChange::CullBackFaces(false));
        } else {
            draw_root_section(scene, context, culled, colored);
        }
        if stud {
            context.device.set_state(StateChange::Texture(None));
        }
    }
}

fn lines_drawn(scene: &SceneData) -> bool {
    scene.config.draw_lines || scene.config.show_conditional_lines
}

fn draw_solids(scene: &SceneData, context: &mut RenderContext) {
    let offset = scene.config.polygon_offset && lines_drawn(scene);
    if offset {
        context.device.set_state(StateChange::PolygonOffset {
            factor: SOLID_FACTOR,
            units: SOLID_UNITS,
        });
    }
    context.device.set_state(StateChange::Lighting(true));
    context.device.set_color(scene.config.default_color);
    draw_face_sections(scene, context, false);

    context.device.set_state(StateChange::UseVertexColors(true));
    draw_face_sections(scene, context, true);
    context.device.set_state(StateChange::UseVertexColors(false));
    if offset {
        context.device.set_state(StateChange::PolygonOffsetOff);
    }
}

fn draw_line_sections(
    scene: &SceneData,
    context: &mut RenderContext,
    colored: bool,
    precomputed: &[BucketResult],
) {
    draw_root_section(scene, context, Section::Lines, colored);
    if scene.config.draw_lines {
        draw_root_section(scene, context, Section::EdgeLines, colored);
    }
    if scene.config.show_conditional_lines {
        draw_root_section(scene, context, Section::ConditionalLines, colored);
        for result in precomputed {
            draw_conditional_lines(context, &result[colored as usize]);
        }
    }
}

/// Channel masks of the line and transparent passes
fn mask_passes(save_alpha: bool, depth_pass: bool) -> &'static [ColorMask] {
    match (save_alpha, depth_pass) {
        (false, _) => &[ColorMask::All],
        (true, false) => &[ColorMask::ColorOnly, ColorMask::AlphaOnly],
        (true, true) => &[ColorMask::ColorOnly, ColorMask::AlphaOnly, ColorMask::None],
    }
}

fn draw_lines(scene: &SceneData, context: &mut RenderContext) {
    if !lines_drawn(scene) {
        return;
    }
    let precomputed: Vec<BucketResult> = if conditionals_needed(scene) {
        (0..CONDITIONAL_BUCKETS)
            .map(|bucket| wait_for_conditionals(scene, bucket))
            .collect()
    } else {
        Vec::new()
    };
    context.device.set_state(StateChange::Lighting(false));
    context
        .device
        .set_state(StateChange::LineWidth(scene.config.line_width));
    for &mask in mask_passes(scene.config.save_alpha, true) {
        context.device.set_state(StateChange::ColorMask(mask));
        context.device.set_color(scene.config.default_color);
        draw_line_sections(scene, context, false, &precomputed);
        context.device.set_state(StateChange::UseVertexColors(true));
        draw_line_sections(scene, context, true, &precomputed);
        context.device.set_state(StateChange::UseVertexColors(false));
    }
    context.device.set_state(StateChange::ColorMask(ColorMask::All));
    context.device.set_state(StateChange::Lighting(true));
}

fn draw_texmapped(scene: &SceneData, context: &mut RenderContext, slots: &[usize]) {
    if slots.iter().all(|&slot| is_empty(&scene.texmapped[slot])) {
        return;
    }
    activate(&scene.stores.texmap, context, false);
    context.device.set_state(StateChange::PolygonOffset {
        factor: TEXMAP_FACTOR,
        units: TEXMAP_UNITS,
    });
    context.device.set_state(StateChange::UseVertexColors(true));
    for &slot in slots {
        let group = &scene.texmapped[slot];
        let cull = slot == TEXMAP_BFC && scene.config.bfc;
        if cull {
            context.device.set_state(StateChange::CullBackFaces(true));
        }
        draw(group, context, scene.steps.active);
        if cull {
            context.device.set_state(StateChange::CullBackFaces(false));
        }
    }
    context.device.set_state(StateChange::UseVertexColors(false));
    context.device.set_state(StateChange::PolygonOffsetOff);
}

fn draw_transparent(scene: &SceneData, context: &mut RenderContext, view: &Matrix4<f32>) {
    if is_empty(&scene.transparent.lock()) {
        return;
    }
    if sort_needed(scene) {
        match &scene.pool {
            Some(pool) => crate::thread_pool::wait_for_sort(pool),
            None => sort_triangles(&mut scene.transparent.lock(), view),
        }
    }
    activate(&scene.stores.transparent, context, false);
    context.device.set_state(StateChange::Blend(BlendMode::Alpha));
    context.device.set_state(StateChange::DepthWrite(false));
    context.device.set_state(StateChange::UseVertexColors(true));
    {
        let group = scene.transparent.lock();
        for &mask in mask_passes(scene.config.save_alpha, false) {
            context.device.set_state(StateChange::ColorMask(mask));
            draw(&group, context, scene.steps.active);
        }
    }
    context.device.set_state(StateChange::ColorMask(ColorMask::All));
    if scene.config.textures_after_transparent {
        draw_texmapped(scene, context, &[TEXMAP_TRANSPARENT]);
    }
    context.device.set_state(StateChange::UseVertexColors(false));
    context.device.set_state(StateChange::DepthWrite(true));
    context.device.set_state(StateChange::Blend(BlendMode::Opaque));
}

/// Draw one frame: solids, lines, texture maps, then transparency.
pub fn draw_scene(
    scene: &mut SceneData,
    context: &mut RenderContext,
    view: Matrix4<f32>,
    projection: Matrix4<f32>,
) {
    begin_frame(context, view, projection);
    ensure_pool(scene);
    let sort = sort_needed(scene);
    scene.conditional_mvp = conditionals_needed(scene).then_some(projection * view);
    if let Some(pool) = &scene.pool {
        schedule_frame(pool, sort.then_some(view), scene.conditional_mvp);
    }

    draw_solids(scene, context);
    draw_lines(scene, context);
    if scene.config.textures_after_transparent {
        draw_texmapped(scene, context, &[TEXMAP_STANDARD, TEXMAP_BFC]);
    } else {
        draw_texmapped(scene, context, &[TEXMAP_STANDARD, TEXMAP_BFC, TEXMAP_TRANSPARENT]);
    }
    draw_transparent(scene, context, &view);
    deactivate(context);
}

/// Block until this frame's transparent sort is done. Without a pool the
/// sort runs inside the transparent pass instead.
pub fn wait_for_sort(scene: &SceneData) {
    if let Some(pool) = &scene.pool {
        crate::thread_pool::wait_for_sort(pool);
    }
}

/// Visible conditional lines of one bucket for the frame being drawn,
/// computed here when no worker has picked the bucket up.
pub fn wait_for_conditionals(scene: &SceneData, bucket: usize) -> BucketResult {
    if let Some(pool) = &scene.pool {
        return try_claim_or_compute_inline(pool, bucket);
    }
    match (&scene.conditional_snapshot, &scene.conditional_mvp) {
        (Some(snapshot), Some(mvp)) if bucket < CONDITIONAL_BUCKETS => compute_bucket(snapshot, mvp, bucket),
        _ => Default::default(),
    }
}
