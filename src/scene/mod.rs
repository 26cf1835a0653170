//! Scene: the retained model graph of one loaded model, its finish
//! pipeline and the per-frame pass sequence.

pub mod scene_data;
pub mod scene_operations;
pub mod scene_render_operations;

pub use scene_data::{
    InstanceOptions, SceneData, ScenePhase, StepState, SubModelBegin, TEXMAP_BFC, TEXMAP_STANDARD,
    TEXMAP_TRANSPARENT,
};
pub use scene_operations::{
    add_conditional_line, add_edge_line, add_instance, add_light, add_line, add_primitive,
    add_quad, add_strip, add_triangle, begin_sub_model, begin_texture, create_model_named,
    create_scene, current_model, end_sub_model, end_texture, face_section, find_model, finish,
    frame_camera, get_max_radius, next_step, open_gl_will_end, release_device_resources, set_step,
    step_count,
};
pub use scene_render_operations::{compile, draw_scene, ensure_pool, wait_for_conditionals, wait_for_sort};
