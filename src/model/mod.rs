//! Model graph: parts, sub-models, variants and texture-map regions

pub mod model_data;
pub mod model_operations;
pub mod model_transfer_operations;
pub mod texmap_operations;

pub use model_data::{
    FlattenJob, LightData, ModelArena, ModelData, ModelDrawParams, ModelFlags, ModelHandle,
    StoreSet, SubModelData, TexmapFrame, TexmapInfo, TexmapProjection,
};
pub use model_operations::{
    add_model_conditional_line, add_model_shape, add_sub_model, begin_texmap, bounding_box,
    create_model, create_model_arena, create_store_set, create_sub_model, draw_model,
    effective_model, end_texmap, flatten_model, get_inverted_model, get_un_mirrored_model, model,
    model_mut, resolved_effective_model,
};
pub use model_transfer_operations::SteppedTriangle;
