//! Renderer Module - device seam, render context and vertex stores

pub mod recording_device;
pub mod render_context;
pub mod render_device;
pub mod vertex_store_data;
pub mod vertex_store_operations;
pub mod wgpu_device;

pub use recording_device::{recorded, DrawCommand, RecordingDevice};
pub use render_context::{
    begin_frame, create_render_context, current_matrix, pop_matrix, push_matrix, RenderContext,
    StoreId,
};
pub use render_device::{
    BlendMode, ColorMask, DeviceCapabilities, DeviceError, DrawListId, Primitive, RenderDevice,
    StateChange, VertexArrays, VertexBufferId,
};
pub use vertex_store_data::{SharedVertexStore, Vertex, VertexStoreData, VertexStoreLayout};
pub use wgpu_device::WgpuDevice;
