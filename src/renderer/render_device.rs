//! Render device seam
//!
//! Everything the scene needs from the graphics backend goes through
//! `RenderDevice`. The backend reports its capabilities up front and the
//! scene falls back to slower paths for anything that is missing.

use cgmath::Matrix4;

/// Identifier of a set of GPU-resident vertex buffers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct VertexBufferId(pub u32);

/// Identifier of a compiled draw list
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DrawListId(pub u32);

/// Primitive topology of an indexed draw
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Primitive {
    Points,
    Lines,
    Triangles,
    Quads,
    TriangleStrip,
    QuadStrip,
    TriangleFan,
}

/// Optional backend features. All of them may be absent.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DeviceCapabilities {
    pub buffer_objects: bool,
    pub multi_draw: bool,
    pub occlusion_query: bool,
    pub draw_lists: bool,
    pub max_anisotropy: f32,
}

impl Default for DeviceCapabilities {
    fn default() -> Self {
        Self {
            buffer_objects: false,
            multi_draw: false,
            occlusion_query: false,
            draw_lists: false,
            max_anisotropy: 1.0,
        }
    }
}

/// Blend modes used by the pass sequence
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BlendMode {
    Opaque,
    Alpha,
}

/// Channel masks used by the save-alpha passes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ColorMask {
    All,
    ColorOnly,
    AlphaOnly,
    None,
}

/// Fixed-function style state changes issued by the pass sequence
#[derive(Debug, Clone, PartialEq)]
pub enum StateChange {
    Lighting(bool),
    CullBackFaces(bool),
    Blend(BlendMode),
    DepthWrite(bool),
    ColorMask(ColorMask),
    PolygonOffset { factor: f32, units: f32 },
    PolygonOffsetOff,
    LineWidth(f32),
    PointSize(f32),
    UseVertexColors(bool),
    Texture(Option<String>),
}

/// Borrowed view of one vertex store's attribute arrays
#[derive(Debug, Clone, Copy)]
pub struct VertexArrays<'a> {
    pub positions: &'a [[f32; 3]],
    pub normals: &'a [[f32; 3]],
    pub tex_coords: &'a [[f32; 2]],
    pub colors: &'a [u32],
}

/// Device-side failures
#[derive(Debug, thiserror::Error)]
pub enum DeviceError {
    #[error("out of device memory while allocating {resource} ({bytes} bytes)")]
    OutOfMemory { resource: String, bytes: u64 },

    #[error("{resource} rejected by the device: {description}")]
    Rejected { resource: String, description: String },

    #[error("{resource} is not supported by this device")]
    Unsupported { resource: String },
}

impl DeviceError {
    pub fn resource(&self) -> &str {
        match self {
            DeviceError::OutOfMemory { resource, .. }
            | DeviceError::Rejected { resource, .. }
            | DeviceError::Unsupported { resource } => resource,
        }
    }
}

/// Backend the scene draws through.
///
/// Transforms form a stack like the classic modelview stack so that compiled
/// draw lists stay relocatable. Index slices are copied by the device.
pub trait RenderDevice: Send {
    fn capabilities(&self) -> DeviceCapabilities;
    fn as_any(&self) -> &dyn std::any::Any;

    fn create_vertex_buffers(
        &mut self,
        label: &str,
        arrays: VertexArrays<'_>,
    ) -> Result<VertexBufferId, DeviceError>;
    fn delete_vertex_buffers(&mut self, id: VertexBufferId);
    fn bind_vertex_buffers(&mut self, id: VertexBufferId);
    fn bind_client_arrays(&mut self, arrays: VertexArrays<'_>);
    fn unbind_vertex_arrays(&mut self);

    fn load_transform(&mut self, matrix: &Matrix4<f32>);
    fn push_transform(&mut self, matrix: &Matrix4<f32>);
    fn pop_transform(&mut self);
    fn set_color(&mut self, color: u32);
    fn set_state(&mut self, state: StateChange);

    fn draw_elements(&mut self, primitive: Primitive, indices: &[u32]);
    fn multi_draw_elements(&mut self, primitive: Primitive, batches: &[&[u32]]);

    /// Starts recording. Returns `None` when lists are unsupported.
    fn begin_draw_list(&mut self) -> Option<DrawListId>;
    fn end_draw_list(&mut self);
    fn call_draw_list(&mut self, id: DrawListId);
    fn delete_draw_list(&mut self, id: DrawListId);
}

/// Bytes needed to mirror a set of vertex arrays on the device
pub fn vertex_arrays_size(arrays: &VertexArrays<'_>) -> u64 {
    (std::mem::size_of_val(arrays.positions)
        + std::mem::size_of_val(arrays.normals)
        + std::mem::size_of_val(arrays.tex_coords)
        + std::mem::size_of_val(arrays.colors)) as u64
}
