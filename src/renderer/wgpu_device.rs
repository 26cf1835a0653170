//! wgpu-backed render device
//!
//! Vertex stores are mirrored into real GPU buffers. Draw calls are recorded
//! as `DrawCommand`s for the frame encoder to replay against its pipelines.

use std::sync::Arc;

use cgmath::Matrix4;
use rustc_hash::FxHashMap;
use wgpu::util::DeviceExt;

use super::recording_device::{DrawCommand, RecordingDevice};
use super::render_device::{
    vertex_arrays_size, DeviceCapabilities, DeviceError, DrawListId, Primitive, RenderDevice,
    StateChange, VertexArrays, VertexBufferId,
};

/// GPU mirror of one vertex store
pub struct GpuVertexBuffers {
    pub positions: wgpu::Buffer,
    pub normals: wgpu::Buffer,
    pub tex_coords: Option<wgpu::Buffer>,
    pub colors: Option<wgpu::Buffer>,
    pub vertex_count: usize,
}

pub struct WgpuDevice {
    device: Arc<wgpu::Device>,
    #[allow(dead_code)]
    queue: Arc<wgpu::Queue>,
    buffers: FxHashMap<VertexBufferId, GpuVertexBuffers>,
    recorder: RecordingDevice,
    next_buffer: u32,
}

impl WgpuDevice {
    pub fn new(device: Arc<wgpu::Device>, queue: Arc<wgpu::Queue>) -> Self {
        // Draw lists are replayed from recorded commands, so they are always available.
        let capabilities = DeviceCapabilities {
            buffer_objects: true,
            multi_draw: true,
            occlusion_query: device.features().contains(wgpu::Features::PIPELINE_STATISTICS_QUERY),
            draw_lists: true,
            max_anisotropy: 16.0,
        };
        log::info!("[WgpuDevice::new] Capabilities: {:?}", capabilities);
        Self {
            device,
            queue,
            buffers: FxHashMap::default(),
            recorder: RecordingDevice::new(capabilities),
            next_buffer: 1,
        }
    }

    pub fn buffers(&self, id: VertexBufferId) -> Option<&GpuVertexBuffers> {
        self.buffers.get(&id)
    }

    /// Hands the recorded frame to the encoder and starts a new one
    pub fn take_frame_commands(&mut self) -> Vec<DrawCommand> {
        let commands = self.recorder.flattened_commands();
        self.recorder.clear();
        commands
    }

    fn create_buffer(&self, label: &str, contents: &[u8]) -> wgpu::Buffer {
        self.device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some(label),
            contents,
            usage: wgpu::BufferUsages::VERTEX | wgpu::BufferUsages::COPY_DST,
        })
    }
}

impl RenderDevice for WgpuDevice {
    fn capabilities(&self) -> DeviceCapabilities {
        self.recorder.capabilities
    }

    fn as_any(&self) -> &dyn std::any::Any {
        self
    }

    fn create_vertex_buffers(
        &mut self,
        label: &str,
        arrays: VertexArrays<'_>,
    ) -> Result<VertexBufferId, DeviceError> {
        self.device.push_error_scope(wgpu::ErrorFilter::OutOfMemory);
        self.device.push_error_scope(wgpu::ErrorFilter::Validation);

        let positions = self.create_buffer(
            &format!("{} positions", label),
            bytemuck::cast_slice(arrays.positions),
        );
        let normals = self.create_buffer(
            &format!("{} normals", label),
            bytemuck::cast_slice(arrays.normals),
        );
        let tex_coords = (!arrays.tex_coords.is_empty()).then(|| {
            self.create_buffer(
                &format!("{} tex coords", label),
                bytemuck::cast_slice(arrays.tex_coords),
            )
        });
        let colors = (!arrays.colors.is_empty()).then(|| {
            self.create_buffer(&format!("{} colors", label), bytemuck::cast_slice(arrays.colors))
        });

        let validation = pollster::block_on(self.device.pop_error_scope());
        let out_of_memory = pollster::block_on(self.device.pop_error_scope());

        if let Some(error) = out_of_memory {
            log::error!("[WgpuDevice::create_vertex_buffers] {}: {:?}", label, error);
            return Err(DeviceError::OutOfMemory {
                resource: label.to_string(),
                bytes: vertex_arrays_size(&arrays),
            });
        }
        if let Some(error) = validation {
            return Err(DeviceError::Rejected {
                resource: label.to_string(),
                description: error.to_string(),
            });
        }

        let id = VertexBufferId(self.next_buffer);
        self.next_buffer += 1;
        self.buffers.insert(
            id,
            GpuVertexBuffers {
                positions,
                normals,
                tex_coords,
                colors,
                vertex_count: arrays.positions.len(),
            },
        );
        log::debug!(
            "[WgpuDevice::create_vertex_buffers] {} -> {:?} ({} vertices)",
            label,
            id,
            arrays.positions.len()
        );
        Ok(id)
    }

    fn delete_vertex_buffers(&mut self, id: VertexBufferId) {
        if let Some(buffers) = self.buffers.remove(&id) {
            buffers.positions.destroy();
            buffers.normals.destroy();
            if let Some(buffer) = buffers.tex_coords {
                buffer.destroy();
            }
            if let Some(buffer) = buffers.colors {
                buffer.destroy();
            }
        }
    }

    fn bind_vertex_buffers(&mut self, id: VertexBufferId) {
        self.recorder.bind_vertex_buffers(id);
    }

    fn bind_client_arrays(&mut self, arrays: VertexArrays<'_>) {
        self.recorder.bind_client_arrays(arrays);
    }

    fn unbind_vertex_arrays(&mut self) {
        self.recorder.unbind_vertex_arrays();
    }

    fn load_transform(&mut self, matrix: &Matrix4<f32>) {
        self.recorder.load_transform(matrix);
    }

    fn push_transform(&mut self, matrix: &Matrix4<f32>) {
        self.recorder.push_transform(matrix);
    }

    fn pop_transform(&mut self) {
        self.recorder.pop_transform();
    }

    fn set_color(&mut self, color: u32) {
        self.recorder.set_color(color);
    }

    fn set_state(&mut self, state: StateChange) {
        self.recorder.set_state(state);
    }

    fn draw_elements(&mut self, primitive: Primitive, indices: &[u32]) {
        self.recorder.draw_elements(primitive, indices);
    }

    fn multi_draw_elements(&mut self, primitive: Primitive, batches: &[&[u32]]) {
        self.recorder.multi_draw_elements(primitive, batches);
    }

    fn begin_draw_list(&mut self) -> Option<DrawListId> {
        self.recorder.begin_draw_list()
    }

    fn end_draw_list(&mut self) {
        self.recorder.end_draw_list();
    }

    fn call_draw_list(&mut self, id: DrawListId) {
        self.recorder.call_draw_list(id);
    }

    fn delete_draw_list(&mut self, id: DrawListId) {
        self.recorder.delete_draw_list(id);
    }
}
