//! Headless render device
//!
//! Records every call as a `DrawCommand`. Used for tests and for tools that
//! want to inspect what a frame would draw without a GPU.

use cgmath::Matrix4;
use rustc_hash::FxHashMap;

use super::render_context::RenderContext;
use super::render_device::{
    vertex_arrays_size, DeviceCapabilities, DeviceError, DrawListId, Primitive, RenderDevice,
    StateChange, VertexArrays, VertexBufferId,
};

/// One recorded device call
#[derive(Debug, Clone, PartialEq)]
pub enum DrawCommand {
    BindBuffers(VertexBufferId),
    BindClientArrays { vertex_count: usize },
    UnbindArrays,
    LoadTransform(Matrix4<f32>),
    PushTransform(Matrix4<f32>),
    PopTransform,
    Color(u32),
    State(StateChange),
    Draw { primitive: Primitive, indices: Vec<u32> },
    MultiDraw { primitive: Primitive, batches: Vec<Vec<u32>> },
    CallList(DrawListId),
}

pub struct RecordingDevice {
    pub capabilities: DeviceCapabilities,
    /// Forces every buffer allocation to fail
    pub fail_allocations: bool,
    pub commands: Vec<DrawCommand>,
    pub lists: FxHashMap<DrawListId, Vec<DrawCommand>>,
    pub buffers: FxHashMap<VertexBufferId, usize>,
    pub allocation_attempts: usize,
    recording: Option<(DrawListId, Vec<DrawCommand>)>,
    next_buffer: u32,
    next_list: u32,
}

impl RecordingDevice {
    pub fn new(capabilities: DeviceCapabilities) -> Self {
        Self {
            capabilities,
            fail_allocations: false,
            commands: Vec::new(),
            lists: FxHashMap::default(),
            buffers: FxHashMap::default(),
            allocation_attempts: 0,
            recording: None,
            next_buffer: 1,
            next_list: 1,
        }
    }

    /// Device with every optional feature available
    pub fn full() -> Self {
        Self::new(DeviceCapabilities {
            buffer_objects: true,
            multi_draw: true,
            occlusion_query: true,
            draw_lists: true,
            max_anisotropy: 16.0,
        })
    }

    /// Device with nothing but client arrays and single draws
    pub fn minimal() -> Self {
        Self::new(DeviceCapabilities::default())
    }

    fn record(&mut self, command: DrawCommand) {
        match &mut self.recording {
            Some((_, list)) => list.push(command),
            None => self.commands.push(command),
        }
    }

    /// Commands with list calls expanded in place
    pub fn flattened_commands(&self) -> Vec<DrawCommand> {
        let mut out = Vec::new();
        expand_commands(&self.commands, &self.lists, &mut out, 0);
        out
    }

    /// Every index drawn in order, with list calls expanded
    pub fn drawn_indices(&self) -> Vec<u32> {
        self.flattened_commands()
            .into_iter()
            .flat_map(|command| match command {
                DrawCommand::Draw { indices, .. } => indices,
                DrawCommand::MultiDraw { batches, .. } => batches.concat(),
                _ => Vec::new(),
            })
            .collect()
    }

    pub fn clear(&mut self) {
        self.commands.clear();
    }
}

/// The recording device behind a context, if that is what it holds
pub fn recorded(context: &RenderContext) -> Option<&RecordingDevice> {
    context.device.as_any().downcast_ref::<RecordingDevice>()
}

fn expand_commands(
    commands: &[DrawCommand],
    lists: &FxHashMap<DrawListId, Vec<DrawCommand>>,
    out: &mut Vec<DrawCommand>,
    depth: usize,
) {
    for command in commands {
        match command {
            DrawCommand::CallList(id) if depth < 16 => {
                if let Some(list) = lists.get(id) {
                    expand_commands(list, lists, out, depth + 1);
                }
            }
            other => out.push(other.clone()),
        }
    }
}

impl RenderDevice for RecordingDevice {
    fn capabilities(&self) -> DeviceCapabilities {
        self.capabilities
    }

    fn as_any(&self) -> &dyn std::any::Any {
        self
    }

    fn create_vertex_buffers(
        &mut self,
        label: &str,
        arrays: VertexArrays<'_>,
    ) -> Result<VertexBufferId, DeviceError> {
        self.allocation_attempts += 1;
        if !self.capabilities.buffer_objects {
            return Err(DeviceError::Unsupported {
                resource: label.to_string(),
            });
        }
        if self.fail_allocations {
            return Err(DeviceError::OutOfMemory {
                resource: label.to_string(),
                bytes: vertex_arrays_size(&arrays),
            });
        }
        let id = VertexBufferId(self.next_buffer);
        self.next_buffer += 1;
        self.buffers.insert(id, arrays.positions.len());
        Ok(id)
    }

    fn delete_vertex_buffers(&mut self, id: VertexBufferId) {
        self.buffers.remove(&id);
    }

    fn bind_vertex_buffers(&mut self, id: VertexBufferId) {
        self.record(DrawCommand::BindBuffers(id));
    }

    fn bind_client_arrays(&mut self, arrays: VertexArrays<'_>) {
        self.record(DrawCommand::BindClientArrays {
            vertex_count: arrays.positions.len(),
        });
    }

    fn unbind_vertex_arrays(&mut self) {
        self.record(DrawCommand::UnbindArrays);
    }

    fn load_transform(&mut self, matrix: &Matrix4<f32>) {
        self.record(DrawCommand::LoadTransform(*matrix));
    }

    fn push_transform(&mut self, matrix: &Matrix4<f32>) {
        self.record(DrawCommand::PushTransform(*matrix));
    }

    fn pop_transform(&mut self) {
        self.record(DrawCommand::PopTransform);
    }

    fn set_color(&mut self, color: u32) {
        self.record(DrawCommand::Color(color));
    }

    fn set_state(&mut self, state: StateChange) {
        self.record(DrawCommand::State(state));
    }

    fn draw_elements(&mut self, primitive: Primitive, indices: &[u32]) {
        if !indices.is_empty() {
            self.record(DrawCommand::Draw {
                primitive,
                indices: indices.to_vec(),
            });
        }
    }

    fn multi_draw_elements(&mut self, primitive: Primitive, batches: &[&[u32]]) {
        self.record(DrawCommand::MultiDraw {
            primitive,
            batches: batches.iter().map(|batch| batch.to_vec()).collect(),
        });
    }

    fn begin_draw_list(&mut self) -> Option<DrawListId> {
        if !self.capabilities.draw_lists || self.recording.is_some() {
            return None;
        }
        let id = DrawListId(self.next_list);
        self.next_list += 1;
        self.recording = Some((id, Vec::new()));
        Some(id)
    }

    fn end_draw_list(&mut self) {
        if let Some((id, list)) = self.recording.take() {
            self.lists.insert(id, list);
        }
    }

    fn call_draw_list(&mut self, id: DrawListId) {
        self.record(DrawCommand::CallList(id));
    }

    fn delete_draw_list(&mut self, id: DrawListId) {
        self.lists.remove(&id);
    }
}
