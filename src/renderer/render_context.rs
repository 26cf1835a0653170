//! Render context
//!
//! Owns the device for the duration of a frame and tracks which vertex store
//! is bound. Passed explicitly to everything that draws.

use cgmath::{Matrix4, SquareMatrix};

use super::render_device::{DeviceCapabilities, RenderDevice};

/// Unique identity of a vertex store
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct StoreId(pub u64);

pub struct RenderContext {
    pub device: Box<dyn RenderDevice>,
    pub capabilities: DeviceCapabilities,
    /// The one store currently bound on the device
    pub active_store: Option<StoreId>,
    /// CPU mirror of the device transform stack. The bottom entry is the view.
    pub matrix_stack: Vec<Matrix4<f32>>,
    pub projection: Matrix4<f32>,
    /// Set while a draw list is being recorded
    pub compiling: bool,
}

pub fn create_render_context(device: Box<dyn RenderDevice>) -> RenderContext {
    let capabilities = device.capabilities();
    RenderContext {
        device,
        capabilities,
        active_store: None,
        matrix_stack: vec![Matrix4::identity()],
        projection: Matrix4::identity(),
        compiling: false,
    }
}

/// Resets the stack to a new view and projection at the start of a frame
pub fn begin_frame(context: &mut RenderContext, view: Matrix4<f32>, projection: Matrix4<f32>) {
    context.matrix_stack.clear();
    context.matrix_stack.push(view);
    context.projection = projection;
    context.device.load_transform(&view);
}

pub fn current_matrix(context: &RenderContext) -> Matrix4<f32> {
    context
        .matrix_stack
        .last()
        .copied()
        .unwrap_or_else(Matrix4::identity)
}

pub fn push_matrix(context: &mut RenderContext, matrix: &Matrix4<f32>) {
    let top = current_matrix(context) * matrix;
    context.matrix_stack.push(top);
    context.device.push_transform(matrix);
}

pub fn pop_matrix(context: &mut RenderContext) {
    if context.matrix_stack.len() > 1 {
        context.matrix_stack.pop();
        context.device.pop_transform();
    } else {
        log::warn!("[RenderContext::pop_matrix] Transform stack underflow ignored");
    }
}

/// Take the device back, e.g. to inspect a recording
pub fn into_device(context: RenderContext) -> Box<dyn RenderDevice> {
    context.device
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::renderer::recording_device::RecordingDevice;
    use cgmath::Vector3;

    #[test]
    fn test_matrix_stack() {
        let mut context = create_render_context(Box::new(RecordingDevice::minimal()));
        let view = Matrix4::from_translation(Vector3::new(0.0, 0.0, -10.0));
        begin_frame(&mut context, view, Matrix4::identity());

        let child = Matrix4::from_translation(Vector3::new(1.0, 0.0, 0.0));
        push_matrix(&mut context, &child);
        assert_eq!(current_matrix(&context), view * child);
        pop_matrix(&mut context);
        assert_eq!(current_matrix(&context), view);

        // Underflow leaves the view in place.
        pop_matrix(&mut context);
        assert_eq!(current_matrix(&context), view);
    }
}
