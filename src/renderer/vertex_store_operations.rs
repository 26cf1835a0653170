//! Vertex Store Operations - Pure DOP Functions
//!
//! Appending, copying and device activation of vertex stores.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use bit_vec::BitVec;
use parking_lot::RwLock;

use super::render_context::{RenderContext, StoreId};
use super::render_device::VertexArrays;
use super::vertex_store_data::{
    GpuBufferState, SharedVertexStore, Vertex, VertexStoreData, VertexStoreLayout,
};
use crate::geometry::face_normal;

static NEXT_STORE_ID: AtomicU64 = AtomicU64::new(1);

/// Create new empty vertex store
pub fn create_vertex_store(label: &str, layout: VertexStoreLayout) -> VertexStoreData {
    VertexStoreData {
        id: StoreId(NEXT_STORE_ID.fetch_add(1, Ordering::Relaxed)),
        label: label.to_string(),
        layout,
        positions: Vec::new(),
        normals: Vec::new(),
        tex_coords: Vec::new(),
        colors: Vec::new(),
        edge_flags: BitVec::new(),
        step_boundaries: Vec::new(),
        gpu: GpuBufferState::default(),
    }
}

pub fn create_shared_vertex_store(label: &str, layout: VertexStoreLayout) -> SharedVertexStore {
    Arc::new(RwLock::new(create_vertex_store(label, layout)))
}

/// Get the number of vertices
pub fn vertex_count(store: &VertexStoreData) -> usize {
    store.positions.len()
}

fn record_step(store: &mut VertexStoreData, step: usize) {
    let count = store.positions.len() as u32;
    while store.step_boundaries.len() <= step {
        let previous = store.step_boundaries.last().copied().unwrap_or(0);
        store.step_boundaries.push(previous);
    }
    store.step_boundaries[step] = count;
}

/// Append one vertex. Optional streams the store does not carry are dropped.
pub fn push_vertex(store: &mut VertexStoreData, vertex: &Vertex) -> u32 {
    let index = store.positions.len() as u32;
    store.positions.push(vertex.position);
    store.normals.push(vertex.normal);
    if store.layout.tex_coords {
        store.tex_coords.push(vertex.tex_coord);
    }
    if store.layout.colors {
        store.colors.push(vertex.color);
    }
    if store.layout.edge_flags {
        store.edge_flags.push(vertex.edge);
    }
    index
}

/// Append a primitive's vertices and return the index of the first one.
///
/// Missing normals are replaced by the flat normal of the first three
/// positions. Missing texture coordinates default to zero.
pub fn append_vertices(
    store: &mut VertexStoreData,
    positions: &[[f32; 3]],
    normals: Option<&[[f32; 3]]>,
    tex_coords: Option<&[[f32; 2]]>,
    color: Option<u32>,
    edge: bool,
    step: usize,
) -> u32 {
    let start = store.positions.len() as u32;
    let flat = if positions.len() >= 3 {
        face_normal(positions[0], positions[1], positions[2])
    } else {
        [0.0, 0.0, 0.0]
    };
    for (i, position) in positions.iter().enumerate() {
        let vertex = Vertex {
            position: *position,
            normal: normals.and_then(|n| n.get(i).copied()).unwrap_or(flat),
            tex_coord: tex_coords.and_then(|t| t.get(i).copied()).unwrap_or([0.0, 0.0]),
            color: color.unwrap_or(0),
            edge,
        };
        push_vertex(store, &vertex);
    }
    record_step(store, step);
    start
}

/// Read back one vertex
pub fn vertex_at(store: &VertexStoreData, index: u32) -> Vertex {
    let i = index as usize;
    Vertex {
        position: store.positions.get(i).copied().unwrap_or_default(),
        normal: store.normals.get(i).copied().unwrap_or_default(),
        tex_coord: store.tex_coords.get(i).copied().unwrap_or_default(),
        color: store.colors.get(i).copied().unwrap_or(0),
        edge: store.edge_flags.get(i).unwrap_or(true),
    }
}

pub fn set_normal(store: &mut VertexStoreData, index: u32, normal: [f32; 3]) {
    if let Some(slot) = store.normals.get_mut(index as usize) {
        *slot = normal;
    }
}

pub fn vertex_arrays(store: &VertexStoreData) -> VertexArrays<'_> {
    VertexArrays {
        positions: &store.positions,
        normals: &store.normals,
        tex_coords: &store.tex_coords,
        colors: &store.colors,
    }
}

/// Bind this store on the device, deactivating whatever was bound before.
///
/// Uploads (or re-uploads after growth) when buffer objects are available.
/// A failed allocation is logged once and the store stays on client arrays
/// for the rest of its life. While compiling, client arrays are always used
/// so the list captures the data.
pub fn activate(store: &SharedVertexStore, context: &mut RenderContext, for_compile: bool) {
    let mut data = store.write();
    let count = data.positions.len();
    let already_active = context.active_store == Some(data.id);
    let needs_upload = context.capabilities.buffer_objects
        && !for_compile
        && !data.gpu.allocation_failed
        && count > 0
        && (data.gpu.buffer.is_none() || data.gpu.uploaded_count != count);

    if already_active && !needs_upload && !for_compile && !context.compiling {
        return;
    }
    if context.active_store.is_some() {
        deactivate(context);
    }

    if needs_upload {
        if let Some(old) = data.gpu.buffer.take() {
            context.device.delete_vertex_buffers(old);
        }
        let label = data.label.clone();
        match context.device.create_vertex_buffers(&label, vertex_arrays(&data)) {
            Ok(id) => {
                data.gpu.buffer = Some(id);
                data.gpu.uploaded_count = count;
                log::debug!(
                    "[VertexStore::activate] Uploaded {} vertices for {}",
                    count,
                    label
                );
            }
            Err(e) => {
                data.gpu.allocation_failed = true;
                log::warn!(
                    "[VertexStore::activate] {}; using client arrays for {}",
                    e,
                    label
                );
            }
        }
    }

    match data.gpu.buffer {
        Some(id) if !for_compile && data.gpu.uploaded_count == count => {
            context.device.bind_vertex_buffers(id)
        }
        _ => context.device.bind_client_arrays(vertex_arrays(&data)),
    }
    context.active_store = Some(data.id);
}

/// Unbind whatever store is active
pub fn deactivate(context: &mut RenderContext) {
    if context.active_store.take().is_some() {
        context.device.unbind_vertex_arrays();
    }
}

/// Delete this store's device buffers through a live device
pub fn delete_gpu_resources(store: &SharedVertexStore, context: &mut RenderContext) {
    let mut data = store.write();
    if let Some(id) = data.gpu.buffer.take() {
        context.device.delete_vertex_buffers(id);
    }
    data.gpu.uploaded_count = 0;
    if context.active_store == Some(data.id) {
        context.active_store = None;
    }
}

/// Forget device buffers without touching the device, for teardown after
/// the device is gone.
pub fn release_gpu_resources(store: &SharedVertexStore) {
    let mut data = store.write();
    data.gpu.buffer = None;
    data.gpu.uploaded_count = 0;
}
