// Brickscene Engine - Data-Oriented Programming (DOP) Architecture
//
// A retained-mode geometry engine for brick models: a DAG of models with
// shared vertex stores, a finish pipeline that flattens, smooths and moves
// transparent and texture-mapped triangles into scene-wide buckets, and a
// fixed per-frame pass sequence drawn through a device seam.
//
// For new code, prefer:
// - scene::scene_operations for building and finishing a scene
// - scene::scene_render_operations for compiling and drawing it
// - Pure functions over methods

// Constants module
pub mod constants;

// Core engine modules
pub mod config;
pub mod error;
pub mod logging;

// Geometry and scene graph
pub mod camera;
pub mod geometry;
pub mod model;
pub mod renderer;
pub mod scene;
pub mod shape;
pub mod smoothing;

// Background frame work
pub mod thread_pool;

use static_assertions::const_assert;

pub use camera::{CameraData, CameraUniform};
pub use config::{load_config, ConfigError, SceneConfig};
pub use error::{EngineError, EngineResult, OptionExt};
pub use geometry::AABB;
pub use logging::init_logging;
pub use model::{LightData, ModelHandle, TexmapProjection};
pub use renderer::{
    create_render_context, DeviceCapabilities, RecordingDevice, RenderContext, RenderDevice,
    WgpuDevice,
};
pub use scene::{InstanceOptions, SceneData, ScenePhase};
pub use shape::{Section, ShapeType};

// Re-export wgpu for hosts that hand their own device to WgpuDevice
pub use wgpu;

// Section bits and shape bits are packed into u32 masks
const_assert!(shape::SECTION_COUNT <= 32);
const_assert!(shape::SHAPE_TYPE_COUNT <= 32);
// One pending flag per bucket fits the frame work state
const_assert!(constants::workers::CONDITIONAL_BUCKETS <= 64);
