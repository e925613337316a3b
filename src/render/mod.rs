pub mod camera;
pub mod controls;
mod gpu;
pub mod intro;
pub mod pick;
pub mod raycast;
pub mod tuner;

pub use gpu::WgpuRenderer;

use crate::app::egui_host::EguiFrameOutput;
use crate::config::LightingConfig;
use crate::scene::lights::LightRig;
use crate::scene::SceneGraph;
use camera::PerspectiveCamera;

#[derive(Debug, thiserror::Error)]
pub enum RenderError {
    #[error("failed to create window surface: {0}")]
    Surface(#[from] wgpu::CreateSurfaceError),
    #[error("surface does not support this adapter")]
    SurfaceUnsupported,
    #[error("no compatible GPU adapter found")]
    Adapter,
    #[error("failed to create GPU device: {0}")]
    Device(#[from] wgpu::RequestDeviceError),
    #[error("failed to acquire frame: {0}")]
    Frame(wgpu::SurfaceError),
}

/// Everything one frame needs from the session.
pub struct FrameInput<'a> {
    pub scene: &'a SceneGraph,
    pub camera: &'a PerspectiveCamera,
    pub lights: &'a LightRig,
    pub lighting: &'a LightingConfig,
    pub overlay: Option<&'a EguiFrameOutput>,
}

/// Draws a [`SceneGraph`]. GPU copies of geometry and textures are created
/// lazily the first time they are drawn, so meshes added after load (the
/// ground, the highlight material) need no separate upload call.
pub trait SceneRenderer {
    /// Upload whatever in `scene` is not on the GPU yet.
    fn upload_scene(&mut self, scene: &SceneGraph);
    fn render(&mut self, frame: &FrameInput<'_>) -> Result<(), RenderError>;
    fn resize(&mut self, width: u32, height: u32);
    /// Release every GPU resource and detach from the window surface.
    /// Later calls do nothing.
    fn dispose(&mut self);
    fn is_disposed(&self) -> bool;
}
