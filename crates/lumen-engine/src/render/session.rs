use winit::window::Window;

use crate::camera::CameraState;
use crate::time::FrameTime;

use super::backend::GraphicsBackend;
use super::config::RenderConfig;
use super::error::RenderError;
use super::scene::{DrawStats, SceneGraph};
use super::shader::ShaderLibrary;
use super::viewport::Viewport;

/// Per-frame data visible to overlays.
#[derive(Debug, Copy, Clone)]
pub struct OverlayCtx<'a> {
    pub window: Option<&'a Window>,
    pub time: FrameTime,
    pub viewport: Viewport,
    /// Statistics of the scene pass; zero during `begin_frame`.
    pub stats: DrawStats,
}

/// Something drawn on top of the scene every frame, such as a GUI.
///
/// The session brackets each frame with it and never looks inside.
pub trait Overlay {
    /// Called once, before the first frame the overlay sees.
    fn init(&mut self, window: Option<&Window>) {
        let _ = window;
    }

    fn begin_frame(&mut self, ctx: &OverlayCtx<'_>) {
        let _ = ctx;
    }

    /// Called after the scene has been drawn.
    fn render(&mut self, ctx: &OverlayCtx<'_>, backend: &mut dyn GraphicsBackend);

    /// Called once when the session goes away.
    fn shutdown(&mut self) {}
}

/// Inputs to one frame.
#[derive(Debug, Copy, Clone)]
pub struct FrameInput<'a> {
    pub viewport: Viewport,
    /// `None` until the application has set up a camera.
    pub camera: Option<&'a CameraState>,
    pub window: Option<&'a Window>,
    pub time: FrameTime,
}

struct OverlaySlot {
    overlay: Box<dyn Overlay>,
    initialized: bool,
}

/// Drives one frame: release → clear → scene → overlays.
///
/// Presenting is left to the caller, which owns the surface.
pub struct RenderSession {
    config: RenderConfig,
    scene: SceneGraph,
    shaders: ShaderLibrary,
    overlays: Vec<OverlaySlot>,
    last_stats: DrawStats,
}

impl RenderSession {
    pub fn new(config: RenderConfig) -> Self {
        Self {
            config,
            scene: SceneGraph::new(),
            shaders: ShaderLibrary::new(),
            overlays: Vec::new(),
            last_stats: DrawStats::default(),
        }
    }

    pub fn config(&self) -> &RenderConfig {
        &self.config
    }

    pub fn config_mut(&mut self) -> &mut RenderConfig {
        &mut self.config
    }

    pub fn scene(&self) -> &SceneGraph {
        &self.scene
    }

    pub fn scene_mut(&mut self) -> &mut SceneGraph {
        &mut self.scene
    }

    pub fn shaders_mut(&mut self) -> &mut ShaderLibrary {
        &mut self.shaders
    }

    /// Scene and shader library borrowed together, for building models.
    pub fn parts_mut(&mut self) -> (&mut SceneGraph, &mut ShaderLibrary) {
        (&mut self.scene, &mut self.shaders)
    }

    pub fn add_overlay(&mut self, overlay: impl Overlay + 'static) {
        self.overlays.push(OverlaySlot {
            overlay: Box::new(overlay),
            initialized: false,
        });
    }

    /// Drops library programs no model uses any more. Their device programs
    /// are released at the start of the next frame.
    pub fn purge_unused_shaders(&mut self) -> usize {
        let purged = self.shaders.purge_unused();
        if purged > 0 {
            log::debug!("purged {purged} unused shader programs");
        }
        purged
    }

    pub fn last_stats(&self) -> DrawStats {
        self.last_stats
    }

    /// Records one frame into `backend`.
    ///
    /// Fails only when no camera is available yet; the frame is still cleared
    /// and overlays still run.
    pub fn render_frame(
        &mut self,
        backend: &mut dyn GraphicsBackend,
        input: FrameInput<'_>,
    ) -> Result<DrawStats, RenderError> {
        let released = backend.collect_released();
        if released > 0 {
            log::trace!("released {released} device resources");
        }

        backend.begin_frame(self.config.clear_color);

        let mut ctx = OverlayCtx {
            window: input.window,
            time: input.time,
            viewport: input.viewport,
            stats: DrawStats::default(),
        };
        for slot in &mut self.overlays {
            if !slot.initialized {
                slot.overlay.init(input.window);
                slot.initialized = true;
            }
            slot.overlay.begin_frame(&ctx);
        }

        let result = match input.camera {
            Some(camera) => Ok(self
                .scene
                .draw_models(backend, &self.config, input.viewport, camera)),
            None => {
                let err = RenderError::UninitializedCollaborator("camera");
                log::error!("{err}");
                Err(err)
            }
        };

        ctx.stats = result.as_ref().copied().unwrap_or_default();
        self.last_stats = ctx.stats;
        for slot in &mut self.overlays {
            slot.overlay.render(&ctx, backend);
        }

        result
    }

    /// Shuts every initialized overlay down. Also runs on drop.
    pub fn shutdown(&mut self) {
        for mut slot in self.overlays.drain(..) {
            if slot.initialized {
                slot.overlay.shutdown();
            }
        }
    }
}

impl Default for RenderSession {
    fn default() -> Self {
        Self::new(RenderConfig::default())
    }
}

impl Drop for RenderSession {
    fn drop(&mut self) {
        self.shutdown();
    }
}
