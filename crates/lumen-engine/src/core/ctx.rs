use winit::window::{Window, WindowId};

use crate::camera::CameraState;
use crate::device::{Gpu, SurfaceErrorAction};
use crate::input::{InputFrame, InputState};
use crate::render::backend::wgpu::WgpuBackend;
use crate::render::{FrameInput, RenderSession, Viewport};
use crate::time::FrameTime;
use crate::window::RuntimeCtx;

use super::app::AppControl;

/// Handles available while the application sets itself up.
pub struct SetupCtx<'a> {
    pub window: &'a Window,
    pub backend: &'a mut WgpuBackend,
}

/// Per-window handles and immutable window metadata.
pub struct WindowCtx<'a> {
    pub id: WindowId,
    pub window: &'a Window,
}

impl WindowCtx<'_> {
    pub fn set_title(&self, title: &str) {
        self.window.set_title(title);
    }
}

/// Per-frame context passed to `core::App::on_frame`.
///
/// Lifetimes:
/// - `'a` is the duration of the callback invocation
/// - `'w` is the window-borrow lifetime carried by `Gpu<'w>`
pub struct FrameCtx<'a, 'w> {
    pub window: WindowCtx<'a>,
    pub gpu: &'a mut Gpu<'w>,
    pub backend: &'a mut WgpuBackend,
    pub input: &'a InputState,
    pub input_frame: &'a InputFrame,
    pub time: FrameTime,
    pub runtime: &'a mut RuntimeCtx,
}

impl FrameCtx<'_, '_> {
    /// Drawable area of the surface in physical pixels.
    pub fn viewport(&self) -> Viewport {
        let size = self.gpu.size();
        Viewport::new(size.width as f32, size.height as f32)
    }

    /// Renders one frame of `session` and presents it.
    ///
    /// Frames of a minimized window are skipped. Surface errors skip the frame
    /// unless they are fatal, in which case `AppControl::Exit` is returned.
    pub fn render(&mut self, session: &mut RenderSession, camera: Option<&CameraState>) -> AppControl {
        let viewport = self.viewport();
        if !viewport.is_valid() {
            return AppControl::Continue;
        }

        let mut frame = match self.gpu.begin_frame() {
            Ok(f) => f,
            Err(err) => {
                return match self.gpu.handle_surface_error(err) {
                    SurfaceErrorAction::Fatal => AppControl::Exit,
                    _ => AppControl::Continue,
                };
            }
        };

        self.backend.set_depth_test(session.config().depth_test);

        // Failures are already logged; the cleared frame is still presented.
        let _ = session.render_frame(
            &mut *self.backend,
            FrameInput {
                viewport,
                camera,
                window: Some(self.window.window),
                time: self.time,
            },
        );

        let depth = session.config().depth_test.then(|| self.gpu.depth_view());
        self.backend.encode(&mut frame.encoder, &frame.view, depth);

        self.window.window.pre_present_notify();
        self.gpu.submit(frame);

        AppControl::Continue
    }
}
