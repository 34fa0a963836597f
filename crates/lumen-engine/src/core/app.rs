use winit::dpi::PhysicalSize;
use winit::event::WindowEvent;

use super::ctx::{FrameCtx, SetupCtx};

/// Control directive returned by app callbacks.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum AppControl {
    Continue,
    Exit,
}

/// Application contract implemented by higher layers.
///
/// All application state lives in the implementor and is handed to every
/// callback through `&mut self`.
pub trait App {
    /// Called once the window and device exist, before the first frame.
    ///
    /// An error aborts the runtime before anything is drawn.
    fn on_setup(&mut self, ctx: &mut SetupCtx<'_>) -> anyhow::Result<()> {
        let _ = ctx;
        Ok(())
    }

    /// Called for window events, after the input state has seen them.
    fn on_window_event(&mut self, event: &WindowEvent) -> AppControl {
        let _ = event;
        AppControl::Continue
    }

    /// Called after the surface has been resized. Zero sizes mean minimized.
    fn on_resize(&mut self, size: PhysicalSize<u32>) {
        let _ = size;
    }

    /// Called once per rendered frame.
    fn on_frame(&mut self, ctx: &mut FrameCtx<'_, '_>) -> AppControl;
}
