use lumen_engine::render::backend::GraphicsBackend;
use lumen_engine::render::{Overlay, OverlayCtx};

/// Shows frames per second in the window title.
pub struct TitleOverlay {
    base: String,
    shown_fps: Option<u32>,
}

impl TitleOverlay {
    pub fn new(base: impl Into<String>) -> Self {
        Self {
            base: base.into(),
            shown_fps: None,
        }
    }

    fn title(&self, fps: u32) -> String {
        format!("{} - {fps} FPS", self.base)
    }
}

impl Overlay for TitleOverlay {
    fn render(&mut self, ctx: &OverlayCtx<'_>, _backend: &mut dyn GraphicsBackend) {
        let fps = ctx.time.fps.round() as u32;
        if fps == 0 || self.shown_fps == Some(fps) {
            return;
        }
        if let Some(window) = ctx.window {
            window.set_title(&self.title(fps));
        }
        self.shown_fps = Some(fps);
    }

    fn shutdown(&mut self) {
        log::debug!("title overlay shut down at {:?} FPS", self.shown_fps);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn title_carries_rounded_fps() {
        assert_eq!(TitleOverlay::new("lumen").title(60), "lumen - 60 FPS");
    }
}
