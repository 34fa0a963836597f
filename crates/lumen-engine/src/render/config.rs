use glam::Mat4;

use crate::camera::CameraState;

use super::viewport::Viewport;

/// Frame-level rendering parameters.
#[derive(Debug, Copy, Clone, PartialEq)]
pub struct RenderConfig {
    /// Color the frame is cleared to, linear RGBA.
    pub clear_color: [f64; 4],
    /// Near clip plane distance.
    pub near: f32,
    /// Far clip plane distance.
    pub far: f32,
    pub depth_test: bool,
}

impl Default for RenderConfig {
    fn default() -> Self {
        Self {
            clear_color: [0.2, 0.3, 0.3, 1.0],
            near: 0.1,
            far: 100.0,
            depth_test: true,
        }
    }
}

impl RenderConfig {
    /// Perspective projection for `viewport`, with the camera zoom as the
    /// vertical field of view.
    pub fn projection(&self, viewport: Viewport, camera: &CameraState) -> Mat4 {
        Mat4::perspective_rh(camera.zoom.to_radians(), viewport.aspect(), self.near, self.far)
    }
}
