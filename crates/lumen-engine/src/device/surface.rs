use winit::dpi::PhysicalSize;

use super::SurfaceErrorAction;
use crate::render::backend::wgpu::DEPTH_FORMAT;

pub(crate) fn choose_surface_format(
    caps: &wgpu::SurfaceCapabilities,
    prefer_srgb: bool,
) -> Option<wgpu::TextureFormat> {
    let first = caps.formats.first().copied()?;
    if !prefer_srgb {
        return Some(first);
    }

    [
        wgpu::TextureFormat::Bgra8UnormSrgb,
        wgpu::TextureFormat::Rgba8UnormSrgb,
    ]
    .into_iter()
    .find(|f| caps.formats.contains(f))
    .or(Some(first))
}

pub(crate) fn choose_alpha_mode(
    caps: &wgpu::SurfaceCapabilities,
    requested: Option<wgpu::CompositeAlphaMode>,
) -> wgpu::CompositeAlphaMode {
    requested
        .filter(|m| caps.alpha_modes.contains(m))
        .or_else(|| caps.alpha_modes.first().copied())
        .unwrap_or(wgpu::CompositeAlphaMode::Auto)
}

/// Smallest size a surface or depth target can be configured with. Windows
/// may report 0x0 before their first layout.
pub(crate) fn configurable_size(size: PhysicalSize<u32>) -> PhysicalSize<u32> {
    PhysicalSize::new(size.width.max(1), size.height.max(1))
}

/// Depth attachment sized to the surface.
pub(crate) fn create_depth_view(device: &wgpu::Device, size: PhysicalSize<u32>) -> wgpu::TextureView {
    let size = configurable_size(size);
    let texture = device.create_texture(&wgpu::TextureDescriptor {
        label: Some("lumen depth target"),
        size: wgpu::Extent3d {
            width: size.width,
            height: size.height,
            depth_or_array_layers: 1,
        },
        mip_level_count: 1,
        sample_count: 1,
        dimension: wgpu::TextureDimension::D2,
        format: DEPTH_FORMAT,
        usage: wgpu::TextureUsages::RENDER_ATTACHMENT,
        view_formats: &[],
    });
    texture.create_view(&wgpu::TextureViewDescriptor::default())
}

pub(crate) fn map_surface_error(err: &wgpu::SurfaceError) -> SurfaceErrorAction {
    match err {
        wgpu::SurfaceError::Lost | wgpu::SurfaceError::Outdated => SurfaceErrorAction::Reconfigured,
        wgpu::SurfaceError::OutOfMemory => SurfaceErrorAction::Fatal,
        wgpu::SurfaceError::Timeout | wgpu::SurfaceError::Other => SurfaceErrorAction::SkipFrame,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn surface_errors_map_to_actions() {
        assert_eq!(map_surface_error(&wgpu::SurfaceError::Lost), SurfaceErrorAction::Reconfigured);
        assert_eq!(map_surface_error(&wgpu::SurfaceError::Outdated), SurfaceErrorAction::Reconfigured);
        assert_eq!(map_surface_error(&wgpu::SurfaceError::Timeout), SurfaceErrorAction::SkipFrame);
        assert_eq!(map_surface_error(&wgpu::SurfaceError::OutOfMemory), SurfaceErrorAction::Fatal);
    }

    #[test]
    fn zero_sized_window_is_configured_at_one_pixel() {
        assert_eq!(configurable_size(PhysicalSize::new(0, 0)), PhysicalSize::new(1, 1));
        assert_eq!(configurable_size(PhysicalSize::new(0, 480)), PhysicalSize::new(1, 480));
        assert_eq!(configurable_size(PhysicalSize::new(640, 480)), PhysicalSize::new(640, 480));
    }
}
