//! wgpu device and window surface.
//!
//! [`Gpu`] owns the device, queue, configured surface and depth target for
//! one window, and hands out a [`GpuFrame`] per redraw.

mod gpu;
mod surface;

pub use gpu::{Gpu, GpuFrame, GpuInit, SurfaceErrorAction};
