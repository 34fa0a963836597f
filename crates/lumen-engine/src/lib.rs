//! Lumen engine crate.
//!
//! A small real-time 3D renderer: shader programs, drawable models and a flat
//! scene graph on top of a wgpu device, driven by a winit window runtime.

pub mod device;
pub mod window;
pub mod input;
pub mod time;
pub mod core;

pub mod logging;
pub mod camera;
pub mod mesh;
pub mod render;
