//! Camera subsystem.
//!
//! A first-person camera driven by Euler angles. The rendering core only reads
//! [`CameraState`] snapshots; input handling mutates the [`Camera`].

mod fly_camera;

pub use fly_camera::{Camera, CameraState, Movement};
