//! Frame timing for the render loop: clamped delta time, frame index and FPS.
//!
//! The runtime owns one `FrameClock` and ticks it once per redraw.

mod frame_clock;

pub use frame_clock::{FrameClock, FrameTime};
