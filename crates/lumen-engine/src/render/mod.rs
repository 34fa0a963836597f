//! Rendering core.
//!
//! - [`ShaderProgram`]: compiled program plus a cache of named uniform values
//! - [`DrawableModel`]: geometry, its device buffers, a transform and a shader
//! - [`SceneGraph`]: ordered models, drawn once per frame
//! - [`RenderSession`]: per-frame driver (release, clear, scene, overlays)
//!
//! All device access goes through [`backend::GraphicsBackend`]. Everything runs
//! on the render thread; handles are `!Send`.

pub mod backend;
mod config;
mod error;
mod model;
mod scene;
mod session;
mod shader;
mod uniform;
mod viewport;

#[cfg(test)]
mod testing;

pub use config::RenderConfig;
pub use error::RenderError;
pub use model::{model_matrix, DrawableModel, FrameTransforms, Rotation};
pub use scene::{DrawStats, ModelId, SceneGraph, AXIS_LENGTH};
pub use session::{FrameInput, Overlay, OverlayCtx, RenderSession};
pub use shader::{ShaderLibrary, ShaderProgram, ShaderSources, ShaderStage};
pub use uniform::{
    UniformBlock, UniformKind, UniformMember, UniformValue, UniformWriteError, UNIFORM_BINDING,
    UNIFORM_GROUP,
};
pub use viewport::Viewport;
