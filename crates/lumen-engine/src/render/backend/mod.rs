//! Device seam of the rendering core.
//!
//! The core talks to the GPU only through [`GraphicsBackend`]. Two backends ship
//! with the engine:
//! - [`wgpu::WgpuBackend`] records draws into a wgpu render pass
//! - [`recording::RecordingBackend`] keeps a log of every device command (headless)
//!
//! Device resources are owned by move-only handles ([`DeviceBuffer`],
//! [`DeviceProgram`]). Dropping a handle queues its id for release; the backend
//! destroys the storage in [`GraphicsBackend::collect_released`], which the
//! render session calls once at the start of every frame.

use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

use super::error::RenderError;
use super::shader::ShaderStage;
use super::uniform::{UniformValue, UniformWriteError};

pub mod link;
pub mod recording;
pub mod wgpu;

/// Opaque id of a device resource.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash, Ord, PartialOrd)]
pub struct ResourceId(pub u64);

impl fmt::Display for ResourceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// A released resource waiting for the backend to destroy it.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum Released {
    Buffer(ResourceId),
    Program(ResourceId),
}

/// Queue of resources whose owners have been dropped.
///
/// Shared between a backend and every handle it hands out. Single-threaded.
#[derive(Debug, Clone, Default)]
pub struct ReleaseQueue(Rc<RefCell<Vec<Released>>>);

impl ReleaseQueue {
    pub fn new() -> Self {
        Self::default()
    }

    fn push(&self, released: Released) {
        self.0.borrow_mut().push(released);
    }

    /// Takes every queued release, in drop order.
    pub fn drain(&self) -> Vec<Released> {
        std::mem::take(&mut *self.0.borrow_mut())
    }

    pub fn len(&self) -> usize {
        self.0.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.borrow().is_empty()
    }
}

/// Simple monotonic id source for backends.
#[derive(Debug, Default)]
pub struct IdAllocator {
    next: u64,
}

impl IdAllocator {
    pub fn next(&mut self) -> ResourceId {
        self.next += 1;
        ResourceId(self.next)
    }
}

/// What a buffer holds.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub enum BufferKind {
    /// Per-vertex positions, 3 × f32.
    Positions,
    /// Per-vertex colors, 3 × f32.
    Colors,
    /// Vertex indices, u32.
    Indices,
}

/// Owning handle of a device buffer.
pub struct DeviceBuffer {
    id: ResourceId,
    kind: BufferKind,
    releases: ReleaseQueue,
}

impl DeviceBuffer {
    /// Hands out a new handle. Backends call this when they allocate storage.
    pub fn new(id: ResourceId, kind: BufferKind, releases: &ReleaseQueue) -> Self {
        Self {
            id,
            kind,
            releases: releases.clone(),
        }
    }

    pub fn id(&self) -> ResourceId {
        self.id
    }

    pub fn kind(&self) -> BufferKind {
        self.kind
    }
}

impl Drop for DeviceBuffer {
    fn drop(&mut self) {
        self.releases.push(Released::Buffer(self.id));
    }
}

impl fmt::Debug for DeviceBuffer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DeviceBuffer")
            .field("id", &self.id)
            .field("kind", &self.kind)
            .finish()
    }
}

/// Owning handle of a linked device program.
pub struct DeviceProgram {
    id: ResourceId,
    usable: bool,
    reads_colors: bool,
    releases: ReleaseQueue,
}

impl DeviceProgram {
    pub fn new(id: ResourceId, usable: bool, releases: &ReleaseQueue) -> Self {
        Self {
            id,
            usable,
            reads_colors: false,
            releases: releases.clone(),
        }
    }

    /// Marks the program as reading the color vertex attribute.
    pub fn with_color_input(mut self, reads_colors: bool) -> Self {
        self.reads_colors = reads_colors;
        self
    }

    pub fn id(&self) -> ResourceId {
        self.id
    }

    /// Whether draws with this program need a color buffer bound.
    pub fn reads_colors(&self) -> bool {
        self.reads_colors
    }

    /// False when a stage failed to compile or the program failed to link.
    pub fn is_usable(&self) -> bool {
        self.usable
    }
}

impl Drop for DeviceProgram {
    fn drop(&mut self) {
        self.releases.push(Released::Program(self.id));
    }
}

impl fmt::Debug for DeviceProgram {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DeviceProgram")
            .field("id", &self.id)
            .field("usable", &self.usable)
            .field("reads_colors", &self.reads_colors)
            .finish()
    }
}

/// Source text of one shader stage.
#[derive(Debug, Clone)]
pub struct StageSource {
    pub stage: ShaderStage,
    /// Where the text came from; used in diagnostics.
    pub path: std::path::PathBuf,
    pub text: String,
}

/// Result of compiling and linking a program.
///
/// A program object is always produced; `errors` lists every stage or link
/// failure, in which case the program is not usable.
#[derive(Debug)]
pub struct ProgramBuild {
    pub program: DeviceProgram,
    pub errors: Vec<RenderError>,
}

/// Topology used to interpret a model's vertex list.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash, Default)]
pub enum PrimitiveKind {
    #[default]
    TriangleList,
    TriangleStrip,
    LineList,
    LineStrip,
    PointList,
}

/// Buffers bound for the next draw.
#[derive(Debug, Copy, Clone)]
pub struct VertexBindings<'a> {
    pub positions: &'a DeviceBuffer,
    /// Bound only when the model has a non-empty color array.
    pub colors: Option<&'a DeviceBuffer>,
    pub indices: Option<&'a DeviceBuffer>,
}

/// Immediate-mode device interface used by the rendering core.
pub trait GraphicsBackend {
    /// Starts a frame cleared to `clear` (RGBA). Discards draws from the
    /// previous frame that were never submitted.
    fn begin_frame(&mut self, clear: [f64; 4]);

    /// Allocates an empty buffer.
    fn create_buffer(&mut self, kind: BufferKind, label: &str) -> DeviceBuffer;

    /// Replaces the whole content of `buffer` with `bytes`.
    fn upload_buffer(&mut self, buffer: &DeviceBuffer, bytes: &[u8]);

    /// Compiles the given stages and links them into one program.
    fn create_program(&mut self, label: &str, stages: &[StageSource]) -> ProgramBuild;

    /// Makes `program` active for subsequent uniform writes and draws.
    fn use_program(&mut self, program: &DeviceProgram);

    /// Resolves `name` in `program` and writes `value` there.
    fn write_uniform(
        &mut self,
        program: &DeviceProgram,
        name: &str,
        value: &UniformValue,
    ) -> Result<(), UniformWriteError>;

    fn bind_vertex_buffers(&mut self, bindings: VertexBindings<'_>);

    /// Issues a non-indexed draw of `vertex_count` vertices with the active
    /// program and bound buffers.
    fn draw_arrays(&mut self, primitive: PrimitiveKind, vertex_count: u32);

    /// Destroys the storage of every handle dropped since the last call.
    /// Returns how many resources were released.
    fn collect_released(&mut self) -> usize;
}
