//! Headless backend that logs every device command.
//!
//! Compiles and links shaders with the same WGSL front-end as the wgpu backend,
//! so uniform resolution and diagnostics behave identically. Used by the test
//! suite and by tools that want to inspect what a frame would submit.

use std::collections::HashMap;

use crate::render::uniform::{UniformBlock, UniformValue, UniformWriteError};

use super::{
    link, BufferKind, DeviceBuffer, DeviceProgram, GraphicsBackend, IdAllocator, PrimitiveKind,
    ProgramBuild, ReleaseQueue, Released, ResourceId, StageSource, VertexBindings,
};

/// One recorded device command.
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    BeginFrame { clear: [f64; 4] },
    CreateBuffer { id: ResourceId, kind: BufferKind },
    UploadBuffer { id: ResourceId, len: usize },
    CreateProgram { id: ResourceId, usable: bool },
    UseProgram(ResourceId),
    WriteUniform {
        program: ResourceId,
        name: String,
        value: UniformValue,
    },
    BindBuffers {
        positions: ResourceId,
        colors: Option<ResourceId>,
        indices: Option<ResourceId>,
    },
    Draw(DrawCall),
    ReleaseBuffer(ResourceId),
    ReleaseProgram(ResourceId),
}

/// A draw together with the state it was issued under.
#[derive(Debug, Clone, PartialEq)]
pub struct DrawCall {
    pub program: Option<ResourceId>,
    pub positions: Option<ResourceId>,
    pub colors: Option<ResourceId>,
    pub indices: Option<ResourceId>,
    pub primitive: PrimitiveKind,
    pub vertex_count: u32,
    /// Uniform values of the program at draw time, by name.
    pub uniforms: Vec<(String, UniformValue)>,
}

impl DrawCall {
    pub fn uniform(&self, name: &str) -> Option<UniformValue> {
        self.uniforms
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, v)| *v)
    }
}

#[derive(Debug)]
struct ProgramState {
    usable: bool,
    block: UniformBlock,
    values: HashMap<String, UniformValue>,
}

#[derive(Debug, Default)]
pub struct RecordingBackend {
    ids: IdAllocator,
    releases: ReleaseQueue,
    commands: Vec<Command>,

    buffers: HashMap<ResourceId, (BufferKind, Vec<u8>)>,
    programs: HashMap<ResourceId, ProgramState>,

    active_program: Option<ResourceId>,
    bound: Option<(ResourceId, Option<ResourceId>, Option<ResourceId>)>,
    stale_releases: usize,
}

impl RecordingBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn commands(&self) -> &[Command] {
        &self.commands
    }

    /// Forgets the command log; device state is kept.
    pub fn clear_commands(&mut self) {
        self.commands.clear();
    }

    pub fn draws(&self) -> Vec<&DrawCall> {
        self.commands
            .iter()
            .filter_map(|c| match c {
                Command::Draw(d) => Some(d),
                _ => None,
            })
            .collect()
    }

    /// Ids released so far, in release order.
    pub fn released(&self) -> Vec<ResourceId> {
        self.commands
            .iter()
            .filter_map(|c| match c {
                Command::ReleaseBuffer(id) | Command::ReleaseProgram(id) => Some(*id),
                _ => None,
            })
            .collect()
    }

    pub fn uniform_writes(&self, name: &str) -> Vec<UniformValue> {
        self.commands
            .iter()
            .filter_map(|c| match c {
                Command::WriteUniform { name: n, value, .. } if n == name => Some(*value),
                _ => None,
            })
            .collect()
    }

    pub fn live_buffers(&self) -> usize {
        self.buffers.len()
    }

    pub fn live_programs(&self) -> usize {
        self.programs.len()
    }

    /// Handles dropped but not yet collected.
    pub fn pending_releases(&self) -> usize {
        self.releases.len()
    }

    /// Releases of ids this backend did not know about. Always zero unless a
    /// resource was released twice.
    pub fn stale_releases(&self) -> usize {
        self.stale_releases
    }

    pub fn buffer_contents(&self, id: ResourceId) -> Option<&[u8]> {
        self.buffers.get(&id).map(|(_, bytes)| bytes.as_slice())
    }
}

impl GraphicsBackend for RecordingBackend {
    fn begin_frame(&mut self, clear: [f64; 4]) {
        self.commands.push(Command::BeginFrame { clear });
    }

    fn create_buffer(&mut self, kind: BufferKind, _label: &str) -> DeviceBuffer {
        let id = self.ids.next();
        self.buffers.insert(id, (kind, Vec::new()));
        self.commands.push(Command::CreateBuffer { id, kind });
        DeviceBuffer::new(id, kind, &self.releases)
    }

    fn upload_buffer(&mut self, buffer: &DeviceBuffer, bytes: &[u8]) {
        if let Some((_, data)) = self.buffers.get_mut(&buffer.id()) {
            data.clear();
            data.extend_from_slice(bytes);
        }
        self.commands.push(Command::UploadBuffer {
            id: buffer.id(),
            len: bytes.len(),
        });
    }

    fn create_program(&mut self, _label: &str, stages: &[StageSource]) -> ProgramBuild {
        let linked = link::link(stages);
        let id = self.ids.next();
        let usable = linked.is_usable();
        let reads_colors = linked.vertex_inputs.contains(&link::COLOR_LOCATION);

        self.programs.insert(
            id,
            ProgramState {
                usable,
                block: linked.uniforms,
                values: HashMap::new(),
            },
        );
        self.commands.push(Command::CreateProgram { id, usable });

        ProgramBuild {
            program: DeviceProgram::new(id, usable, &self.releases).with_color_input(reads_colors),
            errors: linked.errors,
        }
    }

    fn use_program(&mut self, program: &DeviceProgram) {
        self.active_program = Some(program.id());
        self.commands.push(Command::UseProgram(program.id()));
    }

    fn write_uniform(
        &mut self,
        program: &DeviceProgram,
        name: &str,
        value: &UniformValue,
    ) -> Result<(), UniformWriteError> {
        let state = self
            .programs
            .get_mut(&program.id())
            .filter(|s| s.usable)
            .ok_or(UniformWriteError::UnusableProgram)?;

        state.block.encode_write(name, value)?;
        state.values.insert(name.to_string(), *value);

        self.commands.push(Command::WriteUniform {
            program: program.id(),
            name: name.to_string(),
            value: *value,
        });
        Ok(())
    }

    fn bind_vertex_buffers(&mut self, bindings: VertexBindings<'_>) {
        let bound = (
            bindings.positions.id(),
            bindings.colors.map(DeviceBuffer::id),
            bindings.indices.map(DeviceBuffer::id),
        );
        self.bound = Some(bound);
        self.commands.push(Command::BindBuffers {
            positions: bound.0,
            colors: bound.1,
            indices: bound.2,
        });
    }

    fn draw_arrays(&mut self, primitive: PrimitiveKind, vertex_count: u32) {
        let mut uniforms: Vec<(String, UniformValue)> = self
            .active_program
            .and_then(|id| self.programs.get(&id))
            .map(|p| p.values.iter().map(|(n, v)| (n.clone(), *v)).collect())
            .unwrap_or_default();
        uniforms.sort_by(|a, b| a.0.cmp(&b.0));

        let (positions, colors, indices) = match self.bound {
            Some((p, c, i)) => (Some(p), c, i),
            None => (None, None, None),
        };

        self.commands.push(Command::Draw(DrawCall {
            program: self.active_program,
            positions,
            colors,
            indices,
            primitive,
            vertex_count,
            uniforms,
        }));
    }

    fn collect_released(&mut self) -> usize {
        let released = self.releases.drain();
        for r in &released {
            let known = match *r {
                Released::Buffer(id) => {
                    self.commands.push(Command::ReleaseBuffer(id));
                    self.buffers.remove(&id).is_some()
                }
                Released::Program(id) => {
                    self.commands.push(Command::ReleaseProgram(id));
                    if self.active_program == Some(id) {
                        self.active_program = None;
                    }
                    self.programs.remove(&id).is_some()
                }
            };
            if !known {
                log::error!("release of unknown resource {r:?}");
                self.stale_releases += 1;
            }
        }
        released.len()
    }
}
