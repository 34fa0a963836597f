//! wgpu implementation of the device seam.
//!
//! Draw calls are recorded between [`GraphicsBackend::begin_frame`] and
//! [`WgpuBackend::encode`], then replayed into a single render pass. Each draw
//! snapshots its program's uniform block into a per-frame arena bound with a
//! dynamic offset, so uniform values written between draws never leak into
//! earlier ones.

use std::collections::HashMap;
use std::num::NonZeroU64;

use wgpu::util::DeviceExt;

use crate::render::uniform::{UniformBlock, UniformValue, UniformWriteError, UNIFORM_BINDING};

use super::link::{self, COLOR_LOCATION, POSITION_LOCATION};
use super::{
    BufferKind, DeviceBuffer, DeviceProgram, GraphicsBackend, IdAllocator, PrimitiveKind,
    ProgramBuild, ReleaseQueue, Released, ResourceId, StageSource, VertexBindings,
};
use crate::render::shader::ShaderStage;

/// Depth attachment format expected by [`WgpuBackend::encode`].
pub const DEPTH_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Depth32Float;

/// Bytes per vertex in position and color buffers.
const VERTEX_STRIDE: u64 = 3 * std::mem::size_of::<f32>() as u64;

struct GpuBuffer {
    kind: BufferKind,
    label: String,
    buffer: Option<wgpu::Buffer>,
}

struct GpuStage {
    module: wgpu::ShaderModule,
    entry_point: String,
}

struct GpuProgram {
    label: String,
    usable: bool,
    vertex: Option<GpuStage>,
    fragment: Option<GpuStage>,
    compute: Option<wgpu::ComputePipeline>,
    reads_colors: bool,
    block: UniformBlock,
    staging: Vec<u8>,
    pipelines: HashMap<(PrimitiveKind, bool), wgpu::RenderPipeline>,
}

#[derive(Copy, Clone)]
struct Bound {
    positions: ResourceId,
    colors: Option<ResourceId>,
}

struct RecordedDraw {
    pipeline: wgpu::RenderPipeline,
    positions: wgpu::Buffer,
    colors: Option<wgpu::Buffer>,
    uniform_offset: u32,
    vertex_count: u32,
}

/// Per-frame uniform snapshots, one aligned slot per draw.
struct UniformArena {
    cpu: Vec<u8>,
    last_offset: u64,
    binding_size: u64,
    buffer: Option<wgpu::Buffer>,
    bind_group: Option<wgpu::BindGroup>,
    bound_size: u64,
}

impl UniformArena {
    fn new() -> Self {
        Self {
            cpu: Vec::new(),
            last_offset: 0,
            binding_size: 16,
            buffer: None,
            bind_group: None,
            bound_size: 0,
        }
    }

    fn reset(&mut self) {
        self.cpu.clear();
        self.last_offset = 0;
        self.binding_size = 16;
    }

    fn push(&mut self, bytes: &[u8], alignment: u64) -> u32 {
        let offset = self.cpu.len().next_multiple_of(alignment as usize);
        self.cpu.resize(offset, 0);
        self.cpu.extend_from_slice(bytes);
        self.last_offset = offset as u64;
        self.binding_size = self
            .binding_size
            .max((bytes.len() as u64).next_multiple_of(16));
        offset as u32
    }

    /// Uploads the frame's snapshots, growing the buffer when needed.
    fn upload(&mut self, device: &wgpu::Device, queue: &wgpu::Queue, layout: &wgpu::BindGroupLayout) {
        let required = self.last_offset + self.binding_size;
        self.cpu.resize(self.cpu.len().max(required as usize), 0);

        let capacity = self.buffer.as_ref().map_or(0, wgpu::Buffer::size);
        if capacity < required || self.bound_size != self.binding_size {
            let size = required.next_power_of_two().max(capacity);
            let buffer = device.create_buffer(&wgpu::BufferDescriptor {
                label: Some("lumen uniform arena"),
                size,
                usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
                mapped_at_creation: false,
            });
            let bind_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
                label: Some("lumen uniform arena bind group"),
                layout,
                entries: &[wgpu::BindGroupEntry {
                    binding: UNIFORM_BINDING,
                    resource: wgpu::BindingResource::Buffer(wgpu::BufferBinding {
                        buffer: &buffer,
                        offset: 0,
                        size: NonZeroU64::new(self.binding_size),
                    }),
                }],
            });
            log::trace!("uniform arena resized to {size} bytes");
            self.buffer = Some(buffer);
            self.bind_group = Some(bind_group);
            self.bound_size = self.binding_size;
        }

        if let Some(buffer) = &self.buffer {
            queue.write_buffer(buffer, 0, &self.cpu);
        }
    }
}

/// Rendering backend on a wgpu device.
pub struct WgpuBackend {
    device: wgpu::Device,
    queue: wgpu::Queue,
    color_format: wgpu::TextureFormat,
    depth_format: Option<wgpu::TextureFormat>,
    uniform_alignment: u64,

    ids: IdAllocator,
    releases: ReleaseQueue,
    buffers: HashMap<ResourceId, GpuBuffer>,
    programs: HashMap<ResourceId, GpuProgram>,

    uniform_layout: wgpu::BindGroupLayout,
    pipeline_layout: wgpu::PipelineLayout,
    arena: UniformArena,

    clear: wgpu::Color,
    draws: Vec<RecordedDraw>,
    active: Option<ResourceId>,
    bound: Option<Bound>,
}

impl WgpuBackend {
    /// `depth_test` selects whether pipelines test against [`DEPTH_FORMAT`].
    pub fn new(
        device: &wgpu::Device,
        queue: &wgpu::Queue,
        color_format: wgpu::TextureFormat,
        depth_test: bool,
    ) -> Self {
        let uniform_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("lumen uniform block layout"),
            entries: &[wgpu::BindGroupLayoutEntry {
                binding: UNIFORM_BINDING,
                visibility: wgpu::ShaderStages::VERTEX
                    | wgpu::ShaderStages::FRAGMENT
                    | wgpu::ShaderStages::COMPUTE,
                ty: wgpu::BindingType::Buffer {
                    ty: wgpu::BufferBindingType::Uniform,
                    has_dynamic_offset: true,
                    min_binding_size: None,
                },
                count: None,
            }],
        });

        let pipeline_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("lumen pipeline layout"),
            bind_group_layouts: &[&uniform_layout],
            immediate_size: 0,
        });

        let uniform_alignment = u64::from(device.limits().min_uniform_buffer_offset_alignment);

        Self {
            device: device.clone(),
            queue: queue.clone(),
            color_format,
            depth_format: depth_test.then_some(DEPTH_FORMAT),
            uniform_alignment,
            ids: IdAllocator::default(),
            releases: ReleaseQueue::new(),
            buffers: HashMap::new(),
            programs: HashMap::new(),
            uniform_layout,
            pipeline_layout,
            arena: UniformArena::new(),
            clear: wgpu::Color::BLACK,
            draws: Vec::new(),
            active: None,
            bound: None,
        }
    }

    pub fn color_format(&self) -> wgpu::TextureFormat {
        self.color_format
    }

    pub fn depth_format(&self) -> Option<wgpu::TextureFormat> {
        self.depth_format
    }

    /// Switches depth testing. Cached pipelines are rebuilt on next use.
    pub fn set_depth_test(&mut self, enabled: bool) {
        let format = enabled.then_some(DEPTH_FORMAT);
        if format != self.depth_format {
            self.depth_format = format;
            for program in self.programs.values_mut() {
                program.pipelines.clear();
            }
        }
    }

    /// Draws recorded since the last `begin_frame`.
    pub fn pending_draws(&self) -> usize {
        self.draws.len()
    }

    /// The compute pipeline linked into `program`, if it has a compute stage.
    pub fn compute_pipeline(&self, program: &DeviceProgram) -> Option<&wgpu::ComputePipeline> {
        self.programs.get(&program.id())?.compute.as_ref()
    }

    /// Replays the recorded frame into one render pass over `color`, cleared to
    /// the frame's clear color. `depth` must be a [`DEPTH_FORMAT`] view when
    /// depth testing is on.
    pub fn encode(
        &mut self,
        encoder: &mut wgpu::CommandEncoder,
        color: &wgpu::TextureView,
        depth: Option<&wgpu::TextureView>,
    ) {
        let draws = std::mem::take(&mut self.draws);
        if !draws.is_empty() {
            self.arena.upload(&self.device, &self.queue, &self.uniform_layout);
        }

        let depth = match (self.depth_format, depth) {
            (Some(_), Some(view)) => Some(view),
            (Some(_), None) => {
                if !draws.is_empty() {
                    log::error!("depth testing is on but no depth target was given; frame dropped");
                }
                self.arena.reset();
                return;
            }
            (None, _) => None,
        };

        let mut rpass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
            label: Some("lumen scene pass"),
            color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                view: color,
                resolve_target: None,
                ops: wgpu::Operations {
                    load: wgpu::LoadOp::Clear(self.clear),
                    store: wgpu::StoreOp::Store,
                },
                depth_slice: None,
            })],
            depth_stencil_attachment: depth.map(|view| wgpu::RenderPassDepthStencilAttachment {
                view,
                depth_ops: Some(wgpu::Operations {
                    load: wgpu::LoadOp::Clear(1.0),
                    store: wgpu::StoreOp::Store,
                }),
                stencil_ops: None,
            }),
            timestamp_writes: None,
            occlusion_query_set: None,
            multiview_mask: None,
        });

        if let Some(bind_group) = &self.arena.bind_group {
            for draw in &draws {
                rpass.set_pipeline(&draw.pipeline);
                rpass.set_bind_group(0, bind_group, &[draw.uniform_offset]);
                rpass.set_vertex_buffer(0, draw.positions.slice(..));
                if let Some(colors) = &draw.colors {
                    rpass.set_vertex_buffer(1, colors.slice(..));
                }
                rpass.draw(0..draw.vertex_count, 0..1);
            }
        }

        drop(rpass);
        self.arena.reset();
    }

    fn build_program(&self, label: &str, stages: &[StageSource]) -> (GpuProgram, link::LinkedStages) {
        let mut linked = link::link(stages);
        let mut program = GpuProgram {
            label: label.to_string(),
            usable: false,
            vertex: None,
            fragment: None,
            compute: None,
            reads_colors: linked.vertex_inputs.contains(&COLOR_LOCATION),
            staging: vec![0; linked.uniforms.size() as usize],
            block: std::mem::take(&mut linked.uniforms),
            pipelines: HashMap::new(),
        };
        if !linked.is_usable() {
            return (program, linked);
        }

        let module = |stage: &link::CompiledStage| GpuStage {
            module: self.device.create_shader_module(wgpu::ShaderModuleDescriptor {
                label: Some(label),
                source: wgpu::ShaderSource::Wgsl(stage.source.as_str().into()),
            }),
            entry_point: stage.entry_point.clone(),
        };

        program.vertex = linked.stage(ShaderStage::Vertex).map(module);
        program.fragment = linked.stage(ShaderStage::Fragment).map(module);
        program.compute = linked.stage(ShaderStage::Compute).map(|stage| {
            let compute = module(stage);
            self.device
                .create_compute_pipeline(&wgpu::ComputePipelineDescriptor {
                    label: Some(label),
                    layout: Some(&self.pipeline_layout),
                    module: &compute.module,
                    entry_point: Some(compute.entry_point.as_str()),
                    compilation_options: Default::default(),
                    cache: None,
                })
        });
        program.usable = true;
        (program, linked)
    }

    fn validate_buffer(&self, id: ResourceId, vertex_count: u32, what: &str) -> Option<wgpu::Buffer> {
        let Some(buffer) = self.buffers.get(&id).and_then(|b| b.buffer.clone()) else {
            log::error!("draw skipped: {what} buffer {id} has no storage");
            return None;
        };
        if buffer.size() < u64::from(vertex_count) * VERTEX_STRIDE {
            log::error!("draw skipped: {what} buffer {id} is shorter than {vertex_count} vertices");
            return None;
        }
        Some(buffer)
    }
}

fn topology(primitive: PrimitiveKind) -> wgpu::PrimitiveTopology {
    match primitive {
        PrimitiveKind::TriangleList => wgpu::PrimitiveTopology::TriangleList,
        PrimitiveKind::TriangleStrip => wgpu::PrimitiveTopology::TriangleStrip,
        PrimitiveKind::LineList => wgpu::PrimitiveTopology::LineList,
        PrimitiveKind::LineStrip => wgpu::PrimitiveTopology::LineStrip,
        PrimitiveKind::PointList => wgpu::PrimitiveTopology::PointList,
    }
}

const POSITION_ATTRS: [wgpu::VertexAttribute; 1] = [wgpu::VertexAttribute {
    format: wgpu::VertexFormat::Float32x3,
    offset: 0,
    shader_location: POSITION_LOCATION,
}];

const COLOR_ATTRS: [wgpu::VertexAttribute; 1] = [wgpu::VertexAttribute {
    format: wgpu::VertexFormat::Float32x3,
    offset: 0,
    shader_location: COLOR_LOCATION,
}];

fn vertex_layouts(with_colors: bool) -> Vec<wgpu::VertexBufferLayout<'static>> {
    let layout = |attributes: &'static [wgpu::VertexAttribute]| wgpu::VertexBufferLayout {
        array_stride: VERTEX_STRIDE,
        step_mode: wgpu::VertexStepMode::Vertex,
        attributes,
    };
    let mut layouts = vec![layout(&POSITION_ATTRS)];
    if with_colors {
        layouts.push(layout(&COLOR_ATTRS));
    }
    layouts
}

struct PipelineTargets<'a> {
    device: &'a wgpu::Device,
    layout: &'a wgpu::PipelineLayout,
    color_format: wgpu::TextureFormat,
    depth_format: Option<wgpu::TextureFormat>,
}

impl PipelineTargets<'_> {
    fn render_pipeline(
        &self,
        program: &GpuProgram,
        primitive: PrimitiveKind,
        with_colors: bool,
    ) -> Option<wgpu::RenderPipeline> {
        let vertex = program.vertex.as_ref()?;
        let fragment = program.fragment.as_ref()?;
        let buffers = vertex_layouts(with_colors);

        log::debug!(
            "building pipeline for `{}` ({primitive:?}, colors: {with_colors})",
            program.label
        );

        Some(self.device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
            label: Some(program.label.as_str()),
            layout: Some(self.layout),

            vertex: wgpu::VertexState {
                module: &vertex.module,
                entry_point: Some(vertex.entry_point.as_str()),
                compilation_options: Default::default(),
                buffers: &buffers,
            },

            fragment: Some(wgpu::FragmentState {
                module: &fragment.module,
                entry_point: Some(fragment.entry_point.as_str()),
                compilation_options: Default::default(),
                targets: &[Some(wgpu::ColorTargetState {
                    format: self.color_format,
                    blend: Some(wgpu::BlendState::REPLACE),
                    write_mask: wgpu::ColorWrites::ALL,
                })],
            }),

            primitive: wgpu::PrimitiveState {
                topology: topology(primitive),
                strip_index_format: None,
                front_face: wgpu::FrontFace::Ccw,
                cull_mode: None,
                polygon_mode: wgpu::PolygonMode::Fill,
                unclipped_depth: false,
                conservative: false,
            },

            depth_stencil: self.depth_format.map(|format| wgpu::DepthStencilState {
                format,
                depth_write_enabled: true,
                depth_compare: wgpu::CompareFunction::Less,
                stencil: wgpu::StencilState::default(),
                bias: wgpu::DepthBiasState::default(),
            }),
            multisample: wgpu::MultisampleState::default(),

            multiview_mask: None,
            cache: None,
        }))
    }
}

impl GraphicsBackend for WgpuBackend {
    fn begin_frame(&mut self, clear: [f64; 4]) {
        let [r, g, b, a] = clear;
        self.clear = wgpu::Color { r, g, b, a };
        if !self.draws.is_empty() {
            log::debug!("discarding {} draws from an unsubmitted frame", self.draws.len());
        }
        self.draws.clear();
        self.arena.reset();
    }

    fn create_buffer(&mut self, kind: BufferKind, label: &str) -> DeviceBuffer {
        let id = self.ids.next();
        log::trace!("create {kind:?} buffer {id} for `{label}`");
        self.buffers.insert(
            id,
            GpuBuffer {
                kind,
                label: label.to_string(),
                buffer: None,
            },
        );
        DeviceBuffer::new(id, kind, &self.releases)
    }

    fn upload_buffer(&mut self, buffer: &DeviceBuffer, bytes: &[u8]) {
        let Some(entry) = self.buffers.get_mut(&buffer.id()) else {
            log::error!("upload to unknown buffer {}", buffer.id());
            return;
        };

        let size = (bytes.len() as u64).next_multiple_of(wgpu::COPY_BUFFER_ALIGNMENT);
        match &entry.buffer {
            Some(existing) if existing.size() == size && size == bytes.len() as u64 => {
                self.queue.write_buffer(existing, 0, bytes);
            }
            _ => {
                let usage = match entry.kind {
                    BufferKind::Positions | BufferKind::Colors => wgpu::BufferUsages::VERTEX,
                    BufferKind::Indices => wgpu::BufferUsages::INDEX,
                };
                entry.buffer = Some(self.device.create_buffer_init(
                    &wgpu::util::BufferInitDescriptor {
                        label: Some(entry.label.as_str()),
                        contents: bytes,
                        usage: usage | wgpu::BufferUsages::COPY_DST,
                    },
                ));
            }
        }
    }

    fn create_program(&mut self, label: &str, stages: &[StageSource]) -> ProgramBuild {
        let (program, linked) = self.build_program(label, stages);
        let id = self.ids.next();
        let usable = program.usable;
        let reads_colors = program.reads_colors;
        log::trace!("create program {id} `{label}` (usable: {usable})");
        self.programs.insert(id, program);

        ProgramBuild {
            program: DeviceProgram::new(id, usable, &self.releases).with_color_input(reads_colors),
            errors: linked.errors,
        }
    }

    fn use_program(&mut self, program: &DeviceProgram) {
        self.active = Some(program.id());
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
            .filter(|p| p.usable)
            .ok_or(UniformWriteError::UnusableProgram)?;

        let (offset, bytes) = state.block.encode_write(name, value)?;
        let start = offset as usize;
        state.staging[start..start + bytes.len()].copy_from_slice(&bytes);
        Ok(())
    }

    fn bind_vertex_buffers(&mut self, bindings: VertexBindings<'_>) {
        // Index buffers are uploaded but never consulted by draws.
        self.bound = Some(Bound {
            positions: bindings.positions.id(),
            colors: bindings.colors.map(DeviceBuffer::id),
        });
    }

    fn draw_arrays(&mut self, primitive: PrimitiveKind, vertex_count: u32) {
        if vertex_count == 0 {
            return;
        }
        let (Some(pid), Some(bound)) = (self.active, self.bound) else {
            log::error!("draw skipped: no active program or no bound vertex buffers");
            return;
        };
        let Some(reads_colors) = self.programs.get(&pid).map(|p| p.reads_colors) else {
            log::error!("draw skipped: program {pid} was released");
            return;
        };

        let Some(positions) = self.validate_buffer(bound.positions, vertex_count, "position") else {
            return;
        };
        let colors = match (reads_colors, bound.colors) {
            (true, Some(id)) => match self.validate_buffer(id, vertex_count, "color") {
                Some(buffer) => Some(buffer),
                None => return,
            },
            (true, None) => {
                log::error!("draw skipped: program {pid} reads vertex colors but none are bound");
                return;
            }
            (false, _) => None,
        };

        let targets = PipelineTargets {
            device: &self.device,
            layout: &self.pipeline_layout,
            color_format: self.color_format,
            depth_format: self.depth_format,
        };
        let Some(program) = self.programs.get_mut(&pid).filter(|p| p.usable) else {
            return;
        };

        let key = (primitive, colors.is_some());
        let pipeline = match program.pipelines.get(&key) {
            Some(p) => p.clone(),
            None => match targets.render_pipeline(program, primitive, key.1) {
                Some(p) => {
                    program.pipelines.insert(key, p.clone());
                    p
                }
                None => {
                    log::error!("draw skipped: program `{}` has no vertex/fragment stages", program.label);
                    return;
                }
            },
        };

        let uniform_offset = self.arena.push(&program.staging, self.uniform_alignment);
        self.draws.push(RecordedDraw {
            pipeline,
            positions,
            colors,
            uniform_offset,
            vertex_count,
        });
    }

    fn collect_released(&mut self) -> usize {
        let released = self.releases.drain();
        for r in &released {
            let known = match *r {
                Released::Buffer(id) => self.buffers.remove(&id).is_some(),
                Released::Program(id) => {
                    if self.active == Some(id) {
                        self.active = None;
                    }
                    self.programs.remove(&id).is_some()
                }
            };
            if known {
                log::trace!("released {r:?}");
            } else {
                log::error!("release of unknown resource {r:?}");
            }
        }
        released.len()
    }
}
