use std::cell::Cell;
use std::fmt;
use std::path::Path;
use std::rc::Rc;

use glam::{Mat4, Vec3};

use crate::camera::CameraState;
use crate::mesh::{self, MeshError};

use super::backend::{BufferKind, DeviceBuffer, GraphicsBackend, PrimitiveKind, VertexBindings};
use super::config::RenderConfig;
use super::error::RenderError;
use super::shader::ShaderProgram;
use super::viewport::Viewport;

/// Euler angles in degrees, applied X then Y then Z.
#[derive(Debug, Copy, Clone, Default, PartialEq)]
pub struct Rotation {
    pub x: f32,
    pub y: f32,
    pub z: f32,
}

impl Rotation {
    pub const fn new(x: f32, y: f32, z: f32) -> Self {
        Self { x, y, z }
    }
}

impl From<Vec3> for Rotation {
    fn from(v: Vec3) -> Self {
        Self::new(v.x, v.y, v.z)
    }
}

/// Camera-derived matrices shared by every model in a frame.
#[derive(Debug, Copy, Clone, PartialEq)]
pub struct FrameTransforms {
    pub projection: Mat4,
    pub view: Mat4,
}

impl FrameTransforms {
    pub fn new(config: &RenderConfig, viewport: Viewport, camera: &CameraState) -> Self {
        Self {
            projection: config.projection(viewport, camera),
            view: camera.view_matrix(),
        }
    }
}

/// One drawable unit: CPU geometry, its device mirror, a transform and a
/// shared shader.
///
/// Every geometry setter uploads the whole array immediately, so device
/// buffers always mirror the last values set. Buffers are created on the first
/// non-empty upload and dropped when the array is cleared.
pub struct DrawableModel {
    name: String,
    position: Vec3,
    rotation: Rotation,
    primitive: PrimitiveKind,

    positions: Vec<f32>,
    colors: Vec<f32>,
    indices: Vec<u32>,

    position_buffer: Option<DeviceBuffer>,
    color_buffer: Option<DeviceBuffer>,
    index_buffer: Option<DeviceBuffer>,

    shader: Option<Rc<ShaderProgram>>,
    index_notice: Cell<bool>,
}

impl Default for DrawableModel {
    fn default() -> Self {
        Self::new("model")
    }
}

impl DrawableModel {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            position: Vec3::ZERO,
            rotation: Rotation::default(),
            primitive: PrimitiveKind::TriangleList,
            positions: Vec::new(),
            colors: Vec::new(),
            indices: Vec::new(),
            position_buffer: None,
            color_buffer: None,
            index_buffer: None,
            shader: None,
            index_notice: Cell::new(false),
        }
    }

    pub fn with_shader(mut self, shader: Rc<ShaderProgram>) -> Self {
        self.shader = Some(shader);
        self
    }

    pub fn with_primitive(mut self, primitive: PrimitiveKind) -> Self {
        self.primitive = primitive;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn set_name(&mut self, name: impl Into<String>) {
        self.name = name.into();
    }

    pub fn primitive(&self) -> PrimitiveKind {
        self.primitive
    }

    pub fn set_primitive(&mut self, primitive: PrimitiveKind) {
        self.primitive = primitive;
    }

    pub fn shader(&self) -> Option<&Rc<ShaderProgram>> {
        self.shader.as_ref()
    }

    pub fn set_shader(&mut self, shader: Rc<ShaderProgram>) {
        self.shader = Some(shader);
    }

    pub fn position(&self) -> Vec3 {
        self.position
    }

    pub fn set_position(&mut self, position: Vec3) {
        self.position = position;
    }

    pub fn rotation(&self) -> Rotation {
        self.rotation
    }

    pub fn set_rotation(&mut self, rotation: impl Into<Rotation>) {
        self.rotation = rotation.into();
    }

    pub fn vertex_positions(&self) -> &[f32] {
        &self.positions
    }

    pub fn vertex_colors(&self) -> &[f32] {
        &self.colors
    }

    pub fn indices(&self) -> &[u32] {
        &self.indices
    }

    /// Number of whole vertices in the position array.
    pub fn vertex_count(&self) -> usize {
        self.positions.len() / 3
    }

    pub fn position_buffer(&self) -> Option<&DeviceBuffer> {
        self.position_buffer.as_ref()
    }

    pub fn color_buffer(&self) -> Option<&DeviceBuffer> {
        self.color_buffer.as_ref()
    }

    pub fn index_buffer(&self) -> Option<&DeviceBuffer> {
        self.index_buffer.as_ref()
    }

    /// Replaces the positions (3 floats per vertex) and uploads them.
    pub fn set_vertex_positions(&mut self, backend: &mut dyn GraphicsBackend, positions: Vec<f32>) {
        if positions.len() % 3 != 0 {
            log::warn!(
                "model `{}`: {} position floats is not a multiple of 3; the tail is not drawn",
                self.name,
                positions.len()
            );
        }
        self.positions = positions;
        mirror(
            backend,
            &mut self.position_buffer,
            BufferKind::Positions,
            &self.name,
            bytemuck::cast_slice(&self.positions),
        );
    }

    /// Replaces the per-vertex colors (3 floats per vertex) and uploads them.
    /// An empty array unbinds the color attribute.
    pub fn set_vertex_colors(&mut self, backend: &mut dyn GraphicsBackend, colors: Vec<f32>) {
        self.colors = colors;
        mirror(
            backend,
            &mut self.color_buffer,
            BufferKind::Colors,
            &self.name,
            bytemuck::cast_slice(&self.colors),
        );
    }

    /// Replaces the index list and uploads it. Draws stay non-indexed.
    pub fn set_indices(&mut self, backend: &mut dyn GraphicsBackend, indices: Vec<u32>) {
        self.indices = indices;
        mirror(
            backend,
            &mut self.index_buffer,
            BufferKind::Indices,
            &self.name,
            bytemuck::cast_slice(&self.indices),
        );
    }

    /// `T(position) * Rx * Ry * Rz`, recomputed on every call.
    pub fn compute_model_matrix(&self) -> Mat4 {
        model_matrix(self.position, self.rotation)
    }

    /// Replaces the positions with the triangles of an OBJ file.
    ///
    /// On failure the error is logged and the current geometry is kept.
    pub fn load_from_file(
        &mut self,
        backend: &mut dyn GraphicsBackend,
        path: impl AsRef<Path>,
    ) -> Result<(), RenderError> {
        let path = path.as_ref();
        let positions = mesh::load_obj(path).map_err(|err| {
            let err = match err {
                MeshError::UnsupportedFormat { path } => RenderError::UnsupportedFormat { path },
                MeshError::Io { path, source } => RenderError::Io { path, source },
                other => RenderError::Mesh {
                    path: path.to_path_buf(),
                    source: other,
                },
            };
            log::error!("model `{}`: {err}", self.name);
            err
        })?;

        self.set_vertex_positions(backend, positions);
        Ok(())
    }

    /// Draws with a projection and view derived from `camera`.
    pub fn draw(
        &self,
        backend: &mut dyn GraphicsBackend,
        config: &RenderConfig,
        viewport: Viewport,
        camera: &CameraState,
    ) -> Result<(), RenderError> {
        self.draw_with(backend, &FrameTransforms::new(config, viewport, camera))
    }

    /// Binds the buffers, activates the shader, sets `projection`, `view` and
    /// `model`, syncs them, then issues one non-indexed draw over every vertex.
    ///
    /// Models without vertices, without a usable shader, or without the colors
    /// their shader reads are skipped with an error.
    pub fn draw_with(
        &self,
        backend: &mut dyn GraphicsBackend,
        transforms: &FrameTransforms,
    ) -> Result<(), RenderError> {
        let vertex_count = self.vertex_count();
        let positions = match &self.position_buffer {
            Some(buffer) if vertex_count > 0 => buffer,
            _ => return Err(RenderError::missing(format!("vertices of model `{}`", self.name))),
        };
        let shader = match &self.shader {
            Some(shader) if shader.is_usable() => shader,
            Some(shader) => {
                return Err(RenderError::missing(format!(
                    "usable shader `{}` for model `{}`",
                    shader.label(),
                    self.name
                )));
            }
            None => return Err(RenderError::missing(format!("shader of model `{}`", self.name))),
        };
        if !self.colors.is_empty() && self.colors.len() < vertex_count * 3 {
            return Err(RenderError::missing(format!(
                "colors for {} vertices of model `{}` (have {})",
                vertex_count,
                self.name,
                self.colors.len() / 3
            )));
        }

        if shader.device_program().reads_colors() && self.color_buffer.is_none() {
            return Err(RenderError::missing(format!(
                "colors read by shader `{}` for model `{}`",
                shader.label(),
                self.name
            )));
        }

        if self.index_buffer.is_some() && !self.index_notice.replace(true) {
            log::debug!(
                "model `{}`: index buffer is bound but draws use the raw vertex list",
                self.name
            );
        }

        backend.bind_vertex_buffers(VertexBindings {
            positions,
            colors: self.color_buffer.as_ref(),
            indices: self.index_buffer.as_ref(),
        });
        shader.use_program(backend);
        shader.set_uniform("projection", transforms.projection);
        shader.set_uniform("view", transforms.view);
        shader.set_uniform("model", self.compute_model_matrix());
        shader.sync_uniforms(backend);

        backend.draw_arrays(self.primitive, vertex_count as u32);
        Ok(())
    }
}

impl fmt::Debug for DrawableModel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DrawableModel")
            .field("name", &self.name)
            .field("position", &self.position)
            .field("rotation", &self.rotation)
            .field("primitive", &self.primitive)
            .field("vertices", &self.vertex_count())
            .field("colors", &(self.colors.len() / 3))
            .field("indices", &self.indices.len())
            .field("shader", &self.shader.as_ref().map(|s| s.label().to_string()))
            .finish()
    }
}

/// `T(position) * Rx(rot.x) * Ry(rot.y) * Rz(rot.z)`, angles in degrees.
pub fn model_matrix(position: Vec3, rotation: Rotation) -> Mat4 {
    Mat4::from_translation(position)
        * Mat4::from_rotation_x(rotation.x.to_radians())
        * Mat4::from_rotation_y(rotation.y.to_radians())
        * Mat4::from_rotation_z(rotation.z.to_radians())
}

/// Keeps `slot` in sync with `bytes`: allocates on first use, uploads in full,
/// drops the buffer when `bytes` is empty.
fn mirror(
    backend: &mut dyn GraphicsBackend,
    slot: &mut Option<DeviceBuffer>,
    kind: BufferKind,
    name: &str,
    bytes: &[u8],
) {
    if bytes.is_empty() {
        *slot = None;
        return;
    }
    let buffer = slot.get_or_insert_with(|| backend.create_buffer(kind, name));
    backend.upload_buffer(buffer, bytes);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::camera::Camera;
    use crate::render::backend::recording::{Command, RecordingBackend};
    use crate::render::shader::ShaderLibrary;
    use crate::render::uniform::UniformValue;

    fn triangle(backend: &mut RecordingBackend, library: &mut ShaderLibrary) -> DrawableModel {
        let mut model = DrawableModel::new("tri").with_shader(library.position_color(backend));
        model.set_vertex_positions(backend, vec![0.0, 0.0, 0.0, 1.0, 0.0, 0.0, 0.0, 1.0, 0.0]);
        model.set_vertex_colors(backend, vec![1.0; 9]);
        model
    }

    #[test]
    fn model_matrix_composes_translate_then_xyz() {
        let pos = Vec3::new(1.0, -2.0, 3.0);
        let rot = Rotation::new(30.0, 45.0, 60.0);
        let expected = Mat4::from_translation(pos)
            * Mat4::from_axis_angle(Vec3::X, 30f32.to_radians())
            * Mat4::from_axis_angle(Vec3::Y, 45f32.to_radians())
            * Mat4::from_axis_angle(Vec3::Z, 60f32.to_radians());

        let mut model = DrawableModel::default();
        model.set_position(pos);
        model.set_rotation(rot);
        assert!(model.compute_model_matrix().abs_diff_eq(expected, 1e-5));

        // no hidden state between calls
        let first = model.compute_model_matrix();
        model.set_rotation(Rotation::new(90.0, 0.0, 0.0));
        model.compute_model_matrix();
        model.set_rotation(rot);
        assert_eq!(model.compute_model_matrix(), first);
    }

    #[test]
    fn rotation_order_is_not_commutative() {
        let xyz = model_matrix(Vec3::ZERO, Rotation::new(90.0, 90.0, 0.0));
        let yx = Mat4::from_rotation_y(90f32.to_radians()) * Mat4::from_rotation_x(90f32.to_radians());
        assert!(!xyz.abs_diff_eq(yx, 1e-4));
    }

    #[test]
    fn setters_upload_full_arrays() {
        let mut backend = RecordingBackend::new();
        let mut model = DrawableModel::new("m");

        model.set_vertex_positions(&mut backend, vec![1.0; 6]);
        let id = model.position_buffer().unwrap().id();
        assert_eq!(backend.buffer_contents(id).unwrap().len(), 24);

        model.set_vertex_positions(&mut backend, vec![2.0; 9]);
        assert_eq!(model.position_buffer().unwrap().id(), id, "buffer is reused");
        assert_eq!(backend.buffer_contents(id).unwrap(), bytemuck::cast_slice::<f32, u8>(&[2.0f32; 9]));

        model.set_indices(&mut backend, vec![0, 1, 2]);
        assert!(model.index_buffer().is_some());
        assert!(model.color_buffer().is_none());
    }

    #[test]
    fn clearing_colors_releases_the_buffer() {
        let mut backend = RecordingBackend::new();
        let mut model = DrawableModel::new("m");
        model.set_vertex_colors(&mut backend, vec![1.0; 3]);
        let id = model.color_buffer().unwrap().id();

        model.set_vertex_colors(&mut backend, Vec::new());
        assert!(model.color_buffer().is_none());
        backend.collect_released();
        assert_eq!(backend.released(), vec![id]);
    }

    #[test]
    fn draw_sets_uniforms_before_sync_and_draws_raw_count() {
        let mut backend = RecordingBackend::new();
        let mut library = ShaderLibrary::new();
        let mut model = triangle(&mut backend, &mut library);
        model.set_indices(&mut backend, vec![0, 1, 2, 2, 1, 0]);
        model.set_position(Vec3::new(0.0, 0.0, -3.0));

        let camera = Camera::default().state();
        let config = RenderConfig::default();
        let viewport = Viewport::new(800.0, 600.0);
        backend.clear_commands();
        model.draw(&mut backend, &config, viewport, &camera).unwrap();

        let draws = backend.draws();
        assert_eq!(draws.len(), 1);
        // index buffer bound, yet the draw covers the raw vertex list
        assert_eq!(draws[0].vertex_count, 3);
        assert_eq!(draws[0].indices, Some(model.index_buffer().unwrap().id()));
        assert_eq!(
            draws[0].uniform("model"),
            Some(UniformValue::Mat4(model.compute_model_matrix()))
        );
        assert_eq!(
            draws[0].uniform("view"),
            Some(UniformValue::Mat4(camera.view_matrix()))
        );
        assert_eq!(
            draws[0].uniform("projection"),
            Some(UniformValue::Mat4(config.projection(viewport, &camera)))
        );

        let first_write = backend
            .commands()
            .iter()
            .position(|c| matches!(c, Command::WriteUniform { .. }))
            .unwrap();
        let bind = backend
            .commands()
            .iter()
            .position(|c| matches!(c, Command::BindBuffers { .. }))
            .unwrap();
        let use_program = backend
            .commands()
            .iter()
            .position(|c| matches!(c, Command::UseProgram(_)))
            .unwrap();
        assert!(bind < use_program && use_program < first_write);
    }

    #[test]
    fn empty_model_is_skipped_with_error() {
        let mut backend = RecordingBackend::new();
        let mut library = ShaderLibrary::new();
        let model = DrawableModel::new("empty").with_shader(library.position_color(&mut backend));

        let camera = Camera::default().state();
        let err = model
            .draw(&mut backend, &RenderConfig::default(), Viewport::new(1.0, 1.0), &camera)
            .unwrap_err();
        assert!(matches!(err, RenderError::MissingResource(_)));
        assert!(backend.draws().is_empty());
    }

    #[test]
    fn short_color_array_is_rejected() {
        let mut backend = RecordingBackend::new();
        let mut library = ShaderLibrary::new();
        let mut model = triangle(&mut backend, &mut library);
        model.set_vertex_colors(&mut backend, vec![1.0; 6]);

        let camera = Camera::default().state();
        assert!(model
            .draw(&mut backend, &RenderConfig::default(), Viewport::new(1.0, 1.0), &camera)
            .is_err());
        assert!(backend.draws().is_empty());
    }

    #[test]
    fn colored_shader_without_colors_is_rejected() {
        let mut backend = RecordingBackend::new();
        let mut library = ShaderLibrary::new();
        let mut model = triangle(&mut backend, &mut library);
        model.set_vertex_colors(&mut backend, Vec::new());
        assert!(model.shader().unwrap().device_program().reads_colors());

        let camera = Camera::default().state();
        let err = model
            .draw(&mut backend, &RenderConfig::default(), Viewport::new(1.0, 1.0), &camera)
            .unwrap_err();
        assert!(matches!(err, RenderError::MissingResource(_)));
        assert!(backend.draws().is_empty());
    }

    #[test]
    fn load_rejects_unknown_suffix_and_keeps_geometry() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("quad.ply");
        std::fs::write(&path, "v 0 0 0\n").unwrap();

        let mut backend = RecordingBackend::new();
        let mut model = DrawableModel::new("m");
        model.set_vertex_positions(&mut backend, vec![0.5; 3]);

        let err = model.load_from_file(&mut backend, &path).unwrap_err();
        assert!(matches!(err, RenderError::UnsupportedFormat { .. }));
        assert_eq!(model.vertex_positions(), &[0.5; 3]);
    }

    #[test]
    fn load_quad_yields_two_triangles() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("quad.obj");
        std::fs::write(&path, "v 0 0 0\nv 1 0 0\nv 1 1 0\nv 0 1 0\nf 1 2 3 4\n").unwrap();

        let mut backend = RecordingBackend::new();
        let mut model = DrawableModel::new("quad");
        model.load_from_file(&mut backend, &path).unwrap();

        assert_eq!(model.vertex_positions().len(), 18);
        assert_eq!(model.vertex_count(), 6);
        assert_eq!(&model.vertex_positions()[0..3], &model.vertex_positions()[9..12]);
        assert!(model.index_buffer().is_none());
    }
}
