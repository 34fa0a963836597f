//! Shader programs and the registry that shares them between models.

use std::cell::RefCell;
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::fmt;
use std::path::{Path, PathBuf};
use std::rc::Rc;

use super::backend::{DeviceProgram, GraphicsBackend, StageSource};
use super::error::RenderError;
use super::uniform::{UniformValue, UniformWriteError};

/// Built-in program drawing per-vertex colored geometry.
const POSITION_COLOR_WGSL: &str = include_str!("shaders/position_color.wgsl");

/// Pipeline stage a source file feeds.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash, Ord, PartialOrd)]
pub enum ShaderStage {
    Vertex,
    Fragment,
    Geometry,
    Compute,
}

impl ShaderStage {
    /// The naga stage, if WGSL has one.
    pub(crate) fn naga_stage(self) -> Option<naga::ShaderStage> {
        match self {
            Self::Vertex => Some(naga::ShaderStage::Vertex),
            Self::Fragment => Some(naga::ShaderStage::Fragment),
            Self::Compute => Some(naga::ShaderStage::Compute),
            Self::Geometry => None,
        }
    }

    pub(crate) fn wgsl_attribute(self) -> &'static str {
        match self {
            Self::Vertex => "vertex",
            Self::Fragment => "fragment",
            Self::Geometry => "geometry",
            Self::Compute => "compute",
        }
    }
}

impl fmt::Display for ShaderStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.wgsl_attribute())
    }
}

/// Stage files making up one program. Vertex and fragment are required.
#[derive(Debug, Clone, Eq, PartialEq, Hash)]
pub struct ShaderSources {
    pub vertex: PathBuf,
    pub fragment: PathBuf,
    pub geometry: Option<PathBuf>,
    pub compute: Option<PathBuf>,
}

impl ShaderSources {
    pub fn new(vertex: impl Into<PathBuf>, fragment: impl Into<PathBuf>) -> Self {
        Self {
            vertex: vertex.into(),
            fragment: fragment.into(),
            geometry: None,
            compute: None,
        }
    }

    pub fn with_geometry(mut self, path: impl Into<PathBuf>) -> Self {
        self.geometry = Some(path.into());
        self
    }

    pub fn with_compute(mut self, path: impl Into<PathBuf>) -> Self {
        self.compute = Some(path.into());
        self
    }

    /// Provided stages, in pipeline order.
    pub fn stages(&self) -> impl Iterator<Item = (ShaderStage, &Path)> {
        [
            Some((ShaderStage::Vertex, self.vertex.as_path())),
            Some((ShaderStage::Fragment, self.fragment.as_path())),
            self.geometry.as_deref().map(|p| (ShaderStage::Geometry, p)),
            self.compute.as_deref().map(|p| (ShaderStage::Compute, p)),
        ]
        .into_iter()
        .flatten()
    }

    fn label(&self) -> String {
        self.vertex
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| "program".to_string())
    }
}

/// A linked device program plus its cache of uniform values.
///
/// Creation never fails outright: broken stages are logged and leave the
/// program unusable. Uniform values are cached by name (last write wins) and
/// pushed to the device by [`ShaderProgram::sync_uniforms`].
pub struct ShaderProgram {
    label: String,
    program: DeviceProgram,
    usable: bool,
    diagnostics: Vec<RenderError>,
    uniforms: RefCell<BTreeMap<String, UniformValue>>,
    warned: RefCell<BTreeSet<String>>,
}

impl ShaderProgram {
    /// Reads every stage file in `sources`, compiles and links them.
    pub fn create(backend: &mut dyn GraphicsBackend, sources: &ShaderSources) -> Self {
        let mut stages = Vec::new();
        let mut read_errors = Vec::new();

        for (stage, path) in sources.stages() {
            match std::fs::read_to_string(path) {
                Ok(text) => stages.push(StageSource {
                    stage,
                    path: path.to_path_buf(),
                    text,
                }),
                Err(source) => read_errors.push(RenderError::Io {
                    path: path.to_path_buf(),
                    source,
                }),
            }
        }

        Self::build(backend, sources.label(), stages, read_errors)
    }

    /// Compiles in-memory stage sources.
    pub fn from_stages(
        backend: &mut dyn GraphicsBackend,
        label: impl Into<String>,
        stages: Vec<StageSource>,
    ) -> Self {
        Self::build(backend, label.into(), stages, Vec::new())
    }

    /// The built-in position + color program.
    pub fn position_color(backend: &mut dyn GraphicsBackend) -> Self {
        let stage = |stage| StageSource {
            stage,
            path: PathBuf::from("<builtin>/position_color.wgsl"),
            text: POSITION_COLOR_WGSL.to_string(),
        };
        Self::from_stages(
            backend,
            "position_color",
            vec![stage(ShaderStage::Vertex), stage(ShaderStage::Fragment)],
        )
    }

    fn build(
        backend: &mut dyn GraphicsBackend,
        label: String,
        stages: Vec<StageSource>,
        mut diagnostics: Vec<RenderError>,
    ) -> Self {
        log::debug!("compiling shader program `{label}` ({} stages)", stages.len());

        let build = backend.create_program(&label, &stages);
        diagnostics.extend(build.errors);
        for err in &diagnostics {
            log::error!("shader `{label}`: {err}");
        }

        let usable = build.program.is_usable() && diagnostics.is_empty();
        Self {
            label,
            program: build.program,
            usable,
            diagnostics,
            uniforms: RefCell::new(BTreeMap::new()),
            warned: RefCell::new(BTreeSet::new()),
        }
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn device_program(&self) -> &DeviceProgram {
        &self.program
    }

    /// False when a stage was missing, failed to compile, or failed to link.
    pub fn is_usable(&self) -> bool {
        self.usable
    }

    /// Every failure hit while building the program.
    pub fn diagnostics(&self) -> &[RenderError] {
        &self.diagnostics
    }

    /// Makes the program active for the following draw.
    pub fn use_program(&self, backend: &mut dyn GraphicsBackend) {
        backend.use_program(&self.program);
    }

    /// Caches `value` under `name`, replacing any previous value. Does not touch
    /// the device.
    pub fn set_uniform(&self, name: &str, value: impl Into<UniformValue>) {
        self.uniforms.borrow_mut().insert(name.to_string(), value.into());
    }

    pub fn uniform(&self, name: &str) -> Option<UniformValue> {
        self.uniforms.borrow().get(name).copied()
    }

    /// Writes every cached uniform to the device, in name order.
    ///
    /// Idempotent: unchanged state produces the same writes every call. Names
    /// the program does not declare are skipped with one warning each.
    /// Returns the number of values written.
    pub fn sync_uniforms(&self, backend: &mut dyn GraphicsBackend) -> usize {
        if !self.usable {
            return 0;
        }

        let mut written = 0;
        for (name, value) in self.uniforms.borrow().iter() {
            match backend.write_uniform(&self.program, name, value) {
                Ok(()) => written += 1,
                Err(err) => self.warn_once(name, &err),
            }
        }
        written
    }

    fn warn_once(&self, name: &str, err: &UniformWriteError) {
        if self.warned.borrow_mut().insert(name.to_string()) {
            log::warn!("shader `{}`: {err}", self.label);
        }
    }
}

impl fmt::Debug for ShaderProgram {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ShaderProgram")
            .field("label", &self.label)
            .field("program", &self.program)
            .field("usable", &self.usable)
            .finish()
    }
}

/// Registry of compiled programs keyed by their stage files.
///
/// Loading the same combination twice returns the same shared program.
/// Models hold `Rc` clones; the device program is released once the last
/// holder is gone.
#[derive(Debug, Default)]
pub struct ShaderLibrary {
    programs: HashMap<ShaderSources, Rc<ShaderProgram>>,
    position_color: Option<Rc<ShaderProgram>>,
}

impl ShaderLibrary {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the shared program for `sources`, compiling it on first use.
    ///
    /// The library keeps every loaded program, with its cached uniform values,
    /// until [`purge_unused`](Self::purge_unused) drops the ones no model holds.
    pub fn load(
        &mut self,
        backend: &mut dyn GraphicsBackend,
        sources: &ShaderSources,
    ) -> Rc<ShaderProgram> {
        if let Some(program) = self.programs.get(sources) {
            return Rc::clone(program);
        }
        let program = Rc::new(ShaderProgram::create(backend, sources));
        self.programs.insert(sources.clone(), Rc::clone(&program));
        program
    }

    /// The shared built-in position + color program.
    pub fn position_color(&mut self, backend: &mut dyn GraphicsBackend) -> Rc<ShaderProgram> {
        Rc::clone(
            self.position_color
                .get_or_insert_with(|| Rc::new(ShaderProgram::position_color(backend))),
        )
    }

    /// Drops cached programs no model refers to any more.
    pub fn purge_unused(&mut self) -> usize {
        let before = self.programs.len();
        self.programs.retain(|_, p| Rc::strong_count(p) > 1);
        let mut purged = before - self.programs.len();
        if self.position_color.as_ref().is_some_and(|p| Rc::strong_count(p) == 1) {
            self.position_color = None;
            purged += 1;
        }
        purged
    }

    pub fn len(&self) -> usize {
        self.programs.len() + usize::from(self.position_color.is_some())
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::render::backend::recording::RecordingBackend;
    use crate::render::testing::write_shaders;

    fn load(backend: &mut RecordingBackend, dir: &Path) -> ShaderProgram {
        let (vertex, fragment) = write_shaders(dir);
        ShaderProgram::create(backend, &ShaderSources::new(vertex, fragment))
    }

    #[test]
    fn sync_writes_cached_values_idempotently() {
        let dir = tempfile::tempdir().unwrap();
        let mut backend = RecordingBackend::new();
        let shader = load(&mut backend, dir.path());
        assert!(shader.is_usable(), "{:?}", shader.diagnostics());

        let k = glam::Mat4::from_scale(glam::Vec3::splat(1.0));
        shader.set_uniform("model", k);
        assert!(backend.uniform_writes("model").is_empty(), "set_uniform must not touch the device");

        shader.use_program(&mut backend);
        assert_eq!(shader.sync_uniforms(&mut backend), 1);
        assert_eq!(shader.sync_uniforms(&mut backend), 1);
        assert_eq!(
            backend.uniform_writes("model"),
            vec![UniformValue::Mat4(k), UniformValue::Mat4(k)]
        );

        let k2 = glam::Mat4::from_scale(glam::Vec3::splat(2.0));
        shader.set_uniform("model", k2);
        backend.clear_commands();
        assert_eq!(shader.sync_uniforms(&mut backend), 1);
        assert_eq!(backend.uniform_writes("model"), vec![UniformValue::Mat4(k2)]);
        assert_eq!(shader.uniform("model"), Some(UniformValue::Mat4(k2)));
    }

    #[test]
    fn unknown_uniform_names_are_skipped() {
        let dir = tempfile::tempdir().unwrap();
        let mut backend = RecordingBackend::new();
        let shader = load(&mut backend, dir.path());

        shader.set_uniform("k", 1.0f32);
        shader.set_uniform("view", glam::Mat4::IDENTITY);
        assert_eq!(shader.sync_uniforms(&mut backend), 1);
        assert!(backend.uniform_writes("k").is_empty());
    }

    #[test]
    fn missing_file_yields_unusable_program() {
        let dir = tempfile::tempdir().unwrap();
        let mut backend = RecordingBackend::new();
        let (vertex, _) = write_shaders(dir.path());

        let shader = ShaderProgram::create(
            &mut backend,
            &ShaderSources::new(vertex, dir.path().join("missing.wgsl")),
        );
        assert!(!shader.is_usable());
        assert!(matches!(shader.diagnostics()[0], RenderError::Io { .. }));

        shader.set_uniform("view", glam::Mat4::IDENTITY);
        assert_eq!(shader.sync_uniforms(&mut backend), 0);
    }

    #[test]
    fn library_shares_programs_by_sources() {
        let dir = tempfile::tempdir().unwrap();
        let mut backend = RecordingBackend::new();
        let (vertex, fragment) = write_shaders(dir.path());
        let sources = ShaderSources::new(vertex, fragment);

        let mut library = ShaderLibrary::new();
        let a = library.load(&mut backend, &sources);
        let b = library.load(&mut backend, &sources);
        assert!(Rc::ptr_eq(&a, &b));
        assert_eq!(backend.live_programs(), 1);

        drop((a, b));
        assert_eq!(library.purge_unused(), 1);
        assert!(library.is_empty());
        backend.collect_released();
        assert_eq!(backend.live_programs(), 0);
    }

    #[test]
    fn builtin_position_color_program_links() {
        let mut backend = RecordingBackend::new();
        let mut library = ShaderLibrary::new();
        let a = library.position_color(&mut backend);
        let b = library.position_color(&mut backend);
        assert!(a.is_usable(), "{:?}", a.diagnostics());
        assert!(Rc::ptr_eq(&a, &b));
    }
}
