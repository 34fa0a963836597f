use std::fmt;

use glam::Vec3;

use crate::camera::CameraState;

use super::backend::{GraphicsBackend, PrimitiveKind};
use super::config::RenderConfig;
use super::error::RenderError;
use super::model::{DrawableModel, FrameTransforms};
use super::shader::ShaderLibrary;
use super::viewport::Viewport;

/// Length of each axis segment drawn by [`SceneGraph::add_axis`].
pub const AXIS_LENGTH: f32 = 10_000.0;

/// Stable identity of a model inside one [`SceneGraph`].
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash, Ord, PartialOrd)]
pub struct ModelId(u64);

impl fmt::Display for ModelId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "model#{}", self.0)
    }
}

/// Outcome of one [`SceneGraph::draw_models`] pass.
#[derive(Debug, Copy, Clone, Default, Eq, PartialEq)]
pub struct DrawStats {
    /// Models handed to the device.
    pub issued: usize,
    /// Models refused before reaching the device, including ones missing
    /// vertex data their shader reads.
    pub skipped: usize,
}

#[derive(Debug)]
struct SceneEntry {
    id: ModelId,
    model: DrawableModel,
}

/// Ordered collection of models. Insertion order is draw order.
///
/// Each entry owns its model outright, device buffers included, so adding or
/// removing a model is a single edit.
#[derive(Debug, Default)]
pub struct SceneGraph {
    entries: Vec<SceneEntry>,
    next_id: u64,
}

impl SceneGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends `model`; it is drawn after every model already present.
    pub fn add_model(&mut self, model: DrawableModel) -> ModelId {
        self.next_id += 1;
        let id = ModelId(self.next_id);
        log::trace!("scene: added `{}` as {id}", model.name());
        self.entries.push(SceneEntry { id, model });
        id
    }

    /// Removes and returns the model with `id`. Unknown ids are reported and
    /// leave the scene unchanged.
    ///
    /// Dropping the returned model releases its device buffers.
    pub fn delete_model(&mut self, id: ModelId) -> Result<DrawableModel, RenderError> {
        let Some(index) = self.entries.iter().position(|e| e.id == id) else {
            let err = RenderError::missing(format!("{id} is not in the scene"));
            log::error!("scene: {err}");
            return Err(err);
        };
        let entry = self.entries.remove(index);
        log::trace!("scene: removed `{}` ({id})", entry.model.name());
        Ok(entry.model)
    }

    /// Draws every model in insertion order with one shared projection and
    /// view. Per-model failures are logged and counted; the pass goes on.
    pub fn draw_models(
        &self,
        backend: &mut dyn GraphicsBackend,
        config: &RenderConfig,
        viewport: Viewport,
        camera: &CameraState,
    ) -> DrawStats {
        let mut stats = DrawStats::default();
        if !viewport.is_valid() {
            log::trace!("scene: viewport {viewport:?} is empty, nothing drawn");
            return stats;
        }

        let transforms = FrameTransforms::new(config, viewport, camera);
        for entry in &self.entries {
            match entry.model.draw_with(backend, &transforms) {
                Ok(()) => stats.issued += 1,
                Err(err) => {
                    log::error!("scene: skipped {}: {err}", entry.id);
                    stats.skipped += 1;
                }
            }
        }
        stats
    }

    /// Adds X, Y and Z axis lines colored red, green and blue. All three share
    /// the built-in position + color program.
    pub fn add_axis(
        &mut self,
        backend: &mut dyn GraphicsBackend,
        shaders: &mut ShaderLibrary,
    ) -> [ModelId; 3] {
        let shader = shaders.position_color(backend);
        let axes = [
            ("axis x", Vec3::X, [1.0, 0.0, 0.0]),
            ("axis y", Vec3::Y, [0.0, 1.0, 0.0]),
            ("axis z", Vec3::Z, [0.0, 0.0, 1.0]),
        ];

        axes.map(|(name, dir, color)| {
            let end = dir * AXIS_LENGTH;
            let mut model = DrawableModel::new(name)
                .with_shader(shader.clone())
                .with_primitive(PrimitiveKind::LineList);
            model.set_vertex_positions(backend, vec![0.0, 0.0, 0.0, end.x, end.y, end.z]);
            model.set_vertex_colors(backend, [color, color].concat());
            self.add_model(model)
        })
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn contains(&self, id: ModelId) -> bool {
        self.entries.iter().any(|e| e.id == id)
    }

    pub fn get(&self, id: ModelId) -> Option<&DrawableModel> {
        self.entries.iter().find(|e| e.id == id).map(|e| &e.model)
    }

    pub fn get_mut(&mut self, id: ModelId) -> Option<&mut DrawableModel> {
        self.entries.iter_mut().find(|e| e.id == id).map(|e| &mut e.model)
    }

    /// Ids in draw order.
    pub fn ids(&self) -> impl Iterator<Item = ModelId> + '_ {
        self.entries.iter().map(|e| e.id)
    }

    pub fn iter(&self) -> impl Iterator<Item = (ModelId, &DrawableModel)> {
        self.entries.iter().map(|e| (e.id, &e.model))
    }

    /// Drops every model.
    pub fn clear(&mut self) {
        log::trace!("scene: cleared {} models", self.entries.len());
        self.entries.clear();
    }
}

#[cfg(test)]
mod tests {
    use std::rc::Rc;

    use super::*;
    use crate::camera::Camera;
    use crate::render::backend::recording::RecordingBackend;
    use crate::render::backend::ResourceId;

    struct Fixture {
        backend: RecordingBackend,
        shaders: ShaderLibrary,
        camera: CameraState,
        config: RenderConfig,
    }

    impl Fixture {
        fn new() -> Self {
            Self {
                backend: RecordingBackend::new(),
                shaders: ShaderLibrary::new(),
                camera: Camera::at(Vec3::new(0.0, 0.0, 3.0)).state(),
                config: RenderConfig::default(),
            }
        }

        fn model(&mut self, name: &str, vertices: usize) -> DrawableModel {
            let shader = self.shaders.position_color(&mut self.backend);
            let mut model = DrawableModel::new(name).with_shader(shader);
            model.set_vertex_positions(&mut self.backend, vec![0.25; vertices * 3]);
            model.set_vertex_colors(&mut self.backend, vec![1.0; vertices * 3]);
            model
        }

        fn draw(&mut self, scene: &SceneGraph) -> DrawStats {
            self.backend.clear_commands();
            scene.draw_models(
                &mut self.backend,
                &self.config,
                Viewport::new(800.0, 600.0),
                &self.camera,
            )
        }

        fn drawn_buffers(&self) -> Vec<ResourceId> {
            self.backend.draws().iter().filter_map(|d| d.positions).collect()
        }
    }

    #[test]
    fn draws_every_model_in_insertion_order() {
        let mut fx = Fixture::new();
        let mut scene = SceneGraph::new();
        let mut expected = Vec::new();
        for (i, name) in ["a", "b", "c", "d"].into_iter().enumerate() {
            let model = fx.model(name, i + 3);
            expected.push(model.position_buffer().unwrap().id());
            scene.add_model(model);
        }

        let stats = fx.draw(&scene);
        assert_eq!(stats, DrawStats { issued: 4, skipped: 0 });
        assert_eq!(fx.drawn_buffers(), expected);
        let counts: Vec<u32> = fx.backend.draws().iter().map(|d| d.vertex_count).collect();
        assert_eq!(counts, vec![3, 4, 5, 6]);
    }

    #[test]
    fn add_draw_delete_draw() {
        let mut fx = Fixture::new();
        let mut scene = SceneGraph::new();
        let id = scene.add_model(fx.model("cube", 8));

        let stats = fx.draw(&scene);
        assert_eq!(stats.issued, 1);
        let draws = fx.backend.draws();
        assert_eq!(draws[0].vertex_count, 8);
        assert_eq!(draws[0].primitive, PrimitiveKind::TriangleList);

        scene.delete_model(id).unwrap();
        assert!(scene.is_empty());
        assert_eq!(fx.draw(&scene), DrawStats::default());
        assert!(fx.backend.draws().is_empty());
    }

    #[test]
    fn delete_keeps_remaining_models_aligned() {
        let mut fx = Fixture::new();
        let mut scene = SceneGraph::new();
        let a = fx.model("a", 3);
        let b = fx.model("b", 4);
        let c = fx.model("c", 5);
        let (a_buf, b_buf, c_buf) = (
            a.position_buffer().unwrap().id(),
            b.position_buffer().unwrap().id(),
            c.position_buffer().unwrap().id(),
        );
        scene.add_model(a);
        let b_id = scene.add_model(b);
        scene.add_model(c);

        let removed = scene.delete_model(b_id).unwrap();
        drop(removed);
        fx.backend.collect_released();

        fx.draw(&scene);
        assert_eq!(fx.drawn_buffers(), vec![a_buf, c_buf]);
        assert!(!fx.drawn_buffers().contains(&b_buf));
        let counts: Vec<u32> = fx.backend.draws().iter().map(|d| d.vertex_count).collect();
        assert_eq!(counts, vec![3, 5]);
        assert_eq!(fx.backend.stale_releases(), 0);
    }

    #[test]
    fn deleting_unknown_model_changes_nothing() {
        let mut fx = Fixture::new();
        let mut scene = SceneGraph::new();
        let id = scene.add_model(fx.model("a", 3));
        scene.delete_model(id).unwrap();

        assert!(matches!(scene.delete_model(id), Err(RenderError::MissingResource(_))));
        scene.add_model(fx.model("b", 3));
        assert_eq!(scene.len(), 1);
    }

    #[test]
    fn empty_model_is_skipped_without_aborting() {
        let mut fx = Fixture::new();
        let mut scene = SceneGraph::new();
        scene.add_model(fx.model("a", 3));
        scene.add_model(DrawableModel::new("empty"));
        scene.add_model(fx.model("c", 3));

        assert_eq!(fx.draw(&scene), DrawStats { issued: 2, skipped: 1 });
    }

    #[test]
    fn model_missing_shader_colors_counts_as_skipped() {
        let mut fx = Fixture::new();
        let mut scene = SceneGraph::new();
        scene.add_model(fx.model("a", 3));
        let mut bare = fx.model("b", 3);
        bare.set_vertex_colors(&mut fx.backend, Vec::new());
        scene.add_model(bare);

        assert_eq!(fx.draw(&scene), DrawStats { issued: 1, skipped: 1 });
        assert_eq!(fx.backend.draws().len(), 1);
    }

    #[test]
    fn duplicate_names_are_allowed() {
        let mut fx = Fixture::new();
        let mut scene = SceneGraph::new();
        let a = scene.add_model(fx.model("same", 3));
        let b = scene.add_model(fx.model("same", 3));
        assert_ne!(a, b);
        assert_eq!(scene.ids().collect::<Vec<_>>(), vec![a, b]);
    }

    #[test]
    fn add_axis_inserts_three_lines_sharing_one_shader() {
        let mut fx = Fixture::new();
        let mut scene = SceneGraph::new();
        let ids = scene.add_axis(&mut fx.backend, &mut fx.shaders);

        assert_eq!(scene.len(), 3);
        let models: Vec<&DrawableModel> = ids.iter().filter_map(|&id| scene.get(id)).collect();
        assert_eq!(models.len(), 3);
        for m in &models {
            assert_eq!(m.vertex_positions().len(), 6);
            assert_eq!(m.primitive(), PrimitiveKind::LineList);
            assert!(m.index_buffer().is_none());
        }
        // positions and colors only
        assert_eq!(fx.backend.live_buffers(), 6);
        let first = models[0].shader().unwrap();
        assert!(models.iter().all(|m| Rc::ptr_eq(m.shader().unwrap(), first)));
        assert_eq!(fx.backend.live_programs(), 1);

        assert_eq!(models[0].vertex_colors(), &[1.0, 0.0, 0.0, 1.0, 0.0, 0.0]);
        assert_eq!(models[2].vertex_positions()[5], AXIS_LENGTH);

        assert_eq!(fx.draw(&scene).issued, 3);
        assert!(fx.backend.draws().iter().all(|d| d.vertex_count == 2));
    }

    #[test]
    fn clear_releases_buffers_and_last_shader_reference() {
        let mut fx = Fixture::new();
        let mut scene = SceneGraph::new();
        scene.add_axis(&mut fx.backend, &mut fx.shaders);
        assert_eq!(fx.backend.live_buffers(), 6);

        scene.clear();
        fx.shaders.purge_unused();
        fx.backend.collect_released();
        assert_eq!(fx.backend.live_buffers(), 0);
        assert_eq!(fx.backend.live_programs(), 0);
        assert_eq!(fx.backend.stale_releases(), 0);
    }

    #[test]
    fn zero_sized_viewport_draws_nothing() {
        let mut fx = Fixture::new();
        let mut scene = SceneGraph::new();
        scene.add_model(fx.model("a", 3));
        let stats = scene.draw_models(&mut fx.backend, &fx.config, Viewport::new(0.0, 0.0), &fx.camera);
        assert_eq!(stats, DrawStats::default());
    }
}
