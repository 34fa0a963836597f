use std::path::PathBuf;

use glam::{Vec3, Vec4};
use lumen_engine::camera::{Camera, Movement};
use lumen_engine::core::{App, AppControl, FrameCtx, SetupCtx};
use lumen_engine::input::Key;
use lumen_engine::render::backend::GraphicsBackend;
use lumen_engine::render::{DrawableModel, ModelId, RenderSession, ShaderSources};

use crate::geometry;
use crate::overlay::TitleOverlay;

/// Cube spin in degrees per second.
const SPIN_RATE: f32 = 30.0;
/// Spacing along +X between loaded meshes.
const MESH_SPACING: f32 = 3.0;
const MESH_TINT: Vec4 = Vec4::new(0.9, 0.6, 0.2, 1.0);

const MOVEMENT_KEYS: [(Key, Movement); 4] = [
    (Key::W, Movement::Forward),
    (Key::S, Movement::Backward),
    (Key::A, Movement::Left),
    (Key::D, Movement::Right),
];

pub struct Viewer {
    title: String,
    shader_dir: PathBuf,
    meshes: Vec<PathBuf>,

    session: RenderSession,
    camera: Camera,
    cube: Option<ModelId>,
}

impl Viewer {
    pub fn new(title: String, shader_dir: PathBuf, meshes: Vec<PathBuf>) -> Self {
        Self {
            title,
            shader_dir,
            meshes,
            session: RenderSession::default(),
            camera: Camera::at(Vec3::new(1.5, 1.5, 6.0)),
            cube: None,
        }
    }

    fn sources(&self, name: &str) -> ShaderSources {
        ShaderSources::new(
            self.shader_dir.join(format!("{name}.vert.wgsl")),
            self.shader_dir.join(format!("{name}.frag.wgsl")),
        )
    }

    fn steer(&mut self, ctx: &FrameCtx<'_, '_>) {
        let dt = ctx.time.dt;
        for (key, movement) in MOVEMENT_KEYS {
            if ctx.input.key_down(key) {
                self.camera.process_keyboard(movement, dt);
            }
        }

        let (dx, dy) = ctx.input_frame.pointer_delta;
        if dx != 0.0 || dy != 0.0 {
            // window y grows downwards, pitch grows upwards
            self.camera.process_mouse_movement(dx, -dy, true);
        }
        if ctx.input_frame.scroll != 0.0 {
            self.camera.process_mouse_scroll(ctx.input_frame.scroll);
        }
    }
}

impl App for Viewer {
    fn on_setup(&mut self, ctx: &mut SetupCtx<'_>) -> anyhow::Result<()> {
        let basic = self.sources("basic");
        let solid = self.sources("solid");
        let backend: &mut dyn GraphicsBackend = &mut *ctx.backend;
        let (scene, shaders) = self.session.parts_mut();

        scene.add_axis(backend, shaders);

        let (positions, colors) = geometry::colored_cube();
        let mut cube = DrawableModel::new("cube").with_shader(shaders.load(backend, &basic));
        cube.set_vertex_positions(backend, positions);
        cube.set_vertex_colors(backend, colors);
        self.cube = Some(scene.add_model(cube));

        let solid = shaders.load(backend, &solid);
        solid.set_uniform("tint", MESH_TINT);

        for (i, path) in self.meshes.iter().enumerate() {
            let name = path
                .file_stem()
                .map_or_else(|| format!("mesh {i}"), |s| s.to_string_lossy().into_owned());
            let mut model = DrawableModel::new(name).with_shader(solid.clone());
            // failures are logged; the viewer keeps going without the mesh
            if model.load_from_file(backend, path).is_ok() {
                model.set_position(Vec3::X * MESH_SPACING * (i + 1) as f32);
                log::info!("loaded `{}` ({} vertices)", model.name(), model.vertex_count());
                scene.add_model(model);
            }
        }

        self.session.add_overlay(TitleOverlay::new(self.title.clone()));
        ctx.window.set_title(&self.title);
        Ok(())
    }

    fn on_frame(&mut self, ctx: &mut FrameCtx<'_, '_>) -> AppControl {
        if ctx.input_frame.key_pressed(Key::Escape) {
            log::info!("escape pressed, exiting");
            return AppControl::Exit;
        }

        self.steer(ctx);

        if let Some(cube) = self.cube.and_then(|id| self.session.scene_mut().get_mut(id)) {
            let mut rotation = cube.rotation();
            rotation.y = (rotation.y + SPIN_RATE * ctx.time.dt) % 360.0;
            cube.set_rotation(rotation);
        }

        let camera = self.camera.state();
        ctx.render(&mut self.session, Some(&camera))
    }
}
