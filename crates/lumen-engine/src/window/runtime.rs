use anyhow::{Context, Result};
use ouroboros::self_referencing;

use winit::application::ApplicationHandler;
use winit::dpi::{LogicalSize, PhysicalSize};
use winit::event::WindowEvent;
use winit::event_loop::{ActiveEventLoop, ControlFlow, EventLoop};
use winit::window::{Window, WindowId};

use crate::core::{App as CoreApp, AppControl, FrameCtx, SetupCtx, WindowCtx};
use crate::device::{Gpu, GpuInit};
use crate::input::platform::translate_window_event;
use crate::input::{InputFrame, InputState};
use crate::render::backend::wgpu::WgpuBackend;
use crate::time::FrameClock;

/// Window/runtime configuration.
#[derive(Debug, Clone)]
pub struct RuntimeConfig {
    pub title: String,
    pub initial_size: LogicalSize<f64>,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            title: "lumen".to_string(),
            initial_size: LogicalSize::new(800.0, 600.0),
        }
    }
}

/// Runtime context passed to the application.
///
/// Requests are applied after the current callback returns.
#[derive(Debug, Default)]
pub struct RuntimeCtx {
    exit: bool,
}

impl RuntimeCtx {
    pub fn exit(&mut self) {
        self.exit = true;
    }

    pub fn exit_requested(&self) -> bool {
        self.exit
    }
}

/// Entry point for the runtime.
pub struct Runtime;

impl Runtime {
    /// Opens the window, runs the event loop until the app exits or the window
    /// is closed, and returns the first fatal error.
    pub fn run<A>(initial: RuntimeConfig, gpu_init: GpuInit, app: A) -> Result<()>
    where
        A: 'static + CoreApp,
    {
        let event_loop = EventLoop::new().context("failed to create winit EventLoop")?;
        let mut state = AppState::new(initial, gpu_init, app);

        event_loop
            .run_app(&mut state)
            .context("winit event loop terminated with error")?;

        match state.failure.take() {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }
}

#[self_referencing]
struct WindowEntry {
    input_state: InputState,
    input_frame: InputFrame,
    clock: FrameClock,

    window: Window,

    #[borrows(window)]
    #[covariant]
    gpu: Gpu<'this>,
}

struct LiveWindow {
    entry: WindowEntry,
    backend: WgpuBackend,
}

struct AppState<A>
where
    A: CoreApp + 'static,
{
    initial: RuntimeConfig,
    gpu_init: GpuInit,
    app: A,

    live: Option<LiveWindow>,
    exit_requested: bool,
    failure: Option<anyhow::Error>,
}

impl<A> AppState<A>
where
    A: CoreApp + 'static,
{
    fn new(initial: RuntimeConfig, gpu_init: GpuInit, app: A) -> Self {
        Self {
            initial,
            gpu_init,
            app,
            live: None,
            exit_requested: false,
            failure: None,
        }
    }

    fn request_exit(&mut self, event_loop: &ActiveEventLoop) {
        self.exit_requested = true;
        self.live = None;
        event_loop.exit();
    }

    fn fail(&mut self, event_loop: &ActiveEventLoop, err: anyhow::Error) {
        log::error!("{err:#}");
        self.failure.get_or_insert(err);
        self.request_exit(event_loop);
    }

    fn open_window(&mut self, event_loop: &ActiveEventLoop) -> Result<()> {
        let attrs = Window::default_attributes()
            .with_title(self.initial.title.clone())
            .with_inner_size(self.initial.initial_size);

        let window = event_loop
            .create_window(attrs)
            .context("failed to create window")?;

        let gpu_init = self.gpu_init.clone();
        let entry = WindowEntryTryBuilder {
            input_state: InputState::default(),
            input_frame: InputFrame::default(),
            clock: FrameClock::default(),
            window,
            gpu_builder: |w| {
                pollster::block_on(Gpu::new(w, gpu_init)).context("GPU initialization failed")
            },
        }
        .try_build()?;

        let mut backend = entry.with_gpu(|gpu| {
            WgpuBackend::new(gpu.device(), gpu.queue(), gpu.surface_format(), true)
        });
        log::info!("window `{}` ready", self.initial.title);

        let app = &mut self.app;
        entry
            .with_window(|window| {
                app.on_setup(&mut SetupCtx {
                    window,
                    backend: &mut backend,
                })
            })
            .context("application setup failed")?;

        entry.with_window(|w| w.request_redraw());
        self.live = Some(LiveWindow { entry, backend });
        Ok(())
    }

    fn resize(&mut self, size: PhysicalSize<u32>) {
        if let Some(live) = self.live.as_mut() {
            live.entry.with_gpu_mut(|gpu| gpu.resize(size));
            live.entry.with_window(|w| w.request_redraw());
            self.app.on_resize(size);
        }
    }

    /// Drives one frame. Returns whether the app asked to exit.
    fn redraw(&mut self, window_id: WindowId) -> bool {
        let Some(live) = self.live.as_mut() else {
            return false;
        };
        let (app, backend) = (&mut self.app, &mut live.backend);

        let mut runtime_ctx = RuntimeCtx::default();
        let mut control = AppControl::Continue;

        live.entry.with_mut(|fields| {
            let time = fields.clock.tick();
            {
                let mut ctx = FrameCtx {
                    window: WindowCtx {
                        id: window_id,
                        window: fields.window,
                    },
                    gpu: fields.gpu,
                    backend,
                    input: fields.input_state,
                    input_frame: fields.input_frame,
                    time,
                    runtime: &mut runtime_ctx,
                };
                control = app.on_frame(&mut ctx);
            }

            // Per-frame deltas are consumed by the frame.
            fields.input_frame.clear();
        });

        control == AppControl::Exit || runtime_ctx.exit_requested()
    }
}

impl<A> ApplicationHandler for AppState<A>
where
    A: CoreApp + 'static,
{
    fn resumed(&mut self, event_loop: &ActiveEventLoop) {
        if self.live.is_some() || self.exit_requested {
            return;
        }
        if let Err(err) = self.open_window(event_loop) {
            self.fail(event_loop, err);
        }
    }

    fn about_to_wait(&mut self, event_loop: &ActiveEventLoop) {
        if self.exit_requested {
            event_loop.exit();
            return;
        }

        // Continuous redraw.
        event_loop.set_control_flow(ControlFlow::Poll);
        if let Some(live) = &self.live {
            live.entry.with_window(|w| w.request_redraw());
        }
    }

    fn window_event(
        &mut self,
        event_loop: &ActiveEventLoop,
        window_id: WindowId,
        event: WindowEvent,
    ) {
        let Some(live) = self.live.as_mut() else {
            return;
        };
        let app = &mut self.app;

        let mut control = AppControl::Continue;
        live.entry.with_mut(|fields| {
            if let Some(ev) = translate_window_event(fields.window, &event) {
                fields.input_state.apply_event(fields.input_frame, ev);
            }
            control = app.on_window_event(&event);
        });

        if control == AppControl::Exit {
            self.request_exit(event_loop);
            return;
        }

        match event {
            WindowEvent::CloseRequested => {
                log::info!("window close requested");
                self.request_exit(event_loop);
            }

            WindowEvent::Resized(size) => self.resize(size),

            WindowEvent::ScaleFactorChanged { .. } => {
                if let Some(size) = self
                    .live
                    .as_ref()
                    .map(|live| live.entry.with_window(|w| w.inner_size()))
                {
                    self.resize(size);
                }
            }

            WindowEvent::RedrawRequested => {
                if self.redraw(window_id) {
                    self.request_exit(event_loop);
                }
            }

            _ => {}
        }
    }

    fn exiting(&mut self, _event_loop: &ActiveEventLoop) {
        self.live = None;
    }
}
