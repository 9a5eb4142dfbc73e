//! CAVE VR - a virtual CAVE rendered inside a head-mounted display
//!
//! Three projection surfaces (two walls and a floor) are placed in the room.
//! Every frame, each surface is rendered once per eye with an off-axis
//! frustum solved from the tracked eye position, and the results are then
//! shown on the surface quads as seen from the physical eyes.

use std::sync::Arc;

use anyhow::Context as _;
use log::{debug, info, warn};
use winit::application::ApplicationHandler;
use winit::dpi::PhysicalSize;
use winit::event::{ElementState, WindowEvent};
use winit::event_loop::{ActiveEventLoop, EventLoop};
use winit::keyboard::{KeyCode, PhysicalKey};
use winit::window::{Window, WindowId};

pub mod assets;
pub mod compositor;
pub mod config;
pub mod error;
pub mod eye;
pub mod frustum;
pub mod hmd;
pub mod input;
pub mod interaction;
pub mod logging;
pub mod mesh;
pub mod passes;
pub mod render_targets;
pub mod renderer;
pub mod resources;
pub mod scene;
pub mod surface;
pub mod uniforms;

use crate::assets::AssetManifest;
use crate::config::{CaveArgs, CaveConfig};
use crate::error::SetupError;
use crate::hmd::DesktopHmd;
use crate::input::{DesktopPoseSource, LastGoodInput, PoseSource};
use crate::renderer::{CaveRenderer, GpuContext};
use crate::resources::ResourceLedger;
use crate::scene::CaveScene;

/// GPU-side state; exists while the window does. Fields drop in order.
struct Session {
    renderer: CaveRenderer,
    hmd: DesktopHmd,
    gpu: GpuContext,
}

impl Session {
    fn new(
        event_loop: &ActiveEventLoop,
        config: &CaveConfig,
        manifest: &AssetManifest,
        ledger: &ResourceLedger,
    ) -> Result<Self, SetupError> {
        let (width, height) = config.mirror_size();
        let window_attrs = Window::default_attributes()
            .with_title("CAVE VR")
            .with_inner_size(PhysicalSize::new(width, height));
        let window = Arc::new(event_loop.create_window(window_attrs)?);

        let (gpu, surface) = GpuContext::for_window(&window)?;
        let hmd = DesktopHmd::new(&gpu, surface, window, config, ledger)?;
        let renderer = CaveRenderer::new(&gpu, config, manifest, ledger)?;
        Ok(Self { renderer, hmd, gpu })
    }
}

/// Main application state
struct CaveApp {
    config: CaveConfig,
    manifest: AssetManifest,
    ledger: ResourceLedger,
    scene: CaveScene,
    input: LastGoodInput<DesktopPoseSource>,
    session: Option<Session>,
    /// First fatal error; ends the event loop.
    fatal: Option<anyhow::Error>,
}

impl CaveApp {
    fn new(config: CaveConfig, manifest: AssetManifest) -> anyhow::Result<Self> {
        let scene = CaveScene::new(&config).context("invalid CAVE layout")?;
        let input = LastGoodInput::new(DesktopPoseSource::new(config.ipd));
        Ok(Self {
            config,
            manifest,
            ledger: ResourceLedger::new(),
            scene,
            input,
            session: None,
            fatal: None,
        })
    }

    fn fail(&mut self, event_loop: &ActiveEventLoop, err: anyhow::Error) {
        if self.fatal.is_none() {
            self.fatal = Some(err);
        }
        event_loop.exit();
    }

    fn redraw(&mut self) {
        let input = self.input.sample();
        self.scene.update(&input);

        if let Some(session) = &mut self.session {
            session
                .renderer
                .render_frame(&session.gpu, &self.scene, &input.head, &mut session.hmd);
            session.hmd.window().request_redraw();
        }
    }
}

impl ApplicationHandler for CaveApp {
    fn resumed(&mut self, event_loop: &ActiveEventLoop) {
        if self.session.is_some() {
            return;
        }
        info!("Creating window and GPU session");
        match Session::new(event_loop, &self.config, &self.manifest, &self.ledger) {
            Ok(session) => {
                info!("Session ready, {} GPU resources allocated", self.ledger.live());
                session.hmd.window().request_redraw();
                self.session = Some(session);
            }
            Err(e) => self.fail(event_loop, anyhow::Error::new(e).context("startup failed")),
        }
    }

    fn window_event(&mut self, event_loop: &ActiveEventLoop, _window_id: WindowId, event: WindowEvent) {
        match event {
            WindowEvent::CloseRequested => {
                info!("Close requested");
                event_loop.exit();
            }

            WindowEvent::RedrawRequested => self.redraw(),

            WindowEvent::Resized(size) => {
                if let Some(session) = &mut self.session {
                    session.hmd.resize(&session.gpu.device, size.width, size.height);
                }
            }

            WindowEvent::KeyboardInput { event, .. } => {
                let pressed = event.state == ElementState::Pressed;
                match event.physical_key {
                    PhysicalKey::Code(KeyCode::Escape) if pressed => {
                        info!("Escape pressed, exiting");
                        event_loop.exit();
                    }
                    PhysicalKey::Code(KeyCode::KeyR) if pressed && !event.repeat => {
                        self.input.source_mut().recenter();
                    }
                    _ => self.input.source_mut().handle_keyboard_input(&event),
                }
            }

            _ => {}
        }
    }
}

/// Runs the CAVE until the window closes. Returns the first fatal error.
pub fn run(args: &CaveArgs) -> anyhow::Result<()> {
    let config = args.build_config()?;
    debug!("{config:?}");

    let manifest = AssetManifest::new(&args.assets);
    manifest.check_present().map_err(SetupError::from)?;

    let event_loop = EventLoop::new().context("failed to create event loop")?;
    let mut app = CaveApp::new(config, manifest)?;
    event_loop.run_app(&mut app).context("event loop failed")?;

    let ledger = app.ledger.clone();
    if let Some(session) = app.session.take() {
        info!("Presented {} frames", session.hmd.frames_submitted());
    }
    match ledger.live() {
        0 => debug!("All {} GPU resources released", ledger.created()),
        live => warn!("{live} GPU resources still alive at shutdown"),
    }

    match app.fatal.take() {
        Some(err) => Err(err),
        None => {
            info!("Clean shutdown");
            Ok(())
        }
    }
}
