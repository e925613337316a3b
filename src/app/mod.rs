pub mod egui_host;
pub mod input;
pub mod scheduler;
pub mod session;
pub mod timing;

use crate::config::{Preset, ViewerConfig};
use crate::render::WgpuRenderer;
use crate::route::{resolve_asset, Route};
use crate::ui::{UiAction, UiState};
use egui_host::EguiHost;
use input::{InputState, ViewerEvent};
use rand::rngs::StdRng;
use rand::SeedableRng;
use scheduler::WinitFrameScheduler;
use session::{SwitchGate, ViewerSession};
use timing::FrameTiming;

use glam::Vec2;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};
use winit::application::ApplicationHandler;
use winit::dpi::PhysicalSize;
use winit::event::WindowEvent;
use winit::event_loop::{ActiveEventLoop, ControlFlow, EventLoop};
use winit::keyboard::{KeyCode, PhysicalKey};
use winit::window::{Window, WindowAttributes, WindowId};

const TITLE: &str = "unitview";

/// What the command line asked for.
#[derive(Debug, Clone)]
pub struct LaunchOptions {
    pub route: Route,
    pub model: Option<PathBuf>,
    pub assets_dir: PathBuf,
    pub config_path: Option<PathBuf>,
    /// Overrides the preset the route would pick.
    pub preset: Option<Preset>,
}

type Session = ViewerSession<WgpuRenderer, WinitFrameScheduler>;

pub struct App {
    options: LaunchOptions,
    route: Route,
    model_override: Option<PathBuf>,
    window: Option<Arc<Window>>,
    session: Option<Session>,
    egui: Option<EguiHost>,
    ui: UiState,
    input: InputState,
    timing: FrameTiming,
    switch_gate: SwitchGate,
    next_session_id: u64,
    frame_interval: Duration,
    /// Set when the scheduler's frame came due; other redraws only repaint.
    frame_due: bool,
}

impl App {
    pub fn new(options: LaunchOptions) -> Self {
        Self {
            route: options.route.clone(),
            model_override: options.model.clone(),
            options,
            window: None,
            session: None,
            egui: None,
            ui: UiState::new(),
            input: InputState::default(),
            timing: FrameTiming::new(TITLE.to_string(), Instant::now()),
            switch_gate: SwitchGate::new(Duration::from_millis(500)),
            next_session_id: 1,
            frame_interval: Duration::from_millis(16),
            frame_due: false,
        }
    }

    fn preset(&self) -> Preset {
        self.options.preset.unwrap_or_else(|| self.route.preset())
    }

    fn resolve_config(&self) -> ViewerConfig {
        let preset = self.preset();
        let Some(path) = &self.options.config_path else {
            return preset.config();
        };
        ViewerConfig::load(path, preset).unwrap_or_else(|err| {
            log::error!("{}; using the {} preset", err, preset.label());
            preset.config()
        })
    }

    fn model_path(&self) -> PathBuf {
        self.model_override
            .clone()
            .unwrap_or_else(|| resolve_asset(&self.options.assets_dir, self.route.asset_path()))
    }

    /// Tear down the current session, then build a new one for the current
    /// route or model.
    fn open_session(&mut self, now: Instant) {
        self.close_session();
        let Some(window) = self.window.clone() else {
            return;
        };
        let config = self.resolve_config();
        self.switch_gate = SwitchGate::new(Duration::from_millis(
            config.frame.model_switch_debounce_ms,
        ));
        let renderer = match WgpuRenderer::new(Arc::clone(&window), config.lighting.shadow_map_size) {
            Ok(renderer) => renderer,
            Err(err) => {
                log::error!("renderer creation failed: {}", err);
                return;
            }
        };

        let id = self.next_session_id;
        self.next_session_id += 1;
        let size = window.inner_size();
        let mut session = ViewerSession::start(
            id,
            config,
            self.model_path(),
            [size.width, size.height],
            renderer,
            WinitFrameScheduler::new(),
            StdRng::from_entropy(),
            now,
        );
        session.set_frame_interval(self.frame_interval);
        self.egui = Some(EguiHost::new(&window));
        self.timing
            .set_base_title(format!("{} - {} ({})", TITLE, self.route, self.preset().label()));
        self.session = Some(session);
        window.request_redraw();
    }

    fn close_session(&mut self) {
        if let Some(mut session) = self.session.take() {
            session.teardown();
        }
        self.egui = None;
    }

    fn navigate(&mut self, route: Route, now: Instant) {
        log::info!("navigating to {}", route);
        self.route = route;
        self.model_override = None;
        self.open_session(now);
    }

    fn update_frame_interval(&mut self, window: &Window) {
        self.frame_interval = timing::monitor_frame_interval(window);
        if let Some(session) = self.session.as_mut() {
            session.set_frame_interval(self.frame_interval);
        }
    }

    fn dispatch(&mut self, event: ViewerEvent, now: Instant) {
        let over_ui = self.egui.as_ref().is_some_and(EguiHost::wants_pointer);
        // Releases always reach the viewport so a drag never sticks.
        let blocked = over_ui
            && !matches!(
                event,
                ViewerEvent::PointerUp { .. } | ViewerEvent::Resized { .. } | ViewerEvent::PointerLeft
            );
        if blocked {
            return;
        }
        if let Some(session) = self.session.as_mut() {
            session.handle_event(event, now);
        }
    }

    fn redraw(&mut self, now: Instant) {
        let (Some(window), Some(session), Some(egui)) =
            (self.window.clone(), self.session.as_mut(), self.egui.as_mut())
        else {
            return;
        };
        let status = session.status();
        let route = &self.route;
        let ui = &mut self.ui;
        let mut actions = Vec::new();
        let overlay = egui.run_ui(&window, |ctx| {
            actions = ui.show(ctx, &status, route);
        });
        let frame_start = Instant::now();
        if std::mem::take(&mut self.frame_due) {
            session.frame(now, Some(&overlay));
        } else {
            session.redraw(Some(&overlay));
        }
        self.timing
            .set_render_ms(frame_start.elapsed().as_secs_f32() * 1000.0);
        self.timing.update_title(&window, now);

        for action in actions {
            self.handle_ui_action(action, now);
        }
    }

    fn handle_ui_action(&mut self, action: UiAction, now: Instant) {
        match action {
            UiAction::Back => self.navigate(Route::Showcase, now),
            UiAction::SelectVariant(variant) => {
                if self.switch_gate.accept(now) {
                    let route = self.route.with_variant(variant);
                    self.navigate(route, now);
                }
            }
            UiAction::OpenModel => {
                let Some(path) = rfd::FileDialog::new()
                    .add_filter("glTF", &["glb", "gltf"])
                    .pick_file()
                else {
                    return;
                };
                log::info!("opening {}", path.display());
                self.model_override = Some(path);
                self.open_session(Instant::now());
            }
        }
    }
}

impl ApplicationHandler for App {
    fn resumed(&mut self, event_loop: &ActiveEventLoop) {
        if self.window.is_some() {
            return;
        }

        let window_attrs = WindowAttributes::default()
            .with_title(TITLE)
            .with_inner_size(PhysicalSize::new(1280u32, 720u32))
            .with_resizable(true);

        let window = match event_loop.create_window(window_attrs) {
            Ok(window) => Arc::new(window),
            Err(err) => {
                log::error!("window creation failed: {}", err);
                event_loop.exit();
                return;
            }
        };
        log::info!(
            "window created: {}x{}",
            window.inner_size().width,
            window.inner_size().height
        );
        self.update_frame_interval(&window);
        self.window = Some(window);
        self.open_session(Instant::now());
    }

    fn window_event(
        &mut self,
        event_loop: &ActiveEventLoop,
        _window_id: WindowId,
        event: WindowEvent,
    ) {
        let now = Instant::now();
        if let (Some(window), Some(egui)) = (self.window.as_ref(), self.egui.as_mut()) {
            egui.on_window_event(window, &event);
        }

        match event {
            WindowEvent::CloseRequested => {
                self.close_session();
                event_loop.exit();
            }
            WindowEvent::KeyboardInput { event, .. } => {
                if event.physical_key == PhysicalKey::Code(KeyCode::Escape) {
                    self.close_session();
                    event_loop.exit();
                }
            }
            WindowEvent::Resized(size) => {
                self.dispatch(
                    ViewerEvent::Resized {
                        width: size.width,
                        height: size.height,
                    },
                    now,
                );
                if let Some(window) = self.window.clone() {
                    self.update_frame_interval(&window);
                }
            }
            WindowEvent::Moved(_) => {
                if let Some(window) = self.window.clone() {
                    self.update_frame_interval(&window);
                }
            }
            WindowEvent::CursorMoved { position, .. } => {
                let event = self
                    .input
                    .cursor_moved(Vec2::new(position.x as f32, position.y as f32));
                self.dispatch(event, now);
            }
            WindowEvent::CursorLeft { .. } => {
                let event = self.input.cursor_left();
                self.dispatch(event, now);
            }
            WindowEvent::MouseInput { state, button, .. } => {
                for event in self.input.mouse_input(button, state, now) {
                    self.dispatch(event, now);
                }
            }
            WindowEvent::MouseWheel { delta, .. } => {
                let event = self.input.wheel(delta);
                self.dispatch(event, now);
            }
            WindowEvent::PinchGesture { delta, .. } => {
                let event = self.input.pinch(delta);
                self.dispatch(event, now);
            }
            WindowEvent::Touch(touch) => {
                let position = Vec2::new(touch.location.x as f32, touch.location.y as f32);
                for event in self.input.touch(touch.id, touch.phase, position, now) {
                    self.dispatch(event, now);
                }
            }
            WindowEvent::RedrawRequested => self.redraw(now),
            _ => {}
        }
    }

    fn about_to_wait(&mut self, event_loop: &ActiveEventLoop) {
        let now = Instant::now();
        let Some(session) = self.session.as_mut() else {
            event_loop.set_control_flow(ControlFlow::Wait);
            return;
        };
        let scheduler = session.scheduler_mut();
        if scheduler.take_due(now).is_some() {
            self.frame_due = true;
            if let Some(window) = &self.window {
                window.request_redraw();
            }
        }
        let flow = match scheduler.deadline() {
            Some(deadline) => ControlFlow::WaitUntil(deadline),
            None => ControlFlow::Wait,
        };
        event_loop.set_control_flow(flow);
    }
}

pub fn run(options: LaunchOptions) -> Result<(), winit::error::EventLoopError> {
    log::info!("unitview: opening {}", options.route);
    log::info!("   Press ESC or close window to exit");

    let event_loop = EventLoop::new()?;
    event_loop.set_control_flow(ControlFlow::Wait);

    let mut app = App::new(options);
    event_loop.run_app(&mut app)?;
    app.close_session();
    Ok(())
}
