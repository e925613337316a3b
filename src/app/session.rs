//! One viewer lifecycle: everything built for a single model path, from
//! setup to teardown.

use super::egui_host::EguiFrameOutput;
use super::input::{to_ndc, PointerButton, ViewerEvent};
use super::scheduler::{FrameHandle, FrameScheduler};
use super::timing::interval_for_fps;
use crate::assets::{AssetLoader, LoadEvent, LoadedModel, LoadingProgress};
use crate::config::ViewerConfig;
use crate::render::camera::PerspectiveCamera;
use crate::render::controls::{DragButton, OrbitControls};
use crate::render::intro::CameraRig;
use crate::render::pick::{HighlightChange, PickSystem};
use crate::render::raycast;
use crate::render::tuner::AdaptiveTuner;
use crate::render::{FrameInput, SceneRenderer};
use crate::scene::bounds::BoundingSphere;
use crate::scene::lights::{GroundPlane, LightRig};
use crate::scene::normalize::{normalize_model, NormalizeOptions};
use crate::scene::{Environment, NodeId, SceneGraph};
use glam::{Quat, Vec2};
use rand::rngs::StdRng;
use std::collections::BTreeSet;
use std::path::PathBuf;
use std::time::{Duration, Instant};

/// Window-event subscriptions a session holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Listener {
    Resize,
    PointerMove,
    PointerDown,
    PointerUp,
    Wheel,
    /// Registered once a model is in place.
    DoubleClick,
}

impl Listener {
    fn for_event(event: &ViewerEvent) -> Self {
        match event {
            ViewerEvent::Resized { .. } => Self::Resize,
            ViewerEvent::PointerMoved(_) | ViewerEvent::PointerLeft => Self::PointerMove,
            ViewerEvent::PointerDown { .. } => Self::PointerDown,
            ViewerEvent::PointerUp { .. } => Self::PointerUp,
            ViewerEvent::Wheel(_) => Self::Wheel,
            ViewerEvent::DoubleClick(_) => Self::DoubleClick,
        }
    }
}

#[derive(Debug, Default)]
struct ListenerRegistry {
    active: BTreeSet<Listener>,
}

impl ListenerRegistry {
    fn register(&mut self, listener: Listener) {
        if self.active.insert(listener) {
            log::debug!("listening for {:?}", listener);
        }
    }

    fn is_active(&self, listener: Listener) -> bool {
        self.active.contains(&listener)
    }

    fn remove_all(&mut self) -> usize {
        let count = self.active.len();
        self.active.clear();
        count
    }
}

/// What the overlay shows.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SessionStatus {
    pub loading: LoadingProgress,
    pub model_name: Option<String>,
    pub hovered_unit: Option<u32>,
    pub load_failed: bool,
}

struct ModelState {
    name: String,
    root: NodeId,
    ground: Option<GroundPlane>,
    tuner: Option<AdaptiveTuner>,
}

pub struct ViewerSession<R: SceneRenderer, S: FrameScheduler> {
    id: u64,
    config: ViewerConfig,
    scene: SceneGraph,
    camera: PerspectiveCamera,
    renderer: Option<R>,
    controls: OrbitControls,
    lights: LightRig,
    loader: Option<AssetLoader>,
    listeners: ListenerRegistry,
    scheduler: S,
    rig: CameraRig,
    picking: PickSystem,
    progress: LoadingProgress,
    model: Option<ModelState>,
    load_failed: bool,
    viewport: [u32; 2],
    pointer: Option<Vec2>,
    pending_resize: Option<([u32; 2], Instant)>,
    frame_interval: Duration,
    last_frame: Option<FrameHandle>,
    rng: StdRng,
    torn_down: bool,
}

impl<R: SceneRenderer, S: FrameScheduler> ViewerSession<R, S> {
    /// Build scene, camera, controls, lights, loader and listeners, in that
    /// order, around a renderer the host already bound to its window, and
    /// request the first frame.
    #[allow(clippy::too_many_arguments)]
    pub fn start(
        id: u64,
        config: ViewerConfig,
        model_path: PathBuf,
        viewport: [u32; 2],
        renderer: R,
        scheduler: S,
        rng: StdRng,
        now: Instant,
    ) -> Self {
        log::info!("[session {}] setup for {}", id, model_path.display());
        let scene = SceneGraph::new();
        let aspect = viewport[0].max(1) as f32 / viewport[1].max(1) as f32;
        let camera = PerspectiveCamera::new(&config.camera, aspect);
        let controls = OrbitControls::new(&config.controls);
        let lights = LightRig::new(&config.lighting);

        let mut progress = LoadingProgress::default();
        let mut load_failed = false;
        let loader = match AssetLoader::spawn(model_path, id) {
            Ok(loader) => {
                progress.start();
                Some(loader)
            }
            Err(err) => {
                log::error!("[session {}] {}", id, err);
                load_failed = true;
                None
            }
        };

        let mut listeners = ListenerRegistry::default();
        for listener in [
            Listener::Resize,
            Listener::PointerMove,
            Listener::PointerDown,
            Listener::PointerUp,
            Listener::Wheel,
        ] {
            listeners.register(listener);
        }

        let mut session = Self {
            id,
            rig: CameraRig::new(config.intro, config.idle),
            picking: PickSystem::new(&config.picking),
            config,
            scene,
            camera,
            renderer: Some(renderer),
            controls,
            lights,
            loader,
            listeners,
            scheduler,
            progress,
            model: None,
            load_failed,
            viewport,
            pointer: None,
            pending_resize: None,
            frame_interval: Duration::from_millis(16),
            last_frame: None,
            rng,
            torn_down: false,
        };
        session.last_frame = Some(session.scheduler.request_frame(now));
        session
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn config(&self) -> &ViewerConfig {
        &self.config
    }

    pub fn scene(&self) -> &SceneGraph {
        &self.scene
    }

    pub fn camera(&self) -> &PerspectiveCamera {
        &self.camera
    }

    pub fn controls(&self) -> &OrbitControls {
        &self.controls
    }

    pub fn rig(&self) -> &CameraRig {
        &self.rig
    }

    pub fn picking(&self) -> &PickSystem {
        &self.picking
    }

    pub fn scheduler(&self) -> &S {
        &self.scheduler
    }

    pub fn scheduler_mut(&mut self) -> &mut S {
        &mut self.scheduler
    }

    pub fn is_listening(&self, listener: Listener) -> bool {
        self.listeners.is_active(listener)
    }

    pub fn is_torn_down(&self) -> bool {
        self.torn_down
    }

    /// Full-rate frame interval, used once a model is showing.
    pub fn set_frame_interval(&mut self, interval: Duration) {
        self.frame_interval = interval;
    }

    pub fn status(&self) -> SessionStatus {
        SessionStatus {
            loading: self.progress,
            model_name: self.model.as_ref().map(|model| model.name.clone()),
            hovered_unit: self.picking.hovered_unit(),
            load_failed: self.load_failed,
        }
    }

    pub fn handle_event(&mut self, event: ViewerEvent, now: Instant) {
        if self.torn_down || !self.listeners.is_active(Listener::for_event(&event)) {
            return;
        }
        match event {
            ViewerEvent::Resized { width, height } => match self.config.frame.resize_throttle_ms {
                Some(ms) => {
                    self.pending_resize = Some(([width, height], now + Duration::from_millis(ms)));
                }
                None => self.apply_resize([width, height]),
            },
            ViewerEvent::PointerMoved(position) => {
                self.pointer = Some(position);
                let viewport = Vec2::new(self.viewport[0] as f32, self.viewport[1] as f32);
                self.controls.pointer_move(position, viewport, &self.camera);
            }
            ViewerEvent::PointerLeft => self.pointer = None,
            ViewerEvent::PointerDown { button, position } => {
                self.pointer = Some(position);
                if self.model.is_some() {
                    self.rig.note_user_interaction();
                }
                let button = match button {
                    PointerButton::Primary => DragButton::Rotate,
                    PointerButton::Secondary => DragButton::Pan,
                    PointerButton::Middle => DragButton::Dolly,
                };
                self.controls.pointer_down(button, position);
            }
            ViewerEvent::PointerUp { .. } => {
                if self.controls.pointer_up() {
                    let tuner = self.model.as_ref().and_then(|model| model.tuner.as_ref());
                    if let Some(tuner) = tuner {
                        if tuner.recenter_on_end(&self.camera, &mut self.controls) {
                            log::debug!("orbit target recentered on model");
                        }
                    }
                }
            }
            ViewerEvent::DoubleClick(_) => {
                self.controls.stop();
                self.rig.start_reset(now, &self.camera, &self.controls);
            }
            ViewerEvent::Wheel(lines) => {
                if self.model.is_some() {
                    self.rig.note_user_interaction();
                }
                self.controls.wheel(lines);
            }
        }
    }

    /// Run one frame: load events, pending resize, animation, controls,
    /// tuner, picking, draw, then schedule the next frame.
    pub fn frame(&mut self, now: Instant, overlay: Option<&EguiFrameOutput>) {
        if self.torn_down {
            return;
        }
        self.poll_loader(now);
        if let Some((size, due)) = self.pending_resize {
            if now >= due {
                self.pending_resize = None;
                self.apply_resize(size);
            }
        }
        self.advance(now);
        self.render(overlay);

        let interval = if self.model.is_some() {
            self.frame_interval
        } else {
            interval_for_fps(self.config.frame.preload_fps)
        };
        if let Some(previous) = self.last_frame.take() {
            self.scheduler.cancel_frame(previous);
        }
        self.last_frame = Some(self.scheduler.request_frame(now + interval));
    }

    /// Redraw the current state without advancing it or scheduling a frame.
    /// Used for repaints the scheduler did not ask for.
    pub fn redraw(&mut self, overlay: Option<&EguiFrameOutput>) {
        if self.torn_down {
            return;
        }
        self.render(overlay);
    }

    fn render(&mut self, overlay: Option<&EguiFrameOutput>) {
        let Some(renderer) = self.renderer.as_mut() else {
            return;
        };
        let input = FrameInput {
            scene: &self.scene,
            camera: &self.camera,
            lights: &self.lights,
            lighting: &self.config.lighting,
            overlay,
        };
        if let Err(err) = renderer.render(&input) {
            log::error!("[session {}] frame failed: {}", self.id, err);
        }
    }

    fn apply_resize(&mut self, size: [u32; 2]) {
        if size[0] == 0 || size[1] == 0 {
            return;
        }
        self.viewport = size;
        self.camera.set_viewport(size[0], size[1]);
        if let Some(renderer) = self.renderer.as_mut() {
            renderer.resize(size[0], size[1]);
        }
    }

    fn poll_loader(&mut self, now: Instant) {
        let Some(loader) = self.loader.as_mut() else {
            return;
        };
        for event in loader.poll() {
            self.on_load_event(event, now);
        }
    }

    fn on_load_event(&mut self, event: LoadEvent, now: Instant) {
        match event {
            LoadEvent::Progress { loaded, total } => {
                let before = self.progress.percent();
                self.progress.report(loaded, total);
                let after = self.progress.percent();
                if after / 25 > before / 25 {
                    log::debug!("[session {}] loading {}%", self.id, after);
                }
            }
            LoadEvent::Loaded(model) => {
                self.loader = None;
                self.install_model(model, now);
            }
            LoadEvent::Failed(err) => {
                self.loader = None;
                log::error!("[session {}] model load failed: {}", self.id, err);
                self.progress.clear();
                self.load_failed = true;
            }
        }
    }

    fn install_model(&mut self, loaded: LoadedModel, now: Instant) {
        let LoadedModel { name, model, .. } = loaded;
        if model.skipped_primitives > 0 {
            log::warn!(
                "[session {}] {} Draco-compressed primitives skipped",
                self.id,
                model.skipped_primitives
            );
        }
        let mut previous = std::mem::replace(&mut self.scene, model.scene);
        previous.dispose();
        let root = model.root;

        let normalized = normalize_model(
            &mut self.scene,
            root,
            &NormalizeOptions {
                target_size: self.config.normalize.target_size,
                roughness: self.config.normalize.converted_roughness,
                metalness: self.config.normalize.converted_metalness,
            },
        );

        let ground = self.config.ground.enabled.then(|| {
            let plane = GroundPlane::place(&self.config.ground, &normalized.bounds);
            plane.add_to(&mut self.scene);
            plane
        });
        if self.config.lighting.environment {
            self.scene.environment = Some(Environment::neutral());
        }
        self.lights.frame_model(&normalized.sphere, &self.config.lighting);

        let targets = if self.config.picking.enabled {
            self.picking.register_targets(&mut self.scene, &self.config.picking)
        } else {
            0
        };

        self.rig
            .begin(&normalized.sphere, now, &mut self.camera, &mut self.controls);
        let tuner = self.config.tuner.enabled.then(|| {
            AdaptiveTuner::new(
                self.config.tuner,
                normalized.sphere.center,
                normalized.model_size(),
            )
        });
        self.listeners.register(Listener::DoubleClick);
        if let Some(renderer) = self.renderer.as_mut() {
            renderer.upload_scene(&self.scene);
        }
        self.progress.finish();

        log::info!(
            "[session {}] loaded {}: {} meshes, {} materials, {} textures, {} targets",
            self.id,
            name,
            normalized.meshes,
            model.materials,
            model.textures,
            targets
        );
        log_sphere(self.id, &normalized.sphere);
        self.model = Some(ModelState {
            name,
            root,
            ground,
            tuner,
        });
    }

    fn advance(&mut self, now: Instant) {
        let Some(model) = self.model.as_ref() else {
            return;
        };
        let frame = self.rig.advance(now, &mut self.camera, &mut self.controls);
        if frame.model_spin != 0.0 {
            // The normalized center sits at the origin, so this turns the
            // model in place.
            if let Some(node) = self.scene.node_mut(model.root) {
                node.transform
                    .rotate_about_origin(Quat::from_rotation_y(frame.model_spin));
            }
        }

        let steady = !self.rig.is_intro() && !self.rig.is_resetting();
        if steady {
            self.controls.update(&mut self.camera);
        }
        if self.config.ground.clamp_target {
            if let Some(ground) = model.ground {
                self.controls.target.y = self.controls.target.y.max(ground.height());
            }
        }

        if let (true, Some(tuner)) = (steady, model.tuner.as_ref()) {
            tuner.adjust(&self.camera, &mut self.controls);
            if tuner.should_probe(&mut self.rng) {
                let hit = raycast::raycast_all(&self.scene, &self.camera.forward_ray());
                tuner.apply_probe(&self.camera, &mut self.controls, hit.map(|hit| hit.distance));
            }
        }

        if self.config.picking.enabled && !self.rig.is_intro() {
            let viewport = Vec2::new(self.viewport[0] as f32, self.viewport[1] as f32);
            let hit = self
                .pointer
                .and_then(|pointer| to_ndc(pointer, viewport))
                .and_then(|ndc| self.picking.pick(&self.scene, &self.camera.ray_from_ndc(ndc)));
            match self.picking.update(&mut self.scene, hit, now) {
                Some(HighlightChange::Highlighted { unit, .. }) => log::debug!("hover unit {}", unit),
                Some(HighlightChange::Cleared { .. }) => log::debug!("hover cleared"),
                None => {}
            }
        }
    }

    /// Release everything the session acquired. Later calls do nothing.
    pub fn teardown(&mut self) {
        if self.torn_down {
            return;
        }
        self.torn_down = true;
        let listeners = self.listeners.remove_all();
        if let Some(handle) = self.last_frame.take() {
            self.scheduler.cancel_frame(handle);
        }
        if let Some(mut loader) = self.loader.take() {
            loader.cancel();
        }
        self.controls.dispose();
        if let Some(mut renderer) = self.renderer.take() {
            renderer.dispose();
        }
        self.picking.dispose(&mut self.scene);
        let report = self.scene.dispose();
        self.model = None;
        self.pointer = None;
        self.pending_resize = None;
        self.progress.clear();
        log::info!(
            "[session {}] torn down: {} listeners, {} nodes, {} meshes, {} geometries, {} materials, {} textures, environment {}",
            self.id,
            listeners,
            report.nodes,
            report.meshes,
            report.geometries,
            report.materials,
            report.textures,
            if report.environment { "released" } else { "none" }
        );
    }
}

impl<R: SceneRenderer, S: FrameScheduler> Drop for ViewerSession<R, S> {
    fn drop(&mut self) {
        self.teardown();
    }
}

fn log_sphere(id: u64, sphere: &BoundingSphere) {
    log::debug!(
        "[session {}] bounds center ({:.3}, {:.3}, {:.3}) radius {:.3}",
        id,
        sphere.center.x,
        sphere.center.y,
        sphere.center.z,
        sphere.radius
    );
}

/// Drops model switches that follow the last accepted one too closely.
#[derive(Debug, Clone)]
pub struct SwitchGate {
    window: Duration,
    last: Option<Instant>,
}

impl SwitchGate {
    pub fn new(window: Duration) -> Self {
        Self { window, last: None }
    }

    pub fn accept(&mut self, now: Instant) -> bool {
        if self
            .last
            .is_some_and(|last| now.saturating_duration_since(last) < self.window)
        {
            log::debug!("model switch ignored");
            return false;
        }
        self.last = Some(now);
        log::debug!("model switch accepted");
        true
    }
}
