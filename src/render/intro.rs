//! Camera choreography: the one-shot intro, the double-click reset and the
//! idle motion that runs until the user first touches the controls.

use crate::config::{IdleConfig, IdleMode, IntroConfig, IntroPath};
use crate::render::camera::PerspectiveCamera;
use crate::render::controls::OrbitControls;
use crate::scene::bounds::BoundingSphere;
use glam::Vec3;
use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Easing {
    Linear,
    EaseOutCubic,
    EaseInOutQuad,
}

impl Easing {
    pub fn apply(self, t: f32) -> f32 {
        let t = t.clamp(0.0, 1.0);
        match self {
            Self::Linear => t,
            Self::EaseOutCubic => 1.0 - (1.0 - t).powi(3),
            Self::EaseInOutQuad => {
                if t < 0.5 {
                    2.0 * t * t
                } else {
                    -1.0 + (4.0 - 2.0 * t) * t
                }
            }
        }
    }
}

/// Elapsed fraction of `duration` since `start`, clamped to `[0, 1]`.
pub fn progress(start: Instant, now: Instant, duration: Duration) -> f32 {
    if duration.is_zero() {
        return 1.0;
    }
    let elapsed = now.saturating_duration_since(start).as_secs_f32();
    (elapsed / duration.as_secs_f32()).clamp(0.0, 1.0)
}

/// Camera path resolved against a concrete bounding sphere.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum IntroPlan {
    Linear {
        from: Vec3,
        to: Vec3,
    },
    Orbit {
        center: Vec3,
        radius: f32,
        height: f32,
        start_angle: f32,
        end_angle: f32,
    },
}

impl IntroPlan {
    pub fn resolve(path: &IntroPath, sphere: &BoundingSphere) -> Self {
        let c = sphere.center;
        let r = sphere.radius.max(0.0);
        match *path {
            IntroPath::Linear {
                start_offset,
                end_offset,
            } => Self::Linear {
                from: c + Vec3::from(start_offset) * r,
                to: c + Vec3::from(end_offset) * r,
            },
            IntroPath::Orbit {
                radius,
                height,
                start_angle,
                end_angle,
            } => Self::Orbit {
                center: c,
                radius: radius * r,
                height: c.y + height * r,
                start_angle,
                end_angle,
            },
        }
    }

    /// Camera position at eased progress `t`.
    pub fn position(&self, t: f32) -> Vec3 {
        match *self {
            Self::Linear { from, to } => from.lerp(to, t),
            Self::Orbit {
                start_angle,
                end_angle,
                ..
            } => self.orbit_position(start_angle + (end_angle - start_angle) * t),
        }
    }

    pub fn orbit_position(&self, angle: f32) -> Vec3 {
        match *self {
            Self::Linear { to, .. } => to,
            Self::Orbit {
                center,
                radius,
                height,
                ..
            } => Vec3::new(
                center.x + radius * angle.sin(),
                height,
                center.z + radius * angle.cos(),
            ),
        }
    }

    fn end_angle(&self) -> f32 {
        match *self {
            Self::Linear { .. } => 0.0,
            Self::Orbit { end_angle, .. } => end_angle,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum IntroState {
    /// Nothing loaded yet.
    Waiting,
    Intro { started: Instant },
    Steady { since: Instant },
}

#[derive(Debug, Clone, Copy, PartialEq)]
struct ResetAnimation {
    started: Instant,
    from_position: Vec3,
    from_target: Vec3,
    to_position: Vec3,
    to_target: Vec3,
    resume_auto_rotate: bool,
}

#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct RigFrame {
    /// Intro progress before easing, while the intro runs.
    pub intro_progress: Option<f32>,
    /// Set on exactly one frame: the one where the intro reached 1.
    pub intro_completed: bool,
    pub reset_completed: bool,
    /// Radians to turn the model about +Y this frame.
    pub model_spin: f32,
}

/// Owns where the camera goes when the user is not steering it.
#[derive(Debug, Clone)]
pub struct CameraRig {
    intro: IntroConfig,
    idle: IdleConfig,
    state: IntroState,
    plan: Option<IntroPlan>,
    center: Vec3,
    last_progress: f32,
    reset_position: Vec3,
    reset_target: Vec3,
    reset: Option<ResetAnimation>,
    auto_rotate: bool,
    user_interacted: bool,
    last_tick: Option<Instant>,
}

impl CameraRig {
    pub fn new(intro: IntroConfig, idle: IdleConfig) -> Self {
        Self {
            intro,
            idle,
            state: IntroState::Waiting,
            plan: None,
            center: Vec3::ZERO,
            last_progress: 0.0,
            reset_position: Vec3::ZERO,
            reset_target: Vec3::ZERO,
            reset: None,
            auto_rotate: true,
            user_interacted: false,
            last_tick: None,
        }
    }

    /// Place the camera at the start of the intro and enter `Intro`.
    pub fn begin(
        &mut self,
        sphere: &BoundingSphere,
        now: Instant,
        camera: &mut PerspectiveCamera,
        controls: &mut OrbitControls,
    ) {
        let plan = IntroPlan::resolve(&self.intro.path, sphere);
        self.center = sphere.center;
        self.plan = Some(plan);
        camera.position = plan.position(0.0);
        camera.look_at(self.center);
        controls.target = self.center;
        controls.enabled = false;
        self.reset_position = camera.position;
        self.reset_target = self.center;
        self.last_progress = 0.0;
        self.user_interacted = false;
        self.auto_rotate = true;
        self.reset = None;
        self.state = IntroState::Intro { started: now };
        self.last_tick = Some(now);
    }

    pub fn state(&self) -> IntroState {
        self.state
    }

    pub fn center(&self) -> Vec3 {
        self.center
    }

    pub fn is_intro(&self) -> bool {
        matches!(self.state, IntroState::Intro { .. })
    }

    pub fn is_resetting(&self) -> bool {
        self.reset.is_some()
    }

    pub fn user_interacted(&self) -> bool {
        self.user_interacted
    }

    pub fn auto_rotating(&self) -> bool {
        self.auto_rotate && !self.user_interacted
    }

    pub fn reset_pose(&self) -> (Vec3, Vec3) {
        (self.reset_position, self.reset_target)
    }

    /// Pointer-down, wheel or touch on the viewport. Idle motion stops for good.
    pub fn note_user_interaction(&mut self) {
        if !self.user_interacted {
            log::debug!("user interaction: idle motion off");
        }
        self.user_interacted = true;
        self.auto_rotate = false;
    }

    /// Animate back to the stored reset pose.
    pub fn start_reset(&mut self, now: Instant, camera: &PerspectiveCamera, controls: &OrbitControls) {
        if self.plan.is_none() {
            return;
        }
        log::info!("resetting view");
        let resume_auto_rotate = self
            .reset
            .map(|reset| reset.resume_auto_rotate)
            .unwrap_or(self.auto_rotate);
        self.auto_rotate = false;
        self.reset = Some(ResetAnimation {
            started: now,
            from_position: camera.position,
            from_target: controls.target,
            to_position: self.reset_position,
            to_target: self.reset_target,
            resume_auto_rotate,
        });
        self.user_interacted = true;
    }

    /// Advance intro, reset and idle motion for one frame.
    pub fn advance(
        &mut self,
        now: Instant,
        camera: &mut PerspectiveCamera,
        controls: &mut OrbitControls,
    ) -> RigFrame {
        let mut frame = RigFrame::default();
        let dt = self
            .last_tick
            .map(|last| now.saturating_duration_since(last).as_secs_f32())
            .unwrap_or(0.0);
        self.last_tick = Some(now);
        let Some(plan) = self.plan else {
            return frame;
        };

        match self.state {
            IntroState::Waiting => {}
            IntroState::Intro { started } => {
                let duration = Duration::from_secs_f32(self.intro.duration_secs.max(0.0));
                let t = progress(started, now, duration).max(self.last_progress);
                self.last_progress = t;
                let eased = self.intro.easing.apply(t);
                camera.position = plan.position(eased);
                if matches!(plan, IntroPlan::Orbit { .. }) {
                    controls.target = controls.target.lerp(self.center, eased);
                }
                camera.look_at(self.center);
                frame.intro_progress = Some(t);
                if t >= 1.0 {
                    controls.enabled = true;
                    self.reset_position = camera.position;
                    self.auto_rotate = true;
                    self.state = IntroState::Steady { since: now };
                    frame.intro_completed = true;
                    log::info!("intro complete");
                } else {
                    controls.enabled = false;
                }
            }
            IntroState::Steady { since } => {
                if self.auto_rotating() {
                    match self.idle.mode {
                        IdleMode::SpinModel => frame.model_spin = self.idle.rate * dt,
                        IdleMode::OrbitCamera => {
                            let elapsed = now.saturating_duration_since(since).as_secs_f32();
                            let angle = plan.end_angle() + elapsed * self.idle.rate;
                            camera.position = plan.orbit_position(angle);
                            camera.look_at(self.center);
                        }
                    }
                }
            }
        }

        if let Some(reset) = self.reset {
            let duration = Duration::from_secs_f32(self.intro.reset_duration_secs.max(0.0));
            let t = progress(reset.started, now, duration);
            let eased = Easing::EaseOutCubic.apply(t);
            camera.position = reset.from_position.lerp(reset.to_position, eased);
            controls.target = reset.from_target.lerp(reset.to_target, eased);
            camera.look_at(controls.target);
            if t >= 1.0 {
                self.auto_rotate = reset.resume_auto_rotate;
                self.reset = None;
                frame.reset_completed = true;
            }
        }
        frame
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{CameraConfig, ControlsConfig, ViewerConfig};

    fn fixtures(config: &ViewerConfig) -> (CameraRig, PerspectiveCamera, OrbitControls) {
        (
            CameraRig::new(config.intro, config.idle),
            PerspectiveCamera::new(&CameraConfig::default(), 16.0 / 9.0),
            OrbitControls::new(&ControlsConfig::default()),
        )
    }

    fn sphere() -> BoundingSphere {
        BoundingSphere {
            center: Vec3::ZERO,
            radius: 10.0,
        }
    }

    #[test]
    fn easing_curves_hit_endpoints() {
        for easing in [Easing::Linear, Easing::EaseOutCubic, Easing::EaseInOutQuad] {
            assert_eq!(easing.apply(0.0), 0.0);
            assert!((easing.apply(1.0) - 1.0).abs() < 1e-6);
            assert_eq!(easing.apply(2.0), easing.apply(1.0));
        }
        assert!((Easing::EaseInOutQuad.apply(0.5) - 0.5).abs() < 1e-6);
        assert!(Easing::EaseOutCubic.apply(0.5) > 0.5);
    }

    #[test]
    fn intro_progress_is_monotonic_and_enables_controls_once() {
        let config = ViewerConfig::showcase();
        let (mut rig, mut camera, mut controls) = fixtures(&config);
        let t0 = Instant::now();
        rig.begin(&sphere(), t0, &mut camera, &mut controls);
        assert!(!controls.enabled);

        let mut last = 0.0;
        let mut completions = 0;
        for step in 0..40 {
            let frame = rig.advance(t0 + Duration::from_millis(step * 50), &mut camera, &mut controls);
            if let Some(p) = frame.intro_progress {
                assert!(p >= last && (0.0..=1.0).contains(&p));
                last = p;
                if p < 1.0 {
                    assert!(!controls.enabled);
                }
            }
            if frame.intro_completed {
                completions += 1;
            }
        }
        assert_eq!(completions, 1);
        assert!(controls.enabled);
        assert!(matches!(rig.state(), IntroState::Steady { .. }));
    }

    #[test]
    fn linear_intro_ends_at_end_offset() {
        let config = ViewerConfig::showcase();
        let (mut rig, mut camera, mut controls) = fixtures(&config);
        let t0 = Instant::now();
        rig.begin(&sphere(), t0, &mut camera, &mut controls);
        assert!((camera.position - Vec3::new(0.0, 4.0, 13.0)).length() < 1e-4);
        rig.advance(t0 + Duration::from_secs(2), &mut camera, &mut controls);
        assert!((camera.position - Vec3::new(0.0, 5.0, 16.0)).length() < 1e-4);
        assert_eq!(rig.reset_pose().0, camera.position);
    }

    #[test]
    fn showcase_idle_spins_model_until_interaction() {
        let config = ViewerConfig::showcase();
        let (mut rig, mut camera, mut controls) = fixtures(&config);
        let t0 = Instant::now();
        rig.begin(&sphere(), t0, &mut camera, &mut controls);
        rig.advance(t0 + Duration::from_secs(2), &mut camera, &mut controls);
        let frame = rig.advance(t0 + Duration::from_secs(3), &mut camera, &mut controls);
        assert!((frame.model_spin - 0.06).abs() < 1e-5);

        rig.note_user_interaction();
        let frame = rig.advance(t0 + Duration::from_secs(4), &mut camera, &mut controls);
        assert_eq!(frame.model_spin, 0.0);
        assert!(!rig.auto_rotating());
    }

    #[test]
    fn orbit_idle_continues_from_intro_end() {
        let config = ViewerConfig::individual();
        let (mut rig, mut camera, mut controls) = fixtures(&config);
        let t0 = Instant::now();
        rig.begin(&sphere(), t0, &mut camera, &mut controls);
        let end = t0 + Duration::from_millis(1500);
        rig.advance(end, &mut camera, &mut controls);
        let settled = camera.position;
        rig.advance(end + Duration::from_millis(16), &mut camera, &mut controls);
        assert!((camera.position - settled).length() < 0.1);
        assert!((camera.position.y - 7.0).abs() < 1e-4);
    }

    #[test]
    fn reset_returns_to_stored_pose() {
        let config = ViewerConfig::showcase();
        let (mut rig, mut camera, mut controls) = fixtures(&config);
        let t0 = Instant::now();
        rig.begin(&sphere(), t0, &mut camera, &mut controls);
        rig.advance(t0 + Duration::from_secs(2), &mut camera, &mut controls);
        let (home, home_target) = rig.reset_pose();

        camera.position = Vec3::new(3.0, 8.0, -4.0);
        controls.target = Vec3::new(1.0, 1.0, 1.0);
        let t1 = t0 + Duration::from_secs(5);
        rig.start_reset(t1, &camera, &controls);
        assert!(rig.is_resetting());
        let frame = rig.advance(t1 + Duration::from_millis(1000), &mut camera, &mut controls);
        assert!(frame.reset_completed);
        assert!((camera.position - home).length() < 1e-4);
        assert!((controls.target - home_target).length() < 1e-4);
        assert!(!rig.is_resetting());
    }
}
