//! Orbit / pan / zoom around a movable target point.
//!
//! Input accumulates into pending deltas; [`OrbitControls::update`] applies a
//! damped share of them each frame and writes the camera pose.

use crate::config::{ControlFeel, ControlsConfig};
use crate::render::camera::PerspectiveCamera;
use glam::{Vec2, Vec3};
use std::f32::consts::PI;

const EPS: f32 = 1e-6;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DragButton {
    Rotate,
    Dolly,
    Pan,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Gesture {
    Idle,
    Drag(DragButton),
}

#[derive(Debug, Clone)]
pub struct OrbitControls {
    pub target: Vec3,
    pub enabled: bool,
    pub damping: f32,
    pub rotate_speed: f32,
    pub pan_speed: f32,
    pub zoom_speed: f32,
    pub min_distance: f32,
    pub max_distance: f32,
    pub min_polar: f32,
    pub max_polar: f32,
    pub screen_space_panning: bool,
    delta_theta: f32,
    delta_phi: f32,
    scale: f32,
    pan_offset: Vec3,
    gesture: Gesture,
    last_pointer: Vec2,
}

impl OrbitControls {
    pub fn new(config: &ControlsConfig) -> Self {
        Self {
            target: Vec3::ZERO,
            enabled: true,
            damping: config.damping,
            rotate_speed: config.rotate_speed,
            pan_speed: config.pan_speed,
            zoom_speed: config.zoom_speed,
            min_distance: config.min_distance,
            max_distance: config.max_distance,
            min_polar: config.min_polar,
            max_polar: config.max_polar,
            screen_space_panning: config.screen_space_panning,
            delta_theta: 0.0,
            delta_phi: 0.0,
            scale: 1.0,
            pan_offset: Vec3::ZERO,
            gesture: Gesture::Idle,
            last_pointer: Vec2::ZERO,
        }
    }

    pub fn apply_feel(&mut self, feel: &ControlFeel) {
        self.rotate_speed = feel.rotate_speed;
        self.damping = feel.damping;
        self.pan_speed = feel.pan_speed;
    }

    pub fn is_dragging(&self) -> bool {
        self.gesture != Gesture::Idle
    }

    /// Begin a drag. Returns `true` when a gesture starts.
    pub fn pointer_down(&mut self, button: DragButton, pointer: Vec2) -> bool {
        if !self.enabled {
            return false;
        }
        self.gesture = Gesture::Drag(button);
        self.last_pointer = pointer;
        true
    }

    /// Feed a pointer position in physical pixels.
    pub fn pointer_move(&mut self, pointer: Vec2, viewport: Vec2, camera: &PerspectiveCamera) {
        let delta = pointer - self.last_pointer;
        self.last_pointer = pointer;
        if !self.enabled || viewport.y <= 0.0 {
            return;
        }
        let Gesture::Drag(button) = self.gesture else {
            return;
        };
        match button {
            DragButton::Rotate => {
                let rotate = delta * self.rotate_speed;
                self.rotate_left(2.0 * PI * rotate.x / viewport.y);
                self.rotate_up(2.0 * PI * rotate.y / viewport.y);
            }
            DragButton::Pan => self.pan(delta * self.pan_speed, viewport, camera),
            DragButton::Dolly => {
                if delta.y > 0.0 {
                    self.dolly_out(self.zoom_scale());
                } else if delta.y < 0.0 {
                    self.dolly_in(self.zoom_scale());
                }
            }
        }
    }

    /// End the drag. Returns `true` when a gesture ends.
    pub fn pointer_up(&mut self) -> bool {
        let was_dragging = self.is_dragging();
        self.gesture = Gesture::Idle;
        was_dragging && self.enabled
    }

    /// Scroll by `lines`; positive moves toward the target. Fractional
    /// lines (trackpads, pinches) dolly proportionally less.
    pub fn wheel(&mut self, lines: f32) -> bool {
        if !self.enabled || lines == 0.0 {
            return false;
        }
        let scale = self.zoom_scale().powf(lines.abs());
        if lines > 0.0 {
            self.dolly_in(scale);
        } else {
            self.dolly_out(scale);
        }
        true
    }

    fn zoom_scale(&self) -> f32 {
        0.95f32.powf(self.zoom_speed)
    }

    fn rotate_left(&mut self, angle: f32) {
        self.delta_theta -= angle;
    }

    fn rotate_up(&mut self, angle: f32) {
        self.delta_phi -= angle;
    }

    fn dolly_in(&mut self, scale: f32) {
        self.scale *= scale;
    }

    fn dolly_out(&mut self, scale: f32) {
        self.scale /= scale;
    }

    fn pan(&mut self, delta: Vec2, viewport: Vec2, camera: &PerspectiveCamera) {
        let distance = (camera.position - self.target).length()
            * (camera.fov_y_deg.to_radians() * 0.5).tan();
        let left = camera.right() * (-2.0 * delta.x * distance / viewport.y);
        let up_axis = if self.screen_space_panning {
            camera.up()
        } else {
            Vec3::Y.cross(camera.right()).normalize_or_zero()
        };
        let up = up_axis * (2.0 * delta.y * distance / viewport.y);
        self.pan_offset += left + up;
    }

    /// Apply pending input and write the camera pose. Returns whether the
    /// camera moved.
    pub fn update(&mut self, camera: &mut PerspectiveCamera) -> bool {
        let before_position = camera.position;
        let before_orientation = camera.orientation;

        let offset = camera.position - self.target;
        let radius = offset.length();
        let mut theta = offset.x.atan2(offset.z);
        let mut phi = if radius > EPS {
            (offset.y / radius).clamp(-1.0, 1.0).acos()
        } else {
            0.0
        };

        let share = if self.damping > 0.0 { self.damping } else { 1.0 };
        theta += self.delta_theta * share;
        phi += self.delta_phi * share;
        phi = phi
            .clamp(self.min_polar, self.max_polar)
            .clamp(EPS, PI - EPS);

        let radius = (radius * self.scale).clamp(self.min_distance, self.max_distance);
        self.target += self.pan_offset * share;

        let sin_phi = phi.sin();
        let offset = Vec3::new(
            radius * sin_phi * theta.sin(),
            radius * phi.cos(),
            radius * sin_phi * theta.cos(),
        );
        camera.position = self.target + offset;
        camera.look_at(self.target);

        if self.damping > 0.0 {
            self.delta_theta *= 1.0 - self.damping;
            self.delta_phi *= 1.0 - self.damping;
            self.pan_offset *= 1.0 - self.damping;
        } else {
            self.delta_theta = 0.0;
            self.delta_phi = 0.0;
            self.pan_offset = Vec3::ZERO;
        }
        self.scale = 1.0;

        camera.position.distance_squared(before_position) > EPS
            || 8.0 * (1.0 - camera.orientation.dot(before_orientation).abs()) > EPS
    }

    /// Drop any gesture and the motion still being damped out.
    pub fn stop(&mut self) {
        self.gesture = Gesture::Idle;
        self.delta_theta = 0.0;
        self.delta_phi = 0.0;
        self.pan_offset = Vec3::ZERO;
        self.scale = 1.0;
    }

    pub fn dispose(&mut self) {
        self.stop();
        self.enabled = false;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::CameraConfig;

    fn rig() -> (OrbitControls, PerspectiveCamera) {
        let mut camera = PerspectiveCamera::new(&CameraConfig::default(), 1.0);
        camera.position = Vec3::new(0.0, 0.0, 10.0);
        camera.look_at(Vec3::ZERO);
        let controls = OrbitControls::new(&ControlsConfig {
            max_polar: PI,
            ..ControlsConfig::default()
        });
        (controls, camera)
    }

    fn settle(controls: &mut OrbitControls, camera: &mut PerspectiveCamera) {
        for _ in 0..600 {
            controls.update(camera);
        }
    }

    #[test]
    fn wheel_zooms_by_zoom_scale() {
        let (mut controls, mut camera) = rig();
        controls.damping = 0.0;
        assert!(controls.wheel(1.0));
        controls.update(&mut camera);
        let expected = 10.0 * 0.95f32.powf(controls.zoom_speed);
        assert!((camera.position.length() - expected).abs() < 1e-4);
    }

    #[test]
    fn half_line_zooms_half_as_far() {
        let (mut controls, mut camera) = rig();
        controls.damping = 0.0;
        assert!(controls.wheel(0.5));
        controls.update(&mut camera);
        let expected = 10.0 * 0.95f32.powf(controls.zoom_speed * 0.5);
        assert!((camera.position.length() - expected).abs() < 1e-4);
    }

    #[test]
    fn distance_is_clamped() {
        let (mut controls, mut camera) = rig();
        controls.damping = 0.0;
        for _ in 0..100 {
            controls.wheel(-1.0);
        }
        controls.update(&mut camera);
        assert!((camera.position.length() - controls.max_distance).abs() < 1e-4);
    }

    #[test]
    fn drag_rotates_and_damping_spreads_it_over_frames() {
        let (mut controls, mut camera) = rig();
        let viewport = Vec2::new(800.0, 600.0);
        assert!(controls.pointer_down(DragButton::Rotate, Vec2::new(400.0, 300.0)));
        controls.pointer_move(Vec2::new(460.0, 300.0), viewport, &camera);
        assert!(controls.pointer_up());

        controls.update(&mut camera);
        let first = camera.position;
        settle(&mut controls, &mut camera);
        let total_theta = first.x.atan2(first.z);
        let final_theta = camera.position.x.atan2(camera.position.z);
        assert!(final_theta.abs() > total_theta.abs());
        let expected = -2.0 * PI * 60.0 * controls.rotate_speed / 600.0;
        assert!((final_theta - expected).abs() < 1e-3);
        assert!((camera.position.length() - 10.0).abs() < 1e-3);
    }

    #[test]
    fn polar_angle_respects_limit() {
        let (mut controls, mut camera) = rig();
        controls.max_polar = PI / 2.35;
        controls.damping = 0.0;
        let viewport = Vec2::new(800.0, 600.0);
        controls.pointer_down(DragButton::Rotate, Vec2::ZERO);
        controls.pointer_move(Vec2::new(0.0, -2000.0), viewport, &camera);
        controls.update(&mut camera);
        let phi = (camera.position.y / camera.position.length()).acos();
        assert!(phi <= PI / 2.35 + 1e-4);
    }

    #[test]
    fn pan_moves_target_and_camera_together() {
        let (mut controls, mut camera) = rig();
        controls.damping = 0.0;
        let viewport = Vec2::new(800.0, 600.0);
        controls.pointer_down(DragButton::Pan, Vec2::ZERO);
        controls.pointer_move(Vec2::new(100.0, 0.0), viewport, &camera);
        controls.update(&mut camera);
        assert!(controls.target.x < 0.0);
        assert!(((camera.position - controls.target).length() - 10.0).abs() < 1e-3);
    }

    #[test]
    fn disabled_controls_ignore_input() {
        let (mut controls, mut camera) = rig();
        controls.enabled = false;
        assert!(!controls.pointer_down(DragButton::Rotate, Vec2::ZERO));
        assert!(!controls.wheel(3.0));
        controls.update(&mut camera);
        assert!((camera.position - Vec3::new(0.0, 0.0, 10.0)).length() < 1e-4);
    }
}
