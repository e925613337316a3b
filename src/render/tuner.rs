//! Distance-driven control feel.
//!
//! Far from the model the controls behave normally; closer in, rotation and
//! panning slow down and damping grows so the camera lags deliberately. When
//! the orbit target gets very close the pivot drifts to a point ahead of the
//! camera, which turns orbiting into looking around from inside a room.

use crate::config::{ControlFeel, TunerConfig};
use crate::render::camera::PerspectiveCamera;
use crate::render::controls::OrbitControls;
use glam::Vec3;
use rand::Rng;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DistanceBand {
    Far,
    Mid,
    Close,
    VeryClose,
    Inside,
}

impl DistanceBand {
    fn index(self) -> usize {
        match self {
            Self::Far => 0,
            Self::Mid => 1,
            Self::Close => 2,
            Self::VeryClose => 3,
            Self::Inside => 4,
        }
    }
}

#[derive(Debug, Clone)]
pub struct AdaptiveTuner {
    config: TunerConfig,
    center: Vec3,
    model_size: f32,
}

impl AdaptiveTuner {
    pub fn new(config: TunerConfig, center: Vec3, model_size: f32) -> Self {
        Self {
            config,
            center,
            model_size,
        }
    }

    pub fn center(&self) -> Vec3 {
        self.center
    }

    fn threshold(&self, index: usize) -> f32 {
        self.model_size * self.config.band_fractions[index]
    }

    pub fn band(&self, distance_to_center: f32) -> DistanceBand {
        if distance_to_center > self.threshold(0) {
            DistanceBand::Far
        } else if distance_to_center > self.threshold(1) {
            DistanceBand::Mid
        } else if distance_to_center > self.threshold(2) {
            DistanceBand::Close
        } else if distance_to_center > self.threshold(3) {
            DistanceBand::VeryClose
        } else {
            DistanceBand::Inside
        }
    }

    pub fn feel(&self, band: DistanceBand) -> ControlFeel {
        self.config.bands[band.index()]
    }

    /// Retune the controls for the camera's current distance and pull the
    /// pivot forward when it is about to be reached.
    pub fn adjust(&self, camera: &PerspectiveCamera, controls: &mut OrbitControls) -> DistanceBand {
        let to_center = camera.position.distance(self.center);
        let to_target = camera.position.distance(controls.target);
        let band = self.band(to_center);
        controls.apply_feel(&self.feel(band));

        if to_target < self.threshold(2) * self.config.repivot_fraction {
            let ahead = to_target.max(self.config.repivot_min_distance);
            let pivot = camera.position + camera.forward() * ahead;
            controls.target = controls.target.lerp(pivot, self.config.repivot_lerp);
        }
        band
    }

    /// Roll the per-frame dice for the forward probe.
    pub fn should_probe<R: Rng>(&self, rng: &mut R) -> bool {
        rng.gen::<f32>() < self.config.probe_chance
    }

    /// Ease the target toward what the forward ray hit, or back toward the
    /// model when the hit is far away. `hit_distance` is the nearest hit
    /// along the camera's forward ray; with no hit nothing changes.
    pub fn apply_probe(
        &self,
        camera: &PerspectiveCamera,
        controls: &mut OrbitControls,
        hit_distance: Option<f32>,
    ) {
        let Some(hit) = hit_distance else {
            return;
        };
        let to_target = camera.position.distance(controls.target);
        let to_center = camera.position.distance(self.center);
        let near_wall = hit < self.config.probe_wall_distance;

        if near_wall || hit < to_target * self.config.probe_target_fraction {
            let ahead = (hit * self.config.probe_step).min(to_target);
            let pivot = camera.position + camera.forward() * ahead;
            let lerp = if near_wall {
                self.config.probe_wall_lerp
            } else {
                self.config.probe_lerp
            };
            controls.target = controls.target.lerp(pivot, lerp);
        } else if hit > to_center * self.config.probe_far_factor {
            controls.target = controls.target.lerp(self.center, self.config.probe_center_lerp);
        }
    }

    /// After a gesture: snap the pivot home if the camera sits much closer to
    /// the model than to its own target. Returns whether it snapped.
    pub fn recenter_on_end(&self, camera: &PerspectiveCamera, controls: &mut OrbitControls) -> bool {
        if !self.config.recenter_on_end {
            return false;
        }
        let to_center = camera.position.distance(self.center);
        let to_target = camera.position.distance(controls.target);
        if to_center < to_target * 0.5 {
            controls.target = self.center;
            return true;
        }
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{CameraConfig, ControlsConfig};
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn tuner() -> AdaptiveTuner {
        AdaptiveTuner::new(TunerConfig::default(), Vec3::ZERO, 10.0)
    }

    fn camera_at(position: Vec3, looking_at: Vec3) -> PerspectiveCamera {
        let mut camera = PerspectiveCamera::new(&CameraConfig::default(), 1.0);
        camera.position = position;
        camera.look_at(looking_at);
        camera
    }

    #[test]
    fn bands_follow_thresholds() {
        let tuner = tuner();
        assert_eq!(tuner.band(20.0), DistanceBand::Far);
        assert_eq!(tuner.band(6.0), DistanceBand::Mid);
        assert_eq!(tuner.band(3.0), DistanceBand::Close);
        assert_eq!(tuner.band(1.5), DistanceBand::VeryClose);
        assert_eq!(tuner.band(0.5), DistanceBand::Inside);
    }

    #[test]
    fn closer_bands_are_slower_and_heavier() {
        let tuner = tuner();
        let bands = [
            DistanceBand::Far,
            DistanceBand::Mid,
            DistanceBand::Close,
            DistanceBand::VeryClose,
            DistanceBand::Inside,
        ];
        for pair in bands.windows(2) {
            let (outer, inner) = (tuner.feel(pair[0]), tuner.feel(pair[1]));
            assert!(inner.rotate_speed < outer.rotate_speed);
            assert!(inner.damping > outer.damping);
            assert!(inner.pan_speed < outer.pan_speed);
        }
    }

    #[test]
    fn adjust_applies_band_feel() {
        let tuner = tuner();
        let camera = camera_at(Vec3::new(0.0, 0.0, 1.5), Vec3::ZERO);
        let mut controls = OrbitControls::new(&ControlsConfig::default());
        controls.target = Vec3::new(0.0, 0.0, -5.0);
        let band = tuner.adjust(&camera, &mut controls);
        assert_eq!(band, DistanceBand::VeryClose);
        assert_eq!(controls.rotate_speed, 0.4);
        assert_eq!(controls.damping, 0.25);
    }

    #[test]
    fn close_target_drifts_ahead_of_camera() {
        let tuner = tuner();
        let camera = camera_at(Vec3::new(0.0, 0.0, 5.0), Vec3::new(0.0, 0.0, 4.0));
        let mut controls = OrbitControls::new(&ControlsConfig::default());
        controls.target = Vec3::new(0.0, 0.0, 4.9);
        tuner.adjust(&camera, &mut controls);
        let pivot = Vec3::new(0.0, 0.0, 5.0 - 0.6);
        let expected = Vec3::new(0.0, 0.0, 4.9).lerp(pivot, 0.06);
        assert!((controls.target - expected).length() < 1e-5);
    }

    #[test]
    fn probe_near_wall_moves_target_slowly() {
        let tuner = tuner();
        let camera = camera_at(Vec3::new(0.0, 0.0, 10.0), Vec3::ZERO);
        let mut controls = OrbitControls::new(&ControlsConfig::default());
        tuner.apply_probe(&camera, &mut controls, Some(1.0));
        let pivot = Vec3::new(0.0, 0.0, 10.0 - 0.7);
        let expected = Vec3::ZERO.lerp(pivot, 0.03);
        assert!((controls.target - expected).length() < 1e-5);
    }

    #[test]
    fn probe_far_hit_eases_back_to_center() {
        let tuner = tuner();
        let camera = camera_at(Vec3::new(0.0, 0.0, 4.0), Vec3::new(0.0, 0.0, 2.0));
        let mut controls = OrbitControls::new(&ControlsConfig::default());
        controls.target = Vec3::new(0.0, 0.0, 2.0);
        tuner.apply_probe(&camera, &mut controls, Some(50.0));
        let expected = Vec3::new(0.0, 0.0, 2.0).lerp(Vec3::ZERO, 0.03);
        assert!((controls.target - expected).length() < 1e-5);

        let before = controls.target;
        tuner.apply_probe(&camera, &mut controls, None);
        assert_eq!(controls.target, before);
    }

    #[test]
    fn probe_chance_is_rare() {
        let tuner = tuner();
        let mut rng = StdRng::seed_from_u64(7);
        let hits = (0..10_000).filter(|_| tuner.should_probe(&mut rng)).count();
        assert!((100..=300).contains(&hits), "{hits}");
    }

    #[test]
    fn recenter_when_camera_hugs_model() {
        let tuner = tuner();
        let camera = camera_at(Vec3::new(0.0, 0.0, 1.0), Vec3::new(0.0, 0.0, -10.0));
        let mut controls = OrbitControls::new(&ControlsConfig::default());
        controls.target = Vec3::new(0.0, 0.0, -10.0);
        assert!(tuner.recenter_on_end(&camera, &mut controls));
        assert_eq!(controls.target, Vec3::ZERO);
        assert!(!tuner.recenter_on_end(&camera, &mut controls));
    }
}
