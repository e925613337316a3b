use crate::config::CameraConfig;
use crate::render::raycast::Ray;
use glam::{Mat3, Mat4, Quat, Vec2, Vec3};

/// Right-handed perspective camera looking down its local -Z.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PerspectiveCamera {
    pub position: Vec3,
    pub orientation: Quat,
    pub fov_y_deg: f32,
    pub aspect: f32,
    pub near: f32,
    pub far: f32,
}

impl PerspectiveCamera {
    pub fn new(config: &CameraConfig, aspect: f32) -> Self {
        Self {
            position: Vec3::new(0.0, 0.0, 5.0),
            orientation: Quat::IDENTITY,
            fov_y_deg: config.fov_deg,
            aspect: sanitize_aspect(aspect),
            near: config.near,
            far: config.far,
        }
    }

    pub fn set_viewport(&mut self, width: u32, height: u32) {
        if width == 0 || height == 0 {
            return;
        }
        self.aspect = sanitize_aspect(width as f32 / height as f32);
    }

    /// Turn to face `point`, keeping +Y as up.
    pub fn look_at(&mut self, point: Vec3) {
        let Some(forward) = (point - self.position).try_normalize() else {
            return;
        };
        let up = if forward.cross(Vec3::Y).length_squared() < 1e-8 {
            Vec3::Z
        } else {
            Vec3::Y
        };
        let right = forward.cross(up).normalize();
        let true_up = right.cross(forward);
        self.orientation = Quat::from_mat3(&Mat3::from_cols(right, true_up, -forward));
    }

    pub fn forward(&self) -> Vec3 {
        self.orientation * Vec3::NEG_Z
    }

    pub fn right(&self) -> Vec3 {
        self.orientation * Vec3::X
    }

    pub fn up(&self) -> Vec3 {
        self.orientation * Vec3::Y
    }

    pub fn world_matrix(&self) -> Mat4 {
        Mat4::from_rotation_translation(self.orientation, self.position)
    }

    pub fn view_matrix(&self) -> Mat4 {
        self.world_matrix().inverse()
    }

    pub fn projection_matrix(&self) -> Mat4 {
        Mat4::perspective_rh(self.fov_y_deg.to_radians(), self.aspect, self.near, self.far)
    }

    pub fn view_projection(&self) -> Mat4 {
        self.projection_matrix() * self.view_matrix()
    }

    /// Ray from the camera through a point in normalized device coordinates
    /// (`x` right, `y` up, both in `[-1, 1]`).
    pub fn ray_from_ndc(&self, ndc: Vec2) -> Ray {
        let inverse = self.view_projection().inverse();
        let on_plane = inverse.project_point3(Vec3::new(ndc.x, ndc.y, 0.5));
        let direction = (on_plane - self.position)
            .try_normalize()
            .unwrap_or_else(|| self.forward());
        Ray::new(self.position, direction)
    }

    pub fn forward_ray(&self) -> Ray {
        Ray::new(self.position, self.forward())
    }
}

fn sanitize_aspect(aspect: f32) -> f32 {
    if aspect.is_finite() && aspect > 0.0 {
        aspect
    } else {
        1.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn camera() -> PerspectiveCamera {
        PerspectiveCamera::new(&CameraConfig::default(), 1.5)
    }

    #[test]
    fn look_at_points_forward_at_target() {
        let mut camera = camera();
        camera.position = Vec3::new(4.0, 3.0, 5.0);
        camera.look_at(Vec3::ZERO);
        let expected = (Vec3::ZERO - camera.position).normalize();
        assert!((camera.forward() - expected).length() < 1e-5);
        assert!(camera.up().y > 0.0);
    }

    #[test]
    fn look_straight_down_stays_finite() {
        let mut camera = camera();
        camera.position = Vec3::new(0.0, 10.0, 0.0);
        camera.look_at(Vec3::ZERO);
        assert!((camera.forward() - Vec3::NEG_Y).length() < 1e-5);
        assert!(camera.view_matrix().is_finite());
    }

    #[test]
    fn center_ray_matches_forward() {
        let mut camera = camera();
        camera.position = Vec3::new(0.0, 2.0, 10.0);
        camera.look_at(Vec3::new(0.0, 2.0, 0.0));
        let ray = camera.ray_from_ndc(Vec2::ZERO);
        assert!((ray.direction - camera.forward()).length() < 1e-4);
        assert_eq!(ray.origin, camera.position);
    }

    #[test]
    fn off_center_ray_leans_toward_its_side() {
        let mut camera = camera();
        camera.look_at(Vec3::ZERO);
        let ray = camera.ray_from_ndc(Vec2::new(1.0, 0.0));
        assert!(ray.direction.x > 0.0);
        let half_fov = (camera.fov_y_deg.to_radians() * 0.5).tan() * camera.aspect;
        assert!((ray.direction.x / -ray.direction.z - half_fov).abs() < 1e-3);
    }

    #[test]
    fn zero_viewport_keeps_previous_aspect() {
        let mut camera = camera();
        camera.set_viewport(0, 100);
        assert_eq!(camera.aspect, 1.5);
        camera.set_viewport(200, 100);
        assert_eq!(camera.aspect, 2.0);
    }
}
