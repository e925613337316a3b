use glam::{Mat4, Vec3};

/// Axis-aligned bounding box. An empty box has `min > max` on every axis.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Aabb {
    pub min: Vec3,
    pub max: Vec3,
}

impl Aabb {
    pub const EMPTY: Self = Self {
        min: Vec3::splat(f32::INFINITY),
        max: Vec3::splat(f32::NEG_INFINITY),
    };

    pub fn new(min: Vec3, max: Vec3) -> Self {
        Self { min, max }
    }

    pub fn from_points<I>(points: I) -> Self
    where
        I: IntoIterator<Item = Vec3>,
    {
        let mut aabb = Self::EMPTY;
        for point in points {
            aabb.expand_point(point);
        }
        aabb
    }

    pub fn is_empty(&self) -> bool {
        self.min.x > self.max.x || self.min.y > self.max.y || self.min.z > self.max.z
    }

    pub fn expand_point(&mut self, point: Vec3) {
        self.min = self.min.min(point);
        self.max = self.max.max(point);
    }

    pub fn union(&self, other: &Aabb) -> Aabb {
        if other.is_empty() {
            return *self;
        }
        if self.is_empty() {
            return *other;
        }
        Aabb::new(self.min.min(other.min), self.max.max(other.max))
    }

    pub fn center(&self) -> Vec3 {
        if self.is_empty() {
            return Vec3::ZERO;
        }
        (self.min + self.max) * 0.5
    }

    pub fn size(&self) -> Vec3 {
        if self.is_empty() {
            return Vec3::ZERO;
        }
        self.max - self.min
    }

    /// Largest of the three edge lengths.
    pub fn max_extent(&self) -> f32 {
        self.size().max_element()
    }

    /// Transform the eight corners and re-fit.
    pub fn transformed(&self, matrix: &Mat4) -> Aabb {
        if self.is_empty() {
            return *self;
        }
        let corners = [
            Vec3::new(self.min.x, self.min.y, self.min.z),
            Vec3::new(self.max.x, self.min.y, self.min.z),
            Vec3::new(self.min.x, self.max.y, self.min.z),
            Vec3::new(self.max.x, self.max.y, self.min.z),
            Vec3::new(self.min.x, self.min.y, self.max.z),
            Vec3::new(self.max.x, self.min.y, self.max.z),
            Vec3::new(self.min.x, self.max.y, self.max.z),
            Vec3::new(self.max.x, self.max.y, self.max.z),
        ];
        Aabb::from_points(corners.iter().map(|corner| matrix.transform_point3(*corner)))
    }

    /// Sphere enclosing the box (center of the box, half diagonal).
    pub fn bounding_sphere(&self) -> BoundingSphere {
        if self.is_empty() {
            return BoundingSphere::EMPTY;
        }
        BoundingSphere {
            center: self.center(),
            radius: self.size().length() * 0.5,
        }
    }
}

impl Default for Aabb {
    fn default() -> Self {
        Self::EMPTY
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BoundingSphere {
    pub center: Vec3,
    pub radius: f32,
}

impl BoundingSphere {
    pub const EMPTY: Self = Self {
        center: Vec3::ZERO,
        radius: -1.0,
    };

    pub fn is_empty(&self) -> bool {
        self.radius < 0.0
    }

    pub fn from_points(points: &[Vec3], center: Vec3) -> Self {
        if points.is_empty() {
            return Self::EMPTY;
        }
        let radius_sq = points
            .iter()
            .map(|point| point.distance_squared(center))
            .fold(0.0f32, f32::max);
        Self {
            center,
            radius: radius_sq.sqrt(),
        }
    }

    /// Conservative world-space sphere under an affine transform.
    pub fn transformed(&self, matrix: &Mat4) -> BoundingSphere {
        if self.is_empty() {
            return *self;
        }
        let (scale, _, _) = matrix.to_scale_rotation_translation();
        BoundingSphere {
            center: matrix.transform_point3(self.center),
            radius: self.radius * scale.abs().max_element(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_box_reports_zero_size() {
        let aabb = Aabb::EMPTY;
        assert!(aabb.is_empty());
        assert_eq!(aabb.size(), Vec3::ZERO);
        assert!(aabb.bounding_sphere().is_empty());
    }

    #[test]
    fn union_ignores_empty_side() {
        let a = Aabb::new(Vec3::splat(-1.0), Vec3::splat(1.0));
        assert_eq!(a.union(&Aabb::EMPTY), a);
        assert_eq!(Aabb::EMPTY.union(&a), a);
    }

    #[test]
    fn sphere_encloses_box_corners() {
        let aabb = Aabb::new(Vec3::new(-1.0, -2.0, -3.0), Vec3::new(3.0, 2.0, 1.0));
        let sphere = aabb.bounding_sphere();
        assert!((sphere.center - Vec3::new(1.0, 0.0, -1.0)).length() < 1e-6);
        assert!((sphere.radius - (4.0f32 * 4.0 * 3.0).sqrt() * 0.5).abs() < 1e-5);
    }

    #[test]
    fn transformed_box_follows_scale_and_translation() {
        let aabb = Aabb::new(Vec3::splat(-1.0), Vec3::splat(1.0));
        let matrix = Mat4::from_scale_rotation_translation(
            Vec3::splat(2.0),
            glam::Quat::IDENTITY,
            Vec3::new(5.0, 0.0, 0.0),
        );
        let moved = aabb.transformed(&matrix);
        assert!((moved.min - Vec3::new(3.0, -2.0, -2.0)).length() < 1e-6);
        assert!((moved.max - Vec3::new(7.0, 2.0, 2.0)).length() < 1e-6);
    }
}
