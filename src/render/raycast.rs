use crate::scene::bounds::BoundingSphere;
use crate::scene::{NodeId, SceneGraph};
use glam::{Mat4, Vec3};

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Ray {
    pub origin: Vec3,
    /// Unit length.
    pub direction: Vec3,
}

impl Ray {
    pub fn new(origin: Vec3, direction: Vec3) -> Self {
        Self {
            origin,
            direction: direction.normalize_or_zero(),
        }
    }

    pub fn at(&self, distance: f32) -> Vec3 {
        self.origin + self.direction * distance
    }

    pub fn hits_sphere(&self, sphere: &BoundingSphere) -> bool {
        if sphere.is_empty() {
            return false;
        }
        let to_center = sphere.center - self.origin;
        let along = to_center.dot(self.direction);
        let radius_sq = sphere.radius * sphere.radius;
        let dist_sq = to_center.length_squared() - along * along;
        if dist_sq > radius_sq {
            return false;
        }
        // Behind the origin and the origin is outside the sphere.
        !(along < 0.0 && to_center.length_squared() > radius_sq)
    }

    /// Möller–Trumbore, both faces. Returns the ray parameter of the hit.
    pub fn intersect_triangle(&self, a: Vec3, b: Vec3, c: Vec3) -> Option<f32> {
        const EPSILON: f32 = 1e-7;
        let edge1 = b - a;
        let edge2 = c - a;
        let p = self.direction.cross(edge2);
        let det = edge1.dot(p);
        if det.abs() < EPSILON {
            return None;
        }
        let inv_det = 1.0 / det;
        let s = self.origin - a;
        let u = s.dot(p) * inv_det;
        if !(0.0..=1.0).contains(&u) {
            return None;
        }
        let q = s.cross(edge1);
        let v = self.direction.dot(q) * inv_det;
        if v < 0.0 || u + v > 1.0 {
            return None;
        }
        let t = edge2.dot(q) * inv_det;
        (t > EPSILON).then_some(t)
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RayHit {
    pub node: NodeId,
    pub distance: f32,
    pub point: Vec3,
}

/// Nearest hit on one mesh node, given its world matrix.
pub fn raycast_mesh(scene: &SceneGraph, node: NodeId, world: &Mat4, ray: &Ray) -> Option<RayHit> {
    let mesh = scene.node(node)?.mesh()?;
    let geometry = scene.geometry(mesh.geometry)?;
    if !ray.hits_sphere(&geometry.bounding_sphere().transformed(world)) {
        return None;
    }
    let inverse = world.inverse();
    let local = Ray {
        origin: inverse.transform_point3(ray.origin),
        direction: inverse.transform_vector3(ray.direction),
    };
    let mut nearest: Option<f32> = None;
    for index in 0..geometry.triangle_count() {
        let Some([a, b, c]) = geometry.triangle(index) else {
            continue;
        };
        // `local.direction` is not normalized, so `t` stays a world distance.
        if let Some(t) = local.intersect_triangle(a, b, c) {
            if nearest.map_or(true, |best| t < best) {
                nearest = Some(t);
            }
        }
    }
    nearest.map(|distance| RayHit {
        node,
        distance,
        point: ray.at(distance),
    })
}

/// Nearest hit among `nodes`.
pub fn raycast<I>(scene: &SceneGraph, nodes: I, ray: &Ray) -> Option<RayHit>
where
    I: IntoIterator<Item = NodeId>,
{
    let world = scene.world_matrices();
    nodes
        .into_iter()
        .filter_map(|node| {
            let matrix = world.get(node.index())?;
            raycast_mesh(scene, node, matrix, ray)
        })
        .min_by(|a, b| a.distance.total_cmp(&b.distance))
}

/// Nearest hit among every mesh in the scene.
pub fn raycast_all(scene: &SceneGraph, ray: &Ray) -> Option<RayHit> {
    let world = scene.world_matrices();
    scene
        .meshes()
        .into_iter()
        .filter_map(|(node, _, _)| raycast_mesh(scene, node, &world[node.index()], ray))
        .min_by(|a, b| a.distance.total_cmp(&b.distance))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scene::material::Material;
    use crate::scene::{Geometry, Transform};

    fn quad_at(scene: &mut SceneGraph, z: f32, name: &str) -> NodeId {
        let geometry = scene.add_geometry(Geometry::new(
            vec![
                Vec3::new(-1.0, -1.0, 0.0),
                Vec3::new(1.0, -1.0, 0.0),
                Vec3::new(1.0, 1.0, 0.0),
                Vec3::new(-1.0, 1.0, 0.0),
            ],
            Vec::new(),
            Vec::new(),
            vec![0, 1, 2, 0, 2, 3],
        ));
        let material = scene.materials.insert(Material::standard([1.0; 3]));
        let node = scene.add_mesh(None, Some(name.to_string()), geometry, material);
        scene.set_transform(
            node,
            Transform {
                translation: Vec3::new(0.0, 0.0, z),
                ..Transform::IDENTITY
            },
        );
        node
    }

    #[test]
    fn triangle_hit_distance() {
        let ray = Ray::new(Vec3::new(0.2, 0.2, 5.0), Vec3::NEG_Z);
        let t = ray.intersect_triangle(
            Vec3::new(-1.0, -1.0, 0.0),
            Vec3::new(1.0, -1.0, 0.0),
            Vec3::new(0.0, 1.0, 0.0),
        );
        assert!(t.is_some_and(|t| (t - 5.0).abs() < 1e-5));
    }

    #[test]
    fn miss_outside_triangle() {
        let ray = Ray::new(Vec3::new(3.0, 0.0, 5.0), Vec3::NEG_Z);
        let t = ray.intersect_triangle(
            Vec3::new(-1.0, -1.0, 0.0),
            Vec3::new(1.0, -1.0, 0.0),
            Vec3::new(0.0, 1.0, 0.0),
        );
        assert!(t.is_none());
    }

    #[test]
    fn nearest_of_stacked_meshes_wins() {
        let mut scene = SceneGraph::new();
        let far = quad_at(&mut scene, -3.0, "far");
        let near = quad_at(&mut scene, 1.0, "near");
        let ray = Ray::new(Vec3::new(0.0, 0.0, 10.0), Vec3::NEG_Z);

        let hit = raycast(&scene, [far, near], &ray);
        assert_eq!(hit.map(|h| h.node), Some(near));
        assert!(hit.is_some_and(|h| (h.distance - 9.0).abs() < 1e-4));

        let only_far = raycast(&scene, [far], &ray);
        assert_eq!(only_far.map(|h| h.node), Some(far));
        assert_eq!(raycast_all(&scene, &ray).map(|h| h.node), Some(near));
    }

    #[test]
    fn scaled_mesh_reports_world_distance() {
        let mut scene = SceneGraph::new();
        let node = quad_at(&mut scene, 0.0, "scaled");
        scene.set_transform(
            node,
            Transform {
                scale: Vec3::splat(4.0),
                ..Transform::IDENTITY
            },
        );
        let ray = Ray::new(Vec3::new(3.0, 0.0, 6.0), Vec3::NEG_Z);
        let hit = raycast(&scene, [node], &ray);
        assert!(hit.is_some_and(|h| (h.distance - 6.0).abs() < 1e-4));
    }
}
