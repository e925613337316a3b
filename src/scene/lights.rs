//! Light rig and shadow-catching ground, both framed from the model bounds.

use super::bounds::{Aabb, BoundingSphere};
use super::material::Material;
use super::{Geometry, NodeId, SceneGraph, Transform};
use crate::config::{GroundConfig, GroundPlacement, LightingConfig};
use glam::{Mat4, Vec3};

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DirectionalLight {
    pub position: Vec3,
    pub target: Vec3,
    pub intensity: f32,
    pub cast_shadow: bool,
    pub shadow_map_size: u32,
    /// Half-size of the orthographic shadow frustum.
    pub shadow_half_extent: f32,
    pub shadow_near: f32,
    pub shadow_far: f32,
    pub shadow_bias: f32,
}

impl DirectionalLight {
    /// Unit vector pointing from the surface toward the light.
    pub fn direction(&self) -> Vec3 {
        (self.position - self.target).try_normalize().unwrap_or(Vec3::Y)
    }

    pub fn shadow_view_projection(&self) -> Mat4 {
        let direction = self.direction();
        let up = if direction.cross(Vec3::Y).length_squared() < 1e-6 {
            Vec3::Z
        } else {
            Vec3::Y
        };
        let view = Mat4::look_at_rh(self.position, self.target, up);
        let e = self.shadow_half_extent;
        let projection = Mat4::orthographic_rh(-e, e, -e, e, self.shadow_near, self.shadow_far);
        projection * view
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LightRig {
    pub ambient: f32,
    pub main: DirectionalLight,
    pub fill: DirectionalLight,
}

impl LightRig {
    /// Lights as they stand before a model has loaded.
    pub fn new(config: &LightingConfig) -> Self {
        Self {
            ambient: config.ambient,
            main: DirectionalLight {
                position: Vec3::new(15.0, 20.0, 15.0),
                target: Vec3::ZERO,
                intensity: config.main_intensity,
                cast_shadow: true,
                shadow_map_size: config.shadow_map_size,
                shadow_half_extent: 30.0,
                shadow_near: 0.5,
                shadow_far: 100.0,
                shadow_bias: config.shadow_bias,
            },
            fill: DirectionalLight {
                position: Vec3::from(config.fill_position),
                target: Vec3::ZERO,
                intensity: config.fill_intensity,
                cast_shadow: false,
                shadow_map_size: 0,
                shadow_half_extent: 0.0,
                shadow_near: 0.5,
                shadow_far: 100.0,
                shadow_bias: 0.0,
            },
        }
    }

    /// Aim the main light at the model and size its shadow frustum to it.
    pub fn frame_model(&mut self, sphere: &BoundingSphere, config: &LightingConfig) {
        if sphere.is_empty() {
            return;
        }
        let r = sphere.radius;
        let offset = Vec3::from(config.main_offset) * r;
        let main = &mut self.main;
        main.position = sphere.center + offset;
        main.target = sphere.center;
        main.shadow_half_extent = (config.shadow_extent * r).max(config.shadow_min_extent);
        main.shadow_far = main
            .shadow_far
            .max(offset.length() + main.shadow_half_extent * 2.0);
    }
}

/// Where the ground plane sits for a given model.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GroundPlane {
    pub center: Vec3,
    pub size: f32,
    pub opacity: f32,
}

impl GroundPlane {
    pub fn place(config: &GroundConfig, bounds: &Aabb) -> Self {
        let (center, size) = match config.placement {
            GroundPlacement::Fixed { size, y } => (Vec3::new(0.0, y, 0.0), size),
            GroundPlacement::Fitted { factor, drop } if !bounds.is_empty() => {
                let extent = bounds.size();
                let middle = bounds.center();
                (
                    Vec3::new(middle.x, bounds.min.y - drop, middle.z),
                    factor * extent.x.max(extent.z),
                )
            }
            GroundPlacement::Fitted { .. } => (Vec3::ZERO, 1.0),
        };
        Self {
            center,
            size,
            opacity: config.opacity,
        }
    }

    pub fn height(&self) -> f32 {
        self.center.y
    }

    /// Add the plane to `scene` as a shadow-only mesh.
    pub fn add_to(&self, scene: &mut SceneGraph) -> NodeId {
        let geometry = scene.add_geometry(Geometry::plane(self.size, self.size));
        let material = scene.materials.insert(Material::shadow_catcher(self.opacity));
        let node = scene.add_mesh(None, Some("ground".to_string()), geometry, material);
        scene.set_transform(
            node,
            Transform {
                translation: self.center,
                ..Transform::IDENTITY
            },
        );
        if let Some(mesh) = scene.mesh_mut(node) {
            mesh.receive_shadow = true;
        }
        node
    }
}
