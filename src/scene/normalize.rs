//! Bring a freshly loaded model into a canonical frame.
//!
//! The model root is rescaled so its bounding-box diagonal equals a target
//! size, rotation is cleared, and it is translated so the box is centered on
//! the origin. The box is measured again after every transform change, so the
//! reported bounds always describe the geometry as it now sits.

use super::bounds::{Aabb, BoundingSphere};
use super::material::{Material, MaterialId, MaterialKind};
use super::{NodeId, SceneGraph, Transform};
use glam::{Quat, Vec3};
use std::collections::HashMap;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct NormalizeOptions {
    /// Length of the box diagonal after scaling.
    pub target_size: f32,
    /// Roughness given to materials converted from unlit.
    pub roughness: f32,
    pub metalness: f32,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct NormalizedModel {
    pub bounds: Aabb,
    pub sphere: BoundingSphere,
    pub scale: f32,
    pub meshes: usize,
    pub converted_materials: usize,
}

impl NormalizedModel {
    /// Longest box edge; the reference length for distance bands.
    pub fn model_size(&self) -> f32 {
        self.bounds.max_extent()
    }
}

pub fn normalize_model(
    scene: &mut SceneGraph,
    root: NodeId,
    options: &NormalizeOptions,
) -> NormalizedModel {
    let ids = scene.descendants(root);
    let mut meshes = 0;
    for id in &ids {
        let Some(mesh) = scene.mesh_mut(*id) else {
            continue;
        };
        mesh.cast_shadow = true;
        mesh.receive_shadow = true;
        let geometry = mesh.geometry;
        if let Some(geometry) = scene.geometry_mut(geometry) {
            geometry.compute_bounds();
        }
        meshes += 1;
    }
    let converted_materials = convert_basic_materials(scene, &ids, options);

    scene.set_transform(root, Transform::IDENTITY);
    let raw = scene.subtree_bounds(root);
    let diagonal = raw.size().length();
    let scale = if diagonal > f32::EPSILON {
        options.target_size / diagonal
    } else {
        1.0
    };

    let mut transform = Transform {
        translation: Vec3::ZERO,
        rotation: Quat::IDENTITY,
        scale: Vec3::splat(scale),
    };
    scene.set_transform(root, transform);
    let scaled = scene.subtree_bounds(root);
    transform.translation = -scaled.center();
    scene.set_transform(root, transform);

    let bounds = scene.subtree_bounds(root);
    log::debug!(
        "normalized model: {} meshes, scale {:.4}, size {:?}",
        meshes,
        scale,
        bounds.size()
    );
    NormalizedModel {
        bounds,
        sphere: bounds.bounding_sphere(),
        scale,
        meshes,
        converted_materials,
    }
}

/// Swap every unlit material under `ids` for a lit equivalent.
///
/// Meshes that shared an unlit material share the same converted one. A
/// material that is already lit is left untouched, so running this twice
/// changes nothing the second time.
pub fn convert_basic_materials(
    scene: &mut SceneGraph,
    ids: &[NodeId],
    options: &NormalizeOptions,
) -> usize {
    let mut replaced: HashMap<MaterialId, MaterialId> = HashMap::new();
    for id in ids {
        let Some(current) = scene.node(*id).and_then(|node| node.mesh()).map(|m| m.material) else {
            continue;
        };
        let is_basic = scene
            .materials
            .get(current)
            .is_some_and(Material::is_basic);
        if !is_basic {
            continue;
        }
        let converted = match replaced.get(&current) {
            Some(converted) => *converted,
            None => {
                let Some(basic) = scene.materials.get(current) else {
                    continue;
                };
                let lit = lit_from_basic(basic, options);
                let converted = scene.materials.insert(lit);
                replaced.insert(current, converted);
                converted
            }
        };
        if let Some(mesh) = scene.mesh_mut(*id) {
            mesh.material = converted;
        }
    }
    for old in replaced.keys() {
        scene.materials.dispose(*old);
    }
    replaced.len()
}

fn lit_from_basic(basic: &Material, options: &NormalizeOptions) -> Material {
    Material {
        name: basic.name.clone(),
        kind: MaterialKind::Standard,
        color: basic.color,
        map: basic.map,
        transparent: basic.transparent,
        opacity: basic.opacity,
        roughness: options.roughness,
        metalness: options.metalness,
        double_sided: basic.double_sided,
        ..Material::standard(basic.color)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scene::material::Texture;
    use crate::scene::Geometry;

    const OPTIONS: NormalizeOptions = NormalizeOptions {
        target_size: 15.0,
        roughness: 0.7,
        metalness: 0.0,
    };

    fn offset_model() -> (SceneGraph, NodeId, NodeId) {
        let mut scene = SceneGraph::new();
        let root = scene.add_group(None, Some("model".to_string()));
        let geometry = scene.add_geometry(Geometry::new(
            vec![
                Vec3::new(10.0, 0.0, 0.0),
                Vec3::new(14.0, 0.0, 0.0),
                Vec3::new(10.0, 3.0, 0.0),
            ],
            Vec::new(),
            Vec::new(),
            vec![0, 1, 2],
        ));
        let map = scene.materials.insert_texture(Texture {
            name: None,
            width: 1,
            height: 1,
            rgba: vec![0, 0, 0, 255],
        });
        let material = scene.materials.insert(Material {
            map: Some(map),
            transparent: true,
            opacity: 0.4,
            ..Material::basic([0.2, 0.4, 0.6])
        });
        let child = scene.add_group(Some(root), None);
        scene.set_transform(
            child,
            Transform {
                rotation: Quat::from_rotation_y(0.3),
                ..Transform::IDENTITY
            },
        );
        let mesh = scene.add_mesh(Some(child), Some("Mesh1_5".to_string()), geometry, material);
        (scene, root, mesh)
    }

    #[test]
    fn model_is_centered_and_scaled_to_target_diagonal() {
        let (mut scene, root, _) = offset_model();
        scene.set_transform(
            root,
            Transform {
                rotation: Quat::from_rotation_x(0.5),
                ..Transform::IDENTITY
            },
        );
        let normalized = normalize_model(&mut scene, root, &OPTIONS);
        assert!(normalized.sphere.center.length() < 1e-4);
        assert!((normalized.bounds.size().length() - 15.0).abs() < 1e-3);
        let root_transform = scene.node(root).map(|n| n.transform.rotation);
        assert_eq!(root_transform, Some(Quat::IDENTITY));
    }

    #[test]
    fn meshes_get_shadow_flags() {
        let (mut scene, root, mesh) = offset_model();
        normalize_model(&mut scene, root, &OPTIONS);
        let mesh = scene.node(mesh).and_then(|n| n.mesh()).copied();
        assert!(mesh.is_some_and(|m| m.cast_shadow && m.receive_shadow));
    }

    #[test]
    fn basic_material_becomes_lit_and_keeps_appearance() {
        let (mut scene, root, mesh) = offset_model();
        let before = scene.node(mesh).and_then(|n| n.mesh()).map(|m| m.material);
        let normalized = normalize_model(&mut scene, root, &OPTIONS);
        assert_eq!(normalized.converted_materials, 1);

        let after = scene.node(mesh).and_then(|n| n.mesh()).map(|m| m.material);
        assert_ne!(before, after);
        let material = after.and_then(|id| scene.materials.get(id)).cloned();
        let Some(material) = material else {
            panic!("converted material missing");
        };
        assert_eq!(material.kind, MaterialKind::Standard);
        assert_eq!(material.color, [0.2, 0.4, 0.6]);
        assert!(material.map.is_some());
        assert!(material.transparent);
        assert!((material.opacity - 0.4).abs() < 1e-6);
        assert!((material.roughness - 0.7).abs() < 1e-6);
        assert_eq!(material.metalness, 0.0);
        assert_eq!(scene.materials.live_textures(), 1);
    }

    #[test]
    fn conversion_is_idempotent() {
        let (mut scene, root, mesh) = offset_model();
        normalize_model(&mut scene, root, &OPTIONS);
        let first = scene.node(mesh).and_then(|n| n.mesh()).map(|m| m.material);
        let ids = scene.descendants(root);
        assert_eq!(convert_basic_materials(&mut scene, &ids, &OPTIONS), 0);
        let second = scene.node(mesh).and_then(|n| n.mesh()).map(|m| m.material);
        assert_eq!(first, second);
    }

    #[test]
    fn shared_basic_material_converts_once() {
        let (mut scene, root, mesh) = offset_model();
        let Some(shared) = scene.node(mesh).and_then(|n| n.mesh()).copied() else {
            panic!("mesh missing");
        };
        let twin = scene.add_mesh(Some(root), None, shared.geometry, shared.material);
        let ids = scene.descendants(root);
        assert_eq!(convert_basic_materials(&mut scene, &ids, &OPTIONS), 1);
        let a = scene.node(mesh).and_then(|n| n.mesh()).map(|m| m.material);
        let b = scene.node(twin).and_then(|n| n.mesh()).map(|m| m.material);
        assert_eq!(a, b);
        assert_eq!(scene.materials.live_materials(), 1);
    }
}
