//! glTF / GLB bytes to a [`SceneGraph`].

use super::AssetError;
use crate::scene::material::{Material, MaterialId, Texture, TextureId};
use crate::scene::{Geometry, GeometryId, NodeId, SceneGraph, Transform};
use glam::{Quat, Vec2, Vec3};
use gltf::image::Format;
use gltf::mesh::Mode;
use image::{DynamicImage, GrayAlphaImage, GrayImage, RgbImage, RgbaImage};
use std::collections::HashMap;
use std::path::Path;

const DRACO_EXTENSION: &str = "KHR_draco_mesh_compression";

/// A parsed model, not yet normalized.
#[derive(Debug)]
pub struct ImportedModel {
    pub scene: SceneGraph,
    pub root: NodeId,
    pub meshes: usize,
    pub materials: usize,
    pub textures: usize,
    /// Primitives left out because their geometry is Draco-compressed.
    pub skipped_primitives: usize,
}

/// Parse `bytes` (GLB or JSON glTF). External buffers and images resolve
/// against `base_dir`.
pub fn import(bytes: &[u8], base_dir: Option<&Path>) -> Result<ImportedModel, AssetError> {
    let gltf::Gltf { document, blob } =
        gltf::Gltf::from_slice_without_validation(bytes).map_err(AssetError::Parse)?;
    // Draco primitives are skipped below, so the extension alone must not
    // fail validation. Everything else is checked before any index is used.
    let mut json = document.into_json();
    json.extensions_required.retain(|name| name != DRACO_EXTENSION);
    let document = gltf::Document::from_json(json).map_err(AssetError::Parse)?;
    let buffers = gltf::import_buffers(&document, base_dir, blob).map_err(AssetError::Parse)?;
    let images = match gltf::import_images(&document, base_dir, &buffers) {
        Ok(images) => images,
        Err(err) => {
            log::warn!("textures unavailable, continuing untextured: {}", err);
            Vec::new()
        }
    };

    let mut builder = Builder {
        scene: SceneGraph::new(),
        buffers: &buffers,
        images: &images,
        materials: HashMap::new(),
        textures: HashMap::new(),
        meshes: 0,
        skipped: 0,
    };
    let root = builder.scene.add_group(None, Some("model".to_string()));

    let gltf_scene = document
        .default_scene()
        .or_else(|| document.scenes().next())
        .ok_or(AssetError::NoGeometry)?;
    let mut stack: Vec<(gltf::Node, NodeId)> =
        gltf_scene.nodes().map(|node| (node, root)).collect();
    stack.reverse();
    while let Some((node, parent)) = stack.pop() {
        let id = builder.add_node(&node, parent);
        let children: Vec<_> = node.children().map(|child| (child, id)).collect();
        stack.extend(children.into_iter().rev());
    }

    let Builder {
        scene,
        materials,
        textures,
        meshes,
        skipped,
        ..
    } = builder;
    if meshes == 0 {
        return Err(if skipped > 0 {
            AssetError::UnsupportedCompression
        } else {
            AssetError::NoGeometry
        });
    }
    if skipped > 0 {
        log::warn!("{} Draco-compressed primitives skipped", skipped);
    }
    Ok(ImportedModel {
        scene,
        root,
        meshes,
        materials: materials.len(),
        textures: textures.len(),
        skipped_primitives: skipped,
    })
}

struct Builder<'a> {
    scene: SceneGraph,
    buffers: &'a [gltf::buffer::Data],
    images: &'a [gltf::image::Data],
    materials: HashMap<Option<usize>, MaterialId>,
    textures: HashMap<usize, Option<TextureId>>,
    meshes: usize,
    skipped: usize,
}

impl Builder<'_> {
    fn add_node(&mut self, node: &gltf::Node, parent: NodeId) -> NodeId {
        let (translation, rotation, scale) = node.transform().decomposed();
        let transform = Transform {
            translation: Vec3::from(translation),
            rotation: Quat::from_array(rotation),
            scale: Vec3::from(scale),
        };
        let name = node
            .name()
            .or_else(|| node.mesh().and_then(|mesh| mesh.name()))
            .map(str::to_string);

        let Some(mesh) = node.mesh() else {
            let id = self.scene.add_group(Some(parent), name);
            self.scene.set_transform(id, transform);
            return id;
        };

        let primitives: Vec<_> = mesh
            .primitives()
            .filter_map(|primitive| self.primitive(&primitive))
            .collect();
        match primitives.as_slice() {
            [(geometry, material)] => {
                let id = self.scene.add_mesh(Some(parent), name, *geometry, *material);
                self.scene.set_transform(id, transform);
                self.meshes += 1;
                id
            }
            _ => {
                // Every part carries the node's name so any of them picks as the unit.
                let group = self.scene.add_group(Some(parent), name.clone());
                self.scene.set_transform(group, transform);
                for (geometry, material) in primitives {
                    self.scene
                        .add_mesh(Some(group), name.clone(), geometry, material);
                    self.meshes += 1;
                }
                group
            }
        }
    }

    fn primitive(
        &mut self,
        primitive: &gltf::Primitive,
    ) -> Option<(GeometryId, MaterialId)> {
        if primitive.extension_value(DRACO_EXTENSION).is_some() {
            self.skipped += 1;
            return None;
        }
        if primitive.mode() != Mode::Triangles {
            log::debug!("skipping {:?} primitive", primitive.mode());
            return None;
        }
        let buffers = self.buffers;
        let reader = primitive.reader(|buffer| buffers.get(buffer.index()).map(|data| data.0.as_slice()));
        let positions: Vec<Vec3> = reader.read_positions()?.map(Vec3::from).collect();
        if positions.is_empty() {
            return None;
        }
        let normals: Vec<Vec3> = reader
            .read_normals()
            .map(|normals| normals.map(Vec3::from).collect())
            .unwrap_or_default();
        let uvs: Vec<Vec2> = reader
            .read_tex_coords(0)
            .map(|uvs| uvs.into_f32().map(Vec2::from).collect())
            .unwrap_or_default();
        let indices: Vec<u32> = match reader.read_indices() {
            Some(indices) => indices.into_u32().collect(),
            None => (0..positions.len() as u32).collect(),
        };
        let geometry = self
            .scene
            .add_geometry(Geometry::new(positions, normals, uvs, indices));
        let material = self.material(&primitive.material());
        Some((geometry, material))
    }

    fn material(&mut self, material: &gltf::Material) -> MaterialId {
        if let Some(id) = self.materials.get(&material.index()) {
            return *id;
        }
        let pbr = material.pbr_metallic_roughness();
        let [r, g, b, a] = pbr.base_color_factor();
        let map = pbr
            .base_color_texture()
            .and_then(|info| self.texture(&info.texture()));
        let template = if material.unlit() {
            Material::basic([r, g, b])
        } else {
            Material::standard([r, g, b])
        };
        let converted = Material {
            name: material.name().map(str::to_string),
            map,
            transparent: material.alpha_mode() == gltf::material::AlphaMode::Blend,
            opacity: a,
            roughness: pbr.roughness_factor(),
            metalness: pbr.metallic_factor(),
            emissive: material.emissive_factor(),
            emissive_intensity: material.emissive_strength().unwrap_or(1.0),
            double_sided: material.double_sided(),
            ..template
        };
        let id = self.scene.materials.insert(converted);
        self.materials.insert(material.index(), id);
        id
    }

    fn texture(&mut self, texture: &gltf::Texture) -> Option<TextureId> {
        let index = texture.source().index();
        if let Some(cached) = self.textures.get(&index) {
            return *cached;
        }
        let converted = self.images.get(index).and_then(|image| {
            let rgba = to_rgba8(image);
            if rgba.is_none() {
                log::warn!("image {} has unsupported format {:?}", index, image.format);
            }
            rgba.map(|rgba| Texture {
                name: texture.source().name().map(str::to_string),
                width: image.width,
                height: image.height,
                rgba,
            })
        });
        let id = converted.map(|texture| self.scene.materials.insert_texture(texture));
        self.textures.insert(index, id);
        id
    }
}

fn to_rgba8(data: &gltf::image::Data) -> Option<Vec<u8>> {
    let (width, height) = (data.width, data.height);
    let pixels = data.pixels.clone();
    let decoded = match data.format {
        Format::R8G8B8A8 => DynamicImage::ImageRgba8(RgbaImage::from_raw(width, height, pixels)?),
        Format::R8G8B8 => DynamicImage::ImageRgb8(RgbImage::from_raw(width, height, pixels)?),
        Format::R8G8 => DynamicImage::ImageLumaA8(GrayAlphaImage::from_raw(width, height, pixels)?),
        Format::R8 => DynamicImage::ImageLuma8(GrayImage::from_raw(width, height, pixels)?),
        _ => return None,
    };
    Some(decoded.into_rgba8().into_raw())
}
