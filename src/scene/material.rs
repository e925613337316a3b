/// Handle to a material owned by a [`MaterialLibrary`].
///
/// Two meshes holding the same id share the same material instance; swapping a
/// mesh's id and later putting the old id back restores the exact instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct MaterialId(u32);

impl MaterialId {
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TextureId(u32);

impl TextureId {
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MaterialKind {
    /// Unlit, flat colored.
    Basic,
    /// Lit with roughness/metalness.
    Standard,
    /// Draws only the shadows it receives.
    ShadowCatcher,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Material {
    pub name: Option<String>,
    pub kind: MaterialKind,
    pub color: [f32; 3],
    pub map: Option<TextureId>,
    pub transparent: bool,
    pub opacity: f32,
    pub roughness: f32,
    pub metalness: f32,
    pub emissive: [f32; 3],
    pub emissive_intensity: f32,
    pub double_sided: bool,
    /// Pull fragments toward the camera to win depth ties against coplanar geometry.
    pub depth_bias: bool,
}

impl Material {
    pub fn standard(color: [f32; 3]) -> Self {
        Self {
            name: None,
            kind: MaterialKind::Standard,
            color,
            map: None,
            transparent: false,
            opacity: 1.0,
            roughness: 1.0,
            metalness: 0.0,
            emissive: [0.0, 0.0, 0.0],
            emissive_intensity: 1.0,
            double_sided: false,
            depth_bias: false,
        }
    }

    pub fn basic(color: [f32; 3]) -> Self {
        Self {
            kind: MaterialKind::Basic,
            ..Self::standard(color)
        }
    }

    pub fn shadow_catcher(opacity: f32) -> Self {
        Self {
            name: Some("ground".to_string()),
            kind: MaterialKind::ShadowCatcher,
            transparent: true,
            opacity,
            double_sided: true,
            ..Self::standard([0.0, 0.0, 0.0])
        }
    }

    pub fn is_basic(&self) -> bool {
        self.kind == MaterialKind::Basic
    }

    pub fn is_blended(&self) -> bool {
        self.transparent || self.kind == MaterialKind::ShadowCatcher
    }
}

/// Decoded RGBA8 image.
#[derive(Debug, Clone, PartialEq)]
pub struct Texture {
    pub name: Option<String>,
    pub width: u32,
    pub height: u32,
    pub rgba: Vec<u8>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DisposeCounts {
    pub materials: usize,
    pub textures: usize,
}

/// Arena of materials and the textures they sample.
///
/// Slots are never reused within one library, so a disposed id stays dead.
#[derive(Debug, Default)]
pub struct MaterialLibrary {
    materials: Vec<Option<Material>>,
    textures: Vec<Option<Texture>>,
}

impl MaterialLibrary {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, material: Material) -> MaterialId {
        let id = MaterialId(self.materials.len() as u32);
        self.materials.push(Some(material));
        id
    }

    pub fn insert_texture(&mut self, texture: Texture) -> TextureId {
        let id = TextureId(self.textures.len() as u32);
        self.textures.push(Some(texture));
        id
    }

    pub fn get(&self, id: MaterialId) -> Option<&Material> {
        self.materials.get(id.index()).and_then(Option::as_ref)
    }

    pub fn get_mut(&mut self, id: MaterialId) -> Option<&mut Material> {
        self.materials.get_mut(id.index()).and_then(Option::as_mut)
    }

    pub fn texture(&self, id: TextureId) -> Option<&Texture> {
        self.textures.get(id.index()).and_then(Option::as_ref)
    }

    pub fn contains(&self, id: MaterialId) -> bool {
        self.get(id).is_some()
    }

    /// Release one material. Its texture map is released too unless another
    /// live material still samples it.
    pub fn dispose(&mut self, id: MaterialId) -> DisposeCounts {
        let mut counts = DisposeCounts::default();
        let Some(material) = self.materials.get_mut(id.index()).and_then(Option::take) else {
            return counts;
        };
        counts.materials = 1;
        if let Some(map) = material.map {
            let still_used = self.iter().any(|(_, other)| other.map == Some(map));
            if !still_used {
                if let Some(slot) = self.textures.get_mut(map.index()) {
                    if slot.take().is_some() {
                        counts.textures = 1;
                    }
                }
            }
        }
        counts
    }

    /// Release everything.
    pub fn clear(&mut self) -> DisposeCounts {
        let counts = DisposeCounts {
            materials: self.materials.iter().filter(|slot| slot.is_some()).count(),
            textures: self.textures.iter().filter(|slot| slot.is_some()).count(),
        };
        self.materials.iter_mut().for_each(|slot| *slot = None);
        self.textures.iter_mut().for_each(|slot| *slot = None);
        counts
    }

    pub fn iter(&self) -> impl Iterator<Item = (MaterialId, &Material)> {
        self.materials
            .iter()
            .enumerate()
            .filter_map(|(index, slot)| slot.as_ref().map(|m| (MaterialId(index as u32), m)))
    }

    pub fn textures(&self) -> impl Iterator<Item = (TextureId, &Texture)> {
        self.textures
            .iter()
            .enumerate()
            .filter_map(|(index, slot)| slot.as_ref().map(|t| (TextureId(index as u32), t)))
    }

    pub fn live_materials(&self) -> usize {
        self.materials.iter().filter(|slot| slot.is_some()).count()
    }

    pub fn live_textures(&self) -> usize {
        self.textures.iter().filter(|slot| slot.is_some()).count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn texture() -> Texture {
        Texture {
            name: None,
            width: 1,
            height: 1,
            rgba: vec![255, 255, 255, 255],
        }
    }

    #[test]
    fn disposed_ids_stay_dead() {
        let mut library = MaterialLibrary::new();
        let first = library.insert(Material::standard([1.0, 0.0, 0.0]));
        library.dispose(first);
        let second = library.insert(Material::standard([0.0, 1.0, 0.0]));
        assert_ne!(first, second);
        assert!(library.get(first).is_none());
        assert!(library.get(second).is_some());
    }

    #[test]
    fn shared_texture_survives_until_last_user_is_disposed() {
        let mut library = MaterialLibrary::new();
        let map = library.insert_texture(texture());
        let a = library.insert(Material {
            map: Some(map),
            ..Material::standard([1.0; 3])
        });
        let b = library.insert(Material {
            map: Some(map),
            ..Material::standard([1.0; 3])
        });

        assert_eq!(library.dispose(a).textures, 0);
        assert!(library.texture(map).is_some());
        assert_eq!(library.dispose(b).textures, 1);
        assert!(library.texture(map).is_none());
    }

    #[test]
    fn clear_reports_live_counts_once() {
        let mut library = MaterialLibrary::new();
        let map = library.insert_texture(texture());
        library.insert(Material {
            map: Some(map),
            ..Material::basic([1.0; 3])
        });
        library.insert(Material::standard([1.0; 3]));

        let counts = library.clear();
        assert_eq!(counts, DisposeCounts { materials: 2, textures: 1 });
        assert_eq!(library.clear(), DisposeCounts::default());
    }
}
