//! Hover picking over unit meshes
//!
//! Meshes whose name encodes a unit number are registered once per load.
//! Each frame the pointer ray is tested against those meshes only; the
//! nearest one gets the shared highlight material swapped in, and its own
//! material id is kept so it can be put back exactly.
//!
//! ## Flicker guard
//!
//! Ray jitter along a shared edge would otherwise toggle the highlight every
//! frame. A change is only committed once `debounce` has passed since the
//! previous change; re-hitting the highlighted mesh is always a no-op.

use crate::config::PickingConfig;
use crate::render::raycast::{self, Ray};
use crate::scene::material::{Material, MaterialId};
use crate::scene::{NodeId, SceneGraph};
use std::collections::{BTreeMap, HashMap};
use std::ops::RangeInclusive;
use std::time::{Duration, Instant};

// ========================================================================
// Unit number parsing
// ========================================================================

/// Unit number encoded in a mesh name, if it falls in `range`.
///
/// Tried in order, first in-range result wins:
/// 1. trailing `_<digits>`
/// 2. `Mesh<digits>_<digits>` anywhere
/// 3. a standalone number token
pub fn parse_unit_index(name: &str, range: &RangeInclusive<u32>) -> Option<u32> {
    let in_range = |n: u32| range.contains(&n).then_some(n);

    if let Some(n) = trailing_suffix(name).and_then(in_range) {
        return Some(n);
    }
    if let Some(n) = mesh_prefixed(name).and_then(in_range) {
        return Some(n);
    }
    standalone_numbers(name).find_map(in_range)
}

fn parse_digits(digits: &str) -> Option<u32> {
    // Overlong runs are out of any sensible unit range.
    digits.parse::<u32>().ok()
}

fn trailing_suffix(name: &str) -> Option<u32> {
    let digits_start = name
        .char_indices()
        .rev()
        .take_while(|(_, c)| c.is_ascii_digit())
        .last()
        .map(|(index, _)| index)?;
    let prefix = &name[..digits_start];
    prefix
        .ends_with('_')
        .then(|| parse_digits(&name[digits_start..]))
        .flatten()
}

fn mesh_prefixed(name: &str) -> Option<u32> {
    for (start, _) in name.match_indices("Mesh") {
        let rest = &name[start + "Mesh".len()..];
        let id_len = rest.bytes().take_while(u8::is_ascii_digit).count();
        if id_len == 0 {
            continue;
        }
        let Some(after) = rest[id_len..].strip_prefix('_') else {
            continue;
        };
        let unit_len = after.bytes().take_while(u8::is_ascii_digit).count();
        if unit_len == 0 {
            continue;
        }
        return parse_digits(&after[..unit_len]);
    }
    None
}

/// Whole-word digit runs without a leading zero.
fn standalone_numbers(name: &str) -> impl Iterator<Item = u32> + '_ {
    name.split(|c: char| !(c.is_ascii_alphanumeric() || c == '_'))
        .filter(|word| {
            !word.is_empty()
                && !word.starts_with('0')
                && word.bytes().all(|b| b.is_ascii_digit())
        })
        .filter_map(parse_digits)
}

// ========================================================================
// Registry + highlight state
// ========================================================================

#[derive(Debug, Clone, PartialEq)]
pub struct PickTarget {
    pub node: NodeId,
    pub unit: u32,
    pub name: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HighlightChange {
    Highlighted { node: NodeId, unit: u32 },
    Cleared { node: NodeId },
}

pub struct PickSystem {
    targets: BTreeMap<NodeId, PickTarget>,
    saved: HashMap<NodeId, MaterialId>,
    highlight_material: Option<MaterialId>,
    highlighted: Option<NodeId>,
    last_change: Option<Instant>,
    debounce: Duration,
    range: RangeInclusive<u32>,
}

impl PickSystem {
    pub fn new(config: &PickingConfig) -> Self {
        Self {
            targets: BTreeMap::new(),
            saved: HashMap::new(),
            highlight_material: None,
            highlighted: None,
            last_change: None,
            debounce: Duration::from_millis(config.debounce_ms),
            range: config.unit_min..=config.unit_max,
        }
    }

    /// Scan `scene` for unit meshes and create the shared highlight material.
    ///
    /// Replaces any previous registration. Returns the number of targets.
    pub fn register_targets(&mut self, scene: &mut SceneGraph, config: &PickingConfig) -> usize {
        self.targets.clear();
        self.saved.clear();
        self.highlighted = None;
        self.last_change = None;

        for (node, _, _) in scene.meshes() {
            let Some(name) = scene.node(node).and_then(|n| n.name.clone()) else {
                continue;
            };
            let Some(unit) = parse_unit_index(&name, &self.range) else {
                continue;
            };
            log::debug!("target mesh '{}' -> unit {}", name, unit);
            self.targets.insert(node, PickTarget { node, unit, name });
        }

        let highlight = &config.highlight;
        self.highlight_material = Some(scene.materials.insert(Material {
            name: Some("highlight".to_string()),
            emissive: highlight.emissive,
            emissive_intensity: highlight.emissive_intensity,
            roughness: highlight.roughness,
            metalness: highlight.metalness,
            depth_bias: true,
            ..Material::standard(highlight.color)
        }));

        if self.targets.is_empty() {
            log::warn!("no target meshes found; check mesh naming");
        } else {
            log::info!("{} target meshes registered", self.targets.len());
        }
        self.targets.len()
    }

    pub fn targets(&self) -> impl Iterator<Item = &PickTarget> {
        self.targets.values()
    }

    pub fn target_count(&self) -> usize {
        self.targets.len()
    }

    pub fn highlighted(&self) -> Option<NodeId> {
        self.highlighted
    }

    pub fn hovered_unit(&self) -> Option<u32> {
        self.highlighted
            .and_then(|node| self.targets.get(&node))
            .map(|target| target.unit)
    }

    pub fn highlight_material(&self) -> Option<MaterialId> {
        self.highlight_material
    }

    /// Nearest registered mesh under `ray`.
    pub fn pick(&self, scene: &SceneGraph, ray: &Ray) -> Option<NodeId> {
        if self.targets.is_empty() {
            return None;
        }
        raycast::raycast(scene, self.targets.keys().copied(), ray).map(|hit| hit.node)
    }

    /// Move the highlight to `hit`, honoring the debounce.
    pub fn update(
        &mut self,
        scene: &mut SceneGraph,
        hit: Option<NodeId>,
        now: Instant,
    ) -> Option<HighlightChange> {
        let debounced = self
            .last_change
            .is_some_and(|last| now.saturating_duration_since(last) < self.debounce);

        let Some(hit) = hit.filter(|node| self.targets.contains_key(node)) else {
            let current = self.highlighted?;
            if debounced {
                return None;
            }
            self.restore(scene, current);
            self.highlighted = None;
            self.last_change = Some(now);
            return Some(HighlightChange::Cleared { node: current });
        };

        if self.highlighted == Some(hit) || debounced {
            return None;
        }
        let highlight = self.highlight_material?;
        if let Some(previous) = self.highlighted.take() {
            self.restore(scene, previous);
        }
        let mesh = scene.mesh_mut(hit)?;
        self.saved.entry(hit).or_insert(mesh.material);
        mesh.material = highlight;
        self.highlighted = Some(hit);
        self.last_change = Some(now);
        let unit = self.targets.get(&hit).map(|t| t.unit).unwrap_or_default();
        Some(HighlightChange::Highlighted { node: hit, unit })
    }

    fn restore(&mut self, scene: &mut SceneGraph, node: NodeId) {
        let Some(original) = self.saved.get(&node).copied() else {
            return;
        };
        if let Some(mesh) = scene.mesh_mut(node) {
            mesh.material = original;
        }
    }

    /// Put back any highlighted mesh's material and release the highlight
    /// material. Safe to call more than once.
    pub fn dispose(&mut self, scene: &mut SceneGraph) {
        if let Some(node) = self.highlighted.take() {
            self.restore(scene, node);
        }
        if let Some(material) = self.highlight_material.take() {
            scene.materials.dispose(material);
        }
        self.targets.clear();
        self.saved.clear();
        self.last_change = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scene::Geometry;
    use glam::Vec3;

    const RANGE: RangeInclusive<u32> = 1..=69;

    #[test]
    fn unit_index_patterns() {
        assert_eq!(parse_unit_index("Mesh6497_12", &RANGE), Some(12));
        assert_eq!(parse_unit_index("Part_70", &RANGE), None);
        assert_eq!(parse_unit_index("Wall", &RANGE), None);
        assert_eq!(parse_unit_index("Unit_7", &RANGE), Some(7));
        assert_eq!(parse_unit_index("Mesh12_40_extra", &RANGE), Some(40));
        assert_eq!(parse_unit_index("Block 23 north", &RANGE), Some(23));
        assert_eq!(parse_unit_index("Level-05", &RANGE), None);
        assert_eq!(parse_unit_index("Tower99", &RANGE), None);
        assert_eq!(parse_unit_index("Room_0", &RANGE), None);
    }

    #[test]
    fn out_of_range_suffix_falls_through_to_later_patterns() {
        assert_eq!(parse_unit_index("Mesh5_9_100", &RANGE), Some(9));
        assert_eq!(parse_unit_index("Slab 4 Mesh1_200", &RANGE), Some(4));
        assert_eq!(parse_unit_index("Slab 4_200", &RANGE), None);
    }

    struct Fixture {
        scene: SceneGraph,
        unit_a: NodeId,
        unit_b: NodeId,
        wall: NodeId,
        system: PickSystem,
    }

    fn fixture() -> Fixture {
        let mut scene = SceneGraph::new();
        let geometry = scene.add_geometry(Geometry::plane(1.0, 1.0));
        let material = scene.materials.insert(Material::standard([0.5; 3]));
        let unit_a = scene.add_mesh(None, Some("Mesh6497_12".to_string()), geometry, material);
        let unit_b = scene.add_mesh(None, Some("Mesh6497_13".to_string()), geometry, material);
        let wall = scene.add_mesh(None, Some("Wall".to_string()), geometry, material);
        let config = PickingConfig::default();
        let mut system = PickSystem::new(&config);
        assert_eq!(system.register_targets(&mut scene, &config), 2);
        Fixture {
            scene,
            unit_a,
            unit_b,
            wall,
            system,
        }
    }

    fn material_of(scene: &SceneGraph, node: NodeId) -> Option<MaterialId> {
        scene.node(node).and_then(|n| n.mesh()).map(|m| m.material)
    }

    fn highlighted_count(f: &Fixture) -> usize {
        let highlight = f.system.highlight_material();
        [f.unit_a, f.unit_b, f.wall]
            .iter()
            .filter(|node| material_of(&f.scene, **node) == highlight)
            .count()
    }

    #[test]
    fn hover_then_leave_restores_original_instance() {
        let mut f = fixture();
        let original = material_of(&f.scene, f.unit_a);
        let t0 = Instant::now();

        let change = f.system.update(&mut f.scene, Some(f.unit_a), t0);
        assert_eq!(
            change,
            Some(HighlightChange::Highlighted {
                node: f.unit_a,
                unit: 12
            })
        );
        assert_eq!(f.system.hovered_unit(), Some(12));
        assert_eq!(highlighted_count(&f), 1);

        // Inside the debounce window nothing changes.
        assert_eq!(f.system.update(&mut f.scene, None, t0 + Duration::from_millis(50)), None);
        assert_eq!(highlighted_count(&f), 1);

        let change = f.system.update(&mut f.scene, None, t0 + Duration::from_millis(150));
        assert_eq!(change, Some(HighlightChange::Cleared { node: f.unit_a }));
        assert_eq!(highlighted_count(&f), 0);
        assert_eq!(material_of(&f.scene, f.unit_a), original);
    }

    #[test]
    fn moving_between_targets_keeps_one_highlight() {
        let mut f = fixture();
        let t0 = Instant::now();
        f.system.update(&mut f.scene, Some(f.unit_a), t0);
        assert_eq!(f.system.update(&mut f.scene, Some(f.unit_a), t0 + Duration::from_millis(500)), None);

        f.system.update(&mut f.scene, Some(f.unit_b), t0 + Duration::from_millis(600));
        assert_eq!(f.system.highlighted(), Some(f.unit_b));
        assert_eq!(highlighted_count(&f), 1);
        assert_ne!(material_of(&f.scene, f.unit_a), f.system.highlight_material());
    }

    #[test]
    fn non_target_hits_are_ignored() {
        let mut f = fixture();
        assert_eq!(f.system.update(&mut f.scene, Some(f.wall), Instant::now()), None);
        assert_eq!(highlighted_count(&f), 0);
    }

    #[test]
    fn pick_only_tests_registered_meshes() {
        let mut scene = SceneGraph::new();
        let geometry = scene.add_geometry(Geometry::plane(2.0, 2.0));
        let material = scene.materials.insert(Material::standard([0.5; 3]));
        let unit = scene.add_mesh(None, Some("Unit_3".to_string()), geometry, material);
        let roof = scene.add_mesh(None, Some("Roof".to_string()), geometry, material);
        if let Some(node) = scene.node_mut(roof) {
            node.transform.translation = Vec3::new(0.0, 1.0, 0.0);
        }
        let config = PickingConfig::default();
        let mut system = PickSystem::new(&config);
        system.register_targets(&mut scene, &config);

        let ray = Ray::new(Vec3::new(0.0, 5.0, 0.0), Vec3::NEG_Y);
        assert_eq!(system.pick(&scene, &ray), Some(unit));
    }

    #[test]
    fn dispose_twice_is_harmless() {
        let mut f = fixture();
        let original = material_of(&f.scene, f.unit_a);
        f.system.update(&mut f.scene, Some(f.unit_a), Instant::now());
        f.system.dispose(&mut f.scene);
        f.system.dispose(&mut f.scene);
        assert_eq!(material_of(&f.scene, f.unit_a), original);
        assert_eq!(f.system.target_count(), 0);
    }
}
