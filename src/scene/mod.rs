pub mod bounds;
pub mod lights;
pub mod material;
pub mod normalize;

use bounds::{Aabb, BoundingSphere};
use glam::{Mat4, Quat, Vec2, Vec3};
use material::{DisposeCounts, MaterialId, MaterialLibrary};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(u32);

impl NodeId {
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct GeometryId(u32);

impl GeometryId {
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Transform {
    pub translation: Vec3,
    pub rotation: Quat,
    pub scale: Vec3,
}

impl Transform {
    pub const IDENTITY: Self = Self {
        translation: Vec3::ZERO,
        rotation: Quat::IDENTITY,
        scale: Vec3::ONE,
    };

    pub fn from_matrix(matrix: Mat4) -> Self {
        let (scale, rotation, translation) = matrix.to_scale_rotation_translation();
        Self {
            translation,
            rotation,
            scale,
        }
    }

    pub fn matrix(&self) -> Mat4 {
        Mat4::from_scale_rotation_translation(self.scale, self.rotation, self.translation)
    }

    /// Rotate the whole placement about the parent-space origin, carrying
    /// the translation along.
    pub fn rotate_about_origin(&mut self, rotation: Quat) {
        self.translation = rotation * self.translation;
        self.rotation = (rotation * self.rotation).normalize();
    }
}

impl Default for Transform {
    fn default() -> Self {
        Self::IDENTITY
    }
}

/// Indexed triangle list in local space.
#[derive(Debug, Clone, Default)]
pub struct Geometry {
    pub positions: Vec<Vec3>,
    pub normals: Vec<Vec3>,
    pub uvs: Vec<Vec2>,
    pub indices: Vec<u32>,
    bounds: Option<Aabb>,
    sphere: Option<BoundingSphere>,
}

impl Geometry {
    pub fn new(positions: Vec<Vec3>, normals: Vec<Vec3>, uvs: Vec<Vec2>, indices: Vec<u32>) -> Self {
        let mut geometry = Self {
            positions,
            normals,
            uvs,
            indices,
            bounds: None,
            sphere: None,
        };
        if geometry.normals.len() != geometry.positions.len() {
            geometry.compute_flat_normals();
        }
        geometry
    }

    /// Two triangles spanning `size` on the XZ plane, facing +Y.
    pub fn plane(size_x: f32, size_z: f32) -> Self {
        let (hx, hz) = (size_x * 0.5, size_z * 0.5);
        Self::new(
            vec![
                Vec3::new(-hx, 0.0, -hz),
                Vec3::new(hx, 0.0, -hz),
                Vec3::new(hx, 0.0, hz),
                Vec3::new(-hx, 0.0, hz),
            ],
            vec![Vec3::Y; 4],
            vec![
                Vec2::new(0.0, 0.0),
                Vec2::new(1.0, 0.0),
                Vec2::new(1.0, 1.0),
                Vec2::new(0.0, 1.0),
            ],
            vec![0, 2, 1, 0, 3, 2],
        )
    }

    pub fn triangle_count(&self) -> usize {
        self.indices.len() / 3
    }

    pub fn triangle(&self, index: usize) -> Option<[Vec3; 3]> {
        let base = index * 3;
        let a = *self.indices.get(base)? as usize;
        let b = *self.indices.get(base + 1)? as usize;
        let c = *self.indices.get(base + 2)? as usize;
        Some([
            *self.positions.get(a)?,
            *self.positions.get(b)?,
            *self.positions.get(c)?,
        ])
    }

    /// Drop cached bounds and refit them to the current positions.
    pub fn compute_bounds(&mut self) {
        let aabb = Aabb::from_points(self.positions.iter().copied());
        self.sphere = Some(BoundingSphere::from_points(&self.positions, aabb.center()));
        self.bounds = Some(aabb);
    }

    pub fn bounds(&self) -> Aabb {
        self.bounds
            .unwrap_or_else(|| Aabb::from_points(self.positions.iter().copied()))
    }

    pub fn bounding_sphere(&self) -> BoundingSphere {
        self.sphere.unwrap_or_else(|| {
            let aabb = self.bounds();
            BoundingSphere::from_points(&self.positions, aabb.center())
        })
    }

    fn compute_flat_normals(&mut self) {
        let mut normals = vec![Vec3::ZERO; self.positions.len()];
        for index in 0..self.triangle_count() {
            let Some([a, b, c]) = self.triangle(index) else {
                continue;
            };
            let face = (b - a).cross(c - a);
            for corner in &self.indices[index * 3..index * 3 + 3] {
                normals[*corner as usize] += face;
            }
        }
        self.normals = normals
            .into_iter()
            .map(|n| n.try_normalize().unwrap_or(Vec3::Y))
            .collect();
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MeshNode {
    pub geometry: GeometryId,
    pub material: MaterialId,
    pub cast_shadow: bool,
    pub receive_shadow: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub enum NodeKind {
    Group,
    Mesh(MeshNode),
}

#[derive(Debug, Clone)]
pub struct Node {
    pub name: Option<String>,
    pub transform: Transform,
    pub parent: Option<NodeId>,
    pub children: Vec<NodeId>,
    pub kind: NodeKind,
}

impl Node {
    pub fn mesh(&self) -> Option<&MeshNode> {
        match &self.kind {
            NodeKind::Mesh(mesh) => Some(mesh),
            NodeKind::Group => None,
        }
    }
}

/// Neutral lighting term applied to every lit surface.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Environment {
    pub color: [f32; 3],
    pub intensity: f32,
}

impl Environment {
    pub fn neutral() -> Self {
        Self {
            color: [1.0, 1.0, 1.0],
            intensity: 0.25,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DisposeReport {
    pub nodes: usize,
    pub meshes: usize,
    pub geometries: usize,
    pub materials: usize,
    pub textures: usize,
    pub environment: bool,
}

/// Node tree plus the geometry and materials it references.
///
/// Node ids index into a flat arena. Parents are always created before
/// their children, so a forward walk over the arena visits parents first.
#[derive(Debug, Default)]
pub struct SceneGraph {
    nodes: Vec<Node>,
    roots: Vec<NodeId>,
    geometries: Vec<Option<Geometry>>,
    pub materials: MaterialLibrary,
    pub environment: Option<Environment>,
}

impl SceneGraph {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_geometry(&mut self, geometry: Geometry) -> GeometryId {
        let id = GeometryId(self.geometries.len() as u32);
        self.geometries.push(Some(geometry));
        id
    }

    pub fn geometry(&self, id: GeometryId) -> Option<&Geometry> {
        self.geometries.get(id.index()).and_then(Option::as_ref)
    }

    pub fn geometry_mut(&mut self, id: GeometryId) -> Option<&mut Geometry> {
        self.geometries.get_mut(id.index()).and_then(Option::as_mut)
    }

    pub fn add_node(&mut self, parent: Option<NodeId>, name: Option<String>, kind: NodeKind) -> NodeId {
        let id = NodeId(self.nodes.len() as u32);
        self.nodes.push(Node {
            name,
            transform: Transform::IDENTITY,
            parent,
            children: Vec::new(),
            kind,
        });
        match parent.and_then(|parent| self.nodes.get_mut(parent.index())) {
            Some(parent) => parent.children.push(id),
            None => self.roots.push(id),
        }
        id
    }

    pub fn add_group(&mut self, parent: Option<NodeId>, name: Option<String>) -> NodeId {
        self.add_node(parent, name, NodeKind::Group)
    }

    pub fn add_mesh(
        &mut self,
        parent: Option<NodeId>,
        name: Option<String>,
        geometry: GeometryId,
        material: MaterialId,
    ) -> NodeId {
        self.add_node(
            parent,
            name,
            NodeKind::Mesh(MeshNode {
                geometry,
                material,
                cast_shadow: false,
                receive_shadow: false,
            }),
        )
    }

    pub fn node(&self, id: NodeId) -> Option<&Node> {
        self.nodes.get(id.index())
    }

    pub fn node_mut(&mut self, id: NodeId) -> Option<&mut Node> {
        self.nodes.get_mut(id.index())
    }

    pub fn mesh_mut(&mut self, id: NodeId) -> Option<&mut MeshNode> {
        match &mut self.node_mut(id)?.kind {
            NodeKind::Mesh(mesh) => Some(mesh),
            NodeKind::Group => None,
        }
    }

    pub fn set_transform(&mut self, id: NodeId, transform: Transform) {
        if let Some(node) = self.node_mut(id) {
            node.transform = transform;
        }
    }

    pub fn roots(&self) -> &[NodeId] {
        &self.roots
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Depth-first ids under `root`, `root` included.
    pub fn descendants(&self, root: NodeId) -> Vec<NodeId> {
        let mut out = Vec::new();
        let mut stack = vec![root];
        while let Some(id) = stack.pop() {
            let Some(node) = self.node(id) else {
                continue;
            };
            out.push(id);
            stack.extend(node.children.iter().rev().copied());
        }
        out
    }

    /// Every mesh in the graph with its world matrix.
    pub fn meshes(&self) -> Vec<(NodeId, MeshNode, Mat4)> {
        let world = self.world_matrices();
        self.nodes
            .iter()
            .enumerate()
            .filter_map(|(index, node)| {
                node.mesh()
                    .map(|mesh| (NodeId(index as u32), *mesh, world[index]))
            })
            .collect()
    }

    /// World matrix of every node, indexed by `NodeId::index`.
    pub fn world_matrices(&self) -> Vec<Mat4> {
        let mut world = Vec::with_capacity(self.nodes.len());
        for node in &self.nodes {
            let local = node.transform.matrix();
            let parent = node
                .parent
                .and_then(|parent| world.get(parent.index()).copied())
                .unwrap_or(Mat4::IDENTITY);
            world.push(parent * local);
        }
        world
    }

    pub fn world_matrix(&self, id: NodeId) -> Mat4 {
        let mut matrix = Mat4::IDENTITY;
        let mut cursor = Some(id);
        while let Some(current) = cursor {
            let Some(node) = self.node(current) else {
                break;
            };
            matrix = node.transform.matrix() * matrix;
            cursor = node.parent;
        }
        matrix
    }

    /// World-space box around every mesh under `root`, from current transforms.
    pub fn subtree_bounds(&self, root: NodeId) -> Aabb {
        let world = self.world_matrices();
        self.descendants(root)
            .into_iter()
            .filter_map(|id| {
                let mesh = self.node(id)?.mesh()?;
                let geometry = self.geometry(mesh.geometry)?;
                Some(geometry.bounds().transformed(&world[id.index()]))
            })
            .fold(Aabb::EMPTY, |acc, aabb| acc.union(&aabb))
    }

    /// Release every node, geometry, material, texture and the environment.
    /// Calling it again reports zero of everything.
    pub fn dispose(&mut self) -> DisposeReport {
        let meshes = self.nodes.iter().filter(|node| node.mesh().is_some()).count();
        let nodes = self.nodes.len();
        let geometries = self.geometries.iter().filter(|slot| slot.is_some()).count();
        let DisposeCounts {
            materials,
            textures,
        } = self.materials.clear();
        let environment = self.environment.take().is_some();
        self.nodes.clear();
        self.roots.clear();
        self.geometries.iter_mut().for_each(|slot| *slot = None);
        DisposeReport {
            nodes,
            meshes,
            geometries,
            materials,
            textures,
            environment,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use material::Material;

    fn cube_graph() -> (SceneGraph, NodeId, NodeId) {
        let mut scene = SceneGraph::new();
        let geometry = scene.add_geometry(Geometry::plane(2.0, 2.0));
        let material = scene.materials.insert(Material::standard([1.0; 3]));
        let root = scene.add_group(None, Some("model".to_string()));
        let mesh = scene.add_mesh(Some(root), Some("Mesh1_3".to_string()), geometry, material);
        (scene, root, mesh)
    }

    #[test]
    fn world_matrix_composes_parent_chain() {
        let (mut scene, root, mesh) = cube_graph();
        scene.set_transform(
            root,
            Transform {
                translation: Vec3::new(1.0, 0.0, 0.0),
                ..Transform::IDENTITY
            },
        );
        scene.set_transform(
            mesh,
            Transform {
                scale: Vec3::splat(2.0),
                ..Transform::IDENTITY
            },
        );
        let world = scene.world_matrix(mesh);
        let p = world.transform_point3(Vec3::new(1.0, 0.0, 0.0));
        assert!((p - Vec3::new(3.0, 0.0, 0.0)).length() < 1e-6);
        assert_eq!(scene.world_matrices()[mesh.index()], world);
    }

    #[test]
    fn rotating_about_origin_keeps_origin_fixed() {
        let mut transform = Transform {
            translation: Vec3::new(-3.0, 0.0, 2.0),
            rotation: Quat::IDENTITY,
            scale: Vec3::splat(0.5),
        };
        let pivot = transform.matrix().inverse().transform_point3(Vec3::ZERO);
        let corner = Vec3::new(6.0, 0.0, -4.0);
        let before = transform.matrix().transform_point3(corner);

        transform.rotate_about_origin(Quat::from_rotation_y(std::f32::consts::FRAC_PI_2));
        let matrix = transform.matrix();
        assert!(matrix.transform_point3(pivot).length() < 1e-5);
        let after = matrix.transform_point3(corner);
        assert!((after.length() - before.length()).abs() < 1e-5);
        assert!(after.distance(before) > 1.0);
    }

    #[test]
    fn subtree_bounds_follow_transform() {
        let (mut scene, root, _) = cube_graph();
        scene.set_transform(
            root,
            Transform {
                translation: Vec3::new(0.0, 5.0, 0.0),
                ..Transform::IDENTITY
            },
        );
        let bounds = scene.subtree_bounds(root);
        assert!((bounds.center() - Vec3::new(0.0, 5.0, 0.0)).length() < 1e-6);
        assert!((bounds.size().x - 2.0).abs() < 1e-6);
    }

    #[test]
    fn dispose_twice_reports_nothing_the_second_time() {
        let (mut scene, _, _) = cube_graph();
        scene.environment = Some(Environment::neutral());
        let first = scene.dispose();
        assert_eq!(first.meshes, 1);
        assert_eq!(first.geometries, 1);
        assert_eq!(first.materials, 1);
        assert!(first.environment);
        assert_eq!(scene.dispose(), DisposeReport::default());
        assert!(scene.is_empty());
    }

    #[test]
    fn plane_normals_face_up() {
        let plane = Geometry::plane(1.0, 1.0);
        let [a, b, c] = plane.triangle(0).unwrap_or([Vec3::ZERO; 3]);
        assert!((b - a).cross(c - a).normalize().dot(Vec3::Y) > 0.99);
    }
}
