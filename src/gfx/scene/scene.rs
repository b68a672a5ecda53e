use std::collections::{HashMap, VecDeque};

use cgmath::Matrix4;

use crate::error::SceneError;
use crate::gfx::geometry::Geometry;
use crate::gfx::math::Transform;
use crate::gfx::rendering::BufferHandle;
use crate::gfx::resources::material::PropertyId;

use super::node::{Node, NodeId};
use super::GeometryId;

/// GPU resources released by scene mutations, waiting for the renderer to retire them
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct ReleaseQueue {
    pub buffers: Vec<BufferHandle>,
    pub properties: Vec<PropertyId>,
}

impl ReleaseQueue {
    pub fn is_empty(&self) -> bool {
        self.buffers.is_empty() && self.properties.is_empty()
    }
}

/// Arena-backed scene graph with a single root
///
/// Nodes are never reachable through more than one parent. Nodes detached with
/// [`Scene::remove_from_parent`] stay in the arena (with their subtree) until removed
/// with [`Scene::remove_node`].
#[derive(Debug)]
pub struct Scene {
    nodes: HashMap<NodeId, Node>,
    geometries: HashMap<GeometryId, Geometry>,
    root: NodeId,
    next_node_id: u64,
    next_geometry_id: u64,
    released: ReleaseQueue,
}

impl Default for Scene {
    fn default() -> Self {
        Self::new()
    }
}

impl Scene {
    pub fn new() -> Self {
        let root = NodeId(0);
        let mut root_node = Node::new(root, Transform::identity());
        root_node.name = Some("root".to_string());

        let mut nodes = HashMap::new();
        nodes.insert(root, root_node);

        Self {
            nodes,
            geometries: HashMap::new(),
            root,
            next_node_id: 1,
            next_geometry_id: 0,
            released: ReleaseQueue::default(),
        }
    }

    pub fn root(&self) -> NodeId {
        self.root
    }

    /// Creates a detached node with an identity transform
    pub fn create_node(&mut self) -> NodeId {
        self.create_node_with_transform(Transform::identity())
    }

    pub fn create_node_with_transform(&mut self, transform: Transform) -> NodeId {
        let id = NodeId(self.next_node_id);
        self.next_node_id += 1;
        self.nodes.insert(id, Node::new(id, transform));
        id
    }

    pub fn node(&self, id: NodeId) -> Option<&Node> {
        self.nodes.get(&id)
    }

    pub fn node_mut(&mut self, id: NodeId) -> Option<&mut Node> {
        self.nodes.get_mut(&id)
    }

    pub fn contains(&self, id: NodeId) -> bool {
        self.nodes.contains_key(&id)
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    pub fn set_transform(&mut self, id: NodeId, transform: Transform) -> Result<(), SceneError> {
        let node = self.nodes.get_mut(&id).ok_or(SceneError::UnknownNode(id))?;
        node.transform = transform;
        Ok(())
    }

    /// Attaches `child` as the last child of `parent`, detaching it from any previous parent
    pub fn add_child(&mut self, parent: NodeId, child: NodeId) -> Result<(), SceneError> {
        if !self.contains(parent) {
            return Err(SceneError::UnknownNode(parent));
        }
        if !self.contains(child) {
            return Err(SceneError::UnknownNode(child));
        }
        if child == self.root {
            return Err(SceneError::RootCannotBeChild);
        }
        if parent == child || self.is_ancestor(child, parent) {
            return Err(SceneError::WouldCreateCycle { parent, child });
        }

        self.detach(child);

        if let Some(node) = self.nodes.get_mut(&parent) {
            node.children.push(child);
        }
        if let Some(node) = self.nodes.get_mut(&child) {
            node.parent = Some(parent);
        }
        Ok(())
    }

    /// Detaches the node from its parent; its own subtree stays intact
    ///
    /// Detaching a node without a parent is a no-op.
    pub fn remove_from_parent(&mut self, id: NodeId) -> Result<(), SceneError> {
        if !self.contains(id) {
            return Err(SceneError::UnknownNode(id));
        }
        self.detach(id);
        Ok(())
    }

    /// Detaches the node and drops it and its whole subtree from the arena
    ///
    /// Returns the removed ids in breadth-first order.
    pub fn remove_node(&mut self, id: NodeId) -> Result<Vec<NodeId>, SceneError> {
        if id == self.root {
            return Err(SceneError::CannotRemoveRoot);
        }
        if !self.contains(id) {
            return Err(SceneError::UnknownNode(id));
        }
        self.detach(id);

        let removed = self.subtree(id);
        for node_id in &removed {
            self.nodes.remove(node_id);
        }
        log::trace!("Removed {} node(s) rooted at {:?}", removed.len(), id);
        Ok(removed)
    }

    /// World transform composed from the root (or the top of a detached subtree) down to `id`
    pub fn world_transform(&self, id: NodeId) -> Option<Matrix4<f32>> {
        let mut node = self.nodes.get(&id)?;
        let mut world = node.transform.matrix();
        while let Some(parent_id) = node.parent {
            node = self.nodes.get(&parent_id)?;
            world = node.transform.matrix() * world;
        }
        Some(world)
    }

    /// True when the node is connected to the root
    pub fn is_reachable(&self, id: NodeId) -> bool {
        let mut current = id;
        loop {
            if current == self.root {
                return true;
            }
            match self.nodes.get(&current).and_then(|n| n.parent) {
                Some(parent) => current = parent,
                None => return false,
            }
        }
    }

    /// Breadth-first order of every node reachable from the root, root included
    pub fn traverse(&self) -> Vec<NodeId> {
        self.subtree(self.root)
    }

    /// Nodes reachable from the root that carry geometry, in breadth-first order
    pub fn visible_nodes(&self) -> Vec<NodeId> {
        self.traverse()
            .into_iter()
            .filter(|id| {
                self.nodes
                    .get(id)
                    .and_then(|n| n.geometry)
                    .is_some_and(|g| self.geometries.contains_key(&g))
            })
            .collect()
    }

    pub fn add_geometry(&mut self, geometry: Geometry) -> GeometryId {
        let id = GeometryId(self.next_geometry_id);
        self.next_geometry_id += 1;
        self.geometries.insert(id, geometry);
        id
    }

    pub fn geometry(&self, id: GeometryId) -> Option<&Geometry> {
        self.geometries.get(&id)
    }

    pub fn geometry_mut(&mut self, id: GeometryId) -> Option<&mut Geometry> {
        self.geometries.get_mut(&id)
    }

    pub fn set_geometry(
        &mut self,
        node: NodeId,
        geometry: Option<GeometryId>,
    ) -> Result<(), SceneError> {
        if let Some(g) = geometry {
            if !self.geometries.contains_key(&g) {
                return Err(SceneError::UnknownGeometry(g));
            }
        }
        let node = self
            .nodes
            .get_mut(&node)
            .ok_or(SceneError::UnknownNode(node))?;
        node.geometry = geometry;
        Ok(())
    }

    /// Removes a geometry, clears every node reference to it and queues its GPU
    /// resources for release
    pub fn remove_geometry(&mut self, id: GeometryId) -> Option<Geometry> {
        let geometry = self.geometries.remove(&id)?;
        for node in self.nodes.values_mut() {
            if node.geometry == Some(id) {
                node.geometry = None;
            }
        }
        self.released.buffers.extend(geometry.gpu_buffers());
        self.released.properties.extend(geometry.property_ids());
        Some(geometry)
    }

    /// Replaces the geometry stored under `id`, releasing the previous one
    pub fn replace_geometry(&mut self, id: GeometryId, geometry: Geometry) -> Result<(), SceneError> {
        let old = self
            .geometries
            .get_mut(&id)
            .ok_or(SceneError::UnknownGeometry(id))?;
        let old = std::mem::replace(old, geometry);
        self.released.buffers.extend(old.gpu_buffers());
        self.released.properties.extend(old.property_ids());
        Ok(())
    }

    /// Drains resources released since the last call
    pub fn take_released(&mut self) -> ReleaseQueue {
        std::mem::take(&mut self.released)
    }

    fn detach(&mut self, id: NodeId) {
        let Some(parent) = self.nodes.get_mut(&id).and_then(|n| n.parent.take()) else {
            return;
        };
        if let Some(parent) = self.nodes.get_mut(&parent) {
            parent.children.retain(|c| *c != id);
        }
    }

    fn is_ancestor(&self, ancestor: NodeId, of: NodeId) -> bool {
        let mut current = self.nodes.get(&of).and_then(|n| n.parent);
        while let Some(id) = current {
            if id == ancestor {
                return true;
            }
            current = self.nodes.get(&id).and_then(|n| n.parent);
        }
        false
    }

    fn subtree(&self, top: NodeId) -> Vec<NodeId> {
        let mut order = Vec::new();
        let mut queue = VecDeque::from([top]);
        while let Some(id) = queue.pop_front() {
            if let Some(node) = self.nodes.get(&id) {
                order.push(id);
                queue.extend(node.children.iter().copied());
            }
        }
        order
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gfx::geometry::primitives::generate_sphere;
    use crate::gfx::math::tests::assert_matrix_eq;
    use cgmath::{Deg, Quaternion, Rotation3, Vector3};

    fn translated(x: f32, y: f32, z: f32) -> Transform {
        Transform::from_translation(Vector3::new(x, y, z))
    }

    #[test]
    fn test_add_child_detaches_from_previous_parent() {
        let mut scene = Scene::new();
        let root = scene.root();
        let a = scene.create_node();
        let b = scene.create_node();
        let c = scene.create_node();
        scene.add_child(root, a).unwrap();
        scene.add_child(root, b).unwrap();
        scene.add_child(a, c).unwrap();

        scene.add_child(b, c).unwrap();

        assert!(scene.node(a).unwrap().children().is_empty());
        assert_eq!(scene.node(b).unwrap().children(), &[c]);
        assert_eq!(scene.node(c).unwrap().parent(), Some(b));
    }

    #[test]
    fn test_add_child_rejects_cycles_and_root() {
        let mut scene = Scene::new();
        let root = scene.root();
        let a = scene.create_node();
        let b = scene.create_node();
        scene.add_child(root, a).unwrap();
        scene.add_child(a, b).unwrap();

        assert_eq!(
            scene.add_child(b, a),
            Err(SceneError::WouldCreateCycle { parent: b, child: a })
        );
        assert_eq!(
            scene.add_child(a, a),
            Err(SceneError::WouldCreateCycle { parent: a, child: a })
        );
        assert_eq!(scene.add_child(a, root), Err(SceneError::RootCannotBeChild));
        assert_eq!(
            scene.add_child(a, NodeId(999)),
            Err(SceneError::UnknownNode(NodeId(999)))
        );
        // structure untouched by the failed calls
        assert_eq!(scene.node(b).unwrap().parent(), Some(a));
    }

    #[test]
    fn test_world_transform_composes_ancestors() {
        let mut scene = Scene::new();
        let root = scene.root();
        let rotation = Quaternion::from_angle_y(Deg(90.0));
        let parent = scene.create_node_with_transform(Transform {
            translation: Vector3::new(1.0, 0.0, 0.0),
            rotation,
            scale: Vector3::new(2.0, 2.0, 2.0),
        });
        let child = scene.create_node_with_transform(translated(0.0, 0.0, 1.0));
        scene.add_child(root, parent).unwrap();
        scene.add_child(parent, child).unwrap();

        let expected = scene.node(parent).unwrap().transform.matrix()
            * scene.node(child).unwrap().transform.matrix();
        assert_matrix_eq(scene.world_transform(child).unwrap(), expected);

        let origin = scene.world_transform(child).unwrap() * cgmath::Vector4::new(0.0, 0.0, 0.0, 1.0);
        assert!((origin.x - 3.0).abs() < 1e-5);
        assert!(origin.z.abs() < 1e-5);
    }

    #[test]
    fn test_reparenting_leaves_siblings_alone() {
        let mut scene = Scene::new();
        let root = scene.root();
        let left = scene.create_node_with_transform(translated(-1.0, 0.0, 0.0));
        let right = scene.create_node_with_transform(translated(1.0, 0.0, 0.0));
        let leaf = scene.create_node_with_transform(translated(0.0, 1.0, 0.0));
        let sibling = scene.create_node_with_transform(translated(0.0, 0.0, 5.0));
        for n in [left, right] {
            scene.add_child(root, n).unwrap();
        }
        scene.add_child(left, leaf).unwrap();
        scene.add_child(left, sibling).unwrap();
        let sibling_before = scene.world_transform(sibling).unwrap();

        scene.add_child(right, leaf).unwrap();

        assert_matrix_eq(
            scene.world_transform(leaf).unwrap(),
            Matrix4::from_translation(Vector3::new(1.0, 1.0, 0.0)),
        );
        assert_matrix_eq(scene.world_transform(sibling).unwrap(), sibling_before);
    }

    #[test]
    fn test_detached_subtree_is_its_own_world() {
        let mut scene = Scene::new();
        let root = scene.root();
        let a = scene.create_node_with_transform(translated(5.0, 0.0, 0.0));
        let b = scene.create_node_with_transform(translated(0.0, 2.0, 0.0));
        scene.add_child(root, a).unwrap();
        scene.add_child(a, b).unwrap();

        scene.remove_from_parent(a).unwrap();
        scene.remove_from_parent(a).unwrap();

        assert!(!scene.is_reachable(a));
        assert!(!scene.is_reachable(b));
        assert_eq!(scene.traverse(), vec![root]);
        assert_matrix_eq(
            scene.world_transform(b).unwrap(),
            Matrix4::from_translation(Vector3::new(5.0, 2.0, 0.0)),
        );
    }

    #[test]
    fn test_visible_nodes_breadth_first() {
        let mut scene = Scene::new();
        let root = scene.root();
        let geometry = scene.add_geometry(generate_sphere(0.1, 4));

        let depth1_plain = scene.create_node();
        let depth1 = scene.create_node();
        let depth2 = scene.create_node();
        scene.add_child(root, depth1_plain).unwrap();
        scene.add_child(root, depth1).unwrap();
        scene.add_child(depth1_plain, depth2).unwrap();

        for n in [root, depth1, depth2] {
            scene.set_geometry(n, Some(geometry)).unwrap();
        }

        assert_eq!(scene.visible_nodes(), vec![root, depth1, depth2]);
    }

    #[test]
    fn test_remove_node_drops_subtree_and_never_reuses_ids() {
        let mut scene = Scene::new();
        let root = scene.root();
        let a = scene.create_node();
        let b = scene.create_node();
        scene.add_child(root, a).unwrap();
        scene.add_child(a, b).unwrap();

        assert_eq!(scene.remove_node(a).unwrap(), vec![a, b]);
        assert!(!scene.contains(b));
        assert_eq!(scene.remove_node(root), Err(SceneError::CannotRemoveRoot));

        let c = scene.create_node();
        assert!(c.raw() > b.raw());
    }

    #[test]
    fn test_remove_geometry_clears_references() {
        let mut scene = Scene::new();
        let root = scene.root();
        let geometry = scene.add_geometry(generate_sphere(0.1, 4));
        let n = scene.create_node();
        scene.add_child(root, n).unwrap();
        scene.set_geometry(n, Some(geometry)).unwrap();

        assert!(scene.remove_geometry(geometry).is_some());
        assert_eq!(scene.node(n).unwrap().geometry(), None);
        assert!(scene.visible_nodes().is_empty());
        assert_eq!(
            scene.set_geometry(n, Some(geometry)),
            Err(SceneError::UnknownGeometry(geometry))
        );
        // the material properties of the removed geometry are queued for eviction
        assert!(!scene.take_released().properties.is_empty());
        assert!(scene.take_released().is_empty());
    }
}
