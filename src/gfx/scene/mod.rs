//! # Scene Management Module
//!
//! The scene graph: an arena of [`Node`]s addressed by stable [`NodeId`]s, with parent and
//! child links stored as ids, plus the shared [`Geometry`](crate::gfx::geometry::Geometry)
//! records those nodes reference by [`GeometryId`].
//!
//! ## Key Components
//!
//! - [`Scene`] - Owns the root node, every node and every geometry
//! - [`Node`] - Local transform, optional camera, optional geometry, ordered children
//! - [`Vertex3D`] / [`PointVertex`] - Vertex formats used by the built-in geometry producers
//!
//! ## Usage
//!
//! ```
//! use arscene::gfx::scene::Scene;
//! use arscene::gfx::math::Transform;
//! use cgmath::Vector3;
//!
//! let mut scene = Scene::new();
//! let root = scene.root();
//! let child = scene.create_node_with_transform(Transform::from_translation(Vector3::new(0.0, 1.0, 0.0)));
//! scene.add_child(root, child).unwrap();
//! assert!(scene.is_reachable(child));
//! ```

pub mod node;
pub mod scene;
pub mod vertex;

pub use node::{Camera, Node, NodeId};
pub use scene::{ReleaseQueue, Scene};
pub use vertex::{PointVertex, Vertex3D};

/// Identity of a geometry stored in a [`Scene`], shareable between nodes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct GeometryId(pub(crate) u64);

impl GeometryId {
    pub fn raw(&self) -> u64 {
        self.0
    }
}
