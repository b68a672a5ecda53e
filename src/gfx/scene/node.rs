use cgmath::{Deg, Matrix4, Vector4};

use crate::config::{Z_FAR, Z_NEAR};
use crate::gfx::math::Transform;

use super::GeometryId;

/// Stable node identity, unique within a [`Scene`](super::Scene) and never reused
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(pub(crate) u64);

impl NodeId {
    pub fn raw(&self) -> u64 {
        self.0
    }
}

/// Perspective projection attached to a node
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Camera {
    pub projection: Matrix4<f32>,
}

impl Default for Camera {
    fn default() -> Self {
        Self::perspective(Deg(60.0), 1.0, Z_NEAR, Z_FAR)
    }
}

impl Camera {
    /// Right-handed perspective projection with clip depth in `[0, 1]`
    pub fn perspective(fovy: Deg<f32>, aspect: f32, near: f32, far: f32) -> Self {
        // cgmath produces OpenGL clip depth in [-1, 1]; remap z to [0, 1]
        let opengl_to_wgpu = Matrix4::from_cols(
            Vector4::new(1.0, 0.0, 0.0, 0.0),
            Vector4::new(0.0, 1.0, 0.0, 0.0),
            Vector4::new(0.0, 0.0, 0.5, 0.0),
            Vector4::new(0.0, 0.0, 0.5, 1.0),
        );
        Self {
            projection: opengl_to_wgpu * cgmath::perspective(fovy, aspect, near, far),
        }
    }
}

/// A scene graph element
///
/// Structure (parent and children) is owned by the [`Scene`](super::Scene) arena and
/// only changes through scene methods, which keep the single-parent invariant.
#[derive(Debug, Clone)]
pub struct Node {
    id: NodeId,
    pub name: Option<String>,
    pub transform: Transform,
    pub camera: Option<Camera>,
    pub(crate) geometry: Option<GeometryId>,
    pub(crate) parent: Option<NodeId>,
    pub(crate) children: Vec<NodeId>,
}

impl Node {
    pub(crate) fn new(id: NodeId, transform: Transform) -> Self {
        Self {
            id,
            name: None,
            transform,
            camera: None,
            geometry: None,
            parent: None,
            children: Vec::new(),
        }
    }

    pub fn id(&self) -> NodeId {
        self.id
    }

    pub fn geometry(&self) -> Option<GeometryId> {
        self.geometry
    }

    pub fn parent(&self) -> Option<NodeId> {
        self.parent
    }

    /// Children in attachment order
    pub fn children(&self) -> &[NodeId] {
        &self.children
    }
}
