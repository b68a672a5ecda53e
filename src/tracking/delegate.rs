//! Application hooks around anchor-driven scene changes

use crate::gfx::math::Transform;
use crate::gfx::scene::{NodeId, Scene};

use super::anchor::Anchor;
use super::session::SessionEvent;

/// Callbacks an application implements to customize anchor nodes
///
/// Every method has a default: [`ArViewDelegate::node_for_anchor`] creates a plain node
/// at the anchor pose, the notifications do nothing.
pub trait ArViewDelegate {
    /// Node to represent a newly added anchor, or `None` to ignore the anchor
    ///
    /// The returned node must exist in `scene` and must not already represent another
    /// anchor. It is attached under the scene root after this returns. A node handed back
    /// from an earlier [`ArViewDelegate::did_remove_node`] can be returned again.
    fn node_for_anchor(&mut self, scene: &mut Scene, anchor: &Anchor) -> Option<NodeId> {
        Some(scene.create_node_with_transform(Transform::from_matrix(anchor.transform)))
    }

    fn did_add_node(&mut self, _scene: &mut Scene, _node: NodeId, _anchor: &Anchor) {}

    fn will_update_node(&mut self, _scene: &mut Scene, _node: NodeId, _anchor: &Anchor) {}

    fn did_update_node(&mut self, _scene: &mut Scene, _node: NodeId, _anchor: &Anchor) {}

    /// Called after the node has been detached and unmapped
    ///
    /// The node and its subtree stay in the scene arena. Call [`Scene::remove_node`] here
    /// to drop them, or keep the id to reuse it for a later anchor.
    fn did_remove_node(&mut self, _scene: &mut Scene, _node: NodeId, _anchor: &Anchor) {}

    fn session_event(&mut self, _event: &SessionEvent) {}
}

/// Delegate that keeps every default behavior
#[derive(Debug, Default, Clone, Copy)]
pub struct DefaultDelegate;

impl ArViewDelegate for DefaultDelegate {}
