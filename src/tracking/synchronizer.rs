//! Keeps scene nodes in step with tracked anchors
//!
//! Each anchor id moves through `absent -> live -> absent`. While live it maps to
//! exactly one node and that node maps back to it; both directions change together.

use std::collections::HashMap;

use crate::gfx::math::Transform;
use crate::gfx::scene::{NodeId, Scene};

use super::anchor::{Anchor, AnchorEvent, AnchorEventKind, AnchorId};
use super::delegate::ArViewDelegate;

#[derive(Debug, Default)]
pub struct AnchorSynchronizer {
    anchors: HashMap<AnchorId, Anchor>,
    nodes: HashMap<AnchorId, NodeId>,
    anchor_by_node: HashMap<NodeId, AnchorId>,
}

impl AnchorSynchronizer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn apply(
        &mut self,
        scene: &mut Scene,
        delegate: &mut dyn ArViewDelegate,
        event: &AnchorEvent,
    ) {
        match event.kind {
            AnchorEventKind::Added => self.anchors_added(scene, delegate, &event.anchors),
            AnchorEventKind::Updated => self.anchors_updated(scene, delegate, &event.anchors),
            AnchorEventKind::Removed => self.anchors_removed(scene, delegate, &event.anchors),
        }
    }

    pub fn anchors_added(
        &mut self,
        scene: &mut Scene,
        delegate: &mut dyn ArViewDelegate,
        anchors: &[Anchor],
    ) {
        for anchor in anchors {
            if self.nodes.contains_key(&anchor.id) {
                log::debug!("Anchor {:?} added twice, treating as update", anchor.id);
                self.update_one(scene, delegate, anchor);
                continue;
            }

            let Some(node) = delegate.node_for_anchor(scene, anchor) else {
                log::debug!("Delegate ignored anchor {:?}", anchor.id);
                continue;
            };

            if let Some(other) = self.anchor_by_node.get(&node) {
                log::warn!(
                    "Node {:?} already represents anchor {:?}; skipping anchor {:?}",
                    node,
                    other,
                    anchor.id
                );
                continue;
            }

            let root = scene.root();
            let attached = scene
                .add_child(root, node)
                .and_then(|_| scene.set_transform(node, Transform::from_matrix(anchor.transform)));
            if let Err(err) = attached {
                log::warn!("Cannot attach node for anchor {:?}: {}", anchor.id, err);
                continue;
            }

            self.anchors.insert(anchor.id, anchor.clone());
            self.nodes.insert(anchor.id, node);
            self.anchor_by_node.insert(node, anchor.id);
            log::debug!("Anchor {:?} live as node {:?}", anchor.id, node);

            delegate.did_add_node(scene, node, anchor);
        }
    }

    /// Anchors without a live node are ignored
    pub fn anchors_updated(
        &mut self,
        scene: &mut Scene,
        delegate: &mut dyn ArViewDelegate,
        anchors: &[Anchor],
    ) {
        for anchor in anchors {
            if self.nodes.contains_key(&anchor.id) {
                self.update_one(scene, delegate, anchor);
            } else {
                log::trace!("Update for unknown anchor {:?} ignored", anchor.id);
            }
        }
    }

    /// Detaches and unmaps each live anchor's node; its subtree stays in the scene
    ///
    /// Removing an anchor that is not live is a no-op.
    pub fn anchors_removed(
        &mut self,
        scene: &mut Scene,
        delegate: &mut dyn ArViewDelegate,
        anchors: &[Anchor],
    ) {
        for anchor in anchors {
            let Some((node, stored)) = self.unbind(anchor.id) else {
                continue;
            };

            if let Err(err) = scene.remove_from_parent(node) {
                log::warn!("Node for anchor {:?} already gone: {}", anchor.id, err);
            }
            delegate.did_remove_node(scene, node, &stored);
            log::debug!("Anchor {:?} removed, node {:?} detached", anchor.id, node);
        }
    }

    pub fn node_for_anchor(&self, id: AnchorId) -> Option<NodeId> {
        self.nodes.get(&id).copied()
    }

    pub fn anchor_for_node(&self, node: NodeId) -> Option<&Anchor> {
        self.anchor_by_node
            .get(&node)
            .and_then(|id| self.anchors.get(id))
    }

    pub fn anchor(&self, id: AnchorId) -> Option<&Anchor> {
        self.anchors.get(&id)
    }

    /// Number of live anchors
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    fn update_one(&mut self, scene: &mut Scene, delegate: &mut dyn ArViewDelegate, anchor: &Anchor) {
        let Some(node) = self.node_for_anchor(anchor.id) else {
            return;
        };
        if !scene.contains(node) {
            log::warn!(
                "Node {:?} for anchor {:?} was removed from the scene; unbinding",
                node,
                anchor.id
            );
            self.unbind(anchor.id);
            return;
        }

        delegate.will_update_node(scene, node, anchor);
        if let Err(err) = scene.set_transform(node, Transform::from_matrix(anchor.transform)) {
            log::warn!("Failed to update node {:?}: {}", node, err);
        }
        self.anchors.insert(anchor.id, anchor.clone());
        delegate.did_update_node(scene, node, anchor);
    }

    fn unbind(&mut self, id: AnchorId) -> Option<(NodeId, Anchor)> {
        let node = self.nodes.remove(&id)?;
        self.anchor_by_node.remove(&node);
        let anchor = self.anchors.remove(&id)?;
        Some((node, anchor))
    }
}
