//! Anchors reported by the tracking subsystem

use cgmath::{Matrix4, Vector2, Vector3};

/// Stable anchor identity assigned by the tracking subsystem
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct AnchorId(pub u128);

impl AnchorId {
    /// Fresh random identity, for sessions that mint their own anchors
    pub fn random() -> Self {
        Self(rand::random())
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum AnchorKind {
    /// A detected plane; `center` is relative to the anchor pose and `extent` holds
    /// the size along the anchor's local x and z axes
    Plane {
        center: Vector3<f32>,
        extent: Vector2<f32>,
    },
    /// A feature point anchor
    Point,
    /// An anchor placed by the application
    Generic,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Anchor {
    pub id: AnchorId,
    /// Anchor pose in world space
    pub transform: Matrix4<f32>,
    pub kind: AnchorKind,
}

impl Anchor {
    pub fn new(id: AnchorId, transform: Matrix4<f32>, kind: AnchorKind) -> Self {
        Self {
            id,
            transform,
            kind,
        }
    }

    pub fn is_plane(&self) -> bool {
        matches!(self.kind, AnchorKind::Plane { .. })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AnchorEventKind {
    Added,
    Updated,
    Removed,
}

/// A batch of anchor changes; anchors are processed in list order
#[derive(Debug, Clone, PartialEq)]
pub struct AnchorEvent {
    pub kind: AnchorEventKind,
    pub anchors: Vec<Anchor>,
}

impl AnchorEvent {
    pub fn added(anchors: Vec<Anchor>) -> Self {
        Self {
            kind: AnchorEventKind::Added,
            anchors,
        }
    }

    pub fn updated(anchors: Vec<Anchor>) -> Self {
        Self {
            kind: AnchorEventKind::Updated,
            anchors,
        }
    }

    pub fn removed(anchors: Vec<Anchor>) -> Self {
        Self {
            kind: AnchorEventKind::Removed,
            anchors,
        }
    }
}
