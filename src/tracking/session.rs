//! The tracking session collaborator

use cgmath::{Matrix4, Point2};

use super::anchor::{Anchor, AnchorEvent, AnchorId, AnchorKind};
use super::frame::TrackingState;

/// Kinds of surfaces a hit test may report
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct HitTestTypes(u32);

impl HitTestTypes {
    pub const NONE: Self = Self(0);
    pub const FEATURE_POINT: Self = Self(1 << 0);
    pub const ESTIMATED_HORIZONTAL_PLANE: Self = Self(1 << 1);
    pub const EXISTING_PLANE: Self = Self(1 << 2);
    pub const EXISTING_PLANE_USING_EXTENT: Self = Self(1 << 3);
    pub const ALL: Self = Self(0b1111);

    pub fn contains(&self, other: Self) -> bool {
        (self.0 & other.0) == other.0
    }

    pub fn intersects(&self, other: Self) -> bool {
        (self.0 & other.0) != 0
    }
}

impl std::ops::BitOr for HitTestTypes {
    type Output = Self;
    fn bitor(self, rhs: Self) -> Self::Output {
        Self(self.0 | rhs.0)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct HitResult {
    pub world_transform: Matrix4<f32>,
    /// Distance from the camera to the hit, in scene units
    pub distance: f32,
    /// The single surface type this result was found on
    pub kind: HitTestTypes,
    pub anchor: Option<AnchorId>,
}

/// Session-level notifications forwarded verbatim to the view delegate
#[derive(Debug, Clone, PartialEq)]
pub enum SessionEvent {
    Failed(String),
    TrackingStateChanged(TrackingState),
    Interrupted,
    InterruptionEnded,
}

/// Queries and commands the view issues against the tracking subsystem
pub trait TrackingSession {
    /// Hit test at a point in normalized image coordinates (`[0, 1]²`, origin top left)
    fn hit_test(&mut self, point: Point2<f32>, types: HitTestTypes) -> Vec<HitResult>;

    /// Registers a new anchor; it is reported back through a later `Added` event
    fn add_anchor(&mut self, transform: Matrix4<f32>) -> AnchorId;
}

/// A session driven by canned hit results, for tools, demos and tests
///
/// Hit tests return every canned result whose kind is among the requested types and
/// record the query. Added anchors are queued as an `Added` event for
/// [`ScriptedSession::drain_events`].
#[derive(Debug, Default)]
pub struct ScriptedSession {
    pub hits: Vec<HitResult>,
    queries: Vec<(Point2<f32>, HitTestTypes)>,
    pending: Vec<Anchor>,
}

impl ScriptedSession {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_hits(hits: Vec<HitResult>) -> Self {
        Self {
            hits,
            ..Self::default()
        }
    }

    /// Hit test queries received so far, in order
    pub fn queries(&self) -> &[(Point2<f32>, HitTestTypes)] {
        &self.queries
    }

    /// Events produced by the session since the last call
    pub fn drain_events(&mut self) -> Vec<AnchorEvent> {
        if self.pending.is_empty() {
            return Vec::new();
        }
        vec![AnchorEvent::added(std::mem::take(&mut self.pending))]
    }
}

impl TrackingSession for ScriptedSession {
    fn hit_test(&mut self, point: Point2<f32>, types: HitTestTypes) -> Vec<HitResult> {
        self.queries.push((point, types));
        let mut hits: Vec<HitResult> = self
            .hits
            .iter()
            .filter(|h| types.intersects(h.kind))
            .cloned()
            .collect();
        hits.sort_by(|a, b| a.distance.total_cmp(&b.distance));
        hits
    }

    fn add_anchor(&mut self, transform: Matrix4<f32>) -> AnchorId {
        let id = AnchorId::random();
        self.pending
            .push(Anchor::new(id, transform, AnchorKind::Generic));
        id
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cgmath::SquareMatrix;

    fn hit(kind: HitTestTypes, distance: f32) -> HitResult {
        HitResult {
            world_transform: Matrix4::identity(),
            distance,
            kind,
            anchor: None,
        }
    }

    #[test]
    fn test_hit_test_types_flags() {
        let types = HitTestTypes::FEATURE_POINT | HitTestTypes::EXISTING_PLANE;
        assert!(types.contains(HitTestTypes::EXISTING_PLANE));
        assert!(!types.contains(HitTestTypes::ESTIMATED_HORIZONTAL_PLANE));
        assert!(HitTestTypes::ALL.contains(types));
    }

    #[test]
    fn test_scripted_session_filters_and_sorts() {
        let mut session = ScriptedSession::with_hits(vec![
            hit(HitTestTypes::FEATURE_POINT, 0.5),
            hit(HitTestTypes::ESTIMATED_HORIZONTAL_PLANE, 2.0),
            hit(HitTestTypes::ESTIMATED_HORIZONTAL_PLANE, 1.0),
        ]);
        let hits = session.hit_test(
            Point2::new(0.5, 0.5),
            HitTestTypes::ESTIMATED_HORIZONTAL_PLANE,
        );
        assert_eq!(hits.len(), 2);
        assert_eq!(hits[0].distance, 1.0);
        assert_eq!(session.queries().len(), 1);
    }

    #[test]
    fn test_added_anchor_comes_back_as_event() {
        let mut session = ScriptedSession::new();
        let id = session.add_anchor(Matrix4::identity());
        let events = session.drain_events();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].anchors[0].id, id);
        assert!(session.drain_events().is_empty());
    }
}
