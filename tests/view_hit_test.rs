use std::cell::RefCell;
use std::rc::Rc;

use arscene::gfx::math::{AffineTransform2D, ProjectionParams};
use arscene::gfx::rendering::{FrameOutcome, HeadlessBackend, SceneRenderer, SkipReason};
use arscene::tracking::{
    AnchorId, HitResult, HitTestTypes, ImagePlane, TrackingCamera, TrackingFrame,
    TrackingSession, TrackingState, VideoFrame,
};
use arscene::{ArView, RendererConfig};
use cgmath::{Matrix4, Point2, SquareMatrix, Vector3};

#[derive(Default)]
struct Shared {
    queries: Vec<(Point2<f32>, HitTestTypes)>,
    anchors: Vec<Matrix4<f32>>,
}

/// Reports one horizontal plane hit two meters ahead for every query
struct RecordingSession(Rc<RefCell<Shared>>);

impl TrackingSession for RecordingSession {
    fn hit_test(&mut self, point: Point2<f32>, types: HitTestTypes) -> Vec<HitResult> {
        self.0.borrow_mut().queries.push((point, types));
        vec![HitResult {
            world_transform: Matrix4::from_translation(Vector3::new(0.0, -1.0, -2.0)),
            distance: 2.2,
            kind: HitTestTypes::ESTIMATED_HORIZONTAL_PLANE,
            anchor: None,
        }]
    }

    fn add_anchor(&mut self, transform: Matrix4<f32>) -> AnchorId {
        let mut shared = self.0.borrow_mut();
        shared.anchors.push(transform);
        AnchorId(shared.anchors.len() as u128)
    }
}

fn view(width: u32, height: u32) -> (ArView<HeadlessBackend>, Rc<RefCell<Shared>>) {
    let shared = Rc::new(RefCell::new(Shared::default()));
    let renderer = SceneRenderer::new(HeadlessBackend::new(width, height), RendererConfig::default());
    let mut view = ArView::new(renderer, Box::new(RecordingSession(shared.clone())));
    view.resize(width, height);
    (view, shared)
}

fn frame(display_transform: Option<AffineTransform2D>) -> TrackingFrame {
    TrackingFrame {
        timestamp: 2.0,
        camera: TrackingCamera {
            pose: Matrix4::identity(),
            intrinsics: ProjectionParams {
                focal_length: [400.0, 400.0],
                principal_point: [200.0, 100.0],
                image_resolution: [400.0, 200.0],
            },
            tracking_state: TrackingState::Normal,
        },
        video: display_transform.map(|display_transform| VideoFrame {
            luma: ImagePlane::new(4, 2, vec![0; 8]),
            chroma: ImagePlane::new(2, 1, vec![128; 4]),
            display_transform,
        }),
        raw_feature_points: None,
    }
}

fn assert_point(actual: Point2<f32>, x: f32, y: f32) {
    assert!(
        (actual.x - x).abs() < 1e-5 && (actual.y - y).abs() < 1e-5,
        "{:?} != ({}, {})",
        actual,
        x,
        y
    );
}

#[test]
fn test_hit_test_without_frame_is_empty() {
    let (mut view, shared) = view(400, 200);
    let hits = view.hit_test(Point2::new(100.0, 50.0), HitTestTypes::ALL);
    assert!(hits.is_empty());
    assert!(shared.borrow().queries.is_empty());
}

#[test]
fn test_hit_test_normalizes_view_points() {
    let (mut view, shared) = view(400, 200);
    view.on_frame_update(frame(None));

    let hits = view.hit_test(Point2::new(100.0, 150.0), HitTestTypes::FEATURE_POINT);
    assert_eq!(hits.len(), 1);

    let shared = shared.borrow();
    let (point, types) = shared.queries[0];
    assert_point(point, 0.25, 0.75);
    assert_eq!(types, HitTestTypes::FEATURE_POINT);
}

#[test]
fn test_hit_test_undoes_display_transform() {
    let (mut view, shared) = view(400, 200);
    // image (x, y) appears at viewport (1 - x, 1 - y)
    view.on_frame_update(frame(Some(AffineTransform2D::new(
        -1.0, 0.0, 0.0, -1.0, 1.0, 1.0,
    ))));

    view.hit_test(Point2::new(100.0, 50.0), HitTestTypes::ALL);
    assert_point(shared.borrow().queries[0].0, 0.75, 0.75);
}

#[test]
fn test_hit_test_with_singular_display_transform_uses_identity() {
    let (mut view, shared) = view(400, 200);
    view.on_frame_update(frame(Some(AffineTransform2D::new(
        0.0, 0.0, 0.0, 0.0, 0.0, 0.0,
    ))));

    view.hit_test(Point2::new(200.0, 100.0), HitTestTypes::ALL);
    assert_point(shared.borrow().queries[0].0, 0.5, 0.5);
}

#[test]
fn test_add_anchor_at_uses_first_estimated_plane_hit() {
    let (mut view, shared) = view(400, 200);
    view.on_frame_update(frame(None));

    let id = view.add_anchor_at(Point2::new(200.0, 100.0));
    assert_eq!(id, Some(AnchorId(1)));

    let shared = shared.borrow();
    assert_eq!(shared.queries[0].1, HitTestTypes::ESTIMATED_HORIZONTAL_PLANE);
    assert_eq!(
        shared.anchors,
        vec![Matrix4::from_translation(Vector3::new(0.0, -1.0, -2.0))]
    );
}

#[test]
fn test_add_anchor_without_frame_does_nothing() {
    let (mut view, shared) = view(400, 200);
    assert_eq!(view.add_anchor_at(Point2::new(200.0, 100.0)), None);
    assert!(shared.borrow().anchors.is_empty());
}

#[test]
fn test_view_draws_with_its_own_camera() {
    let (mut view, _) = view(400, 200);
    let FrameOutcome::Submitted(stats) = view.draw() else {
        panic!("frame skipped");
    };
    // the world axes
    assert_eq!(stats.instances, 1);
    assert!(!stats.video_drawn);

    view.on_frame_update(frame(Some(AffineTransform2D::IDENTITY)));
    let FrameOutcome::Submitted(stats) = view.draw() else {
        panic!("frame skipped");
    };
    assert!(stats.video_drawn);

    view.renderer_mut().backend_mut().set_target_available(false);
    assert_eq!(view.draw(), FrameOutcome::Skipped(SkipReason::NoRenderTarget));
}
