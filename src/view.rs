//! Session-facing glue
//!
//! [`ArView`] is what a host application talks to. It owns the scene, the renderer and
//! the anchor synchronizer, routes tracking callbacks into them, and converts screen
//! points into the tracking subsystem's image coordinates for hit testing.

use cgmath::Point2;

use crate::gfx::geometry::{point_cloud, world_axes};
use crate::gfx::math::AffineTransform2D;
use crate::gfx::rendering::{FrameOutcome, RenderBackend, SceneRenderer};
use crate::gfx::scene::{Camera, GeometryId, NodeId, Scene};
use crate::tracking::{
    Anchor, AnchorEvent, AnchorId, AnchorSynchronizer, ArViewDelegate, DefaultDelegate,
    HitResult, HitTestTypes, SessionEvent, TrackingFrame, TrackingSession,
};

/// Length of each world axis gizmo line, in scene units
const WORLD_AXIS_LENGTH: f32 = 0.1;

/// Debug geometry drawn by the view itself
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DebugOptions {
    /// Rebuild a point cloud from each frame's raw feature points
    pub show_feature_points: bool,
    /// Draw colored axes at the world origin
    pub show_world_axes: bool,
}

impl Default for DebugOptions {
    fn default() -> Self {
        Self {
            show_feature_points: true,
            show_world_axes: true,
        }
    }
}

/// An augmented-reality view over a tracking session
pub struct ArView<B: RenderBackend> {
    scene: Scene,
    renderer: SceneRenderer<B>,
    synchronizer: AnchorSynchronizer,
    session: Box<dyn TrackingSession>,
    delegate: Box<dyn ArViewDelegate>,
    debug_options: DebugOptions,
    camera_node: NodeId,
    world_axis_node: NodeId,
    point_cloud_node: NodeId,
    world_axes: Option<GeometryId>,
    point_cloud: Option<GeometryId>,
    bounds: (f32, f32),
}

impl<B: RenderBackend> ArView<B> {
    /// Builds the default scene: a camera node used as point of view (outside the
    /// scene hierarchy) and two debug nodes under the root
    pub fn new(mut renderer: SceneRenderer<B>, session: Box<dyn TrackingSession>) -> Self {
        let mut scene = Scene::new();
        let root = scene.root();

        let camera_node = scene.create_node();
        if let Some(node) = scene.node_mut(camera_node) {
            node.name = Some("camera".to_string());
            node.camera = Some(Camera::default());
        }

        let world_axis_node = scene.create_node();
        let point_cloud_node = scene.create_node();
        for node in [world_axis_node, point_cloud_node] {
            if let Err(err) = scene.add_child(root, node) {
                log::error!("Failed to attach debug node: {}", err);
            }
        }

        renderer.set_point_of_view(Some(camera_node));
        let (width, height) = renderer.viewport();

        let mut view = Self {
            scene,
            renderer,
            synchronizer: AnchorSynchronizer::new(),
            session,
            delegate: Box::new(DefaultDelegate),
            debug_options: DebugOptions::default(),
            camera_node,
            world_axis_node,
            point_cloud_node,
            world_axes: None,
            point_cloud: None,
            bounds: (width as f32, height as f32),
        };
        view.apply_debug_options();
        view
    }

    pub fn with_delegate(mut self, delegate: Box<dyn ArViewDelegate>) -> Self {
        self.delegate = delegate;
        self
    }

    pub fn with_debug_options(mut self, options: DebugOptions) -> Self {
        self.set_debug_options(options);
        self
    }

    pub fn scene(&self) -> &Scene {
        &self.scene
    }

    pub fn scene_mut(&mut self) -> &mut Scene {
        &mut self.scene
    }

    pub fn renderer(&self) -> &SceneRenderer<B> {
        &self.renderer
    }

    pub fn renderer_mut(&mut self) -> &mut SceneRenderer<B> {
        &mut self.renderer
    }

    pub fn session_mut(&mut self) -> &mut dyn TrackingSession {
        self.session.as_mut()
    }

    pub fn delegate_mut(&mut self) -> &mut dyn ArViewDelegate {
        self.delegate.as_mut()
    }

    /// Point-of-view node driven by the tracking camera
    pub fn camera_node(&self) -> NodeId {
        self.camera_node
    }

    pub fn debug_options(&self) -> DebugOptions {
        self.debug_options
    }

    pub fn set_debug_options(&mut self, options: DebugOptions) {
        self.debug_options = options;
        self.apply_debug_options();
    }

    pub fn anchor_for_node(&self, node: NodeId) -> Option<&Anchor> {
        self.synchronizer.anchor_for_node(node)
    }

    pub fn node_for_anchor(&self, anchor: AnchorId) -> Option<NodeId> {
        self.synchronizer.node_for_anchor(anchor)
    }

    /// Stores the frame for the next draw and refreshes the feature point cloud
    pub fn on_frame_update(&mut self, frame: TrackingFrame) {
        if self.debug_options.show_feature_points {
            if let Some(points) = &frame.raw_feature_points {
                self.set_point_cloud(points);
            }
        }
        self.renderer.set_current_frame(Some(frame));
    }

    pub fn on_anchor_event(&mut self, event: &AnchorEvent) {
        self.synchronizer
            .apply(&mut self.scene, self.delegate.as_mut(), event);
    }

    /// Forwards session notifications to the delegate unchanged
    pub fn on_session_event(&mut self, event: &SessionEvent) {
        match event {
            SessionEvent::Failed(message) => log::error!("Tracking session failed: {}", message),
            SessionEvent::TrackingStateChanged(state) => log::info!("{}", state),
            SessionEvent::Interrupted => log::info!("Tracking session interrupted"),
            SessionEvent::InterruptionEnded => log::info!("Tracking session resumed"),
        }
        self.delegate.session_event(event);
    }

    /// Hit tests a point given in view pixels against the tracked world
    ///
    /// Empty without a current frame or with an empty view.
    pub fn hit_test(&mut self, point: Point2<f32>, types: HitTestTypes) -> Vec<HitResult> {
        match self.frame_point(point) {
            Some(frame_point) => self.session.hit_test(frame_point, types),
            None => Vec::new(),
        }
    }

    /// Adds an anchor at the first estimated horizontal plane under `point`
    ///
    /// The anchor becomes a node once the session reports it back as added.
    pub fn add_anchor_at(&mut self, point: Point2<f32>) -> Option<AnchorId> {
        let hit = self
            .hit_test(point, HitTestTypes::ESTIMATED_HORIZONTAL_PLANE)
            .into_iter()
            .next()?;
        let id = self.session.add_anchor(hit.world_transform);
        log::debug!("Requested anchor {:?} at distance {}", id, hit.distance);
        Some(id)
    }

    pub fn draw(&mut self) -> FrameOutcome {
        self.renderer.draw(Some(&mut self.scene))
    }

    /// Updates the view bounds and the renderer viewport
    pub fn resize(&mut self, width: u32, height: u32) {
        self.bounds = (width as f32, height as f32);
        self.renderer.set_viewport(width, height);
    }

    /// Converts view pixels to normalized image coordinates of the current frame
    fn frame_point(&self, point: Point2<f32>) -> Option<Point2<f32>> {
        let frame = self.renderer.current_frame()?;
        let (width, height) = self.bounds;
        if width <= 0.0 || height <= 0.0 {
            return None;
        }
        let unit = Point2::new(point.x / width, point.y / height);
        let display = frame
            .video
            .as_ref()
            .map(|v| v.display_transform)
            .unwrap_or(AffineTransform2D::IDENTITY);
        let inverse = display.inverted().unwrap_or(AffineTransform2D::IDENTITY);
        Some(inverse.apply(unit))
    }

    fn set_point_cloud(&mut self, points: &[[f32; 3]]) {
        let geometry = point_cloud(points);
        if let Some(id) = self.point_cloud {
            if self.scene.geometry(id).is_some() {
                if let Err(err) = self.scene.replace_geometry(id, geometry) {
                    log::error!("Failed to replace point cloud: {}", err);
                }
                return;
            }
        }
        let id = self.scene.add_geometry(geometry);
        self.point_cloud = Some(id);
        if let Err(err) = self.scene.set_geometry(self.point_cloud_node, Some(id)) {
            log::error!("Failed to attach point cloud: {}", err);
        }
    }

    fn apply_debug_options(&mut self) {
        match (self.debug_options.show_world_axes, self.world_axes) {
            (true, None) => {
                let id = self.scene.add_geometry(world_axes(WORLD_AXIS_LENGTH));
                self.world_axes = Some(id);
                if let Err(err) = self.scene.set_geometry(self.world_axis_node, Some(id)) {
                    log::error!("Failed to attach world axes: {}", err);
                }
            }
            (false, Some(id)) => {
                self.scene.remove_geometry(id);
                self.world_axes = None;
            }
            _ => {}
        }

        if !self.debug_options.show_feature_points {
            if let Some(id) = self.point_cloud.take() {
                self.scene.remove_geometry(id);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RendererConfig;
    use crate::gfx::math::ProjectionParams;
    use crate::gfx::rendering::HeadlessBackend;
    use crate::tracking::{ImagePlane, ScriptedSession, TrackingCamera, TrackingState, VideoFrame};
    use cgmath::{Matrix4, SquareMatrix};

    fn view() -> ArView<HeadlessBackend> {
        let mut renderer =
            SceneRenderer::new(HeadlessBackend::new(200, 100), RendererConfig::default());
        renderer.set_viewport(200, 100);
        ArView::new(renderer, Box::new(ScriptedSession::new()))
    }

    fn frame(points: Option<Vec<[f32; 3]>>) -> TrackingFrame {
        TrackingFrame {
            timestamp: 1.0,
            camera: TrackingCamera {
                pose: Matrix4::identity(),
                intrinsics: ProjectionParams {
                    focal_length: [100.0, 100.0],
                    principal_point: [100.0, 50.0],
                    image_resolution: [200.0, 100.0],
                },
                tracking_state: TrackingState::Normal,
            },
            video: None,
            raw_feature_points: points,
        }
    }

    #[test]
    fn test_default_scene_layout() {
        let view = view();
        let scene = view.scene();
        assert_eq!(scene.node(scene.root()).unwrap().children().len(), 2);
        assert!(!scene.is_reachable(view.camera_node()));
        assert!(scene.node(view.camera_node()).unwrap().camera.is_some());
        // world axes only; the point cloud waits for feature points
        assert_eq!(scene.visible_nodes().len(), 1);
    }

    #[test]
    fn test_feature_points_reuse_one_geometry() {
        let mut view = view();
        view.on_frame_update(frame(Some(vec![[0.0, 0.0, -1.0]])));
        let first = view.point_cloud;
        view.on_frame_update(frame(Some(vec![[0.0, 0.0, -1.0], [0.1, 0.0, -1.0]])));
        assert_eq!(view.point_cloud, first);

        let cloud = view.scene().geometry(first.unwrap()).unwrap();
        assert_eq!(cloud.elements[0].index_count, 2);
        assert_eq!(view.scene().visible_nodes().len(), 2);
    }

    #[test]
    fn test_debug_options_toggle_geometry() {
        let mut view = view();
        view.on_frame_update(frame(Some(vec![[0.0, 0.0, -1.0]])));
        view.set_debug_options(DebugOptions {
            show_feature_points: false,
            show_world_axes: false,
        });
        assert!(view.scene().visible_nodes().is_empty());

        view.on_frame_update(frame(Some(vec![[0.0, 0.0, -1.0]])));
        assert!(view.scene().visible_nodes().is_empty());
    }

    #[test]
    fn test_hit_test_requires_frame() {
        let mut view = view();
        assert!(view
            .hit_test(Point2::new(10.0, 10.0), HitTestTypes::ALL)
            .is_empty());
    }

    #[test]
    fn test_hit_test_point_goes_through_inverse_display_transform() {
        let mut renderer =
            SceneRenderer::new(HeadlessBackend::new(200, 100), RendererConfig::default());
        renderer.set_viewport(200, 100);
        let mut view = ArView::new(renderer, Box::new(ScriptedSession::new()));

        // portrait display transform: image (x, y) -> viewport (1 - y, x)
        let mut tracked = frame(None);
        tracked.video = Some(VideoFrame {
            luma: ImagePlane::new(2, 2, vec![0; 4]),
            chroma: ImagePlane::new(1, 1, vec![0; 2]),
            display_transform: AffineTransform2D::new(0.0, 1.0, -1.0, 0.0, 1.0, 0.0),
        });
        view.on_frame_update(tracked);

        let frame_point = view.frame_point(Point2::new(50.0, 75.0)).unwrap();
        // unit point (0.25, 0.75) -> image (0.75, 0.75)
        assert!((frame_point.x - 0.75).abs() < 1e-6);
        assert!((frame_point.y - 0.75).abs() < 1e-6);
    }
}
