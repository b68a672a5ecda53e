//! Desktop demo: a synthetic tracking session rendered through the wgpu backend
//!
//! The session fakes a slowly swaying camera above a floor one meter down, a scrolling
//! camera image and scattered feature points. After a moment it reports a floor plane;
//! clicking anywhere adds an anchor where the click ray meets the floor.

use std::cell::RefCell;
use std::rc::Rc;
use std::sync::Arc;
use std::time::Instant;

use anyhow::Result;
use cgmath::{InnerSpace, Matrix4, Point2, Rad, Vector2, Vector3, Vector4};
use rand::Rng;
use winit::{
    application::ApplicationHandler,
    dpi::PhysicalSize,
    event::{ElementState, MouseButton, WindowEvent},
    event_loop::{ActiveEventLoop, ControlFlow, EventLoop},
    window::{Window, WindowAttributes, WindowId},
};

use arscene::gfx::geometry::{generate_plane, generate_sphere, load_obj, Geometry};
use arscene::gfx::math::{AffineTransform2D, ProjectionParams, Transform};
use arscene::gfx::rendering::{FrameOutcome, SceneRenderer, WgpuBackend};
use arscene::gfx::resources::{Color, FillMode, Material};
use arscene::gfx::scene::{GeometryId, NodeId, Scene};
use arscene::tracking::{
    Anchor, AnchorEvent, AnchorId, AnchorKind, ArViewDelegate, HitResult, HitTestTypes,
    ImagePlane, LimitedReason, SessionEvent, TrackingCamera, TrackingFrame, TrackingSession,
    TrackingState, VideoFrame,
};
use arscene::{ArView, RendererConfig};

const IMAGE_SIZE: (u32, u32) = (640, 480);
const FLOOR_HEIGHT: f32 = -1.0;
const FEATURE_POINTS: usize = 200;
const PLANE_DELAY_SECS: f32 = 1.5;
const MODEL_SCALE: f32 = 0.04;

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let config = RendererConfig::from_env()?;
    let event_loop = EventLoop::new()?;
    event_loop.set_control_flow(ControlFlow::Poll);

    let mut app = DemoApp::new(config, std::env::args().nth(1));
    event_loop.run_app(&mut app)?;
    Ok(())
}

/// Anchors minted by the session, waiting to be reported back as added
type PendingAnchors = Rc<RefCell<Vec<Anchor>>>;

/// Tracking session that hit tests against a fixed floor plane
struct SyntheticSession {
    camera: Rc<RefCell<TrackingCamera>>,
    pending: PendingAnchors,
}

impl TrackingSession for SyntheticSession {
    fn hit_test(&mut self, point: Point2<f32>, types: HitTestTypes) -> Vec<HitResult> {
        let wanted = HitTestTypes::ESTIMATED_HORIZONTAL_PLANE | HitTestTypes::EXISTING_PLANE;
        if !types.intersects(wanted) {
            return Vec::new();
        }
        let camera = *self.camera.borrow();
        let ProjectionParams {
            focal_length: [fx, fy],
            principal_point: [cx, cy],
            image_resolution: [width, height],
        } = camera.intrinsics;

        let local = Vector4::new(
            (point.x * width - cx) / fx,
            -(point.y * height - cy) / fy,
            -1.0,
            0.0,
        );
        let direction = (camera.pose * local).truncate().normalize();
        let origin = camera.pose.w.truncate();
        if direction.y >= -f32::EPSILON {
            return Vec::new();
        }
        let distance = (FLOOR_HEIGHT - origin.y) / direction.y;
        let hit = origin + direction * distance;

        vec![HitResult {
            world_transform: Matrix4::from_translation(hit),
            distance,
            kind: HitTestTypes::ESTIMATED_HORIZONTAL_PLANE,
            anchor: None,
        }]
    }

    fn add_anchor(&mut self, transform: Matrix4<f32>) -> AnchorId {
        let id = AnchorId::random();
        self.pending
            .borrow_mut()
            .push(Anchor::new(id, transform, AnchorKind::Generic));
        id
    }
}

/// Produces frames and anchor events for the synthetic session
struct SyntheticTracker {
    start: Instant,
    camera: Rc<RefCell<TrackingCamera>>,
    pending: PendingAnchors,
    floor: Option<Anchor>,
    features: Vec<[f32; 3]>,
}

impl SyntheticTracker {
    fn new() -> (Self, SyntheticSession) {
        let (width, height) = IMAGE_SIZE;
        let camera = Rc::new(RefCell::new(TrackingCamera {
            pose: Matrix4::from_translation(Vector3::new(0.0, 0.0, 0.0)),
            intrinsics: ProjectionParams {
                focal_length: [width as f32 * 0.9, width as f32 * 0.9],
                principal_point: [width as f32 / 2.0, height as f32 / 2.0],
                image_resolution: [width as f32, height as f32],
            },
            tracking_state: TrackingState::Limited(LimitedReason::Initializing),
        }));
        let pending = PendingAnchors::default();

        let mut rng = rand::rng();
        let features = (0..FEATURE_POINTS)
            .map(|_| {
                [
                    rng.random_range(-2.0..2.0),
                    FLOOR_HEIGHT + rng.random_range(0.0..0.05),
                    rng.random_range(-4.0..-0.5),
                ]
            })
            .collect();

        let session = SyntheticSession {
            camera: camera.clone(),
            pending: pending.clone(),
        };
        let tracker = Self {
            start: Instant::now(),
            camera,
            pending,
            floor: None,
            features,
        };
        (tracker, session)
    }

    fn frame(&mut self) -> TrackingFrame {
        let t = self.start.elapsed().as_secs_f32();
        let sway = Matrix4::from_angle_y(Rad(0.15 * (t * 0.5).sin()))
            * Matrix4::from_angle_x(Rad(-0.25));
        let pose = Matrix4::from_translation(Vector3::new(0.2 * (t * 0.3).sin(), 0.0, 0.0)) * sway;

        let mut camera = self.camera.borrow_mut();
        camera.pose = pose;
        camera.tracking_state = if t < PLANE_DELAY_SECS {
            TrackingState::Limited(LimitedReason::Initializing)
        } else {
            TrackingState::Normal
        };

        TrackingFrame {
            timestamp: t as f64,
            camera: *camera,
            video: Some(Self::video(t)),
            raw_feature_points: Some(self.features.clone()),
        }
    }

    /// Scrolling luma gradient with neutral chroma
    fn video(t: f32) -> VideoFrame {
        let (width, height) = IMAGE_SIZE;
        let shift = (t * 40.0) as u32;
        let luma = (0..height)
            .flat_map(|y| (0..width).map(move |x| ((x + y + shift) % 256) as u8 / 2 + 32))
            .collect();
        let chroma = vec![128; (width / 2 * height / 2 * 2) as usize];
        VideoFrame {
            luma: ImagePlane::new(width, height, luma),
            chroma: ImagePlane::new(width / 2, height / 2, chroma),
            display_transform: AffineTransform2D::IDENTITY,
        }
    }

    fn events(&mut self) -> Vec<AnchorEvent> {
        let mut events = Vec::new();
        let t = self.start.elapsed().as_secs_f32();

        if let Some(floor) = self.floor.as_mut() {
            // the plane grows as more of the floor is "seen"
            let size = (0.5 + (t - PLANE_DELAY_SECS) * 0.2).min(3.0);
            if let AnchorKind::Plane { extent, .. } = &mut floor.kind {
                if (extent.x - size).abs() > 0.05 {
                    *extent = Vector2::new(size, size);
                    events.push(AnchorEvent::updated(vec![floor.clone()]));
                }
            }
        } else if t >= PLANE_DELAY_SECS {
            let floor = Anchor::new(
                AnchorId::random(),
                Matrix4::from_translation(Vector3::new(0.0, FLOOR_HEIGHT, -2.0)),
                AnchorKind::Plane {
                    center: Vector3::new(0.0, 0.0, 0.0),
                    extent: Vector2::new(0.5, 0.5),
                },
            );
            events.push(AnchorEvent::added(vec![floor.clone()]));
            self.floor = Some(floor);
        }

        let pending = std::mem::take(&mut *self.pending.borrow_mut());
        if !pending.is_empty() {
            events.push(AnchorEvent::added(pending));
        }
        events
    }
}

/// Wireframe planes for plane anchors, a small model for everything else
///
/// The model geometry is added to the scene once and shared by every model node.
struct DemoDelegate {
    model: Option<Geometry>,
    model_id: Option<GeometryId>,
}

impl DemoDelegate {
    fn new(model: Option<Geometry>) -> Self {
        Self {
            model,
            model_id: None,
        }
    }

    fn plane_geometry(center: Vector3<f32>, extent: Vector2<f32>) -> Geometry {
        let mut plane = generate_plane(center, extent.x, extent.y, 20);
        for element in &mut plane.elements {
            element.material = Material::new("Plane")
                .with_diffuse(Color::WHITE)
                .with_fill_mode(FillMode::Wireframe);
        }
        plane
    }

    fn model_geometry(&mut self, scene: &mut Scene) -> GeometryId {
        if let Some(id) = self.model_id.filter(|id| scene.geometry(*id).is_some()) {
            return id;
        }
        let geometry = self.model.take().unwrap_or_else(|| {
            let mut sphere = generate_sphere(1.0, 24);
            for element in &mut sphere.elements {
                element.material =
                    Material::new("Marker").with_diffuse(Color::rgb(0.9, 0.3, 0.2));
            }
            sphere
        });
        let id = scene.add_geometry(geometry);
        self.model_id = Some(id);
        id
    }
}

impl ArViewDelegate for DemoDelegate {
    fn node_for_anchor(&mut self, scene: &mut Scene, anchor: &Anchor) -> Option<NodeId> {
        let node = scene.create_node_with_transform(Transform::from_matrix(anchor.transform));
        let child = match anchor.kind {
            AnchorKind::Plane { center, extent } => {
                let geometry = scene.add_geometry(Self::plane_geometry(center, extent));
                let child = scene.create_node();
                scene.set_geometry(child, Some(geometry)).ok()?;
                child
            }
            _ => {
                let geometry = self.model_geometry(scene);
                let child = scene.create_node_with_transform(Transform::from_scale(MODEL_SCALE));
                scene.set_geometry(child, Some(geometry)).ok()?;
                child
            }
        };
        if let Err(err) = scene.add_child(node, child) {
            log::warn!("Failed to build anchor node: {}", err);
        }
        Some(node)
    }

    fn did_update_node(&mut self, scene: &mut Scene, node: NodeId, anchor: &Anchor) {
        let AnchorKind::Plane { center, extent } = anchor.kind else {
            return;
        };
        let Some(geometry) = scene
            .node(node)
            .and_then(|n| n.children().first().copied())
            .and_then(|child| scene.node(child))
            .and_then(|child| child.geometry())
        else {
            return;
        };
        if let Err(err) = scene.replace_geometry(geometry, Self::plane_geometry(center, extent)) {
            log::warn!("Failed to resize plane: {}", err);
        }
    }

    fn did_remove_node(&mut self, scene: &mut Scene, node: NodeId, anchor: &Anchor) {
        if let AnchorKind::Plane { .. } = anchor.kind {
            let plane = scene
                .node(node)
                .and_then(|n| n.children().first().copied())
                .and_then(|child| scene.node(child))
                .and_then(|child| child.geometry());
            if let Some(geometry) = plane {
                scene.remove_geometry(geometry);
            }
        }
        if let Err(err) = scene.remove_node(node) {
            log::warn!("Failed to drop anchor node {:?}: {}", node, err);
        }
        log::info!(
            "Anchor node {:?} removed, {} nodes left",
            node,
            scene.node_count()
        );
    }

    fn session_event(&mut self, event: &SessionEvent) {
        log::debug!("Session event: {:?}", event);
    }
}

struct DemoApp {
    config: RendererConfig,
    model_path: Option<String>,
    window: Option<Arc<Window>>,
    view: Option<ArView<WgpuBackend>>,
    tracker: Option<SyntheticTracker>,
    cursor: Point2<f32>,
    last_state: Option<TrackingState>,
}

impl DemoApp {
    fn new(config: RendererConfig, model_path: Option<String>) -> Self {
        Self {
            config,
            model_path,
            window: None,
            view: None,
            tracker: None,
            cursor: Point2::new(0.0, 0.0),
            last_state: None,
        }
    }

    fn load_model(&self) -> Option<Geometry> {
        let path = self.model_path.as_ref()?;
        match load_obj(path) {
            Ok(model) => Some(model),
            Err(err) => {
                log::warn!("Failed to load {}: {}; using a sphere", path, err);
                None
            }
        }
    }

    fn tick(&mut self) {
        let (Some(view), Some(tracker)) = (self.view.as_mut(), self.tracker.as_mut()) else {
            return;
        };

        let frame = tracker.frame();
        let state = frame.camera.tracking_state;
        if self.last_state != Some(state) {
            view.on_session_event(&SessionEvent::TrackingStateChanged(state));
            self.last_state = Some(state);
        }
        for event in tracker.events() {
            view.on_anchor_event(&event);
        }
        view.on_frame_update(frame);

        if let FrameOutcome::Skipped(reason) = view.draw() {
            log::trace!("Frame skipped: {:?}", reason);
        }
    }
}

impl ApplicationHandler for DemoApp {
    fn resumed(&mut self, event_loop: &ActiveEventLoop) {
        if self.window.is_some() {
            return;
        }

        let window = match event_loop.create_window(
            WindowAttributes::default()
                .with_title("arscene")
                .with_inner_size(winit::dpi::LogicalSize::new(1200, 800)),
        ) {
            Ok(window) => Arc::new(window),
            Err(err) => {
                log::error!("Failed to create window: {}", err);
                event_loop.exit();
                return;
            }
        };
        let (width, height) = window.inner_size().into();

        let backend = match pollster::block_on(WgpuBackend::new(
            window.clone(),
            width,
            height,
            &self.config,
        )) {
            Ok(backend) => backend,
            Err(err) => {
                log::error!("Failed to initialize renderer: {}", err);
                event_loop.exit();
                return;
            }
        };

        let (tracker, session) = SyntheticTracker::new();
        let delegate = DemoDelegate::new(self.load_model());
        let mut renderer = SceneRenderer::new(backend, self.config.clone());
        renderer.set_viewport(width, height);
        let mut view = ArView::new(renderer, Box::new(session)).with_delegate(Box::new(delegate));
        view.resize(width, height);

        self.window = Some(window);
        self.view = Some(view);
        self.tracker = Some(tracker);
    }

    fn window_event(&mut self, event_loop: &ActiveEventLoop, _window_id: WindowId, event: WindowEvent) {
        match event {
            WindowEvent::KeyboardInput {
                event:
                    winit::event::KeyEvent {
                        physical_key: winit::keyboard::PhysicalKey::Code(key_code),
                        ..
                    },
                ..
            } => {
                if matches!(key_code, winit::keyboard::KeyCode::Escape) {
                    event_loop.exit();
                }
            }
            WindowEvent::Resized(PhysicalSize { width, height }) => {
                if let Some(view) = self.view.as_mut() {
                    view.renderer_mut().backend_mut().resize(width, height);
                    view.resize(width, height);
                }
            }
            WindowEvent::CursorMoved { position, .. } => {
                self.cursor = Point2::new(position.x as f32, position.y as f32);
            }
            WindowEvent::MouseInput {
                state: ElementState::Pressed,
                button: MouseButton::Left,
                ..
            } => {
                if let Some(view) = self.view.as_mut() {
                    match view.add_anchor_at(self.cursor) {
                        Some(id) => log::info!("Placed anchor {:032x}", id.0),
                        None => log::info!("Nothing to anchor under the cursor"),
                    }
                }
            }
            WindowEvent::CloseRequested => {
                event_loop.exit();
            }
            WindowEvent::RedrawRequested => {
                self.tick();
            }
            _ => (),
        }
    }

    fn about_to_wait(&mut self, _event_loop: &ActiveEventLoop) {
        if let Some(ref window) = self.window {
            window.request_redraw();
        }
    }
}
