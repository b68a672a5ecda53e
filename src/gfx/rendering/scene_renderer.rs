//! Per-frame scene rendering
//!
//! [`SceneRenderer::draw`] runs one frame:
//!
//! 1. Recycle uniform buffers and destroy released resources the GPU is done with
//! 2. Check preconditions (scene, point of view, camera)
//! 3. Take an instance uniform buffer from the pool
//! 4. Sync the point of view and its projection from the current tracking frame
//! 5. Acquire the render target, or give the buffer back and skip
//! 6. Draw the camera feed behind everything
//! 7. Upload frame uniforms, then draw every visible node in breadth-first order
//! 8. Submit and retire the uniform buffer against the submission
//!
//! Missing preconditions never surface as errors; the frame is skipped and the next
//! one is attempted normally.

use cgmath::{Matrix4, SquareMatrix, Vector3, Vector4};

use crate::config::RendererConfig;
use crate::gfx::math::{matrix3_to_padded, AffineTransform2D, Transform};
use crate::gfx::resources::assets::{AssetSource, NoAssets};
use crate::gfx::resources::buffer_pool::{BufferPool, RetiredResource};
use crate::gfx::resources::material::TextureSlot;
use crate::gfx::resources::texture_cache::TextureCache;
use crate::gfx::scene::{NodeId, Scene};
use crate::tracking::TrackingFrame;

use super::backend::{
    CommandList, MaterialTextures, PipelineKey, RenderBackend, RenderCommand, RenderTarget,
    SubmissionIndex,
};
use super::pipeline_manager::PipelineManager;
use super::uniforms::{FrameUniforms, InstanceUniformWriter, InstanceUniforms};

/// Why a frame was not drawn
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SkipReason {
    NoScene,
    NoPointOfView,
    NoCamera,
    NoRenderTarget,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameStats {
    pub submission: SubmissionIndex,
    /// Nodes that received an instance uniform slot
    pub instances: usize,
    pub draw_calls: usize,
    pub video_drawn: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameOutcome {
    Submitted(FrameStats),
    Skipped(SkipReason),
}

impl FrameOutcome {
    pub fn is_submitted(&self) -> bool {
        matches!(self, FrameOutcome::Submitted(_))
    }
}

/// Draws a [`Scene`] from a point-of-view node over a [`RenderBackend`]
pub struct SceneRenderer<B: RenderBackend> {
    backend: B,
    config: RendererConfig,
    pipelines: PipelineManager,
    textures: TextureCache,
    uniform_pool: BufferPool,
    instance_writer: InstanceUniformWriter,
    assets: Box<dyn AssetSource>,
    point_of_view: Option<NodeId>,
    current_frame: Option<TrackingFrame>,
    viewport: (u32, u32),
    last_submission: SubmissionIndex,
    capacity: usize,
}

impl<B: RenderBackend> SceneRenderer<B> {
    pub fn new(backend: B, config: RendererConfig) -> Self {
        let capacity = config.max_instances.max(1);
        let uniform_pool = BufferPool::new(
            "Instance Uniform Buffer",
            wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
            config.pool_soft_limit,
        );
        Self {
            backend,
            config,
            pipelines: PipelineManager::new(),
            textures: TextureCache::new(),
            uniform_pool,
            instance_writer: InstanceUniformWriter::new(capacity),
            assets: Box::new(NoAssets),
            point_of_view: None,
            current_frame: None,
            viewport: (0, 0),
            last_submission: SubmissionIndex(0),
            capacity,
        }
    }

    pub fn with_assets(mut self, assets: Box<dyn AssetSource>) -> Self {
        self.assets = assets;
        self
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    pub fn backend_mut(&mut self) -> &mut B {
        &mut self.backend
    }

    pub fn config(&self) -> &RendererConfig {
        &self.config
    }

    pub fn pipelines(&self) -> &PipelineManager {
        &self.pipelines
    }

    pub fn textures(&self) -> &TextureCache {
        &self.textures
    }

    pub fn uniform_pool(&self) -> &BufferPool {
        &self.uniform_pool
    }

    /// Instance slots reserved per frame
    pub fn instance_capacity(&self) -> usize {
        self.capacity
    }

    pub fn point_of_view(&self) -> Option<NodeId> {
        self.point_of_view
    }

    pub fn set_point_of_view(&mut self, node: Option<NodeId>) {
        self.point_of_view = node;
    }

    pub fn current_frame(&self) -> Option<&TrackingFrame> {
        self.current_frame.as_ref()
    }

    pub fn set_current_frame(&mut self, frame: Option<TrackingFrame>) {
        self.current_frame = frame;
    }

    pub fn viewport(&self) -> (u32, u32) {
        self.viewport
    }

    /// Drawable size used for the projection and for point projection
    pub fn set_viewport(&mut self, width: u32, height: u32) {
        self.viewport = (width, height);
    }

    pub fn last_submission(&self) -> SubmissionIndex {
        self.last_submission
    }

    pub fn draw(&mut self, scene: Option<&mut Scene>) -> FrameOutcome {
        let completed = self.backend.completed_submission();
        self.uniform_pool.reclaim(&mut self.backend, completed);

        let Some(scene) = scene else {
            return self.skip(SkipReason::NoScene);
        };
        self.retire_released(scene);

        let Some(pov) = self.point_of_view.filter(|id| scene.contains(*id)) else {
            return self.skip(SkipReason::NoPointOfView);
        };
        if scene.node(pov).and_then(|n| n.camera.as_ref()).is_none() {
            return self.skip(SkipReason::NoCamera);
        }

        let visible = scene.visible_nodes();
        self.ensure_capacity(visible.len());

        // Begin frame
        let uniform_buffer = self.uniform_pool.dequeue(
            &mut self.backend,
            InstanceUniformWriter::buffer_size(self.capacity),
        );
        self.instance_writer.reset(self.capacity);

        self.sync_point_of_view(scene, pov);

        let Some(target) = self.backend.acquire_target() else {
            self.uniform_pool.enqueue(uniform_buffer);
            return self.skip(SkipReason::NoRenderTarget);
        };

        let mut commands = CommandList::new();
        let video_drawn = self.record_background(&mut commands, target);

        let view = scene.world_transform(pov).unwrap_or_else(Matrix4::identity);
        let projection = scene
            .node(pov)
            .and_then(|n| n.camera)
            .map(|c| c.projection)
            .unwrap_or_else(Matrix4::identity);
        commands.push(RenderCommand::SetFrameUniforms(FrameUniforms::new(
            view, projection,
        )));

        for node in &visible {
            let Some(geometry) = scene
                .node(*node)
                .and_then(|n| n.geometry())
                .and_then(|g| scene.geometry_mut(g))
            else {
                continue;
            };
            if !geometry.is_uploaded() {
                geometry.upload(&mut self.backend);
            }
        }

        let mut instances = 0;
        let mut current_pipeline = None;
        for node in &visible {
            let (Some(model), Some(geometry)) = (
                scene.world_transform(*node),
                scene
                    .node(*node)
                    .and_then(|n| n.geometry())
                    .and_then(|g| scene.geometry(g)),
            ) else {
                continue;
            };
            if geometry.is_empty() {
                log::trace!("Node {:?} has empty geometry, not drawn", node);
                continue;
            }

            let offset = match self
                .instance_writer
                .write(&InstanceUniforms::new(view, model))
            {
                Ok(offset) => offset,
                Err(err) => {
                    log::error!("Skipping node {:?}: {}", node, err);
                    continue;
                }
            };
            instances += 1;

            for (slot, buffer) in geometry.vertex_buffers().iter().enumerate() {
                commands.push(RenderCommand::SetVertexBuffer {
                    slot: slot as u32,
                    buffer: *buffer,
                });
            }
            commands.push(RenderCommand::SetInstanceUniforms {
                buffer: uniform_buffer.handle,
                offset,
            });

            for element in &geometry.elements {
                if element.index_count == 0 {
                    continue;
                }
                let Some(index_buffer) = element.index_buffer() else {
                    continue;
                };
                let key = PipelineKey::scene(
                    geometry.layout().clone(),
                    target.pass,
                    element.primitive,
                    element.material.fill_mode,
                );
                let Some(pipeline) = self.pipelines.get_or_create(&key, &mut self.backend) else {
                    continue;
                };
                if current_pipeline != Some(pipeline) {
                    commands.push(RenderCommand::SetPipeline(pipeline));
                    current_pipeline = Some(pipeline);
                }

                let material = &element.material;
                let mut resolve = |slot| {
                    self.textures.resolve(
                        material.property(slot),
                        &mut self.backend,
                        self.assets.as_ref(),
                    )
                };
                let textures = MaterialTextures {
                    diffuse: resolve(TextureSlot::Diffuse),
                    normal: resolve(TextureSlot::Normal),
                    emissive: resolve(TextureSlot::Emissive),
                };
                commands.push(RenderCommand::SetMaterialTextures(textures));
                commands.push(RenderCommand::DrawIndexed {
                    topology: element.primitive,
                    index_count: element.index_count,
                    index_format: element.index_format,
                    index_buffer,
                    index_offset: element.index_offset,
                });
            }
        }

        // End frame
        if !self.instance_writer.is_empty() {
            self.backend
                .write_buffer(uniform_buffer.handle, 0, self.instance_writer.as_bytes());
        }
        let draw_calls = commands.draw_count();
        let submission = self.backend.submit(target, commands);
        self.uniform_pool.retire(uniform_buffer, submission);
        for texture in self.textures.drain_retired() {
            self.uniform_pool
                .retire_resource(RetiredResource::Texture(texture), submission);
        }
        self.last_submission = submission;

        log::trace!(
            "Frame {} submitted: {} instance(s), {} draw(s)",
            submission.0,
            instances,
            draw_calls
        );
        FrameOutcome::Submitted(FrameStats {
            submission,
            instances,
            draw_calls,
            video_drawn,
        })
    }

    /// Projects a world-space point into viewport pixels using the current tracking camera
    ///
    /// `x` and `y` are pixels from the top-left corner, `z` is clip-space depth in
    /// `[0, 1]`. Returns `None` without a tracking frame or for points on the camera plane.
    pub fn project_point(&self, point: Vector3<f32>) -> Option<Vector3<f32>> {
        let view_projection = self.tracking_view_projection()?;
        let clip = view_projection * point.extend(1.0);
        if clip.w.abs() <= f32::EPSILON {
            return None;
        }
        let ndc = clip.truncate() / clip.w;
        let (width, height) = (self.viewport.0 as f32, self.viewport.1 as f32);
        Some(Vector3::new(
            (ndc.x + 1.0) * 0.5 * width,
            (1.0 - ndc.y) * 0.5 * height,
            ndc.z,
        ))
    }

    /// Inverse of [`SceneRenderer::project_point`]
    pub fn unproject_point(&self, point: Vector3<f32>) -> Option<Vector3<f32>> {
        let inverse = self.tracking_view_projection()?.invert()?;
        let (width, height) = (self.viewport.0 as f32, self.viewport.1 as f32);
        if width <= 0.0 || height <= 0.0 {
            return None;
        }
        let ndc = Vector4::new(
            point.x / width * 2.0 - 1.0,
            1.0 - point.y / height * 2.0,
            point.z,
            1.0,
        );
        let world = inverse * ndc;
        if world.w.abs() <= f32::EPSILON {
            return None;
        }
        Some(world.truncate() / world.w)
    }

    fn tracking_view_projection(&self) -> Option<Matrix4<f32>> {
        let camera = &self.current_frame.as_ref()?.camera;
        let projection = camera.projection_matrix(
            self.viewport_f32(),
            self.config.z_near,
            self.config.z_far,
        );
        Some(projection * camera.view_matrix())
    }

    fn viewport_f32(&self) -> (f32, f32) {
        (self.viewport.0 as f32, self.viewport.1 as f32)
    }

    fn skip(&self, reason: SkipReason) -> FrameOutcome {
        log::trace!("Frame skipped: {:?}", reason);
        FrameOutcome::Skipped(reason)
    }

    /// Grows the per-frame slot count to fit `visible` nodes
    fn ensure_capacity(&mut self, visible: usize) {
        if visible <= self.capacity {
            return;
        }
        let grown = visible.next_power_of_two();
        log::warn!(
            "Growing instance uniform capacity from {} to {} slots",
            self.capacity,
            grown
        );
        self.capacity = grown;
        self.uniform_pool
            .trim_below(&mut self.backend, InstanceUniformWriter::buffer_size(grown));
    }

    /// Schedules resources released by the scene for destruction after in-flight frames
    fn retire_released(&mut self, scene: &mut Scene) {
        let released = scene.take_released();
        if released.is_empty() {
            return;
        }
        log::debug!(
            "Retiring {} buffer(s) and {} material propert(ies)",
            released.buffers.len(),
            released.properties.len()
        );
        for buffer in released.buffers {
            self.uniform_pool
                .retire_resource(RetiredResource::Buffer(buffer), self.last_submission);
        }
        for property in released.properties {
            self.textures.evict(property);
        }
        for texture in self.textures.drain_retired() {
            self.uniform_pool
                .retire_resource(RetiredResource::Texture(texture), self.last_submission);
        }
    }

    /// Moves the point of view to the tracked camera and refreshes its projection
    fn sync_point_of_view(&mut self, scene: &mut Scene, pov: NodeId) {
        let Some(frame) = &self.current_frame else {
            return;
        };
        let projection =
            frame
                .camera
                .projection_matrix(self.viewport_f32(), self.config.z_near, self.config.z_far);
        let view = Transform::from_matrix(frame.camera.view_matrix());
        if let Some(node) = scene.node_mut(pov) {
            node.transform = view;
            if let Some(camera) = node.camera.as_mut() {
                camera.projection = projection;
            }
        }
    }

    fn record_background(&mut self, commands: &mut CommandList, target: RenderTarget) -> bool {
        let Some(video) = self.current_frame.as_ref().and_then(|f| f.video.as_ref()) else {
            return false;
        };
        let Some(textures) = self.backend.import_video_frame(video) else {
            log::debug!("Camera image could not be imported");
            return false;
        };
        let Some(pipeline) = self
            .pipelines
            .get_or_create(&PipelineKey::video_quad(target.pass), &mut self.backend)
        else {
            return false;
        };

        let display = video
            .display_transform
            .inverted()
            .unwrap_or(AffineTransform2D::IDENTITY);
        commands.push(RenderCommand::SetPipeline(pipeline));
        commands.push(RenderCommand::DrawVideoQuad {
            textures,
            display_matrix: matrix3_to_padded(display.to_matrix3()),
        });
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gfx::geometry::primitives::generate_sphere;
    use crate::gfx::math::ProjectionParams;
    use crate::gfx::rendering::uniforms::INSTANCE_UNIFORM_STRIDE;
    use crate::gfx::rendering::HeadlessBackend;
    use crate::gfx::scene::Camera;
    use crate::tracking::{TrackingCamera, TrackingState};

    fn renderer() -> SceneRenderer<HeadlessBackend> {
        let mut renderer =
            SceneRenderer::new(HeadlessBackend::new(640, 480), RendererConfig::default());
        renderer.set_viewport(640, 480);
        renderer
    }

    fn scene_with_camera() -> (Scene, NodeId) {
        let mut scene = Scene::new();
        let pov = scene.create_node();
        scene.node_mut(pov).unwrap().camera = Some(Camera::default());
        (scene, pov)
    }

    fn tracking_frame() -> TrackingFrame {
        TrackingFrame {
            timestamp: 0.0,
            camera: TrackingCamera {
                pose: Matrix4::identity(),
                intrinsics: ProjectionParams {
                    focal_length: [500.0, 500.0],
                    principal_point: [320.0, 240.0],
                    image_resolution: [640.0, 480.0],
                },
                tracking_state: TrackingState::Normal,
            },
            video: None,
            raw_feature_points: None,
        }
    }

    #[test]
    fn test_skip_reasons() {
        let mut renderer = renderer();
        assert_eq!(renderer.draw(None), FrameOutcome::Skipped(SkipReason::NoScene));

        let mut scene = Scene::new();
        assert_eq!(
            renderer.draw(Some(&mut scene)),
            FrameOutcome::Skipped(SkipReason::NoPointOfView)
        );

        let pov = scene.create_node();
        renderer.set_point_of_view(Some(pov));
        assert_eq!(
            renderer.draw(Some(&mut scene)),
            FrameOutcome::Skipped(SkipReason::NoCamera)
        );

        scene.node_mut(pov).unwrap().camera = Some(Camera::default());
        renderer.backend_mut().set_target_available(false);
        assert_eq!(
            renderer.draw(Some(&mut scene)),
            FrameOutcome::Skipped(SkipReason::NoRenderTarget)
        );
        assert!(renderer.backend().submissions().is_empty());
        assert_eq!(renderer.uniform_pool().free_count(), 1);
        assert_eq!(renderer.uniform_pool().in_flight_count(), 0);
    }

    #[test]
    fn test_instance_offsets_per_node() {
        let (mut scene, pov) = scene_with_camera();
        let sphere = scene.add_geometry(generate_sphere(0.1, 4));
        for _ in 0..3 {
            let node = scene.create_node();
            scene.add_child(scene.root(), node).unwrap();
            scene.set_geometry(node, Some(sphere)).unwrap();
        }

        let mut renderer = renderer();
        renderer.set_point_of_view(Some(pov));
        let FrameOutcome::Submitted(stats) = renderer.draw(Some(&mut scene)) else {
            panic!("frame was skipped");
        };
        assert_eq!(stats.instances, 3);
        assert_eq!(stats.draw_calls, 3);

        let offsets: Vec<u64> = renderer
            .backend()
            .last_submission()
            .unwrap()
            .commands
            .commands()
            .iter()
            .filter_map(|c| match c {
                RenderCommand::SetInstanceUniforms { offset, .. } => Some(*offset),
                _ => None,
            })
            .collect();
        assert_eq!(
            offsets,
            vec![0, INSTANCE_UNIFORM_STRIDE, 2 * INSTANCE_UNIFORM_STRIDE]
        );
    }

    #[test]
    fn test_capacity_grows_to_fit() {
        let (mut scene, pov) = scene_with_camera();
        let sphere = scene.add_geometry(generate_sphere(0.1, 4));
        for _ in 0..5 {
            let node = scene.create_node();
            scene.add_child(scene.root(), node).unwrap();
            scene.set_geometry(node, Some(sphere)).unwrap();
        }

        let mut renderer = SceneRenderer::new(
            HeadlessBackend::new(64, 64),
            RendererConfig::default().with_max_instances(2),
        );
        renderer.set_point_of_view(Some(pov));
        let FrameOutcome::Submitted(stats) = renderer.draw(Some(&mut scene)) else {
            panic!("frame was skipped");
        };
        assert_eq!(stats.instances, 5);
        assert_eq!(renderer.instance_capacity(), 8);
    }

    #[test]
    fn test_pose_sync_sets_view_from_tracking() {
        let (mut scene, pov) = scene_with_camera();
        let mut renderer = renderer();
        renderer.set_point_of_view(Some(pov));
        let mut frame = tracking_frame();
        frame.camera.pose = Matrix4::from_translation(Vector3::new(1.0, 0.0, 0.0));
        renderer.set_current_frame(Some(frame));

        assert!(renderer.draw(Some(&mut scene)).is_submitted());
        let view = scene.world_transform(pov).unwrap();
        assert!((view.w.x + 1.0).abs() < 1e-5);
    }

    #[test]
    fn test_project_point_center() {
        let mut renderer = renderer();
        assert_eq!(renderer.project_point(Vector3::new(0.0, 0.0, -1.0)), None);

        renderer.set_current_frame(Some(tracking_frame()));
        let projected = renderer.project_point(Vector3::new(0.0, 0.0, -1.0)).unwrap();
        assert!((projected.x - 320.0).abs() < 1e-3);
        assert!((projected.y - 240.0).abs() < 1e-3);

        let back = renderer.unproject_point(projected).unwrap();
        assert!((back - Vector3::new(0.0, 0.0, -1.0)).x.abs() < 1e-3);
        assert!((back.z + 1.0).abs() < 1e-3);
    }
}
