//! Render pipeline caching
//!
//! Pipelines are created lazily the first time a [`PipelineKey`] is requested and kept
//! for the lifetime of the renderer. A key whose creation failed is remembered as failed
//! so the backend is not asked again every frame.

use std::collections::HashMap;

use super::backend::{PipelineHandle, PipelineKey, RenderBackend};

/// Caches compiled pipelines by vertex layout, pass signature and draw state
#[derive(Debug, Default)]
pub struct PipelineManager {
    pipelines: HashMap<PipelineKey, Option<PipelineHandle>>,
    requests: u64,
}

impl PipelineManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Gets or creates the pipeline for `key`
    ///
    /// # Returns
    /// The cached handle, or `None` if creation failed (now or on an earlier frame)
    pub fn get_or_create<B: RenderBackend + ?Sized>(
        &mut self,
        key: &PipelineKey,
        backend: &mut B,
    ) -> Option<PipelineHandle> {
        self.requests += 1;
        if let Some(cached) = self.pipelines.get(key) {
            return *cached;
        }

        let created = match backend.create_pipeline(key) {
            Ok(handle) => {
                log::debug!(
                    "Created {:?} pipeline for {:?} ({:?}, {:?})",
                    key.kind,
                    key.pass.color_format,
                    key.topology,
                    key.fill_mode
                );
                Some(handle)
            }
            Err(err) => {
                log::error!("Failed to create {:?} pipeline: {}", key.kind, err);
                None
            }
        };
        self.pipelines.insert(key.clone(), created);
        created
    }

    pub fn contains(&self, key: &PipelineKey) -> bool {
        self.pipelines.contains_key(key)
    }

    /// Forgets every pipeline, e.g. after the surface format changed
    pub fn clear(&mut self) {
        self.pipelines.clear();
    }

    pub fn get_stats(&self) -> PipelineStats {
        let failed = self.pipelines.values().filter(|p| p.is_none()).count();
        PipelineStats {
            total_pipelines: self.pipelines.len() - failed,
            failed_pipelines: failed,
            requests: self.requests,
        }
    }
}

/// Statistics about pipeline manager state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PipelineStats {
    pub total_pipelines: usize,
    pub failed_pipelines: usize,
    pub requests: u64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gfx::rendering::backend::PassSignature;
    use crate::gfx::rendering::HeadlessBackend;
    use crate::gfx::resources::material::FillMode;
    use crate::gfx::scene::{PointVertex, Vertex3D};

    fn pass() -> PassSignature {
        PassSignature {
            color_format: wgpu::TextureFormat::Bgra8Unorm,
            depth_format: Some(wgpu::TextureFormat::Depth32Float),
        }
    }

    #[test]
    fn test_pipeline_created_once_per_key() {
        let mut backend = HeadlessBackend::new(8, 8);
        let mut manager = PipelineManager::new();
        let lit = PipelineKey::scene(
            Vertex3D::layout(),
            pass(),
            wgpu::PrimitiveTopology::TriangleList,
            FillMode::Solid,
        );
        let points = PipelineKey::scene(
            PointVertex::layout(),
            pass(),
            wgpu::PrimitiveTopology::PointList,
            FillMode::Solid,
        );

        let first = manager.get_or_create(&lit, &mut backend).unwrap();
        let again = manager.get_or_create(&lit, &mut backend).unwrap();
        let other = manager.get_or_create(&points, &mut backend).unwrap();

        assert_eq!(first, again);
        assert_ne!(first, other);
        assert_eq!(backend.pipeline_count(), 2);
        assert_eq!(manager.get_stats().total_pipelines, 2);
        assert_eq!(manager.get_stats().requests, 3);
    }

    #[test]
    fn test_wireframe_is_a_distinct_pipeline() {
        let mut backend = HeadlessBackend::new(8, 8);
        let mut manager = PipelineManager::new();
        let solid = PipelineKey::scene(
            Vertex3D::layout(),
            pass(),
            wgpu::PrimitiveTopology::TriangleList,
            FillMode::Solid,
        );
        let wire = PipelineKey {
            fill_mode: FillMode::Wireframe,
            ..solid.clone()
        };
        assert_ne!(
            manager.get_or_create(&solid, &mut backend),
            manager.get_or_create(&wire, &mut backend)
        );
    }

    #[test]
    fn test_failed_creation_is_cached() {
        let mut backend = HeadlessBackend::new(8, 8);
        backend.set_fail_pipelines(true);
        let mut manager = PipelineManager::new();
        let key = PipelineKey::video_quad(pass());

        assert_eq!(manager.get_or_create(&key, &mut backend), None);
        backend.set_fail_pipelines(false);
        assert_eq!(manager.get_or_create(&key, &mut backend), None);
        assert_eq!(manager.get_stats().failed_pipelines, 1);

        manager.clear();
        assert!(manager.get_or_create(&key, &mut backend).is_some());
    }
}
