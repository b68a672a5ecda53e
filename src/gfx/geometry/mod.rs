//! # Geometry
//!
//! Mesh records shared between scene nodes: CPU-side vertex buffers with a
//! [`VertexLayout`], and an ordered list of [`GeometryElement`]s, each an indexed draw
//! with exactly one [`Material`].
//!
//! GPU buffers are created lazily the first time a geometry is drawn, through whatever
//! [`RenderBackend`] the renderer runs on.
//!
//! ## Producers
//!
//! ```rust
//! use arscene::gfx::geometry::{generate_sphere, generate_plane, point_cloud};
//! use cgmath::Vector3;
//!
//! let sphere = generate_sphere(0.05, 24);
//! let plane = generate_plane(Vector3::new(0.0, 0.0, 0.0), 1.0, 0.5, 20);
//! let cloud = point_cloud(&[[0.0, 0.0, -1.0], [0.1, 0.0, -1.0]]);
//! assert_eq!(cloud.elements[0].index_count, 2);
//! # let _ = (sphere, plane);
//! ```

pub mod obj;
pub mod primitives;

pub use obj::load_obj;
pub use primitives::*;

use crate::gfx::rendering::{BufferHandle, RenderBackend};
use crate::gfx::resources::material::{Material, PropertyId};

/// Vertex attribute meaning, mapped to a fixed shader location
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum VertexSemantic {
    Position,
    Normal,
    TexCoord,
}

impl VertexSemantic {
    pub fn shader_location(self) -> u32 {
        match self {
            VertexSemantic::Position => 0,
            VertexSemantic::Normal => 1,
            VertexSemantic::TexCoord => 2,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct VertexAttribute {
    pub semantic: VertexSemantic,
    pub format: wgpu::VertexFormat,
    pub offset: u64,
}

/// One vertex buffer slot: stride plus the attributes read from it
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct VertexBufferDesc {
    pub stride: u64,
    pub attributes: Vec<VertexAttribute>,
}

/// Attribute layout across all vertex buffers of a geometry
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct VertexLayout {
    pub buffers: Vec<VertexBufferDesc>,
}

impl VertexLayout {
    pub fn has(&self, semantic: VertexSemantic) -> bool {
        self.buffers
            .iter()
            .flat_map(|b| b.attributes.iter())
            .any(|a| a.semantic == semantic)
    }

    /// Layouts carrying normals and texture coordinates get the lit material shader;
    /// everything else is drawn unlit
    pub fn is_lit(&self) -> bool {
        self.has(VertexSemantic::Position)
            && self.has(VertexSemantic::Normal)
            && self.has(VertexSemantic::TexCoord)
    }
}

/// An indexed draw within a [`Geometry`]
#[derive(Debug)]
pub struct GeometryElement {
    indices: Vec<u8>,
    pub primitive: wgpu::PrimitiveTopology,
    pub index_count: u32,
    pub index_format: wgpu::IndexFormat,
    /// Byte offset of the first index in the index buffer
    pub index_offset: u64,
    pub material: Material,
    index_buffer: Option<BufferHandle>,
}

impl Clone for GeometryElement {
    fn clone(&self) -> Self {
        Self {
            indices: self.indices.clone(),
            primitive: self.primitive,
            index_count: self.index_count,
            index_format: self.index_format,
            index_offset: self.index_offset,
            material: self.material.clone(),
            index_buffer: None,
        }
    }
}

impl GeometryElement {
    pub fn new_u32(indices: &[u32], primitive: wgpu::PrimitiveTopology) -> Self {
        Self::from_bytes(
            bytemuck::cast_slice(indices).to_vec(),
            indices.len() as u32,
            wgpu::IndexFormat::Uint32,
            primitive,
        )
    }

    pub fn new_u16(indices: &[u16], primitive: wgpu::PrimitiveTopology) -> Self {
        Self::from_bytes(
            bytemuck::cast_slice(indices).to_vec(),
            indices.len() as u32,
            wgpu::IndexFormat::Uint16,
            primitive,
        )
    }

    fn from_bytes(
        mut indices: Vec<u8>,
        index_count: u32,
        index_format: wgpu::IndexFormat,
        primitive: wgpu::PrimitiveTopology,
    ) -> Self {
        // buffer writes must be a multiple of 4 bytes
        indices.resize(indices.len().next_multiple_of(4), 0);
        Self {
            indices,
            primitive,
            index_count,
            index_format,
            index_offset: 0,
            material: Material::default(),
            index_buffer: None,
        }
    }

    pub fn with_material(mut self, material: Material) -> Self {
        self.material = material;
        self
    }

    pub fn index_buffer(&self) -> Option<BufferHandle> {
        self.index_buffer
    }
}

/// Vertex data plus draw elements, shareable between nodes
///
/// Clones start without GPU buffers and with fresh material property ids, so a clone
/// never shares GPU resources with its source.
#[derive(Debug)]
pub struct Geometry {
    pub label: String,
    vertex_data: Vec<Vec<u8>>,
    layout: VertexLayout,
    pub elements: Vec<GeometryElement>,
    vertex_buffers: Vec<BufferHandle>,
}

impl Clone for Geometry {
    fn clone(&self) -> Self {
        Self::new(
            self.label.clone(),
            self.vertex_data.clone(),
            self.layout.clone(),
            self.elements.clone(),
        )
    }
}

impl Geometry {
    /// Builds a geometry from raw vertex bytes, one entry per layout buffer slot
    pub fn new(
        label: impl Into<String>,
        vertex_data: Vec<Vec<u8>>,
        layout: VertexLayout,
        elements: Vec<GeometryElement>,
    ) -> Self {
        Self {
            label: label.into(),
            vertex_data,
            layout,
            elements,
            vertex_buffers: Vec::new(),
        }
    }

    /// Builds a single-buffer geometry from a slice of `Pod` vertices
    pub fn from_vertices<V: bytemuck::Pod>(
        label: impl Into<String>,
        vertices: &[V],
        layout: VertexLayout,
        elements: Vec<GeometryElement>,
    ) -> Self {
        Self::new(
            label,
            vec![bytemuck::cast_slice(vertices).to_vec()],
            layout,
            elements,
        )
    }

    pub fn layout(&self) -> &VertexLayout {
        &self.layout
    }

    /// Vertex count derived from the first buffer slot
    pub fn vertex_count(&self) -> usize {
        match (self.vertex_data.first(), self.layout.buffers.first()) {
            (Some(data), Some(desc)) if desc.stride > 0 => data.len() / desc.stride as usize,
            _ => 0,
        }
    }

    /// True when there are no vertices to draw
    pub fn is_empty(&self) -> bool {
        self.vertex_count() == 0
    }

    /// Empty geometry and elements without indices never get GPU buffers
    pub fn is_uploaded(&self) -> bool {
        self.is_empty()
            || (!self.vertex_buffers.is_empty()
                && self
                    .elements
                    .iter()
                    .all(|e| e.indices.is_empty() || e.index_buffer.is_some()))
    }

    /// GPU vertex buffers, empty until [`Geometry::upload`] has run
    pub fn vertex_buffers(&self) -> &[BufferHandle] {
        &self.vertex_buffers
    }

    /// Creates any missing GPU buffers from the CPU-side data
    pub fn upload<B: RenderBackend + ?Sized>(&mut self, backend: &mut B) {
        if self.is_empty() {
            log::trace!("Geometry '{}' has no vertices, nothing to upload", self.label);
            return;
        }
        if self.vertex_buffers.is_empty() {
            for (slot, data) in self.vertex_data.iter().enumerate() {
                let label = format!("{} Vertex Buffer {}", self.label, slot);
                self.vertex_buffers.push(backend.create_buffer_init(
                    &label,
                    wgpu::BufferUsages::VERTEX | wgpu::BufferUsages::COPY_DST,
                    data,
                ));
            }
        }
        for (i, element) in self.elements.iter_mut().enumerate() {
            if element.index_buffer.is_none() && !element.indices.is_empty() {
                let label = format!("{} Index Buffer {}", self.label, i);
                element.index_buffer = Some(backend.create_buffer_init(
                    &label,
                    wgpu::BufferUsages::INDEX | wgpu::BufferUsages::COPY_DST,
                    &element.indices,
                ));
            }
        }
        log::debug!(
            "Uploaded geometry '{}' ({} vertex buffer(s), {} element(s))",
            self.label,
            self.vertex_buffers.len(),
            self.elements.len()
        );
    }

    /// Every GPU buffer this geometry owns
    pub fn gpu_buffers(&self) -> Vec<BufferHandle> {
        self.vertex_buffers
            .iter()
            .copied()
            .chain(self.elements.iter().filter_map(|e| e.index_buffer))
            .collect()
    }

    /// Identities of every material property on every element
    pub fn property_ids(&self) -> Vec<PropertyId> {
        self.elements
            .iter()
            .flat_map(|e| e.material.property_ids())
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gfx::rendering::HeadlessBackend;

    #[test]
    fn test_u16_indices_are_padded() {
        let element = GeometryElement::new_u16(&[0, 1, 2], wgpu::PrimitiveTopology::TriangleList);
        assert_eq!(element.indices.len(), 8);
        assert_eq!(element.index_count, 3);
        assert_eq!(element.index_format, wgpu::IndexFormat::Uint16);
    }

    #[test]
    fn test_upload_is_lazy_and_once() {
        let mut backend = HeadlessBackend::new(64, 64);
        let mut sphere = generate_sphere(1.0, 8);
        assert!(!sphere.is_uploaded());
        assert!(sphere.gpu_buffers().is_empty());

        sphere.upload(&mut backend);
        let buffers = sphere.gpu_buffers();
        assert!(sphere.is_uploaded());
        assert_eq!(buffers.len(), 2);

        sphere.upload(&mut backend);
        assert_eq!(sphere.gpu_buffers(), buffers);
        assert_eq!(backend.live_buffer_count(), 2);

        let copy = sphere.clone();
        assert!(!copy.is_uploaded());
        assert_ne!(copy.property_ids(), sphere.property_ids());
    }

    #[test]
    fn test_empty_geometry_creates_no_buffers() {
        let mut backend = HeadlessBackend::new(64, 64);
        let mut cloud = point_cloud(&[]);
        assert!(cloud.is_empty());

        cloud.upload(&mut backend);
        assert!(cloud.is_uploaded());
        assert!(cloud.gpu_buffers().is_empty());
        assert_eq!(backend.live_buffer_count(), 0);
    }
}
