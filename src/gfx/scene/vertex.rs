//! # Vertex Data Structures
//!
//! GPU-compatible vertex formats used by the built-in geometry producers, and the
//! [`VertexLayout`] description that pipelines are keyed on.

use crate::gfx::geometry::{VertexAttribute, VertexBufferDesc, VertexLayout, VertexSemantic};

/// A lit vertex with position, normal and texture coordinates.
///
/// # Memory Layout
///
/// The `#[repr(C)]` attribute ensures the struct has a C-compatible memory
/// layout, which is required for GPU buffer operations.
#[repr(C)]
#[derive(Copy, Clone, Debug, PartialEq, bytemuck::Pod, bytemuck::Zeroable)]
pub struct Vertex3D {
    /// 3D position coordinates [x, y, z]
    pub position: [f32; 3],
    /// 3D normal vector [nx, ny, nz] for lighting calculations
    pub normal: [f32; 3],
    /// Texture coordinates [u, v]
    pub tex_coords: [f32; 2],
}

impl Vertex3D {
    /// Returns the single-buffer layout describing this vertex.
    ///
    /// - Position (Float32x3) at offset 0
    /// - Normal (Float32x3) at offset 12
    /// - TexCoord (Float32x2) at offset 24
    pub fn layout() -> VertexLayout {
        use std::mem;
        VertexLayout {
            buffers: vec![VertexBufferDesc {
                stride: mem::size_of::<Vertex3D>() as u64,
                attributes: vec![
                    VertexAttribute {
                        semantic: VertexSemantic::Position,
                        format: wgpu::VertexFormat::Float32x3,
                        offset: 0,
                    },
                    VertexAttribute {
                        semantic: VertexSemantic::Normal,
                        format: wgpu::VertexFormat::Float32x3,
                        offset: mem::size_of::<[f32; 3]>() as u64,
                    },
                    VertexAttribute {
                        semantic: VertexSemantic::TexCoord,
                        format: wgpu::VertexFormat::Float32x2,
                        offset: mem::size_of::<[f32; 6]>() as u64,
                    },
                ],
            }],
        }
    }
}

/// A position-only vertex, used for point clouds and debug lines.
#[repr(C)]
#[derive(Copy, Clone, Debug, PartialEq, bytemuck::Pod, bytemuck::Zeroable)]
pub struct PointVertex {
    pub position: [f32; 3],
}

impl PointVertex {
    pub fn layout() -> VertexLayout {
        VertexLayout {
            buffers: vec![VertexBufferDesc {
                stride: std::mem::size_of::<PointVertex>() as u64,
                attributes: vec![VertexAttribute {
                    semantic: VertexSemantic::Position,
                    format: wgpu::VertexFormat::Float32x3,
                    offset: 0,
                }],
            }],
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_vertex_layout_matches_struct() {
        let layout = Vertex3D::layout();
        assert_eq!(layout.buffers[0].stride, 32);
        assert_eq!(layout.buffers[0].attributes[2].offset, 24);
        assert!(layout.is_lit());
        assert!(!PointVertex::layout().is_lit());
    }
}
