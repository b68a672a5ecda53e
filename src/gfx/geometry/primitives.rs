//! Procedural geometry producers
//!
//! All producers return CPU-side [`Geometry`] with a single default material per
//! element; GPU buffers are created on first draw.

use std::f32::consts::PI;

use cgmath::Vector3;

use super::{Geometry, GeometryElement};
use crate::gfx::resources::material::{Color, Material};
use crate::gfx::scene::vertex::{PointVertex, Vertex3D};

/// UV sphere of the given radius centered at the origin
///
/// `segments` is used for both the longitude and latitude resolution.
pub fn generate_sphere(radius: f32, segments: u32) -> Geometry {
    let long_segs = segments.max(3);
    let lat_segs = segments.max(2);

    let mut vertices = Vec::with_capacity(((long_segs + 1) * (lat_segs + 1)) as usize);
    for lat in 0..=lat_segs {
        let theta = lat as f32 * PI / lat_segs as f32; // 0 to PI
        let (sin_theta, cos_theta) = theta.sin_cos();

        for long in 0..=long_segs {
            let phi = long as f32 * 2.0 * PI / long_segs as f32; // 0 to 2*PI
            let (sin_phi, cos_phi) = phi.sin_cos();

            let normal = [sin_theta * cos_phi, cos_theta, sin_theta * sin_phi];
            vertices.push(Vertex3D {
                position: [radius * normal[0], radius * normal[1], radius * normal[2]],
                normal,
                tex_coords: [
                    1.0 - long as f32 / long_segs as f32,
                    lat as f32 / lat_segs as f32,
                ],
            });
        }
    }

    let mut indices = Vec::with_capacity((long_segs * lat_segs * 6) as usize);
    for lat in 0..lat_segs {
        for long in 0..long_segs {
            let first = lat * (long_segs + 1) + long;
            let second = first + long_segs + 1;

            indices.extend_from_slice(&[first, first + 1, second]);
            indices.extend_from_slice(&[second, first + 1, second + 1]);
        }
    }

    Geometry::from_vertices(
        "Sphere",
        &vertices,
        Vertex3D::layout(),
        vec![GeometryElement::new_u32(
            &indices,
            wgpu::PrimitiveTopology::TriangleList,
        )],
    )
}

/// Horizontal grid in the XZ plane, facing +Y
///
/// `center` offsets the grid within its node, matching how plane anchors report a
/// center relative to the anchor pose.
pub fn generate_plane(center: Vector3<f32>, width: f32, depth: f32, segments: u32) -> Geometry {
    let segs = segments.max(1);

    let mut vertices = Vec::with_capacity(((segs + 1) * (segs + 1)) as usize);
    for z in 0..=segs {
        let v = z as f32 / segs as f32;
        for x in 0..=segs {
            let u = x as f32 / segs as f32;
            vertices.push(Vertex3D {
                position: [
                    center.x + (u - 0.5) * width,
                    center.y,
                    center.z + (v - 0.5) * depth,
                ],
                normal: [0.0, 1.0, 0.0],
                tex_coords: [u, v],
            });
        }
    }

    // counter-clockwise when viewed from above
    let mut indices = Vec::with_capacity((segs * segs * 6) as usize);
    for z in 0..segs {
        for x in 0..segs {
            let i = z * (segs + 1) + x;
            let next_row = i + segs + 1;
            indices.extend_from_slice(&[i, next_row, i + 1]);
            indices.extend_from_slice(&[next_row, next_row + 1, i + 1]);
        }
    }

    Geometry::from_vertices(
        "Plane",
        &vertices,
        Vertex3D::layout(),
        vec![GeometryElement::new_u32(
            &indices,
            wgpu::PrimitiveTopology::TriangleList,
        )],
    )
}

/// One point primitive per feature point
pub fn point_cloud(points: &[[f32; 3]]) -> Geometry {
    let vertices: Vec<PointVertex> = points
        .iter()
        .map(|&position| PointVertex { position })
        .collect();
    let indices: Vec<u32> = (0..points.len() as u32).collect();

    let element = GeometryElement::new_u32(&indices, wgpu::PrimitiveTopology::PointList)
        .with_material(Material::new("Feature Points").with_diffuse(Color::YELLOW));

    Geometry::from_vertices("Point Cloud", &vertices, PointVertex::layout(), vec![element])
}

/// Three colored line segments along +X, +Y and +Z
pub fn world_axes(length: f32) -> Geometry {
    let origin = PointVertex {
        position: [0.0, 0.0, 0.0],
    };
    let vertices = [
        origin,
        PointVertex {
            position: [length, 0.0, 0.0],
        },
        origin,
        PointVertex {
            position: [0.0, length, 0.0],
        },
        origin,
        PointVertex {
            position: [0.0, 0.0, length],
        },
    ];

    let elements = [("X Axis", Color::RED), ("Y Axis", Color::GREEN), ("Z Axis", Color::BLUE)]
        .into_iter()
        .enumerate()
        .map(|(i, (name, color))| {
            let first = (i * 2) as u16;
            GeometryElement::new_u16(&[first, first + 1], wgpu::PrimitiveTopology::LineList)
                .with_material(Material::new(name).with_diffuse(color))
        })
        .collect();

    Geometry::from_vertices("World Axes", &vertices, PointVertex::layout(), elements)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sphere_generation() {
        let sphere = generate_sphere(0.5, 8);
        assert_eq!(sphere.vertex_count(), 81);
        assert_eq!(sphere.elements.len(), 1);
        assert_eq!(sphere.elements[0].index_count, 8 * 8 * 6);
        assert!(sphere.layout().is_lit());
    }

    #[test]
    fn test_plane_generation() {
        let plane = generate_plane(Vector3::new(0.0, 0.0, 0.0), 2.0, 2.0, 2);
        assert_eq!(plane.vertex_count(), 9); // 3x3 grid
        assert_eq!(plane.elements[0].index_count, 24); // 4 quads * 2 triangles * 3 indices
    }

    #[test]
    fn test_point_cloud_is_unlit_points() {
        let cloud = point_cloud(&[[0.0; 3], [1.0, 0.0, 0.0], [0.0, 1.0, 0.0]]);
        assert_eq!(cloud.vertex_count(), 3);
        assert_eq!(cloud.elements[0].primitive, wgpu::PrimitiveTopology::PointList);
        assert!(!cloud.layout().is_lit());
    }

    #[test]
    fn test_world_axes_one_element_per_axis() {
        let axes = world_axes(0.1);
        assert_eq!(axes.elements.len(), 3);
        assert!(axes
            .elements
            .iter()
            .all(|e| e.index_count == 2 && e.index_format == wgpu::IndexFormat::Uint16));
    }
}
