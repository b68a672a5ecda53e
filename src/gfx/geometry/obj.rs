//! Wavefront OBJ loading via `tobj`
//!
//! Every model in the file becomes one [`GeometryElement`] over a single shared vertex
//! buffer. MTL diffuse textures map to [`MaterialContents::Image`] (resolved through the
//! renderer's asset source by file name), plain diffuse colors to
//! [`MaterialContents::Color`].

use std::path::Path;

use anyhow::{Context, Result};
use cgmath::{InnerSpace, Vector3};

use super::{Geometry, GeometryElement};
use crate::gfx::resources::material::{Color, Material, MaterialContents};
use crate::gfx::scene::vertex::Vertex3D;

pub fn load_obj(path: impl AsRef<Path>) -> Result<Geometry> {
    let path = path.as_ref();
    let (models, materials) = tobj::load_obj(
        path,
        &tobj::LoadOptions {
            triangulate: true,
            single_index: true,
            ..Default::default()
        },
    )
    .with_context(|| format!("failed to load OBJ file {}", path.display()))?;

    let materials = materials.unwrap_or_else(|e| {
        log::info!("No MTL materials for {} ({}), using defaults", path.display(), e);
        Vec::new()
    });

    let mut vertices: Vec<Vertex3D> = Vec::new();
    let mut elements = Vec::with_capacity(models.len());

    for model in &models {
        let mesh = &model.mesh;
        let base = vertices.len() as u32;
        let count = mesh.positions.len() / 3;

        let normals = if mesh.normals.len() == mesh.positions.len() {
            mesh.normals.clone()
        } else {
            smooth_normals(&mesh.positions, &mesh.indices)
        };

        for i in 0..count {
            let tex_coords = if mesh.texcoords.len() >= (i + 1) * 2 {
                // OBJ texture space has its origin bottom-left
                [mesh.texcoords[i * 2], 1.0 - mesh.texcoords[i * 2 + 1]]
            } else {
                [0.0, 0.0]
            };
            vertices.push(Vertex3D {
                position: [
                    mesh.positions[i * 3],
                    mesh.positions[i * 3 + 1],
                    mesh.positions[i * 3 + 2],
                ],
                normal: [normals[i * 3], normals[i * 3 + 1], normals[i * 3 + 2]],
                tex_coords,
            });
        }

        let indices: Vec<u32> = mesh.indices.iter().map(|i| i + base).collect();
        let material = mesh
            .material_id
            .and_then(|id| materials.get(id))
            .map(convert_material)
            .unwrap_or_default();

        elements.push(
            GeometryElement::new_u32(&indices, wgpu::PrimitiveTopology::TriangleList)
                .with_material(material),
        );
    }

    let label = path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "OBJ Model".to_string());

    log::info!(
        "Loaded '{}': {} vertices, {} element(s)",
        label,
        vertices.len(),
        elements.len()
    );

    Ok(Geometry::from_vertices(
        label,
        &vertices,
        Vertex3D::layout(),
        elements,
    ))
}

fn convert_material(mtl: &tobj::Material) -> Material {
    let name = if mtl.name.is_empty() {
        "material".to_string()
    } else {
        mtl.name.clone()
    };
    let mut material = Material::new(name);

    match &mtl.diffuse_texture {
        Some(texture) if !texture.is_empty() => {
            material.diffuse.set(MaterialContents::Image(texture.clone()));
        }
        _ => {
            let [r, g, b] = mtl.diffuse.unwrap_or([0.8, 0.8, 0.8]);
            material
                .diffuse
                .set(Color::new(r, g, b, mtl.dissolve.unwrap_or(1.0)));
        }
    }
    if let Some(texture) = mtl.normal_texture.as_ref().filter(|t| !t.is_empty()) {
        material.normal.set(MaterialContents::Image(texture.clone()));
    }
    material
}

/// Area-weighted vertex normals from triangle faces
fn smooth_normals(positions: &[f32], indices: &[u32]) -> Vec<f32> {
    let vertex = |i: u32| {
        let i = i as usize * 3;
        Vector3::new(positions[i], positions[i + 1], positions[i + 2])
    };

    let mut accumulated = vec![Vector3::new(0.0f32, 0.0, 0.0); positions.len() / 3];
    for triangle in indices.chunks_exact(3) {
        let (v0, v1, v2) = (vertex(triangle[0]), vertex(triangle[1]), vertex(triangle[2]));
        let face_normal = (v1 - v0).cross(v2 - v0);
        for &i in triangle {
            accumulated[i as usize] += face_normal;
        }
    }

    accumulated
        .into_iter()
        .flat_map(|n| {
            let n = if n.magnitude2() > 0.0 {
                n.normalize()
            } else {
                Vector3::unit_y()
            };
            [n.x, n.y, n.z]
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    const QUAD_OBJ: &str = "\
v 0 0 0
v 1 0 0
v 1 0 -1
v 0 0 -1
vt 0 0
vt 1 0
vt 1 1
vt 0 1
f 1/1 2/2 3/3 4/4
";

    #[test]
    fn test_load_obj_without_normals() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("quad.obj");
        std::fs::File::create(&path)
            .unwrap()
            .write_all(QUAD_OBJ.as_bytes())
            .unwrap();

        let geometry = load_obj(&path).unwrap();
        assert_eq!(geometry.label, "quad");
        assert_eq!(geometry.vertex_count(), 4);
        assert_eq!(geometry.elements.len(), 1);
        assert_eq!(geometry.elements[0].index_count, 6);
        assert!(geometry.layout().is_lit());
    }

    #[test]
    fn test_smooth_normals_face_up() {
        let positions = [0.0, 0.0, 0.0, 1.0, 0.0, 0.0, 0.0, 0.0, -1.0];
        let normals = smooth_normals(&positions, &[0, 1, 2]);
        for n in normals.chunks(3) {
            assert!((n[1] - 1.0).abs() < 1e-6);
        }
    }

    #[test]
    fn test_missing_file_is_an_error() {
        assert!(load_obj("/definitely/not/here.obj").is_err());
    }
}
