//! Math helpers shared by the scene graph, renderer and tracking layer
//!
//! Everything is built on cgmath's column-major types. `Transform` is the
//! decomposed pose stored on scene nodes, `AffineTransform2D` is the display
//! transform reported by the tracking subsystem, and `ProjectionParams` turns
//! camera intrinsics into a clip-space projection.

use cgmath::{
    InnerSpace, Matrix, Matrix3, Matrix4, Point2, Quaternion, SquareMatrix, Vector3, Vector4,
};

/// Affine pose made of translation, rotation and scale
///
/// The matrix form is `T * R * S`. Transforms are replaced wholesale on nodes,
/// never edited piecemeal from several places at once.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Transform {
    pub translation: Vector3<f32>,
    pub rotation: Quaternion<f32>,
    pub scale: Vector3<f32>,
}

impl Default for Transform {
    fn default() -> Self {
        Self::identity()
    }
}

impl Transform {
    pub fn identity() -> Self {
        Self {
            translation: Vector3::new(0.0, 0.0, 0.0),
            rotation: Quaternion::new(1.0, 0.0, 0.0, 0.0),
            scale: Vector3::new(1.0, 1.0, 1.0),
        }
    }

    pub fn from_translation(translation: Vector3<f32>) -> Self {
        Self {
            translation,
            ..Self::identity()
        }
    }

    pub fn from_scale(scale: f32) -> Self {
        Self {
            scale: Vector3::new(scale, scale, scale),
            ..Self::identity()
        }
    }

    /// Homogeneous 4x4 matrix for this pose
    pub fn matrix(&self) -> Matrix4<f32> {
        Matrix4::from_translation(self.translation)
            * Matrix4::from(self.rotation)
            * Matrix4::from_nonuniform_scale(self.scale.x, self.scale.y, self.scale.z)
    }

    /// Decomposes a TRS matrix
    ///
    /// Exact for rigid poses (which is what tracking reports) and for matrices with
    /// positive scale. A mirrored basis is folded into a negative x scale.
    pub fn from_matrix(m: Matrix4<f32>) -> Self {
        let translation = m.w.truncate();

        let mut x_axis = m.x.truncate();
        let y_axis = m.y.truncate();
        let z_axis = m.z.truncate();

        let mut sx = x_axis.magnitude();
        let sy = y_axis.magnitude();
        let sz = z_axis.magnitude();

        if upper_left(m).determinant() < 0.0 {
            sx = -sx;
        }

        let rotation = if sx.abs() > f32::EPSILON && sy > f32::EPSILON && sz > f32::EPSILON {
            x_axis /= sx;
            let basis = Matrix3::from_cols(x_axis, y_axis / sy, z_axis / sz);
            Quaternion::from(basis).normalize()
        } else {
            Quaternion::new(1.0, 0.0, 0.0, 0.0)
        };

        Self {
            translation,
            rotation,
            scale: Vector3::new(sx, sy, sz),
        }
    }

    /// Composes a parent pose with a child pose: `matrix(parent) * matrix(child)`
    pub fn compose(parent: &Transform, child: &Transform) -> Matrix4<f32> {
        parent.matrix() * child.matrix()
    }
}

impl From<Matrix4<f32>> for Transform {
    fn from(m: Matrix4<f32>) -> Self {
        Transform::from_matrix(m)
    }
}

/// Upper-left 3x3 block of a 4x4 matrix
pub fn upper_left(m: Matrix4<f32>) -> Matrix3<f32> {
    Matrix3::from_cols(m.x.truncate(), m.y.truncate(), m.z.truncate())
}

/// Transpose-inverse of `(view * model)`'s upper 3x3, identity when singular
pub fn normal_matrix(view: Matrix4<f32>, model: Matrix4<f32>) -> Matrix3<f32> {
    (upper_left(view) * upper_left(model))
        .transpose()
        .invert()
        .unwrap_or_else(Matrix3::identity)
}

pub fn matrix4_to_array(m: Matrix4<f32>) -> [[f32; 4]; 4] {
    m.into()
}

/// A 3x3 matrix laid out as three vec4 columns (WGSL `mat3x3<f32>` uniform layout)
pub fn matrix3_to_padded(m: Matrix3<f32>) -> [[f32; 4]; 3] {
    [
        [m.x.x, m.x.y, m.x.z, 0.0],
        [m.y.x, m.y.y, m.y.z, 0.0],
        [m.z.x, m.z.y, m.z.z, 0.0],
    ]
}

/// 2D affine transform `x' = a*x + c*y + tx`, `y' = b*x + d*y + ty`
///
/// This is the display transform reported by the tracking subsystem: it maps
/// normalized camera-image coordinates to normalized viewport coordinates for the
/// current orientation and viewport size.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AffineTransform2D {
    pub a: f32,
    pub b: f32,
    pub c: f32,
    pub d: f32,
    pub tx: f32,
    pub ty: f32,
}

impl Default for AffineTransform2D {
    fn default() -> Self {
        Self::IDENTITY
    }
}

impl AffineTransform2D {
    pub const IDENTITY: AffineTransform2D = AffineTransform2D {
        a: 1.0,
        b: 0.0,
        c: 0.0,
        d: 1.0,
        tx: 0.0,
        ty: 0.0,
    };

    pub fn new(a: f32, b: f32, c: f32, d: f32, tx: f32, ty: f32) -> Self {
        Self { a, b, c, d, tx, ty }
    }

    pub fn apply(&self, p: Point2<f32>) -> Point2<f32> {
        Point2::new(
            self.a * p.x + self.c * p.y + self.tx,
            self.b * p.x + self.d * p.y + self.ty,
        )
    }

    /// Inverse mapping, `None` when the linear part is singular
    pub fn inverted(&self) -> Option<Self> {
        let det = self.a * self.d - self.b * self.c;
        if det.abs() <= f32::EPSILON {
            return None;
        }
        Some(Self {
            a: self.d / det,
            b: -self.b / det,
            c: -self.c / det,
            d: self.a / det,
            tx: (self.c * self.ty - self.d * self.tx) / det,
            ty: (self.b * self.tx - self.a * self.ty) / det,
        })
    }

    /// Homogeneous 3x3 form with columns `(a, b, 0)`, `(c, d, 0)`, `(tx, ty, 1)`
    pub fn to_matrix3(&self) -> Matrix3<f32> {
        Matrix3::new(
            self.a, self.b, 0.0, //
            self.c, self.d, 0.0, //
            self.tx, self.ty, 1.0,
        )
    }
}

/// Pinhole camera intrinsics reported alongside each tracking frame
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ProjectionParams {
    /// Focal length in pixels `[fx, fy]`
    pub focal_length: [f32; 2],
    /// Principal point in pixels `[cx, cy]`
    pub principal_point: [f32; 2],
    /// Captured image size in pixels `[width, height]`
    pub image_resolution: [f32; 2],
}

impl ProjectionParams {
    /// Projection for a right-handed camera looking down -Z with clip depth in `[0, 1]`
    ///
    /// The camera image is aspect-filled into the viewport: the image axis that
    /// overhangs the viewport is cropped, which magnifies that axis in clip space.
    pub fn projection_matrix(&self, viewport: (f32, f32), near: f32, far: f32) -> Matrix4<f32> {
        let [fx, fy] = self.focal_length;
        let [cx, cy] = self.principal_point;
        let [width, height] = self.image_resolution;

        let mut sx = 2.0 * fx / width;
        let mut sy = 2.0 * fy / height;
        let mut ox = 1.0 - 2.0 * cx / width;
        let mut oy = 2.0 * cy / height - 1.0;

        let image_aspect = width / height;
        let viewport_aspect = viewport.0.max(1.0) / viewport.1.max(1.0);
        if viewport_aspect > image_aspect {
            let k = viewport_aspect / image_aspect;
            sy *= k;
            oy *= k;
        } else {
            let k = image_aspect / viewport_aspect;
            sx *= k;
            ox *= k;
        }

        let depth_scale = far / (near - far);
        let depth_offset = near * far / (near - far);

        Matrix4::from_cols(
            Vector4::new(sx, 0.0, 0.0, 0.0),
            Vector4::new(0.0, sy, 0.0, 0.0),
            Vector4::new(ox, oy, depth_scale, -1.0),
            Vector4::new(0.0, 0.0, depth_offset, 0.0),
        )
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use cgmath::{Deg, Rotation3};

    pub(crate) fn assert_matrix_eq(a: Matrix4<f32>, b: Matrix4<f32>) {
        let a: [[f32; 4]; 4] = a.into();
        let b: [[f32; 4]; 4] = b.into();
        for c in 0..4 {
            for r in 0..4 {
                assert!(
                    (a[c][r] - b[c][r]).abs() < 1e-4,
                    "matrices differ at [{c}][{r}]: {:?} vs {:?}",
                    a,
                    b
                );
            }
        }
    }

    #[test]
    fn test_matrix_round_trip() {
        let transform = Transform {
            translation: Vector3::new(1.0, -2.0, 3.0),
            rotation: Quaternion::from_angle_y(Deg(30.0)),
            scale: Vector3::new(2.0, 2.0, 2.0),
        };
        let decomposed = Transform::from_matrix(transform.matrix());

        assert_matrix_eq(decomposed.matrix(), transform.matrix());
        assert!((decomposed.scale.x - 2.0).abs() < 1e-5);
    }

    #[test]
    fn test_compose_is_matrix_product() {
        let parent = Transform::from_translation(Vector3::new(0.0, 1.0, 0.0));
        let child = Transform {
            rotation: Quaternion::from_angle_z(Deg(90.0)),
            ..Transform::from_scale(0.5)
        };
        assert_matrix_eq(
            Transform::compose(&parent, &child),
            parent.matrix() * child.matrix(),
        );
    }

    #[test]
    fn test_normal_matrix_corrects_nonuniform_scale() {
        let model = Matrix4::from_nonuniform_scale(2.0, 1.0, 1.0);
        let normal = normal_matrix(Matrix4::identity(), model);
        // Inverse-transpose of diag(2, 1, 1) is diag(0.5, 1, 1)
        assert!((normal.x.x - 0.5).abs() < 1e-6);
        assert!((normal.y.y - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_normal_matrix_singular_falls_back_to_identity() {
        let model = Matrix4::from_scale(0.0);
        assert_eq!(normal_matrix(Matrix4::identity(), model), Matrix3::identity());
    }

    #[test]
    fn test_affine_inverse() {
        // Portrait display transform: 90 degree rotation plus offset
        let t = AffineTransform2D::new(0.0, -1.0, 1.0, 0.0, 0.0, 1.0);
        let inv = t.inverted().unwrap();
        let p = Point2::new(0.25, 0.75);
        let round_trip = inv.apply(t.apply(p));
        assert!((round_trip.x - p.x).abs() < 1e-6);
        assert!((round_trip.y - p.y).abs() < 1e-6);
    }

    #[test]
    fn test_affine_singular_has_no_inverse() {
        let t = AffineTransform2D::new(1.0, 2.0, 2.0, 4.0, 0.0, 0.0);
        assert!(t.inverted().is_none());
    }

    #[test]
    fn test_affine_matrix_matches_apply() {
        let t = AffineTransform2D::new(0.5, 0.1, -0.2, 0.8, 0.3, -0.4);
        let p = t.to_matrix3() * Vector3::new(0.6, 0.2, 1.0);
        let q = t.apply(Point2::new(0.6, 0.2));
        assert!((p.x - q.x).abs() < 1e-6);
        assert!((p.y - q.y).abs() < 1e-6);
    }

    #[test]
    fn test_projection_centered_principal_point() {
        let params = ProjectionParams {
            focal_length: [500.0, 500.0],
            principal_point: [320.0, 240.0],
            image_resolution: [640.0, 480.0],
        };
        let proj = params.projection_matrix((640.0, 480.0), 0.01, 100.0);

        let on_axis_near = proj * Vector4::new(0.0, 0.0, -0.01, 1.0);
        assert!(on_axis_near.x.abs() < 1e-6);
        assert!(on_axis_near.y.abs() < 1e-6);
        assert!((on_axis_near.z / on_axis_near.w).abs() < 1e-5);

        let on_axis_far = proj * Vector4::new(0.0, 0.0, -100.0, 1.0);
        assert!((on_axis_far.z / on_axis_far.w - 1.0).abs() < 1e-4);

        // A point at the image edge (u = 640) lands on the right clip boundary
        let edge = proj * Vector4::new(320.0 / 500.0, 0.0, -1.0, 1.0);
        assert!((edge.x / edge.w - 1.0).abs() < 1e-5);
    }

    #[test]
    fn test_projection_aspect_fill_magnifies_long_axis() {
        let params = ProjectionParams {
            focal_length: [500.0, 500.0],
            principal_point: [320.0, 240.0],
            image_resolution: [640.0, 480.0],
        };
        let matched = params.projection_matrix((640.0, 480.0), 0.01, 100.0);
        let tall = params.projection_matrix((480.0, 960.0), 0.01, 100.0);
        assert!(tall.x.x > matched.x.x);
        assert!((tall.y.y - matched.y.y).abs() < 1e-6);
    }
}
