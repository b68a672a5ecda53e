//! Per-tick tracking data: camera pose, intrinsics, camera image and feature points

use cgmath::{Matrix4, SquareMatrix};

use crate::gfx::math::{AffineTransform2D, ProjectionParams};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LimitedReason {
    Initializing,
    ExcessiveMotion,
    InsufficientFeatures,
    Relocalizing,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TrackingState {
    NotAvailable,
    Limited(LimitedReason),
    Normal,
}

impl std::fmt::Display for TrackingState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TrackingState::NotAvailable => write!(f, "Tracking is not available"),
            TrackingState::Normal => write!(f, "Tracking is normal"),
            TrackingState::Limited(reason) => {
                let reason = match reason {
                    LimitedReason::Initializing => "Initializing",
                    LimitedReason::ExcessiveMotion => "Excessive motion",
                    LimitedReason::InsufficientFeatures => "Insufficient features",
                    LimitedReason::Relocalizing => "Relocalizing",
                };
                write!(f, "Tracking is limited: {}", reason)
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TrackingCamera {
    /// Camera-to-world pose
    pub pose: Matrix4<f32>,
    pub intrinsics: ProjectionParams,
    pub tracking_state: TrackingState,
}

impl TrackingCamera {
    /// World-to-camera matrix; identity when the pose is singular
    pub fn view_matrix(&self) -> Matrix4<f32> {
        self.pose.invert().unwrap_or_else(Matrix4::identity)
    }

    pub fn projection_matrix(&self, viewport: (f32, f32), near: f32, far: f32) -> Matrix4<f32> {
        self.intrinsics.projection_matrix(viewport, near, far)
    }
}

/// One plane of a planar camera image, rows tightly packed
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImagePlane {
    pub width: u32,
    pub height: u32,
    pub data: Vec<u8>,
}

impl ImagePlane {
    pub fn new(width: u32, height: u32, data: Vec<u8>) -> Self {
        Self {
            width,
            height,
            data,
        }
    }

    /// Whether `data` holds exactly `width * height` texels of `bytes_per_texel`
    pub fn is_well_formed(&self, bytes_per_texel: usize) -> bool {
        self.width > 0
            && self.height > 0
            && self.data.len() == self.width as usize * self.height as usize * bytes_per_texel
    }
}

/// Bi-planar YCbCr camera image
#[derive(Debug, Clone, PartialEq)]
pub struct VideoFrame {
    /// Full-resolution Y plane, one byte per texel
    pub luma: ImagePlane,
    /// Half-resolution interleaved CbCr plane, two bytes per texel
    pub chroma: ImagePlane,
    /// Maps normalized image coordinates to normalized viewport coordinates for the
    /// current orientation and viewport
    pub display_transform: AffineTransform2D,
}

#[derive(Debug, Clone, PartialEq)]
pub struct TrackingFrame {
    /// Seconds, in the tracking subsystem's clock
    pub timestamp: f64,
    pub camera: TrackingCamera,
    pub video: Option<VideoFrame>,
    pub raw_feature_points: Option<Vec<[f32; 3]>>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gfx::math::tests::assert_matrix_eq;
    use cgmath::Vector3;

    #[test]
    fn test_view_matrix_inverts_pose() {
        let camera = TrackingCamera {
            pose: Matrix4::from_translation(Vector3::new(0.0, 1.5, 2.0)),
            intrinsics: ProjectionParams {
                focal_length: [500.0, 500.0],
                principal_point: [320.0, 240.0],
                image_resolution: [640.0, 480.0],
            },
            tracking_state: TrackingState::Normal,
        };
        assert_matrix_eq(
            camera.view_matrix(),
            Matrix4::from_translation(Vector3::new(0.0, -1.5, -2.0)),
        );
    }

    #[test]
    fn test_plane_shape_check() {
        assert!(ImagePlane::new(2, 2, vec![0; 4]).is_well_formed(1));
        assert!(!ImagePlane::new(2, 2, vec![0; 4]).is_well_formed(2));
        assert!(!ImagePlane::new(0, 2, Vec::new()).is_well_formed(1));
    }

    #[test]
    fn test_tracking_state_messages() {
        assert_eq!(
            TrackingState::Limited(LimitedReason::ExcessiveMotion).to_string(),
            "Tracking is limited: Excessive motion"
        );
    }
}
