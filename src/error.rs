//! Error types for the scene graph, renderer, asset loading and configuration.
//!
//! Per-frame precondition failures (no camera, no drawable) are deliberately absent:
//! the renderer reports those as [`SkipReason`](crate::gfx::rendering::SkipReason)
//! rather than as errors.

use thiserror::Error;

use crate::gfx::scene::{GeometryId, NodeId};

/// Scene graph mutation errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SceneError {
    #[error("node {0:?} does not exist in this scene")]
    UnknownNode(NodeId),
    #[error("geometry {0:?} does not exist in this scene")]
    UnknownGeometry(GeometryId),
    #[error("the root node cannot be attached to a parent")]
    RootCannotBeChild,
    #[error("the root node cannot be removed")]
    CannotRemoveRoot,
    #[error("attaching {child:?} under {parent:?} would create a cycle")]
    WouldCreateCycle { parent: NodeId, child: NodeId },
}

/// GPU-side failures reported by a [`RenderBackend`](crate::gfx::rendering::RenderBackend)
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RenderError {
    #[error("failed to create pipeline: {0}")]
    PipelineCreation(String),
    #[error("failed to create texture: {0}")]
    TextureCreation(String),
    #[error("instance uniform buffer is full ({capacity} slots)")]
    InstanceCapacityExceeded { capacity: usize },
    #[error("surface lost")]
    SurfaceLost,
    #[error("failed to initialize backend: {0}")]
    Initialization(String),
}

/// Failures while loading named image resources
#[derive(Error, Debug)]
pub enum AssetError {
    #[error("asset '{0}' not found")]
    NotFound(String),
    #[error("failed to read asset '{name}'")]
    Io {
        name: String,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to decode image '{name}'")]
    Decode {
        name: String,
        #[source]
        source: image::ImageError,
    },
}

/// Invalid renderer configuration values
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ConfigError {
    #[error("clip planes must satisfy 0 < near < far (near = {near}, far = {far})")]
    InvalidClipPlanes { near: f32, far: f32 },
    #[error("instance capacity must be at least 1")]
    ZeroInstanceCapacity,
    #[error("environment variable {name} has invalid value '{value}'")]
    InvalidEnvValue { name: &'static str, value: String },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = RenderError::InstanceCapacityExceeded { capacity: 256 };
        assert_eq!(err.to_string(), "instance uniform buffer is full (256 slots)");

        let err = ConfigError::InvalidClipPlanes { near: 1.0, far: 0.5 };
        assert_eq!(
            err.to_string(),
            "clip planes must satisfy 0 < near < far (near = 1, far = 0.5)"
        );
    }
}
