//! # arscene Prelude
//!
//! Commonly used types and traits, to reduce boilerplate imports in host applications.
//!
//! ```rust
//! use arscene::prelude::*;
//!
//! let mut renderer = SceneRenderer::new(HeadlessBackend::new(64, 64), RendererConfig::default());
//! renderer.set_viewport(64, 64);
//! let view = ArView::new(renderer, Box::new(ScriptedSession::new()));
//! assert!(view.scene().is_reachable(view.scene().root()));
//! ```

// Re-export the view layer
pub use crate::config::RendererConfig;
pub use crate::error::{AssetError, ConfigError, RenderError, SceneError};
pub use crate::view::{ArView, DebugOptions};

// Re-export graphics and scene types
pub use crate::gfx::geometry::{generate_plane, generate_sphere, load_obj, point_cloud, world_axes, Geometry};
pub use crate::gfx::math::{AffineTransform2D, Transform};
pub use crate::gfx::rendering::{
    FrameOutcome, FrameStats, HeadlessBackend, RenderBackend, SceneRenderer, SkipReason,
    WgpuBackend,
};
pub use crate::gfx::resources::{Color, FillMode, Material, MaterialContents};
pub use crate::gfx::scene::{Camera, GeometryId, NodeId, Scene};

// Re-export tracking contracts
pub use crate::tracking::{
    Anchor, AnchorEvent, AnchorId, AnchorKind, ArViewDelegate, HitResult, HitTestTypes,
    ScriptedSession, SessionEvent, TrackingFrame, TrackingSession,
};

// Re-export common external dependencies
pub use cgmath::{Matrix4, Point2, Vector3};
