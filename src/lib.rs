// src/lib.rs
//! arscene
//!
//! A scene graph renderer driven by camera-tracking data, built on wgpu. Tracked anchors
//! become scene nodes, and each frame is composited over the live camera image.

pub mod config;
pub mod error;
pub mod gfx;
pub mod prelude;
pub mod tracking;
pub mod view;
pub mod wgpu_utils;

// Re-export main types for convenience
pub use config::RendererConfig;
pub use view::{ArView, DebugOptions};
