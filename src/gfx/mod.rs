//! # Graphics Module
//!
//! Everything between the scene graph and the GPU.
//!
//! ## Architecture Overview
//!
//! - **Math** ([`math`]) - Transforms, 2D display transforms and tracking projections
//! - **Scene Management** ([`scene`]) - Node arena, hierarchy and traversal
//! - **Geometry** ([`geometry`]) - Shared meshes and the built-in producers
//! - **Resource Management** ([`resources`]) - Materials, textures and pooled uniform buffers
//! - **Rendering** ([`rendering`]) - The backend abstraction and the per-frame renderer
//!
//! ## Usage
//!
//! ```no_run
//! use arscene::gfx::{rendering::SceneRenderer, scene::Scene};
//! use arscene::gfx::rendering::HeadlessBackend;
//! use arscene::RendererConfig;
//!
//! let mut scene = Scene::new();
//! let mut renderer = SceneRenderer::new(HeadlessBackend::new(640, 480), RendererConfig::default());
//! let _ = renderer.draw(Some(&mut scene));
//! ```

pub mod geometry;
pub mod math;
pub mod rendering;
pub mod resources;
pub mod scene;

// Re-export commonly used types
pub use rendering::{SceneRenderer, WgpuBackend};
pub use scene::Scene;
