// src/gfx/rendering/mod.rs
//! Core rendering functionality
//!
//! The [`RenderBackend`] abstraction with its wgpu and headless implementations,
//! pipeline caching, uniform packing and the per-frame [`SceneRenderer`].

pub mod backend;
pub mod headless;
pub mod pipeline_manager;
pub mod render_engine;
pub mod scene_renderer;
pub mod uniforms;

// Re-export main types
pub use backend::{
    BufferDescriptor, BufferHandle, CommandList, MaterialTextures, PassSignature,
    PipelineHandle, PipelineKey, PipelineKind, RenderBackend, RenderCommand, RenderTarget,
    SubmissionIndex, TextureDescriptor, TextureHandle, VideoTextures,
};
pub use headless::{HeadlessBackend, HeadlessSubmission, HeadlessTexture};
pub use pipeline_manager::{PipelineManager, PipelineStats};
pub use render_engine::WgpuBackend;
pub use scene_renderer::{FrameOutcome, FrameStats, SceneRenderer, SkipReason};
pub use uniforms::{
    FrameUniforms, InstanceUniformWriter, InstanceUniforms, INSTANCE_UNIFORM_STRIDE,
};
