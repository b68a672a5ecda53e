// src/gfx/resources/mod.rs
//! GPU resource management
//!
//! Materials and their lazily resolved textures, named image assets, and the pooled
//! per-frame buffers.

pub mod assets;
pub mod buffer_pool;
pub mod material;
pub mod texture_cache;
pub mod texture_resource;

// Re-export main types
pub use assets::{AssetSource, DirectoryAssetSource, ImageData, MemoryAssetSource, NoAssets};
pub use buffer_pool::{BufferPool, PooledBuffer, RetiredResource};
pub use material::{
    Color, FillMode, Material, MaterialContents, MaterialProperty, PropertyId, TextureSlot,
};
pub use texture_cache::TextureCache;
pub use texture_resource::TextureResource;
