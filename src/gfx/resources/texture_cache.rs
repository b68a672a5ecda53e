//! Lazy resolution of material properties into GPU textures
//!
//! Resolution happens at most once per property revision. Entries remember failures
//! too, so a missing image is reported once and then treated as "no texture" until the
//! property's contents are reassigned.

use std::collections::HashMap;

use super::assets::AssetSource;
use super::material::{MaterialContents, MaterialProperty, PropertyId};
use crate::gfx::rendering::{RenderBackend, TextureDescriptor, TextureHandle};

#[derive(Debug, Clone, Copy)]
struct CacheEntry {
    revision: u64,
    texture: Option<TextureHandle>,
    /// Pass-through textures belong to the caller and are never destroyed here
    owned: bool,
}

#[derive(Debug, Default)]
pub struct TextureCache {
    entries: HashMap<PropertyId, CacheEntry>,
    retired: Vec<TextureHandle>,
    resolutions: usize,
}

impl TextureCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Texture for the property's current contents, or `None` when it has no contents
    /// or they could not be turned into a texture
    pub fn resolve<B: RenderBackend + ?Sized>(
        &mut self,
        property: &MaterialProperty,
        backend: &mut B,
        assets: &dyn AssetSource,
    ) -> Option<TextureHandle> {
        let id = property.id();
        if let Some(entry) = self.entries.get(&id) {
            if entry.revision == property.revision() {
                return entry.texture;
            }
        }
        self.evict(id);

        let contents = property.contents()?;
        let (texture, owned) = match contents {
            MaterialContents::Texture(texture) => (Some(*texture), false),
            MaterialContents::Image(name) => match assets.load_image(name) {
                Ok(image) => (
                    create_rgba(backend, name, image.width, image.height, &image.rgba),
                    true,
                ),
                Err(err) => {
                    log::warn!("Material texture '{}' unavailable: {}", name, err);
                    (None, false)
                }
            },
            MaterialContents::Color(color) => (
                create_rgba(
                    backend,
                    "Solid Color Texture",
                    1,
                    1,
                    &color.to_premultiplied_rgba8(),
                ),
                true,
            ),
            MaterialContents::Scalar(value) => {
                let byte = (value.clamp(0.0, 1.0) * 255.0) as u8;
                (
                    create_rgba(backend, "Scalar Texture", 1, 1, &[byte; 4]),
                    true,
                )
            }
        };

        self.resolutions += 1;
        self.entries.insert(
            id,
            CacheEntry {
                revision: property.revision(),
                texture,
                owned: owned && texture.is_some(),
            },
        );
        texture
    }

    /// Forgets a property, scheduling its owned texture for destruction
    pub fn evict(&mut self, id: PropertyId) {
        if let Some(entry) = self.entries.remove(&id) {
            if let (true, Some(texture)) = (entry.owned, entry.texture) {
                self.retired.push(texture);
            }
        }
    }

    /// Owned textures evicted since the last call; still possibly in use by in-flight frames
    pub fn drain_retired(&mut self) -> Vec<TextureHandle> {
        std::mem::take(&mut self.retired)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// How many times contents have been turned into a texture
    pub fn resolution_count(&self) -> usize {
        self.resolutions
    }
}

fn create_rgba<B: RenderBackend + ?Sized>(
    backend: &mut B,
    label: &str,
    width: u32,
    height: u32,
    data: &[u8],
) -> Option<TextureHandle> {
    let desc = TextureDescriptor {
        label,
        width,
        height,
        format: wgpu::TextureFormat::Rgba8Unorm,
        data,
    };
    match backend.create_texture(&desc) {
        Ok(texture) => {
            log::debug!("Created texture '{}' ({}x{})", label, width, height);
            Some(texture)
        }
        Err(err) => {
            log::warn!("Texture '{}' could not be created: {}", label, err);
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gfx::resources::assets::{ImageData, MemoryAssetSource, NoAssets};
    use crate::gfx::resources::material::Color;
    use crate::gfx::rendering::HeadlessBackend;

    #[test]
    fn test_color_resolves_once_until_reassigned() {
        let mut backend = HeadlessBackend::new(8, 8);
        let mut cache = TextureCache::new();
        let mut property = MaterialProperty::with_contents(Color::RED);

        let first = cache.resolve(&property, &mut backend, &NoAssets).unwrap();
        let second = cache.resolve(&property, &mut backend, &NoAssets).unwrap();
        assert_eq!(first, second);
        assert_eq!(cache.resolution_count(), 1);
        assert_eq!(backend.texture_data(first), Some(&[255u8, 0, 0, 255][..]));

        property.set(Color::BLUE);
        let third = cache.resolve(&property, &mut backend, &NoAssets).unwrap();
        assert_ne!(first, third);
        assert_eq!(backend.texture_data(third), Some(&[0u8, 0, 255, 255][..]));
        assert_eq!(cache.drain_retired(), vec![first]);
    }

    #[test]
    fn test_scalar_and_empty_contents() {
        let mut backend = HeadlessBackend::new(8, 8);
        let mut cache = TextureCache::new();

        let half = MaterialProperty::with_contents(0.5);
        let texture = cache.resolve(&half, &mut backend, &NoAssets).unwrap();
        assert_eq!(backend.texture_data(texture), Some(&[127u8; 4][..]));

        let empty = MaterialProperty::new();
        assert_eq!(cache.resolve(&empty, &mut backend, &NoAssets), None);
        assert_eq!(cache.resolution_count(), 1);
    }

    #[test]
    fn test_pass_through_texture_is_not_owned() {
        let mut backend = HeadlessBackend::new(8, 8);
        let mut cache = TextureCache::new();
        let external = TextureHandle::from_raw(4242);
        let mut property = MaterialProperty::with_contents(external);

        assert_eq!(cache.resolve(&property, &mut backend, &NoAssets), Some(external));
        property.clear();
        assert_eq!(cache.resolve(&property, &mut backend, &NoAssets), None);
        assert!(cache.drain_retired().is_empty());
    }

    #[test]
    fn test_missing_image_is_cached_as_no_texture() {
        let mut backend = HeadlessBackend::new(8, 8);
        let mut cache = TextureCache::new();
        let property = MaterialProperty::with_contents("robot_diffuse");

        assert_eq!(cache.resolve(&property, &mut backend, &NoAssets), None);
        assert_eq!(cache.resolve(&property, &mut backend, &NoAssets), None);
        assert_eq!(cache.resolution_count(), 1);

        let mut assets = MemoryAssetSource::new();
        assets.insert("robot_diffuse", ImageData::solid(2, 2, [9, 9, 9, 255]));
        let image = MaterialProperty::with_contents("robot_diffuse");
        let texture = cache.resolve(&image, &mut backend, &assets).unwrap();
        assert_eq!(backend.texture_data(texture).map(|d| d.len()), Some(16));
    }
}
