//! Named image resources
//!
//! The renderer never opens files itself: material properties that name an image are
//! resolved through an injected [`AssetSource`].

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use crate::error::AssetError;

/// Decoded RGBA8 pixels
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageData {
    pub width: u32,
    pub height: u32,
    pub rgba: Vec<u8>,
}

impl ImageData {
    pub fn solid(width: u32, height: u32, texel: [u8; 4]) -> Self {
        Self {
            width,
            height,
            rgba: texel.repeat((width * height) as usize),
        }
    }
}

pub trait AssetSource {
    fn load_image(&self, name: &str) -> Result<ImageData, AssetError>;
}

/// Source with no assets; every lookup fails with [`AssetError::NotFound`]
#[derive(Debug, Clone, Copy, Default)]
pub struct NoAssets;

impl AssetSource for NoAssets {
    fn load_image(&self, name: &str) -> Result<ImageData, AssetError> {
        Err(AssetError::NotFound(name.to_string()))
    }
}

/// Loads images from files under a root directory
///
/// Names without an extension are tried as `.png`, `.jpg` and `.jpeg` in that order.
#[derive(Debug, Clone)]
pub struct DirectoryAssetSource {
    root: PathBuf,
}

impl DirectoryAssetSource {
    const EXTENSIONS: [&'static str; 3] = ["png", "jpg", "jpeg"];

    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn locate(&self, name: &str) -> Option<PathBuf> {
        let direct = self.root.join(name);
        if direct.extension().is_some() {
            return direct.is_file().then_some(direct);
        }
        Self::EXTENSIONS
            .iter()
            .map(|ext| direct.with_extension(ext))
            .find(|p| p.is_file())
    }
}

impl AssetSource for DirectoryAssetSource {
    fn load_image(&self, name: &str) -> Result<ImageData, AssetError> {
        let path = self
            .locate(name)
            .ok_or_else(|| AssetError::NotFound(name.to_string()))?;

        let bytes = std::fs::read(&path).map_err(|source| AssetError::Io {
            name: name.to_string(),
            source,
        })?;
        let image = image::load_from_memory(&bytes).map_err(|source| AssetError::Decode {
            name: name.to_string(),
            source,
        })?;

        let rgba = image.to_rgba8();
        log::debug!(
            "Decoded image '{}' ({}x{}) from {}",
            name,
            rgba.width(),
            rgba.height(),
            path.display()
        );
        Ok(ImageData {
            width: rgba.width(),
            height: rgba.height(),
            rgba: rgba.into_raw(),
        })
    }
}

/// In-memory images keyed by name
#[derive(Debug, Clone, Default)]
pub struct MemoryAssetSource {
    images: HashMap<String, ImageData>,
}

impl MemoryAssetSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, name: impl Into<String>, image: ImageData) {
        self.images.insert(name.into(), image);
    }
}

impl AssetSource for MemoryAssetSource {
    fn load_image(&self, name: &str) -> Result<ImageData, AssetError> {
        self.images
            .get(name)
            .cloned()
            .ok_or_else(|| AssetError::NotFound(name.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_directory_source_resolves_extension() {
        let dir = tempfile::tempdir().unwrap();
        let image = image::RgbaImage::from_pixel(2, 3, image::Rgba([10, 20, 30, 255]));
        image.save(dir.path().join("checker.png")).unwrap();

        let source = DirectoryAssetSource::new(dir.path());
        let loaded = source.load_image("checker").unwrap();
        assert_eq!((loaded.width, loaded.height), (2, 3));
        assert_eq!(&loaded.rgba[..4], &[10, 20, 30, 255]);

        assert!(source.load_image("checker.png").is_ok());
    }

    #[test]
    fn test_directory_source_errors() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("broken.png"), b"not a png").unwrap();
        let source = DirectoryAssetSource::new(dir.path());

        assert!(matches!(
            source.load_image("missing"),
            Err(AssetError::NotFound(name)) if name == "missing"
        ));
        assert!(matches!(
            source.load_image("broken"),
            Err(AssetError::Decode { .. })
        ));
    }

    #[test]
    fn test_memory_source() {
        let mut source = MemoryAssetSource::new();
        source.insert("white", ImageData::solid(1, 1, [255; 4]));
        assert_eq!(source.load_image("white").unwrap().rgba, vec![255; 4]);
        assert!(NoAssets.load_image("white").is_err());
    }
}
