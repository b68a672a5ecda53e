//! Material model
//!
//! A [`Material`] is a fill mode plus three [`MaterialProperty`] slots. Each property
//! holds optional [`MaterialContents`] that the renderer resolves lazily into a GPU
//! texture through the [`TextureCache`](super::texture_cache::TextureCache). The cache
//! keys on the property's [`PropertyId`] and revision, so reassigning contents is the
//! only thing that invalidates a resolved texture.

use std::sync::atomic::{AtomicU64, Ordering};

use crate::gfx::rendering::TextureHandle;

static NEXT_PROPERTY_ID: AtomicU64 = AtomicU64::new(1);

/// Process-unique identity of a material property
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PropertyId(u64);

impl PropertyId {
    fn next() -> Self {
        Self(NEXT_PROPERTY_ID.fetch_add(1, Ordering::Relaxed))
    }

    pub fn raw(&self) -> u64 {
        self.0
    }
}

/// Straight-alpha color with components in `[0, 1]`
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Color {
    pub r: f32,
    pub g: f32,
    pub b: f32,
    pub a: f32,
}

impl Color {
    pub const WHITE: Color = Color::new(1.0, 1.0, 1.0, 1.0);
    pub const BLACK: Color = Color::new(0.0, 0.0, 0.0, 1.0);
    pub const RED: Color = Color::new(1.0, 0.0, 0.0, 1.0);
    pub const GREEN: Color = Color::new(0.0, 1.0, 0.0, 1.0);
    pub const BLUE: Color = Color::new(0.0, 0.0, 1.0, 1.0);
    pub const YELLOW: Color = Color::new(1.0, 1.0, 0.0, 1.0);

    pub const fn new(r: f32, g: f32, b: f32, a: f32) -> Self {
        Self { r, g, b, a }
    }

    pub const fn rgb(r: f32, g: f32, b: f32) -> Self {
        Self::new(r, g, b, 1.0)
    }

    /// Single RGBA8 texel with color premultiplied by alpha
    pub fn to_premultiplied_rgba8(&self) -> [u8; 4] {
        let a = self.a.clamp(0.0, 1.0);
        let quantize = |v: f32| (v.clamp(0.0, 1.0) * 255.0).round() as u8;
        [
            quantize(self.r * a),
            quantize(self.g * a),
            quantize(self.b * a),
            quantize(a),
        ]
    }
}

/// What a material property draws its texels from
#[derive(Debug, Clone, PartialEq)]
pub enum MaterialContents {
    /// An existing GPU texture, used as is and never owned by the cache
    Texture(TextureHandle),
    /// A named image loaded through the [`AssetSource`](super::assets::AssetSource)
    Image(String),
    /// A solid color, rasterized into a 1×1 texture
    Color(Color),
    /// A gray level, rasterized into a 1×1 texture
    Scalar(f32),
}

impl From<Color> for MaterialContents {
    fn from(color: Color) -> Self {
        MaterialContents::Color(color)
    }
}

impl From<f32> for MaterialContents {
    fn from(value: f32) -> Self {
        MaterialContents::Scalar(value)
    }
}

impl From<TextureHandle> for MaterialContents {
    fn from(texture: TextureHandle) -> Self {
        MaterialContents::Texture(texture)
    }
}

impl From<&str> for MaterialContents {
    fn from(name: &str) -> Self {
        MaterialContents::Image(name.to_string())
    }
}

impl From<String> for MaterialContents {
    fn from(name: String) -> Self {
        MaterialContents::Image(name)
    }
}

/// A shading input slot
///
/// Cloning a property yields a new identity, so the clone resolves its own texture.
#[derive(Debug)]
pub struct MaterialProperty {
    id: PropertyId,
    contents: Option<MaterialContents>,
    revision: u64,
}

impl Default for MaterialProperty {
    fn default() -> Self {
        Self::new()
    }
}

impl Clone for MaterialProperty {
    fn clone(&self) -> Self {
        Self {
            id: PropertyId::next(),
            contents: self.contents.clone(),
            revision: 0,
        }
    }
}

impl MaterialProperty {
    pub fn new() -> Self {
        Self {
            id: PropertyId::next(),
            contents: None,
            revision: 0,
        }
    }

    pub fn with_contents(contents: impl Into<MaterialContents>) -> Self {
        let mut property = Self::new();
        property.contents = Some(contents.into());
        property
    }

    pub fn id(&self) -> PropertyId {
        self.id
    }

    pub fn contents(&self) -> Option<&MaterialContents> {
        self.contents.as_ref()
    }

    /// Bumped on every assignment; resolved textures are tied to a revision
    pub fn revision(&self) -> u64 {
        self.revision
    }

    pub fn set_contents(&mut self, contents: Option<MaterialContents>) {
        self.contents = contents;
        self.revision += 1;
    }

    pub fn set(&mut self, contents: impl Into<MaterialContents>) {
        self.set_contents(Some(contents.into()));
    }

    pub fn clear(&mut self) {
        self.set_contents(None);
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum FillMode {
    #[default]
    Solid,
    Wireframe,
}

/// Texture slots in shader binding order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TextureSlot {
    Diffuse,
    Normal,
    Emissive,
}

#[derive(Debug, Clone)]
pub struct Material {
    pub name: String,
    pub fill_mode: FillMode,
    pub diffuse: MaterialProperty,
    pub normal: MaterialProperty,
    pub emissive: MaterialProperty,
}

impl Default for Material {
    fn default() -> Self {
        Self::new("default")
    }
}

impl Material {
    /// Light gray diffuse, no normal or emissive contents
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            fill_mode: FillMode::Solid,
            diffuse: MaterialProperty::with_contents(Color::rgb(0.8, 0.8, 0.8)),
            normal: MaterialProperty::new(),
            emissive: MaterialProperty::new(),
        }
    }

    pub fn with_diffuse(mut self, contents: impl Into<MaterialContents>) -> Self {
        self.diffuse.set(contents);
        self
    }

    pub fn with_emissive(mut self, contents: impl Into<MaterialContents>) -> Self {
        self.emissive.set(contents);
        self
    }

    pub fn with_fill_mode(mut self, fill_mode: FillMode) -> Self {
        self.fill_mode = fill_mode;
        self
    }

    pub fn property(&self, slot: TextureSlot) -> &MaterialProperty {
        match slot {
            TextureSlot::Diffuse => &self.diffuse,
            TextureSlot::Normal => &self.normal,
            TextureSlot::Emissive => &self.emissive,
        }
    }

    pub fn property_ids(&self) -> [PropertyId; 3] {
        [self.diffuse.id(), self.normal.id(), self.emissive.id()]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_premultiplied_color() {
        assert_eq!(Color::WHITE.to_premultiplied_rgba8(), [255, 255, 255, 255]);
        assert_eq!(
            Color::new(1.0, 0.5, 0.0, 0.5).to_premultiplied_rgba8(),
            [128, 64, 0, 128]
        );
    }

    #[test]
    fn test_set_contents_bumps_revision() {
        let mut property = MaterialProperty::with_contents(Color::RED);
        let id = property.id();
        assert_eq!(property.revision(), 0);

        property.set(Color::BLUE);
        property.clear();
        assert_eq!(property.revision(), 2);
        assert_eq!(property.contents(), None);
        assert_eq!(property.id(), id);
    }

    #[test]
    fn test_clone_gets_fresh_identity() {
        let material = Material::new("a").with_diffuse("checker");
        let copy = material.clone();
        assert_ne!(material.diffuse.id(), copy.diffuse.id());
        assert_eq!(copy.diffuse.contents(), material.diffuse.contents());
        assert_eq!(
            material.diffuse.contents(),
            Some(&MaterialContents::Image("checker".to_string()))
        );
    }
}
