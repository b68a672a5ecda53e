//! GPU backend abstraction
//!
//! The frame renderer never touches wgpu objects directly. It talks to a
//! [`RenderBackend`] through opaque handles and records each frame into a
//! [`CommandList`], which the backend replays into a real render pass on submit.
//! This keeps the per-frame protocol testable without a GPU (see
//! [`HeadlessBackend`](super::HeadlessBackend)).

use crate::error::RenderError;
use crate::gfx::geometry::VertexLayout;
use crate::gfx::resources::material::FillMode;
use crate::tracking::VideoFrame;

use super::uniforms::FrameUniforms;

macro_rules! define_handle {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
        pub struct $name(u64);

        impl $name {
            /// Wraps a backend-assigned identifier
            pub fn from_raw(raw: u64) -> Self {
                Self(raw)
            }

            pub fn raw(&self) -> u64 {
                self.0
            }
        }
    };
}

define_handle!(
    /// A GPU buffer owned by a backend
    BufferHandle
);
define_handle!(
    /// A sampled 2D texture owned by a backend
    TextureHandle
);
define_handle!(
    /// A compiled render pipeline
    PipelineHandle
);

/// Monotonic submission counter; `SubmissionIndex(0)` means "nothing submitted yet"
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct SubmissionIndex(pub u64);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BufferDescriptor<'a> {
    pub label: &'a str,
    pub size: u64,
    pub usage: wgpu::BufferUsages,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TextureDescriptor<'a> {
    pub label: &'a str,
    pub width: u32,
    pub height: u32,
    pub format: wgpu::TextureFormat,
    /// Tightly packed texel rows
    pub data: &'a [u8],
}

impl TextureDescriptor<'_> {
    /// Byte length `data` must have for the described extent and format
    pub fn expected_len(&self) -> Option<usize> {
        let texel = self.format.block_copy_size(None)? as usize;
        Some(self.width as usize * self.height as usize * texel)
    }
}

/// Attachment formats of a render pass
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PassSignature {
    pub color_format: wgpu::TextureFormat,
    pub depth_format: Option<wgpu::TextureFormat>,
}

/// The drawable acquired for one frame
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RenderTarget {
    pub width: u32,
    pub height: u32,
    pub pass: PassSignature,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PipelineKind {
    /// Scene geometry; lit or unlit depending on the vertex layout
    Scene,
    /// Full-viewport camera feed, drawn without depth testing
    VideoQuad,
}

/// Everything a compiled pipeline depends on
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PipelineKey {
    pub kind: PipelineKind,
    pub layout: VertexLayout,
    pub pass: PassSignature,
    pub topology: wgpu::PrimitiveTopology,
    pub fill_mode: FillMode,
}

impl PipelineKey {
    pub fn scene(
        layout: VertexLayout,
        pass: PassSignature,
        topology: wgpu::PrimitiveTopology,
        fill_mode: FillMode,
    ) -> Self {
        Self {
            kind: PipelineKind::Scene,
            layout,
            pass,
            topology,
            fill_mode,
        }
    }

    pub fn video_quad(pass: PassSignature) -> Self {
        Self {
            kind: PipelineKind::VideoQuad,
            layout: VertexLayout::default(),
            pass,
            topology: wgpu::PrimitiveTopology::TriangleStrip,
            fill_mode: FillMode::Solid,
        }
    }
}

/// Luma (R8) and chroma (RG8) planes of the current camera image
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct VideoTextures {
    pub luma: TextureHandle,
    pub chroma: TextureHandle,
}

/// Resolved textures for one draw element; `None` slots are bound to a neutral fallback
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct MaterialTextures {
    pub diffuse: Option<TextureHandle>,
    pub normal: Option<TextureHandle>,
    pub emissive: Option<TextureHandle>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum RenderCommand {
    SetPipeline(PipelineHandle),
    SetFrameUniforms(FrameUniforms),
    DrawVideoQuad {
        textures: VideoTextures,
        /// Inverted display transform, as three padded columns
        display_matrix: [[f32; 4]; 3],
    },
    SetVertexBuffer {
        slot: u32,
        buffer: BufferHandle,
    },
    SetInstanceUniforms {
        buffer: BufferHandle,
        offset: u64,
    },
    SetMaterialTextures(MaterialTextures),
    DrawIndexed {
        topology: wgpu::PrimitiveTopology,
        index_count: u32,
        index_format: wgpu::IndexFormat,
        index_buffer: BufferHandle,
        index_offset: u64,
    },
}

/// Commands recorded for a single frame, replayed in order by the backend
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CommandList {
    commands: Vec<RenderCommand>,
}

impl CommandList {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, command: RenderCommand) {
        self.commands.push(command);
    }

    pub fn commands(&self) -> &[RenderCommand] {
        &self.commands
    }

    pub fn len(&self) -> usize {
        self.commands.len()
    }

    pub fn is_empty(&self) -> bool {
        self.commands.is_empty()
    }

    /// Number of indexed draws (the video quad is not counted)
    pub fn draw_count(&self) -> usize {
        self.commands
            .iter()
            .filter(|c| matches!(c, RenderCommand::DrawIndexed { .. }))
            .count()
    }
}

/// GPU device, queue and presentation surface as seen by the renderer
pub trait RenderBackend {
    fn create_buffer(&mut self, desc: &BufferDescriptor) -> BufferHandle;

    fn create_buffer_init(
        &mut self,
        label: &str,
        usage: wgpu::BufferUsages,
        contents: &[u8],
    ) -> BufferHandle;

    /// Queues a write that lands before the next submission executes
    fn write_buffer(&mut self, buffer: BufferHandle, offset: u64, data: &[u8]);

    fn buffer_size(&self, buffer: BufferHandle) -> Option<u64>;

    fn destroy_buffer(&mut self, buffer: BufferHandle);

    fn create_texture(&mut self, desc: &TextureDescriptor) -> Result<TextureHandle, RenderError>;

    fn destroy_texture(&mut self, texture: TextureHandle);

    fn create_pipeline(&mut self, key: &PipelineKey) -> Result<PipelineHandle, RenderError>;

    /// Uploads the camera image planes; `None` when the planes cannot be imported
    fn import_video_frame(&mut self, frame: &VideoFrame) -> Option<VideoTextures>;

    /// Current drawable, or `None` when no drawable is available this frame
    fn acquire_target(&mut self) -> Option<RenderTarget>;

    /// Replays `commands` into a pass over the acquired target and presents it
    fn submit(&mut self, target: RenderTarget, commands: CommandList) -> SubmissionIndex;

    /// Latest submission the GPU has finished executing
    fn completed_submission(&mut self) -> SubmissionIndex;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_texture_descriptor_expected_len() {
        let desc = TextureDescriptor {
            label: "t",
            width: 4,
            height: 2,
            format: wgpu::TextureFormat::Rgba8Unorm,
            data: &[],
        };
        assert_eq!(desc.expected_len(), Some(32));

        let luma = TextureDescriptor {
            format: wgpu::TextureFormat::R8Unorm,
            ..desc
        };
        assert_eq!(luma.expected_len(), Some(8));
    }

    #[test]
    fn test_draw_count_ignores_state_commands() {
        let mut list = CommandList::new();
        list.push(RenderCommand::SetPipeline(PipelineHandle::from_raw(1)));
        list.push(RenderCommand::DrawIndexed {
            topology: wgpu::PrimitiveTopology::TriangleList,
            index_count: 3,
            index_format: wgpu::IndexFormat::Uint32,
            index_buffer: BufferHandle::from_raw(2),
            index_offset: 0,
        });
        assert_eq!(list.len(), 2);
        assert_eq!(list.draw_count(), 1);
    }
}
