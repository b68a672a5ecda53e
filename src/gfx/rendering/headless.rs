//! A [`RenderBackend`] without a GPU
//!
//! Keeps buffer and texture contents in host memory and records every submitted
//! [`CommandList`]. Drawable availability and GPU completion are under the caller's
//! control, which makes frame skipping and deferred recycling observable.

use std::collections::HashMap;

use crate::error::RenderError;
use crate::gfx::resources::texture_resource::TextureResource;
use crate::tracking::VideoFrame;

use super::backend::{
    BufferDescriptor, BufferHandle, CommandList, PassSignature, PipelineHandle, PipelineKey,
    RenderBackend, RenderTarget, SubmissionIndex, TextureDescriptor, TextureHandle,
    VideoTextures,
};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HeadlessTexture {
    pub width: u32,
    pub height: u32,
    pub format: wgpu::TextureFormat,
    pub data: Vec<u8>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct HeadlessSubmission {
    pub index: SubmissionIndex,
    pub target: RenderTarget,
    pub commands: CommandList,
}

#[derive(Debug)]
pub struct HeadlessBackend {
    width: u32,
    height: u32,
    pass: PassSignature,
    next_id: u64,
    buffers: HashMap<BufferHandle, Vec<u8>>,
    textures: HashMap<TextureHandle, HeadlessTexture>,
    pipelines: HashMap<PipelineHandle, PipelineKey>,
    video: Option<VideoTextures>,
    target_available: bool,
    auto_complete: bool,
    fail_pipelines: bool,
    submitted: SubmissionIndex,
    completed: SubmissionIndex,
    submissions: Vec<HeadlessSubmission>,
}

impl HeadlessBackend {
    /// Backend with an always-available `width`×`height` target whose submissions
    /// stay in flight until completed explicitly
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            pass: PassSignature {
                color_format: wgpu::TextureFormat::Bgra8Unorm,
                depth_format: Some(TextureResource::DEPTH_FORMAT),
            },
            next_id: 1,
            buffers: HashMap::new(),
            textures: HashMap::new(),
            pipelines: HashMap::new(),
            video: None,
            target_available: true,
            auto_complete: false,
            fail_pipelines: false,
            submitted: SubmissionIndex(0),
            completed: SubmissionIndex(0),
            submissions: Vec::new(),
        }
    }

    pub fn with_pass(mut self, pass: PassSignature) -> Self {
        self.pass = pass;
        self
    }

    pub fn resize(&mut self, width: u32, height: u32) {
        self.width = width;
        self.height = height;
    }

    pub fn set_target_available(&mut self, available: bool) {
        self.target_available = available;
    }

    /// Report every submission complete as soon as it is made
    pub fn set_auto_complete(&mut self, auto_complete: bool) {
        self.auto_complete = auto_complete;
        if auto_complete {
            self.completed = self.submitted;
        }
    }

    /// Make pipeline creation fail, as a driver rejecting a shader would
    pub fn set_fail_pipelines(&mut self, fail: bool) {
        self.fail_pipelines = fail;
    }

    pub fn complete_up_to(&mut self, index: SubmissionIndex) {
        self.completed = self.completed.max(index.min(self.submitted));
    }

    pub fn complete_all(&mut self) {
        self.completed = self.submitted;
    }

    pub fn submissions(&self) -> &[HeadlessSubmission] {
        &self.submissions
    }

    pub fn last_submission(&self) -> Option<&HeadlessSubmission> {
        self.submissions.last()
    }

    pub fn buffer_data(&self, buffer: BufferHandle) -> Option<&[u8]> {
        self.buffers.get(&buffer).map(Vec::as_slice)
    }

    pub fn texture(&self, texture: TextureHandle) -> Option<&HeadlessTexture> {
        self.textures.get(&texture)
    }

    pub fn texture_data(&self, texture: TextureHandle) -> Option<&[u8]> {
        self.textures.get(&texture).map(|t| t.data.as_slice())
    }

    pub fn live_buffer_count(&self) -> usize {
        self.buffers.len()
    }

    pub fn live_texture_count(&self) -> usize {
        self.textures.len()
    }

    pub fn pipeline_count(&self) -> usize {
        self.pipelines.len()
    }

    pub fn pipeline_key(&self, pipeline: PipelineHandle) -> Option<&PipelineKey> {
        self.pipelines.get(&pipeline)
    }

    fn next_raw(&mut self) -> u64 {
        let id = self.next_id;
        self.next_id += 1;
        id
    }

    fn upload_plane(
        &mut self,
        existing: Option<TextureHandle>,
        desc: &TextureDescriptor,
    ) -> Option<TextureHandle> {
        if let Some(handle) = existing {
            if let Some(texture) = self.textures.get_mut(&handle) {
                if texture.width == desc.width && texture.height == desc.height {
                    texture.data.copy_from_slice(desc.data);
                    return Some(handle);
                }
            }
            self.textures.remove(&handle);
        }
        self.create_texture(desc).ok()
    }
}

impl RenderBackend for HeadlessBackend {
    fn create_buffer(&mut self, desc: &BufferDescriptor) -> BufferHandle {
        let handle = BufferHandle::from_raw(self.next_raw());
        self.buffers.insert(handle, vec![0; desc.size as usize]);
        handle
    }

    fn create_buffer_init(
        &mut self,
        _label: &str,
        _usage: wgpu::BufferUsages,
        contents: &[u8],
    ) -> BufferHandle {
        let handle = BufferHandle::from_raw(self.next_raw());
        self.buffers.insert(handle, contents.to_vec());
        handle
    }

    fn write_buffer(&mut self, buffer: BufferHandle, offset: u64, data: &[u8]) {
        let Some(contents) = self.buffers.get_mut(&buffer) else {
            log::error!("write to destroyed buffer {}", buffer.raw());
            return;
        };
        let start = offset as usize;
        match contents.get_mut(start..start + data.len()) {
            Some(range) => range.copy_from_slice(data),
            None => log::error!(
                "write of {} bytes at {} overruns buffer {} ({} bytes)",
                data.len(),
                offset,
                buffer.raw(),
                contents.len()
            ),
        }
    }

    fn buffer_size(&self, buffer: BufferHandle) -> Option<u64> {
        self.buffers.get(&buffer).map(|b| b.len() as u64)
    }

    fn destroy_buffer(&mut self, buffer: BufferHandle) {
        self.buffers.remove(&buffer);
    }

    fn create_texture(&mut self, desc: &TextureDescriptor) -> Result<TextureHandle, RenderError> {
        if desc.width == 0 || desc.height == 0 {
            return Err(RenderError::TextureCreation(format!(
                "'{}' has an empty extent",
                desc.label
            )));
        }
        if desc.expected_len() != Some(desc.data.len()) {
            return Err(RenderError::TextureCreation(format!(
                "'{}' expects {:?} bytes, got {}",
                desc.label,
                desc.expected_len(),
                desc.data.len()
            )));
        }
        let handle = TextureHandle::from_raw(self.next_raw());
        self.textures.insert(
            handle,
            HeadlessTexture {
                width: desc.width,
                height: desc.height,
                format: desc.format,
                data: desc.data.to_vec(),
            },
        );
        Ok(handle)
    }

    fn destroy_texture(&mut self, texture: TextureHandle) {
        self.textures.remove(&texture);
    }

    fn create_pipeline(&mut self, key: &PipelineKey) -> Result<PipelineHandle, RenderError> {
        if self.fail_pipelines {
            return Err(RenderError::PipelineCreation(format!(
                "{:?} pipeline rejected",
                key.kind
            )));
        }
        let handle = PipelineHandle::from_raw(self.next_raw());
        self.pipelines.insert(handle, key.clone());
        Ok(handle)
    }

    fn import_video_frame(&mut self, frame: &VideoFrame) -> Option<VideoTextures> {
        if !frame.luma.is_well_formed(1) || !frame.chroma.is_well_formed(2) {
            return None;
        }
        let luma = self.upload_plane(
            self.video.map(|v| v.luma),
            &TextureDescriptor {
                label: "Camera Luma",
                width: frame.luma.width,
                height: frame.luma.height,
                format: wgpu::TextureFormat::R8Unorm,
                data: &frame.luma.data,
            },
        )?;
        let chroma = self.upload_plane(
            self.video.map(|v| v.chroma),
            &TextureDescriptor {
                label: "Camera Chroma",
                width: frame.chroma.width,
                height: frame.chroma.height,
                format: wgpu::TextureFormat::Rg8Unorm,
                data: &frame.chroma.data,
            },
        )?;
        let textures = VideoTextures { luma, chroma };
        self.video = Some(textures);
        Some(textures)
    }

    fn acquire_target(&mut self) -> Option<RenderTarget> {
        self.target_available.then_some(RenderTarget {
            width: self.width,
            height: self.height,
            pass: self.pass,
        })
    }

    fn submit(&mut self, target: RenderTarget, commands: CommandList) -> SubmissionIndex {
        self.submitted = SubmissionIndex(self.submitted.0 + 1);
        if self.auto_complete {
            self.completed = self.submitted;
        }
        self.submissions.push(HeadlessSubmission {
            index: self.submitted,
            target,
            commands,
        });
        self.submitted
    }

    fn completed_submission(&mut self) -> SubmissionIndex {
        self.completed
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gfx::math::AffineTransform2D;
    use crate::tracking::ImagePlane;

    fn video(width: u32, height: u32) -> VideoFrame {
        VideoFrame {
            luma: ImagePlane::new(width, height, vec![16; (width * height) as usize]),
            chroma: ImagePlane::new(
                width / 2,
                height / 2,
                vec![128; (width * height / 2) as usize],
            ),
            display_transform: AffineTransform2D::IDENTITY,
        }
    }

    #[test]
    fn test_video_planes_are_reused() {
        let mut backend = HeadlessBackend::new(4, 4);
        let first = backend.import_video_frame(&video(4, 4)).unwrap();
        let second = backend.import_video_frame(&video(4, 4)).unwrap();
        assert_eq!(first, second);
        assert_eq!(backend.texture(first.chroma).unwrap().format, wgpu::TextureFormat::Rg8Unorm);

        let resized = backend.import_video_frame(&video(8, 8)).unwrap();
        assert_ne!(resized.luma, first.luma);
        assert_eq!(backend.live_texture_count(), 2);
    }

    #[test]
    fn test_malformed_video_is_rejected() {
        let mut backend = HeadlessBackend::new(4, 4);
        let mut frame = video(4, 4);
        frame.chroma.data.pop();
        assert_eq!(backend.import_video_frame(&frame), None);
    }

    #[test]
    fn test_completion_is_explicit() {
        let mut backend = HeadlessBackend::new(4, 4);
        let target = backend.acquire_target().unwrap();
        let first = backend.submit(target, CommandList::new());
        let second = backend.submit(target, CommandList::new());
        assert_eq!(backend.completed_submission(), SubmissionIndex(0));

        backend.complete_up_to(first);
        assert_eq!(backend.completed_submission(), first);
        backend.complete_all();
        assert_eq!(backend.completed_submission(), second);

        backend.set_target_available(false);
        assert!(backend.acquire_target().is_none());
    }
}
