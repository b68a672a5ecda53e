//! WGPU-based rendering backend
//!
//! [`WgpuBackend`] owns the device, queue and window surface, keeps every GPU object
//! behind the opaque handles of [`RenderBackend`], and replays a frame's
//! [`CommandList`] into a single render pass:
//!
//! - Group 0: frame uniforms (scene pipelines) or display uniforms and camera planes
//!   (video quad)
//! - Group 1: instance uniforms at a dynamic offset
//! - Group 2: material sampler plus diffuse, normal and emissive textures
//!
//! Submission completion is tracked with `Queue::on_submitted_work_done` and observed
//! by polling the device without blocking.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use wgpu::util::DeviceExt;
use wgpu::TextureFormat;

use crate::config::RendererConfig;
use crate::error::RenderError;
use crate::gfx::resources::texture_resource::TextureResource;
use crate::tracking::VideoFrame;
use crate::wgpu_utils::{binding_types, UniformBuffer};

use super::backend::{
    BufferDescriptor, BufferHandle, CommandList, MaterialTextures, PassSignature,
    PipelineHandle, PipelineKey, PipelineKind, RenderBackend, RenderCommand, RenderTarget,
    SubmissionIndex, TextureDescriptor, TextureHandle, VideoTextures,
};
use super::uniforms::{FrameUniforms, InstanceUniforms};

/// Inverse display transform for the camera quad, as padded columns
#[repr(C)]
#[derive(Copy, Clone, Debug, PartialEq, bytemuck::Pod, bytemuck::Zeroable)]
struct DisplayUniforms {
    transform: [[f32; 4]; 3],
}

struct BindGroupLayouts {
    frame: wgpu::BindGroupLayout,
    instance: wgpu::BindGroupLayout,
    material: wgpu::BindGroupLayout,
    video: wgpu::BindGroupLayout,
}

struct FallbackTextures {
    diffuse: TextureResource,
    normal: TextureResource,
    emissive: TextureResource,
}

/// [`RenderBackend`] presenting to a window surface through wgpu
pub struct WgpuBackend {
    surface: wgpu::Surface<'static>,
    device: Arc<wgpu::Device>,
    queue: Arc<wgpu::Queue>,
    config: wgpu::SurfaceConfiguration,
    depth_texture: TextureResource,
    clear_color: wgpu::Color,
    polygon_mode_line: bool,

    material_shader: wgpu::ShaderModule,
    unlit_shader: wgpu::ShaderModule,
    video_shader: wgpu::ShaderModule,
    layouts: BindGroupLayouts,
    scene_pipeline_layout: wgpu::PipelineLayout,
    video_pipeline_layout: wgpu::PipelineLayout,

    frame_uniforms: UniformBuffer<FrameUniforms>,
    frame_bind_group: wgpu::BindGroup,
    display_uniforms: UniformBuffer<DisplayUniforms>,
    sampler: wgpu::Sampler,
    fallbacks: FallbackTextures,

    next_id: u64,
    buffers: HashMap<BufferHandle, wgpu::Buffer>,
    textures: HashMap<TextureHandle, TextureResource>,
    pipelines: HashMap<PipelineHandle, wgpu::RenderPipeline>,
    video: Option<VideoTextures>,
    instance_bind_groups: HashMap<BufferHandle, wgpu::BindGroup>,
    material_bind_groups: HashMap<MaterialTextures, wgpu::BindGroup>,
    video_bind_group: Option<(VideoTextures, wgpu::BindGroup)>,

    current_frame: Option<wgpu::SurfaceTexture>,
    submitted: u64,
    completed: Arc<AtomicU64>,
}

impl WgpuBackend {
    /// Creates a backend rendering into the given window
    ///
    /// # Arguments
    /// * `window` - Window surface target for rendering
    /// * `width` - Initial surface width in pixels
    /// * `height` - Initial surface height in pixels
    /// * `settings` - Clear color and presentation mode
    pub async fn new(
        window: impl Into<wgpu::SurfaceTarget<'static>>,
        width: u32,
        height: u32,
        settings: &RendererConfig,
    ) -> Result<Self, RenderError> {
        let instance = wgpu::Instance::new(&wgpu::InstanceDescriptor {
            backends: wgpu::Backends::all(),
            ..Default::default()
        });
        let surface = instance
            .create_surface(window)
            .map_err(|e| RenderError::Initialization(e.to_string()))?;

        let adapter = instance
            .request_adapter(&wgpu::RequestAdapterOptions {
                power_preference: wgpu::PowerPreference::default(),
                compatible_surface: Some(&surface),
                force_fallback_adapter: false,
            })
            .await
            .map_err(|e| RenderError::Initialization(e.to_string()))?;

        let polygon_mode_line = adapter
            .features()
            .contains(wgpu::Features::POLYGON_MODE_LINE);
        let required_features = if polygon_mode_line {
            wgpu::Features::POLYGON_MODE_LINE
        } else {
            log::info!("Wireframe fill unsupported by this adapter; wireframes draw solid");
            wgpu::Features::empty()
        };

        let (device, queue) = adapter
            .request_device(&wgpu::DeviceDescriptor {
                label: Some("WGPU Device"),
                required_features,
                required_limits: wgpu::Limits {
                    max_texture_dimension_2d: 4096,
                    ..wgpu::Limits::downlevel_defaults()
                },
                memory_hints: wgpu::MemoryHints::default(),
                trace: wgpu::Trace::Off,
            })
            .await
            .map_err(|e| RenderError::Initialization(e.to_string()))?;
        log::info!("Using adapter {:?}", adapter.get_info().name);

        let surface_capabilities = surface.get_capabilities(&adapter);
        let format = surface_capabilities
            .formats
            .iter()
            .copied()
            .find(|f| !f.is_srgb())
            .or_else(|| surface_capabilities.formats.first().copied())
            .ok_or_else(|| RenderError::Initialization("surface has no formats".into()))?;

        let config = wgpu::SurfaceConfiguration {
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT,
            format,
            width: width.max(1),
            height: height.max(1),
            present_mode: present_mode(settings.vsync),
            alpha_mode: surface_capabilities
                .alpha_modes
                .first()
                .copied()
                .unwrap_or(wgpu::CompositeAlphaMode::Auto),
            view_formats: vec![],
            desired_maximum_frame_latency: 2,
        };
        surface.configure(&device, &config);

        let depth_texture = TextureResource::create_depth_texture(
            &device,
            config.width,
            config.height,
            "depth_texture",
        );

        let layouts = create_bind_group_layouts(&device);
        let scene_pipeline_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("Scene Pipeline Layout"),
            bind_group_layouts: &[&layouts.frame, &layouts.instance, &layouts.material],
            push_constant_ranges: &[],
        });
        let video_pipeline_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("Video Quad Pipeline Layout"),
            bind_group_layouts: &[&layouts.video],
            push_constant_ranges: &[],
        });

        let material_shader = device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some("material"),
            source: wgpu::ShaderSource::Wgsl(include_str!("shaders/material.wgsl").into()),
        });
        let unlit_shader = device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some("unlit"),
            source: wgpu::ShaderSource::Wgsl(include_str!("shaders/unlit.wgsl").into()),
        });
        let video_shader = device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some("video_quad"),
            source: wgpu::ShaderSource::Wgsl(include_str!("shaders/video_quad.wgsl").into()),
        });

        let frame_uniforms = UniformBuffer::<FrameUniforms>::new(&device);
        let frame_bind_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("Frame Bind Group"),
            layout: &layouts.frame,
            entries: &[wgpu::BindGroupEntry {
                binding: 0,
                resource: frame_uniforms.binding_resource(),
            }],
        });
        let display_uniforms = UniformBuffer::<DisplayUniforms>::new(&device);

        let sampler = device.create_sampler(&wgpu::SamplerDescriptor {
            label: Some("Shared Sampler"),
            address_mode_u: wgpu::AddressMode::ClampToEdge,
            address_mode_v: wgpu::AddressMode::ClampToEdge,
            address_mode_w: wgpu::AddressMode::ClampToEdge,
            mag_filter: wgpu::FilterMode::Linear,
            min_filter: wgpu::FilterMode::Linear,
            mipmap_filter: wgpu::FilterMode::Nearest,
            ..Default::default()
        });

        let fallback = |texel: [u8; 4], label: &str| {
            TextureResource::create_with_data(
                &device,
                &queue,
                TextureFormat::Rgba8Unorm,
                1,
                1,
                &texel,
                label,
            )
        };
        let fallbacks = FallbackTextures {
            diffuse: fallback([255, 255, 255, 255], "Fallback Diffuse"),
            normal: fallback([128, 128, 255, 255], "Fallback Normal"),
            emissive: fallback([0, 0, 0, 255], "Fallback Emissive"),
        };

        let [r, g, b, a] = settings.clear_color;
        Ok(Self {
            surface,
            device: Arc::new(device),
            queue: Arc::new(queue),
            config,
            depth_texture,
            clear_color: wgpu::Color { r, g, b, a },
            polygon_mode_line,
            material_shader,
            unlit_shader,
            video_shader,
            layouts,
            scene_pipeline_layout,
            video_pipeline_layout,
            frame_uniforms,
            frame_bind_group,
            display_uniforms,
            sampler,
            fallbacks,
            next_id: 1,
            buffers: HashMap::new(),
            textures: HashMap::new(),
            pipelines: HashMap::new(),
            video: None,
            instance_bind_groups: HashMap::new(),
            material_bind_groups: HashMap::new(),
            video_bind_group: None,
            current_frame: None,
            submitted: 0,
            completed: Arc::new(AtomicU64::new(0)),
        })
    }

    /// Resizes the surface and depth buffer; zero sizes are ignored
    pub fn resize(&mut self, width: u32, height: u32) {
        if width == 0 || height == 0 {
            return;
        }
        self.config.width = width;
        self.config.height = height;
        self.surface.configure(&self.device, &self.config);
        self.depth_texture =
            TextureResource::create_depth_texture(&self.device, width, height, "depth_texture");
    }

    pub fn set_vsync(&mut self, enable: bool) {
        self.config.present_mode = present_mode(enable);
        self.surface.configure(&self.device, &self.config);
    }

    pub fn get_surface_size(&self) -> (u32, u32) {
        (self.config.width, self.config.height)
    }

    pub fn surface_format(&self) -> TextureFormat {
        self.config.format
    }

    pub fn device(&self) -> &wgpu::Device {
        &self.device
    }

    pub fn queue(&self) -> &wgpu::Queue {
        &self.queue
    }

    fn pass_signature(&self) -> PassSignature {
        PassSignature {
            color_format: self.config.format,
            depth_format: Some(TextureResource::DEPTH_FORMAT),
        }
    }

    fn next_raw(&mut self) -> u64 {
        let id = self.next_id;
        self.next_id += 1;
        id
    }

    fn upload_plane(
        &mut self,
        existing: Option<TextureHandle>,
        format: TextureFormat,
        width: u32,
        height: u32,
        data: &[u8],
        label: &str,
    ) -> TextureHandle {
        if let Some(handle) = existing {
            if let Some(texture) = self.textures.get(&handle) {
                if texture.matches(format, width, height) {
                    texture.write(&self.queue, data);
                    return handle;
                }
            }
            self.destroy_texture(handle);
        }
        let handle = TextureHandle::from_raw(self.next_raw());
        let texture = TextureResource::create_with_data(
            &self.device,
            &self.queue,
            format,
            width,
            height,
            data,
            label,
        );
        self.textures.insert(handle, texture);
        handle
    }

    /// Creates the bind groups the recorded commands refer to
    fn prepare_bindings(&mut self, commands: &CommandList) {
        for command in commands.commands() {
            match command {
                RenderCommand::SetFrameUniforms(uniforms) => {
                    self.frame_uniforms.update_content(&self.queue, *uniforms);
                }
                RenderCommand::DrawVideoQuad {
                    textures,
                    display_matrix,
                } => {
                    self.display_uniforms.update_content(
                        &self.queue,
                        DisplayUniforms {
                            transform: *display_matrix,
                        },
                    );
                    self.prepare_video_bind_group(*textures);
                }
                RenderCommand::SetInstanceUniforms { buffer, .. } => {
                    self.prepare_instance_bind_group(*buffer);
                }
                RenderCommand::SetMaterialTextures(textures) => {
                    self.prepare_material_bind_group(*textures);
                }
                RenderCommand::SetPipeline(_)
                | RenderCommand::SetVertexBuffer { .. }
                | RenderCommand::DrawIndexed { .. } => {}
            }
        }
    }

    fn prepare_instance_bind_group(&mut self, buffer: BufferHandle) {
        if self.instance_bind_groups.contains_key(&buffer) {
            return;
        }
        let Some(gpu_buffer) = self.buffers.get(&buffer) else {
            return;
        };
        let bind_group = self.device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("Instance Bind Group"),
            layout: &self.layouts.instance,
            entries: &[wgpu::BindGroupEntry {
                binding: 0,
                resource: wgpu::BindingResource::Buffer(wgpu::BufferBinding {
                    buffer: gpu_buffer,
                    offset: 0,
                    size: wgpu::BufferSize::new(std::mem::size_of::<InstanceUniforms>() as u64),
                }),
            }],
        });
        self.instance_bind_groups.insert(buffer, bind_group);
    }

    fn prepare_material_bind_group(&mut self, textures: MaterialTextures) {
        if self.material_bind_groups.contains_key(&textures) {
            return;
        }
        let bind_group = self.device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("Material Bind Group"),
            layout: &self.layouts.material,
            entries: &[
                wgpu::BindGroupEntry {
                    binding: 0,
                    resource: wgpu::BindingResource::Sampler(&self.sampler),
                },
                wgpu::BindGroupEntry {
                    binding: 1,
                    resource: wgpu::BindingResource::TextureView(
                        &texture_or(&self.textures, textures.diffuse, &self.fallbacks.diffuse)
                            .view,
                    ),
                },
                wgpu::BindGroupEntry {
                    binding: 2,
                    resource: wgpu::BindingResource::TextureView(
                        &texture_or(&self.textures, textures.normal, &self.fallbacks.normal)
                            .view,
                    ),
                },
                wgpu::BindGroupEntry {
                    binding: 3,
                    resource: wgpu::BindingResource::TextureView(
                        &texture_or(&self.textures, textures.emissive, &self.fallbacks.emissive)
                            .view,
                    ),
                },
            ],
        });
        self.material_bind_groups.insert(textures, bind_group);
    }

    fn prepare_video_bind_group(&mut self, textures: VideoTextures) {
        if matches!(&self.video_bind_group, Some((cached, _)) if *cached == textures) {
            return;
        }
        let (Some(luma), Some(chroma)) = (
            self.textures.get(&textures.luma),
            self.textures.get(&textures.chroma),
        ) else {
            return;
        };
        let bind_group = self.device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("Video Quad Bind Group"),
            layout: &self.layouts.video,
            entries: &[
                wgpu::BindGroupEntry {
                    binding: 0,
                    resource: self.display_uniforms.binding_resource(),
                },
                wgpu::BindGroupEntry {
                    binding: 1,
                    resource: wgpu::BindingResource::Sampler(&self.sampler),
                },
                wgpu::BindGroupEntry {
                    binding: 2,
                    resource: wgpu::BindingResource::TextureView(&luma.view),
                },
                wgpu::BindGroupEntry {
                    binding: 3,
                    resource: wgpu::BindingResource::TextureView(&chroma.view),
                },
            ],
        });
        self.video_bind_group = Some((textures, bind_group));
    }

    fn replay(&self, pass: &mut wgpu::RenderPass<'_>, command: &RenderCommand) {
        match command {
            RenderCommand::SetPipeline(handle) => {
                if let Some(pipeline) = self.pipelines.get(handle) {
                    pass.set_pipeline(pipeline);
                }
            }
            RenderCommand::SetFrameUniforms(_) => {
                pass.set_bind_group(0, &self.frame_bind_group, &[]);
            }
            RenderCommand::DrawVideoQuad { textures, .. } => {
                if let Some((cached, bind_group)) = &self.video_bind_group {
                    if cached == textures {
                        pass.set_bind_group(0, bind_group, &[]);
                        pass.draw(0..4, 0..1);
                    }
                }
            }
            RenderCommand::SetVertexBuffer { slot, buffer } => {
                if let Some(buffer) = self.buffers.get(buffer) {
                    pass.set_vertex_buffer(*slot, buffer.slice(..));
                }
            }
            RenderCommand::SetInstanceUniforms { buffer, offset } => {
                if let Some(bind_group) = self.instance_bind_groups.get(buffer) {
                    pass.set_bind_group(1, bind_group, &[*offset as u32]);
                }
            }
            RenderCommand::SetMaterialTextures(textures) => {
                if let Some(bind_group) = self.material_bind_groups.get(textures) {
                    pass.set_bind_group(2, bind_group, &[]);
                }
            }
            RenderCommand::DrawIndexed {
                index_count,
                index_format,
                index_buffer,
                index_offset,
                ..
            } => {
                if let Some(buffer) = self.buffers.get(index_buffer) {
                    pass.set_index_buffer(buffer.slice(*index_offset..), *index_format);
                    pass.draw_indexed(0..*index_count, 0, 0..1);
                }
            }
        }
    }

    fn build_pipeline(&self, key: &PipelineKey) -> wgpu::RenderPipeline {
        let (shader, layout, label) = match key.kind {
            PipelineKind::VideoQuad => (
                &self.video_shader,
                &self.video_pipeline_layout,
                "Video Quad Pipeline",
            ),
            PipelineKind::Scene if key.layout.is_lit() => (
                &self.material_shader,
                &self.scene_pipeline_layout,
                "Material Pipeline",
            ),
            PipelineKind::Scene => (
                &self.unlit_shader,
                &self.scene_pipeline_layout,
                "Unlit Pipeline",
            ),
        };

        let attributes: Vec<Vec<wgpu::VertexAttribute>> = key
            .layout
            .buffers
            .iter()
            .map(|buffer| {
                buffer
                    .attributes
                    .iter()
                    .map(|a| wgpu::VertexAttribute {
                        format: a.format,
                        offset: a.offset,
                        shader_location: a.semantic.shader_location(),
                    })
                    .collect()
            })
            .collect();
        let vertex_buffers: Vec<wgpu::VertexBufferLayout> = key
            .layout
            .buffers
            .iter()
            .zip(&attributes)
            .map(|(buffer, attributes)| wgpu::VertexBufferLayout {
                array_stride: buffer.stride,
                step_mode: wgpu::VertexStepMode::Vertex,
                attributes,
            })
            .collect();

        let wireframe = key.fill_mode == crate::gfx::resources::material::FillMode::Wireframe
            && matches!(
                key.topology,
                wgpu::PrimitiveTopology::TriangleList | wgpu::PrimitiveTopology::TriangleStrip
            );
        let polygon_mode = if wireframe && self.polygon_mode_line {
            wgpu::PolygonMode::Line
        } else {
            wgpu::PolygonMode::Fill
        };

        let (depth_write_enabled, depth_compare, blend) = match key.kind {
            PipelineKind::VideoQuad => (false, wgpu::CompareFunction::Always, wgpu::BlendState::REPLACE),
            PipelineKind::Scene => (
                true,
                wgpu::CompareFunction::Less,
                wgpu::BlendState::PREMULTIPLIED_ALPHA_BLENDING,
            ),
        };
        let depth_stencil = key.pass.depth_format.map(|format| wgpu::DepthStencilState {
            format,
            depth_write_enabled,
            depth_compare,
            stencil: wgpu::StencilState::default(),
            bias: wgpu::DepthBiasState::default(),
        });

        self.device
            .create_render_pipeline(&wgpu::RenderPipelineDescriptor {
                label: Some(label),
                layout: Some(layout),
                vertex: wgpu::VertexState {
                    module: shader,
                    entry_point: Some("vs_main"),
                    buffers: &vertex_buffers,
                    compilation_options: wgpu::PipelineCompilationOptions::default(),
                },
                fragment: Some(wgpu::FragmentState {
                    module: shader,
                    entry_point: Some("fs_main"),
                    targets: &[Some(wgpu::ColorTargetState {
                        format: key.pass.color_format,
                        blend: Some(blend),
                        write_mask: wgpu::ColorWrites::ALL,
                    })],
                    compilation_options: wgpu::PipelineCompilationOptions::default(),
                }),
                primitive: wgpu::PrimitiveState {
                    topology: key.topology,
                    strip_index_format: None,
                    front_face: wgpu::FrontFace::Ccw,
                    cull_mode: None,
                    polygon_mode,
                    unclipped_depth: false,
                    conservative: false,
                },
                depth_stencil,
                multisample: wgpu::MultisampleState::default(),
                multiview: None,
                cache: None,
            })
    }
}

/// Entry behind `handle`, or `fallback` when the handle is unset or unknown
fn texture_or<'a, T>(
    textures: &'a HashMap<TextureHandle, T>,
    handle: Option<TextureHandle>,
    fallback: &'a T,
) -> &'a T {
    handle.and_then(|h| textures.get(&h)).unwrap_or(fallback)
}

impl RenderBackend for WgpuBackend {
    fn create_buffer(&mut self, desc: &BufferDescriptor) -> BufferHandle {
        let buffer = self.device.create_buffer(&wgpu::BufferDescriptor {
            label: Some(desc.label),
            size: desc.size,
            usage: desc.usage,
            mapped_at_creation: false,
        });
        let handle = BufferHandle::from_raw(self.next_raw());
        self.buffers.insert(handle, buffer);
        handle
    }

    fn create_buffer_init(
        &mut self,
        label: &str,
        usage: wgpu::BufferUsages,
        contents: &[u8],
    ) -> BufferHandle {
        let buffer = self
            .device
            .create_buffer_init(&wgpu::util::BufferInitDescriptor {
                label: Some(label),
                contents,
                usage,
            });
        let handle = BufferHandle::from_raw(self.next_raw());
        self.buffers.insert(handle, buffer);
        handle
    }

    fn write_buffer(&mut self, buffer: BufferHandle, offset: u64, data: &[u8]) {
        match self.buffers.get(&buffer) {
            Some(gpu_buffer) => self.queue.write_buffer(gpu_buffer, offset, data),
            None => log::error!("write to destroyed buffer {}", buffer.raw()),
        }
    }

    fn buffer_size(&self, buffer: BufferHandle) -> Option<u64> {
        self.buffers.get(&buffer).map(|b| b.size())
    }

    fn destroy_buffer(&mut self, buffer: BufferHandle) {
        self.instance_bind_groups.remove(&buffer);
        if let Some(gpu_buffer) = self.buffers.remove(&buffer) {
            gpu_buffer.destroy();
        }
    }

    fn create_texture(&mut self, desc: &TextureDescriptor) -> Result<TextureHandle, RenderError> {
        if desc.width == 0 || desc.height == 0 {
            return Err(RenderError::TextureCreation(format!(
                "'{}' has an empty extent",
                desc.label
            )));
        }
        let max = self.device.limits().max_texture_dimension_2d;
        if desc.width > max || desc.height > max {
            return Err(RenderError::TextureCreation(format!(
                "'{}' is {}x{}, larger than the device limit {}",
                desc.label, desc.width, desc.height, max
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
        let texture = TextureResource::create_with_data(
            &self.device,
            &self.queue,
            desc.format,
            desc.width,
            desc.height,
            desc.data,
            desc.label,
        );
        let handle = TextureHandle::from_raw(self.next_raw());
        self.textures.insert(handle, texture);
        Ok(handle)
    }

    fn destroy_texture(&mut self, texture: TextureHandle) {
        self.material_bind_groups.retain(|key, _| {
            key.diffuse != Some(texture) && key.normal != Some(texture) && key.emissive != Some(texture)
        });
        if matches!(&self.video_bind_group, Some((v, _)) if v.luma == texture || v.chroma == texture)
        {
            self.video_bind_group = None;
        }
        if let Some(resource) = self.textures.remove(&texture) {
            resource.texture.destroy();
        }
    }

    fn create_pipeline(&mut self, key: &PipelineKey) -> Result<PipelineHandle, RenderError> {
        self.device.push_error_scope(wgpu::ErrorFilter::Validation);
        let pipeline = self.build_pipeline(key);
        if let Some(error) = pollster::block_on(self.device.pop_error_scope()) {
            return Err(RenderError::PipelineCreation(error.to_string()));
        }
        let handle = PipelineHandle::from_raw(self.next_raw());
        self.pipelines.insert(handle, pipeline);
        Ok(handle)
    }

    fn import_video_frame(&mut self, frame: &VideoFrame) -> Option<VideoTextures> {
        if !frame.luma.is_well_formed(1) || !frame.chroma.is_well_formed(2) {
            return None;
        }
        let luma = self.upload_plane(
            self.video.map(|v| v.luma),
            TextureFormat::R8Unorm,
            frame.luma.width,
            frame.luma.height,
            &frame.luma.data,
            "Camera Luma",
        );
        let chroma = self.upload_plane(
            self.video.map(|v| v.chroma),
            TextureFormat::Rg8Unorm,
            frame.chroma.width,
            frame.chroma.height,
            &frame.chroma.data,
            "Camera Chroma",
        );
        let textures = VideoTextures { luma, chroma };
        self.video = Some(textures);
        Some(textures)
    }

    fn acquire_target(&mut self) -> Option<RenderTarget> {
        match self.surface.get_current_texture() {
            Ok(frame) => {
                self.current_frame = Some(frame);
                Some(RenderTarget {
                    width: self.config.width,
                    height: self.config.height,
                    pass: self.pass_signature(),
                })
            }
            Err(wgpu::SurfaceError::Lost | wgpu::SurfaceError::Outdated) => {
                log::debug!("Surface out of date; reconfiguring");
                self.surface.configure(&self.device, &self.config);
                None
            }
            Err(wgpu::SurfaceError::Timeout) => None,
            Err(err) => {
                log::error!("Failed to acquire surface texture: {}", err);
                None
            }
        }
    }

    fn submit(&mut self, _target: RenderTarget, commands: CommandList) -> SubmissionIndex {
        let Some(frame) = self.current_frame.take() else {
            log::warn!("Submit without an acquired surface texture");
            return SubmissionIndex(self.submitted);
        };

        self.prepare_bindings(&commands);

        let view = frame
            .texture
            .create_view(&wgpu::TextureViewDescriptor::default());
        let mut encoder = self
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("Render Encoder"),
            });
        {
            let mut render_pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
                label: Some("Main Render Pass"),
                color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                    view: &view,
                    resolve_target: None,
                    ops: wgpu::Operations {
                        load: wgpu::LoadOp::Clear(self.clear_color),
                        store: wgpu::StoreOp::Store,
                    },
                })],
                depth_stencil_attachment: Some(wgpu::RenderPassDepthStencilAttachment {
                    view: &self.depth_texture.view,
                    depth_ops: Some(wgpu::Operations {
                        load: wgpu::LoadOp::Clear(1.0),
                        store: wgpu::StoreOp::Store,
                    }),
                    stencil_ops: None,
                }),
                occlusion_query_set: None,
                timestamp_writes: None,
            });

            for command in commands.commands() {
                self.replay(&mut render_pass, command);
            }
        }

        self.submitted += 1;
        let index = self.submitted;
        self.queue.submit(std::iter::once(encoder.finish()));
        let completed = Arc::clone(&self.completed);
        self.queue.on_submitted_work_done(move || {
            completed.fetch_max(index, Ordering::AcqRel);
        });
        frame.present();
        SubmissionIndex(index)
    }

    fn completed_submission(&mut self) -> SubmissionIndex {
        if let Err(err) = self.device.poll(wgpu::PollType::Poll) {
            log::warn!("Device poll failed: {}", err);
        }
        SubmissionIndex(self.completed.load(Ordering::Acquire))
    }
}

fn present_mode(vsync: bool) -> wgpu::PresentMode {
    if vsync {
        wgpu::PresentMode::AutoVsync
    } else {
        wgpu::PresentMode::AutoNoVsync
    }
}

fn create_bind_group_layouts(device: &wgpu::Device) -> BindGroupLayouts {
    use binding_types::{entry, sampler, texture_2d, uniform, uniform_dynamic};

    let fragment = wgpu::ShaderStages::FRAGMENT;
    let filtering = wgpu::SamplerBindingType::Filtering;

    BindGroupLayouts {
        frame: device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("Frame Bind Group Layout"),
            entries: &[entry(
                0,
                wgpu::ShaderStages::VERTEX | wgpu::ShaderStages::FRAGMENT,
                uniform(),
            )],
        }),
        instance: device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("Instance Bind Group Layout"),
            entries: &[entry(
                0,
                wgpu::ShaderStages::VERTEX,
                uniform_dynamic(std::mem::size_of::<InstanceUniforms>() as u64),
            )],
        }),
        material: device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("Material Bind Group Layout"),
            entries: &[
                entry(0, fragment, sampler(filtering)),
                entry(1, fragment, texture_2d()),
                entry(2, fragment, texture_2d()),
                entry(3, fragment, texture_2d()),
            ],
        }),
        video: device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("Video Quad Bind Group Layout"),
            entries: &[
                entry(0, wgpu::ShaderStages::VERTEX, uniform()),
                entry(1, fragment, sampler(filtering)),
                entry(2, fragment, texture_2d()),
                entry(3, fragment, texture_2d()),
            ],
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unknown_or_unset_texture_falls_back() {
        let textures = HashMap::from([(TextureHandle::from_raw(3), "albedo")]);
        let fallback = "white";
        assert_eq!(
            *texture_or(&textures, Some(TextureHandle::from_raw(3)), &fallback),
            "albedo"
        );
        assert_eq!(
            *texture_or(&textures, Some(TextureHandle::from_raw(9)), &fallback),
            "white"
        );
        assert_eq!(*texture_or(&textures, None, &fallback), "white");
    }
}
