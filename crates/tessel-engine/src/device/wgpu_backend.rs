//! Headless wgpu device.
//!
//! Every call records into its own encoder and submits immediately, so
//! operations execute in call order. Programs compile to one shader module;
//! pipelines are created lazily per (target format, blend).

use std::collections::HashMap;
use std::sync::mpsc::channel;

use anyhow::Context as _;
use bytemuck::{Pod, Zeroable};
use wgpu::util::DeviceExt;

use crate::coords::IBox;
use crate::error::{EngineError, Result};
use crate::program::{BlendFactor, BlendState, ProgramSource, VertexLayout};

use super::backend::transfer_len;
use super::{
    Backend, Capabilities, DrawCall, Extensions, FramebufferId, PixelFormat, PixelTransfer,
    ProgramHandle, SHADING_BASELINE, SHADING_INSTANCED, SHADING_MODERN, TextureDesc, TextureId,
};

/// Initialization parameters for the headless device.
#[derive(Debug, Clone)]
pub struct WgpuInit {
    pub power_preference: wgpu::PowerPreference,

    /// Use a software adapter when no hardware adapter is available.
    pub force_fallback_adapter: bool,

    /// Features requested on top of the optional ones the engine enables
    /// when the adapter has them.
    pub required_features: wgpu::Features,

    pub required_limits: wgpu::Limits,
}

impl Default for WgpuInit {
    fn default() -> Self {
        Self {
            power_preference: wgpu::PowerPreference::HighPerformance,
            force_fallback_adapter: false,
            required_features: wgpu::Features::empty(),
            required_limits: wgpu::Limits::default(),
        }
    }
}

struct GpuTexture {
    texture: wgpu::Texture,
    view: wgpu::TextureView,
    format: PixelFormat,
    width: u32,
    height: u32,
}

struct GpuProgram {
    module: wgpu::ShaderModule,
    vertex_layout: VertexLayout,
    uniform_size: u64,
    pipelines: HashMap<(wgpu::TextureFormat, Option<BlendState>), wgpu::RenderPipeline>,
}

#[repr(C)]
#[derive(Debug, Copy, Clone, Pod, Zeroable)]
struct Corner {
    pos: [f32; 2],
}

const QUAD_CORNERS: [Corner; 4] = [
    Corner { pos: [0.0, 0.0] },
    Corner { pos: [1.0, 0.0] },
    Corner { pos: [1.0, 1.0] },
    Corner { pos: [0.0, 1.0] },
];

const QUAD_INDICES: [u16; 6] = [0, 1, 2, 0, 2, 3];

const CORNER_ATTRS: [wgpu::VertexAttribute; 1] = wgpu::vertex_attr_array![0 => Float32x2];
const RECT_ATTRS: [wgpu::VertexAttribute; 1] = wgpu::vertex_attr_array![1 => Float32x4];

fn corner_layout() -> wgpu::VertexBufferLayout<'static> {
    wgpu::VertexBufferLayout {
        array_stride: std::mem::size_of::<Corner>() as u64,
        step_mode: wgpu::VertexStepMode::Vertex,
        attributes: &CORNER_ATTRS,
    }
}

fn rect_layout() -> wgpu::VertexBufferLayout<'static> {
    wgpu::VertexBufferLayout {
        array_stride: std::mem::size_of::<[f32; 4]>() as u64,
        step_mode: wgpu::VertexStepMode::Instance,
        attributes: &RECT_ATTRS,
    }
}

fn texture_format(f: PixelFormat) -> wgpu::TextureFormat {
    match f {
        PixelFormat::R8 => wgpu::TextureFormat::R8Unorm,
        PixelFormat::Rgba8 => wgpu::TextureFormat::Rgba8Unorm,
        PixelFormat::Rgb10a2 => wgpu::TextureFormat::Rgb10a2Unorm,
    }
}

fn blend_factor(f: BlendFactor) -> wgpu::BlendFactor {
    match f {
        BlendFactor::Zero => wgpu::BlendFactor::Zero,
        BlendFactor::One => wgpu::BlendFactor::One,
        BlendFactor::SrcAlpha => wgpu::BlendFactor::SrcAlpha,
        BlendFactor::OneMinusSrcAlpha => wgpu::BlendFactor::OneMinusSrcAlpha,
        BlendFactor::DstAlpha => wgpu::BlendFactor::DstAlpha,
        BlendFactor::OneMinusDstAlpha => wgpu::BlendFactor::OneMinusDstAlpha,
        BlendFactor::SrcColor => wgpu::BlendFactor::Src,
        BlendFactor::OneMinusSrcColor => wgpu::BlendFactor::OneMinusSrc,
        BlendFactor::Src1Color => wgpu::BlendFactor::Src1,
        BlendFactor::OneMinusSrc1Color => wgpu::BlendFactor::OneMinusSrc1,
        BlendFactor::DstColor => wgpu::BlendFactor::Dst,
        BlendFactor::OneMinusDstColor => wgpu::BlendFactor::OneMinusDst,
    }
}

fn wgpu_blend(b: BlendState) -> wgpu::BlendState {
    let c = wgpu::BlendComponent {
        src_factor: blend_factor(b.src),
        dst_factor: blend_factor(b.dst),
        operation: wgpu::BlendOperation::Add,
    };
    wgpu::BlendState { color: c, alpha: c }
}

fn shading_version(model: wgpu::ShaderModel) -> u32 {
    match model {
        wgpu::ShaderModel::Sm2 => SHADING_BASELINE,
        wgpu::ShaderModel::Sm4 => SHADING_INSTANCED,
        wgpu::ShaderModel::Sm5 => SHADING_MODERN,
    }
}

fn extent(w: u32, h: u32) -> wgpu::Extent3d {
    wgpu::Extent3d {
        width: w,
        height: h,
        depth_or_array_layers: 1,
    }
}

fn scoped_error(err: wgpu::Error, what: &'static str) -> EngineError {
    match err {
        wgpu::Error::OutOfMemory { .. } => EngineError::OutOfMemory { what },
        other => EngineError::Backend(format!("{what}: {other}")),
    }
}

/// wgpu device backend without a presentation surface.
pub struct WgpuBackend {
    device: wgpu::Device,
    queue: wgpu::Queue,
    caps: Capabilities,
    bind_group_layout: wgpu::BindGroupLayout,
    pipeline_layout: wgpu::PipelineLayout,
    quad_vbo: wgpu::Buffer,
    quad_ibo: wgpu::Buffer,
    /// Bound to texture slots a draw leaves empty.
    dummy_view: wgpu::TextureView,
    textures: HashMap<u64, GpuTexture>,
    framebuffers: HashMap<u64, u64>,
    programs: HashMap<u64, GpuProgram>,
    next_id: u64,
}

impl WgpuBackend {
    /// Opens an adapter and device.
    ///
    /// Adapter/device acquisition is asynchronous under wgpu.
    pub async fn new(init: WgpuInit) -> anyhow::Result<Self> {
        let instance = wgpu::Instance::new(&wgpu::InstanceDescriptor {
            backends: wgpu::Backends::all(),
            ..Default::default()
        });

        let adapter = instance
            .request_adapter(&wgpu::RequestAdapterOptions {
                power_preference: init.power_preference,
                compatible_surface: None,
                force_fallback_adapter: init.force_fallback_adapter,
            })
            .await
            .context("failed to find a suitable GPU adapter")?;

        let optional = adapter.features() & wgpu::Features::DUAL_SOURCE_BLENDING;
        let (device, queue) = adapter
            .request_device(&wgpu::DeviceDescriptor {
                label: Some("tessel device"),
                required_features: init.required_features | optional,
                required_limits: init.required_limits,
                experimental_features: wgpu::ExperimentalFeatures::disabled(),
                memory_hints: wgpu::MemoryHints::Performance,
                trace: wgpu::Trace::Off,
            })
            .await
            .context("failed to create wgpu device/queue")?;

        let mut extensions = Extensions::GPU_SHADER4 | Extensions::CLEAR_TEXTURE;
        if device.features().contains(wgpu::Features::DUAL_SOURCE_BLENDING) {
            extensions |= Extensions::DUAL_SOURCE_BLEND;
        }
        let caps = Capabilities {
            max_texture_size: device.limits().max_texture_dimension_2d,
            shading_version: shading_version(adapter.get_downlevel_capabilities().shader_model),
            extensions,
            alpha_in_red: true,
        };
        log::info!("wgpu adapter: {:?}", adapter.get_info());

        Ok(Self::with_device(device, queue, caps))
    }

    /// Blocking wrapper around [`Self::new`].
    pub fn new_blocking(init: WgpuInit) -> anyhow::Result<Self> {
        pollster::block_on(Self::new(init))
    }

    fn with_device(device: wgpu::Device, queue: wgpu::Queue, caps: Capabilities) -> Self {
        let texture_entry = |binding| wgpu::BindGroupLayoutEntry {
            binding,
            visibility: wgpu::ShaderStages::FRAGMENT,
            ty: wgpu::BindingType::Texture {
                sample_type: wgpu::TextureSampleType::Float { filterable: false },
                view_dimension: wgpu::TextureViewDimension::D2,
                multisampled: false,
            },
            count: None,
        };
        let bind_group_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("tessel program bgl"),
            entries: &[
                wgpu::BindGroupLayoutEntry {
                    binding: 0,
                    visibility: wgpu::ShaderStages::VERTEX_FRAGMENT,
                    ty: wgpu::BindingType::Buffer {
                        ty: wgpu::BufferBindingType::Uniform,
                        has_dynamic_offset: false,
                        min_binding_size: None,
                    },
                    count: None,
                },
                texture_entry(1),
                texture_entry(2),
            ],
        });
        let pipeline_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("tessel pipeline layout"),
            bind_group_layouts: &[&bind_group_layout],
            immediate_size: 0,
        });

        let quad_vbo = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("tessel quad vbo"),
            contents: bytemuck::cast_slice(&QUAD_CORNERS),
            usage: wgpu::BufferUsages::VERTEX,
        });
        let quad_ibo = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("tessel quad ibo"),
            contents: bytemuck::cast_slice(&QUAD_INDICES),
            usage: wgpu::BufferUsages::INDEX,
        });

        let dummy = device.create_texture(&wgpu::TextureDescriptor {
            label: Some("tessel dummy texture"),
            size: extent(1, 1),
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format: wgpu::TextureFormat::Rgba8Unorm,
            usage: wgpu::TextureUsages::TEXTURE_BINDING,
            view_formats: &[],
        });
        let dummy_view = dummy.create_view(&wgpu::TextureViewDescriptor::default());

        Self {
            device,
            queue,
            caps,
            bind_group_layout,
            pipeline_layout,
            quad_vbo,
            quad_ibo,
            dummy_view,
            textures: HashMap::new(),
            framebuffers: HashMap::new(),
            programs: HashMap::new(),
            next_id: 1,
        }
    }

    pub fn device(&self) -> &wgpu::Device {
        &self.device
    }

    pub fn queue(&self) -> &wgpu::Queue {
        &self.queue
    }

    /// Underlying texture, for handing results to a presenter.
    pub fn wgpu_texture(&self, id: TextureId) -> Option<&wgpu::Texture> {
        self.textures.get(&id.0).map(|t| &t.texture)
    }

    /// Registers a texture created elsewhere on this device.
    ///
    /// It needs `TEXTURE_BINDING`, `RENDER_ATTACHMENT`, `COPY_SRC` and
    /// `COPY_DST` usage to take part in every operation.
    pub fn import_texture(&mut self, texture: wgpu::Texture, format: PixelFormat) -> TextureId {
        let view = texture.create_view(&wgpu::TextureViewDescriptor::default());
        let id = self.alloc_id();
        let (width, height) = (texture.width(), texture.height());
        self.textures.insert(
            id,
            GpuTexture {
                texture,
                view,
                format,
                width,
                height,
            },
        );
        TextureId(id)
    }

    fn alloc_id(&mut self) -> u64 {
        let id = self.next_id;
        self.next_id += 1;
        id
    }

    fn texture(&self, id: TextureId) -> Result<&GpuTexture> {
        self.textures
            .get(&id.0)
            .ok_or_else(|| EngineError::Backend(format!("unknown texture {}", id.0)))
    }

    fn encoder(&self, label: &'static str) -> wgpu::CommandEncoder {
        self.device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor { label: Some(label) })
    }

    fn submit(&self, encoder: wgpu::CommandEncoder) {
        self.queue.submit(std::iter::once(encoder.finish()));
    }

    /// Runs `f` inside out-of-memory and validation error scopes.
    fn scoped<T>(&self, what: &'static str, f: impl FnOnce(&wgpu::Device) -> T) -> Result<T> {
        let oom_scope = self.device.push_error_scope(wgpu::ErrorFilter::OutOfMemory);
        let validation_scope = self.device.push_error_scope(wgpu::ErrorFilter::Validation);
        let value = f(&self.device);
        // Scopes pop innermost first.
        let validation = pollster::block_on(validation_scope.pop());
        let oom = pollster::block_on(oom_scope.pop());
        match oom.or(validation) {
            Some(err) => {
                log::error!("wgpu error creating {what}: {err}");
                Err(scoped_error(err, what))
            }
            None => Ok(value),
        }
    }

    fn pipeline(
        &mut self,
        program: ProgramHandle,
        format: wgpu::TextureFormat,
        blend: Option<BlendState>,
    ) -> Result<()> {
        let prog = self
            .programs
            .get(&program.0)
            .ok_or_else(|| EngineError::Backend(format!("unknown program {}", program.0)))?;
        if prog.pipelines.contains_key(&(format, blend)) {
            return Ok(());
        }
        let buffers = match prog.vertex_layout {
            VertexLayout::Instanced => vec![corner_layout(), rect_layout()],
            VertexLayout::PerVertex => vec![corner_layout()],
        };
        let pipeline = self.scoped("render pipeline", |device| {
            device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
                label: Some("tessel pipeline"),
                layout: Some(&self.pipeline_layout),
                vertex: wgpu::VertexState {
                    module: &prog.module,
                    entry_point: Some("vs_main"),
                    compilation_options: Default::default(),
                    buffers: &buffers,
                },
                fragment: Some(wgpu::FragmentState {
                    module: &prog.module,
                    entry_point: Some("fs_main"),
                    compilation_options: Default::default(),
                    targets: &[Some(wgpu::ColorTargetState {
                        format,
                        blend: blend.map(wgpu_blend),
                        write_mask: wgpu::ColorWrites::ALL,
                    })],
                }),
                primitive: wgpu::PrimitiveState {
                    topology: wgpu::PrimitiveTopology::TriangleList,
                    strip_index_format: None,
                    front_face: wgpu::FrontFace::Ccw,
                    cull_mode: None,
                    polygon_mode: wgpu::PolygonMode::Fill,
                    unclipped_depth: false,
                    conservative: false,
                },
                depth_stencil: None,
                multisample: wgpu::MultisampleState::default(),
                multiview_mask: None,
                cache: None,
            })
        })?;
        if let Some(prog) = self.programs.get_mut(&program.0) {
            prog.pipelines.insert((format, blend), pipeline);
        }
        Ok(())
    }

    /// Copy of a texture a draw reads while rendering into it.
    fn snapshot(&self, tex: &GpuTexture) -> Result<wgpu::Texture> {
        let copy = self.scoped("snapshot texture", |device| {
            device.create_texture(&wgpu::TextureDescriptor {
                label: Some("tessel snapshot"),
                size: extent(tex.width, tex.height),
                mip_level_count: 1,
                sample_count: 1,
                dimension: wgpu::TextureDimension::D2,
                format: texture_format(tex.format),
                usage: wgpu::TextureUsages::TEXTURE_BINDING | wgpu::TextureUsages::COPY_DST,
                view_formats: &[],
            })
        })?;
        let mut encoder = self.encoder("tessel snapshot encoder");
        encoder.copy_texture_to_texture(
            tex.texture.as_image_copy(),
            copy.as_image_copy(),
            extent(tex.width, tex.height),
        );
        self.submit(encoder);
        Ok(copy)
    }
}

impl PixelTransfer for WgpuBackend {
    fn upload(&mut self, texture: TextureId, rect: IBox, data: &[u8], stride: usize) -> Result<()> {
        let tex = self.texture(texture)?;
        let bpp = tex.format.bytes_per_pixel();
        check_rect(tex, rect)?;
        let len = transfer_len(rect, stride, bpp);
        if data.len() < len || stride < rect.width() as usize * bpp {
            return Err(EngineError::InvalidArgument(format!(
                "upload of {} bytes at stride {stride} too small for {rect:?}",
                data.len()
            )));
        }
        self.queue.write_texture(
            wgpu::TexelCopyTextureInfo {
                texture: &tex.texture,
                mip_level: 0,
                origin: wgpu::Origin3d {
                    x: rect.x1 as u32,
                    y: rect.y1 as u32,
                    z: 0,
                },
                aspect: wgpu::TextureAspect::All,
            },
            &data[..len],
            wgpu::TexelCopyBufferLayout {
                offset: 0,
                bytes_per_row: Some(stride as u32),
                rows_per_image: Some(rect.height() as u32),
            },
            extent(rect.width() as u32, rect.height() as u32),
        );
        Ok(())
    }

    fn download(
        &mut self,
        texture: TextureId,
        rect: IBox,
        out: &mut [u8],
        stride: usize,
    ) -> Result<()> {
        let tex = self.texture(texture)?;
        let bpp = tex.format.bytes_per_pixel();
        check_rect(tex, rect)?;
        let row = rect.width() as usize * bpp;
        if out.len() < transfer_len(rect, stride, bpp) || stride < row {
            return Err(EngineError::InvalidArgument(format!(
                "download buffer of {} bytes too small for {rect:?}",
                out.len()
            )));
        }
        let align = wgpu::COPY_BYTES_PER_ROW_ALIGNMENT as usize;
        let padded = row.div_ceil(align) * align;
        let height = rect.height() as u32;

        let buffer = self.scoped("readback buffer", |device| {
            device.create_buffer(&wgpu::BufferDescriptor {
                label: Some("tessel readback"),
                size: (padded * height as usize) as u64,
                usage: wgpu::BufferUsages::COPY_DST | wgpu::BufferUsages::MAP_READ,
                mapped_at_creation: false,
            })
        })?;
        let mut encoder = self.encoder("tessel readback encoder");
        encoder.copy_texture_to_buffer(
            wgpu::TexelCopyTextureInfo {
                texture: &tex.texture,
                mip_level: 0,
                origin: wgpu::Origin3d {
                    x: rect.x1 as u32,
                    y: rect.y1 as u32,
                    z: 0,
                },
                aspect: wgpu::TextureAspect::All,
            },
            wgpu::TexelCopyBufferInfo {
                buffer: &buffer,
                layout: wgpu::TexelCopyBufferLayout {
                    offset: 0,
                    bytes_per_row: Some(padded as u32),
                    rows_per_image: Some(height),
                },
            },
            extent(rect.width() as u32, height),
        );
        self.submit(encoder);

        let slice = buffer.slice(..);
        let (sender, receiver) = channel();
        slice.map_async(wgpu::MapMode::Read, move |res| {
            let _ = sender.send(res);
        });
        self.device
            .poll(wgpu::PollType::wait_indefinitely())
            .map_err(|e| EngineError::Backend(format!("readback wait failed: {e}")))?;
        let mapped = receiver
            .recv()
            .map_err(|_| EngineError::Backend("readback callback dropped".into()))?;
        mapped.map_err(|e| EngineError::Backend(format!("readback map failed: {e}")))?;

        let bytes = slice.get_mapped_range();
        for y in 0..height as usize {
            out[y * stride..y * stride + row].copy_from_slice(&bytes[y * padded..y * padded + row]);
        }
        drop(bytes);
        buffer.unmap();
        Ok(())
    }
}

fn check_rect(tex: &GpuTexture, rect: IBox) -> Result<()> {
    if rect.is_empty() || !IBox::from_size(tex.width, tex.height).contains_box(rect) {
        return Err(EngineError::InvalidArgument(format!(
            "transfer rect {rect:?} outside {}x{}",
            tex.width, tex.height
        )));
    }
    Ok(())
}

impl Backend for WgpuBackend {
    fn capabilities(&self) -> &Capabilities {
        &self.caps
    }

    fn create_texture(&mut self, desc: TextureDesc) -> Result<TextureId> {
        if desc.width == 0 || desc.height == 0 {
            return Err(EngineError::InvalidSize {
                width: desc.width,
                height: desc.height,
            });
        }
        let limit = self.caps.max_texture_size;
        if desc.width > limit || desc.height > limit {
            return Err(EngineError::SizeLimit {
                width: desc.width,
                height: desc.height,
                limit,
            });
        }
        let texture = self.scoped("texture", |device| {
            device.create_texture(&wgpu::TextureDescriptor {
                label: Some("tessel surface"),
                size: extent(desc.width, desc.height),
                mip_level_count: 1,
                sample_count: 1,
                dimension: wgpu::TextureDimension::D2,
                format: texture_format(desc.format),
                usage: wgpu::TextureUsages::TEXTURE_BINDING
                    | wgpu::TextureUsages::RENDER_ATTACHMENT
                    | wgpu::TextureUsages::COPY_SRC
                    | wgpu::TextureUsages::COPY_DST,
                view_formats: &[],
            })
        })?;
        Ok(self.import_texture(texture, desc.format))
    }

    fn destroy_texture(&mut self, texture: TextureId) {
        if let Some(t) = self.textures.remove(&texture.0) {
            t.texture.destroy();
        }
    }

    fn create_framebuffer(&mut self, texture: TextureId) -> Result<FramebufferId> {
        self.texture(texture)?;
        let id = self.alloc_id();
        self.framebuffers.insert(id, texture.0);
        Ok(FramebufferId(id))
    }

    fn destroy_framebuffer(&mut self, framebuffer: FramebufferId) {
        self.framebuffers.remove(&framebuffer.0);
    }

    fn clear_texture(&mut self, texture: TextureId) -> Result<()> {
        let tex = self.texture(texture)?;
        let mut encoder = self.encoder("tessel clear encoder");
        {
            let _pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
                label: Some("tessel clear pass"),
                color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                    view: &tex.view,
                    resolve_target: None,
                    ops: wgpu::Operations {
                        load: wgpu::LoadOp::Clear(wgpu::Color::TRANSPARENT),
                        store: wgpu::StoreOp::Store,
                    },
                    depth_slice: None,
                })],
                depth_stencil_attachment: None,
                timestamp_writes: None,
                occlusion_query_set: None,
                multiview_mask: None,
            });
        }
        self.submit(encoder);
        Ok(())
    }

    fn compile_program(&mut self, source: &ProgramSource) -> Result<ProgramHandle> {
        let module = self
            .scoped("shader module", |device| {
                device.create_shader_module(wgpu::ShaderModuleDescriptor {
                    label: Some(source.name.as_str()),
                    source: wgpu::ShaderSource::Wgsl(source.wgsl.as_str().into()),
                })
            })
            .map_err(|e| EngineError::ProgramUnavailable {
                name: source.name.clone(),
                reason: e.to_string(),
            })?;
        let id = self.alloc_id();
        self.programs.insert(
            id,
            GpuProgram {
                module,
                vertex_layout: source.vertex_layout,
                uniform_size: u64::from(source.layout.size()),
                pipelines: HashMap::new(),
            },
        );
        Ok(ProgramHandle(id))
    }

    fn destroy_program(&mut self, program: ProgramHandle) {
        self.programs.remove(&program.0);
    }

    fn draw(&mut self, call: &DrawCall<'_>) -> Result<()> {
        let target_id = *self
            .framebuffers
            .get(&call.target.0)
            .ok_or_else(|| EngineError::Backend(format!("unknown framebuffer {}", call.target.0)))?;
        let (format, width, height) = {
            let t = self.texture(TextureId(target_id))?;
            (texture_format(t.format), t.width, t.height)
        };
        let mut clip = IBox::from_size(width, height);
        if let Some(s) = call.scissor {
            match clip.intersect(s) {
                Some(c) => clip = c,
                None => return Ok(()),
            }
        }
        let rects: Vec<[f32; 4]> = call
            .rects
            .iter()
            .filter_map(|r| r.intersect(clip))
            .map(|r| [r.x1 as f32, r.y1 as f32, r.x2 as f32, r.y2 as f32])
            .collect();
        if rects.is_empty() {
            return Ok(());
        }
        self.pipeline(call.program, format, call.blend)?;

        // Sampling the render target is not allowed; read from a copy instead.
        let aliased = [call.source, call.mask].contains(&Some(TextureId(target_id)));
        let snapshot = if aliased {
            let tex = self.texture(TextureId(target_id))?;
            Some(self.snapshot(tex)?.create_view(&wgpu::TextureViewDescriptor::default()))
        } else {
            None
        };
        let view_of = |slot: Option<TextureId>| -> Result<&wgpu::TextureView> {
            match slot {
                None => Ok(&self.dummy_view),
                Some(id) if id.0 == target_id => snapshot
                    .as_ref()
                    .ok_or_else(|| EngineError::Backend("missing snapshot".into())),
                Some(id) => self.texture(id).map(|t| &t.view),
            }
        };
        let source_view = view_of(call.source)?;
        let mask_view = view_of(call.mask)?;

        let prog = self
            .programs
            .get(&call.program.0)
            .ok_or_else(|| EngineError::Backend(format!("unknown program {}", call.program.0)))?;
        let pipeline = prog
            .pipelines
            .get(&(format, call.blend))
            .ok_or_else(|| EngineError::Backend("pipeline missing after creation".into()))?;

        let mut uniforms = call.uniforms.to_vec();
        uniforms.resize(prog.uniform_size.max(16) as usize, 0);
        let ubo = self.device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("tessel draw ubo"),
            contents: &uniforms,
            usage: wgpu::BufferUsages::UNIFORM,
        });
        let bind_group = self.device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("tessel draw bind group"),
            layout: &self.bind_group_layout,
            entries: &[
                wgpu::BindGroupEntry {
                    binding: 0,
                    resource: ubo.as_entire_binding(),
                },
                wgpu::BindGroupEntry {
                    binding: 1,
                    resource: wgpu::BindingResource::TextureView(source_view),
                },
                wgpu::BindGroupEntry {
                    binding: 2,
                    resource: wgpu::BindingResource::TextureView(mask_view),
                },
            ],
        });

        let geometry: Vec<[f32; 2]> = match prog.vertex_layout {
            VertexLayout::Instanced => Vec::new(),
            VertexLayout::PerVertex => rects
                .iter()
                .flat_map(|r| {
                    [
                        [r[0], r[1]],
                        [r[2], r[1]],
                        [r[2], r[3]],
                        [r[0], r[1]],
                        [r[2], r[3]],
                        [r[0], r[3]],
                    ]
                })
                .collect(),
        };
        let vbo = self.device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("tessel draw geometry"),
            contents: match prog.vertex_layout {
                VertexLayout::Instanced => bytemuck::cast_slice(&rects),
                VertexLayout::PerVertex => bytemuck::cast_slice(&geometry),
            },
            usage: wgpu::BufferUsages::VERTEX,
        });

        let target_view = &self.texture(TextureId(target_id))?.view;
        let mut encoder = self.encoder("tessel draw encoder");
        {
            let mut rpass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
                label: Some("tessel draw pass"),
                color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                    view: target_view,
                    resolve_target: None,
                    ops: wgpu::Operations {
                        load: wgpu::LoadOp::Load,
                        store: wgpu::StoreOp::Store,
                    },
                    depth_slice: None,
                })],
                depth_stencil_attachment: None,
                timestamp_writes: None,
                occlusion_query_set: None,
                multiview_mask: None,
            });
            rpass.set_pipeline(pipeline);
            rpass.set_bind_group(0, &bind_group, &[]);
            rpass.set_scissor_rect(
                clip.x1 as u32,
                clip.y1 as u32,
                clip.width() as u32,
                clip.height() as u32,
            );
            match prog.vertex_layout {
                VertexLayout::Instanced => {
                    rpass.set_vertex_buffer(0, self.quad_vbo.slice(..));
                    rpass.set_vertex_buffer(1, vbo.slice(..));
                    rpass.set_index_buffer(self.quad_ibo.slice(..), wgpu::IndexFormat::Uint16);
                    rpass.draw_indexed(0..6, 0, 0..rects.len() as u32);
                }
                VertexLayout::PerVertex => {
                    rpass.set_vertex_buffer(0, vbo.slice(..));
                    rpass.draw(0..geometry.len() as u32, 0..1);
                }
            }
        }
        self.submit(encoder);
        Ok(())
    }
}
