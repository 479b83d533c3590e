//! wgpu render backend
//!
//! The immediate-mode call stream is recorded during the frame and replayed
//! into render passes at `end_frame`:
//!
//! - vertices of every upload are staged into one vertex buffer
//! - projection/transformation and gradient parameters are staged into two
//!   uniform buffers addressed with dynamic offsets
//! - pipelines are cached per program, topology, stencil mode, blend state
//!   and target format
//! - clears and texture barriers end the current pass. A barrier copies the
//!   target into a read-back texture bound as `target_copy`.
//!
//! Stencil clipping uses a `Depth24PlusStencil8` attachment per target.

use std::num::NonZeroU64;
use std::sync::Arc;

use rustc_hash::FxHashMap;
use tessera_paint::{BlendingMode, LogicalOperation, SamplingQuality, SmoothingMode, TextureId};
use wgpu::util::DeviceExt;

use super::{
    ClearTarget, DeviceRect, Mat4, ProgramInfo, RenderBackend, StencilFunc, StencilOp,
    StencilState, IDENTITY,
};
use crate::config::RenderConfig;
use crate::error::BackendError;
use crate::shader::{ShaderBinding, ShaderKind, GRADIENT_UNIFORM_SIZE};
use crate::shaders;
use crate::vertex::{PrimitiveMode, Vertex};

const DEPTH_STENCIL_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Depth24PlusStencil8;
const DEFAULT_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Rgba8Unorm;
/// Projection and transformation
const GLOBALS_SIZE: usize = 2 * std::mem::size_of::<Mat4>();

const VERTEX_ATTRIBUTES: [wgpu::VertexAttribute; 3] =
    wgpu::vertex_attr_array![0 => Float32x3, 1 => Float32x4, 2 => Float32x2];

/// Stencil configuration baked into a pipeline; the reference is dynamic
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
enum StencilKey {
    Disabled,
    Write { compare: StencilFunc, pass: StencilOp },
    Test { compare: StencilFunc },
}

impl From<StencilState> for StencilKey {
    fn from(state: StencilState) -> Self {
        match state {
            StencilState::Disabled => StencilKey::Disabled,
            StencilState::Write { compare, pass, .. } => StencilKey::Write { compare, pass },
            StencilState::Test { compare, .. } => StencilKey::Test { compare },
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
struct PipelineKey {
    kind: ShaderKind,
    mode: PrimitiveMode,
    stencil: StencilKey,
    blend: BlendingMode,
    logical: LogicalOperation,
    format: wgpu::TextureFormat,
    samples: u32,
}

/// Resources bound at group 1, apart from the dynamic gradient offset
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
struct PaintKey {
    texture: Option<TextureId>,
    quality: SamplingQuality,
    target_copy: Option<Option<TextureId>>,
}

#[derive(Debug)]
struct DrawCommand {
    pipeline: PipelineKey,
    paint: PaintKey,
    globals_offset: u32,
    paint_offset: u32,
    scissor: Option<DeviceRect>,
    stencil_reference: u32,
    first: u32,
    count: u32,
}

#[derive(Debug)]
enum Command {
    Target(Option<TextureId>),
    Clear(ClearTarget),
    Barrier,
    Draw(DrawCommand),
}

/// Per-frame staging
#[derive(Debug, Default)]
struct Frame {
    extents: (u32, u32),
    commands: Vec<Command>,
    vertices: Vec<Vertex>,
    globals: Vec<u8>,
    paint: Vec<u8>,
    /// Index of the current upload within `vertices`
    upload_base: usize,
    upload_len: usize,
    globals_offset: Option<u32>,
    paint_offset: u32,
    target: Option<TextureId>,
}

/// Pipeline state set through the immediate-mode calls
#[derive(Debug)]
struct State {
    projection: Mat4,
    transform: Option<Mat4>,
    scissor: Option<DeviceRect>,
    stencil: StencilState,
    blend: BlendingMode,
    logical: LogicalOperation,
    smoothing: SmoothingMode,
    program: ShaderBinding,
}

impl Default for State {
    fn default() -> Self {
        Self {
            projection: IDENTITY,
            transform: None,
            scissor: None,
            stencil: StencilState::Disabled,
            blend: BlendingMode::Default,
            logical: LogicalOperation::None,
            smoothing: SmoothingMode::AntiAlias,
            program: ShaderBinding::Solid,
        }
    }
}

struct Samplers {
    nearest: wgpu::Sampler,
    linear: wgpu::Sampler,
    mipmap: wgpu::Sampler,
}

impl Samplers {
    fn new(device: &wgpu::Device) -> Self {
        let sampler = |label, filter, mipmap_filter| {
            device.create_sampler(&wgpu::SamplerDescriptor {
                label: Some(label),
                address_mode_u: wgpu::AddressMode::ClampToEdge,
                address_mode_v: wgpu::AddressMode::ClampToEdge,
                address_mode_w: wgpu::AddressMode::ClampToEdge,
                mag_filter: filter,
                min_filter: filter,
                mipmap_filter,
                ..Default::default()
            })
        };
        Self {
            nearest: sampler(
                "Tessera Nearest Sampler",
                wgpu::FilterMode::Nearest,
                wgpu::FilterMode::Nearest,
            ),
            linear: sampler(
                "Tessera Linear Sampler",
                wgpu::FilterMode::Linear,
                wgpu::FilterMode::Nearest,
            ),
            mipmap: sampler(
                "Tessera Mipmap Sampler",
                wgpu::FilterMode::Linear,
                wgpu::FilterMode::Linear,
            ),
        }
    }

    fn get(&self, quality: SamplingQuality) -> &wgpu::Sampler {
        match quality {
            SamplingQuality::Nearest => &self.nearest,
            SamplingQuality::Linear => &self.linear,
            SamplingQuality::Mipmap => &self.mipmap,
        }
    }
}

struct Layouts {
    globals: wgpu::BindGroupLayout,
    paint: wgpu::BindGroupLayout,
    pipeline: wgpu::PipelineLayout,
}

impl Layouts {
    fn new(device: &wgpu::Device) -> Self {
        let uniform = |binding, visibility, size: usize| wgpu::BindGroupLayoutEntry {
            binding,
            visibility,
            ty: wgpu::BindingType::Buffer {
                ty: wgpu::BufferBindingType::Uniform,
                has_dynamic_offset: true,
                min_binding_size: NonZeroU64::new(size as u64),
            },
            count: None,
        };
        let texture = |binding| wgpu::BindGroupLayoutEntry {
            binding,
            visibility: wgpu::ShaderStages::FRAGMENT,
            ty: wgpu::BindingType::Texture {
                sample_type: wgpu::TextureSampleType::Float { filterable: true },
                view_dimension: wgpu::TextureViewDimension::D2,
                multisampled: false,
            },
            count: None,
        };

        let globals = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("Tessera Globals Bind Group Layout"),
            entries: &[uniform(
                0,
                wgpu::ShaderStages::VERTEX | wgpu::ShaderStages::FRAGMENT,
                GLOBALS_SIZE,
            )],
        });

        let paint = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("Tessera Paint Bind Group Layout"),
            entries: &[
                // Gradient uniforms
                uniform(0, wgpu::ShaderStages::FRAGMENT, GRADIENT_UNIFORM_SIZE),
                // Paint texture or glyph atlas
                texture(1),
                wgpu::BindGroupLayoutEntry {
                    binding: 2,
                    visibility: wgpu::ShaderStages::FRAGMENT,
                    ty: wgpu::BindingType::Sampler(wgpu::SamplerBindingType::Filtering),
                    count: None,
                },
                // Render target copy for subpixel glyphs
                texture(3),
            ],
        });

        let pipeline = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("Tessera Pipeline Layout"),
            bind_group_layouts: &[&globals, &paint],
            push_constant_ranges: &[],
        });

        Self {
            globals,
            paint,
            pipeline,
        }
    }
}

/// Render target textures owned by the backend for a target
struct TargetTextures {
    size: (u32, u32),
    depth_stencil: wgpu::Texture,
    readback: Option<wgpu::Texture>,
}

/// [`RenderBackend`] on top of wgpu
pub struct WgpuBackend {
    device: Arc<wgpu::Device>,
    queue: Arc<wgpu::Queue>,
    format: wgpu::TextureFormat,
    sample_count: u32,
    uniform_alignment: usize,
    layouts: Layouts,
    samplers: Samplers,
    modules: FxHashMap<ShaderKind, wgpu::ShaderModule>,
    pipelines: FxHashMap<PipelineKey, wgpu::RenderPipeline>,
    textures: FxHashMap<TextureId, wgpu::Texture>,
    next_texture: u32,
    dummy: wgpu::Texture,
    frame_texture: Option<wgpu::Texture>,
    msaa_texture: Option<wgpu::Texture>,
    targets: FxHashMap<Option<TextureId>, TargetTextures>,
    frame: Option<Frame>,
    state: State,
}

impl std::fmt::Debug for WgpuBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WgpuBackend")
            .field("format", &self.format)
            .field("sample_count", &self.sample_count)
            .field("pipelines", &self.pipelines.len())
            .field("textures", &self.textures.len())
            .field("in_frame", &self.frame.is_some())
            .finish()
    }
}

impl WgpuBackend {
    pub fn new(
        device: Arc<wgpu::Device>,
        queue: Arc<wgpu::Queue>,
        config: &RenderConfig,
    ) -> Self {
        let layouts = Layouts::new(&device);
        let samplers = Samplers::new(&device);
        let uniform_alignment = device.limits().min_uniform_buffer_offset_alignment as usize;

        let dummy = device.create_texture(&wgpu::TextureDescriptor {
            label: Some("Tessera Dummy Texture"),
            size: wgpu::Extent3d {
                width: 1,
                height: 1,
                depth_or_array_layers: 1,
            },
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format: DEFAULT_FORMAT,
            usage: wgpu::TextureUsages::TEXTURE_BINDING | wgpu::TextureUsages::COPY_DST,
            view_formats: &[],
        });
        write_rgba8(&queue, &dummy, 1, 1, &[255; 4]);

        tracing::debug!(
            "wgpu backend: format {:?}, {} samples, uniform alignment {}",
            config.texture_format.unwrap_or(DEFAULT_FORMAT),
            config.sample_count,
            uniform_alignment
        );

        Self {
            device,
            queue,
            format: config.texture_format.unwrap_or(DEFAULT_FORMAT),
            sample_count: config.sample_count.max(1),
            uniform_alignment: uniform_alignment.max(1),
            layouts,
            samplers,
            modules: FxHashMap::default(),
            pipelines: FxHashMap::default(),
            textures: FxHashMap::default(),
            next_texture: 0,
            dummy,
            frame_texture: None,
            msaa_texture: None,
            targets: FxHashMap::default(),
            frame: None,
            state: State::default(),
        }
    }

    /// Create a backend on the default adapter without a surface
    pub fn new_headless(config: &RenderConfig) -> Result<Self, BackendError> {
        pollster::block_on(async {
            let instance = wgpu::Instance::new(wgpu::InstanceDescriptor {
                backends: wgpu::Backends::all(),
                ..Default::default()
            });

            let adapter = instance
                .request_adapter(&wgpu::RequestAdapterOptions {
                    power_preference: wgpu::PowerPreference::LowPower,
                    force_fallback_adapter: false,
                    compatible_surface: None,
                })
                .await
                .ok_or(BackendError::Unsupported("no GPU adapter"))?;

            let (device, queue) = adapter
                .request_device(
                    &wgpu::DeviceDescriptor {
                        label: Some("Tessera GPU Device"),
                        required_features: wgpu::Features::empty(),
                        required_limits: wgpu::Limits::downlevel_defaults(),
                        memory_hints: wgpu::MemoryHints::MemoryUsage,
                    },
                    None,
                )
                .await
                .map_err(|err| BackendError::Validation(err.to_string()))?;

            Ok(Self::new(Arc::new(device), Arc::new(queue), config))
        })
    }

    pub fn device(&self) -> &wgpu::Device {
        &self.device
    }

    pub fn queue(&self) -> &wgpu::Queue {
        &self.queue
    }

    /// Offscreen texture the frame target renders into
    pub fn frame_texture(&self) -> Option<&wgpu::Texture> {
        self.frame_texture.as_ref()
    }

    /// Borrow a texture for painting or as a render target
    pub fn register_texture(&mut self, texture: wgpu::Texture) -> TextureId {
        let id = TextureId(self.next_texture);
        self.next_texture += 1;
        self.textures.insert(id, texture);
        id
    }

    pub fn unregister_texture(&mut self, id: TextureId) -> Option<wgpu::Texture> {
        self.targets.remove(&Some(id));
        self.textures.remove(&id)
    }

    /// Upload tightly packed RGBA8 pixels as a new paint texture
    pub fn create_texture_rgba8(&mut self, width: u32, height: u32, pixels: &[u8]) -> TextureId {
        let texture = self.device.create_texture(&wgpu::TextureDescriptor {
            label: Some("Tessera Paint Texture"),
            size: wgpu::Extent3d {
                width,
                height,
                depth_or_array_layers: 1,
            },
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format: DEFAULT_FORMAT,
            usage: wgpu::TextureUsages::TEXTURE_BINDING
                | wgpu::TextureUsages::COPY_DST
                | wgpu::TextureUsages::RENDER_ATTACHMENT
                | wgpu::TextureUsages::COPY_SRC,
            view_formats: &[],
        });
        write_rgba8(&self.queue, &texture, width, height, pixels);
        self.register_texture(texture)
    }

    /// Read the frame texture back as tightly packed rows
    pub fn read_frame(&self) -> Result<Vec<u8>, BackendError> {
        let texture = self.frame_texture.as_ref().ok_or(BackendError::NoFrame)?;
        let (width, height) = (texture.width(), texture.height());
        let unpadded = width * 4;
        let bytes_per_row = unpadded.div_ceil(wgpu::COPY_BYTES_PER_ROW_ALIGNMENT)
            * wgpu::COPY_BYTES_PER_ROW_ALIGNMENT;

        let buffer = self.device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("Tessera Readback Buffer"),
            size: bytes_per_row as u64 * height as u64,
            usage: wgpu::BufferUsages::COPY_DST | wgpu::BufferUsages::MAP_READ,
            mapped_at_creation: false,
        });
        let mut encoder = self
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("Tessera Readback Encoder"),
            });
        encoder.copy_texture_to_buffer(
            texture.as_image_copy(),
            wgpu::ImageCopyBuffer {
                buffer: &buffer,
                layout: wgpu::ImageDataLayout {
                    offset: 0,
                    bytes_per_row: Some(bytes_per_row),
                    rows_per_image: Some(height),
                },
            },
            texture.size(),
        );
        self.queue.submit(std::iter::once(encoder.finish()));

        let slice = buffer.slice(..);
        let (tx, rx) = std::sync::mpsc::channel();
        slice.map_async(wgpu::MapMode::Read, move |result| {
            tx.send(result).ok();
        });
        self.device.poll(wgpu::Maintain::Wait);
        rx.recv()
            .unwrap_or(Err(wgpu::BufferAsyncError))
            .map_err(|err| BackendError::Validation(err.to_string()))?;

        let data = slice.get_mapped_range();
        let mut pixels = Vec::with_capacity((unpadded * height) as usize);
        for row in data.chunks(bytes_per_row as usize) {
            pixels.extend_from_slice(&row[..unpadded as usize]);
        }
        drop(data);
        buffer.unmap();
        Ok(pixels)
    }

    fn frame_mut(&mut self) -> Result<&mut Frame, BackendError> {
        self.frame.as_mut().ok_or(BackendError::NoFrame)
    }

    fn ensure_frame_texture(&mut self, extents: (u32, u32)) {
        let current = self
            .frame_texture
            .as_ref()
            .map(|t| (t.width(), t.height()));
        if current == Some(extents) {
            return;
        }
        let size = wgpu::Extent3d {
            width: extents.0.max(1),
            height: extents.1.max(1),
            depth_or_array_layers: 1,
        };
        self.frame_texture = Some(self.device.create_texture(&wgpu::TextureDescriptor {
            label: Some("Tessera Frame Texture"),
            size,
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format: self.format,
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT
                | wgpu::TextureUsages::COPY_SRC
                | wgpu::TextureUsages::TEXTURE_BINDING,
            view_formats: &[],
        }));
        self.msaa_texture = (self.sample_count > 1).then(|| {
            self.device.create_texture(&wgpu::TextureDescriptor {
                label: Some("Tessera MSAA Texture"),
                size,
                mip_level_count: 1,
                sample_count: self.sample_count,
                dimension: wgpu::TextureDimension::D2,
                format: self.format,
                usage: wgpu::TextureUsages::RENDER_ATTACHMENT,
                view_formats: &[],
            })
        });
        self.targets.remove(&None);
    }

    /// Format, sample count and size of a render target
    fn target_info(
        &self,
        target: Option<TextureId>,
    ) -> Result<(wgpu::TextureFormat, u32, (u32, u32)), BackendError> {
        match target {
            None => {
                let texture = self.frame_texture.as_ref().ok_or(BackendError::NoFrame)?;
                Ok((
                    self.format,
                    self.sample_count,
                    (texture.width(), texture.height()),
                ))
            }
            Some(id) => {
                let texture = self
                    .textures
                    .get(&id)
                    .ok_or(BackendError::UnknownTexture(id))?;
                Ok((texture.format(), 1, (texture.width(), texture.height())))
            }
        }
    }

    fn module(&mut self, kind: ShaderKind) -> Result<&wgpu::ShaderModule, BackendError> {
        if !self.modules.contains_key(&kind) {
            let source = shaders::source(kind);
            self.device.push_error_scope(wgpu::ErrorFilter::Validation);
            let module = self
                .device
                .create_shader_module(wgpu::ShaderModuleDescriptor {
                    label: Some(&format!("Tessera {:?} Shader", kind)),
                    source: wgpu::ShaderSource::Wgsl(source.into()),
                });
            if let Some(err) = pollster::block_on(self.device.pop_error_scope()) {
                return Err(BackendError::Validation(err.to_string()));
            }
            self.modules.insert(kind, module);
        }
        self.modules
            .get(&kind)
            .ok_or(BackendError::Unsupported("shader module"))
    }

    fn ensure_pipeline(&mut self, key: PipelineKey) -> Result<(), BackendError> {
        if self.pipelines.contains_key(&key) {
            return Ok(());
        }
        self.module(key.kind)?;
        let module = self
            .modules
            .get(&key.kind)
            .ok_or(BackendError::Unsupported("shader module"))?;

        let color_writes = match key.stencil {
            StencilKey::Write { .. } => wgpu::ColorWrites::empty(),
            _ => wgpu::ColorWrites::ALL,
        };
        let blend = if key.kind == ShaderKind::GlyphSubpixel {
            // Blending happens in the shader
            None
        } else {
            blend_state(key.blend, key.logical)
        };

        let vertex_layout = wgpu::VertexBufferLayout {
            array_stride: std::mem::size_of::<Vertex>() as wgpu::BufferAddress,
            step_mode: wgpu::VertexStepMode::Vertex,
            attributes: &VERTEX_ATTRIBUTES,
        };

        let pipeline = self
            .device
            .create_render_pipeline(&wgpu::RenderPipelineDescriptor {
                label: Some(&format!("Tessera {:?} {:?} Pipeline", key.kind, key.mode)),
                layout: Some(&self.layouts.pipeline),
                vertex: wgpu::VertexState {
                    module,
                    entry_point: Some("vs_main"),
                    buffers: std::slice::from_ref(&vertex_layout),
                    compilation_options: wgpu::PipelineCompilationOptions::default(),
                },
                fragment: Some(wgpu::FragmentState {
                    module,
                    entry_point: Some("fs_main"),
                    targets: &[Some(wgpu::ColorTargetState {
                        format: key.format,
                        blend,
                        write_mask: color_writes,
                    })],
                    compilation_options: wgpu::PipelineCompilationOptions::default(),
                }),
                primitive: wgpu::PrimitiveState {
                    topology: topology(key.mode),
                    strip_index_format: None,
                    front_face: wgpu::FrontFace::Ccw,
                    cull_mode: None,
                    unclipped_depth: false,
                    polygon_mode: wgpu::PolygonMode::Fill,
                    conservative: false,
                },
                depth_stencil: Some(depth_stencil_state(key.stencil)),
                multisample: wgpu::MultisampleState {
                    count: key.samples,
                    mask: !0,
                    alpha_to_coverage_enabled: false,
                },
                multiview: None,
                cache: None,
            });
        self.pipelines.insert(key, pipeline);
        Ok(())
    }

    /// Create depth-stencil and read-back textures for a target
    fn ensure_target(
        &mut self,
        target: Option<TextureId>,
        needs_readback: bool,
    ) -> Result<(), BackendError> {
        let (format, samples, size) = self.target_info(target)?;
        if self.targets.get(&target).map(|t| t.size) != Some(size) {
            let depth_stencil = self.device.create_texture(&wgpu::TextureDescriptor {
                label: Some("Tessera Depth Stencil Texture"),
                size: extent(size),
                mip_level_count: 1,
                sample_count: samples,
                dimension: wgpu::TextureDimension::D2,
                format: DEPTH_STENCIL_FORMAT,
                usage: wgpu::TextureUsages::RENDER_ATTACHMENT,
                view_formats: &[],
            });
            self.targets.insert(
                target,
                TargetTextures {
                    size,
                    depth_stencil,
                    readback: None,
                },
            );
        }
        if needs_readback {
            if samples > 1 {
                return Err(BackendError::Unsupported("texture barrier with multisampling"));
            }
            let device = Arc::clone(&self.device);
            if let Some(textures) = self.targets.get_mut(&target) {
                if textures.readback.is_none() {
                    textures.readback = Some(device.create_texture(&wgpu::TextureDescriptor {
                        label: Some("Tessera Target Copy Texture"),
                        size: extent(size),
                        mip_level_count: 1,
                        sample_count: 1,
                        dimension: wgpu::TextureDimension::D2,
                        format,
                        usage: wgpu::TextureUsages::TEXTURE_BINDING
                            | wgpu::TextureUsages::COPY_DST,
                        view_formats: &[],
                    }));
                }
            }
        }
        Ok(())
    }

    fn paint_bind_group(
        &self,
        key: PaintKey,
        paint_buffer: &wgpu::Buffer,
    ) -> Result<wgpu::BindGroup, BackendError> {
        let texture = match key.texture {
            Some(id) => self
                .textures
                .get(&id)
                .ok_or(BackendError::UnknownTexture(id))?,
            None => &self.dummy,
        };
        let target_copy = match key.target_copy {
            Some(target) => self
                .targets
                .get(&target)
                .and_then(|t| t.readback.as_ref())
                .ok_or(BackendError::Unsupported("target copy"))?,
            None => &self.dummy,
        };
        let texture_view = texture.create_view(&wgpu::TextureViewDescriptor::default());
        let copy_view = target_copy.create_view(&wgpu::TextureViewDescriptor::default());

        Ok(self.device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("Tessera Paint Bind Group"),
            layout: &self.layouts.paint,
            entries: &[
                wgpu::BindGroupEntry {
                    binding: 0,
                    resource: wgpu::BindingResource::Buffer(wgpu::BufferBinding {
                        buffer: paint_buffer,
                        offset: 0,
                        size: NonZeroU64::new(GRADIENT_UNIFORM_SIZE as u64),
                    }),
                },
                wgpu::BindGroupEntry {
                    binding: 1,
                    resource: wgpu::BindingResource::TextureView(&texture_view),
                },
                wgpu::BindGroupEntry {
                    binding: 2,
                    resource: wgpu::BindingResource::Sampler(self.samplers.get(key.quality)),
                },
                wgpu::BindGroupEntry {
                    binding: 3,
                    resource: wgpu::BindingResource::TextureView(&copy_view),
                },
            ],
        }))
    }

    /// Encode and submit the recorded frame
    fn replay(&mut self, frame: Frame) -> Result<(), BackendError> {
        // Pipelines and per-target textures are created before encoding
        let mut target = None;
        let mut readback_targets = Vec::new();
        let mut targets = vec![None];
        for command in &frame.commands {
            match command {
                Command::Target(t) => {
                    target = *t;
                    targets.push(target);
                }
                Command::Barrier => readback_targets.push(target),
                Command::Draw(draw) => {
                    self.ensure_pipeline(draw.pipeline)?;
                    if let Some(copy_target) = draw.paint.target_copy {
                        readback_targets.push(copy_target);
                    }
                }
                Command::Clear(_) => {}
            }
        }
        for t in targets {
            self.ensure_target(t, readback_targets.contains(&t))?;
        }

        let vertex_buffer = (!frame.vertices.is_empty()).then(|| {
            self.device
                .create_buffer_init(&wgpu::util::BufferInitDescriptor {
                    label: Some("Tessera Vertex Buffer"),
                    contents: bytemuck::cast_slice(&frame.vertices),
                    usage: wgpu::BufferUsages::VERTEX,
                })
        });
        let globals_buffer = self
            .device
            .create_buffer_init(&wgpu::util::BufferInitDescriptor {
                label: Some("Tessera Globals Buffer"),
                contents: &padded(&frame.globals, GLOBALS_SIZE),
                usage: wgpu::BufferUsages::UNIFORM,
            });
        let paint_buffer = self
            .device
            .create_buffer_init(&wgpu::util::BufferInitDescriptor {
                label: Some("Tessera Paint Buffer"),
                contents: &padded(&frame.paint, GRADIENT_UNIFORM_SIZE),
                usage: wgpu::BufferUsages::UNIFORM,
            });
        let globals_group = self.device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("Tessera Globals Bind Group"),
            layout: &self.layouts.globals,
            entries: &[wgpu::BindGroupEntry {
                binding: 0,
                resource: wgpu::BindingResource::Buffer(wgpu::BufferBinding {
                    buffer: &globals_buffer,
                    offset: 0,
                    size: NonZeroU64::new(GLOBALS_SIZE as u64),
                }),
            }],
        });

        let mut paint_groups: FxHashMap<PaintKey, wgpu::BindGroup> = FxHashMap::default();
        for command in &frame.commands {
            if let Command::Draw(draw) = command {
                if !paint_groups.contains_key(&draw.paint) {
                    let group = self.paint_bind_group(draw.paint, &paint_buffer)?;
                    paint_groups.insert(draw.paint, group);
                }
            }
        }

        self.device.push_error_scope(wgpu::ErrorFilter::OutOfMemory);
        self.device.push_error_scope(wgpu::ErrorFilter::Validation);

        let mut encoder = self
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("Tessera Frame Encoder"),
            });

        let mut target = None;
        let mut loads = Loads::default();
        let mut i = 0;
        while i < frame.commands.len() {
            match &frame.commands[i] {
                Command::Target(t) => {
                    self.encode_pass(&mut encoder, target, &mut loads, &[], &Bindings::default())?;
                    target = *t;
                    i += 1;
                }
                Command::Clear(clear) => {
                    loads.add(*clear);
                    i += 1;
                }
                Command::Barrier => {
                    self.encode_pass(&mut encoder, target, &mut loads, &[], &Bindings::default())?;
                    self.copy_to_readback(&mut encoder, target)?;
                    i += 1;
                }
                Command::Draw(_) => {
                    let end = frame.commands[i..]
                        .iter()
                        .position(|c| !matches!(c, Command::Draw(_)))
                        .map_or(frame.commands.len(), |n| i + n);
                    let draws: Vec<&DrawCommand> = frame.commands[i..end]
                        .iter()
                        .filter_map(|c| match c {
                            Command::Draw(draw) => Some(draw),
                            _ => None,
                        })
                        .collect();
                    let bindings = Bindings {
                        vertex_buffer: vertex_buffer.as_ref(),
                        globals: Some(&globals_group),
                        paint: Some(&paint_groups),
                    };
                    self.encode_pass(&mut encoder, target, &mut loads, &draws, &bindings)?;
                    i = end;
                }
            }
        }
        self.encode_pass(&mut encoder, target, &mut loads, &[], &Bindings::default())?;

        self.queue.submit(std::iter::once(encoder.finish()));

        let validation = pollster::block_on(self.device.pop_error_scope());
        let memory = pollster::block_on(self.device.pop_error_scope());
        if let Some(err) = memory.or(validation) {
            return Err(map_error(err));
        }
        Ok(())
    }

    /// Encode one render pass. Without draws, only pending clears are
    /// applied (and nothing is encoded when there are none).
    fn encode_pass(
        &self,
        encoder: &mut wgpu::CommandEncoder,
        target: Option<TextureId>,
        loads: &mut Loads,
        draws: &[&DrawCommand],
        bindings: &Bindings<'_>,
    ) -> Result<(), BackendError> {
        if draws.is_empty() && loads.is_empty() {
            return Ok(());
        }
        let textures = self
            .targets
            .get(&target)
            .ok_or(BackendError::Unsupported("render target"))?;
        let (view, resolve_target) = match target {
            None => {
                let frame = self.frame_texture.as_ref().ok_or(BackendError::NoFrame)?;
                let resolved = frame.create_view(&wgpu::TextureViewDescriptor::default());
                match &self.msaa_texture {
                    Some(msaa) => (
                        msaa.create_view(&wgpu::TextureViewDescriptor::default()),
                        Some(resolved),
                    ),
                    None => (resolved, None),
                }
            }
            Some(id) => (
                self.textures
                    .get(&id)
                    .ok_or(BackendError::UnknownTexture(id))?
                    .create_view(&wgpu::TextureViewDescriptor::default()),
                None,
            ),
        };
        let depth_view = textures
            .depth_stencil
            .create_view(&wgpu::TextureViewDescriptor::default());

        let mut pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
            label: Some("Tessera Render Pass"),
            color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                view: &view,
                resolve_target: resolve_target.as_ref(),
                ops: wgpu::Operations {
                    load: loads.color(),
                    store: wgpu::StoreOp::Store,
                },
            })],
            depth_stencil_attachment: Some(wgpu::RenderPassDepthStencilAttachment {
                view: &depth_view,
                depth_ops: Some(wgpu::Operations {
                    load: loads.depth(),
                    store: wgpu::StoreOp::Store,
                }),
                stencil_ops: Some(wgpu::Operations {
                    load: loads.stencil(),
                    store: wgpu::StoreOp::Store,
                }),
            }),
            timestamp_writes: None,
            occlusion_query_set: None,
        });
        *loads = Loads::default();

        if draws.is_empty() {
            return Ok(());
        }
        let (Some(vertex_buffer), Some(globals), Some(paint_groups)) =
            (bindings.vertex_buffer, bindings.globals, bindings.paint)
        else {
            return Ok(());
        };
        pass.set_vertex_buffer(0, vertex_buffer.slice(..));

        for draw in draws {
            let Some(pipeline) = self.pipelines.get(&draw.pipeline) else {
                return Err(BackendError::Unsupported("pipeline"));
            };
            let Some(paint) = paint_groups.get(&draw.paint) else {
                return Err(BackendError::Unsupported("paint bind group"));
            };
            let scissor = draw
                .scissor
                .unwrap_or(DeviceRect::new(0, 0, textures.size.0, textures.size.1));
            let scissor = clip_to_target(scissor, textures.size);
            if scissor.is_empty() {
                continue;
            }
            pass.set_pipeline(pipeline);
            pass.set_bind_group(0, globals, &[draw.globals_offset]);
            pass.set_bind_group(1, paint, &[draw.paint_offset]);
            pass.set_scissor_rect(scissor.x, scissor.y, scissor.width, scissor.height);
            pass.set_stencil_reference(draw.stencil_reference);
            pass.draw(draw.first..draw.first + draw.count, 0..1);
        }
        Ok(())
    }

    fn copy_to_readback(
        &self,
        encoder: &mut wgpu::CommandEncoder,
        target: Option<TextureId>,
    ) -> Result<(), BackendError> {
        let source = match target {
            None => self.frame_texture.as_ref().ok_or(BackendError::NoFrame)?,
            Some(id) => self
                .textures
                .get(&id)
                .ok_or(BackendError::UnknownTexture(id))?,
        };
        let readback = self
            .targets
            .get(&target)
            .and_then(|t| t.readback.as_ref())
            .ok_or(BackendError::Unsupported("target copy"))?;
        encoder.copy_texture_to_texture(
            source.as_image_copy(),
            readback.as_image_copy(),
            readback.size(),
        );
        Ok(())
    }

    /// Offset of the globals block for the current projection and transform
    fn globals_offset(&mut self) -> Result<u32, BackendError> {
        let alignment = self.uniform_alignment;
        let projection = self.state.projection;
        let transform = self.state.transform.unwrap_or(IDENTITY);
        let frame = self.frame_mut()?;
        if let Some(offset) = frame.globals_offset {
            return Ok(offset);
        }
        let offset = push_block(
            &mut frame.globals,
            alignment,
            bytemuck::cast_slice(&[projection, transform]),
        );
        frame.globals_offset = Some(offset);
        Ok(offset)
    }
}

/// Pending load operations of the next pass
#[derive(Debug, Default)]
struct Loads {
    color: Option<tessera_paint::Color>,
    depth: Option<f32>,
    stencil: Option<u8>,
}

impl Loads {
    fn add(&mut self, clear: ClearTarget) {
        match clear {
            ClearTarget::Color(color) => self.color = Some(color),
            ClearTarget::Depth(depth) => self.depth = Some(depth),
            ClearTarget::Stencil(stencil) => self.stencil = Some(stencil),
        }
    }

    fn is_empty(&self) -> bool {
        self.color.is_none() && self.depth.is_none() && self.stencil.is_none()
    }

    fn color(&self) -> wgpu::LoadOp<wgpu::Color> {
        match self.color {
            Some(c) => wgpu::LoadOp::Clear(wgpu::Color {
                r: c.r as f64,
                g: c.g as f64,
                b: c.b as f64,
                a: c.a as f64,
            }),
            None => wgpu::LoadOp::Load,
        }
    }

    fn depth(&self) -> wgpu::LoadOp<f32> {
        self.depth.map_or(wgpu::LoadOp::Load, wgpu::LoadOp::Clear)
    }

    fn stencil(&self) -> wgpu::LoadOp<u32> {
        self.stencil
            .map_or(wgpu::LoadOp::Load, |s| wgpu::LoadOp::Clear(s as u32))
    }
}

#[derive(Default)]
struct Bindings<'a> {
    vertex_buffer: Option<&'a wgpu::Buffer>,
    globals: Option<&'a wgpu::BindGroup>,
    paint: Option<&'a FxHashMap<PaintKey, wgpu::BindGroup>>,
}

impl RenderBackend for WgpuBackend {
    fn begin_frame(&mut self, extents: (u32, u32)) -> Result<(), BackendError> {
        self.ensure_frame_texture(extents);
        let mut frame = Frame {
            extents,
            ..Default::default()
        };
        // Offset 0 of the paint buffer is a zero block for non-gradient draws
        push_block(&mut frame.paint, self.uniform_alignment, &[0; GRADIENT_UNIFORM_SIZE]);
        self.frame = Some(frame);
        Ok(())
    }

    fn end_frame(&mut self) -> Result<(), BackendError> {
        let frame = self.frame.take().ok_or(BackendError::NoFrame)?;
        tracing::trace!(
            "replaying {} commands, {} vertices ({}x{})",
            frame.commands.len(),
            frame.vertices.len(),
            frame.extents.0,
            frame.extents.1
        );
        self.replay(frame)
    }

    fn set_render_target(&mut self, target: Option<TextureId>) -> Result<(), BackendError> {
        if let Some(id) = target {
            if !self.textures.contains_key(&id) {
                return Err(BackendError::UnknownTexture(id));
            }
        }
        let frame = self.frame_mut()?;
        frame.target = target;
        frame.commands.push(Command::Target(target));
        Ok(())
    }

    fn set_projection(&mut self, projection: Mat4) -> Result<(), BackendError> {
        self.state.projection = projection;
        if let Some(frame) = self.frame.as_mut() {
            frame.globals_offset = None;
        }
        Ok(())
    }

    fn set_transform(&mut self, transform: Option<Mat4>) -> Result<(), BackendError> {
        self.state.transform = transform;
        if let Some(frame) = self.frame.as_mut() {
            frame.globals_offset = None;
        }
        Ok(())
    }

    fn set_scissor(&mut self, scissor: Option<DeviceRect>) -> Result<(), BackendError> {
        self.state.scissor = scissor;
        Ok(())
    }

    fn set_stencil(&mut self, stencil: StencilState) -> Result<(), BackendError> {
        self.state.stencil = stencil;
        Ok(())
    }

    fn set_blend(
        &mut self,
        mode: BlendingMode,
        logical_operation: LogicalOperation,
    ) -> Result<(), BackendError> {
        self.state.blend = mode;
        self.state.logical = logical_operation;
        Ok(())
    }

    fn set_smoothing(&mut self, mode: SmoothingMode) -> Result<(), BackendError> {
        // Coverage smoothing follows the sample count chosen at creation
        if mode != self.state.smoothing {
            tracing::trace!("smoothing {:?} with {} samples", mode, self.sample_count);
        }
        self.state.smoothing = mode;
        Ok(())
    }

    fn clear(&mut self, target: ClearTarget) -> Result<(), BackendError> {
        self.frame_mut()?.commands.push(Command::Clear(target));
        Ok(())
    }

    fn prepare_program(&mut self, kind: ShaderKind) -> Result<ProgramInfo, BackendError> {
        let variables =
            shaders::global_variables(&shaders::source(kind)).map_err(BackendError::Validation)?;
        self.module(kind)?;
        Ok(ProgramInfo { variables })
    }

    fn bind_program(&mut self, binding: &ShaderBinding) -> Result<(), BackendError> {
        if let Some(texture) = binding.texture() {
            if !self.textures.contains_key(&texture) {
                return Err(BackendError::UnknownTexture(texture));
            }
        }
        if binding.kind() == ShaderKind::GlyphSubpixel && !self.supports_texture_barrier() {
            return Err(BackendError::Unsupported("texture barrier"));
        }
        let alignment = self.uniform_alignment;
        if let Some(frame) = self.frame.as_mut() {
            frame.paint_offset = match binding {
                ShaderBinding::Gradient(uniforms) => {
                    push_block(&mut frame.paint, alignment, &uniforms.to_bytes())
                }
                _ => 0,
            };
        }
        self.state.program = binding.clone();
        Ok(())
    }

    fn upload_vertices(&mut self, vertices: &[Vertex]) -> Result<(), BackendError> {
        let frame = self.frame_mut()?;
        frame.upload_base = frame.vertices.len();
        frame.upload_len = vertices.len();
        frame.vertices.extend_from_slice(vertices);
        Ok(())
    }

    fn draw(
        &mut self,
        mode: PrimitiveMode,
        first: usize,
        count: usize,
    ) -> Result<(), BackendError> {
        let globals_offset = self.globals_offset()?;
        let target = self.frame_mut()?.target;
        let (format, samples, _) = self.target_info(target)?;

        let program = &self.state.program;
        let (texture, quality) = match program {
            ShaderBinding::Textured { texture, quality } => (Some(*texture), *quality),
            ShaderBinding::Glyph { atlas, .. } => (Some(*atlas), SamplingQuality::Linear),
            _ => (None, SamplingQuality::Linear),
        };
        let kind = program.kind();
        let stencil = self.state.stencil;
        let scissor = self.state.scissor;
        let pipeline = PipelineKey {
            kind,
            mode,
            stencil: stencil.into(),
            blend: self.state.blend,
            logical: self.state.logical,
            format,
            samples,
        };

        let frame = self.frame_mut()?;
        if first + count > frame.upload_len {
            return Err(BackendError::Validation(format!(
                "draw of {} vertices from {} exceeds {} uploaded",
                count, first, frame.upload_len
            )));
        }
        let paint = PaintKey {
            texture,
            quality,
            target_copy: (kind == ShaderKind::GlyphSubpixel).then_some(frame.target),
        };
        let command = DrawCommand {
            pipeline,
            paint,
            globals_offset,
            paint_offset: frame.paint_offset,
            scissor,
            stencil_reference: stencil.reference() as u32,
            first: (frame.upload_base + first) as u32,
            count: count as u32,
        };
        frame.commands.push(Command::Draw(command));
        Ok(())
    }

    fn texture_barrier(&mut self) -> Result<(), BackendError> {
        if !self.supports_texture_barrier() {
            return Err(BackendError::Unsupported("texture barrier"));
        }
        self.frame_mut()?.commands.push(Command::Barrier);
        Ok(())
    }

    fn supports_texture_barrier(&self) -> bool {
        self.sample_count == 1
    }
}

fn topology(mode: PrimitiveMode) -> wgpu::PrimitiveTopology {
    match mode {
        PrimitiveMode::Points => wgpu::PrimitiveTopology::PointList,
        PrimitiveMode::Lines => wgpu::PrimitiveTopology::LineList,
        PrimitiveMode::LineStrip => wgpu::PrimitiveTopology::LineStrip,
        PrimitiveMode::Triangles => wgpu::PrimitiveTopology::TriangleList,
        PrimitiveMode::TriangleStrip => wgpu::PrimitiveTopology::TriangleStrip,
    }
}

fn blend_state(mode: BlendingMode, logical: LogicalOperation) -> Option<wgpu::BlendState> {
    if logical == LogicalOperation::Xor {
        let xor = wgpu::BlendComponent {
            src_factor: wgpu::BlendFactor::OneMinusDst,
            dst_factor: wgpu::BlendFactor::OneMinusSrc,
            operation: wgpu::BlendOperation::Add,
        };
        return Some(wgpu::BlendState {
            color: xor,
            alpha: wgpu::BlendComponent::OVER,
        });
    }
    match mode {
        BlendingMode::None => None,
        BlendingMode::Blit => Some(wgpu::BlendState::PREMULTIPLIED_ALPHA_BLENDING),
        BlendingMode::Default => Some(wgpu::BlendState {
            color: wgpu::BlendComponent {
                src_factor: wgpu::BlendFactor::SrcAlpha,
                dst_factor: wgpu::BlendFactor::OneMinusSrcAlpha,
                operation: wgpu::BlendOperation::Add,
            },
            alpha: wgpu::BlendComponent {
                src_factor: wgpu::BlendFactor::One,
                dst_factor: wgpu::BlendFactor::OneMinusSrcAlpha,
                operation: wgpu::BlendOperation::Add,
            },
        }),
    }
}

fn depth_stencil_state(stencil: StencilKey) -> wgpu::DepthStencilState {
    let face = |compare, pass_op| wgpu::StencilFaceState {
        compare,
        fail_op: wgpu::StencilOperation::Keep,
        depth_fail_op: wgpu::StencilOperation::Keep,
        pass_op,
    };
    let (face, write_mask) = match stencil {
        StencilKey::Disabled => (
            face(wgpu::CompareFunction::Always, wgpu::StencilOperation::Keep),
            0,
        ),
        StencilKey::Write { compare, pass } => (
            face(compare_function(compare), stencil_operation(pass)),
            0xff,
        ),
        StencilKey::Test { compare } => (
            face(compare_function(compare), wgpu::StencilOperation::Keep),
            0,
        ),
    };
    wgpu::DepthStencilState {
        format: DEPTH_STENCIL_FORMAT,
        depth_write_enabled: false,
        depth_compare: wgpu::CompareFunction::Always,
        stencil: wgpu::StencilState {
            front: face,
            back: face,
            read_mask: 0xff,
            write_mask,
        },
        bias: wgpu::DepthBiasState::default(),
    }
}

fn compare_function(func: StencilFunc) -> wgpu::CompareFunction {
    match func {
        StencilFunc::Always => wgpu::CompareFunction::Always,
        StencilFunc::Equal => wgpu::CompareFunction::Equal,
    }
}

fn stencil_operation(op: StencilOp) -> wgpu::StencilOperation {
    match op {
        StencilOp::Keep => wgpu::StencilOperation::Keep,
        StencilOp::Replace => wgpu::StencilOperation::Replace,
        StencilOp::IncrementClamp => wgpu::StencilOperation::IncrementClamp,
        StencilOp::DecrementClamp => wgpu::StencilOperation::DecrementClamp,
    }
}

fn map_error(err: wgpu::Error) -> BackendError {
    match err {
        wgpu::Error::OutOfMemory { .. } => BackendError::OutOfMemory,
        other => BackendError::Validation(other.to_string()),
    }
}

fn extent(size: (u32, u32)) -> wgpu::Extent3d {
    wgpu::Extent3d {
        width: size.0.max(1),
        height: size.1.max(1),
        depth_or_array_layers: 1,
    }
}

fn clip_to_target(rect: DeviceRect, size: (u32, u32)) -> DeviceRect {
    let x = rect.x.min(size.0);
    let y = rect.y.min(size.1);
    DeviceRect::new(
        x,
        y,
        rect.width.min(size.0 - x),
        rect.height.min(size.1 - y),
    )
}

/// Append `data` at the next multiple of `alignment`; returns its offset
fn push_block(buffer: &mut Vec<u8>, alignment: usize, data: &[u8]) -> u32 {
    let offset = buffer.len().div_ceil(alignment) * alignment;
    buffer.resize(offset, 0);
    buffer.extend_from_slice(data);
    offset as u32
}

/// `data` grown so that a block of `block` bytes fits at offset 0
fn padded(data: &[u8], block: usize) -> Vec<u8> {
    let mut out = data.to_vec();
    if out.len() < block {
        out.resize(block, 0);
    }
    out
}

fn write_rgba8(
    queue: &wgpu::Queue,
    texture: &wgpu::Texture,
    width: u32,
    height: u32,
    pixels: &[u8],
) {
    queue.write_texture(
        texture.as_image_copy(),
        pixels,
        wgpu::ImageDataLayout {
            offset: 0,
            bytes_per_row: Some(4 * width),
            rows_per_image: Some(height),
        },
        wgpu::Extent3d {
            width,
            height,
            depth_or_array_layers: 1,
        },
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use tessera_paint::{LogicalCoordinates, Size};

    async fn create_test_device() -> Option<(wgpu::Device, wgpu::Queue)> {
        let instance = wgpu::Instance::new(wgpu::InstanceDescriptor {
            backends: wgpu::Backends::all(),
            ..Default::default()
        });

        let adapter = instance
            .request_adapter(&wgpu::RequestAdapterOptions {
                power_preference: wgpu::PowerPreference::LowPower,
                force_fallback_adapter: false,
                compatible_surface: None,
            })
            .await?;

        let (device, queue) = adapter
            .request_device(&wgpu::DeviceDescriptor::default(), None)
            .await
            .ok()?;

        Some((device, queue))
    }

    fn test_backend() -> Option<WgpuBackend> {
        let (device, queue) = pollster::block_on(create_test_device())?;
        Some(WgpuBackend::new(
            Arc::new(device),
            Arc::new(queue),
            &RenderConfig::default(),
        ))
    }

    #[test]
    fn test_push_block_alignment() {
        let mut buffer = Vec::new();
        assert_eq!(push_block(&mut buffer, 256, &[1; 10]), 0);
        assert_eq!(push_block(&mut buffer, 256, &[2; 300]), 256);
        assert_eq!(push_block(&mut buffer, 256, &[3; 4]), 768);
        assert_eq!(buffer.len(), 772);
    }

    #[test]
    fn test_clip_to_target() {
        let rect = clip_to_target(DeviceRect::new(90, 5, 50, 50), (100, 20));
        assert_eq!(rect, DeviceRect::new(90, 5, 10, 15));
        assert!(clip_to_target(DeviceRect::new(200, 0, 5, 5), (100, 20)).is_empty());
    }

    #[test]
    fn test_stencil_write_pipeline_state() {
        let state = depth_stencil_state(StencilKey::Write {
            compare: StencilFunc::Equal,
            pass: StencilOp::IncrementClamp,
        });
        assert_eq!(state.stencil.write_mask, 0xff);
        assert_eq!(state.stencil.front.compare, wgpu::CompareFunction::Equal);
        assert_eq!(
            state.stencil.front.pass_op,
            wgpu::StencilOperation::IncrementClamp
        );
        let test = depth_stencil_state(StencilKey::Test {
            compare: StencilFunc::Equal,
        });
        assert_eq!(test.stencil.write_mask, 0);
    }

    #[test]
    fn test_xor_overrides_blend_mode() {
        let xor = blend_state(BlendingMode::None, LogicalOperation::Xor).unwrap();
        assert_eq!(xor.color.src_factor, wgpu::BlendFactor::OneMinusDst);
        assert!(blend_state(BlendingMode::None, LogicalOperation::None).is_none());
    }

    #[test]
    fn test_calls_outside_frame() {
        let Some(mut backend) = test_backend() else {
            return;
        };
        assert_eq!(backend.end_frame(), Err(BackendError::NoFrame));
        assert_eq!(
            backend.draw(PrimitiveMode::Triangles, 0, 3),
            Err(BackendError::NoFrame)
        );
    }

    #[test]
    fn test_programs_prepare() {
        let Some(mut backend) = test_backend() else {
            return;
        };
        for kind in ShaderKind::ALL {
            let info = backend.prepare_program(kind).unwrap();
            for name in kind.variables() {
                assert!(info.has_variable(name));
            }
        }
    }

    #[test]
    fn test_clear_and_fill_renders_pixels() {
        let Some(mut backend) = test_backend() else {
            return;
        };
        let red = tessera_paint::Color::RED;
        backend.begin_frame((4, 4)).unwrap();
        backend
            .set_projection(LogicalCoordinates::gui(Size::new(4.0, 4.0)).projection())
            .unwrap();
        backend
            .clear(ClearTarget::Color(tessera_paint::Color::BLACK))
            .unwrap();
        backend.bind_program(&ShaderBinding::Solid).unwrap();
        let quad = crate::geometry::quad(tessera_paint::Rect::new(0.0, 0.0, 2.0, 4.0))
            .map(|p| Vertex::new(p, red));
        backend.upload_vertices(&quad).unwrap();
        backend.draw(PrimitiveMode::Triangles, 0, 6).unwrap();
        backend.end_frame().unwrap();

        let pixels = backend.read_frame().unwrap();
        assert_eq!(pixels.len(), 4 * 4 * 4);
        // Left half red, right half black
        assert_eq!(&pixels[0..4], &[255, 0, 0, 255]);
        assert_eq!(&pixels[12..16], &[0, 0, 0, 255]);
    }
}
