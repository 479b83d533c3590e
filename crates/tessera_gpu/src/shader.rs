//! Shader and paint binding
//!
//! Every batch draws with one of a handful of programs. The binder verifies
//! the programs once at start-up, turns brushes into [`ShaderBinding`]s and
//! keeps track of what the backend has bound so repeated bindings are free.

use rustc_hash::FxHashMap;
use tessera_paint::{Brush, Gradient, SamplingQuality, TextureId, MAX_GRADIENT_STOPS};

use crate::backend::{ProgramInfo, RenderBackend};
use crate::error::{BackendError, Checked, RenderError, Result};
use crate::vertex::VertexArray;

/// Side of the gradient edge filter kernel
pub const KERNEL_SIZE: usize = 15;
pub const KERNEL_LEN: usize = KERNEL_SIZE * KERNEL_SIZE;

/// Shader program variants
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ShaderKind {
    /// Per-vertex color, no texture sampling
    Solid,
    Gradient,
    Textured,
    /// Glyph atlas coverage tinted with the vertex color
    Glyph,
    /// Per-channel coverage blended against a copy of the render target
    GlyphSubpixel,
}

impl ShaderKind {
    pub const ALL: [ShaderKind; 5] = [
        ShaderKind::Solid,
        ShaderKind::Gradient,
        ShaderKind::Textured,
        ShaderKind::Glyph,
        ShaderKind::GlyphSubpixel,
    ];

    /// Variables the renderer sets on this program
    pub fn variables(self) -> &'static [&'static str] {
        match self {
            ShaderKind::Solid => &["globals"],
            ShaderKind::Gradient => &["globals", "gradient"],
            ShaderKind::Textured => &["globals", "paint_texture", "paint_sampler"],
            ShaderKind::Glyph => &["globals", "glyph_atlas", "glyph_sampler"],
            ShaderKind::GlyphSubpixel => &["globals", "glyph_atlas", "glyph_sampler", "target_copy"],
        }
    }
}

/// Gradient parameters in the layout the gradient program expects
#[derive(Clone, Debug, PartialEq)]
pub struct GradientUniforms {
    /// 0 = linear, 1 = radial
    pub kind: u32,
    /// Linear: start.xy, end.xy. Radial: center.xy, radius, 0
    pub geometry: [f32; 4],
    pub stop_count: u32,
    pub offsets: [f32; MAX_GRADIENT_STOPS],
    pub colors: [[f32; 4]; MAX_GRADIENT_STOPS],
    pub kernel: [f32; KERNEL_LEN],
}

impl GradientUniforms {
    pub fn new(gradient: &Gradient, opacity: f32, kernel: &[f32; KERNEL_LEN]) -> Self {
        let (kind, geometry) = match gradient {
            Gradient::Linear { start, end, .. } => (0, [start.x, start.y, end.x, end.y]),
            Gradient::Radial { center, radius, .. } => (1, [center.x, center.y, *radius, 0.0]),
        };
        let stops = gradient.normalized_stops();
        let mut offsets = [0.0; MAX_GRADIENT_STOPS];
        let mut colors = [[0.0; 4]; MAX_GRADIENT_STOPS];
        for (i, stop) in stops.iter().enumerate() {
            offsets[i] = stop.offset;
            colors[i] = stop.color.with_opacity(opacity).to_array();
        }
        Self {
            kind,
            geometry,
            stop_count: stops.len() as u32,
            offsets,
            colors,
            kernel: *kernel,
        }
    }

    /// Bytes in std140-compatible layout (see the gradient program)
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut words: Vec<u32> = Vec::with_capacity(GRADIENT_UNIFORM_SIZE / 4);
        words.extend([self.kind, self.stop_count, 0, 0]);
        words.extend(self.geometry.map(f32::to_bits));
        words.extend(self.offsets.map(f32::to_bits));
        for color in &self.colors {
            words.extend(color.map(f32::to_bits));
        }
        words.extend(self.kernel.map(f32::to_bits));
        words.resize(GRADIENT_UNIFORM_SIZE / 4, 0);
        bytemuck::cast_slice(&words).to_vec()
    }
}

/// Size of the gradient uniform block: header, geometry, 4 offset vectors,
/// 16 colors and the kernel padded to whole vectors
pub const GRADIENT_UNIFORM_SIZE: usize =
    16 + 16 + MAX_GRADIENT_STOPS * 4 + MAX_GRADIENT_STOPS * 16 + KERNEL_LEN.div_ceil(4) * 16;

/// A program together with the parameters for the next draws
#[derive(Clone, Debug, PartialEq)]
pub enum ShaderBinding {
    Solid,
    Gradient(Box<GradientUniforms>),
    Textured {
        texture: TextureId,
        quality: SamplingQuality,
    },
    Glyph {
        atlas: TextureId,
        subpixel: bool,
    },
}

impl ShaderBinding {
    pub fn kind(&self) -> ShaderKind {
        match self {
            ShaderBinding::Solid => ShaderKind::Solid,
            ShaderBinding::Gradient(_) => ShaderKind::Gradient,
            ShaderBinding::Textured { .. } => ShaderKind::Textured,
            ShaderBinding::Glyph {
                subpixel: false, ..
            } => ShaderKind::Glyph,
            ShaderBinding::Glyph { subpixel: true, .. } => ShaderKind::GlyphSubpixel,
        }
    }

    /// Texture sampled by the binding, if any
    pub fn texture(&self) -> Option<TextureId> {
        match self {
            ShaderBinding::Textured { texture, .. } => Some(*texture),
            ShaderBinding::Glyph { atlas, .. } => Some(*atlas),
            _ => None,
        }
    }
}

/// Normalized 2D Gaussian used to dither gradient edges
pub fn gaussian_kernel() -> [f32; KERNEL_LEN] {
    let radius = (KERNEL_SIZE / 2) as f32;
    let sigma = KERNEL_SIZE as f32 / 6.0;
    let mut kernel = [0.0f32; KERNEL_LEN];
    let mut sum = 0.0;
    for y in 0..KERNEL_SIZE {
        for x in 0..KERNEL_SIZE {
            let dx = x as f32 - radius;
            let dy = y as f32 - radius;
            let w = (-(dx * dx + dy * dy) / (2.0 * sigma * sigma)).exp();
            kernel[y * KERNEL_SIZE + x] = w;
            sum += w;
        }
    }
    for w in kernel.iter_mut() {
        *w /= sum;
    }
    kernel
}

/// Selects and parameterizes the active shader program
#[derive(Debug)]
pub struct ShaderBinder {
    kernel: Box<[f32; KERNEL_LEN]>,
    programs: FxHashMap<ShaderKind, ProgramInfo>,
    subpixel_available: bool,
    current: Option<ShaderBinding>,
}

impl ShaderBinder {
    /// Prepare and verify every program.
    ///
    /// Failures of the core programs are fatal. The subpixel glyph program is
    /// optional: if it fails, or the backend cannot issue texture barriers,
    /// subpixel rendering is disabled instead.
    pub fn new<B: RenderBackend>(backend: &mut B) -> Result<Self> {
        let mut programs = FxHashMap::default();
        let mut subpixel_available = false;

        for kind in ShaderKind::ALL {
            match Self::prepare(backend, kind) {
                Ok(info) => {
                    if kind == ShaderKind::GlyphSubpixel {
                        subpixel_available = backend.supports_texture_barrier();
                        if !subpixel_available {
                            tracing::warn!(
                                "backend has no texture barrier, subpixel glyph rendering disabled"
                            );
                        }
                    }
                    programs.insert(kind, info);
                }
                Err(err) if kind == ShaderKind::GlyphSubpixel => {
                    tracing::warn!("subpixel glyph rendering disabled: {}", err);
                }
                Err(err) => return Err(err),
            }
        }

        tracing::debug!(
            "prepared {} shader programs (subpixel: {})",
            programs.len(),
            subpixel_available
        );

        Ok(Self {
            kernel: Box::new(gaussian_kernel()),
            programs,
            subpixel_available,
            current: None,
        })
    }

    fn prepare<B: RenderBackend>(backend: &mut B, kind: ShaderKind) -> Result<ProgramInfo> {
        let info = backend
            .prepare_program(kind)
            .map_err(|err| match err {
                BackendError::Validation(message) => RenderError::ShaderProgram {
                    program: kind,
                    message,
                },
                other => RenderError::ShaderProgram {
                    program: kind,
                    message: other.to_string(),
                },
            })?;
        for &name in kind.variables() {
            if !info.has_variable(name) {
                return Err(RenderError::VariableNotFound {
                    program: kind,
                    name,
                });
            }
        }
        Ok(info)
    }

    pub fn kernel(&self) -> &[f32; KERNEL_LEN] {
        &self.kernel
    }

    pub fn program(&self, kind: ShaderKind) -> Option<&ProgramInfo> {
        self.programs.get(&kind)
    }

    pub fn subpixel_available(&self) -> bool {
        self.subpixel_available
    }

    pub fn current(&self) -> Option<&ShaderBinding> {
        self.current.as_ref()
    }

    /// Binding that paints with `brush` at the given opacity
    pub fn binding_for(&self, brush: &Brush, opacity: f32) -> ShaderBinding {
        match brush {
            Brush::Solid(_) => ShaderBinding::Solid,
            Brush::Gradient(gradient) => ShaderBinding::Gradient(Box::new(GradientUniforms::new(
                gradient,
                opacity,
                &self.kernel,
            ))),
            Brush::Texture(paint) => ShaderBinding::Textured {
                texture: paint.texture,
                quality: paint.quality,
            },
        }
    }

    /// Binding for glyphs in `atlas`, downgraded when subpixel is unavailable
    pub fn glyph_binding(&self, atlas: TextureId, subpixel: bool) -> ShaderBinding {
        ShaderBinding::Glyph {
            atlas,
            subpixel: subpixel && self.subpixel_available,
        }
    }

    /// Activate `binding`, drawing pending vertices first if it changes
    pub fn bind<B: RenderBackend>(
        &mut self,
        vertices: &mut VertexArray,
        backend: &mut B,
        binding: ShaderBinding,
    ) -> Result<()> {
        if self.current.as_ref() == Some(&binding) {
            return Ok(());
        }
        if vertices.pending() > 0 {
            vertices.execute(backend)?;
        }
        backend.bind_program(&binding).checked("bind_program")?;
        self.current = Some(binding);
        Ok(())
    }

    /// Restore the solid program
    pub fn restore_default<B: RenderBackend>(
        &mut self,
        vertices: &mut VertexArray,
        backend: &mut B,
    ) -> Result<()> {
        self.bind(vertices, backend, ShaderBinding::Solid)
    }

    /// Run `f` with `binding` active, restoring the solid program afterwards
    /// whether or not `f` succeeds
    pub fn with_program<B, T>(
        &mut self,
        vertices: &mut VertexArray,
        backend: &mut B,
        binding: ShaderBinding,
        f: impl FnOnce(&mut VertexArray, &mut B) -> Result<T>,
    ) -> Result<T>
    where
        B: RenderBackend,
    {
        self.bind(vertices, backend, binding)?;
        let result = f(vertices, backend);
        match result {
            Ok(value) => {
                self.restore_default(vertices, backend)?;
                Ok(value)
            }
            Err(err) => {
                vertices.discard();
                if let Err(restore) = self.restore_default(vertices, backend) {
                    tracing::warn!("failed to restore default program: {}", restore);
                }
                Err(err)
            }
        }
    }

    /// Forget the bound program so the next bind reaches the backend
    pub fn invalidate(&mut self) {
        self.current = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::{BackendCommand, RecordingBackend};
    use crate::vertex::Vertex;
    use tessera_paint::{Color, Point};

    fn backend() -> RecordingBackend {
        let mut backend = RecordingBackend::new();
        backend.begin_frame((64, 64)).unwrap();
        backend
    }

    #[test]
    fn test_kernel_is_normalized_and_symmetric() {
        let kernel = gaussian_kernel();
        let sum: f32 = kernel.iter().sum();
        assert!((sum - 1.0).abs() < 1e-4);
        let center = kernel[KERNEL_LEN / 2];
        assert!(kernel.iter().all(|&w| w <= center));
        assert_eq!(kernel[0], kernel[KERNEL_LEN - 1]);
        assert_eq!(kernel[KERNEL_SIZE - 1], kernel[KERNEL_LEN - KERNEL_SIZE]);
    }

    #[test]
    fn test_gradient_uniform_layout() {
        let gradient =
            Gradient::linear_simple(Point::ZERO, Point::new(10.0, 0.0), Color::RED, Color::BLUE);
        let uniforms = GradientUniforms::new(&gradient, 0.5, &gaussian_kernel());
        assert_eq!(uniforms.stop_count, 2);
        assert_eq!(uniforms.colors[0][3], 0.5);
        assert_eq!(uniforms.to_bytes().len(), GRADIENT_UNIFORM_SIZE);
        assert_eq!(GRADIENT_UNIFORM_SIZE % 16, 0);
    }

    #[test]
    fn test_missing_variable_is_reported() {
        let mut backend = RecordingBackend::new().without_variable(ShaderKind::Gradient, "gradient");
        let err = ShaderBinder::new(&mut backend).unwrap_err();
        assert!(matches!(
            err,
            RenderError::VariableNotFound {
                program: ShaderKind::Gradient,
                name: "gradient"
            }
        ));
    }

    #[test]
    fn test_core_program_failure_is_fatal() {
        let mut backend = RecordingBackend::new().with_failing_program(ShaderKind::Textured);
        let err = ShaderBinder::new(&mut backend).unwrap_err();
        assert!(matches!(
            err,
            RenderError::ShaderProgram {
                program: ShaderKind::Textured,
                ..
            }
        ));
    }

    #[test]
    fn test_subpixel_failure_disables_feature() {
        let mut backend = RecordingBackend::new().with_failing_program(ShaderKind::GlyphSubpixel);
        let binder = ShaderBinder::new(&mut backend).unwrap();
        assert!(!binder.subpixel_available());
        assert_eq!(
            binder.glyph_binding(TextureId(3), true),
            ShaderBinding::Glyph {
                atlas: TextureId(3),
                subpixel: false
            }
        );
    }

    #[test]
    fn test_subpixel_needs_texture_barrier() {
        let mut backend = RecordingBackend::new().with_texture_barrier(false);
        let binder = ShaderBinder::new(&mut backend).unwrap();
        assert!(!binder.subpixel_available());
    }

    #[test]
    fn test_bind_deduplicates_and_flushes_on_change() {
        let mut backend = backend();
        let mut binder = ShaderBinder::new(&mut backend).unwrap();
        let mut vertices = VertexArray::new(12);

        binder
            .bind(&mut vertices, &mut backend, ShaderBinding::Solid)
            .unwrap();
        let triangle = [Vertex::new(Point::ZERO, Color::RED); 3];
        vertices.insert(&mut backend, &triangle).unwrap();
        binder
            .bind(&mut vertices, &mut backend, ShaderBinding::Solid)
            .unwrap();
        assert_eq!(vertices.pending(), 3);

        let textured = ShaderBinding::Textured {
            texture: TextureId(1),
            quality: SamplingQuality::Nearest,
        };
        binder.bind(&mut vertices, &mut backend, textured).unwrap();
        assert_eq!(vertices.pending(), 0);

        let binds = backend
            .commands()
            .iter()
            .filter(|c| matches!(c, BackendCommand::BindProgram(_)))
            .count();
        assert_eq!(binds, 2);
    }

    #[test]
    fn test_with_program_restores_solid_on_error() {
        let mut backend = backend();
        let mut binder = ShaderBinder::new(&mut backend).unwrap();
        let mut vertices = VertexArray::new(12);
        let binding = ShaderBinding::Textured {
            texture: TextureId(7),
            quality: SamplingQuality::Linear,
        };

        let result: Result<()> = binder.with_program(&mut vertices, &mut backend, binding, |_, _| {
            Err(RenderError::ClipDepthExceeded { depth: 256 })
        });
        assert!(result.is_err());
        assert_eq!(binder.current(), Some(&ShaderBinding::Solid));
        assert_eq!(backend.bound_program(), Some(&ShaderBinding::Solid));
    }
}
