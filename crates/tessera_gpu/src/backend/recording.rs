//! Headless backend that records the call stream

use tessera_paint::{BlendingMode, LogicalOperation, SmoothingMode, TextureId};

use super::{ClearTarget, DeviceRect, Mat4, ProgramInfo, RenderBackend, StencilState};
use crate::error::BackendError;
use crate::shader::{ShaderBinding, ShaderKind};
use crate::vertex::{PrimitiveMode, Vertex};

/// One recorded backend call
#[derive(Clone, Debug, PartialEq)]
pub enum BackendCommand {
    BeginFrame((u32, u32)),
    EndFrame,
    SetRenderTarget(Option<TextureId>),
    SetProjection(Mat4),
    SetTransform(Option<Mat4>),
    SetScissor(Option<DeviceRect>),
    SetStencil(StencilState),
    SetBlend(BlendingMode, LogicalOperation),
    SetSmoothing(SmoothingMode),
    Clear(ClearTarget),
    PrepareProgram(ShaderKind),
    BindProgram(ShaderBinding),
    UploadVertices { count: usize },
    Draw {
        mode: PrimitiveMode,
        first: usize,
        count: usize,
    },
    TextureBarrier,
}

/// Draw call as seen by the recording backend, with the state it ran under
#[derive(Clone, Debug, PartialEq)]
pub struct RecordedDraw {
    pub mode: PrimitiveMode,
    pub vertices: Vec<Vertex>,
    pub program: Option<ShaderBinding>,
    pub stencil: StencilState,
    pub scissor: Option<DeviceRect>,
    pub transform: Option<Mat4>,
}

/// [`RenderBackend`] that records every call and mirrors pipeline state.
///
/// Used for GPU-free tests and for tooling that inspects command streams.
/// Failures can be injected per call name with [`RecordingBackend::fail_on`].
#[derive(Debug)]
pub struct RecordingBackend {
    commands: Vec<BackendCommand>,
    recorded_draws: Vec<RecordedDraw>,
    frame: Option<(u32, u32)>,
    render_target: Option<TextureId>,
    projection: Option<Mat4>,
    transform: Option<Mat4>,
    scissor: Option<DeviceRect>,
    stencil: StencilState,
    blend: (BlendingMode, LogicalOperation),
    smoothing: SmoothingMode,
    program: Option<ShaderBinding>,
    vertices: Vec<Vertex>,
    texture_barrier: bool,
    fail_on: Option<&'static str>,
    failing_program: Option<ShaderKind>,
    withheld_variable: Option<(ShaderKind, &'static str)>,
}

impl Default for RecordingBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl RecordingBackend {
    pub fn new() -> Self {
        Self {
            commands: Vec::new(),
            recorded_draws: Vec::new(),
            frame: None,
            render_target: None,
            projection: None,
            transform: None,
            scissor: None,
            stencil: StencilState::Disabled,
            blend: (BlendingMode::Default, LogicalOperation::None),
            smoothing: SmoothingMode::AntiAlias,
            program: None,
            vertices: Vec::new(),
            texture_barrier: true,
            fail_on: None,
            failing_program: None,
            withheld_variable: None,
        }
    }

    pub fn with_texture_barrier(mut self, supported: bool) -> Self {
        self.texture_barrier = supported;
        self
    }

    /// Make `prepare_program` fail for `kind`
    pub fn with_failing_program(mut self, kind: ShaderKind) -> Self {
        self.failing_program = Some(kind);
        self
    }

    /// Omit a variable from the program info reported for `kind`
    pub fn without_variable(mut self, kind: ShaderKind, name: &'static str) -> Self {
        self.withheld_variable = Some((kind, name));
        self
    }

    /// Fail every call named `call` (e.g. `"draw"`) until cleared
    pub fn fail_on(&mut self, call: &'static str) {
        self.fail_on = Some(call);
    }

    pub fn clear_failure(&mut self) {
        self.fail_on = None;
    }

    pub fn commands(&self) -> &[BackendCommand] {
        &self.commands
    }

    pub fn take_commands(&mut self) -> Vec<BackendCommand> {
        self.recorded_draws.clear();
        std::mem::take(&mut self.commands)
    }

    /// `(mode, first, count)` of every draw call
    pub fn draws(&self) -> impl Iterator<Item = (PrimitiveMode, usize, usize)> + '_ {
        self.commands.iter().filter_map(|c| match *c {
            BackendCommand::Draw { mode, first, count } => Some((mode, first, count)),
            _ => None,
        })
    }

    /// Draw calls with their vertices and the state they ran under
    pub fn recorded_draws(&self) -> &[RecordedDraw] {
        &self.recorded_draws
    }

    pub fn in_frame(&self) -> bool {
        self.frame.is_some()
    }

    pub fn stencil(&self) -> StencilState {
        self.stencil
    }

    pub fn scissor(&self) -> Option<DeviceRect> {
        self.scissor
    }

    pub fn projection(&self) -> Option<&Mat4> {
        self.projection.as_ref()
    }

    pub fn blend(&self) -> (BlendingMode, LogicalOperation) {
        self.blend
    }

    pub fn smoothing(&self) -> SmoothingMode {
        self.smoothing
    }

    pub fn render_target(&self) -> Option<TextureId> {
        self.render_target
    }

    pub fn bound_program(&self) -> Option<&ShaderBinding> {
        self.program.as_ref()
    }

    fn check(&self, call: &'static str) -> Result<(), BackendError> {
        if self.fail_on == Some(call) {
            return Err(BackendError::Simulated(call));
        }
        Ok(())
    }

    fn check_frame(&self, call: &'static str) -> Result<(), BackendError> {
        self.check(call)?;
        if self.frame.is_none() {
            return Err(BackendError::NoFrame);
        }
        Ok(())
    }
}

impl RenderBackend for RecordingBackend {
    fn begin_frame(&mut self, extents: (u32, u32)) -> Result<(), BackendError> {
        self.check("begin_frame")?;
        self.frame = Some(extents);
        self.render_target = None;
        self.commands.push(BackendCommand::BeginFrame(extents));
        Ok(())
    }

    fn end_frame(&mut self) -> Result<(), BackendError> {
        self.check_frame("end_frame")?;
        self.frame = None;
        self.commands.push(BackendCommand::EndFrame);
        Ok(())
    }

    fn set_render_target(&mut self, target: Option<TextureId>) -> Result<(), BackendError> {
        self.check_frame("set_render_target")?;
        self.render_target = target;
        self.commands.push(BackendCommand::SetRenderTarget(target));
        Ok(())
    }

    fn set_projection(&mut self, projection: Mat4) -> Result<(), BackendError> {
        self.check("set_projection")?;
        self.projection = Some(projection);
        self.commands.push(BackendCommand::SetProjection(projection));
        Ok(())
    }

    fn set_transform(&mut self, transform: Option<Mat4>) -> Result<(), BackendError> {
        self.check("set_transform")?;
        self.transform = transform;
        self.commands.push(BackendCommand::SetTransform(transform));
        Ok(())
    }

    fn set_scissor(&mut self, scissor: Option<DeviceRect>) -> Result<(), BackendError> {
        self.check("set_scissor")?;
        self.scissor = scissor;
        self.commands.push(BackendCommand::SetScissor(scissor));
        Ok(())
    }

    fn set_stencil(&mut self, stencil: StencilState) -> Result<(), BackendError> {
        self.check("set_stencil")?;
        self.stencil = stencil;
        self.commands.push(BackendCommand::SetStencil(stencil));
        Ok(())
    }

    fn set_blend(
        &mut self,
        mode: BlendingMode,
        logical_operation: LogicalOperation,
    ) -> Result<(), BackendError> {
        self.check("set_blend")?;
        self.blend = (mode, logical_operation);
        self.commands
            .push(BackendCommand::SetBlend(mode, logical_operation));
        Ok(())
    }

    fn set_smoothing(&mut self, mode: SmoothingMode) -> Result<(), BackendError> {
        self.check("set_smoothing")?;
        self.smoothing = mode;
        self.commands.push(BackendCommand::SetSmoothing(mode));
        Ok(())
    }

    fn clear(&mut self, target: ClearTarget) -> Result<(), BackendError> {
        self.check_frame("clear")?;
        self.commands.push(BackendCommand::Clear(target));
        Ok(())
    }

    fn prepare_program(&mut self, kind: ShaderKind) -> Result<ProgramInfo, BackendError> {
        self.check("prepare_program")?;
        self.commands.push(BackendCommand::PrepareProgram(kind));
        if self.failing_program == Some(kind) {
            return Err(BackendError::Validation(format!(
                "{:?} program failed to link",
                kind
            )));
        }
        let variables = kind
            .variables()
            .iter()
            .filter(|&&name| self.withheld_variable != Some((kind, name)))
            .map(|name| name.to_string())
            .collect();
        Ok(ProgramInfo { variables })
    }

    fn bind_program(&mut self, binding: &ShaderBinding) -> Result<(), BackendError> {
        self.check("bind_program")?;
        if binding.kind() == ShaderKind::GlyphSubpixel && !self.texture_barrier {
            return Err(BackendError::Unsupported("texture barrier"));
        }
        self.program = Some(binding.clone());
        self.commands.push(BackendCommand::BindProgram(binding.clone()));
        Ok(())
    }

    fn upload_vertices(&mut self, vertices: &[Vertex]) -> Result<(), BackendError> {
        self.check_frame("upload_vertices")?;
        self.vertices.clear();
        self.vertices.extend_from_slice(vertices);
        self.commands.push(BackendCommand::UploadVertices {
            count: vertices.len(),
        });
        Ok(())
    }

    fn draw(
        &mut self,
        mode: PrimitiveMode,
        first: usize,
        count: usize,
    ) -> Result<(), BackendError> {
        self.check_frame("draw")?;
        if first + count > self.vertices.len() {
            return Err(BackendError::Validation(format!(
                "draw of {} vertices from {} exceeds {} uploaded",
                count,
                first,
                self.vertices.len()
            )));
        }
        self.recorded_draws.push(RecordedDraw {
            mode,
            vertices: self.vertices[first..first + count].to_vec(),
            program: self.program.clone(),
            stencil: self.stencil,
            scissor: self.scissor,
            transform: self.transform,
        });
        self.commands
            .push(BackendCommand::Draw { mode, first, count });
        Ok(())
    }

    fn texture_barrier(&mut self) -> Result<(), BackendError> {
        self.check_frame("texture_barrier")?;
        if !self.texture_barrier {
            return Err(BackendError::Unsupported("texture barrier"));
        }
        self.commands.push(BackendCommand::TextureBarrier);
        Ok(())
    }

    fn supports_texture_barrier(&self) -> bool {
        self.texture_barrier
    }
}
