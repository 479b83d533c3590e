//! Render backends
//!
//! [`RenderBackend`] is the seam between the batching layer and a stateful,
//! immediate-mode GPU API. Every call either changes pipeline state or issues
//! work; fallible calls report a [`BackendError`] that callers wrap with
//! [`crate::error::Checked::checked`] to record the call site.

mod recording;
mod wgpu_backend;

pub use self::recording::{BackendCommand, RecordingBackend};
pub use self::wgpu_backend::WgpuBackend;

use tessera_paint::{BlendingMode, Color, LogicalOperation, Rect, SmoothingMode, TextureId};

use crate::error::BackendError;
use crate::shader::{ShaderBinding, ShaderKind};
use crate::vertex::{PrimitiveMode, Vertex};

/// Column-major 4x4 matrix
pub type Mat4 = [[f32; 4]; 4];

pub const IDENTITY: Mat4 = [
    [1.0, 0.0, 0.0, 0.0],
    [0.0, 1.0, 0.0, 0.0],
    [0.0, 0.0, 1.0, 0.0],
    [0.0, 0.0, 0.0, 1.0],
];

/// Integer rectangle in target pixels, origin top-left
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub struct DeviceRect {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

impl DeviceRect {
    pub const fn new(x: u32, y: u32, width: u32, height: u32) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    /// Smallest pixel rect covering `rect`, clipped to the target
    pub fn covering(rect: Rect, extents: (u32, u32)) -> Self {
        let x0 = rect.x.floor().clamp(0.0, extents.0 as f32) as u32;
        let y0 = rect.y.floor().clamp(0.0, extents.1 as f32) as u32;
        let x1 = rect.right().ceil().clamp(0.0, extents.0 as f32) as u32;
        let y1 = rect.bottom().ceil().clamp(0.0, extents.1 as f32) as u32;
        Self::new(x0, y0, x1.saturating_sub(x0), y1.saturating_sub(y0))
    }

    pub fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0
    }
}

/// Stencil comparison against the reference value
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum StencilFunc {
    Always,
    Equal,
}

/// Stencil update applied where the comparison passes
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum StencilOp {
    Keep,
    Replace,
    IncrementClamp,
    DecrementClamp,
}

/// Stencil configuration for subsequent draws
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum StencilState {
    /// Stencil test off, draws are not gated
    #[default]
    Disabled,
    /// Mask painting: color writes off, stencil updated where `compare` passes
    Write {
        reference: u8,
        compare: StencilFunc,
        pass: StencilOp,
    },
    /// Draws only land where `compare` passes against `reference`
    Test { reference: u8, compare: StencilFunc },
}

impl StencilState {
    pub fn is_enabled(&self) -> bool {
        !matches!(self, StencilState::Disabled)
    }

    pub fn writes_color(&self) -> bool {
        !matches!(self, StencilState::Write { .. })
    }

    pub fn reference(&self) -> u8 {
        match *self {
            StencilState::Disabled => 0,
            StencilState::Write { reference, .. } | StencilState::Test { reference, .. } => {
                reference
            }
        }
    }
}

/// Buffer cleared by [`RenderBackend::clear`]
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum ClearTarget {
    Color(Color),
    Depth(f32),
    Stencil(u8),
}

/// What a backend knows about a compiled shader program
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ProgramInfo {
    /// Names of the program's bindable variables
    pub variables: Vec<String>,
}

impl ProgramInfo {
    pub fn has_variable(&self, name: &str) -> bool {
        self.variables.iter().any(|v| v == name)
    }
}

/// A stateful immediate-mode GPU API
///
/// State set through the `set_*` calls applies to every following `draw`
/// until changed. Draw calls index the vertices of the most recent
/// `upload_vertices` call.
pub trait RenderBackend {
    fn begin_frame(&mut self, extents: (u32, u32)) -> Result<(), BackendError>;

    fn end_frame(&mut self) -> Result<(), BackendError>;

    /// Redirect rendering to a registered texture (None = the frame target)
    fn set_render_target(&mut self, target: Option<TextureId>) -> Result<(), BackendError>;

    fn set_projection(&mut self, projection: Mat4) -> Result<(), BackendError>;

    /// Model transformation applied before the projection (None = identity)
    fn set_transform(&mut self, transform: Option<Mat4>) -> Result<(), BackendError>;

    fn set_scissor(&mut self, scissor: Option<DeviceRect>) -> Result<(), BackendError>;

    fn set_stencil(&mut self, stencil: StencilState) -> Result<(), BackendError>;

    fn set_blend(
        &mut self,
        mode: BlendingMode,
        logical_operation: LogicalOperation,
    ) -> Result<(), BackendError>;

    fn set_smoothing(&mut self, mode: SmoothingMode) -> Result<(), BackendError>;

    fn clear(&mut self, target: ClearTarget) -> Result<(), BackendError>;

    /// Compile (or look up) a program and report its variables
    fn prepare_program(&mut self, kind: ShaderKind) -> Result<ProgramInfo, BackendError>;

    fn bind_program(&mut self, binding: &ShaderBinding) -> Result<(), BackendError>;

    fn upload_vertices(&mut self, vertices: &[Vertex]) -> Result<(), BackendError>;

    fn draw(&mut self, mode: PrimitiveMode, first: usize, count: usize)
        -> Result<(), BackendError>;

    /// Make pixels written so far visible to shaders reading the target
    fn texture_barrier(&mut self) -> Result<(), BackendError>;

    fn supports_texture_barrier(&self) -> bool;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_covering_rounds_outwards_and_clips() {
        let rect = DeviceRect::covering(Rect::new(10.4, -5.0, 20.2, 10.0), (25, 100));
        assert_eq!(rect, DeviceRect::new(10, 0, 15, 5));
        assert!(DeviceRect::covering(Rect::new(50.0, 50.0, 10.0, 10.0), (40, 40)).is_empty());
    }

    #[test]
    fn test_stencil_state_queries() {
        let write = StencilState::Write {
            reference: 2,
            compare: StencilFunc::Equal,
            pass: StencilOp::IncrementClamp,
        };
        assert!(write.is_enabled());
        assert!(!write.writes_color());
        assert_eq!(write.reference(), 2);
        assert!(!StencilState::Disabled.is_enabled());
    }
}
