//! The closed set of drawing operations
//!
//! Widgets record [`Operation`]s; the GPU layer queues them, partitions the
//! queue into batches of mutually compatible operations and draws each batch
//! with a single state binding. Everything the batcher needs to decide
//! compatibility lives here so that it stays a total function over two
//! operations.

use crate::brush::{Brush, Pen};
use crate::color::Color;
use crate::coordinates::{LogicalCoordinateSystem, LogicalCoordinates};
use crate::glyph::{FontId, Glyph, GlyphAppearance};
use crate::path::{Path, PathBuilder, Point};
use crate::primitives::{Arc, Circle, Rect, RoundedRect, Transform2D};

/// Edge smoothing for geometry
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum SmoothingMode {
    None,
    #[default]
    AntiAlias,
}

/// How source fragments combine with the target
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum BlendingMode {
    /// Blending disabled, source replaces destination
    None,
    /// Premultiplied copy: `src + dst * (1 - src.a)`
    Blit,
    /// Straight alpha blending
    #[default]
    Default,
}

/// Raster logical operation applied on top of blending
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum LogicalOperation {
    #[default]
    None,
    Xor,
}

/// 16-bit dash pattern, each bit covering `factor` logical units
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct LineStipple {
    pub factor: u32,
    pub pattern: u16,
}

impl LineStipple {
    pub const fn new(factor: u32, pattern: u16) -> Self {
        Self { factor, pattern }
    }

    /// Length of one full repetition of the pattern
    pub fn period(&self) -> f32 {
        16.0 * self.factor.max(1) as f32
    }

    /// Whether the pattern is "on" at distance `d` along a line
    pub fn is_on(&self, d: f32) -> bool {
        let factor = self.factor.max(1) as f32;
        let bit = ((d.rem_euclid(self.period())) / factor) as u32 % 16;
        self.pattern & (1 << bit) != 0
    }

    /// Dash intervals `[start, end)` along a line of the given length
    pub fn dashes(&self, length: f32) -> Vec<(f32, f32)> {
        let factor = self.factor.max(1) as f32;
        let mut dashes = Vec::new();
        let mut start: Option<f32> = None;
        let mut d = 0.0;
        while d < length {
            let on = self.is_on(d);
            match (on, start) {
                (true, None) => start = Some(d),
                (false, Some(s)) => {
                    dashes.push((s, d));
                    start = None;
                }
                _ => {}
            }
            d += factor;
        }
        if let Some(s) = start {
            dashes.push((s, length));
        }
        dashes
    }
}

/// A closed polygon
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Shape {
    pub points: Vec<Point>,
}

impl Shape {
    pub fn new(points: Vec<Point>) -> Self {
        Self { points }
    }

    pub fn to_path(&self) -> Path {
        let mut points = self.points.iter();
        let Some(first) = points.next() else {
            return Path::new();
        };
        let mut builder = PathBuilder::new().move_to(first.x, first.y);
        for p in points {
            builder = builder.line_to(p.x, p.y);
        }
        builder.close().build()
    }
}

/// Triangle-list geometry with optional per-vertex texture coordinates and colors
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Mesh {
    pub positions: Vec<Point>,
    pub uvs: Option<Vec<Point>>,
    pub colors: Option<Vec<Color>>,
}

impl Mesh {
    pub fn new(positions: Vec<Point>) -> Self {
        Self {
            positions,
            uvs: None,
            colors: None,
        }
    }

    pub fn with_uvs(mut self, uvs: Vec<Point>) -> Self {
        self.uvs = Some(uvs);
        self
    }

    pub fn with_colors(mut self, colors: Vec<Color>) -> Self {
        self.colors = Some(colors);
        self
    }

    pub fn vertex_count(&self) -> usize {
        self.positions.len()
    }
}

/// A mesh placed in the scene with its own transformation and paint
#[derive(Clone, Debug, PartialEq)]
pub struct Entity {
    pub mesh: Mesh,
    pub brush: Brush,
    pub transform: Transform2D,
}

/// A single glyph positioned at a pen origin
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct GlyphDraw {
    pub position: Point,
    pub glyph: Glyph,
    pub font: FontId,
    pub appearance: GlyphAppearance,
}

/// A recorded drawing request
#[derive(Clone, Debug, PartialEq)]
pub enum Operation {
    // State
    SetLogicalCoordinateSystem(LogicalCoordinateSystem),
    SetLogicalCoordinates(LogicalCoordinates),
    ScissorOn(Rect),
    ScissorOff,
    ClipToRect(Rect),
    ClipToPath(Path),
    ResetClip,
    SetOpacity(f32),
    SetBlendingMode(BlendingMode),
    SetSmoothingMode(SmoothingMode),
    PushLogicalOperation(LogicalOperation),
    PopLogicalOperation,
    LineStippleOn(LineStipple),
    LineStippleOff,
    SubpixelRenderingOn,
    SubpixelRenderingOff,

    // Clears
    Clear(Color),
    ClearDepthBuffer,
    ClearStencilBuffer,

    // Outlines and primitive geometry
    DrawPixel { point: Point, color: Color },
    DrawLine { from: Point, to: Point, pen: Pen },
    DrawRect { rect: Rect, pen: Pen },
    DrawRoundedRect { rect: RoundedRect, pen: Pen },
    DrawCircle { circle: Circle, pen: Pen },
    DrawArc { arc: Arc, pen: Pen },
    DrawPath { path: Path, pen: Pen },
    DrawShape { shape: Shape, pen: Pen },
    DrawEntities { entities: Vec<Entity> },
    DrawMesh {
        mesh: Mesh,
        brush: Brush,
        transform: Option<Transform2D>,
    },

    // Fills
    FillRect { rect: Rect, brush: Brush },
    FillRoundedRect { rect: RoundedRect, brush: Brush },
    FillCircle { circle: Circle, brush: Brush },
    FillArc { arc: Arc, brush: Brush },
    FillPath { path: Path, brush: Brush },
    FillShape { shape: Shape, brush: Brush },

    DrawGlyph(GlyphDraw),
}

/// Discriminant of [`Operation`], used to key batches and dispatch
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum OperationKind {
    SetLogicalCoordinateSystem,
    SetLogicalCoordinates,
    ScissorOn,
    ScissorOff,
    ClipToRect,
    ClipToPath,
    ResetClip,
    SetOpacity,
    SetBlendingMode,
    SetSmoothingMode,
    PushLogicalOperation,
    PopLogicalOperation,
    LineStippleOn,
    LineStippleOff,
    SubpixelRenderingOn,
    SubpixelRenderingOff,
    Clear,
    ClearDepthBuffer,
    ClearStencilBuffer,
    DrawPixel,
    DrawLine,
    DrawRect,
    DrawRoundedRect,
    DrawCircle,
    DrawArc,
    DrawPath,
    DrawShape,
    DrawEntities,
    DrawMesh,
    FillRect,
    FillRoundedRect,
    FillCircle,
    FillArc,
    FillPath,
    FillShape,
    DrawGlyph,
}

impl OperationKind {
    /// Operations that only change context state
    pub fn is_state(self) -> bool {
        use OperationKind::*;
        matches!(
            self,
            SetLogicalCoordinateSystem
                | SetLogicalCoordinates
                | ScissorOn
                | ScissorOff
                | ClipToRect
                | ClipToPath
                | ResetClip
                | SetOpacity
                | SetBlendingMode
                | SetSmoothingMode
                | PushLogicalOperation
                | PopLogicalOperation
                | LineStippleOn
                | LineStippleOff
                | SubpixelRenderingOn
                | SubpixelRenderingOff
        )
    }

    pub fn is_clear(self) -> bool {
        matches!(
            self,
            OperationKind::Clear | OperationKind::ClearDepthBuffer | OperationKind::ClearStencilBuffer
        )
    }

    pub fn is_fill(self) -> bool {
        use OperationKind::*;
        matches!(
            self,
            FillRect | FillRoundedRect | FillCircle | FillArc | FillPath | FillShape
        )
    }
}

impl Operation {
    pub fn kind(&self) -> OperationKind {
        match self {
            Operation::SetLogicalCoordinateSystem(_) => OperationKind::SetLogicalCoordinateSystem,
            Operation::SetLogicalCoordinates(_) => OperationKind::SetLogicalCoordinates,
            Operation::ScissorOn(_) => OperationKind::ScissorOn,
            Operation::ScissorOff => OperationKind::ScissorOff,
            Operation::ClipToRect(_) => OperationKind::ClipToRect,
            Operation::ClipToPath(_) => OperationKind::ClipToPath,
            Operation::ResetClip => OperationKind::ResetClip,
            Operation::SetOpacity(_) => OperationKind::SetOpacity,
            Operation::SetBlendingMode(_) => OperationKind::SetBlendingMode,
            Operation::SetSmoothingMode(_) => OperationKind::SetSmoothingMode,
            Operation::PushLogicalOperation(_) => OperationKind::PushLogicalOperation,
            Operation::PopLogicalOperation => OperationKind::PopLogicalOperation,
            Operation::LineStippleOn(_) => OperationKind::LineStippleOn,
            Operation::LineStippleOff => OperationKind::LineStippleOff,
            Operation::SubpixelRenderingOn => OperationKind::SubpixelRenderingOn,
            Operation::SubpixelRenderingOff => OperationKind::SubpixelRenderingOff,
            Operation::Clear(_) => OperationKind::Clear,
            Operation::ClearDepthBuffer => OperationKind::ClearDepthBuffer,
            Operation::ClearStencilBuffer => OperationKind::ClearStencilBuffer,
            Operation::DrawPixel { .. } => OperationKind::DrawPixel,
            Operation::DrawLine { .. } => OperationKind::DrawLine,
            Operation::DrawRect { .. } => OperationKind::DrawRect,
            Operation::DrawRoundedRect { .. } => OperationKind::DrawRoundedRect,
            Operation::DrawCircle { .. } => OperationKind::DrawCircle,
            Operation::DrawArc { .. } => OperationKind::DrawArc,
            Operation::DrawPath { .. } => OperationKind::DrawPath,
            Operation::DrawShape { .. } => OperationKind::DrawShape,
            Operation::DrawEntities { .. } => OperationKind::DrawEntities,
            Operation::DrawMesh { .. } => OperationKind::DrawMesh,
            Operation::FillRect { .. } => OperationKind::FillRect,
            Operation::FillRoundedRect { .. } => OperationKind::FillRoundedRect,
            Operation::FillCircle { .. } => OperationKind::FillCircle,
            Operation::FillArc { .. } => OperationKind::FillArc,
            Operation::FillPath { .. } => OperationKind::FillPath,
            Operation::FillShape { .. } => OperationKind::FillShape,
            Operation::DrawGlyph(_) => OperationKind::DrawGlyph,
        }
    }

    /// Paint used by fills and meshes
    pub fn brush(&self) -> Option<&Brush> {
        match self {
            Operation::FillRect { brush, .. }
            | Operation::FillRoundedRect { brush, .. }
            | Operation::FillCircle { brush, .. }
            | Operation::FillArc { brush, .. }
            | Operation::FillPath { brush, .. }
            | Operation::FillShape { brush, .. }
            | Operation::DrawMesh { brush, .. } => Some(brush),
            _ => None,
        }
    }

    /// Pen used by outline operations
    pub fn pen(&self) -> Option<&Pen> {
        match self {
            Operation::DrawLine { pen, .. }
            | Operation::DrawRect { pen, .. }
            | Operation::DrawRoundedRect { pen, .. }
            | Operation::DrawCircle { pen, .. }
            | Operation::DrawArc { pen, .. }
            | Operation::DrawPath { pen, .. }
            | Operation::DrawShape { pen, .. } => Some(pen),
            _ => None,
        }
    }

    /// Whether `other` may join the batch that `self` ends.
    ///
    /// Requires the same kind and the same paint binding. State and clear
    /// operations never batch; each is applied on its own.
    pub fn batchable_with(&self, other: &Operation) -> bool {
        let kind = self.kind();
        if kind != other.kind() || kind.is_state() || kind.is_clear() {
            return false;
        }
        match (self, other) {
            (Operation::DrawPixel { .. }, Operation::DrawPixel { .. }) => true,
            (Operation::DrawEntities { .. }, Operation::DrawEntities { .. }) => false,
            (Operation::DrawGlyph(a), Operation::DrawGlyph(b)) => {
                a.font == b.font
                    && a.appearance.effect_half_width() == b.appearance.effect_half_width()
            }
            (Operation::DrawMesh { transform: ta, .. }, Operation::DrawMesh { transform: tb, .. })
                if ta != tb =>
            {
                false
            }
            _ => match (self.brush(), other.brush()) {
                (Some(a), Some(b)) => a.shares_binding_with(b),
                _ => match (self.pen(), other.pen()) {
                    (Some(a), Some(b)) => a.shares_binding_with(b),
                    _ => false,
                },
            },
        }
    }
}
