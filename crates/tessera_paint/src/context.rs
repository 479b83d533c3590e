//! Paint context - records drawing operations
//!
//! Widgets draw through a [`PaintContext`]; the recorded operations are later
//! handed to a rendering context which batches and draws them.

use crate::brush::{Brush, Pen};
use crate::color::Color;
use crate::coordinates::{LogicalCoordinateSystem, LogicalCoordinates};
use crate::glyph::{FontId, Glyph, GlyphAppearance};
use crate::operation::{
    BlendingMode, Entity, GlyphDraw, LineStipple, LogicalOperation, Mesh, Operation, Shape,
    SmoothingMode,
};
use crate::path::{Path, Point};
use crate::primitives::*;

/// The paint context used for custom drawing
pub struct PaintContext {
    operations: Vec<Operation>,
    clip_depth: usize,
    scissor_depth: usize,
    logical_operation_depth: usize,
}

impl PaintContext {
    pub fn new() -> Self {
        Self {
            operations: Vec::new(),
            clip_depth: 0,
            scissor_depth: 0,
            logical_operation_depth: 0,
        }
    }

    /// Get all recorded operations
    pub fn operations(&self) -> &[Operation] {
        &self.operations
    }

    /// Take ownership of recorded operations
    pub fn take_operations(&mut self) -> Vec<Operation> {
        std::mem::take(&mut self.operations)
    }

    pub fn push(&mut self, operation: Operation) {
        self.operations.push(operation);
    }

    /// Number of `clip_to_*` calls not yet matched by `reset_clip`
    pub fn clip_depth(&self) -> usize {
        self.clip_depth
    }

    pub fn scissor_depth(&self) -> usize {
        self.scissor_depth
    }

    // === State ===

    pub fn set_logical_coordinate_system(&mut self, system: LogicalCoordinateSystem) {
        self.push(Operation::SetLogicalCoordinateSystem(system));
    }

    pub fn set_logical_coordinates(&mut self, coordinates: LogicalCoordinates) {
        self.push(Operation::SetLogicalCoordinates(coordinates));
    }

    pub fn set_opacity(&mut self, opacity: f32) {
        self.push(Operation::SetOpacity(opacity.clamp(0.0, 1.0)));
    }

    pub fn set_blending_mode(&mut self, mode: BlendingMode) {
        self.push(Operation::SetBlendingMode(mode));
    }

    pub fn set_smoothing_mode(&mut self, mode: SmoothingMode) {
        self.push(Operation::SetSmoothingMode(mode));
    }

    pub fn push_logical_operation(&mut self, op: LogicalOperation) {
        self.logical_operation_depth += 1;
        self.push(Operation::PushLogicalOperation(op));
    }

    pub fn pop_logical_operation(&mut self) {
        debug_assert!(self.logical_operation_depth > 0, "unbalanced logical operation");
        self.logical_operation_depth = self.logical_operation_depth.saturating_sub(1);
        self.push(Operation::PopLogicalOperation);
    }

    pub fn line_stipple_on(&mut self, factor: u32, pattern: u16) {
        self.push(Operation::LineStippleOn(LineStipple::new(factor, pattern)));
    }

    pub fn line_stipple_off(&mut self) {
        self.push(Operation::LineStippleOff);
    }

    pub fn set_subpixel_rendering(&mut self, enabled: bool) {
        self.push(if enabled {
            Operation::SubpixelRenderingOn
        } else {
            Operation::SubpixelRenderingOff
        });
    }

    // === Clipping ===

    pub fn scissor_on(&mut self, rect: Rect) {
        self.scissor_depth += 1;
        self.push(Operation::ScissorOn(rect));
    }

    pub fn scissor_off(&mut self) {
        debug_assert!(self.scissor_depth > 0, "unbalanced scissor_off");
        self.scissor_depth = self.scissor_depth.saturating_sub(1);
        self.push(Operation::ScissorOff);
    }

    pub fn clip_to_rect(&mut self, rect: Rect) {
        self.clip_depth += 1;
        self.push(Operation::ClipToRect(rect));
    }

    pub fn clip_to_path(&mut self, path: Path) {
        self.clip_depth += 1;
        self.push(Operation::ClipToPath(path));
    }

    pub fn reset_clip(&mut self) {
        debug_assert!(self.clip_depth > 0, "reset_clip without matching clip_to");
        self.clip_depth = self.clip_depth.saturating_sub(1);
        self.push(Operation::ResetClip);
    }

    // === Clears ===

    pub fn clear(&mut self, color: Color) {
        self.push(Operation::Clear(color));
    }

    pub fn clear_depth_buffer(&mut self) {
        self.push(Operation::ClearDepthBuffer);
    }

    pub fn clear_stencil_buffer(&mut self) {
        self.push(Operation::ClearStencilBuffer);
    }

    // === Shape drawing ===

    pub fn draw_pixel(&mut self, point: Point, color: Color) {
        self.push(Operation::DrawPixel { point, color });
    }

    pub fn draw_line(&mut self, from: Point, to: Point, pen: Pen) {
        self.push(Operation::DrawLine { from, to, pen });
    }

    pub fn draw_rect(&mut self, rect: Rect, pen: Pen) {
        self.push(Operation::DrawRect { rect, pen });
    }

    pub fn draw_rounded_rect(&mut self, rect: Rect, radius: f32, pen: Pen) {
        self.push(Operation::DrawRoundedRect {
            rect: RoundedRect::new(rect, radius),
            pen,
        });
    }

    pub fn draw_circle(&mut self, center: Point, radius: f32, pen: Pen) {
        self.push(Operation::DrawCircle {
            circle: Circle::new(center, radius),
            pen,
        });
    }

    pub fn draw_arc(&mut self, arc: Arc, pen: Pen) {
        self.push(Operation::DrawArc { arc, pen });
    }

    pub fn draw_path(&mut self, path: Path, pen: Pen) {
        self.push(Operation::DrawPath { path, pen });
    }

    pub fn draw_shape(&mut self, points: Vec<Point>, pen: Pen) {
        self.push(Operation::DrawShape {
            shape: Shape::new(points),
            pen,
        });
    }

    pub fn draw_mesh(&mut self, mesh: Mesh, brush: impl Into<Brush>, transform: Option<Transform2D>) {
        self.push(Operation::DrawMesh {
            mesh,
            brush: brush.into(),
            transform,
        });
    }

    pub fn draw_entities(&mut self, entities: Vec<Entity>) {
        if entities.is_empty() {
            return;
        }
        self.push(Operation::DrawEntities { entities });
    }

    pub fn fill_rect(&mut self, rect: Rect, brush: impl Into<Brush>) {
        self.push(Operation::FillRect {
            rect,
            brush: brush.into(),
        });
    }

    pub fn fill_rounded_rect(&mut self, rect: Rect, radius: f32, brush: impl Into<Brush>) {
        self.push(Operation::FillRoundedRect {
            rect: RoundedRect::new(rect, radius),
            brush: brush.into(),
        });
    }

    pub fn fill_circle(&mut self, center: Point, radius: f32, brush: impl Into<Brush>) {
        self.push(Operation::FillCircle {
            circle: Circle::new(center, radius),
            brush: brush.into(),
        });
    }

    pub fn fill_arc(&mut self, arc: Arc, brush: impl Into<Brush>) {
        self.push(Operation::FillArc {
            arc,
            brush: brush.into(),
        });
    }

    pub fn fill_path(&mut self, path: Path, brush: impl Into<Brush>) {
        self.push(Operation::FillPath {
            path,
            brush: brush.into(),
        });
    }

    pub fn fill_shape(&mut self, points: Vec<Point>, brush: impl Into<Brush>) {
        self.push(Operation::FillShape {
            shape: Shape::new(points),
            brush: brush.into(),
        });
    }

    // === Text ===

    /// Record one `DrawGlyph` per glyph, advancing the pen along the baseline.
    ///
    /// Returns the pen position after the last glyph.
    pub fn draw_glyphs(
        &mut self,
        origin: Point,
        glyphs: &[Glyph],
        font: FontId,
        appearance: GlyphAppearance,
    ) -> Point {
        let mut pen = origin;
        for glyph in glyphs {
            self.push(Operation::DrawGlyph(GlyphDraw {
                position: pen,
                glyph: *glyph,
                font,
                appearance,
            }));
            pen = pen.offset(glyph.advance.width, glyph.advance.height);
        }
        pen
    }
}

impl Default for PaintContext {
    fn default() -> Self {
        Self::new()
    }
}
