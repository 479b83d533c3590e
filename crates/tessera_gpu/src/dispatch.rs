//! Batch dispatcher
//!
//! Consumes batches in submission order. State batches update the render
//! state; drawing batches first apply outstanding scissor/blend/smoothing
//! state once, then hand every operation of the batch to the renderer for
//! its kind, which emits geometry into the vertex array under a single
//! shader binding.

use smallvec::SmallVec;
use tessera_paint::{
    BlendingMode, Brush, Color, CornerRadius, LineStipple, LogicalCoordinateSystem,
    LogicalCoordinates, LogicalOperation, Mesh, Operation, OperationKind, Path, Point, Rect, Size,
    SmoothingMode, Transform2D,
};

use crate::backend::{ClearTarget, DeviceRect, RenderBackend};
use crate::clip::ClipCompositor;
use crate::config::RenderConfig;
use crate::error::{Checked, Result};
use crate::geometry::{self, Triangles};
use crate::glyph::GlyphAtlas;
use crate::shader::{ShaderBinder, ShaderBinding};
use crate::vertex::{PrimitiveMode, Vertex, VertexArray};

/// Context state changed by state operations
#[derive(Clone, Debug)]
pub struct RenderState {
    pub extents: Size,
    pub coordinate_system: LogicalCoordinateSystem,
    pub specified_coordinates: Option<LogicalCoordinates>,
    pub opacity: f32,
    pub blending: BlendingMode,
    pub smoothing: SmoothingMode,
    pub logical_operations: SmallVec<[LogicalOperation; 4]>,
    pub stipple: Option<LineStipple>,
    pub subpixel: bool,
    pending: Pending,
}

/// Backend state that must be applied before the next draw
#[derive(Clone, Copy, Debug, Default)]
struct Pending {
    scissor: bool,
    blend: bool,
    smoothing: bool,
}

impl RenderState {
    pub fn new(config: &RenderConfig) -> Self {
        Self {
            extents: Size::ZERO,
            coordinate_system: config.logical_coordinate_system,
            specified_coordinates: None,
            opacity: 1.0,
            blending: config.blending_mode,
            smoothing: config.smoothing_mode,
            logical_operations: SmallVec::new(),
            stipple: None,
            subpixel: config.subpixel_rendering,
            pending: Pending::default(),
        }
    }

    pub fn coordinates(&self) -> LogicalCoordinates {
        LogicalCoordinates::resolve(
            self.coordinate_system,
            self.extents,
            self.specified_coordinates,
        )
    }

    pub fn logical_operation(&self) -> LogicalOperation {
        self.logical_operations
            .last()
            .copied()
            .unwrap_or(LogicalOperation::None)
    }

    pub fn device_extents(&self) -> (u32, u32) {
        (
            self.extents.width.round().max(0.0) as u32,
            self.extents.height.round().max(0.0) as u32,
        )
    }

    /// Logical rect covering the whole target
    pub fn target_rect(&self) -> Rect {
        let coords = self.coordinates();
        Rect::from_points(coords.top_left(), coords.bottom_right())
    }

    /// Pixel rect covered by a logical rect
    pub fn to_device_rect(&self, rect: Rect) -> DeviceRect {
        let coords = self.coordinates();
        let a = coords.to_device(Point::new(rect.x, rect.y), self.extents);
        let b = coords.to_device(Point::new(rect.right(), rect.bottom()), self.extents);
        DeviceRect::covering(Rect::from_points(a, b), self.device_extents())
    }

    /// Mark every piece of backend state as needing to be applied
    pub fn invalidate(&mut self) {
        self.pending = Pending {
            scissor: true,
            blend: true,
            smoothing: true,
        };
    }

    fn color(&self, color: Color) -> Color {
        color.with_opacity(self.opacity)
    }

    /// Per-vertex color for geometry painted with `brush`
    fn brush_color(&self, brush: &Brush, color: Color) -> Color {
        match brush {
            // Gradient opacity travels in the uniforms
            Brush::Gradient(_) => Color::WHITE,
            _ => self.color(color),
        }
    }
}

/// Counters reported by a flush
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct FlushStats {
    pub operations: usize,
    pub batches: usize,
    pub draw_calls: usize,
    pub executions: usize,
}

impl std::ops::AddAssign for FlushStats {
    fn add_assign(&mut self, other: Self) {
        self.operations += other.operations;
        self.batches += other.batches;
        self.draw_calls += other.draw_calls;
        self.executions += other.executions;
    }
}

/// Borrowed rendering context used while draining the queue
pub(crate) struct Dispatcher<'a, B: RenderBackend> {
    pub backend: &'a mut B,
    pub vertices: &'a mut VertexArray,
    pub clip: &'a mut ClipCompositor,
    pub binder: &'a mut ShaderBinder,
    pub state: &'a mut RenderState,
    pub atlas: Option<&'a dyn GlyphAtlas>,
}

impl<'a, B: RenderBackend> Dispatcher<'a, B> {
    pub fn dispatch_batch(&mut self, ops: &[Operation]) -> Result<()> {
        let Some(first) = ops.first() else {
            return Ok(());
        };
        let kind = first.kind();
        tracing::trace!("dispatch {:?} x{}", kind, ops.len());

        if kind.is_state() {
            for op in ops {
                self.apply_state(op)?;
            }
            return Ok(());
        }
        if kind.is_clear() {
            for op in ops {
                self.clear(op)?;
            }
            return Ok(());
        }

        self.apply_pending_state()?;
        match kind {
            OperationKind::DrawPixel => self.draw_pixels(ops),
            OperationKind::DrawLine | OperationKind::DrawRect | OperationKind::DrawShape => {
                self.draw_segments(ops)
            }
            OperationKind::DrawRoundedRect
            | OperationKind::DrawCircle
            | OperationKind::DrawArc
            | OperationKind::DrawPath => self.draw_curves(ops),
            OperationKind::FillRect
            | OperationKind::FillRoundedRect
            | OperationKind::FillCircle
            | OperationKind::FillArc
            | OperationKind::FillPath
            | OperationKind::FillShape => self.fill(ops),
            OperationKind::DrawMesh => self.draw_meshes(ops),
            OperationKind::DrawEntities => self.draw_entities(ops),
            OperationKind::DrawGlyph => self.draw_glyphs(ops),
            other => unreachable!("{:?} is neither state, clear nor draw", other),
        }
    }

    // ─────────────────────────────────────────────────────────────────────────
    // State
    // ─────────────────────────────────────────────────────────────────────────

    fn apply_state(&mut self, op: &Operation) -> Result<()> {
        match op {
            Operation::SetLogicalCoordinateSystem(system) => {
                self.state.coordinate_system = *system;
                self.upload_projection()?;
            }
            Operation::SetLogicalCoordinates(coordinates) => {
                self.state.coordinate_system = LogicalCoordinateSystem::Specified;
                self.state.specified_coordinates = Some(*coordinates);
                self.upload_projection()?;
            }
            Operation::ScissorOn(rect) => {
                self.clip.scissor_on(*rect);
                self.state.pending.scissor = true;
            }
            Operation::ScissorOff => {
                self.clip.scissor_off();
                self.state.pending.scissor = true;
            }
            Operation::ClipToRect(rect) => {
                self.clip_to(geometry::quad(*rect).to_vec())?;
            }
            Operation::ClipToPath(path) => {
                self.clip_to(geometry::tessellate_fill(path).positions)?;
            }
            Operation::ResetClip => self.reset_clip()?,
            Operation::SetOpacity(opacity) => {
                self.state.opacity = opacity.clamp(0.0, 1.0);
            }
            Operation::SetBlendingMode(mode) => {
                self.state.blending = *mode;
                self.state.pending.blend = true;
            }
            Operation::SetSmoothingMode(mode) => {
                self.state.smoothing = *mode;
                self.state.pending.smoothing = true;
            }
            Operation::PushLogicalOperation(operation) => {
                self.state.logical_operations.push(*operation);
                self.state.pending.blend = true;
            }
            Operation::PopLogicalOperation => {
                if self.state.logical_operations.pop().is_none() {
                    tracing::warn!("PopLogicalOperation on an empty stack");
                }
                self.state.pending.blend = true;
            }
            Operation::LineStippleOn(stipple) => self.state.stipple = Some(*stipple),
            Operation::LineStippleOff => self.state.stipple = None,
            Operation::SubpixelRenderingOn => {
                if !self.binder.subpixel_available() {
                    tracing::warn!("subpixel rendering requested but unavailable");
                }
                self.state.subpixel = true;
            }
            Operation::SubpixelRenderingOff => self.state.subpixel = false,
            other => unreachable!("{:?} is not a state operation", other.kind()),
        }
        Ok(())
    }

    /// Apply scissor, blend and smoothing changes recorded since the last draw
    pub fn apply_pending_state(&mut self) -> Result<()> {
        let pending = self.state.pending;
        if !(pending.scissor || pending.blend || pending.smoothing) {
            return Ok(());
        }
        if self.vertices.pending() > 0 {
            self.vertices.execute(self.backend)?;
        }
        if pending.scissor {
            let scissor = self
                .clip
                .effective_scissor()
                .map(|rect| self.state.to_device_rect(rect));
            self.backend.set_scissor(scissor).checked("set_scissor")?;
        }
        if pending.blend {
            self.backend
                .set_blend(self.state.blending, self.state.logical_operation())
                .checked("set_blend")?;
        }
        if pending.smoothing {
            self.backend
                .set_smoothing(self.state.smoothing)
                .checked("set_smoothing")?;
        }
        self.state.pending = Pending::default();
        Ok(())
    }

    pub fn upload_projection(&mut self) -> Result<()> {
        if self.vertices.pending() > 0 {
            self.vertices.execute(self.backend)?;
        }
        let projection = self.state.coordinates().projection();
        self.backend
            .set_projection(projection)
            .checked("set_projection")?;
        // Scissor rects are stored in logical units
        self.state.pending.scissor = true;
        Ok(())
    }

    fn clip_to(&mut self, mask: Vec<Point>) -> Result<()> {
        self.apply_pending_state()?;
        if self.vertices.pending() > 0 {
            self.vertices.execute(self.backend)?;
        }
        let Self {
            backend,
            vertices,
            clip,
            binder,
            ..
        } = self;
        clip.clip_to(&mut **backend, |backend| {
            paint_mask(vertices, binder, backend, &mask)
        })
    }

    fn reset_clip(&mut self) -> Result<()> {
        self.apply_pending_state()?;
        if self.vertices.pending() > 0 {
            self.vertices.execute(self.backend)?;
        }
        let cover = geometry::quad(self.state.target_rect());
        let Self {
            backend,
            vertices,
            clip,
            binder,
            ..
        } = self;
        clip.reset_clip(&mut **backend, |backend| {
            paint_mask(vertices, binder, backend, &cover)
        })
    }

    fn clear(&mut self, op: &Operation) -> Result<()> {
        if self.vertices.pending() > 0 {
            self.vertices.execute(self.backend)?;
        }
        let target = match op {
            Operation::Clear(color) => ClearTarget::Color(*color),
            Operation::ClearDepthBuffer => ClearTarget::Depth(1.0),
            Operation::ClearStencilBuffer => {
                if self.clip.stencil_enabled() {
                    tracing::warn!(
                        "clearing the stencil buffer inside {} clip regions",
                        self.clip.depth()
                    );
                }
                ClearTarget::Stencil(0)
            }
            other => unreachable!("{:?} is not a clear operation", other.kind()),
        };
        self.backend.clear(target).checked("clear")
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Drawing
    // ─────────────────────────────────────────────────────────────────────────

    fn draw_pixels(&mut self, ops: &[Operation]) -> Result<()> {
        self.binder
            .bind(self.vertices, self.backend, ShaderBinding::Solid)?;
        self.vertices.set_mode(self.backend, PrimitiveMode::Points)?;
        for op in ops {
            let Operation::DrawPixel { point, color } = op else {
                unreachable!("{:?} in a pixel batch", op.kind());
            };
            let color = self.state.color(*color);
            self.vertices
                .emplace_back(self.backend, *point, color, None)?;
        }
        Ok(())
    }

    /// Straight outlines: lines, rect outlines and polygons, honoring the
    /// line stipple
    fn draw_segments(&mut self, ops: &[Operation]) -> Result<()> {
        let Some(pen) = ops[0].pen() else {
            unreachable!("{:?} carries no pen", ops[0].kind());
        };
        let binding = self.binder.binding_for(&pen.brush, self.state.opacity);
        let state = self.state.clone();

        self.paint(binding, |vertices, backend| {
            for op in ops {
                let (segments, pen) = match op {
                    Operation::DrawLine { from, to, pen } => (vec![(*from, *to)], pen),
                    Operation::DrawRect { rect, pen } => {
                        (geometry::rect_segments(*rect).to_vec(), pen)
                    }
                    Operation::DrawShape { shape, pen } => {
                        (geometry::polygon_segments(&shape.points), pen)
                    }
                    other => unreachable!("{:?} in a segment batch", other.kind()),
                };
                let segments: Vec<(Point, Point)> = match &state.stipple {
                    Some(stipple) => segments
                        .into_iter()
                        .flat_map(|(a, b)| geometry::stipple_segments(a, b, stipple))
                        .collect(),
                    None => segments,
                };
                let color = state.brush_color(&pen.brush, pen.brush.vertex_color());
                let bounds = bounds_of(segments.iter().flat_map(|(a, b)| [*a, *b]));
                let uv = brush_uv(&pen.brush);

                if pen.width <= 1.0 {
                    vertices.set_mode(backend, PrimitiveMode::Lines)?;
                    let mut line = Vec::with_capacity(segments.len() * 2);
                    for (a, b) in segments {
                        line.push(vertex(a, color, &bounds, &uv));
                        line.push(vertex(b, color, &bounds, &uv));
                    }
                    vertices.insert(backend, &line)?;
                } else {
                    vertices.set_mode(backend, PrimitiveMode::Triangles)?;
                    let mut quads = Vec::with_capacity(segments.len() * 6);
                    for (a, b) in segments {
                        if let Some(quad) = geometry::line_quad(a, b, pen.width) {
                            quads.extend(quad.iter().map(|p| vertex(*p, color, &bounds, &uv)));
                        }
                    }
                    vertices.insert(backend, &quads)?;
                }
            }
            Ok(())
        })
    }

    /// Curved outlines stroked through lyon
    fn draw_curves(&mut self, ops: &[Operation]) -> Result<()> {
        let Some(pen) = ops[0].pen() else {
            unreachable!("{:?} carries no pen", ops[0].kind());
        };
        let binding = self.binder.binding_for(&pen.brush, self.state.opacity);
        let state = self.state.clone();

        self.paint(binding, |vertices, backend| {
            vertices.set_mode(backend, PrimitiveMode::Triangles)?;
            for op in ops {
                let (triangles, pen) = match op {
                    Operation::DrawRoundedRect { rect, pen } => (
                        geometry::tessellate_stroke(&geometry::rounded_rect_path(rect), pen),
                        pen,
                    ),
                    Operation::DrawCircle { circle, pen } => (
                        geometry::tessellate_stroke(
                            &Path::circle(circle.center, circle.radius),
                            pen,
                        ),
                        pen,
                    ),
                    Operation::DrawArc { arc, pen } => (
                        geometry::tessellate_stroke(&geometry::arc_path(arc), pen),
                        pen,
                    ),
                    Operation::DrawPath { path, pen } => {
                        (geometry::tessellate_stroke(path, pen), pen)
                    }
                    other => unreachable!("{:?} in a curve batch", other.kind()),
                };
                let color = state.brush_color(&pen.brush, pen.brush.vertex_color());
                emit_triangles(vertices, backend, &triangles, color, &pen.brush, None)?;
            }
            Ok(())
        })
    }

    fn fill(&mut self, ops: &[Operation]) -> Result<()> {
        let Some(brush) = ops[0].brush() else {
            unreachable!("{:?} carries no brush", ops[0].kind());
        };
        let binding = self.binder.binding_for(brush, self.state.opacity);
        let state = self.state.clone();

        self.paint(binding, |vertices, backend| {
            vertices.set_mode(backend, PrimitiveMode::Triangles)?;
            for op in ops {
                let (triangles, bounds, brush) = fill_geometry(op);
                let color = state.brush_color(brush, brush.vertex_color());
                emit_triangles(vertices, backend, &triangles, color, brush, Some(bounds))?;
            }
            Ok(())
        })
    }

    fn draw_meshes(&mut self, ops: &[Operation]) -> Result<()> {
        let Operation::DrawMesh {
            brush, transform, ..
        } = &ops[0]
        else {
            unreachable!("{:?} in a mesh batch", ops[0].kind());
        };
        let binding = self.binder.binding_for(brush, self.state.opacity);
        let transform = transform.as_ref().map(Transform2D::to_mat4);
        let state = self.state.clone();

        self.vertices.set_transformation(self.backend, transform)?;
        let result = self.paint(binding, |vertices, backend| {
            for op in ops {
                let Operation::DrawMesh { mesh, brush, .. } = op else {
                    unreachable!("{:?} in a mesh batch", op.kind());
                };
                emit_mesh(vertices, backend, mesh, brush, &state)?;
            }
            Ok(())
        });
        self.vertices.set_transformation(self.backend, None)?;
        result
    }

    fn draw_entities(&mut self, ops: &[Operation]) -> Result<()> {
        let state = self.state.clone();
        for op in ops {
            let Operation::DrawEntities { entities } = op else {
                unreachable!("{:?} in an entity batch", op.kind());
            };
            for entity in entities {
                let binding = self.binder.binding_for(&entity.brush, state.opacity);
                self.vertices
                    .set_transformation(self.backend, Some(entity.transform.to_mat4()))?;
                self.paint(binding, |vertices, backend| {
                    emit_mesh(vertices, backend, &entity.mesh, &entity.brush, &state)
                })?;
            }
        }
        self.vertices.set_transformation(self.backend, None)
    }

    /// Run `emit` under `binding`. Solid geometry stays pending so that
    /// consecutive solid batches share draw calls; other programs are
    /// drawn and the solid program restored when `emit` returns.
    pub fn paint<F>(&mut self, binding: ShaderBinding, emit: F) -> Result<()>
    where
        F: FnOnce(&mut VertexArray, &mut B) -> Result<()>,
    {
        if binding == ShaderBinding::Solid {
            self.binder.bind(self.vertices, self.backend, binding)?;
            emit(&mut *self.vertices, &mut *self.backend)
        } else {
            self.binder
                .with_program(self.vertices, self.backend, binding, emit)
        }
    }
}

/// Draw mask geometry with the solid program and leave nothing pending
fn paint_mask<B: RenderBackend>(
    vertices: &mut VertexArray,
    binder: &mut ShaderBinder,
    backend: &mut B,
    mask: &[Point],
) -> Result<()> {
    binder.bind(vertices, backend, ShaderBinding::Solid)?;
    vertices.set_mode(backend, PrimitiveMode::Triangles)?;
    let mask: Vec<Vertex> = mask.iter().map(|p| Vertex::new(*p, Color::WHITE)).collect();
    vertices.insert(backend, &mask)?;
    vertices.execute(backend)
}

/// Triangles, bounds and brush of a fill operation
fn fill_geometry(op: &Operation) -> (Triangles, Rect, &Brush) {
    match op {
        Operation::FillRect { rect, brush } => (
            Triangles {
                positions: geometry::quad(*rect).to_vec(),
            },
            *rect,
            brush,
        ),
        Operation::FillRoundedRect { rect, brush } => {
            let triangles = if rect.corner_radius == CornerRadius::ZERO {
                Triangles {
                    positions: geometry::quad(rect.rect).to_vec(),
                }
            } else {
                geometry::tessellate_fill(&geometry::rounded_rect_path(rect))
            };
            (triangles, rect.rect, brush)
        }
        Operation::FillCircle { circle, brush } => (
            geometry::tessellate_fill(&Path::circle(circle.center, circle.radius)),
            circle.bounding_rect(),
            brush,
        ),
        Operation::FillArc { arc, brush } => {
            let path = geometry::pie_path(arc);
            let bounds = path.bounding_rect().unwrap_or_default();
            (geometry::tessellate_fill(&path), bounds, brush)
        }
        Operation::FillPath { path, brush } => (
            geometry::tessellate_fill(path),
            path.bounding_rect().unwrap_or_default(),
            brush,
        ),
        Operation::FillShape { shape, brush } => {
            let path = shape.to_path();
            let bounds = path.bounding_rect().unwrap_or_default();
            (geometry::tessellate_fill(&path), bounds, brush)
        }
        other => unreachable!("{:?} in a fill batch", other.kind()),
    }
}

fn emit_triangles<B: RenderBackend>(
    vertices: &mut VertexArray,
    backend: &mut B,
    triangles: &Triangles,
    color: Color,
    brush: &Brush,
    bounds: Option<Rect>,
) -> Result<()> {
    if triangles.is_empty() {
        return Ok(());
    }
    let bounds = bounds.unwrap_or_else(|| bounds_of(triangles.positions.iter().copied()));
    let uv = brush_uv(brush);
    let out: Vec<Vertex> = triangles
        .positions
        .iter()
        .map(|p| vertex(*p, color, &bounds, &uv))
        .collect();
    vertices.insert(backend, &out)
}

fn emit_mesh<B: RenderBackend>(
    vertices: &mut VertexArray,
    backend: &mut B,
    mesh: &Mesh,
    brush: &Brush,
    state: &RenderState,
) -> Result<()> {
    let count = mesh.vertex_count() - mesh.vertex_count() % 3;
    if count < mesh.vertex_count() {
        tracing::warn!(
            "mesh has {} vertices, ignoring the incomplete last triangle",
            mesh.vertex_count()
        );
    }
    let bounds = bounds_of(mesh.positions.iter().copied());
    let uv = brush_uv(brush);
    let base = brush.vertex_color();

    let out: Vec<Vertex> = (0..count)
        .map(|i| {
            let position = mesh.positions[i];
            let color = state.brush_color(
                brush,
                mesh.colors
                    .as_ref()
                    .and_then(|c| c.get(i).copied())
                    .unwrap_or(base),
            );
            let uv = mesh
                .uvs
                .as_ref()
                .and_then(|uvs| uvs.get(i).copied())
                .unwrap_or_else(|| geometry::map_uv(position, &bounds, &uv));
            Vertex::textured(position, color, uv)
        })
        .collect();

    vertices.set_mode(backend, PrimitiveMode::Triangles)?;
    vertices.insert(backend, &out)
}

/// Normalized texture rect sampled by a brush
fn brush_uv(brush: &Brush) -> Rect {
    match brush {
        Brush::Texture(paint) => paint.source.unwrap_or(Rect::new(0.0, 0.0, 1.0, 1.0)),
        _ => Rect::new(0.0, 0.0, 1.0, 1.0),
    }
}

fn vertex(p: Point, color: Color, bounds: &Rect, uv: &Rect) -> Vertex {
    Vertex::textured(p, color, geometry::map_uv(p, bounds, uv))
}

fn bounds_of(points: impl Iterator<Item = Point>) -> Rect {
    let mut min = Point::new(f32::MAX, f32::MAX);
    let mut max = Point::new(f32::MIN, f32::MIN);
    let mut any = false;
    for p in points {
        min.x = min.x.min(p.x);
        min.y = min.y.min(p.y);
        max.x = max.x.max(p.x);
        max.y = max.y.max(p.y);
        any = true;
    }
    if any {
        Rect::from_points(min, max)
    } else {
        Rect::default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_device_rect_follows_coordinate_system() {
        let config = RenderConfig::default();
        let mut state = RenderState::new(&config);
        state.extents = Size::new(100.0, 50.0);
        let rect = Rect::new(10.0, 0.0, 20.0, 10.0);
        assert_eq!(state.to_device_rect(rect), DeviceRect::new(10, 0, 20, 10));

        // Y up: logical y 0..10 is the bottom of the target
        state.coordinate_system = LogicalCoordinateSystem::AutomaticGame;
        assert_eq!(state.to_device_rect(rect), DeviceRect::new(10, 40, 20, 10));
    }

    #[test]
    fn test_logical_operation_stack_top() {
        let mut state = RenderState::new(&RenderConfig::default());
        assert_eq!(state.logical_operation(), LogicalOperation::None);
        state.logical_operations.push(LogicalOperation::Xor);
        assert_eq!(state.logical_operation(), LogicalOperation::Xor);
    }

    #[test]
    fn test_bounds_of() {
        let bounds = bounds_of([Point::new(3.0, 4.0), Point::new(-1.0, 8.0)].into_iter());
        assert_eq!(bounds, Rect::new(-1.0, 4.0, 4.0, 4.0));
        assert_eq!(bounds_of(std::iter::empty()), Rect::default());
    }
}
