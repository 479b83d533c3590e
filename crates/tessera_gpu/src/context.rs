//! Rendering context
//!
//! Owns the operation queue together with everything a flush borrows: the
//! render backend, the vertex array, the clip compositor, the shader binder
//! and the render state. Widgets enqueue operations (directly or through a
//! [`PaintContext`]); the context drains them batch by batch on `flush`.
//!
//! [`RenderingContext::render`] is the render-loop boundary: a failing frame
//! is logged and dropped, and the next frame starts from a clean state.

use std::ops::{Deref, DerefMut};

use tessera_paint::{
    FontId, GlyphAppearance, GlyphDraw, Operation, PaintContext, Path, Point, Rect, Size,
    TextureId,
};
use tessera_text::{ShapingEngine, TextShaper};

use crate::backend::{RenderBackend, StencilState};
use crate::clip::ClipCompositor;
use crate::config::{log_render_config, RenderConfig};
use crate::dispatch::{Dispatcher, FlushStats, RenderState};
use crate::error::{Checked, Result};
use crate::glyph::GlyphAtlas;
use crate::queue::OperationQueue;
use crate::shader::ShaderBinder;
use crate::vertex::VertexArray;

/// Batched 2D rendering on top of a [`RenderBackend`]
pub struct RenderingContext<B: RenderBackend> {
    backend: B,
    config: RenderConfig,
    queue: OperationQueue,
    vertices: VertexArray,
    clip: ClipCompositor,
    binder: ShaderBinder,
    state: RenderState,
    atlas: Option<Box<dyn GlyphAtlas>>,
    render_target: Option<TextureId>,
    in_frame: bool,
    frame_stats: FlushStats,
}

impl<B: RenderBackend> RenderingContext<B> {
    /// Create a context, preparing every shader program on `backend`.
    ///
    /// Environment overrides are applied to `config` first.
    pub fn new(mut backend: B, config: RenderConfig) -> Result<Self> {
        let config = config.with_env_overrides();
        log_render_config(&config);

        let binder = ShaderBinder::new(&mut backend)?;
        if config.subpixel_rendering && !binder.subpixel_available() {
            tracing::warn!("subpixel rendering unavailable, using grayscale glyph coverage");
        }

        Ok(Self {
            backend,
            queue: OperationQueue::new(config.vertex_capacity),
            vertices: VertexArray::new(config.vertex_capacity),
            clip: ClipCompositor::new(),
            binder,
            state: RenderState::new(&config),
            atlas: None,
            render_target: None,
            in_frame: false,
            frame_stats: FlushStats::default(),
            config,
        })
    }

    pub fn with_glyph_atlas(mut self, atlas: impl GlyphAtlas + 'static) -> Self {
        self.atlas = Some(Box::new(atlas));
        self
    }

    pub fn set_glyph_atlas(&mut self, atlas: Option<Box<dyn GlyphAtlas>>) {
        self.atlas = atlas;
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    pub fn backend_mut(&mut self) -> &mut B {
        &mut self.backend
    }

    pub fn into_backend(self) -> B {
        self.backend
    }

    pub fn config(&self) -> &RenderConfig {
        &self.config
    }

    pub fn queue(&self) -> &OperationQueue {
        &self.queue
    }

    pub fn vertices(&self) -> &VertexArray {
        &self.vertices
    }

    pub fn state(&self) -> &RenderState {
        &self.state
    }

    pub fn clip_depth(&self) -> usize {
        self.clip.depth()
    }

    pub fn scissor_depth(&self) -> usize {
        self.clip.scissor_depth()
    }

    pub fn subpixel_available(&self) -> bool {
        self.binder.subpixel_available()
    }

    pub fn in_frame(&self) -> bool {
        self.in_frame
    }

    /// Logical point to target pixels under the current coordinate system
    pub fn logical_to_device(&self, point: Point) -> Point {
        self.state
            .coordinates()
            .to_device(point, self.state.extents)
    }

    pub fn device_to_logical(&self, point: Point) -> Point {
        self.state
            .coordinates()
            .to_logical(point, self.state.extents)
    }

    fn dispatcher(&mut self) -> Dispatcher<'_, B> {
        Dispatcher {
            backend: &mut self.backend,
            vertices: &mut self.vertices,
            clip: &mut self.clip,
            binder: &mut self.binder,
            state: &mut self.state,
            atlas: self.atlas.as_deref(),
        }
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Queue
    // ─────────────────────────────────────────────────────────────────────────

    /// Queue an operation, flushing first when the queue is full
    pub fn enqueue(&mut self, op: Operation) -> Result<()> {
        if self.queue.len() >= self.config.max_queue_len {
            tracing::trace!("queue full ({} operations), flushing", self.queue.len());
            self.flush()?;
        }
        self.queue.enqueue(op);
        Ok(())
    }

    pub fn enqueue_all(&mut self, ops: impl IntoIterator<Item = Operation>) -> Result<()> {
        for op in ops {
            self.enqueue(op)?;
        }
        Ok(())
    }

    /// Queue everything recorded by a paint context
    pub fn enqueue_paint(&mut self, paint: &mut PaintContext) -> Result<()> {
        self.enqueue_all(paint.take_operations())
    }

    /// Shape `text` and queue its glyphs in drawing order starting at
    /// `origin` on the baseline; returns the pen position after the text
    pub fn draw_text<E: ShapingEngine>(
        &mut self,
        shaper: &TextShaper<E>,
        text: &str,
        font: FontId,
        origin: Point,
        appearance: GlyphAppearance,
    ) -> Result<Point> {
        let shaped = shaper.shape(text, font)?;
        let mut pen = origin;
        for glyph in shaped.visual_glyphs() {
            let Some(glyph_font) = shaped.font_for(&glyph) else {
                continue;
            };
            self.enqueue(Operation::DrawGlyph(GlyphDraw {
                position: pen,
                glyph,
                font: glyph_font,
                appearance,
            }))?;
            pen = pen.offset(glyph.advance.width, glyph.advance.height);
        }
        Ok(pen)
    }

    /// Dispatch every queued batch in submission order
    pub fn flush(&mut self) -> Result<FlushStats> {
        if self.queue.is_empty() {
            return Ok(FlushStats::default());
        }
        let (operations, batches) = self.queue.drain();
        let draw_calls = self.vertices.draw_calls();
        let executions = self.vertices.executions();

        let result = {
            let mut dispatcher = self.dispatcher();
            batches
                .iter()
                .try_for_each(|batch| dispatcher.dispatch_batch(&operations[batch.range()]))
                .and_then(|()| dispatcher.vertices.execute(dispatcher.backend))
        };
        if let Err(err) = result {
            self.vertices.discard();
            return Err(err);
        }

        let stats = FlushStats {
            operations: operations.len(),
            batches: batches.len(),
            draw_calls: self.vertices.draw_calls() - draw_calls,
            executions: self.vertices.executions() - executions,
        };
        self.frame_stats += stats;
        tracing::debug!(
            "flush: {} operations in {} batches, {} draw calls, {} executions",
            stats.operations,
            stats.batches,
            stats.draw_calls,
            stats.executions
        );
        Ok(stats)
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Frames
    // ─────────────────────────────────────────────────────────────────────────

    /// Start a frame on a target of `extents` logical units.
    ///
    /// Backend state is assumed unknown: projection, transformation and
    /// stencil are uploaded and everything else is applied before the first
    /// draw.
    pub fn begin_frame(&mut self, extents: Size) -> Result<()> {
        if self.in_frame {
            tracing::warn!("begin_frame inside a frame, dropping the previous one");
            self.drop_frame();
        }
        self.state.extents = extents;
        self.backend
            .begin_frame(self.state.device_extents())
            .checked("begin_frame")?;
        self.in_frame = true;
        self.frame_stats = FlushStats::default();
        self.render_target = None;

        self.state.invalidate();
        self.binder.invalidate();
        self.backend
            .set_stencil(self.clip.stencil_state())
            .checked("set_stencil")?;
        self.backend
            .set_transform(self.vertices.transformation().copied())
            .checked("set_transform")?;
        self.dispatcher().upload_projection()
    }

    /// Flush and submit the frame; returns the statistics of every flush
    /// since `begin_frame`
    pub fn end_frame(&mut self) -> Result<FlushStats> {
        self.flush()?;
        if self.clip.depth() > 0 || self.clip.scissor_depth() > 0 {
            tracing::warn!(
                "frame ended with clip depth {} and scissor depth {}",
                self.clip.depth(),
                self.clip.scissor_depth()
            );
        }
        self.backend.end_frame().checked("end_frame")?;
        self.in_frame = false;
        Ok(self.frame_stats)
    }

    /// Render one frame.
    ///
    /// `paint` enqueues the frame's operations. With an `invalidated` rect
    /// drawing is scissored to it. On error the frame is dropped and the
    /// error returned; the context is ready for the next frame.
    pub fn render<F>(
        &mut self,
        extents: Size,
        invalidated: Option<Rect>,
        paint: F,
    ) -> Result<FlushStats>
    where
        F: FnOnce(&mut Self) -> Result<()>,
    {
        let result = self.render_frame(extents, invalidated, paint);
        if let Err(err) = &result {
            tracing::error!("frame dropped: {}", err);
            self.drop_frame();
        }
        result
    }

    fn render_frame<F>(
        &mut self,
        extents: Size,
        invalidated: Option<Rect>,
        paint: F,
    ) -> Result<FlushStats>
    where
        F: FnOnce(&mut Self) -> Result<()>,
    {
        self.begin_frame(extents)?;
        if let Some(rect) = invalidated {
            self.enqueue(Operation::ScissorOn(rect))?;
        }
        paint(self)?;
        if invalidated.is_some() {
            self.enqueue(Operation::ScissorOff)?;
        }
        self.end_frame()
    }

    /// Forget everything queued or staged for the current frame and put the
    /// backend back into its default state
    fn drop_frame(&mut self) {
        self.queue.clear();
        self.vertices.discard();
        self.clip.reset();
        self.state = RenderState::new(&self.config);
        self.binder.invalidate();

        if self.in_frame {
            let restore = self
                .backend
                .set_stencil(StencilState::Disabled)
                .and_then(|()| self.backend.set_scissor(None))
                .and_then(|()| self.backend.set_render_target(None))
                .and_then(|()| self.backend.end_frame());
            if let Err(err) = restore {
                tracing::warn!("failed to reset backend state: {}", err);
            }
            self.in_frame = false;
        }
        self.render_target = None;
    }

    /// Render into `target` (a texture of `extents` logical units) for the
    /// duration of `f`.
    ///
    /// The queue is flushed before switching and again before switching
    /// back, so operations land on the target they were enqueued for.
    /// Clip and scissor regions of the current target are suspended while
    /// `f` runs, since `target` has its own stencil buffer.
    pub fn with_render_target<T, F>(&mut self, target: TextureId, extents: Size, f: F) -> Result<T>
    where
        F: FnOnce(&mut Self) -> Result<T>,
    {
        self.flush()?;
        let previous_target = self.render_target;
        let previous_extents = self.state.extents;

        self.backend
            .set_render_target(Some(target))
            .checked("set_render_target")?;
        let outer_clip = std::mem::take(&mut self.clip);
        self.render_target = Some(target);
        self.state.extents = extents;

        let result = self
            .backend
            .set_stencil(StencilState::Disabled)
            .checked("set_stencil")
            .and_then(|()| self.paint_target(f));
        if result.is_err() {
            self.queue.clear();
            self.vertices.discard();
        } else if self.clip.depth() > 0 || self.clip.scissor_depth() > 0 {
            tracing::warn!(
                "render target {:?} left {} clip / {} scissor regions open",
                target,
                self.clip.depth(),
                self.clip.scissor_depth()
            );
        }

        self.clip = outer_clip;
        self.render_target = previous_target;
        self.state.extents = previous_extents;
        let restored = self
            .backend
            .set_render_target(previous_target)
            .checked("set_render_target")
            .and_then(|()| {
                self.backend
                    .set_stencil(self.clip.stencil_state())
                    .checked("set_stencil")
            })
            .and_then(|()| self.dispatcher().upload_projection());

        let value = result?;
        restored?;
        Ok(value)
    }

    fn paint_target<T, F>(&mut self, f: F) -> Result<T>
    where
        F: FnOnce(&mut Self) -> Result<T>,
    {
        self.dispatcher().upload_projection()?;
        let value = f(self)?;
        self.flush()?;
        Ok(value)
    }
}

impl<B: RenderBackend + std::fmt::Debug> std::fmt::Debug for RenderingContext<B> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RenderingContext")
            .field("backend", &self.backend)
            .field("queued", &self.queue.len())
            .field("clip_depth", &self.clip.depth())
            .field("in_frame", &self.in_frame)
            .finish()
    }
}

/// Clip region that is reset when the guard goes out of scope
///
/// Derefs to the context so drawing continues through the guard.
pub struct ScopedClip<'a, B: RenderBackend> {
    context: &'a mut RenderingContext<B>,
}

impl<'a, B: RenderBackend> ScopedClip<'a, B> {
    pub fn rect(context: &'a mut RenderingContext<B>, rect: Rect) -> Result<Self> {
        context.enqueue(Operation::ClipToRect(rect))?;
        Ok(Self { context })
    }

    pub fn path(context: &'a mut RenderingContext<B>, path: Path) -> Result<Self> {
        context.enqueue(Operation::ClipToPath(path))?;
        Ok(Self { context })
    }
}

impl<B: RenderBackend> Deref for ScopedClip<'_, B> {
    type Target = RenderingContext<B>;

    fn deref(&self) -> &Self::Target {
        self.context
    }
}

impl<B: RenderBackend> DerefMut for ScopedClip<'_, B> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        self.context
    }
}

impl<B: RenderBackend> Drop for ScopedClip<'_, B> {
    fn drop(&mut self) {
        // Queued directly: a full queue is flushed by the next enqueue
        self.context.queue.enqueue(Operation::ResetClip);
    }
}

/// Scissor rect that is popped when the guard goes out of scope
pub struct ScopedScissor<'a, B: RenderBackend> {
    context: &'a mut RenderingContext<B>,
}

impl<'a, B: RenderBackend> ScopedScissor<'a, B> {
    pub fn new(context: &'a mut RenderingContext<B>, rect: Rect) -> Result<Self> {
        context.enqueue(Operation::ScissorOn(rect))?;
        Ok(Self { context })
    }
}

impl<B: RenderBackend> Deref for ScopedScissor<'_, B> {
    type Target = RenderingContext<B>;

    fn deref(&self) -> &Self::Target {
        self.context
    }
}

impl<B: RenderBackend> DerefMut for ScopedScissor<'_, B> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        self.context
    }
}

impl<B: RenderBackend> Drop for ScopedScissor<'_, B> {
    fn drop(&mut self) {
        self.context.queue.enqueue(Operation::ScissorOff);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::{BackendCommand, RecordingBackend};
    use tessera_paint::Color;

    fn context() -> RenderingContext<RecordingBackend> {
        RenderingContext::new(RecordingBackend::new(), RenderConfig::default()).unwrap()
    }

    #[test]
    fn test_empty_flush_short_circuits() {
        let mut ctx = context();
        ctx.backend_mut().take_commands();
        assert_eq!(ctx.flush().unwrap(), FlushStats::default());
        assert!(ctx.backend().commands().is_empty());
    }

    #[test]
    fn test_begin_frame_uploads_projection() {
        let mut ctx = context();
        ctx.begin_frame(Size::new(200.0, 100.0)).unwrap();
        assert!(ctx.in_frame());
        assert!(ctx.backend().projection().is_some());
        assert_eq!(ctx.backend().stencil(), StencilState::Disabled);
        ctx.end_frame().unwrap();
        assert!(!ctx.in_frame());
    }

    #[test]
    fn test_scoped_guards_balance() {
        let mut ctx = context();
        ctx.begin_frame(Size::new(100.0, 100.0)).unwrap();
        {
            let mut clip = ScopedClip::rect(&mut ctx, Rect::new(0.0, 0.0, 50.0, 50.0)).unwrap();
            let mut scissor = ScopedScissor::new(&mut clip, Rect::new(0.0, 0.0, 20.0, 20.0)).unwrap();
            scissor
                .enqueue(Operation::FillRect {
                    rect: Rect::new(0.0, 0.0, 10.0, 10.0),
                    brush: Color::RED.into(),
                })
                .unwrap();
        }
        assert_eq!(ctx.queue().len(), 5);
        assert!(matches!(
            ctx.queue().operations().last(),
            Some(Operation::ResetClip)
        ));
        ctx.end_frame().unwrap();
        assert_eq!(ctx.clip_depth(), 0);
        assert_eq!(ctx.scissor_depth(), 0);
        assert_eq!(ctx.backend().stencil(), StencilState::Disabled);
    }

    #[test]
    fn test_render_target_restores_frame_target() {
        let mut ctx = context();
        let target = TextureId(3);
        ctx.begin_frame(Size::new(100.0, 100.0)).unwrap();
        ctx.with_render_target(target, Size::new(32.0, 32.0), |ctx| {
            assert_eq!(ctx.backend().render_target(), Some(target));
            ctx.enqueue(Operation::FillRect {
                rect: Rect::new(0.0, 0.0, 8.0, 8.0),
                brush: Color::BLUE.into(),
            })
        })
        .unwrap();
        assert_eq!(ctx.backend().render_target(), None);
        assert_eq!(ctx.state().extents, Size::new(100.0, 100.0));
        // The fill was drawn before switching back
        let commands = ctx.backend().commands();
        let draw = commands
            .iter()
            .position(|c| matches!(c, BackendCommand::Draw { .. }))
            .unwrap();
        let restore = commands
            .iter()
            .rposition(|c| matches!(c, BackendCommand::SetRenderTarget(None)))
            .unwrap();
        assert!(draw < restore);
        ctx.end_frame().unwrap();
    }

    #[test]
    fn test_render_target_suspends_outer_clip() {
        let mut ctx = context();
        ctx.begin_frame(Size::new(100.0, 100.0)).unwrap();
        ctx.enqueue(Operation::ClipToRect(Rect::new(10.0, 10.0, 50.0, 50.0)))
            .unwrap();
        ctx.flush().unwrap();
        assert_eq!(ctx.clip_depth(), 1);
        let outer = ctx.backend().stencil();
        assert_ne!(outer, StencilState::Disabled);

        ctx.with_render_target(TextureId(3), Size::new(32.0, 32.0), |ctx| {
            // Nothing was masked on the new target, so draws must not be tested
            assert_eq!(ctx.clip_depth(), 0);
            assert_eq!(ctx.backend().stencil(), StencilState::Disabled);
            ctx.enqueue(Operation::FillRect {
                rect: Rect::new(0.0, 0.0, 8.0, 8.0),
                brush: Color::BLUE.into(),
            })
        })
        .unwrap();

        let draw = ctx.backend().recorded_draws().last().cloned().unwrap();
        assert_eq!(draw.stencil, StencilState::Disabled);
        assert_eq!(ctx.clip_depth(), 1);
        assert_eq!(ctx.backend().stencil(), outer);

        ctx.enqueue(Operation::ResetClip).unwrap();
        ctx.end_frame().unwrap();
        assert_eq!(ctx.backend().stencil(), StencilState::Disabled);
    }
}
