//! Clip and scissor compositor
//!
//! Two independent mechanisms gate every draw:
//!
//! - A scissor stack of axis-aligned rects. The effective scissor is the
//!   intersection of all entries, computed lazily and cached until the next
//!   push or pop.
//! - A stencil clip counter. Each `clip_to` paints the clip shape into the
//!   stencil buffer where the value equals the current depth, incrementing
//!   it, so the pixels at depth `n + 1` are the intersection of all nested
//!   shapes. Draws then test `stencil == depth`. `reset_clip` decrements
//!   exactly those pixels again, restoring the enclosing mask.

use std::cell::Cell;

use tessera_paint::Rect;

use crate::backend::{ClearTarget, RenderBackend, StencilFunc, StencilOp, StencilState};
use crate::error::{Checked, RenderError, Result};

/// Deepest clip nesting an 8-bit stencil buffer can count
pub const MAX_CLIP_DEPTH: usize = u8::MAX as usize;

#[derive(Debug, Default)]
pub struct ClipCompositor {
    scissors: Vec<Rect>,
    effective: Cell<Option<Option<Rect>>>,
    depth: usize,
}

impl ClipCompositor {
    pub fn new() -> Self {
        Self::default()
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Scissor
    // ─────────────────────────────────────────────────────────────────────────

    pub fn scissor_on(&mut self, rect: Rect) {
        self.scissors.push(rect);
        self.effective.set(None);
    }

    pub fn scissor_off(&mut self) {
        if self.scissors.pop().is_none() {
            tracing::warn!("scissor_off without matching scissor_on");
            debug_assert!(false, "unbalanced scissor_off");
        }
        self.effective.set(None);
    }

    pub fn scissor_depth(&self) -> usize {
        self.scissors.len()
    }

    /// Intersection of every rect on the stack (None = no scissor)
    pub fn effective_scissor(&self) -> Option<Rect> {
        if let Some(cached) = self.effective.get() {
            return cached;
        }
        let mut rects = self.scissors.iter();
        let effective = rects
            .next()
            .map(|first| rects.fold(*first, |acc, r| acc.intersection(r)));
        self.effective.set(Some(effective));
        effective
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Stencil clip
    // ─────────────────────────────────────────────────────────────────────────

    pub fn depth(&self) -> usize {
        self.depth
    }

    pub fn stencil_enabled(&self) -> bool {
        self.depth > 0
    }

    /// Stencil state for ordinary draws at the current depth
    pub fn stencil_state(&self) -> StencilState {
        if self.depth == 0 {
            StencilState::Disabled
        } else {
            StencilState::Test {
                reference: self.depth as u8,
                compare: StencilFunc::Equal,
            }
        }
    }

    /// Push a clip region.
    ///
    /// `paint_mask` must draw the clip shape and leave nothing pending: it
    /// runs with color writes off and the stencil incrementing where it
    /// equals the current depth.
    pub fn clip_to<B, F>(&mut self, backend: &mut B, paint_mask: F) -> Result<()>
    where
        B: RenderBackend,
        F: FnOnce(&mut B) -> Result<()>,
    {
        if self.depth >= MAX_CLIP_DEPTH {
            return Err(RenderError::ClipDepthExceeded {
                depth: self.depth + 1,
            });
        }
        if self.depth == 0 {
            backend
                .clear(ClearTarget::Stencil(0))
                .checked("clear")?;
        }
        backend
            .set_stencil(StencilState::Write {
                reference: self.depth as u8,
                compare: StencilFunc::Equal,
                pass: StencilOp::IncrementClamp,
            })
            .checked("set_stencil")?;

        if let Err(err) = paint_mask(backend) {
            // Leave the enclosing clip in effect
            backend
                .set_stencil(self.stencil_state())
                .checked("set_stencil")?;
            return Err(err);
        }

        self.depth += 1;
        backend
            .set_stencil(self.stencil_state())
            .checked("set_stencil")?;
        tracing::trace!("clip depth {}", self.depth);
        Ok(())
    }

    /// Pop the innermost clip region.
    ///
    /// `paint_cover` must draw a shape covering the whole target; it runs
    /// with color writes off and the stencil decrementing where it equals
    /// the current depth. Popping the last region just disables the test.
    /// At depth 0 this is a no-op that is reported as a usage error.
    pub fn reset_clip<B, F>(&mut self, backend: &mut B, paint_cover: F) -> Result<()>
    where
        B: RenderBackend,
        F: FnOnce(&mut B) -> Result<()>,
    {
        if self.depth == 0 {
            tracing::warn!("reset_clip without matching clip_to");
            debug_assert!(false, "unbalanced reset_clip");
            return Ok(());
        }
        if self.depth > 1 {
            backend
                .set_stencil(StencilState::Write {
                    reference: self.depth as u8,
                    compare: StencilFunc::Equal,
                    pass: StencilOp::DecrementClamp,
                })
                .checked("set_stencil")?;
            paint_cover(backend)?;
        }
        self.depth -= 1;
        backend
            .set_stencil(self.stencil_state())
            .checked("set_stencil")?;
        tracing::trace!("clip depth {}", self.depth);
        Ok(())
    }

    /// Drop all clip and scissor state, e.g. after a failed frame
    pub fn reset(&mut self) {
        self.scissors.clear();
        self.effective.set(None);
        self.depth = 0;
    }
}
