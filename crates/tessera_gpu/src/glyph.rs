//! Glyph rendering
//!
//! A batch of `DrawGlyph` operations is drawn in up to three passes:
//!
//! 1. paper: the background rect of each glyph, as solid quads
//! 2. outline: the glyph quad at every offset of a `(2w+1)²` grid in the
//!    effect color
//! 3. ink: the glyph quad in the ink color. With subpixel rendering every
//!    quad is drawn behind its own texture barrier because the shader reads
//!    the target back.
//!
//! Glyph textures come from a [`GlyphAtlas`] owned by the caller.

use rustc_hash::FxHashMap;
use tessera_paint::{Color, FontId, GlyphDraw, Operation, Rect, TextureId};

use crate::backend::RenderBackend;
use crate::dispatch::Dispatcher;
use crate::error::Result;
use crate::geometry;
use crate::shader::ShaderBinding;
use crate::vertex::{PrimitiveMode, Vertex};

/// Vertical extent of a font's line box
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct FontMetrics {
    pub ascent: f32,
    pub descent: f32,
}

impl FontMetrics {
    pub fn line_height(&self) -> f32 {
        self.ascent + self.descent
    }
}

/// Where a rasterized glyph lives in an atlas texture
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct GlyphTexture {
    pub texture: TextureId,
    /// Normalized texture rect
    pub uv: Rect,
    /// Quad relative to the pen origin on the baseline, Y down
    pub placement: Rect,
    /// Whether the bitmap holds per-channel (RGB) coverage
    pub subpixel: bool,
}

/// Resolves glyphs to atlas textures
pub trait GlyphAtlas {
    fn glyph(&self, font: FontId, glyph_id: u16, subpixel: bool) -> Option<GlyphTexture>;

    fn metrics(&self, font: FontId) -> FontMetrics;
}

/// [`GlyphAtlas`] over glyphs rasterized ahead of time
#[derive(Debug, Default)]
pub struct GlyphCache {
    glyphs: FxHashMap<(FontId, u16, bool), GlyphTexture>,
    metrics: FxHashMap<FontId, FontMetrics>,
}

impl GlyphCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, font: FontId, glyph_id: u16, texture: GlyphTexture) {
        self.glyphs
            .insert((font, glyph_id, texture.subpixel), texture);
    }

    pub fn set_metrics(&mut self, font: FontId, metrics: FontMetrics) {
        self.metrics.insert(font, metrics);
    }

    pub fn len(&self) -> usize {
        self.glyphs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.glyphs.is_empty()
    }
}

impl GlyphAtlas for GlyphCache {
    fn glyph(&self, font: FontId, glyph_id: u16, subpixel: bool) -> Option<GlyphTexture> {
        self.glyphs
            .get(&(font, glyph_id, subpixel))
            .or_else(|| self.glyphs.get(&(font, glyph_id, !subpixel)))
            .copied()
    }

    fn metrics(&self, font: FontId) -> FontMetrics {
        self.metrics.get(&font).copied().unwrap_or_default()
    }
}

/// Textured quad covering `placement` moved by `(dx, dy)`
fn glyph_quad(placement: Rect, dx: f32, dy: f32, uv: Rect, color: Color) -> [Vertex; 6] {
    let rect = placement.offset(dx, dy);
    let positions = geometry::quad(rect);
    let uvs = geometry::quad_uvs(uv);
    std::array::from_fn(|i| Vertex::textured(positions[i], color, uvs[i]))
}

impl<'a, B: RenderBackend> Dispatcher<'a, B> {
    pub(crate) fn draw_glyphs(&mut self, ops: &[Operation]) -> Result<()> {
        let draws: Vec<&GlyphDraw> = ops
            .iter()
            .map(|op| {
                let Operation::DrawGlyph(draw) = op else {
                    unreachable!("{:?} in a glyph batch", op.kind());
                };
                draw
            })
            .collect();

        self.draw_paper(&draws)?;

        let Some(atlas) = self.atlas else {
            tracing::warn!("no glyph atlas, skipping {} glyphs", draws.len());
            return Ok(());
        };

        if draws.iter().any(|d| d.appearance.effect.is_some()) {
            self.draw_outlines(atlas, &draws)?;
        }
        self.draw_ink(atlas, &draws)?;
        self.binder.restore_default(self.vertices, self.backend)
    }

    fn draw_paper(&mut self, draws: &[&GlyphDraw]) -> Result<()> {
        if draws.iter().all(|d| d.appearance.paper.is_none()) {
            return Ok(());
        }
        self.binder
            .bind(self.vertices, self.backend, ShaderBinding::Solid)?;
        self.vertices
            .set_mode(self.backend, PrimitiveMode::Triangles)?;

        for draw in draws {
            let Some(paper) = draw.appearance.paper else {
                continue;
            };
            let metrics = self
                .atlas
                .map(|atlas| atlas.metrics(draw.font))
                .unwrap_or_default();
            let rect = Rect::new(
                draw.position.x,
                draw.position.y - metrics.ascent,
                draw.glyph.advance.width,
                metrics.line_height(),
            );
            if rect.is_empty() {
                continue;
            }
            let color = paper.with_opacity(self.state.opacity);
            let quad = geometry::quad(rect).map(|p| Vertex::new(p, color));
            self.vertices.insert(self.backend, &quad)?;
        }
        Ok(())
    }

    fn draw_outlines(&mut self, atlas: &dyn GlyphAtlas, draws: &[&GlyphDraw]) -> Result<()> {
        self.vertices
            .set_mode(self.backend, PrimitiveMode::Triangles)?;

        for draw in draws {
            let Some(effect) = draw.appearance.effect else {
                continue;
            };
            if draw.glyph.is_whitespace {
                continue;
            }
            let Some(texture) = atlas.glyph(draw.font, draw.glyph.glyph_id, false) else {
                tracing::warn!(
                    "glyph {} of font {:?} missing from atlas",
                    draw.glyph.glyph_id,
                    draw.font
                );
                continue;
            };
            let binding = self.binder.glyph_binding(texture.texture, false);
            self.binder.bind(self.vertices, self.backend, binding)?;

            let color = effect.color.with_opacity(self.state.opacity);
            let origin_x = draw.position.x + draw.glyph.offset.x;
            let origin_y = draw.position.y + draw.glyph.offset.y;
            let w = effect.half_width() as i32;
            for oy in -w..=w {
                for ox in -w..=w {
                    let quad = glyph_quad(
                        texture.placement,
                        origin_x + ox as f32,
                        origin_y + oy as f32,
                        texture.uv,
                        color,
                    );
                    self.vertices.insert(self.backend, &quad)?;
                }
            }
        }
        Ok(())
    }

    fn draw_ink(&mut self, atlas: &dyn GlyphAtlas, draws: &[&GlyphDraw]) -> Result<()> {
        let want_subpixel = self.state.subpixel;
        self.vertices
            .set_mode(self.backend, PrimitiveMode::Triangles)?;

        for draw in draws {
            if draw.glyph.is_whitespace {
                continue;
            }
            let Some(texture) = atlas.glyph(draw.font, draw.glyph.glyph_id, want_subpixel) else {
                tracing::warn!(
                    "glyph {} of font {:?} missing from atlas",
                    draw.glyph.glyph_id,
                    draw.font
                );
                continue;
            };
            let binding = self
                .binder
                .glyph_binding(texture.texture, want_subpixel && texture.subpixel);
            let subpixel = matches!(binding, ShaderBinding::Glyph { subpixel: true, .. });
            self.binder.bind(self.vertices, self.backend, binding)?;

            let color = draw.appearance.ink.with_opacity(self.state.opacity);
            let quad = glyph_quad(
                texture.placement,
                draw.position.x + draw.glyph.offset.x,
                draw.position.y + draw.glyph.offset.y,
                texture.uv,
                color,
            );
            self.vertices.insert(self.backend, &quad)?;
            if subpixel {
                // Two triangles per barrier: one glyph quad
                self.vertices
                    .draw_with_barrier(self.backend, quad.len(), 2)?;
            }
        }
        Ok(())
    }
}
