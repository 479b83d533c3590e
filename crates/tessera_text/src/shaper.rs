//! Text shaping adapter
//!
//! Turns UTF-8 text into logically ordered [`Glyph`]s:
//!
//! 1. decode the text and build a [`ClusterMap`]
//! 2. split it into direction/script runs
//! 3. shape every run with a [`ShapingEngine`]
//! 4. map each glyph's cluster back to a source byte range
//! 5. re-shape with the fallback font and splice in glyphs the primary font
//!    was missing

use tessera_paint::{FontId, Glyph, Point, Size, SourceRange, TextDirection};

use crate::script::Script;
use crate::segment::{segment, ClusterMap, TextRun, TextRuns};
use crate::{Result, TextError};

/// A glyph as produced by a shaping engine
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ShapedGlyph {
    pub glyph_id: u16,
    /// Byte offset of the glyph's cluster within the shaped segment
    pub cluster: usize,
    pub advance: Size,
    pub offset: Point,
}

/// An external shaping engine
pub trait ShapingEngine {
    /// Shape one direction/script-stable segment.
    ///
    /// Glyphs are returned in visual order, so right-to-left segments come
    /// back reversed. Glyph id 0 marks a code point the font cannot render.
    fn shape(
        &self,
        font: FontId,
        text: &str,
        direction: TextDirection,
        script: Script,
    ) -> Result<Vec<ShapedGlyph>>;

    /// Font to use for glyphs missing from `font`
    fn fallback_font(&self, font: FontId) -> Option<FontId>;
}

impl<E: ShapingEngine + ?Sized> ShapingEngine for &E {
    fn shape(
        &self,
        font: FontId,
        text: &str,
        direction: TextDirection,
        script: Script,
    ) -> Result<Vec<ShapedGlyph>> {
        (**self).shape(font, text, direction, script)
    }

    fn fallback_font(&self, font: FontId) -> Option<FontId> {
        (**self).fallback_font(font)
    }
}

/// Result of shaping a text run
#[derive(Debug, Clone, Default)]
pub struct ShapedText {
    /// Glyphs in logical order
    pub glyphs: Vec<Glyph>,
    pub runs: TextRuns,
    pub font: Option<FontId>,
    pub fallback_font: Option<FontId>,
}

impl ShapedText {
    /// Total advance of all glyphs
    pub fn width(&self) -> f32 {
        self.glyphs.iter().map(|g| g.advance.width).sum()
    }

    /// Font a glyph must be drawn with
    pub fn font_for(&self, glyph: &Glyph) -> Option<FontId> {
        if glyph.uses_fallback_font && !glyph.is_missing() {
            self.fallback_font.or(self.font)
        } else {
            self.font
        }
    }

    /// Glyphs in drawing order: right-to-left runs are reversed
    pub fn visual_glyphs(&self) -> Vec<Glyph> {
        let mut out = Vec::with_capacity(self.glyphs.len());
        let mut start = 0;
        while start < self.glyphs.len() {
            let direction = self.glyphs[start].direction;
            let end = self.glyphs[start..]
                .iter()
                .position(|g| g.direction != direction)
                .map_or(self.glyphs.len(), |n| start + n);
            let run = &self.glyphs[start..end];
            if direction.is_rtl() {
                out.extend(run.iter().rev().copied());
            } else {
                out.extend_from_slice(run);
            }
            start = end;
        }
        out
    }

    /// Whether any glyph needed the fallback font
    pub fn uses_fallback(&self) -> bool {
        self.glyphs.iter().any(|g| g.uses_fallback_font)
    }
}

/// Shapes text through a [`ShapingEngine`]
pub struct TextShaper<E> {
    engine: E,
}

impl<E: ShapingEngine> TextShaper<E> {
    pub fn new(engine: E) -> Self {
        Self { engine }
    }

    pub fn engine(&self) -> &E {
        &self.engine
    }

    pub fn engine_mut(&mut self) -> &mut E {
        &mut self.engine
    }

    /// Shape raw bytes, rejecting invalid UTF-8
    pub fn shape_bytes(&self, bytes: &[u8], font: FontId) -> Result<ShapedText> {
        let text = std::str::from_utf8(bytes).map_err(|e| TextError::InvalidUtf8 {
            offset: e.valid_up_to(),
        })?;
        self.shape(text, font)
    }

    /// Shape `text` with `font`, falling back per glyph where the font has no coverage
    pub fn shape(&self, text: &str, font: FontId) -> Result<ShapedText> {
        let map = ClusterMap::new(text);
        let runs = segment(text, &map);

        let mut glyphs = self.shape_runs(text, &map, &runs, font)?;
        for glyph in glyphs.iter_mut().filter(|g| g.is_missing()) {
            glyph.uses_fallback_font = true;
        }

        let fallback_font = self.engine.fallback_font(font);
        if let Some(fallback) = fallback_font.filter(|_| glyphs.iter().any(Glyph::is_missing)) {
            let replacement = self.shape_runs(text, &map, &runs, fallback)?;
            glyphs = splice_fallback(glyphs, &replacement);
        }

        tracing::trace!(
            "shaped {} bytes into {} runs / {} glyphs",
            text.len(),
            runs.len(),
            glyphs.len()
        );

        Ok(ShapedText {
            glyphs,
            runs,
            font: Some(font),
            fallback_font,
        })
    }

    fn shape_runs(
        &self,
        text: &str,
        map: &ClusterMap,
        runs: &[TextRun],
        font: FontId,
    ) -> Result<Vec<Glyph>> {
        let mut glyphs = Vec::with_capacity(text.len());
        for run in runs {
            let segment_text = &text[run.range.as_range()];
            let mut shaped = self
                .engine
                .shape(font, segment_text, run.direction, run.script)?;
            if shaped.is_empty() {
                return Err(TextError::ShapingFailed(format!(
                    "no glyphs for bytes {}..{}",
                    run.range.begin, run.range.end
                )));
            }
            if run.direction.is_rtl() {
                shaped.reverse();
            }
            glyphs.extend(map_clusters(&shaped, run, map));
        }
        Ok(glyphs)
    }
}

/// Assign every glyph of a run a source byte range.
///
/// The first glyph of a cluster covers the bytes up to the next cluster;
/// further glyphs of the same cluster get an empty range at its end, so the
/// ranges tile the run exactly.
fn map_clusters<'a>(
    shaped: &'a [ShapedGlyph],
    run: &'a TextRun,
    map: &'a ClusterMap,
) -> impl Iterator<Item = Glyph> + 'a {
    let base = run.range.begin;
    let snap = move |g: &ShapedGlyph| map.snap(base + g.cluster).clamp(base, run.range.end);
    let mut cursor = base;
    let mut previous: Option<usize> = None;
    shaped.iter().enumerate().map(move |(i, g)| {
        let raw = snap(g);
        let continues = previous == Some(raw) || raw < cursor;
        previous = Some(raw);
        let begin = cursor;
        if !continues {
            let next = shaped[i + 1..]
                .iter()
                .map(snap)
                .find(|&c| c > raw)
                .unwrap_or(run.range.end);
            cursor = next.max(cursor);
        }
        let codepoint = map.char_at(raw).unwrap_or('\u{FFFD}');
        Glyph {
            source: SourceRange::new(begin, cursor),
            direction: run.direction,
            glyph_id: g.glyph_id,
            codepoint,
            advance: g.advance,
            offset: g.offset,
            uses_fallback_font: false,
            is_whitespace: codepoint.is_whitespace(),
        }
    })
}

/// Replace missing glyphs by the fallback glyphs covering the same bytes
fn splice_fallback(primary: Vec<Glyph>, fallback: &[Glyph]) -> Vec<Glyph> {
    let mut out: Vec<Glyph> = Vec::with_capacity(primary.len());
    for glyph in primary {
        if glyph.source.is_empty() {
            // Trailing glyph of a cluster already replaced as a whole
            let replaced = out.last().is_some_and(|last| {
                last.uses_fallback_font && !last.is_missing() && last.source.end == glyph.source.begin
            });
            if !replaced {
                out.push(glyph);
            }
            continue;
        }
        if !glyph.is_missing() {
            out.push(glyph);
            continue;
        }
        // Empty ranges at `begin` belong to the previous cluster
        let covering: Vec<Glyph> = fallback
            .iter()
            .filter(|f| glyph.source.contains(&f.source))
            .filter(|f| !(f.source.is_empty() && f.source.begin == glyph.source.begin))
            .copied()
            .collect();
        let tiles = covering.first().map(|f| f.source.begin) == Some(glyph.source.begin)
            && covering.last().map(|f| f.source.end) == Some(glyph.source.end)
            && covering.windows(2).all(|w| w[0].source.end == w[1].source.begin);
        if tiles {
            out.extend(covering.into_iter().map(|mut f| {
                f.uses_fallback_font = true;
                f
            }));
        } else {
            tracing::debug!(
                "fallback font does not cover bytes {}..{} as one cluster, keeping missing glyph",
                glyph.source.begin,
                glyph.source.end
            );
            out.push(glyph);
        }
    }
    out
}
