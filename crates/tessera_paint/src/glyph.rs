//! Shaped glyphs and their appearance

use crate::color::Color;
use crate::path::{Point, Size};

/// Identity of a font face (family + style + size) owned by the font manager
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct FontId(pub u32);

/// Resolved direction of the run a glyph was shaped in
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum TextDirection {
    #[default]
    LeftToRight,
    RightToLeft,
}

impl TextDirection {
    pub fn is_rtl(self) -> bool {
        self == TextDirection::RightToLeft
    }
}

/// Half-open byte range `[begin, end)` into the source text
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub struct SourceRange {
    pub begin: usize,
    pub end: usize,
}

impl SourceRange {
    pub const fn new(begin: usize, end: usize) -> Self {
        Self { begin, end }
    }

    pub fn len(&self) -> usize {
        self.end - self.begin
    }

    pub fn is_empty(&self) -> bool {
        self.begin == self.end
    }

    pub fn contains(&self, other: &SourceRange) -> bool {
        other.begin >= self.begin && other.end <= self.end
    }

    pub fn as_range(&self) -> std::ops::Range<usize> {
        self.begin..self.end
    }
}

/// A single shaped glyph
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Glyph {
    /// Bytes of the source text this glyph was shaped from
    pub source: SourceRange,
    pub direction: TextDirection,
    /// Glyph index in the font that shaped it (0 is the missing-glyph sentinel)
    pub glyph_id: u16,
    /// First code point of the glyph's cluster
    pub codepoint: char,
    pub advance: Size,
    /// Shaper placement offset relative to the pen position
    pub offset: Point,
    pub uses_fallback_font: bool,
    pub is_whitespace: bool,
}

impl Glyph {
    pub fn is_missing(&self) -> bool {
        self.glyph_id == 0
    }
}

/// Kind of decoration drawn around glyphs
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum TextEffectKind {
    #[default]
    Outline,
}

/// Outline-style decoration; `width` is the half-width in pixels
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct TextEffect {
    pub kind: TextEffectKind,
    pub color: Color,
    pub width: f32,
}

impl TextEffect {
    pub fn outline(color: Color, width: f32) -> Self {
        Self {
            kind: TextEffectKind::Outline,
            color,
            width,
        }
    }

    /// Integral half-width `w` of the `(2w+1)²` sampling grid
    pub fn half_width(&self) -> u32 {
        self.width.max(0.0).ceil() as u32
    }

    /// Number of offset copies the outline pass draws
    pub fn sample_count(&self) -> u32 {
        let side = 2 * self.half_width() + 1;
        side * side
    }
}

/// Ink, optional paper (background) and optional effect of a glyph
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct GlyphAppearance {
    pub ink: Color,
    pub paper: Option<Color>,
    pub effect: Option<TextEffect>,
}

impl GlyphAppearance {
    pub fn new(ink: Color) -> Self {
        Self {
            ink,
            paper: None,
            effect: None,
        }
    }

    pub fn with_paper(mut self, paper: Color) -> Self {
        self.paper = Some(paper);
        self
    }

    pub fn with_effect(mut self, effect: TextEffect) -> Self {
        self.effect = Some(effect);
        self
    }

    /// Half-width of the effect, if any; part of the batching key
    pub fn effect_half_width(&self) -> Option<u32> {
        self.effect.map(|e| e.half_width())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_outline_sample_count() {
        assert_eq!(TextEffect::outline(Color::BLACK, 0.0).sample_count(), 1);
        assert_eq!(TextEffect::outline(Color::BLACK, 1.0).sample_count(), 9);
        assert_eq!(TextEffect::outline(Color::BLACK, 1.5).sample_count(), 25);
    }

    #[test]
    fn test_source_range() {
        let outer = SourceRange::new(0, 10);
        assert!(outer.contains(&SourceRange::new(2, 4)));
        assert!(!outer.contains(&SourceRange::new(8, 12)));
        assert_eq!(outer.len(), 10);
        assert!(SourceRange::new(3, 3).is_empty());
    }
}
