//! HarfBuzz-compatible shaping through rustybuzz

use rustybuzz::{Direction, UnicodeBuffer};
use tessera_paint::{FontId, Point, Size, TextDirection};

use crate::registry::FontRegistry;
use crate::script::Script;
use crate::shaper::{ShapedGlyph, ShapingEngine};
use crate::{Result, TextError};

/// [`ShapingEngine`] backed by rustybuzz and a [`FontRegistry`]
pub struct RustybuzzEngine {
    registry: FontRegistry,
}

impl RustybuzzEngine {
    pub fn new(registry: FontRegistry) -> Self {
        Self { registry }
    }

    pub fn registry(&self) -> &FontRegistry {
        &self.registry
    }

    pub fn registry_mut(&mut self) -> &mut FontRegistry {
        &mut self.registry
    }
}

impl ShapingEngine for RustybuzzEngine {
    fn shape(
        &self,
        font: FontId,
        text: &str,
        direction: TextDirection,
        script: Script,
    ) -> Result<Vec<ShapedGlyph>> {
        let entry = self.registry.get(font)?;
        let face = rustybuzz::Face::from_slice(&entry.data, entry.index)
            .ok_or_else(|| TextError::FontParseError(format!("{:?} is not a valid face", font)))?;

        let mut buffer = UnicodeBuffer::new();
        buffer.push_str(text);
        buffer.set_direction(match direction {
            TextDirection::LeftToRight => Direction::LeftToRight,
            TextDirection::RightToLeft => Direction::RightToLeft,
        });
        if let Some(script) = script.to_rustybuzz() {
            buffer.set_script(script);
        }
        buffer.guess_segment_properties();

        let output = rustybuzz::shape(&face, &[], buffer);
        let scale = entry.size / face.units_per_em() as f32;

        let glyphs = output
            .glyph_infos()
            .iter()
            .zip(output.glyph_positions())
            .map(|(info, pos)| ShapedGlyph {
                glyph_id: info.glyph_id as u16,
                cluster: info.cluster as usize,
                advance: Size::new(pos.x_advance as f32 * scale, pos.y_advance as f32 * scale),
                // Font units are y-up
                offset: Point::new(pos.x_offset as f32 * scale, -(pos.y_offset as f32) * scale),
            })
            .collect();
        Ok(glyphs)
    }

    fn fallback_font(&self, font: FontId) -> Option<FontId> {
        self.registry.fallback(font)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unknown_font_is_an_error() {
        let engine = RustybuzzEngine::new(FontRegistry::new());
        let err = engine
            .shape(FontId(7), "abc", TextDirection::LeftToRight, Script::Latin)
            .unwrap_err();
        assert!(matches!(err, TextError::UnknownFont(FontId(7))));
    }
}
