//! Font registry
//!
//! Owns font data and hands out [`FontId`]s. Fonts come either from raw bytes
//! or from system fonts discovered through fontdb.

use std::sync::Arc;

use fontdb::{Database, Family, Query, Source, Stretch, Style, Weight};
use rustc_hash::FxHashMap;
use tessera_paint::FontId;

use crate::{Result, TextError};

/// A loaded font face at a given pixel size
#[derive(Debug, Clone)]
pub struct FontEntry {
    pub data: Arc<Vec<u8>>,
    pub index: u32,
    /// Pixel size glyph advances are scaled to
    pub size: f32,
    pub family: String,
}

/// Registry of loaded fonts and their fallbacks
pub struct FontRegistry {
    /// fontdb database, populated with system fonts on first use
    db: Database,
    system_loaded: bool,
    fonts: FxHashMap<FontId, FontEntry>,
    fallbacks: FxHashMap<FontId, FontId>,
    next_id: u32,
}

impl FontRegistry {
    pub fn new() -> Self {
        Self {
            db: Database::new(),
            system_loaded: false,
            fonts: FxHashMap::default(),
            fallbacks: FxHashMap::default(),
            next_id: 1,
        }
    }

    /// Register a font from TTF/OTF bytes
    pub fn load_from_bytes(&mut self, data: Vec<u8>, index: u32, size: f32) -> Result<FontId> {
        let face = ttf_parser::Face::parse(&data, index)
            .map_err(|e| TextError::FontParseError(e.to_string()))?;
        let family = face
            .names()
            .into_iter()
            .find(|name| name.name_id == ttf_parser::name_id::FAMILY && name.is_unicode())
            .and_then(|name| name.to_string())
            .unwrap_or_default();
        Ok(self.insert(FontEntry {
            data: Arc::new(data),
            index,
            size,
            family,
        }))
    }

    /// Load a system font by family name (e.g. "DejaVu Sans")
    ///
    /// # Arguments
    /// * `weight` - Font weight (100-900, where 400 is normal, 700 is bold)
    /// * `italic` - Whether to load the italic variant
    pub fn load_system_font(
        &mut self,
        family: &str,
        weight: u16,
        italic: bool,
        size: f32,
    ) -> Result<FontId> {
        if !self.system_loaded {
            self.db.load_system_fonts();
            self.system_loaded = true;
            tracing::debug!("loaded {} system font faces", self.db.len());
        }

        let query = Query {
            families: &[Family::Name(family)],
            weight: Weight(weight),
            style: if italic { Style::Italic } else { Style::Normal },
            stretch: Stretch::Normal,
        };
        let id = self.db.query(&query).ok_or_else(|| {
            TextError::FontLoadError(format!(
                "Font '{}' (weight={}, italic={}) not found",
                family, weight, italic
            ))
        })?;

        let (src, index) = self
            .db
            .face_source(id)
            .ok_or_else(|| TextError::FontLoadError("Font source not found".to_string()))?;
        let data = match src {
            Source::File(path) => std::fs::read(&path).map_err(|e| {
                TextError::FontLoadError(format!("Failed to read font file {:?}: {}", path, e))
            })?,
            Source::Binary(arc) => arc.as_ref().as_ref().to_vec(),
            Source::SharedFile(_path, data) => data.as_ref().as_ref().to_vec(),
        };

        let id = self.load_from_bytes(data, index, size)?;
        if let Some(entry) = self.fonts.get_mut(&id) {
            if entry.family.is_empty() {
                entry.family = family.to_string();
            }
        }
        Ok(id)
    }

    /// Same face at another pixel size
    pub fn with_size(&mut self, font: FontId, size: f32) -> Result<FontId> {
        let mut entry = self.get(font)?.clone();
        entry.size = size;
        Ok(self.insert(entry))
    }

    pub fn set_fallback(&mut self, font: FontId, fallback: FontId) {
        self.fallbacks.insert(font, fallback);
    }

    pub fn fallback(&self, font: FontId) -> Option<FontId> {
        self.fallbacks.get(&font).copied()
    }

    pub fn get(&self, font: FontId) -> Result<&FontEntry> {
        self.fonts.get(&font).ok_or(TextError::UnknownFont(font))
    }

    pub fn len(&self) -> usize {
        self.fonts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fonts.is_empty()
    }

    fn insert(&mut self, entry: FontEntry) -> FontId {
        let id = FontId(self.next_id);
        self.next_id += 1;
        tracing::debug!("registered font {:?} '{}' at {}px", id, entry.family, entry.size);
        self.fonts.insert(id, entry);
        id
    }
}

impl Default for FontRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_garbage_bytes_rejected() {
        let mut registry = FontRegistry::new();
        let err = registry.load_from_bytes(vec![0, 1, 2, 3], 0, 12.0).unwrap_err();
        assert!(matches!(err, TextError::FontParseError(_)));
        assert!(registry.is_empty());
    }

    #[test]
    fn test_unknown_font() {
        let registry = FontRegistry::new();
        assert!(matches!(
            registry.get(FontId(42)),
            Err(TextError::UnknownFont(FontId(42)))
        ));
        assert_eq!(registry.fallback(FontId(42)), None);
    }
}
