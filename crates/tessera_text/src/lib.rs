//! Text shaping for the Tessera renderer
//!
//! This crate provides:
//! - UTF-8 decoding with a byte to code point cluster map
//! - Direction and script segmentation of text runs
//! - Shaping through a pluggable [`ShapingEngine`] (rustybuzz by default)
//! - Mapping shaped glyphs back to source byte ranges
//! - Per-glyph fallback font splicing
//! - Font loading via fontdb

pub mod engine;
pub mod registry;
pub mod script;
pub mod segment;
pub mod shaper;

pub use engine::RustybuzzEngine;
pub use registry::{FontEntry, FontRegistry};
pub use script::{strong_direction, Script};
pub use segment::{segment, ClusterMap, TextRun, TextRuns};
pub use shaper::{ShapedGlyph, ShapedText, ShapingEngine, TextShaper};

use tessera_paint::FontId;
use thiserror::Error;

/// Text shaping errors
#[derive(Error, Debug)]
pub enum TextError {
    #[error("Failed to load font: {0}")]
    FontLoadError(String),

    #[error("Failed to parse font: {0}")]
    FontParseError(String),

    #[error("Unknown font: {0:?}")]
    UnknownFont(FontId),

    #[error("Invalid UTF-8 at byte {offset}")]
    InvalidUtf8 { offset: usize },

    #[error("Shaping failed: {0}")]
    ShapingFailed(String),
}

pub type Result<T> = std::result::Result<T, TextError>;
