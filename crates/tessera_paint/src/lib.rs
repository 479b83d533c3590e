//! Tessera paint model
//!
//! The vocabulary shared by every other tessera crate: geometry, colors,
//! brushes and gradients, logical coordinate systems, shaped glyphs and the
//! closed set of drawing [`Operation`]s recorded by widgets.

pub mod brush;
pub mod color;
pub mod context;
pub mod coordinates;
pub mod glyph;
pub mod gradient;
pub mod operation;
pub mod path;
pub mod primitives;

pub use brush::{Brush, LineCap, LineJoin, Pen, SamplingQuality, TextureId, TexturePaint};
pub use color::Color;
pub use context::PaintContext;
pub use coordinates::{LogicalCoordinateSystem, LogicalCoordinates};
pub use glyph::{
    FontId, Glyph, GlyphAppearance, SourceRange, TextDirection, TextEffect, TextEffectKind,
};
pub use gradient::{Gradient, GradientStop, GradientStops, MAX_GRADIENT_STOPS};
pub use operation::{
    BlendingMode, Entity, GlyphDraw, LineStipple, LogicalOperation, Mesh, Operation,
    OperationKind, Shape, SmoothingMode,
};
pub use path::{Path, PathBuilder, PathCommand, Point, Size};
pub use primitives::*;
