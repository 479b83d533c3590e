//! Brushes and pens

use crate::color::Color;
use crate::gradient::Gradient;
use crate::primitives::Rect;

/// Handle to a texture owned by an external texture manager
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TextureId(pub u32);

/// Sampling filter requested for a textured paint
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum SamplingQuality {
    Nearest,
    #[default]
    Linear,
    Mipmap,
}

/// A texture used as paint
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct TexturePaint {
    pub texture: TextureId,
    pub quality: SamplingQuality,
    /// Normalized sub-rectangle of the texture to sample (None = whole texture)
    pub source: Option<Rect>,
}

impl TexturePaint {
    pub fn new(texture: TextureId) -> Self {
        Self {
            texture,
            quality: SamplingQuality::default(),
            source: None,
        }
    }
}

/// Fill style for shapes
#[derive(Clone, Debug, PartialEq)]
pub enum Brush {
    Solid(Color),
    Gradient(Gradient),
    Texture(TexturePaint),
}

impl From<Color> for Brush {
    fn from(color: Color) -> Self {
        Brush::Solid(color)
    }
}

impl From<Gradient> for Brush {
    fn from(gradient: Gradient) -> Self {
        Brush::Gradient(gradient)
    }
}

impl From<TexturePaint> for Brush {
    fn from(texture: TexturePaint) -> Self {
        Brush::Texture(texture)
    }
}

impl Brush {
    /// Whether two brushes can share a single shader binding.
    ///
    /// Solid colors travel per vertex so any two solids are compatible;
    /// gradients need identical uniforms and textures the same texture/filter.
    pub fn shares_binding_with(&self, other: &Brush) -> bool {
        match (self, other) {
            (Brush::Solid(_), Brush::Solid(_)) => true,
            (Brush::Gradient(a), Brush::Gradient(b)) => a == b,
            (Brush::Texture(a), Brush::Texture(b)) => {
                a.texture == b.texture && a.quality == b.quality
            }
            _ => false,
        }
    }

    /// Color used for per-vertex tinting
    pub fn vertex_color(&self) -> Color {
        match self {
            Brush::Solid(color) => *color,
            Brush::Gradient(_) | Brush::Texture(_) => Color::WHITE,
        }
    }

    pub fn is_solid(&self) -> bool {
        matches!(self, Brush::Solid(_))
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum LineCap {
    #[default]
    Butt,
    Round,
    Square,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum LineJoin {
    #[default]
    Miter,
    Round,
    Bevel,
}

/// Stroke style
#[derive(Clone, Debug, PartialEq)]
pub struct Pen {
    pub brush: Brush,
    pub width: f32,
    pub line_cap: LineCap,
    pub line_join: LineJoin,
}

impl Pen {
    pub fn new(brush: impl Into<Brush>, width: f32) -> Self {
        Self {
            brush: brush.into(),
            width,
            line_cap: LineCap::default(),
            line_join: LineJoin::default(),
        }
    }

    pub fn shares_binding_with(&self, other: &Pen) -> bool {
        self.brush.shares_binding_with(&other.brush)
    }
}

impl Default for Pen {
    fn default() -> Self {
        Self::new(Color::BLACK, 1.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::path::Point;

    #[test]
    fn test_solids_share_binding() {
        let a = Brush::Solid(Color::RED);
        let b = Brush::Solid(Color::BLUE);
        assert!(a.shares_binding_with(&b));
    }

    #[test]
    fn test_gradient_identity() {
        let g1 = Brush::from(Gradient::linear_simple(
            Point::ZERO,
            Point::new(10.0, 0.0),
            Color::RED,
            Color::BLUE,
        ));
        let g2 = Brush::from(Gradient::linear_simple(
            Point::ZERO,
            Point::new(20.0, 0.0),
            Color::RED,
            Color::BLUE,
        ));
        assert!(g1.shares_binding_with(&g1.clone()));
        assert!(!g1.shares_binding_with(&g2));
        assert!(!g1.shares_binding_with(&Brush::Solid(Color::RED)));
    }

    #[test]
    fn test_texture_identity() {
        let a = Brush::from(TexturePaint::new(TextureId(1)));
        let b = Brush::from(TexturePaint::new(TextureId(2)));
        assert!(!a.shares_binding_with(&b));
        assert!(a.shares_binding_with(&a.clone()));
    }
}
