//! Gradient fills

use smallvec::SmallVec;

use crate::color::Color;
use crate::path::Point;

/// Maximum number of stops a gradient shader accepts
pub const MAX_GRADIENT_STOPS: usize = 16;

/// A gradient stop
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct GradientStop {
    pub offset: f32, // 0.0 to 1.0
    pub color: Color,
}

impl GradientStop {
    pub const fn new(offset: f32, color: Color) -> Self {
        Self { offset, color }
    }
}

pub type GradientStops = SmallVec<[GradientStop; 4]>;

/// Gradient type
#[derive(Clone, Debug, PartialEq)]
pub enum Gradient {
    Linear {
        start: Point,
        end: Point,
        stops: GradientStops,
    },
    Radial {
        center: Point,
        radius: f32,
        stops: GradientStops,
    },
}

impl Gradient {
    /// Create a simple linear gradient between two colors
    pub fn linear_simple(start: Point, end: Point, from: Color, to: Color) -> Self {
        Gradient::Linear {
            start,
            end,
            stops: SmallVec::from_slice(&[
                GradientStop::new(0.0, from),
                GradientStop::new(1.0, to),
            ]),
        }
    }

    /// Create a simple radial gradient between two colors
    pub fn radial_simple(center: Point, radius: f32, from: Color, to: Color) -> Self {
        Gradient::Radial {
            center,
            radius,
            stops: SmallVec::from_slice(&[
                GradientStop::new(0.0, from),
                GradientStop::new(1.0, to),
            ]),
        }
    }

    pub fn stops(&self) -> &[GradientStop] {
        match self {
            Gradient::Linear { stops, .. } | Gradient::Radial { stops, .. } => stops,
        }
    }

    fn stops_mut(&mut self) -> &mut GradientStops {
        match self {
            Gradient::Linear { stops, .. } | Gradient::Radial { stops, .. } => stops,
        }
    }

    /// Stops sorted by offset, clamped to [0, 1] and truncated to the shader limit
    pub fn normalized_stops(&self) -> GradientStops {
        let mut stops: GradientStops = self
            .stops()
            .iter()
            .map(|s| GradientStop::new(s.offset.clamp(0.0, 1.0), s.color))
            .collect();
        stops.sort_by(|a, b| a.offset.total_cmp(&b.offset));
        if stops.len() > MAX_GRADIENT_STOPS {
            tracing::warn!(
                "gradient has {} stops, only {} are rendered",
                stops.len(),
                MAX_GRADIENT_STOPS
            );
            stops.truncate(MAX_GRADIENT_STOPS);
        }
        stops
    }

    /// Interpolated color at parameter `t` along the gradient
    pub fn color_at(&self, t: f32) -> Color {
        let stops = self.normalized_stops();
        let Some(first) = stops.first() else {
            return Color::TRANSPARENT;
        };
        if t <= first.offset {
            return first.color;
        }
        for pair in stops.windows(2) {
            let (a, b) = (pair[0], pair[1]);
            if t <= b.offset {
                let span = b.offset - a.offset;
                if span <= f32::EPSILON {
                    return b.color;
                }
                return a.color.lerp(b.color, (t - a.offset) / span);
            }
        }
        stops[stops.len() - 1].color
    }

    /// Copy with every stop's alpha multiplied by `opacity`
    pub fn with_opacity(&self, opacity: f32) -> Gradient {
        let mut gradient = self.clone();
        for stop in gradient.stops_mut().iter_mut() {
            stop.color = stop.color.with_opacity(opacity);
        }
        gradient
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_color_at_interpolates() {
        let g = Gradient::linear_simple(
            Point::ZERO,
            Point::new(100.0, 0.0),
            Color::BLACK,
            Color::WHITE,
        );
        assert_eq!(g.color_at(-1.0), Color::BLACK);
        assert_eq!(g.color_at(2.0), Color::WHITE);
        assert!((g.color_at(0.25).r - 0.25).abs() < 1e-6);
    }

    #[test]
    fn test_normalized_stops_sorted() {
        let g = Gradient::Radial {
            center: Point::ZERO,
            radius: 1.0,
            stops: SmallVec::from_slice(&[
                GradientStop::new(1.0, Color::WHITE),
                GradientStop::new(-0.5, Color::BLACK),
            ]),
        };
        let stops = g.normalized_stops();
        assert_eq!(stops[0].offset, 0.0);
        assert_eq!(stops[1].offset, 1.0);
    }

    #[test]
    fn test_with_opacity() {
        let g = Gradient::linear_simple(Point::ZERO, Point::new(1.0, 0.0), Color::RED, Color::BLUE)
            .with_opacity(0.5);
        assert!(g.stops().iter().all(|s| s.color.a == 0.5));
    }
}
