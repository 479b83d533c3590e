//! Logical coordinate systems
//!
//! Widgets draw in logical coordinates; the render target is addressed in
//! device pixels with the origin at its top-left corner and Y growing down.
//! A [`LogicalCoordinates`] pair (`bottom_left`, `top_right`) describes which
//! logical values sit at the corners of the target, which also fixes the
//! Y-axis orientation.

use crate::path::{Point, Size};

/// How logical coordinates are derived from the target extents
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum LogicalCoordinateSystem {
    /// Coordinates are set explicitly with `SetLogicalCoordinates`
    Specified,
    /// Origin at the top-left, Y grows downwards.
    ///
    /// Logical and device coordinates coincide: device `(0, 0)` is logical
    /// `(0, 0)`.
    #[default]
    AutomaticGui,
    /// Origin at the bottom-left, Y grows upwards.
    ///
    /// Device space stays y-down, so the logical origin is device
    /// `(0, height)` and device `(0, 0)` maps to logical `(0, height)`.
    AutomaticGame,
}

/// Logical values at the bottom-left and top-right corners of the target
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct LogicalCoordinates {
    pub bottom_left: Point,
    pub top_right: Point,
}

impl LogicalCoordinates {
    pub const fn new(bottom_left: Point, top_right: Point) -> Self {
        Self {
            bottom_left,
            top_right,
        }
    }

    /// Resolve the coordinates for a system and target size.
    ///
    /// `specified` is only consulted for [`LogicalCoordinateSystem::Specified`];
    /// without it the GUI layout is used.
    pub fn resolve(
        system: LogicalCoordinateSystem,
        extents: Size,
        specified: Option<LogicalCoordinates>,
    ) -> Self {
        match system {
            LogicalCoordinateSystem::AutomaticGui => Self::gui(extents),
            LogicalCoordinateSystem::AutomaticGame => Self::game(extents),
            LogicalCoordinateSystem::Specified => specified.unwrap_or_else(|| Self::gui(extents)),
        }
    }

    pub fn gui(extents: Size) -> Self {
        Self::new(
            Point::new(0.0, extents.height),
            Point::new(extents.width, 0.0),
        )
    }

    pub fn game(extents: Size) -> Self {
        Self::new(Point::ZERO, Point::new(extents.width, extents.height))
    }

    pub fn top_left(&self) -> Point {
        Point::new(self.bottom_left.x, self.top_right.y)
    }

    pub fn bottom_right(&self) -> Point {
        Point::new(self.top_right.x, self.bottom_left.y)
    }

    /// True when logical Y grows towards the bottom of the target
    pub fn y_down(&self) -> bool {
        self.bottom_left.y > self.top_right.y
    }

    pub fn width(&self) -> f32 {
        self.top_right.x - self.bottom_left.x
    }

    pub fn height(&self) -> f32 {
        self.top_right.y - self.bottom_left.y
    }

    /// Map a logical point to device pixels (origin top-left, Y down)
    pub fn to_device(&self, p: Point, extents: Size) -> Point {
        let fx = (p.x - self.bottom_left.x) / self.width();
        let fy = (p.y - self.top_right.y) / (self.bottom_left.y - self.top_right.y);
        Point::new(fx * extents.width, fy * extents.height)
    }

    /// Map a device pixel position to logical coordinates
    pub fn to_logical(&self, device: Point, extents: Size) -> Point {
        let fx = device.x / extents.width;
        let fy = device.y / extents.height;
        Point::new(
            self.bottom_left.x + fx * self.width(),
            self.top_right.y + fy * (self.bottom_left.y - self.top_right.y),
        )
    }

    /// Orthographic projection (column-major) from logical space to clip space
    pub fn projection(&self) -> [[f32; 4]; 4] {
        let (l, r) = (self.bottom_left.x, self.top_right.x);
        let (b, t) = (self.bottom_left.y, self.top_right.y);
        let sx = 2.0 / (r - l);
        let sy = 2.0 / (t - b);
        let tx = -(r + l) / (r - l);
        let ty = -(t + b) / (t - b);
        [
            [sx, 0.0, 0.0, 0.0],
            [0.0, sy, 0.0, 0.0],
            [0.0, 0.0, 0.5, 0.0],
            [tx, ty, 0.5, 1.0],
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn project(m: &[[f32; 4]; 4], p: Point) -> (f32, f32) {
        (
            m[0][0] * p.x + m[1][0] * p.y + m[3][0],
            m[0][1] * p.x + m[1][1] * p.y + m[3][1],
        )
    }

    #[test]
    fn test_origin_corner_per_system() {
        let extents = Size::new(800.0, 600.0);
        let gui = LogicalCoordinates::resolve(LogicalCoordinateSystem::AutomaticGui, extents, None);
        let game =
            LogicalCoordinates::resolve(LogicalCoordinateSystem::AutomaticGame, extents, None);

        // Logical origin sits at the device top-left for GUI and bottom-left for games
        assert_eq!(gui.to_device(Point::ZERO, extents), Point::new(0.0, 0.0));
        assert_eq!(game.to_device(Point::ZERO, extents), Point::new(0.0, 600.0));
        assert_eq!(gui.top_left(), Point::ZERO);
        assert_eq!(game.bottom_left, Point::ZERO);
        assert!(gui.y_down());
        assert!(!game.y_down());

        // Device pixels are y-down under both systems
        assert_eq!(gui.to_logical(Point::ZERO, extents), Point::ZERO);
        assert_eq!(game.to_logical(Point::ZERO, extents), Point::new(0.0, 600.0));
        assert_eq!(game.to_logical(Point::new(0.0, 600.0), extents), Point::ZERO);
    }

    #[test]
    fn test_device_round_trip() {
        let extents = Size::new(640.0, 480.0);
        let coords = LogicalCoordinates::game(extents);
        let p = Point::new(100.0, 50.0);
        let back = coords.to_logical(coords.to_device(p, extents), extents);
        assert!((back.x - p.x).abs() < 1e-3);
        assert!((back.y - p.y).abs() < 1e-3);
    }

    #[test]
    fn test_projection_maps_corners_to_clip_space() {
        let coords = LogicalCoordinates::gui(Size::new(200.0, 100.0));
        let m = coords.projection();
        assert_eq!(project(&m, coords.top_left()), (-1.0, 1.0));
        assert_eq!(project(&m, coords.bottom_right()), (1.0, -1.0));
    }

    #[test]
    fn test_specified_falls_back_to_gui() {
        let extents = Size::new(10.0, 10.0);
        let resolved =
            LogicalCoordinates::resolve(LogicalCoordinateSystem::Specified, extents, None);
        assert_eq!(resolved, LogicalCoordinates::gui(extents));

        let explicit = LogicalCoordinates::new(Point::new(-1.0, -1.0), Point::new(1.0, 1.0));
        let resolved = LogicalCoordinates::resolve(
            LogicalCoordinateSystem::Specified,
            extents,
            Some(explicit),
        );
        assert_eq!(resolved, explicit);
    }
}
