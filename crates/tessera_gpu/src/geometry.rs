//! Geometry generation
//!
//! Turns paint-model shapes into triangle lists. Curved outlines and fills go
//! through lyon; rects, lines and quads are emitted directly.

use lyon::lyon_tessellation::{
    BuffersBuilder, FillOptions, FillTessellator, FillVertex, StrokeOptions, StrokeTessellator,
    StrokeVertex, VertexBuffers,
};
use lyon::math::point;
use lyon::path::PathEvent;
use tessera_paint::{
    Arc, CornerRadius, LineCap, LineJoin, LineStipple, Path, PathBuilder, PathCommand, Pen, Point,
    Rect, RoundedRect,
};

const TOLERANCE: f32 = 0.1;

/// Maximum angle covered by one flattened arc segment
const ARC_STEP: f32 = std::f32::consts::PI / 32.0;

/// Triangle list produced by tessellation
#[derive(Debug, Default, Clone, PartialEq)]
pub struct Triangles {
    pub positions: Vec<Point>,
}

impl Triangles {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.positions.is_empty()
    }

    pub fn len(&self) -> usize {
        self.positions.len()
    }

    fn from_buffers(buffers: VertexBuffers<Point, u32>) -> Self {
        let positions = buffers
            .indices
            .iter()
            .filter_map(|&i| buffers.vertices.get(i as usize).copied())
            .collect();
        Self { positions }
    }
}

/// Two triangles covering `rect`
pub fn quad(rect: Rect) -> [Point; 6] {
    let (l, t, r, b) = (rect.x, rect.y, rect.right(), rect.bottom());
    [
        Point::new(l, t),
        Point::new(r, t),
        Point::new(l, b),
        Point::new(r, t),
        Point::new(r, b),
        Point::new(l, b),
    ]
}

/// Texture coordinates matching [`quad`] for the sub-rectangle `uv`
pub fn quad_uvs(uv: Rect) -> [Point; 6] {
    quad(uv)
}

/// A line of the given width as a quad (two triangles)
pub fn line_quad(from: Point, to: Point, width: f32) -> Option<[Point; 6]> {
    let dx = to.x - from.x;
    let dy = to.y - from.y;
    let len = (dx * dx + dy * dy).sqrt();
    if len <= f32::EPSILON {
        return None;
    }
    let half = width.max(1.0) / 2.0;
    let nx = -dy / len * half;
    let ny = dx / len * half;
    let a = Point::new(from.x + nx, from.y + ny);
    let b = Point::new(to.x + nx, to.y + ny);
    let c = Point::new(to.x - nx, to.y - ny);
    let d = Point::new(from.x - nx, from.y - ny);
    Some([a, b, d, b, c, d])
}

/// Split a segment into the dashes of a stipple pattern
pub fn stipple_segments(from: Point, to: Point, stipple: &LineStipple) -> Vec<(Point, Point)> {
    let length = from.distance(to);
    if length <= f32::EPSILON {
        return Vec::new();
    }
    let at = |d: f32| {
        let t = d / length;
        Point::new(from.x + (to.x - from.x) * t, from.y + (to.y - from.y) * t)
    };
    stipple
        .dashes(length)
        .into_iter()
        .map(|(start, end)| (at(start), at(end)))
        .collect()
}

/// Outline of a rect as four segments, clockwise from the top-left corner
pub fn rect_segments(rect: Rect) -> [(Point, Point); 4] {
    let tl = Point::new(rect.x, rect.y);
    let tr = Point::new(rect.right(), rect.y);
    let br = Point::new(rect.right(), rect.bottom());
    let bl = Point::new(rect.x, rect.bottom());
    [(tl, tr), (tr, br), (br, bl), (bl, tl)]
}

/// Closed polygon outline as segments
pub fn polygon_segments(points: &[Point]) -> Vec<(Point, Point)> {
    if points.len() < 2 {
        return Vec::new();
    }
    points
        .iter()
        .zip(points.iter().cycle().skip(1))
        .map(|(a, b)| (*a, *b))
        .collect()
}

/// Path of a rounded rect, corners traced with arcs
pub fn rounded_rect_path(rounded: &RoundedRect) -> Path {
    use std::f32::consts::{FRAC_PI_2, PI};

    let rect = rounded.rect;
    let CornerRadius {
        top_left,
        top_right,
        bottom_right,
        bottom_left,
    } = rounded.corner_radius.clamped_to(&rect);
    let (l, t, r, b) = (rect.x, rect.y, rect.right(), rect.bottom());

    PathBuilder::new()
        .move_to(l + top_left, t)
        .line_to(r - top_right, t)
        .arc_to(r - top_right, t + top_right, top_right, -FRAC_PI_2, 0.0)
        .line_to(r, b - bottom_right)
        .arc_to(r - bottom_right, b - bottom_right, bottom_right, 0.0, FRAC_PI_2)
        .line_to(l + bottom_left, b)
        .arc_to(l + bottom_left, b - bottom_left, bottom_left, FRAC_PI_2, PI)
        .line_to(l, t + top_left)
        .arc_to(l + top_left, t + top_left, top_left, PI, PI + FRAC_PI_2)
        .close()
        .build()
}

/// Open path along an arc
pub fn arc_path(arc: &Arc) -> Path {
    let start = arc.point_at(arc.start_angle);
    PathBuilder::new()
        .move_to(start.x, start.y)
        .arc_to(
            arc.center.x,
            arc.center.y,
            arc.radius,
            arc.start_angle,
            arc.end_angle,
        )
        .build()
}

/// Closed pie slice of an arc, for filling
pub fn pie_path(arc: &Arc) -> Path {
    let start = arc.point_at(arc.start_angle);
    PathBuilder::new()
        .move_to(arc.center.x, arc.center.y)
        .line_to(start.x, start.y)
        .arc_to(
            arc.center.x,
            arc.center.y,
            arc.radius,
            arc.start_angle,
            arc.end_angle,
        )
        .close()
        .build()
}

/// Convert a path to lyon path events, flattening arcs into line segments
fn path_to_lyon_events(path: &Path) -> Vec<PathEvent> {
    let mut events = Vec::new();
    let mut first_point: Option<Point> = None;
    let mut current_point = Point::ZERO;

    let begin_if_needed = |events: &mut Vec<PathEvent>, first: &mut Option<Point>, at: Point| {
        if first.is_none() {
            events.push(PathEvent::Begin {
                at: point(at.x, at.y),
            });
            *first = Some(at);
        }
    };

    for cmd in path.commands() {
        match *cmd {
            PathCommand::MoveTo(p) => {
                if let Some(first) = first_point {
                    events.push(PathEvent::End {
                        last: point(current_point.x, current_point.y),
                        first: point(first.x, first.y),
                        close: false,
                    });
                }
                events.push(PathEvent::Begin {
                    at: point(p.x, p.y),
                });
                first_point = Some(p);
                current_point = p;
            }
            PathCommand::LineTo(p) => {
                begin_if_needed(&mut events, &mut first_point, current_point);
                events.push(PathEvent::Line {
                    from: point(current_point.x, current_point.y),
                    to: point(p.x, p.y),
                });
                current_point = p;
            }
            PathCommand::QuadTo { control, end } => {
                begin_if_needed(&mut events, &mut first_point, current_point);
                events.push(PathEvent::Quadratic {
                    from: point(current_point.x, current_point.y),
                    ctrl: point(control.x, control.y),
                    to: point(end.x, end.y),
                });
                current_point = end;
            }
            PathCommand::CubicTo {
                control1,
                control2,
                end,
            } => {
                begin_if_needed(&mut events, &mut first_point, current_point);
                events.push(PathEvent::Cubic {
                    from: point(current_point.x, current_point.y),
                    ctrl1: point(control1.x, control1.y),
                    ctrl2: point(control2.x, control2.y),
                    to: point(end.x, end.y),
                });
                current_point = end;
            }
            PathCommand::ArcTo {
                center,
                radius,
                start_angle,
                end_angle,
            } => {
                let arc = Arc::new(center, radius, start_angle, end_angle);
                let start = arc.point_at(start_angle);
                if first_point.is_none() {
                    begin_if_needed(&mut events, &mut first_point, start);
                    current_point = start;
                }
                if radius <= 0.0 {
                    continue;
                }
                let sweep = arc.sweep();
                let steps = ((sweep.abs() / ARC_STEP).ceil() as usize).max(1);
                let mut from = current_point;
                if from.distance(start) > f32::EPSILON {
                    events.push(PathEvent::Line {
                        from: point(from.x, from.y),
                        to: point(start.x, start.y),
                    });
                    from = start;
                }
                for i in 1..=steps {
                    let to = arc.point_at(start_angle + sweep * i as f32 / steps as f32);
                    events.push(PathEvent::Line {
                        from: point(from.x, from.y),
                        to: point(to.x, to.y),
                    });
                    from = to;
                }
                current_point = from;
            }
            PathCommand::Close => {
                if let Some(first) = first_point {
                    events.push(PathEvent::End {
                        last: point(current_point.x, current_point.y),
                        first: point(first.x, first.y),
                        close: true,
                    });
                    current_point = first;
                    first_point = None;
                }
            }
        }
    }

    if let Some(first) = first_point {
        events.push(PathEvent::End {
            last: point(current_point.x, current_point.y),
            first: point(first.x, first.y),
            close: false,
        });
    }

    events
}

/// Tessellate the interior of a path
pub fn tessellate_fill(path: &Path) -> Triangles {
    let events = path_to_lyon_events(path);
    if events.is_empty() {
        return Triangles::new();
    }

    let mut geometry: VertexBuffers<Point, u32> = VertexBuffers::new();
    let mut tessellator = FillTessellator::new();
    let options = FillOptions::default().with_tolerance(TOLERANCE);

    let result = tessellator.tessellate(
        events.iter().cloned(),
        &options,
        &mut BuffersBuilder::new(&mut geometry, |vertex: FillVertex| {
            let p = vertex.position();
            Point::new(p.x, p.y)
        }),
    );

    if let Err(err) = result {
        tracing::warn!("path fill tessellation failed: {:?}", err);
        return Triangles::new();
    }

    Triangles::from_buffers(geometry)
}

/// Tessellate the outline of a path stroked with `pen`
pub fn tessellate_stroke(path: &Path, pen: &Pen) -> Triangles {
    let events = path_to_lyon_events(path);
    if events.is_empty() {
        return Triangles::new();
    }

    let mut geometry: VertexBuffers<Point, u32> = VertexBuffers::new();
    let mut tessellator = StrokeTessellator::new();

    let options = StrokeOptions::default()
        .with_line_width(pen.width.max(1.0))
        .with_tolerance(TOLERANCE)
        .with_line_cap(match pen.line_cap {
            LineCap::Butt => lyon::lyon_tessellation::LineCap::Butt,
            LineCap::Round => lyon::lyon_tessellation::LineCap::Round,
            LineCap::Square => lyon::lyon_tessellation::LineCap::Square,
        })
        .with_line_join(match pen.line_join {
            LineJoin::Miter => lyon::lyon_tessellation::LineJoin::Miter,
            LineJoin::Round => lyon::lyon_tessellation::LineJoin::Round,
            LineJoin::Bevel => lyon::lyon_tessellation::LineJoin::Bevel,
        });

    let result = tessellator.tessellate(
        events.iter().cloned(),
        &options,
        &mut BuffersBuilder::new(&mut geometry, |vertex: StrokeVertex| {
            let p = vertex.position();
            Point::new(p.x, p.y)
        }),
    );

    if let Err(err) = result {
        tracing::warn!("path stroke tessellation failed: {:?}", err);
        return Triangles::new();
    }

    Triangles::from_buffers(geometry)
}

/// Texture coordinate of `p` within `bounds`, mapped onto the `uv` sub-rect
pub fn map_uv(p: Point, bounds: &Rect, uv: &Rect) -> Point {
    let fx = if bounds.width > 0.0 {
        (p.x - bounds.x) / bounds.width
    } else {
        0.0
    };
    let fy = if bounds.height > 0.0 {
        (p.y - bounds.y) / bounds.height
    } else {
        0.0
    };
    Point::new(uv.x + fx * uv.width, uv.y + fy * uv.height)
}
