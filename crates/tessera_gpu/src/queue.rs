//! Operation queue and batcher
//!
//! Operations are recorded in submission order. Each enqueue either extends
//! the last batch or starts a new one, so the batches always partition the
//! queue into contiguous runs of mutually compatible operations. No GPU work
//! happens here.

use tessera_paint::{Operation, OperationKind};

/// Estimated vertices of curved geometry (fills and strokes through lyon)
const CURVE_VERTEX_ESTIMATE: usize = 192;

/// Half-open index range `[first, second)` into the queue
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Batch {
    pub first: usize,
    pub second: usize,
}

impl Batch {
    pub fn len(&self) -> usize {
        self.second - self.first
    }

    pub fn is_empty(&self) -> bool {
        self.first == self.second
    }

    pub fn range(&self) -> std::ops::Range<usize> {
        self.first..self.second
    }
}

/// Vertices one operation is expected to emit
pub fn vertices_per_operation(op: &Operation) -> usize {
    match op {
        Operation::DrawPixel { .. } => 1,
        Operation::DrawLine { .. } => 6,
        Operation::DrawRect { .. } => 24,
        Operation::FillRect { .. } => 6,
        Operation::DrawShape { shape, .. } | Operation::FillShape { shape, .. } => {
            (shape.points.len().max(3)) * 6
        }
        Operation::DrawMesh { mesh, .. } => mesh.vertex_count().max(1),
        Operation::DrawGlyph(draw) => {
            let paper = if draw.appearance.paper.is_some() { 6 } else { 0 };
            let effect = draw
                .appearance
                .effect
                .map(|e| 6 * e.sample_count() as usize)
                .unwrap_or(0);
            6 + paper + effect
        }
        _ => CURVE_VERTEX_ESTIMATE,
    }
}

/// Records operations and partitions them into batches
#[derive(Debug)]
pub struct OperationQueue {
    operations: Vec<Operation>,
    batches: Vec<Batch>,
    vertex_capacity: usize,
}

impl OperationQueue {
    /// `vertex_capacity` is the vertex array capacity that bounds batch sizes
    pub fn new(vertex_capacity: usize) -> Self {
        Self {
            operations: Vec::new(),
            batches: Vec::new(),
            vertex_capacity: vertex_capacity.max(1),
        }
    }

    /// Most operations of `op`'s kind a single batch may hold
    pub fn max_operations(&self, op: &Operation) -> usize {
        let kind = op.kind();
        if kind.is_state() || kind.is_clear() || kind == OperationKind::DrawEntities {
            return 1;
        }
        (self.vertex_capacity / vertices_per_operation(op)).max(1)
    }

    pub fn enqueue(&mut self, op: Operation) {
        let index = self.operations.len();
        let extends = match (self.batches.last(), self.operations.last()) {
            (Some(batch), Some(last)) => {
                last.batchable_with(&op) && batch.len() < self.max_operations(&op)
            }
            _ => false,
        };
        if extends {
            if let Some(batch) = self.batches.last_mut() {
                batch.second = index + 1;
            }
        } else {
            self.batches.push(Batch {
                first: index,
                second: index + 1,
            });
        }
        self.operations.push(op);
    }

    pub fn operations(&self) -> &[Operation] {
        &self.operations
    }

    pub fn batches(&self) -> &[Batch] {
        &self.batches
    }

    pub fn len(&self) -> usize {
        self.operations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.operations.is_empty()
    }

    pub fn clear(&mut self) {
        self.operations.clear();
        self.batches.clear();
    }

    /// Take the queued operations and their batches, leaving the queue empty
    pub fn drain(&mut self) -> (Vec<Operation>, Vec<Batch>) {
        (
            std::mem::take(&mut self.operations),
            std::mem::take(&mut self.batches),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tessera_paint::{
        Brush, Color, FontId, Glyph, GlyphAppearance, GlyphDraw, Gradient, Point, Rect, Size,
        SourceRange, TextDirection, TextEffect,
    };

    fn fill(brush: impl Into<Brush>) -> Operation {
        Operation::FillRect {
            rect: Rect::new(0.0, 0.0, 10.0, 10.0),
            brush: brush.into(),
        }
    }

    fn glyph(font: u32, appearance: GlyphAppearance) -> Operation {
        Operation::DrawGlyph(GlyphDraw {
            position: Point::ZERO,
            glyph: Glyph {
                source: SourceRange::new(0, 1),
                direction: TextDirection::LeftToRight,
                glyph_id: 5,
                codepoint: 'a',
                advance: Size::new(8.0, 0.0),
                offset: Point::ZERO,
                uses_fallback_font: false,
                is_whitespace: false,
            },
            font: FontId(font),
            appearance,
        })
    }

    #[test]
    fn test_solid_run_then_gradient() {
        let mut queue = OperationQueue::new(1024);
        queue.enqueue(fill(Color::RED));
        queue.enqueue(fill(Color::RED));
        queue.enqueue(fill(Color::RED));
        queue.enqueue(fill(Gradient::linear_simple(
            Point::ZERO,
            Point::new(1.0, 0.0),
            Color::RED,
            Color::BLUE,
        )));
        assert_eq!(
            queue.batches(),
            &[Batch { first: 0, second: 3 }, Batch { first: 3, second: 4 }]
        );
    }

    #[test]
    fn test_batches_respect_max_operations() {
        // 60 vertices / 6 per rect = 10 rects per batch
        let mut queue = OperationQueue::new(60);
        for _ in 0..25 {
            queue.enqueue(fill(Color::GREEN));
        }
        let sizes: Vec<usize> = queue.batches().iter().map(Batch::len).collect();
        assert_eq!(sizes, vec![10, 10, 5]);
    }

    #[test]
    fn test_state_operations_are_singletons() {
        let mut queue = OperationQueue::new(1024);
        queue.enqueue(Operation::ScissorOn(Rect::new(0.0, 0.0, 1.0, 1.0)));
        queue.enqueue(Operation::ScissorOff);
        queue.enqueue(Operation::ScissorOff);
        assert_eq!(queue.batches().len(), 3);
        assert!(queue.batches().iter().all(|b| b.len() == 1));
    }

    #[test]
    fn test_glyph_batches_key_on_font_and_effect() {
        let plain = GlyphAppearance::new(Color::BLACK);
        let outlined = plain.with_effect(TextEffect::outline(Color::WHITE, 1.0));
        let mut queue = OperationQueue::new(4096);
        queue.enqueue(glyph(1, plain));
        queue.enqueue(glyph(1, plain.with_paper(Color::WHITE)));
        queue.enqueue(glyph(2, plain));
        queue.enqueue(glyph(2, outlined));
        let sizes: Vec<usize> = queue.batches().iter().map(Batch::len).collect();
        assert_eq!(sizes, vec![2, 1, 1]);
    }

    #[test]
    fn test_glyph_capacity_grows_with_effect() {
        let queue = OperationQueue::new(1200);
        let plain = glyph(1, GlyphAppearance::new(Color::BLACK));
        let outlined = glyph(
            1,
            GlyphAppearance::new(Color::BLACK).with_effect(TextEffect::outline(Color::WHITE, 1.0)),
        );
        assert_eq!(queue.max_operations(&plain), 200);
        // 6 + 6 * 9 vertices per outlined glyph
        assert_eq!(queue.max_operations(&outlined), 20);
    }

    #[test]
    fn test_drain_empties_queue() {
        let mut queue = OperationQueue::new(64);
        queue.enqueue(fill(Color::RED));
        let (ops, batches) = queue.drain();
        assert_eq!(ops.len(), 1);
        assert_eq!(batches.len(), 1);
        assert!(queue.is_empty());
        assert!(queue.batches().is_empty());
    }
}
