//! Vertex array instance
//!
//! A fixed-capacity CPU staging buffer for geometry. Appends never exceed
//! the capacity: when the buffer is full the pending vertices are drawn and
//! the buffer restarts, so callers can stream any amount of geometry through
//! it. Primitive mode and transformation are bound per draw call, changing
//! either draws what is pending first.

use tessera_paint::{Color, Point};

use crate::backend::{Mat4, RenderBackend};
use crate::error::{Checked, RenderError, Result};

/// GPU vertex: position, straight-alpha color and texture coordinate
#[repr(C)]
#[derive(Clone, Copy, Debug, Default, PartialEq, bytemuck::Pod, bytemuck::Zeroable)]
pub struct Vertex {
    pub xyz: [f32; 3],
    pub rgba: [f32; 4],
    pub uv: [f32; 2],
}

impl Vertex {
    pub fn new(position: Point, color: Color) -> Self {
        Self {
            xyz: [position.x, position.y, 0.0],
            rgba: color.to_array(),
            uv: [0.0, 0.0],
        }
    }

    pub fn textured(position: Point, color: Color, uv: Point) -> Self {
        Self {
            xyz: [position.x, position.y, 0.0],
            rgba: color.to_array(),
            uv: [uv.x, uv.y],
        }
    }

    pub fn position(&self) -> Point {
        Point::new(self.xyz[0], self.xyz[1])
    }
}

/// Primitive topology of a draw call
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum PrimitiveMode {
    Points,
    Lines,
    LineStrip,
    #[default]
    Triangles,
    TriangleStrip,
}

impl PrimitiveMode {
    /// Vertices per independent primitive; strips share vertices and have none
    pub fn primitive_vertex_count(self) -> Option<usize> {
        match self {
            PrimitiveMode::Points => Some(1),
            PrimitiveMode::Lines => Some(2),
            PrimitiveMode::Triangles => Some(3),
            PrimitiveMode::LineStrip | PrimitiveMode::TriangleStrip => None,
        }
    }

    /// Largest vertex count `<= n` made of whole primitives
    fn whole_primitives(self, n: usize) -> usize {
        match self.primitive_vertex_count() {
            Some(per) => n - n % per,
            None => n,
        }
    }
}

/// The reusable geometry buffer staged before a GPU draw call
#[derive(Debug)]
pub struct VertexArray {
    vertices: Vec<Vertex>,
    capacity: usize,
    mode: PrimitiveMode,
    transformation: Option<Mat4>,
    /// First vertex not yet drawn
    cursor: usize,
    /// Range of `vertices` the backend currently holds
    uploaded: Option<(usize, usize)>,
    executions: usize,
    draw_calls: usize,
}

impl VertexArray {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            vertices: Vec::with_capacity(capacity),
            capacity,
            mode: PrimitiveMode::default(),
            transformation: None,
            cursor: 0,
            uploaded: None,
            executions: 0,
            draw_calls: 0,
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn size(&self) -> usize {
        self.vertices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.vertices.is_empty()
    }

    pub fn room(&self) -> usize {
        self.capacity - self.vertices.len()
    }

    pub fn room_for(&self, n: usize) -> bool {
        self.room() >= n
    }

    pub fn vertices(&self) -> &[Vertex] {
        &self.vertices
    }

    /// Vertices appended but not yet drawn
    pub fn pending(&self) -> usize {
        self.vertices.len() - self.cursor
    }

    pub fn mode(&self) -> PrimitiveMode {
        self.mode
    }

    pub fn transformation(&self) -> Option<&Mat4> {
        self.transformation.as_ref()
    }

    /// Number of times the buffer has been drawn and restarted
    pub fn executions(&self) -> usize {
        self.executions
    }

    /// Number of backend draw calls issued
    pub fn draw_calls(&self) -> usize {
        self.draw_calls
    }

    pub fn set_mode<B: RenderBackend>(
        &mut self,
        backend: &mut B,
        mode: PrimitiveMode,
    ) -> Result<()> {
        if mode != self.mode {
            if self.pending() > 0 {
                self.execute(backend)?;
            }
            self.mode = mode;
        }
        Ok(())
    }

    pub fn set_transformation<B: RenderBackend>(
        &mut self,
        backend: &mut B,
        transformation: Option<Mat4>,
    ) -> Result<()> {
        if transformation != self.transformation {
            if self.pending() > 0 {
                self.execute(backend)?;
            }
            backend.set_transform(transformation).checked("set_transform")?;
            self.transformation = transformation;
        }
        Ok(())
    }

    /// Make room for `n` vertices, executing pending geometry if needed.
    ///
    /// Fails when `n` exceeds what the array can ever hold.
    pub fn ensure_room<B: RenderBackend>(&mut self, backend: &mut B, n: usize) -> Result<()> {
        if n > self.capacity {
            return Err(RenderError::NotEnoughRoom {
                requested: n,
                capacity: self.capacity,
            });
        }
        if !self.room_for(n) {
            self.execute(backend)?;
        }
        Ok(())
    }

    pub fn push_back<B: RenderBackend>(&mut self, backend: &mut B, vertex: Vertex) -> Result<()> {
        if self.room() == 0 {
            self.overflow(backend)?;
            if self.room() == 0 {
                self.execute(backend)?;
            }
        }
        self.vertices.push(vertex);
        Ok(())
    }

    pub fn emplace_back<B: RenderBackend>(
        &mut self,
        backend: &mut B,
        position: Point,
        color: Color,
        uv: Option<Point>,
    ) -> Result<()> {
        let vertex = match uv {
            Some(uv) => Vertex::textured(position, color, uv),
            None => Vertex::new(position, color),
        };
        self.push_back(backend, vertex)
    }

    /// Append a run of vertices.
    ///
    /// A run that fits the capacity is never split: if it does not fit the
    /// remaining room the pending vertices are executed first. Longer runs
    /// are streamed in chunks of whole primitives.
    pub fn insert<B: RenderBackend>(&mut self, backend: &mut B, vertices: &[Vertex]) -> Result<()> {
        if vertices.len() <= self.capacity {
            if !self.room_for(vertices.len()) {
                self.execute(backend)?;
            }
            self.vertices.extend_from_slice(vertices);
            return Ok(());
        }

        let chunk = self.mode.whole_primitives(self.capacity).max(1);
        for part in vertices.chunks(chunk) {
            if !self.room_for(part.len()) {
                self.execute(backend)?;
            }
            self.vertices.extend_from_slice(part);
        }
        Ok(())
    }

    /// Draw `count` vertices from the cursor in one call
    pub fn draw<B: RenderBackend>(&mut self, backend: &mut B, count: usize) -> Result<()> {
        self.check_span(count)?;
        if count == 0 {
            return Ok(());
        }
        let first = self.upload(backend, count)?;
        backend.draw(self.mode, first, count).checked("draw")?;
        self.draw_calls += 1;
        self.cursor += count;
        Ok(())
    }

    /// Draw `count` vertices from the cursor with a texture barrier before
    /// every `primitive_vertex_count() * skip` vertices.
    ///
    /// Used when a draw samples the target it writes to, so overlapping
    /// primitives must see each other's output.
    pub fn draw_with_barrier<B: RenderBackend>(
        &mut self,
        backend: &mut B,
        count: usize,
        skip: usize,
    ) -> Result<()> {
        let Some(per_primitive) = self.mode.primitive_vertex_count() else {
            return Err(RenderError::CannotUseBarrier { mode: self.mode });
        };
        if !backend.supports_texture_barrier() {
            return Err(RenderError::CannotUseBarrier { mode: self.mode });
        }
        self.check_span(count)?;

        let chunk = per_primitive * skip.max(1);
        let mut remaining = count;
        while remaining > 0 {
            let n = remaining.min(chunk);
            let first = self.upload(backend, n)?;
            backend.texture_barrier().checked("texture_barrier")?;
            backend.draw(self.mode, first, n).checked("draw")?;
            self.draw_calls += 1;
            self.cursor += n;
            remaining -= n;
        }
        Ok(())
    }

    /// Draw everything pending and restart the buffer.
    ///
    /// Trailing vertices that do not form a whole primitive are dropped.
    pub fn execute<B: RenderBackend>(&mut self, backend: &mut B) -> Result<()> {
        let drawable = self.mode.whole_primitives(self.pending());
        if drawable < self.pending() {
            tracing::warn!(
                "dropping {} vertices of an incomplete {:?} primitive",
                self.pending() - drawable,
                self.mode
            );
        }
        self.draw(backend, drawable)?;
        self.restart(self.vertices.len());
        Ok(())
    }

    /// Discard all buffered vertices without drawing them
    pub fn discard(&mut self) {
        self.vertices.clear();
        self.cursor = 0;
        self.uploaded = None;
    }

    /// Auto-execute when a single append overflows; an incomplete trailing
    /// primitive is kept so the caller can finish it after the restart.
    fn overflow<B: RenderBackend>(&mut self, backend: &mut B) -> Result<()> {
        let drawable = self.mode.whole_primitives(self.pending());
        self.draw(backend, drawable)?;
        self.restart(self.cursor);
        Ok(())
    }

    /// Restart the buffer, keeping the vertices from `keep_from` onwards
    fn restart(&mut self, keep_from: usize) {
        let had_vertices = !self.vertices.is_empty();
        self.vertices.drain(..keep_from);
        self.cursor = 0;
        self.uploaded = None;
        if had_vertices {
            self.executions += 1;
        }
    }

    fn check_span(&self, count: usize) -> Result<()> {
        if self.cursor + count > self.vertices.len() {
            return Err(RenderError::InvalidDrawCount {
                first: self.cursor,
                count,
                size: self.vertices.len(),
            });
        }
        Ok(())
    }

    /// Ensure the backend holds `[cursor, cursor + count)`; returns the
    /// index of the cursor within the uploaded range.
    fn upload<B: RenderBackend>(&mut self, backend: &mut B, count: usize) -> Result<usize> {
        let end = self.cursor + count;
        match self.uploaded {
            Some((start, stop)) if start <= self.cursor && end <= stop => Ok(self.cursor - start),
            _ => {
                backend
                    .upload_vertices(&self.vertices[self.cursor..])
                    .checked("upload_vertices")?;
                self.uploaded = Some((self.cursor, self.vertices.len()));
                Ok(0)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::{BackendCommand, RecordingBackend};

    fn vertex(i: usize) -> Vertex {
        Vertex::new(Point::new(i as f32, 0.0), Color::WHITE)
    }

    fn vertices(n: usize) -> Vec<Vertex> {
        (0..n).map(vertex).collect()
    }

    fn backend() -> RecordingBackend {
        let mut backend = RecordingBackend::new();
        backend.begin_frame((100, 100)).unwrap();
        backend
    }

    #[test]
    fn test_room_for() {
        let mut backend = backend();
        let mut array = VertexArray::new(12);
        array.insert(&mut backend, &vertices(9)).unwrap();
        assert_eq!(array.room(), 3);
        assert!(array.room_for(3));
        assert!(!array.room_for(4));
    }

    #[test]
    fn test_overflowing_insert_executes_once() {
        let mut backend = backend();
        let mut array = VertexArray::new(12);
        array.insert(&mut backend, &vertices(9)).unwrap();
        assert_eq!(array.executions(), 0);

        array.insert(&mut backend, &vertices(6)).unwrap();
        assert_eq!(array.executions(), 1);
        assert_eq!(array.size(), 6);
        assert_eq!(array.draw_calls(), 1);
    }

    #[test]
    fn test_push_back_auto_executes_when_full() {
        let mut backend = backend();
        let mut array = VertexArray::new(6);
        for i in 0..7 {
            array.push_back(&mut backend, vertex(i)).unwrap();
        }
        assert_eq!(array.executions(), 1);
        assert_eq!(array.size(), 1);
        assert_eq!(array.vertices()[0], vertex(6));
    }

    #[test]
    fn test_overflow_keeps_partial_primitive() {
        let mut backend = backend();
        let mut array = VertexArray::new(4);
        for i in 0..5 {
            array.push_back(&mut backend, vertex(i)).unwrap();
        }
        // Triangle 0..3 was drawn; vertex 3 carried over and 4 appended
        assert_eq!(array.size(), 2);
        assert_eq!(array.vertices()[0], vertex(3));
        assert_eq!(backend.draws().collect::<Vec<_>>(), vec![(PrimitiveMode::Triangles, 0, 3)]);
    }

    #[test]
    fn test_long_insert_streams_whole_primitives() {
        let mut backend = backend();
        let mut array = VertexArray::new(7);
        array.insert(&mut backend, &vertices(15)).unwrap();
        assert_eq!(array.size(), 3);
        assert_eq!(array.executions(), 2);
        assert!(array.size() <= array.capacity());
    }

    #[test]
    fn test_ensure_room_rejects_oversized_hint() {
        let mut backend = backend();
        let mut array = VertexArray::new(6);
        let err = array.ensure_room(&mut backend, 7).unwrap_err();
        assert!(matches!(
            err,
            RenderError::NotEnoughRoom {
                requested: 7,
                capacity: 6
            }
        ));
    }

    #[test]
    fn test_draw_beyond_size_is_rejected() {
        let mut backend = backend();
        let mut array = VertexArray::new(12);
        array.insert(&mut backend, &vertices(3)).unwrap();
        let err = array.draw(&mut backend, 6).unwrap_err();
        assert!(matches!(
            err,
            RenderError::InvalidDrawCount {
                first: 0,
                count: 6,
                size: 3
            }
        ));
    }

    #[test]
    fn test_mode_change_executes_pending() {
        let mut backend = backend();
        let mut array = VertexArray::new(12);
        array.insert(&mut backend, &vertices(3)).unwrap();
        array.set_mode(&mut backend, PrimitiveMode::Lines).unwrap();
        assert_eq!(array.executions(), 1);
        assert_eq!(array.pending(), 0);
        assert_eq!(array.mode(), PrimitiveMode::Lines);
    }

    #[test]
    fn test_transformation_change_executes_pending() {
        let mut backend = backend();
        let mut array = VertexArray::new(12);
        array.insert(&mut backend, &vertices(3)).unwrap();
        let transform = tessera_paint::Transform2D::translate(5.0, 0.0).to_mat4();
        array
            .set_transformation(&mut backend, Some(transform))
            .unwrap();
        assert_eq!(array.executions(), 1);
        assert!(backend
            .commands()
            .contains(&BackendCommand::SetTransform(Some(transform))));

        // Unchanged transformation is a no-op
        array.insert(&mut backend, &vertices(3)).unwrap();
        array
            .set_transformation(&mut backend, Some(transform))
            .unwrap();
        assert_eq!(array.executions(), 1);
    }

    #[test]
    fn test_barrier_draw_splits_into_chunks() {
        let mut backend = backend();
        let mut array = VertexArray::new(24);
        array.insert(&mut backend, &vertices(18)).unwrap();
        array.draw_with_barrier(&mut backend, 18, 2).unwrap();

        let barriers = backend
            .commands()
            .iter()
            .filter(|c| **c == BackendCommand::TextureBarrier)
            .count();
        assert_eq!(barriers, 3);
        assert_eq!(
            backend.draws().collect::<Vec<_>>(),
            vec![
                (PrimitiveMode::Triangles, 0, 6),
                (PrimitiveMode::Triangles, 6, 6),
                (PrimitiveMode::Triangles, 12, 6)
            ]
        );
        // Everything was drawn, execute only restarts
        array.execute(&mut backend).unwrap();
        assert_eq!(array.draw_calls(), 3);
    }

    #[test]
    fn test_barrier_draw_rejects_strips() {
        let mut backend = backend();
        let mut array = VertexArray::new(12);
        array
            .set_mode(&mut backend, PrimitiveMode::TriangleStrip)
            .unwrap();
        array.insert(&mut backend, &vertices(4)).unwrap();
        let err = array.draw_with_barrier(&mut backend, 4, 1).unwrap_err();
        assert!(matches!(
            err,
            RenderError::CannotUseBarrier {
                mode: PrimitiveMode::TriangleStrip
            }
        ));
    }

    #[test]
    fn test_execute_uploads_only_undrawn_vertices() {
        let mut backend = backend();
        let mut array = VertexArray::new(12);
        array.insert(&mut backend, &vertices(6)).unwrap();
        array.draw(&mut backend, 3).unwrap();
        array.execute(&mut backend).unwrap();

        let uploads: Vec<usize> = backend
            .commands()
            .iter()
            .filter_map(|c| match c {
                BackendCommand::UploadVertices { count } => Some(*count),
                _ => None,
            })
            .collect();
        assert_eq!(uploads, vec![6]);
        assert_eq!(
            backend.draws().collect::<Vec<_>>(),
            vec![
                (PrimitiveMode::Triangles, 0, 3),
                (PrimitiveMode::Triangles, 3, 3)
            ]
        );
        assert!(array.is_empty());
    }
}
