//! Queue partitioning and batch dispatch throughput

use criterion::{black_box, criterion_group, criterion_main, Criterion};
use tessera_gpu::{OperationQueue, RecordingBackend, RenderConfig, RenderingContext};
use tessera_paint::{Brush, Color, Gradient, Operation, Point, Rect, Size};

fn operations(n: usize) -> Vec<Operation> {
    let gradient = Gradient::linear_simple(
        Point::ZERO,
        Point::new(10.0, 0.0),
        Color::RED,
        Color::BLUE,
    );
    (0..n)
        .map(|i| {
            let rect = Rect::new((i % 100) as f32, (i / 100) as f32, 4.0, 4.0);
            // Mostly solid runs with an occasional gradient breaking them
            let brush: Brush = if i % 50 == 49 {
                gradient.clone().into()
            } else {
                Color::GREEN.into()
            };
            Operation::FillRect { rect, brush }
        })
        .collect()
}

fn bench_enqueue(c: &mut Criterion) {
    let ops = operations(10_000);
    c.bench_function("enqueue_10k", |b| {
        b.iter(|| {
            let mut queue = OperationQueue::new(RenderConfig::default().vertex_capacity);
            for op in &ops {
                queue.enqueue(op.clone());
            }
            black_box(queue.batches().len())
        })
    });
}

fn bench_frame(c: &mut Criterion) {
    let ops = operations(10_000);
    let mut ctx = match RenderingContext::new(RecordingBackend::new(), RenderConfig::default()) {
        Ok(ctx) => ctx,
        Err(err) => panic!("failed to create context: {err}"),
    };
    c.bench_function("render_10k", |b| {
        b.iter(|| {
            ctx.backend_mut().take_commands();
            let stats = ctx.render(Size::new(512.0, 512.0), None, |ctx| {
                ctx.enqueue_all(ops.iter().cloned())
            });
            black_box(stats.map(|s| s.draw_calls))
        })
    });
}

criterion_group!(benches, bench_enqueue, bench_frame);
criterion_main!(benches);
