//! Integration tests for stencil clipping and scissoring through a context

use tessera_gpu::backend::StencilFunc;
use tessera_gpu::{
    BackendCommand, DeviceRect, RecordingBackend, RenderConfig, RenderingContext, ScopedClip,
    StencilState,
};
use tessera_paint::{Color, LogicalCoordinateSystem, Operation, Path, Point, Rect, Size};

fn context(config: RenderConfig) -> RenderingContext<RecordingBackend> {
    let mut ctx = RenderingContext::new(RecordingBackend::new(), config).unwrap();
    // Power-of-two extents keep the pixel mapping exact
    ctx.begin_frame(Size::new(128.0, 128.0)).unwrap();
    ctx
}

fn fill(rect: Rect) -> Operation {
    Operation::FillRect {
        rect,
        brush: Color::RED.into(),
    }
}

#[test]
fn test_nested_clips_unwind_to_disabled_stencil() {
    let mut ctx = context(RenderConfig::default());
    let before = ctx.backend().stencil();
    assert_eq!(before, StencilState::Disabled);

    let steps = [
        (Operation::ClipToRect(Rect::new(10.0, 10.0, 60.0, 60.0)), 1),
        (Operation::ClipToRect(Rect::new(30.0, 30.0, 60.0, 60.0)), 2),
        (Operation::ResetClip, 1),
        (Operation::ResetClip, 0),
    ];
    for (op, depth) in steps {
        ctx.enqueue(op).unwrap();
        ctx.flush().unwrap();
        assert_eq!(ctx.clip_depth(), depth);
        assert_eq!(ctx.backend().stencil().is_enabled(), depth > 0);
    }
    assert_eq!(ctx.backend().stencil(), before);
    ctx.end_frame().unwrap();
}

#[test]
fn test_draws_inside_clip_test_the_innermost_mask() {
    let mut ctx = context(RenderConfig::default());
    ctx.enqueue(Operation::ClipToRect(Rect::new(0.0, 0.0, 50.0, 50.0)))
        .unwrap();
    ctx.enqueue(Operation::ClipToPath(Path::circle(Point::new(25.0, 25.0), 10.0)))
        .unwrap();
    ctx.enqueue(fill(Rect::new(0.0, 0.0, 100.0, 100.0))).unwrap();
    ctx.enqueue(Operation::ResetClip).unwrap();
    ctx.enqueue(Operation::ResetClip).unwrap();
    ctx.end_frame().unwrap();

    let draws = ctx.backend().recorded_draws();
    let fill = draws
        .iter()
        .find(|d| d.stencil.writes_color() && d.vertices[0].rgba == Color::RED.to_array())
        .unwrap();
    assert_eq!(
        fill.stencil,
        StencilState::Test {
            reference: 2,
            compare: StencilFunc::Equal
        }
    );
    // Mask geometry never writes color
    assert!(draws
        .iter()
        .filter(|d| matches!(d.stencil, StencilState::Write { .. }))
        .all(|d| d.vertices.iter().all(|v| v.rgba == Color::WHITE.to_array())));
    assert_eq!(ctx.backend().stencil(), StencilState::Disabled);
}

#[test]
fn test_first_clip_clears_the_stencil_once() {
    let mut ctx = context(RenderConfig::default());
    ctx.backend_mut().take_commands();
    ctx.enqueue(Operation::ClipToRect(Rect::new(0.0, 0.0, 50.0, 50.0)))
        .unwrap();
    ctx.enqueue(Operation::ClipToRect(Rect::new(0.0, 0.0, 20.0, 20.0)))
        .unwrap();
    ctx.flush().unwrap();

    let clears = ctx
        .backend()
        .commands()
        .iter()
        .filter(|c| matches!(c, BackendCommand::Clear(_)))
        .count();
    assert_eq!(clears, 1);
}

#[test]
fn test_scoped_clip_resets_on_scope_exit() {
    let mut ctx = context(RenderConfig::default());
    {
        let mut clip = ScopedClip::rect(&mut ctx, Rect::new(0.0, 0.0, 40.0, 40.0)).unwrap();
        clip.enqueue(fill(Rect::new(0.0, 0.0, 80.0, 80.0))).unwrap();
        clip.flush().unwrap();
        assert_eq!(clip.clip_depth(), 1);
    }
    ctx.flush().unwrap();
    assert_eq!(ctx.clip_depth(), 0);
    assert_eq!(ctx.backend().stencil(), StencilState::Disabled);
}

#[test]
fn test_scissor_is_intersected_and_mapped_to_pixels() {
    let mut ctx = context(RenderConfig::default());
    ctx.enqueue(Operation::ScissorOn(Rect::new(10.0, 10.0, 50.0, 50.0)))
        .unwrap();
    ctx.enqueue(Operation::ScissorOn(Rect::new(30.0, 0.0, 50.0, 30.0)))
        .unwrap();
    ctx.enqueue(fill(Rect::new(0.0, 0.0, 100.0, 100.0))).unwrap();
    ctx.enqueue(Operation::ScissorOff).unwrap();
    ctx.enqueue(Operation::ScissorOff).unwrap();
    ctx.enqueue(fill(Rect::new(0.0, 0.0, 10.0, 10.0))).unwrap();
    ctx.end_frame().unwrap();

    let draws = ctx.backend().recorded_draws();
    assert_eq!(draws.len(), 2);
    assert_eq!(draws[0].scissor, Some(DeviceRect::new(30, 10, 30, 20)));
    assert_eq!(draws[1].scissor, None);
}

#[test]
fn test_scissor_follows_game_coordinates() {
    let mut ctx = context(RenderConfig {
        logical_coordinate_system: LogicalCoordinateSystem::AutomaticGame,
        ..Default::default()
    });
    // Logical Y grows upwards: the rect sits 64 units above the bottom edge
    ctx.enqueue(Operation::ScissorOn(Rect::new(16.0, 64.0, 32.0, 32.0)))
        .unwrap();
    ctx.enqueue(fill(Rect::new(0.0, 0.0, 50.0, 50.0))).unwrap();
    ctx.enqueue(Operation::ScissorOff).unwrap();
    ctx.end_frame().unwrap();

    let draws = ctx.backend().recorded_draws();
    assert_eq!(draws[0].scissor, Some(DeviceRect::new(16, 32, 32, 32)));
}
