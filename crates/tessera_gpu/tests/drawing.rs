//! Per-kind renderers as seen by the backend
//!
//! These tests verify that:
//! - Clear operations reach the backend in order
//! - Blend state and the logical operation stack are applied before drawing
//! - Stippled hairlines are split into dashes
//! - Meshes and entities draw under their own transformation
//! - Textured paint binds its texture and restores the solid program

use tessera_gpu::{
    BackendCommand, ClearTarget, PrimitiveMode, RecordingBackend, RenderConfig, RenderingContext,
    ShaderBinding,
};
use tessera_paint::{
    BlendingMode, Brush, Circle, Color, Entity, LineStipple, LogicalOperation, Mesh, Operation,
    Pen, Point, Rect, SamplingQuality, Size, TextureId, TexturePaint, Transform2D,
};

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::WARN.into()),
        )
        .with_test_writer()
        .try_init();
}

fn context() -> RenderingContext<RecordingBackend> {
    let mut ctx = RenderingContext::new(RecordingBackend::new(), RenderConfig::default()).unwrap();
    ctx.begin_frame(Size::new(128.0, 128.0)).unwrap();
    ctx.backend_mut().take_commands();
    ctx
}

fn line(x0: f32, x1: f32, width: f32) -> Operation {
    Operation::DrawLine {
        from: Point::new(x0, 10.0),
        to: Point::new(x1, 10.0),
        pen: Pen::new(Color::RED, width),
    }
}

fn triangle() -> Mesh {
    Mesh::new(vec![
        Point::new(0.0, 0.0),
        Point::new(10.0, 0.0),
        Point::new(0.0, 10.0),
    ])
}

#[test]
fn test_clears_reach_backend_in_order() {
    let mut ctx = context();
    ctx.enqueue_all([
        Operation::Clear(Color::BLUE),
        Operation::ClearDepthBuffer,
        Operation::ClearStencilBuffer,
    ])
    .unwrap();
    ctx.flush().unwrap();

    let clears: Vec<ClearTarget> = ctx
        .backend()
        .commands()
        .iter()
        .filter_map(|c| match c {
            BackendCommand::Clear(target) => Some(*target),
            _ => None,
        })
        .collect();
    assert_eq!(
        clears,
        vec![
            ClearTarget::Color(Color::BLUE),
            ClearTarget::Depth(1.0),
            ClearTarget::Stencil(0)
        ]
    );
}

#[test]
fn test_blend_and_logical_operation_stack() {
    init_tracing();
    let mut ctx = context();
    let fill = || Operation::FillRect {
        rect: Rect::new(0.0, 0.0, 8.0, 8.0),
        brush: Color::RED.into(),
    };

    ctx.enqueue_all([
        Operation::SetBlendingMode(BlendingMode::None),
        Operation::PushLogicalOperation(LogicalOperation::Xor),
        fill(),
    ])
    .unwrap();
    ctx.flush().unwrap();
    assert_eq!(
        ctx.backend().blend(),
        (BlendingMode::None, LogicalOperation::Xor)
    );

    // The second pop finds an empty stack and is ignored
    ctx.enqueue_all([
        Operation::PopLogicalOperation,
        Operation::PopLogicalOperation,
        fill(),
    ])
    .unwrap();
    ctx.flush().unwrap();
    assert_eq!(
        ctx.backend().blend(),
        (BlendingMode::None, LogicalOperation::None)
    );
}

#[test]
fn test_stippled_hairline_is_split_into_dashes() {
    let mut ctx = context();
    // Low byte on: 8 units drawn, 8 units skipped
    ctx.enqueue_all([
        Operation::LineStippleOn(LineStipple::new(1, 0x00FF)),
        line(0.0, 32.0, 1.0),
    ])
    .unwrap();
    ctx.end_frame().unwrap();

    let draws = ctx.backend().recorded_draws();
    assert_eq!(draws.len(), 1);
    assert_eq!(draws[0].mode, PrimitiveMode::Lines);
    let xs: Vec<f32> = draws[0].vertices.iter().map(|v| v.xyz[0]).collect();
    assert_eq!(xs, vec![0.0, 8.0, 16.0, 24.0]);
}

#[test]
fn test_hairline_and_wide_pens_use_different_topologies() {
    let mut ctx = context();
    ctx.enqueue_all([line(0.0, 20.0, 1.0), line(0.0, 20.0, 4.0)])
        .unwrap();
    assert_eq!(ctx.queue().batches().len(), 1);
    ctx.end_frame().unwrap();

    let draws: Vec<(PrimitiveMode, usize)> = ctx
        .backend()
        .recorded_draws()
        .iter()
        .map(|d| (d.mode, d.vertices.len()))
        .collect();
    assert_eq!(
        draws,
        vec![(PrimitiveMode::Lines, 2), (PrimitiveMode::Triangles, 6)]
    );
}

#[test]
fn test_pixels_draw_as_points() {
    let mut ctx = context();
    for i in 0..3 {
        ctx.enqueue(Operation::DrawPixel {
            point: Point::new(i as f32, 0.0),
            color: Color::WHITE,
        })
        .unwrap();
    }
    ctx.end_frame().unwrap();

    let draws = ctx.backend().recorded_draws();
    assert_eq!(draws.len(), 1);
    assert_eq!(draws[0].mode, PrimitiveMode::Points);
    assert_eq!(draws[0].vertices.len(), 3);
}

#[test]
fn test_mesh_draws_under_its_transform() {
    init_tracing();
    let mut ctx = context();
    let transform = Transform2D::translate(5.0, 5.0);
    let mut mesh = triangle();
    // Incomplete trailing triangle is ignored
    mesh.positions.push(Point::new(1.0, 1.0));

    ctx.enqueue_all([
        Operation::DrawMesh {
            mesh,
            brush: Color::GREEN.into(),
            transform: Some(transform),
        },
        Operation::FillCircle {
            circle: Circle::new(Point::new(50.0, 50.0), 10.0),
            brush: Color::GREEN.into(),
        },
    ])
    .unwrap();
    ctx.end_frame().unwrap();

    let draws = ctx.backend().recorded_draws();
    assert_eq!(draws.len(), 2);
    assert_eq!(draws[0].transform, Some(transform.to_mat4()));
    assert_eq!(draws[0].vertices.len(), 3);
    assert_eq!(draws[1].transform, None);
    assert!(!draws[1].vertices.is_empty());
    assert_eq!(draws[1].vertices.len() % 3, 0);
}

#[test]
fn test_entities_draw_one_call_per_transform() {
    let mut ctx = context();
    let entity = |dx: f32| Entity {
        mesh: triangle(),
        brush: Color::RED.into(),
        transform: Transform2D::translate(dx, 0.0),
    };
    ctx.enqueue(Operation::DrawEntities {
        entities: vec![entity(1.0), entity(2.0)],
    })
    .unwrap();
    ctx.end_frame().unwrap();

    let transforms: Vec<_> = ctx
        .backend()
        .recorded_draws()
        .iter()
        .map(|d| d.transform)
        .collect();
    assert_eq!(
        transforms,
        vec![
            Some(Transform2D::translate(1.0, 0.0).to_mat4()),
            Some(Transform2D::translate(2.0, 0.0).to_mat4())
        ]
    );
}

#[test]
fn test_textured_fill_binds_texture_and_restores_solid() {
    let mut ctx = context();
    let paint = TexturePaint::new(TextureId(4));
    ctx.enqueue(Operation::FillRect {
        rect: Rect::new(16.0, 16.0, 32.0, 32.0),
        brush: Brush::from(paint),
    })
    .unwrap();
    ctx.flush().unwrap();

    let draws = ctx.backend().recorded_draws();
    assert_eq!(draws.len(), 1);
    assert_eq!(
        draws[0].program,
        Some(ShaderBinding::Textured {
            texture: TextureId(4),
            quality: SamplingQuality::Linear
        })
    );
    // Texture coordinates span the whole texture over the rect
    let uvs: Vec<[f32; 2]> = draws[0].vertices.iter().map(|v| v.uv).collect();
    assert!(uvs.contains(&[0.0, 0.0]));
    assert!(uvs.contains(&[1.0, 1.0]));
    assert_eq!(ctx.backend().bound_program(), Some(&ShaderBinding::Solid));
}
