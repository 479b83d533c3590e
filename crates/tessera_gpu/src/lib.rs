//! Tessera GPU Renderer
//!
//! Batched 2D rendering: an operation queue partitioned into batches of
//! compatible operations, dispatched through a shared vertex array under
//! stencil/scissor clipping and per-batch shader bindings, with multi-pass
//! glyph compositing. GPU access goes through the [`RenderBackend`] seam;
//! [`WgpuBackend`] renders with wgpu.

pub mod backend;
pub mod clip;
pub mod config;
pub mod context;
pub mod dispatch;
pub mod error;
pub mod geometry;
pub mod glyph;
pub mod queue;
pub mod shader;
pub mod shaders;
pub mod vertex;

pub use backend::{
    BackendCommand, ClearTarget, DeviceRect, RecordingBackend, RenderBackend, StencilState,
    WgpuBackend,
};
pub use clip::ClipCompositor;
pub use config::RenderConfig;
pub use context::{RenderingContext, ScopedClip, ScopedScissor};
pub use dispatch::{FlushStats, RenderState};
pub use error::{BackendError, RenderError, Result};
pub use glyph::{FontMetrics, GlyphAtlas, GlyphCache, GlyphTexture};
pub use queue::{Batch, OperationQueue};
pub use shader::{ShaderBinding, ShaderKind};
pub use vertex::{PrimitiveMode, Vertex, VertexArray};
