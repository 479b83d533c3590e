//! Rendering context configuration

use tessera_paint::{BlendingMode, LogicalCoordinateSystem, SmoothingMode};

fn env_usize(name: &str) -> Option<usize> {
    std::env::var(name)
        .ok()
        .and_then(|v| v.trim().parse::<usize>().ok())
}

fn env_bool(name: &str) -> Option<bool> {
    std::env::var(name)
        .ok()
        .and_then(|v| match v.trim() {
            "1" | "true" | "on" => Some(true),
            "0" | "false" | "off" => Some(false),
            _ => None,
        })
}

/// Configuration for creating a rendering context
#[derive(Clone, Debug)]
pub struct RenderConfig {
    /// Vertex array capacity in vertices; also bounds batch sizes
    pub vertex_capacity: usize,
    /// Queue length at which `enqueue` flushes implicitly
    pub max_queue_len: usize,
    pub smoothing_mode: SmoothingMode,
    pub blending_mode: BlendingMode,
    /// Coverage-correct subpixel glyph blending (needs texture barriers)
    pub subpixel_rendering: bool,
    pub logical_coordinate_system: LogicalCoordinateSystem,
    /// MSAA sample count for the wgpu backend
    pub sample_count: u32,
    /// Target format for the wgpu backend (None = Rgba8Unorm)
    pub texture_format: Option<wgpu::TextureFormat>,
}

impl Default for RenderConfig {
    fn default() -> Self {
        Self {
            vertex_capacity: 16_384,
            max_queue_len: 65_536,
            smoothing_mode: SmoothingMode::AntiAlias,
            blending_mode: BlendingMode::Default,
            subpixel_rendering: false,
            logical_coordinate_system: LogicalCoordinateSystem::AutomaticGui,
            sample_count: 1,
            texture_format: None,
        }
    }
}

impl RenderConfig {
    /// Apply environment overrides.
    ///
    /// Env:
    /// - TESSERA_VERTEX_CAPACITY=32768
    /// - TESSERA_MAX_QUEUE_LEN=100000
    /// - TESSERA_SUBPIXEL=1
    pub fn with_env_overrides(mut self) -> Self {
        if let Some(v) = env_usize("TESSERA_VERTEX_CAPACITY") {
            self.vertex_capacity = v;
        }
        if let Some(v) = env_usize("TESSERA_MAX_QUEUE_LEN") {
            self.max_queue_len = v;
        }
        if let Some(v) = env_bool("TESSERA_SUBPIXEL") {
            self.subpixel_rendering = v;
        }
        self.clamped()
    }

    /// Clamp capacities to usable minimums.
    ///
    /// The vertex array must hold at least one glyph quad with its paper quad.
    pub fn clamped(mut self) -> Self {
        self.vertex_capacity = self.vertex_capacity.max(12);
        self.max_queue_len = self.max_queue_len.max(1);
        self.sample_count = self.sample_count.max(1);
        self
    }
}

pub(crate) fn log_render_config(config: &RenderConfig) {
    tracing::info!(
        "render config: vertex_capacity={}, max_queue_len={}, smoothing={:?}, blending={:?}, \
         subpixel={}, coordinates={:?}, sample_count={}",
        config.vertex_capacity,
        config.max_queue_len,
        config.smoothing_mode,
        config.blending_mode,
        config.subpixel_rendering,
        config.logical_coordinate_system,
        config.sample_count
    );
}
