//! WGSL programs
//!
//! Every program shares the vertex stage and the pipeline layout:
//!
//! - group 0: `globals` (projection and transformation)
//! - group 1: binding 0 gradient uniforms, binding 1 paint or glyph texture,
//!   binding 2 its sampler, binding 3 the render target copy read by
//!   subpixel glyphs
//!
//! Programs only declare the bindings they use.

use crate::shader::ShaderKind;

/// Vertex stage shared by all programs
pub const VERTEX_SHADER: &str = r#"
struct Globals {
    projection: mat4x4<f32>,
    transform: mat4x4<f32>,
}

@group(0) @binding(0) var<uniform> globals: Globals;

struct VertexInput {
    @location(0) position: vec3<f32>,
    @location(1) color: vec4<f32>,
    @location(2) uv: vec2<f32>,
}

struct VertexOutput {
    @builtin(position) clip_position: vec4<f32>,
    @location(0) color: vec4<f32>,
    @location(1) uv: vec2<f32>,
    @location(2) logical: vec2<f32>,
}

@vertex
fn vs_main(in: VertexInput) -> VertexOutput {
    var out: VertexOutput;
    let world = globals.transform * vec4<f32>(in.position, 1.0);
    out.clip_position = globals.projection * world;
    out.color = in.color;
    out.uv = in.uv;
    out.logical = world.xy;
    return out;
}
"#;

/// Per-vertex color
pub const SOLID_SHADER: &str = r#"
@fragment
fn fs_main(in: VertexOutput) -> @location(0) vec4<f32> {
    return in.color;
}
"#;

/// Linear and radial gradients filtered with a 15x15 kernel over the pixel
/// footprint
pub const GRADIENT_SHADER: &str = r#"
struct Gradient {
    kind: u32,
    stop_count: u32,
    _pad0: u32,
    _pad1: u32,
    // linear: start.xy end.xy, radial: center.xy radius
    geometry: vec4<f32>,
    offsets: array<vec4<f32>, 4>,
    colors: array<vec4<f32>, 16>,
    kernel: array<vec4<f32>, 57>,
}

@group(1) @binding(0) var<uniform> gradient: Gradient;

const KERNEL_SIZE: u32 = 15u;

fn stop_offset(i: u32) -> f32 {
    return gradient.offsets[i / 4u][i % 4u];
}

fn kernel_weight(i: u32) -> f32 {
    return gradient.kernel[i / 4u][i % 4u];
}

fn gradient_t(p: vec2<f32>) -> f32 {
    if gradient.kind == 1u {
        return length(p - gradient.geometry.xy) / max(gradient.geometry.z, 1e-6);
    }
    let start = gradient.geometry.xy;
    let axis = gradient.geometry.zw - start;
    return dot(p - start, axis) / max(dot(axis, axis), 1e-6);
}

fn color_at(t_in: f32) -> vec4<f32> {
    let count = gradient.stop_count;
    if count == 0u {
        return vec4<f32>(0.0);
    }
    let t = clamp(t_in, 0.0, 1.0);
    if t <= stop_offset(0u) {
        return gradient.colors[0];
    }
    for (var i = 1u; i < count; i = i + 1u) {
        let hi = stop_offset(i);
        if t <= hi {
            let lo = stop_offset(i - 1u);
            let f = (t - lo) / max(hi - lo, 1e-6);
            return mix(gradient.colors[i - 1u], gradient.colors[i], f);
        }
    }
    return gradient.colors[count - 1u];
}

@fragment
fn fs_main(in: VertexOutput) -> @location(0) vec4<f32> {
    let dx = dpdx(in.logical);
    let dy = dpdy(in.logical);
    let reach = f32(KERNEL_SIZE / 2u);
    var sum = vec4<f32>(0.0);
    for (var j = 0u; j < KERNEL_SIZE; j = j + 1u) {
        for (var i = 0u; i < KERNEL_SIZE; i = i + 1u) {
            let delta = ((f32(i) - reach) * dx + (f32(j) - reach) * dy) / (2.0 * reach);
            let weight = kernel_weight(j * KERNEL_SIZE + i);
            sum = sum + weight * color_at(gradient_t(in.logical + delta));
        }
    }
    return sum * in.color;
}
"#;

/// Texture modulated by the vertex color
pub const TEXTURED_SHADER: &str = r#"
@group(1) @binding(1) var paint_texture: texture_2d<f32>;
@group(1) @binding(2) var paint_sampler: sampler;

@fragment
fn fs_main(in: VertexOutput) -> @location(0) vec4<f32> {
    return textureSample(paint_texture, paint_sampler, in.uv) * in.color;
}
"#;

/// Grayscale glyph coverage in the red channel
pub const GLYPH_SHADER: &str = r#"
@group(1) @binding(1) var glyph_atlas: texture_2d<f32>;
@group(1) @binding(2) var glyph_sampler: sampler;

@fragment
fn fs_main(in: VertexOutput) -> @location(0) vec4<f32> {
    let coverage = textureSample(glyph_atlas, glyph_sampler, in.uv).r;
    return vec4<f32>(in.color.rgb, in.color.a * coverage);
}
"#;

/// Per-channel glyph coverage blended in the shader against the target copy
pub const GLYPH_SUBPIXEL_SHADER: &str = r#"
@group(1) @binding(1) var glyph_atlas: texture_2d<f32>;
@group(1) @binding(2) var glyph_sampler: sampler;
@group(1) @binding(3) var target_copy: texture_2d<f32>;

@fragment
fn fs_main(in: VertexOutput) -> @location(0) vec4<f32> {
    let coverage = textureSample(glyph_atlas, glyph_sampler, in.uv).rgb * in.color.a;
    let dst = textureLoad(target_copy, vec2<i32>(in.clip_position.xy), 0);
    let alpha = max(max(coverage.r, coverage.g), coverage.b);
    return vec4<f32>(mix(dst.rgb, in.color.rgb, coverage), max(dst.a, alpha));
}
"#;

/// Complete WGSL module for a program
pub fn source(kind: ShaderKind) -> String {
    let fragment = match kind {
        ShaderKind::Solid => SOLID_SHADER,
        ShaderKind::Gradient => GRADIENT_SHADER,
        ShaderKind::Textured => TEXTURED_SHADER,
        ShaderKind::Glyph => GLYPH_SHADER,
        ShaderKind::GlyphSubpixel => GLYPH_SUBPIXEL_SHADER,
    };
    format!("{}{}", VERTEX_SHADER, fragment)
}

/// Names of the module-scope variables a WGSL module declares
pub fn global_variables(source: &str) -> Result<Vec<String>, String> {
    let module = naga::front::wgsl::parse_str(source).map_err(|err| err.emit_to_string(source))?;
    Ok(module
        .global_variables
        .iter()
        .filter_map(|(_, var)| var.name.clone())
        .collect())
}
