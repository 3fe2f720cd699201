/// Vertex entry point in [`SHADER`].
pub const VERTEX_ENTRY: &str = "vs_main";
/// Fragment entry point in [`SHADER`].
pub const FRAGMENT_ENTRY: &str = "fs_main";

/// WGSL source of the shading program.
///
/// Mirrors [`crate::program::vertex_stage`] and
/// [`crate::program::fragment_stage`] exactly.
pub const SHADER: &str = r#"
struct Uniforms {
    view_proj: mat4x4<f32>,
    eye_pos: vec3<f32>,
}

struct Lighting {
    light_dir: vec3<f32>,
    ambient: f32,
    base_color: vec3<f32>,
    diffuse_weight: f32,
}

@group(0) @binding(0)
var<uniform> uniforms: Uniforms;

@group(0) @binding(1)
var<uniform> lighting: Lighting;

struct VertexInput {
    @location(0) position: vec3<f32>,
    @location(1) normal: vec3<f32>,
}

struct VertexOutput {
    @builtin(position) clip_position: vec4<f32>,
    @location(0) world_normal: vec3<f32>,
    @location(1) world_position: vec3<f32>,
}

@vertex
fn vs_main(input: VertexInput) -> VertexOutput {
    var out: VertexOutput;
    out.clip_position = uniforms.view_proj * vec4<f32>(input.position, 1.0);
    out.world_normal = input.normal;
    out.world_position = input.position;
    return out;
}

@fragment
fn fs_main(input: VertexOutput) -> @location(0) vec4<f32> {
    let light_dir = normalize(lighting.light_dir);
    let normal = normalize(input.world_normal);
    let diffuse = max(dot(normal, light_dir), 0.0);
    let color = lighting.base_color * (lighting.ambient + diffuse * lighting.diffuse_weight);
    return vec4<f32>(color, 1.0);
}
"#;
