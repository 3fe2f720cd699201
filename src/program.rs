//! CPU reference of the shading program.
//!
//! [`vertex_stage`] and [`fragment_stage`] are the scalar forms of
//! `vs_main` and `fs_main` in [`crate::shader::SHADER`]. [`ShadingProgram`]
//! runs them over whole slices, splitting the work across scoped threads.
//! Every invocation is pure: workers only ever see `&ShadingProgram` and
//! their own input chunk.

use std::num::NonZeroUsize;
use std::thread;

use glam::{Vec3, Vec4};

use crate::lighting::Lighting;
use crate::uniforms::Uniforms;
use crate::vertex::Vertex;

/// Below this many invocations a stage runs on the calling thread.
const MIN_PARALLEL_BATCH: usize = 4096;

/// Result of the vertex stage for one vertex.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct VertexOutput {
    /// Homogeneous clip position, before perspective division.
    pub clip_position: Vec4,
    pub world_normal: Vec3,
    pub world_position: Vec3,
}

/// Interpolated data the rasterizer hands to the fragment stage.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct FragmentInput {
    pub world_normal: Vec3,
    /// Carried through the contract; the Lambert term does not read it.
    pub world_position: Vec3,
}

impl FragmentInput {
    /// Blends three vertex outputs with weights that sum to one.
    pub fn interpolate(vertices: [&VertexOutput; 3], weights: Vec3) -> Self {
        let [a, b, c] = vertices;
        Self {
            world_normal: a.world_normal * weights.x
                + b.world_normal * weights.y
                + c.world_normal * weights.z,
            world_position: a.world_position * weights.x
                + b.world_position * weights.y
                + c.world_position * weights.z,
        }
    }
}

impl From<&VertexOutput> for FragmentInput {
    fn from(output: &VertexOutput) -> Self {
        Self {
            world_normal: output.world_normal,
            world_position: output.world_position,
        }
    }
}

/// Projects one vertex into clip space and forwards its attributes untouched.
pub fn vertex_stage(uniforms: &Uniforms, vertex: &Vertex) -> VertexOutput {
    let position = vertex.position();
    VertexOutput {
        clip_position: uniforms.view_proj() * position.extend(1.0),
        world_normal: vertex.normal(),
        world_position: position,
    }
}

/// Lambert diffuse plus constant ambient for one fragment. Alpha is always 1.
///
/// A zero-length `world_normal` normalizes to NaN; `max(NaN, 0.0)` clamps the
/// diffuse term to zero, so such fragments come out ambient-only.
pub fn fragment_stage(lighting: &Lighting, input: &FragmentInput) -> Vec4 {
    let light_dir = lighting.light_dir();
    let normal = input.world_normal.normalize();
    let diffuse = normal.dot(light_dir).max(0.0);
    let color = lighting.base_color * (lighting.ambient + diffuse * lighting.diffuse_weight);
    color.extend(1.0)
}

/// The bound state of one draw: both uniform blocks, read-only.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct ShadingProgram {
    pub uniforms: Uniforms,
    pub lighting: Lighting,
}

impl ShadingProgram {
    pub fn new(uniforms: Uniforms, lighting: Lighting) -> Self {
        Self { uniforms, lighting }
    }

    pub fn shade_vertex(&self, vertex: &Vertex) -> VertexOutput {
        vertex_stage(&self.uniforms, vertex)
    }

    pub fn shade_fragment(&self, input: &FragmentInput) -> Vec4 {
        fragment_stage(&self.lighting, input)
    }

    /// Runs the vertex stage once per vertex; output order follows input order.
    pub fn run_vertex_stage(&self, vertices: &[Vertex]) -> Vec<VertexOutput> {
        dispatch(vertices, |vertex| self.shade_vertex(vertex))
    }

    /// Runs the fragment stage once per fragment; output order follows input order.
    pub fn run_fragment_stage(&self, fragments: &[FragmentInput]) -> Vec<Vec4> {
        dispatch(fragments, |fragment| self.shade_fragment(fragment))
    }
}

fn worker_count() -> usize {
    thread::available_parallelism()
        .map(NonZeroUsize::get)
        .unwrap_or(4)
}

/// Maps `invoke` over `inputs`, one contiguous chunk per worker thread.
pub(crate) fn dispatch<I, O, F>(inputs: &[I], invoke: F) -> Vec<O>
where
    I: Sync,
    O: Send,
    F: Fn(&I) -> O + Sync,
{
    let workers = worker_count();
    if inputs.len() < MIN_PARALLEL_BATCH || workers == 1 {
        return inputs.iter().map(&invoke).collect();
    }

    let chunk_size = inputs.len().div_ceil(workers);
    let invoke = &invoke;
    thread::scope(|scope| {
        let handles: Vec<_> = inputs
            .chunks(chunk_size)
            .map(|chunk| scope.spawn(move || chunk.iter().map(invoke).collect::<Vec<O>>()))
            .collect();

        let mut outputs = Vec::with_capacity(inputs.len());
        for handle in handles {
            match handle.join() {
                Ok(chunk) => outputs.extend(chunk),
                Err(panic) => std::panic::resume_unwind(panic),
            }
        }
        outputs
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use glam::Mat4;

    const EPSILON: f32 = 1e-5;

    fn fragment(normal: Vec3) -> FragmentInput {
        FragmentInput {
            world_normal: normal,
            world_position: Vec3::ZERO,
        }
    }

    fn assert_color(actual: Vec4, expected: Vec4) {
        assert!(
            actual.abs_diff_eq(expected, EPSILON),
            "expected {expected}, got {actual}"
        );
    }

    #[test]
    fn identity_maps_origin_to_clip_origin() {
        let output = vertex_stage(&Uniforms::default(), &Vertex::new(Vec3::ZERO, Vec3::Y));
        assert_eq!(output.clip_position, Vec4::new(0.0, 0.0, 0.0, 1.0));
    }

    #[test]
    fn vertex_stage_applies_view_proj_without_dividing() {
        let view_proj = Mat4::perspective_rh(1.0, 1.0, 0.1, 100.0);
        let uniforms = Uniforms::new(view_proj, Vec3::ZERO);
        let position = Vec3::new(1.0, 2.0, -5.0);
        let output = vertex_stage(&uniforms, &Vertex::new(position, Vec3::Z));
        assert_eq!(output.clip_position, view_proj * position.extend(1.0));
        assert!((output.clip_position.w - 5.0).abs() < EPSILON);
    }

    #[test]
    fn vertex_stage_passes_attributes_through() {
        let uniforms = Uniforms::new(Mat4::from_scale(Vec3::splat(3.0)), Vec3::ONE);
        let position = Vec3::new(-4.5, 0.25, 9.0);
        // Deliberately not unit length: nothing may normalize it here.
        let normal = Vec3::new(0.0, 2.0, 0.0);
        let output = vertex_stage(&uniforms, &Vertex::new(position, normal));
        assert_eq!(output.world_position, position);
        assert_eq!(output.world_normal, normal);
    }

    #[test]
    fn normal_facing_light_gets_full_diffuse() {
        let color = fragment_stage(&Lighting::default(), &fragment(Vec3::ONE.normalize()));
        assert_color(color, Vec4::new(0.7, 0.7, 0.7, 1.0));
    }

    #[test]
    fn perpendicular_normal_is_ambient_only() {
        let color = fragment_stage(&Lighting::default(), &fragment(Vec3::new(1.0, -1.0, 0.0)));
        assert_color(color, Vec4::new(0.14, 0.14, 0.14, 1.0));
    }

    #[test]
    fn back_facing_normal_is_clamped_to_ambient() {
        let lighting = Lighting::default();
        let away = fragment_stage(&lighting, &fragment(-Vec3::ONE));
        let perpendicular = fragment_stage(&lighting, &fragment(Vec3::new(0.0, 1.0, -1.0)));
        assert_color(away, Vec4::new(0.14, 0.14, 0.14, 1.0));
        assert_color(away, perpendicular);
        assert!(away.min_element() >= 0.0);
    }

    #[test]
    fn unnormalized_normals_are_normalized() {
        let lighting = Lighting::default();
        let short = fragment_stage(&lighting, &fragment(Vec3::ONE * 0.01));
        let long = fragment_stage(&lighting, &fragment(Vec3::ONE * 50.0));
        assert_color(short, long);
    }

    #[test]
    fn alpha_is_always_one() {
        let lighting = Lighting {
            base_color: Vec3::new(0.1, 0.9, 0.4),
            ambient: 0.6,
            ..Lighting::default()
        };
        for normal in [Vec3::X, -Vec3::Y, Vec3::new(0.3, -0.2, 0.9), Vec3::ZERO] {
            assert_eq!(fragment_stage(&lighting, &fragment(normal)).w, 1.0);
        }
    }

    #[test]
    fn zero_normal_shades_ambient_only() {
        assert!(Vec3::ZERO.normalize().is_nan());
        let color = fragment_stage(&Lighting::default(), &fragment(Vec3::ZERO));
        assert!(color.abs_diff_eq(Vec4::new(0.14, 0.14, 0.14, 1.0), 1e-6));
    }

    #[test]
    fn fragment_stage_is_bit_identical_on_repeat() {
        let lighting = Lighting::default();
        let input = fragment(Vec3::new(0.2, 0.9, -0.4));
        let first = fragment_stage(&lighting, &input);
        let second = fragment_stage(&lighting, &input);
        assert_eq!(first.to_array().map(f32::to_bits), second.to_array().map(f32::to_bits));
    }

    #[test]
    fn custom_lighting_is_honored() {
        let lighting = Lighting {
            direction: Vec3::Y * 4.0,
            ambient: 0.0,
            diffuse_weight: 1.0,
            base_color: Vec3::new(1.0, 0.5, 0.25),
        };
        let color = fragment_stage(&lighting, &fragment(Vec3::Y));
        assert_color(color, Vec4::new(1.0, 0.5, 0.25, 1.0));
    }

    #[test]
    fn interpolation_blends_attributes() {
        let outputs = [
            VertexOutput {
                world_normal: Vec3::X,
                world_position: Vec3::ZERO,
                ..Default::default()
            },
            VertexOutput {
                world_normal: Vec3::Y,
                world_position: Vec3::new(2.0, 0.0, 0.0),
                ..Default::default()
            },
            VertexOutput {
                world_normal: Vec3::Z,
                world_position: Vec3::new(0.0, 4.0, 0.0),
                ..Default::default()
            },
        ];
        let input = FragmentInput::interpolate(
            [&outputs[0], &outputs[1], &outputs[2]],
            Vec3::new(0.5, 0.25, 0.25),
        );
        assert_eq!(input.world_normal, Vec3::new(0.5, 0.25, 0.25));
        assert_eq!(input.world_position, Vec3::new(0.5, 1.0, 0.0));
    }

    #[test]
    fn parallel_dispatch_preserves_order() {
        let inputs: Vec<u32> = (0..(MIN_PARALLEL_BATCH as u32 * 3 + 17)).collect();
        let outputs = dispatch(&inputs, |value| value * 2);
        let expected: Vec<u32> = inputs.iter().map(|value| value * 2).collect();
        assert_eq!(outputs, expected);
    }

    #[test]
    fn batch_stages_match_scalar_stages() {
        let program = ShadingProgram::new(
            Uniforms::new(Mat4::perspective_rh(1.2, 1.0, 0.5, 50.0), Vec3::ZERO),
            Lighting::default(),
        );
        let vertices: Vec<Vertex> = (0..MIN_PARALLEL_BATCH * 2)
            .map(|i| {
                let t = i as f32 * 0.01;
                Vertex::new(
                    Vec3::new(t.sin(), t.cos(), -2.0 - t),
                    Vec3::new(t.cos(), t.sin(), 0.5),
                )
            })
            .collect();

        let outputs = program.run_vertex_stage(&vertices);
        assert_eq!(outputs.len(), vertices.len());
        for (vertex, output) in vertices.iter().zip(&outputs) {
            assert_eq!(*output, vertex_stage(&program.uniforms, vertex));
        }

        let fragments: Vec<FragmentInput> = outputs.iter().map(FragmentInput::from).collect();
        let colors = program.run_fragment_stage(&fragments);
        for (fragment, color) in fragments.iter().zip(&colors) {
            assert_eq!(*color, fragment_stage(&program.lighting, fragment));
        }
    }
}
