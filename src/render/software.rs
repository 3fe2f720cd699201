use glam::{Vec2, Vec3};
use log::debug;

use crate::obj::Mesh;
use crate::program::{FragmentInput, ShadingProgram, VertexOutput};

use super::common::{Framebuffer, RenderOptions};

/// Rasterizes a mesh on the CPU around the reference shading stages.
///
/// Matches the fixed-function state of [`super::GpuRenderer`]: triangle
/// list, counter-clockwise front faces, depth in `[0, 1]` compared with
/// `Less`, perspective-correct attribute interpolation, pixel-center
/// sampling. Triangles with a vertex at or behind the eye (`w <= 0`) are
/// dropped rather than clipped.
pub struct SoftwareRenderer {
    options: RenderOptions,
}

/// A fragment that survived the depth test, waiting to be shaded.
#[derive(Clone, Copy)]
struct Sample {
    depth: f32,
    input: FragmentInput,
}

/// One triangle after perspective division.
struct ScreenTriangle<'a> {
    vertices: [&'a VertexOutput; 3],
    ndc: [Vec3; 3],
    inv_w: [f32; 3],
    area: f32,
}

impl SoftwareRenderer {
    pub fn new(options: RenderOptions) -> Self {
        Self { options }
    }

    pub fn options(&self) -> &RenderOptions {
        &self.options
    }

    pub fn resize(&mut self, width: u32, height: u32) {
        if width == 0 || height == 0 {
            return;
        }
        self.options.width = width;
        self.options.height = height;
    }

    pub fn render(&self, program: &ShadingProgram, mesh: &Mesh) -> Framebuffer {
        let RenderOptions {
            width,
            height,
            clear_color,
            ..
        } = self.options;
        let mut framebuffer = Framebuffer::new(width, height, clear_color);

        // Every vertex is transformed before any fragment runs.
        let outputs = program.run_vertex_stage(&mesh.vertices);

        let mut samples: Vec<Option<Sample>> = vec![None; width as usize * height as usize];
        let mut culled = 0usize;
        for triangle in mesh.indices.chunks_exact(3) {
            let vertices = [triangle[0], triangle[1], triangle[2]]
                .map(|index| outputs.get(index as usize));
            let [Some(a), Some(b), Some(c)] = vertices else {
                culled += 1;
                continue;
            };
            match self.setup([a, b, c]) {
                Some(screen) => self.rasterize(&screen, &mut samples),
                None => culled += 1,
            }
        }

        let (pixels, inputs): (Vec<usize>, Vec<FragmentInput>) = samples
            .iter()
            .enumerate()
            .filter_map(|(pixel, sample)| sample.map(|sample| (pixel, sample.input)))
            .unzip();
        let colors = program.run_fragment_stage(&inputs);
        for (pixel, color) in pixels.into_iter().zip(colors) {
            let x = (pixel % width as usize) as u32;
            let y = (pixel / width as usize) as u32;
            framebuffer.set_pixel(x, y, color);
        }

        debug!(
            "software draw: {} triangles ({} culled), {} fragments shaded",
            mesh.triangle_count(),
            culled,
            inputs.len()
        );
        framebuffer
    }

    fn setup<'a>(&self, vertices: [&'a VertexOutput; 3]) -> Option<ScreenTriangle<'a>> {
        if vertices.iter().any(|v| v.clip_position.w <= 0.0) {
            return None;
        }
        let inv_w = vertices.map(|v| 1.0 / v.clip_position.w);
        let ndc = [0, 1, 2].map(|i| vertices[i].clip_position.truncate() * inv_w[i]);
        let area = edge(ndc[0].truncate(), ndc[1].truncate(), ndc[2].truncate());
        if area == 0.0 || !area.is_finite() || (self.options.cull_back_faces && area < 0.0) {
            return None;
        }
        Some(ScreenTriangle {
            vertices,
            ndc,
            inv_w,
            area,
        })
    }

    fn rasterize(&self, triangle: &ScreenTriangle<'_>, samples: &mut [Option<Sample>]) {
        let width = self.options.width as f32;
        let height = self.options.height as f32;
        let to_pixel =
            |ndc: Vec3| Vec2::new((ndc.x + 1.0) * 0.5 * width, (1.0 - ndc.y) * 0.5 * height);

        let corners = triangle.ndc.map(to_pixel);
        let min = corners[0].min(corners[1]).min(corners[2]).floor().max(Vec2::ZERO);
        let max = corners[0]
            .max(corners[1])
            .max(corners[2])
            .ceil()
            .min(Vec2::new(width, height));

        let [p0, p1, p2] = triangle.ndc.map(|v| v.truncate());
        for y in min.y as u32..max.y as u32 {
            for x in min.x as u32..max.x as u32 {
                let point = Vec2::new(
                    (x as f32 + 0.5) / width * 2.0 - 1.0,
                    1.0 - (y as f32 + 0.5) / height * 2.0,
                );
                let barycentric = Vec3::new(
                    edge(p1, p2, point),
                    edge(p2, p0, point),
                    edge(p0, p1, point),
                ) / triangle.area;
                if barycentric.min_element() < 0.0 {
                    continue;
                }

                let depth = barycentric.dot(Vec3::new(
                    triangle.ndc[0].z,
                    triangle.ndc[1].z,
                    triangle.ndc[2].z,
                ));
                // Anything at 1.0 loses `Less` against the cleared buffer.
                if !(0.0..1.0).contains(&depth) {
                    continue;
                }

                let index = y as usize * self.options.width as usize + x as usize;
                if matches!(samples[index], Some(sample) if sample.depth <= depth) {
                    continue;
                }

                let perspective = barycentric * Vec3::from_array(triangle.inv_w);
                let weights = perspective / perspective.element_sum();
                samples[index] = Some(Sample {
                    depth,
                    input: FragmentInput::interpolate(triangle.vertices, weights),
                });
            }
        }
    }
}

/// Twice the signed area of `(a, b, p)`; positive when counter-clockwise.
fn edge(a: Vec2, b: Vec2, p: Vec2) -> f32 {
    (b.x - a.x) * (p.y - a.y) - (b.y - a.y) * (p.x - a.x)
}
