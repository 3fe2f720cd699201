use std::env;
use std::fs::{self, File};
use std::io::BufWriter;

use anyhow::{anyhow, Context, Result};
use glam::Vec2;
use log::{info, warn};
use pollster::block_on;

use lambert_shader::{
    load_obj_from_str, Framebuffer, GpuRenderer, GpuUnavailable, Lighting, Mesh, OrbitCamera,
    Plane, Profile, RenderOptions, ShadingProgram, SoftwareRenderer, Uniforms,
};

fn main() {
    env_logger::init();
    if let Err(err) = run() {
        eprintln!("Error: {err:?}");
        std::process::exit(1);
    }
}

fn run() -> Result<()> {
    let options = CliOptions::parse(env::args().skip(1))?;

    let mesh = match &options.mesh_path {
        Some(path) => {
            let source =
                fs::read_to_string(path).with_context(|| format!("failed to read mesh {path}"))?;
            let mesh =
                load_obj_from_str(&source).with_context(|| format!("failed to parse mesh {path}"))?;
            println!(
                "Loaded mesh with {} vertices ({} triangles)",
                mesh.vertices.len(),
                mesh.triangle_count()
            );
            mesh
        }
        None => {
            let mesh = default_box()?;
            println!(
                "Built default box with {} vertices ({} triangles)",
                mesh.vertices.len(),
                mesh.triangle_count()
            );
            mesh
        }
    };

    let lighting = match &options.lighting_path {
        Some(path) => load_lighting(path)?,
        None => Lighting::default(),
    };
    print_lighting(&lighting);

    let render_options = RenderOptions {
        width: options.width,
        height: options.height,
        ..RenderOptions::default()
    };
    let mut camera = OrbitCamera::default();
    if let Some((min, max)) = mesh.bounds() {
        camera.frame_bounds(min, max);
    }
    let uniforms = Uniforms::from_camera(&camera.params(render_options.aspect_ratio()));
    let program = ShadingProgram::new(uniforms, lighting);

    let (frame, backend) = if options.summary_only {
        (render_software(&render_options, &program, &mesh), "software")
    } else {
        match render_gpu(&render_options, &program, &mesh) {
            Ok(frame) => (frame, "gpu"),
            Err(err) if err.downcast_ref::<GpuUnavailable>().is_some() => {
                warn!("{err}; falling back to the software renderer");
                (render_software(&render_options, &program, &mesh), "software")
            }
            Err(err) => return Err(err),
        }
    };

    println!(
        "Rendered {}x{} frame (backend: {backend})",
        frame.width(),
        frame.height()
    );
    println!("Covered pixels: {}", frame.covered_pixels());
    match frame.average_color() {
        Some(color) => println!(
            "Average color: ({:.3}, {:.3}, {:.3})",
            color.x, color.y, color.z
        ),
        None => println!("Average color: none"),
    }

    if let Some(path) = &options.output_path {
        let file = File::create(path).with_context(|| format!("failed to create {path}"))?;
        frame
            .write_ppm(BufWriter::new(file))
            .with_context(|| format!("failed to write {path}"))?;
        info!("wrote {path}");
    }
    Ok(())
}

/// 20-unit box standing on the XY plane, extruded from a square profile.
fn default_box() -> Result<Mesh> {
    let square = Profile::rectangle_centered(Vec2::ZERO, 20.0, 20.0)?;
    Ok(square.extrude(&Plane::xy(), 20.0)?)
}

/// Reads a lighting file, as JSON for `.json` paths and as XML otherwise.
fn load_lighting(path: &str) -> Result<Lighting> {
    let text = fs::read_to_string(path).with_context(|| format!("failed to read lighting {path}"))?;
    let lighting = if path.ends_with(".json") {
        Lighting::from_json(&text)
    } else {
        Lighting::from_xml(&text)
    };
    lighting.with_context(|| format!("invalid lighting file {path}"))
}

fn render_software(options: &RenderOptions, program: &ShadingProgram, mesh: &Mesh) -> Framebuffer {
    SoftwareRenderer::new(options.clone()).render(program, mesh)
}

fn render_gpu(options: &RenderOptions, program: &ShadingProgram, mesh: &Mesh) -> Result<Framebuffer> {
    let mut renderer = block_on(GpuRenderer::new(options.clone()))?;
    renderer.set_mesh(mesh);
    renderer.render(&program.uniforms, &program.lighting)
}

fn print_lighting(lighting: &Lighting) {
    let d = lighting.direction;
    let c = lighting.base_color;
    println!(
        "Lighting: direction=({:.2}, {:.2}, {:.2}) ambient={:.2} diffuse={:.2} color=({:.2}, {:.2}, {:.2})",
        d.x, d.y, d.z, lighting.ambient, lighting.diffuse_weight, c.x, c.y, c.z
    );
}

const USAGE: &str = "Usage: lambert-shader [mesh.obj] [--lighting <file.xml|file.json>] \
                     [--size WxH] [--output <file.ppm>] [--summary-only]";

#[derive(Debug, PartialEq)]
struct CliOptions {
    mesh_path: Option<String>,
    lighting_path: Option<String>,
    output_path: Option<String>,
    width: u32,
    height: u32,
    summary_only: bool,
}

impl CliOptions {
    fn parse(args: impl IntoIterator<Item = String>) -> Result<Self> {
        let mut args = args.into_iter();
        let defaults = RenderOptions::default();
        let mut options = Self {
            mesh_path: None,
            lighting_path: None,
            output_path: None,
            width: defaults.width,
            height: defaults.height,
            summary_only: false,
        };

        while let Some(arg) = args.next() {
            let mut value = |flag: &str| {
                args.next()
                    .ok_or_else(|| anyhow!("{flag} expects a value. {USAGE}"))
            };
            match arg.as_str() {
                "--lighting" => options.lighting_path = Some(value("--lighting")?),
                "--output" => options.output_path = Some(value("--output")?),
                "--size" => {
                    let size = value("--size")?;
                    (options.width, options.height) = parse_size(&size)?;
                }
                "--summary-only" => options.summary_only = true,
                other if other.starts_with("--") => {
                    return Err(anyhow!("Unknown argument: {other}. {USAGE}"));
                }
                _ if options.mesh_path.is_some() => {
                    return Err(anyhow!("Only one mesh path may be given. {USAGE}"));
                }
                _ => options.mesh_path = Some(arg.clone()),
            }
        }
        Ok(options)
    }
}

fn parse_size(size: &str) -> Result<(u32, u32)> {
    let (width, height) = size
        .split_once(['x', 'X'])
        .ok_or_else(|| anyhow!("invalid size {size:?}, expected WxH"))?;
    let width: u32 = width.parse().with_context(|| format!("invalid width in {size:?}"))?;
    let height: u32 = height.parse().with_context(|| format!("invalid height in {size:?}"))?;
    if width == 0 || height == 0 {
        return Err(anyhow!("size {size:?} has zero area"));
    }
    Ok((width, height))
}
