use std::sync::mpsc;

use anyhow::{anyhow, Context, Result};
use bytemuck::bytes_of;
use log::{debug, info};
use thiserror::Error;
use wgpu::util::DeviceExt;

use crate::lighting::Lighting;
use crate::obj::Mesh;
use crate::shader::{FRAGMENT_ENTRY, SHADER, VERTEX_ENTRY};
use crate::uniforms::{LightingUniform, Uniforms, CAMERA_BINDING, LIGHTING_BINDING, UNIFORM_GROUP};
use crate::vertex::Vertex;

use super::common::{Framebuffer, RenderOptions};

/// No adapter or device could be acquired; callers may fall back to
/// [`super::SoftwareRenderer`].
#[derive(Debug, Error)]
#[error("GPU unavailable: {reason}")]
pub struct GpuUnavailable {
    reason: String,
}

impl GpuUnavailable {
    fn from_error(stage: &str, err: impl std::fmt::Display) -> Self {
        Self {
            reason: format!("failed to acquire {stage}: {err}"),
        }
    }
}

/// Headless wgpu renderer that draws one mesh into an offscreen target.
pub struct GpuRenderer {
    device: wgpu::Device,
    queue: wgpu::Queue,
    options: RenderOptions,
    pipeline: wgpu::RenderPipeline,
    camera_buffer: wgpu::Buffer,
    lighting_buffer: wgpu::Buffer,
    bind_group: wgpu::BindGroup,
    target: RenderTarget,
    mesh: Option<MeshBuffers>,
}

impl GpuRenderer {
    pub const COLOR_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Rgba8Unorm;

    /// Acquires an adapter and device and builds the shading pipeline.
    ///
    /// Failing to find an adapter or device is reported as [`GpuUnavailable`]
    /// inside the returned error.
    pub async fn new(options: RenderOptions) -> Result<Self> {
        if options.width == 0 || options.height == 0 {
            return Err(anyhow!("render target has zero area"));
        }

        let instance = wgpu::Instance::new(&wgpu::InstanceDescriptor {
            backends: wgpu::Backends::all(),
            ..Default::default()
        });

        let adapter = instance
            .request_adapter(&wgpu::RequestAdapterOptions {
                power_preference: wgpu::PowerPreference::HighPerformance,
                compatible_surface: None,
                force_fallback_adapter: false,
            })
            .await
            .map_err(|err| GpuUnavailable::from_error("adapter", err))?;
        let adapter_info = adapter.get_info();
        info!(
            "using adapter {} ({:?})",
            adapter_info.name, adapter_info.backend
        );

        let (device, queue) = adapter
            .request_device(&wgpu::DeviceDescriptor {
                label: Some("lambert-device"),
                required_features: wgpu::Features::empty(),
                required_limits: wgpu::Limits::downlevel_defaults(),
                experimental_features: wgpu::ExperimentalFeatures::disabled(),
                memory_hints: wgpu::MemoryHints::default(),
                trace: wgpu::Trace::Off,
            })
            .await
            .map_err(|err| GpuUnavailable::from_error("device", err))?;

        let shader = device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some("lambert-shader"),
            source: wgpu::ShaderSource::Wgsl(SHADER.into()),
        });

        let uniform_entry = |binding: u32, size: usize| wgpu::BindGroupLayoutEntry {
            binding,
            visibility: wgpu::ShaderStages::VERTEX_FRAGMENT,
            ty: wgpu::BindingType::Buffer {
                ty: wgpu::BufferBindingType::Uniform,
                has_dynamic_offset: false,
                min_binding_size: wgpu::BufferSize::new(size as u64),
            },
            count: None,
        };
        let bind_group_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("uniform-bind-layout"),
            entries: &[
                uniform_entry(CAMERA_BINDING, std::mem::size_of::<Uniforms>()),
                uniform_entry(LIGHTING_BINDING, std::mem::size_of::<LightingUniform>()),
            ],
        });

        let camera_buffer = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("camera-uniform"),
            size: std::mem::size_of::<Uniforms>() as u64,
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });
        let lighting_buffer = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("lighting-uniform"),
            size: std::mem::size_of::<LightingUniform>() as u64,
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });
        let bind_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("uniform-bind-group"),
            layout: &bind_group_layout,
            entries: &[
                wgpu::BindGroupEntry {
                    binding: CAMERA_BINDING,
                    resource: camera_buffer.as_entire_binding(),
                },
                wgpu::BindGroupEntry {
                    binding: LIGHTING_BINDING,
                    resource: lighting_buffer.as_entire_binding(),
                },
            ],
        });

        let pipeline_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("lambert-pipeline-layout"),
            bind_group_layouts: &[&bind_group_layout],
            push_constant_ranges: &[],
        });

        let pipeline = device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
            label: Some("lambert-pipeline"),
            layout: Some(&pipeline_layout),
            vertex: wgpu::VertexState {
                module: &shader,
                entry_point: Some(VERTEX_ENTRY),
                compilation_options: Default::default(),
                buffers: &[Vertex::desc()],
            },
            primitive: wgpu::PrimitiveState {
                topology: wgpu::PrimitiveTopology::TriangleList,
                front_face: wgpu::FrontFace::Ccw,
                cull_mode: options.cull_back_faces.then_some(wgpu::Face::Back),
                polygon_mode: wgpu::PolygonMode::Fill,
                ..Default::default()
            },
            depth_stencil: Some(wgpu::DepthStencilState {
                format: RenderTarget::DEPTH_FORMAT,
                depth_write_enabled: true,
                depth_compare: wgpu::CompareFunction::Less,
                stencil: Default::default(),
                bias: Default::default(),
            }),
            multisample: wgpu::MultisampleState::default(),
            fragment: Some(wgpu::FragmentState {
                module: &shader,
                entry_point: Some(FRAGMENT_ENTRY),
                compilation_options: Default::default(),
                targets: &[Some(wgpu::ColorTargetState {
                    format: Self::COLOR_FORMAT,
                    blend: Some(wgpu::BlendState::REPLACE),
                    write_mask: wgpu::ColorWrites::ALL,
                })],
            }),
            multiview: None,
            cache: None,
        });

        let target = RenderTarget::create(&device, options.width, options.height);

        Ok(Self {
            device,
            queue,
            options,
            pipeline,
            camera_buffer,
            lighting_buffer,
            bind_group,
            target,
            mesh: None,
        })
    }

    pub fn options(&self) -> &RenderOptions {
        &self.options
    }

    /// Recreates the color and depth targets; zero sizes are ignored.
    pub fn resize(&mut self, width: u32, height: u32) {
        if width == 0 || height == 0 {
            return;
        }
        self.options.width = width;
        self.options.height = height;
        self.target = RenderTarget::create(&self.device, width, height);
    }

    /// Uploads the vertex and index buffers drawn by [`Self::render`].
    pub fn set_mesh(&mut self, mesh: &Mesh) {
        self.mesh = Some(MeshBuffers::from_mesh(&self.device, mesh, "mesh"));
    }

    /// Writes both uniform blocks, draws the mesh and reads the frame back.
    pub fn render(&self, uniforms: &Uniforms, lighting: &Lighting) -> Result<Framebuffer> {
        self.queue.write_buffer(&self.camera_buffer, 0, bytes_of(uniforms));
        self.queue.write_buffer(
            &self.lighting_buffer,
            0,
            bytes_of(&LightingUniform::from(lighting)),
        );

        let mut encoder = self
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("lambert-encoder"),
            });

        let clear = self.options.clear_color.as_dvec4();
        {
            let mut pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
                label: Some("lambert-pass"),
                color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                    view: &self.target.color_view,
                    depth_slice: None,
                    resolve_target: None,
                    ops: wgpu::Operations {
                        load: wgpu::LoadOp::Clear(wgpu::Color {
                            r: clear.x,
                            g: clear.y,
                            b: clear.z,
                            a: clear.w,
                        }),
                        store: wgpu::StoreOp::Store,
                    },
                })],
                depth_stencil_attachment: Some(wgpu::RenderPassDepthStencilAttachment {
                    view: &self.target.depth_view,
                    depth_ops: Some(wgpu::Operations {
                        load: wgpu::LoadOp::Clear(1.0),
                        store: wgpu::StoreOp::Store,
                    }),
                    stencil_ops: None,
                }),
                timestamp_writes: None,
                occlusion_query_set: None,
            });

            if let Some(mesh) = &self.mesh {
                pass.set_pipeline(&self.pipeline);
                pass.set_bind_group(UNIFORM_GROUP, &self.bind_group, &[]);
                pass.set_vertex_buffer(0, mesh.vertex.slice(..));
                pass.set_index_buffer(mesh.index.slice(..), wgpu::IndexFormat::Uint32);
                pass.draw_indexed(0..mesh.index_count, 0, 0..1);
                debug!("gpu draw: {} indices", mesh.index_count);
            }
        }

        self.target.copy_to_staging(&mut encoder);
        self.queue.submit(std::iter::once(encoder.finish()));
        self.read_back()
    }

    fn read_back(&self) -> Result<Framebuffer> {
        let slice = self.target.staging.slice(..);
        let (sender, receiver) = mpsc::channel();
        slice.map_async(wgpu::MapMode::Read, move |result| {
            let _ = sender.send(result);
        });
        self.device
            .poll(wgpu::PollType::wait_indefinitely())
            .context("failed to wait for the GPU")?;
        receiver
            .recv()
            .context("readback callback was dropped")?
            .context("failed to map readback buffer")?;

        let RenderTarget {
            width,
            height,
            padded_row,
            ..
        } = self.target;
        let row = width as usize * 4;
        let mut bytes = Vec::with_capacity(row * height as usize);
        {
            let data = slice.get_mapped_range();
            for padded in data.chunks_exact(padded_row as usize) {
                bytes.extend_from_slice(&padded[..row]);
            }
        }
        self.target.staging.unmap();

        Ok(Framebuffer::from_rgba8(
            width,
            height,
            self.options.clear_color,
            &bytes,
        ))
    }
}

struct MeshBuffers {
    vertex: wgpu::Buffer,
    index: wgpu::Buffer,
    index_count: u32,
}

impl MeshBuffers {
    fn from_mesh(device: &wgpu::Device, mesh: &Mesh, label: &str) -> Self {
        let vertex = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some(&format!("{label}-vertices")),
            contents: bytemuck::cast_slice(&mesh.vertices),
            usage: wgpu::BufferUsages::VERTEX,
        });
        let index = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some(&format!("{label}-indices")),
            contents: bytemuck::cast_slice(&mesh.indices),
            usage: wgpu::BufferUsages::INDEX,
        });
        Self {
            vertex,
            index,
            index_count: mesh.indices.len() as u32,
        }
    }
}

/// Offscreen color + depth attachments and the staging buffer they are
/// copied into for readback.
struct RenderTarget {
    color: wgpu::Texture,
    color_view: wgpu::TextureView,
    _depth: wgpu::Texture,
    depth_view: wgpu::TextureView,
    staging: wgpu::Buffer,
    width: u32,
    height: u32,
    /// Bytes per staging row, rounded up to `COPY_BYTES_PER_ROW_ALIGNMENT`.
    padded_row: u32,
}

impl RenderTarget {
    const DEPTH_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Depth32Float;

    fn create(device: &wgpu::Device, width: u32, height: u32) -> Self {
        let size = wgpu::Extent3d {
            width,
            height,
            depth_or_array_layers: 1,
        };
        let color = device.create_texture(&wgpu::TextureDescriptor {
            label: Some("color-target"),
            size,
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format: GpuRenderer::COLOR_FORMAT,
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT | wgpu::TextureUsages::COPY_SRC,
            view_formats: &[],
        });
        let depth = device.create_texture(&wgpu::TextureDescriptor {
            label: Some("depth-target"),
            size,
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format: Self::DEPTH_FORMAT,
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT,
            view_formats: &[],
        });

        let align = wgpu::COPY_BYTES_PER_ROW_ALIGNMENT;
        let padded_row = (width * 4).div_ceil(align) * align;
        let staging = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("readback-staging"),
            size: padded_row as u64 * height as u64,
            usage: wgpu::BufferUsages::COPY_DST | wgpu::BufferUsages::MAP_READ,
            mapped_at_creation: false,
        });

        Self {
            color_view: color.create_view(&wgpu::TextureViewDescriptor::default()),
            color,
            depth_view: depth.create_view(&wgpu::TextureViewDescriptor::default()),
            _depth: depth,
            staging,
            width,
            height,
            padded_row,
        }
    }

    fn copy_to_staging(&self, encoder: &mut wgpu::CommandEncoder) {
        encoder.copy_texture_to_buffer(
            wgpu::TexelCopyTextureInfo {
                texture: &self.color,
                mip_level: 0,
                origin: wgpu::Origin3d::ZERO,
                aspect: wgpu::TextureAspect::All,
            },
            wgpu::TexelCopyBufferInfo {
                buffer: &self.staging,
                layout: wgpu::TexelCopyBufferLayout {
                    offset: 0,
                    bytes_per_row: Some(self.padded_row),
                    rows_per_image: Some(self.height),
                },
            },
            wgpu::Extent3d {
                width: self.width,
                height: self.height,
                depth_or_array_layers: 1,
            },
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::program::ShadingProgram;
    use crate::render::SoftwareRenderer;
    use glam::{Vec3, Vec4};
    use log::warn;

    fn gpu_or_skip(options: RenderOptions) -> Option<GpuRenderer> {
        match pollster::block_on(GpuRenderer::new(options)) {
            Ok(renderer) => Some(renderer),
            Err(err) if err.downcast_ref::<GpuUnavailable>().is_some() => {
                warn!("skipping GPU test: {err:#}");
                None
            }
            Err(err) => panic!("GPU setup failed: {err:#}"),
        }
    }

    fn facing_triangle(normal: Vec3) -> Mesh {
        Mesh {
            vertices: vec![
                Vertex::new(Vec3::new(-0.8, -0.8, 0.5), normal),
                Vertex::new(Vec3::new(0.8, -0.8, 0.5), normal),
                Vertex::new(Vec3::new(0.0, 0.8, 0.5), normal),
            ],
            indices: vec![0, 1, 2],
        }
    }

    #[test]
    fn empty_frame_is_clear_color() {
        let options = RenderOptions {
            width: 16,
            height: 16,
            ..RenderOptions::default()
        };
        let Some(renderer) = gpu_or_skip(options) else {
            return;
        };
        let frame = renderer
            .render(&Uniforms::default(), &Lighting::default())
            .unwrap();
        assert_eq!(frame.width(), 16);
        assert_eq!(frame.covered_pixels(), 0);
    }

    #[test]
    fn gpu_center_pixel_matches_cpu_reference() {
        let options = RenderOptions {
            width: 64,
            height: 48,
            ..RenderOptions::default()
        };
        let Some(mut renderer) = gpu_or_skip(options.clone()) else {
            return;
        };
        let mesh = facing_triangle(Vec3::new(0.3, 0.9, 0.2));
        renderer.set_mesh(&mesh);

        let program = ShadingProgram::default();
        let gpu = renderer
            .render(&program.uniforms, &program.lighting)
            .unwrap();
        let cpu = SoftwareRenderer::new(options).render(&program, &mesh);

        let gpu_center = gpu.pixel(32, 24).unwrap();
        let cpu_center = cpu.pixel(32, 24).unwrap();
        assert!(
            gpu_center.abs_diff_eq(cpu_center, 2.0 / 255.0),
            "gpu {gpu_center} vs cpu {cpu_center}"
        );
        assert_eq!(gpu_center.w, 1.0);
        let corner = gpu.pixel(0, 0).unwrap();
        assert!(corner.abs_diff_eq(Vec4::new(0.1, 0.1, 0.1, 1.0), 1.0 / 255.0));
    }

    #[test]
    fn zero_sized_target_is_a_setup_error_not_unavailability() {
        let options = RenderOptions {
            width: 0,
            ..RenderOptions::default()
        };
        let err = pollster::block_on(GpuRenderer::new(options))
            .err()
            .expect("zero-area target must be rejected");
        assert!(err.downcast_ref::<GpuUnavailable>().is_none());
    }

    #[test]
    fn unavailability_survives_anyhow_wrapping() {
        let err = anyhow::Error::from(GpuUnavailable::from_error("adapter", "none found"))
            .context("renderer init");
        let unavailable = err.downcast_ref::<GpuUnavailable>().unwrap();
        assert_eq!(
            unavailable.to_string(),
            "GPU unavailable: failed to acquire adapter: none found"
        );
    }
}
