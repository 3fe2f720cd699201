//! Directional Lambert shading program and the host plumbing around it.
//!
//! The shading program is shipped twice: as WGSL for wgpu pipelines
//! ([`shader`]) and as a CPU reference of the same two stages
//! ([`program`]). Both read the same binding contract ([`uniforms`],
//! [`vertex`], [`lighting`]). The [`render`] module drives either one over a
//! [`Mesh`] and hands back a [`Framebuffer`]. Meshes come from OBJ data
//! ([`obj`]) or from extruded 2D profiles ([`profile`]).

pub mod camera;
pub mod lighting;
pub mod obj;
pub mod profile;
pub mod program;
pub mod render;
pub mod shader;
pub mod uniforms;
pub mod vertex;

pub use camera::{CameraParams, OrbitCamera};
pub use lighting::{Lighting, LightingError};
pub use obj::{load_obj_from_str, Mesh};
pub use profile::{Plane, Profile, ProfileError};
pub use program::{FragmentInput, ShadingProgram, VertexOutput};
pub use render::{Framebuffer, GpuRenderer, GpuUnavailable, RenderOptions, SoftwareRenderer};
pub use uniforms::{LightingUniform, Uniforms};
pub use vertex::Vertex;
