//! Host-side drivers for the shading program.
//!
//! [`GpuRenderer`] builds a wgpu pipeline around [`crate::shader::SHADER`]
//! and renders offscreen. [`SoftwareRenderer`] runs the CPU reference stages
//! behind a small rasterizer. Both produce a [`Framebuffer`].

mod common;
mod gpu;
mod software;

pub use common::{Framebuffer, RenderOptions};
pub use gpu::{GpuRenderer, GpuUnavailable};
pub use software::SoftwareRenderer;
