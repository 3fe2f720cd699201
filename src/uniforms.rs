use bytemuck::{Pod, Zeroable};
use glam::{Mat4, Vec3};

use crate::camera::CameraParams;
use crate::lighting::Lighting;

/// Bind group index shared by both uniform blocks.
pub const UNIFORM_GROUP: u32 = 0;
/// Binding of the camera block ([`Uniforms`]).
pub const CAMERA_BINDING: u32 = 0;
/// Binding of the lighting block ([`LightingUniform`]).
pub const LIGHTING_BINDING: u32 = 1;

/// Camera block at `@group(0) @binding(0)`.
///
/// 64 bytes of column-major `view_proj`, 12 bytes of `eye_pos`, 4 bytes of
/// padding up to the 16 byte uniform alignment.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Pod, Zeroable)]
pub struct Uniforms {
    pub view_proj: [[f32; 4]; 4],
    /// Camera position. Part of the contract, not read by the lighting.
    pub eye_pos: [f32; 3],
    pub _padding: f32,
}

impl Default for Uniforms {
    fn default() -> Self {
        Self::new(Mat4::IDENTITY, Vec3::ZERO)
    }
}

impl Uniforms {
    pub fn new(view_proj: Mat4, eye_pos: Vec3) -> Self {
        Self {
            view_proj: view_proj.to_cols_array_2d(),
            eye_pos: eye_pos.to_array(),
            _padding: 0.0,
        }
    }

    pub fn from_camera(camera: &CameraParams) -> Self {
        Self::new(camera.view_proj, camera.position)
    }

    pub fn view_proj(&self) -> Mat4 {
        Mat4::from_cols_array_2d(&self.view_proj)
    }

    pub fn eye_pos(&self) -> Vec3 {
        Vec3::from_array(self.eye_pos)
    }
}

/// Lighting block at `@group(0) @binding(1)`.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Pod, Zeroable)]
pub struct LightingUniform {
    pub light_dir: [f32; 3],
    pub ambient: f32,
    pub base_color: [f32; 3],
    pub diffuse_weight: f32,
}

impl From<&Lighting> for LightingUniform {
    fn from(lighting: &Lighting) -> Self {
        Self {
            light_dir: lighting.direction.to_array(),
            ambient: lighting.ambient,
            base_color: lighting.base_color.to_array(),
            diffuse_weight: lighting.diffuse_weight,
        }
    }
}
