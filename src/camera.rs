use std::f32::consts::{FRAC_PI_2, FRAC_PI_4, FRAC_PI_6};

use glam::{Mat4, Vec3};

/// Camera state the host turns into the camera uniform block.
#[derive(Clone, Debug, PartialEq)]
pub struct CameraParams {
    pub view_proj: Mat4,
    pub position: Vec3,
}

/// Camera orbiting a target point on a sphere.
#[derive(Clone, Debug, PartialEq)]
pub struct OrbitCamera {
    pub target: Vec3,
    pub distance: f32,
    /// Horizontal angle around +Y, in radians.
    pub azimuth_rad: f32,
    /// Angle above the horizontal plane, in radians.
    pub elevation_rad: f32,
    pub fov_rad: f32,
    pub near: f32,
    pub far: f32,
}

const MIN_DISTANCE: f32 = 1.0;
const MAX_DISTANCE: f32 = 1000.0;
const ELEVATION_LIMIT: f32 = FRAC_PI_2 - 0.01;

impl Default for OrbitCamera {
    fn default() -> Self {
        Self {
            target: Vec3::ZERO,
            distance: 100.0,
            azimuth_rad: FRAC_PI_4,
            elevation_rad: FRAC_PI_6,
            fov_rad: FRAC_PI_4,
            near: 0.1,
            far: 1000.0,
        }
    }
}

impl OrbitCamera {
    pub fn eye_position(&self) -> Vec3 {
        let x = self.distance * self.elevation_rad.cos() * self.azimuth_rad.sin();
        let y = self.distance * self.elevation_rad.sin();
        let z = self.distance * self.elevation_rad.cos() * self.azimuth_rad.cos();
        self.target + Vec3::new(x, y, z)
    }

    pub fn view_matrix(&self) -> Mat4 {
        Mat4::look_at_rh(self.eye_position(), self.target, Vec3::Y)
    }

    pub fn projection_matrix(&self, aspect_ratio: f32) -> Mat4 {
        Mat4::perspective_rh(self.fov_rad, aspect_ratio.max(0.01), self.near, self.far)
    }

    pub fn view_projection(&self, aspect_ratio: f32) -> Mat4 {
        self.projection_matrix(aspect_ratio) * self.view_matrix()
    }

    pub fn params(&self, aspect_ratio: f32) -> CameraParams {
        CameraParams {
            view_proj: self.view_projection(aspect_ratio),
            position: self.eye_position(),
        }
    }

    /// Rotates around the target from a drag delta in pixels.
    pub fn orbit(&mut self, delta_x: f32, delta_y: f32) {
        self.azimuth_rad -= delta_x * 0.01;
        self.elevation_rad =
            (self.elevation_rad + delta_y * 0.01).clamp(-ELEVATION_LIMIT, ELEVATION_LIMIT);
    }

    /// Moves towards (positive) or away from (negative) the target.
    pub fn zoom(&mut self, delta: f32) {
        self.distance = (self.distance * (1.0 - delta * 0.1)).clamp(MIN_DISTANCE, MAX_DISTANCE);
    }

    /// Aims at the center of an axis-aligned box and backs off far enough
    /// for its bounding sphere to fit the vertical field of view.
    pub fn frame_bounds(&mut self, min: Vec3, max: Vec3) {
        let radius = ((max - min).length() * 0.5).max(f32::EPSILON);
        self.target = (min + max) * 0.5;
        self.distance = (radius / (self.fov_rad * 0.5).sin()).clamp(MIN_DISTANCE, MAX_DISTANCE);
        self.near = (self.distance - radius).max(0.01) * 0.5;
        self.far = (self.distance + radius) * 2.0;
    }
}
