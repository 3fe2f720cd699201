use std::io::{self, Write};

use glam::Vec4;

/// Target size and fixed-function state shared by both renderers.
#[derive(Clone, Debug, PartialEq)]
pub struct RenderOptions {
    pub width: u32,
    pub height: u32,
    pub clear_color: Vec4,
    /// Drop triangles that wind clockwise in normalized device coordinates.
    pub cull_back_faces: bool,
}

impl Default for RenderOptions {
    fn default() -> Self {
        Self {
            width: 800,
            height: 600,
            clear_color: Vec4::new(0.1, 0.1, 0.1, 1.0),
            cull_back_faces: true,
        }
    }
}

impl RenderOptions {
    pub fn aspect_ratio(&self) -> f32 {
        self.width as f32 / self.height.max(1) as f32
    }
}

/// Color target read back from a renderer, row-major from the top-left.
#[derive(Clone, Debug, PartialEq)]
pub struct Framebuffer {
    width: u32,
    height: u32,
    clear_color: Vec4,
    pixels: Vec<Vec4>,
}

impl Framebuffer {
    pub fn new(width: u32, height: u32, clear_color: Vec4) -> Self {
        Self {
            width,
            height,
            clear_color,
            pixels: vec![clear_color; width as usize * height as usize],
        }
    }

    /// Rebuilds a framebuffer from tightly packed RGBA8 rows.
    pub fn from_rgba8(width: u32, height: u32, clear_color: Vec4, bytes: &[u8]) -> Self {
        let pixels = bytes
            .chunks_exact(4)
            .map(|px| Vec4::new(px[0] as f32, px[1] as f32, px[2] as f32, px[3] as f32) / 255.0)
            .collect();
        Self {
            width,
            height,
            clear_color,
            pixels,
        }
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn pixels(&self) -> &[Vec4] {
        &self.pixels
    }

    pub fn pixel(&self, x: u32, y: u32) -> Option<Vec4> {
        if x >= self.width || y >= self.height {
            return None;
        }
        self.pixels.get(self.index(x, y)).copied()
    }

    pub(crate) fn set_pixel(&mut self, x: u32, y: u32, color: Vec4) {
        let index = self.index(x, y);
        self.pixels[index] = color;
    }

    fn index(&self, x: u32, y: u32) -> usize {
        y as usize * self.width as usize + x as usize
    }

    fn is_covered(&self, color: Vec4) -> bool {
        !color.abs_diff_eq(self.clear_color, 1.0 / 255.0)
    }

    /// Number of pixels whose color differs from the clear color.
    pub fn covered_pixels(&self) -> usize {
        self.pixels.iter().filter(|px| self.is_covered(**px)).count()
    }

    /// Mean color over covered pixels, `None` when nothing was drawn.
    pub fn average_color(&self) -> Option<Vec4> {
        let (sum, count) = self
            .pixels
            .iter()
            .filter(|px| self.is_covered(**px))
            .fold((Vec4::ZERO, 0usize), |(sum, count), px| (sum + *px, count + 1));
        (count > 0).then(|| sum / count as f32)
    }

    /// Quantizes to RGBA8 the way a `Rgba8Unorm` target stores colors.
    pub fn to_rgba8(&self) -> Vec<u8> {
        self.pixels
            .iter()
            .flat_map(|px| {
                px.to_array()
                    .map(|channel| (channel.clamp(0.0, 1.0) * 255.0).round() as u8)
            })
            .collect()
    }

    /// Writes a binary PPM (P6), dropping alpha.
    pub fn write_ppm<W: Write>(&self, mut writer: W) -> io::Result<()> {
        write!(writer, "P6\n{} {}\n255\n", self.width, self.height)?;
        let rgb: Vec<u8> = self
            .to_rgba8()
            .chunks_exact(4)
            .flat_map(|px| [px[0], px[1], px[2]])
            .collect();
        writer.write_all(&rgb)?;
        writer.flush()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_framebuffer_is_cleared() {
        let clear = Vec4::new(0.1, 0.2, 0.3, 1.0);
        let framebuffer = Framebuffer::new(4, 3, clear);
        assert_eq!(framebuffer.pixels().len(), 12);
        assert_eq!(framebuffer.pixel(3, 2), Some(clear));
        assert_eq!(framebuffer.pixel(4, 0), None);
        assert_eq!(framebuffer.covered_pixels(), 0);
        assert_eq!(framebuffer.average_color(), None);
    }

    #[test]
    fn average_ignores_clear_pixels() {
        let mut framebuffer = Framebuffer::new(2, 2, Vec4::new(0.0, 0.0, 0.0, 1.0));
        framebuffer.set_pixel(0, 0, Vec4::new(1.0, 0.0, 0.0, 1.0));
        framebuffer.set_pixel(1, 1, Vec4::new(0.0, 1.0, 0.0, 1.0));
        assert_eq!(framebuffer.covered_pixels(), 2);
        assert_eq!(
            framebuffer.average_color(),
            Some(Vec4::new(0.5, 0.5, 0.0, 1.0))
        );
    }

    #[test]
    fn rgba8_round_trips_through_unorm() {
        let mut framebuffer = Framebuffer::new(1, 1, Vec4::ZERO);
        framebuffer.set_pixel(0, 0, Vec4::new(0.5, 1.5, -0.2, 1.0));
        let bytes = framebuffer.to_rgba8();
        assert_eq!(bytes, vec![128, 255, 0, 255]);
        let decoded = Framebuffer::from_rgba8(1, 1, Vec4::ZERO, &bytes);
        assert!((decoded.pixels()[0].x - 0.5).abs() < 1.0 / 255.0);
    }

    #[test]
    fn ppm_header_and_payload() {
        let framebuffer = Framebuffer::new(2, 1, Vec4::new(1.0, 0.0, 0.0, 1.0));
        let mut out = Vec::new();
        framebuffer.write_ppm(&mut out).unwrap();
        assert!(out.starts_with(b"P6\n2 1\n255\n"));
        assert_eq!(&out[out.len() - 6..], &[255, 0, 0, 255, 0, 0]);
    }
}
