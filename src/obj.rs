use std::collections::HashMap;

use anyhow::{anyhow, Context, Result};
use glam::{Mat3, Mat4, Vec3};

use crate::vertex::Vertex;

/// Indexed triangle list in world space, ready for upload.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Mesh {
    pub vertices: Vec<Vertex>,
    pub indices: Vec<u32>,
}

impl Mesh {
    /// Unit cube centered on the origin with flat per-face normals.
    pub fn cube() -> Self {
        const FACES: [(Vec3, Vec3, Vec3); 6] = [
            // normal, u, v: u × v == normal keeps every face counter-clockwise
            (Vec3::Z, Vec3::X, Vec3::Y),
            (Vec3::NEG_Z, Vec3::NEG_X, Vec3::Y),
            (Vec3::X, Vec3::NEG_Z, Vec3::Y),
            (Vec3::NEG_X, Vec3::Z, Vec3::Y),
            (Vec3::Y, Vec3::X, Vec3::NEG_Z),
            (Vec3::NEG_Y, Vec3::X, Vec3::Z),
        ];

        let mut vertices = Vec::with_capacity(24);
        let mut indices = Vec::with_capacity(36);
        for (normal, u, v) in FACES {
            let base = vertices.len() as u32;
            let center = normal * 0.5;
            for (su, sv) in [(-0.5, -0.5), (0.5, -0.5), (0.5, 0.5), (-0.5, 0.5)] {
                vertices.push(Vertex::new(center + u * su + v * sv, normal));
            }
            indices.extend_from_slice(&[base, base + 1, base + 2, base, base + 2, base + 3]);
        }
        Self { vertices, indices }
    }

    pub fn triangle_count(&self) -> usize {
        self.indices.len() / 3
    }

    /// Axis-aligned bounds of all vertex positions, `None` for an empty mesh.
    pub fn bounds(&self) -> Option<(Vec3, Vec3)> {
        let mut positions = self.vertices.iter().map(Vertex::position);
        let first = positions.next()?;
        Some(positions.fold((first, first), |(min, max), p| (min.min(p), max.max(p))))
    }

    /// Bakes a model transform into the vertex data.
    ///
    /// Positions go through `model`; normals go through its inverse transpose
    /// and are renormalized. The shading program applies no model matrix, so
    /// this is how object-space geometry reaches it.
    pub fn transformed(&self, model: Mat4) -> Self {
        let normal_matrix = Mat3::from_mat4(model).inverse().transpose();
        let vertices = self
            .vertices
            .iter()
            .map(|vertex| {
                Vertex::new(
                    model.transform_point3(vertex.position()),
                    (normal_matrix * vertex.normal()).normalize_or_zero(),
                )
            })
            .collect();
        Self {
            vertices,
            indices: self.indices.clone(),
        }
    }
}

/// Parses an OBJ file from memory into an indexed [`Mesh`].
///
/// Only `v`, `vn` and `f` records are read; texture coordinates and grouping
/// statements are skipped. Face corners resolve against the records declared
/// above them, so negative indices count back from the current line.
/// Polygons are fan-triangulated. Corners without a `vn` reference get an
/// area-weighted smooth normal; authored normals are kept as written.
pub fn load_obj_from_str(data: &str) -> Result<Mesh> {
    let mut reader = ObjReader::default();
    for (number, line) in data.lines().enumerate() {
        reader
            .read_line(line)
            .with_context(|| format!("line {}: {}", number + 1, line.trim()))?;
    }
    reader.finish()
}

/// One distinct `position[/texcoord]/normal` combination.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
struct Corner {
    position: usize,
    normal: Option<usize>,
}

#[derive(Default)]
struct ObjReader {
    positions: Vec<Vec3>,
    normals: Vec<Vec3>,
    corners: HashMap<Corner, u32>,
    /// Output vertices whose normal has to be rebuilt from the faces.
    smoothed: Vec<bool>,
    mesh: Mesh,
}

impl ObjReader {
    fn read_line(&mut self, line: &str) -> Result<()> {
        let line = line.split('#').next().unwrap_or_default();
        let mut fields = line.split_whitespace();
        match fields.next() {
            Some("v") => self.positions.push(read_vec3(fields)?),
            Some("vn") => self.normals.push(read_vec3(fields)?),
            Some("f") => self.read_face(fields)?,
            _ => {}
        }
        Ok(())
    }

    fn read_face<'a>(&mut self, fields: impl Iterator<Item = &'a str>) -> Result<()> {
        let polygon = fields
            .map(|field| self.corner_index(field))
            .collect::<Result<Vec<u32>>>()?;
        if polygon.len() < 3 {
            return Err(anyhow!("a face needs 3 corners, got {}", polygon.len()));
        }
        for pair in polygon[1..].windows(2) {
            self.mesh.indices.extend([polygon[0], pair[0], pair[1]]);
        }
        Ok(())
    }

    fn corner_index(&mut self, field: &str) -> Result<u32> {
        let mut refs = field.split('/');
        let position = match refs.next() {
            Some(index) if !index.is_empty() => resolve(index, self.positions.len(), "vertex")?,
            _ => return Err(anyhow!("corner {field:?} has no vertex index")),
        };
        let normal = match refs.nth(1) {
            Some(index) if !index.is_empty() => {
                Some(resolve(index, self.normals.len(), "normal")?)
            }
            _ => None,
        };

        let corner = Corner { position, normal };
        if let Some(&index) = self.corners.get(&corner) {
            return Ok(index);
        }
        let index = u32::try_from(self.mesh.vertices.len())
            .map_err(|_| anyhow!("mesh exceeds the u32 index range"))?;
        let authored = normal.map(|i| self.normals[i]);
        self.mesh.vertices.push(Vertex::new(
            self.positions[position],
            authored.unwrap_or(Vec3::ZERO),
        ));
        self.smoothed.push(authored.is_none());
        self.corners.insert(corner, index);
        Ok(index)
    }

    fn finish(mut self) -> Result<Mesh> {
        if self.positions.is_empty() {
            return Err(anyhow!("OBJ data declares no vertices"));
        }
        if self.smoothed.contains(&true) {
            self.smooth_normals();
        }
        Ok(self.mesh)
    }

    /// Sums unnormalized face normals (twice the face area) into every
    /// corner flagged in `smoothed`, then normalizes.
    fn smooth_normals(&mut self) {
        let mesh = &mut self.mesh;
        let mut sums = vec![Vec3::ZERO; mesh.vertices.len()];
        for triangle in mesh.indices.chunks_exact(3) {
            let corners = [triangle[0], triangle[1], triangle[2]].map(|i| i as usize);
            let [a, b, c] = corners.map(|i| mesh.vertices[i].position());
            let face = (b - a).cross(c - a);
            for i in corners {
                sums[i] += face;
            }
        }
        for ((vertex, sum), smoothed) in mesh.vertices.iter_mut().zip(sums).zip(&self.smoothed) {
            if *smoothed {
                vertex.normal = sum.normalize_or_zero().to_array();
            }
        }
    }
}

fn read_vec3<'a>(fields: impl Iterator<Item = &'a str>) -> Result<Vec3> {
    let values = fields
        .take(3)
        .map(str::parse::<f32>)
        .collect::<Result<Vec<_>, _>>()?;
    match values[..] {
        [x, y, z] => Ok(Vec3::new(x, y, z)),
        _ => Err(anyhow!("expected 3 components, got {}", values.len())),
    }
}

/// Maps a one-based OBJ index, or a negative one relative to `count`, to a
/// zero-based slot below `count`.
fn resolve(index: &str, count: usize, kind: &str) -> Result<usize> {
    let raw: i64 = index
        .parse()
        .with_context(|| format!("invalid {kind} index {index:?}"))?;
    let slot = if raw < 0 { count as i64 + raw } else { raw - 1 };
    usize::try_from(slot)
        .ok()
        .filter(|&slot| slot < count)
        .ok_or_else(|| anyhow!("{kind} index {raw} out of range"))
}
