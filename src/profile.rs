//! Closed 2D profiles extruded into flat-shaded meshes.
//!
//! A [`Profile`] is a simple polygon in the coordinates of a [`Plane`].
//! [`Profile::extrude`] sweeps it along the plane normal and emits caps and
//! side walls with outward normals and counter-clockwise winding, so the
//! result can go straight to either renderer.

use std::f32::consts::{FRAC_PI_2, TAU};

use glam::{Vec2, Vec3};
use thiserror::Error;

use crate::obj::Mesh;
use crate::vertex::Vertex;

/// Segments used to approximate [`Profile::circle`].
pub const CIRCLE_SEGMENTS: usize = 64;

const DEGENERATE_TOLERANCE: f32 = 1e-6;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum ProfileError {
    #[error("degenerate plane: axes are collinear or zero-length")]
    DegeneratePlane,
    #[error("a profile needs at least 3 distinct points, got {0}")]
    TooFewPoints(usize),
    #[error("profile encloses no area")]
    ZeroArea,
    #[error("radius must be positive, got {0}")]
    InvalidRadius(f32),
    #[error("extrusion depth must be finite and non-zero, got {0}")]
    InvalidDepth(f32),
    #[error("profile self-intersects and cannot be triangulated")]
    NotSimple,
}

/// A plane in world space that 2D profile points are lifted onto.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Plane {
    origin: Vec3,
    x_axis: Vec3,
    y_axis: Vec3,
}

impl Plane {
    /// Builds a plane from an origin and two in-plane directions. `y_dir`
    /// is made orthogonal to `x_dir`.
    pub fn new(origin: Vec3, x_dir: Vec3, y_dir: Vec3) -> Result<Self, ProfileError> {
        let x_axis = x_dir.normalize_or_zero();
        let y_axis = (y_dir - x_axis * x_axis.dot(y_dir)).normalize_or_zero();
        if x_axis.cross(y_axis).length() < DEGENERATE_TOLERANCE {
            return Err(ProfileError::DegeneratePlane);
        }
        Ok(Self {
            origin,
            x_axis,
            y_axis,
        })
    }

    pub fn xy() -> Self {
        Self::xy_at(0.0)
    }

    pub fn xy_at(z: f32) -> Self {
        Self {
            origin: Vec3::new(0.0, 0.0, z),
            x_axis: Vec3::X,
            y_axis: Vec3::Y,
        }
    }

    pub fn xz() -> Self {
        Self {
            origin: Vec3::ZERO,
            x_axis: Vec3::X,
            y_axis: Vec3::Z,
        }
    }

    pub fn yz() -> Self {
        Self {
            origin: Vec3::ZERO,
            x_axis: Vec3::Y,
            y_axis: Vec3::Z,
        }
    }

    pub fn origin(&self) -> Vec3 {
        self.origin
    }

    /// `x_axis × y_axis`; counter-clockwise profiles face this way.
    pub fn normal(&self) -> Vec3 {
        self.x_axis.cross(self.y_axis)
    }

    pub fn lift(&self, point: Vec2) -> Vec3 {
        self.origin + self.x_axis * point.x + self.y_axis * point.y
    }

    pub fn project(&self, point: Vec3) -> Vec2 {
        let offset = point - self.origin;
        Vec2::new(offset.dot(self.x_axis), offset.dot(self.y_axis))
    }
}

/// A closed polygon, stored counter-clockwise without a repeated end point.
#[derive(Debug, Clone, PartialEq)]
pub struct Profile {
    points: Vec<Vec2>,
}

impl Profile {
    /// Accepts either winding and an optional closing point equal to the first.
    pub fn from_points(mut points: Vec<Vec2>) -> Result<Self, ProfileError> {
        points.dedup_by(|a, b| a.abs_diff_eq(*b, DEGENERATE_TOLERANCE));
        if points.len() > 1 && points[0].abs_diff_eq(points[points.len() - 1], DEGENERATE_TOLERANCE) {
            points.pop();
        }
        if points.len() < 3 {
            return Err(ProfileError::TooFewPoints(points.len()));
        }
        let area = signed_area(&points);
        if !area.is_finite() || area.abs() < DEGENERATE_TOLERANCE {
            return Err(ProfileError::ZeroArea);
        }
        if area < 0.0 {
            points.reverse();
        }
        Ok(Self { points })
    }

    pub fn rectangle(corner: Vec2, width: f32, height: f32) -> Result<Self, ProfileError> {
        Self::from_points(vec![
            corner,
            corner + Vec2::new(width, 0.0),
            corner + Vec2::new(width, height),
            corner + Vec2::new(0.0, height),
        ])
    }

    pub fn rectangle_centered(center: Vec2, width: f32, height: f32) -> Result<Self, ProfileError> {
        Self::rectangle(center - Vec2::new(width, height) * 0.5, width, height)
    }

    /// Regular polygon with its first vertex straight above `center`.
    pub fn regular_polygon(center: Vec2, radius: f32, sides: usize) -> Result<Self, ProfileError> {
        if !(radius > 0.0 && radius.is_finite()) {
            return Err(ProfileError::InvalidRadius(radius));
        }
        if sides < 3 {
            return Err(ProfileError::TooFewPoints(sides));
        }
        let step = TAU / sides as f32;
        let points = (0..sides)
            .map(|i| center + radius * Vec2::from_angle(FRAC_PI_2 + step * i as f32))
            .collect();
        Self::from_points(points)
    }

    /// Circle approximated by [`CIRCLE_SEGMENTS`] straight edges.
    pub fn circle(center: Vec2, radius: f32) -> Result<Self, ProfileError> {
        Self::regular_polygon(center, radius, CIRCLE_SEGMENTS)
    }

    pub fn points(&self) -> &[Vec2] {
        &self.points
    }

    pub fn area(&self) -> f32 {
        signed_area(&self.points)
    }

    /// Ear-clips the polygon into counter-clockwise triangles of point indices.
    pub fn triangulate(&self) -> Result<Vec<[usize; 3]>, ProfileError> {
        let points = &self.points;
        let mut remaining: Vec<usize> = (0..points.len()).collect();
        let mut triangles = Vec::with_capacity(points.len() - 2);

        while remaining.len() > 3 {
            let count = remaining.len();
            let corner = |i: usize| {
                [
                    remaining[(i + count - 1) % count],
                    remaining[i],
                    remaining[(i + 1) % count],
                ]
            };
            let ear = (0..count)
                .find(|&i| {
                    let [a, b, c] = corner(i);
                    let (pa, pb, pc) = (points[a], points[b], points[c]);
                    (pb - pa).perp_dot(pc - pb) > 0.0
                        && remaining
                            .iter()
                            .filter(|&&j| j != a && j != b && j != c)
                            .all(|&j| !in_triangle(points[j], pa, pb, pc))
                })
                .ok_or(ProfileError::NotSimple)?;
            triangles.push(corner(ear));
            remaining.remove(ear);
        }
        triangles.push([remaining[0], remaining[1], remaining[2]]);
        Ok(triangles)
    }

    /// Sweeps the profile `depth` units along `plane.normal()`; a negative
    /// depth sweeps the other way.
    pub fn extrude(&self, plane: &Plane, depth: f32) -> Result<Mesh, ProfileError> {
        if !depth.is_finite() || depth.abs() < DEGENERATE_TOLERANCE {
            return Err(ProfileError::InvalidDepth(depth));
        }
        let triangles = self.triangulate()?;
        let sweep = plane.normal() * depth;
        let outward = sweep.normalize();

        let base: Vec<Vec3> = self.points.iter().map(|p| plane.lift(*p)).collect();
        let top: Vec<Vec3> = base.iter().map(|p| *p + sweep).collect();

        let mut mesh = Mesh::default();
        push_polygon(&mut mesh, &base, &triangles, -outward);
        push_polygon(&mut mesh, &top, &triangles, outward);

        let count = base.len();
        for i in 0..count {
            let j = (i + 1) % count;
            let edge = base[j] - base[i];
            // Points run counter-clockwise around `plane.normal()`.
            let side = edge.cross(plane.normal()).normalize();
            push_polygon(
                &mut mesh,
                &[base[i], base[j], top[j], top[i]],
                &[[0, 1, 2], [0, 2, 3]],
                side,
            );
        }
        Ok(mesh)
    }
}

fn signed_area(points: &[Vec2]) -> f32 {
    let wrapped = points.iter().zip(points.iter().cycle().skip(1));
    wrapped.map(|(a, b)| a.perp_dot(*b)).sum::<f32>() * 0.5
}

fn in_triangle(p: Vec2, a: Vec2, b: Vec2, c: Vec2) -> bool {
    (b - a).perp_dot(p - a) >= 0.0 && (c - b).perp_dot(p - b) >= 0.0 && (a - c).perp_dot(p - c) >= 0.0
}

/// Appends one flat face. Triangle winding is flipped when needed so it is
/// counter-clockwise seen from the side `normal` points to.
fn push_polygon(mesh: &mut Mesh, positions: &[Vec3], triangles: &[[usize; 3]], normal: Vec3) {
    let facing: Vec3 = triangles
        .iter()
        .map(|[a, b, c]| (positions[*b] - positions[*a]).cross(positions[*c] - positions[*a]))
        .sum();
    let flip = facing.dot(normal) < 0.0;

    let base = mesh.vertices.len() as u32;
    mesh.vertices
        .extend(positions.iter().map(|position| Vertex::new(*position, normal)));
    for &[a, b, c] in triangles {
        let [a, b, c] = [a, b, c].map(|i| base + i as u32);
        if flip {
            mesh.indices.extend([a, c, b]);
        } else {
            mesh.indices.extend([a, b, c]);
        }
    }
}
