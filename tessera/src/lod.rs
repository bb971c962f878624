//! Ready-made level-of-detail policies
//!
//! Each policy maps a triangle to a requested subdivision depth, and can be
//! passed to [`MeshTree::refine`](crate::MeshTree::refine) through a closure:
//!
//! ```
//! use tessera::{MeshTree, lod::Focus, shapes};
//! use nalgebra::Vector3;
//!
//! let base = shapes::icosahedron();
//! let mut tree = MeshTree::new(&base.vertices, &base.triangles)?;
//! let focus = Focus::new(Vector3::new(1.0, 1.0, 1.0).normalize(), 4);
//! let report = tree.refine(|t, v| focus.depth(t, v));
//! assert!(report.converged());
//! assert_eq!(tree.max_depth(), 4);
//! # Ok::<(), tessera::Error>(())
//! ```
use crate::Triangle;
use nalgebra::Vector3;

/// Requests the same depth everywhere
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct Uniform(pub u32);

impl Uniform {
    pub fn depth(&self, _t: &Triangle, _vertices: &[Vector3<f32>]) -> u32 {
        self.0
    }
}

/// Concentrates detail around a point of interest on the sphere
///
/// The triangle which is pierced by the ray from the origin along `direction`
/// gets `max_depth`.  Elsewhere, the requested depth falls off with the angle
/// `θ` between `direction` and the triangle's centroid, as
/// `max_depth · (1 - √(θ / π))` (rounded to the nearest level).
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct Focus {
    /// Direction of the point of interest, from the sphere's center
    pub direction: Vector3<f32>,
    pub max_depth: u32,
}

impl Focus {
    pub fn new(direction: Vector3<f32>, max_depth: u32) -> Self {
        Self {
            direction,
            max_depth,
        }
    }

    pub fn depth(&self, t: &Triangle, vertices: &[Vector3<f32>]) -> u32 {
        let center = t.centroid(vertices);
        if self.direction.dot(&center) > 0.0 && self.pierces(t, vertices) {
            return self.max_depth;
        }
        let max = self.max_depth as f32;
        let frac = self.direction.angle(&center) / std::f32::consts::PI;
        // Float-to-int casts saturate, so negative values become 0
        (max - frac.sqrt() * max + 0.5) as u32
    }

    /// Checks whether the line along `direction` passes through the triangle
    fn pierces(&self, t: &Triangle, vertices: &[Vector3<f32>]) -> bool {
        fn signed_volume(
            a: &Vector3<f32>,
            b: &Vector3<f32>,
            c: &Vector3<f32>,
            d: &Vector3<f32>,
        ) -> f32 {
            (b - a).cross(&(c - a)).dot(&(d - a))
        }
        // Segment endpoints far outside the unit sphere
        let q0 = self.direction * -1000.0;
        let q1 = self.direction * 1000.0;
        let [a, b, c] = t.vertices().map(|v| vertices[v.index()]);

        let v0 = signed_volume(&q0, &a, &b, &c) > 0.0;
        let v1 = signed_volume(&q1, &a, &b, &c) > 0.0;
        let e0 = signed_volume(&q0, &q1, &a, &b) > 0.0;
        let e1 = signed_volume(&q0, &q1, &b, &c) > 0.0;
        let e2 = signed_volume(&q0, &q1, &c, &a) > 0.0;
        v0 != v1 && e0 == e1 && e1 == e2
    }
}

/// Requests a fixed depth within a spherical cap, and nothing outside it
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct Cap {
    /// Center of the cap
    pub direction: Vector3<f32>,
    /// Angular radius of the cap, in radians
    pub half_angle: f32,
    pub depth: u32,
}

impl Cap {
    pub fn depth(&self, t: &Triangle, vertices: &[Vector3<f32>]) -> u32 {
        if self.direction.angle(&t.centroid(vertices)) <= self.half_angle {
            self.depth
        } else {
            0
        }
    }
}
