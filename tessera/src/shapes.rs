//! Base solids for seeding a [`MeshTree`](crate::MeshTree)
//!
//! The tree accepts any closed triangulation; these are the usual starting
//! points for a sphere.  Vertices are pre-normalized onto the unit sphere and
//! triangles are wound counter-clockwise when seen from outside.
use nalgebra::Vector3;

/// Flat vertex and index lists, in the form taken by
/// [`MeshTree::new`](crate::MeshTree::new)
#[derive(Clone, Debug, PartialEq)]
pub struct BaseSolid {
    /// Vertex positions, on the unit sphere
    pub vertices: Vec<Vector3<f32>>,
    /// Vertex indices, 3 per triangle
    pub triangles: Vec<u32>,
}

/// Regular icosahedron (12 vertices, 20 triangles, 30 edges)
pub fn icosahedron() -> BaseSolid {
    let phi = (1.0 + 5.0f32.sqrt()) / 2.0;
    #[rustfmt::skip]
    let vertices = [
        [-1.0, phi, 0.0], [1.0, phi, 0.0], [-1.0, -phi, 0.0], [1.0, -phi, 0.0],
        [0.0, -1.0, phi], [0.0, 1.0, phi], [0.0, -1.0, -phi], [0.0, 1.0, -phi],
        [phi, 0.0, -1.0], [phi, 0.0, 1.0], [-phi, 0.0, -1.0], [-phi, 0.0, 1.0],
    ];
    #[rustfmt::skip]
    let triangles = vec![
        0, 11, 5,   0, 5, 1,    0, 1, 7,    0, 7, 10,   0, 10, 11,
        1, 5, 9,    5, 11, 4,   11, 10, 2,  10, 7, 6,   7, 1, 8,
        3, 9, 4,    3, 4, 2,    3, 2, 6,    3, 6, 8,    3, 8, 9,
        4, 9, 5,    2, 4, 11,   6, 2, 10,   8, 6, 7,    9, 8, 1,
    ];
    BaseSolid {
        vertices: vertices
            .into_iter()
            .map(|v| Vector3::from(v).normalize())
            .collect(),
        triangles,
    }
}

/// Regular octahedron (6 vertices, 8 triangles, 12 edges)
pub fn octahedron() -> BaseSolid {
    #[rustfmt::skip]
    let vertices = vec![
        Vector3::x(), -Vector3::x(),
        Vector3::y(), -Vector3::y(),
        Vector3::z(), -Vector3::z(),
    ];
    #[rustfmt::skip]
    let triangles = vec![
        0, 2, 4,    1, 4, 2,    0, 4, 3,    1, 3, 4,
        0, 5, 2,    1, 2, 5,    0, 3, 5,    1, 5, 3,
    ];
    BaseSolid {
        vertices,
        triangles,
    }
}
