//! Mesh snapshot and export
use nalgebra::Vector3;
use std::io::{BufWriter, Write};

/// An indexed 3D mesh
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Mesh {
    /// Triangles, as indexes into [`self.vertices`](Self::vertices)
    pub triangles: Vec<Vector3<usize>>,
    /// Vertex positions
    pub vertices: Vec<Vector3<f32>>,
}

impl Mesh {
    /// Builds a new, empty mesh
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the three corner positions of triangle `i`
    fn corners(&self, i: usize) -> [Vector3<f32>; 3] {
        let t = self.triangles[i];
        [self.vertices[t.x], self.vertices[t.y], self.vertices[t.z]]
    }

    /// Writes a binary STL to the given output
    ///
    /// Facet normals are unit length, except for degenerate triangles, which
    /// get a zero normal.
    pub fn write_stl<F: std::io::Write>(
        &self,
        out: &mut F,
    ) -> Result<(), crate::Error> {
        const BANNER: &[u8] = b"binary STL written by tessera";
        static_assertions::const_assert!(BANNER.len() <= 80);
        let mut header = [0u8; 80];
        header[..BANNER.len()].copy_from_slice(BANNER);

        // Facets are 50 bytes each, so buffer them rather than issuing a
        // syscall per field
        let mut out = BufWriter::new(out);
        out.write_all(&header)?;
        out.write_all(&(self.triangles.len() as u32).to_le_bytes())?;
        for i in 0..self.triangles.len() {
            let [a, b, c] = self.corners(i);
            let n = (b - a).cross(&(c - a));
            let n = n.try_normalize(0.0).unwrap_or_else(Vector3::zeros);
            for p in [n, a, b, c] {
                for f in p.iter() {
                    out.write_all(&f.to_le_bytes())?;
                }
            }
            // Attribute byte count, unused
            out.write_all(&0u16.to_le_bytes())?;
        }
        out.flush()?;
        Ok(())
    }

    /// Writes a Wavefront OBJ to the given output
    ///
    /// Every vertex is written, whether or not a triangle uses it.
    pub fn write_obj<F: std::io::Write>(
        &self,
        out: &mut F,
    ) -> Result<(), crate::Error> {
        let mut out = BufWriter::new(out);
        for v in &self.vertices {
            writeln!(out, "v {} {} {}", v.x, v.y, v.z)?;
        }
        for t in &self.triangles {
            // OBJ indices are 1-based
            writeln!(out, "f {} {} {}", t.x + 1, t.y + 1, t.z + 1)?;
        }
        out.flush()?;
        Ok(())
    }
}
