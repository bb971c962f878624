use crate::types::{EdgeKey, VertexIndex};
use nalgebra::Vector3;

/// Immutable triangle, as three indices into a shared vertex list
///
/// Winding order is preserved by every operation which derives new triangles
/// from an existing one.  Edge `i` runs from vertex `i` to vertex
/// `(i + 1) % 3`.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
pub struct Triangle([VertexIndex; 3]);

impl Triangle {
    /// Builds a new triangle from three vertex indices
    pub const fn new(a: VertexIndex, b: VertexIndex, c: VertexIndex) -> Self {
        Self([a, b, c])
    }

    /// Returns the given vertex (0-2)
    ///
    /// # Panics
    /// If `i >= 3`
    pub const fn vertex(&self, i: usize) -> VertexIndex {
        self.0[i]
    }

    /// Returns all three vertices
    pub const fn vertices(&self) -> [VertexIndex; 3] {
        self.0
    }

    /// Returns the directed edge `i` (0-2)
    pub const fn edge(&self, i: usize) -> (VertexIndex, VertexIndex) {
        (self.0[i], self.0[(i + 1) % 3])
    }

    /// Returns the canonical key of edge `i`
    pub const fn edge_key(&self, i: usize) -> EdgeKey {
        let (a, b) = self.edge(i);
        EdgeKey::new(a, b)
    }

    /// Returns the canonical keys of all three edges
    pub const fn edge_keys(&self) -> [EdgeKey; 3] {
        [self.edge_key(0), self.edge_key(1), self.edge_key(2)]
    }

    /// Checks whether any vertex is repeated
    pub fn is_degenerate(&self) -> bool {
        let [a, b, c] = self.0;
        a == b || b == c || c == a
    }

    /// Returns the centroid of the triangle
    ///
    /// # Panics
    /// If any index is out of range for `verts`
    pub fn centroid(&self, verts: &[Vector3<f32>]) -> Vector3<f32> {
        let [a, b, c] = self.0;
        (verts[a.index()] + verts[b.index()] + verts[c.index()]) / 3.0
    }

    /// Returns the (unnormalized) face normal, following the winding order
    pub fn normal(&self, verts: &[Vector3<f32>]) -> Vector3<f32> {
        let [a, b, c] = self.0.map(|v| verts[v.index()]);
        (b - a).cross(&(c - a))
    }

    /// Rewrites every index through `f`, returning `None` if any index fails
    /// to map
    pub fn remap<F: FnMut(VertexIndex) -> Option<VertexIndex>>(
        &self,
        mut f: F,
    ) -> Option<Self> {
        Some(Self([f(self.0[0])?, f(self.0[1])?, f(self.0[2])?]))
    }
}

impl From<[u32; 3]> for Triangle {
    fn from(v: [u32; 3]) -> Self {
        Self(v.map(VertexIndex::new))
    }
}

impl IntoIterator for Triangle {
    type Item = VertexIndex;
    type IntoIter = std::array::IntoIter<VertexIndex, 3>;
    fn into_iter(self) -> Self::IntoIter {
        self.0.into_iter()
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_edges() {
        let t = Triangle::from([4, 9, 2]);
        assert_eq!(t.edge(0), (VertexIndex::new(4), VertexIndex::new(9)));
        assert_eq!(t.edge(1), (VertexIndex::new(9), VertexIndex::new(2)));
        assert_eq!(t.edge(2), (VertexIndex::new(2), VertexIndex::new(4)));
        assert_eq!(
            t.edge_key(2),
            EdgeKey::new(VertexIndex::new(4), VertexIndex::new(2))
        );
        assert!(!t.is_degenerate());
        assert!(Triangle::from([1, 2, 1]).is_degenerate());
    }

    #[test]
    fn test_centroid() {
        let verts = [
            Vector3::new(3.0, 0.0, 0.0),
            Vector3::new(0.0, 3.0, 0.0),
            Vector3::new(0.0, 0.0, 3.0),
        ];
        let t = Triangle::from([0, 1, 2]);
        assert_relative_eq!(t.centroid(&verts), Vector3::new(1.0, 1.0, 1.0));

        // Counter-clockwise when seen from outside, so the normal points away
        // from the origin
        assert!(t.normal(&verts).dot(&Vector3::new(1.0, 1.0, 1.0)) > 0.0);
    }

    #[test]
    fn test_remap() {
        let t = Triangle::from([0, 1, 2]);
        let r = t.remap(|v| Some(VertexIndex::new(v.get() + 10))).unwrap();
        assert_eq!(r, Triangle::from([10, 11, 12]));
        assert!(t.remap(|v| (v.get() != 1).then_some(v)).is_none());
    }
}
