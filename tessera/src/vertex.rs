//! Append-only vertex storage
use crate::types::VertexIndex;
use nalgebra::Vector3;

/// Ordered list of vertex positions
///
/// Vertices are only ever appended during subdivision; the list is rewritten
/// wholesale by [`VertexStore::compact`].
#[derive(Clone, Debug, Default)]
pub(crate) struct VertexStore(Vec<Vector3<f32>>);

impl VertexStore {
    pub fn new(verts: Vec<Vector3<f32>>) -> Self {
        Self(verts)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn as_slice(&self) -> &[Vector3<f32>] {
        &self.0
    }

    /// Looks up a vertex position
    ///
    /// # Panics
    /// If the index is out of range; this indicates a logic error in the
    /// caller, since every index in the tree is validated at construction.
    pub fn get(&self, v: VertexIndex) -> Vector3<f32> {
        match self.0.get(v.index()) {
            Some(p) => *p,
            None => panic!(
                "vertex {v} is out of range (vertex count is {})",
                self.0.len()
            ),
        }
    }

    /// Projects `p` onto the unit sphere and appends it
    pub fn push_on_sphere(&mut self, p: Vector3<f32>) -> VertexIndex {
        // A zero-length point has no direction; keep it as-is rather than
        // filling the list with NaNs.
        let p = p.try_normalize(0.0).unwrap_or(p);
        let i = u32::try_from(self.0.len())
            .expect("vertex count exceeds the range of `u32`");
        self.0.push(p);
        VertexIndex::new(i)
    }

    /// Rebuilds the list so that it only contains the vertices in `order`
    ///
    /// Vertex `order[i]` moves to index `i`; positions are copied bit-for-bit.
    pub fn compact(&mut self, order: &[VertexIndex]) {
        self.0 = order.iter().map(|v| self.get(*v)).collect();
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_push_on_sphere() {
        let mut store = VertexStore::default();
        let i = store.push_on_sphere(Vector3::new(0.0, 3.0, 4.0));
        assert_eq!(i, VertexIndex::new(0));
        assert_relative_eq!(store.get(i), Vector3::new(0.0, 0.6, 0.8));
        assert_relative_eq!(store.get(i).norm(), 1.0);

        let j = store.push_on_sphere(Vector3::zeros());
        assert_eq!(j, VertexIndex::new(1));
        assert_eq!(store.get(j), Vector3::zeros());
    }

    #[test]
    fn test_compact() {
        let mut store = VertexStore::new(vec![
            Vector3::new(1.0, 0.0, 0.0),
            Vector3::new(0.0, 1.0, 0.0),
            Vector3::new(0.0, 0.0, 1.0),
        ]);
        store.compact(&[VertexIndex::new(2), VertexIndex::new(0)]);
        assert_eq!(
            store.as_slice(),
            &[Vector3::new(0.0, 0.0, 1.0), Vector3::new(1.0, 0.0, 0.0)]
        );
    }

    #[test]
    #[should_panic(expected = "out of range")]
    fn test_bad_index() {
        let store = VertexStore::default();
        store.get(VertexIndex::new(3));
    }
}
