//! Strongly-typed indexes of various flavors
//!
//! Vertices and tree nodes are both stored in flat arrays; wrapping their
//! indices in distinct types keeps us from mixing them up.

/// Index into the shared vertex list of a [`MeshTree`](crate::MeshTree)
#[derive(Copy, Clone, Debug, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct VertexIndex(u32);

impl VertexIndex {
    /// Builds a new vertex index
    pub const fn new(i: u32) -> Self {
        Self(i)
    }

    /// Returns the raw `u32` value
    pub const fn get(self) -> u32 {
        self.0
    }

    /// Returns the value as a `usize`, for use in slice indexing
    pub const fn index(self) -> usize {
        self.0 as usize
    }
}

impl From<u32> for VertexIndex {
    fn from(i: u32) -> Self {
        Self(i)
    }
}

impl std::fmt::Display for VertexIndex {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "v{}", self.0)
    }
}

/// Handle to a node in the subdivision tree
///
/// Node storage is recycled, so a handle also carries the generation of the
/// slot at the time the node was allocated.  A handle whose generation no
/// longer matches its slot refers to a node that has since been freed.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
pub struct NodeIndex {
    slot: u32,
    generation: u32,
}

impl NodeIndex {
    pub(crate) const fn new(slot: u32, generation: u32) -> Self {
        Self { slot, generation }
    }

    /// Returns the slot index, for use in slice indexing
    pub const fn slot(self) -> usize {
        self.slot as usize
    }

    /// Returns the slot generation
    pub const fn generation(self) -> u32 {
        self.generation
    }
}

impl std::fmt::Display for NodeIndex {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "n{}.{}", self.slot, self.generation)
    }
}

/// Canonical key for an undirected edge
///
/// The smaller vertex index is packed into the high 32 bits, so `(a, b)` and
/// `(b, a)` produce the same key.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct EdgeKey(u64);

impl EdgeKey {
    /// Builds the key for the edge between `a` and `b`
    ///
    /// ```
    /// # use tessera::types::{EdgeKey, VertexIndex};
    /// let a = VertexIndex::new(3);
    /// let b = VertexIndex::new(7);
    /// assert_eq!(EdgeKey::new(a, b), EdgeKey::new(b, a));
    /// assert_eq!(EdgeKey::new(a, b).endpoints(), (a, b));
    /// ```
    pub const fn new(a: VertexIndex, b: VertexIndex) -> Self {
        let (lo, hi) = if a.0 < b.0 { (a.0, b.0) } else { (b.0, a.0) };
        Self(((lo as u64) << 32) | hi as u64)
    }

    /// Returns the endpoints of this edge, smaller index first
    pub const fn endpoints(self) -> (VertexIndex, VertexIndex) {
        (VertexIndex((self.0 >> 32) as u32), VertexIndex(self.0 as u32))
    }

    /// Returns the raw packed key
    pub const fn get(self) -> u64 {
        self.0
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_edge_key_packing() {
        let a = VertexIndex::new(1);
        let b = VertexIndex::new(0xFFFF_FFFE);
        let k = EdgeKey::new(b, a);
        assert_eq!(k.get(), (1u64 << 32) | 0xFFFF_FFFE);
        assert_eq!(k.endpoints(), (a, b));
        assert_eq!(k, EdgeKey::new(a, b));

        // Distinct pairs must never collide, even when their sums match
        assert_ne!(
            EdgeKey::new(VertexIndex::new(0), VertexIndex::new(3)),
            EdgeKey::new(VertexIndex::new(1), VertexIndex::new(2))
        );
    }
}
