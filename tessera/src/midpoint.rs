//! Edge midpoint deduplication and ownership tracking
//!
//! Two triangles which share an edge must split it at the _same_ vertex,
//! otherwise the surface tears open.  [`MidpointCache`] guarantees that by
//! keying midpoints on the canonical (undirected) edge.
//!
//! [`OwnerIndex`] records which nodes caused each midpoint to exist.  It's the
//! inverse of the `dependents` lists stored in each node: if a node's split
//! only exists because some other node exposed a midpoint, we need to find
//! that other node in order to register the dependency.
use crate::{
    types::{EdgeKey, NodeIndex, VertexIndex},
    vertex::VertexStore,
};
use std::collections::HashMap;

/// Map from canonical edge to the index of its midpoint vertex
#[derive(Clone, Debug, Default)]
pub(crate) struct MidpointCache(HashMap<EdgeKey, VertexIndex>);

impl MidpointCache {
    /// Looks up the midpoint of an edge, without creating it
    pub fn get(&self, key: EdgeKey) -> Option<VertexIndex> {
        self.0.get(&key).copied()
    }

    /// Returns the midpoint of `a` and `b`, creating it if necessary
    ///
    /// New midpoints are the arithmetic mean of the endpoints, projected onto
    /// the unit sphere.  Calling this repeatedly with the same unordered pair
    /// never creates a second vertex.
    pub fn get_or_insert(
        &mut self,
        a: VertexIndex,
        b: VertexIndex,
        verts: &mut VertexStore,
    ) -> VertexIndex {
        let key = EdgeKey::new(a, b);
        if let Some(m) = self.0.get(&key) {
            return *m;
        }
        let mid = (verts.get(a) + verts.get(b)) / 2.0;
        let i = verts.push_on_sphere(mid);
        self.0.insert(key, i);
        i
    }

    pub fn remove(&mut self, key: EdgeKey) -> Option<VertexIndex> {
        self.0.remove(&key)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = (EdgeKey, VertexIndex)> + '_ {
        self.0.iter().map(|(k, v)| (*k, *v))
    }

    /// Rewrites every entry through `f`, dropping entries where any of the
    /// three vertices (both endpoints and the midpoint) fails to map
    pub fn remap<F: Fn(VertexIndex) -> Option<VertexIndex>>(&mut self, f: F) {
        self.0 = self
            .0
            .drain()
            .filter_map(|(key, mid)| {
                let (a, b) = key.endpoints();
                Some((EdgeKey::new(f(a)?, f(b)?), f(mid)?))
            })
            .collect();
    }
}

/// Map from midpoint vertex to the node(s) which introduced it
///
/// Entries are removed as soon as their owner list becomes empty, so a
/// midpoint is "live" iff it has an entry here.
#[derive(Clone, Debug, Default)]
pub(crate) struct OwnerIndex(HashMap<VertexIndex, Vec<NodeIndex>>);

impl OwnerIndex {
    /// Records `node` as an owner of `mid` (no-op if it already is one)
    pub fn add(&mut self, mid: VertexIndex, node: NodeIndex) {
        let owners = self.0.entry(mid).or_default();
        if !owners.contains(&node) {
            owners.push(node);
        }
    }

    /// Removes `node` from the owners of `mid`, returning `true` if it was
    /// present
    pub fn remove(&mut self, mid: VertexIndex, node: NodeIndex) -> bool {
        let Some(owners) = self.0.get_mut(&mid) else {
            return false;
        };
        let Some(i) = owners.iter().position(|n| *n == node) else {
            return false;
        };
        owners.swap_remove(i);
        if owners.is_empty() {
            self.0.remove(&mid);
        }
        true
    }

    /// Returns the owners of `mid`, which may be empty
    pub fn owners(&self, mid: VertexIndex) -> &[NodeIndex] {
        self.0.get(&mid).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn is_owned(&self, mid: VertexIndex) -> bool {
        self.0.contains_key(&mid)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn iter(
        &self,
    ) -> impl Iterator<Item = (VertexIndex, &[NodeIndex])> + '_ {
        self.0.iter().map(|(k, v)| (*k, v.as_slice()))
    }

    /// Rewrites every midpoint through `f`, dropping unmapped entries
    pub fn remap<F: Fn(VertexIndex) -> Option<VertexIndex>>(&mut self, f: F) {
        self.0 = self
            .0
            .drain()
            .filter_map(|(mid, owners)| Some((f(mid)?, owners)))
            .collect();
    }
}
