//! Adaptive subdivision tree
//!
//! Each node owns a triangle; leaves form the visible surface.  Refining a
//! leaf splits it into four children, reusing edge midpoints from
//! [`MidpointCache`] so that neighbors which are split independently still
//! agree on their shared vertices.
//!
//! Splitting a leaf but not its neighbor leaves a T-junction (crack) along the
//! shared edge.  [`MeshTree::cleanup`] repairs these after every batch of
//! splits, either by splitting the neighbor fully or by "half-splitting" it
//! along the single edge that needs to match.  A half split only exists
//! because some other node exposed a midpoint, so it's recorded as a
//! _dependent_ of that node and is collapsed whenever its owner is.
use crate::{
    Error, Mesh,
    midpoint::{MidpointCache, OwnerIndex},
    node::{Children, Node, NodePool, NodeSet},
    report::{CleanupReport, Divergence, RefineReport},
    triangle::Triangle,
    types::{EdgeKey, NodeIndex, VertexIndex},
    vertex::VertexStore,
};
use arrayvec::ArrayVec;
use nalgebra::Vector3;

/// Settings for the fixed-point loops of a [`MeshTree`]
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct Settings {
    /// Maximum number of coarsening passes in [`MeshTree::refine`]
    pub max_coarsen_passes: usize,

    /// Maximum number of refine-then-repair passes in [`MeshTree::refine`]
    pub max_refine_passes: usize,

    /// Maximum number of crack-repair passes per call to
    /// [`MeshTree::cleanup`]
    pub max_cleanup_passes: usize,

    /// Allow half splits of nodes which are themselves half-split children
    ///
    /// When this is `false`, an odd-depth leaf which borders a single refined
    /// neighbor escalates to a full split of its parent instead.
    pub allow_double_splitting: bool,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            max_coarsen_passes: 20,
            max_refine_passes: 20,
            max_cleanup_passes: 20,
            allow_double_splitting: false,
        }
    }
}

/// Leaf edge whose neighbor has been split, leaving a crack
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct TJunction {
    /// Triangle of the unsplit leaf
    pub triangle: Triangle,
    /// Edge index (0-2) within `triangle`
    pub edge: usize,
    /// Midpoint vertex which lies on that edge
    pub midpoint: VertexIndex,
}

/// Repair chosen by [`MeshTree::cleanup`] for a single leaf
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
enum Repair {
    /// Split along the given edge, at an existing midpoint
    Half { edge: usize, mid: VertexIndex },
    /// Split into four children
    Full,
}

/// Work item used when collapsing a subtree
#[derive(Copy, Clone, Debug)]
enum Task {
    /// Collapse this node, reducing its children first if needed
    Reduce(NodeIndex),
    /// Collapse this node, whose children are now all leaves
    Collapse(NodeIndex),
}

/// Adaptively-refined triangle mesh on the unit sphere
///
/// ```
/// use tessera::{MeshTree, shapes};
///
/// let base = shapes::icosahedron();
/// let mut tree = MeshTree::new(&base.vertices, &base.triangles)?;
///
/// let report = tree.refine(|_, _| 1);
/// assert!(report.converged());
/// assert_eq!(tree.leaf_count(), 80);
/// assert_eq!(tree.vertices().len(), 42);
///
/// let report = tree.refine(|_, _| 0);
/// assert!(report.converged());
/// assert_eq!(tree.leaf_count(), 20);
/// # Ok::<(), tessera::Error>(())
/// ```
#[derive(Clone, Debug)]
pub struct MeshTree {
    vertices: VertexStore,
    midpoints: MidpointCache,
    owners: OwnerIndex,
    nodes: NodePool,
    roots: Vec<NodeIndex>,

    /// Nodes without children (the visible surface)
    leaves: NodeSet,

    /// Nodes whose children are all leaves (candidates for coarsening)
    superleaves: NodeSet,

    settings: Settings,
}

impl MeshTree {
    /// Builds a tree from a base triangulation, using default settings
    ///
    /// `triangles` is a flat list of vertex indices, 3 per triangle; one leaf
    /// is created for each triangle, in order.
    pub fn new(
        vertices: &[Vector3<f32>],
        triangles: &[u32],
    ) -> Result<Self, Error> {
        Self::with_settings(vertices, triangles, Settings::default())
    }

    /// Builds a tree from a base triangulation with the given settings
    pub fn with_settings(
        vertices: &[Vector3<f32>],
        triangles: &[u32],
        settings: Settings,
    ) -> Result<Self, Error> {
        if triangles.len() % 3 != 0 {
            return Err(Error::BadTriangleList(triangles.len()));
        }
        if u32::try_from(vertices.len()).is_err() {
            return Err(Error::TooManyVertices(vertices.len()));
        }

        let mut out = Self {
            vertices: VertexStore::new(vertices.to_vec()),
            midpoints: MidpointCache::default(),
            owners: OwnerIndex::default(),
            nodes: NodePool::default(),
            roots: Vec::with_capacity(triangles.len() / 3),
            leaves: NodeSet::default(),
            superleaves: NodeSet::default(),
            settings,
        };
        for (i, t) in triangles.chunks_exact(3).enumerate() {
            if let Some(&index) =
                t.iter().find(|v| **v as usize >= vertices.len())
            {
                return Err(Error::BadVertexIndex {
                    index,
                    count: vertices.len(),
                });
            }
            let tri = Triangle::from([t[0], t[1], t[2]]);
            if tri.is_degenerate() {
                return Err(Error::DegenerateTriangle(i));
            }
            let n = out.nodes.alloc(Node::new(tri, None, 0));
            out.roots.push(n);
            out.leaves.insert(n);
        }
        Ok(out)
    }

    /// Returns the settings used by this tree
    pub fn settings(&self) -> Settings {
        self.settings
    }

    /// Returns every vertex position, including vertices which are not
    /// currently referenced by any leaf
    ///
    /// Use [`MeshTree::minify_vertices`] to drop unused vertices.
    pub fn vertices(&self) -> &[Vector3<f32>] {
        self.vertices.as_slice()
    }

    /// Iterates over leaf triangles, in leaf-set order
    pub fn leaves(&self) -> impl Iterator<Item = Triangle> + '_ {
        self.leaves.iter().map(|n| self.nodes[n].triangle)
    }

    /// Returns a flat list of vertex indices, 3 per leaf
    ///
    /// The order is unspecified but matches [`MeshTree::leaves`].
    pub fn leaf_triangles(&self) -> Vec<u32> {
        self.leaves()
            .flat_map(|t| t.vertices().map(VertexIndex::get))
            .collect()
    }

    /// Takes a snapshot of the current surface as an indexed mesh
    pub fn mesh(&self) -> Mesh {
        Mesh {
            vertices: self.vertices.as_slice().to_vec(),
            triangles: self
                .leaves()
                .map(|t| {
                    let [a, b, c] = t.vertices();
                    Vector3::new(a.index(), b.index(), c.index())
                })
                .collect(),
        }
    }

    /// Number of leaves (i.e. triangles on the visible surface)
    pub fn leaf_count(&self) -> usize {
        self.leaves.len()
    }

    /// Number of nodes whose children are all leaves
    pub fn superleaf_count(&self) -> usize {
        self.superleaves.len()
    }

    /// Number of live nodes in the tree
    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    /// Number of base triangles
    pub fn root_count(&self) -> usize {
        self.roots.len()
    }

    /// Deepest leaf, in subdivision levels (half splits round up)
    pub fn max_depth(&self) -> u32 {
        self.leaves
            .iter()
            .map(|n| self.nodes[n].depth.div_ceil(2))
            .max()
            .unwrap_or(0)
    }

    /// Looks up the midpoint of an edge, if it has been created
    ///
    /// This never creates a vertex, and may return midpoints which are no
    /// longer used by any node.
    pub fn midpoint(
        &self,
        a: VertexIndex,
        b: VertexIndex,
    ) -> Option<VertexIndex> {
        self.midpoints.get(EdgeKey::new(a, b))
    }

    ////////////////////////////////////////////////////////////////////////////

    /// Returns the midpoint of `a` and `b`, creating it if necessary
    fn middle_point(&mut self, a: VertexIndex, b: VertexIndex) -> VertexIndex {
        self.midpoints.get_or_insert(a, b, &mut self.vertices)
    }

    /// Looks up the midpoint of an edge, if it exists and is still owned by
    /// at least one node
    ///
    /// Cache entries whose owners have all been reduced are pruned, so that
    /// the cache doesn't grow without bound.
    fn live_midpoint(&mut self, key: EdgeKey) -> Option<VertexIndex> {
        let m = self.midpoints.get(key)?;
        if self.owners.is_owned(m) {
            Some(m)
        } else {
            self.midpoints.remove(key);
            None
        }
    }

    fn is_superleaf(&self, n: NodeIndex) -> bool {
        let node = &self.nodes[n];
        !node.is_leaf()
            && node.children.iter().all(|c| self.nodes[*c].is_leaf())
    }

    /// Desired depth of the given node, in half-levels
    fn target<F>(&self, n: NodeIndex, desired_depth: &F) -> u32
    where
        F: Fn(&Triangle, &[Vector3<f32>]) -> u32,
    {
        desired_depth(&self.nodes[n].triangle, self.vertices.as_slice())
            .saturating_mul(2)
    }

    /// Attaches new children to a leaf, updating set membership
    fn attach(&mut self, n: NodeIndex, tris: &[Triangle]) {
        debug_assert!(self.nodes[n].is_leaf());
        let depth = self.nodes[n].depth + tris.len() as u32 / 2;
        let mut children = Children::new();
        for t in tris {
            let c = self.nodes.alloc(Node::new(*t, Some(n), depth));
            self.leaves.insert(c);
            children.push(c);
        }
        let node = &mut self.nodes[n];
        node.children = children;
        let parent = node.parent;

        self.leaves.remove(n);
        if let Some(p) = parent {
            self.superleaves.remove(p);
        }
        self.superleaves.insert(n);
    }

    /// Splits a leaf into four children
    fn split_full(&mut self, n: NodeIndex) {
        let [a, b, c] = self.nodes[n].triangle.vertices();
        let m01 = self.middle_point(a, b);
        let m12 = self.middle_point(b, c);
        let m20 = self.middle_point(c, a);
        for m in [m01, m12, m20] {
            self.owners.add(m, n);
        }
        self.attach(
            n,
            &[
                Triangle::new(a, m01, m20),
                Triangle::new(b, m12, m01),
                Triangle::new(c, m20, m12),
                Triangle::new(m20, m01, m12),
            ],
        );
    }

    /// Splits a leaf into two children, at an existing midpoint of `edge`
    fn split_half(&mut self, n: NodeIndex, edge: usize, mid: VertexIndex) {
        let t = self.nodes[n].triangle;
        let v = |i: usize| t.vertex((edge + i) % 3);
        debug_assert_eq!(self.midpoints.get(t.edge_key(edge)), Some(mid));

        let owner = self.owners.owners(mid).iter().copied().find(|o| *o != n);
        debug_assert!(
            owner.is_some(),
            "half split of {n} at an unowned midpoint"
        );

        self.attach(
            n,
            &[Triangle::new(mid, v(2), v(0)), Triangle::new(mid, v(1), v(2))],
        );
        if let Some(o) = owner {
            self.nodes[o].dependents.push(n);
            self.nodes[n].dependencies.push(o);
        }
        self.owners.add(mid, n);
    }

    /// Fully splits a leaf
    ///
    /// Odd-depth leaves are one half of a half split; rather than splitting
    /// them alone, their parent is collapsed and split fully instead (which
    /// may escalate further if double splitting is enabled).
    ///
    /// Returns `true` if `n` itself was split, or `false` if the split was
    /// escalated to an ancestor (or `n` was not a leaf to begin with).
    pub(crate) fn refine_node(&mut self, n: NodeIndex) -> bool {
        let mut n = n;
        let mut escalated = false;
        loop {
            let Some(node) = self.nodes.get(n) else {
                return false;
            };
            if !node.is_leaf() {
                return false;
            }
            match node.parent {
                Some(p) if node.depth % 2 == 1 => {
                    self.reduce_node(p);
                    n = p;
                    escalated = true;
                }
                _ => {
                    self.split_full(n);
                    return !escalated;
                }
            }
        }
    }

    /// Collapses a node back into a leaf
    ///
    /// Any grandchildren are collapsed first, and every dependent of a
    /// collapsed node is collapsed afterwards (its half split would otherwise
    /// refer to a midpoint that no longer exists).
    ///
    /// Returns `false` if `n` was already a leaf.
    pub(crate) fn reduce_node(&mut self, n: NodeIndex) -> bool {
        let mut reduced = false;
        let mut todo = vec![Task::Reduce(n)];
        while let Some(task) = todo.pop() {
            match task {
                Task::Reduce(r) => {
                    if self.nodes.get(r).is_none_or(Node::is_leaf) {
                        continue;
                    }
                    todo.push(Task::Collapse(r));
                    if !self.is_superleaf(r) {
                        todo.extend(
                            self.nodes[r]
                                .children
                                .iter()
                                .rev()
                                .map(|c| Task::Reduce(*c)),
                        );
                    }
                }
                Task::Collapse(r) => {
                    if self.nodes.get(r).is_none_or(Node::is_leaf) {
                        continue;
                    }
                    let dependents = self.collapse(r);
                    todo.extend(dependents.into_iter().rev().map(Task::Reduce));
                    reduced |= r == n;
                }
            }
        }
        reduced
    }

    /// Removes the children of a superleaf, returning its former dependents
    fn collapse(&mut self, n: NodeIndex) -> Vec<NodeIndex> {
        debug_assert!(self.is_superleaf(n));
        let t = self.nodes[n].triangle;
        for key in t.edge_keys() {
            if let Some(m) = self.midpoints.get(key) {
                self.owners.remove(m, n);
            }
        }

        let node = &mut self.nodes[n];
        let children = std::mem::take(&mut node.children);
        let dependencies = std::mem::take(&mut node.dependencies);
        let dependents = std::mem::take(&mut node.dependents);
        let parent = node.parent;

        for c in children {
            self.leaves.remove(c);
            let child = self.nodes.free(c);
            debug_assert!(child.is_leaf());
            debug_assert!(child.dependents.is_empty());
            debug_assert!(child.dependencies.is_empty());
        }
        self.superleaves.remove(n);
        self.leaves.insert(n);
        if let Some(p) = parent {
            if self.is_superleaf(p) {
                self.superleaves.insert(p);
            }
        }

        // Unlink both halves of every dependency relation involving `n`
        for o in dependencies {
            if let Some(owner) = self.nodes.get_mut(o) {
                owner.dependents.retain(|d| *d != n);
            }
        }
        for d in &dependents {
            if let Some(dep) = self.nodes.get_mut(*d) {
                dep.dependencies.retain(|o| *o != n);
            }
        }
        dependents
    }

    /// Picks the nodes to collapse in the next coarsening pass
    ///
    /// Every split node which is deeper than requested starts out as a
    /// candidate.  A candidate is _pinned_ if it has a split child which will
    /// survive, or if a midpoint on one of its edges is owned by a node which
    /// will survive; collapsing it would leave a crack that cleanup splits
    /// again right away.  Candidates and their (transitive) dependents are
    /// doomed, and every other node survives.  Pinned nodes are dropped until
    /// a fixed point is reached, so every pin leads back to a node which is
    /// at its requested depth.
    ///
    /// Returns the superleaves among the remaining candidates.  If there are
    /// none but candidates remain, the topmost candidates are returned, and
    /// their subtrees are collapsed wholesale.
    fn coarsen_queue<F>(&self, desired_depth: &F) -> Vec<NodeIndex>
    where
        F: Fn(&Triangle, &[Vector3<f32>]) -> u32,
    {
        let mut candidates = NodeSet::default();
        for (n, node) in self.nodes.iter() {
            if !node.is_leaf()
                && node.depth + 2 > self.target(n, desired_depth)
            {
                candidates.insert(n);
            }
        }
        loop {
            let mut doomed = NodeSet::default();
            let mut todo = candidates.as_slice().to_vec();
            while let Some(n) = todo.pop() {
                if doomed.insert(n) {
                    todo.extend(self.nodes[n].dependents.iter().copied());
                }
            }
            let survives = |n: NodeIndex| !doomed.contains(n);
            let pinned: Vec<NodeIndex> = candidates
                .iter()
                .filter(|n| {
                    let node = &self.nodes[*n];
                    let child = node.children.iter().any(|c| {
                        !self.nodes[*c].is_leaf() && survives(*c)
                    });
                    let owner = node.triangle.edge_keys().iter().any(|k| {
                        self.midpoints.get(*k).is_some_and(|m| {
                            self.owners.owners(m).iter().any(|o| survives(*o))
                        })
                    });
                    child || owner
                })
                .collect();
            if pinned.is_empty() {
                break;
            }
            for n in pinned {
                candidates.remove(n);
            }
        }

        let queue: Vec<NodeIndex> = self
            .superleaves
            .iter()
            .filter(|n| candidates.contains(*n))
            .collect();
        if !queue.is_empty() {
            return queue;
        }
        candidates
            .iter()
            .filter(|n| {
                let mut p = self.nodes[*n].parent;
                while let Some(q) = p {
                    if candidates.contains(q) {
                        return false;
                    }
                    p = self.nodes[q].parent;
                }
                true
            })
            .collect()
    }

    /// Decides how to repair the cracks (if any) along a leaf's edges
    fn classify(
        &mut self,
        n: NodeIndex,
        allow_double_splitting: bool,
    ) -> Option<Repair> {
        let node = &self.nodes[n];
        let (t, depth) = (node.triangle, node.depth);
        let mut found: ArrayVec<(usize, VertexIndex), 3> = ArrayVec::new();
        for edge in 0..3 {
            if let Some(m) = self.live_midpoint(t.edge_key(edge)) {
                found.push((edge, m));
            }
        }
        match found.as_slice() {
            [] => None,
            [(edge, mid)] if allow_double_splitting || depth % 2 == 0 => {
                Some(Repair::Half {
                    edge: *edge,
                    mid: *mid,
                })
            }
            _ => Some(Repair::Full),
        }
    }

    /// Repairs cracks between leaves
    ///
    /// Every leaf is checked for live midpoints along its edges.  A leaf with
    /// a single such midpoint is half-split to match it (unless it is itself
    /// an odd-depth half-split child and `allow_double_splitting` is false);
    /// otherwise, it is split fully.  This repeats until a pass finds nothing
    /// to do, or until [`Settings::max_cleanup_passes`] passes have run.
    pub fn cleanup(&mut self, allow_double_splitting: bool) -> CleanupReport {
        let max = self.settings.max_cleanup_passes;
        let mut passes = 0;
        loop {
            let leaves = self.leaves.as_slice().to_vec();
            let mut queue = vec![];
            for n in leaves {
                if self.classify(n, allow_double_splitting).is_some() {
                    queue.push(n);
                }
            }
            if queue.is_empty() {
                return CleanupReport {
                    passes,
                    converged: true,
                };
            } else if passes == max {
                log::warn!(
                    "cleanup stopped after {passes} passes with {} leaves \
                     left to repair",
                    queue.len()
                );
                return CleanupReport {
                    passes,
                    converged: false,
                };
            }
            log::trace!("cleanup pass {passes}: {} leaves", queue.len());

            // Earlier repairs in this pass may have changed the situation, so
            // we classify each leaf again before acting on it.
            for n in queue {
                if self.nodes.get(n).is_none_or(|node| !node.is_leaf()) {
                    continue;
                }
                match self.classify(n, allow_double_splitting) {
                    None => (),
                    Some(Repair::Half { edge, mid }) => {
                        self.split_half(n, edge, mid)
                    }
                    Some(Repair::Full) => {
                        self.refine_node(n);
                    }
                }
            }
            passes += 1;
        }
    }

    /// Adapts the tree to the given depth function
    ///
    /// `desired_depth` maps a triangle (plus the current vertex positions) to
    /// the number of subdivision levels requested for it.  It is called many
    /// times during a single refinement, interleaved with changes to the tree,
    /// so it must be a pure function of its inputs.
    ///
    /// Refinement happens in two phases:
    /// - Nodes which are deeper than requested are collapsed, superleaves
    ///   first, repeating until none are left.  Nodes which are only split to
    ///   match a neighbor that stays refined are kept, so that refining twice
    ///   with the same function leaves the tree untouched the second time.
    /// - Leaves which are shallower than requested are split, then cracks are
    ///   repaired with [`MeshTree::cleanup`], repeating until every leaf is
    ///   deep enough
    ///
    /// Each phase is capped by the pass limits in [`Settings`]; hitting a cap
    /// is recorded in the returned report (and logged) rather than treated as
    /// an error.
    pub fn refine<F>(&mut self, desired_depth: F) -> RefineReport
    where
        F: Fn(&Triangle, &[Vector3<f32>]) -> u32,
    {
        let mut report = RefineReport::default();
        let settings = self.settings;

        // Coarsening
        loop {
            let queue = self.coarsen_queue(&desired_depth);
            if queue.is_empty() {
                break;
            } else if report.coarsen_passes == settings.max_coarsen_passes {
                report.diverged(Divergence::Coarsen(report.coarsen_passes));
                break;
            }
            log::trace!(
                "coarsen pass {}: {} nodes",
                report.coarsen_passes,
                queue.len()
            );
            for n in queue {
                self.reduce_node(n);
            }
            report.coarsen_passes += 1;
        }

        // Refinement and crack repair
        let too_shallow = |tree: &Self| -> Vec<NodeIndex> {
            tree.leaves
                .iter()
                .filter(|n| {
                    tree.nodes[*n].depth < tree.target(*n, &desired_depth)
                })
                .collect()
        };
        loop {
            let queue = too_shallow(self);
            if !queue.is_empty()
                && report.refine_passes == settings.max_refine_passes
            {
                report.diverged(Divergence::Refine(report.refine_passes));
                break;
            }
            log::trace!(
                "refine pass {}: {} leaves",
                report.refine_passes,
                queue.len()
            );
            let done = queue.is_empty();
            for n in queue {
                self.refine_node(n);
            }
            let c = self.cleanup(settings.allow_double_splitting);
            report.cleanup_passes += c.passes;
            if !c.converged {
                report
                    .diverged(Divergence::Cleanup(settings.max_cleanup_passes));
            }
            report.refine_passes += 1;
            if done {
                break;
            }
        }

        log::debug!(
            "refined to {} leaves, {} superleaves, {} vertices \
             ({} coarsen / {} refine / {} cleanup passes)",
            self.leaves.len(),
            self.superleaves.len(),
            self.vertices.len(),
            report.coarsen_passes,
            report.refine_passes,
            report.cleanup_passes,
        );
        report
    }

    /// Drops every vertex which isn't used by a leaf
    ///
    /// Surviving vertices are renumbered densely, in the order that they're
    /// first used when walking the leaf set; their positions are unchanged.
    /// Every node's triangle and the midpoint caches are rewritten to match,
    /// and cache entries which refer to dropped vertices are discarded.
    ///
    /// Returns the new vertex count.
    pub fn minify_vertices(&mut self) -> usize {
        let mut remap: Vec<Option<VertexIndex>> =
            vec![None; self.vertices.len()];
        let mut order = vec![];
        for n in self.leaves.iter() {
            for v in self.nodes[n].triangle {
                let slot = &mut remap[v.index()];
                if slot.is_none() {
                    *slot = Some(VertexIndex::new(order.len() as u32));
                    order.push(v);
                }
            }
        }
        let lookup = |v: VertexIndex| remap.get(v.index()).copied().flatten();

        // Every corner of an internal node is also a corner of one of its
        // descendant leaves, so this can only fail if the tree is corrupt.
        for (i, node) in self.nodes.iter_mut() {
            node.triangle = match node.triangle.remap(lookup) {
                Some(t) => t,
                None => panic!("node {i} uses a vertex that no leaf uses"),
            };
        }
        self.midpoints.remap(lookup);
        self.owners.remap(lookup);
        self.vertices.compact(&order);

        log::debug!(
            "minified to {} vertices ({} cached midpoints)",
            order.len(),
            self.midpoints.len()
        );
        order.len()
    }

    /// Lists every leaf edge which has a live midpoint, i.e. every crack
    ///
    /// This is empty after a [`MeshTree::refine`] call that converged.
    pub fn t_junctions(&self) -> Vec<TJunction> {
        let mut out = vec![];
        for t in self.leaves() {
            for edge in 0..3 {
                if let Some(m) = self.midpoints.get(t.edge_key(edge)) {
                    if self.owners.is_owned(m) {
                        out.push(TJunction {
                            triangle: t,
                            edge,
                            midpoint: m,
                        });
                    }
                }
            }
        }
        out
    }

    /// Checks the structural invariants of the tree
    ///
    /// This walks every node, so it's relatively expensive; it's meant for
    /// tests and debugging.
    pub fn check(&self) -> Result<(), Error> {
        let fail = |s: String| Err(Error::BrokenInvariant(s));
        for (i, node) in self.nodes.iter() {
            if node.is_leaf() != self.leaves.contains(i) {
                return fail(format!("leaf set membership is wrong for {i}"));
            }
            if self.is_superleaf(i) != self.superleaves.contains(i) {
                return fail(format!(
                    "superleaf set membership is wrong for {i}"
                ));
            }
            if !matches!(node.children.len(), 0 | 2 | 4) {
                return fail(format!(
                    "{i} has {} children",
                    node.children.len()
                ));
            }
            for c in &node.children {
                let Some(child) = self.nodes.get(*c) else {
                    return fail(format!("{i} has stale child {c}"));
                };
                if child.parent != Some(i) {
                    return fail(format!("{c} does not point back to {i}"));
                }
                let expected = node.depth + node.children.len() as u32 / 2;
                if child.depth != expected {
                    return fail(format!(
                        "{c} has depth {}; expected {expected}",
                        child.depth
                    ));
                }
            }
            match node.parent {
                Some(p) => {
                    let parent = self.nodes.get(p);
                    if parent.is_none_or(|p| !p.children.contains(&i)) {
                        return fail(format!("{p} does not own its child {i}"));
                    }
                }
                None => {
                    if !self.roots.contains(&i) {
                        return fail(format!("{i} is an orphan"));
                    }
                }
            }
            for d in &node.dependents {
                let dep = self.nodes.get(*d);
                if dep.is_none_or(|d| !d.dependencies.contains(&i)) {
                    return fail(format!(
                        "dependent {d} of {i} is not linked back"
                    ));
                }
            }
            if !node.dependencies.is_empty() && node.children.len() != 2 {
                return fail(format!(
                    "{i} has dependencies but is not half-split"
                ));
            }
            for o in &node.dependencies {
                let owner = self.nodes.get(*o);
                if owner.is_none_or(|o| !o.dependents.contains(&i)) {
                    return fail(format!(
                        "dependency {o} of {i} is not linked back"
                    ));
                }
            }
        }
        for (name, set) in
            [("leaf", &self.leaves), ("superleaf", &self.superleaves)]
        {
            if let Some(n) = set.iter().find(|n| !self.nodes.is_live(*n)) {
                return fail(format!("{name} set contains stale node {n}"));
            }
        }
        for (m, owners) in self.owners.iter() {
            for o in owners {
                let Some(node) = self.nodes.get(*o) else {
                    return fail(format!("midpoint {m} has stale owner {o}"));
                };
                if node.is_leaf() {
                    return fail(format!("midpoint {m} is owned by leaf {o}"));
                }
                let t = node.triangle;
                let keys = t.edge_keys();
                if !keys.iter().any(|k| self.midpoints.get(*k) == Some(m)) {
                    return fail(format!(
                        "{o} owns {m}, which is not on its edges"
                    ));
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::shapes;
    use std::collections::BTreeMap;

    fn icosahedron() -> MeshTree {
        let base = shapes::icosahedron();
        MeshTree::new(&base.vertices, &base.triangles).unwrap()
    }

    /// Checks that every directed leaf edge appears exactly once and is
    /// matched by its reverse
    fn check_for_edge_matching(tree: &MeshTree) -> Result<(), String> {
        let mut edges: BTreeMap<_, usize> = BTreeMap::new();
        for t in tree.leaves() {
            for i in 0..3 {
                *edges.entry(t.edge(i)).or_default() += 1;
            }
        }
        for (&(a, b), &i) in &edges {
            if i != 1 {
                return Err(format!("duplicate edge ({a}, {b})"));
            }
            if !edges.contains_key(&(b, a)) {
                return Err(format!("unpaired edge ({a}, {b})"));
            }
        }
        Ok(())
    }

    #[test]
    fn test_bad_input() {
        let verts = [Vector3::x(), Vector3::y(), Vector3::z()];
        assert!(matches!(
            MeshTree::new(&verts, &[0, 1]),
            Err(Error::BadTriangleList(2))
        ));
        assert!(matches!(
            MeshTree::new(&verts, &[0, 1, 2, 0, 1, 3]),
            Err(Error::BadVertexIndex { index: 3, count: 3 })
        ));
        assert!(matches!(
            MeshTree::new(&verts, &[0, 1, 2, 2, 1, 2]),
            Err(Error::DegenerateTriangle(1))
        ));
        let tree = MeshTree::new(&verts, &[]).unwrap();
        assert_eq!(tree.leaf_count(), 0);
    }

    #[test]
    fn test_middle_point_determinism() {
        let mut tree = icosahedron();
        let v = VertexIndex::new;
        let m = tree.middle_point(v(0), v(11));
        assert_eq!(m, v(12));
        assert_eq!(tree.middle_point(v(11), v(0)), m);
        assert_eq!(tree.middle_point(v(0), v(11)), m);
        assert_eq!(tree.vertices().len(), 13);
        assert_eq!(tree.midpoint(v(11), v(0)), Some(m));
        assert_eq!(tree.midpoint(v(0), v(5)), None);
    }

    #[test]
    fn test_refine_node() {
        let mut tree = icosahedron();
        let root = tree.roots[0];
        assert!(tree.refine_node(root));
        assert!(!tree.refine_node(root)); // no longer a leaf

        assert_eq!(tree.leaf_count(), 23);
        assert_eq!(tree.superleaf_count(), 1);
        assert_eq!(tree.node_count(), 24);
        assert_eq!(tree.vertices().len(), 15);
        for c in &tree.nodes[root].children {
            assert_eq!(tree.nodes[*c].depth, 2);
            assert_eq!(tree.nodes[*c].parent, Some(root));
        }

        // Each midpoint is owned by the root alone
        for (_, owners) in tree.owners.iter() {
            assert_eq!(owners, &[root]);
        }
        assert_eq!(tree.owners.len(), 3);

        // The three neighbors each have a crack along their shared edge
        assert_eq!(tree.t_junctions().len(), 3);
        tree.check().unwrap();
    }

    #[test]
    fn test_cleanup_half_split() {
        let mut tree = icosahedron();
        let root = tree.roots[0];
        tree.refine_node(root);

        let c = tree.cleanup(false);
        assert_eq!(c, CleanupReport { passes: 1, converged: true });
        assert_eq!(tree.leaf_count(), 4 + 3 * 2 + 16);
        assert_eq!(tree.superleaf_count(), 4);
        assert!(tree.t_junctions().is_empty());
        check_for_edge_matching(&tree).unwrap();
        tree.check().unwrap();

        // The three neighbors are half-split, and depend on the root
        assert_eq!(tree.nodes[root].dependents.len(), 3);
        for d in &tree.nodes[root].dependents {
            let node = &tree.nodes[*d];
            assert_eq!(node.children.len(), 2);
            assert_eq!(node.dependencies, vec![root]);
            for c in &node.children {
                assert_eq!(tree.nodes[*c].depth, 1);
            }
        }

        // The shared midpoints are owned by both sides
        for (_, owners) in tree.owners.iter() {
            assert_eq!(owners.len(), 2);
            assert_eq!(owners[0], root);
        }
    }

    #[test]
    fn test_reduce_cascade() {
        let mut tree = icosahedron();
        let root = tree.roots[0];
        tree.refine_node(root);
        let _ = tree.cleanup(false);
        assert_eq!(tree.node_count(), 20 + 4 + 3 * 2);

        // Collapsing the root must also collapse its dependents
        assert!(tree.reduce_node(root));
        assert!(!tree.reduce_node(root));
        assert_eq!(tree.leaf_count(), 20);
        assert_eq!(tree.node_count(), 20);
        assert_eq!(tree.superleaf_count(), 0);
        assert_eq!(tree.owners.len(), 0);
        for (_, node) in tree.nodes.iter() {
            assert!(node.dependents.is_empty());
            assert!(node.dependencies.is_empty());
        }
        assert!(tree.t_junctions().is_empty());
        tree.check().unwrap();

        // Stale cache entries are pruned by the next cleanup
        assert_eq!(tree.midpoints.len(), 3);
        let c = tree.cleanup(false);
        assert_eq!(c, CleanupReport { passes: 0, converged: true });
        assert_eq!(tree.midpoints.len(), 0);
    }

    #[test]
    fn test_reduce_dependent_alone() {
        let mut tree = icosahedron();
        let root = tree.roots[0];
        tree.refine_node(root);
        let _ = tree.cleanup(false);

        // Collapsing a half split unlinks it from its owner, but leaves the
        // owner alone
        let dep = tree.nodes[root].dependents[0];
        assert!(tree.reduce_node(dep));
        assert_eq!(tree.nodes[root].dependents.len(), 2);
        assert!(!tree.nodes[root].dependents.contains(&dep));
        assert!(tree.nodes[dep].dependencies.is_empty());
        assert_eq!(tree.t_junctions().len(), 1);
        tree.check().unwrap();

        // ...and the crack is repaired the same way as before
        let c = tree.cleanup(false);
        assert!(c.converged);
        assert_eq!(tree.nodes[root].dependents.len(), 3);
        assert!(tree.t_junctions().is_empty());
        tree.check().unwrap();
    }

    #[test]
    fn test_odd_depth_escalation() {
        let mut tree = icosahedron();
        let root = tree.roots[0];
        tree.refine_node(root);
        let _ = tree.cleanup(false);

        let dep = tree.nodes[root].dependents[0];
        let child = tree.nodes[dep].children[0];
        assert_eq!(tree.nodes[child].depth, 1);

        // Refining an odd-depth child splits its parent instead
        assert!(!tree.refine_node(child));
        assert!(!tree.nodes.is_live(child));
        assert_eq!(tree.nodes[dep].children.len(), 4);
        assert!(tree.nodes[dep].dependencies.is_empty());
        assert!(!tree.nodes[root].dependents.contains(&dep));
        assert_eq!(tree.leaf_count(), 4 + 4 + 2 * 2 + 16);
        tree.check().unwrap();

        // The new split exposed two more midpoints, so cleanup has work to do
        assert_eq!(tree.t_junctions().len(), 2);
        let c = tree.cleanup(false);
        assert!(c.converged);
        assert!(tree.t_junctions().is_empty());
        check_for_edge_matching(&tree).unwrap();
        tree.check().unwrap();
    }

    #[test]
    fn test_owner_and_dependent() {
        // A half-split node is both an owner of its midpoint and a dependent
        // of the node which created it
        let mut tree = icosahedron();
        let root = tree.roots[0];
        tree.refine_node(root);
        let _ = tree.cleanup(false);

        let dep = tree.nodes[root].dependents[0];
        let t = tree.nodes[dep].triangle;
        let mid = (0..3)
            .find_map(|e| tree.midpoints.get(t.edge_key(e)))
            .unwrap();
        assert!(tree.owners.owners(mid).contains(&dep));
        assert!(tree.owners.owners(mid).contains(&root));

        // Collapsing the half split leaves the midpoint owned by the root...
        tree.reduce_node(dep);
        assert_eq!(tree.owners.owners(mid), &[root]);

        // ...and collapsing the root afterwards leaves it unowned
        let _ = tree.cleanup(false);
        tree.reduce_node(root);
        assert!(!tree.owners.is_owned(mid));
        tree.check().unwrap();
    }

    #[test]
    fn test_nested_owner_and_dependent() {
        // With double splitting, a half-split child is half-split again when
        // its outer edge gets a midpoint from the other side
        let mut tree = icosahedron();
        let root = tree.roots[0];
        tree.refine_node(root);
        let _ = tree.cleanup(true);

        let dep = tree.nodes[root].dependents[0];
        let key = tree.nodes[dep]
            .triangle
            .edge_keys()
            .into_iter()
            .find(|k| tree.midpoints.get(*k).is_none())
            .unwrap();
        let other = tree
            .roots
            .iter()
            .copied()
            .find(|r| {
                *r != dep && tree.nodes[*r].triangle.edge_keys().contains(&key)
            })
            .unwrap();
        tree.refine_node(other);
        let c = tree.cleanup(true);
        assert!(c.converged);

        let child = tree.nodes[dep]
            .children
            .iter()
            .copied()
            .find(|c| tree.nodes[*c].triangle.edge_keys().contains(&key))
            .unwrap();
        let mid = tree.midpoints.get(key).unwrap();
        assert_eq!(tree.nodes[child].depth, 1);
        assert_eq!(tree.nodes[child].children.len(), 2);
        assert_eq!(tree.nodes[child].dependencies, vec![other]);
        assert_eq!(tree.nodes[dep].dependencies, vec![root]);
        assert_eq!(tree.owners.owners(mid).len(), 2);
        assert!(tree.owners.owners(mid).contains(&child));
        assert!(tree.owners.owners(mid).contains(&other));
        assert!(tree.t_junctions().is_empty());
        check_for_edge_matching(&tree).unwrap();
        tree.check().unwrap();

        // Collapsing the root cascades through both levels of half splits
        assert!(tree.reduce_node(root));
        assert!(tree.nodes[dep].is_leaf());
        assert!(!tree.nodes.is_live(child));
        assert!(!tree.nodes[other].dependents.contains(&child));
        assert_eq!(tree.owners.owners(mid), &[other]);
        assert_eq!(tree.t_junctions().len(), 1);
        tree.check().unwrap();

        // The crack is repaired against the remaining owner...
        let c = tree.cleanup(true);
        assert!(c.converged);
        assert!(tree.t_junctions().is_empty());
        assert_eq!(tree.nodes[dep].dependencies, vec![other]);

        // ...and collapsing that owner leaves the base solid
        assert!(tree.reduce_node(other));
        assert_eq!(tree.leaf_count(), 20);
        assert_eq!(tree.node_count(), 20);
        assert_eq!(tree.owners.len(), 0);
        tree.check().unwrap();
    }

    #[test]
    fn test_coarsen_pass_cap() {
        let base = shapes::icosahedron();
        let settings = Settings {
            max_coarsen_passes: 1,
            ..Settings::default()
        };
        let mut tree =
            MeshTree::with_settings(&base.vertices, &base.triangles, settings)
                .unwrap();
        let _ = tree.refine(|_, _| 3);

        // Each call only removes one level, and says so
        let r = tree.refine(|_, _| 0);
        assert_eq!(r.divergences, vec![Divergence::Coarsen(1)]);
        assert_eq!(tree.leaf_count(), 320);
        let r = tree.refine(|_, _| 0);
        assert_eq!(r.divergences, vec![Divergence::Coarsen(1)]);
        assert_eq!(tree.leaf_count(), 80);

        let r = tree.refine(|_, _| 0);
        assert!(r.converged());
        assert_eq!(r.coarsen_passes, 1);
        assert_eq!(tree.leaf_count(), 20);
    }

    #[test]
    fn test_coarsen_pinned() {
        let mut tree = icosahedron();
        let root = tree.roots[0];
        let tri = tree.nodes[root].triangle;
        let r = tree.refine(|t, _| u32::from(*t == tri));
        assert!(r.converged());
        assert_eq!(tree.leaf_count(), 26);
        let deps = tree.nodes[root].dependents.clone();
        assert_eq!(deps.len(), 3);

        // The half-split neighbors are deeper than requested, but collapsing
        // them would reopen their cracks, so the second pass does nothing
        let r = tree.refine(|t, _| u32::from(*t == tri));
        assert_eq!(r.coarsen_passes, 0);
        assert_eq!(r.cleanup_passes, 0);
        assert_eq!(tree.nodes[root].dependents, deps);
        assert_eq!(tree.leaf_count(), 26);

        // Once the root is released, everything collapses in one pass
        let r = tree.refine(|_, _| 0);
        assert_eq!(r.coarsen_passes, 1);
        assert_eq!(tree.leaf_count(), 20);
        tree.check().unwrap();
    }

    #[test]
    fn test_refine_uniform() {
        let mut tree = icosahedron();
        let r = tree.refine(|_, _| 2);
        assert!(r.converged());
        assert_eq!(tree.leaf_count(), 320);
        assert_eq!(tree.vertices().len(), 162);
        assert_eq!(tree.superleaf_count(), 80);
        assert_eq!(tree.max_depth(), 2);
        check_for_edge_matching(&tree).unwrap();
        tree.check().unwrap();
        for v in tree.vertices() {
            approx::assert_relative_eq!(v.norm(), 1.0, epsilon = 1e-6);
        }
    }

    #[test]
    fn test_refine_pass_caps() {
        let base = shapes::icosahedron();
        let settings = Settings {
            max_refine_passes: 1,
            ..Settings::default()
        };
        let mut tree =
            MeshTree::with_settings(&base.vertices, &base.triangles, settings)
                .unwrap();
        let r = tree.refine(|_, _| 3);
        assert_eq!(r.divergences, vec![Divergence::Refine(1)]);
        assert_eq!(r.refine_passes, 1);
        assert_eq!(tree.leaf_count(), 80);

        // Finishing the job on a later call works fine
        let r = tree.refine(|_, _| 1);
        assert!(r.converged());
        assert_eq!(tree.leaf_count(), 80);
    }

    #[test]
    fn test_minify() {
        let mut tree = icosahedron();
        let _ = tree.refine(|_, _| 2);
        let _ = tree.refine(|_, _| 1);
        assert_eq!(tree.leaf_count(), 80);
        assert_eq!(tree.vertices().len(), 162);

        let before = tree.mesh();
        let n = tree.minify_vertices();
        assert_eq!(n, 42);
        assert_eq!(tree.vertices().len(), 42);
        let after = tree.mesh();
        for (a, b) in before.triangles.iter().zip(&after.triangles) {
            for i in 0..3 {
                assert_eq!(
                    before.vertices[a[i]].map(f32::to_bits),
                    after.vertices[b[i]].map(f32::to_bits)
                );
            }
        }
        tree.check().unwrap();

        // Only the base edges still have live midpoints; the rest were pruned
        // during the second refinement
        assert_eq!(tree.midpoints.len(), 30);
        let _ = tree.refine(|_, _| 2);
        assert_eq!(tree.vertices().len(), 162);
        check_for_edge_matching(&tree).unwrap();
    }
}
