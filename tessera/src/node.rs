//! Tree nodes and the arena which stores them
use crate::{triangle::Triangle, types::NodeIndex};
use arrayvec::ArrayVec;

/// Children of a node: empty (leaf), 2 (half split) or 4 (full split)
pub(crate) type Children = ArrayVec<NodeIndex, 4>;

/// A single node in the subdivision tree
#[derive(Clone, Debug)]
pub(crate) struct Node {
    pub triangle: Triangle,
    pub parent: Option<NodeIndex>,
    pub children: Children,

    /// Depth in half-levels
    ///
    /// A full split adds 2 and a half split adds 1, so odd depths mark the
    /// children of a half split.
    pub depth: u32,

    /// Nodes whose (half) split only exists because this node exposed a
    /// midpoint on one of their edges
    pub dependents: Vec<NodeIndex>,

    /// Inverse of `dependents`: the nodes which list this node as a dependent
    pub dependencies: Vec<NodeIndex>,
}

impl Node {
    pub fn new(
        triangle: Triangle,
        parent: Option<NodeIndex>,
        depth: u32,
    ) -> Self {
        Self {
            triangle,
            parent,
            children: Children::new(),
            depth,
            dependents: vec![],
            dependencies: vec![],
        }
    }

    pub fn is_leaf(&self) -> bool {
        self.children.is_empty()
    }
}

/// Storage slot within a [`NodePool`]
#[derive(Clone, Debug)]
enum Slot {
    Live { generation: u32, node: Node },
    Free { generation: u32 },
}

/// Arena of tree nodes, addressed by generational [`NodeIndex`] handles
///
/// Freed slots are tombstoned and recycled by later allocations with a bumped
/// generation, so a stale handle can be detected instead of silently aliasing
/// an unrelated node.
#[derive(Clone, Debug, Default)]
pub(crate) struct NodePool {
    slots: Vec<Slot>,
    free: Vec<u32>,
    live: usize,
}

impl NodePool {
    pub fn alloc(&mut self, node: Node) -> NodeIndex {
        self.live += 1;
        if let Some(slot) = self.free.pop() {
            let s = &mut self.slots[slot as usize];
            let Slot::Free { generation } = *s else {
                unreachable!("free list points at a live slot");
            };
            let generation = generation.wrapping_add(1);
            *s = Slot::Live { generation, node };
            NodeIndex::new(slot, generation)
        } else {
            let slot = u32::try_from(self.slots.len())
                .expect("node count exceeds the range of `u32`");
            self.slots.push(Slot::Live {
                generation: 0,
                node,
            });
            NodeIndex::new(slot, 0)
        }
    }

    /// Releases a node, returning its contents
    ///
    /// # Panics
    /// If the handle is stale
    pub fn free(&mut self, n: NodeIndex) -> Node {
        if !self.is_live(n) {
            panic!("attempted to free stale node handle {n}");
        }
        let prev = std::mem::replace(
            &mut self.slots[n.slot()],
            Slot::Free {
                generation: n.generation(),
            },
        );
        let Slot::Live { node, .. } = prev else {
            unreachable!("live check passed for a free slot");
        };
        self.live -= 1;
        self.free.push(n.slot() as u32);
        node
    }

    /// Looks up a node, returning `None` if the handle is stale
    pub fn get(&self, n: NodeIndex) -> Option<&Node> {
        match self.slots.get(n.slot()) {
            Some(Slot::Live { generation, node })
                if *generation == n.generation() =>
            {
                Some(node)
            }
            _ => None,
        }
    }

    pub fn get_mut(&mut self, n: NodeIndex) -> Option<&mut Node> {
        match self.slots.get_mut(n.slot()) {
            Some(Slot::Live { generation, node })
                if *generation == n.generation() =>
            {
                Some(node)
            }
            _ => None,
        }
    }

    pub fn is_live(&self, n: NodeIndex) -> bool {
        self.get(n).is_some()
    }

    /// Number of live nodes
    pub fn len(&self) -> usize {
        self.live
    }

    /// Iterates over every live node
    pub fn iter(&self) -> impl Iterator<Item = (NodeIndex, &Node)> + '_ {
        self.slots.iter().enumerate().filter_map(|(i, s)| match s {
            Slot::Live { generation, node } => {
                Some((NodeIndex::new(i as u32, *generation), node))
            }
            Slot::Free { .. } => None,
        })
    }

    pub fn iter_mut(
        &mut self,
    ) -> impl Iterator<Item = (NodeIndex, &mut Node)> + '_ {
        self.slots
            .iter_mut()
            .enumerate()
            .filter_map(|(i, s)| match s {
                Slot::Live { generation, node } => {
                    Some((NodeIndex::new(i as u32, *generation), node))
                }
                Slot::Free { .. } => None,
            })
    }
}

impl std::ops::Index<NodeIndex> for NodePool {
    type Output = Node;
    fn index(&self, n: NodeIndex) -> &Node {
        match self.get(n) {
            Some(node) => node,
            None => panic!("stale node handle {n}"),
        }
    }
}

impl std::ops::IndexMut<NodeIndex> for NodePool {
    fn index_mut(&mut self, n: NodeIndex) -> &mut Node {
        match self.get_mut(n) {
            Some(node) => node,
            None => panic!("stale node handle {n}"),
        }
    }
}

/// Membership set over nodes, with O(1) insertion and removal
///
/// Removal swaps the last member into the hole, so iteration order is
/// arbitrary but stable while the set isn't modified.
#[derive(Clone, Debug, Default)]
pub(crate) struct NodeSet {
    members: Vec<NodeIndex>,

    /// Position of each slot within `members`, or `u32::MAX` if absent
    pos: Vec<u32>,
}

impl NodeSet {
    const ABSENT: u32 = u32::MAX;

    pub fn contains(&self, n: NodeIndex) -> bool {
        match self.pos.get(n.slot()) {
            Some(&p) if p != Self::ABSENT => self.members[p as usize] == n,
            _ => false,
        }
    }

    /// Inserts a node, returning `false` if it was already present
    pub fn insert(&mut self, n: NodeIndex) -> bool {
        if self.contains(n) {
            return false;
        }
        if n.slot() >= self.pos.len() {
            self.pos.resize(n.slot() + 1, Self::ABSENT);
        }
        self.pos[n.slot()] = self.members.len() as u32;
        self.members.push(n);
        true
    }

    /// Removes a node, returning `false` if it wasn't present
    pub fn remove(&mut self, n: NodeIndex) -> bool {
        if !self.contains(n) {
            return false;
        }
        let p = std::mem::replace(&mut self.pos[n.slot()], Self::ABSENT);
        self.members.swap_remove(p as usize);
        if let Some(moved) = self.members.get(p as usize) {
            self.pos[moved.slot()] = p;
        }
        true
    }

    pub fn len(&self) -> usize {
        self.members.len()
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = NodeIndex> + '_ {
        self.members.iter().copied()
    }

    pub fn as_slice(&self) -> &[NodeIndex] {
        &self.members
    }
}
