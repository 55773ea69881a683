use alloc::collections::VecDeque;
use alloc::vec::Vec;
use core::fmt;
use core::iter::FusedIterator;

use crate::Key;
use crate::raw::{Handle, Node, RawBPlusTree};

/// Opaque identity of a node, stable for as long as the node is alive.
///
/// Ids of freed nodes may be reused by nodes created later.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
pub struct NodeId(Handle);

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.0, f)
    }
}

/// Whether a node holds pairs or routes to children.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
pub enum NodeKind {
    /// Separator keys and child links.
    Index,
    /// Key-value pairs, linked to the neighbouring leaves.
    Leaf,
}

/// A read-only view of one node, as produced by [`LevelOrder`].
#[derive(Clone, Debug, PartialEq)]
pub struct NodeView<'a> {
    id: NodeId,
    kind: NodeKind,
    keys: &'a [Key],
    children: Vec<NodeId>,
}

impl<'a> NodeView<'a> {
    /// Identity of the node, as listed in its parent's [`children`](Self::children).
    #[must_use]
    pub fn id(&self) -> NodeId {
        self.id
    }

    /// Whether this is a leaf or an index node.
    #[must_use]
    pub fn kind(&self) -> NodeKind {
        self.kind
    }

    /// Pair keys of a leaf, or separator keys of an index node.
    #[must_use]
    pub fn keys(&self) -> &'a [Key] {
        self.keys
    }

    /// Children of an index node, left to right. Empty for leaves.
    #[must_use]
    pub fn children(&self) -> &[NodeId] {
        &self.children
    }
}

/// Breadth-first traversal of a [`BPlusTree`](crate::BPlusTree), yielding
/// one level per item, root first.
///
/// This `struct` is created by the
/// [`level_order`](crate::BPlusTree::level_order) method.
#[must_use = "iterators are lazy and do nothing unless consumed"]
pub struct LevelOrder<'a> {
    tree: &'a RawBPlusTree,
    queue: VecDeque<Handle>,
}

impl<'a> LevelOrder<'a> {
    pub(super) fn new(tree: &'a RawBPlusTree) -> Self {
        let mut queue = VecDeque::new();
        queue.extend(tree.root());
        Self { tree, queue }
    }

    fn view(&self, handle: Handle) -> crate::Result<NodeView<'a>> {
        let node = self.tree.node(handle)?;
        let (kind, children) = match node {
            Node::Index(index) => (NodeKind::Index, index.children().iter().copied().map(NodeId).collect()),
            Node::Leaf(_) => (NodeKind::Leaf, Vec::new()),
        };
        Ok(NodeView {
            id: NodeId(handle),
            kind,
            keys: node.keys(),
            children,
        })
    }
}

impl<'a> Iterator for LevelOrder<'a> {
    type Item = Vec<NodeView<'a>>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.queue.is_empty() {
            return None;
        }

        // Everything queued now belongs to the same level.
        let width = self.queue.len();
        let mut level = Vec::with_capacity(width);
        for _ in 0..width {
            let handle = self.queue.pop_front()?;
            match self.view(handle) {
                Ok(view) => {
                    self.queue.extend(view.children.iter().map(|child| child.0));
                    level.push(view);
                }
                Err(error) => {
                    tracing::error!(%error, node = %handle, "level-order traversal stopped");
                    self.queue.clear();
                    break;
                }
            }
        }
        Some(level)
    }
}

impl FusedIterator for LevelOrder<'_> {}

impl fmt::Debug for LevelOrder<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LevelOrder").field("queued", &self.queue.len()).finish_non_exhaustive()
    }
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use crate::{BPlusTree, NodeKind};
    use alloc::vec::Vec;

    #[test]
    fn empty_tree_has_no_levels() {
        assert_eq!(BPlusTree::default().level_order().count(), 0);
    }

    #[test]
    fn levels_follow_child_order() {
        let mut tree = BPlusTree::new(3).unwrap();
        for key in 1..=7 {
            tree.insert(key, 0.0).unwrap();
        }

        let levels: Vec<_> = tree.level_order().collect();
        assert_eq!(levels.len(), tree.height());
        assert_eq!(levels.iter().map(Vec::len).collect::<Vec<_>>(), [1, 3, 6]);

        for pair in levels.windows(2) {
            let children: Vec<_> = pair[0].iter().flat_map(|node| node.children().iter().copied()).collect();
            let next: Vec<_> = pair[1].iter().map(|node| node.id()).collect();
            assert_eq!(children, next);
        }

        let leaves = levels.last().unwrap();
        assert!(leaves.iter().all(|node| node.kind() == NodeKind::Leaf && node.children().is_empty()));
        let keys: Vec<_> = leaves.iter().flat_map(|node| node.keys().iter().copied()).collect();
        assert_eq!(keys, (1..=7).collect::<Vec<_>>());
    }
}
