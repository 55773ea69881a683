use super::RawBPlusTree;
use crate::error::{Error, Result};
use crate::raw::Handle;
use crate::raw::node::{IndexNode, LeafNode, Node, SearchResult};
use crate::{Key, Value};

/// Where an underflowed node's donor or merge partner sits.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
enum Side {
    /// The immediate left neighbour; used whenever one exists.
    Left,
    /// The right neighbour; only for a parent's leftmost child.
    Right,
}

/// An underflowed node together with the sibling it is repaired from.
#[derive(Clone, Copy, Debug)]
struct Neighbourhood {
    node: Handle,
    parent: Handle,
    sibling: Handle,
    side: Side,
    /// Index in the parent of the separator between `node` and `sibling`.
    separator_idx: usize,
}

impl Neighbourhood {
    /// The left and right members of the pair, in key order.
    fn ordered(self) -> (Handle, Handle) {
        match self.side {
            Side::Left => (self.sibling, self.node),
            Side::Right => (self.node, self.sibling),
        }
    }
}

impl RawBPlusTree {
    /// Removes a key from the tree and returns its value.
    /// An absent key leaves the tree untouched.
    pub(crate) fn remove(&mut self, key: Key) -> Result<Option<Value>> {
        tracing::trace!(key, "remove");

        let Some(leaf_handle) = self.find_leaf(key)? else {
            return Ok(None);
        };

        // Find and remove from leaf
        let leaf = self.leaf_mut(leaf_handle)?;
        let idx = match leaf.search(key) {
            SearchResult::Found(idx) => idx,
            SearchResult::NotFound(_) => return Ok(None),
        };
        let (_, value) = leaf.remove(idx);
        self.len -= 1;

        self.rebalance(leaf_handle)?;
        Ok(Some(value))
    }

    /// Restores occupancy after `node` lost an entry.
    ///
    /// A borrow fixes the level it happens on. A merge removes a separator
    /// from the parent, so the check repeats one level up until some node is
    /// still valid or the root has been handled.
    fn rebalance(&mut self, mut node: Handle) -> Result<()> {
        let min_keys = self.order.min_keys();

        loop {
            let current = self.node(node)?;
            let count = current.key_count();

            let Some(parent) = current.parent() else {
                // The root may run down to a single key.
                if count == 0 {
                    self.collapse_root(node)?;
                }
                return Ok(());
            };

            if count >= min_keys {
                return Ok(());
            }

            let hood = self.neighbourhood(node, parent)?;
            let sibling_count = self.node(hood.sibling)?.key_count();

            if self.order.is_generous(sibling_count) {
                return self.borrow_from_sibling(hood);
            }

            self.merge_with_sibling(hood)?;
            node = parent;
        }
    }

    /// Picks the sibling used to repair `node`: the left neighbour unless
    /// `node` is the leftmost child, in which case the right neighbour.
    fn neighbourhood(&self, node: Handle, parent: Handle) -> Result<Neighbourhood> {
        let index = self.index(parent)?;
        let position = index.position_of(node)?;

        let (sibling_slot, side) = if position > 0 {
            (position - 1, Side::Left)
        } else {
            (1, Side::Right)
        };
        if sibling_slot >= index.child_count() {
            return Err(Error::InvariantViolation {
                reason: "underflowed node has no sibling",
            });
        }

        Ok(Neighbourhood {
            node,
            parent,
            sibling: index.child(sibling_slot),
            side,
            // Both cases use the separator left of the pair's right member.
            separator_idx: position.saturating_sub(1),
        })
    }

    /// Rotates one entry from the sibling through the parent into the node.
    fn borrow_from_sibling(&mut self, hood: Neighbourhood) -> Result<()> {
        let is_leaf = self.node(hood.node)?.is_leaf();
        tracing::debug!(
            node = %hood.node,
            sibling = %hood.sibling,
            side = ?hood.side,
            leaf = is_leaf,
            "borrow from sibling"
        );

        match (is_leaf, hood.side) {
            (true, Side::Left) => self.borrow_from_left_leaf(hood),
            (true, Side::Right) => self.borrow_from_right_leaf(hood),
            (false, Side::Left) => self.borrow_from_left_index(hood),
            (false, Side::Right) => self.borrow_from_right_index(hood),
        }
    }

    /// Moves the left sibling's last pair to the front of the node; that key
    /// becomes the new boundary.
    fn borrow_from_left_leaf(&mut self, hood: Neighbourhood) -> Result<()> {
        let (key, value) = self.leaf_mut(hood.sibling)?.pop().ok_or(EMPTY_DONOR)?;
        self.leaf_mut(hood.node)?.push_front(key, value);
        self.index_mut(hood.parent)?.set_key(hood.separator_idx, key);
        Ok(())
    }

    /// Moves the right sibling's first pair to the end of the node; the
    /// sibling's new minimum becomes the boundary.
    fn borrow_from_right_leaf(&mut self, hood: Neighbourhood) -> Result<()> {
        let sibling = self.leaf_mut(hood.sibling)?;
        let (key, value) = sibling.pop_front().ok_or(EMPTY_DONOR)?;
        let boundary = sibling.first_key().ok_or(EMPTY_DONOR)?;

        self.leaf_mut(hood.node)?.push(key, value);
        self.index_mut(hood.parent)?.set_key(hood.separator_idx, boundary);
        Ok(())
    }

    /// The parent's separator moves down to the front of the node, the left
    /// sibling's last key moves up, and its last child changes hands.
    fn borrow_from_left_index(&mut self, hood: Neighbourhood) -> Result<()> {
        let separator = self.index(hood.parent)?.key(hood.separator_idx);
        let (key, child) = self.index_mut(hood.sibling)?.pop_child().ok_or(EMPTY_DONOR)?;

        self.index_mut(hood.node)?.push_child_front(separator, child);
        self.index_mut(hood.parent)?.set_key(hood.separator_idx, key);
        self.set_parent(child, Some(hood.node))
    }

    /// The parent's separator moves down to the end of the node, the right
    /// sibling's first key moves up, and its first child changes hands.
    fn borrow_from_right_index(&mut self, hood: Neighbourhood) -> Result<()> {
        let separator = self.index(hood.parent)?.key(hood.separator_idx);
        let (key, child) = self.index_mut(hood.sibling)?.pop_child_front().ok_or(EMPTY_DONOR)?;

        self.index_mut(hood.node)?.push_child(separator, child);
        self.index_mut(hood.parent)?.set_key(hood.separator_idx, key);
        self.set_parent(child, Some(hood.node))
    }

    /// Folds the right member of the pair into the left one, drops the
    /// separator and the right child slot from the parent, and frees the
    /// emptied node.
    fn merge_with_sibling(&mut self, hood: Neighbourhood) -> Result<()> {
        let (left, right) = hood.ordered();

        let (separator, removed) = self.index_mut(hood.parent)?.remove_child(hood.separator_idx);
        if removed != right {
            return Err(Error::InvariantViolation {
                reason: "merged node was not the child right of its separator",
            });
        }

        match self.nodes.take(right)? {
            Node::Leaf(mut right_leaf) => {
                self.merge_leaves(left, &mut right_leaf)?;
                self.leaf_count -= 1;
            }
            Node::Index(mut right_index) => {
                self.merge_index_nodes(left, &mut right_index, separator)?;
                self.index_count -= 1;
            }
        }
        tracing::debug!(separator, left = %left, freed = %right, "merged siblings");
        Ok(())
    }

    /// Moves every pair of the detached `right` leaf into `left` and takes
    /// over its place in the leaf chain.
    fn merge_leaves(&mut self, left: Handle, right: &mut LeafNode) -> Result<()> {
        let next = right.next();

        let left_leaf = self.leaf_mut(left)?;
        left_leaf.merge_with_right(right);
        left_leaf.set_next(next);

        if let Some(next) = next {
            self.leaf_mut(next)?.set_prev(Some(left));
        }
        Ok(())
    }

    /// Moves `separator` and every key and child of the detached `right`
    /// node into `left`.
    fn merge_index_nodes(&mut self, left: Handle, right: &mut IndexNode, separator: Key) -> Result<()> {
        let moved = self.index_mut(left)?.merge_with_right(separator, right);
        for child in moved {
            self.set_parent(child, Some(left))?;
        }
        Ok(())
    }

    /// Handles a root left without keys: an empty leaf root empties the
    /// tree, an empty index root hands the root over to its only child.
    fn collapse_root(&mut self, root: Handle) -> Result<()> {
        match self.nodes.take(root)? {
            Node::Leaf(_) => {
                self.root = None;
                self.leaf_count -= 1;
                tracing::debug!("tree emptied");
            }
            Node::Index(index) => {
                let child = *index.children().first().ok_or(Error::InvariantViolation {
                    reason: "empty index root has no child",
                })?;
                self.set_parent(child, None)?;
                self.root = Some(child);
                self.index_count -= 1;
                tracing::debug!(old = %root, new = %child, "collapsed root");
            }
        }
        Ok(())
    }
}

const EMPTY_DONOR: Error = Error::InvariantViolation {
    reason: "generous sibling has no entry to lend",
};

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
#[allow(clippy::cast_precision_loss)]
mod tests {
    use super::super::RawBPlusTree;
    use super::super::tests::tree;
    use crate::Key;
    use alloc::vec;

    fn filled(order: usize, keys: impl IntoIterator<Item = Key>) -> RawBPlusTree {
        let mut tree = tree(order);
        for key in keys {
            tree.insert(key, key as f64).unwrap();
        }
        tree.validate_invariants();
        tree
    }

    #[test]
    fn absent_keys_leave_tree_untouched() {
        let mut empty = tree(4);
        assert_eq!(empty.remove(7), Ok(None));
        assert!(empty.root().is_none());

        let mut tree = filled(4, 0..20);
        let shape = tree.shape();
        assert_eq!(tree.remove(100), Ok(None));
        assert_eq!(tree.remove(-1), Ok(None));
        assert_eq!(tree.shape(), shape);
        assert_eq!(tree.len(), 20);
    }

    #[test]
    fn removal_returns_stored_value() {
        let mut tree = filled(4, 0..10);
        assert_eq!(tree.remove(6), Ok(Some(6.0)));
        assert_eq!(tree.remove(6), Ok(None));
        assert_eq!(tree.search(6).unwrap(), None);
        assert_eq!(tree.len(), 9);
        tree.validate_invariants();
    }

    #[test]
    fn leaf_borrows_from_right_sibling() {
        let mut tree = filled(5, [10, 20, 30, 40, 50, 60]);
        assert_eq!(tree.remove(10), Ok(Some(10.0)));
        tree.validate_invariants();
        assert_eq!(tree.shape(), vec![vec![vec![40]], vec![vec![20, 30], vec![40, 50, 60]]]);
    }

    #[test]
    fn leaf_borrows_from_left_sibling() {
        let mut tree = filled(5, [10, 20, 30, 40, 50, 60]);
        tree.remove(10).unwrap();
        tree.remove(50).unwrap();
        tree.insert(35, 35.0).unwrap();
        // [20, 30, 35] | [40, 60]
        assert_eq!(tree.shape(), vec![vec![vec![40]], vec![vec![20, 30, 35], vec![40, 60]]]);

        tree.remove(60).unwrap();
        tree.validate_invariants();
        assert_eq!(tree.shape(), vec![vec![vec![35]], vec![vec![20, 30], vec![35, 40]]]);
    }

    #[test]
    fn leaf_merge_collapses_root() {
        let mut tree = filled(5, [10, 20, 30, 40, 50, 60]);
        tree.remove(10).unwrap();
        tree.remove(50).unwrap();
        tree.remove(60).unwrap();
        tree.validate_invariants();

        assert_eq!(tree.shape(), vec![vec![vec![20, 30, 40]]]);
        assert_eq!(tree.leaf_count(), 1);
        assert_eq!(tree.index_count(), 0);
        assert_eq!(tree.height().unwrap(), 1);
        assert_eq!(tree.chain_pairs(), vec![(20, 20.0), (30, 30.0), (40, 40.0)]);
    }

    #[test]
    fn index_merge_collapses_root() {
        let mut tree = filled(3, 1..=5);
        tree.remove(1).unwrap();
        tree.validate_invariants();

        assert_eq!(tree.shape(), vec![vec![vec![3, 4]], vec![vec![2], vec![3], vec![4, 5]]]);
        assert_eq!(tree.index_count(), 1);
        assert_eq!(tree.leaf_count(), 3);
        assert_eq!(tree.height().unwrap(), 2);
    }

    #[test]
    fn index_borrows_from_right_sibling() {
        let mut tree = filled(3, 1..=6);
        assert_eq!(
            tree.shape(),
            vec![
                vec![vec![3]],
                vec![vec![2], vec![4, 5]],
                vec![vec![1], vec![2], vec![3], vec![4], vec![5, 6]],
            ]
        );

        tree.remove(1).unwrap();
        tree.validate_invariants();
        assert_eq!(
            tree.shape(),
            vec![vec![vec![4]], vec![vec![3], vec![5]], vec![vec![2], vec![3], vec![4], vec![5, 6]]]
        );
    }

    #[test]
    fn index_borrows_from_left_sibling() {
        let mut tree = filled(3, 1..=7);
        tree.remove(1).unwrap();
        tree.validate_invariants();
        assert_eq!(
            tree.shape(),
            vec![
                vec![vec![5]],
                vec![vec![3, 4], vec![6]],
                vec![vec![2], vec![3], vec![4], vec![5], vec![6, 7]],
            ]
        );

        tree.remove(5).unwrap();
        tree.remove(6).unwrap();
        tree.validate_invariants();
        assert_eq!(
            tree.shape(),
            vec![vec![vec![4]], vec![vec![3], vec![5]], vec![vec![2], vec![3], vec![4], vec![7]]]
        );
    }

    #[test]
    fn index_merge_with_left_sibling() {
        let mut tree = filled(3, 1..=8);
        tree.remove(3).unwrap();
        tree.validate_invariants();
        assert_eq!(
            tree.shape(),
            vec![
                vec![vec![5]],
                vec![vec![2, 3], vec![6, 7]],
                vec![vec![1], vec![2], vec![4], vec![5], vec![6], vec![7, 8]],
            ]
        );
    }

    #[test]
    fn draining_frees_every_node() {
        let mut tree = filled(4, 0..50);
        for key in (0..50).rev().step_by(2).chain((0..50).step_by(2)) {
            assert_eq!(tree.remove(key), Ok(Some(key as f64)));
            tree.validate_invariants();
        }
        assert!(tree.is_empty());
        assert!(tree.root().is_none());
        assert_eq!(tree.leaf_count(), 0);
        assert_eq!(tree.index_count(), 0);
        assert!(tree.ensure_empty().is_ok());
    }
}
