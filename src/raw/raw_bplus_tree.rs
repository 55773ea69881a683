use super::arena::Arena;
use super::handle::Handle;
use super::node::{IndexNode, LeafNode, Node};
use crate::config::Order;
use crate::error::{Error, Result};
use crate::{Key, Value};

mod delete;
mod insert;
mod search;

/// The core B+Tree implementation backing `BPlusTree`.
pub(crate) struct RawBPlusTree {
    /// Branching factor, fixed at creation.
    order: Order,
    /// Arena storing all tree nodes.
    nodes: Arena<Node>,
    /// Handle to the root node, if the tree is non-empty.
    root: Option<Handle>,
    /// Total number of key-value pairs in the tree.
    len: usize,
    /// Live leaf nodes.
    leaf_count: usize,
    /// Live index nodes.
    index_count: usize,
}

impl RawBPlusTree {
    /// Creates a new, empty tree.
    pub(crate) const fn new(order: Order) -> Self {
        Self {
            order,
            nodes: Arena::new(),
            root: None,
            len: 0,
            leaf_count: 0,
            index_count: 0,
        }
    }

    pub(crate) const fn order(&self) -> Order {
        self.order
    }

    /// Returns the number of key-value pairs in the tree.
    pub(crate) const fn len(&self) -> usize {
        self.len
    }

    /// Returns true if the tree contains no elements.
    pub(crate) const fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub(crate) const fn leaf_count(&self) -> usize {
        self.leaf_count
    }

    pub(crate) const fn index_count(&self) -> usize {
        self.index_count
    }

    /// Returns the root node handle, if any.
    pub(crate) const fn root(&self) -> Option<Handle> {
        self.root
    }

    /// Drops every node.
    pub(crate) fn clear(&mut self) {
        self.nodes.clear();
        self.root = None;
        self.len = 0;
        self.leaf_count = 0;
        self.index_count = 0;
    }

    /// Returns a reference to a node by handle.
    pub(crate) fn node(&self, handle: Handle) -> Result<&Node> {
        self.nodes.get(handle)
    }

    fn node_mut(&mut self, handle: Handle) -> Result<&mut Node> {
        self.nodes.get_mut(handle)
    }

    pub(crate) fn leaf(&self, handle: Handle) -> Result<&LeafNode> {
        self.nodes.get(handle)?.as_leaf()
    }

    fn leaf_mut(&mut self, handle: Handle) -> Result<&mut LeafNode> {
        self.nodes.get_mut(handle)?.as_leaf_mut()
    }

    fn index(&self, handle: Handle) -> Result<&IndexNode> {
        self.nodes.get(handle)?.as_index()
    }

    fn index_mut(&mut self, handle: Handle) -> Result<&mut IndexNode> {
        self.nodes.get_mut(handle)?.as_index_mut()
    }

    fn set_parent(&mut self, child: Handle, parent: Option<Handle>) -> Result<()> {
        self.node_mut(child)?.set_parent(parent);
        Ok(())
    }

    /// Descends from the root to the leaf whose key range covers `key`.
    pub(crate) fn find_leaf(&self, key: Key) -> Result<Option<Handle>> {
        let Some(mut current) = self.root else {
            return Ok(None);
        };

        loop {
            match self.nodes.get(current)? {
                Node::Index(index) => current = index.child(index.search_child(key)),
                Node::Leaf(_) => return Ok(Some(current)),
            }
        }
    }

    /// Follows the leftmost (or rightmost) child pointers down to a leaf.
    fn edge_leaf(&self, rightmost: bool) -> Result<Option<Handle>> {
        let Some(mut current) = self.root else {
            return Ok(None);
        };

        loop {
            match self.nodes.get(current)? {
                Node::Index(index) => {
                    let slot = if rightmost { index.child_count() - 1 } else { 0 };
                    current = index.child(slot);
                }
                Node::Leaf(_) => return Ok(Some(current)),
            }
        }
    }

    /// Returns the leftmost leaf, the head of the leaf chain.
    pub(crate) fn first_leaf(&self) -> Result<Option<Handle>> {
        self.edge_leaf(false)
    }

    /// Returns the rightmost leaf, the tail of the leaf chain.
    pub(crate) fn last_leaf(&self) -> Result<Option<Handle>> {
        self.edge_leaf(true)
    }

    /// Number of levels from the root to the leaves; zero when empty.
    pub(crate) fn height(&self) -> Result<usize> {
        let Some(mut current) = self.root else {
            return Ok(0);
        };

        let mut height = 1;
        while let Node::Index(index) = self.nodes.get(current)? {
            current = index.child(0);
            height += 1;
        }
        Ok(height)
    }

    /// Fails with [`Error::NotEmpty`] while any node is alive.
    pub(crate) fn ensure_empty(&self) -> Result<()> {
        debug_assert_eq!(self.leaf_count + self.index_count, self.nodes.len());
        if self.leaf_count == 0 && self.index_count == 0 {
            Ok(())
        } else {
            Err(Error::NotEmpty {
                leaves: self.leaf_count,
                index_nodes: self.index_count,
            })
        }
    }

    pub(crate) fn first_key_value(&self) -> Result<Option<(Key, Value)>> {
        let Some(leaf) = self.first_leaf()? else {
            return Ok(None);
        };
        Ok(self.leaf(leaf)?.pair(0))
    }

    pub(crate) fn last_key_value(&self) -> Result<Option<(Key, Value)>> {
        let Some(leaf) = self.last_leaf()? else {
            return Ok(None);
        };
        let leaf = self.leaf(leaf)?;
        Ok(leaf.key_count().checked_sub(1).and_then(|last| leaf.pair(last)))
    }
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
#[allow(
    clippy::collapsible_if,
    clippy::manual_assert,
    clippy::uninlined_format_args,
    clippy::cast_possible_truncation,
    clippy::cast_possible_wrap,
    clippy::cast_precision_loss
)]
pub(crate) mod tests {
    use super::*;
    use alloc::collections::BTreeMap;
    use alloc::string::String;
    use alloc::vec::Vec;
    use proptest::prelude::*;

    impl RawBPlusTree {
        /// Validates all B+Tree invariants. Panics with a descriptive message if any are violated.
        /// This is intended for use in tests to catch tree corruption.
        pub(crate) fn validate_invariants(&self) {
            let Some(root) = self.root else {
                // Empty tree
                assert_eq!(self.len, 0, "Empty tree should have len 0");
                assert_eq!(self.leaf_count, 0, "Empty tree should have no leaves");
                assert_eq!(self.index_count, 0, "Empty tree should have no index nodes");
                assert!(self.nodes.is_empty(), "Empty tree should own no nodes");
                return;
            };

            let mut errors: Vec<String> = Vec::new();

            if self.node(root).unwrap().parent().is_some() {
                errors.push("Root has a parent".into());
            }

            // 1. Validate tree structure and collect all leaves
            let mut all_leaves: Vec<Handle> = Vec::new();
            let mut leaf_depth: Option<usize> = None;
            let mut index_nodes = 0usize;
            self.validate_node(root, 0, None, None, &mut leaf_depth, &mut all_leaves, &mut index_nodes, &mut errors);

            // 2. Validate leaf chain matches collected leaves
            self.validate_leaf_chain(&all_leaves, &mut errors);

            // 3. Validate len matches actual count
            let actual_count: usize = all_leaves.iter().map(|&h| self.leaf(h).unwrap().key_count()).sum();
            if self.len != actual_count {
                errors.push(alloc::format!("len mismatch: self.len={}, actual count={}", self.len, actual_count));
            }

            // 4. Validate node counters against reachable and allocated nodes
            if self.leaf_count != all_leaves.len() || self.index_count != index_nodes {
                errors.push(alloc::format!(
                    "Counter mismatch: leaf_count={} (reachable {}), index_count={} (reachable {})",
                    self.leaf_count,
                    all_leaves.len(),
                    self.index_count,
                    index_nodes
                ));
            }
            if self.nodes.len() != all_leaves.len() + index_nodes {
                errors.push(alloc::format!(
                    "Arena holds {} nodes but {} are reachable",
                    self.nodes.len(),
                    all_leaves.len() + index_nodes
                ));
            }

            assert!(errors.is_empty(), "Tree invariant violations:\n{}", errors.join("\n"));
        }

        #[allow(clippy::too_many_arguments)]
        fn validate_node(
            &self,
            handle: Handle,
            depth: usize,
            lower: Option<Key>,
            upper: Option<Key>,
            leaf_depth: &mut Option<usize>,
            all_leaves: &mut Vec<Handle>,
            index_nodes: &mut usize,
            errors: &mut Vec<String>,
        ) {
            let node = self.node(handle).unwrap();
            let is_root = Some(handle) == self.root;
            let count = node.key_count();

            // Occupancy
            if count > self.order.max_keys() {
                errors.push(alloc::format!("Node {} overflows with {} keys", handle, count));
            }
            if !is_root && count < self.order.min_keys() {
                errors.push(alloc::format!("Node {} underflows with {} keys", handle, count));
            }
            if is_root && count == 0 {
                errors.push(alloc::format!("Root {} holds no keys", handle));
            }

            // Keys are strictly increasing and inside the separator bounds
            let keys = node.keys();
            for i in 1..keys.len() {
                if keys[i - 1] >= keys[i] {
                    errors.push(alloc::format!("Keys not sorted at node {}, indices {} and {}", handle, i - 1, i));
                }
            }
            for &key in keys {
                if lower.is_some_and(|low| key < low) || upper.is_some_and(|high| key >= high) {
                    errors.push(alloc::format!(
                        "Key {} at node {} escapes bounds [{:?}, {:?})",
                        key,
                        handle,
                        lower,
                        upper
                    ));
                }
            }

            match node {
                Node::Leaf(_) => {
                    // Check leaf depth consistency
                    match *leaf_depth {
                        None => *leaf_depth = Some(depth),
                        Some(expected) => {
                            if depth != expected {
                                errors.push(alloc::format!(
                                    "Leaf depth mismatch: expected {}, got {} at handle {}",
                                    expected,
                                    depth,
                                    handle
                                ));
                            }
                        }
                    }
                    all_leaves.push(handle);
                }
                Node::Index(index) => {
                    *index_nodes += 1;
                    if index.child_count() != index.key_count() + 1 {
                        errors.push(alloc::format!(
                            "Index node {} has {} keys but {} children",
                            handle,
                            index.key_count(),
                            index.child_count()
                        ));
                        return;
                    }

                    for (i, &child) in index.children().iter().enumerate() {
                        let parent = self.node(child).unwrap().parent();
                        if parent != Some(handle) {
                            errors.push(alloc::format!(
                                "Child {} of node {} points back to {:?}",
                                child,
                                handle,
                                parent
                            ));
                        }

                        let child_lower = if i == 0 { lower } else { Some(index.key(i - 1)) };
                        let child_upper = if i == index.key_count() { upper } else { Some(index.key(i)) };
                        self.validate_node(
                            child,
                            depth + 1,
                            child_lower,
                            child_upper,
                            leaf_depth,
                            all_leaves,
                            index_nodes,
                            errors,
                        );
                    }
                }
            }
        }

        fn validate_leaf_chain(&self, all_leaves: &[Handle], errors: &mut Vec<String>) {
            // Check forward chain
            for i in 0..all_leaves.len() {
                let leaf = self.leaf(all_leaves[i]).unwrap();
                let expected_next = all_leaves.get(i + 1).copied();
                if leaf.next() != expected_next {
                    errors.push(alloc::format!(
                        "Leaf chain next mismatch at index {}: expected {:?}, got {:?}",
                        i,
                        expected_next,
                        leaf.next()
                    ));
                }
            }

            // Check backward chain
            for i in 0..all_leaves.len() {
                let leaf = self.leaf(all_leaves[i]).unwrap();
                let expected_prev = if i > 0 { Some(all_leaves[i - 1]) } else { None };
                if leaf.prev() != expected_prev {
                    errors.push(alloc::format!(
                        "Leaf chain prev mismatch at index {}: expected {:?}, got {:?}",
                        i,
                        expected_prev,
                        leaf.prev()
                    ));
                }
            }

            // The chain spells out every key in ascending order
            let mut previous: Option<Key> = None;
            for &handle in all_leaves {
                for &key in self.leaf(handle).unwrap().keys() {
                    if previous.is_some_and(|p| p >= key) {
                        errors.push(alloc::format!("Leaf chain out of order at key {}", key));
                    }
                    previous = Some(key);
                }
            }
        }

        /// Collects the leaf chain from head to tail.
        pub(crate) fn chain_pairs(&self) -> Vec<(Key, Value)> {
            let mut pairs = Vec::new();
            let mut current = self.first_leaf().unwrap();
            while let Some(handle) = current {
                let leaf = self.leaf(handle).unwrap();
                pairs.extend((0..leaf.key_count()).filter_map(|i| leaf.pair(i)));
                current = leaf.next();
            }
            pairs
        }

        /// Keys of every node, level by level, for shape assertions.
        pub(crate) fn shape(&self) -> Vec<Vec<Vec<Key>>> {
            let mut levels = Vec::new();
            let mut level: Vec<Handle> = self.root.into_iter().collect();
            while !level.is_empty() {
                let mut next = Vec::new();
                let mut keys = Vec::new();
                for handle in level {
                    let node = self.node(handle).unwrap();
                    keys.push(node.keys().to_vec());
                    if let Node::Index(index) = node {
                        next.extend_from_slice(index.children());
                    }
                }
                levels.push(keys);
                level = next;
            }
            levels
        }
    }

    pub(crate) fn tree(order: usize) -> RawBPlusTree {
        RawBPlusTree::new(Order::new(order).unwrap())
    }

    // Test operations enum for property testing
    #[derive(Clone, Debug)]
    enum Op {
        Insert(i64),
        Remove(i64),
    }

    fn op_strategy() -> impl Strategy<Value = Op> {
        prop_oneof![
            3 => (0i64..1000).prop_map(Op::Insert),
            2 => (0i64..1000).prop_map(Op::Remove),
        ]
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(50))]

        #[test]
        fn tree_invariants_maintained_after_operations(
            order in 3usize..=8,
            ops in prop::collection::vec(op_strategy(), 0..500),
        ) {
            let mut tree = tree(order);
            let mut model: BTreeMap<Key, Value> = BTreeMap::new();

            for op in ops {
                match op {
                    Op::Insert(key) => {
                        let value = key as Value * 2.0;
                        prop_assert_eq!(tree.insert(key, value).unwrap(), model.insert(key, value));
                    }
                    Op::Remove(key) => {
                        prop_assert_eq!(tree.remove(key).unwrap(), model.remove(&key));
                    }
                }
                tree.validate_invariants();
                prop_assert_eq!(tree.len(), model.len());
            }

            let expected: Vec<(Key, Value)> = model.into_iter().collect();
            prop_assert_eq!(tree.chain_pairs(), expected);
        }

        #[test]
        fn removing_everything_leaves_no_nodes(
            order in 3usize..=8,
            keys in prop::collection::btree_set(-500i64..500, 0..300),
            seed in any::<u64>(),
        ) {
            let mut tree = tree(order);
            for &key in &keys {
                tree.insert(key, 1.0).unwrap();
            }
            tree.validate_invariants();

            // Remove in a seed-dependent order.
            let mut order_of_removal: Vec<i64> = keys.iter().copied().collect();
            let len = order_of_removal.len();
            let mut x = seed;
            for i in (1..len).rev() {
                x = x.wrapping_mul(6364136223846793005).wrapping_add(1);
                order_of_removal.swap(i, (x >> 33) as usize % (i + 1));
            }

            for key in order_of_removal {
                prop_assert_eq!(tree.remove(key).unwrap(), Some(1.0));
                tree.validate_invariants();
            }

            prop_assert!(tree.is_empty());
            prop_assert!(tree.root().is_none());
            prop_assert!(tree.ensure_empty().is_ok());
        }
    }

    #[test]
    fn empty_tree_reads() {
        let tree = tree(3);
        tree.validate_invariants();
        assert_eq!(tree.height().unwrap(), 0);
        assert_eq!(tree.first_key_value().unwrap(), None);
        assert_eq!(tree.last_key_value().unwrap(), None);
        assert_eq!(tree.find_leaf(1).unwrap(), None);
        assert!(tree.ensure_empty().is_ok());
    }

    #[test]
    fn counters_track_every_node() {
        let mut tree = tree(3);
        for key in 0..64 {
            tree.insert(key, 0.0).unwrap();
        }
        tree.validate_invariants();
        assert_eq!(
            tree.ensure_empty(),
            Err(Error::NotEmpty {
                leaves: tree.leaf_count(),
                index_nodes: tree.index_count(),
            })
        );
        assert!(tree.index_count() > 0);

        tree.clear();
        tree.validate_invariants();
        assert!(tree.ensure_empty().is_ok());
    }

    #[test]
    fn height_grows_with_splits() {
        let mut tree = tree(3);
        tree.insert(1, 1.0).unwrap();
        assert_eq!(tree.height().unwrap(), 1);
        tree.insert(2, 2.0).unwrap();
        tree.insert(3, 3.0).unwrap();
        assert_eq!(tree.height().unwrap(), 2);
        assert_eq!(tree.first_key_value().unwrap(), Some((1, 1.0)));
        assert_eq!(tree.last_key_value().unwrap(), Some((3, 3.0)));
    }
}
