use smallvec::SmallVec;

use super::RawBPlusTree;
use crate::error::{Error, Result};
use crate::raw::Handle;
use crate::raw::node::{IndexNode, LeafNode, Node, SearchResult};
use crate::{Key, Value};

/// Index nodes allocated ahead of a split cascade, consumed bottom-up.
type SpareIndexNodes = SmallVec<[IndexNode; 8]>;

impl RawBPlusTree {
    /// Inserts a key-value pair into the tree.
    /// Returns the old value if the key was already present.
    ///
    /// Every node a split cascade may need is allocated before the tree is
    /// touched, so an allocation failure leaves the tree as it was.
    pub(crate) fn insert(&mut self, key: Key, value: Value) -> Result<Option<Value>> {
        tracing::trace!(key, value, "insert");

        // Handle empty tree case
        let Some(leaf_handle) = self.find_leaf(key)? else {
            self.create_root(key, value)?;
            return Ok(None);
        };

        let order = self.order;
        let leaf = self.leaf_mut(leaf_handle)?;
        let idx = match leaf.search(key) {
            SearchResult::Found(idx) => {
                // Key exists, replace value in place; the structure is unchanged.
                return Ok(Some(leaf.replace_value(idx, value)));
            }
            SearchResult::NotFound(idx) => idx,
        };

        if leaf.key_count() < order.max_keys() {
            leaf.insert(idx, key, value);
            self.len += 1;
            return Ok(None);
        }

        // The leaf is full: reserve the right leaf and every index node the
        // promotion can create before touching anything.
        let splits = self.index_splits_needed(leaf_handle)?;
        self.nodes.try_reserve(splits + 1)?;
        let right_leaf = LeafNode::try_new(order)?;
        let mut spares = SpareIndexNodes::new();
        for _ in 0..splits {
            spares.push(IndexNode::try_new(order)?);
        }

        self.leaf_mut(leaf_handle)?.insert(idx, key, value);
        self.len += 1;
        self.split_leaf_and_propagate(leaf_handle, right_leaf, &mut spares)?;
        Ok(None)
    }

    /// Creates the root leaf on the first insertion.
    fn create_root(&mut self, key: Key, value: Value) -> Result<()> {
        let mut leaf = LeafNode::try_new(self.order)?;
        leaf.push(key, value);
        let handle = self.nodes.alloc(Node::Leaf(leaf))?;

        self.root = Some(handle);
        self.len = 1;
        self.leaf_count = 1;
        tracing::debug!(key, "created root leaf");
        Ok(())
    }

    /// Counts the index nodes a leaf split will allocate: one per full
    /// ancestor on the way up, plus a new root if every ancestor is full.
    fn index_splits_needed(&self, leaf_handle: Handle) -> Result<usize> {
        let max_keys = self.order.max_keys();
        let mut needed = 0;
        let mut current = self.node(leaf_handle)?.parent();

        while let Some(handle) = current {
            if self.index(handle)?.key_count() < max_keys {
                return Ok(needed);
            }
            needed += 1;
            current = self.node(handle)?.parent();
        }

        // Promotion passes the old root.
        Ok(needed + 1)
    }

    /// Splits an overfull leaf into itself and `right_leaf`, splices the new
    /// leaf into the chain, then promotes its minimum key.
    fn split_leaf_and_propagate(
        &mut self,
        leaf_handle: Handle,
        mut right_leaf: LeafNode,
        spares: &mut SpareIndexNodes,
    ) -> Result<()> {
        let order = self.order;
        let leaf = self.leaf_mut(leaf_handle)?;
        let separator = leaf.split_into(order, &mut right_leaf)?;

        // Set up leaf links
        let old_next = leaf.next();
        right_leaf.set_prev(Some(leaf_handle));
        right_leaf.set_next(old_next);

        let right_handle = self.nodes.alloc(Node::Leaf(right_leaf))?;
        self.leaf_count += 1;

        // Fix up the links
        self.leaf_mut(leaf_handle)?.set_next(Some(right_handle));
        if let Some(old_next) = old_next {
            self.leaf_mut(old_next)?.set_prev(Some(right_handle));
        }

        tracing::debug!(separator, left = %leaf_handle, right = %right_handle, "split leaf");
        self.adjust_parent(leaf_handle, right_handle, separator, spares)
    }

    /// Hangs `right` next to `left` under their parent with `separator`
    /// between them, splitting full index nodes upward and growing a new
    /// root when the promotion passes the old one.
    fn adjust_parent(
        &mut self,
        mut left: Handle,
        mut right: Handle,
        mut separator: Key,
        spares: &mut SpareIndexNodes,
    ) -> Result<()> {
        let order = self.order;

        loop {
            let Some(parent) = self.node(left)?.parent() else {
                let mut root = spares.pop().ok_or(SPARES_EXHAUSTED)?;
                root.init_root(left, separator, right);
                let root_handle = self.nodes.alloc(Node::Index(root))?;
                self.index_count += 1;

                self.set_parent(left, Some(root_handle))?;
                self.set_parent(right, Some(root_handle))?;
                self.root = Some(root_handle);
                tracing::debug!(separator, root = %root_handle, "grew new root");
                return Ok(());
            };

            let index = self.index_mut(parent)?;
            let position = index.position_of(left)?;
            index.insert_child(position, separator, right);
            let overfull = index.key_count() > order.max_keys();
            self.set_parent(right, Some(parent))?;

            if !overfull {
                return Ok(());
            }

            // Split this index node
            let mut sibling = spares.pop().ok_or(SPARES_EXHAUSTED)?;
            let promoted = self.index_mut(parent)?.split_into(order, &mut sibling)?;
            let moved = sibling.child_count();
            let sibling_handle = self.nodes.alloc(Node::Index(sibling))?;
            self.index_count += 1;

            for slot in 0..moved {
                let child = self.index(sibling_handle)?.child(slot);
                self.set_parent(child, Some(sibling_handle))?;
            }

            tracing::debug!(promoted, left = %parent, right = %sibling_handle, "split index node");
            left = parent;
            right = sibling_handle;
            separator = promoted;
        }
    }
}

const SPARES_EXHAUSTED: Error = Error::InvariantViolation {
    reason: "split cascade ran out of reserved index nodes",
};
