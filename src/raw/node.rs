use alloc::vec::Vec;

use super::handle::Handle;
use crate::config::Order;
use crate::error::{Error, Result};
use crate::{Key, Value};

pub(crate) enum Node {
    Index(IndexNode),
    Leaf(LeafNode),
}

// B+Tree: Index nodes store separator keys and owned child handles.
pub(crate) struct IndexNode {
    parent: Option<Handle>,
    // Every key in children[i] is < keys[i] and every key in children[i + 1] is >= keys[i].
    // Capacity is reserved for one key over the maximum so a full node can
    // take the incoming separator before it splits.
    keys: Vec<Key>,
    children: Vec<Handle>,
}

// B+Tree: Leaf nodes store key/value pairs and the sibling chain.
pub(crate) struct LeafNode {
    parent: Option<Handle>,
    prev: Option<Handle>,
    next: Option<Handle>,
    // One pair over the maximum is reserved, as for index nodes.
    keys: Vec<Key>,
    values: Vec<Value>,
}

/// Result of searching for a key in a leaf.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub(crate) enum SearchResult {
    /// Key was found at the given index.
    Found(usize),
    /// Key was not found; index is where it would be inserted.
    NotFound(usize),
}

fn reserved<T>(capacity: usize) -> Result<Vec<T>> {
    let mut vec = Vec::new();
    vec.try_reserve_exact(capacity)
        .map_err(|_| Error::AllocationFailure { nodes: 1 })?;
    Ok(vec)
}

impl Node {
    /// Returns true if this is a leaf node.
    pub(crate) fn is_leaf(&self) -> bool {
        matches!(self, Node::Leaf(_))
    }

    pub(crate) fn as_leaf(&self) -> Result<&LeafNode> {
        match self {
            Node::Leaf(leaf) => Ok(leaf),
            Node::Index(_) => Err(Error::InvariantViolation {
                reason: "expected a leaf node, found an index node",
            }),
        }
    }

    pub(crate) fn as_leaf_mut(&mut self) -> Result<&mut LeafNode> {
        match self {
            Node::Leaf(leaf) => Ok(leaf),
            Node::Index(_) => Err(Error::InvariantViolation {
                reason: "expected a leaf node, found an index node",
            }),
        }
    }

    pub(crate) fn as_index(&self) -> Result<&IndexNode> {
        match self {
            Node::Index(index) => Ok(index),
            Node::Leaf(_) => Err(Error::InvariantViolation {
                reason: "expected an index node, found a leaf node",
            }),
        }
    }

    pub(crate) fn as_index_mut(&mut self) -> Result<&mut IndexNode> {
        match self {
            Node::Index(index) => Ok(index),
            Node::Leaf(_) => Err(Error::InvariantViolation {
                reason: "expected an index node, found a leaf node",
            }),
        }
    }

    /// Returns the number of keys (leaf) or separator keys (index) in this node.
    pub(crate) fn key_count(&self) -> usize {
        match self {
            Node::Index(index) => index.key_count(),
            Node::Leaf(leaf) => leaf.key_count(),
        }
    }

    pub(crate) fn keys(&self) -> &[Key] {
        match self {
            Node::Index(index) => index.keys(),
            Node::Leaf(leaf) => leaf.keys(),
        }
    }

    pub(crate) fn parent(&self) -> Option<Handle> {
        match self {
            Node::Index(index) => index.parent,
            Node::Leaf(leaf) => leaf.parent,
        }
    }

    pub(crate) fn set_parent(&mut self, parent: Option<Handle>) {
        match self {
            Node::Index(index) => index.parent = parent,
            Node::Leaf(leaf) => leaf.parent = parent,
        }
    }
}

impl IndexNode {
    /// Creates an empty index node with room for a transient overflow.
    pub(crate) fn try_new(order: Order) -> Result<Self> {
        Ok(Self {
            parent: None,
            keys: reserved(order.get())?,
            children: reserved(order.get() + 1)?,
        })
    }

    pub(crate) fn key_count(&self) -> usize {
        self.keys.len()
    }

    pub(crate) fn child_count(&self) -> usize {
        self.children.len()
    }

    pub(crate) fn keys(&self) -> &[Key] {
        &self.keys
    }

    #[inline]
    pub(crate) fn key(&self, index: usize) -> Key {
        self.keys[index]
    }

    pub(crate) fn set_key(&mut self, index: usize, key: Key) {
        self.keys[index] = key;
    }

    pub(crate) fn children(&self) -> &[Handle] {
        &self.children
    }

    #[inline]
    pub(crate) fn child(&self, index: usize) -> Handle {
        self.children[index]
    }

    /// Finds the child to descend into: the first separator strictly greater
    /// than `key` bounds it, so keys equal to a separator go right.
    #[inline]
    pub(crate) fn search_child(&self, key: Key) -> usize {
        match self.keys.binary_search(&key) {
            Ok(idx) => idx + 1,
            Err(idx) => idx,
        }
    }

    /// Position of `child` in this node's child array.
    pub(crate) fn position_of(&self, child: Handle) -> Result<usize> {
        self.children
            .iter()
            .position(|&c| c == child)
            .ok_or(Error::InvariantViolation {
                reason: "child is missing from its parent's child array",
            })
    }

    /// Seeds a fresh root with two children around one separator.
    pub(crate) fn init_root(&mut self, left: Handle, key: Key, right: Handle) {
        self.keys.push(key);
        self.children.push(left);
        self.children.push(right);
    }

    /// Inserts `key` at `index` and `child` just to its right.
    pub(crate) fn insert_child(&mut self, index: usize, key: Key, child: Handle) {
        self.keys.insert(index, key);
        self.children.insert(index + 1, child);
    }

    /// Removes the key at `index` and the child to its right.
    pub(crate) fn remove_child(&mut self, index: usize) -> (Key, Handle) {
        let key = self.keys.remove(index);
        let child = self.children.remove(index + 1);
        (key, child)
    }

    /// Pops the last key and the last child.
    pub(crate) fn pop_child(&mut self) -> Option<(Key, Handle)> {
        let key = self.keys.pop()?;
        let child = self.children.pop()?;
        Some((key, child))
    }

    /// Removes the first key and the first child.
    pub(crate) fn pop_child_front(&mut self) -> Option<(Key, Handle)> {
        if self.keys.is_empty() {
            return None;
        }
        let key = self.keys.remove(0);
        let child = self.children.remove(0);
        Some((key, child))
    }

    pub(crate) fn push_child(&mut self, key: Key, child: Handle) {
        self.keys.push(key);
        self.children.push(child);
    }

    pub(crate) fn push_child_front(&mut self, key: Key, child: Handle) {
        self.keys.insert(0, key);
        self.children.insert(0, child);
    }

    /// Splits an overfull node of `order` keys around `order.split_point()`.
    ///
    /// The left half stays here, the separator at the split point is
    /// returned for promotion and is kept by neither half, and the rest of
    /// the keys and children move into `right`.
    pub(crate) fn split_into(&mut self, order: Order, right: &mut IndexNode) -> Result<Key> {
        let mid = order.split_point();
        if self.keys.len() <= mid {
            return Err(Error::InvariantViolation {
                reason: "index split of a node that is not full",
            });
        }

        right.keys.extend(self.keys.drain(mid + 1..));
        right.children.extend(self.children.drain(mid + 1..));
        let promoted = self.keys.pop().ok_or(Error::InvariantViolation {
            reason: "index split lost its separator",
        })?;

        right.parent = self.parent;
        Ok(promoted)
    }

    /// Absorbs `right`, with the parent's `separator` as the boundary key.
    /// Returns the children that moved over.
    pub(crate) fn merge_with_right(&mut self, separator: Key, right: &mut IndexNode) -> Vec<Handle> {
        let moved: Vec<Handle> = core::mem::take(&mut right.children);
        self.keys.push(separator);
        self.keys.append(&mut right.keys);
        self.children.extend_from_slice(&moved);
        moved
    }
}

impl LeafNode {
    /// Creates an empty leaf with room for a transient overflow.
    pub(crate) fn try_new(order: Order) -> Result<Self> {
        Ok(Self {
            parent: None,
            prev: None,
            next: None,
            keys: reserved(order.get())?,
            values: reserved(order.get())?,
        })
    }

    pub(crate) fn key_count(&self) -> usize {
        self.keys.len()
    }

    pub(crate) fn prev(&self) -> Option<Handle> {
        self.prev
    }

    pub(crate) fn set_prev(&mut self, prev: Option<Handle>) {
        self.prev = prev;
    }

    pub(crate) fn next(&self) -> Option<Handle> {
        self.next
    }

    pub(crate) fn set_next(&mut self, next: Option<Handle>) {
        self.next = next;
    }

    pub(crate) fn keys(&self) -> &[Key] {
        &self.keys
    }

    #[inline]
    pub(crate) fn value(&self, index: usize) -> Value {
        self.values[index]
    }

    /// Returns the pair at `index`, if any.
    #[inline]
    pub(crate) fn pair(&self, index: usize) -> Option<(Key, Value)> {
        Some((*self.keys.get(index)?, *self.values.get(index)?))
    }

    pub(crate) fn first_key(&self) -> Option<Key> {
        self.keys.first().copied()
    }

    /// Binary search for `key`.
    #[inline]
    pub(crate) fn search(&self, key: Key) -> SearchResult {
        match self.keys.binary_search(&key) {
            Ok(idx) => SearchResult::Found(idx),
            Err(idx) => SearchResult::NotFound(idx),
        }
    }

    /// Index of the first key `>= key`.
    pub(crate) fn lower_bound(&self, key: Key) -> usize {
        self.keys.partition_point(|&k| k < key)
    }

    pub(crate) fn insert(&mut self, index: usize, key: Key, value: Value) {
        self.keys.insert(index, key);
        self.values.insert(index, value);
    }

    pub(crate) fn remove(&mut self, index: usize) -> (Key, Value) {
        let key = self.keys.remove(index);
        let value = self.values.remove(index);
        (key, value)
    }

    /// Overwrites the value at `index`, returning the old one.
    pub(crate) fn replace_value(&mut self, index: usize, value: Value) -> Value {
        core::mem::replace(&mut self.values[index], value)
    }

    pub(crate) fn push(&mut self, key: Key, value: Value) {
        self.keys.push(key);
        self.values.push(value);
    }

    pub(crate) fn push_front(&mut self, key: Key, value: Value) {
        self.keys.insert(0, key);
        self.values.insert(0, value);
    }

    pub(crate) fn pop(&mut self) -> Option<(Key, Value)> {
        let key = self.keys.pop()?;
        let value = self.values.pop()?;
        Some((key, value))
    }

    pub(crate) fn pop_front(&mut self) -> Option<(Key, Value)> {
        if self.keys.is_empty() {
            return None;
        }
        Some((self.keys.remove(0), self.values.remove(0)))
    }

    /// Splits an overfull leaf of `order` pairs.
    ///
    /// The first `order.split_point()` pairs stay here and the rest move into
    /// `right`. Returns the minimum key of `right`, which the parent receives
    /// as a copy while `right` keeps it.
    pub(crate) fn split_into(&mut self, order: Order, right: &mut LeafNode) -> Result<Key> {
        let mid = order.split_point();
        right.keys.extend(self.keys.drain(mid..));
        right.values.extend(self.values.drain(mid..));
        right.parent = self.parent;
        right.first_key().ok_or(Error::InvariantViolation {
            reason: "leaf split produced an empty right leaf",
        })
    }

    /// Absorbs every pair of `right`, which is left empty.
    pub(crate) fn merge_with_right(&mut self, right: &mut LeafNode) {
        self.keys.append(&mut right.keys);
        self.values.append(&mut right.values);
    }
}
