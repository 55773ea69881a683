use core::fmt;
use core::iter::FusedIterator;

use crate::config::Order;
use crate::error::{DestroyError, Error, Result};
use crate::raw::{Handle, RawBPlusTree};
use crate::{Key, Value};

mod level_order;

pub use level_order::{LevelOrder, NodeId, NodeKind, NodeView};

/// An in-memory index from integer keys to floating-point values, based on
/// a [B+ tree].
///
/// Every pair lives in a leaf; index nodes only hold separator keys that
/// route a descent. Leaves are linked in ascending key order so that range
/// queries walk sideways instead of revisiting the upper levels.
///
/// The branching factor ([`Order`]) is fixed when the tree is created. A
/// node overflows when it reaches `order` keys and is split; a non-root node
/// underflows below `ceil(order / 2) - 1` keys and is repaired by borrowing
/// from or merging with a sibling.
///
/// Structural failures are reported as [`Error`] values instead of panics.
/// Node storage is reserved before a mutation starts, so an
/// [`Error::AllocationFailure`] leaves the tree exactly as it was.
///
/// # Examples
///
/// ```
/// use bplus_index::BPlusTree;
///
/// let mut prices = BPlusTree::new(4)?;
///
/// prices.insert(1003, 17.25)?;
/// prices.insert(1001, 9.5)?;
/// prices.insert(1002, 12.0)?;
///
/// assert_eq!(prices.search(1002), Some(12.0));
/// assert_eq!(prices.search(1004), None);
///
/// // Ranges are inclusive on both ends and ascend by key.
/// let cheap: Vec<_> = prices.range_search(1001, 1002)?.collect();
/// assert_eq!(cheap, [(1001, 9.5), (1002, 12.0)]);
///
/// // Overwriting reports the previous value.
/// assert_eq!(prices.insert(1001, 10.0)?, Some(9.5));
///
/// assert_eq!(prices.remove(1003)?, Some(17.25));
/// assert_eq!(prices.len(), 2);
/// # Ok::<(), bplus_index::Error>(())
/// ```
///
/// A tree must be emptied before it can be destroyed:
///
/// ```
/// use bplus_index::{BPlusTree, Error};
///
/// let mut tree = BPlusTree::default();
/// tree.insert(7, 0.5)?;
///
/// let err = tree.destroy().unwrap_err();
/// assert_eq!(*err.error(), Error::NotEmpty { leaves: 1, index_nodes: 0 });
///
/// let mut tree = err.into_tree();
/// tree.remove(7)?;
/// assert!(tree.destroy().is_ok());
/// # Ok::<(), bplus_index::Error>(())
/// ```
///
/// [B+ tree]: https://en.wikipedia.org/wiki/B%2B_tree
pub struct BPlusTree {
    raw: RawBPlusTree,
}

/// An iterator over every pair of a [`BPlusTree`], in ascending key order.
///
/// This `struct` is created by the [`iter`] method on [`BPlusTree`].
///
/// # Examples
///
/// ```
/// use bplus_index::BPlusTree;
///
/// let mut tree = BPlusTree::new(3)?;
/// for key in [3, 1, 2] {
///     tree.insert(key, key as f64)?;
/// }
/// let mut iter = tree.iter();
/// assert_eq!(iter.len(), 3);
/// assert_eq!(iter.next(), Some((1, 1.0)));
/// # Ok::<(), bplus_index::Error>(())
/// ```
///
/// [`iter`]: BPlusTree::iter
#[must_use = "iterators are lazy and do nothing unless consumed"]
pub struct Iter<'a> {
    tree: &'a RawBPlusTree,
    front: LeafCursor,
    back: LeafCursor,
    remaining: usize,
}

/// An iterator over the pairs of a [`BPlusTree`] whose keys fall in an
/// inclusive range.
///
/// This `struct` is created by the [`range_search`] method on
/// [`BPlusTree`]. It walks the leaf chain lazily and stops at the first key
/// above the upper bound.
///
/// [`range_search`]: BPlusTree::range_search
#[must_use = "iterators are lazy and do nothing unless consumed"]
pub struct Range<'a> {
    tree: &'a RawBPlusTree,
    cursor: LeafCursor,
    high: Key,
}

/// A position in the leaf chain: a leaf and an index into its pairs.
#[derive(Clone, Copy, Debug)]
struct LeafCursor {
    leaf: Option<Handle>,
    index: usize,
}

impl LeafCursor {
    const EXHAUSTED: Self = Self { leaf: None, index: 0 };

    /// Yields the pair under the cursor and steps past it, hopping to the
    /// next leaf when the current one is used up.
    fn advance(&mut self, tree: &RawBPlusTree) -> Option<(Key, Value)> {
        loop {
            let handle = self.leaf?;
            let leaf = match tree.leaf(handle) {
                Ok(leaf) => leaf,
                Err(error) => {
                    tracing::error!(%error, leaf = %handle, "leaf chain walk stopped");
                    *self = Self::EXHAUSTED;
                    return None;
                }
            };

            if let Some(pair) = leaf.pair(self.index) {
                self.index += 1;
                return Some(pair);
            }
            self.leaf = leaf.next();
            self.index = 0;
        }
    }

    /// Steps back over the pair before the cursor and yields it, hopping to
    /// the previous leaf when the current one is used up.
    ///
    /// An index past the end of the leaf stands for "after its last pair".
    fn retreat(&mut self, tree: &RawBPlusTree) -> Option<(Key, Value)> {
        loop {
            let handle = self.leaf?;
            let leaf = match tree.leaf(handle) {
                Ok(leaf) => leaf,
                Err(error) => {
                    tracing::error!(%error, leaf = %handle, "leaf chain walk stopped");
                    *self = Self::EXHAUSTED;
                    return None;
                }
            };

            let index = self.index.min(leaf.key_count());
            if let Some(before) = index.checked_sub(1) {
                self.index = before;
                return leaf.pair(before);
            }
            self.leaf = leaf.prev();
            self.index = usize::MAX;
        }
    }
}

/// Logs a failed read and turns it into a miss.
fn read_or_log<T>(result: Result<T>, operation: &'static str) -> Option<T> {
    match result {
        Ok(value) => Some(value),
        Err(error) => {
            tracing::error!(%error, operation, "read failed");
            None
        }
    }
}

impl BPlusTree {
    /// Makes a new, empty `BPlusTree` with the given order.
    ///
    /// Does not allocate anything on its own; the first insert creates the
    /// root leaf.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidOrder`] if `order < 3` or `order > Order::MAX`.
    ///
    /// # Examples
    ///
    /// ```
    /// use bplus_index::{BPlusTree, Error};
    ///
    /// let tree = BPlusTree::new(5)?;
    /// assert!(tree.is_empty());
    /// assert_eq!(BPlusTree::new(2).unwrap_err(), Error::InvalidOrder { order: 2 });
    /// # Ok::<(), bplus_index::Error>(())
    /// ```
    pub fn new(order: usize) -> Result<Self> {
        Ok(Self::with_order(Order::new(order)?))
    }

    /// Makes a new, empty `BPlusTree` from an already validated [`Order`].
    #[must_use]
    pub const fn with_order(order: Order) -> Self {
        BPlusTree {
            raw: RawBPlusTree::new(order),
        }
    }

    /// Inserts a key-value pair.
    ///
    /// If the key is already present its value is replaced in place and the
    /// old value is returned; the structure of the tree does not change.
    /// Otherwise the pair is added to its leaf, splitting it (and, in
    /// cascade, full ancestors) when it overflows.
    ///
    /// # Complexity
    ///
    /// O(order * log n)
    ///
    /// # Errors
    ///
    /// Returns [`Error::AllocationFailure`] if the nodes a split cascade
    /// needs could not be reserved. The tree is left untouched in that case.
    ///
    /// # Examples
    ///
    /// ```
    /// use bplus_index::BPlusTree;
    ///
    /// let mut tree = BPlusTree::new(3)?;
    /// assert_eq!(tree.insert(37, 1.5)?, None);
    /// assert_eq!(tree.insert(37, 2.5)?, Some(1.5));
    /// assert_eq!(tree.search(37), Some(2.5));
    /// # Ok::<(), bplus_index::Error>(())
    /// ```
    pub fn insert(&mut self, key: Key, value: Value) -> Result<Option<Value>> {
        self.raw.insert(key, value)
    }

    /// Returns the value stored for `key`.
    ///
    /// # Complexity
    ///
    /// O(log n)
    ///
    /// # Examples
    ///
    /// ```
    /// use bplus_index::BPlusTree;
    ///
    /// let mut tree = BPlusTree::default();
    /// tree.insert(1, 0.25)?;
    /// assert_eq!(tree.search(1), Some(0.25));
    /// assert_eq!(tree.search(2), None);
    /// # Ok::<(), bplus_index::Error>(())
    /// ```
    #[must_use]
    pub fn search(&self, key: Key) -> Option<Value> {
        read_or_log(self.raw.search(key), "search").flatten()
    }

    /// Returns `true` if the tree holds a value for `key`.
    #[must_use]
    pub fn contains_key(&self, key: Key) -> bool {
        self.search(key).is_some()
    }

    /// Returns an iterator over the pairs whose keys lie in `low..=high`,
    /// in ascending key order.
    ///
    /// The scan starts in the leaf `low` routes to and then follows the
    /// leaf chain; nothing is collected up front.
    ///
    /// # Complexity
    ///
    /// O(log n) to position, then amortized O(1) per pair.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidRange`] if `high < low`.
    ///
    /// # Examples
    ///
    /// ```
    /// use bplus_index::BPlusTree;
    ///
    /// let mut tree = BPlusTree::new(5)?;
    /// for key in [10, 20, 30, 40, 50] {
    ///     tree.insert(key, key as f64 / 10.0)?;
    /// }
    ///
    /// let keys: Vec<_> = tree.range_search(15, 40)?.map(|(k, _)| k).collect();
    /// assert_eq!(keys, [20, 30, 40]);
    /// assert_eq!(tree.range_search(41, 49)?.count(), 0);
    /// assert!(tree.range_search(40, 15).is_err());
    /// # Ok::<(), bplus_index::Error>(())
    /// ```
    pub fn range_search(&self, low: Key, high: Key) -> Result<Range<'_>> {
        if high < low {
            return Err(Error::InvalidRange { low, high });
        }

        let cursor = match self.raw.range_start(low)? {
            Some((leaf, index)) => LeafCursor { leaf: Some(leaf), index },
            None => LeafCursor::EXHAUSTED,
        };
        Ok(Range {
            tree: &self.raw,
            cursor,
            high,
        })
    }

    /// Removes `key` from the tree, returning its value if it was present.
    ///
    /// Removing an absent key is a no-op. A node left below the minimum
    /// occupancy borrows from a sibling that can spare a key, or otherwise
    /// merges with it; merges can cascade up to the root, which shrinks the
    /// tree by one level when it runs out of separators.
    ///
    /// # Complexity
    ///
    /// O(order * log n)
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvariantViolation`] if the tree turns out to be
    /// structurally broken while it is being rebalanced.
    ///
    /// # Examples
    ///
    /// ```
    /// use bplus_index::BPlusTree;
    ///
    /// let mut tree = BPlusTree::default();
    /// tree.insert(1, 1.0)?;
    /// assert_eq!(tree.remove(1)?, Some(1.0));
    /// assert_eq!(tree.remove(1)?, None);
    /// # Ok::<(), bplus_index::Error>(())
    /// ```
    pub fn remove(&mut self, key: Key) -> Result<Option<Value>> {
        self.raw.remove(key)
    }

    /// Releases an empty tree.
    ///
    /// # Errors
    ///
    /// Fails with [`Error::NotEmpty`] while the tree still owns leaf or index
    /// nodes. The tree comes back inside the [`DestroyError`].
    pub fn destroy(self) -> core::result::Result<(), DestroyError> {
        match self.raw.ensure_empty() {
            Ok(()) => {
                tracing::debug!(order = %self.raw.order(), "tree destroyed");
                Ok(())
            }
            Err(error) => Err(DestroyError::new(self, error)),
        }
    }

    /// Removes every pair and frees every node.
    ///
    /// # Examples
    ///
    /// ```
    /// use bplus_index::BPlusTree;
    ///
    /// let mut tree = BPlusTree::new(3)?;
    /// for key in 0..100 {
    ///     tree.insert(key, 0.0)?;
    /// }
    /// tree.clear();
    /// assert!(tree.is_empty());
    /// assert!(tree.destroy().is_ok());
    /// # Ok::<(), bplus_index::Error>(())
    /// ```
    pub fn clear(&mut self) {
        self.raw.clear();
    }

    /// Returns the number of pairs in the tree.
    #[must_use]
    pub const fn len(&self) -> usize {
        self.raw.len()
    }

    /// Returns `true` if the tree holds no pairs.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.raw.is_empty()
    }

    /// The branching factor the tree was created with.
    #[must_use]
    pub const fn order(&self) -> Order {
        self.raw.order()
    }

    /// Number of levels from the root down to the leaves; 0 for an empty
    /// tree and 1 while the root is a leaf.
    ///
    /// # Examples
    ///
    /// ```
    /// use bplus_index::BPlusTree;
    ///
    /// let mut tree = BPlusTree::new(3)?;
    /// assert_eq!(tree.height(), 0);
    /// tree.insert(1, 0.0)?;
    /// tree.insert(2, 0.0)?;
    /// assert_eq!(tree.height(), 1);
    /// tree.insert(3, 0.0)?;
    /// assert_eq!(tree.height(), 2);
    /// # Ok::<(), bplus_index::Error>(())
    /// ```
    #[must_use]
    pub fn height(&self) -> usize {
        read_or_log(self.raw.height(), "height").unwrap_or(0)
    }

    /// Number of live leaf nodes.
    #[must_use]
    pub const fn leaf_count(&self) -> usize {
        self.raw.leaf_count()
    }

    /// Number of live index nodes.
    #[must_use]
    pub const fn index_count(&self) -> usize {
        self.raw.index_count()
    }

    /// Returns the pair with the smallest key.
    #[must_use]
    pub fn first_key_value(&self) -> Option<(Key, Value)> {
        read_or_log(self.raw.first_key_value(), "first_key_value").flatten()
    }

    /// Returns the pair with the largest key.
    #[must_use]
    pub fn last_key_value(&self) -> Option<(Key, Value)> {
        read_or_log(self.raw.last_key_value(), "last_key_value").flatten()
    }

    /// Gets an iterator over all pairs, sorted by key.
    ///
    /// The iterator is double-ended; walking it from the back follows the
    /// leaf chain in reverse.
    ///
    /// # Examples
    ///
    /// ```
    /// use bplus_index::BPlusTree;
    ///
    /// let mut tree = BPlusTree::new(3)?;
    /// for key in [5, 3, 9, 1] {
    ///     tree.insert(key, 1.0)?;
    /// }
    /// let keys: Vec<_> = tree.iter().map(|(k, _)| k).collect();
    /// assert_eq!(keys, [1, 3, 5, 9]);
    /// # Ok::<(), bplus_index::Error>(())
    /// ```
    pub fn iter(&self) -> Iter<'_> {
        let first = read_or_log(self.raw.first_leaf(), "iter").flatten();
        let last = read_or_log(self.raw.last_leaf(), "iter").flatten();
        Iter {
            tree: &self.raw,
            front: LeafCursor { leaf: first, index: 0 },
            back: LeafCursor {
                leaf: last,
                index: usize::MAX,
            },
            remaining: if first.is_some() && last.is_some() { self.raw.len() } else { 0 },
        }
    }

    /// Visits the tree breadth first, one level at a time, starting at the
    /// root.
    ///
    /// # Examples
    ///
    /// ```
    /// use bplus_index::{BPlusTree, NodeKind};
    ///
    /// let mut tree = BPlusTree::new(5)?;
    /// for key in [10, 20, 30, 40, 50] {
    ///     tree.insert(key, 0.0)?;
    /// }
    ///
    /// let levels: Vec<_> = tree.level_order().collect();
    /// assert_eq!(levels.len(), 2);
    /// assert_eq!(levels[0][0].kind(), NodeKind::Index);
    /// assert_eq!(levels[0][0].keys(), [30]);
    /// assert_eq!(levels[1][1].keys(), [30, 40, 50]);
    /// assert_eq!(levels[0][0].children(), [levels[1][0].id(), levels[1][1].id()]);
    /// # Ok::<(), bplus_index::Error>(())
    /// ```
    pub fn level_order(&self) -> LevelOrder<'_> {
        LevelOrder::new(&self.raw)
    }
}

impl Default for BPlusTree {
    fn default() -> Self {
        BPlusTree::with_order(Order::DEFAULT)
    }
}

impl fmt::Debug for BPlusTree {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_map().entries(self.iter()).finish()
    }
}

/// Prints the tree level by level: index nodes as `<<k k >> `, leaves as
/// `<k k >`, one line per level, followed by an empty line.
impl fmt::Display for BPlusTree {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for level in self.level_order() {
            for node in level {
                let (open, close) = match node.kind() {
                    NodeKind::Index => ("<<", ">> "),
                    NodeKind::Leaf => ("<", ">"),
                };
                f.write_str(open)?;
                for key in node.keys() {
                    write!(f, "{key} ")?;
                }
                f.write_str(close)?;
            }
            writeln!(f)?;
        }
        writeln!(f)
    }
}

impl<'a> IntoIterator for &'a BPlusTree {
    type Item = (Key, Value);
    type IntoIter = Iter<'a>;

    fn into_iter(self) -> Iter<'a> {
        self.iter()
    }
}

impl Iterator for Iter<'_> {
    type Item = (Key, Value);

    fn next(&mut self) -> Option<Self::Item> {
        if self.remaining == 0 {
            return None;
        }

        let pair = self.front.advance(self.tree);
        self.settle(pair)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        (self.remaining, Some(self.remaining))
    }
}

impl DoubleEndedIterator for Iter<'_> {
    fn next_back(&mut self) -> Option<Self::Item> {
        if self.remaining == 0 {
            return None;
        }

        let pair = self.back.retreat(self.tree);
        self.settle(pair)
    }
}

impl Iter<'_> {
    /// Accounts for a pair taken from either end. The two cursors never
    /// cross because the walk stops once `remaining` reaches zero.
    fn settle(&mut self, pair: Option<(Key, Value)>) -> Option<(Key, Value)> {
        if pair.is_some() {
            self.remaining -= 1;
        } else {
            self.remaining = 0;
        }
        pair
    }
}

impl ExactSizeIterator for Iter<'_> {
    fn len(&self) -> usize {
        self.remaining
    }
}

impl FusedIterator for Iter<'_> {}

impl fmt::Debug for Iter<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Iter").field("remaining", &self.remaining).finish_non_exhaustive()
    }
}

impl Iterator for Range<'_> {
    type Item = (Key, Value);

    fn next(&mut self) -> Option<Self::Item> {
        let (key, value) = self.cursor.advance(self.tree)?;
        if key > self.high {
            self.cursor = LeafCursor::EXHAUSTED;
            return None;
        }
        Some((key, value))
    }
}

impl FusedIterator for Range<'_> {}

impl fmt::Debug for Range<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Range").field("high", &self.high).finish_non_exhaustive()
    }
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
#[allow(clippy::cast_precision_loss)]
mod tests {
    use super::*;
    use alloc::format;
    use alloc::string::ToString;
    use alloc::vec::Vec;

    fn filled(order: usize, keys: impl IntoIterator<Item = Key>) -> BPlusTree {
        let mut tree = BPlusTree::new(order).unwrap();
        for key in keys {
            tree.insert(key, key as Value).unwrap();
        }
        tree
    }

    #[test]
    fn default_uses_default_order() {
        let tree = BPlusTree::default();
        assert_eq!(tree.order(), Order::DEFAULT);
        assert_eq!(tree.height(), 0);
        assert!(tree.iter().next().is_none());
    }

    #[test]
    fn range_hops_across_leaves() {
        let tree = filled(3, 0..30);
        let pairs: Vec<_> = tree.range_search(7, 21).unwrap().collect();
        assert_eq!(pairs.len(), 15);
        assert_eq!(pairs.first(), Some(&(7, 7.0)));
        assert_eq!(pairs.last(), Some(&(21, 21.0)));
        assert!(pairs.windows(2).all(|w| w[0].0 < w[1].0));
    }

    #[test]
    fn range_starting_past_a_leaf_end_continues_in_next_leaf() {
        // [10, 20] | [30, 40, 50]: 25 routes to the left leaf but its first
        // qualifying key is in the right one.
        let tree = filled(5, [10, 20, 30, 40, 50]);
        let keys: Vec<_> = tree.range_search(25, 35).unwrap().map(|(k, _)| k).collect();
        assert_eq!(keys, [30]);
    }

    #[test]
    fn range_edge_cases() {
        let empty = BPlusTree::default();
        assert_eq!(empty.range_search(0, 10).unwrap().count(), 0);

        let tree = filled(4, 0..10);
        assert_eq!(tree.range_search(3, 3).unwrap().collect::<Vec<_>>(), [(3, 3.0)]);
        assert_eq!(tree.range_search(100, 200).unwrap().count(), 0);
        assert_eq!(tree.range_search(Key::MIN, Key::MAX).unwrap().count(), 10);
        assert_eq!(
            tree.range_search(5, 4).unwrap_err(),
            Error::InvalidRange { low: 5, high: 4 }
        );
    }

    #[test]
    fn range_is_fused() {
        let tree = filled(3, 0..10);
        let mut range = tree.range_search(2, 3).unwrap();
        assert_eq!(range.next(), Some((2, 2.0)));
        assert_eq!(range.next(), Some((3, 3.0)));
        assert_eq!(range.next(), None);
        assert_eq!(range.next(), None);
    }

    #[test]
    fn iter_reports_exact_length() {
        let tree = filled(4, (0..25).rev());
        let mut iter = tree.iter();
        assert_eq!(iter.len(), 25);
        iter.next();
        assert_eq!(iter.size_hint(), (24, Some(24)));
        assert_eq!(iter.count(), 24);
        assert_eq!((&tree).into_iter().map(|(k, _)| k).collect::<Vec<_>>(), (0..25).collect::<Vec<_>>());
    }

    #[test]
    fn iter_walks_from_both_ends() {
        let tree = filled(3, 0..20);
        let backwards: Vec<_> = tree.iter().rev().map(|(k, _)| k).collect();
        assert_eq!(backwards, (0..20).rev().collect::<Vec<_>>());

        let mut iter = tree.iter();
        let mut front = Vec::new();
        let mut back = Vec::new();
        while let Some((k, _)) = iter.next() {
            front.push(k);
            if let Some((k, _)) = iter.next_back() {
                back.push(k);
            }
        }
        assert_eq!(front, (0..10).collect::<Vec<_>>());
        assert_eq!(back, (10..20).rev().collect::<Vec<_>>());
        assert_eq!(iter.next_back(), None);
    }

    #[test]
    fn first_and_last_pairs() {
        let mut tree = filled(3, [8, -4, 15, 2]);
        assert_eq!(tree.first_key_value(), Some((-4, -4.0)));
        assert_eq!(tree.last_key_value(), Some((15, 15.0)));
        tree.clear();
        assert_eq!(tree.first_key_value(), None);
        assert_eq!(tree.last_key_value(), None);
    }

    #[test]
    fn debug_lists_pairs() {
        let tree = filled(3, [2, 1]);
        assert_eq!(format!("{tree:?}"), "{1: 1.0, 2: 2.0}");
    }

    #[test]
    fn display_prints_levels() {
        assert_eq!(BPlusTree::default().to_string(), "\n");

        let tree = filled(5, [10, 20, 30, 40, 50]);
        assert_eq!(tree.to_string(), "<<30 >> \n<10 20 ><30 40 50 >\n\n");
    }
}
