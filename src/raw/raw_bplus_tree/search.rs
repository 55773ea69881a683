use super::RawBPlusTree;
use crate::error::Result;
use crate::raw::Handle;
use crate::raw::node::SearchResult;
use crate::{Key, Value};

impl RawBPlusTree {
    /// Point lookup.
    pub(crate) fn search(&self, key: Key) -> Result<Option<Value>> {
        let Some(leaf_handle) = self.find_leaf(key)? else {
            return Ok(None);
        };

        let leaf = self.leaf(leaf_handle)?;
        match leaf.search(key) {
            SearchResult::Found(idx) => Ok(Some(leaf.value(idx))),
            SearchResult::NotFound(_) => Ok(None),
        }
    }

    /// Finds where an ascending scan from `low` starts.
    ///
    /// Returns the leaf `low` routes to and the index of its first key
    /// `>= low`. The index may equal the leaf's key count, in which case the
    /// scan continues with the next leaf in the chain.
    pub(crate) fn range_start(&self, low: Key) -> Result<Option<(Handle, usize)>> {
        let Some(leaf_handle) = self.find_leaf(low)? else {
            return Ok(None);
        };

        let leaf = self.leaf(leaf_handle)?;
        Ok(Some((leaf_handle, leaf.lower_bound(low))))
    }
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
#[allow(clippy::cast_precision_loss)]
mod tests {
    use super::super::tests::tree;
    use crate::Key;

    #[test]
    fn search_finds_every_key_across_levels() {
        let mut tree = tree(3);
        for key in (0..200).map(|k| k * 3) {
            tree.insert(key, key as f64).unwrap();
        }
        tree.validate_invariants();
        assert!(tree.height().unwrap() > 3);

        for key in 0..600 {
            let expected = (key % 3 == 0).then_some(key as f64);
            assert_eq!(tree.search(key).unwrap(), expected, "search({key})");
        }
        assert_eq!(tree.search(-1).unwrap(), None);
        assert_eq!(tree.search(Key::MAX).unwrap(), None);
    }

    #[test]
    fn search_on_separator_keys_goes_right() {
        let mut tree = tree(5);
        for key in [10, 20, 30, 40, 50] {
            tree.insert(key, key as f64).unwrap();
        }
        // The root separator is 30 and 30 lives in the right leaf.
        assert_eq!(tree.shape()[0], [[30]]);
        assert_eq!(tree.search(30).unwrap(), Some(30.0));
        assert_eq!(tree.search(29).unwrap(), None);
    }

    #[test]
    fn range_start_points_at_first_key_not_below_low() {
        let mut filled = tree(5);
        for key in [10, 20, 30, 40, 50] {
            filled.insert(key, 0.0).unwrap();
        }

        let (leaf, idx) = filled.range_start(15).unwrap().unwrap();
        assert_eq!(filled.leaf(leaf).unwrap().keys()[idx], 20);

        // Past the end of the left leaf: the scan has to hop to the next leaf.
        let (leaf, idx) = filled.range_start(25).unwrap().unwrap();
        assert_eq!(idx, filled.leaf(leaf).unwrap().key_count());
        assert!(filled.leaf(leaf).unwrap().next().is_some());
    }

    #[test]
    fn range_start_on_empty_tree_is_none() {
        assert!(tree(3).range_start(0).unwrap().is_none());
    }
}
