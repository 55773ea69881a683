//! Error types for the index.

use core::fmt;

use thiserror::Error;

use crate::{BPlusTree, Key};

/// Convenient Result type alias.
pub type Result<T> = core::result::Result<T, Error>;

/// All errors the index can report.
///
/// A lookup miss is not an error; reads return `Option` instead.
#[derive(Clone, Debug, Eq, PartialEq, Error)]
pub enum Error {
    /// Node storage could not be reserved.
    ///
    /// The operation that hit this made no change to the tree.
    #[error("could not allocate {nodes} node(s)")]
    AllocationFailure {
        /// Number of nodes the operation needed.
        nodes: usize,
    },

    /// An internal operation was handed a node reference that is not live.
    #[error("node reference #{handle} does not refer to a live node")]
    InvalidArgument {
        /// Arena slot of the stale reference.
        handle: usize,
    },

    /// The requested branching factor is below 3 or above [`Order::MAX`](crate::Order::MAX).
    #[error("order {order} is invalid, a B+ tree needs an order between 3 and 65536")]
    InvalidOrder {
        /// The rejected order.
        order: usize,
    },

    /// A range query was issued with `high < low`.
    #[error("invalid range: high bound {high} is below low bound {low}")]
    InvalidRange {
        /// Requested lower bound.
        low: Key,
        /// Requested upper bound.
        high: Key,
    },

    /// The tree still owns nodes and cannot be destroyed.
    #[error("tree is not empty: {leaves} leaf node(s) and {index_nodes} index node(s) remain")]
    NotEmpty {
        /// Live leaf nodes.
        leaves: usize,
        /// Live index nodes.
        index_nodes: usize,
    },

    /// A structural invariant of the tree does not hold.
    ///
    /// This indicates a bug in the tree itself, never a caller mistake.
    #[error("tree invariant violated: {reason}")]
    InvariantViolation {
        /// What was found broken.
        reason: &'static str,
    },
}

/// Returned by [`BPlusTree::destroy`] when the tree still holds nodes.
///
/// The tree is handed back unchanged.
pub struct DestroyError {
    tree: BPlusTree,
    error: Error,
}

impl DestroyError {
    pub(crate) fn new(tree: BPlusTree, error: Error) -> Self {
        Self { tree, error }
    }

    /// The reason the tree could not be destroyed.
    #[must_use]
    pub fn error(&self) -> &Error {
        &self.error
    }

    /// Recovers the tree that could not be destroyed.
    #[must_use]
    pub fn into_tree(self) -> BPlusTree {
        self.tree
    }
}

impl fmt::Debug for DestroyError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DestroyError").field("error", &self.error).finish_non_exhaustive()
    }
}

impl fmt::Display for DestroyError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.error, f)
    }
}

impl core::error::Error for DestroyError {
    fn source(&self) -> Option<&(dyn core::error::Error + 'static)> {
        Some(&self.error)
    }
}

impl From<DestroyError> for Error {
    fn from(err: DestroyError) -> Self {
        err.error
    }
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use super::*;
    use alloc::format;

    #[test]
    fn error_display() {
        let err = Error::InvalidRange { low: 10, high: 2 };
        assert_eq!(format!("{err}"), "invalid range: high bound 2 is below low bound 10");

        let err = Error::NotEmpty {
            leaves: 1,
            index_nodes: 0,
        };
        assert_eq!(format!("{err}"), "tree is not empty: 1 leaf node(s) and 0 index node(s) remain");
    }

    #[test]
    fn destroy_error_hands_tree_back() {
        let mut tree = BPlusTree::new(3).unwrap();
        tree.insert(1, 1.0).unwrap();

        let err = tree.destroy().unwrap_err();
        assert!(matches!(err.error(), Error::NotEmpty { leaves: 1, index_nodes: 0 }));
        assert_eq!(format!("{err}"), format!("{}", err.error()));

        let tree = err.into_tree();
        assert_eq!(tree.search(1), Some(1.0));
    }

    #[test]
    fn destroy_error_converts_into_error() {
        let mut tree = BPlusTree::new(4).unwrap();
        tree.insert(7, 0.5).unwrap();

        let err: Error = tree.destroy().unwrap_err().into();
        assert_eq!(
            err,
            Error::NotEmpty {
                leaves: 1,
                index_nodes: 0
            }
        );
    }
}
