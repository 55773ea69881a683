//! Branching factor configuration.

use core::fmt;

use crate::error::{Error, Result};

/// The order `m` of a B+ tree: the maximum number of children of an index node.
///
/// Leaves hold at most `m - 1` pairs and index nodes at most `m - 1`
/// separator keys. Every non-root node keeps at least `ceil(m / 2) - 1`.
///
/// # Examples
///
/// ```
/// use bplus_index::Order;
///
/// let order = Order::new(5).unwrap();
/// assert_eq!(order.max_keys(), 4);
/// assert_eq!(order.min_keys(), 2);
/// assert!(Order::new(2).is_err());
/// assert!(Order::new(Order::MAX.get() + 1).is_err());
/// ```
#[derive(Clone, Copy, Debug, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct Order(usize);

impl Order {
    /// Smallest order that still forms a B+ tree.
    pub const MIN: Self = Self(3);

    /// Largest accepted order.
    ///
    /// Every node reserves room for `order` keys when it is created, so the
    /// order bounds the memory of a single node.
    pub const MAX: Self = Self(1 << 16);

    /// Order used by [`BPlusTree::default`](crate::BPlusTree::default).
    pub const DEFAULT: Self = Self(4);

    /// Validates an order.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidOrder`] if `order` lies outside
    /// [`Order::MIN`]`..=`[`Order::MAX`].
    pub const fn new(order: usize) -> Result<Self> {
        if order < Self::MIN.0 || order > Self::MAX.0 {
            return Err(Error::InvalidOrder { order });
        }
        Ok(Self(order))
    }

    /// The raw branching factor.
    #[must_use]
    pub const fn get(self) -> usize {
        self.0
    }

    /// Most keys (leaf) or separator keys (index) a node may hold.
    #[must_use]
    pub const fn max_keys(self) -> usize {
        self.0 - 1
    }

    /// Fewest keys a non-root node may hold: `ceil(m / 2) - 1`.
    #[must_use]
    pub const fn min_keys(self) -> usize {
        self.0.div_ceil(2) - 1
    }

    /// Entries kept by the left node of a split, `floor(m / 2)`.
    ///
    /// For index splits this is also the position of the promoted separator.
    #[must_use]
    pub const fn split_point(self) -> usize {
        self.0 / 2
    }

    /// Whether a sibling holding `count` entries can lend one.
    #[must_use]
    pub const fn is_generous(self, count: usize) -> bool {
        count > self.split_point()
    }
}

impl Default for Order {
    fn default() -> Self {
        Self::DEFAULT
    }
}

impl TryFrom<usize> for Order {
    type Error = Error;

    fn try_from(order: usize) -> Result<Self> {
        Self::new(order)
    }
}

impl From<Order> for usize {
    fn from(order: Order) -> Self {
        order.0
    }
}

impl fmt::Display for Order {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}
