//! An in-memory B+ tree index from `i64` keys to `f64` values.
//!
//! [`BPlusTree`] keeps every pair in its leaves and links the leaves in key
//! order, so it answers point lookups in O(log n) and inclusive range
//! queries by descending once and then walking sideways.
//!
//! # Example
//!
//! ```
//! use bplus_index::BPlusTree;
//!
//! let mut readings = BPlusTree::new(4)?;
//! readings.insert(1_700_000_060, 21.5)?;
//! readings.insert(1_700_000_000, 20.75)?;
//! readings.insert(1_700_000_120, 22.0)?;
//!
//! assert_eq!(readings.search(1_700_000_060), Some(21.5));
//!
//! let first_minute: Vec<_> = readings.range_search(1_700_000_000, 1_700_000_060)?.collect();
//! assert_eq!(first_minute, [(1_700_000_000, 20.75), (1_700_000_060, 21.5)]);
//!
//! readings.remove(1_700_000_000)?;
//! assert_eq!(readings.len(), 2);
//! # Ok::<(), bplus_index::Error>(())
//! ```
//!
//! # Features
//!
//! - **`no_std` compatible** - Only requires `alloc`
//! - **Configurable order** - The branching factor is chosen per tree, see [`Order`]
//! - **Fallible allocation** - Node storage is reserved before a mutation starts
//! - **Diagnostics** - Structural changes are reported through [`tracing`] events,
//!   and [`BPlusTree::level_order`] exposes the node layout
//!
//! # Implementation
//!
//! Nodes live in an arena and refer to each other by handle: index nodes to
//! their children, every node to its parent, and leaves to their chain
//! neighbours. Inserts split full nodes bottom-up; deletes borrow from or
//! merge with a sibling and collapse the root when it runs out of separators.

#![no_std]
// These forbid rules and lint groups are meant to be very restrictive.
#![forbid(unsafe_code)]
#![forbid(keyword_idents)]
#![forbid(non_ascii_idents)]
#![forbid(unreachable_pub)]
#![warn(clippy::all)]
#![warn(clippy::cargo)]
#![warn(clippy::pedantic)]
// Enable coverage attributes for nightly builds.
#![cfg_attr(coverage_nightly, feature(coverage_attribute))]

extern crate alloc;

mod config;
mod error;
mod raw;

pub mod bplus_tree;

pub use bplus_tree::{BPlusTree, Iter, LevelOrder, NodeId, NodeKind, NodeView, Range};
pub use config::Order;
pub use error::{DestroyError, Error, Result};

/// Key type of the index.
pub type Key = i64;

/// Value type of the index.
pub type Value = f64;
