//! A balanced, static k-d tree over signed 64-bit integer coordinate tuples.
//!
//! Points are staged with [`KDTree::add`] and the tree is built in bulk
//! (interleaved merge sorts of one reference array per axis, then a cyclic
//! partition of those arrays about the median), either explicitly with
//! [`KDTree::build`] or lazily by the first query. Once built, the tree
//! answers orthogonal range queries, bounded nearest-neighbor queries with a
//! per-axis enable mask, and destructive queries (exact-point value removal,
//! range search-and-remove, biased value picking) that prune emptied
//! subtrees as they go.
//!
//! Sorting, building, range searching, and verification all fork through a
//! worker pool embedded in the tree; see [`KDTree::set_num_threads`].

pub mod error;
pub mod kdtree;

pub use error::{KdIndexError, Result};
pub use kdtree::{KDTree, PickBias};

#[cfg(test)]
pub(crate) mod test;
