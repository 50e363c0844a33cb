//! A balanced, static k-d tree over integer coordinate tuples.
//!
//! ## Creation
//!
//! [`KDTree::new`] fixes the capacity and dimension count. Stage points
//! with [`KDTree::add`]; the tree is built in bulk by [`KDTree::build`] or
//! lazily by the first query. Adding a point to a built tree invalidates
//! it, and the next query rebuilds from the full add-history.
//!
//! ## Search
//!
//! [`KDTree::search`] finds the values within a hypercube around a query
//! point; [`KDTree::search_box`] takes explicit per-axis bounds (lower
//! inclusive, upper exclusive). [`KDTree::nearest_neighbors`] finds the k
//! closest values, optionally ignoring axes via
//! [`KDTree::nearest_neighbors_masked`].
//!
//! ## Removal
//!
//! [`KDTree::remove`] deletes one value at an exact key;
//! [`KDTree::search_and_remove`] drains a region;
//! [`KDTree::pick_value`] grabs an arbitrary live value, optionally
//! removing it. All three prune subtrees left without values.
//!
//! ## Threads
//!
//! [`KDTree::set_num_threads`] embeds a worker pool used by the build and
//! by range queries. Results of multi-value queries are unordered; callers
//! should compare them as sets.
//!
//! ## Example
//!
//! ```
//! use kd_index::KDTree;
//!
//! let mut tree: KDTree<char> = KDTree::new(8, 2);
//! tree.add(&[0, 0], 'a').unwrap();
//! tree.add(&[1, 1], 'b').unwrap();
//! tree.add(&[0, 1], 'c').unwrap();
//! tree.add(&[1, 0], 'd').unwrap();
//! tree.add(&[0, 0], 'e').unwrap(); // duplicate tuple, merged at build
//!
//! // Box search: lower bound inclusive, upper bound exclusive.
//! let mut hits = tree.search_box(&[1, 2], &[0, 0]).unwrap();
//! hits.sort();
//! assert_eq!(hits, vec!['a', 'c', 'e']);
//!
//! // Destructive drain of a region.
//! let drained = tree.search_and_remove(&[0, 0], 5).unwrap();
//! assert_eq!(drained.len(), 5);
//! assert!(tree.search_and_remove(&[0, 0], 5).unwrap().is_empty());
//! ```

mod builder;
mod neighbors;
pub(crate) mod node;
pub(crate) mod pool;
mod sort;
mod traversal;

pub use traversal::PickBias;

use crate::error::{KdIndexError, Result};
use crate::kdtree::neighbors::NeighborHeap;
use crate::kdtree::node::{KdNode, Prune};
use crate::kdtree::pool::Executor;

#[cfg(test)]
mod test;

/// A balanced k-d tree mapping d-dimensional `i64` tuples to lists of
/// values. Points staged by [`add`][KDTree::add] are indexed in bulk on the
/// first query (or an explicit [`build`][KDTree::build]); equal tuples
/// collapse into one node carrying all of their values.
#[derive(Debug)]
pub struct KDTree<V> {
    staged: Vec<(Box<[i64]>, V)>,
    capacity: usize,
    dimensions: usize,
    root: Option<Box<KdNode<V>>>,
    permutation: Vec<usize>,
    executor: Executor,
}

impl<V: Clone + Send + Sync> KDTree<V> {
    /// Creates an empty tree holding up to `capacity` staged points of
    /// `dimensions` coordinates each, with no worker pool.
    ///
    /// Panics if `dimensions` is zero.
    pub fn new(capacity: usize, dimensions: usize) -> Self {
        assert!(dimensions > 0, "a KDTree needs at least one dimension");
        Self {
            staged: Vec::with_capacity(capacity),
            capacity,
            dimensions,
            root: None,
            permutation: Vec::new(),
            executor: Executor::sequential(),
        }
    }

    /// Configures the worker pool used to build and to search the tree.
    /// `num_threads` is rounded down to a power of two; one thread or zero
    /// threads makes every operation run on the calling thread.
    pub fn set_num_threads(&mut self, num_threads: usize) -> Result<()> {
        self.executor = Executor::with_threads(num_threads)?;
        Ok(())
    }

    /// Stages a point and its value, invalidating any built tree, and
    /// returns the new number of staged points.
    ///
    /// ## Errors
    ///
    /// - If the point's length differs from the tree's dimension count.
    /// - If the staging buffer is full. Nothing is staged in either case.
    pub fn add(&mut self, point: &[i64], value: V) -> Result<usize> {
        self.check_dimensions(point.len())?;
        if self.staged.len() == self.capacity {
            return Err(KdIndexError::CapacityExceeded {
                capacity: self.capacity,
            });
        }
        self.staged.push((point.into(), value));
        self.root = None;
        Ok(self.staged.len())
    }

    /// Builds the tree from the staged points. Queries build lazily, so
    /// calling this is only useful to move the cost off the first search.
    /// A no-op if the tree is already built.
    pub fn build(&mut self) -> Result<()> {
        if self.root.is_some() {
            return Ok(());
        }
        // The partition axis depends only on the depth of recursion, so it
        // is precomputed for every level the recursion can reach.
        let mut max_depth = 1usize;
        let mut size = self.staged.len();
        while size > 0 {
            max_depth += 1;
            size >>= 1;
        }
        self.permutation = (0..max_depth).map(|i| i % self.dimensions).collect();
        self.root = builder::build_tree(&self.staged, &self.permutation, &self.executor)?;
        Ok(())
    }

    /// Returns the values of all points within `cutoff` of `query` on every
    /// axis, in no particular order. The bounds saturate at the ends of the
    /// `i64` range; the upper bound is exclusive.
    pub fn search(&mut self, query: &[i64], cutoff: i64) -> Result<Vec<V>> {
        self.check_dimensions(query.len())?;
        self.build()?;
        let (query_plus, query_minus) = saturating_bounds(query, cutoff);
        let Self {
            root,
            permutation,
            executor,
            ..
        } = self;
        let Some(root) = root.as_deref() else {
            return Ok(Vec::new());
        };
        let found = traversal::search(root, &query_plus, &query_minus, permutation, executor, 0);
        Ok(collect_values(found))
    }

    /// Returns the values of all points inside the box: on every axis `i`,
    /// `query_minus[i] <= point[i] < query_plus[i]`. Axes where the bounds
    /// arrive swapped are swapped back.
    pub fn search_box(&mut self, query_plus: &[i64], query_minus: &[i64]) -> Result<Vec<V>> {
        self.check_dimensions(query_plus.len())?;
        self.check_dimensions(query_minus.len())?;
        self.build()?;
        let (query_plus, query_minus) = ordered_bounds(query_plus, query_minus);
        let Self {
            root,
            permutation,
            executor,
            ..
        } = self;
        let Some(root) = root.as_deref() else {
            return Ok(Vec::new());
        };
        let found = traversal::search(root, &query_plus, &query_minus, permutation, executor, 0);
        Ok(collect_values(found))
    }

    /// Like [`search`][KDTree::search], but pairs every returned value with
    /// its tuple.
    pub fn search_entries(
        &mut self,
        query: &[i64],
        cutoff: i64,
    ) -> Result<Vec<(Box<[i64]>, V)>> {
        self.check_dimensions(query.len())?;
        self.build()?;
        let (query_plus, query_minus) = saturating_bounds(query, cutoff);
        let Self {
            root,
            permutation,
            executor,
            ..
        } = self;
        let Some(root) = root.as_deref() else {
            return Ok(Vec::new());
        };
        let found = traversal::search(root, &query_plus, &query_minus, permutation, executor, 0);
        Ok(collect_entries(found))
    }

    /// Like [`search_box`][KDTree::search_box], but pairs every returned
    /// value with its tuple.
    pub fn search_entries_box(
        &mut self,
        query_plus: &[i64],
        query_minus: &[i64],
    ) -> Result<Vec<(Box<[i64]>, V)>> {
        self.check_dimensions(query_plus.len())?;
        self.check_dimensions(query_minus.len())?;
        self.build()?;
        let (query_plus, query_minus) = ordered_bounds(query_plus, query_minus);
        let Self {
            root,
            permutation,
            executor,
            ..
        } = self;
        let Some(root) = root.as_deref() else {
            return Ok(Vec::new());
        };
        let found = traversal::search(root, &query_plus, &query_minus, permutation, executor, 0);
        Ok(collect_entries(found))
    }

    /// Removes and returns the values of all points within `cutoff` of
    /// `query` on every axis. Subtrees left without values are pruned. A
    /// repeated call returns nothing.
    pub fn search_and_remove(&mut self, query: &[i64], cutoff: i64) -> Result<Vec<V>> {
        self.check_dimensions(query.len())?;
        self.build()?;
        let (query_plus, query_minus) = saturating_bounds(query, cutoff);
        self.drain_box(query_plus, query_minus)
    }

    /// The box form of [`search_and_remove`][KDTree::search_and_remove].
    pub fn search_and_remove_box(
        &mut self,
        query_plus: &[i64],
        query_minus: &[i64],
    ) -> Result<Vec<V>> {
        self.check_dimensions(query_plus.len())?;
        self.check_dimensions(query_minus.len())?;
        self.build()?;
        let (query_plus, query_minus) = ordered_bounds(query_plus, query_minus);
        self.drain_box(query_plus, query_minus)
    }

    fn drain_box(&mut self, query_plus: Vec<i64>, query_minus: Vec<i64>) -> Result<Vec<V>> {
        let Self {
            root,
            permutation,
            executor,
            ..
        } = self;
        let Some(root) = root.as_deref_mut() else {
            return Ok(Vec::new());
        };
        // An emptied root is kept; later walks see its empty value list.
        let (found, _) = traversal::search_and_remove(
            root,
            &query_plus,
            &query_minus,
            permutation,
            executor,
            0,
        );
        Ok(found)
    }

    /// Returns the values of the `count` nearest live points to `query` by
    /// Euclidean distance. Duplicate tuples were merged at build time, so
    /// more than `count` values may come back.
    pub fn nearest_neighbors(&mut self, query: &[i64], count: usize) -> Result<Vec<V>> {
        let enable = vec![true; self.dimensions];
        self.nearest_neighbors_masked(query, count, &enable)
    }

    /// Like [`nearest_neighbors`][KDTree::nearest_neighbors], but axes
    /// where `enable` is false contribute neither to distances nor to
    /// branch cutoff tests.
    pub fn nearest_neighbors_masked(
        &mut self,
        query: &[i64],
        count: usize,
        enable: &[bool],
    ) -> Result<Vec<V>> {
        self.check_dimensions(query.len())?;
        self.check_dimensions(enable.len())?;
        self.build()?;
        let Self {
            root, permutation, ..
        } = self;
        let Some(root) = root.as_deref() else {
            return Ok(Vec::new());
        };
        if count == 0 {
            return Ok(Vec::new());
        }
        let mut heap = NeighborHeap::new(query, count, enable);
        neighbors::nearest_neighbor(root, &mut heap, permutation, 0);
        // Drain the heap farthest-first; each node may carry several values.
        let mut found = Vec::new();
        while let Some((_, node)) = heap.remove_top() {
            found.extend(node.values.iter().cloned());
        }
        Ok(found)
    }

    /// Removes one occurrence of `value` stored at exactly `query`.
    /// Returns whether a value was removed.
    pub fn remove(&mut self, query: &[i64], value: &V) -> Result<bool>
    where
        V: PartialEq,
    {
        self.check_dimensions(query.len())?;
        self.build()?;
        let Self {
            root, permutation, ..
        } = self;
        let Some(root) = root.as_deref_mut() else {
            return Ok(false);
        };
        Ok(traversal::remove_value(root, query, value, permutation, 0) != Prune::Clean)
    }

    /// Picks an arbitrary live value, descending by `bias`, and returns it
    /// with its key. With `remove` the value leaves the tree and emptied
    /// paths are pruned. Returns `None` once no live value remains.
    pub fn pick_value(&mut self, bias: PickBias, remove: bool) -> Result<Option<(Box<[i64]>, V)>> {
        self.build()?;
        let Some(root) = self.root.as_deref_mut() else {
            return Ok(None);
        };
        let mut picked = None;
        traversal::pick_value(root, bias.selector(), remove, &mut picked);
        Ok(picked)
    }

    /// The number of points staged into the tree (duplicates included).
    pub fn size(&self) -> usize {
        self.staged.len()
    }

    /// The dimension count fixed at construction.
    pub fn num_dimensions(&self) -> usize {
        self.dimensions
    }

    fn check_dimensions(&self, actual: usize) -> Result<()> {
        if actual != self.dimensions {
            return Err(KdIndexError::DimensionMismatch {
                expected: self.dimensions,
                actual,
            });
        }
        Ok(())
    }

    /// Re-checks the partition invariant at every node and returns the node
    /// count. Zero for an unbuilt tree.
    #[cfg(test)]
    pub(crate) fn verify(&self) -> Result<usize> {
        match self.root.as_deref() {
            Some(root) => builder::verify_subtree(root, &self.permutation, &self.executor, 0),
            None => Ok(0),
        }
    }

    #[cfg(test)]
    pub(crate) fn root(&self) -> Option<&KdNode<V>> {
        self.root.as_deref()
    }
}

impl<V: Clone> Clone for KDTree<V> {
    /// Deep copy sharing no nodes with the source. The copy starts without
    /// a worker pool; give it one with [`KDTree::set_num_threads`].
    fn clone(&self) -> Self {
        Self {
            staged: self.staged.clone(),
            capacity: self.capacity,
            dimensions: self.dimensions,
            root: self.root.clone(),
            permutation: self.permutation.clone(),
            executor: Executor::sequential(),
        }
    }
}

/// Hypercube bounds around `query`, clamped to the representable range.
fn saturating_bounds(query: &[i64], cutoff: i64) -> (Vec<i64>, Vec<i64>) {
    let query_plus = query.iter().map(|q| q.saturating_add(cutoff)).collect();
    let query_minus = query.iter().map(|q| q.saturating_sub(cutoff)).collect();
    (query_plus, query_minus)
}

/// Box bounds with any swapped axis put back in order.
fn ordered_bounds(query_plus: &[i64], query_minus: &[i64]) -> (Vec<i64>, Vec<i64>) {
    let mut plus = query_plus.to_vec();
    let mut minus = query_minus.to_vec();
    for i in 0..plus.len() {
        if minus[i] > plus[i] {
            std::mem::swap(&mut minus[i], &mut plus[i]);
        }
    }
    (plus, minus)
}

fn collect_values<V: Clone>(found: Vec<&KdNode<V>>) -> Vec<V> {
    let mut values = Vec::new();
    for node in found {
        values.extend(node.values.iter().cloned());
    }
    values
}

fn collect_entries<V: Clone>(found: Vec<&KdNode<V>>) -> Vec<(Box<[i64]>, V)> {
    let mut entries = Vec::new();
    for node in found {
        for value in &node.values {
            entries.push((node.tuple.clone(), value.clone()));
        }
    }
    entries
}
