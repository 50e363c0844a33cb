use std::cmp::Ordering;

/// One node of a built tree: a tuple, the values stored at that tuple, and
/// the two optional subtrees partitioned by the node's super key.
///
/// The value list starts at length 1 and grows only when duplicate tuples
/// are merged during the build; destructive queries shrink it. A node whose
/// list is empty and whose children are both absent is dead and gets pruned
/// from its parent on the next destructive walk.
#[derive(Debug, Clone)]
pub(crate) struct KdNode<V> {
    pub(crate) tuple: Box<[i64]>,
    pub(crate) values: Vec<V>,
    pub(crate) lt: Option<Box<KdNode<V>>>,
    pub(crate) gt: Option<Box<KdNode<V>>>,
}

impl<V> KdNode<V> {
    /// Box membership test: lower bound inclusive, upper bound exclusive on
    /// every axis, matching the `upper = point + 1` convention of callers
    /// that cluster by coordinate.
    pub(crate) fn inside(&self, query_plus: &[i64], query_minus: &[i64]) -> bool {
        self.tuple
            .iter()
            .zip(query_minus)
            .zip(query_plus)
            .all(|((t, lo), hi)| lo <= t && t < hi)
    }
}

/// Compares two tuples in as few coordinates as possible, with axis `p` as
/// the most significant coordinate and the remaining axes as cyclic
/// tie-breaks. `Equal` only for identical tuples.
pub(crate) fn super_key_compare(a: &[i64], b: &[i64], p: usize) -> Ordering {
    let k = a.len();
    for i in 0..k {
        // A fast alternative to the modulus operator for p + i < 2 * k.
        let r = if p + i < k { p + i } else { p + i - k };
        match a[r].cmp(&b[r]) {
            Ordering::Equal => continue,
            unequal => return unequal,
        }
    }
    Ordering::Equal
}

/// What a destructive walk found below, reported to the parent call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Prune {
    /// Nothing was removed under this node.
    Clean,
    /// Something was removed and this node is still needed.
    Live,
    /// Something was removed and this node is dead; the parent must clear
    /// its child link.
    Dead,
}
