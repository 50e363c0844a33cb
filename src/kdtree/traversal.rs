//! Tree walks: orthogonal range search, its destructive variant, exact-point
//! value removal, and the biased pick used to grab an arbitrary live value.
//!
//! Range walks descend < whenever `query_minus[p] <= tuple[p]` and >
//! whenever `query_plus[p] >= tuple[p]`; equality on either bound requires
//! the descent because super-key tie-breaking may have assigned a point
//! equal on the partition axis to either side. Destructive walks report the
//! tri-state [`Prune`] upward so a parent can drop the link to a child whose
//! subtree no longer carries any value.

use std::cmp::Ordering;

use crate::kdtree::node::{super_key_compare, KdNode, Prune};
use crate::kdtree::pool::Executor;

/// How a pick descends the tree when several live values are available.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PickBias {
    /// Follow the < side wherever possible.
    Low,
    /// Follow the > side wherever possible.
    High,
    /// Alternate sides by depth.
    Alternating,
    /// Follow a random descent path.
    Random,
}

impl PickBias {
    /// The descent selector: bit 0 chooses the > child, shifted right once
    /// per level.
    pub(crate) fn selector(self) -> u64 {
        match self {
            PickBias::Low => 0,
            PickBias::High => 0x7FFF_FFFF_FFFF_FFFF,
            PickBias::Alternating => 0x2AAA_AAAA_AAAA_AAAA,
            PickBias::Random => rand::random(),
        }
    }
}

/// Collects the nodes inside the query box. Results from the two branch
/// walks are concatenated in no particular order.
pub(crate) fn search<'a, V: Sync>(
    node: &'a KdNode<V>,
    query_plus: &[i64],
    query_minus: &[i64],
    permutation: &[usize],
    executor: &Executor,
    depth: usize,
) -> Vec<&'a KdNode<V>> {
    let p = permutation[depth];
    let mut found = Vec::new();
    if node.inside(query_plus, query_minus) {
        found.push(node);
    }

    let lt = node
        .lt
        .as_deref()
        .filter(|_| query_minus[p] <= node.tuple[p]);
    let gt = node.gt.as_deref().filter(|_| query_plus[p] >= node.tuple[p]);
    match (lt, gt) {
        (Some(lt), Some(gt)) => {
            let (mut lt_found, mut gt_found) = executor.forked(
                depth,
                || search(lt, query_plus, query_minus, permutation, executor, depth + 1),
                || search(gt, query_plus, query_minus, permutation, executor, depth + 1),
            );
            found.append(&mut lt_found);
            found.append(&mut gt_found);
        }
        (Some(child), None) | (None, Some(child)) => {
            let mut child_found = search(
                child,
                query_plus,
                query_minus,
                permutation,
                executor,
                depth + 1,
            );
            found.append(&mut child_found);
        }
        (None, None) => {}
    }
    found
}

/// Takes the value lists of the nodes inside the query box, pruning any
/// subtree the removal leaves dead. The returned status tells the caller
/// whether this node survived.
pub(crate) fn search_and_remove<V: Send>(
    node: &mut KdNode<V>,
    query_plus: &[i64],
    query_minus: &[i64],
    permutation: &[usize],
    executor: &Executor,
    depth: usize,
) -> (Vec<V>, Prune) {
    let p = permutation[depth];
    let inside = node.inside(query_plus, query_minus);
    let KdNode {
        tuple,
        values,
        lt,
        gt,
    } = node;

    let mut found = Vec::new();
    let mut own_status = Prune::Clean;
    if inside {
        found.append(values);
        own_status = Prune::Live;
    }

    // An absent child counts as dead for the combination below; a present
    // child that the bounds exclude counts as untouched.
    let lt_missing = lt.is_none();
    let gt_missing = gt.is_none();
    let lt_child = lt.as_deref_mut().filter(|_| query_minus[p] <= tuple[p]);
    let gt_child = gt.as_deref_mut().filter(|_| query_plus[p] >= tuple[p]);

    let (lt_walk, gt_walk) = match (lt_child, gt_child) {
        (Some(lt_child), Some(gt_child)) => {
            let (lt_walk, gt_walk) = executor.forked(
                depth,
                || {
                    search_and_remove(
                        lt_child,
                        query_plus,
                        query_minus,
                        permutation,
                        executor,
                        depth + 1,
                    )
                },
                || {
                    search_and_remove(
                        gt_child,
                        query_plus,
                        query_minus,
                        permutation,
                        executor,
                        depth + 1,
                    )
                },
            );
            (Some(lt_walk), Some(gt_walk))
        }
        (Some(lt_child), None) => (
            Some(search_and_remove(
                lt_child,
                query_plus,
                query_minus,
                permutation,
                executor,
                depth + 1,
            )),
            None,
        ),
        (None, Some(gt_child)) => (
            None,
            Some(search_and_remove(
                gt_child,
                query_plus,
                query_minus,
                permutation,
                executor,
                depth + 1,
            )),
        ),
        (None, None) => (None, None),
    };

    let lt_status = match lt_walk {
        Some((mut lt_found, status)) => {
            found.append(&mut lt_found);
            if status == Prune::Dead {
                *lt = None;
            }
            status
        }
        None if lt_missing => Prune::Dead,
        None => Prune::Clean,
    };
    let gt_status = match gt_walk {
        Some((mut gt_found, status)) => {
            found.append(&mut gt_found);
            if status == Prune::Dead {
                *gt = None;
            }
            status
        }
        None if gt_missing => Prune::Dead,
        None => Prune::Clean,
    };

    let status = match (lt_status, gt_status) {
        (Prune::Live, _) | (_, Prune::Live) => Prune::Live,
        (Prune::Dead, Prune::Dead) => {
            if values.is_empty() {
                Prune::Dead
            } else {
                Prune::Live
            }
        }
        _ => own_status,
    };
    (found, status)
}

/// Removes one occurrence of `value` at the exact key `query`, pruning the
/// descent path if the removal leaves it dead.
pub(crate) fn remove_value<V: PartialEq>(
    node: &mut KdNode<V>,
    query: &[i64],
    value: &V,
    permutation: &[usize],
    depth: usize,
) -> Prune {
    let p = permutation[depth];
    let mut status = Prune::Clean;
    match super_key_compare(query, &node.tuple, p) {
        Ordering::Less => {
            if let Some(child) = node.lt.as_deref_mut() {
                status = remove_value(child, query, value, permutation, depth + 1);
                if status == Prune::Dead {
                    node.lt = None;
                }
            }
        }
        Ordering::Greater => {
            if let Some(child) = node.gt.as_deref_mut() {
                status = remove_value(child, query, value, permutation, depth + 1);
                if status == Prune::Dead {
                    node.gt = None;
                }
            }
        }
        Ordering::Equal => {
            if let Some(at) = node.values.iter().position(|held| held == value) {
                node.values.remove(at);
                status = Prune::Dead;
            }
        }
    }
    // A removal happened here or below: report this node live if anything
    // still hangs off it, dead otherwise.
    if status == Prune::Dead
        && (!node.values.is_empty() || node.lt.is_some() || node.gt.is_some())
    {
        status = Prune::Live;
    }
    status
}

/// Descends by the selector bits until no chosen child remains, then takes
/// the last value of the reached node's list. With `remove` the list
/// shrinks and emptied paths are pruned; without it the value is copied
/// out. Returns `Clean` only when no live value was found.
pub(crate) fn pick_value<V: Clone>(
    node: &mut KdNode<V>,
    selector: u64,
    remove: bool,
    picked: &mut Option<(Box<[i64]>, V)>,
) -> Prune {
    let mut status = Prune::Clean;
    let go_gt = selector & 1 == 1;
    if (!go_gt || node.gt.is_none()) && node.lt.is_some() {
        if let Some(child) = node.lt.as_deref_mut() {
            status = pick_value(child, selector >> 1, remove, picked);
        }
        if remove && status == Prune::Dead {
            node.lt = None;
        }
    } else if (go_gt || node.lt.is_none()) && node.gt.is_some() {
        if let Some(child) = node.gt.as_deref_mut() {
            status = pick_value(child, selector >> 1, remove, picked);
        }
        if remove && status == Prune::Dead {
            node.gt = None;
        }
    } else if remove {
        if let Some(value) = node.values.pop() {
            *picked = Some((node.tuple.clone(), value));
            status = Prune::Dead;
        }
    } else if let Some(value) = node.values.last() {
        *picked = Some((node.tuple.clone(), value.clone()));
        status = Prune::Live;
    }

    if status == Prune::Dead
        && (!node.values.is_empty() || node.lt.is_some() || node.gt.is_some())
    {
        status = Prune::Live;
    }
    status
}
