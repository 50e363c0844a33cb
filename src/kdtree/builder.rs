//! Balanced bulk construction.
//!
//! One reference array per axis is sorted under the super-key order with
//! that axis as the most significant key. Duplicate tuples are collapsed
//! after the first sort. The build then recursively selects the median of
//! the axis-p array, partitions every other array about it in its a priori
//! sorted order (landing the result one array over, which cyclically
//! rotates the arrays' roles), and recurses on the two halves. Per level
//! this is Θ(n) partition work across the arrays, so no re-sorting is ever
//! needed. The recursion records child links; a sequential pass then moves
//! the seed material into owned nodes, and the finished tree is verified.

use std::cmp::Ordering;

use crate::error::{KdIndexError, Result};
use crate::kdtree::node::{super_key_compare, KdNode};
use crate::kdtree::pool::Executor;
use crate::kdtree::sort;

/// Child links recorded for one slot while the topology is built.
struct Link {
    slot: u32,
    lt: Option<u32>,
    gt: Option<u32>,
}

/// Builds a tree over the staged `(tuple, value)` pairs. Returns `None` for
/// an empty staging buffer.
pub(crate) fn build_tree<V: Clone + Send + Sync>(
    staged: &[(Box<[i64]>, V)],
    permutation: &[usize],
    executor: &Executor,
) -> Result<Option<Box<KdNode<V>>>> {
    if staged.is_empty() {
        return Ok(None);
    }
    let n = staged.len();
    let dimensions = staged[0].0.len();

    // Seed material keyed by slot id. Tuples are shared read-only by the
    // sorts and partitions; value lists are taken as nodes materialize.
    let keys: Vec<Box<[i64]>> = staged.iter().map(|(tuple, _)| tuple.clone()).collect();
    let mut values: Vec<Option<Vec<V>>> = staged
        .iter()
        .map(|(_, value)| Some(vec![value.clone()]))
        .collect();

    // Sort the first reference array with axis 0 as the most significant
    // key of the super key.
    let mut temporary: Vec<u32> = vec![0; n];
    let mut references: Vec<Vec<u32>> = Vec::with_capacity(dimensions);
    references.push((0..n as u32).collect());
    sort::merge_sort_reference_ascending(&mut references[0], &mut temporary, &keys, 0, executor, 0);

    // Collapse adjacent equal tuples into one slot carrying the merged
    // value list. Sort and dedup must agree on the most significant key.
    let end = remove_duplicates(&mut references[0], &keys, &mut values, 0)?;
    let count = end + 1;
    references[0].truncate(count);

    // Copy the de-duplicated region to one reference array per remaining
    // axis and sort each with its own axis as the most significant key.
    for axis in 1..dimensions {
        let mut reference = references[0].clone();
        sort::merge_sort_reference_ascending(
            &mut reference,
            &mut temporary[..count],
            &keys,
            axis,
            executor,
            0,
        );
        references.push(reference);
    }

    // Recursively partition the reference arrays to record the topology,
    // then materialize the owned nodes out of the seed slots.
    let mut links: Vec<Link> = Vec::with_capacity(count);
    let root_slot = {
        let arrays: Vec<&mut [u32]> = references.iter_mut().map(|r| r.as_mut_slice()).collect();
        build_subtree(
            arrays,
            &mut temporary[..count],
            &keys,
            permutation,
            executor,
            0,
            &mut links,
        )?
    };
    let mut children: Vec<[Option<u32>; 2]> = vec![[None, None]; n];
    for link in links {
        children[link.slot as usize] = [link.lt, link.gt];
    }
    let root = materialize(root_slot, &children, &keys, &mut values);

    // Re-check the partition invariant at every node of the finished tree.
    verify_subtree(&root, permutation, executor, 0)?;

    Ok(Some(root))
}

/// Checks the validity of the merge sort and collapses runs of references
/// to equal tuples, merging their value lists into the surviving slot.
/// Returns the index of the last survivor.
pub(crate) fn remove_duplicates<V>(
    reference: &mut [u32],
    keys: &[Box<[i64]>],
    values: &mut [Option<Vec<V>>],
    p: usize,
) -> Result<usize> {
    let mut end = 0usize;
    for i in 1..reference.len() {
        match sort::compare_slots(keys, reference[i], reference[i - 1], p) {
            Ordering::Less => {
                return Err(KdIndexError::SortInvariant(format!(
                    "reference[{i}] sorts below reference[{}] on axis {p}",
                    i - 1
                )))
            }
            Ordering::Greater => {
                end += 1;
                reference[end] = reference[i];
            }
            Ordering::Equal => {
                // Discard this reference and hand its value list to the
                // surviving slot.
                let merged = values[reference[i] as usize].take().unwrap_or_default();
                if let Some(list) = values[reference[end] as usize].as_mut() {
                    list.extend(merged);
                }
            }
        }
    }
    Ok(end)
}

/// Recursively partitions the reference arrays about the median of the
/// axis-p array, recording a link per node, and returns the subtree's root
/// slot. All arrays cover the same subrange of the point set; the < build
/// is submitted to the pool while the depth gate holds.
fn build_subtree(
    mut arrays: Vec<&mut [u32]>,
    scratch: &mut [u32],
    keys: &[Box<[i64]>],
    permutation: &[usize],
    executor: &Executor,
    depth: usize,
    links: &mut Vec<Link>,
) -> Result<u32> {
    let p = permutation[depth];
    let len = arrays[0].len();
    match len {
        0 => Err(KdIndexError::GeometryInvariant(format!(
            "empty subrange at depth {depth}"
        ))),
        1 => {
            // One reference: store it at this level of the tree.
            let slot = arrays[0][0];
            links.push(Link {
                slot,
                lt: None,
                gt: None,
            });
            Ok(slot)
        }
        2 => {
            // Two references in sorted order: the first is the node and the
            // second its > child.
            let slot = arrays[0][0];
            let gt = arrays[0][1];
            links.push(Link {
                slot: gt,
                lt: None,
                gt: None,
            });
            links.push(Link {
                slot,
                lt: None,
                gt: Some(gt),
            });
            Ok(slot)
        }
        3 => {
            // Three references in sorted order: the median is the node with
            // the outer two as its children.
            let slot = arrays[0][1];
            let lt = arrays[0][0];
            let gt = arrays[0][2];
            links.push(Link {
                slot: lt,
                lt: None,
                gt: None,
            });
            links.push(Link {
                slot: gt,
                lt: None,
                gt: None,
            });
            links.push(Link {
                slot,
                lt: Some(lt),
                gt: Some(gt),
            });
            Ok(slot)
        }
        _ => {
            // Four or more references: partition every other array about
            // the median element of the axis-p array. Avoid overflow when
            // calculating the median address.
            let median = (len - 1) >> 1;
            if median == 0 || median >= len - 1 {
                return Err(KdIndexError::GeometryInvariant(format!(
                    "median {median} outside its subrange of length {len} at depth {depth}"
                )));
            }
            let node_slot = arrays[0][median];

            // Set the axis-p order aside before the partition overwrites it.
            scratch.copy_from_slice(&arrays[0]);

            // Sweep each remaining array in its a priori sorted order and
            // split it into < and > halves by super-key comparison against
            // the median, landing the result one array over. The median's
            // own reference is skipped.
            for i in 1..arrays.len() {
                let (dst_half, src_half) = arrays.split_at_mut(i);
                let src: &[u32] = &src_half[0];
                let dst: &mut [u32] = &mut dst_half[i - 1];
                scan_and_partition_lower(src, dst, keys, node_slot, p, median);
                scan_and_partition_upper(src, dst, keys, node_slot, p, median);
            }

            // The set-aside axis-p order lands in the last array, which
            // completes the cyclic rotation; its median already splits it.
            let last = arrays.len() - 1;
            arrays[last].copy_from_slice(scratch);

            // Split every array and the scratch around the median and build
            // the two subtrees, submitting the < build while the gate holds.
            let mut lt_arrays = Vec::with_capacity(arrays.len());
            let mut gt_arrays = Vec::with_capacity(arrays.len());
            for array in arrays {
                let (lo, rest) = array.split_at_mut(median);
                lt_arrays.push(lo);
                gt_arrays.push(&mut rest[1..]);
            }
            let (scratch_lo, scratch_rest) = scratch.split_at_mut(median);
            let scratch_hi = &mut scratch_rest[1..];

            let parent_links: &mut Vec<Link> = &mut *links;
            let (lt_built, gt_built) = executor.forked(
                depth,
                || {
                    let mut lt_links = Vec::new();
                    build_subtree(
                        lt_arrays,
                        scratch_lo,
                        keys,
                        permutation,
                        executor,
                        depth + 1,
                        &mut lt_links,
                    )
                    .map(|slot| (slot, lt_links))
                },
                || {
                    build_subtree(
                        gt_arrays,
                        scratch_hi,
                        keys,
                        permutation,
                        executor,
                        depth + 1,
                        parent_links,
                    )
                },
            );
            let (lt_slot, mut lt_links) = lt_built?;
            let gt_slot = gt_built?;
            links.append(&mut lt_links);
            links.push(Link {
                slot: node_slot,
                lt: Some(lt_slot),
                gt: Some(gt_slot),
            });
            Ok(node_slot)
        }
    }
}

/// Scans the lower half of `src` in order, writing references below the
/// median's super key to the front of the < region and references above it
/// to the front of the > region.
fn scan_and_partition_lower(
    src: &[u32],
    dst: &mut [u32],
    keys: &[Box<[i64]>],
    node_slot: u32,
    p: usize,
    median: usize,
) {
    let node_key = &keys[node_slot as usize];
    let mut lower = 0usize;
    let mut upper = median + 1;
    for &slot in &src[..=median] {
        match super_key_compare(&keys[slot as usize], node_key, p) {
            Ordering::Less => {
                dst[lower] = slot;
                lower += 1;
            }
            Ordering::Greater => {
                dst[upper] = slot;
                upper += 1;
            }
            Ordering::Equal => {}
        }
    }
}

/// Scans the upper half of `src` in reverse order, writing references below
/// the median's super key to the back of the < region and references above
/// it to the back of the > region, so each region keeps `src`'s order.
fn scan_and_partition_upper(
    src: &[u32],
    dst: &mut [u32],
    keys: &[Box<[i64]>],
    node_slot: u32,
    p: usize,
    median: usize,
) {
    let node_key = &keys[node_slot as usize];
    let mut lower = median;
    let mut upper = src.len();
    for k in (median + 1..src.len()).rev() {
        let slot = src[k];
        match super_key_compare(&keys[slot as usize], node_key, p) {
            Ordering::Less => {
                lower -= 1;
                dst[lower] = slot;
            }
            Ordering::Greater => {
                upper -= 1;
                dst[upper] = slot;
            }
            Ordering::Equal => {}
        }
    }
}

/// Moves the seed material of `slot` and its recorded descendants into an
/// owned subtree.
fn materialize<V>(
    slot: u32,
    children: &[[Option<u32>; 2]],
    keys: &[Box<[i64]>],
    values: &mut [Option<Vec<V>>],
) -> Box<KdNode<V>> {
    let [lt, gt] = children[slot as usize];
    Box::new(KdNode {
        tuple: keys[slot as usize].clone(),
        values: values[slot as usize].take().unwrap_or_default(),
        lt: lt.map(|child| materialize(child, children, keys, values)),
        gt: gt.map(|child| materialize(child, children, keys, values)),
    })
}

/// Checks that the children of every node are correctly sorted relative to
/// that node and returns the number of nodes in the subtree.
pub(crate) fn verify_subtree<V: Sync>(
    node: &KdNode<V>,
    permutation: &[usize],
    executor: &Executor,
    depth: usize,
) -> Result<usize> {
    let p = permutation[depth];
    if let Some(lt) = node.lt.as_deref() {
        if lt.tuple[p] > node.tuple[p] {
            return Err(KdIndexError::GeometryInvariant(format!(
                "< child sorts above its parent on axis {p}"
            )));
        }
        if super_key_compare(&lt.tuple, &node.tuple, p) != Ordering::Less {
            return Err(KdIndexError::GeometryInvariant(format!(
                "< child's super key is not below its parent's on axis {p}"
            )));
        }
    }
    if let Some(gt) = node.gt.as_deref() {
        if gt.tuple[p] < node.tuple[p] {
            return Err(KdIndexError::GeometryInvariant(format!(
                "> child sorts below its parent on axis {p}"
            )));
        }
        if super_key_compare(&gt.tuple, &node.tuple, p) != Ordering::Greater {
            return Err(KdIndexError::GeometryInvariant(format!(
                "> child's super key is not above its parent's on axis {p}"
            )));
        }
    }
    let (lt_count, gt_count) = executor.forked(
        depth,
        || {
            node.lt
                .as_deref()
                .map(|child| verify_subtree(child, permutation, executor, depth + 1))
                .transpose()
        },
        || {
            node.gt
                .as_deref()
                .map(|child| verify_subtree(child, permutation, executor, depth + 1))
                .transpose()
        },
    );
    Ok(1 + lt_count?.unwrap_or(0) + gt_count?.unwrap_or(0))
}
