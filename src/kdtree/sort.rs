//! Merge sort of reference arrays under the super-key order.
//!
//! Four variants, {result in reference, result in temporary} crossed with
//! {ascending, descending}, cooperate so that sibling recursions deliver
//! opposite-direction runs into the same buffer. The parent merges one ascending
//! run and one descending run, reading the lower run from its low address
//! upward and the upper run from its high address downward, which removes
//! the exhaustion test from the merge loop (Sedgewick's auxiliary-array
//! inversion). Below the cutoff each variant switches to a distinct
//! insertion sort that honors the same buffer-and-direction contract.
//!
//! While the submit gate holds, the lower-half recursion is forked to the
//! pool and the upper half runs on the calling thread; after the join the
//! two output halves of the merge are filled the same way. Parallel halves
//! only ever touch disjoint splits of the output buffer.

use std::cmp::Ordering;

use crate::kdtree::node::super_key_compare;
use crate::kdtree::pool::Executor;

pub(crate) const INSERTION_SORT_CUTOFF: usize = 15;

/// Super-key comparison of two slots of a reference array.
#[inline]
pub(crate) fn compare_slots(keys: &[Box<[i64]>], a: u32, b: u32, p: usize) -> Ordering {
    super_key_compare(&keys[a as usize], &keys[b as usize], p)
}

/// Sorts `reference` in ascending order, leaving the result in `reference`.
pub(crate) fn merge_sort_reference_ascending(
    reference: &mut [u32],
    temporary: &mut [u32],
    keys: &[Box<[i64]>],
    p: usize,
    executor: &Executor,
    depth: usize,
) {
    let len = reference.len();
    if len > INSERTION_SORT_CUTOFF + 1 {
        // Avoid overflow when calculating the median address.
        let mid = (len - 1) >> 1;

        if !executor.should_fork(depth) {
            // Subdivide the lower half, delivering its result in the
            // temporary array in ascending order, then the upper half,
            // delivering its result in descending order.
            let (r_lo, r_hi) = reference.split_at_mut(mid + 1);
            let (t_lo, t_hi) = temporary.split_at_mut(mid + 1);
            merge_sort_temporary_ascending(r_lo, t_lo, keys, p, executor, depth + 1);
            merge_sort_temporary_descending(r_hi, t_hi, keys, p, executor, depth + 1);

            // Merge the two runs from the temporary array into the
            // reference array in ascending order.
            let mut i = 0isize;
            let mut j = (len - 1) as isize;
            for k in 0..len {
                let (lo, hi) = (temporary[i as usize], temporary[j as usize]);
                reference[k] = if compare_slots(keys, lo, hi, p) == Ordering::Less {
                    i += 1;
                    lo
                } else {
                    j -= 1;
                    hi
                };
            }
        } else {
            {
                let (r_lo, r_hi) = reference.split_at_mut(mid + 1);
                let (t_lo, t_hi) = temporary.split_at_mut(mid + 1);
                executor.forked(
                    depth,
                    || merge_sort_temporary_ascending(r_lo, t_lo, keys, p, executor, depth + 1),
                    || merge_sort_temporary_descending(r_hi, t_hi, keys, p, executor, depth + 1),
                );
            }

            // Fill the lower half of the reference array with a submitted
            // task and the upper half on this thread at the same time; the
            // two halves write disjoint splits of the output.
            let (r_lo, r_hi) = reference.split_at_mut(mid + 1);
            let tmp: &[u32] = temporary;
            executor.forked(
                depth,
                || merge_results_ascending(r_lo, tmp, keys, p),
                || {
                    let mut i = mid as isize;
                    let mut j = mid as isize + 1;
                    for k in (0..r_hi.len()).rev() {
                        let (lo, hi) = (tmp[i as usize], tmp[j as usize]);
                        r_hi[k] = if compare_slots(keys, lo, hi, p) == Ordering::Greater {
                            i -= 1;
                            lo
                        } else {
                            j += 1;
                            hi
                        };
                    }
                },
            );
        }
    } else {
        // Insertion sort in ascending order, in place.
        for i in 1..len {
            let slot = reference[i];
            let mut j = i;
            while j > 0 && compare_slots(keys, reference[j - 1], slot, p) == Ordering::Greater {
                reference[j] = reference[j - 1];
                j -= 1;
            }
            reference[j] = slot;
        }
    }
}

/// Sorts `reference` in descending order, leaving the result in `reference`.
pub(crate) fn merge_sort_reference_descending(
    reference: &mut [u32],
    temporary: &mut [u32],
    keys: &[Box<[i64]>],
    p: usize,
    executor: &Executor,
    depth: usize,
) {
    let len = reference.len();
    if len > INSERTION_SORT_CUTOFF + 1 {
        // Avoid overflow when calculating the median address.
        let mid = (len - 1) >> 1;

        if !executor.should_fork(depth) {
            let (r_lo, r_hi) = reference.split_at_mut(mid + 1);
            let (t_lo, t_hi) = temporary.split_at_mut(mid + 1);
            merge_sort_temporary_descending(r_lo, t_lo, keys, p, executor, depth + 1);
            merge_sort_temporary_ascending(r_hi, t_hi, keys, p, executor, depth + 1);

            // Merge the two runs from the temporary array into the
            // reference array in descending order.
            let mut i = 0isize;
            let mut j = (len - 1) as isize;
            for k in 0..len {
                let (lo, hi) = (temporary[i as usize], temporary[j as usize]);
                reference[k] = if compare_slots(keys, lo, hi, p) == Ordering::Greater {
                    i += 1;
                    lo
                } else {
                    j -= 1;
                    hi
                };
            }
        } else {
            {
                let (r_lo, r_hi) = reference.split_at_mut(mid + 1);
                let (t_lo, t_hi) = temporary.split_at_mut(mid + 1);
                executor.forked(
                    depth,
                    || merge_sort_temporary_descending(r_lo, t_lo, keys, p, executor, depth + 1),
                    || merge_sort_temporary_ascending(r_hi, t_hi, keys, p, executor, depth + 1),
                );
            }

            let (r_lo, r_hi) = reference.split_at_mut(mid + 1);
            let tmp: &[u32] = temporary;
            executor.forked(
                depth,
                || merge_results_descending(r_lo, tmp, keys, p),
                || {
                    let mut i = mid as isize;
                    let mut j = mid as isize + 1;
                    for k in (0..r_hi.len()).rev() {
                        let (lo, hi) = (tmp[i as usize], tmp[j as usize]);
                        r_hi[k] = if compare_slots(keys, lo, hi, p) == Ordering::Less {
                            i -= 1;
                            lo
                        } else {
                            j += 1;
                            hi
                        };
                    }
                },
            );
        }
    } else {
        // Insertion sort in descending order, in place.
        for i in 1..len {
            let slot = reference[i];
            let mut j = i;
            while j > 0 && compare_slots(keys, reference[j - 1], slot, p) == Ordering::Less {
                reference[j] = reference[j - 1];
                j -= 1;
            }
            reference[j] = slot;
        }
    }
}

/// Sorts `reference` in ascending order, leaving the result in `temporary`.
pub(crate) fn merge_sort_temporary_ascending(
    reference: &mut [u32],
    temporary: &mut [u32],
    keys: &[Box<[i64]>],
    p: usize,
    executor: &Executor,
    depth: usize,
) {
    let len = reference.len();
    if len > INSERTION_SORT_CUTOFF + 1 {
        // Avoid overflow when calculating the median address.
        let mid = (len - 1) >> 1;

        if !executor.should_fork(depth) {
            let (r_lo, r_hi) = reference.split_at_mut(mid + 1);
            let (t_lo, t_hi) = temporary.split_at_mut(mid + 1);
            merge_sort_reference_ascending(r_lo, t_lo, keys, p, executor, depth + 1);
            merge_sort_reference_descending(r_hi, t_hi, keys, p, executor, depth + 1);

            // Merge the two runs from the reference array into the
            // temporary array in ascending order.
            let mut i = 0isize;
            let mut j = (len - 1) as isize;
            for k in 0..len {
                let (lo, hi) = (reference[i as usize], reference[j as usize]);
                temporary[k] = if compare_slots(keys, lo, hi, p) == Ordering::Less {
                    i += 1;
                    lo
                } else {
                    j -= 1;
                    hi
                };
            }
        } else {
            {
                let (r_lo, r_hi) = reference.split_at_mut(mid + 1);
                let (t_lo, t_hi) = temporary.split_at_mut(mid + 1);
                executor.forked(
                    depth,
                    || merge_sort_reference_ascending(r_lo, t_lo, keys, p, executor, depth + 1),
                    || merge_sort_reference_descending(r_hi, t_hi, keys, p, executor, depth + 1),
                );
            }

            let (t_lo, t_hi) = temporary.split_at_mut(mid + 1);
            let src: &[u32] = reference;
            executor.forked(
                depth,
                || merge_results_ascending(t_lo, src, keys, p),
                || {
                    let mut i = mid as isize;
                    let mut j = mid as isize + 1;
                    for k in (0..t_hi.len()).rev() {
                        let (lo, hi) = (src[i as usize], src[j as usize]);
                        t_hi[k] = if compare_slots(keys, lo, hi, p) == Ordering::Greater {
                            i -= 1;
                            lo
                        } else {
                            j += 1;
                            hi
                        };
                    }
                },
            );
        }
    } else if len > 0 {
        // This insertion sort reads from the reference array and leaves the
        // result in the temporary array in ascending order.
        let high = len - 1;
        temporary[high] = reference[high];
        for j in (0..high).rev() {
            let mut i = j;
            while i < high && compare_slots(keys, reference[j], temporary[i + 1], p) == Ordering::Greater
            {
                temporary[i] = temporary[i + 1];
                i += 1;
            }
            temporary[i] = reference[j];
        }
    }
}

/// Sorts `reference` in descending order, leaving the result in `temporary`.
pub(crate) fn merge_sort_temporary_descending(
    reference: &mut [u32],
    temporary: &mut [u32],
    keys: &[Box<[i64]>],
    p: usize,
    executor: &Executor,
    depth: usize,
) {
    let len = reference.len();
    if len > INSERTION_SORT_CUTOFF + 1 {
        // Avoid overflow when calculating the median address.
        let mid = (len - 1) >> 1;

        if !executor.should_fork(depth) {
            let (r_lo, r_hi) = reference.split_at_mut(mid + 1);
            let (t_lo, t_hi) = temporary.split_at_mut(mid + 1);
            merge_sort_reference_descending(r_lo, t_lo, keys, p, executor, depth + 1);
            merge_sort_reference_ascending(r_hi, t_hi, keys, p, executor, depth + 1);

            // Merge the two runs from the reference array into the
            // temporary array in descending order.
            let mut i = 0isize;
            let mut j = (len - 1) as isize;
            for k in 0..len {
                let (lo, hi) = (reference[i as usize], reference[j as usize]);
                temporary[k] = if compare_slots(keys, lo, hi, p) == Ordering::Greater {
                    i += 1;
                    lo
                } else {
                    j -= 1;
                    hi
                };
            }
        } else {
            {
                let (r_lo, r_hi) = reference.split_at_mut(mid + 1);
                let (t_lo, t_hi) = temporary.split_at_mut(mid + 1);
                executor.forked(
                    depth,
                    || merge_sort_reference_descending(r_lo, t_lo, keys, p, executor, depth + 1),
                    || merge_sort_reference_ascending(r_hi, t_hi, keys, p, executor, depth + 1),
                );
            }

            let (t_lo, t_hi) = temporary.split_at_mut(mid + 1);
            let src: &[u32] = reference;
            executor.forked(
                depth,
                || merge_results_descending(t_lo, src, keys, p),
                || {
                    let mut i = mid as isize;
                    let mut j = mid as isize + 1;
                    for k in (0..t_hi.len()).rev() {
                        let (lo, hi) = (src[i as usize], src[j as usize]);
                        t_hi[k] = if compare_slots(keys, lo, hi, p) == Ordering::Less {
                            i -= 1;
                            lo
                        } else {
                            j += 1;
                            hi
                        };
                    }
                },
            );
        }
    } else if len > 0 {
        // This insertion sort reads from the reference array and leaves the
        // result in the temporary array in descending order.
        let high = len - 1;
        temporary[high] = reference[high];
        for j in (0..high).rev() {
            let mut i = j;
            while i < high && compare_slots(keys, reference[j], temporary[i + 1], p) == Ordering::Less {
                temporary[i] = temporary[i + 1];
                i += 1;
            }
            temporary[i] = reference[j];
        }
    }
}

/// Merges the ascending lower run and descending upper run of `src` into
/// `dst`, the lower half of the output, in ascending order. The upper half
/// of the output is filled concurrently by the caller; neither side needs an
/// exhaustion test because the upper output half is never larger than the
/// lower.
fn merge_results_ascending(dst: &mut [u32], src: &[u32], keys: &[Box<[i64]>], p: usize) {
    let mut i = 0usize;
    let mut j = src.len() - 1;
    for k in 0..dst.len() {
        let (lo, hi) = (src[i], src[j]);
        dst[k] = if compare_slots(keys, lo, hi, p) != Ordering::Greater {
            i += 1;
            lo
        } else {
            j -= 1;
            hi
        };
    }
}

/// Merges the descending lower run and ascending upper run of `src` into
/// `dst`, the lower half of the output, in descending order.
fn merge_results_descending(dst: &mut [u32], src: &[u32], keys: &[Box<[i64]>], p: usize) {
    let mut i = 0usize;
    let mut j = src.len() - 1;
    for k in 0..dst.len() {
        let (lo, hi) = (src[i], src[j]);
        dst[k] = if compare_slots(keys, lo, hi, p) != Ordering::Less {
            i += 1;
            lo
        } else {
            j -= 1;
            hi
        };
    }
}
