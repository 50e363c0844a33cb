use std::cmp::Ordering;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::kdtree::builder;
use crate::kdtree::neighbors::NeighborHeap;
use crate::kdtree::node::{super_key_compare, KdNode};
use crate::kdtree::pool::Executor;
use crate::kdtree::sort;

fn random_keys(count: usize, dimensions: usize, seed: u64) -> Vec<Box<[i64]>> {
    let mut rng = StdRng::seed_from_u64(seed);
    (0..count)
        .map(|_| (0..dimensions).map(|_| rng.gen_range(-50..50)).collect())
        .collect()
}

fn leaf(tuple: &[i64], values: Vec<u32>) -> KdNode<u32> {
    KdNode {
        tuple: tuple.into(),
        values,
        lt: None,
        gt: None,
    }
}

fn assert_sorted_ascending(reference: &[u32], keys: &[Box<[i64]>], p: usize) {
    for pair in reference.windows(2) {
        assert_ne!(
            sort::compare_slots(keys, pair[1], pair[0], p),
            Ordering::Less,
            "adjacent keys out of ascending order on axis {p}"
        );
    }
}

fn assert_sorted_descending(reference: &[u32], keys: &[Box<[i64]>], p: usize) {
    for pair in reference.windows(2) {
        assert_ne!(
            sort::compare_slots(keys, pair[1], pair[0], p),
            Ordering::Greater,
            "adjacent keys out of descending order on axis {p}"
        );
    }
}

#[test]
fn super_key_orders_on_most_significant_axis_first() {
    assert_eq!(super_key_compare(&[1, 9], &[2, 0], 0), Ordering::Less);
    assert_eq!(super_key_compare(&[1, 9], &[2, 0], 1), Ordering::Greater);
    assert_eq!(super_key_compare(&[3, 3], &[3, 3], 0), Ordering::Equal);
}

#[test]
fn super_key_breaks_ties_cyclically() {
    // Equal on axis 1, so the order is decided by axis 2, then axis 0.
    assert_eq!(super_key_compare(&[9, 5, 1], &[0, 5, 2], 1), Ordering::Less);
    assert_eq!(super_key_compare(&[9, 5, 1], &[0, 5, 1], 1), Ordering::Greater);
}

#[test]
fn super_key_survives_extreme_values() {
    // A subtract-based compare would overflow here; the 3-way compare must
    // keep the sign.
    assert_eq!(
        super_key_compare(&[i64::MIN], &[i64::MAX], 0),
        Ordering::Less
    );
    assert_eq!(
        super_key_compare(&[i64::MAX, 0], &[i64::MIN, 0], 0),
        Ordering::Greater
    );
}

#[test]
fn merge_sort_all_variants_sort_both_leaf_and_recursive_sizes() {
    let executor = Executor::sequential();
    for &count in &[1usize, 2, 10, 16, 17, 100, 500] {
        let keys = random_keys(count, 3, count as u64);
        for p in 0..3 {
            let mut reference: Vec<u32> = (0..count as u32).collect();
            let mut temporary: Vec<u32> = vec![0; count];
            sort::merge_sort_reference_ascending(
                &mut reference,
                &mut temporary,
                &keys,
                p,
                &executor,
                0,
            );
            assert_sorted_ascending(&reference, &keys, p);

            let mut reference: Vec<u32> = (0..count as u32).collect();
            sort::merge_sort_reference_descending(
                &mut reference,
                &mut temporary,
                &keys,
                p,
                &executor,
                0,
            );
            assert_sorted_descending(&reference, &keys, p);

            let mut reference: Vec<u32> = (0..count as u32).collect();
            sort::merge_sort_temporary_ascending(
                &mut reference,
                &mut temporary,
                &keys,
                p,
                &executor,
                0,
            );
            assert_sorted_ascending(&temporary, &keys, p);

            let mut reference: Vec<u32> = (0..count as u32).collect();
            sort::merge_sort_temporary_descending(
                &mut reference,
                &mut temporary,
                &keys,
                p,
                &executor,
                0,
            );
            assert_sorted_descending(&temporary, &keys, p);
        }
    }
}

#[test]
fn merge_sort_under_a_pool_is_a_permutation_in_order() {
    let executor = Executor::with_threads(8).unwrap();
    let count = 3000;
    let keys = random_keys(count, 4, 7);
    let mut reference: Vec<u32> = (0..count as u32).collect();
    let mut temporary: Vec<u32> = vec![0; count];
    sort::merge_sort_reference_ascending(&mut reference, &mut temporary, &keys, 0, &executor, 0);
    assert_sorted_ascending(&reference, &keys, 0);

    // Every slot id is still present exactly once.
    let mut slots = reference.clone();
    slots.sort_unstable();
    let expected: Vec<u32> = (0..count as u32).collect();
    assert_eq!(slots, expected);
}

#[test]
fn remove_duplicates_merges_value_lists() {
    let keys: Vec<Box<[i64]>> = vec![
        vec![0, 0].into(),
        vec![0, 0].into(),
        vec![1, 0].into(),
        vec![1, 0].into(),
        vec![2, 5].into(),
    ];
    let mut values: Vec<Option<Vec<u32>>> = (0..5).map(|slot| Some(vec![slot])).collect();
    let mut reference: Vec<u32> = vec![0, 1, 2, 3, 4];
    let end = builder::remove_duplicates(&mut reference, &keys, &mut values, 0).unwrap();
    assert_eq!(end, 2);
    assert_eq!(&reference[..=end], &[0, 2, 4]);
    assert_eq!(values[0], Some(vec![0, 1]));
    assert_eq!(values[1], None);
    assert_eq!(values[2], Some(vec![2, 3]));
    assert_eq!(values[4], Some(vec![4]));
}

#[test]
fn remove_duplicates_rejects_unsorted_input() {
    let keys: Vec<Box<[i64]>> = vec![vec![5].into(), vec![3].into()];
    let mut values: Vec<Option<Vec<u32>>> = vec![Some(vec![0]), Some(vec![1])];
    let mut reference: Vec<u32> = vec![0, 1];
    let result = builder::remove_duplicates(&mut reference, &keys, &mut values, 0);
    assert!(matches!(
        result,
        Err(crate::error::KdIndexError::SortInvariant(_))
    ));
}

#[test]
fn heap_admits_until_full_then_keeps_the_closest() {
    let near = leaf(&[1, 0], vec![1]);
    let mid = leaf(&[5, 0], vec![2]);
    let far = leaf(&[9, 0], vec![3]);
    let mut heap = NeighborHeap::new(&[0, 0], 2, &[true, true]);
    heap.add(&far);
    heap.add(&mid);
    // The heap is full; a farther node must not displace anything...
    let farther = leaf(&[20, 0], vec![4]);
    heap.add(&farther);
    // ...but a closer one displaces the current farthest.
    heap.add(&near);

    let mut values = Vec::new();
    while let Some((_, node)) = heap.remove_top() {
        values.extend(node.values.iter().copied());
    }
    values.sort_unstable();
    assert_eq!(values, vec![1, 2]);
}

#[test]
fn heap_skips_nodes_without_values() {
    let dead = leaf(&[0, 0], vec![]);
    let live = leaf(&[9, 9], vec![7]);
    let mut heap = NeighborHeap::new(&[0, 0], 1, &[true, true]);
    heap.add(&dead);
    heap.add(&live);
    let (_, found) = heap.remove_top().unwrap();
    assert_eq!(found.values, vec![7]);
    assert!(heap.remove_top().is_none());
}

#[test]
fn heap_drains_farthest_first() {
    let mut rng = StdRng::seed_from_u64(99);
    let nodes: Vec<KdNode<u32>> = (0..40)
        .map(|i| leaf(&[rng.gen_range(-100..100), rng.gen_range(-100..100)], vec![i]))
        .collect();
    let mut heap = NeighborHeap::new(&[0, 0], 10, &[true, true]);
    for node in &nodes {
        heap.add(node);
    }
    let mut previous = i64::MAX;
    let mut drained = 0;
    while let Some((dist, _)) = heap.remove_top() {
        assert!(dist <= previous, "distances must drain in non-increasing order");
        previous = dist;
        drained += 1;
    }
    assert_eq!(drained, 10);
}

#[test]
fn heap_distance_ignores_disabled_axes() {
    let node = leaf(&[3, 1000], vec![1]);
    let mut masked = NeighborHeap::new(&[0, 0], 1, &[true, false]);
    masked.add(&node);
    let (dist, _) = masked.remove_top().unwrap();
    assert_eq!(dist, 3);

    let mut unmasked = NeighborHeap::new(&[0, 0], 1, &[true, true]);
    unmasked.add(&node);
    let (dist, _) = unmasked.remove_top().unwrap();
    assert_eq!(dist, 1000); // floor of sqrt(9 + 1000000)
}
