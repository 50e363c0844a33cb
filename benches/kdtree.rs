use criterion::{criterion_group, criterion_main, Criterion};
use kd_index::KDTree;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

const NUM_POINTS: usize = 100_000;
const DIMENSIONS: usize = 4;

fn random_points(count: usize, seed: u64) -> Vec<Vec<i64>> {
    let mut rng = StdRng::seed_from_u64(seed);
    (0..count)
        .map(|_| {
            (0..DIMENSIONS)
                .map(|_| rng.gen_range(-1_000_000..1_000_000))
                .collect()
        })
        .collect()
}

fn construct(points: &[Vec<i64>], num_threads: usize) -> KDTree<usize> {
    let mut tree = KDTree::new(points.len(), DIMENSIONS);
    tree.set_num_threads(num_threads).unwrap();
    for (i, point) in points.iter().enumerate() {
        tree.add(point, i).unwrap();
    }
    tree.build().unwrap();
    tree
}

pub fn criterion_benchmark(c: &mut Criterion) {
    let points = random_points(NUM_POINTS, 42);

    c.bench_function("construction (sequential)", |b| {
        b.iter(|| construct(&points, 1))
    });

    c.bench_function("construction (8 threads)", |b| {
        b.iter(|| construct(&points, 8))
    });

    let mut sequential = construct(&points, 1);
    let mut threaded = construct(&points, 8);
    let query = [0i64, 0, 0, 0];
    let cutoff = 250_000;

    let found = sequential.search(&query, cutoff).unwrap();
    println!("search() results in {} items", found.len());

    c.bench_function("search (sequential)", |b| {
        b.iter(|| sequential.search(&query, cutoff).unwrap())
    });

    c.bench_function("search (8 threads)", |b| {
        b.iter(|| threaded.search(&query, cutoff).unwrap())
    });

    c.bench_function("nearest neighbors (k = 100)", |b| {
        b.iter(|| sequential.nearest_neighbors(&query, 100).unwrap())
    });
}

criterion_group!(benches, criterion_benchmark);
criterion_main!(benches);
