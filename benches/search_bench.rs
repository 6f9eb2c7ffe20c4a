//! Search latency benchmarks.
//!
//! Run with: `cargo bench --bench search_bench`

use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use proxima::pager::MemPager;
use proxima::{HnswConfig, HnswIndex, PagedHnswIndex, Vector, VectorIndex};
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use std::hint::black_box;

const DIMS: usize = 64;

fn generate_vectors(count: usize, seed: u64) -> Vec<Vector> {
    let mut rng = ChaCha8Rng::seed_from_u64(seed);
    (0..count)
        .map(|_| {
            let raw: Vec<f32> = (0..DIMS).map(|_| rng.gen_range(-1.0..1.0)).collect();
            let mut v = Vector::new(&raw);
            v.normalize();
            v
        })
        .collect()
}

fn bench_search_latency(c: &mut Criterion) {
    let k = 10;
    let mut group = c.benchmark_group("search_latency");

    for count in [1_000usize, 10_000] {
        let vectors = generate_vectors(count, 42);
        let index = HnswIndex::new(DIMS as u32);
        for (i, v) in vectors.iter().enumerate() {
            index.insert(i as i64, v.clone()).unwrap();
        }
        let query = &vectors[0];

        group.throughput(Throughput::Elements(1));
        group.bench_with_input(BenchmarkId::from_parameter(count), &count, |b, _| {
            b.iter(|| black_box(index.search_knn(black_box(query), k).unwrap()));
        });
    }
    group.finish();
}

fn bench_paged_search(c: &mut Criterion) {
    let k = 10;
    let vectors = generate_vectors(1_000, 42);
    let index = PagedHnswIndex::create(MemPager::new(16 * 1024), HnswConfig::new(DIMS as u32))
        .expect("create paged index");
    for (i, v) in vectors.iter().enumerate() {
        index.insert(i as i64, v.clone()).unwrap();
    }
    let query = &vectors[0];

    c.bench_function("paged_search_1k", |b| {
        b.iter(|| black_box(index.search_knn(black_box(query), k).unwrap()));
    });
}

criterion_group!(benches, bench_search_latency, bench_paged_search);
criterion_main!(benches);
