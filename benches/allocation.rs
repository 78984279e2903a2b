use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use slotstore::BitMap;
use std::sync::Arc;

/// Claim every slot of a fresh bitmap
fn bench_claim_all(c: &mut Criterion) {
    let mut group = c.benchmark_group("claim_all");

    for size in [1_000usize, 100_000, 1 << 20].iter() {
        group.bench_with_input(BenchmarkId::from_parameter(size), size, |b, &size| {
            b.iter(|| {
                let map = BitMap::new(size);
                while let Some(i) = map.find_vacant_and_set() {
                    black_box(i);
                }
            });
        });
    }

    group.finish();
}

/// Free every other slot, then claim them back (hint moves backwards)
fn bench_free_reclaim_cycle(c: &mut Criterion) {
    let mut group = c.benchmark_group("free_reclaim_cycle");

    group.bench_function("bitmap_100k", |b| {
        let map = BitMap::new(100_000);
        while map.find_vacant_and_set().is_some() {}

        b.iter(|| {
            for i in (0..100_000).step_by(2) {
                map.set(i, false);
            }
            for _ in 0..50_000 {
                black_box(map.find_vacant_and_set());
            }
        });
    });

    group.finish();
}

/// Lock-free toggles from several threads on a shared bitmap
fn bench_concurrent_set(c: &mut Criterion) {
    let mut group = c.benchmark_group("concurrent_set");

    for threads in [1usize, 4, 8].iter() {
        group.bench_with_input(
            BenchmarkId::from_parameter(threads),
            threads,
            |b, &threads| {
                let map = Arc::new(BitMap::new(1 << 16));
                b.iter(|| {
                    let handles: Vec<_> = (0..threads)
                        .map(|t| {
                            let map = Arc::clone(&map);
                            std::thread::spawn(move || {
                                for i in (t..(1 << 16)).step_by(threads) {
                                    map.set(i, true);
                                    map.set(i, false);
                                }
                            })
                        })
                        .collect();
                    for h in handles {
                        h.join().unwrap();
                    }
                });
            },
        );
    }

    group.finish();
}

criterion_group!(
    benches,
    bench_claim_all,
    bench_free_reclaim_cycle,
    bench_concurrent_set
);
criterion_main!(benches);
