use criterion::{black_box, criterion_group, criterion_main, Criterion};

use ringcache::cache::{ByteView, EvictionCache, GuardedCache, PolicyKind};
use ringcache::ring::{crc32, HashRing};

fn cache_benchmarks(c: &mut Criterion) {
    for policy in [PolicyKind::Lru, PolicyKind::Fifo, PolicyKind::Lfu] {
        c.bench_function(&format!("{} put with eviction", policy), |b| {
            let mut cache = EvictionCache::new(64 * 1024, policy);
            let mut i = 0u64;
            b.iter(|| {
                i += 1;
                cache.put(format!("key-{}", i % 10_000), "x".repeat(32));
            });
            black_box(cache.len());
        });

        c.bench_function(&format!("{} get", policy), |b| {
            let mut cache = EvictionCache::new(0, policy);
            for i in 0..10_000 {
                cache.put(format!("key-{}", i), format!("value-{}", i));
            }
            let mut i = 0u64;
            b.iter(|| {
                i += 1;
                black_box(cache.get(&format!("key-{}", i % 10_000)));
            });
        });
    }

    c.bench_function("guarded add and get", |b| {
        let cache = GuardedCache::new(1024 * 1024, PolicyKind::Lru);
        let value = ByteView::from("630");
        b.iter(|| {
            cache.add("Tom", value.clone());
            black_box(cache.get("Tom"));
        });
    });
}

fn ring_benchmarks(c: &mut Criterion) {
    c.bench_function("crc32 of a short key", |b| {
        b.iter(|| black_box(crc32(black_box(b"user-4711"))))
    });

    c.bench_function("ring lookup (10 nodes, 50 replicas)", |b| {
        let nodes: Vec<String> = (1..=10)
            .map(|i| format!("http://10.0.0.{}:8001", i))
            .collect();
        let mut ring = HashRing::new(50, None);
        ring.add(&nodes[..]);

        let mut i = 0u64;
        b.iter(|| {
            i += 1;
            black_box(ring.get(&format!("user-{}", i)).is_some());
        });
    });

    c.bench_function("ring rebuild (10 nodes, 50 replicas)", |b| {
        let nodes: Vec<String> = (1..=10)
            .map(|i| format!("http://10.0.0.{}:8001", i))
            .collect();
        b.iter(|| {
            let mut ring = HashRing::new(50, None);
            ring.add(&nodes[..]);
            black_box(ring.len());
        });
    });
}

criterion_group!(benches, cache_benchmarks, ring_benchmarks);
criterion_main!(benches);
