// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! Measures what each layer adds to a cache hit over the bare in-memory store.

#![allow(missing_docs, reason = "benchmark harness")]

use std::{hint::black_box, time::Instant};

use criterion::{Criterion, criterion_group, criterion_main};
use futures::executor::block_on;
use strata::{
    CacheTier, CoalescingCache, InMemoryCacheBuilder, SetOptions, SwrCache, SwrEnvelope, TagRecord, TaggedCache, Tier,
    TieredCache,
};
use tick::Clock;

/// Seeds `cache` with one entry, then times `iters` hits on it.
fn time_hits<C>(cache: &C, iters: u64) -> std::time::Duration
where
    C: CacheTier<String, String>,
{
    let key = "key".to_string();
    let options = SetOptions::new().with_tags(["bench"]);
    block_on(cache.set(&key, "value".to_string(), &options)).expect("seed failed");

    let start = Instant::now();
    for _ in 0..iters {
        let _ = black_box(block_on(cache.get(black_box(&key))));
    }
    start.elapsed()
}

fn bench_layer_overhead(c: &mut Criterion) {
    let mut group = c.benchmark_group("hit_overhead");

    group.bench_function("memory", |b| {
        b.iter_custom(|iters| time_hits(&InMemoryCacheBuilder::<String, String>::new().build(), iters));
    });

    group.bench_function("coalescing", |b| {
        b.iter_custom(|iters| {
            time_hits(&CoalescingCache::new(InMemoryCacheBuilder::<String, String>::new().build()), iters)
        });
    });

    group.bench_function("swr", |b| {
        b.iter_custom(|iters| {
            let cache = SwrCache::builder(
                InMemoryCacheBuilder::<String, SwrEnvelope<String>>::new().build(),
                Clock::new_frozen(),
            )
            .build();
            time_hits(&cache, iters)
        });
    });

    group.bench_function("tiered_hot_hit", |b| {
        b.iter_custom(|iters| {
            let cache = TieredCache::new(vec![
                Tier::new(InMemoryCacheBuilder::<String, String>::new().build()),
                Tier::new(InMemoryCacheBuilder::<String, String>::new().build()),
            ])
            .expect("valid tiers");
            time_hits(&cache, iters)
        });
    });

    group.bench_function("tagged", |b| {
        b.iter_custom(|iters| {
            let cache = TaggedCache::new(
                InMemoryCacheBuilder::<String, TagRecord<String>>::new().build(),
                Clock::new_frozen(),
            );
            time_hits(&cache, iters)
        });
    });

    group.finish();
}

criterion_group!(benches, bench_layer_overhead);
criterion_main!(benches);
