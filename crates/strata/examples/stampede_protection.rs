// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! Stampede protection: many concurrent requests for one missing key reach the
//! origin once. The rest wait for that call and share its result.

use std::{
    sync::{
        Arc,
        atomic::{AtomicU32, Ordering},
    },
    time::Duration,
};

use futures::future::join_all;
use strata::{CacheTier, CoalescingCache, InMemoryCacheBuilder, SetOptions};
use tick::Clock;

async fn fetch_from_origin(clock: Clock, calls: Arc<AtomicU32>, key: String) -> Result<String, strata::Error> {
    calls.fetch_add(1, Ordering::Relaxed);
    clock.delay(Duration::from_millis(50)).await;
    Ok(format!("value_for_{key}"))
}

async fn stampede<C>(cache: &C, clock: &Clock, calls: &Arc<AtomicU32>)
where
    C: CacheTier<String, String>,
{
    let key = "contested_key".to_string();
    let options = SetOptions::new();
    let requests = (0..10).map(|_| {
        let (clock, calls, origin_key) = (clock.clone(), Arc::clone(calls), key.clone());
        cache.get_or_load(&key, move || fetch_from_origin(clock, calls, origin_key), &options)
    });
    for result in join_all(requests).await {
        result.expect("load failed");
    }
}

#[tokio::main(flavor = "current_thread")]
async fn main() {
    let clock = Clock::new_tokio();

    // Without coalescing: every concurrent miss calls the origin.
    let calls = Arc::new(AtomicU32::new(0));
    let plain = InMemoryCacheBuilder::<String, String>::new().build();
    stampede(&plain, &clock, &calls).await;
    println!("without coalescing: {} origin calls", calls.load(Ordering::Relaxed));

    // With coalescing: one call, shared by everyone.
    let calls = Arc::new(AtomicU32::new(0));
    let coalesced = CoalescingCache::new(InMemoryCacheBuilder::<String, String>::new().build());
    stampede(&coalesced, &clock, &calls).await;
    println!("with coalescing: {} origin call(s)", calls.load(Ordering::Relaxed));
}
